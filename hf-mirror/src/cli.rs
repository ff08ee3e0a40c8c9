///
/// This module implements the CLI for hf-mirror: command parsing, wiring the
/// loaded config into the core pipeline, and user-visible output.
///
/// All pipeline logic (cache, clone, driver loop) lives in `hf-mirror-core`.
/// This module is glue: it builds the real [`GitCloner`] and [`HubClient`]
/// and hands them to [`synchronise`].
///
/// ## How To Use
/// - Command line: `hf-mirror` (same as `hf-mirror run`), `hf-mirror status`,
///   `hf-mirror forget <URL>`.
/// - Programmatic/integration use: call [`run`] with a constructed [`Cli`].
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use hf_mirror_core::cache::RepoCache;
use hf_mirror_core::config::SynchroniseConfig;
use hf_mirror_core::download::GitCloner;
use hf_mirror_core::git::Git;
use hf_mirror_core::source::SourceRepo;
use hf_mirror_core::synchronise::{synchronise, RepoOutcome, SynchroniseReport};
use std::path::PathBuf;

use crate::load_config::{load_config, process_env, read_config_file, DEFAULT_CONFIG_PATH};
use crate::prompt::{Prompter, StdinPrompter};
use crate::upload::HubClient;

/// CLI for hf-mirror: copy Hugging Face repositories into your own namespace.
#[derive(Parser)]
#[clap(
    name = "hf-mirror",
    version,
    about = "Clone Hugging Face model repositories and re-upload them under your account or organization"
)]
pub struct Cli {
    /// Path to the YAML config file
    #[clap(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    #[clap(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Mirror every configured repository that is not yet in the cache (default)
    Run {
        /// Fail instead of asking for missing credentials
        #[clap(long)]
        no_prompt: bool,
        /// Leave local clones on disk after a successful upload
        #[clap(long)]
        keep_clones: bool,
    },
    /// Show which configured repositories have already been mirrored
    Status,
    /// Remove a repository from the cache so the next run mirrors it again
    Forget {
        /// Repository URL or owner/name, as listed in the config
        repository: String,
    },
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    let command = cli.command.unwrap_or(Commands::Run {
        no_prompt: false,
        keep_clones: false,
    });
    match command {
        Commands::Run {
            no_prompt,
            keep_clones,
        } => run_mirror(cli.config, no_prompt, keep_clones).await,
        Commands::Status => status(cli.config),
        Commands::Forget { repository } => forget(cli.config, &repository),
    }
}

async fn run_mirror(config_path: PathBuf, no_prompt: bool, keep_clones: bool) -> Result<()> {
    let mut prompter = if no_prompt {
        None
    } else {
        StdinPrompter::if_interactive()
    };
    let config = load_config(
        &config_path,
        &process_env,
        prompter.as_mut().map(|p| p as &mut dyn Prompter),
    )
    .context("configuration error")?;

    let hub = HubClient::new(config.endpoint.clone(), config.token.clone(), config.private)?;
    let namespace = match config.namespace.clone() {
        Some(namespace) => namespace,
        None => hub
            .whoami()
            .await
            .context("could not resolve destination namespace from the token; set platform.namespace")?,
    };

    let cache = RepoCache::open(&config.cache_path)?;
    let cloner = GitCloner::new(
        Git::with_bearer_auth(config.endpoint.as_str(), config.token.clone()),
        config.identity.clone(),
    )
    .with_lfs_track(config.lfs_track.clone());

    let sync_config = SynchroniseConfig {
        workdir: config.workdir.clone(),
        namespace,
        sources: config.sources.clone(),
        keep_clones,
    };
    sync_config.trace_loaded();
    tracing::info!(command = "run", "Starting mirror run");

    let report = synchronise(&sync_config, &cloner, &hub, &cache).await;
    print_report(&report);

    if !report.is_success() {
        let failed = report.failed().count();
        tracing::error!(command = "run", failed, "Mirror run finished with failures");
        bail!(
            "{failed} of {} repositories failed",
            report.repos.len()
        );
    }
    tracing::info!(command = "run", "Mirror run complete");
    Ok(())
}

fn print_report(report: &SynchroniseReport) {
    for repo in &report.repos {
        match &repo.outcome {
            RepoOutcome::Skipped => println!("skipped   {}", repo.source.url),
            RepoOutcome::Completed { target, elapsed } => println!(
                "mirrored  {} -> {} ({:.1}s)",
                repo.source.url,
                target,
                elapsed.as_secs_f64()
            ),
            RepoOutcome::CompletedWithLeftovers { target, error, .. } => {
                println!("mirrored  {} -> {} ({error})", repo.source.url, target)
            }
            RepoOutcome::Failed(e) => println!("FAILED    {} ({}: {e})", repo.source.url, e.kind()),
        }
    }
    println!(
        "{} mirrored, {} skipped, {} failed",
        report.completed_count(),
        report.skipped_count(),
        report.failed().count()
    );
}

fn status(config_path: PathBuf) -> Result<()> {
    let file = read_config_file(&config_path)?;
    let sources = file.sources()?;
    let cache = RepoCache::new(file.cache_path());
    let entries = cache.entries()?;

    let mut done = 0;
    for source in &sources {
        match entries.get(&source.url) {
            Some(entry) => {
                done += 1;
                let at = entry
                    .uploaded_at
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "unknown time".to_string());
                println!(
                    "done      {} -> {} ({at})",
                    source.url,
                    entry.target.as_deref().unwrap_or("?")
                );
            }
            None => println!("pending   {}", source.url),
        }
    }
    println!("{done} of {} repositories mirrored", sources.len());
    Ok(())
}

fn forget(config_path: PathBuf, repository: &str) -> Result<()> {
    let file = read_config_file(&config_path)?;
    let source = SourceRepo::parse(repository, &file.endpoint()?)?;
    let cache = RepoCache::new(file.cache_path());
    if cache.forget(&source.url)? {
        println!("forgot    {}", source.url);
    } else {
        println!("not in cache: {}", source.url);
    }
    Ok(())
}
