//! Interactive fallback for credentials missing from both the config file and the environment.

use std::io::{self, BufRead, IsTerminal, Write};

pub trait Prompter {
    /// Ask for `label`. `Ok(None)` means the user gave an empty answer.
    fn ask(&mut self, label: &str) -> io::Result<Option<String>>;
}

/// Prompts on stderr and reads one line from stdin.
pub struct StdinPrompter;

impl StdinPrompter {
    /// Only offered when stdin is attached to a terminal.
    pub fn if_interactive() -> Option<Self> {
        io::stdin().is_terminal().then_some(StdinPrompter)
    }
}

impl Prompter for StdinPrompter {
    fn ask(&mut self, label: &str) -> io::Result<Option<String>> {
        let mut stderr = io::stderr().lock();
        write!(stderr, "{label}: ")?;
        stderr.flush()?;

        let mut line = String::new();
        io::stdin().lock().read_line(&mut line)?;
        let answer = line.trim();
        Ok((!answer.is_empty()).then(|| answer.to_string()))
    }
}
