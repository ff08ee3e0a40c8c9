#![doc = "hf-mirror-core: core logic library for hf-mirror."]

//! This crate contains the pipeline that mirrors Hugging Face repositories:
//! cloning with Git LFS, recording progress in a persisted cache and driving
//! each repository through clone → upload → cache update → cleanup.
//!
//! It performs no HTTP itself. The Hub client lives in the `hf-mirror` crate
//! and plugs in through the [`contract::Uploader`] trait.

pub mod cache;
pub mod config;
pub mod contract;
pub mod download;
pub mod error;
pub mod git;
pub mod source;
pub mod synchronise;
