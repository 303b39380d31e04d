//! Issuekeeper - issue records that travel with your git repository
//!
//! This crate provides the core functionality for the `ik` CLI tool.
//!
//! # Architecture
//!
//! - [`cli`] - Command-line interface using clap
//! - [`model`] - The issue record and its dependency edges
//! - [`storage`] - One JSON file per issue, atomic writes, consistency checks
//! - [`import`] - Two-pass import from foreign trackers with id mapping
//! - [`workspace`] - Staging directories, the outbox and the conflict attic
//! - [`git`] - Plumbing-only transport over a dedicated sync branch
//! - [`sync`] - Pull, push and conflict resolution against that branch
//! - [`config`] - Project discovery and `config.json`
//! - [`error`] - Error types and handling

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod error;
pub mod git;
pub mod import;
pub mod model;
pub mod storage;
pub mod sync;
pub mod validate;
pub mod workspace;

pub use error::{Error, Result};
