//! # minidock
//!
//! Minimal single-host container runtime.
//! Pulls an image, assembles an overlay root, and runs one command in it
//! inside fresh namespaces.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used, clippy::panic))]

mod commands;

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::commands::Cli;

fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let code = commands::execute(cli)?;
    Ok(ExitCode::from(u8::try_from(code).unwrap_or(u8::MAX)))
}
