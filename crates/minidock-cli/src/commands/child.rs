//! `minidock child`: stage 2 of a container launch.
//!
//! Invoked only by `minidock run` through `/proc/self/exe`, already inside
//! the container's namespaces.

use clap::Args;
use minidock_common::config::MinidockConfig;
use minidock_common::types::{ContainerId, ExtraMounts, ImageHash};
use minidock_runtime::engine::Engine;

/// Arguments for the `child` command.
#[derive(Args, Debug)]
pub struct ChildArgs {
    /// Mount a tmpfs at /dev with a private devpts instance.
    #[arg(long)]
    pub dev: bool,

    /// Mount a tmpfs at /tmp.
    #[arg(long)]
    pub tmp: bool,

    /// Content hash of the image.
    pub hash: String,

    /// Container identifier.
    pub id: String,

    /// Command and arguments. A leading `--` is accepted.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

/// Executes the `child` command and returns the user command's exit status.
///
/// # Errors
///
/// Returns an error if any isolation step fails or the command cannot be
/// started.
pub fn execute(args: ChildArgs, config: MinidockConfig) -> anyhow::Result<i32> {
    let engine = Engine::new(config);
    let extra = ExtraMounts {
        dev: args.dev,
        tmp: args.tmp,
    };
    let code = engine.child(
        &ImageHash::new(args.hash),
        &ContainerId::new(args.id),
        &args.command,
        extra,
    )?;
    Ok(code)
}
