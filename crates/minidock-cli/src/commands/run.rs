//! `minidock run`: run a command in a new container.

use clap::Args;
use minidock_common::config::MinidockConfig;
use minidock_common::types::ExtraMounts;
use minidock_core::privilege::ensure_privileged;
use minidock_runtime::engine::Engine;

/// Arguments for the `run` command.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Mount a tmpfs at /dev with a private devpts instance.
    #[arg(long)]
    pub dev: bool,

    /// Mount a tmpfs at /tmp.
    #[arg(long)]
    pub tmp: bool,

    /// Image reference, `name[:tag]`.
    pub image: String,

    /// Command and arguments; defaults to the image's command.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

/// Executes the `run` command and returns the container's exit status.
///
/// # Errors
///
/// Returns an error if not running as root, or if the image cannot be
/// resolved or the container cannot be started.
pub fn execute(args: RunArgs, config: MinidockConfig) -> anyhow::Result<i32> {
    ensure_privileged("minidock run")?;
    let engine = Engine::new(config);
    let extra = ExtraMounts {
        dev: args.dev,
        tmp: args.tmp,
    };
    let code = engine.run(&args.image, &args.command, extra)?;
    tracing::info!(image = %args.image, code, "container finished");
    Ok(code)
}
