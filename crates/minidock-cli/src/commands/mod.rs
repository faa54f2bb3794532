//! CLI command definitions and dispatch.

pub mod child;
pub mod run;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use minidock_common::config::MinidockConfig;
use minidock_common::constants::{DEFAULT_ROOT, ROOT_ENV};

/// minidock: a minimal single-host container runtime.
#[derive(Parser, Debug)]
#[command(name = "minidock", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Directory holding images, downloads, and container trees.
    #[arg(long, global = true, env = ROOT_ENV, default_value = DEFAULT_ROOT)]
    pub root: PathBuf,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a command in a new container.
    Run(run::RunArgs),
    /// Internal entry point of the re-executed container process.
    #[command(hide = true)]
    Child(child::ChildArgs),
    /// Anything else.
    #[command(external_subcommand)]
    Other(Vec<String>),
}

/// Dispatches the parsed CLI command and returns the process exit status.
///
/// # Errors
///
/// Returns an error if the command execution fails.
pub fn execute(cli: Cli) -> anyhow::Result<i32> {
    let config = MinidockConfig::new(cli.root);
    match cli.command {
        Command::Run(args) => run::execute(args, config),
        Command::Child(args) => child::execute(args, config),
        Command::Other(args) => {
            let name = args.first().map_or("", String::as_str);
            #[allow(clippy::print_stderr)]
            {
                eprintln!("unknown command: {name}");
            }
            Ok(0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_collects_trailing_command_with_hyphens() {
        let cli = Cli::try_parse_from(["minidock", "run", "busybox", "echo", "-n", "hi"])
            .expect("parse");
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.image, "busybox");
        assert_eq!(args.command, ["echo", "-n", "hi"]);
        assert!(!args.dev);
    }

    #[test]
    fn run_accepts_mount_flags_before_image() {
        let cli = Cli::try_parse_from(["minidock", "run", "--dev", "--tmp", "alpine:3.19", "sh"])
            .expect("parse");
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert!(args.dev && args.tmp);
        assert_eq!(args.image, "alpine:3.19");
    }

    #[test]
    fn child_parses_forwarded_arguments() {
        let cli = Cli::try_parse_from([
            "/proc/self/exe",
            "--root",
            "/tmp/md",
            "child",
            "--tmp",
            "feed",
            "0123456789ab",
            "--",
            "ls",
            "-la",
        ])
        .expect("parse");
        assert_eq!(cli.root, PathBuf::from("/tmp/md"));
        let Command::Child(args) = cli.command else {
            panic!("expected child");
        };
        assert_eq!(args.hash, "feed");
        assert_eq!(args.id, "0123456789ab");
        assert!(args.tmp && !args.dev);
        assert_eq!(args.command, ["ls", "-la"]);
    }

    #[test]
    fn child_accepts_command_without_separator() {
        let cli = Cli::try_parse_from(["minidock", "child", "feed", "0123456789ab", "echo", "-n", "hi"])
            .expect("parse");
        let Command::Child(args) = cli.command else {
            panic!("expected child");
        };
        assert_eq!(args.id, "0123456789ab");
        assert_eq!(args.command, ["echo", "-n", "hi"]);
    }

    #[test]
    fn child_keeps_hyphenated_command_after_separator() {
        let cli = Cli::try_parse_from(["minidock", "child", "feed", "0123456789ab", "--", "--version"])
            .expect("parse");
        let Command::Child(args) = cli.command else {
            panic!("expected child");
        };
        assert_eq!(args.command, ["--version"]);
    }

    #[test]
    fn child_accepts_empty_command() {
        let cli = Cli::try_parse_from(["minidock", "child", "feed", "0123456789ab", "--"])
            .expect("parse");
        let Command::Child(args) = cli.command else {
            panic!("expected child");
        };
        assert!(args.command.is_empty());
    }

    #[test]
    fn unknown_subcommand_is_captured() {
        let cli = Cli::try_parse_from(["minidock", "frobnicate", "x"]).expect("parse");
        let Command::Other(args) = cli.command else {
            panic!("expected other");
        };
        assert_eq!(args, ["frobnicate", "x"]);

        let cli = Cli {
            command: Command::Other(args),
            root: cli.root,
        };
        assert_eq!(execute(cli).expect("execute"), 0);
    }
}
