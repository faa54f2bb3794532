//! Two-stage container process launch.
//!
//! Stage 1 runs in the parent: it re-executes the current binary through
//! `/proc/self/exe` with the internal `child` sub-command, inside new PID,
//! mount, UTS, and IPC namespaces, and waits for it. Stage 2 runs in that
//! re-executed child: it names the host, switches root, mounts the virtual
//! filesystems, and runs the user command.

use std::ffi::CString;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use std::sync::Once;

use minidock_common::config::create_dir_all;
use minidock_common::constants::{CHILD_SUBCOMMAND, SELF_EXE};
use minidock_common::error::{MinidockError, Result};
use minidock_common::types::{ContainerId, ExtraMounts, ImageHash};
use minidock_core::filesystem::mount::{MountStack, Mounter, virtual_filesystems};
use minidock_core::filesystem::root::{change_root, make_mounts_private};
use minidock_core::namespace::uts::set_hostname;
use minidock_core::namespace::{NamespaceConfig, spawn_in_namespaces, wait_for_exit};
use minidock_image::manifest::ImageConfig;

/// Everything stage 2 needs, carried across the re-exec as arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildInvocation {
    /// Store root, forwarded so both stages agree on the layout.
    pub root: PathBuf,
    /// Image the container root was assembled from.
    pub hash: ImageHash,
    /// Container identifier, also used as hostname.
    pub id: ContainerId,
    /// Optional virtual filesystems.
    pub extra: ExtraMounts,
    /// User command; empty means the image default.
    pub command: Vec<String>,
}

impl ChildInvocation {
    /// Arguments after `argv[0]` for the re-executed binary.
    #[must_use]
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            "--root".to_string(),
            self.root.to_string_lossy().into_owned(),
            CHILD_SUBCOMMAND.to_string(),
        ];
        if self.extra.dev {
            args.push("--dev".into());
        }
        if self.extra.tmp {
            args.push("--tmp".into());
        }
        args.push(self.hash.to_string());
        args.push(self.id.to_string());
        args.push("--".into());
        args.extend(self.command.iter().cloned());
        args
    }
}

/// Starts stage 2 and reports its exit status.
pub trait ProcessLauncher {
    /// Runs the container process to completion.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be started or awaited. A
    /// non-zero exit of the container is not an error.
    fn launch(&self, invocation: &ChildInvocation) -> Result<i32>;
}

/// [`ProcessLauncher`] that re-executes the current binary in fresh
/// namespaces.
#[derive(Debug, Clone, Default)]
pub struct NamespaceLauncher {
    namespaces: NamespaceConfig,
}

impl ProcessLauncher for NamespaceLauncher {
    fn launch(&self, invocation: &ChildInvocation) -> Result<i32> {
        let program = to_cstring(SELF_EXE.to_string())?;
        let argv = std::iter::once(SELF_EXE.to_string())
            .chain(invocation.to_args())
            .map(to_cstring)
            .collect::<Result<Vec<_>>>()?;

        install_interrupt_logger();
        let pid = spawn_in_namespaces(&self.namespaces, &program, &argv)?;
        tracing::info!(id = %invocation.id, pid = pid.as_raw(), "container process started");

        let code = wait_for_exit(pid)?;
        tracing::info!(id = %invocation.id, code, "container process exited");
        Ok(code)
    }
}

fn to_cstring(arg: String) -> Result<CString> {
    CString::new(arg).map_err(|e| MinidockError::Config {
        message: format!("argument contains a NUL byte: {e}"),
    })
}

/// Keeps Ctrl+C from killing the parent, so teardown runs once the
/// container exits.
fn install_interrupt_logger() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        let installed = ctrlc::set_handler(|| {
            tracing::info!("interrupt received, waiting for the container to exit");
        });
        if let Err(e) = installed {
            tracing::warn!(error = %e, "failed to install interrupt handler");
        }
    });
}

/// Command to execute: the user command, or the image default when empty.
///
/// # Errors
///
/// Returns [`MinidockError::Config`] if both are empty.
pub fn resolve_command(command: &[String], image: &ImageConfig) -> Result<Vec<String>> {
    if !command.is_empty() {
        return Ok(command.to_vec());
    }
    let default = image.cmd();
    if default.is_empty() {
        return Err(MinidockError::Config {
            message: "no command given and the image defines no default".into(),
        });
    }
    tracing::debug!(command = ?default, "using image default command");
    Ok(default.to_vec())
}

/// Stage 2: isolates the current process inside `new_root` and runs
/// `command` there.
///
/// Must be called inside fresh mount and UTS namespaces. The virtual
/// filesystems are unmounted in reverse order after the command exits.
///
/// # Errors
///
/// Returns an error if any isolation step, mount, or unmount fails, or if
/// the command cannot be started.
pub fn enter_container(
    mounter: &dyn Mounter,
    new_root: &Path,
    hostname: &str,
    command: &[String],
    env: &[(String, String)],
    extra: ExtraMounts,
) -> Result<i32> {
    make_mounts_private()?;
    set_hostname(hostname)?;
    change_root(new_root)?;
    populate_and_run(mounter, command, env, extra)
}

/// Mounts the virtual filesystems under the current root, runs `command`,
/// and unwinds the mounts.
///
/// A mount failure skips the command; the mounts made so far are still
/// unwound and the mount error is returned.
pub(crate) fn populate_and_run(
    mounter: &dyn Mounter,
    command: &[String],
    env: &[(String, String)],
    extra: ExtraMounts,
) -> Result<i32> {
    let mut stack = MountStack::new(mounter);
    let outcome = mount_all(&mut stack, extra).and_then(|()| run_command(command, env));
    let unwound = stack.unwind();
    let code = outcome?;
    unwound?;
    Ok(code)
}

fn mount_all(stack: &mut MountStack<'_>, extra: ExtraMounts) -> Result<()> {
    for spec in virtual_filesystems(extra) {
        create_dir_all(&spec.target)?;
        stack.push(&spec)?;
    }
    Ok(())
}

fn run_command(command: &[String], env: &[(String, String)]) -> Result<i32> {
    let (program, args) = command.split_first().ok_or_else(|| MinidockError::Config {
        message: "empty command".into(),
    })?;
    tracing::info!(program = %program, args = ?args, "running command");

    let status = Command::new(program)
        .args(args)
        .env_clear()
        .envs(env.iter().map(|(k, v)| (k, v)))
        .status()
        .map_err(|e| MinidockError::Io {
            path: PathBuf::from(program),
            source: e,
        })?;
    Ok(exit_code(status))
}

/// Exit code of a finished process; death by signal `N` maps to `128 + N`.
fn exit_code(status: ExitStatus) -> i32 {
    status
        .code()
        .unwrap_or_else(|| status.signal().map_or(1, |signal| 128 + signal))
}
