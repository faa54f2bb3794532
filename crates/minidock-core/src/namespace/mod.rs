//! Linux namespace management for container isolation.
//!
//! The container process is created directly inside its new namespaces with
//! `clone(2)`, then immediately re-executes a program. Operations that only
//! apply to the calling process (hostname, root, mounts) are performed by
//! that re-executed program.

pub mod uts;

use std::ffi::{CStr, CString};

use minidock_common::error::{MinidockError, Result};
use nix::errno::Errno;
use nix::sched::CloneFlags;
use nix::sys::wait::{WaitStatus, waitpid};
use nix::unistd::Pid;

/// Stack size handed to `clone(2)` for the pre-exec trampoline.
const CHILD_STACK_SIZE: usize = 1024 * 1024;

/// Exit code reported by the trampoline when `execv(2)` fails.
const EXEC_FAILED: isize = 127;

/// Configuration for which namespaces to create.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceConfig {
    /// Isolate PID namespace.
    pub pid: bool,
    /// Isolate mount namespace.
    pub mount: bool,
    /// Isolate UTS (hostname) namespace.
    pub uts: bool,
    /// Isolate IPC namespace.
    pub ipc: bool,
}

impl Default for NamespaceConfig {
    fn default() -> Self {
        Self {
            pid: true,
            mount: true,
            uts: true,
            ipc: true,
        }
    }
}

impl NamespaceConfig {
    /// Returns the `CLONE_NEW*` flags for the enabled namespaces.
    #[must_use]
    pub fn clone_flags(&self) -> CloneFlags {
        let mut flags = CloneFlags::empty();
        if self.pid {
            flags |= CloneFlags::CLONE_NEWPID;
        }
        if self.mount {
            flags |= CloneFlags::CLONE_NEWNS;
        }
        if self.uts {
            flags |= CloneFlags::CLONE_NEWUTS;
        }
        if self.ipc {
            flags |= CloneFlags::CLONE_NEWIPC;
        }
        flags
    }
}

/// Starts `program` with `argv` in a new process placed in the configured
/// namespaces. Standard streams are inherited.
///
/// # Errors
///
/// Returns [`MinidockError::Isolation`] if `clone(2)` fails. A failing
/// `execv(2)` surfaces as exit code 127 from [`wait_for_exit`].
#[allow(unsafe_code)]
pub fn spawn_in_namespaces(
    config: &NamespaceConfig,
    program: &CStr,
    argv: &[CString],
) -> Result<Pid> {
    let mut stack = vec![0u8; CHILD_STACK_SIZE];
    let argv_ptrs: Vec<*const libc::c_char> = argv
        .iter()
        .map(|arg| arg.as_ptr())
        .chain(std::iter::once(std::ptr::null()))
        .collect();
    // SAFETY: `program` and `argv_ptrs` are NUL-terminated and outlive the
    // call. On success execv(2) does not return.
    let trampoline = Box::new(|| unsafe {
        let _ = libc::execv(program.as_ptr(), argv_ptrs.as_ptr());
        EXEC_FAILED
    });

    // SAFETY: without CLONE_VM the child runs on a private copy of the
    // address space, so `stack`, `program`, and `argv_ptrs` stay valid for
    // it. The parent may run other threads, so the child performs no
    // allocation and takes no locks: it only calls execv(2), which is
    // async-signal-safe, with an argument vector built before the clone.
    let pid = unsafe {
        nix::sched::clone(
            trampoline,
            &mut stack,
            config.clone_flags(),
            Some(libc::SIGCHLD),
        )
    }
    .map_err(|e| MinidockError::Isolation {
        message: format!("clone with {:?} failed: {e}", config.clone_flags()),
    })?;

    tracing::info!(pid = pid.as_raw(), flags = ?config.clone_flags(), "process started in new namespaces");
    Ok(pid)
}

/// Blocks until `pid` exits and returns its exit status.
///
/// A process killed by signal `N` reports `128 + N`.
///
/// # Errors
///
/// Returns [`MinidockError::Isolation`] if `waitpid(2)` fails.
pub fn wait_for_exit(pid: Pid) -> Result<i32> {
    loop {
        match waitpid(pid, None) {
            Ok(WaitStatus::Exited(_, code)) => return Ok(code),
            Ok(WaitStatus::Signaled(_, signal, _)) => {
                tracing::warn!(pid = pid.as_raw(), %signal, "process killed by signal");
                return Ok(128 + signal as i32);
            }
            Ok(_) | Err(Errno::EINTR) => {}
            Err(e) => {
                return Err(MinidockError::Isolation {
                    message: format!("waitpid({pid}) failed: {e}"),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_requests_pid_mount_uts_ipc() {
        let flags = NamespaceConfig::default().clone_flags();
        assert_eq!(
            flags,
            CloneFlags::CLONE_NEWPID
                | CloneFlags::CLONE_NEWNS
                | CloneFlags::CLONE_NEWUTS
                | CloneFlags::CLONE_NEWIPC
        );
        assert!(!flags.contains(CloneFlags::CLONE_NEWNET));
    }

    #[test]
    fn disabled_namespaces_are_omitted() {
        let config = NamespaceConfig {
            pid: false,
            ipc: false,
            ..NamespaceConfig::default()
        };
        assert_eq!(
            config.clone_flags(),
            CloneFlags::CLONE_NEWNS | CloneFlags::CLONE_NEWUTS
        );
    }

    #[test]
    fn empty_config_spawns_plain_process() {
        let config = NamespaceConfig {
            pid: false,
            mount: false,
            uts: false,
            ipc: false,
        };
        let program = CString::new("/bin/sh").expect("cstring");
        let argv = ["/bin/sh", "-c", "exit 3"].map(|a| CString::new(a).expect("cstring"));
        let pid = spawn_in_namespaces(&config, &program, &argv).expect("spawn");
        assert_eq!(wait_for_exit(pid).expect("wait"), 3);
    }

    fn no_namespaces() -> NamespaceConfig {
        NamespaceConfig {
            pid: false,
            mount: false,
            uts: false,
            ipc: false,
        }
    }

    #[test]
    fn missing_program_exits_127() {
        let program = CString::new("/nonexistent/minidock-test").expect("cstring");
        let argv = [program.clone()];
        let pid = spawn_in_namespaces(&no_namespaces(), &program, &argv).expect("spawn");
        assert_eq!(wait_for_exit(pid).expect("wait"), 127);
    }

    #[test]
    fn spawn_while_other_threads_allocate() {
        use std::sync::Arc;
        use std::sync::atomic::{AtomicBool, Ordering};

        let stop = Arc::new(AtomicBool::new(false));
        let churn = {
            let stop = Arc::clone(&stop);
            std::thread::spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    let buffer = vec![0u8; 4096];
                    std::hint::black_box(buffer);
                }
            })
        };

        let program = CString::new("/bin/sh").expect("cstring");
        for code in 0..8 {
            let script = format!("exit {code}");
            let argv = ["/bin/sh", "-c", script.as_str()].map(|a| CString::new(a).expect("cstring"));
            let pid = spawn_in_namespaces(&no_namespaces(), &program, &argv).expect("spawn");
            assert_eq!(wait_for_exit(pid).expect("wait"), code);
        }

        stop.store(true, Ordering::Relaxed);
        churn.join().expect("join");
    }
}
