//! Lifecycle tests for the minidock engine.
//!
//! The engine is wired with recording fakes for fetching, mounting, and
//! launching, so these tests verify ordering and cleanup without root:
//! 1. A successful run propagates the container's exit status
//! 2. The overlay is unmounted and the container tree removed afterwards
//! 3. Launch and mount failures still clean up
//! 4. Images are fetched once per `(name, tag)`

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::cell::{Cell, RefCell};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use minidock_common::config::MinidockConfig;
use minidock_common::constants::MANIFEST_FILE;
use minidock_common::error::{MinidockError, Result};
use minidock_common::types::{ExtraMounts, ImageHash};
use minidock_core::filesystem::mount::{MountSpec, Mounter};
use minidock_image::fetcher::{FetchedImage, ImageFetcher};
use minidock_image::manifest::{ManifestEntry, write_manifest};
use minidock_image::reference::ImageReference;
use minidock_runtime::engine::Engine;
use minidock_runtime::launcher::{ChildInvocation, ProcessLauncher};

const HASH: &str = "5ca1ab1e5ca1ab1e5ca1ab1e5ca1ab1e5ca1ab1e5ca1ab1e5ca1ab1e5ca1ab1e";
const LAYERS: [&str; 2] = ["aaaaaaaaaaaaaaaa.tar", "bbbbbbbbbbbbbbbb.tar"];

// ── Fakes ────────────────────────────────────────────────────────────

struct CountingFetcher {
    calls: Rc<Cell<usize>>,
}

impl ImageFetcher for CountingFetcher {
    fn fetch(&self, reference: &ImageReference, scratch: &Path) -> Result<FetchedImage> {
        self.calls.set(self.calls.get() + 1);
        let dir = scratch.join(HASH);
        std::fs::create_dir_all(&dir).expect("mkdir");
        for layer in LAYERS {
            let mut builder = tar::Builder::new(File::create(dir.join(layer)).expect("create"));
            let body = layer.as_bytes();
            let mut header = tar::Header::new_gnu();
            header.set_size(body.len() as u64);
            header.set_mode(0o644);
            builder
                .append_data(&mut header, "etc/layer", body)
                .expect("append");
            builder.finish().expect("finish");
        }
        std::fs::write(
            dir.join(format!("{HASH}.json")),
            r#"{"config":{"Env":["PATH=/bin"],"Cmd":["/bin/sh"]}}"#,
        )
        .expect("config");
        write_manifest(
            &dir.join(MANIFEST_FILE),
            &ManifestEntry {
                config: format!("{HASH}.json"),
                repo_tags: vec![reference.to_string()],
                layers: LAYERS.iter().map(ToString::to_string).collect(),
            },
        )
        .expect("manifest");
        Ok(FetchedImage {
            hash: ImageHash::new(HASH),
            dir,
        })
    }
}

struct UnreachableFetcher;

impl ImageFetcher for UnreachableFetcher {
    fn fetch(&self, reference: &ImageReference, _scratch: &Path) -> Result<FetchedImage> {
        Err(MinidockError::Fetch {
            reference: reference.to_string(),
            message: "registry unreachable".into(),
        })
    }
}

#[derive(Clone, Default)]
struct RecordingMounter {
    log: Rc<RefCell<Vec<String>>>,
    fail_mount: bool,
}

impl Mounter for RecordingMounter {
    fn mount(&self, spec: &MountSpec) -> Result<()> {
        if self.fail_mount {
            return Err(MinidockError::Mount {
                target: spec.target.clone(),
                message: "overlay not supported".into(),
            });
        }
        self.log.borrow_mut().push(format!(
            "mount {} {}",
            spec.target.display(),
            spec.data.clone().unwrap_or_default()
        ));
        Ok(())
    }

    fn unmount(&self, target: &Path) -> Result<()> {
        self.log
            .borrow_mut()
            .push(format!("unmount {}", target.display()));
        Ok(())
    }
}

/// Records each invocation and whether the container root existed at
/// launch time.
struct FakeLauncher {
    root: PathBuf,
    outcome: std::result::Result<i32, String>,
    seen: Rc<RefCell<Vec<(ChildInvocation, bool)>>>,
}

impl ProcessLauncher for FakeLauncher {
    fn launch(&self, invocation: &ChildInvocation) -> Result<i32> {
        let mount_dir = MinidockConfig::new(&self.root).mount_dir(&invocation.id);
        self.seen
            .borrow_mut()
            .push((invocation.clone(), mount_dir.is_dir()));
        self.outcome.clone().map_err(|message| MinidockError::Isolation { message })
    }
}

struct Harness {
    _dir: tempfile::TempDir,
    config: MinidockConfig,
    engine: Engine,
    fetches: Rc<Cell<usize>>,
    mounts: Rc<RefCell<Vec<String>>>,
    launches: Rc<RefCell<Vec<(ChildInvocation, bool)>>>,
}

fn harness(outcome: std::result::Result<i32, String>, fail_mount: bool) -> Harness {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = MinidockConfig::new(dir.path());
    let fetches = Rc::new(Cell::new(0));
    let mounter = RecordingMounter {
        fail_mount,
        ..RecordingMounter::default()
    };
    let mounts = Rc::clone(&mounter.log);
    let launches = Rc::new(RefCell::new(Vec::new()));
    let engine = Engine::with_components(
        config.clone(),
        Box::new(CountingFetcher {
            calls: Rc::clone(&fetches),
        }),
        Box::new(mounter),
        Box::new(FakeLauncher {
            root: dir.path().to_path_buf(),
            outcome,
            seen: Rc::clone(&launches),
        }),
    );
    Harness {
        _dir: dir,
        config,
        engine,
        fetches,
        mounts,
        launches,
    }
}

fn command(args: &[&str]) -> Vec<String> {
    args.iter().map(ToString::to_string).collect()
}

fn container_entries(config: &MinidockConfig) -> usize {
    std::fs::read_dir(config.containers_dir())
        .expect("containers dir")
        .count()
}

// ── Successful runs ──────────────────────────────────────────────────

#[test]
fn run_propagates_exit_status_and_cleans_up() {
    let h = harness(Ok(3), false);
    let code = h
        .engine
        .run("busybox", &command(&["echo", "hi"]), ExtraMounts::default())
        .expect("run");
    assert_eq!(code, 3);

    let launches = h.launches.borrow();
    assert_eq!(launches.len(), 1);
    let (invocation, root_existed) = &launches[0];
    assert!(*root_existed);
    assert_eq!(invocation.hash.as_str(), HASH);
    assert_eq!(invocation.command, ["echo", "hi"]);
    assert_eq!(invocation.root, h.config.root);

    let mounts = h.mounts.borrow();
    assert_eq!(mounts.len(), 2);
    assert!(mounts[0].starts_with("mount "));
    assert_eq!(
        mounts[1],
        format!("unmount {}", h.config.mount_dir(&invocation.id).display())
    );
    assert!(!h.config.container_dir(&invocation.id).exists());
    assert_eq!(container_entries(&h.config), 0);
}

#[test]
fn overlay_lists_last_built_layer_first() {
    let h = harness(Ok(0), false);
    let _ = h
        .engine
        .run("busybox:latest", &[], ExtraMounts::default())
        .expect("run");

    let hash = ImageHash::new(HASH);
    let expected = format!(
        "lowerdir={}:{}",
        h.config.layer_fs_dir(&hash, "bbbbbbbbbbbb").display(),
        h.config.layer_fs_dir(&hash, "aaaaaaaaaaaa").display()
    );
    assert!(h.mounts.borrow()[0].contains(&expected));
}

#[test]
fn repeated_runs_fetch_once_and_use_fresh_ids() {
    let h = harness(Ok(0), false);
    for _ in 0..2 {
        let _ = h
            .engine
            .run("busybox", &command(&["true"]), ExtraMounts::default())
            .expect("run");
    }
    assert_eq!(h.fetches.get(), 1);

    let launches = h.launches.borrow();
    assert_ne!(launches[0].0.id, launches[1].0.id);
    assert!(!h.config.tar_dir().join(HASH).exists());
}

#[test]
fn extra_mounts_are_forwarded_to_the_child() {
    let h = harness(Ok(0), false);
    let extra = ExtraMounts {
        dev: true,
        tmp: false,
    };
    let _ = h
        .engine
        .run("busybox", &command(&["sh"]), extra)
        .expect("run");
    assert_eq!(h.launches.borrow()[0].0.extra, extra);
}

// ── Failures still clean up ──────────────────────────────────────────

#[test]
fn launch_failure_still_unmounts_and_removes() {
    let h = harness(Err("clone failed".into()), false);
    let result = h
        .engine
        .run("busybox", &command(&["sh"]), ExtraMounts::default());
    assert!(matches!(result, Err(MinidockError::Isolation { .. })));

    let mounts = h.mounts.borrow();
    assert_eq!(mounts.len(), 2);
    assert!(mounts[1].starts_with("unmount "));
    assert_eq!(container_entries(&h.config), 0);
}

#[test]
fn mount_failure_removes_tree_without_unmounting() {
    let h = harness(Ok(0), true);
    let result = h
        .engine
        .run("busybox", &command(&["sh"]), ExtraMounts::default());
    assert!(matches!(result, Err(MinidockError::Mount { .. })));
    assert!(h.mounts.borrow().is_empty());
    assert!(h.launches.borrow().is_empty());
    assert_eq!(container_entries(&h.config), 0);
}

#[test]
fn fetch_failure_leaves_no_container_behind() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = MinidockConfig::new(dir.path());
    let mounter = RecordingMounter::default();
    let mounts = Rc::clone(&mounter.log);
    let launches = Rc::new(RefCell::new(Vec::new()));
    let engine = Engine::with_components(
        config.clone(),
        Box::new(UnreachableFetcher),
        Box::new(mounter),
        Box::new(FakeLauncher {
            root: dir.path().to_path_buf(),
            outcome: Ok(0),
            seen: Rc::clone(&launches),
        }),
    );

    let result = engine.run("busybox", &command(&["sh"]), ExtraMounts::default());
    assert!(matches!(result, Err(MinidockError::Fetch { .. })));
    assert!(mounts.borrow().is_empty());
    assert!(launches.borrow().is_empty());
    assert_eq!(container_entries(&config), 0);
}

#[test]
fn invalid_reference_is_rejected_before_fetching() {
    let h = harness(Ok(0), false);
    assert!(
        h.engine
            .run("busybox:", &command(&["sh"]), ExtraMounts::default())
            .is_err()
    );
    assert_eq!(h.fetches.get(), 0);
}
