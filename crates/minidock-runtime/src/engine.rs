//! Runtime engine that orchestrates the container lifecycle.

use minidock_common::config::MinidockConfig;
use minidock_common::error::Result;
use minidock_common::types::{ContainerId, ExtraMounts, ImageHash};
use minidock_core::filesystem::mount::{Mounter, SyscallMounter};
use minidock_image::fetcher::ImageFetcher;
use minidock_image::registry::RegistryFetcher;
use minidock_image::store::ImageStore;

use crate::container::ContainerSandbox;
use crate::launcher::{self, ChildInvocation, NamespaceLauncher, ProcessLauncher};

/// The runtime engine coordinating image store, mounts, and launcher.
pub struct Engine {
    store: ImageStore,
    mounter: Box<dyn Mounter>,
    launcher: Box<dyn ProcessLauncher>,
}

impl Engine {
    /// Creates an engine using the registry fetcher, real mounts, and
    /// namespace isolation.
    #[must_use]
    pub fn new(config: MinidockConfig) -> Self {
        Self::with_components(
            config,
            Box::new(RegistryFetcher),
            Box::new(SyscallMounter),
            Box::new(NamespaceLauncher::default()),
        )
    }

    /// Creates an engine from explicit components.
    #[must_use]
    pub fn with_components(
        config: MinidockConfig,
        fetcher: Box<dyn ImageFetcher>,
        mounter: Box<dyn Mounter>,
        launcher: Box<dyn ProcessLauncher>,
    ) -> Self {
        Self {
            store: ImageStore::new(config, fetcher),
            mounter,
            launcher,
        }
    }

    /// Store configuration.
    #[must_use]
    pub const fn config(&self) -> &MinidockConfig {
        self.store.config()
    }

    /// Runs `command` in a new container built from `reference` and returns
    /// its exit status.
    ///
    /// The container directory is removed and its overlay unmounted when
    /// this returns, whether the run succeeded or not.
    ///
    /// # Errors
    ///
    /// Returns an error if the image cannot be resolved, the container root
    /// cannot be assembled, or the container process cannot be launched.
    pub fn run(&self, reference: &str, command: &[String], extra: ExtraMounts) -> Result<i32> {
        let config = self.store.config();
        config.init_dirs()?;

        let id = ContainerId::generate();
        tracing::info!(id = %id, image = reference, "creating container");
        let mut sandbox = ContainerSandbox::new(config, self.mounter.as_ref(), id.clone());

        let hash = self.store.resolve(reference)?;
        sandbox.prepare()?;
        sandbox.mount_overlay(self.store.layers_for(&hash)?)?;

        let invocation = ChildInvocation {
            root: config.root.clone(),
            hash,
            id,
            extra,
            command: command.to_vec(),
        };
        self.launcher.launch(&invocation)
    }

    /// Stage 2 entry point: runs `command` inside the container root of
    /// `id`, falling back to the image's default command.
    ///
    /// Must be called from the process started by [`Engine::run`], inside
    /// its fresh namespaces.
    ///
    /// # Errors
    ///
    /// Returns an error if the image config cannot be read, no command is
    /// available, or any isolation step fails.
    pub fn child(
        &self,
        hash: &ImageHash,
        id: &ContainerId,
        command: &[String],
        extra: ExtraMounts,
    ) -> Result<i32> {
        let image = self.store.image_config(hash)?;
        let command = launcher::resolve_command(command, &image)?;
        tracing::debug!(id = %id, hash = %hash, "entering container");
        launcher::enter_container(
            self.mounter.as_ref(),
            &self.config().mount_dir(id),
            id.as_str(),
            &command,
            &image.env_pairs(),
            extra,
        )
    }
}
