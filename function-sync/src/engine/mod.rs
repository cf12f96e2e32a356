//! Sync engine - keeps a deployed function package and a local directory in step.
//!
//! The engine owns the manifest. It clones the remote package once, then
//! classifies every local change against the manifest and re-uploads the
//! package built from it:
//! - created files join the manifest and always trigger an upload
//! - modified files trigger an upload only when the manifest knows them
//! - a conflicting (in-flight) remote update is logged and dropped

pub mod manifest;
pub mod package;

use crate::archive;
use crate::config::SyncConfig;
use crate::remote::{FunctionClient, UploadOutcome};
use crate::utils::fs::write_atomic;
use crate::utils::{Result, SyncError};
use crate::watcher::{ChangeEvent, ChangeHandler, EventWatcher};
use async_trait::async_trait;
use manifest::{Manifest, ManifestStore};
use package::PackageReference;
use std::path::MAIN_SEPARATOR;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Uninitialized,
    Cloned,
    Watching,
}

/// How often a push that failed in transport is attempted again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retries: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            retries: 0,
            delay: Duration::ZERO,
        }
    }
}

impl From<&SyncConfig> for RetryPolicy {
    fn from(config: &SyncConfig) -> Self {
        Self {
            retries: config.upload_retries,
            delay: config.retry_delay(),
        }
    }
}

pub struct SyncEngine<C> {
    package: PackageReference,
    client: C,
    store: ManifestStore,
    manifest: Manifest,
    state: EngineState,
    retry: RetryPolicy,
}

impl<C: FunctionClient> SyncEngine<C> {
    pub fn new(package: PackageReference, client: C, retry: RetryPolicy) -> Self {
        let store = ManifestStore::new(package.manifest_path());
        Self {
            package,
            client,
            store,
            manifest: Manifest::default(),
            state: EngineState::Uninitialized,
            retry,
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn package(&self) -> &PackageReference {
        &self.package
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Replace the local directory with the deployed package.
    ///
    /// This clobbers local content; callers warn before invoking it.
    pub async fn initial_clone(&mut self) -> Result<()> {
        self.require_state(EngineState::Uninitialized, "clone")?;
        self.validate_root()?;

        let function = self.package.function_identifier();
        info!("Cloning {} into {}", function, self.package.local_root().display());

        let location = self.client.fetch_package_location(function).await?;
        let package = self.client.download(&location).await?;
        write_atomic(self.package.archive_path(), &package)?;

        // Reading the listing first rejects a corrupt package before any local file is touched.
        let manifest = self.store.load(self.package.archive_path())?;
        let extracted = archive::extract(&package, self.package.local_root())?;

        info!(
            "Cloned {}: {} files extracted, {} manifest entries",
            function,
            extracted,
            manifest.len()
        );
        self.manifest = manifest;
        self.state = EngineState::Cloned;
        Ok(())
    }

    /// Pick up where a previous run left off, using the persisted manifest.
    pub fn resume(&mut self) -> Result<()> {
        self.require_state(EngineState::Uninitialized, "resume")?;
        self.validate_root()?;

        let manifest = self.store.open()?.ok_or_else(|| {
            SyncError::Config(format!(
                "no manifest at {} for {}; clone the function first",
                self.store.path().display(),
                self.package.function_identifier()
            ))
        })?;

        // Created-file handling reloads from the working archive, so it must exist.
        if !self.package.archive_path().is_file() {
            let package = archive::build(&manifest, self.package.local_root())?;
            write_atomic(self.package.archive_path(), &package)?;
            debug!("Rebuilt working archive {}", self.package.archive_path().display());
        }

        info!(
            "Resumed {} with {} manifest entries",
            self.package.function_identifier(),
            manifest.len()
        );
        self.manifest = manifest;
        self.state = EngineState::Cloned;
        Ok(())
    }

    /// Path of `event` relative to the local root, with `/` separators.
    pub fn relative_path_of(&self, event: &ChangeEvent) -> Result<String> {
        let root = self.package.local_root().to_string_lossy();
        let path = event.path.to_string_lossy();
        let prefix = format!("{}{}", root.trim_end_matches(MAIN_SEPARATOR), MAIN_SEPARATOR);

        match path.strip_prefix(&prefix) {
            Some(relative) if !relative.is_empty() => Ok(relative.replace(MAIN_SEPARATOR, "/")),
            _ => Err(SyncError::Precondition(format!(
                "event path {} is not under {}",
                path, root
            ))),
        }
    }

    /// Build the package from the manifest and push it.
    ///
    /// A conflict with an in-flight update is not an error and is not
    /// retried. Transport failures are retried per the retry policy; any
    /// other failure is returned.
    pub async fn upload(&self) -> Result<()> {
        if self.state == EngineState::Uninitialized {
            return Err(SyncError::Precondition(
                "upload requested before the package was cloned or resumed".to_string(),
            ));
        }

        let function = self.package.function_identifier();
        debug!("Compressing {} manifest entries", self.manifest.len());
        let package = archive::build(&self.manifest, self.package.local_root())?;
        write_atomic(self.package.archive_path(), &package)?;
        debug!("Compressed {} bytes", package.len());

        let mut attempt = 0;
        loop {
            match self.client.push_package(function, package.clone()).await {
                UploadOutcome::Success { detail } => {
                    info!(
                        "Finished uploading {} ({})",
                        function,
                        detail.as_deref().unwrap_or("no detail")
                    );
                    return Ok(());
                }
                UploadOutcome::Conflict { detail } => {
                    debug!(
                        "Tried to upload {} while an update was in progress: {}",
                        function,
                        detail.as_deref().unwrap_or("-")
                    );
                    return Ok(());
                }
                UploadOutcome::Failure(failure) if failure.retryable && attempt < self.retry.retries => {
                    attempt += 1;
                    warn!(
                        "Upload of {} failed in transport ({}), retry {}/{}",
                        function, failure.message, attempt, self.retry.retries
                    );
                    tokio::time::sleep(self.retry.delay).await;
                }
                UploadOutcome::Failure(failure) if failure.is_authentication() => {
                    error!(
                        "Credentials rejected while updating {}: {}: {}",
                        function, failure.code, failure.message
                    );
                    return Err(SyncError::Authentication(format!(
                        "{}: {}",
                        failure.code, failure.message
                    )));
                }
                UploadOutcome::Failure(failure) => {
                    error!(
                        "Couldn't update function {}. Here's why: {}: {}",
                        function, failure.code, failure.message
                    );
                    return Err(SyncError::Remote {
                        code: failure.code,
                        message: failure.message,
                    });
                }
            }
        }
    }

    /// Run the watch loop on `watcher` until `shutdown` is cancelled.
    pub async fn watch(&mut self, watcher: EventWatcher, shutdown: CancellationToken) -> Result<()> {
        self.require_state(EngineState::Cloned, "watch")?;
        self.state = EngineState::Watching;
        watcher.run(self, shutdown).await
    }

    fn require_state(&self, expected: EngineState, operation: &str) -> Result<()> {
        if self.state != expected {
            return Err(SyncError::Precondition(format!(
                "{} requires state {:?}, engine is {:?}",
                operation, expected, self.state
            )));
        }
        Ok(())
    }

    fn validate_root(&self) -> Result<()> {
        let root = self.package.local_root();
        if !root.is_dir() {
            return Err(SyncError::Config(format!(
                "Local dir {} does not exist",
                root.display()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl<C: FunctionClient> ChangeHandler for SyncEngine<C> {
    /// A created file is new package content: add it, then upload.
    async fn on_create(&mut self, event: ChangeEvent) -> Result<()> {
        let relative = self.relative_path_of(&event)?;

        // Reload so the check never runs against a stale listing.
        self.manifest = self.store.load(self.package.archive_path())?;

        // Short-lived temp files (editor write probes) can be gone before the event arrives.
        if !event.path.is_file() {
            debug!("{} no longer exists, not adding it to the manifest", relative);
        } else if self.manifest.insert(relative.as_str()) {
            self.store.persist(&self.manifest)?;
            info!("Added {} to the manifest", relative);
        } else {
            debug!("{} is already in the manifest", relative);
        }

        self.upload().await
    }

    /// Only files that belong to the package trigger an upload.
    async fn on_modify(&mut self, event: ChangeEvent) -> Result<()> {
        let relative = self.relative_path_of(&event)?;

        // The working archive holds the last package that built; entries that
        // never made it into a build are dropped here.
        self.manifest = self.store.load(self.package.archive_path())?;

        if !self.manifest.contains(&relative) {
            debug!("{} is not in the manifest, ignoring", relative);
            return Ok(());
        }

        self.upload().await
    }
}
