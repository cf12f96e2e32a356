//! Recursive directory watching.
//!
//! Raw notifications from the OS backend are forwarded over a channel and
//! handled one at a time by [`EventWatcher::run`]. Each notification path
//! becomes one [`ChangeEvent`]; nothing is coalesced or debounced.

use crate::utils::Result;
use async_trait::async_trait;
use notify::event::{CreateKind, ModifyKind, RenameMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Modified,
}

/// One filesystem change under the watched root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub path: PathBuf,
    pub is_directory: bool,
}

impl ChangeEvent {
    pub fn created(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: ChangeKind::Created,
            path: path.into(),
            is_directory: false,
        }
    }

    pub fn modified(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: ChangeKind::Modified,
            path: path.into(),
            is_directory: false,
        }
    }
}

/// Receiver of file events; exactly one method is called per event.
#[async_trait]
pub trait ChangeHandler: Send {
    async fn on_create(&mut self, event: ChangeEvent) -> Result<()>;

    async fn on_modify(&mut self, event: ChangeEvent) -> Result<()>;
}

/// Translate a raw notification into change events.
///
/// Creations and content/metadata modifications are kept. A file renamed into
/// place (including from outside the tree) counts as created at its
/// destination. Removals, rename sources and access notifications produce
/// nothing.
pub fn change_events(event: &Event) -> Vec<ChangeEvent> {
    let (kind, paths): (ChangeKind, Vec<&PathBuf>) = match event.kind {
        EventKind::Create(_) => (ChangeKind::Created, event.paths.iter().collect()),
        EventKind::Modify(ModifyKind::Name(mode)) => {
            let destinations: Vec<&PathBuf> = match mode {
                RenameMode::To => event.paths.iter().collect(),
                RenameMode::Both => event.paths.get(1).into_iter().collect(),
                RenameMode::From => Vec::new(),
                // Backends that cannot tell the two ends apart report both; keep what exists.
                _ => event.paths.iter().filter(|path| path.exists()).collect(),
            };
            (ChangeKind::Created, destinations)
        }
        EventKind::Modify(_) => (ChangeKind::Modified, event.paths.iter().collect()),
        _ => return Vec::new(),
    };
    let folder_created = matches!(event.kind, EventKind::Create(CreateKind::Folder));

    paths
        .into_iter()
        .map(|path| ChangeEvent {
            kind,
            path: path.clone(),
            is_directory: folder_created || path.is_dir(),
        })
        .collect()
}

/// Route one event to the matching handler method.
///
/// Directory events are dropped. Handler errors are contained here unless
/// they are fatal, in which case they are returned to stop the loop.
pub async fn dispatch<H>(handler: &mut H, event: ChangeEvent) -> Result<()>
where
    H: ChangeHandler + ?Sized,
{
    if event.is_directory {
        trace!("Ignoring directory event - {}", event.path.display());
        return Ok(());
    }

    let path = event.path.clone();
    let result = match event.kind {
        ChangeKind::Created => {
            info!("Received created event - {}", path.display());
            handler.on_create(event).await
        }
        ChangeKind::Modified => {
            info!("Received modified event - {}", path.display());
            handler.on_modify(event).await
        }
    };

    match result {
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            error!("Failed to handle event for {}: {}", path.display(), e);
            Ok(())
        }
        Ok(()) => Ok(()),
    }
}

pub struct EventWatcher {
    root: PathBuf,
    // Dropping the backend stops the OS watch.
    backend: Option<RecommendedWatcher>,
    events_rx: mpsc::UnboundedReceiver<notify::Result<Event>>,
}

impl EventWatcher {
    /// Start watching `root` recursively.
    pub fn watch(root: &Path) -> Result<Self> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let mut backend = RecommendedWatcher::new(
            move |result: notify::Result<Event>| {
                if events_tx.send(result).is_err() {
                    trace!("Watch loop is gone, dropping event");
                }
            },
            Config::default(),
        )?;
        backend.watch(root, RecursiveMode::Recursive)?;

        info!("Watching {}", root.display());
        Ok(Self {
            root: root.to_path_buf(),
            backend: Some(backend),
            events_rx,
        })
    }

    /// Watch loop fed by an existing channel instead of the OS backend.
    pub fn from_receiver(
        root: impl Into<PathBuf>,
        events_rx: mpsc::UnboundedReceiver<notify::Result<Event>>,
    ) -> Self {
        Self {
            root: root.into(),
            backend: None,
            events_rx,
        }
    }

    /// Handle events in delivery order until `shutdown` is cancelled.
    ///
    /// Cancellation is only observed between events, so an upload started
    /// by the current event always runs to completion.
    pub async fn run<H>(mut self, handler: &mut H, shutdown: CancellationToken) -> Result<()>
    where
        H: ChangeHandler + ?Sized,
    {
        loop {
            let next = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                next = self.events_rx.recv() => next,
            };

            let Some(result) = next else {
                warn!("Event channel closed, stopping watch loop");
                break;
            };

            let event = match result {
                Ok(event) => event,
                Err(e) => {
                    warn!("Watch error: {}", e);
                    continue;
                }
            };

            for change in change_events(&event) {
                dispatch(&mut *handler, change).await?;
            }
        }

        drop(self.backend.take());
        info!("Stopped watching {}", self.root.display());
        Ok(())
    }
}
