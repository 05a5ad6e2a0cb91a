//! Debounced file watch & swap
//!
//! Watches a single image file for external modification and hot-swaps
//! the displayed image: change notifications are debounced through a
//! single-slot gate, a background worker schedules a delayed refresh,
//! and the refresh copies the file under a fresh numbered name
//! (`name~<n>.ext`) before repointing the image reference so viewers
//! reload.
//!
//! Control flow: OS file event -> watcher callback -> [`DebounceGate`]
//! -> worker wakeup -> settle delay -> swap action -> gate cleared.
//!
//! No failure in the refresh path is fatal: errors are logged and the
//! component degrades to "stops refreshing" rather than crashing the
//! caller.

pub mod debounce;
mod swap;

pub use debounce::DebounceGate;

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher as _};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use swap::RefreshAction;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// Errors from the watch & swap component.
///
/// Only `open` propagates errors to the caller. Failures inside a
/// refresh cycle are logged and swallowed so the worker loop survives.
#[derive(Debug, Error)]
pub enum Error {
    /// The watched object or its path cannot be determined
    #[error("cannot resolve watch target: {0}")]
    Resolution(String),

    /// Copy, delete, or directory access failure
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The image reference rejected the new path
    #[error("image reference update failed: {0}")]
    Reference(String),

    /// Watch backend registration failure
    #[error(transparent)]
    Backend(#[from] notify::Error),
}

/// The image reference collaborator.
///
/// Exposes a readable path (used to resolve the watched location when
/// the config does not name one) and a settable path the component
/// repoints at the latest numbered copy.
pub trait ImageRef: Send + Sync {
    /// Current path of the image, if one is set.
    fn path(&self) -> Option<PathBuf>;

    /// Point the image at a new file.
    fn set_path(&self, path: &Path) -> Result<(), Error>;
}

/// In-memory [`ImageRef`] implementation.
#[derive(Default)]
pub struct SharedImageRef {
    path: Mutex<Option<PathBuf>>,
}

impl SharedImageRef {
    pub fn new(initial: impl Into<PathBuf>) -> Self {
        Self {
            path: Mutex::new(Some(initial.into())),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }
}

impl ImageRef for SharedImageRef {
    fn path(&self) -> Option<PathBuf> {
        self.path.lock().clone()
    }

    fn set_path(&self, path: &Path) -> Result<(), Error> {
        *self.path.lock() = Some(path.to_path_buf());
        Ok(())
    }
}

/// Watch session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// File to watch. `None` means "ask the image reference".
    #[serde(default)]
    pub image_path: Option<PathBuf>,

    /// Directory receiving the numbered copies
    /// (default: the watched file's own directory)
    #[serde(default)]
    pub output_dir: Option<PathBuf>,

    /// Settle delay between the debounced wakeup and the copy, giving
    /// slow writers time to finish flushing (default: 500)
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            image_path: None,
            output_dir: None,
            settle_ms: default_settle_ms(),
        }
    }
}

fn default_settle_ms() -> u64 {
    500
}

/// Resolved watch location. Immutable for the session's lifetime.
#[derive(Debug, Clone)]
pub struct WatchTarget {
    /// Full path of the watched file
    pub absolute: PathBuf,

    /// Containing directory (the path actually registered with the OS)
    pub directory: PathBuf,

    /// Exact file name events are filtered to
    pub filename: OsString,

    stem: String,
    extension: Option<String>,
}

impl WatchTarget {
    /// Split a configured path into the pieces the session needs.
    ///
    /// The containing directory must exist; the file itself may appear
    /// later. Empty or root-only paths are a [`Error::Resolution`].
    pub fn resolve(path: &Path) -> Result<Self, Error> {
        if path.as_os_str().is_empty() {
            return Err(Error::Resolution("image path is empty".into()));
        }

        let filename = path
            .file_name()
            .ok_or_else(|| Error::Resolution(format!("no file name in {}", path.display())))?
            .to_os_string();

        let directory = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        if !directory.is_dir() {
            return Err(Error::Resolution(format!(
                "watch directory does not exist: {}",
                directory.display()
            )));
        }

        let stem = Path::new(&filename)
            .file_stem()
            .unwrap_or(filename.as_os_str())
            .to_string_lossy()
            .into_owned();
        let extension = Path::new(&filename)
            .extension()
            .map(|e| e.to_string_lossy().into_owned());

        Ok(Self {
            absolute: directory.join(&filename),
            directory,
            filename,
            stem,
            extension,
        })
    }

    /// `stem~<seq>.ext` name for a numbered copy.
    pub(crate) fn temp_name(&self, seq: u64) -> String {
        match &self.extension {
            Some(ext) => format!("{}~{}.{}", self.stem, seq, ext),
            None => format!("{}~{}", self.stem, seq),
        }
    }

    /// Whether `name` is a numbered copy of this target.
    pub(crate) fn is_temp_name(&self, name: &str) -> bool {
        let Some(rest) = name.strip_prefix(self.stem.as_str()) else {
            return false;
        };
        let Some(rest) = rest.strip_prefix('~') else {
            return false;
        };
        let middle = match &self.extension {
            Some(ext) => match rest.strip_suffix(ext.as_str()).and_then(|r| r.strip_suffix('.')) {
                Some(middle) => middle,
                None => return false,
            },
            None => rest,
        };
        !middle.is_empty()
    }
}

/// State shared between the watcher callback, the worker loop, and
/// in-flight refresh tasks.
struct Shared {
    gate: DebounceGate,

    /// Set before the shutdown wakeup is released, so a woken worker
    /// can tell "wake to stop" from "wake to act"
    closing: AtomicBool,

    settle: Duration,
    action: RefreshAction,
    image_ref: Arc<dyn ImageRef>,

    /// Handle of the most recently scheduled refresh, awaited at close
    /// so an in-flight cycle finishes before teardown
    inflight: Mutex<Option<JoinHandle<()>>>,
}

/// An open watch session.
///
/// Created with [`ImageWatch::open`], torn down with
/// [`ImageWatch::close`]. Dropping without closing still unregisters
/// the OS watcher and stops the worker, but skips the graceful wait
/// for an in-flight refresh.
pub struct ImageWatch {
    shared: Arc<Shared>,
    watcher: Option<RecommendedWatcher>,
    worker: Option<JoinHandle<()>>,
    target: WatchTarget,
}

impl std::fmt::Debug for ImageWatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageWatch")
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

impl ImageWatch {
    /// Resolve the target, register the OS watcher, and start the
    /// worker loop. Must be called within a tokio runtime.
    pub fn open(config: WatchConfig, image_ref: Arc<dyn ImageRef>) -> Result<Self, Error> {
        let path = match config.image_path.clone().or_else(|| image_ref.path()) {
            Some(path) => path,
            None => {
                error!("no image path configured and the image reference has none");
                return Err(Error::Resolution(
                    "no image path configured and the image reference has none".into(),
                ));
            }
        };

        let target = match WatchTarget::resolve(&path) {
            Ok(target) => target,
            Err(e) => {
                error!(path = %path.display(), error = %e, "watch target resolution failed");
                return Err(e);
            }
        };

        let output_dir = match &config.output_dir {
            Some(dir) => {
                fs::create_dir_all(dir).map_err(|source| Error::Io {
                    path: dir.clone(),
                    source,
                })?;
                dir.clone()
            }
            None => target.directory.clone(),
        };

        let shared = Arc::new(Shared {
            gate: DebounceGate::new(),
            closing: AtomicBool::new(false),
            settle: Duration::from_millis(config.settle_ms),
            action: RefreshAction::new(target.clone(), output_dir),
            image_ref,
            inflight: Mutex::new(None),
        });

        // The callback runs on notify's own thread. It must not block:
        // it filters, takes the gate lock briefly, and returns.
        let callback_shared = Arc::clone(&shared);
        let watched_name = target.filename.clone();
        let mut watcher =
            notify::recommended_watcher(move |event: Result<notify::Event, notify::Error>| {
                let event = match event {
                    Ok(event) => event,
                    Err(e) => {
                        warn!(error = %e, "watch backend error");
                        return;
                    }
                };
                // Create events matter too: some editors save as
                // delete + recreate rather than in-place write.
                // Any covers backends that do not classify events.
                if !matches!(
                    event.kind,
                    EventKind::Create(_) | EventKind::Modify(_) | EventKind::Any
                ) {
                    return;
                }
                if !event
                    .paths
                    .iter()
                    .any(|p| p.file_name() == Some(watched_name.as_os_str()))
                {
                    return;
                }
                if callback_shared.gate.signal() {
                    debug!("change notification queued");
                }
            })?;

        watcher.watch(&target.directory, RecursiveMode::NonRecursive)?;
        debug!(path = %target.absolute.display(), "watch session opened");

        let worker = tokio::spawn(worker_loop(Arc::clone(&shared)));

        Ok(Self {
            shared,
            watcher: Some(watcher),
            worker: Some(worker),
            target,
        })
    }

    /// The resolved watch location.
    pub fn target(&self) -> &WatchTarget {
        &self.target
    }

    /// Tear the session down.
    ///
    /// Ordering matters: the OS watcher is dropped first so no new
    /// signals arrive, the closing flag is set, and only then is one
    /// wakeup released so a waiting worker observes the flag and exits
    /// instead of scheduling another cycle. An in-flight refresh is
    /// allowed to finish before the numbered copies are swept.
    pub async fn close(mut self) {
        drop(self.watcher.take());
        self.shared.closing.store(true, Ordering::SeqCst);
        self.shared.gate.wake();

        if let Some(worker) = self.worker.take() {
            let _ = worker.await;
        }

        let inflight = self.shared.inflight.lock().take();
        if let Some(handle) = inflight {
            let _ = handle.await;
        }

        self.shared.action.sweep_temp_files();
        debug!(path = %self.target.absolute.display(), "watch session closed");
    }
}

impl Drop for ImageWatch {
    fn drop(&mut self) {
        drop(self.watcher.take());
        self.shared.closing.store(true, Ordering::SeqCst);
        self.shared.gate.wake();
        if let Some(worker) = self.worker.take() {
            worker.abort();
        }
    }
}

/// Worker loop: WAITING -> DELAYING -> ACTING -> WAITING, STOPPED on
/// the closing flag.
///
/// The settle delay runs in its own task so the loop returns to
/// waiting immediately; the delay and the wait are concurrent, never
/// nested. Coordination with the delayed task goes solely through the
/// gate.
async fn worker_loop(shared: Arc<Shared>) {
    loop {
        shared.gate.notified().await;

        if shared.closing.load(Ordering::SeqCst) {
            debug!("worker loop stopping");
            break;
        }

        let cycle = Arc::clone(&shared);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(cycle.settle).await;

            if let Err(e) = cycle.action.run(cycle.image_ref.as_ref()) {
                error!(error = %e, "refresh cycle failed");
            }
            // Cleared even on failure, so later changes are still seen
            cycle.gate.clear();
        });
        *shared.inflight.lock() = Some(handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_rejects_empty_path() {
        let err = WatchTarget::resolve(Path::new("")).unwrap_err();
        assert!(matches!(err, Error::Resolution(_)));
    }

    #[test]
    fn test_resolve_rejects_missing_directory() {
        let err = WatchTarget::resolve(Path::new("/definitely/not/here/img.png")).unwrap_err();
        assert!(matches!(err, Error::Resolution(_)));
    }

    #[test]
    fn test_resolve_splits_path() {
        let tmp = tempfile::TempDir::new().unwrap();
        let target = WatchTarget::resolve(&tmp.path().join("img.png")).unwrap();

        assert_eq!(target.directory, tmp.path());
        assert_eq!(target.filename, OsString::from("img.png"));
        assert_eq!(target.absolute, tmp.path().join("img.png"));
    }

    #[test]
    fn test_temp_name_layout() {
        let tmp = tempfile::TempDir::new().unwrap();
        let target = WatchTarget::resolve(&tmp.path().join("img.png")).unwrap();

        assert_eq!(target.temp_name(1), "img~1.png");
        assert_eq!(target.temp_name(42), "img~42.png");
    }

    #[test]
    fn test_temp_name_without_extension() {
        let tmp = tempfile::TempDir::new().unwrap();
        let target = WatchTarget::resolve(&tmp.path().join("snapshot")).unwrap();

        assert_eq!(target.temp_name(3), "snapshot~3");
        assert!(target.is_temp_name("snapshot~3"));
        assert!(!target.is_temp_name("snapshot"));
    }

    #[test]
    fn test_is_temp_name_matching() {
        let tmp = tempfile::TempDir::new().unwrap();
        let target = WatchTarget::resolve(&tmp.path().join("img.png")).unwrap();

        assert!(target.is_temp_name("img~1.png"));
        assert!(target.is_temp_name("img~137.png"));

        assert!(!target.is_temp_name("img.png"));
        assert!(!target.is_temp_name("img~.png"));
        assert!(!target.is_temp_name("img~1.jpg"));
        assert!(!target.is_temp_name("logo~1.png"));
    }

    #[test]
    fn test_shared_image_ref_roundtrip() {
        let image_ref = SharedImageRef::empty();
        assert_eq!(image_ref.path(), None);

        image_ref.set_path(Path::new("/tmp/a.png")).unwrap();
        assert_eq!(image_ref.path(), Some(PathBuf::from("/tmp/a.png")));
    }

    #[tokio::test]
    async fn test_open_fails_soft_without_path() {
        let image_ref = Arc::new(SharedImageRef::empty());
        let err = ImageWatch::open(WatchConfig::default(), image_ref).unwrap_err();
        assert!(matches!(err, Error::Resolution(_)));
    }

    #[tokio::test]
    async fn test_open_takes_path_from_image_ref() {
        let tmp = tempfile::TempDir::new().unwrap();
        let image = tmp.path().join("img.png");
        std::fs::write(&image, b"pixels").unwrap();

        let image_ref = Arc::new(SharedImageRef::new(&image));
        let watch = ImageWatch::open(WatchConfig::default(), image_ref).unwrap();
        assert_eq!(watch.target().absolute, image);
        watch.close().await;
    }
}
