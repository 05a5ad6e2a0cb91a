//! Temporary-copy swap action
//!
//! Viewers cache the image they were given, so an in-place overwrite of
//! the watched file is not enough to make them reload. Each refresh
//! cycle instead copies the file under a fresh numbered name and
//! repoints the image reference at the copy. All numbered copies are
//! disposable: they are swept before every copy and again at session
//! close.

use crate::{Error, ImageRef, WatchTarget};
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// One refresh cycle's worth of work: sweep, copy, repoint.
pub(crate) struct RefreshAction {
    target: WatchTarget,

    /// Directory receiving the numbered copies
    output_dir: PathBuf,

    /// Next copy suffix; starts at 1, advances only on a fully
    /// successful cycle, never reused within a session
    counter: AtomicU64,
}

impl RefreshAction {
    pub fn new(target: WatchTarget, output_dir: PathBuf) -> Self {
        Self {
            target,
            output_dir,
            counter: AtomicU64::new(1),
        }
    }

    /// Run one swap cycle. Returns the path of the new copy.
    ///
    /// Only one cycle runs at a time (the debounce gate stays pending
    /// until the cycle ends), so the counter needs no stronger
    /// coordination than the atomic itself.
    pub fn run(&self, image_ref: &dyn ImageRef) -> Result<PathBuf, Error> {
        self.sweep_temp_files();

        let seq = self.counter.load(Ordering::SeqCst);
        let dest = self.output_dir.join(self.target.temp_name(seq));

        fs::copy(&self.target.absolute, &dest).map_err(|source| Error::Io {
            path: self.target.absolute.clone(),
            source,
        })?;

        image_ref.set_path(&dest)?;
        self.counter.store(seq + 1, Ordering::SeqCst);

        debug!(path = %dest.display(), seq, "image reference swapped");
        Ok(dest)
    }

    /// Best-effort removal of every numbered copy for this target.
    ///
    /// Individual failures are logged and skipped; a copy we cannot
    /// delete now will be retried on the next sweep.
    pub fn sweep_temp_files(&self) {
        let entries = match fs::read_dir(&self.output_dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(
                    dir = %self.output_dir.display(),
                    error = %e,
                    "cannot scan output directory for stale copies"
                );
                return;
            }
        };

        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if !self.target.is_temp_name(name) {
                continue;
            }
            if let Err(e) = fs::remove_file(entry.path()) {
                warn!(
                    path = %entry.path().display(),
                    error = %e,
                    "failed to remove stale copy"
                );
            }
        }
    }

    /// Suffix the next successful cycle will use.
    #[cfg(test)]
    pub fn next_seq(&self) -> u64 {
        self.counter.load(Ordering::SeqCst)
    }
}
