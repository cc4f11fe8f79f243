//! Durable, file-backed failure counter store.
//!
//! Each protector gets its own small text file holding the decimal counter.
//! Writes go to a temporary file which is synced, renamed over the old file,
//! and then the directory itself is synced, so that a counter increment is
//! on stable storage before the failure is shown to the user. Directories
//! created on the first write are synced into their parents as well.

use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};

use crate::error::{LimiterError, Result};
use crate::ratelimit::{CounterStore, LskfIdentifier};

const COUNTER_EXTENSION: &str = "failures";
const TEMP_EXTENSION: &str = "failures.tmp";

/// Failure counters stored as one file per protector under a directory.
#[derive(Debug, Clone)]
pub struct FileCounterStore {
    dir: PathBuf,
}

impl FileCounterStore {
    /// Create a store rooted at `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The directory holding the counter files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &LskfIdentifier) -> PathBuf {
        self.dir.join(format!(
            "{}_{:016x}.{}",
            id.user_id, id.protector_id, COUNTER_EXTENSION
        ))
    }

    /// Create the counter directory if needed and make every newly created
    /// component durable in its parent.
    fn ensure_dir(&self) -> Result<()> {
        if self.dir.is_dir() {
            return Ok(());
        }

        let mut missing = Vec::new();
        let mut current = Some(self.dir.as_path());
        while let Some(dir) = current.filter(|d| !d.as_os_str().is_empty() && !d.exists()) {
            missing.push(dir);
            current = dir.parent();
        }

        fs::create_dir_all(&self.dir)?;
        for dir in missing.into_iter().rev() {
            let parent = match dir.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent,
                _ => Path::new("."),
            };
            sync_dir(parent)?;
            debug!(dir = %dir.display(), "Created counter directory");
        }
        Ok(())
    }

    /// Every readable persisted counter, ordered by identifier.
    ///
    /// Corrupt counter files are logged and skipped so that the rest can
    /// still be listed.
    pub fn entries(&self) -> Result<Vec<(LskfIdentifier, u32)>> {
        let dir = match fs::read_dir(&self.dir) {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        for entry in dir {
            let path = entry?.path();
            let Some(id) = parse_file_name(&path) else {
                continue;
            };
            match self.read(&id) {
                Ok(count) => entries.push((id, count)),
                Err(LimiterError::CorruptCounter { path, contents }) => {
                    warn!(
                        lskf = %id,
                        path = %path.display(),
                        contents = ?contents,
                        "Skipping corrupt failure counter"
                    );
                }
                Err(e) => return Err(e),
            }
        }
        entries.sort_by_key(|(id, _)| *id);
        Ok(entries)
    }

    /// Delete the counter of a protector that no longer exists.
    pub fn remove(&self, id: &LskfIdentifier) -> Result<()> {
        match fs::remove_file(self.path_for(id)) {
            Ok(()) => {
                debug!(lskf = %id, "Removed failure counter");
                sync_dir(&self.dir)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl CounterStore for FileCounterStore {
    fn read(&self, id: &LskfIdentifier) -> Result<u32> {
        let path = self.path_for(id);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        contents
            .trim()
            .parse()
            .map_err(|_| LimiterError::CorruptCounter { path, contents })
    }

    fn write(&self, id: &LskfIdentifier, count: u32) -> Result<()> {
        self.ensure_dir()?;

        let path = self.path_for(id);
        let temp = path.with_extension(TEMP_EXTENSION);
        {
            let mut file = File::create(&temp)?;
            writeln!(file, "{}", count)?;
            file.sync_all()?;
        }
        fs::rename(&temp, &path)?;
        sync_dir(&self.dir)?;

        trace!(lskf = %id, count = count, path = %path.display(), "Wrote failure counter");
        Ok(())
    }
}

/// Make a rename or removal inside `dir` durable.
#[cfg(unix)]
fn sync_dir(dir: &Path) -> Result<()> {
    File::open(dir)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> Result<()> {
    Ok(())
}

/// Parse `<user>_<protector hex>.failures` back into an identifier.
fn parse_file_name(path: &Path) -> Option<LskfIdentifier> {
    if path.extension()? != COUNTER_EXTENSION {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    let (user, protector) = stem.split_once('_')?;
    Some(LskfIdentifier::new(
        user.parse().ok()?,
        u64::from_str_radix(protector, 16).ok()?,
    ))
}
