//! Persistence for store state as a TOML file.

use super::{STATE_VERSION, StoreState};
use crate::error::{Error, Result};
use fs2::FileExt;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

/// Load store state from disk.
///
/// Returns an empty `StoreState` if the file doesn't exist.
pub fn load_state(path: &Path) -> Result<StoreState> {
    if !path.exists() {
        return Ok(StoreState::new());
    }

    let content = fs::read_to_string(path)
        .map_err(|e| Error::Store(format!("failed to read {}: {e}", path.display())))?;

    let state: StoreState = toml::from_str(&content)
        .map_err(|e| Error::Store(format!("failed to parse {}: {e}", path.display())))?;

    if state.version > STATE_VERSION {
        return Err(Error::Store(format!(
            "{} was written by a newer version (format {}, supported {STATE_VERSION})",
            path.display(),
            state.version
        )));
    }

    Ok(state)
}

/// How a [`StateLock`] is held
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Readers; any number at once
    Shared,
    /// A read-modify-write cycle
    Exclusive,
}

/// Advisory lock on a state file, shared by every process using it
///
/// Held on `<state file>.lock` so the state file itself can be replaced by
/// rename. Released on drop.
#[derive(Debug)]
pub struct StateLock {
    _file: File,
}

impl StateLock {
    /// Block until the lock for `path` is held in `mode`
    pub fn acquire(path: &Path, mode: LockMode) -> Result<Self> {
        ensure_parent(path)?;
        let lock_path = lock_path(path);
        let file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| Error::Store(format!("failed to open {}: {e}", lock_path.display())))?;

        let locked = match mode {
            LockMode::Shared => FileExt::lock_shared(&file),
            LockMode::Exclusive => FileExt::lock_exclusive(&file),
        };
        locked.map_err(|e| Error::Store(format!("failed to lock {}: {e}", lock_path.display())))?;

        Ok(Self { _file: file })
    }
}

fn lock_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty())
        && !dir.exists()
    {
        fs::create_dir_all(dir)
            .map_err(|e| Error::Store(format!("failed to create {}: {e}", dir.display())))?;
    }
    Ok(())
}

/// Save store state to disk.
///
/// Creates the parent directory if it doesn't exist. The file is written
/// next to its final location and renamed into place.
pub fn save_state(path: &Path, state: &StoreState) -> Result<()> {
    ensure_parent(path)?;

    // Serialize with version
    let mut state_to_save = state.clone();
    state_to_save.version = STATE_VERSION;

    let content = toml::to_string_pretty(&state_to_save)
        .map_err(|e| Error::Store(format!("failed to serialize store state: {e}")))?;

    let content_with_header = format!(
        "# pr-shepherd state\n# Auto-generated - edit only while the scheduler is stopped\n\n{content}"
    );

    let tmp = path.with_extension("toml.tmp");
    fs::write(&tmp, content_with_header)
        .map_err(|e| Error::Store(format!("failed to write {}: {e}", tmp.display())))?;
    fs::rename(&tmp, path)
        .map_err(|e| Error::Store(format!("failed to replace {}: {e}", path.display())))?;

    Ok(())
}
