//! Ledger persistence with file locking.
//!
//! A [`Store`] hands out the in-memory [`Ledger`] and commits it on
//! [`Store::save`]. [`JsonStore`] keeps the ledger in a single JSON file,
//! written atomically; [`MemoryStore`] keeps nothing on disk.

use crate::{Error, Ledger, Result};
use fs2::FileExt;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Record store holding the ledger
pub trait Store {
    fn ledger(&self) -> &Ledger;
    fn ledger_mut(&mut self) -> &mut Ledger;

    /// Commit the current ledger
    fn save(&mut self) -> Result<()>;
}

/// Store that never touches disk
#[derive(Debug, Default)]
pub struct MemoryStore {
    ledger: Ledger,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ledger(ledger: Ledger) -> Self {
        Self { ledger }
    }
}

impl Store for MemoryStore {
    fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    fn ledger_mut(&mut self) -> &mut Ledger {
        &mut self.ledger
    }

    fn save(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Ledger stored as JSON at a fixed path
#[derive(Debug)]
pub struct JsonStore {
    path: PathBuf,
    ledger: Ledger,
}

impl JsonStore {
    /// Open the ledger at `path` with a shared lock
    ///
    /// A missing file yields an empty ledger. A file that exists but cannot
    /// be parsed is an error so that a later save never overwrites it.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let ledger = load_ledger(&path)?;
        Ok(Self { path, ledger })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Store for JsonStore {
    fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    fn ledger_mut(&mut self) -> &mut Ledger {
        &mut self.ledger
    }

    fn save(&mut self) -> Result<()> {
        save_ledger(&self.ledger, &self.path)
            .map_err(|e| Error::Store(format!("failed to save {:?}: {}", self.path, e)))
    }
}

fn load_ledger(path: &Path) -> Result<Ledger> {
    if !path.exists() {
        tracing::info!("No ledger file at {:?}, starting empty", path);
        return Ok(Ledger::default());
    }

    let file = File::open(path)?;

    // Acquire shared lock for reading
    file.lock_shared()?;

    let mut contents = String::new();
    let mut reader = std::io::BufReader::new(&file);
    let read = reader.read_to_string(&mut contents);
    file.unlock()?;
    read?;

    if contents.trim().is_empty() {
        tracing::warn!("Ledger file {:?} is empty, starting empty", path);
        return Ok(Ledger::default());
    }

    let ledger: Ledger = serde_json::from_str(&contents)?;
    tracing::debug!(
        "Loaded ledger from {:?}: {} workouts, {} sessions, {} sets",
        path,
        ledger.workout_count(),
        ledger.session_count(),
        ledger.set_count()
    );
    Ok(ledger)
}

/// Atomically write the ledger by writing a temp file, syncing it, and
/// renaming it over the original
fn save_ledger(ledger: &Ledger, path: &Path) -> Result<()> {
    let parent = path.parent().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::Other, "ledger path missing parent")
    })?;
    std::fs::create_dir_all(parent)?;

    let temp = NamedTempFile::new_in(parent)?;

    // Exclusive lock on the temp file serializes concurrent writers
    temp.as_file().lock_exclusive()?;

    {
        let mut writer = std::io::BufWriter::new(temp.as_file());
        let contents = serde_json::to_string(ledger)?;
        writer.write_all(contents.as_bytes())?;
        writer.flush()?;
    }

    temp.as_file().sync_all()?;
    temp.as_file().unlock()?;

    temp.persist(path).map_err(|e| Error::Io(e.error))?;

    tracing::debug!("Saved ledger to {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ExerciseCategory;

    #[test]
    fn test_save_and_open_roundtrip() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("ledger.json");

        let mut store = JsonStore::open(&path).unwrap();
        let workout = store.ledger_mut().create_workout("Push Day");
        store
            .ledger_mut()
            .create_exercise(workout, "Bench", ExerciseCategory::Chest, "pause reps")
            .unwrap();
        store.save().unwrap();

        let reopened = JsonStore::open(&path).unwrap();
        assert_eq!(reopened.ledger(), store.ledger());
        let bench = reopened.ledger().find_exercise(workout, "Bench").unwrap();
        assert_eq!(bench.note, "pause reps");
    }

    #[test]
    fn test_open_nonexistent_is_empty() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = JsonStore::open(temp_dir.path().join("missing.json")).unwrap();
        assert!(store.ledger().is_empty());
    }

    #[test]
    fn test_corrupted_ledger_is_an_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("ledger.json");
        std::fs::write(&path, "{ invalid json }").unwrap();

        let result = JsonStore::open(&path);
        assert!(matches!(result, Err(Error::Json(_))));
        // The damaged file is left alone for manual recovery
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{ invalid json }");
    }

    #[test]
    fn test_atomic_save_leaves_no_temp_files() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("ledger.json");

        let mut store = JsonStore::open(&path).unwrap();
        store.save().unwrap();

        assert!(path.exists());
        let extras: Vec<_> = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name() != "ledger.json")
            .collect();
        assert!(
            extras.is_empty(),
            "Expected only ledger.json, found extras: {:?}",
            extras
        );
    }

    #[test]
    fn test_save_failure_is_store_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        // A directory where the file should be makes the rename fail
        let path = temp_dir.path().join("ledger.json");
        std::fs::create_dir_all(path.join("blocker")).unwrap();

        let mut store = JsonStore {
            path: path.clone(),
            ledger: Ledger::default(),
        };
        assert!(matches!(store.save(), Err(Error::Store(_))));
    }
}
