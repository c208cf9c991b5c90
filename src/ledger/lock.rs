//! Ledger lock providers.
//!
//! `LockProvider::try_acquire` / `LedgerHandle::release` wrap the exclusive file lock so
//! the ledger state machine can run against real files (`FsLockProvider`, advisory locks
//! via `fs2`) or against an in-memory fake (`MemoryLockProvider`).

use crate::error::LedgerError;
use fs2::FileExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// An open, exclusively locked ledger file.
pub trait LedgerHandle: Send {
    /// Replace the file contents through the held handle.
    fn write_record(&mut self, bytes: &[u8]) -> Result<(), LedgerError>;

    /// Read the current contents back through the held handle.
    fn read_back(&mut self) -> Result<Vec<u8>, LedgerError>;

    /// Unlock and close.
    fn release(self: Box<Self>) -> Result<(), LedgerError>;
}

pub trait LockProvider: Send + Sync {
    /// Open and exclusively lock `path`. `Ok(None)` when another holder has it.
    fn try_acquire(&self, path: &Path) -> Result<Option<Box<dyn LedgerHandle>>, LedgerError>;

    /// Replace the contents of `path` without taking the lock.
    fn write_unlocked(&self, path: &Path, bytes: &[u8]) -> Result<(), LedgerError>;

    /// Current contents, `None` if the file does not exist.
    fn read(&self, path: &Path) -> Result<Option<Vec<u8>>, LedgerError>;

    /// Non-blocking probe: is an exclusive lock currently held on `path`?
    fn is_locked(&self, path: &Path) -> Result<bool, LedgerError>;
}

fn is_contended(err: &std::io::Error) -> bool {
    err.kind() == ErrorKind::WouldBlock
        || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

#[derive(Debug, Default, Clone, Copy)]
pub struct FsLockProvider;

struct FsLedgerHandle {
    file: File,
}

impl LedgerHandle for FsLedgerHandle {
    fn write_record(&mut self, bytes: &[u8]) -> Result<(), LedgerError> {
        self.file.set_len(0)?;
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(bytes)?;
        self.file.sync_data()?;
        Ok(())
    }

    fn read_back(&mut self) -> Result<Vec<u8>, LedgerError> {
        self.file.seek(SeekFrom::Start(0))?;
        let mut bytes = Vec::new();
        self.file.read_to_end(&mut bytes)?;
        Ok(bytes)
    }

    fn release(self: Box<Self>) -> Result<(), LedgerError> {
        FileExt::unlock(&self.file)?;
        Ok(())
    }
}

impl LockProvider for FsLockProvider {
    fn try_acquire(&self, path: &Path) -> Result<Option<Box<dyn LedgerHandle>>, LedgerError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => Ok(Some(Box::new(FsLedgerHandle { file }))),
            Err(e) if is_contended(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write_unlocked(&self, path: &Path, bytes: &[u8]) -> Result<(), LedgerError> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "ledger".to_string());
        let temp = dir.join(format!(".{name}.tmp"));
        fs::write(&temp, bytes)?;
        fs::rename(&temp, path)?;
        Ok(())
    }

    fn read(&self, path: &Path) -> Result<Option<Vec<u8>>, LedgerError> {
        match fs::read(path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn is_locked(&self, path: &Path) -> Result<bool, LedgerError> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        match FileExt::try_lock_shared(&file) {
            Ok(()) => {
                FileExt::unlock(&file)?;
                Ok(false)
            }
            Err(e) if is_contended(&e) => Ok(true),
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Debug, Default)]
struct MemoryFile {
    bytes: Vec<u8>,
    locked: bool,
}

/// In-memory lock provider for exercising the ledger without real files.
#[derive(Debug, Default, Clone)]
pub struct MemoryLockProvider {
    files: Arc<Mutex<HashMap<PathBuf, MemoryFile>>>,
}

impl MemoryLockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw contents for assertions.
    pub fn contents(&self, path: &Path) -> Option<Vec<u8>> {
        self.files.lock().get(path).map(|f| f.bytes.clone())
    }
}

struct MemoryLedgerHandle {
    files: Arc<Mutex<HashMap<PathBuf, MemoryFile>>>,
    path: PathBuf,
}

impl LedgerHandle for MemoryLedgerHandle {
    fn write_record(&mut self, bytes: &[u8]) -> Result<(), LedgerError> {
        let mut files = self.files.lock();
        let file = files.entry(self.path.clone()).or_default();
        file.bytes = bytes.to_vec();
        Ok(())
    }

    fn read_back(&mut self) -> Result<Vec<u8>, LedgerError> {
        Ok(self
            .files
            .lock()
            .get(&self.path)
            .map(|f| f.bytes.clone())
            .unwrap_or_default())
    }

    fn release(self: Box<Self>) -> Result<(), LedgerError> {
        if let Some(file) = self.files.lock().get_mut(&self.path) {
            file.locked = false;
        }
        Ok(())
    }
}

impl LockProvider for MemoryLockProvider {
    fn try_acquire(&self, path: &Path) -> Result<Option<Box<dyn LedgerHandle>>, LedgerError> {
        let mut files = self.files.lock();
        let file = files.entry(path.to_path_buf()).or_default();
        if file.locked {
            return Ok(None);
        }
        file.locked = true;
        Ok(Some(Box::new(MemoryLedgerHandle {
            files: Arc::clone(&self.files),
            path: path.to_path_buf(),
        })))
    }

    fn write_unlocked(&self, path: &Path, bytes: &[u8]) -> Result<(), LedgerError> {
        let mut files = self.files.lock();
        let file = files.entry(path.to_path_buf()).or_default();
        if file.locked {
            return Err(LedgerError::Locked(path.to_path_buf()));
        }
        file.bytes = bytes.to_vec();
        Ok(())
    }

    fn read(&self, path: &Path) -> Result<Option<Vec<u8>>, LedgerError> {
        Ok(self.files.lock().get(path).map(|f| f.bytes.clone()))
    }

    fn is_locked(&self, path: &Path) -> Result<bool, LedgerError> {
        Ok(self.files.lock().get(path).map(|f| f.locked).unwrap_or(false))
    }
}
