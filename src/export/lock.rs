//! Dot-locking for output mailboxes.
//!
//! A mailbox `X.mbox` is locked by creating `X.mbox.lock` exclusively. A
//! lock file left behind by a crashed run makes the next attempt fail with
//! [`ConvertError::Locked`] instead of silently overwriting or waiting.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{ConvertError, Result};

/// A held dot-lock. Released by [`DotLock::release`], or on drop.
#[derive(Debug)]
pub struct DotLock {
    target: PathBuf,
    lock: Option<PathBuf>,
}

impl DotLock {
    /// Lock `target` by creating its `.lock` sibling.
    pub fn acquire(target: &Path) -> Result<Self> {
        let lock = lock_path_for(target);
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&lock) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(ConvertError::Locked {
                    path: target.to_path_buf(),
                    lock,
                });
            }
            Err(e) => return Err(ConvertError::io(&lock, e)),
        };

        if let Err(e) = writeln!(file, "{}", std::process::id()) {
            debug!(lock = %lock.display(), error = %e, "Could not record pid in lock file");
        }
        debug!(path = %target.display(), "Locked mailbox");

        Ok(Self {
            target: target.to_path_buf(),
            lock: Some(lock),
        })
    }

    /// Remove the lock file.
    pub fn release(mut self) -> Result<()> {
        match self.lock.take() {
            Some(lock) => {
                std::fs::remove_file(&lock).map_err(|e| ConvertError::io(&lock, e))?;
                debug!(path = %self.target.display(), "Unlocked mailbox");
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl Drop for DotLock {
    fn drop(&mut self) {
        if let Some(lock) = self.lock.take() {
            if let Err(e) = std::fs::remove_file(&lock) {
                warn!(lock = %lock.display(), error = %e, "Failed to remove lock file");
            }
        }
    }
}

/// `X.mbox` → `X.mbox.lock`.
pub fn lock_path_for(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}
