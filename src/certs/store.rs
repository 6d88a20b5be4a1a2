//! Persistent certificate store
//!
//! The store follows first-writer-wins semantics: once a bundle is stored,
//! later `set_if_absent` calls are no-ops that hand back the stored bundle.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tracing::{debug, info};

use super::CertificateBundle;
use crate::{Error, Result};

/// File name of the certificate record inside the state directory
pub const CERTIFICATE_FILE: &str = "certificates.json";

/// Durable holder of the webhook certificate bundle
pub trait CertificateStore {
    /// Stored bundle, if any
    fn get(&self) -> Result<Option<CertificateBundle>>;

    /// Store `bundle` unless one is already stored; returns the bundle actually stored
    fn set_if_absent(&self, bundle: CertificateBundle) -> Result<CertificateBundle>;
}

/// Stored bundle, generating and storing one first if the store is empty
///
/// `generate` only runs when the store is empty. If another writer stores a
/// bundle between the read and the write, that bundle wins.
pub fn ensure<S, F>(store: &S, generate: F) -> Result<CertificateBundle>
where
    S: CertificateStore + ?Sized,
    F: FnOnce() -> Result<CertificateBundle>,
{
    if let Some(bundle) = store.get()? {
        debug!("Reusing stored webhook certificates");
        return Ok(bundle);
    }

    let generated = generate()?;
    let stored = store.set_if_absent(generated)?;
    info!("Stored webhook certificates");
    Ok(stored)
}

/// Process-local store
#[derive(Debug, Default)]
pub struct MemoryCertificateStore {
    bundle: Mutex<Option<CertificateBundle>>,
}

impl MemoryCertificateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CertificateStore for MemoryCertificateStore {
    fn get(&self) -> Result<Option<CertificateBundle>> {
        let guard = self
            .bundle
            .lock()
            .map_err(|_| Error::StoreError("certificate store lock poisoned".to_string()))?;
        Ok(guard.clone())
    }

    fn set_if_absent(&self, bundle: CertificateBundle) -> Result<CertificateBundle> {
        let mut guard = self
            .bundle
            .lock()
            .map_err(|_| Error::StoreError("certificate store lock poisoned".to_string()))?;
        Ok(guard.get_or_insert(bundle).clone())
    }
}

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Store backed by a JSON record in the operator's state directory
///
/// The record is written to a temporary file and hard-linked into place, so a
/// reader never observes a partial record and a second writer fails with
/// `AlreadyExists` instead of overwriting.
#[derive(Debug, Clone)]
pub struct FileCertificateStore {
    path: PathBuf,
}

impl FileCertificateStore {
    /// Store keeping its record in `state_dir`
    pub fn new(state_dir: impl AsRef<Path>) -> Self {
        Self {
            path: state_dir.as_ref().join(CERTIFICATE_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<Option<CertificateBundle>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(Error::StoreError(format!(
                    "Failed to read {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        serde_json::from_str(&contents).map(Some).map_err(|e| {
            Error::StoreError(format!("Malformed record {}: {}", self.path.display(), e))
        })
    }

    fn write_tmp(&self, bundle: &CertificateBundle) -> Result<PathBuf> {
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir).map_err(|e| {
            Error::StoreError(format!("Failed to create {}: {}", dir.display(), e))
        })?;

        let tmp = dir.join(format!(
            ".{}.{}.{}.tmp",
            CERTIFICATE_FILE,
            std::process::id(),
            TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        let json = serde_json::to_vec(bundle)
            .map_err(|e| Error::StoreError(format!("Failed to serialize record: {}", e)))?;

        let mut options = fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options
            .open(&tmp)
            .map_err(|e| Error::StoreError(format!("Failed to create {}: {}", tmp.display(), e)))?;
        file.write_all(&json)
            .and_then(|_| file.sync_all())
            .map_err(|e| Error::StoreError(format!("Failed to write {}: {}", tmp.display(), e)))?;

        Ok(tmp)
    }
}

impl CertificateStore for FileCertificateStore {
    fn get(&self) -> Result<Option<CertificateBundle>> {
        self.read()
    }

    fn set_if_absent(&self, bundle: CertificateBundle) -> Result<CertificateBundle> {
        if let Some(existing) = self.read()? {
            return Ok(existing);
        }

        let tmp = self.write_tmp(&bundle)?;
        let linked = fs::hard_link(&tmp, &self.path);
        let _ = fs::remove_file(&tmp);

        match linked {
            Ok(()) => Ok(bundle),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                debug!(path = %self.path.display(), "Certificate record already written");
                self.read()?.ok_or_else(|| {
                    Error::StoreError(format!("{} vanished after write", self.path.display()))
                })
            }
            Err(e) => Err(Error::StoreError(format!(
                "Failed to store {}: {}",
                self.path.display(),
                e
            ))),
        }
    }
}
