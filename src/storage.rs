use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use rollcall_devices::SensorSlot;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;

use crate::identity::{Identity, IdentityUpdate};

const STORE_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("identity store {path} unavailable: {message}")]
    Unavailable { path: PathBuf, message: String },

    #[error("failed to write identity store {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to encode identity store: {0}")]
    Encode(#[from] postcard::Error),

    #[error("invalid identity id '{0}'")]
    InvalidIdentityId(String),

    #[error("face template for '{0}' contains non-finite values")]
    InvalidTemplate(String),
}

#[derive(Deserialize)]
struct StoreFile {
    version: u32,
    identities: BTreeMap<String, Identity>,
}

#[derive(Serialize)]
struct StoreFileRef<'a> {
    version: u32,
    identities: &'a BTreeMap<String, Identity>,
}

/// Enrolled identities keyed by `identity_id`, persisted as one file that is
/// replaced wholesale on every change.
#[derive(Debug)]
pub struct IdentityStore {
    path: PathBuf,
    identities: BTreeMap<String, Identity>,
}

impl IdentityStore {
    /// Reads the store at `path`. A missing file is a first run and yields an empty store.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let unavailable = |message: String| StoreError::Unavailable {
            path: path.to_path_buf(),
            message,
        };

        if !path.exists() {
            log::info!("no identity store at {}, starting empty", path.display());
            return Ok(Self {
                path: path.to_path_buf(),
                identities: BTreeMap::new(),
            });
        }

        let data = fs::read(path).map_err(|e| unavailable(e.to_string()))?;
        let file: StoreFile =
            postcard::from_bytes(&data).map_err(|e| unavailable(format!("decode: {}", e)))?;
        if file.version != STORE_VERSION {
            return Err(unavailable(format!(
                "unsupported store version {}",
                file.version
            )));
        }

        log::debug!(
            "loaded {} identities from {}",
            file.identities.len(),
            path.display()
        );
        Ok(Self {
            path: path.to_path_buf(),
            identities: file.identities,
        })
    }

    /// Creates or merges into `identity_id` and persists the whole store. The
    /// in-memory copy only changes once the file has been replaced.
    pub fn upsert(
        &mut self,
        identity_id: &str,
        update: IdentityUpdate,
    ) -> Result<&Identity, StoreError> {
        if identity_id.is_empty() || identity_id.trim() != identity_id {
            return Err(StoreError::InvalidIdentityId(identity_id.to_string()));
        }
        if let Some(face) = &update.face_template {
            if face.values.iter().any(|v| !v.is_finite()) {
                return Err(StoreError::InvalidTemplate(identity_id.to_string()));
            }
        }

        let mut next = self.identities.clone();

        if let Some(slot) = update.fingerprint_slot {
            for other in next.values_mut() {
                if other.identity_id != identity_id && other.fingerprint_slot == Some(slot) {
                    log::warn!(
                        "sensor slot {} moved from {} to {}",
                        slot,
                        other.identity_id,
                        identity_id
                    );
                    other.fingerprint_slot = None;
                }
            }
        }

        next.entry(identity_id.to_string())
            .or_insert_with(|| Identity::new(identity_id, identity_id))
            .merge(update);

        write_store(&self.path, &next)?;
        self.identities = next;

        self.identities
            .get(identity_id)
            .ok_or_else(|| StoreError::InvalidIdentityId(identity_id.to_string()))
    }

    #[cfg(test)]
    pub(crate) fn from_identities(path: PathBuf, identities: BTreeMap<String, Identity>) -> Self {
        Self { path, identities }
    }

    /// Every identity, in key order. Matchers scan this.
    pub fn all(&self) -> &BTreeMap<String, Identity> {
        &self.identities
    }

    pub fn get(&self, identity_id: &str) -> Option<&Identity> {
        self.identities.get(identity_id)
    }

    pub fn find_by_slot(&self, slot: SensorSlot) -> Option<&Identity> {
        self.identities
            .values()
            .find(|identity| identity.fingerprint_slot == Some(slot))
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn write_store(path: &Path, identities: &BTreeMap<String, Identity>) -> Result<(), StoreError> {
    let write_err = |source: io::Error| StoreError::Write {
        path: path.to_path_buf(),
        source,
    };

    let data = postcard::to_allocvec(&StoreFileRef {
        version: STORE_VERSION,
        identities,
    })?;

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(write_err)?;

    let mut tmp = NamedTempFile::new_in(parent).map_err(write_err)?;
    tmp.write_all(&data).map_err(write_err)?;
    tmp.flush().map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}
