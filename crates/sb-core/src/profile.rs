//! Saved connection profiles and key records
//!
//! Profiles and keys live in an external key-value store that only knows how
//! to get and set opaque blobs. The relay itself never touches the store; the
//! front end resolves a profile and its key before sending `connect`.

use std::collections::HashMap;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;

use dashmap::DashMap;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tempfile::NamedTempFile;
use uuid::Uuid;

use crate::error::StoreError;

/// Store key holding the serialized profile list
pub const PROFILES_KEY: &str = "SSH_CONNECTIONS";

/// Store key holding the serialized key records
pub const KEYS_KEY: &str = "SSH_KEYS";

/// Caller-generated identifier of a profile or key record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProfileId(Uuid);

impl ProfileId {
    /// Generate a fresh random id
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ProfileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ProfileId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

fn default_ssh_port() -> u16 {
    22
}

/// Saved connection target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionProfile {
    #[serde(rename = "uuid")]
    pub id: ProfileId,
    /// Display name
    pub name: String,
    /// Hostname or IP address
    pub address: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    pub username: String,
    /// Key record used to authenticate
    #[serde(default, rename = "sshKeyUuid", skip_serializing_if = "Option::is_none")]
    pub key_id: Option<ProfileId>,
}

impl ConnectionProfile {
    /// Create a profile with a fresh id and the default port
    pub fn new(
        name: impl Into<String>,
        address: impl Into<String>,
        username: impl Into<String>,
    ) -> Self {
        Self {
            id: ProfileId::generate(),
            name: name.into(),
            address: address.into(),
            port: default_ssh_port(),
            username: username.into(),
            key_id: None,
        }
    }
}

/// Stored private key
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyRecord {
    #[serde(rename = "uuid")]
    pub id: ProfileId,
    pub private_key: String,
}

impl KeyRecord {
    /// Create a record with a fresh id
    pub fn new(private_key: impl Into<String>) -> Self {
        Self {
            id: ProfileId::generate(),
            private_key: private_key.into(),
        }
    }
}

impl fmt::Debug for KeyRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyRecord")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

/// Opaque blob storage keyed by string
pub trait ProfileStore: Send + Sync {
    /// Get the blob stored under `key`
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Store `blob` under `key`, replacing any previous value
    fn set(&self, key: &str, blob: &str) -> Result<(), StoreError>;
}

fn load_json<T: DeserializeOwned + Default>(
    store: &dyn ProfileStore,
    key: &str,
) -> Result<T, StoreError> {
    match store.get(key)? {
        Some(blob) => serde_json::from_str(&blob).map_err(|source| StoreError::Corrupt {
            key: key.to_string(),
            source,
        }),
        None => Ok(T::default()),
    }
}

fn save_json<T: Serialize + ?Sized>(
    store: &dyn ProfileStore,
    key: &str,
    value: &T,
) -> Result<(), StoreError> {
    let blob = serde_json::to_string(value)?;
    store.set(key, &blob)
}

/// Load all saved profiles, empty when none were saved yet
pub fn load_profiles(store: &dyn ProfileStore) -> Result<Vec<ConnectionProfile>, StoreError> {
    load_json(store, PROFILES_KEY)
}

/// Replace the saved profile list
pub fn save_profiles(
    store: &dyn ProfileStore,
    profiles: &[ConnectionProfile],
) -> Result<(), StoreError> {
    save_json(store, PROFILES_KEY, profiles)
}

/// Load all saved key records
pub fn load_keys(store: &dyn ProfileStore) -> Result<Vec<KeyRecord>, StoreError> {
    load_json(store, KEYS_KEY)
}

/// Replace the saved key records
pub fn save_keys(store: &dyn ProfileStore, keys: &[KeyRecord]) -> Result<(), StoreError> {
    save_json(store, KEYS_KEY, keys)
}

/// Look up the key record a profile refers to
pub fn key_for_profile(
    store: &dyn ProfileStore,
    profile: &ConnectionProfile,
) -> Result<Option<KeyRecord>, StoreError> {
    let Some(key_id) = profile.key_id else {
        return Ok(None);
    };
    Ok(load_keys(store)?.into_iter().find(|k| k.id == key_id))
}

/// In-memory store
#[derive(Debug, Default)]
pub struct MemoryProfileStore {
    blobs: DashMap<String, String>,
}

impl MemoryProfileStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProfileStore for MemoryProfileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.blobs.get(key).map(|blob| blob.value().clone()))
    }

    fn set(&self, key: &str, blob: &str) -> Result<(), StoreError> {
        self.blobs.insert(key.to_string(), blob.to_string());
        Ok(())
    }
}

/// Store persisted as one JSON object file mapping keys to blobs
#[derive(Debug)]
pub struct FileProfileStore {
    path: PathBuf,
    // Serializes read-modify-write cycles
    write_lock: Mutex<()>,
}

impl FileProfileStore {
    /// Open a store backed by `path`; the file is created on first write
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<HashMap<String, String>, StoreError> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let content = std::fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(HashMap::new());
        }
        serde_json::from_str(&content).map_err(|source| StoreError::Corrupt {
            key: self.path.display().to_string(),
            source,
        })
    }
}

impl ProfileStore for FileProfileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, key: &str, blob: &str) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        let mut blobs = self.read_all()?;
        blobs.insert(key.to_string(), blob.to_string());

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;

        // Staged in the same directory so the final rename is atomic
        let mut staged = NamedTempFile::new_in(dir)?;
        staged.write_all(serde_json::to_string_pretty(&blobs)?.as_bytes())?;
        staged.as_file().sync_all()?;
        staged.persist(&self.path).map_err(|e| e.error)?;

        tracing::debug!("Saved store entry {} to {:?}", key, self.path);
        Ok(())
    }
}
