//! Credential persistence.
//!
//! A store holds at most one [`Credentials`] record and writes it as a single
//! unit, so readers see either the previous record or the new one.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use age::secrecy::ExposeSecret;
use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::credentials::Credentials;
use crate::error::{AuthError, Result};

/// Encrypted credentials file within the data directory.
pub const CREDENTIALS_FILE: &str = "credentials.age";

/// age identity used to encrypt [`CREDENTIALS_FILE`].
pub const IDENTITY_FILE: &str = "identity.txt";

// ============================================================================
// TokenStore Trait
// ============================================================================

/// Secure storage for the credential record.
#[async_trait]
pub trait TokenStore: Send + Sync + std::fmt::Debug {
    /// Persist the record, replacing any previous one.
    async fn save(&self, credentials: &Credentials) -> Result<()>;

    /// Load the record. `None` when never saved or cleared.
    async fn load(&self) -> Result<Option<Credentials>>;

    /// Delete the record. Clearing an empty store is not an error.
    async fn clear(&self) -> Result<()>;
}

/// Shared token store for use across async contexts.
pub type SharedTokenStore = Arc<dyn TokenStore>;

/// Which backend holds the credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreKind {
    /// age-encrypted file in the data directory.
    #[default]
    File,
    /// OS keyring (requires the `keyring` feature).
    Keyring,
}

/// Open the configured store.
pub fn open_store(kind: StoreKind, data_dir: &Path) -> Result<SharedTokenStore> {
    match kind {
        StoreKind::File => Ok(Arc::new(EncryptedFileStore::new(data_dir))),
        #[cfg(feature = "keyring")]
        StoreKind::Keyring => Ok(Arc::new(KeyringStore::new())),
        #[cfg(not(feature = "keyring"))]
        StoreKind::Keyring => Err(AuthError::Config(
            "keyring support not compiled in (enable the 'keyring' feature)".to_string(),
        )),
    }
}

// ============================================================================
// EncryptedFileStore
// ============================================================================

/// File-based store encrypting the record with an age X25519 identity.
///
/// The identity is generated on first save and kept next to the ciphertext
/// with owner-only permissions.
#[derive(Debug)]
pub struct EncryptedFileStore {
    credentials_path: PathBuf,
    identity_path: PathBuf,
    write_lock: parking_lot::Mutex<()>,
}

impl EncryptedFileStore {
    /// Create a store rooted at `data_dir`.
    pub fn new(data_dir: &Path) -> Self {
        Self {
            credentials_path: data_dir.join(CREDENTIALS_FILE),
            identity_path: data_dir.join(IDENTITY_FILE),
            write_lock: parking_lot::Mutex::new(()),
        }
    }

    /// Get the credentials file path.
    pub fn credentials_path(&self) -> &Path {
        &self.credentials_path
    }

    fn read_identity(&self) -> Result<Option<age::x25519::Identity>> {
        let contents = match std::fs::read_to_string(&self.identity_path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(AuthError::Storage(format!(
                    "Failed to read identity file: {}",
                    e
                )));
            }
        };

        let line = contents
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty() && !l.starts_with('#'))
            .ok_or_else(|| AuthError::Storage("Identity file is empty".to_string()))?;

        age::x25519::Identity::from_str(line)
            .map(Some)
            .map_err(|e| AuthError::Storage(format!("Invalid identity file: {}", e)))
    }

    fn load_or_create_identity(&self) -> Result<age::x25519::Identity> {
        if let Some(identity) = self.read_identity()? {
            return Ok(identity);
        }

        let identity = age::x25519::Identity::generate();
        let contents = format!(
            "# intra credential key\n{}\n",
            identity.to_string().expose_secret()
        );

        // First writer to link wins; later writers adopt its key.
        let tmp_path = temp_sibling(&self.identity_path);
        write_private(&tmp_path, contents.as_bytes())?;
        let published = std::fs::hard_link(&tmp_path, &self.identity_path);
        let _ = std::fs::remove_file(&tmp_path);

        match published {
            Ok(()) => {
                tracing::debug!(path = %self.identity_path.display(), "Generated credential identity");
                Ok(identity)
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                tracing::debug!("Another writer created the credential identity first");
                self.read_identity()?.ok_or_else(|| {
                    AuthError::Storage("Identity file disappeared while saving".to_string())
                })
            }
            Err(e) => Err(AuthError::Storage(format!(
                "Failed to create identity file: {}",
                e
            ))),
        }
    }

    fn ensure_dir(&self) -> Result<()> {
        if let Some(parent) = self.credentials_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AuthError::Storage(format!("Failed to create data directory: {}", e))
            })?;
        }
        Ok(())
    }
}

#[async_trait]
impl TokenStore for EncryptedFileStore {
    async fn save(&self, credentials: &Credentials) -> Result<()> {
        let _guard = self.write_lock.lock();
        self.ensure_dir()?;

        let identity = self.load_or_create_identity()?;
        let json = serde_json::to_vec(credentials)
            .map_err(|e| AuthError::Storage(format!("Failed to serialize credentials: {}", e)))?;
        let ciphertext = age::encrypt(&identity.to_public(), &json)
            .map_err(|e| AuthError::Storage(format!("Failed to encrypt credentials: {}", e)))?;

        let tmp_path = temp_sibling(&self.credentials_path);
        write_private(&tmp_path, &ciphertext)?;
        std::fs::rename(&tmp_path, &self.credentials_path).map_err(|e| {
            let _ = std::fs::remove_file(&tmp_path);
            AuthError::Storage(format!("Failed to replace credentials file: {}", e))
        })?;

        tracing::debug!(path = %self.credentials_path.display(), "Credentials saved");
        Ok(())
    }

    async fn load(&self) -> Result<Option<Credentials>> {
        let ciphertext = match std::fs::read(&self.credentials_path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(AuthError::Storage(format!(
                    "Failed to read credentials file: {}",
                    e
                )));
            }
        };

        let identity = self.read_identity()?.ok_or_else(|| {
            AuthError::Storage("Credentials present but identity file is missing".to_string())
        })?;
        let plaintext = age::decrypt(&identity, &ciphertext)
            .map_err(|e| AuthError::Storage(format!("Failed to decrypt credentials: {}", e)))?;
        let credentials = serde_json::from_slice(&plaintext)
            .map_err(|e| AuthError::Storage(format!("Failed to parse credentials: {}", e)))?;

        Ok(Some(credentials))
    }

    async fn clear(&self) -> Result<()> {
        let _guard = self.write_lock.lock();
        match std::fs::remove_file(&self.credentials_path) {
            Ok(()) => {
                tracing::debug!(path = %self.credentials_path.display(), "Credentials removed");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AuthError::Storage(format!(
                "Failed to delete credentials file: {}",
                e
            ))),
        }
    }
}

/// Unique scratch path next to `path`, for write-then-publish.
fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(
        ".{}.{}.{:08x}.tmp",
        name,
        std::process::id(),
        rand::random::<u32>()
    ))
}

/// Write a file readable only by the current user.
fn write_private(path: &Path, contents: &[u8]) -> Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options
        .open(path)
        .map_err(|e| AuthError::Storage(format!("Failed to open {}: {}", path.display(), e)))?;
    file.write_all(contents)
        .and_then(|()| file.sync_all())
        .map_err(|e| AuthError::Storage(format!("Failed to write {}: {}", path.display(), e)))
}

// ============================================================================
// KeyringStore
// ============================================================================

/// Keyring service name.
#[cfg(feature = "keyring")]
const KEYRING_SERVICE: &str = "intra";

/// Keyring user name holding the serialized record.
#[cfg(feature = "keyring")]
const KEYRING_USER: &str = "credentials";

/// OS keyring store (macOS Keychain, Linux secret-service, Windows
/// Credential Manager). The record is kept as one JSON secret.
#[cfg(feature = "keyring")]
#[derive(Debug, Default)]
pub struct KeyringStore;

#[cfg(feature = "keyring")]
impl KeyringStore {
    pub fn new() -> Self {
        Self
    }

    fn entry() -> Result<keyring::Entry> {
        keyring::Entry::new(KEYRING_SERVICE, KEYRING_USER)
            .map_err(|e| AuthError::Storage(format!("keyring error: {}", e)))
    }
}

#[cfg(feature = "keyring")]
#[async_trait]
impl TokenStore for KeyringStore {
    async fn save(&self, credentials: &Credentials) -> Result<()> {
        let json = serde_json::to_string(credentials)
            .map_err(|e| AuthError::Storage(format!("Failed to serialize credentials: {}", e)))?;
        Self::entry()?
            .set_password(&json)
            .map_err(|e| AuthError::Storage(format!("failed to store in keyring: {}", e)))
    }

    async fn load(&self) -> Result<Option<Credentials>> {
        match Self::entry()?.get_password() {
            Ok(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|e| AuthError::Storage(format!("Failed to parse credentials: {}", e))),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(AuthError::Storage(format!("failed to read keyring: {}", e))),
        }
    }

    async fn clear(&self) -> Result<()> {
        match Self::entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(AuthError::Storage(format!(
                "failed to delete from keyring: {}",
                e
            ))),
        }
    }
}

// ============================================================================
// MemoryStore
// ============================================================================

/// In-memory store for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryStore {
    credentials: RwLock<Option<Credentials>>,
    saves: std::sync::atomic::AtomicU32,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credentials(credentials: Credentials) -> Self {
        Self {
            credentials: RwLock::new(Some(credentials)),
            saves: std::sync::atomic::AtomicU32::new(0),
        }
    }

    /// Number of successful `save` calls.
    pub fn save_count(&self) -> u32 {
        self.saves.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn save(&self, credentials: &Credentials) -> Result<()> {
        *self.credentials.write().await = Some(credentials.clone());
        self.saves.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    }

    async fn load(&self) -> Result<Option<Credentials>> {
        Ok(self.credentials.read().await.clone())
    }

    async fn clear(&self) -> Result<()> {
        *self.credentials.write().await = None;
        Ok(())
    }
}
