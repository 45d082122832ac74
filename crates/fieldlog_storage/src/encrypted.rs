//! Encrypted image store wrapper.
//!
//! ## Security Model
//!
//! - Every save encrypts the whole image with a fresh random nonce
//! - Stored layout: `nonce (12 bytes) || ciphertext || tag (16 bytes)`
//! - Uses AES-256-GCM for authenticated encryption
//! - Keys are never stored; the application provides them

use crate::backend::ImageStore;
use crate::error::{StorageError, StorageResult};
use aes_gcm::{
    aead::{generic_array::GenericArray, Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of AES-256 key in bytes.
pub const KEY_SIZE: usize = 32;
/// Size of GCM nonce in bytes.
pub const NONCE_SIZE: usize = 12;
/// Size of GCM authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

/// Encryption key for the encrypted image store.
///
/// The key is zeroized when dropped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey {
    bytes: [u8; KEY_SIZE],
}

impl EncryptionKey {
    /// Generates a new random key.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Creates a key from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the slice is not exactly 32 bytes.
    pub fn from_bytes(bytes: &[u8]) -> StorageResult<Self> {
        if bytes.len() != KEY_SIZE {
            return Err(StorageError::Encryption(format!(
                "invalid key size: expected {KEY_SIZE}, got {}",
                bytes.len()
            )));
        }
        let mut key_bytes = [0u8; KEY_SIZE];
        key_bytes.copy_from_slice(bytes);
        Ok(Self { bytes: key_bytes })
    }

    /// Derives a key from a high-entropy passphrase using HKDF-SHA256.
    ///
    /// HKDF is not a password hash. Use it only when the input already has
    /// high entropy, such as a device-generated secret.
    ///
    /// # Errors
    ///
    /// Returns an error if HKDF expansion fails.
    pub fn derive_from_passphrase(passphrase: &[u8], salt: &[u8]) -> StorageResult<Self> {
        use hkdf::Hkdf;
        use sha2::Sha256;

        let hk = Hkdf::<Sha256>::new(Some(salt), passphrase);
        let mut bytes = [0u8; KEY_SIZE];
        hk.expand(b"fieldlog-image-key-v1", &mut bytes)
            .map_err(|_| StorageError::Encryption("HKDF expand failed".to_string()))?;
        Ok(Self { bytes })
    }

    /// Returns the key as a byte slice.
    ///
    /// Don't log or serialize the result.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// An image store that encrypts images before handing them to an inner store.
///
/// # Example
///
/// ```rust
/// use fieldlog_storage::{EncryptedImageStore, EncryptionKey, ImageStore, InMemoryImageStore};
///
/// let store = EncryptedImageStore::new(InMemoryImageStore::new(), EncryptionKey::generate());
/// store.save(b"secret coordinates").unwrap();
/// assert_eq!(store.load().unwrap().unwrap(), b"secret coordinates");
/// assert_ne!(store.inner().image().unwrap(), b"secret coordinates");
/// ```
pub struct EncryptedImageStore<S> {
    inner: S,
    cipher: Aes256Gcm,
}

impl<S: ImageStore> EncryptedImageStore<S> {
    /// Wraps `inner` with AES-256-GCM encryption under `key`.
    #[must_use]
    pub fn new(inner: S, key: EncryptionKey) -> Self {
        let cipher = Aes256Gcm::new(GenericArray::from_slice(key.as_bytes()));
        Self { inner, cipher }
    }

    /// Returns the wrapped store.
    #[must_use]
    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn encrypt(&self, plaintext: &[u8]) -> StorageResult<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| StorageError::Encryption("encryption error".to_string()))?;

        let mut result = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        result.extend_from_slice(&nonce_bytes);
        result.extend(ciphertext);
        Ok(result)
    }

    fn decrypt(&self, ciphertext: &[u8]) -> StorageResult<Vec<u8>> {
        if ciphertext.len() < NONCE_SIZE + TAG_SIZE {
            return Err(StorageError::Encryption("ciphertext too short".to_string()));
        }
        let nonce = Nonce::from_slice(&ciphertext[..NONCE_SIZE]);
        self.cipher
            .decrypt(nonce, &ciphertext[NONCE_SIZE..])
            .map_err(|_| StorageError::Encryption("authentication failed".to_string()))
    }
}

impl<S: ImageStore> ImageStore for EncryptedImageStore<S> {
    fn load(&self) -> StorageResult<Option<Vec<u8>>> {
        match self.inner.load()? {
            Some(ciphertext) => self.decrypt(&ciphertext).map(Some),
            None => Ok(None),
        }
    }

    fn save(&self, image: &[u8]) -> StorageResult<()> {
        let ciphertext = self.encrypt(image)?;
        self.inner.save(&ciphertext)
    }

    fn describe(&self) -> String {
        format!("encrypted({})", self.inner.describe())
    }
}

impl<S> std::fmt::Debug for EncryptedImageStore<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedImageStore").finish_non_exhaustive()
    }
}
