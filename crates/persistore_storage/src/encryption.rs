//! Encryption layer over any string storage.
//!
//! [`EncryptionStorage`] hashes keys and encrypts values before they reach
//! the wrapped storage, so the backend never sees plaintext. The default
//! [`Encryption`] is [`GcmEncryption`] (AES-GCM).

use crate::error::{StorageError, StorageResult};
use crate::interface::{Storage, StorageInterface};
use crate::serialization::{deserialize, serialize};
use aes_gcm::{
    aead::{generic_array::GenericArray, Aead, KeyInit},
    Aes128Gcm, Aes256Gcm,
};
use rand::RngCore;
use serde::{de::DeserializeOwned, Serialize};
use std::rc::Rc;
use zeroize::Zeroize;

/// Size of the GCM nonce in bytes.
pub const NONCE_SIZE: usize = 12;

/// Nonce used for key hashing. Hashing has to be deterministic so the same
/// key always lands on the same stored entry.
const HASH_NONCE: [u8; NONCE_SIZE] = *b"persistore\0\0";

/// Turns keys and values into their stored form.
pub trait Encryption {
    /// Deterministically transforms a key.
    ///
    /// # Errors
    ///
    /// Returns an error if the cipher fails.
    fn hash(&self, key: &str) -> StorageResult<String>;

    /// Encrypts a serialized value.
    ///
    /// # Errors
    ///
    /// Returns an error if the cipher fails.
    fn encrypt(&self, value: &str) -> StorageResult<String>;

    /// Reverses [`Encryption::encrypt`].
    ///
    /// # Errors
    ///
    /// Returns an error if `value` is malformed or was not produced with the
    /// same key.
    fn decrypt(&self, value: &str) -> StorageResult<String>;
}

enum Cipher {
    Aes128(Aes128Gcm),
    Aes256(Aes256Gcm),
}

impl Cipher {
    fn encrypt(&self, nonce: &[u8; NONCE_SIZE], plaintext: &[u8]) -> Option<Vec<u8>> {
        let nonce = GenericArray::from_slice(nonce);
        match self {
            Self::Aes128(cipher) => cipher.encrypt(nonce, plaintext).ok(),
            Self::Aes256(cipher) => cipher.encrypt(nonce, plaintext).ok(),
        }
    }

    fn decrypt(&self, nonce: &[u8], ciphertext: &[u8]) -> Option<Vec<u8>> {
        let nonce = GenericArray::from_slice(nonce);
        match self {
            Self::Aes128(cipher) => cipher.decrypt(nonce, ciphertext).ok(),
            Self::Aes256(cipher) => cipher.decrypt(nonce, ciphertext).ok(),
        }
    }
}

/// AES-GCM encryption keyed by a hex string.
///
/// Ciphertexts are written as `hex(ciphertext || tag):hex(nonce)`. Values
/// get a fresh random nonce on every write; keys use a constant nonce.
pub struct GcmEncryption {
    cipher: Cipher,
}

impl GcmEncryption {
    /// Creates the encryption from a 128-bit (32 hex digits) or 256-bit
    /// (64 hex digits) key.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidKey`] if the key is not hex or has
    /// another length.
    pub fn new(hex_key: &str) -> StorageResult<Self> {
        let mut bytes = hex::decode(hex_key.trim())
            .map_err(|err| StorageError::invalid_key(format!("key is not hex: {err}")))?;

        let cipher = match bytes.len() {
            16 => Aes128Gcm::new_from_slice(&bytes).ok().map(Cipher::Aes128),
            32 => Aes256Gcm::new_from_slice(&bytes).ok().map(Cipher::Aes256),
            _ => None,
        };
        let length = bytes.len();
        bytes.zeroize();

        cipher
            .map(|cipher| Self { cipher })
            .ok_or_else(|| StorageError::invalid_key(format!("expected 16 or 32 key bytes, got {length}")))
    }

    fn seal(&self, nonce: [u8; NONCE_SIZE], plaintext: &str) -> StorageResult<String> {
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .ok_or_else(|| StorageError::encryption("encryption error"))?;
        Ok(format!("{}:{}", hex::encode(ciphertext), hex::encode(nonce)))
    }
}

impl std::fmt::Debug for GcmEncryption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let bits = match self.cipher {
            Cipher::Aes128(_) => 128,
            Cipher::Aes256(_) => 256,
        };
        f.debug_struct("GcmEncryption")
            .field("bits", &bits)
            .field("key", &"[REDACTED]")
            .finish()
    }
}

impl Encryption for GcmEncryption {
    fn hash(&self, key: &str) -> StorageResult<String> {
        self.seal(HASH_NONCE, key)
    }

    fn encrypt(&self, value: &str) -> StorageResult<String> {
        let mut nonce = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce);
        self.seal(nonce, value)
    }

    fn decrypt(&self, value: &str) -> StorageResult<String> {
        let (ciphertext, nonce) = value
            .split_once(':')
            .ok_or_else(|| StorageError::decryption("missing nonce separator"))?;
        let ciphertext =
            hex::decode(ciphertext).map_err(|err| StorageError::decryption(format!("bad ciphertext: {err}")))?;
        let nonce = hex::decode(nonce).map_err(|err| StorageError::decryption(format!("bad nonce: {err}")))?;
        if nonce.len() != NONCE_SIZE {
            return Err(StorageError::decryption("bad nonce length"));
        }

        let plaintext = self
            .cipher
            .decrypt(&nonce, &ciphertext)
            .ok_or_else(|| StorageError::decryption("decryption error"))?;
        String::from_utf8(plaintext).map_err(|_| StorageError::decryption("plaintext is not UTF-8"))
    }
}

/// Storage that encrypts keys and values before handing them to another
/// storage.
pub struct EncryptionStorage<S, E> {
    storage: S,
    encryption: E,
}

impl<S, E> EncryptionStorage<S, E> {
    /// Wraps `storage`.
    pub fn new(storage: S, encryption: E) -> Self {
        Self { storage, encryption }
    }

    /// The wrapped storage.
    pub fn inner(&self) -> &S {
        &self.storage
    }
}

impl<S, E> std::fmt::Debug for EncryptionStorage<S, E>
where
    S: std::fmt::Debug,
    E: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionStorage")
            .field("storage", &self.storage)
            .field("encryption", &self.encryption)
            .finish()
    }
}

impl<T, S, E> StorageInterface<T> for EncryptionStorage<S, E>
where
    T: Serialize + DeserializeOwned,
    S: StorageInterface<String>,
    E: Encryption,
{
    fn get_value(&self, key: &str) -> StorageResult<Option<T>> {
        let stored = self.storage.get_value(&self.encryption.hash(key)?)?;
        match stored {
            Some(ciphertext) => deserialize(&self.encryption.decrypt(&ciphertext)?).map(Some),
            None => Ok(None),
        }
    }

    fn set_value(&self, key: &str, value: &T) -> StorageResult<()> {
        let ciphertext = self.encryption.encrypt(&serialize(value)?)?;
        self.storage.set_value(&self.encryption.hash(key)?, &ciphertext)
    }

    fn delete_value(&self, key: &str) -> StorageResult<()> {
        self.storage.delete_value(&self.encryption.hash(key)?)
    }
}

impl<T, S, E> From<Rc<EncryptionStorage<S, E>>> for Storage<T>
where
    T: Serialize + DeserializeOwned + 'static,
    S: StorageInterface<String> + 'static,
    E: Encryption + 'static,
{
    fn from(storage: Rc<EncryptionStorage<S, E>>) -> Self {
        Storage::Plain(storage)
    }
}

/// Wraps `storage` with a custom [`Encryption`].
pub fn create_encryption_storage<S, E>(storage: S, encryption: E) -> EncryptionStorage<S, E>
where
    S: StorageInterface<String>,
    E: Encryption,
{
    EncryptionStorage::new(storage, encryption)
}

/// Wraps `storage` with AES-GCM keyed by `hex_key`.
///
/// # Errors
///
/// Returns [`StorageError::InvalidKey`] if the key is unusable.
pub fn create_encrypted_storage<S>(storage: S, hex_key: &str) -> StorageResult<EncryptionStorage<S, GcmEncryption>>
where
    S: StorageInterface<String>,
{
    Ok(EncryptionStorage::new(storage, GcmEncryption::new(hex_key)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryPlatform;
    use crate::web_storage::create_local_storage;
    use proptest::prelude::*;

    const KEY_128: &str = "5eceb6fa1e6d4c8e6f2c4b3a29180706";
    const KEY_256: &str = "9f8e7d6c5b4a39281706f5e4d3c2b1a09f8e7d6c5b4a39281706f5e4d3c2b1a0";

    #[test]
    fn value_roundtrips_through_local_storage() {
        let memory = MemoryPlatform::new();
        let storage = create_encrypted_storage(create_local_storage(&memory.platform(), false), KEY_256).unwrap();

        storage.set_value("secret", &"John".to_string()).unwrap();
        let value: Option<String> = storage.get_value("secret").unwrap();
        assert_eq!(value.as_deref(), Some("John"));
    }

    #[test]
    fn empty_and_multibyte_text_roundtrip() {
        let memory = MemoryPlatform::new();
        let storage = create_encrypted_storage(create_local_storage(&memory.platform(), false), KEY_128).unwrap();

        for text in ["", "é漢字🙂"] {
            for key in [KEY_128, KEY_256] {
                let encryption = GcmEncryption::new(key).unwrap();
                assert_eq!(encryption.decrypt(&encryption.encrypt(text).unwrap()).unwrap(), text);
            }

            storage.set_value(text, &text.to_string()).unwrap();
            let value: Option<String> = storage.get_value(text).unwrap();
            assert_eq!(value.as_deref(), Some(text));
        }
    }

    #[test]
    fn backend_never_sees_plaintext() {
        let memory = MemoryPlatform::new();
        let storage = create_encrypted_storage(create_local_storage(&memory.platform(), false), KEY_128).unwrap();

        storage.set_value("userName", &"John".to_string()).unwrap();
        let local = memory.local_storage();
        assert!(local.item("userName").is_none());
        let keys = local.keys();
        assert_eq!(keys.len(), 1);
        assert!(!keys[0].contains("userName"));
        let stored = local.item(&keys[0]).unwrap();
        assert!(!stored.contains("John"));
    }

    #[test]
    fn hash_is_deterministic_and_encrypt_is_not() {
        let encryption = GcmEncryption::new(KEY_256).unwrap();
        assert_eq!(encryption.hash("k").unwrap(), encryption.hash("k").unwrap());
        assert_ne!(encryption.hash("k").unwrap(), encryption.hash("j").unwrap());
        assert_ne!(encryption.encrypt("v").unwrap(), encryption.encrypt("v").unwrap());
    }

    #[test]
    fn delete_removes_hashed_entry() {
        let memory = MemoryPlatform::new();
        let storage = create_encrypted_storage(create_local_storage(&memory.platform(), false), KEY_256).unwrap();

        storage.set_value("k", &42).unwrap();
        StorageInterface::<i32>::delete_value(&storage, "k").unwrap();

        let value: Option<i32> = storage.get_value("k").unwrap();
        assert!(value.is_none());
        assert!(memory.local_storage().keys().is_empty());
    }

    #[test]
    fn wrong_key_fails_to_decrypt() {
        let sealed = GcmEncryption::new(KEY_128).unwrap().encrypt("v").unwrap();
        let other = GcmEncryption::new("00112233445566778899aabbccddeeff").unwrap();
        assert!(matches!(other.decrypt(&sealed), Err(StorageError::Decryption(_))));
    }

    #[test]
    fn malformed_ciphertext_is_rejected() {
        let encryption = GcmEncryption::new(KEY_128).unwrap();
        assert!(encryption.decrypt("no-separator").is_err());
        assert!(encryption.decrypt("zz:00").is_err());
        assert!(encryption.decrypt("00:0011").is_err());
    }

    #[test]
    fn invalid_keys_are_rejected() {
        assert!(matches!(GcmEncryption::new("not hex"), Err(StorageError::InvalidKey(_))));
        assert!(matches!(GcmEncryption::new("0011"), Err(StorageError::InvalidKey(_))));
    }

    proptest! {
        #[test]
        fn encrypt_decrypt_roundtrip(text in "\\PC*") {
            let encryption = GcmEncryption::new(KEY_256).unwrap();
            let sealed = encryption.encrypt(&text).unwrap();
            prop_assert_eq!(encryption.decrypt(&sealed).unwrap(), text);
        }
    }
}
