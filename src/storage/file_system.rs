use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use bitcoin::key::rand;
use serde_json::error::Category;
use std::fmt;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use super::models::{PersistedSnapshot, SNAPSHOT_VERSION};
use crate::error::StorageError;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

const IV_LEN: usize = 16;
const BLOCK_LEN: usize = 16;

/// Opaque 256-bit symmetric key handed over by the platform's secure storage.
#[derive(Clone, PartialEq, Eq)]
pub struct CipherKey([u8; 32]);

impl CipherKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn generate() -> Self {
        Self(rand::random::<[u8; 32]>())
    }

    pub fn from_hex(value: &str) -> Option<Self> {
        let bytes = hex::decode(value.trim()).ok()?;
        let key: [u8; 32] = bytes.try_into().ok()?;
        Some(Self(key))
    }
}

impl fmt::Debug for CipherKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CipherKey(..)")
    }
}

/// Reads and writes the account snapshot, optionally encrypted at rest.
///
/// Layout of an encrypted file: 16-byte random IV followed by the
/// AES-256-CBC/PKCS#7 ciphertext of the JSON document. Writes go to
/// `<path>.tmp` first and are renamed over the snapshot, so a reader
/// sees either the previous file or the new one.
#[derive(Debug, Clone)]
pub struct PersistenceStore {
    path: PathBuf,
    cipher: Option<CipherKey>,
}

impl PersistenceStore {
    pub fn new(path: impl Into<PathBuf>, cipher: Option<CipherKey>) -> Self {
        Self {
            path: path.into(),
            cipher,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_encrypted(&self) -> bool {
        self.cipher.is_some()
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Replace the key used for subsequent saves and loads
    pub fn set_cipher(&mut self, cipher: Option<CipherKey>) {
        self.cipher = cipher;
    }

    pub fn save(&self, snapshot: &PersistedSnapshot) -> Result<(), StorageError> {
        let json = serde_json::to_vec_pretty(snapshot)?;
        let bytes = match &self.cipher {
            Some(key) => encrypt(key, &json),
            None => json,
        };
        write_atomic(&self.path, &bytes)?;
        log::debug!("Saved account snapshot to {:?}", self.path);
        Ok(())
    }

    /// Load the snapshot; `Ok(None)` when no snapshot has been written yet
    pub fn load(&self) -> Result<Option<PersistedSnapshot>, StorageError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let plaintext = match &self.cipher {
            Some(key) => decrypt(key, &bytes).map_err(|reason| StorageError::Decryption {
                path: self.path.clone(),
                reason,
            })?,
            None => bytes,
        };

        self.decode(&plaintext).map(Some)
    }

    fn decode(&self, plaintext: &[u8]) -> Result<PersistedSnapshot, StorageError> {
        let snapshot: PersistedSnapshot = serde_json::from_slice(plaintext).map_err(|e| {
            // Garbage out of the cipher means the key was wrong
            let garbled = matches!(e.classify(), Category::Syntax | Category::Eof);
            if self.cipher.is_some() && garbled {
                StorageError::Decryption {
                    path: self.path.clone(),
                    reason: e.to_string(),
                }
            } else if self.cipher.is_none() && looks_encrypted(plaintext) {
                StorageError::Decryption {
                    path: self.path.clone(),
                    reason: "snapshot appears encrypted and no key is set".to_string(),
                }
            } else {
                StorageError::Corrupt {
                    path: self.path.clone(),
                    reason: e.to_string(),
                }
            }
        })?;

        if snapshot.version > SNAPSHOT_VERSION {
            return Err(StorageError::Corrupt {
                path: self.path.clone(),
                reason: format!("unsupported snapshot version {}", snapshot.version),
            });
        }
        Ok(snapshot)
    }
}

fn encrypt(key: &CipherKey, plaintext: &[u8]) -> Vec<u8> {
    let iv = rand::random::<[u8; IV_LEN]>();
    let ciphertext =
        Aes256CbcEnc::new(&key.0.into(), &iv.into()).encrypt_padded_vec_mut::<Pkcs7>(plaintext);

    let mut out = Vec::with_capacity(IV_LEN + ciphertext.len());
    out.extend_from_slice(&iv);
    out.extend_from_slice(&ciphertext);
    out
}

fn decrypt(key: &CipherKey, data: &[u8]) -> Result<Vec<u8>, String> {
    if data.len() < IV_LEN + BLOCK_LEN || (data.len() - IV_LEN) % BLOCK_LEN != 0 {
        return Err(format!(
            "{} bytes is not an IV followed by whole cipher blocks",
            data.len()
        ));
    }
    let (iv, ciphertext) = data.split_at(IV_LEN);
    let mut iv_bytes = [0u8; IV_LEN];
    iv_bytes.copy_from_slice(iv);

    Aes256CbcDec::new(&key.0.into(), &iv_bytes.into())
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| "invalid padding".to_string())
}

/// An IV followed by whole cipher blocks that is not text
fn looks_encrypted(data: &[u8]) -> bool {
    let aligned = data.len() >= IV_LEN + BLOCK_LEN && (data.len() - IV_LEN) % BLOCK_LEN == 0;
    aligned && std::str::from_utf8(data).is_err()
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Write to a sibling temp file, sync it, then rename over `path`.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = temp_path(path);
    {
        let mut file = File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }

    if let Err(e) = fs::rename(&tmp, path) {
        log::error!("Failed to rename {:?} to {:?}: {}", tmp, path, e);
        if let Err(cleanup) = fs::remove_file(&tmp) {
            log::warn!("Failed to remove temp file {:?}: {}", tmp, cleanup);
        }
        return Err(e.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cipher_roundtrip() {
        let key = CipherKey::generate();
        let plaintext = br#"{"hello":"world"}"#;
        let sealed = encrypt(&key, plaintext);
        assert_eq!((sealed.len() - IV_LEN) % BLOCK_LEN, 0);
        assert_eq!(decrypt(&key, &sealed).unwrap(), plaintext.to_vec());
    }

    #[test]
    fn test_fresh_iv_per_encryption() {
        let key = CipherKey::from_bytes([9u8; 32]);
        let a = encrypt(&key, b"same");
        let b = encrypt(&key, b"same");
        assert_ne!(a, b);
    }

    #[test]
    fn test_truncated_ciphertext_rejected() {
        let key = CipherKey::generate();
        let sealed = encrypt(&key, b"some plaintext longer than a block");
        assert!(decrypt(&key, &sealed[..sealed.len() - 3]).is_err());
        assert!(decrypt(&key, &sealed[..IV_LEN]).is_err());
    }

    #[test]
    fn test_cipher_key_from_hex() {
        let hex_key = "11".repeat(32);
        assert_eq!(CipherKey::from_hex(&hex_key), Some(CipherKey::from_bytes([0x11; 32])));
        assert!(CipherKey::from_hex("abcd").is_none());
    }

    #[test]
    fn test_sealed_bytes_look_encrypted() {
        let sealed = encrypt(&CipherKey::generate(), br#"{"version":1}"#);
        assert!(looks_encrypted(&sealed));
        assert!(!looks_encrypted(&[b'{'; 48]));
        assert!(!looks_encrypted(&[0xff; 40]));
    }

    #[test]
    fn test_temp_path() {
        assert_eq!(
            temp_path(Path::new("/data/acct.hdreceive")),
            PathBuf::from("/data/acct.hdreceive.tmp")
        );
    }
}
