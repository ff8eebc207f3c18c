//! AES-256-GCM sealing for credential records at rest.
//!
//! Every sealed value gets its own random nonce. The master key is 32 bytes,
//! supplied base64-encoded through the environment and never written to disk.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use anyhow::{anyhow, bail, Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

/// Size of the encryption key in bytes (256 bits)
const KEY_SIZE: usize = 32;

/// Size of the nonce in bytes (96 bits, standard for GCM)
const NONCE_SIZE: usize = 12;

/// Ciphertext and the nonce it was sealed with, both base64-encoded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sealed {
    pub ciphertext: String,
    pub nonce: String,
}

/// Decodes a base64 master key and checks it is exactly 32 bytes.
pub fn validate_key(key_base64: &str) -> Result<Vec<u8>> {
    let key_bytes = BASE64
        .decode(key_base64.trim())
        .context("Failed to decode base64 encryption key")?;

    if key_bytes.len() != KEY_SIZE {
        bail!(
            "Encryption key must be {} bytes (256 bits), got {} bytes",
            KEY_SIZE,
            key_bytes.len()
        );
    }

    Ok(key_bytes)
}

/// Generates a fresh base64-encoded master key.
pub fn generate_key() -> String {
    BASE64.encode(Aes256Gcm::generate_key(&mut OsRng))
}

fn cipher(key: &[u8]) -> Result<Aes256Gcm> {
    if key.len() != KEY_SIZE {
        bail!("Encryption key must be {} bytes", KEY_SIZE);
    }
    Aes256Gcm::new_from_slice(key).map_err(|e| anyhow!("Failed to create cipher: {}", e))
}

/// Encrypts `plaintext` under `key` with a new random nonce.
pub fn seal(plaintext: &[u8], key: &[u8]) -> Result<Sealed> {
    let cipher = cipher(key)?;
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| anyhow!("Encryption failed: {}", e))?;

    Ok(Sealed {
        ciphertext: BASE64.encode(ciphertext),
        nonce: BASE64.encode(nonce),
    })
}

/// Decrypts a sealed value. Fails on a wrong key or any tampering.
pub fn open(sealed: &Sealed, key: &[u8]) -> Result<Vec<u8>> {
    let cipher = cipher(key)?;

    let ciphertext = BASE64
        .decode(&sealed.ciphertext)
        .context("Failed to decode ciphertext")?;
    let nonce_bytes = BASE64.decode(&sealed.nonce).context("Failed to decode nonce")?;

    if nonce_bytes.len() != NONCE_SIZE {
        bail!(
            "Invalid nonce size: expected {}, got {}",
            NONCE_SIZE,
            nonce_bytes.len()
        );
    }

    cipher
        .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_ref())
        .map_err(|e| anyhow!("Decryption failed (wrong key or corrupted data): {}", e))
}
