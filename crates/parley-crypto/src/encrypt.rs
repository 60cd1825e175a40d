use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, KeyInit, OsRng, rand_core::RngCore},
};
use anyhow::{Result, anyhow};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};

use crate::keys::ChannelKey;

const NONCE_LEN: usize = 12;

/// Seals and opens message bodies for one conversation.
pub struct ChannelCipher {
    cipher: Aes256Gcm,
}

impl ChannelCipher {
    pub fn new(key: &ChannelKey) -> Self {
        Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes())),
        }
    }

    /// Encrypt a plaintext body into the `nonce.ciphertext` wire form.
    pub fn seal(&self, plaintext: &str) -> Result<String> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| anyhow!("Encryption failed: {}", e))?;

        Ok(format!("{}.{}", BASE64.encode(nonce_bytes), BASE64.encode(ciphertext)))
    }

    /// Decrypt a body produced by [`ChannelCipher::seal`].
    pub fn open(&self, sealed: &str) -> Result<String> {
        let (nonce_b64, ciphertext_b64) = sealed
            .split_once('.')
            .ok_or_else(|| anyhow!("Not a sealed body"))?;
        let nonce_bytes = BASE64.decode(nonce_b64)?;
        if nonce_bytes.len() != NONCE_LEN {
            return Err(anyhow!("Invalid nonce length {}", nonce_bytes.len()));
        }
        let ciphertext = BASE64.decode(ciphertext_b64)?;

        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_ref())
            .map_err(|e| anyhow!("Decryption failed: {}", e))?;

        Ok(String::from_utf8(plaintext)?)
    }
}
