//! Reversible tokens for unsubscribe links.
//!
//! Tokens are `base64url(nonce || ciphertext || tag)` under AES-256-GCM. The
//! nonce is derived from the plaintext with a separate HMAC key, so equal
//! inputs give equal tokens and decryption can re-check the nonce.

use crate::config::crypto::EmailTokenConfig;
use crate::error::{AppError, AppResult};
use aes_gcm::{aead::Aead, Aes256Gcm, KeyInit, Nonce};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use serde::{de::DeserializeOwned, Serialize};
use sha2::Sha256;
use std::sync::OnceLock;

type HmacSha256 = Hmac<Sha256>;

const NONCE_SIZE: usize = 12;
const TAG_SIZE: usize = 16;

static EMAIL_CIPHER: OnceLock<EmailCipher> = OnceLock::new();

/// Install the process-wide cipher. Must be called once at startup.
pub fn init_email_cipher(config: &EmailTokenConfig) -> anyhow::Result<()> {
    let cipher = EmailCipher::new(config)?;
    EMAIL_CIPHER
        .set(cipher)
        .map_err(|_| anyhow::anyhow!("Email cipher already initialized"))?;
    Ok(())
}

fn global() -> AppResult<&'static EmailCipher> {
    EMAIL_CIPHER.get().ok_or_else(|| {
        AppError::Internal(anyhow::anyhow!(
            "Email cipher not initialized, call init_email_cipher() at startup"
        ))
    })
}

pub fn encrypt_string(value: &str) -> AppResult<String> {
    global()?.encrypt_string(value)
}

pub fn decrypt_string(token: &str) -> AppResult<String> {
    global()?.decrypt_string(token)
}

pub fn encrypt_object<T: Serialize>(value: &T) -> AppResult<String> {
    global()?.encrypt_object(value)
}

pub fn decrypt_object<T: DeserializeOwned>(token: &str) -> AppResult<T> {
    global()?.decrypt_object(token)
}

#[derive(Clone)]
pub struct EmailCipher {
    cipher: Aes256Gcm,
    mac_key: [u8; 32],
}

impl EmailCipher {
    pub fn new(config: &EmailTokenConfig) -> anyhow::Result<Self> {
        let enc_key = derive_key(config.secret.as_bytes(), b"email-token/encryption")?;
        let mac_key = derive_key(config.secret.as_bytes(), b"email-token/nonce")?;
        let cipher = <Aes256Gcm as KeyInit>::new_from_slice(&enc_key)
            .map_err(|e| anyhow::anyhow!("Invalid encryption key: {}", e))?;
        Ok(Self { cipher, mac_key })
    }

    fn nonce_mac(&self, plaintext: &[u8]) -> AppResult<HmacSha256> {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.mac_key)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Invalid MAC key: {}", e)))?;
        mac.update(plaintext);
        Ok(mac)
    }

    pub fn encrypt_bytes(&self, plaintext: &[u8]) -> AppResult<String> {
        let digest = self.nonce_mac(plaintext)?.finalize().into_bytes();
        let nonce_bytes = &digest[..NONCE_SIZE];
        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(nonce_bytes), plaintext)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Token encryption failed: {}", e)))?;

        let mut combined = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        combined.extend_from_slice(nonce_bytes);
        combined.extend_from_slice(&ciphertext);
        Ok(URL_SAFE_NO_PAD.encode(combined))
    }

    /// Every failure collapses into `InvalidToken`.
    pub fn decrypt_bytes(&self, token: &str) -> AppResult<Vec<u8>> {
        let combined = URL_SAFE_NO_PAD
            .decode(token.trim())
            .map_err(|_| AppError::InvalidToken)?;
        if combined.len() < NONCE_SIZE + TAG_SIZE {
            return Err(AppError::InvalidToken);
        }

        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_SIZE);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| AppError::InvalidToken)?;

        self.nonce_mac(&plaintext)?
            .verify_truncated_left(nonce_bytes)
            .map_err(|_| AppError::InvalidToken)?;

        Ok(plaintext)
    }

    pub fn encrypt_string(&self, value: &str) -> AppResult<String> {
        self.encrypt_bytes(value.as_bytes())
    }

    pub fn decrypt_string(&self, token: &str) -> AppResult<String> {
        let bytes = self.decrypt_bytes(token)?;
        String::from_utf8(bytes).map_err(|_| AppError::InvalidToken)
    }

    pub fn encrypt_object<T: Serialize>(&self, value: &T) -> AppResult<String> {
        let bytes = serde_json::to_vec(value)?;
        self.encrypt_bytes(&bytes)
    }

    pub fn decrypt_object<T: DeserializeOwned>(&self, token: &str) -> AppResult<T> {
        let bytes = self.decrypt_bytes(token)?;
        serde_json::from_slice(&bytes).map_err(|_| AppError::InvalidToken)
    }
}

fn derive_key(secret: &[u8], label: &[u8]) -> anyhow::Result<[u8; 32]> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret)
        .map_err(|e| anyhow::anyhow!("Invalid token secret: {}", e))?;
    mac.update(label);
    let mut key = [0u8; 32];
    key.copy_from_slice(&mac.finalize().into_bytes());
    Ok(key)
}
