//! AES-128-CBC with PKCS#7 padding, the scheme Bark's encrypted push uses.
//!
//! Key and IV are 16 ASCII characters each, used as raw bytes. Ciphertext
//! travels base64-encoded; the IV travels as the original text.

use aes::Aes128;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use cbc::cipher::{block_padding::NoPadding, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use std::fmt;

use crate::error::{NotifyError, Result};

pub const BLOCK_SIZE: usize = 16;
pub const KEY_LEN: usize = 16;
pub const IV_LEN: usize = 16;

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;

/// Append `block_size - (len % block_size)` bytes, each equal to that count.
///
/// Always adds 1..=block_size bytes; a block-aligned input gets a full
/// block of padding.
pub fn pkcs7_pad(data: &[u8], block_size: usize) -> Result<Vec<u8>> {
    if block_size == 0 || block_size > u8::MAX as usize {
        return Err(NotifyError::Crypto(format!(
            "invalid block size: {block_size}"
        )));
    }
    let pad = block_size - (data.len() % block_size);
    let mut out = Vec::with_capacity(data.len() + pad);
    out.extend_from_slice(data);
    out.resize(data.len() + pad, pad as u8);
    Ok(out)
}

/// Strip and validate PKCS#7 padding.
pub fn pkcs7_unpad(data: &[u8], block_size: usize) -> Result<&[u8]> {
    if data.is_empty() || data.len() % block_size != 0 {
        return Err(NotifyError::Crypto(
            "padded data is not a whole number of blocks".to_string(),
        ));
    }
    let pad = data[data.len() - 1] as usize;
    if pad == 0 || pad > block_size {
        return Err(NotifyError::Crypto(format!("bad padding byte {pad}")));
    }
    let (body, tail) = data.split_at(data.len() - pad);
    if tail.iter().any(|&b| b as usize != pad) {
        return Err(NotifyError::Crypto("inconsistent padding bytes".to_string()));
    }
    Ok(body)
}

/// Encrypt `plaintext` and return the base64 ciphertext.
///
/// Only 16-byte keys are accepted; 24- and 32-byte keys (AES-192/256) are
/// rejected rather than silently switching cipher.
pub fn encrypt_aes128_cbc(plaintext: &[u8], key: &[u8], iv: &[u8]) -> Result<String> {
    check_lengths(key, iv)?;
    let mut buf = pkcs7_pad(plaintext, BLOCK_SIZE)?;
    let len = buf.len();
    let cipher = Aes128CbcEnc::new_from_slices(key, iv)
        .map_err(|_| NotifyError::Crypto("cipher rejected key/iv".to_string()))?;
    let ciphertext = cipher
        .encrypt_padded_mut::<NoPadding>(&mut buf, len)
        .map_err(|_| NotifyError::Crypto("block encryption failed".to_string()))?;
    Ok(STANDARD.encode(ciphertext))
}

/// Inverse of [`encrypt_aes128_cbc`].
pub fn decrypt_aes128_cbc(ciphertext_b64: &str, key: &[u8], iv: &[u8]) -> Result<Vec<u8>> {
    check_lengths(key, iv)?;
    let mut buf = STANDARD
        .decode(ciphertext_b64)
        .map_err(|e| NotifyError::Crypto(format!("ciphertext is not base64: {e}")))?;
    if buf.is_empty() || buf.len() % BLOCK_SIZE != 0 {
        return Err(NotifyError::Crypto(format!(
            "ciphertext length {} is not a multiple of {BLOCK_SIZE}",
            buf.len()
        )));
    }
    let cipher = Aes128CbcDec::new_from_slices(key, iv)
        .map_err(|_| NotifyError::Crypto("cipher rejected key/iv".to_string()))?;
    let padded = cipher
        .decrypt_padded_mut::<NoPadding>(&mut buf)
        .map_err(|_| NotifyError::Crypto("block decryption failed".to_string()))?;
    Ok(pkcs7_unpad(padded, BLOCK_SIZE)?.to_vec())
}

fn check_lengths(key: &[u8], iv: &[u8]) -> Result<()> {
    if key.len() != KEY_LEN {
        return Err(NotifyError::Crypto(format!(
            "key must be {KEY_LEN} bytes, got {}",
            key.len()
        )));
    }
    if iv.len() != IV_LEN {
        return Err(NotifyError::Crypto(format!(
            "iv must be {IV_LEN} bytes, got {}",
            iv.len()
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Key material
// ---------------------------------------------------------------------------

/// A validated key/IV pair.
#[derive(Clone, PartialEq, Eq)]
pub struct CipherKeys {
    key: [u8; KEY_LEN],
    iv: [u8; IV_LEN],
}

impl CipherKeys {
    /// IV as sent in the envelope's `iv` field.
    pub fn iv_text(&self) -> String {
        String::from_utf8_lossy(&self.iv).into_owned()
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<String> {
        encrypt_aes128_cbc(plaintext, &self.key, &self.iv)
    }

    pub fn decrypt(&self, ciphertext_b64: &str) -> Result<Vec<u8>> {
        decrypt_aes128_cbc(ciphertext_b64, &self.key, &self.iv)
    }
}

impl fmt::Debug for CipherKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CipherKeys")
            .field("key", &"<redacted>")
            .field("iv", &self.iv_text())
            .finish()
    }
}

/// Outcome of reading the configured key/IV strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyMaterial {
    /// Neither key nor IV set.
    Disabled,
    Ready(CipherKeys),
    /// Something is set but unusable; the reason is meant for the log.
    Invalid(String),
}

impl KeyMaterial {
    /// Encryption is all-or-nothing: both strings must be 16 ASCII
    /// characters, anything else degrades to plaintext.
    pub fn from_settings(key: &str, iv: &str) -> Self {
        match (key.is_empty(), iv.is_empty()) {
            (true, true) => return Self::Disabled,
            (false, true) | (true, false) => {
                return Self::Invalid("key and iv must both be set".to_string())
            }
            (false, false) => {}
        }
        if !key.is_ascii() || !iv.is_ascii() {
            return Self::Invalid("key and iv must be ASCII".to_string());
        }
        let (Ok(key_bytes), Ok(iv_bytes)) = (
            <[u8; KEY_LEN]>::try_from(key.as_bytes()),
            <[u8; IV_LEN]>::try_from(iv.as_bytes()),
        ) else {
            return Self::Invalid(format!(
                "key and iv must be {KEY_LEN} characters (key len {}, iv len {})",
                key.len(),
                iv.len()
            ));
        };
        Self::Ready(CipherKeys {
            key: key_bytes,
            iv: iv_bytes,
        })
    }

    pub fn keys(&self) -> Option<&CipherKeys> {
        match self {
            Self::Ready(keys) => Some(keys),
            _ => None,
        }
    }
}
