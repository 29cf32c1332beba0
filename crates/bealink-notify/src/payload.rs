use serde::{Deserialize, Serialize};

use crate::crypto::CipherKeys;
use crate::error::Result;

/// Bark push body. Every field is a string and empty ones are left out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NotificationPayload {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub title: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub body: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub group: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub icon: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub sound: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub url: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub copy: String,
    /// `"1"` when set.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub auto_copy: String,
    /// `"1"` when set.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub is_archive: String,
}

/// What goes on the wire instead of the payload when encryption is on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedEnvelope {
    /// base64 of AES-128-CBC(payload JSON).
    pub ciphertext: String,
    /// IV in clear so the receiver can decrypt.
    pub iv: String,
}

impl EncryptedEnvelope {
    pub fn seal(payload: &NotificationPayload, keys: &CipherKeys) -> Result<Self> {
        let plaintext = serde_json::to_vec(payload)?;
        Ok(Self {
            ciphertext: keys.encrypt(&plaintext)?,
            iv: keys.iv_text(),
        })
    }

    pub fn open(&self, keys: &CipherKeys) -> Result<NotificationPayload> {
        let plaintext = keys.decrypt(&self.ciphertext)?;
        Ok(serde_json::from_slice(&plaintext)?)
    }
}

/// Per-call values; empty group/icon/sound fall back to the settings.
#[derive(Debug, Clone, Default)]
pub struct NotifyOverrides {
    pub group: String,
    pub icon: String,
    pub sound: String,
    pub url: String,
    pub copy: String,
    pub auto_copy: bool,
    pub is_archive: bool,
}
