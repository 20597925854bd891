// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Payload decryption capability.
//!
//! Encrypted requests arrive as a three-part envelope on a single line:
//!
//! ```text
//! <client_id>:<base64 iv>:<base64 ciphertext>
//! ```
//!
//! The cipher itself is an injected [`PayloadCipher`] implementation; the
//! ingestion core only routes the client's symmetric key and the envelope
//! to it. Deployments that terminate encryption upstream (or test rigs)
//! inject [`NullCipher`].

use base64::Engine;

/// Maximum accepted client id length inside an envelope.
const MAX_CLIENT_ID_LEN: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum CipherError {
    #[error("decryption failed: {0}")]
    Decrypt(String),

    #[error("key rejected: {0}")]
    Key(String),
}

/// A parsed encrypted-request envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedEnvelope {
    pub client_id: String,
    pub iv: Vec<u8>,
    pub ciphertext: Vec<u8>,
}

impl EncryptedEnvelope {
    /// Attempts to read `bytes` as an envelope. `None` means the payload is
    /// not envelope-shaped (e.g. plain JSON) and should take the plain
    /// decoding path.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        let text = std::str::from_utf8(bytes).ok()?;
        let text = text.trim_end_matches(['\r', '\n']);

        // Plain JSON starts with an object or array; never an envelope.
        if text.starts_with('{') || text.starts_with('[') {
            return None;
        }

        let mut parts = text.splitn(3, ':');
        let client_id = parts.next()?;
        let iv_b64 = parts.next()?;
        let data_b64 = parts.next()?;

        if client_id.is_empty()
            || client_id.len() > MAX_CLIENT_ID_LEN
            || !client_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return None;
        }

        let engine = base64::engine::general_purpose::STANDARD;
        let iv = engine.decode(iv_b64.as_bytes()).ok()?;
        let ciphertext = engine.decode(data_b64.as_bytes()).ok()?;

        Some(Self {
            client_id: client_id.to_string(),
            iv,
            ciphertext,
        })
    }
}

/// Symmetric decryption seam between the transport's crypto suite and the
/// ingestion core.
pub trait PayloadCipher: Send + Sync {
    fn decrypt(&self, key: &[u8], envelope: &EncryptedEnvelope) -> Result<Vec<u8>, CipherError>;
}

/// Pass-through cipher: returns the ciphertext bytes unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullCipher;

impl PayloadCipher for NullCipher {
    fn decrypt(&self, _key: &[u8], envelope: &EncryptedEnvelope) -> Result<Vec<u8>, CipherError> {
        Ok(envelope.ciphertext.clone())
    }
}
