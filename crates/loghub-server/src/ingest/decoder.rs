// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Raw-request decoding: decrypt, decompress, parse.
//!
//! The pipeline is envelope-first: a payload shaped like
//! `client_id:iv:ciphertext` is decrypted with the owning client's key;
//! anything else is a *plain* request and only acceptable when policy
//! permits plain requests. A failed envelope pipeline falls back to
//! plain-JSON parsing of the raw bytes under the same policy gate, so a
//! client that stopped encrypting mid-session degrades instead of
//! wedging.

use std::borrow::Cow;
use std::sync::Arc;

use loghub_proto::{LogPayload, StatusCode};
use serde_json::Value;
use tracing::debug;

use crate::config::Flag;
use crate::crypto::{CipherError, EncryptedEnvelope, PayloadCipher};
use crate::ingest::{LogRequest, RawRequest};
use crate::registry::{Client, Registry};

/// zstd frame magic, little-endian.
const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("unknown client in encrypted envelope: {0}")]
    UnknownClient(String),

    #[error("plain request rejected: plain log requests are not permitted")]
    PlainNotPermitted,

    #[error(transparent)]
    Cipher(#[from] CipherError),

    #[error("decompression failed: {0}")]
    Decompress(std::io::Error),

    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

pub struct RequestDecoder {
    registry: Arc<Registry>,
    cipher: Arc<dyn PayloadCipher>,
}

impl RequestDecoder {
    pub fn new(registry: Arc<Registry>, cipher: Arc<dyn PayloadCipher>) -> Self {
        Self { registry, cipher }
    }

    /// Decodes a raw request. Never fails outright: an undecodable or
    /// policy-rejected payload comes back as an invalid request with
    /// `BAD_REQUEST`, which the dispatcher drops with a diagnostic.
    pub fn decode(&self, raw: &RawRequest) -> LogRequest {
        let allow_plain = self
            .registry
            .configuration()
            .has_flag(Flag::AllowPlainLogRequest);

        let result = match EncryptedEnvelope::parse(&raw.bytes) {
            Some(envelope) => self.decode_envelope(&envelope, raw).or_else(|error| {
                // The envelope identity or ciphertext was bad; the raw
                // bytes get one more chance as plain JSON.
                if allow_plain {
                    self.parse_payload(&raw.bytes, None, raw).map_err(|_| error)
                } else {
                    Err(error)
                }
            }),
            None if allow_plain => self.decode_plain(raw),
            None => Err(DecodeError::PlainNotPermitted),
        };

        match result {
            Ok(request) => request,
            Err(error) => {
                debug!(%error, ip_addr = %raw.ip_addr, "failed to decode request");
                LogRequest::invalid(raw.ip_addr.clone(), raw.date_received, StatusCode::BadRequest)
            }
        }
    }

    fn decode_envelope(
        &self,
        envelope: &EncryptedEnvelope,
        raw: &RawRequest,
    ) -> Result<LogRequest, DecodeError> {
        let client = self
            .registry
            .find_client(&envelope.client_id)
            .ok_or_else(|| DecodeError::UnknownClient(envelope.client_id.clone()))?;
        let plaintext = self.cipher.decrypt(client.key(), envelope)?;
        let plaintext = self.maybe_decompress(Cow::Owned(plaintext))?;
        self.parse_payload(&plaintext, Some(client), raw)
    }

    fn decode_plain(&self, raw: &RawRequest) -> Result<LogRequest, DecodeError> {
        let bytes = self.maybe_decompress(Cow::Borrowed(raw.bytes.as_slice()))?;
        self.parse_payload(&bytes, None, raw)
    }

    fn maybe_decompress<'a>(&self, bytes: Cow<'a, [u8]>) -> Result<Cow<'a, [u8]>, DecodeError> {
        let compression = self.registry.configuration().has_flag(Flag::Compression);
        if compression && bytes.starts_with(&ZSTD_MAGIC) {
            Ok(Cow::Owned(
                zstd::decode_all(bytes.as_ref()).map_err(DecodeError::Decompress)?,
            ))
        } else {
            Ok(bytes)
        }
    }

    fn parse_payload(
        &self,
        bytes: &[u8],
        envelope_client: Option<Arc<Client>>,
        raw: &RawRequest,
    ) -> Result<LogRequest, DecodeError> {
        let value: Value = serde_json::from_slice(bytes)?;
        match value {
            Value::Array(items) => Ok(LogRequest::bulk_wrapper(
                items,
                envelope_client,
                raw.ip_addr.clone(),
                raw.date_received,
            )),
            other => {
                let payload: LogPayload = serde_json::from_value(other)?;
                let mut request =
                    LogRequest::from_payload(payload, raw.ip_addr.clone(), raw.date_received);
                if let Some(client) = envelope_client {
                    // The envelope identity outranks whatever the payload claims.
                    request.set_client_id(client.id());
                    request.set_client(Some(client));
                }
                Ok(request)
            }
        }
    }
}
