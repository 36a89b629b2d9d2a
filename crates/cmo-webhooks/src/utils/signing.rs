/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! HMAC-SHA256 payload signing.
//!
//! The signed bytes are the canonical serialization of the envelope without
//! its `signature` field: object keys sorted recursively and no whitespace.
//! The same bytes are sent as the HTTP body, so a receiver can verify the
//! `X-Webhook-Signature` header directly against the raw request body.

use chrono::SecondsFormat;
use cmo_models::models::EventEnvelope;
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the hex signature.
pub const SIGNATURE_HEADER: &str = "X-Webhook-Signature";

/// Returns the exact body that is signed and sent for `envelope`.
pub fn canonical_payload(envelope: &EventEnvelope) -> String {
    let value = json!({
        "event": envelope.event.as_str(),
        "timestamp": envelope.timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        "data": envelope.data,
        "source": envelope.source.as_str(),
        "webhook_id": envelope.webhook_id,
    });
    // serde_json's default `Map` is a BTreeMap, so keys come out sorted at
    // every depth. Enabling its `preserve_order` feature would break this.
    value.to_string()
}

/// Signs `envelope` with `secret`, ignoring any signature already present.
pub fn sign(envelope: &EventEnvelope, secret: &str) -> String {
    sign_payload(&canonical_payload(envelope), secret)
}

/// Returns the lowercase hex HMAC-SHA256 of `payload`.
pub fn sign_payload(payload: &str, secret: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(payload.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Checks `signature` against `payload` in constant time.
pub fn verify(payload: &str, secret: &str, signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature) else {
        return false;
    };
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(payload.as_bytes());
    mac.verify_slice(&expected).is_ok()
}
