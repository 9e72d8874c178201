// SPDX-FileCopyrightText: 2026 Bastion Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message integrity helpers shared by every adapter.
//!
//! Signatures are hex-encoded HMAC-SHA256 over the message content.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{AdapterError, ErrorCode};
use crate::types::Message;

type HmacSha256 = Hmac<Sha256>;

/// Sign `content` with `secret`, returning a lowercase hex digest.
pub fn sign_message(content: &str, secret: &str) -> String {
    // HMAC accepts keys of any length.
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .unwrap_or_else(|_| unreachable!("hmac accepts any key length"));
    mac.update(content.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Verify a hex signature in constant time.
pub fn verify_signature(content: &str, signature: &str, secret: &str) -> bool {
    let Ok(expected) = hex::decode(signature) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(content.as_bytes());
    mac.verify_slice(&expected).is_ok()
}

/// Basic shape checks before a message is handed to an adapter.
pub fn validate_message(message: &Message) -> Result<(), AdapterError> {
    if message.id.is_empty() {
        return Err(AdapterError::new(
            ErrorCode::Validation,
            "message ID is required",
            false,
        ));
    }
    if message.content.is_empty() && message.attachments.is_empty() {
        return Err(AdapterError::new(
            ErrorCode::Validation,
            "message must have content or attachments",
            false,
        ));
    }
    Ok(())
}
