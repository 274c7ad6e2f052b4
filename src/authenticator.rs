//! Outer Authenticator attribute: chains each message to the one before it.
//!
//! Every M2..M8 message ends with an Authenticator attribute (type + length header,
//! then an 8-byte HMAC-SHA-256 truncation). The HMAC covers the previous message's
//! full bytes concatenated with this message's bytes *minus the Authenticator's
//! 8-byte value* — the 4-byte type/length header stays in the input.

use subtle::ConstantTimeEq;

use crate::crypto::CryptoProvider;
use crate::errors::{Error, Result};
use crate::message::attr;
use crate::tlv::write_attr;

const AUTHENTICATOR_LEN: usize = 8;

/// Appends a computed Authenticator attribute to `body`, given the raw bytes of
/// the previous message in the exchange.
pub fn append_authenticator(
    crypto: &dyn CryptoProvider,
    auth_key: &[u8; 32],
    prev_message: &[u8],
    mut body: Vec<u8>,
) -> Vec<u8> {
    write_attr(&mut body, attr::AUTHENTICATOR, &[0u8; AUTHENTICATOR_LEN]);
    let without_value = &body[..body.len() - AUTHENTICATOR_LEN];

    let mut input = Vec::with_capacity(prev_message.len() + without_value.len());
    input.extend_from_slice(prev_message);
    input.extend_from_slice(without_value);
    let mac = crypto.hmac_sha256(auth_key, &input);

    let value_start = body.len() - AUTHENTICATOR_LEN;
    body[value_start..].copy_from_slice(&mac[..AUTHENTICATOR_LEN]);
    body
}

/// Verifies that `message`'s trailing Authenticator attribute matches the
/// expected HMAC chained from `prev_message`. `message` must have the
/// Authenticator attribute as its final 12 bytes (4-byte header + 8-byte value).
pub fn verify_authenticator(
    crypto: &dyn CryptoProvider,
    auth_key: &[u8; 32],
    prev_message: &[u8],
    message: &[u8],
) -> Result<()> {
    if message.len() < AUTHENTICATOR_LEN {
        return Err(Error::Parse("message too short to carry an Authenticator".into()));
    }
    let (without_value, value) = message.split_at(message.len() - AUTHENTICATOR_LEN);

    let mut input = Vec::with_capacity(prev_message.len() + without_value.len());
    input.extend_from_slice(prev_message);
    input.extend_from_slice(without_value);
    let expected = crypto.hmac_sha256(auth_key, &input);

    if value.ct_eq(&expected[..AUTHENTICATOR_LEN]).unwrap_u8() == 1 {
        Ok(())
    } else {
        Err(Error::AuthenticatorMismatch)
    }
}
