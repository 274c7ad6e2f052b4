//! Encrypted Settings: AES-CBC-128 with WSC's PKCS#7-style padding, an IV
//! prepended to the ciphertext, and a KeyWrapAuthenticator attribute binding the
//! plaintext to the AuthKey.

use subtle::ConstantTimeEq;

use crate::crypto::CryptoProvider;
use crate::errors::{Error, Result};
use crate::message::attr;
use crate::tlv::write_attr;

const BLOCK_LEN: usize = 16;
const KEY_WRAP_AUTH_LEN: usize = 8;

fn pkcs7_pad(data: &[u8]) -> Vec<u8> {
    let pad_len = BLOCK_LEN - (data.len() % BLOCK_LEN);
    let mut out = data.to_vec();
    out.extend(std::iter::repeat(pad_len as u8).take(pad_len));
    out
}

fn pkcs7_unpad(data: &[u8]) -> Result<&[u8]> {
    let pad_len = *data.last().ok_or(Error::BadPadding)? as usize;
    if pad_len == 0 || pad_len > BLOCK_LEN || pad_len > data.len() {
        return Err(Error::BadPadding);
    }
    let (body, padding) = data.split_at(data.len() - pad_len);
    if padding.iter().any(|&b| b as usize != pad_len) {
        return Err(Error::BadPadding);
    }
    Ok(body)
}

/// Appends a KeyWrapAuthenticator attribute over `data` (keyed by AuthKey) and
/// encrypts the result under `key_wrap_key`, returning `iv || ciphertext`.
pub fn encrypt_settings(
    crypto: &dyn CryptoProvider,
    key_wrap_key: &[u8; 16],
    auth_key: &[u8; 32],
    iv: &[u8; 16],
    data: &[u8],
) -> Vec<u8> {
    let mac = crypto.hmac_sha256(auth_key, data);
    let mut plaintext = data.to_vec();
    write_attr(&mut plaintext, attr::KEY_WRAP_AUTHENTICATOR, &mac[..KEY_WRAP_AUTH_LEN]);
    let padded = pkcs7_pad(&plaintext);

    let ciphertext = crypto.aes_cbc_128_encrypt(key_wrap_key, iv, &padded);
    let mut out = Vec::with_capacity(BLOCK_LEN + ciphertext.len());
    out.extend_from_slice(iv);
    out.extend_from_slice(&ciphertext);
    out
}

/// Decrypts an Encrypted Settings attribute value (`iv || ciphertext`), verifies
/// its KeyWrapAuthenticator, and returns the data attributes it wraps.
pub fn decrypt_settings(
    crypto: &dyn CryptoProvider,
    key_wrap_key: &[u8; 16],
    auth_key: &[u8; 32],
    encrypted: &[u8],
) -> Result<Vec<u8>> {
    if encrypted.len() <= BLOCK_LEN {
        return Err(Error::BadPadding);
    }
    let (iv_bytes, ciphertext) = encrypted.split_at(BLOCK_LEN);
    let mut iv = [0u8; 16];
    iv.copy_from_slice(iv_bytes);

    let padded = crypto.aes_cbc_128_decrypt(key_wrap_key, &iv, ciphertext)?;
    let plaintext = pkcs7_unpad(&padded)?;

    // The KeyWrapAuthenticator is always the trailing attribute: a 4-byte
    // type/length header followed by its 8-byte value. Read it by fixed
    // position rather than searching by type, so a plaintext carrying another
    // attribute of the same type earlier in the buffer can't be mistaken for it.
    const KWA_ATTR_LEN: usize = 4 + KEY_WRAP_AUTH_LEN;
    if plaintext.len() < KWA_ATTR_LEN {
        return Err(Error::Parse("plaintext too short to carry a KeyWrapAuthenticator".into()));
    }
    let (data, trailer) = plaintext.split_at(plaintext.len() - KWA_ATTR_LEN);
    let attr_type = u16::from_be_bytes([trailer[0], trailer[1]]);
    let attr_len = u16::from_be_bytes([trailer[2], trailer[3]]) as usize;
    if attr_type != attr::KEY_WRAP_AUTHENTICATOR || attr_len != KEY_WRAP_AUTH_LEN {
        return Err(Error::Parse("trailing attribute is not a KeyWrapAuthenticator".into()));
    }
    let kwa_value = &trailer[4..];

    let expected = crypto.hmac_sha256(auth_key, data);
    if kwa_value.ct_eq(&expected[..KEY_WRAP_AUTH_LEN]).unwrap_u8() != 1 {
        return Err(Error::KeyWrapAuthMismatch);
    }
    Ok(data.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::DefaultCrypto;
    use crate::tlv::write_attr as write_tlv;

    #[test]
    fn round_trips_through_encrypt_decrypt() {
        let key_wrap_key = [1u8; 16];
        let auth_key = [2u8; 32];
        let iv = [3u8; 16];

        let mut data = Vec::new();
        write_tlv(&mut data, attr::R_SNONCE1, &[7u8; 16]);

        let encrypted = encrypt_settings(&DefaultCrypto, &key_wrap_key, &auth_key, &iv, &data);
        let decrypted = decrypt_settings(&DefaultCrypto, &key_wrap_key, &auth_key, &encrypted).unwrap();
        assert_eq!(decrypted, data);
    }

    #[test]
    fn rejects_tampered_ciphertext() {
        let key_wrap_key = [1u8; 16];
        let auth_key = [2u8; 32];
        let iv = [3u8; 16];

        let mut data = Vec::new();
        write_tlv(&mut data, attr::R_SNONCE1, &[7u8; 16]);

        let mut encrypted = encrypt_settings(&DefaultCrypto, &key_wrap_key, &auth_key, &iv, &data);
        let last = encrypted.len() - 1;
        encrypted[last] ^= 0xFF;

        let result = decrypt_settings(&DefaultCrypto, &key_wrap_key, &auth_key, &encrypted);
        assert!(result.is_err());
    }

    #[test]
    fn decoy_attribute_of_the_same_type_earlier_in_plaintext_is_not_mistaken_for_the_trailer() {
        let key_wrap_key = [1u8; 16];
        let auth_key = [2u8; 32];
        let iv = [3u8; 16];

        // A genuine KeyWrapAuthenticator-typed attribute with a bogus value,
        // followed by ordinary data. Only the attribute `encrypt_settings`
        // appends at the very end should ever be treated as the real trailer.
        let mut data = Vec::new();
        write_tlv(&mut data, attr::KEY_WRAP_AUTHENTICATOR, &[0xFFu8; 8]);
        write_tlv(&mut data, attr::R_SNONCE1, &[7u8; 16]);

        let encrypted = encrypt_settings(&DefaultCrypto, &key_wrap_key, &auth_key, &iv, &data);
        let decrypted = decrypt_settings(&DefaultCrypto, &key_wrap_key, &auth_key, &encrypted).unwrap();
        assert_eq!(decrypted, data);
    }

    #[test]
    fn rejects_wrong_auth_key() {
        let key_wrap_key = [1u8; 16];
        let auth_key = [2u8; 32];
        let iv = [3u8; 16];

        let mut data = Vec::new();
        write_tlv(&mut data, attr::R_SNONCE1, &[7u8; 16]);

        let encrypted = encrypt_settings(&DefaultCrypto, &key_wrap_key, &auth_key, &iv, &data);
        let wrong_auth_key = [9u8; 32];
        let result = decrypt_settings(&DefaultCrypto, &key_wrap_key, &wrong_auth_key, &encrypted);
        assert!(matches!(result, Err(Error::KeyWrapAuthMismatch)));
    }
}
