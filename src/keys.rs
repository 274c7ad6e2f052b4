//! WSC key schedule: DH shared secret -> DHKey -> KDK -> {AuthKey, KeyWrapKey, EMSK},
//! plus the EMSK -> MSK expansion this expansion resolves (SPEC_FULL.md §6/§9), and the
//! device-password commitment hashes (PSK1/PSK2, E-Hash/R-Hash) derived from AuthKey.

use zeroize::Zeroize;

use crate::crypto::CryptoProvider;

/// Output of the WSC key derivation hierarchy, kept together so callers never
/// juggle loose byte slices for keys with very different sensitivities.
pub struct KeySchedule {
    pub auth_key: [u8; 32],
    pub key_wrap_key: [u8; 16],
    pub emsk: [u8; 32],
}

/// Derives the DHKey from the raw DH shared secret `z`: `DHKey = SHA-256(Z)`.
pub fn derive_dh_key(crypto: &dyn CryptoProvider, z: &[u8]) -> [u8; 32] {
    crypto.sha256(z)
}

/// Derives the Key Derivation Key: `KDK = HMAC-SHA-256(DHKey, N1 || EnrolleeMAC || N2)`.
pub fn derive_kdk(
    crypto: &dyn CryptoProvider,
    dh_key: &[u8; 32],
    enrollee_nonce: &[u8; 16],
    enrollee_mac: &[u8; 6],
    registrar_nonce: &[u8; 16],
) -> [u8; 32] {
    let mut data = Vec::with_capacity(16 + 6 + 16);
    data.extend_from_slice(enrollee_nonce);
    data.extend_from_slice(enrollee_mac);
    data.extend_from_slice(registrar_nonce);
    crypto.hmac_sha256(dh_key, &data)
}

/// WSC's KDF: NIST SP 800-108 counter-mode expansion using HMAC-SHA-256, with the
/// iteration counter and requested bit length encoded as the first/last four bytes
/// of each block's input. This is deliberately hand-rolled rather than RFC 5869
/// HKDF-Expand (the `hkdf` crate): WSC's personalization string placement and
/// trailing length field differ from HKDF's `info` handling.
pub fn kdf(crypto: &dyn CryptoProvider, key: &[u8], personalization: &[u8], out_len: usize) -> Vec<u8> {
    let total_bits = (out_len * 8) as u32;
    let mut out = Vec::with_capacity(out_len + 32);
    let mut counter: u32 = 1;
    while out.len() < out_len {
        let mut block = Vec::with_capacity(4 + personalization.len() + 4);
        block.extend_from_slice(&counter.to_be_bytes());
        block.extend_from_slice(personalization);
        block.extend_from_slice(&total_bits.to_be_bytes());
        out.extend_from_slice(&crypto.hmac_sha256(key, &block));
        counter += 1;
    }
    out.truncate(out_len);
    out
}

/// Expands the KDK into AuthKey(32) || KeyWrapKey(16) || EMSK(32), in that order,
/// with the personalization string `"Wi-Fi Easy and Secure Key Derivation"`.
pub fn derive_key_schedule(crypto: &dyn CryptoProvider, kdk: &[u8; 32]) -> KeySchedule {
    let mut expanded = kdf(crypto, kdk, b"Wi-Fi Easy and Secure Key Derivation", 32 + 16 + 32);
    let mut auth_key = [0u8; 32];
    let mut key_wrap_key = [0u8; 16];
    let mut emsk = [0u8; 32];
    auth_key.copy_from_slice(&expanded[0..32]);
    key_wrap_key.copy_from_slice(&expanded[32..48]);
    emsk.copy_from_slice(&expanded[48..80]);
    expanded.zeroize();
    KeySchedule { auth_key, key_wrap_key, emsk }
}

/// Expands the EMSK into a 64-byte MSK the way the registration path derives the
/// session's EAP MSK: the same counter-mode KDF keyed by EMSK, under a distinct
/// personalization label so it is never confusable with the key-schedule expansion
/// (resolved Open Question, SPEC_FULL.md §6/§9).
pub fn derive_msk(crypto: &dyn CryptoProvider, emsk: &[u8; 32]) -> [u8; 64] {
    let mut expanded = kdf(crypto, emsk, b"Session Key Derivation", 64);
    let mut msk = [0u8; 64];
    msk.copy_from_slice(&expanded);
    expanded.zeroize();
    msk
}

/// Splits the device password's ASCII bytes into two halves for the PSK1/PSK2
/// commitment scheme: PSK1 gets the longer half when the length is odd, matching
/// the boundary test's ceil/floor split (SPEC_FULL.md §8).
pub fn split_device_password(password: &[u8]) -> (&[u8], &[u8]) {
    let half = password.len().div_ceil(2);
    password.split_at(half)
}

/// Derives a 16-byte PSK from one half of the device password:
/// `HMAC-SHA-256(AuthKey, devpw_half)[0..16]`.
pub fn derive_psk(crypto: &dyn CryptoProvider, auth_key: &[u8; 32], half: &[u8]) -> [u8; 16] {
    let digest = crypto.hmac_sha256(auth_key, half);
    let mut out = [0u8; 16];
    out.copy_from_slice(&digest[..16]);
    out
}

/// Computes an E-Hash/R-Hash commitment: `HMAC-SHA-256(AuthKey, s_nonce || psk ||
/// enrollee_pubkey || registrar_pubkey)`.
pub fn compute_commitment_hash(
    crypto: &dyn CryptoProvider,
    auth_key: &[u8; 32],
    s_nonce: &[u8; 16],
    psk: &[u8; 16],
    enrollee_public_key: &[u8],
    registrar_public_key: &[u8],
) -> [u8; 32] {
    let mut data = Vec::with_capacity(16 + 16 + enrollee_public_key.len() + registrar_public_key.len());
    data.extend_from_slice(s_nonce);
    data.extend_from_slice(psk);
    data.extend_from_slice(enrollee_public_key);
    data.extend_from_slice(registrar_public_key);
    crypto.hmac_sha256(auth_key, &data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::DefaultCrypto;

    #[test]
    fn key_schedule_is_deterministic_given_inputs() {
        let z = [5u8; 192];
        let dh_key = derive_dh_key(&DefaultCrypto, &z);
        let kdk = derive_kdk(&DefaultCrypto, &dh_key, &[1u8; 16], &[2u8; 6], &[3u8; 16]);
        let a = derive_key_schedule(&DefaultCrypto, &kdk);
        let b = derive_key_schedule(&DefaultCrypto, &kdk);
        assert_eq!(a.auth_key, b.auth_key);
        assert_eq!(a.key_wrap_key, b.key_wrap_key);
        assert_eq!(a.emsk, b.emsk);
    }

    #[test]
    fn key_schedule_outputs_are_distinct() {
        let kdk = [9u8; 32];
        let ks = derive_key_schedule(&DefaultCrypto, &kdk);
        assert_ne!(ks.auth_key[..16], ks.key_wrap_key[..]);
    }

    #[test]
    fn msk_derivation_differs_from_key_schedule_personalization() {
        let emsk = [4u8; 32];
        let msk = derive_msk(&DefaultCrypto, &emsk);
        let ks_like = kdf(&DefaultCrypto, &emsk, b"Wi-Fi Easy and Secure Key Derivation", 64);
        assert_ne!(msk.to_vec(), ks_like);
    }

    #[test]
    fn kdf_output_length_matches_request() {
        let out = kdf(&DefaultCrypto, b"key", b"label", 50);
        assert_eq!(out.len(), 50);
    }

    #[test]
    fn odd_length_password_splits_ceil_floor() {
        let (first, second) = split_device_password(b"123456709");
        assert_eq!(first.len(), 5);
        assert_eq!(second.len(), 4);
        assert_eq!(first, b"12345");
        assert_eq!(second, b"6709");
    }

    #[test]
    fn commitment_hash_is_deterministic() {
        let auth_key = [1u8; 32];
        let psk = derive_psk(&DefaultCrypto, &auth_key, b"12345");
        let a = compute_commitment_hash(&DefaultCrypto, &auth_key, &[2u8; 16], &psk, &[3u8; 4], &[4u8; 4]);
        let b = compute_commitment_hash(&DefaultCrypto, &auth_key, &[2u8; 16], &psk, &[3u8; 4], &[4u8; 4]);
        assert_eq!(a, b);
    }
}
