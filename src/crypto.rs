//! Crypto primitives adapter.
//!
//! The state machine never calls `sha2`/`hmac`/`aes` directly; it only ever goes
//! through [`CryptoProvider`]. This keeps the hard-to-audit cryptographic surface in
//! one place and lets tests substitute a deterministic provider to reproduce fixed
//! WSC test vectors (see `config.rs`'s deterministic seeds).

use aes::Aes128;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

use crate::errors::{Error, Result};

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;
type HmacSha256 = Hmac<Sha256>;

/// Thin contract over the cryptographic primitives the WSC Enrollee needs.
///
/// Implementations are synchronous and must not block; every call in this crate
/// happens inline within a single `handle_*` dispatch.
pub trait CryptoProvider {
    /// SHA-256 digest of `data`.
    fn sha256(&self, data: &[u8]) -> [u8; 32];

    /// HMAC-SHA-256 over `data` keyed by `key`, of arbitrary key length.
    fn hmac_sha256(&self, key: &[u8], data: &[u8]) -> [u8; 32];

    /// AES-CBC-128 encrypt. `plaintext.len()` must already be a multiple of 16
    /// (callers pad before calling); returns exactly `plaintext.len()` bytes.
    fn aes_cbc_128_encrypt(&self, key: &[u8; 16], iv: &[u8; 16], plaintext: &[u8]) -> Vec<u8>;

    /// AES-CBC-128 decrypt. `ciphertext.len()` must be a non-zero multiple of 16.
    fn aes_cbc_128_decrypt(&self, key: &[u8; 16], iv: &[u8; 16], ciphertext: &[u8])
    -> Result<Vec<u8>>;

    /// Fill `out` with cryptographically secure random bytes.
    fn fill_random(&self, out: &mut [u8]);

    /// Convenience: a freshly allocated buffer of `len` random bytes.
    fn random_bytes(&self, len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        self.fill_random(&mut buf);
        buf
    }
}

/// Default [`CryptoProvider`] backed by RustCrypto crates and the OS CSPRNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultCrypto;

impl CryptoProvider for DefaultCrypto {
    fn sha256(&self, data: &[u8]) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(data);
        let digest = hasher.finalize();
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest);
        out
    }

    fn hmac_sha256(&self, key: &[u8], data: &[u8]) -> [u8; 32] {
        let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
        mac.update(data);
        let result = mac.finalize().into_bytes();
        let mut out = [0u8; 32];
        out.copy_from_slice(&result);
        out
    }

    fn aes_cbc_128_encrypt(&self, key: &[u8; 16], iv: &[u8; 16], plaintext: &[u8]) -> Vec<u8> {
        debug_assert!(plaintext.len() % 16 == 0, "caller must pad to the block size");
        let enc = Aes128CbcEnc::new(key.into(), iv.into());
        let mut buf = plaintext.to_vec();
        let len = buf.len();
        enc.encrypt_padded_mut::<cbc::cipher::block_padding::NoPadding>(&mut buf, len)
            .expect("buffer is already block-aligned")
            .to_vec()
    }

    fn aes_cbc_128_decrypt(
        &self,
        key: &[u8; 16],
        iv: &[u8; 16],
        ciphertext: &[u8],
    ) -> Result<Vec<u8>> {
        if ciphertext.is_empty() || ciphertext.len() % 16 != 0 {
            return Err(Error::BadPadding);
        }
        let dec = Aes128CbcDec::new(key.into(), iv.into());
        let mut buf = ciphertext.to_vec();
        dec.decrypt_padded_mut::<cbc::cipher::block_padding::NoPadding>(&mut buf)
            .map_err(|_| Error::BadPadding)?;
        Ok(buf)
    }

    fn fill_random(&self, out: &mut [u8]) {
        OsRng.fill_bytes(out);
    }
}
