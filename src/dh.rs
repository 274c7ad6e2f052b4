//! Diffie-Hellman group-5 (RFC 3526, 1536-bit MODP) key agreement.
//!
//! WSC 2.0.5 fixes DH group 5 for the Enrollee/Registrar key exchange. The prime and
//! generator below are process-wide immutable constants, not mutable global state
//! (see SPEC_FULL.md §5/§9).

use num_bigint::BigUint;

use crate::crypto::CryptoProvider;
use crate::errors::{Error, Result};

/// RFC 3526 group 5 generator.
pub const GENERATOR: u64 = 2;

/// RFC 3526 group 5 prime, 1536 bits / 192 bytes, big-endian hex.
const GROUP_5_PRIME_HEX: &str = concat!(
    "FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD",
    "129024E088A67CC74020BBEA63B139B22514A08798E3404",
    "DDEF9519B3CD3A431B302B0A6DF25F14374FE1356D6D51C",
    "245E485B576625E7EC6F44C42E9A637ED6B0BFF5CB6F406",
    "B7EDEE386BFB5A899FA5AE9F24117C4B1FE649286651ECE",
    "45B3DC2007CB8A163BF0598DA48361C55D39A69163FA8FD",
    "24CF5F83655D23DCA3AD961C62F356208552BB9ED529077",
    "096966D670C354E4ABC9804F1746C08CA237327FFFFFFFF",
    "FFFFFFFF",
);

/// 192 bytes: the fixed byte-length of DH-5 public keys and private keys as the
/// WSC wire format reserves.
pub const KEY_LEN: usize = 192;

fn group_5_prime() -> BigUint {
    BigUint::parse_bytes(GROUP_5_PRIME_HEX.as_bytes(), 16).expect("fixed constant parses")
}

/// An Enrollee's ephemeral DH-5 keypair.
pub struct DhKeyPair {
    private: BigUint,
    pub public: [u8; KEY_LEN],
}

impl DhKeyPair {
    /// Generate a fresh keypair using random bytes from `crypto`.
    pub fn generate(crypto: &dyn CryptoProvider) -> Result<Self> {
        let mut raw = crypto.random_bytes(KEY_LEN);
        // Bias negligibly downward so the private scalar is always < prime.
        raw[0] &= 0x7F;
        Self::from_private_bytes(&raw)
    }

    /// Reconstruct a keypair from an explicit private scalar (used for seeded,
    /// reproducible test vectors; see `config.rs`'s `PrivateKey` override).
    pub fn from_private_bytes(private_bytes: &[u8]) -> Result<Self> {
        let private = BigUint::from_bytes_be(private_bytes);
        let prime = group_5_prime();
        let generator = BigUint::from(GENERATOR);
        let public_big = generator.modpow(&private, &prime);
        let public = biguint_to_fixed(&public_big)?;
        Ok(Self { private, public })
    }

    /// Compute `Z = peer_public ^ private mod prime`, the raw shared secret,
    /// zero-padded/truncated to [`KEY_LEN`] bytes as the wire format expects.
    pub fn shared_secret(&self, peer_public: &[u8]) -> Result<Vec<u8>> {
        if peer_public.is_empty() || peer_public.len() > KEY_LEN {
            return Err(Error::DiffieHellman(format!(
                "peer public key has invalid length {}",
                peer_public.len()
            )));
        }
        let prime = group_5_prime();
        let peer = BigUint::from_bytes_be(peer_public);
        if peer == BigUint::from(0u8) || peer >= prime {
            return Err(Error::DiffieHellman("peer public key out of range".into()));
        }
        let shared = peer.modpow(&self.private, &prime);
        let bytes = shared.to_bytes_be();
        let mut out = vec![0u8; KEY_LEN];
        let start = KEY_LEN.saturating_sub(bytes.len());
        out[start..].copy_from_slice(&bytes);
        Ok(out)
    }
}

fn biguint_to_fixed(value: &BigUint) -> Result<[u8; KEY_LEN]> {
    let bytes = value.to_bytes_be();
    if bytes.len() > KEY_LEN {
        return Err(Error::DiffieHellman("computed public key overflowed KEY_LEN".into()));
    }
    let mut out = [0u8; KEY_LEN];
    let start = KEY_LEN - bytes.len();
    out[start..].copy_from_slice(&bytes);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::DefaultCrypto;

    #[test]
    fn shared_secret_is_symmetric() {
        let a = DhKeyPair::generate(&DefaultCrypto).unwrap();
        let b = DhKeyPair::generate(&DefaultCrypto).unwrap();

        let za = a.shared_secret(&b.public).unwrap();
        let zb = b.shared_secret(&a.public).unwrap();
        assert_eq!(za, zb);
    }

    #[test]
    fn deterministic_private_key_reproducible() {
        let seed = vec![0x07u8; KEY_LEN];
        let a = DhKeyPair::from_private_bytes(&seed).unwrap();
        let b = DhKeyPair::from_private_bytes(&seed).unwrap();
        assert_eq!(a.public, b.public);
    }

    #[test]
    fn rejects_out_of_range_peer_key() {
        let a = DhKeyPair::generate(&DefaultCrypto).unwrap();
        let huge = vec![0xFFu8; KEY_LEN + 16];
        assert!(a.shared_secret(&huge).is_err());
    }
}
