//! The `Enrollee` session: state, message history, and all zeroizing key material,
//! per the data model in SPEC_FULL.md §3.

use zeroize::Zeroizing;

use crate::config::EnrolleeConfig;
use crate::dh::DhKeyPair;
use crate::message::M1Fields;

/// Where the session currently stands in the M1..M8 exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    ExpectStart,
    ExpectM2,
    ExpectM4,
    ExpectM6,
    ExpectM8,
    Finished,
    Aborted,
}

/// The Enrollee's view of the exchange: identity, negotiated keys, and the
/// bookkeeping the Authenticator chain and Encrypted Settings checks need.
pub struct Enrollee {
    pub state: State,
    pub m1: M1Fields,
    pub m2_registrar_nonce: Option<[u8; 16]>,
    pub m2_public_key: Option<[u8; 192]>,
    /// Most recent outgoing WSC body (without the 2-byte op/flags prefix); the
    /// `prev_message` input to the next Authenticator verification.
    pub sent_pdu: Vec<u8>,

    private_key: Zeroizing<Vec<u8>>,
    pub device_password: Zeroizing<String>,
    pub e_snonce1: [u8; 16],
    pub e_snonce2: [u8; 16],
    pub iv1: [u8; 16],
    pub iv2: [u8; 16],

    pub psk1: Option<[u8; 16]>,
    pub psk2: Option<[u8; 16]>,
    pub r_hash2: Option<[u8; 32]>,

    pub auth_key: Option<Zeroizing<[u8; 32]>>,
    pub key_wrap_key: Option<Zeroizing<[u8; 16]>>,
    pub emsk: Option<Zeroizing<[u8; 32]>>,
}

impl Enrollee {
    /// Builds a fresh session from a validated configuration. M1 is constructed
    /// here (nonces/keys drawn from the config's deterministic overrides, if any,
    /// otherwise from `crypto`'s CSPRNG), ready to be sent on the first START.
    pub fn new(
        crypto: &dyn crate::crypto::CryptoProvider,
        config: &EnrolleeConfig,
    ) -> crate::errors::Result<Self> {
        let private_bytes = match &config.private_key {
            Some(bytes) => bytes.to_vec(),
            None => crypto.random_bytes(crate::dh::KEY_LEN),
        };
        let keypair = DhKeyPair::from_private_bytes(&private_bytes)?;

        let enrollee_nonce = config.enrollee_nonce.unwrap_or_else(|| {
            let mut n = [0u8; 16];
            crypto.fill_random(&mut n);
            n
        });
        let e_snonce1 = config.e_snonce1.unwrap_or_else(|| {
            let mut n = [0u8; 16];
            crypto.fill_random(&mut n);
            n
        });
        let e_snonce2 = config.e_snonce2.unwrap_or_else(|| {
            let mut n = [0u8; 16];
            crypto.fill_random(&mut n);
            n
        });
        let iv1 = config.iv1.unwrap_or_else(|| {
            let mut n = [0u8; 16];
            crypto.fill_random(&mut n);
            n
        });
        let iv2 = config.iv2.unwrap_or_else(|| {
            let mut n = [0u8; 16];
            crypto.fill_random(&mut n);
            n
        });

        let m1 = M1Fields {
            enrollee_nonce,
            uuid_e: config.uuid_e,
            mac_address: config.enrollee_mac,
            public_key: keypair.public,
            config_methods: config.configuration_methods,
            manufacturer: config.manufacturer.clone(),
            model_name: config.model_name.clone(),
            model_number: config.model_number.clone(),
            serial_number: config.serial_number.clone(),
            primary_device_type: config.primary_device_type,
            device_name: config.device_name.clone(),
            rf_bands: config.rf_band.wire_value(),
            os_version: config.os_version,
        };

        Ok(Self {
            state: State::ExpectStart,
            m1,
            m2_registrar_nonce: None,
            m2_public_key: None,
            sent_pdu: Vec::new(),
            private_key: Zeroizing::new(private_bytes),
            device_password: Zeroizing::new(config.device_password.clone()),
            e_snonce1,
            e_snonce2,
            iv1,
            iv2,
            psk1: None,
            psk2: None,
            r_hash2: None,
            auth_key: None,
            key_wrap_key: None,
            emsk: None,
        })
    }

    /// Reconstructs the DH keypair on demand from the session's zeroizing private
    /// key bytes, so the `BigUint` scalar never outlives a single call.
    pub fn keypair(&self) -> crate::errors::Result<DhKeyPair> {
        DhKeyPair::from_private_bytes(&self.private_key)
    }

    /// True once M2 has been processed and the key schedule is available.
    pub fn has_key_schedule(&self) -> bool {
        self.auth_key.is_some() && self.key_wrap_key.is_some()
    }
}

/// Session lifecycle entry point: starts a fresh Enrollee session on EAP method
/// probe. Thin wrapper over [`Enrollee::new`] so the probe/remove pair named in
/// SPEC_FULL.md's session lifecycle component has a direct call site.
pub fn probe(
    crypto: &dyn crate::crypto::CryptoProvider,
    config: &EnrolleeConfig,
) -> crate::errors::Result<Enrollee> {
    Enrollee::new(crypto, config)
}

/// Session lifecycle entry point: tears down an Enrollee session on EAP method
/// remove. Dropping `session` zeroes `private_key`, `device_password`, `auth_key`,
/// `key_wrap_key`, and `emsk` via their `Zeroizing` wrappers; this function exists
/// so that teardown has an explicit, citable call site rather than an implicit drop.
pub fn remove(session: Enrollee) {
    drop(session);
}
