//! WSC message kinds (M1..M8, NACK, Done) built over the generic TLV codec in
//! `tlv.rs`. Each message is encoded/decoded as a flat attribute sequence; the
//! Authenticator (outer messages) and KeyWrapAuthenticator (Encrypted Settings
//! plaintext) attributes are always the last attribute in their respective buffer,
//! which is what lets `authenticator.rs`/`settings.rs` operate on raw byte ranges
//! instead of re-walking the TLV structure.

use crate::errors::{Error, Result};
use crate::tlv::{Attribute, AttributeReader, fixed_value, write_attr};

/// WSC attribute type identifiers (WSC 2.0.5 Table 29).
pub mod attr {
    pub const ASSOCIATION_STATE: u16 = 0x1002;
    pub const AUTHENTICATION_TYPE: u16 = 0x1003;
    pub const AUTH_TYPE_FLAGS: u16 = 0x1004;
    pub const AUTHENTICATOR: u16 = 0x1005;
    pub const CONFIG_METHODS: u16 = 0x1008;
    pub const CONFIGURATION_ERROR: u16 = 0x1009;
    pub const CONNECTION_TYPE_FLAGS: u16 = 0x100D;
    pub const CREDENTIAL: u16 = 0x100E;
    pub const DEVICE_NAME: u16 = 0x1011;
    pub const DEVICE_PASSWORD_ID: u16 = 0x1012;
    pub const E_HASH1: u16 = 0x1014;
    pub const E_HASH2: u16 = 0x1015;
    pub const E_SNONCE1: u16 = 0x1016;
    pub const E_SNONCE2: u16 = 0x1017;
    pub const ENCRYPTED_SETTINGS: u16 = 0x1018;
    pub const ENCRYPTION_TYPE_FLAGS: u16 = 0x1010;
    pub const ENROLLEE_NONCE: u16 = 0x101A;
    pub const KEY_WRAP_AUTHENTICATOR: u16 = 0x101E;
    pub const MAC_ADDRESS: u16 = 0x1020;
    pub const MANUFACTURER: u16 = 0x1021;
    pub const MESSAGE_TYPE: u16 = 0x1022;
    pub const MODEL_NAME: u16 = 0x1023;
    pub const MODEL_NUMBER: u16 = 0x1024;
    pub const NETWORK_KEY: u16 = 0x1027;
    pub const OS_VERSION: u16 = 0x102D;
    pub const PRIMARY_DEVICE_TYPE: u16 = 0x1054;
    pub const PUBLIC_KEY: u16 = 0x1032;
    pub const RF_BANDS: u16 = 0x103C;
    pub const R_HASH1: u16 = 0x103D;
    pub const R_HASH2: u16 = 0x103E;
    pub const R_SNONCE1: u16 = 0x1040;
    pub const R_SNONCE2: u16 = 0x1041;
    pub const REGISTRAR_NONCE: u16 = 0x1039;
    pub const SERIAL_NUMBER: u16 = 0x1042;
    pub const SSID: u16 = 0x1045;
    pub const UUID_E: u16 = 0x1047;
    pub const UUID_R: u16 = 0x1048;
    pub const VERSION: u16 = 0x104A;
    pub const WIFI_PROTECTED_SETUP_STATE: u16 = 0x1044;
}

/// WSC message type values carried by the `MESSAGE_TYPE` attribute.
pub mod msg_type {
    pub const M1: u8 = 0x04;
    pub const M2: u8 = 0x05;
    pub const M2D: u8 = 0x06;
    pub const M3: u8 = 0x07;
    pub const M4: u8 = 0x08;
    pub const M5: u8 = 0x09;
    pub const M6: u8 = 0x0A;
    pub const M7: u8 = 0x0B;
    pub const M8: u8 = 0x0C;
    pub const NACK: u8 = 0x0E;
    pub const DONE: u8 = 0x0F;
}

/// WSC configuration error codes carried in a NACK's `CONFIGURATION_ERROR` attribute.
pub mod config_error {
    pub const NO_ERROR: u16 = 0x0000;
    pub const DECRYPTION_CRC_FAILURE: u16 = 0x0011;
    pub const DEVICE_PASSWORD_AUTH_FAILURE: u16 = 0x0012;
}

const NUL_STRING_LEN: usize = 32;
const DEVICE_TYPE_LEN: usize = 8;

/// Truncates/pads a UTF-8 string into a fixed-size attribute value, matching the
/// daemon's "truncated to container size, NUL-padded" config loader behavior.
fn fixed_string<const N: usize>(s: &str) -> [u8; N] {
    let mut out = [0u8; N];
    let bytes = s.as_bytes();
    let n = bytes.len().min(N);
    out[..n].copy_from_slice(&bytes[..n]);
    out
}

fn string_from_fixed(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// Fields carried by M1, the Enrollee's opening message.
#[derive(Debug, Clone)]
pub struct M1Fields {
    pub enrollee_nonce: [u8; 16],
    pub uuid_e: [u8; 16],
    pub mac_address: [u8; 6],
    pub public_key: [u8; 192],
    pub config_methods: u16,
    pub manufacturer: String,
    pub model_name: String,
    pub model_number: String,
    pub serial_number: String,
    pub primary_device_type: [u8; DEVICE_TYPE_LEN],
    pub device_name: String,
    pub rf_bands: u8,
    pub os_version: u32,
}

impl M1Fields {
    /// Encodes M1's attribute body. M1 carries no Authenticator (there is no
    /// prior message to chain from).
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        write_attr(&mut out, attr::VERSION, &[0x10]);
        write_attr(&mut out, attr::MESSAGE_TYPE, &[msg_type::M1]);
        write_attr(&mut out, attr::ENROLLEE_NONCE, &self.enrollee_nonce);
        write_attr(&mut out, attr::UUID_E, &self.uuid_e);
        write_attr(&mut out, attr::MAC_ADDRESS, &self.mac_address);
        write_attr(&mut out, attr::PUBLIC_KEY, &self.public_key);
        write_attr(&mut out, attr::AUTHENTICATION_TYPE, &0x0021u16.to_be_bytes());
        write_attr(&mut out, attr::ENCRYPTION_TYPE_FLAGS, &0x000Cu16.to_be_bytes());
        write_attr(&mut out, attr::CONNECTION_TYPE_FLAGS, &[0x01]);
        write_attr(&mut out, attr::CONFIG_METHODS, &self.config_methods.to_be_bytes());
        write_attr(&mut out, attr::WIFI_PROTECTED_SETUP_STATE, &[0x01]);
        write_attr(&mut out, attr::MANUFACTURER, &fixed_string::<NUL_STRING_LEN>(&self.manufacturer));
        write_attr(&mut out, attr::MODEL_NAME, &fixed_string::<NUL_STRING_LEN>(&self.model_name));
        write_attr(&mut out, attr::MODEL_NUMBER, &fixed_string::<NUL_STRING_LEN>(&self.model_number));
        write_attr(&mut out, attr::SERIAL_NUMBER, &fixed_string::<NUL_STRING_LEN>(&self.serial_number));
        write_attr(&mut out, attr::PRIMARY_DEVICE_TYPE, &self.primary_device_type);
        write_attr(&mut out, attr::DEVICE_NAME, &fixed_string::<NUL_STRING_LEN>(&self.device_name));
        write_attr(&mut out, attr::RF_BANDS, &[self.rf_bands]);
        write_attr(&mut out, attr::ASSOCIATION_STATE, &0x0000u16.to_be_bytes());
        write_attr(&mut out, attr::DEVICE_PASSWORD_ID, &0x0000u16.to_be_bytes());
        write_attr(&mut out, attr::OS_VERSION, &(self.os_version & 0x7FFF_FFFF).to_be_bytes());
        out
    }
}

/// Fields extracted from an inbound M2.
#[derive(Debug, Clone)]
pub struct M2Fields {
    pub registrar_nonce: [u8; 16],
    pub public_key: [u8; 192],
}

impl M2Fields {
    pub fn decode(body: &[u8]) -> Result<Self> {
        let registrar_nonce =
            fixed_value(&AttributeReader::find(body, attr::REGISTRAR_NONCE)?)?;
        let public_key = fixed_value(&AttributeReader::find(body, attr::PUBLIC_KEY)?)?;
        Ok(Self { registrar_nonce, public_key })
    }
}

/// Returns true if `body` looks like M2D: a message-type-2 frame with no
/// Authenticator attribute. M2D is detected, never processed (see SPEC_FULL.md §4.1).
pub fn is_m2d(body: &[u8]) -> bool {
    let message_type = AttributeReader::find(body, attr::MESSAGE_TYPE)
        .ok()
        .and_then(|a| a.value.first().copied());
    message_type == Some(msg_type::M2D)
        || AttributeReader::find(body, attr::AUTHENTICATOR).is_err()
}

/// Builds M3's attribute body (without the trailing Authenticator, which the
/// caller appends via `authenticator.rs` once it knows the prior message bytes).
pub fn encode_m3_unauthenticated(registrar_nonce: &[u8; 16], e_hash1: &[u8; 32], e_hash2: &[u8; 32]) -> Vec<u8> {
    let mut out = Vec::new();
    write_attr(&mut out, attr::VERSION, &[0x10]);
    write_attr(&mut out, attr::MESSAGE_TYPE, &[msg_type::M3]);
    write_attr(&mut out, attr::REGISTRAR_NONCE, registrar_nonce);
    write_attr(&mut out, attr::E_HASH1, e_hash1);
    write_attr(&mut out, attr::E_HASH2, e_hash2);
    out
}

/// Fields extracted from an inbound M4/M6/M8, which share the
/// RegistrarNonce + EncryptedSettings outer shape.
#[derive(Debug, Clone)]
pub struct EncryptedOuter {
    pub registrar_nonce: [u8; 16],
    pub encrypted_settings: Vec<u8>,
}

impl EncryptedOuter {
    pub fn decode(body: &[u8]) -> Result<Self> {
        let registrar_nonce =
            fixed_value(&AttributeReader::find(body, attr::REGISTRAR_NONCE)?)?;
        let encrypted_settings =
            AttributeReader::find(body, attr::ENCRYPTED_SETTINGS)?.value.to_vec();
        Ok(Self { registrar_nonce, encrypted_settings })
    }
}

/// Builds the unauthenticated body of M5/M7: RegistrarNonce + EncryptedSettings.
pub fn encode_encrypted_outer(message_type: u8, registrar_nonce: &[u8; 16], encrypted_settings: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    write_attr(&mut out, attr::VERSION, &[0x10]);
    write_attr(&mut out, attr::MESSAGE_TYPE, &[message_type]);
    write_attr(&mut out, attr::REGISTRAR_NONCE, registrar_nonce);
    write_attr(&mut out, attr::ENCRYPTED_SETTINGS, encrypted_settings);
    out
}

/// Inner plaintext of M4's Encrypted Settings (before the KeyWrapAuthenticator
/// trailer, which `settings.rs` verifies and strips separately).
#[derive(Debug, Clone)]
pub struct M4InnerSettings {
    pub r_snonce1: [u8; 16],
    pub r_hash1: [u8; 32],
    pub r_hash2: [u8; 32],
}

impl M4InnerSettings {
    pub fn decode(plaintext: &[u8]) -> Result<Self> {
        let r_snonce1 = fixed_value(&AttributeReader::find(plaintext, attr::R_SNONCE1)?)?;
        let r_hash1 = fixed_value(&AttributeReader::find(plaintext, attr::R_HASH1)?)?;
        let r_hash2 = fixed_value(&AttributeReader::find(plaintext, attr::R_HASH2)?)?;
        Ok(Self { r_snonce1, r_hash1, r_hash2 })
    }
}

/// Inner plaintext of M6's Encrypted Settings.
#[derive(Debug, Clone)]
pub struct M6InnerSettings {
    pub r_snonce2: [u8; 16],
}

impl M6InnerSettings {
    pub fn decode(plaintext: &[u8]) -> Result<Self> {
        let r_snonce2 = fixed_value(&AttributeReader::find(plaintext, attr::R_SNONCE2)?)?;
        Ok(Self { r_snonce2 })
    }
}

/// Builds the plaintext (without KeyWrapAuthenticator trailer) carried inside M4's
/// Encrypted Settings: R-SNonce1, R-Hash1, and R-Hash2. Used by Registrar-side test
/// fixtures; the Enrollee only ever decodes this shape via [`M4InnerSettings`].
pub fn encode_m4_inner_plaintext(r_snonce1: &[u8; 16], r_hash1: &[u8; 32], r_hash2: &[u8; 32]) -> Vec<u8> {
    let mut out = Vec::new();
    write_attr(&mut out, attr::R_SNONCE1, r_snonce1);
    write_attr(&mut out, attr::R_HASH1, r_hash1);
    write_attr(&mut out, attr::R_HASH2, r_hash2);
    out
}

/// Builds the plaintext (without KeyWrapAuthenticator trailer) carried inside M6's
/// Encrypted Settings: R-SNonce2.
pub fn encode_m6_inner_plaintext(r_snonce2: &[u8; 16]) -> Vec<u8> {
    let mut out = Vec::new();
    write_attr(&mut out, attr::R_SNONCE2, r_snonce2);
    out
}

/// Builds the plaintext (without KeyWrapAuthenticator trailer) carried inside
/// M5's or M7's Encrypted Settings: just the Enrollee's disclosed secret nonce.
pub fn encode_e_snonce_plaintext(attr_type: u16, e_snonce: &[u8; 16]) -> Vec<u8> {
    let mut out = Vec::new();
    write_attr(&mut out, attr_type, e_snonce);
    out
}

/// A single extracted network credential from M8.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub ssid: Vec<u8>,
    pub auth_type: u16,
    pub encryption_type: u16,
    pub network_key: Vec<u8>,
    pub mac_address: [u8; 6],
}

impl Credential {
    /// Encodes a Credential TLV body (used to build test fixtures for M8).
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        write_attr(&mut out, attr::SSID, &self.ssid);
        write_attr(&mut out, attr::AUTHENTICATION_TYPE, &self.auth_type.to_be_bytes());
        write_attr(&mut out, attr::ENCRYPTION_TYPE_FLAGS, &self.encryption_type.to_be_bytes());
        write_attr(&mut out, attr::NETWORK_KEY, &self.network_key);
        write_attr(&mut out, attr::MAC_ADDRESS, &self.mac_address);
        out
    }

    fn decode(body: &[u8]) -> Result<Self> {
        let ssid = AttributeReader::find(body, attr::SSID)?.value.to_vec();
        let auth_type = u16::from_be_bytes(fixed_value(&AttributeReader::find(
            body,
            attr::AUTHENTICATION_TYPE,
        )?)?);
        let encryption_type = u16::from_be_bytes(fixed_value(&AttributeReader::find(
            body,
            attr::ENCRYPTION_TYPE_FLAGS,
        )?)?);
        let network_key = AttributeReader::find(body, attr::NETWORK_KEY)?.value.to_vec();
        let mac_address = fixed_value(&AttributeReader::find(body, attr::MAC_ADDRESS)?)?;
        Ok(Self { ssid, auth_type, encryption_type, network_key, mac_address })
    }
}

/// Builds the plaintext (without KeyWrapAuthenticator trailer) carried inside M8's
/// Encrypted Settings: one Credential TLV per entry. Used by test fixtures.
pub fn encode_credentials_plaintext(credentials: &[Credential]) -> Vec<u8> {
    let mut out = Vec::new();
    for credential in credentials {
        write_attr(&mut out, attr::CREDENTIAL, &credential.encode());
    }
    out
}

/// Inner plaintext of M8's Encrypted Settings: one or more Credential TLVs.
pub fn decode_credentials(plaintext: &[u8]) -> Result<Vec<Credential>> {
    let credentials: Vec<Credential> = AttributeReader::new(plaintext)
        .filter_map(|a| match a {
            Ok(Attribute { attr_type: attr::CREDENTIAL, value }) => Some(Credential::decode(value)),
            Ok(_) => None,
            Err(e) => Some(Err(e)),
        })
        .collect::<Result<_>>()?;
    if credentials.is_empty() {
        return Err(Error::Parse("M8 carried no Credential attributes".into()));
    }
    Ok(credentials)
}

/// Builds a NACK message body. `config_error::NO_ERROR` NACKs are suppressed by
/// the state machine before ever reaching the wire (see SPEC_FULL.md §4.6).
pub fn encode_nack(registrar_nonce: &[u8; 16], error_code: u16) -> Vec<u8> {
    let mut out = Vec::new();
    write_attr(&mut out, attr::VERSION, &[0x10]);
    write_attr(&mut out, attr::MESSAGE_TYPE, &[msg_type::NACK]);
    write_attr(&mut out, attr::REGISTRAR_NONCE, registrar_nonce);
    write_attr(&mut out, attr::CONFIGURATION_ERROR, &error_code.to_be_bytes());
    out
}

/// Builds a DONE message body.
pub fn encode_done(registrar_nonce: &[u8; 16]) -> Vec<u8> {
    let mut out = Vec::new();
    write_attr(&mut out, attr::VERSION, &[0x10]);
    write_attr(&mut out, attr::MESSAGE_TYPE, &[msg_type::DONE]);
    write_attr(&mut out, attr::REGISTRAR_NONCE, registrar_nonce);
    out
}

/// Reads the `MESSAGE_TYPE` attribute, if present.
pub fn peek_message_type(body: &[u8]) -> Option<u8> {
    AttributeReader::find(body, attr::MESSAGE_TYPE).ok()?.value.first().copied()
}

/// Reads the `CONFIGURATION_ERROR` attribute of a NACK body, if present.
pub fn peek_config_error(body: &[u8]) -> Option<u16> {
    let raw: [u8; 2] = fixed_value(&AttributeReader::find(body, attr::CONFIGURATION_ERROR).ok()?).ok()?;
    Some(u16::from_be_bytes(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_m1() -> M1Fields {
        M1Fields {
            enrollee_nonce: [1u8; 16],
            uuid_e: [2u8; 16],
            mac_address: [0x02, 0, 0, 0, 0, 1],
            public_key: [3u8; 192],
            config_methods: 0x0080,
            manufacturer: "Acme".into(),
            model_name: "Widget".into(),
            model_number: "1".into(),
            serial_number: "000001".into(),
            primary_device_type: [0, 1, 0x00, 0x50, 0xF2, 0x04, 0, 1],
            device_name: "enrollee".into(),
            rf_bands: 0x01,
            os_version: 1,
        }
    }

    #[test]
    fn m1_round_trips_identifying_attributes() {
        let m1 = sample_m1();
        let body = m1.encode();
        assert_eq!(peek_message_type(&body), Some(msg_type::M1));
        let nonce = AttributeReader::find(&body, attr::ENROLLEE_NONCE).unwrap();
        assert_eq!(nonce.value, &m1.enrollee_nonce);
    }

    #[test]
    fn m1_carries_config_methods_exactly_once() {
        let body = sample_m1().encode();
        let count = AttributeReader::new(&body)
            .filter(|a| matches!(a, Ok(Attribute { attr_type: attr::CONFIG_METHODS, .. })))
            .count();
        assert_eq!(count, 1);
    }

    #[test]
    fn m2_decode_extracts_nonce_and_key() {
        let mut body = Vec::new();
        write_attr(&mut body, attr::VERSION, &[0x10]);
        write_attr(&mut body, attr::MESSAGE_TYPE, &[msg_type::M2]);
        write_attr(&mut body, attr::REGISTRAR_NONCE, &[9u8; 16]);
        write_attr(&mut body, attr::PUBLIC_KEY, &[7u8; 192]);
        write_attr(&mut body, attr::AUTHENTICATOR, &[0u8; 8]);
        let m2 = M2Fields::decode(&body).unwrap();
        assert_eq!(m2.registrar_nonce, [9u8; 16]);
        assert_eq!(m2.public_key, [7u8; 192]);
        assert!(!is_m2d(&body));
    }

    #[test]
    fn detects_m2d_missing_authenticator() {
        let mut body = Vec::new();
        write_attr(&mut body, attr::MESSAGE_TYPE, &[msg_type::M2D]);
        write_attr(&mut body, attr::CONFIGURATION_ERROR, &0u16.to_be_bytes());
        assert!(is_m2d(&body));
    }

    #[test]
    fn credential_requires_all_fields() {
        let mut cred = Vec::new();
        write_attr(&mut cred, attr::SSID, b"home-network");
        write_attr(&mut cred, attr::AUTHENTICATION_TYPE, &0x0020u16.to_be_bytes());
        write_attr(&mut cred, attr::ENCRYPTION_TYPE_FLAGS, &0x0008u16.to_be_bytes());
        write_attr(&mut cred, attr::NETWORK_KEY, b"supersecret");
        write_attr(&mut cred, attr::MAC_ADDRESS, &[0xAA; 6]);

        let mut plaintext = Vec::new();
        write_attr(&mut plaintext, attr::CREDENTIAL, &cred);

        let credentials = decode_credentials(&plaintext).unwrap();
        assert_eq!(credentials.len(), 1);
        assert_eq!(credentials[0].ssid, b"home-network");
    }

    #[test]
    fn decode_credentials_rejects_empty() {
        assert!(decode_credentials(&[]).is_err());
    }
}
