//! Enrollee configuration loader over a keyed string map (mirroring the `WSC`
//! configuration namespace of the surrounding daemon), with typed accessors,
//! defaults, and validation errors.

use std::collections::HashMap;

use sha2::{Digest, Sha256};

use crate::errors::{Error, Result};

/// Default configuration methods bitmask: `VIRTUAL_DISPLAY_PIN`.
const DEFAULT_CONFIG_METHODS: u16 = 0x2008;

/// WFA standard Personal Computer primary device type (cat=1, OUI=WFA, type=0x04, sub=1).
const DEFAULT_PRIMARY_DEVICE_TYPE: [u8; 8] = [0x00, 0x01, 0x00, 0x50, 0xF2, 0x04, 0x00, 0x01];

/// RF band the Enrollee is configuring over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RfBand {
    TwoPointFourGhz,
    FiveGhz,
    SixtyGhz,
}

impl RfBand {
    fn parse(s: &str) -> Result<Self> {
        match s {
            "2.4GHz" => Ok(RfBand::TwoPointFourGhz),
            "5GHz" => Ok(RfBand::FiveGhz),
            "60GHz" => Ok(RfBand::SixtyGhz),
            other => Err(Error::Config(format!("invalid RFBand {other:?}"))),
        }
    }

    pub fn wire_value(self) -> u8 {
        match self {
            RfBand::TwoPointFourGhz => 0x01,
            RfBand::FiveGhz => 0x02,
            RfBand::SixtyGhz => 0x04,
        }
    }
}

/// Loaded, validated Enrollee configuration: identity, device password, and the
/// optional deterministic seeds used for reproducible test vectors.
#[derive(Debug, Clone)]
pub struct EnrolleeConfig {
    pub enrollee_mac: [u8; 6],
    pub uuid_e: [u8; 16],
    pub enrollee_nonce: Option<[u8; 16]>,
    pub private_key: Option<[u8; 192]>,
    pub configuration_methods: u16,
    pub manufacturer: String,
    pub model_name: String,
    pub model_number: String,
    pub serial_number: String,
    pub device_name: String,
    pub primary_device_type: [u8; 8],
    pub rf_band: RfBand,
    pub os_version: u32,
    pub device_password: String,
    pub e_snonce1: Option<[u8; 16]>,
    pub e_snonce2: Option<[u8; 16]>,
    pub iv1: Option<[u8; 16]>,
    pub iv2: Option<[u8; 16]>,
}

fn parse_mac(s: &str) -> Result<[u8; 6]> {
    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() != 6 {
        return Err(Error::Config(format!("invalid MAC address {s:?}")));
    }
    let mut out = [0u8; 6];
    for (i, part) in parts.iter().enumerate() {
        out[i] = u8::from_str_radix(part, 16)
            .map_err(|_| Error::Config(format!("invalid MAC octet {part:?}")))?;
    }
    Ok(out)
}

fn parse_fixed_hex<const N: usize>(s: &str, field: &str) -> Result<[u8; N]> {
    let bytes = hex::decode(s)?;
    if bytes.len() != N {
        return Err(Error::Config(format!("{field} must be {N} bytes, got {}", bytes.len())));
    }
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes);
    Ok(out)
}

fn required<'a>(settings: &'a HashMap<String, String>, key: &str) -> Result<&'a str> {
    settings
        .get(key)
        .map(String::as_str)
        .ok_or_else(|| Error::Config(format!("missing required key {key:?}")))
}

fn optional_string(settings: &HashMap<String, String>, key: &str, default: &str) -> String {
    settings.get(key).cloned().unwrap_or_else(|| default.to_string())
}

fn optional_u32(settings: &HashMap<String, String>, key: &str, default: u32) -> Result<u32> {
    match settings.get(key) {
        Some(v) => v
            .parse::<u32>()
            .map_err(|_| Error::Config(format!("{key} is not a valid unsigned integer"))),
        None => Ok(default),
    }
}

fn optional_fixed_hex<const N: usize>(
    settings: &HashMap<String, String>,
    key: &str,
) -> Result<Option<[u8; N]>> {
    match settings.get(key) {
        Some(v) => Ok(Some(parse_fixed_hex(v, key)?)),
        None => Ok(None),
    }
}

/// Validates and upper-cases a device password: hex digits only, length >= 8 (as
/// bytes of hex text, not decoded binary -- WSC device passwords are ASCII PIN/
/// passphrase digits, not raw key material).
fn validate_device_password(raw: &str) -> Result<String> {
    if raw.len() < 8 || !raw.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(Error::Config("DevicePassword must be >= 8 hex digits".into()));
    }
    Ok(raw.to_ascii_uppercase())
}

impl EnrolleeConfig {
    /// Loads and validates an Enrollee configuration from a `WSC`-namespaced
    /// settings map (see SPEC_FULL.md §6 for the key table).
    pub fn load(settings: &HashMap<String, String>) -> Result<Self> {
        let enrollee_mac = parse_mac(required(settings, "EnrolleeMAC")?)?;
        let uuid_e = match settings.get("UUID-E") {
            Some(v) => parse_fixed_hex(v, "UUID-E")?,
            None => derive_uuid_e(&enrollee_mac),
        };
        let enrollee_nonce = optional_fixed_hex(settings, "EnrolleeNonce")?;
        let private_key = optional_fixed_hex(settings, "PrivateKey")?;
        let configuration_methods =
            optional_u32(settings, "ConfigurationMethods", DEFAULT_CONFIG_METHODS as u32)? as u16;

        let manufacturer = optional_string(settings, "Manufacturer", " ");
        let model_name = optional_string(settings, "ModelName", " ");
        let model_number = optional_string(settings, "ModelNumber", " ");
        let serial_number = optional_string(settings, "SerialNumber", " ");
        let device_name = optional_string(settings, "DeviceName", " ");

        let primary_device_type = match settings.get("PrimaryDeviceType") {
            Some(v) => parse_primary_device_type(v)?,
            None => DEFAULT_PRIMARY_DEVICE_TYPE,
        };

        let rf_band = RfBand::parse(required(settings, "RFBand")?)?;
        let os_version = optional_u32(settings, "OSVersion", 0)? & 0x7FFF_FFFF;

        let device_password = validate_device_password(&optional_string(
            settings,
            "DevicePassword",
            "00000000",
        ))?;

        let e_snonce1 = optional_fixed_hex(settings, "E-SNonce1")?;
        let e_snonce2 = optional_fixed_hex(settings, "E-SNonce2")?;
        let iv1 = optional_fixed_hex(settings, "IV1")?;
        let iv2 = optional_fixed_hex(settings, "IV2")?;

        Ok(Self {
            enrollee_mac,
            uuid_e,
            enrollee_nonce,
            private_key,
            configuration_methods,
            manufacturer,
            model_name,
            model_number,
            serial_number,
            device_name,
            primary_device_type,
            rf_band,
            os_version,
            device_password,
            e_snonce1,
            e_snonce2,
            iv1,
            iv2,
        })
    }
}

/// Derives UUID-E from the Enrollee MAC: SHA-256(MAC) truncated to 16 bytes with
/// the RFC 4122 version (name-based-like, tagged here as version 5) and variant
/// bits fixed, mirroring the daemon's `util_get_uuid` MAC-derived UUID construction.
pub fn derive_uuid_e(mac: &[u8; 6]) -> [u8; 16] {
    let mut hasher = Sha256::new();
    hasher.update(mac);
    let digest = hasher.finalize();
    let mut uuid = [0u8; 16];
    uuid.copy_from_slice(&digest[..16]);
    uuid[6] = (uuid[6] & 0x0F) | 0x50;
    uuid[8] = (uuid[8] & 0x3F) | 0x80;
    uuid
}

/// Parses `%hx-%02x%02x%02x%02x-%02hx` (category-OUI-OUI_type-subcategory).
fn parse_primary_device_type(s: &str) -> Result<[u8; 8]> {
    let parts: Vec<&str> = s.split('-').collect();
    if parts.len() != 3 || parts[1].len() != 8 {
        return Err(Error::Config(format!("invalid PrimaryDeviceType {s:?}")));
    }
    let category = u16::from_str_radix(parts[0], 16)
        .map_err(|_| Error::Config("invalid PrimaryDeviceType category".into()))?;
    let oui = hex::decode(parts[1]).map_err(|_| Error::Config("invalid PrimaryDeviceType OUI".into()))?;
    let subcategory = u16::from_str_radix(parts[2], 16)
        .map_err(|_| Error::Config("invalid PrimaryDeviceType subcategory".into()))?;

    let mut out = [0u8; 8];
    out[0..2].copy_from_slice(&category.to_be_bytes());
    out[2..6].copy_from_slice(&oui);
    out[6..8].copy_from_slice(&subcategory.to_be_bytes());
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_settings() -> HashMap<String, String> {
        let mut m = HashMap::new();
        m.insert("EnrolleeMAC".into(), "02:00:00:00:00:01".into());
        m.insert("RFBand".into(), "2.4GHz".into());
        m
    }

    #[test]
    fn loads_minimal_required_settings() {
        let cfg = EnrolleeConfig::load(&base_settings()).unwrap();
        assert_eq!(cfg.enrollee_mac, [0x02, 0, 0, 0, 0, 1]);
        assert_eq!(cfg.rf_band, RfBand::TwoPointFourGhz);
        assert_eq!(cfg.device_password, "00000000");
    }

    #[test]
    fn missing_required_mac_fails() {
        let mut settings = base_settings();
        settings.remove("EnrolleeMAC");
        assert!(EnrolleeConfig::load(&settings).is_err());
    }

    #[test]
    fn lower_case_device_password_is_upper_cased() {
        let mut settings = base_settings();
        settings.insert("DevicePassword".into(), "deadbeef12".into());
        let cfg = EnrolleeConfig::load(&settings).unwrap();
        assert_eq!(cfg.device_password, "DEADBEEF12");
    }

    #[test]
    fn device_password_exactly_eight_is_accepted() {
        let mut settings = base_settings();
        settings.insert("DevicePassword".into(), "12345678".into());
        assert!(EnrolleeConfig::load(&settings).is_ok());
    }

    #[test]
    fn device_password_too_short_is_rejected() {
        let mut settings = base_settings();
        settings.insert("DevicePassword".into(), "1234567".into());
        assert!(EnrolleeConfig::load(&settings).is_err());
    }

    #[test]
    fn non_hex_device_password_is_rejected() {
        let mut settings = base_settings();
        settings.insert("DevicePassword".into(), "zzzzzzzz".into());
        assert!(EnrolleeConfig::load(&settings).is_err());
    }

    #[test]
    fn invalid_rf_band_is_rejected() {
        let mut settings = base_settings();
        settings.insert("RFBand".into(), "900MHz".into());
        assert!(EnrolleeConfig::load(&settings).is_err());
    }

    #[test]
    fn explicit_uuid_e_override_is_used() {
        let mut settings = base_settings();
        settings.insert("UUID-E".into(), hex::encode([0x42u8; 16]));
        let cfg = EnrolleeConfig::load(&settings).unwrap();
        assert_eq!(cfg.uuid_e, [0x42u8; 16]);
    }
}
