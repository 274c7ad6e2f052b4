//! The Enrollee FSM: dispatches inbound frames by `(state, op, message type)`,
//! drives the key schedule and Encrypted Settings checks, and builds each
//! outgoing message. See SPEC_FULL.md §4 for the full transition table.

use log::{debug, info, warn};
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

use crate::authenticator::{append_authenticator, verify_authenticator};
use crate::crypto::CryptoProvider;
use crate::errors::Result;
use crate::frame::{Op, build_frame, parse_frame};
use crate::keys::{compute_commitment_hash, derive_dh_key, derive_key_schedule, derive_kdk, derive_msk, derive_psk, split_device_password};
use crate::message::{
    self, Credential, EncryptedOuter, M2Fields, M4InnerSettings, M6InnerSettings, attr, config_error, msg_type,
};
use crate::session::{Enrollee, State};
use crate::settings::{decrypt_settings, encrypt_settings};

/// What the caller should do as a result of handling one inbound frame.
#[derive(Debug, Default)]
pub struct HandlerOutcome {
    /// Bytes (with the 2-byte op/flags header) to hand to the `EapChannel`. None
    /// means nothing is transmitted -- a silent drop, an ignored ACK, etc.
    pub outbound: Option<Vec<u8>>,
    /// Set once the exchange concludes, successfully or not.
    pub event: Option<SessionEvent>,
}

/// Terminal outcome of the exchange, surfaced to the caller alongside the last
/// `HandlerOutcome`.
#[derive(Debug)]
pub enum SessionEvent {
    Completed { credentials: Vec<Credential>, msk: [u8; 64] },
    Aborted { config_error: Option<u16> },
}

fn no_op() -> Result<HandlerOutcome> {
    Ok(HandlerOutcome::default())
}

/// Handles one inbound WSC frame (2-byte op/flags header + body) against `session`.
pub fn handle_request(
    session: &mut Enrollee,
    crypto: &dyn CryptoProvider,
    raw_frame: &[u8],
) -> Result<HandlerOutcome> {
    let frame = match parse_frame(raw_frame) {
        Ok(f) => f,
        Err(e) => {
            warn!("dropping unparseable frame: {e}");
            return no_op();
        }
    };
    if frame.fragmented {
        warn!("dropping fragmented frame (fragmentation is not implemented)");
        return no_op();
    }

    match (session.state, frame.op) {
        (State::ExpectStart, Op::Start) => handle_start(session, crypto),
        (_, Op::Ack) => no_op(),
        (_, Op::Done) => no_op(),
        (State::ExpectStart | State::ExpectM2 | State::ExpectM4 | State::ExpectM6 | State::ExpectM8, Op::Nack) => {
            handle_inbound_nack(session, frame.body)
        }
        (State::ExpectM2, Op::Msg) => handle_m2(session, crypto, frame.body),
        (State::ExpectM4, Op::Msg) => handle_m4(session, crypto, frame.body),
        (State::ExpectM6, Op::Msg) => handle_m6(session, crypto, frame.body),
        (State::ExpectM8, Op::Msg) => handle_m8(session, crypto, frame.body),
        _ => {
            // Mis-sequenced MSG, or any frame in Finished/Aborted: the NACK this
            // would otherwise warrant carries configuration_error = NO_ERROR,
            // which the centralised policy suppresses into a silent drop.
            debug!("suppressing NACK(code=0) for unexpected message in state {:?}", session.state);
            no_op()
        }
    }
}

fn handle_start(session: &mut Enrollee, _crypto: &dyn CryptoProvider) -> Result<HandlerOutcome> {
    let body = session.m1.encode();
    let outbound = build_frame(Op::Msg, &body);
    session.sent_pdu = body;
    session.state = State::ExpectM2;
    info!("sent M1, awaiting M2");
    Ok(HandlerOutcome { outbound: Some(outbound), event: None })
}

fn handle_inbound_nack(session: &mut Enrollee, body: &[u8]) -> Result<HandlerOutcome> {
    let code = message::peek_config_error(body);
    session.state = State::Aborted;
    zero_key_material(session);
    warn!("received inbound NACK (code {code:?}), aborting session");
    Ok(HandlerOutcome { outbound: None, event: Some(SessionEvent::Aborted { config_error: code }) })
}

fn zero_key_material(session: &mut Enrollee) {
    session.auth_key = None;
    session.key_wrap_key = None;
    session.emsk = None;
    session.psk1 = None;
    session.psk2 = None;
    session.r_hash2 = None;
}

fn handle_m2(session: &mut Enrollee, crypto: &dyn CryptoProvider, body: &[u8]) -> Result<HandlerOutcome> {
    if message::is_m2d(body) {
        debug!("detected M2D, ignoring without advancing");
        return no_op();
    }

    let m2 = match M2Fields::decode(body) {
        Ok(m2) => m2,
        Err(e) => {
            debug!("M2 parse failure ({e}), suppressed NACK(0)");
            return no_op();
        }
    };

    let keypair = session.keypair()?;
    let mut z = match keypair.shared_secret(&m2.public_key) {
        Ok(z) => z,
        Err(e) => {
            debug!("M2 public key rejected ({e}), suppressed NACK(0)");
            return no_op();
        }
    };

    let mut dh_key = derive_dh_key(crypto, &z);
    z.zeroize();
    let mut kdk = derive_kdk(crypto, &dh_key, &session.m1.enrollee_nonce, &session.m1.mac_address, &m2.registrar_nonce);
    let mut schedule = derive_key_schedule(crypto, &kdk);

    if verify_authenticator(crypto, &schedule.auth_key, &session.sent_pdu, body).is_err() {
        debug!("M2 Authenticator mismatch, silently dropped, remaining in ExpectM2");
        dh_key.zeroize();
        kdk.zeroize();
        schedule.auth_key.zeroize();
        schedule.key_wrap_key.zeroize();
        schedule.emsk.zeroize();
        return no_op();
    }

    session.m2_registrar_nonce = Some(m2.registrar_nonce);
    session.m2_public_key = Some(m2.public_key);
    session.auth_key = Some(zeroize::Zeroizing::new(schedule.auth_key));
    session.key_wrap_key = Some(zeroize::Zeroizing::new(schedule.key_wrap_key));
    session.emsk = Some(zeroize::Zeroizing::new(schedule.emsk));
    dh_key.zeroize();
    kdk.zeroize();

    let outbound = build_m3(session, crypto, body)?;
    session.state = State::ExpectM4;
    info!("processed M2, sent M3, awaiting M4");
    Ok(HandlerOutcome { outbound: Some(outbound), event: None })
}

fn build_m3(session: &mut Enrollee, crypto: &dyn CryptoProvider, m2_body: &[u8]) -> Result<Vec<u8>> {
    let auth_key = **session.auth_key.as_ref().expect("auth_key installed before build_m3");
    let (first_half, second_half) = split_device_password(session.device_password.as_bytes());
    let psk1 = derive_psk(crypto, &auth_key, first_half);
    let psk2 = derive_psk(crypto, &auth_key, second_half);
    session.psk1 = Some(psk1);
    session.psk2 = Some(psk2);

    let registrar_public_key = session.m2_public_key.expect("m2 processed before build_m3");
    let e_hash1 = compute_commitment_hash(crypto, &auth_key, &session.e_snonce1, &psk1, &session.m1.public_key, &registrar_public_key);
    let e_hash2 = compute_commitment_hash(crypto, &auth_key, &session.e_snonce2, &psk2, &session.m1.public_key, &registrar_public_key);

    let registrar_nonce = session.m2_registrar_nonce.expect("m2 processed before build_m3");
    let body = message::encode_m3_unauthenticated(&registrar_nonce, &e_hash1, &e_hash2);
    let signed = append_authenticator(crypto, &auth_key, m2_body, body);
    session.sent_pdu = signed.clone();
    Ok(build_frame(Op::Msg, &signed))
}

fn handle_m4(session: &mut Enrollee, crypto: &dyn CryptoProvider, body: &[u8]) -> Result<HandlerOutcome> {
    let outer = match EncryptedOuter::decode(body) {
        Ok(o) => o,
        Err(e) => {
            debug!("M4 parse failure ({e}), suppressed NACK(0)");
            return no_op();
        }
    };

    let auth_key = **session.auth_key.as_ref().expect("auth_key installed after M2");
    if verify_authenticator(crypto, &auth_key, &session.sent_pdu, body).is_err() {
        debug!("M4 Authenticator mismatch, silently dropped");
        return no_op();
    }

    let key_wrap_key = **session.key_wrap_key.as_ref().expect("key_wrap_key installed after M2");
    let plaintext = match decrypt_settings(crypto, &key_wrap_key, &auth_key, &outer.encrypted_settings) {
        Ok(p) => p,
        Err(_) => return Ok(nack(session, crypto, body, config_error::DECRYPTION_CRC_FAILURE)),
    };

    let inner = match M4InnerSettings::decode(&plaintext) {
        Ok(inner) => inner,
        Err(_) => return Ok(nack(session, crypto, body, config_error::DECRYPTION_CRC_FAILURE)),
    };

    let psk1 = session.psk1.expect("psk1 derived at M3");
    let enrollee_public_key = session.m1.public_key;
    let registrar_public_key = session.m2_public_key.expect("m2 processed before M4");
    let expected_r_hash1 = compute_commitment_hash(crypto, &auth_key, &inner.r_snonce1, &psk1, &enrollee_public_key, &registrar_public_key);
    if expected_r_hash1.ct_eq(&inner.r_hash1).unwrap_u8() != 1 {
        debug!("M4 R-Hash1 mismatch: device password authentication failed");
        return Ok(nack(session, crypto, body, config_error::DEVICE_PASSWORD_AUTH_FAILURE));
    }
    session.r_hash2 = Some(inner.r_hash2);

    let outbound = build_encrypted_outer(session, crypto, body, msg_type::M5, attr::E_SNONCE1, session.e_snonce1, session.iv1)?;
    session.state = State::ExpectM6;
    info!("processed M4, sent M5, awaiting M6");
    Ok(HandlerOutcome { outbound: Some(outbound), event: None })
}

fn handle_m6(session: &mut Enrollee, crypto: &dyn CryptoProvider, body: &[u8]) -> Result<HandlerOutcome> {
    let outer = match EncryptedOuter::decode(body) {
        Ok(o) => o,
        Err(e) => {
            debug!("M6 parse failure ({e}), suppressed NACK(0)");
            return no_op();
        }
    };

    let auth_key = **session.auth_key.as_ref().expect("auth_key installed after M2");
    if verify_authenticator(crypto, &auth_key, &session.sent_pdu, body).is_err() {
        debug!("M6 Authenticator mismatch, silently dropped");
        return no_op();
    }

    let key_wrap_key = **session.key_wrap_key.as_ref().expect("key_wrap_key installed after M2");
    let plaintext = match decrypt_settings(crypto, &key_wrap_key, &auth_key, &outer.encrypted_settings) {
        Ok(p) => p,
        Err(_) => return Ok(nack(session, crypto, body, config_error::DECRYPTION_CRC_FAILURE)),
    };

    let inner = match M6InnerSettings::decode(&plaintext) {
        Ok(inner) => inner,
        Err(_) => return Ok(nack(session, crypto, body, config_error::DECRYPTION_CRC_FAILURE)),
    };

    let psk2 = session.psk2.expect("psk2 derived at M3");
    let enrollee_public_key = session.m1.public_key;
    let registrar_public_key = session.m2_public_key.expect("m2 processed before M6");
    let expected_r_hash2 = compute_commitment_hash(crypto, &auth_key, &inner.r_snonce2, &psk2, &enrollee_public_key, &registrar_public_key);
    let stored_r_hash2 = session.r_hash2.expect("r_hash2 stored at M4");
    if expected_r_hash2.ct_eq(&stored_r_hash2).unwrap_u8() != 1 {
        debug!("M6 R-Hash2 mismatch: device password authentication failed");
        return Ok(nack(session, crypto, body, config_error::DEVICE_PASSWORD_AUTH_FAILURE));
    }

    let outbound = build_encrypted_outer(session, crypto, body, msg_type::M7, attr::E_SNONCE2, session.e_snonce2, session.iv2)?;
    session.state = State::ExpectM8;
    info!("processed M6, sent M7, awaiting M8");
    Ok(HandlerOutcome { outbound: Some(outbound), event: None })
}

fn build_encrypted_outer(
    session: &mut Enrollee,
    crypto: &dyn CryptoProvider,
    prev_message: &[u8],
    message_type: u8,
    attr_type: u16,
    e_snonce: [u8; 16],
    iv: [u8; 16],
) -> Result<Vec<u8>> {
    let auth_key = **session.auth_key.as_ref().expect("auth_key installed after M2");
    let key_wrap_key = **session.key_wrap_key.as_ref().expect("key_wrap_key installed after M2");

    let plaintext = message::encode_e_snonce_plaintext(attr_type, &e_snonce);
    let encrypted_settings = encrypt_settings(crypto, &key_wrap_key, &auth_key, &iv, &plaintext);

    let registrar_nonce = session.m2_registrar_nonce.expect("m2 processed before building an encrypted outer message");
    let body = message::encode_encrypted_outer(message_type, &registrar_nonce, &encrypted_settings);
    let signed = append_authenticator(crypto, &auth_key, prev_message, body);
    session.sent_pdu = signed.clone();
    Ok(build_frame(Op::Msg, &signed))
}

fn handle_m8(session: &mut Enrollee, crypto: &dyn CryptoProvider, body: &[u8]) -> Result<HandlerOutcome> {
    let outer = match EncryptedOuter::decode(body) {
        Ok(o) => o,
        Err(e) => {
            debug!("M8 parse failure ({e}), suppressed NACK(0)");
            return no_op();
        }
    };

    let auth_key = **session.auth_key.as_ref().expect("auth_key installed after M2");
    if verify_authenticator(crypto, &auth_key, &session.sent_pdu, body).is_err() {
        debug!("M8 Authenticator mismatch, silently dropped");
        return no_op();
    }

    let key_wrap_key = **session.key_wrap_key.as_ref().expect("key_wrap_key installed after M2");
    let plaintext = match decrypt_settings(crypto, &key_wrap_key, &auth_key, &outer.encrypted_settings) {
        Ok(p) => p,
        Err(_) => return Ok(nack(session, crypto, body, config_error::DECRYPTION_CRC_FAILURE)),
    };

    let credentials = match message::decode_credentials(&plaintext) {
        Ok(c) => c,
        Err(_) => return Ok(nack(session, crypto, body, config_error::DECRYPTION_CRC_FAILURE)),
    };

    let emsk = **session.emsk.as_ref().expect("emsk installed after M2");
    let msk = derive_msk(crypto, &emsk);

    let registrar_nonce = session.m2_registrar_nonce.expect("m2 processed before M8");
    let done_body = message::encode_done(&registrar_nonce);
    let outbound = build_frame(Op::Done, &done_body);
    session.sent_pdu = done_body;
    session.state = State::Finished;
    info!("processed M8, sent DONE, session finished");

    Ok(HandlerOutcome {
        outbound: Some(outbound),
        event: Some(SessionEvent::Completed { credentials, msk }),
    })
}

/// Builds and sends a NACK for a post-decryption failure. `NO_ERROR` NACKs never
/// reach this function -- they are handled by the suppression branch in
/// `handle_request` before any handler runs.
fn nack(session: &mut Enrollee, crypto: &dyn CryptoProvider, prev_message: &[u8], code: u16) -> HandlerOutcome {
    debug_assert_ne!(code, config_error::NO_ERROR, "NO_ERROR NACKs must be suppressed, not built");
    let registrar_nonce = session.m2_registrar_nonce.unwrap_or([0u8; 16]);
    let body = message::encode_nack(&registrar_nonce, code);
    let auth_key = session.auth_key.as_ref().map(|k| **k);
    let body = match auth_key {
        Some(k) => append_authenticator(crypto, &k, prev_message, body),
        None => body,
    };
    let outbound = build_frame(Op::Nack, &body);
    session.sent_pdu = body;
    warn!("sending NACK code 0x{code:04x}");
    HandlerOutcome { outbound: Some(outbound), event: None }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EnrolleeConfig;
    use crate::crypto::DefaultCrypto;
    use crate::dh::DhKeyPair;
    use crate::keys::{derive_dh_key, derive_kdk, derive_key_schedule};
    use crate::message::{Credential, attr, msg_type};
    use crate::tlv::write_attr;
    use std::collections::HashMap;

    fn init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn config() -> EnrolleeConfig {
        let mut settings = HashMap::new();
        settings.insert("EnrolleeMAC".into(), "02:00:00:00:00:01".into());
        settings.insert("RFBand".into(), "2.4GHz".into());
        settings.insert("DevicePassword".into(), "12345670".into());
        EnrolleeConfig::load(&settings).unwrap()
    }

    struct Registrar {
        keypair: DhKeyPair,
        nonce: [u8; 16],
        auth_key: [u8; 32],
        key_wrap_key: [u8; 16],
    }

    fn bootstrap(session: &mut Enrollee) -> (HandlerOutcome, Registrar) {
        let start = build_frame(Op::Start, &[]);
        let outcome = handle_request(session, &DefaultCrypto, &start).unwrap();
        let m1_body = outcome.outbound.clone().unwrap()[2..].to_vec();

        let registrar_keypair = DhKeyPair::from_private_bytes(&[0x11u8; 192]).unwrap();
        let registrar_nonce = [0x22u8; 16];
        let z = registrar_keypair.shared_secret(&session.m1.public_key).unwrap();
        let dh_key = derive_dh_key(&DefaultCrypto, &z);
        let kdk = derive_kdk(&DefaultCrypto, &dh_key, &session.m1.enrollee_nonce, &session.m1.mac_address, &registrar_nonce);
        let schedule = derive_key_schedule(&DefaultCrypto, &kdk);

        let mut m2_body = Vec::new();
        write_attr(&mut m2_body, attr::VERSION, &[0x10]);
        write_attr(&mut m2_body, attr::MESSAGE_TYPE, &[msg_type::M2]);
        write_attr(&mut m2_body, attr::REGISTRAR_NONCE, &registrar_nonce);
        write_attr(&mut m2_body, attr::PUBLIC_KEY, &registrar_keypair.public);
        let m2_signed = append_authenticator(&DefaultCrypto, &schedule.auth_key, &m1_body, m2_body);

        let m2_frame = build_frame(Op::Msg, &m2_signed);
        let outcome = handle_request(session, &DefaultCrypto, &m2_frame).unwrap();
        assert_eq!(session.state, State::ExpectM4);

        (
            outcome,
            Registrar {
                keypair: registrar_keypair,
                nonce: registrar_nonce,
                auth_key: schedule.auth_key,
                key_wrap_key: schedule.key_wrap_key,
            },
        )
    }

    #[test]
    fn happy_path_reaches_finished_with_credentials() {
        init_logger();
        let mut session = Enrollee::new(&DefaultCrypto, &config()).unwrap();
        let (m3_outcome, registrar) = bootstrap(&mut session);
        let m3_body = m3_outcome.outbound.unwrap()[2..].to_vec();

        let psk1 = session.psk1.unwrap();
        let psk2 = session.psk2.unwrap();
        let r_hash1 = compute_commitment_hash(&DefaultCrypto, &registrar.auth_key, &[0x33u8; 16], &psk1, &session.m1.public_key, &registrar.keypair.public);
        let r_hash2 = compute_commitment_hash(&DefaultCrypto, &registrar.auth_key, &[0x44u8; 16], &psk2, &session.m1.public_key, &registrar.keypair.public);

        let m4_inner = message::encode_m4_inner_plaintext(&[0x33u8; 16], &r_hash1, &r_hash2);
        let m4_encrypted = encrypt_settings(&DefaultCrypto, &registrar.key_wrap_key, &registrar.auth_key, &[0x55u8; 16], &m4_inner);
        let m4_body = message::encode_encrypted_outer(msg_type::M4, &registrar.nonce, &m4_encrypted);
        let m4_signed = append_authenticator(&DefaultCrypto, &registrar.auth_key, &m3_body, m4_body);
        let outcome = handle_request(&mut session, &DefaultCrypto, &build_frame(Op::Msg, &m4_signed)).unwrap();
        assert_eq!(session.state, State::ExpectM6);
        let m5_body = outcome.outbound.unwrap()[2..].to_vec();

        let m6_inner = message::encode_m6_inner_plaintext(&[0x44u8; 16]);
        let m6_encrypted = encrypt_settings(&DefaultCrypto, &registrar.key_wrap_key, &registrar.auth_key, &[0x66u8; 16], &m6_inner);
        let m6_body = message::encode_encrypted_outer(msg_type::M6, &registrar.nonce, &m6_encrypted);
        let m6_signed = append_authenticator(&DefaultCrypto, &registrar.auth_key, &m5_body, m6_body);
        let outcome = handle_request(&mut session, &DefaultCrypto, &build_frame(Op::Msg, &m6_signed)).unwrap();
        assert_eq!(session.state, State::ExpectM8);
        let m7_body = outcome.outbound.unwrap()[2..].to_vec();

        let credential = Credential {
            ssid: b"home-network".to_vec(),
            auth_type: 0x0020,
            encryption_type: 0x0008,
            network_key: b"supersecretpw".to_vec(),
            mac_address: [0xAA; 6],
        };
        let m8_inner = message::encode_credentials_plaintext(&[credential.clone()]);
        let m8_encrypted = encrypt_settings(&DefaultCrypto, &registrar.key_wrap_key, &registrar.auth_key, &[0x77u8; 16], &m8_inner);
        let m8_body = message::encode_encrypted_outer(msg_type::M8, &registrar.nonce, &m8_encrypted);
        let m8_signed = append_authenticator(&DefaultCrypto, &registrar.auth_key, &m7_body, m8_body);
        let outcome = handle_request(&mut session, &DefaultCrypto, &build_frame(Op::Msg, &m8_signed)).unwrap();
        assert_eq!(session.state, State::Finished);

        match outcome.event {
            Some(SessionEvent::Completed { credentials, msk }) => {
                assert_eq!(credentials, vec![credential]);
                assert_eq!(msk.len(), 64);
            }
            other => panic!("expected Completed, got {other:?}"),
        }
    }

    #[test]
    fn inbound_nack_aborts_session() {
        init_logger();
        let mut session = Enrollee::new(&DefaultCrypto, &config()).unwrap();
        bootstrap(&mut session);

        let nack_body = message::encode_nack(&[0u8; 16], config_error::DEVICE_PASSWORD_AUTH_FAILURE);
        let outcome = handle_request(&mut session, &DefaultCrypto, &build_frame(Op::Nack, &nack_body)).unwrap();
        assert_eq!(session.state, State::Aborted);
        assert!(outcome.outbound.is_none());
        assert!(matches!(outcome.event, Some(SessionEvent::Aborted { .. })));
    }

    #[test]
    fn stray_message_in_finished_is_silently_dropped() {
        let mut session = Enrollee::new(&DefaultCrypto, &config()).unwrap();
        session.state = State::Finished;
        let m2_like = build_frame(Op::Msg, &[0u8; 4]);
        let outcome = handle_request(&mut session, &DefaultCrypto, &m2_like).unwrap();
        assert!(outcome.outbound.is_none());
        assert_eq!(session.state, State::Finished);
    }

    #[test]
    fn m2d_is_ignored_without_advancing() {
        let mut session = Enrollee::new(&DefaultCrypto, &config()).unwrap();
        handle_request(&mut session, &DefaultCrypto, &build_frame(Op::Start, &[])).unwrap();

        let mut m2d_body = Vec::new();
        write_attr(&mut m2d_body, attr::MESSAGE_TYPE, &[msg_type::M2D]);
        write_attr(&mut m2d_body, attr::CONFIGURATION_ERROR, &0u16.to_be_bytes());
        let outcome = handle_request(&mut session, &DefaultCrypto, &build_frame(Op::Msg, &m2d_body)).unwrap();
        assert!(outcome.outbound.is_none());
        assert_eq!(session.state, State::ExpectM2);
    }
}
