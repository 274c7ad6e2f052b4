//! WSC Enrollee state machine: drives the M1..M8 EAP-WSC exchange, derives the
//! DH-5/HMAC key schedule, and extracts network credentials from a Registrar.

pub mod authenticator;
pub mod config;
pub mod crypto;
pub mod dh;
pub mod errors;
pub mod frame;
pub mod keys;
pub mod message;
pub mod session;
pub mod settings;
pub mod state_machine;
pub mod tlv;

pub use config::EnrolleeConfig;
pub use errors::{Error, Result};
pub use frame::{EapChannel, Op};
pub use session::{Enrollee, State, probe, remove};
pub use state_machine::{HandlerOutcome, SessionEvent, handle_request};
