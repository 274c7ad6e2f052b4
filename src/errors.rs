use thiserror::Error;

/// Common result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type unifying configuration, wire-codec, and crypto-adapter failures.
#[derive(Debug, Error)]
pub enum Error {
    /// A required configuration key was missing or failed validation.
    #[error("configuration error: {0}")]
    Config(String),

    /// A TLV attribute or WSC message failed to parse.
    #[error("message parse error: {0}")]
    Parse(String),

    /// Encrypted Settings padding was malformed after a successful decrypt.
    #[error("encrypted settings padding invalid")]
    BadPadding,

    /// KeyWrapAuthenticator did not match the decrypted plaintext.
    #[error("key wrap authenticator mismatch")]
    KeyWrapAuthMismatch,

    /// Outer Authenticator did not match the inbound message.
    #[error("authenticator mismatch")]
    AuthenticatorMismatch,

    /// R-Hash1/R-Hash2 verification failed; the device password is wrong.
    #[error("device password authentication failed")]
    DevicePasswordAuthFailure,

    /// Diffie-Hellman public key import or shared secret computation failed.
    #[error("diffie-hellman error: {0}")]
    DiffieHellman(String),

    /// hex crate decode failure.
    #[error("hex decode error: {0}")]
    Hex(#[from] hex::FromHexError),

    /// The session received a frame while in a state that forbids it.
    #[error("unexpected message in state {0}")]
    UnexpectedState(String),

    /// Fallback catch-all with a human readable message.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Internal(s.to_string())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Internal(s)
    }
}
