//! Sealed-row encryption errors.

/// Errors raised while sealing or opening an anonymized row.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// A public or private key could not be parsed from its byte encoding.
    #[error("invalid key bytes: {0}")]
    InvalidKey(String),

    /// HPKE sender setup (encapsulation) failed.
    #[error("HPKE sender setup failed: {0}")]
    SenderSetup(String),

    /// HPKE receiver setup (decapsulation) failed.
    #[error("HPKE receiver setup failed: {0}")]
    ReceiverSetup(String),

    /// Sealing a row failed.
    #[error("seal failed: {0}")]
    Seal(String),

    /// Opening a sealed row failed — wrong key, tampered ciphertext, or
    /// mismatched associated data. Fatal per spec.md §7.
    #[error("decryption failed: {0}")]
    Open(String),

    /// Row serialization failed.
    #[error("row serialization failed: {0}")]
    Serialize(#[from] Box<bincode::ErrorKind>),
}

/// Result alias for crypto operations.
pub type Result<T> = std::result::Result<T, CryptoError>;
