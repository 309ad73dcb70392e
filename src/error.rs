//! Error types shared by the SM2 field, point and protocol layers.

use thiserror::Error;

/// Failures reported by the library. Every variant is detected locally and
/// returned to the caller unchanged; nothing is retried across the
/// encrypt/decrypt/sign/verify boundary.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Field inverse requested for an element congruent to zero.
    #[error("division by zero in the prime field")]
    DivisionByZero,

    /// A decoded point does not satisfy `y^2 = x^3 + ax + b`.
    #[error("point is not on the curve")]
    PointNotOnCurve,

    /// The ephemeral/private scalar produced the point at infinity as shared secret.
    #[error("shared secret is the point at infinity")]
    SharedSecretAtInfinity,

    /// Ciphertext is truncated or does not start with the uncompressed point tag.
    #[error("invalid ciphertext format")]
    InvalidCiphertextFormat,

    /// The recomputed C3 tag does not match the one carried by the ciphertext.
    #[error("ciphertext integrity check failed")]
    IntegrityCheckFailed,

    /// `r` or `s` lies outside `[1, n-1]`.
    #[error("signature component out of range")]
    InvalidSignatureRange,

    /// The single-hash keystream cannot cover the plaintext.
    #[error("plaintext of {len} bytes exceeds the {max} byte keystream")]
    PlaintextTooLong { len: usize, max: usize },

    /// Encoded point has an unknown tag or the wrong length.
    #[error("invalid point encoding")]
    InvalidPointEncoding,

    /// Private scalar is not in `[1, n-2]` or is not 32 bytes long.
    #[error("invalid private key")]
    InvalidPrivateKey,

    /// Raw signature is not `r || s` of two 32 byte integers.
    #[error("signature must be {expected} bytes, got {actual}")]
    InvalidSignatureLength { expected: usize, actual: usize },

    /// The user identity does not fit the 16 bit ENTL field.
    #[error("user identity of {0} bytes is too long")]
    IdentityTooLong(usize),

    /// KDF produced an all zero keystream.
    #[error("derived keystream is all zero")]
    ZeroKeystream,

    /// Curve parameters with a composite field or group modulus.
    #[error("curve modulus is not prime")]
    CompositeModulus,

    /// Rejection sampling did not find an acceptable value.
    #[error("random sampling gave up after {0} attempts")]
    RetryLimitExceeded(usize),

    #[error("hex decoding failed: {0}")]
    Hex(#[from] hex::FromHexError),
}

pub type Result<T> = std::result::Result<T, Error>;
