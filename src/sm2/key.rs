use log::trace;
use num_bigint::BigUint;
use num_traits::{One, Zero};
use rand::{CryptoRng, RngCore};

use crate::error::{Error, Result};
use crate::sm2::core::Elliptic;
use crate::sm2::multiply::Strategy;
use crate::sm2::point::{to_fixed_bytes, AffinePoint};

/// Cap on rejection-sampling rounds for keys and nonces.
pub const MAX_ATTEMPTS: usize = 1024;

/// Hex text form of SM2 keys on the recommended curve.
pub trait HexKey: Sized {
    fn encode(&self) -> String;
    fn decode(key: &str) -> Result<Self>;
}

/// 公钥
///
/// Uncompressed encoding is 65 bytes `0x04 || x || y`; compressed is 33 bytes,
/// `0x02 || x` for even y and `0x03 || x` for odd y. Never the point at infinity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublicKey(AffinePoint);

impl PublicKey {
    /// Validates curve membership and rejects infinity.
    pub fn from_point(curve: &Elliptic, point: AffinePoint) -> Result<Self> {
        if point.is_infinity() {
            return Err(Error::InvalidPointEncoding);
        }
        if !curve.is_on_curve(&point) {
            return Err(Error::PointNotOnCurve);
        }
        Ok(PublicKey(point))
    }

    pub fn from_bytes(curve: &Elliptic, bytes: &[u8]) -> Result<Self> {
        PublicKey::from_point(curve, AffinePoint::from_bytes(curve, bytes)?)
    }

    pub fn to_bytes(&self, curve: &Elliptic, compress: bool) -> Vec<u8> {
        self.0.to_bytes(curve, compress)
    }

    pub fn point(&self) -> &AffinePoint {
        &self.0
    }
}

impl HexKey for PublicKey {
    fn encode(&self) -> String {
        hex::encode(self.to_bytes(Elliptic::sm2(), false))
    }

    /// Accepts the 130-char uncompressed or the 66-char compressed form.
    fn decode(key: &str) -> Result<Self> {
        PublicKey::from_bytes(Elliptic::sm2(), &hex::decode(key)?)
    }
}

/// 私钥
///
/// A scalar d in [1, n-2], so that 1 + d stays invertible mod n.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PrivateKey(BigUint);

impl PrivateKey {
    pub fn from_scalar(curve: &Elliptic, d: BigUint) -> Result<Self> {
        if d.is_zero() || d >= curve.n() - 1u32 {
            return Err(Error::InvalidPrivateKey);
        }
        Ok(PrivateKey(d))
    }

    /// Big-endian scalar of exactly `scalar_size` bytes.
    pub fn from_bytes(curve: &Elliptic, bytes: &[u8]) -> Result<Self> {
        if bytes.len() != curve.scalar_size() {
            return Err(Error::InvalidPrivateKey);
        }
        PrivateKey::from_scalar(curve, BigUint::from_bytes_be(bytes))
    }

    pub fn to_bytes(&self, curve: &Elliptic) -> Vec<u8> {
        to_fixed_bytes(&self.0, curve.scalar_size())
    }

    pub fn scalar(&self) -> &BigUint {
        &self.0
    }

    /// Q = dG
    pub fn public_key(&self, curve: &Elliptic, strategy: &Strategy) -> PublicKey {
        PublicKey(curve.multiply_base(&self.0, strategy))
    }
}

impl HexKey for PrivateKey {
    fn encode(&self) -> String {
        hex::encode(self.to_bytes(Elliptic::sm2()))
    }

    fn decode(key: &str) -> Result<Self> {
        PrivateKey::from_bytes(Elliptic::sm2(), &hex::decode(key)?)
    }
}

/// 秘钥对（d, Q）
#[derive(Clone, Debug)]
pub struct KeyPair {
    private_key: PrivateKey,
    public_key: PublicKey,
}

impl KeyPair {
    /// Derives Q from d.
    pub fn from_private_key(
        curve: &Elliptic,
        strategy: &Strategy,
        private_key: PrivateKey,
    ) -> Self {
        let public_key = private_key.public_key(curve, strategy);
        KeyPair { private_key, public_key }
    }

    pub fn private_key(&self) -> &PrivateKey {
        &self.private_key
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }
}

/// 秘钥生成器
pub struct KeyGenerator<'a> {
    curve: &'a Elliptic,
    strategy: Strategy,
}

impl<'a> KeyGenerator<'a> {
    pub fn new(curve: &'a Elliptic, strategy: Strategy) -> Self {
        KeyGenerator { curve, strategy }
    }

    pub fn gen_key_pair<R: RngCore + CryptoRng + ?Sized>(&self, rng: &mut R) -> Result<KeyPair> {
        let private_key = self.gen_private_key(rng)?;
        Ok(KeyPair::from_private_key(self.curve, &self.strategy, private_key))
    }

    /// d ∈ [1, n-2]
    fn gen_private_key<R: RngCore + CryptoRng + ?Sized>(&self, rng: &mut R) -> Result<PrivateKey> {
        let upper = self.curve.n() - 1u32;
        Ok(PrivateKey(random_scalar(rng, &upper)?))
    }
}

/// Uniform sample from [1, upper) by rejection.
///
/// Fills ceil(bits(upper) / 8) bytes, masks the bits above bits(upper) and
/// accepts a non-zero candidate below `upper`.
pub(crate) fn random_scalar<R: RngCore + CryptoRng + ?Sized>(
    rng: &mut R,
    upper: &BigUint,
) -> Result<BigUint> {
    let bits = upper.bits();
    let len = ((bits + 7) / 8) as usize;
    let excess = len as u64 * 8 - bits;
    let mut buf = vec![0u8; len];
    for attempt in 1..=MAX_ATTEMPTS {
        rng.fill_bytes(&mut buf);
        if let Some(top) = buf.first_mut() {
            *top &= 0xffu8 >> excess;
        }
        let k = BigUint::from_bytes_be(&buf);
        if k >= BigUint::one() && &k < upper {
            return Ok(k);
        }
        trace!("scalar candidate rejected, attempt {}", attempt);
    }
    Err(Error::RetryLimitExceeded(MAX_ATTEMPTS))
}
