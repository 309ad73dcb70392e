use num_bigint::BigUint;

use crate::error::{Error, Result};
use crate::sm2::core::Elliptic;

/// Tag of the uncompressed encoding `0x04 || x || y`.
pub const UNCOMPRESSED_TAG: u8 = 0x04;
const EVEN_TAG: u8 = 0x02;
const ODD_TAG: u8 = 0x03;
const INFINITY_TAG: u8 = 0x00;

/// Point of E(Fp) in affine coordinates.
///
/// The point at infinity is a single value rather than a coordinate pair, so
/// derived equality already gives the group semantics: infinity equals only
/// itself and never a finite point. Coordinates are kept reduced mod p by the
/// curve operations that produce them.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum AffinePoint {
    Infinity,
    Coordinates(BigUint, BigUint),
}

impl AffinePoint {
    pub fn new(x: BigUint, y: BigUint) -> Self {
        AffinePoint::Coordinates(x, y)
    }

    pub fn is_infinity(&self) -> bool {
        matches!(self, AffinePoint::Infinity)
    }

    pub fn x(&self) -> Option<&BigUint> {
        match self {
            AffinePoint::Infinity => None,
            AffinePoint::Coordinates(x, _) => Some(x),
        }
    }

    pub fn y(&self) -> Option<&BigUint> {
        match self {
            AffinePoint::Infinity => None,
            AffinePoint::Coordinates(_, y) => Some(y),
        }
    }

    /// Encode as `0x04 || x || y` (or `0x02/0x03 || x` when `compress`),
    /// coordinates big-endian and zero-padded to the field size.
    /// Infinity is the single byte `0x00`.
    pub fn to_bytes(&self, curve: &Elliptic, compress: bool) -> Vec<u8> {
        let size = curve.field_size();
        match self {
            AffinePoint::Infinity => vec![INFINITY_TAG],
            AffinePoint::Coordinates(x, y) if compress => {
                let tag = if y.bit(0) { ODD_TAG } else { EVEN_TAG };
                let mut out = Vec::with_capacity(1 + size);
                out.push(tag);
                out.extend(to_fixed_bytes(x, size));
                out
            }
            AffinePoint::Coordinates(x, y) => {
                let mut out = Vec::with_capacity(1 + 2 * size);
                out.push(UNCOMPRESSED_TAG);
                out.extend(to_fixed_bytes(x, size));
                out.extend(to_fixed_bytes(y, size));
                out
            }
        }
    }

    /// Decode either encoding, rejecting points that are off the curve.
    pub fn from_bytes(curve: &Elliptic, bytes: &[u8]) -> Result<Self> {
        let size = curve.field_size();
        let (&tag, body) = bytes.split_first().ok_or(Error::InvalidPointEncoding)?;
        let point = match tag {
            INFINITY_TAG if body.is_empty() => return Ok(AffinePoint::Infinity),
            UNCOMPRESSED_TAG if body.len() == 2 * size => {
                let (x, y) = body.split_at(size);
                AffinePoint::new(BigUint::from_bytes_be(x), BigUint::from_bytes_be(y))
            }
            EVEN_TAG | ODD_TAG if body.len() == size => {
                let x = BigUint::from_bytes_be(body);
                curve.lift_x(&x, tag == ODD_TAG)?
            }
            _ => return Err(Error::InvalidPointEncoding),
        };
        if !curve.is_on_curve(&point) {
            return Err(Error::PointNotOnCurve);
        }
        Ok(point)
    }
}

/// Big-endian bytes of `n`, left-padded with zeros to `size`.
pub(crate) fn to_fixed_bytes(n: &BigUint, size: usize) -> Vec<u8> {
    let bytes = n.to_bytes_be();
    if bytes.len() >= size {
        return bytes[bytes.len() - size..].to_vec();
    }
    let mut out = vec![0u8; size - bytes.len()];
    out.extend(bytes);
    out
}
