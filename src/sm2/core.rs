use std::sync::{Arc, OnceLock};

use num_bigint::BigUint;
use num_traits::Zero;

use crate::error::{Error, Result};
use crate::sm2::field::{is_probable_prime, PrimeField};
use crate::sm2::jacobian::JacobianPoint;
use crate::sm2::multiply::{Multiplication, Strategy};
use crate::sm2::params::{EC_A, EC_B, EC_GX, EC_GY, EC_N, EC_P};
use crate::sm2::point::AffinePoint;
use crate::sm2::table::TableCache;

/// Short Weierstrass curve over a prime field: y^2 = x^3 + ax + b.
///
/// Carries the base point `g` of order `n`, the prime field over `p`, the
/// scalar field over `n`, and the cache of precomputed window tables used by
/// the fixed-window multiplier. Clones share the cache.
///
/// The modulus must be prime: the point formulas rely on every non-zero
/// field element being invertible.
#[derive(Clone, Debug)]
pub struct Elliptic {
    fp: PrimeField,
    fn_: PrimeField,
    a: BigUint,
    b: BigUint,
    g: AffinePoint,
    tables: Arc<TableCache>,
}

impl Elliptic {
    /// Curve with caller supplied parameters. Both moduli must be prime and
    /// the base point must satisfy the curve equation.
    pub fn new(
        p: BigUint,
        a: BigUint,
        b: BigUint,
        gx: BigUint,
        gy: BigUint,
        n: BigUint,
    ) -> Result<Self> {
        if !is_probable_prime(&p) || !is_probable_prime(&n) {
            return Err(Error::CompositeModulus);
        }
        let curve = Elliptic::from_parts(p, a, b, gx, gy, n);
        if !curve.is_on_curve(&curve.g) {
            return Err(Error::PointNotOnCurve);
        }
        Ok(curve)
    }

    fn from_parts(
        p: BigUint,
        a: BigUint,
        b: BigUint,
        gx: BigUint,
        gy: BigUint,
        n: BigUint,
    ) -> Self {
        Elliptic {
            fp: PrimeField::new(p),
            fn_: PrimeField::new(n),
            a,
            b,
            g: AffinePoint::new(gx, gy),
            tables: Arc::new(TableCache::default()),
        }
    }

    /// The SM2 recommended 256-bit curve, built once per process.
    pub fn sm2() -> &'static Elliptic {
        static SM2: OnceLock<Elliptic> = OnceLock::new();
        SM2.get_or_init(|| {
            Elliptic::from_parts(
                BigUint::from_bytes_be(&EC_P),
                BigUint::from_bytes_be(&EC_A),
                BigUint::from_bytes_be(&EC_B),
                BigUint::from_bytes_be(&EC_GX),
                BigUint::from_bytes_be(&EC_GY),
                BigUint::from_bytes_be(&EC_N),
            )
        })
    }

    pub fn p(&self) -> &BigUint {
        self.fp.modulus()
    }

    pub fn a(&self) -> &BigUint {
        &self.a
    }

    pub fn b(&self) -> &BigUint {
        &self.b
    }

    pub fn n(&self) -> &BigUint {
        self.fn_.modulus()
    }

    pub fn generator(&self) -> &AffinePoint {
        &self.g
    }

    /// Arithmetic mod p.
    pub fn field(&self) -> &PrimeField {
        &self.fp
    }

    /// Arithmetic mod n.
    pub fn scalar_field(&self) -> &PrimeField {
        &self.fn_
    }

    /// Byte length of an encoded coordinate.
    pub fn field_size(&self) -> usize {
        ((self.p().bits() + 7) / 8) as usize
    }

    /// Byte length of an encoded scalar.
    pub fn scalar_size(&self) -> usize {
        ((self.n().bits() + 7) / 8) as usize
    }

    pub(crate) fn tables(&self) -> &TableCache {
        &self.tables
    }

    /// x^3 + ax + b
    fn rhs(&self, x: &BigUint) -> BigUint {
        let fp = &self.fp;
        let x3 = fp.mul(&fp.square(x), x);
        fp.add(&fp.add(&x3, &fp.mul(&self.a, x)), &self.b)
    }

    pub fn is_on_curve(&self, point: &AffinePoint) -> bool {
        match point {
            AffinePoint::Infinity => true,
            AffinePoint::Coordinates(x, y) => {
                x < self.p() && y < self.p() && self.fp.square(y) == self.rhs(x)
            }
        }
    }

    /// Recover the point with abscissa `x` and the requested parity of y.
    pub(crate) fn lift_x(&self, x: &BigUint, odd: bool) -> Result<AffinePoint> {
        if x >= self.p() {
            return Err(Error::PointNotOnCurve);
        }
        let y = self.fp.sqrt(&self.rhs(x)).ok_or(Error::PointNotOnCurve)?;
        let y = if y.bit(0) == odd { y } else { self.fp.neg(&y) };
        Ok(AffinePoint::new(x.clone(), y))
    }

    pub fn negate(&self, point: &AffinePoint) -> AffinePoint {
        match point {
            AffinePoint::Infinity => AffinePoint::Infinity,
            AffinePoint::Coordinates(x, y) => AffinePoint::new(x.clone(), self.fp.neg(y)),
        }
    }

    /// P + Q in affine coordinates.
    pub fn add(&self, p: &AffinePoint, q: &AffinePoint) -> AffinePoint {
        let (x1, y1, x2, y2) = match (p, q) {
            (AffinePoint::Infinity, _) => return q.clone(),
            (_, AffinePoint::Infinity) => return p.clone(),
            (AffinePoint::Coordinates(x1, y1), AffinePoint::Coordinates(x2, y2)) => {
                (x1, y1, x2, y2)
            }
        };
        let fp = &self.fp;
        let dx = fp.sub(x2, x1);
        if dx.is_zero() {
            // same x: either Q = -P or Q = P
            if !fp.sub(y2, y1).is_zero() {
                return AffinePoint::Infinity;
            }
            return self.double(p);
        }
        // lambda = (y2 - y1) / (x2 - x1)
        let lambda = fp.mul(&fp.sub(y2, y1), &fp.invert(&dx));
        self.chord(&lambda, x1, y1, x2)
    }

    /// 2P in affine coordinates.
    pub fn double(&self, p: &AffinePoint) -> AffinePoint {
        let (x, y) = match p {
            AffinePoint::Infinity => return AffinePoint::Infinity,
            AffinePoint::Coordinates(x, y) => (x, y),
        };
        let fp = &self.fp;
        let y = fp.reduce(y);
        if y.is_zero() {
            return AffinePoint::Infinity;
        }
        // lambda = (3x^2 + a) / 2y
        let numerator = fp.add(&fp.scale(&fp.square(x), 3), &self.a);
        let lambda = fp.mul(&numerator, &fp.invert(&fp.scale(&y, 2)));
        self.chord(&lambda, x, &y, x)
    }

    /// x3 = lambda^2 - x1 - x2, y3 = lambda(x1 - x3) - y1
    fn chord(&self, lambda: &BigUint, x1: &BigUint, y1: &BigUint, x2: &BigUint) -> AffinePoint {
        let fp = &self.fp;
        let x3 = fp.sub(&fp.sub(&fp.square(lambda), x1), x2);
        let y3 = fp.sub(&fp.mul(lambda, &fp.sub(x1, &x3)), y1);
        AffinePoint::new(x3, y3)
    }

    /// 2^times * P, doubling in Jacobian coordinates with one final inversion.
    pub fn double_times(&self, point: &AffinePoint, times: usize) -> AffinePoint {
        if times == 0 || point.is_infinity() {
            return point.clone();
        }
        let mut jacobian = JacobianPoint::from_affine(point);
        for _ in 0..times {
            jacobian = jacobian.double(self);
        }
        jacobian.to_affine(self)
    }

    /// k * P with the chosen strategy.
    pub fn multiply(&self, k: &BigUint, point: &AffinePoint, strategy: &Strategy) -> AffinePoint {
        strategy.multiply(self, k, point)
    }

    /// k * G with the chosen strategy.
    pub fn multiply_base(&self, k: &BigUint, strategy: &Strategy) -> AffinePoint {
        strategy.multiply(self, k, &self.g)
    }
}
