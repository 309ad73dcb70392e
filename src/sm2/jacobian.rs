use num_bigint::BigUint;
use num_traits::{One, Zero};

use crate::sm2::core::Elliptic;
use crate::sm2::point::AffinePoint;

/// Jacobian coordinates: (x, y, z)  y^2 = x^3 + axz^4 + bz^6
/// Affine coordinates: (X = x/z^2, Y = y/z^3)  Y^2 = X^3 + aX + b
///
/// Coordinates are kept reduced mod p, so z = 0 is exactly the point at infinity.
#[derive(Clone, Debug)]
pub struct JacobianPoint(BigUint, BigUint, BigUint);

impl JacobianPoint {
    pub fn new(curve: &Elliptic, x: BigUint, y: BigUint, z: BigUint) -> Self {
        let fp = curve.field();
        JacobianPoint(fp.reduce(&x), fp.reduce(&y), fp.reduce(&z))
    }

    pub fn infinity() -> Self {
        JacobianPoint(BigUint::one(), BigUint::one(), BigUint::zero())
    }

    pub fn from_affine(point: &AffinePoint) -> Self {
        match point {
            AffinePoint::Infinity => JacobianPoint::infinity(),
            AffinePoint::Coordinates(x, y) => {
                JacobianPoint(x.clone(), y.clone(), BigUint::one())
            }
        }
    }

    pub fn is_infinity(&self) -> bool {
        self.2.is_zero()
    }

    /// (x, y, z) => 2 * (x, y, z)
    /// [Formulas](https://www.hyperelliptic.org/EFD/g1p/auto-shortw-jacobian.html#doubling-dbl-1998-cmo-2)
    ///
    /// The a*z^4 term is always kept: SM2's a is not special-cased.
    pub fn double(&self, curve: &Elliptic) -> Self {
        if self.is_infinity() {
            return self.clone();
        }
        let fp = curve.field();
        let (x, y, z) = (&self.0, &self.1, &self.2);

        let (alpha, beta) = (fp.square(z), fp.square(y));
        // delta = 4xy^2
        let delta = fp.scale(&fp.mul(x, &beta), 4);
        // t1 = az^4
        let t1 = fp.mul(curve.a(), &fp.square(&alpha));
        // t2 = 8y^4
        let t2 = fp.scale(&fp.square(&beta), 8);
        // gama = 3x^2 + az^4
        let gama = fp.add(&fp.scale(&fp.square(x), 3), &t1);
        // rx = (3x^2 + az^4)^2 - 8xy^2
        let rx = fp.sub(&fp.sub(&fp.square(&gama), &delta), &delta);
        let ry = fp.sub(&fp.mul(&fp.sub(&delta, &rx), &gama), &t2);
        // rz = (y+z)^2 - z^2 - y^2 = 2yz
        let rz = fp.sub(&fp.sub(&fp.square(&fp.add(y, z)), &alpha), &beta);

        JacobianPoint(rx, ry, rz)
    }

    /// (x1, y1, z1) + (x2, y2, z2)
    /// [Formulas](https://www.hyperelliptic.org/EFD/g1p/auto-shortw-jacobian.html#addition-add-1998-cmo-2)
    ///
    /// Handles infinity on either side, P + P and P + (-P).
    pub fn add(&self, other: &JacobianPoint, curve: &Elliptic) -> Self {
        if self.is_infinity() {
            return other.clone();
        }
        if other.is_infinity() {
            return self.clone();
        }
        let fp = curve.field();
        let (x1, y1, z1) = (&self.0, &self.1, &self.2);
        let (x2, y2, z2) = (&other.0, &other.1, &other.2);

        let z1z1 = fp.square(z1);
        let z2z2 = fp.square(z2);
        let u1 = fp.mul(x1, &z2z2);
        let u2 = fp.mul(x2, &z1z1);
        let s1 = fp.mul(y1, &fp.mul(z2, &z2z2));
        let s2 = fp.mul(y2, &fp.mul(z1, &z1z1));

        if u1 == u2 {
            if s1 != s2 {
                return JacobianPoint::infinity();
            }
            return self.double(curve);
        }

        let h = fp.sub(&u2, &u1);
        let r = fp.sub(&s2, &s1);
        let hh = fp.square(&h);
        let hhh = fp.mul(&h, &hh);
        let v = fp.mul(&u1, &hh);

        // x3 = r^2 - h^3 - 2 u1 h^2
        let x3 = fp.sub(&fp.sub(&fp.square(&r), &hhh), &fp.scale(&v, 2));
        // y3 = r (u1 h^2 - x3) - s1 h^3
        let y3 = fp.sub(&fp.mul(&r, &fp.sub(&v, &x3)), &fp.mul(&s1, &hhh));
        // z3 = z1 z2 h
        let z3 = fp.mul(&fp.mul(z1, z2), &h);

        JacobianPoint(x3, y3, z3)
    }

    /// Back to affine with a single inversion of z.
    pub fn to_affine(&self, curve: &Elliptic) -> AffinePoint {
        let fp = curve.field();
        let z = fp.reduce(&self.2);
        if z.is_zero() {
            return AffinePoint::Infinity;
        }
        let alpha = fp.invert(&z);
        let beta = fp.square(&alpha);
        let gama = fp.mul(&alpha, &beta);

        AffinePoint::new(fp.mul(&self.0, &beta), fp.mul(&self.1, &gama))
    }
}
