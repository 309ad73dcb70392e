use num_bigint::{BigInt, BigUint};
use num_integer::Integer;
use num_traits::{One, Zero};

use crate::error::{Error, Result};

/// Arithmetic modulo a fixed prime.
///
/// Operands may be any non-negative integer; every result is reduced into
/// `[0, modulus)`. Products are formed at full width (up to 512 bits for the
/// 256-bit SM2 moduli) before reduction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PrimeField {
    modulus: BigUint,
}

impl PrimeField {
    pub fn new(modulus: BigUint) -> Self {
        PrimeField { modulus }
    }

    pub fn modulus(&self) -> &BigUint {
        &self.modulus
    }

    pub fn reduce(&self, a: &BigUint) -> BigUint {
        a % &self.modulus
    }

    /// (a + b) mod p
    pub fn add(&self, a: &BigUint, b: &BigUint) -> BigUint {
        (a + b) % &self.modulus
    }

    /// (a - b) mod p
    pub fn sub(&self, a: &BigUint, b: &BigUint) -> BigUint {
        let (a, b) = (self.reduce(a), self.reduce(b));
        if a >= b {
            a - b
        } else {
            &self.modulus - b + a
        }
    }

    /// -a mod p
    pub fn neg(&self, a: &BigUint) -> BigUint {
        self.sub(&BigUint::zero(), a)
    }

    /// (a * b) mod p
    pub fn mul(&self, a: &BigUint, b: &BigUint) -> BigUint {
        (a * b) % &self.modulus
    }

    pub fn square(&self, a: &BigUint) -> BigUint {
        self.mul(a, a)
    }

    /// (n * a) mod p for a small constant n, e.g. the 2, 3, 4, 8 of the point formulas.
    pub fn scale(&self, a: &BigUint, n: u32) -> BigUint {
        (a * n) % &self.modulus
    }

    /// a^-1 mod p by the extended Euclidean algorithm.
    pub fn inverse(&self, a: &BigUint) -> Result<BigUint> {
        let a = self.reduce(a);
        if a.is_zero() {
            return Err(Error::DivisionByZero);
        }
        let m = BigInt::from(self.modulus.clone());
        let egcd = BigInt::from(a).extended_gcd(&m);
        if !egcd.gcd.is_one() {
            return Err(Error::DivisionByZero);
        }
        egcd.x.mod_floor(&m).to_biguint().ok_or(Error::DivisionByZero)
    }

    /// a / b mod p
    pub fn div(&self, a: &BigUint, b: &BigUint) -> Result<BigUint> {
        Ok(self.mul(a, &self.inverse(b)?))
    }

    /// Inverse of an element already known to be non-zero.
    ///
    /// The point formulas only divide by values their case analysis has shown
    /// to be non-zero, and every non-zero element of a prime field is
    /// invertible, so the Euclidean coefficient is returned directly.
    pub(crate) fn invert(&self, a: &BigUint) -> BigUint {
        let m = BigInt::from(self.modulus.clone());
        let egcd = BigInt::from(self.reduce(a)).extended_gcd(&m);
        debug_assert!(egcd.gcd.is_one(), "no inverse modulo {}", self.modulus);
        egcd.x.mod_floor(&m).to_biguint().unwrap_or_default()
    }

    /// Square root for moduli with p = 3 mod 4, `None` for non-residues.
    pub fn sqrt(&self, a: &BigUint) -> Option<BigUint> {
        let four = BigUint::from(4u32);
        if &self.modulus % &four != BigUint::from(3u32) {
            return None;
        }
        let a = self.reduce(a);
        let exp = (&self.modulus + BigUint::one()) / four;
        let root = a.modpow(&exp, &self.modulus);
        if self.square(&root) == a {
            Some(root)
        } else {
            None
        }
    }
}

/// Miller-Rabin over the first twelve prime bases. Exact below 3.3 * 10^24,
/// a strong probable-prime test above.
pub fn is_probable_prime(n: &BigUint) -> bool {
    const BASES: [u32; 12] = [2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37];
    let one = BigUint::one();
    if n <= &one {
        return false;
    }
    for base in BASES {
        let base = BigUint::from(base);
        if n == &base {
            return true;
        }
        if (n % &base).is_zero() {
            return false;
        }
    }
    let n_minus_1 = n - &one;
    let shift = n_minus_1.trailing_zeros().unwrap_or(0);
    let d = &n_minus_1 >> shift;
    'bases: for base in BASES {
        let mut x = BigUint::from(base).modpow(&d, n);
        if x == one || x == n_minus_1 {
            continue;
        }
        for _ in 1..shift {
            x = x.modpow(&BigUint::from(2u32), n);
            if x == n_minus_1 {
                continue 'bases;
            }
        }
        return false;
    }
    true
}
