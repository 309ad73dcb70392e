use digest::Digest;
use log::trace;
use num_bigint::BigUint;
use num_traits::Zero;
use rand::{CryptoRng, RngCore};

use crate::error::{Error, Result};
use crate::sm2::context::Sm2;
use crate::sm2::key::{random_scalar, KeyPair, PublicKey, MAX_ATTEMPTS};
use crate::sm2::params::DEFAULT_USER_ID;
use crate::sm2::point::{to_fixed_bytes, AffinePoint};

/// Raw `r || s` length.
pub const SIGNATURE_SIZE: usize = 64;

/// 签名 (r, s)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature {
    r: BigUint,
    s: BigUint,
}

impl Signature {
    pub fn new(r: BigUint, s: BigUint) -> Self {
        Signature { r, s }
    }

    pub fn r(&self) -> &BigUint {
        &self.r
    }

    pub fn s(&self) -> &BigUint {
        &self.s
    }

    /// r and s as 32-byte big-endian integers.
    pub fn to_bytes(&self) -> [u8; SIGNATURE_SIZE] {
        let half = SIGNATURE_SIZE / 2;
        let mut out = [0u8; SIGNATURE_SIZE];
        out[..half].copy_from_slice(&to_fixed_bytes(&self.r, half));
        out[half..].copy_from_slice(&to_fixed_bytes(&self.s, half));
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != SIGNATURE_SIZE {
            return Err(Error::InvalidSignatureLength {
                expected: SIGNATURE_SIZE,
                actual: bytes.len(),
            });
        }
        let (r, s) = bytes.split_at(SIGNATURE_SIZE / 2);
        Ok(Signature::new(BigUint::from_bytes_be(r), BigUint::from_bytes_be(s)))
    }

    /// Both components in [1, n-1].
    pub fn check_range(&self, n: &BigUint) -> Result<()> {
        let valid = |v: &BigUint| !v.is_zero() && v < n;
        if valid(&self.r) && valid(&self.s) {
            Ok(())
        } else {
            Err(Error::InvalidSignatureRange)
        }
    }
}

impl<D: Digest> Sm2<D> {
    /// ZA = H(ENTL || ID || a || b || xG || yG || xA || yA)
    ///
    /// ENTL is the bit length of ID as a 2-byte big-endian integer.
    pub fn za(&self, user_id: &[u8], key: &PublicKey) -> Result<Vec<u8>> {
        let entl: u16 = user_id
            .len()
            .checked_mul(8)
            .and_then(|bits| bits.try_into().ok())
            .ok_or(Error::IdentityTooLong(user_id.len()))?;

        let curve = self.curve();
        let size = curve.field_size();
        let mut hasher = D::new();
        hasher.update(entl.to_be_bytes());
        hasher.update(user_id);
        hasher.update(to_fixed_bytes(curve.a(), size));
        hasher.update(to_fixed_bytes(curve.b(), size));
        // 0x04 || x || y without the tag, for G and the key
        hasher.update(&curve.generator().to_bytes(curve, false)[1..]);
        hasher.update(&key.to_bytes(curve, false)[1..]);
        Ok(hasher.finalize().to_vec())
    }

    /// e = H(ZA || M)
    fn message_digest(&self, user_id: &[u8], key: &PublicKey, msg: &[u8]) -> Result<BigUint> {
        let za = self.za(user_id, key)?;
        let e = D::new().chain_update(za).chain_update(msg).finalize();
        Ok(BigUint::from_bytes_be(&e))
    }

    pub fn sign<R: RngCore + CryptoRng + ?Sized>(
        &self,
        rng: &mut R,
        pair: &KeyPair,
        msg: &[u8],
    ) -> Result<Signature> {
        self.sign_with_id(rng, pair, msg, DEFAULT_USER_ID)
    }

    /// 1. e = H(ZA || M)
    /// 2. k ∈ [1, n-1], (x1, y1) = kG
    /// 3. r = (e + x1) mod n, retry if r = 0 or r + k = n
    /// 4. s = (1 + d)^-1 (k - rd) mod n, retry if s = 0
    pub fn sign_with_id<R: RngCore + CryptoRng + ?Sized>(
        &self,
        rng: &mut R,
        pair: &KeyPair,
        msg: &[u8],
        user_id: &[u8],
    ) -> Result<Signature> {
        let curve = self.curve();
        let scalar = curve.scalar_field();
        let d = pair.private_key().scalar();
        let e = self.message_digest(user_id, pair.public_key(), msg)?;
        let inv = scalar.inverse(&(d + 1u32))?;

        for attempt in 1..=MAX_ATTEMPTS {
            let k = random_scalar(rng, curve.n())?;
            let x1 = match curve.multiply_base(&k, self.strategy()) {
                AffinePoint::Coordinates(x, _) => x,
                AffinePoint::Infinity => continue,
            };
            let r = scalar.add(&e, &x1);
            if r.is_zero() || scalar.add(&r, &k).is_zero() {
                trace!("degenerate r, resampling k (attempt {})", attempt);
                continue;
            }
            let s = scalar.mul(&inv, &scalar.sub(&k, &scalar.mul(&r, d)));
            if s.is_zero() {
                trace!("degenerate s, resampling k (attempt {})", attempt);
                continue;
            }
            return Ok(Signature::new(r, s));
        }
        Err(Error::RetryLimitExceeded(MAX_ATTEMPTS))
    }

    pub fn verify(&self, key: &PublicKey, msg: &[u8], signature: &Signature) -> bool {
        self.verify_with_id(key, msg, signature, DEFAULT_USER_ID)
    }

    /// Accepts iff (e + x1) mod n == r for (x1, y1) = sG + (r + s)Q.
    pub fn verify_with_id(
        &self,
        key: &PublicKey,
        msg: &[u8],
        signature: &Signature,
        user_id: &[u8],
    ) -> bool {
        let curve = self.curve();
        let scalar = curve.scalar_field();
        if signature.check_range(curve.n()).is_err() {
            return false;
        }
        let e = match self.message_digest(user_id, key, msg) {
            Ok(e) => e,
            Err(_) => return false,
        };
        let t = scalar.add(signature.r(), signature.s());
        if t.is_zero() {
            return false;
        }
        let point = curve.add(
            &curve.multiply_base(signature.s(), self.strategy()),
            &curve.multiply(&t, key.point(), self.strategy()),
        );
        match point {
            AffinePoint::Infinity => false,
            AffinePoint::Coordinates(x1, _) => scalar.add(&e, &x1) == *signature.r(),
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::OsRng;
    use sha2::Sha256;
    use sm3::Sm3;

    use super::*;
    use crate::sm2::key::{HexKey, PrivateKey};
    use crate::sm2::multiply::Strategy;

    const PRK: &str = "6aea1ccf610488aaa7fddba3dd6d76d3bdfd50f957d847be3d453defb695f28e";

    fn pair() -> KeyPair {
        let sm2 = Sm2::<Sm3>::new();
        KeyPair::from_private_key(sm2.curve(), sm2.strategy(), PrivateKey::decode(PRK).unwrap())
    }

    #[test]
    fn sign_verify() {
        let sm2 = Sm2::<Sm3>::new();
        let pair = pair();
        let text = "圣光会抛弃你的，英雄，就像抛弃我那样。——巫妖王".as_bytes();
        let signature = sm2.sign(&mut OsRng, &pair, text).unwrap();
        assert!(sm2.verify(pair.public_key(), text, &signature));
        assert!(!sm2.verify(pair.public_key(), b"another message", &signature));
        assert!(!sm2.verify_with_id(pair.public_key(), text, &signature, b"someone@else"));

        let other = sm2.generate_key_pair(&mut OsRng).unwrap();
        assert!(!sm2.verify(other.public_key(), text, &signature));
    }

    #[test]
    fn custom_identity_and_digest() {
        let sm2 = Sm2::<Sha256>::new().with_strategy(Strategy::window());
        let pair = pair();
        let id = b"alice@example.com";
        let signature = sm2.sign_with_id(&mut OsRng, &pair, b"msg", id).unwrap();
        assert!(sm2.verify_with_id(pair.public_key(), b"msg", &signature, id));
        assert!(!sm2.verify(pair.public_key(), b"msg", &signature));
        assert!(!Sm2::<Sm3>::new().verify_with_id(pair.public_key(), b"msg", &signature, id));
    }

    #[test]
    fn out_of_range_components() {
        let sm2 = Sm2::<Sm3>::new();
        let pair = pair();
        let signature = sm2.sign(&mut OsRng, &pair, b"range").unwrap();
        let n = sm2.curve().n();
        let cases = [
            Signature::new(BigUint::zero(), signature.s().clone()),
            Signature::new(signature.r().clone(), BigUint::zero()),
            Signature::new(n.clone(), signature.s().clone()),
            Signature::new(signature.r().clone(), n.clone()),
        ];
        for bad in cases {
            assert_eq!(bad.check_range(n), Err(Error::InvalidSignatureRange));
            assert!(!sm2.verify(pair.public_key(), b"range", &bad));
        }
        assert!(signature.check_range(n).is_ok());
    }

    #[test]
    fn bit_flips_break_signature() {
        let sm2 = Sm2::<Sm3>::new();
        let pair = pair();
        let signature = sm2.sign(&mut OsRng, &pair, b"flip").unwrap();
        let bytes = signature.to_bytes();
        for i in [0, 17, 31, 32, 50, 63] {
            for bit in [0, 7] {
                let mut tampered = bytes;
                tampered[i] ^= 1 << bit;
                let tampered = Signature::from_bytes(&tampered).unwrap();
                assert!(
                    !sm2.verify(pair.public_key(), b"flip", &tampered),
                    "byte {} bit {}",
                    i,
                    bit
                );
            }
        }
    }

    #[test]
    fn raw_encoding() {
        let signature = Signature::new(BigUint::from(1u32), BigUint::from(0x0203u32));
        let bytes = signature.to_bytes();
        assert_eq!(bytes[31], 1);
        assert_eq!(&bytes[62..], &[2, 3]);
        assert_eq!(Signature::from_bytes(&bytes).unwrap(), signature);
        assert_eq!(
            Signature::from_bytes(&bytes[1..]),
            Err(Error::InvalidSignatureLength { expected: 64, actual: 63 })
        );
    }

    #[test]
    fn za_reference_value() {
        let sm2 = Sm2::<Sm3>::new();
        let key = PublicKey::decode(concat!(
            "04",
            "09f9df311e5421a150dd7d161e4bc5c672179fad1833fc076bb08ff356f35020",
            "ccea490ce26775a52dc6ea718cc1aa600aed05fbf35e084a6632f6072da9ad13"
        ))
        .unwrap();
        let za = sm2.za(b"1234567812345678", &key).unwrap();
        assert_eq!(hex::encode(za), "b2e14c5c79c6df5b85f4fe7ed8db7a262b9da7e07ccb0ea9f4747b8ccda8a4f3");
    }

    #[test]
    fn identity_length_limit() {
        let sm2 = Sm2::<Sm3>::new();
        let pair = pair();
        assert!(sm2.za(&vec![b'a'; 8191], pair.public_key()).is_ok());
        let long = vec![b'a'; 8192];
        assert_eq!(sm2.za(&long, pair.public_key()), Err(Error::IdentityTooLong(8192)));
        assert_eq!(
            sm2.sign_with_id(&mut OsRng, &pair, b"m", &long),
            Err(Error::IdentityTooLong(8192))
        );
    }
}
