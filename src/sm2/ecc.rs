use std::cmp::min;

use digest::Digest;
use log::trace;
use rand::{CryptoRng, RngCore};
use subtle::ConstantTimeEq;

use crate::error::{Error, Result};
use crate::sm2::context::Sm2;
use crate::sm2::core::Elliptic;
use crate::sm2::key::{random_scalar, PrivateKey, PublicKey, MAX_ATTEMPTS};
use crate::sm2::point::{to_fixed_bytes, AffinePoint, UNCOMPRESSED_TAG};

/// Byte order of the ciphertext parts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Mode {
    C1C2C3,
    #[default]
    C1C3C2,
}

/// How the keystream masking C2 is derived from the shared point (x2, y2).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum KeyDerivation {
    /// hash(x2 || y2), one digest long. Longer plaintexts are rejected.
    #[default]
    SingleHash,
    /// hash(x2 || y2 || ct) for ct = 1, 2, ... as a 32-bit big-endian counter,
    /// concatenated to any length.
    Kdf,
}

/// C1: ephemeral point kG, C3: integrity tag, C2: masked payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ciphertext {
    c1: AffinePoint,
    c3: Vec<u8>,
    c2: Vec<u8>,
}

impl Ciphertext {
    pub fn new(c1: AffinePoint, c3: Vec<u8>, c2: Vec<u8>) -> Self {
        Ciphertext { c1, c3, c2 }
    }

    pub fn c1(&self) -> &AffinePoint {
        &self.c1
    }

    pub fn c2(&self) -> &[u8] {
        &self.c2
    }

    pub fn c3(&self) -> &[u8] {
        &self.c3
    }

    /// C1 uncompressed, then C3 and C2 in the order given by `mode`.
    pub fn to_vec(&self, curve: &Elliptic, mode: Mode) -> Vec<u8> {
        let c1 = self.c1.to_bytes(curve, false);
        let mut out = Vec::with_capacity(c1.len() + self.c3.len() + self.c2.len());
        out.extend(c1);
        match mode {
            Mode::C1C3C2 => {
                out.extend(&self.c3);
                out.extend(&self.c2);
            }
            Mode::C1C2C3 => {
                out.extend(&self.c2);
                out.extend(&self.c3);
            }
        }
        out
    }

    /// Parses and checks C1; C3 is `digest_size` bytes, C2 is the rest.
    pub fn from_slice(
        curve: &Elliptic,
        bytes: &[u8],
        mode: Mode,
        digest_size: usize,
    ) -> Result<Self> {
        let c1_len = 1 + 2 * curve.field_size();
        if bytes.len() < c1_len + digest_size || bytes[0] != UNCOMPRESSED_TAG {
            return Err(Error::InvalidCiphertextFormat);
        }
        let (c1, rest) = bytes.split_at(c1_len);
        let c1 = AffinePoint::from_bytes(curve, c1)?;
        let (c3, c2) = match mode {
            Mode::C1C3C2 => rest.split_at(digest_size),
            Mode::C1C2C3 => {
                let (c2, c3) = rest.split_at(rest.len() - digest_size);
                (c3, c2)
            }
        };
        Ok(Ciphertext::new(c1, c3.to_vec(), c2.to_vec()))
    }
}

impl<D: Digest> Sm2<D> {
    /// Encrypt to the configured byte layout.
    pub fn encrypt<R: RngCore + CryptoRng + ?Sized>(
        &self,
        rng: &mut R,
        key: &PublicKey,
        plain: &[u8],
    ) -> Result<Vec<u8>> {
        let cipher = self.encrypt_to_cipher(rng, key, plain)?;
        Ok(cipher.to_vec(self.curve(), self.mode()))
    }

    /// 1. k ∈ [1, n-1], C1 = kG
    /// 2. (x2, y2) = kQ, failing if infinite
    /// 3. t = keystream(x2, y2), C2 = M ^ t
    /// 4. C3 = hash(x2 || M || y2)
    pub fn encrypt_to_cipher<R: RngCore + CryptoRng + ?Sized>(
        &self,
        rng: &mut R,
        key: &PublicKey,
        plain: &[u8],
    ) -> Result<Ciphertext> {
        self.check_length(plain.len())?;
        let curve = self.curve();
        for attempt in 1..=MAX_ATTEMPTS {
            let k = random_scalar(rng, curve.n())?;
            let c1 = curve.multiply_base(&k, self.strategy());
            let (x2, y2) = self.shared_secret(&curve.multiply(&k, key.point(), self.strategy()))?;

            let keystream = self.keystream(&x2, &y2, plain.len());
            if self.is_degenerate(&keystream) {
                trace!("all zero keystream, resampling k (attempt {})", attempt);
                continue;
            }
            let c2 = xor(plain, &keystream);
            let c3 = Self::integrity_tag(&x2, plain, &y2);
            return Ok(Ciphertext::new(c1, c3, c2));
        }
        Err(Error::RetryLimitExceeded(MAX_ATTEMPTS))
    }

    /// Decrypt from the configured byte layout.
    pub fn decrypt(&self, key: &PrivateKey, cipher: &[u8]) -> Result<Vec<u8>> {
        let cipher =
            Ciphertext::from_slice(self.curve(), cipher, self.mode(), Self::digest_size())?;
        self.decrypt_cipher(key, &cipher)
    }

    /// (x2, y2) = d * C1, M = C2 ^ keystream, then C3 is checked in constant time.
    /// C1 must lie on the curve.
    pub fn decrypt_cipher(&self, key: &PrivateKey, cipher: &Ciphertext) -> Result<Vec<u8>> {
        self.check_length(cipher.c2().len())?;
        let curve = self.curve();
        if !curve.is_on_curve(cipher.c1()) {
            return Err(Error::PointNotOnCurve);
        }
        let shared = curve.multiply(key.scalar(), cipher.c1(), self.strategy());
        let (x2, y2) = self.shared_secret(&shared)?;

        let keystream = self.keystream(&x2, &y2, cipher.c2().len());
        if self.is_degenerate(&keystream) {
            return Err(Error::ZeroKeystream);
        }
        let plain = xor(cipher.c2(), &keystream);
        let u = Self::integrity_tag(&x2, &plain, &y2);
        if !bool::from(u.as_slice().ct_eq(cipher.c3())) {
            return Err(Error::IntegrityCheckFailed);
        }
        Ok(plain)
    }

    fn check_length(&self, len: usize) -> Result<()> {
        let max = Self::digest_size();
        match self.key_derivation() {
            KeyDerivation::SingleHash if len > max => Err(Error::PlaintextTooLong { len, max }),
            _ => Ok(()),
        }
    }

    /// Fixed-width x2 and y2 of the shared point.
    fn shared_secret(&self, point: &AffinePoint) -> Result<(Vec<u8>, Vec<u8>)> {
        let size = self.curve().field_size();
        match point {
            AffinePoint::Infinity => Err(Error::SharedSecretAtInfinity),
            AffinePoint::Coordinates(x, y) => {
                Ok((to_fixed_bytes(x, size), to_fixed_bytes(y, size)))
            }
        }
    }

    fn keystream(&self, x2: &[u8], y2: &[u8], len: usize) -> Vec<u8> {
        match self.key_derivation() {
            KeyDerivation::SingleHash => {
                let block = D::new().chain_update(x2).chain_update(y2).finalize();
                block.iter().copied().take(len).collect()
            }
            KeyDerivation::Kdf => {
                let mut out = Vec::with_capacity(len);
                let mut ct: u32 = 1;
                while out.len() < len {
                    let block = D::new()
                        .chain_update(x2)
                        .chain_update(y2)
                        .chain_update(ct.to_be_bytes())
                        .finalize();
                    let take = min(block.len(), len - out.len());
                    out.extend_from_slice(&block[..take]);
                    ct = ct.wrapping_add(1);
                }
                out
            }
        }
    }

    /// A KDF stream of zeros would leave the plaintext in the clear.
    fn is_degenerate(&self, keystream: &[u8]) -> bool {
        self.key_derivation() == KeyDerivation::Kdf
            && !keystream.is_empty()
            && keystream.iter().all(|&b| b == 0)
    }

    /// hash(x2 || M || y2)
    fn integrity_tag(x2: &[u8], plain: &[u8], y2: &[u8]) -> Vec<u8> {
        D::new().chain_update(x2).chain_update(plain).chain_update(y2).finalize().to_vec()
    }
}

fn xor(data: &[u8], keystream: &[u8]) -> Vec<u8> {
    data.iter().zip(keystream).map(|(a, b)| a ^ b).collect()
}

#[cfg(test)]
mod tests {
    use num_bigint::BigUint;
    use rand::rngs::OsRng;
    use sha2::Sha256;
    use sm3::Sm3;

    use super::*;
    use crate::sm2::key::HexKey;
    use crate::sm2::multiply::{Strategy, MAX_WINDOW};
    use crate::sm2::table::TABLE_CAPACITY;

    const PRK: &str = "6aea1ccf610488aaa7fddba3dd6d76d3bdfd50f957d847be3d453defb695f28e";
    const PUK: &str = "04a8af64e38eea41c254df769b5b41fbaa2d77b226b301a2636d463c52b46c777230ad1714e686dd641b9e04596530b38f6a64215b0ed3b081f8641724c5443a6e";
    const TEXT: &str = "圣光会抛弃你的，英雄，就像抛弃我那样。——巫妖王";

    fn keys() -> (PrivateKey, PublicKey) {
        (PrivateKey::decode(PRK).unwrap(), PublicKey::decode(PUK).unwrap())
    }

    #[test]
    fn single_hash_round_trip() {
        let (prk, puk) = keys();
        for mode in [Mode::C1C3C2, Mode::C1C2C3] {
            let sm2 = Sm2::<Sm3>::new().with_mode(mode);
            let plains: [&[u8]; 4] = [b"", b"a", b"encryption standard", &[0x5a; 32]];
            for plain in plains {
                let cipher = sm2.encrypt(&mut OsRng, &puk, plain).unwrap();
                assert_eq!(cipher.len(), 65 + 32 + plain.len());
                assert_eq!(cipher[0], 0x04);
                assert_eq!(sm2.decrypt(&prk, &cipher).unwrap(), plain);
            }
        }
    }

    #[test]
    fn kdf_round_trip_long_message() {
        let (prk, puk) = keys();
        let sm2 = Sm2::<Sm3>::new().with_key_derivation(KeyDerivation::Kdf);
        let cipher = sm2.encrypt(&mut OsRng, &puk, TEXT.as_bytes()).unwrap();
        assert_eq!(sm2.decrypt(&prk, &cipher).unwrap(), TEXT.as_bytes());

        let long = vec![7u8; 1000];
        let cipher = sm2.encrypt(&mut OsRng, &puk, &long).unwrap();
        assert_eq!(sm2.decrypt(&prk, &cipher).unwrap(), long);
    }

    #[test]
    fn other_digest_and_strategy() {
        let (prk, puk) = keys();
        let sm2 = Sm2::<Sha256>::new().with_strategy(Strategy::window());
        let cipher = sm2.encrypt(&mut OsRng, &puk, b"sha-256 keystream").unwrap();
        assert_eq!(sm2.decrypt(&prk, &cipher).unwrap(), b"sha-256 keystream");
    }

    #[test]
    fn window_tables_stay_bounded() {
        let (prk, puk) = keys();
        let sm2 = Sm2::<Sm3>::new().with_strategy(Strategy::window());
        // generator tables for every width plus the shared slots for other points
        let bound = TABLE_CAPACITY + MAX_WINDOW as usize;
        for _ in 0..2 * TABLE_CAPACITY {
            let cipher = sm2.encrypt(&mut OsRng, &puk, b"fresh C1").unwrap();
            assert_eq!(sm2.decrypt(&prk, &cipher).unwrap(), b"fresh C1");
            assert!(sm2.curve().tables().len() <= bound);
        }
    }

    #[test]
    fn plaintext_too_long() {
        let (prk, puk) = keys();
        let sm2 = Sm2::<Sm3>::new();
        let err = sm2.encrypt(&mut OsRng, &puk, TEXT.as_bytes()).unwrap_err();
        assert_eq!(err, Error::PlaintextTooLong { len: TEXT.len(), max: 32 });

        let kdf = Sm2::<Sm3>::new().with_key_derivation(KeyDerivation::Kdf);
        let cipher = kdf.encrypt(&mut OsRng, &puk, TEXT.as_bytes()).unwrap();
        assert!(matches!(sm2.decrypt(&prk, &cipher), Err(Error::PlaintextTooLong { .. })));
    }

    #[test]
    fn tampering_is_detected() {
        let (prk, puk) = keys();
        let sm2 = Sm2::<Sm3>::new();
        let cipher = sm2.encrypt(&mut OsRng, &puk, b"attack at dawn").unwrap();
        for i in 65..cipher.len() {
            let mut tampered = cipher.clone();
            tampered[i] ^= 0x01;
            assert_eq!(
                sm2.decrypt(&prk, &tampered),
                Err(Error::IntegrityCheckFailed),
                "byte {}",
                i
            );
        }
    }

    #[test]
    fn malformed_ciphertext() {
        let (prk, puk) = keys();
        let sm2 = Sm2::<Sm3>::new();
        let cipher = sm2.encrypt(&mut OsRng, &puk, b"abc").unwrap();

        assert_eq!(sm2.decrypt(&prk, &cipher[..96]), Err(Error::InvalidCiphertextFormat));
        assert_eq!(sm2.decrypt(&prk, &[]), Err(Error::InvalidCiphertextFormat));

        let mut bad_tag = cipher.clone();
        bad_tag[0] = 0x02;
        assert_eq!(sm2.decrypt(&prk, &bad_tag), Err(Error::InvalidCiphertextFormat));

        let mut off_curve = cipher.clone();
        off_curve[64] ^= 0x01;
        assert_eq!(sm2.decrypt(&prk, &off_curve), Err(Error::PointNotOnCurve));
    }

    #[test]
    fn wrong_mode_fails_integrity() {
        let (prk, puk) = keys();
        let new = Sm2::<Sm3>::new();
        let old = Sm2::<Sm3>::new().with_mode(Mode::C1C2C3);
        let cipher = new.encrypt(&mut OsRng, &puk, b"mode mismatch").unwrap();
        assert_eq!(old.decrypt(&prk, &cipher), Err(Error::IntegrityCheckFailed));
    }

    #[test]
    fn infinite_c1_is_rejected() {
        let (prk, _) = keys();
        let sm2 = Sm2::<Sm3>::new();
        let cipher = Ciphertext::new(AffinePoint::Infinity, vec![0; 32], vec![1, 2, 3]);
        assert_eq!(sm2.decrypt_cipher(&prk, &cipher), Err(Error::SharedSecretAtInfinity));
    }

    #[test]
    fn off_curve_c1_is_rejected() {
        let (prk, _) = keys();
        let sm2 = Sm2::<Sm3>::new();
        let c1 = AffinePoint::new(BigUint::from(1u32), BigUint::from(1u32));
        let cipher = Ciphertext::new(c1, vec![0; 32], vec![1, 2, 3]);
        assert_eq!(sm2.decrypt_cipher(&prk, &cipher), Err(Error::PointNotOnCurve));

        // a coordinate at or above p is not a field element
        let g = sm2.curve().generator();
        if let AffinePoint::Coordinates(x, y) = g {
            let lifted = AffinePoint::new(x + sm2.curve().p(), y.clone());
            let cipher = Ciphertext::new(lifted, vec![0; 32], vec![1, 2, 3]);
            assert_eq!(sm2.decrypt_cipher(&prk, &cipher), Err(Error::PointNotOnCurve));
        }
    }

    #[test]
    fn layout_by_mode() {
        let curve = Elliptic::sm2();
        let cipher = Ciphertext::new(curve.generator().clone(), vec![0xc3; 32], vec![0xc2; 3]);
        let new = cipher.to_vec(curve, Mode::C1C3C2);
        let old = cipher.to_vec(curve, Mode::C1C2C3);
        assert_eq!(&new[65..97], &[0xc3; 32]);
        assert_eq!(&new[97..], &[0xc2; 3]);
        assert_eq!(&old[65..68], &[0xc2; 3]);
        assert_eq!(&old[68..], &[0xc3; 32]);
        assert_eq!(Ciphertext::from_slice(curve, &new, Mode::C1C3C2, 32).unwrap(), cipher);
        assert_eq!(Ciphertext::from_slice(curve, &old, Mode::C1C2C3, 32).unwrap(), cipher);
    }
}
