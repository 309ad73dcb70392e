use rand::rngs::OsRng;
use sm3::Sm3;

pub use crate::sm2::context::Sm2;
pub use crate::sm2::core::Elliptic;
pub use crate::sm2::dsa::{Signature, SIGNATURE_SIZE};
pub use crate::sm2::ecc::{Ciphertext, KeyDerivation, Mode};
pub use crate::sm2::field::PrimeField;
pub use crate::sm2::jacobian::JacobianPoint;
pub use crate::sm2::key::{HexKey, KeyGenerator, KeyPair, PrivateKey, PublicKey, MAX_ATTEMPTS};
pub use crate::sm2::multiply::{
    DoubleAndAdd, FixedWindow, JacobianDoubleAndAdd, Multiplication, ParallelWindow, Strategy,
    DEFAULT_WINDOW, DEFAULT_WORKERS,
};
pub use crate::sm2::params::DEFAULT_USER_ID;
pub use crate::sm2::point::AffinePoint;
pub use crate::sm2::table::{PrecomputedTable, TableCache, TABLE_CAPACITY};

use crate::error::Result;

mod context;
mod core;
mod dsa;
mod ecc;
mod field;
mod jacobian;
mod key;
mod multiply;
mod params;
mod point;
mod table;

/// (private key, uncompressed public key) as hex.
pub fn generate_key() -> Result<(String, String)> {
    let pair = Sm2::<Sm3>::new().generate_key_pair(&mut OsRng)?;
    Ok((pair.private_key().encode(), pair.public_key().encode()))
}

/// C1C3C2 ciphertext as hex. The plaintext is at most 32 bytes.
pub fn encrypt(key: &str, plain: &[u8]) -> Result<String> {
    let puk = PublicKey::decode(key)?;
    let cipher = Sm2::<Sm3>::new().encrypt(&mut OsRng, &puk, plain)?;
    Ok(hex::encode(cipher))
}

pub fn decrypt(key: &str, cipher: &str) -> Result<Vec<u8>> {
    let prk = PrivateKey::decode(key)?;
    Sm2::<Sm3>::new().decrypt(&prk, &hex::decode(cipher)?)
}

/// `r || s` as hex, signed under the default user identity.
pub fn sign(key: &str, msg: &[u8]) -> Result<String> {
    let sm2 = Sm2::<Sm3>::new();
    let pair = KeyPair::from_private_key(sm2.curve(), sm2.strategy(), PrivateKey::decode(key)?);
    let signature = sm2.sign(&mut OsRng, &pair, msg)?;
    Ok(hex::encode(signature.to_bytes()))
}

/// False for malformed keys or signatures as well as for mismatches.
pub fn verify(key: &str, msg: &[u8], signature: &str) -> bool {
    let puk = match PublicKey::decode(key) {
        Ok(puk) => puk,
        Err(_) => return false,
    };
    match parse_signature(signature) {
        Ok(signature) => Sm2::<Sm3>::new().verify(&puk, msg, &signature),
        Err(_) => false,
    }
}

fn parse_signature(signature: &str) -> Result<Signature> {
    Signature::from_bytes(&hex::decode(signature)?)
}
