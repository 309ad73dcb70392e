use std::fmt;
use std::marker::PhantomData;

use digest::Digest;
use rand::{CryptoRng, RngCore};
use sm3::Sm3;

use crate::error::Result;
use crate::sm2::core::Elliptic;
use crate::sm2::ecc::{KeyDerivation, Mode};
use crate::sm2::key::{KeyGenerator, KeyPair};
use crate::sm2::multiply::Strategy;

/// Protocol configuration: curve, multiplication strategy, ciphertext layout,
/// keystream derivation and the digest `D`.
///
/// ```ignore
/// let sm2 = Sm2::<Sm3>::new()
///     .with_strategy(Strategy::parallel())
///     .with_mode(Mode::C1C2C3)
///     .with_key_derivation(KeyDerivation::Kdf);
/// ```
pub struct Sm2<D = Sm3> {
    curve: Elliptic,
    strategy: Strategy,
    mode: Mode,
    derivation: KeyDerivation,
    digest: PhantomData<fn() -> D>,
}

impl<D> Sm2<D> {
    /// SM2 recommended curve, Jacobian multiplication, C1C3C2, single-hash keystream.
    pub fn new() -> Self {
        Sm2 {
            curve: Elliptic::sm2().clone(),
            strategy: Strategy::default(),
            mode: Mode::default(),
            derivation: KeyDerivation::default(),
            digest: PhantomData,
        }
    }

    pub fn with_curve(mut self, curve: Elliptic) -> Self {
        self.curve = curve;
        self
    }

    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_key_derivation(mut self, derivation: KeyDerivation) -> Self {
        self.derivation = derivation;
        self
    }

    pub fn curve(&self) -> &Elliptic {
        &self.curve
    }

    pub fn strategy(&self) -> &Strategy {
        &self.strategy
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn key_derivation(&self) -> KeyDerivation {
        self.derivation
    }

    pub fn key_generator(&self) -> KeyGenerator<'_> {
        KeyGenerator::new(&self.curve, self.strategy)
    }

    pub fn generate_key_pair<R: RngCore + CryptoRng + ?Sized>(
        &self,
        rng: &mut R,
    ) -> Result<KeyPair> {
        self.key_generator().gen_key_pair(rng)
    }
}

impl<D: Digest> Sm2<D> {
    pub fn digest_size() -> usize {
        <D as Digest>::output_size()
    }
}

impl<D> Default for Sm2<D> {
    fn default() -> Self {
        Sm2::new()
    }
}

impl<D> Clone for Sm2<D> {
    fn clone(&self) -> Self {
        Sm2 {
            curve: self.curve.clone(),
            strategy: self.strategy,
            mode: self.mode,
            derivation: self.derivation,
            digest: PhantomData,
        }
    }
}

impl<D> fmt::Debug for Sm2<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sm2")
            .field("strategy", &self.strategy)
            .field("mode", &self.mode)
            .field("derivation", &self.derivation)
            .finish()
    }
}
