use std::panic;
use std::thread;

use log::debug;
use num_bigint::BigUint;
use num_traits::{One, Zero};

use crate::sm2::core::Elliptic;
use crate::sm2::jacobian::JacobianPoint;
use crate::sm2::point::AffinePoint;

pub const DEFAULT_WINDOW: u32 = 4;
pub const MAX_WINDOW: u32 = 8;
pub const DEFAULT_WORKERS: usize = 4;

/// Scalar multiplication k * P.
///
/// Every implementation returns the same point for the same input, including
/// k = 0 and P = infinity, both of which give infinity.
pub trait Multiplication {
    fn multiply(&self, curve: &Elliptic, k: &BigUint, point: &AffinePoint) -> AffinePoint;
}

/// Right-to-left binary double-and-add on affine points. Reference
/// implementation, one inversion per group operation.
#[derive(Clone, Copy, Debug, Default)]
pub struct DoubleAndAdd;

impl Multiplication for DoubleAndAdd {
    fn multiply(&self, curve: &Elliptic, k: &BigUint, point: &AffinePoint) -> AffinePoint {
        let mut result = AffinePoint::Infinity;
        let mut addend = point.clone();
        for i in 0..k.bits() {
            if k.bit(i) {
                result = curve.add(&result, &addend);
            }
            addend = curve.double(&addend);
        }
        result
    }
}

/// Fixed-window multiplication over a cached table of 2^w multiples of P.
///
/// Windows are consumed from the most significant end: the running result
/// is doubled w times (moving every earlier contribution up by one window
/// position) before the next window's table entry is added. All-zero windows
/// skip the addition.
#[derive(Clone, Copy, Debug)]
pub struct FixedWindow {
    width: u32,
}

impl FixedWindow {
    /// Widths are clamped to `1..=MAX_WINDOW`.
    pub fn new(width: u32) -> Self {
        FixedWindow { width: width.clamp(1, MAX_WINDOW) }
    }

    pub fn width(&self) -> u32 {
        self.width
    }
}

impl Default for FixedWindow {
    fn default() -> Self {
        FixedWindow::new(DEFAULT_WINDOW)
    }
}

impl Multiplication for FixedWindow {
    fn multiply(&self, curve: &Elliptic, k: &BigUint, point: &AffinePoint) -> AffinePoint {
        if k.is_zero() || point.is_infinity() {
            return AffinePoint::Infinity;
        }
        let table = curve.tables().get_or_build(curve, point, self.width);
        let width = u64::from(self.width);
        let windows = (k.bits() + width - 1) / width;

        let mut result = AffinePoint::Infinity;
        for i in (0..windows).rev() {
            for _ in 0..width {
                result = curve.double(&result);
            }
            let digit = window_at(k, i * width, width);
            if digit != 0 {
                result = curve.add(&result, table.get(digit));
            }
        }
        result
    }
}

/// Bits [offset, offset + width) of k as a table index.
fn window_at(k: &BigUint, offset: u64, width: u64) -> usize {
    (0..width).fold(0usize, |acc, j| acc | (usize::from(k.bit(offset + j)) << j))
}

/// Double-and-add with every intermediate point held in Jacobian
/// coordinates; the only inversion happens in the final conversion.
#[derive(Clone, Copy, Debug, Default)]
pub struct JacobianDoubleAndAdd;

impl Multiplication for JacobianDoubleAndAdd {
    fn multiply(&self, curve: &Elliptic, k: &BigUint, point: &AffinePoint) -> AffinePoint {
        let mut result = JacobianPoint::infinity();
        let mut addend = JacobianPoint::from_affine(point);
        for i in 0..k.bits() {
            if k.bit(i) {
                result = result.add(&addend, curve);
            }
            addend = addend.double(curve);
        }
        result.to_affine(curve)
    }
}

/// Splits k into `workers` contiguous bit chunks, multiplies each chunk on its
/// own thread with the fixed-window method, and recombines.
///
/// With c = ceil(bits(k) / workers), chunk i holds bits [i*c, (i+1)*c) and
/// k = sum(chunk_i * 2^(i*c)), so each partial chunk_i * P is doubled i*c times
/// before the partials are added.
#[derive(Clone, Copy, Debug)]
pub struct ParallelWindow {
    workers: usize,
    window: FixedWindow,
}

impl ParallelWindow {
    pub fn new(workers: usize, width: u32) -> Self {
        ParallelWindow {
            workers: workers.max(1),
            window: FixedWindow::new(width),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }
}

impl Default for ParallelWindow {
    fn default() -> Self {
        ParallelWindow::new(DEFAULT_WORKERS, DEFAULT_WINDOW)
    }
}

impl Multiplication for ParallelWindow {
    fn multiply(&self, curve: &Elliptic, k: &BigUint, point: &AffinePoint) -> AffinePoint {
        if k.is_zero() || point.is_infinity() {
            return AffinePoint::Infinity;
        }
        let bits = k.bits() as usize;
        let chunk = (bits + self.workers - 1) / self.workers;
        let mask = (BigUint::one() << chunk) - 1u32;
        debug!("splitting {}-bit scalar into {} chunks of {} bits", bits, self.workers, chunk);

        let partials: Vec<AffinePoint> = thread::scope(|s| {
            let handles: Vec<_> = (0..self.workers)
                .map(|i| {
                    let shift = i * chunk;
                    let part = (k >> shift) & &mask;
                    let window = self.window;
                    s.spawn(move || {
                        let partial = window.multiply(curve, &part, point);
                        curve.double_times(&partial, shift)
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().unwrap_or_else(|e| panic::resume_unwind(e)))
                .collect()
        });

        partials.iter().fold(AffinePoint::Infinity, |acc, partial| curve.add(&acc, partial))
    }
}

/// Selects one of the multiplication algorithms. `Jacobian` is the default
/// used by the protocol layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Strategy {
    Naive,
    Window { width: u32 },
    #[default]
    Jacobian,
    Parallel { workers: usize, width: u32 },
}

impl Strategy {
    pub fn window() -> Self {
        Strategy::Window { width: DEFAULT_WINDOW }
    }

    pub fn parallel() -> Self {
        Strategy::Parallel { workers: DEFAULT_WORKERS, width: DEFAULT_WINDOW }
    }

    /// Every strategy, with default parameters.
    pub fn all() -> [Strategy; 4] {
        [Strategy::Naive, Strategy::window(), Strategy::Jacobian, Strategy::parallel()]
    }
}

impl Multiplication for Strategy {
    fn multiply(&self, curve: &Elliptic, k: &BigUint, point: &AffinePoint) -> AffinePoint {
        match *self {
            Strategy::Naive => DoubleAndAdd.multiply(curve, k, point),
            Strategy::Window { width } => FixedWindow::new(width).multiply(curve, k, point),
            Strategy::Jacobian => JacobianDoubleAndAdd.multiply(curve, k, point),
            Strategy::Parallel { workers, width } => {
                ParallelWindow::new(workers, width).multiply(curve, k, point)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sm2::core::tests::{pt, toy};

    /// k * G on the toy curve for k = 0..=28, G = (0, 1) of order 28.
    fn toy_multiples() -> Vec<AffinePoint> {
        let coords = [
            (0, 1), (6, 19), (3, 13), (13, 16), (18, 3), (7, 11), (11, 3),
            (5, 19), (19, 18), (12, 4), (1, 16), (17, 20), (9, 16), (4, 0),
            (9, 7), (17, 3), (1, 7), (12, 19), (19, 5), (5, 4), (11, 20),
            (7, 12), (18, 20), (13, 7), (3, 10), (6, 4), (0, 22),
        ];
        let mut out = vec![AffinePoint::Infinity];
        out.extend(coords.iter().map(|&(x, y)| pt(x, y)));
        out.push(AffinePoint::Infinity);
        out
    }

    fn strategies() -> Vec<Strategy> {
        let mut all = Strategy::all().to_vec();
        all.extend([
            Strategy::Window { width: 1 },
            Strategy::Window { width: 3 },
            Strategy::Parallel { workers: 1, width: 4 },
            Strategy::Parallel { workers: 3, width: 2 },
            Strategy::Parallel { workers: 8, width: 4 },
        ]);
        all
    }

    #[test]
    fn toy_multiples_for_every_strategy() {
        let curve = toy();
        let expected = toy_multiples();
        for strategy in strategies() {
            for (k, point) in expected.iter().enumerate() {
                let k = BigUint::from(k);
                assert_eq!(&curve.multiply_base(&k, &strategy), point, "{:?} k={}", strategy, k);
            }
            // order 28: 29G = G, 56G = infinity
            assert_eq!(curve.multiply_base(&BigUint::from(29u32), &strategy), pt(0, 1));
            let k = BigUint::from(56u32);
            assert_eq!(curve.multiply_base(&k, &strategy), AffinePoint::Infinity);
        }
    }

    #[test]
    fn infinity_and_zero() {
        let curve = Elliptic::sm2();
        for strategy in strategies() {
            assert_eq!(curve.multiply_base(&BigUint::zero(), &strategy), AffinePoint::Infinity);
            assert_eq!(
                curve.multiply(&BigUint::from(12345u32), &AffinePoint::Infinity, &strategy),
                AffinePoint::Infinity
            );
        }
    }

    #[test]
    fn sm2_order_edges() {
        let curve = Elliptic::sm2();
        let n = curve.n();
        let g = curve.generator();
        let minus_g = curve.negate(g);
        for strategy in Strategy::all() {
            assert_eq!(curve.multiply_base(&BigUint::one(), &strategy), *g);
            assert_eq!(curve.multiply_base(&(n - 1u32), &strategy), minus_g, "{:?}", strategy);
            assert_eq!(curve.multiply_base(n, &strategy), AffinePoint::Infinity, "{:?}", strategy);
        }
    }

    #[test]
    fn known_public_key() {
        let curve = Elliptic::sm2();
        let d = BigUint::parse_bytes(b"6aea1ccf610488aaa7fddba3dd6d76d3bdfd50f957d847be3d453defb695f28e", 16).unwrap();
        let x = BigUint::parse_bytes(b"a8af64e38eea41c254df769b5b41fbaa2d77b226b301a2636d463c52b46c7772", 16).unwrap();
        let y = BigUint::parse_bytes(b"30ad1714e686dd641b9e04596530b38f6a64215b0ed3b081f8641724c5443a6e", 16).unwrap();
        let expected = AffinePoint::new(x, y);
        for strategy in Strategy::all() {
            assert_eq!(curve.multiply_base(&d, &strategy), expected, "{:?}", strategy);
        }
    }

    #[test]
    fn window_digits() {
        let k = BigUint::from(0b1011_0110u32);
        assert_eq!(window_at(&k, 0, 4), 0b0110);
        assert_eq!(window_at(&k, 4, 4), 0b1011);
        assert_eq!(window_at(&k, 8, 4), 0);
        assert_eq!(window_at(&k, 6, 4), 0b10);
    }

    #[test]
    fn parallel_worker_counts_agree() {
        let curve = Elliptic::sm2();
        let k = BigUint::parse_bytes(b"59276e27d506861a16680f3ad9c02dccef3cc1fa3cdbe4ce6d54b80deac1bc21", 16).unwrap();
        let expected = FixedWindow::default().multiply(curve, &k, curve.generator());
        for workers in [1, 2, 4, 8, 300] {
            let parallel = ParallelWindow::new(workers, DEFAULT_WINDOW);
            let result = parallel.multiply(curve, &k, curve.generator());
            assert_eq!(result, expected, "workers={}", workers);
        }
        // a scalar shorter than the worker count leaves empty chunks
        let small = BigUint::from(5u32);
        assert_eq!(
            ParallelWindow::new(8, 4).multiply(curve, &small, curve.generator()),
            DoubleAndAdd.multiply(curve, &small, curve.generator())
        );
    }

    #[test]
    fn window_width_is_clamped() {
        assert_eq!(FixedWindow::new(0).width(), 1);
        assert_eq!(FixedWindow::new(64).width(), MAX_WINDOW);
        assert_eq!(ParallelWindow::new(0, 4).workers(), 1);
    }
}
