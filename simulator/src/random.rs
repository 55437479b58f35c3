//! Reproducible source of uniform samples.
//!
//! [Glibc] implements the additive feedback generator behind the C library's `srand`/`rand`
//! pair (degree 31, separation 3). For the same seed it yields the same sequence of 31-bit
//! outputs as `rand()`, so loss, corruption, delay, and arrival decisions line up draw-for-draw
//! with any C program that seeds its emulator with `srand`.
//!
//! Samples are `rand() / 2^31` in `f64`. Event times computed from them therefore match a C
//! emulator running a `float` clock draw-for-draw, but are not bit-identical to it.

use crate::Error;
use rand::RngCore;

/// Largest value returned by [Glibc::next_u31].
pub const RAND_MAX: u32 = 0x7fff_ffff;

/// Seed used by every simulation unless overridden.
pub const DEFAULT_SEED: u32 = 9999;

/// Number of samples drawn by [calibrate].
pub const CALIBRATION_SAMPLES: usize = 1000;

/// Lowest acceptable mean of the calibration samples.
const CALIBRATION_MIN: f64 = 0.25;

/// Highest acceptable mean of the calibration samples.
const CALIBRATION_MAX: f64 = 0.75;

const DEGREE: usize = 31;
const SEPARATION: usize = 3;

/// Outputs discarded after seeding.
const WARMUP: usize = DEGREE * 10;

/// A source of samples uniformly distributed over `[0, 1)`.
pub trait Uniform {
    /// Draw the next sample.
    fn uniform(&mut self) -> f64;
}

/// Additive feedback generator compatible with the C library's `rand()`.
#[derive(Clone, Debug)]
pub struct Glibc {
    state: [u32; DEGREE],
    front: usize,
    rear: usize,
}

impl Glibc {
    /// Create a generator equivalent to calling `srand(seed)`.
    pub fn new(seed: u32) -> Self {
        // A zero seed would produce an all-zero state.
        let seed = if seed == 0 { 1 } else { seed };

        // Fill the state with a Lehmer sequence (computed with Schrage's method to match
        // the 32-bit signed arithmetic of the C library)
        let mut state = [0u32; DEGREE];
        state[0] = seed;
        let mut word = seed as i32 as i64;
        for slot in state.iter_mut().skip(1) {
            let hi = word / 127_773;
            let lo = word % 127_773;
            word = 16_807 * lo - 2_836 * hi;
            if word < 0 {
                word += 2_147_483_647;
            }
            *slot = word as u32;
        }

        let mut generator = Self {
            state,
            front: SEPARATION,
            rear: 0,
        };
        for _ in 0..WARMUP {
            generator.next_u31();
        }
        generator
    }

    /// Draw the next 31-bit output (what `rand()` would return).
    pub fn next_u31(&mut self) -> u32 {
        let value = self.state[self.front].wrapping_add(self.state[self.rear]);
        self.state[self.front] = value;
        self.front = (self.front + 1) % DEGREE;
        self.rear = (self.rear + 1) % DEGREE;
        value >> 1
    }
}

impl Default for Glibc {
    fn default() -> Self {
        Self::new(DEFAULT_SEED)
    }
}

impl Uniform for Glibc {
    fn uniform(&mut self) -> f64 {
        self.next_u31() as f64 / (RAND_MAX as f64 + 1.0)
    }
}

impl RngCore for Glibc {
    fn next_u32(&mut self) -> u32 {
        // Each output only carries 31 bits
        (self.next_u31() << 1) | (self.next_u31() & 1)
    }

    fn next_u64(&mut self) -> u64 {
        ((self.next_u32() as u64) << 32) | self.next_u32() as u64
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(4) {
            let bytes = self.next_u32().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

/// Ensure `source` looks uniform before it is trusted with a simulation.
///
/// Draws [CALIBRATION_SAMPLES] samples (consuming them) and fails if their mean falls outside
/// `[0.25, 0.75]`. Returns the observed mean.
pub fn calibrate<U: Uniform + ?Sized>(source: &mut U) -> Result<f64, Error> {
    let sum: f64 = (0..CALIBRATION_SAMPLES).map(|_| source.uniform()).sum();
    let mean = sum / CALIBRATION_SAMPLES as f64;
    if !(CALIBRATION_MIN..=CALIBRATION_MAX).contains(&mean) {
        return Err(Error::Calibration(mean));
    }
    Ok(mean)
}
