use std::f64::consts::PI;

use rand::Rng;
use rand::SeedableRng;
use rand_distr::StandardNormal;
use rand_isaac::Isaac64Rng;

use super::geometry::Point2d;

/// The generator every stage draws from. Always constructed from an explicit seed and passed
/// down by `&mut`; nothing in the crate keeps one in global state.
pub type SynthRng = Isaac64Rng;

pub fn seeded_rng(seed: u64) -> SynthRng {
    Isaac64Rng::seed_from_u64(seed)
}

/// A draw from N(0, std_dev).
pub fn gaussian<R: Rng + ?Sized>(rng: &mut R, std_dev: f64) -> f64 {
    let zz: f64 = rng.sample(StandardNormal);
    zz * std_dev
}

/// A draw from the half-normal distribution with scale `std_dev`.
pub fn half_normal<R: Rng + ?Sized>(rng: &mut R, std_dev: f64) -> f64 {
    gaussian(rng, std_dev).abs()
}

pub fn bernoulli<R: Rng + ?Sized>(rng: &mut R, probability: f64) -> bool {
    rng.gen::<f64>() < probability
}

pub fn random_angle<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    rng.gen::<f64>() * 2. * PI
}

/// A point at a uniform angle and a uniform radius in [0, max_radius) around `center`.
pub fn jitter_in_disc<R: Rng + ?Sized>(rng: &mut R, center: &Point2d, max_radius: f64)
                                       -> Point2d {
    let angle = random_angle(rng);
    let distance = rng.gen::<f64>() * max_radius;
    center.offset_polar(angle, distance)
}
