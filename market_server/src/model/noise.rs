//! Random draws and curve helpers shared by the price process and shocks.
//!
//! Everything here is a pure function of its inputs and an injected `Rng`, so
//! callers can pass a seeded `StdRng` and get the same path back.
use rand::Rng;
use std::f64::consts::PI;

/// Smallest first uniform draw fed to the log in Box-Muller.
const MIN_UNIFORM: f64 = 1e-12;

/// Standard normal variate via the Box-Muller transform.
pub fn standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    let u1 = rng.random::<f64>().max(MIN_UNIFORM);
    let u2 = rng.random::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

/// Cosine ease-in-out on `[0, 1]`: flat at both ends, steepest in the middle.
pub fn ease_in_out(x: f64) -> f64 {
    0.5 - 0.5 * (PI * x).cos()
}

/// Round to four decimals, nudged so `x.xxxx5` rounds up consistently.
pub fn round4(x: f64) -> f64 {
    ((x + 1e-9) * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn normal_draws_have_roughly_unit_moments() {
        let mut rng = StdRng::seed_from_u64(7);
        let n = 20_000;
        let draws: Vec<f64> = (0..n).map(|_| standard_normal(&mut rng)).collect();
        let mean = draws.iter().sum::<f64>() / n as f64;
        let var = draws.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / n as f64;
        assert!(mean.abs() < 0.05, "mean {}", mean);
        assert!((var - 1.0).abs() < 0.05, "variance {}", var);
        assert!(draws.iter().all(|d| d.is_finite()));
    }

    #[test]
    fn ease_curve_endpoints_and_midpoint() {
        assert!(ease_in_out(0.0).abs() < 1e-12);
        assert!((ease_in_out(1.0) - 1.0).abs() < 1e-12);
        assert!((ease_in_out(0.5) - 0.5).abs() < 1e-12);
        assert!(ease_in_out(0.1) < 0.1);
        assert!(ease_in_out(0.9) > 0.9);
    }

    #[test]
    fn rounds_to_four_places() {
        assert_eq!(round4(1.234_56), 1.2346);
        assert_eq!(round4(100.0), 100.0);
    }
}
