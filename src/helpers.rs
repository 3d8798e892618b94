//! Assorted helper functions.

use rand::prelude::*;
use rand::{distributions::Uniform, SeedableRng};

/// Largest `k` such that `d^k` divides `n`, zero for `n == 0`.
pub fn divisor_power(mut n: usize, d: usize) -> u32 {
    let mut k = 0;
    while n != 0 && d > 1 && n % d == 0 {
        n /= d;
        k += 1;
    }
    k
}

/// Largest `k` such that `d^k <= n`, zero for `n == 0`.
pub fn floor_log(n: usize, d: usize) -> u32 {
    let mut k = 0;
    let mut power = d;
    while d > 1 && power <= n {
        k += 1;
        power = match power.checked_mul(d) {
            Some(p) => p,
            None => break,
        };
    }
    k
}

/// `npoints` points drawn uniformly from the unit box with a seeded generator.
pub fn random_points<const D: usize>(npoints: usize, seed: u64) -> Vec<[f64; D]> {
    let mut range = StdRng::seed_from_u64(seed);
    let between = Uniform::from(0.0..1.0);

    (0..npoints)
        .map(|_| {
            let mut point = [0.0; D];
            point.iter_mut().for_each(|x| *x = between.sample(&mut range));
            point
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_divisor_power() {
        assert_eq!(divisor_power(8, 2), 3);
        assert_eq!(divisor_power(12, 2), 2);
        assert_eq!(divisor_power(7, 2), 0);
        assert_eq!(divisor_power(64, 8), 2);
        assert_eq!(divisor_power(0, 8), 0);
    }

    #[test]
    fn test_floor_log() {
        assert_eq!(floor_log(1, 2), 0);
        assert_eq!(floor_log(7, 2), 2);
        assert_eq!(floor_log(8, 2), 3);
        assert_eq!(floor_log(63, 8), 1);
        assert_eq!(floor_log(64, 8), 2);
        assert_eq!(floor_log(0, 4), 0);
        assert_eq!(floor_log(usize::MAX, 2), 63);
    }

    #[test]
    fn test_random_points() {
        let a = random_points::<3>(100, 0);
        let b = random_points::<3>(100, 0);

        assert_eq!(a, b);
        assert!(a.iter().flatten().all(|&x| (0.0..1.0).contains(&x)));
    }
}
