//! Bounding boxes of point clouds.

use itertools::izip;

/// Axis aligned box in `D` dimensions, described by its origin and its diameter along each axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Domain<const D: usize> {
    origin: [f64; D],
    diameter: [f64; D],
}

impl<const D: usize> Domain<D> {
    pub fn new(origin: [f64; D], diameter: [f64; D]) -> Self {
        Domain { origin, diameter }
    }

    /// The unit cube `[0, 1)^D`.
    pub fn unit() -> Self {
        Domain {
            origin: [0.; D],
            diameter: [1.; D],
        }
    }

    /// Compute the smallest domain enclosing all points, slightly inflated so that the points on
    /// the upper bounds are strictly inside.
    pub fn from_points(points: &[[f64; D]]) -> Self {
        if points.is_empty() {
            return Self::unit();
        }

        let mut lower = [f64::INFINITY; D];
        let mut upper = [f64::NEG_INFINITY; D];

        for point in points {
            for (lo, hi, &p) in izip!(lower.iter_mut(), upper.iter_mut(), point) {
                *lo = lo.min(p);
                *hi = hi.max(p);
            }
        }

        let mut diameter = [0.; D];
        for (d, &lo, &hi) in izip!(diameter.iter_mut(), &lower, &upper) {
            let extent = hi - lo;
            *d = if extent > 0. { extent * (1. + 1e-10) } else { 1. };
        }

        Domain {
            origin: lower,
            diameter,
        }
    }

    pub fn origin(&self) -> &[f64; D] {
        &self.origin
    }

    pub fn diameter(&self) -> &[f64; D] {
        &self.diameter
    }
}
