//! Series bases for the polynomial-family shapes.
//!
//! Both series start with an implicit constant term of 1 so that all
//! coefficients set to zero gives a flat shape:
//!
//! - power series: `1 + Σ p_i x^(i+1)`
//! - Chebyshev series: `1 + Σ p_i T_(i+1)(u)`, with `u` the axis mapped onto `[-1, 1]`
//!
//! Chebyshev polynomials are evaluated with the three-term recurrence
//! `T_(k+1)(u) = 2u T_k(u) - T_(k-1)(u)`, which stays stable on `[-1, 1]`.

/// Map `x` from `[lo, hi]` onto `[-1, 1]`.
///
/// A degenerate range leaves `x` unchanged.
pub fn to_unit_interval(x: f64, lo: f64, hi: f64) -> f64 {
    let span = hi - lo;
    if !(span.is_finite() && span > 0.0) {
        return x;
    }
    (2.0 * x - (lo + hi)) / span
}

/// `1 + Σ coeffs[i] * x^(i+1)`.
pub fn power_series(x: f64, coeffs: &[f64]) -> f64 {
    let mut total = 1.0;
    let mut power = 1.0;
    for &c in coeffs {
        power *= x;
        total += c * power;
    }
    total
}

/// `1 + Σ coeffs[i] * T_(i+1)(u)`.
pub fn chebyshev_series(u: f64, coeffs: &[f64]) -> f64 {
    let mut total = 1.0;
    let mut t_prev = 1.0;
    let mut t_curr = u;
    for (i, &c) in coeffs.iter().enumerate() {
        if i > 0 {
            let t_next = 2.0 * u * t_curr - t_prev;
            t_prev = t_curr;
            t_curr = t_next;
        }
        total += c * t_curr;
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chebyshev_matches_closed_forms() {
        for &u in &[-1.0, -0.3, 0.0, 0.4, 1.0] {
            // T1 = u, T2 = 2u^2 - 1, T3 = 4u^3 - 3u
            let t2 = 2.0 * u * u - 1.0;
            let t3 = 4.0 * u * u * u - 3.0 * u;
            let v = chebyshev_series(u, &[0.5, -0.25, 0.125]);
            let expected = 1.0 + 0.5 * u - 0.25 * t2 + 0.125 * t3;
            assert!((v - expected).abs() < 1e-12);
        }
    }

    #[test]
    fn power_series_with_no_coefficients_is_flat() {
        assert_eq!(power_series(17.0, &[]), 1.0);
        assert!((power_series(2.0, &[1.0, 0.5]) - (1.0 + 2.0 + 2.0)).abs() < 1e-12);
    }

    #[test]
    fn unit_interval_maps_endpoints() {
        assert_eq!(to_unit_interval(0.0, 0.0, 10.0), -1.0);
        assert_eq!(to_unit_interval(10.0, 0.0, 10.0), 1.0);
        assert_eq!(to_unit_interval(3.0, 5.0, 5.0), 3.0);
    }
}
