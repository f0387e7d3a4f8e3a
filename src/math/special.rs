//! Line-shape functions evaluated by the registry.
//!
//! All shapes are returned unnormalized; the evaluator divides by a numerical
//! integral over the axis range when a normalized density is needed.
//!
//! Numerical notes:
//! - The Voigt profile uses Humlicek's four-region rational approximation of
//!   the Faddeeva function `w(z)` (relative accuracy around `1e-4`).
//! - Crystal-Ball tails follow the usual power-law continuation, matched in
//!   value and slope to the Gaussian core at `|t| = a`.

use nalgebra::Complex;

pub fn erf(x: f64) -> f64 {
    statrs::function::erf::erf(x)
}

pub fn gaussian(x: f64, mean: f64, sigma: f64) -> f64 {
    let t = (x - mean) / sigma;
    (-0.5 * t * t).exp()
}

pub fn breit_wigner(x: f64, mean: f64, width: f64) -> f64 {
    let d = x - mean;
    1.0 / (d * d + 0.25 * width * width)
}

/// Voigt profile: a Breit-Wigner of full width `width` convolved with a
/// Gaussian of width `sigma`.
pub fn voigtian(x: f64, mean: f64, width: f64, sigma: f64) -> f64 {
    let s = sigma.abs();
    let w = width.abs();
    let arg = x - mean;

    if s == 0.0 && w == 0.0 {
        return 1.0;
    }
    if s == 0.0 {
        return 1.0 / (arg * arg + 0.25 * w * w);
    }
    if w == 0.0 {
        return (-0.5 * arg * arg / (s * s)).exp();
    }

    let c = 1.0 / (std::f64::consts::SQRT_2 * s);
    let v = faddeeva(c * arg, 0.5 * c * w);
    c * v.re / std::f64::consts::PI.sqrt()
}

/// Faddeeva function `w(x + iy)` for `y >= 0`.
pub fn faddeeva(x: f64, y: f64) -> Complex<f64> {
    let c = |v: f64| Complex::new(v, 0.0);
    let t = Complex::new(y, -x);
    let s = x.abs() + y;

    if s >= 15.0 {
        return t * 0.5641896 / (t * t + 0.5);
    }
    if s >= 5.5 {
        let u = t * t;
        return t * (u * 0.5641896 + 1.410474) / (u * (u + 3.0) + 0.75);
    }
    if y >= 0.195 * x.abs() - 0.176 {
        let num = c(16.4955) + t * (c(20.20933) + t * (c(11.96482) + t * (c(3.778987) + t * 0.5642236)));
        let den = c(16.4955)
            + t * (c(38.82363) + t * (c(39.27121) + t * (c(21.69274) + t * (c(6.699398) + t))));
        return num / den;
    }

    let u = t * t;
    let num = t
        * (c(36183.31)
            - u * (c(3321.9905)
                - u * (c(1540.787) - u * (c(219.0313) - u * (c(35.76683) - u * (c(1.320522) - u * 0.56419))))));
    let den = c(32066.6)
        - u * (c(24322.84)
            - u * (c(9022.228)
                - u * (c(2186.181) - u * (c(364.2191) - u * (c(61.57037) - u * (c(1.841439) - u))))));
    u.exp() - num / den
}

/// Crystal-Ball: Gaussian core with one power-law tail.
///
/// The tail is on the low side for `a > 0` and on the high side for `a < 0`.
pub fn crystal_ball(x: f64, mean: f64, sigma: f64, a: f64, n: f64) -> f64 {
    let mut t = (x - mean) / sigma;
    if a < 0.0 {
        t = -t;
    }
    let abs_a = a.abs();
    if t >= -abs_a {
        return (-0.5 * t * t).exp();
    }
    power_tail(-t, abs_a, n)
}

/// Crystal-Ball with independent low (`a1`, `n1`) and high (`a2`, `n2`) tails.
pub fn double_crystal_ball(x: f64, mean: f64, sigma: f64, a1: f64, n1: f64, a2: f64, n2: f64) -> f64 {
    let t = (x - mean) / sigma;
    let a1 = a1.abs();
    let a2 = a2.abs();
    if t < -a1 {
        power_tail(-t, a1, n1)
    } else if t > a2 {
        power_tail(t, a2, n2)
    } else {
        (-0.5 * t * t).exp()
    }
}

/// `A (B + d)^(-n)` for a distance `d >= a` from the mean, in units of sigma.
fn power_tail(d: f64, a: f64, n: f64) -> f64 {
    let big_a = (n / a).powf(n) * (-0.5 * a * a).exp();
    let big_b = n / a - a;
    big_a / (big_b + d).powf(n)
}

/// Gaussian with different widths left and right of the mean, zero above
/// `y_max` when one is given.
pub fn double_sided_gaussian(x: f64, mean: f64, sigma1: f64, sigma2: f64, y_max: Option<f64>) -> f64 {
    if y_max.is_some_and(|cut| x > cut) {
        return 0.0;
    }
    let sigma = if x < mean { sigma1 } else { sigma2 };
    gaussian(x, mean, sigma)
}

/// Voigtian with different widths left and right of the mean.
///
/// Each half is scaled to peak at 1 so the two halves meet at the mean.
#[allow(clippy::too_many_arguments)]
pub fn double_sided_voigtian(
    x: f64,
    mean: f64,
    sigma1: f64,
    sigma2: f64,
    width1: f64,
    width2: f64,
    y_max: Option<f64>,
) -> f64 {
    if y_max.is_some_and(|cut| x > cut) {
        return 0.0;
    }
    let (sigma, width) = if x < mean { (sigma1, width1) } else { (sigma2, width2) };
    let peak = voigtian(mean, mean, width, sigma);
    voigtian(x, mean, width, sigma) / peak
}

pub fn exponential(x: f64, lambda: f64) -> f64 {
    (lambda * x).exp()
}

/// Error-function turn-on `0.5 (erf(scale (x - shift)) + 1)`.
pub fn erf_turn_on(x: f64, scale: f64, shift: f64) -> f64 {
    0.5 * (erf(scale * (x - shift)) + 1.0)
}
