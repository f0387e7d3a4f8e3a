//! Quadrature and grid helpers.

/// Generate `steps` evenly spaced points between `min` and `max` (inclusive).
///
/// `steps < 2` yields just `min`.
pub fn linspace(min: f64, max: f64, steps: usize) -> Vec<f64> {
    if steps < 2 {
        return vec![min];
    }
    let step = (max - min) / (steps as f64 - 1.0);
    (0..steps)
        .map(|i| if i + 1 == steps { max } else { min + step * i as f64 })
        .collect()
}

/// Composite Simpson rule over `[lo, hi]` with `intervals` sub-intervals
/// (rounded up to an even count).
pub fn simpson<F>(mut f: F, lo: f64, hi: f64, intervals: usize) -> f64
where
    F: FnMut(f64) -> f64,
{
    let n = intervals.max(2).next_multiple_of(2);
    let h = (hi - lo) / n as f64;
    let mut total = f(lo) + f(hi);
    for i in 1..n {
        let x = lo + h * i as f64;
        total += if i % 2 == 1 { 4.0 * f(x) } else { 2.0 * f(x) };
    }
    total * h / 3.0
}
