//! Descriptive statistics over metric values
//!
//! Shared by the query engine (per-sailing averages), the comparison layer
//! (pooled overall mean) and summary statistics (trend lines).

/// Round to a fixed number of decimal places (half away from zero)
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Round to 2 decimal places, the precision of every reported average
pub fn round2(value: f64) -> f64 {
    round_to(value, 2)
}

/// Arithmetic mean, `None` for an empty slice
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Least-squares slope of `values` against their index (0, 1, 2, ...)
///
/// Returns `None` with fewer than two points.
pub fn linear_slope(values: &[f64]) -> Option<f64> {
    let n = values.len();
    if n < 2 {
        return None;
    }

    let x_mean = (n - 1) as f64 / 2.0;
    let y_mean = mean(values)?;

    let (mut numerator, mut denominator) = (0.0, 0.0);
    for (i, y) in values.iter().enumerate() {
        let dx = i as f64 - x_mean;
        numerator += dx * (y - y_mean);
        denominator += dx * dx;
    }

    Some(numerator / denominator)
}
