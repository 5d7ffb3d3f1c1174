//! Explicit undefined values for ensemble statistics.
//!
//! Box-level statistics routinely divide by zero (empty boxes, zero
//! ensemble mean). Such results are `None` rather than NaN: they propagate
//! through arithmetic here and are skipped by the domain-mean reductions.

/// `Some(x)` for finite `x`, `None` otherwise
pub fn defined(x: f64) -> Option<f64> {
    if x.is_finite() {
        Some(x)
    } else {
        None
    }
}

/// Quotient that is undefined for a zero denominator or non-finite result
pub fn ratio(num: Option<f64>, den: Option<f64>) -> Option<f64> {
    match (num, den) {
        (Some(a), Some(b)) if b != 0.0 => defined(a / b),
        _ => None,
    }
}

/// Mean of the defined values; undefined when there are none
pub fn mean_defined<I>(values: I) -> Option<f64>
where
    I: IntoIterator<Item = Option<f64>>,
{
    let (sum, count) = values
        .into_iter()
        .flatten()
        .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

/// Mean that is undefined if any input is undefined or the input is empty
pub fn strict_mean(values: &[Option<f64>]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sum = 0.0;
    for v in values {
        sum += (*v)?;
    }
    Some(sum / values.len() as f64)
}

/// Arithmetic mean of plain samples
pub fn sample_mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Unbiased sample variance (divisor `len - 1`)
pub fn sample_variance(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let mean = sample_mean(values)?;
    let ss: f64 = values.iter().map(|v| (v - mean) * (v - mean)).sum();
    Some(ss / (values.len() - 1) as f64)
}

/// Order-of-magnitude mean `10^(mean(log10 x))` over defined positive values
pub fn log_mean<I>(values: I) -> Option<f64>
where
    I: IntoIterator<Item = Option<f64>>,
{
    mean_defined(
        values
            .into_iter()
            .map(|v| v.filter(|x| *x > 0.0).map(f64::log10)),
    )
    .map(|m| 10f64.powf(m))
}
