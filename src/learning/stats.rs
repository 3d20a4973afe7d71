// Small descriptive statistics used by the threshold and sweet-spot learners

/// Percentile with linear interpolation between closest ranks (`p` in 0..=100).
///
/// Returns `None` for an empty sample. NaNs are ignored.
pub fn percentile(values: &[f64], p: f64) -> Option<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(|a, b| a.total_cmp(b));

    let rank = (p.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let weight = rank - lower as f64;

    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * weight)
}

pub fn median(values: &[f64]) -> Option<f64> {
    percentile(values, 50.0)
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Pearson correlation coefficient of paired samples.
///
/// `None` when there are fewer than two pairs or either side has zero variance
/// (the coefficient is undefined there, not zero).
pub fn pearson(pairs: &[(f64, f64)]) -> Option<f64> {
    if pairs.len() < 2 {
        return None;
    }

    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|(_, y)| y).sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    let mut sum_x2 = 0.0;
    let mut sum_y2 = 0.0;
    for (x, y) in pairs {
        let dx = x - mean_x;
        let dy = y - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
        sum_x2 += x * x;
        sum_y2 += y * y;
    }

    // Relative to magnitude, so knobs on tiny scales still correlate
    if var_x <= f64::EPSILON * sum_x2 || var_y <= f64::EPSILON * sum_y2 {
        return None;
    }

    Some((cov / (var_x.sqrt() * var_y.sqrt())).clamp(-1.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentile_interpolates() {
        let values = [0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.75, 0.82, 0.82, 0.85, 0.9];
        // rank = 0.75 * 11 = 8.25, both neighbours are 0.82
        assert!((percentile(&values, 75.0).unwrap() - 0.82).abs() < 1e-12);

        let simple = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(percentile(&simple, 0.0), Some(1.0));
        assert_eq!(percentile(&simple, 100.0), Some(4.0));
        assert!((percentile(&simple, 50.0).unwrap() - 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_percentile_ignores_order_and_nan() {
        let values = [4.0, f64::NAN, 1.0, 3.0, 2.0];
        assert!((median(&values).unwrap() - 2.5).abs() < 1e-12);
        assert_eq!(percentile(&[], 75.0), None);
        assert_eq!(percentile(&[0.42], 75.0), Some(0.42));
    }

    #[test]
    fn test_mean() {
        assert_eq!(mean(&[]), None);
        assert_eq!(mean(&[1.0, 2.0, 6.0]), Some(3.0));
    }

    #[test]
    fn test_pearson_known_value() {
        let pairs = [(1.0, 2.0), (2.0, 4.0), (3.0, 5.0), (4.0, 4.0), (5.0, 5.0)];
        let r = pearson(&pairs).unwrap();
        assert!((r - 0.774_596_669).abs() < 1e-6);
    }

    #[test]
    fn test_pearson_perfect_and_inverse() {
        let up: Vec<(f64, f64)> = (0..10).map(|i| (i as f64, 2.0 * i as f64 + 1.0)).collect();
        let down: Vec<(f64, f64)> = (0..10).map(|i| (i as f64, -(i as f64))).collect();
        assert!((pearson(&up).unwrap() - 1.0).abs() < 1e-12);
        assert!((pearson(&down).unwrap() + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_pearson_undefined() {
        assert_eq!(pearson(&[(1.0, 1.0)]), None);
        assert_eq!(pearson(&[(1.0, 0.2), (1.0, 0.9), (1.0, 0.4)]), None);
    }

    #[test]
    fn test_pearson_small_scale_knob() {
        // Variances near 1e-15: below EPSILON in absolute terms
        let pairs: Vec<(f64, f64)> = (0..10)
            .map(|i| (i as f64 * 1e-8, 0.9 - 0.05 * i as f64))
            .collect();
        let r = pearson(&pairs).unwrap();
        assert!((r + 1.0).abs() < 1e-9, "{}", r);

        let constant: Vec<(f64, f64)> = (0..10).map(|i| (3e-8, i as f64)).collect();
        assert_eq!(pearson(&constant), None);
    }
}
