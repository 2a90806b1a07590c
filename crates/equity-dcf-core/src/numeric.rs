//! Small numeric helpers shared by the valuation kernel. Everything here is
//! pure f64 math with no allocation beyond the Cholesky factor.

/// Compute the percentile value from a **sorted** slice using linear
/// interpolation between the two nearest ranks. `p` is in [0, 100].
pub fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = p / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        sorted[lower]
    } else {
        let frac = rank - lower as f64;
        sorted[lower] * (1.0 - frac) + sorted[upper] * frac
    }
}

/// Arithmetic mean; 0.0 for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation (divide by n, not n-1).
pub fn population_std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// `value` if finite, otherwise `fallback`.
pub fn finite_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}

/// Clamp a draw to the +-3 sigma band around its mean, intersected with the
/// hard [min, max] rectangle. The band keeps a wide user-supplied rectangle
/// from admitting draws the distribution itself would essentially never
/// produce.
pub fn clamp_to_band(value: f64, mean: f64, std_dev: f64, min: f64, max: f64) -> f64 {
    let lo = (mean - 3.0 * std_dev).max(min);
    let hi = (mean + 3.0 * std_dev).min(max);
    if lo > hi {
        // Degenerate band: the 3-sigma window lies outside the rectangle.
        return value.max(min).min(max);
    }
    value.max(lo).min(hi)
}

/// Map a standard-normal draw `z` onto a lognormal distribution with the
/// given mean and standard deviation in real space (moment matching).
pub fn lognormal_from_standard_normal(mean: f64, std_dev: f64, z: f64) -> f64 {
    if mean <= 0.0 {
        return mean;
    }
    let cv2 = (std_dev / mean).powi(2);
    let sigma = (1.0 + cv2).ln().sqrt();
    let mu = mean.ln() - 0.5 * sigma * sigma;
    (mu + sigma * z).exp()
}

/// Lower-triangular Cholesky factor of a symmetric positive-definite matrix.
/// Returns `None` when the matrix is not PD (within tolerance) or not square.
pub fn cholesky_lower(matrix: &[Vec<f64>]) -> Option<Vec<Vec<f64>>> {
    let n = matrix.len();
    if n == 0 || matrix.iter().any(|row| row.len() != n) {
        return None;
    }

    let mut l = vec![vec![0.0_f64; n]; n];
    let tol = 1.0e-12;

    for i in 0..n {
        for j in 0..=i {
            let mut sum = matrix[i][j];
            for k in 0..j {
                sum -= l[i][k] * l[j][k];
            }

            if i == j {
                if sum < -tol {
                    return None;
                }
                l[i][j] = sum.max(tol).sqrt();
            } else if l[j][j] > tol {
                l[i][j] = sum / l[j][j];
            }
        }
    }

    Some(l)
}

/// Whether `matrix` is square and symmetric within `tol`.
pub fn is_symmetric(matrix: &[Vec<f64>], tol: f64) -> bool {
    let n = matrix.len();
    if matrix.iter().any(|row| row.len() != n) {
        return false;
    }
    for i in 0..n {
        for j in (i + 1)..n {
            if (matrix[i][j] - matrix[j][i]).abs() > tol {
                return false;
            }
        }
    }
    true
}

/// Cholesky factor of a correlation matrix, with recovery: an asymmetric
/// matrix collapses to the identity (uncorrelated draws); a symmetric but
/// non-PD matrix gets progressively larger diagonal jitter, up to 1e-2,
/// before also collapsing to the identity.
pub fn cholesky_with_jitter(matrix: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let n = matrix.len();
    let identity = |n: usize| -> Vec<Vec<f64>> {
        (0..n)
            .map(|i| (0..n).map(|j| if i == j { 1.0 } else { 0.0 }).collect())
            .collect()
    };

    if !is_symmetric(matrix, 1.0e-9) {
        return identity(n);
    }
    if let Some(l) = cholesky_lower(matrix) {
        return l;
    }

    let mut jitter = 1.0e-6;
    while jitter <= 1.0e-2 {
        let mut bumped = matrix.to_vec();
        for (i, row) in bumped.iter_mut().enumerate() {
            row[i] += jitter;
        }
        if let Some(l) = cholesky_lower(&bumped) {
            return l;
        }
        jitter *= 10.0;
    }

    identity(n)
}

/// Multiply independent standard normals by a lower-triangular Cholesky
/// factor to obtain correlated standard normals.
pub fn correlate_normals(chol: &[Vec<f64>], independent: &[f64], out: &mut [f64]) {
    for (i, row) in chol.iter().enumerate() {
        let mut acc = 0.0;
        for (k, l) in row.iter().enumerate().take(i + 1) {
            acc += l * independent[k];
        }
        out[i] = acc;
    }
}
