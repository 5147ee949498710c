//! Batch moments and the parallel-moments merge.
//!
//! Running statistics are updated by computing the mean and variance of each
//! incoming batch and folding them into the running estimate with Chan et al.'s
//! pairwise combination:
//!
//! ```text
//! delta      = mean_b - mean_a
//! n          = n_a + n_b
//! mean       = mean_a + delta * n_b / n
//! M2         = var_a * n_a + var_b * n_b + delta^2 * n_a * n_b / n
//! var        = M2 / n
//! ```
//!
//! Combining two disjoint partitions this way is exact and order independent.
//! Streaming many batches through it is only asymptotically equal to a
//! single pass over the whole stream.

use super::sample_shape::SampleShape;

/// Mean, variance and sample count of one statistic slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Moments {
    pub mean: f64,
    pub var: f64,
    pub count: f64,
}

impl Moments {
    pub fn new(mean: f64, var: f64, count: f64) -> Self {
        Self { mean, var, count }
    }

    pub fn is_finite(&self) -> bool {
        self.mean.is_finite() && self.var.is_finite()
    }
}

/// Merge batch moments into the running moments.
///
/// Pure function of `(mean, var, count, batch_mean, batch_var, batch_count)`.
/// A batch with no samples returns `current` unchanged.
pub fn combine_moments(current: Moments, batch: Moments) -> Moments {
    if batch.count <= 0.0 {
        return current;
    }

    let delta = batch.mean - current.mean;
    let total_count = current.count + batch.count;

    let mean = current.mean + delta * batch.count / total_count;
    let m_a = current.var * current.count;
    let m_b = batch.var * batch.count;
    let m2 = m_a + m_b + delta * delta * current.count * batch.count / total_count;

    Moments {
        mean,
        var: m2 / total_count,
        count: total_count,
    }
}

/// Split `part` back out of `total`, returning the moments of the remainder.
///
/// Inverse of [`combine_moments`]: `combine_moments(part, remove_moments(total, part))`
/// recovers `total`. A remainder with no samples comes back with count 0,
/// which [`combine_moments`] treats as empty.
pub fn remove_moments(total: Moments, part: Moments) -> Moments {
    let count = total.count - part.count;
    if count <= 0.0 {
        return Moments::new(0.0, 0.0, 0.0);
    }

    let mean = (total.mean * total.count - part.mean * part.count) / count;
    let delta = mean - part.mean;
    let m2 = total.var * total.count
        - part.var * part.count
        - delta * delta * part.count * count / total.count;

    // Rounding can push a near-zero remainder slightly negative
    Moments::new(mean, m2.max(0.0) / count, count)
}

/// Per-slot moments of a flattened batch of `num_samples` samples.
///
/// Each slot is reduced over `num_samples * inner_len` elements. The variance
/// is the unbiased (`n - 1`) estimate; a slot with a single element gets 0.
/// `count` is the number of samples, not the number of reduced elements.
pub fn batch_moments(batch: &[f32], shape: &SampleShape, num_samples: usize) -> Vec<Moments> {
    let slots = shape.num_slots();
    let reduced = (num_samples * shape.inner_len()) as f64;

    let mut sums = vec![0.0f64; slots];
    for (i, &x) in batch.iter().enumerate() {
        sums[shape.slot_of(i)] += x as f64;
    }
    let means: Vec<f64> = sums.into_iter().map(|s| s / reduced).collect();

    // Second pass over deviations keeps the variance stable for large offsets
    let mut sq_dev = vec![0.0f64; slots];
    for (i, &x) in batch.iter().enumerate() {
        let slot = shape.slot_of(i);
        let d = x as f64 - means[slot];
        sq_dev[slot] += d * d;
    }

    means
        .into_iter()
        .zip(sq_dev)
        .map(|(mean, m2)| {
            let var = if reduced > 1.0 { m2 / (reduced - 1.0) } else { 0.0 };
            Moments::new(mean, var, num_samples as f64)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn direct_moments(values: &[f64]) -> (f64, f64) {
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        (mean, var)
    }

    #[test]
    fn test_combine_matches_direct_computation() {
        // Population moments of two partitions combine into those of the union
        let a = [1.0, 2.0, 3.0];
        let b = [4.0, 5.0, 6.0, 10.0];
        let (mean_a, var_a) = direct_moments(&a);
        let (mean_b, var_b) = direct_moments(&b);

        let merged = combine_moments(
            Moments::new(mean_a, var_a, 3.0),
            Moments::new(mean_b, var_b, 4.0),
        );

        let union: Vec<f64> = a.iter().chain(b.iter()).copied().collect();
        let (mean, var) = direct_moments(&union);
        assert!((merged.mean - mean).abs() < 1e-12);
        assert!((merged.var - var).abs() < 1e-12);
        assert_eq!(merged.count, 7.0);
    }

    #[test]
    fn test_combine_is_order_independent() {
        let a = Moments::new(0.5, 2.0, 10.0);
        let b = Moments::new(-3.0, 0.25, 4.0);

        let ab = combine_moments(a, b);
        let ba = combine_moments(b, a);
        assert!((ab.mean - ba.mean).abs() < 1e-12);
        assert!((ab.var - ba.var).abs() < 1e-12);
        assert_eq!(ab.count, ba.count);
    }

    #[test]
    fn test_combine_from_initial_state() {
        // mean 0, var 1, count 1 is the stabilized starting point
        let initial = Moments::new(0.0, 1.0, 1.0);
        let merged = combine_moments(initial, Moments::new(4.0, 0.0, 1.0));

        assert_eq!(merged.mean, 2.0);
        // (1*1 + 0*1 + 16*1*1/2) / 2
        assert_eq!(merged.var, 4.5);
        assert_eq!(merged.count, 2.0);
    }

    #[test]
    fn test_combine_empty_batch_is_identity() {
        let current = Moments::new(1.5, 0.7, 12.0);
        assert_eq!(combine_moments(current, Moments::new(9.0, 9.0, 0.0)), current);
    }

    #[test]
    fn test_remove_recovers_partition() {
        let a = [1.0, 2.0, 3.0];
        let b = [4.0, 5.0, 6.0, 10.0];
        let (mean_a, var_a) = direct_moments(&a);
        let (mean_b, var_b) = direct_moments(&b);
        let part = Moments::new(mean_a, var_a, 3.0);

        let total = combine_moments(part, Moments::new(mean_b, var_b, 4.0));
        let rest = remove_moments(total, part);

        assert!((rest.mean - mean_b).abs() < 1e-12);
        assert!((rest.var - var_b).abs() < 1e-12);
        assert_eq!(rest.count, 4.0);
    }

    #[test]
    fn test_remove_everything_leaves_empty() {
        let prior = Moments::new(0.0, 1.0, 1.0);
        let rest = remove_moments(prior, prior);
        assert_eq!(rest.count, 0.0);
        assert_eq!(combine_moments(prior, rest), prior);
    }

    #[test]
    fn test_batch_moments_flat() {
        let shape = SampleShape::new(&[2], false).unwrap();
        let batch = [1.0, 10.0, 3.0, 10.0, 5.0, 10.0];
        let moments = batch_moments(&batch, &shape, 3);

        assert_eq!(moments.len(), 2);
        assert!((moments[0].mean - 3.0).abs() < 1e-12);
        // Unbiased: ((1-3)^2 + 0 + (5-3)^2) / 2
        assert!((moments[0].var - 4.0).abs() < 1e-12);
        assert_eq!(moments[1].var, 0.0);
        assert_eq!(moments[0].count, 3.0);
    }

    #[test]
    fn test_batch_moments_per_channel() {
        // Two samples of shape [2, 3]: channel 0 holds 0..3, channel 1 holds 10..13
        let shape = SampleShape::new(&[2, 3], true).unwrap();
        let batch = [
            0.0, 1.0, 2.0, 10.0, 11.0, 12.0, //
            3.0, 4.0, 5.0, 13.0, 14.0, 15.0,
        ];
        let moments = batch_moments(&batch, &shape, 2);

        assert!((moments[0].mean - 2.5).abs() < 1e-12);
        assert!((moments[1].mean - 12.5).abs() < 1e-12);
        // Var of 0..=5 (unbiased) is 3.5
        assert!((moments[0].var - 3.5).abs() < 1e-12);
        assert!((moments[1].var - 3.5).abs() < 1e-12);
        assert_eq!(moments[0].count, 2.0);
    }

    #[test]
    fn test_batch_moments_single_element() {
        let shape = SampleShape::new(&[1], false).unwrap();
        let moments = batch_moments(&[7.0], &shape, 1);
        assert_eq!(moments[0].mean, 7.0);
        assert_eq!(moments[0].var, 0.0);
    }
}
