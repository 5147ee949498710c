//! Sample shape validation and the statistic layout derived from it.
//!
//! A batch is laid out row-major as `[N, d0, d1, ..]` where `[d0, d1, ..]` is
//! the configured sample shape. Statistics are kept in *slots*:
//!
//! - **Per-channel**: one slot per entry of axis `d0`. Every batch axis except
//!   the channel axis is reduced, so a slot owns `inner = d1 * d2 * ..`
//!   contiguous elements in each sample.
//! - **Flat**: one slot per element of the flattened sample (`inner = 1`),
//!   reduced over the batch axis only.
//!
//! Both cases reduce to the same indexing rule: element `i` of a batch belongs
//! to slot `(i / inner) % slots`.

use crate::error::{NormError, Result};

/// Highest sample rank accepted in per-channel mode.
pub const MAX_CHANNEL_RANK: usize = 4;

/// A validated sample shape together with its statistic layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleShape {
    dims: Vec<usize>,
    per_channel: bool,
    slots: usize,
    inner: usize,
}

impl SampleShape {
    /// Validate `dims` and derive the slot layout.
    ///
    /// # Errors
    /// - per-channel mode with a rank outside `1..=MAX_CHANNEL_RANK`
    /// - any zero-length dimension
    pub fn new(dims: &[usize], per_channel: bool) -> Result<Self> {
        if let Some(axis) = dims.iter().position(|&d| d == 0) {
            return Err(NormError::InvalidConfig(format!(
                "sample shape {:?} has a zero-length axis {}",
                dims, axis
            )));
        }

        let (slots, inner): (usize, usize) = if per_channel {
            if dims.is_empty() || dims.len() > MAX_CHANNEL_RANK {
                return Err(NormError::InvalidConfig(format!(
                    "per-channel statistics need a sample rank in 1..={}, got shape {:?} (rank {})",
                    MAX_CHANNEL_RANK,
                    dims,
                    dims.len()
                )));
            }
            (dims[0], dims[1..].iter().product())
        } else {
            (dims.iter().product(), 1)
        };

        Ok(Self {
            dims: dims.to_vec(),
            per_channel,
            slots,
            inner,
        })
    }

    /// Sample dimensions, without the batch axis.
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Sample rank, without the batch axis.
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    pub fn per_channel(&self) -> bool {
        self.per_channel
    }

    /// Number of statistic slots.
    pub fn num_slots(&self) -> usize {
        self.slots
    }

    /// Contiguous elements each slot owns within one sample.
    pub fn inner_len(&self) -> usize {
        self.inner
    }

    /// Number of elements in one sample.
    pub fn sample_len(&self) -> usize {
        self.slots * self.inner
    }

    /// Slot that owns element `index` of a flattened batch.
    #[inline]
    pub fn slot_of(&self, index: usize) -> usize {
        (index / self.inner) % self.slots
    }

    /// Batch axes reduced to produce the statistics (axis 0 is the batch axis).
    ///
    /// Per-channel mode reduces every axis except the channel axis (axis 1);
    /// flat mode reduces the batch axis only. This describes the layout for
    /// callers; the reduction itself indexes through [`SampleShape::slot_of`].
    pub fn reduction_axes(&self) -> Vec<usize> {
        if self.per_channel {
            std::iter::once(0).chain(2..=self.rank()).collect()
        } else {
            vec![0]
        }
    }

    /// Shape the statistics take when broadcast against a batch.
    ///
    /// `[1, C, 1, ..]` in per-channel mode, `[1, d0, d1, ..]` in flat mode.
    pub fn broadcast_dims(&self) -> Vec<usize> {
        let mut dims = vec![1; self.rank() + 1];
        if self.per_channel {
            dims[1] = self.slots;
        } else {
            dims[1..].copy_from_slice(&self.dims);
        }
        dims
    }

    /// Number of samples in a flattened batch of `len` elements.
    pub fn num_samples(&self, len: usize) -> Result<usize> {
        let sample_len = self.sample_len();
        if len % sample_len != 0 {
            return Err(NormError::ShapeMismatch {
                expected: format!(
                    "a multiple of {} elements (sample shape {:?})",
                    sample_len, self.dims
                ),
                actual: format!("{} elements", len),
            });
        }
        Ok(len / sample_len)
    }

    /// Check full batch dimensions (batch axis first) against the sample shape.
    pub fn check_batch_dims(&self, batch_dims: &[usize]) -> Result<()> {
        if batch_dims.len() != self.rank() + 1 || batch_dims[1..] != self.dims[..] {
            return Err(NormError::ShapeMismatch {
                expected: format!("[N, {}]", join_dims(&self.dims)),
                actual: format!("{:?}", batch_dims),
            });
        }
        Ok(())
    }
}

fn join_dims(dims: &[usize]) -> String {
    dims.iter()
        .map(|d| d.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reduction_axes_by_rank() {
        let vector = SampleShape::new(&[6], true).unwrap();
        let rows = SampleShape::new(&[3, 8], true).unwrap();
        let image = SampleShape::new(&[3, 4, 4], true).unwrap();
        let volume = SampleShape::new(&[2, 3, 4, 5], true).unwrap();

        assert_eq!(vector.reduction_axes(), vec![0]);
        assert_eq!(rows.reduction_axes(), vec![0, 2]);
        assert_eq!(image.reduction_axes(), vec![0, 2, 3]);
        assert_eq!(volume.reduction_axes(), vec![0, 2, 3, 4]);
    }

    #[test]
    fn test_reduction_axes_agree_with_slot_of() {
        for (dims, per_channel) in [
            (vec![6], true),
            (vec![3, 2], true),
            (vec![2, 3, 2], true),
            (vec![2, 2, 3, 2], true),
            (vec![3, 2], false),
        ] {
            let shape = SampleShape::new(&dims, per_channel).unwrap();
            let reduced = shape.reduction_axes();
            let mut batch_dims = vec![2];
            batch_dims.extend_from_slice(&dims);
            let total: usize = batch_dims.iter().product();

            // Two elements share a slot exactly when they agree on every kept axis
            let kept_index = |flat: usize| -> Vec<usize> {
                let mut rem = flat;
                let mut index = vec![0; batch_dims.len()];
                for axis in (0..batch_dims.len()).rev() {
                    index[axis] = rem % batch_dims[axis];
                    rem /= batch_dims[axis];
                }
                index
                    .into_iter()
                    .enumerate()
                    .filter(|(axis, _)| !reduced.contains(axis))
                    .map(|(_, i)| i)
                    .collect()
            };
            for i in 0..total {
                for j in 0..total {
                    assert_eq!(
                        shape.slot_of(i) == shape.slot_of(j),
                        kept_index(i) == kept_index(j),
                        "{:?} per_channel={} elements {} and {}",
                        dims,
                        per_channel,
                        i,
                        j
                    );
                }
            }
        }
    }

    #[test]
    fn test_per_channel_layout() {
        let shape = SampleShape::new(&[3, 4, 5], true).unwrap();
        assert_eq!(shape.num_slots(), 3);
        assert_eq!(shape.inner_len(), 20);
        assert_eq!(shape.sample_len(), 60);

        // First element of channel 1, then the second sample wraps to channel 0
        assert_eq!(shape.slot_of(20), 1);
        assert_eq!(shape.slot_of(59), 2);
        assert_eq!(shape.slot_of(60), 0);
    }

    #[test]
    fn test_flat_layout() {
        let shape = SampleShape::new(&[2, 3], false).unwrap();
        assert_eq!(shape.num_slots(), 6);
        assert_eq!(shape.inner_len(), 1);
        assert_eq!(shape.reduction_axes(), vec![0]);
        assert_eq!(shape.slot_of(7), 1);
    }

    #[test]
    fn test_scalar_flat_shape() {
        let shape = SampleShape::new(&[], false).unwrap();
        assert_eq!(shape.num_slots(), 1);
        assert_eq!(shape.sample_len(), 1);
        assert_eq!(shape.broadcast_dims(), vec![1]);
    }

    #[test]
    fn test_broadcast_dims() {
        let channel = SampleShape::new(&[3, 4, 4], true).unwrap();
        let flat = SampleShape::new(&[3, 4, 4], false).unwrap();
        assert_eq!(channel.broadcast_dims(), vec![1, 3, 1, 1]);
        assert_eq!(flat.broadcast_dims(), vec![1, 3, 4, 4]);
    }

    #[test]
    fn test_rejects_unsupported_channel_rank() {
        assert!(matches!(
            SampleShape::new(&[], true),
            Err(NormError::InvalidConfig(_))
        ));
        assert!(matches!(
            SampleShape::new(&[2, 2, 2, 2, 2], true),
            Err(NormError::InvalidConfig(_))
        ));
        // Flat mode has no rank limit
        assert!(SampleShape::new(&[2, 2, 2, 2, 2], false).is_ok());
    }

    #[test]
    fn test_rejects_zero_length_axis() {
        assert!(SampleShape::new(&[4, 0], false).is_err());
        assert!(SampleShape::new(&[0], true).is_err());
    }

    #[test]
    fn test_num_samples() {
        let shape = SampleShape::new(&[3], false).unwrap();
        assert_eq!(shape.num_samples(0).unwrap(), 0);
        assert_eq!(shape.num_samples(9).unwrap(), 3);
        assert!(matches!(
            shape.num_samples(10),
            Err(NormError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_check_batch_dims() {
        let shape = SampleShape::new(&[3, 8], true).unwrap();
        assert!(shape.check_batch_dims(&[5, 3, 8]).is_ok());
        assert!(shape.check_batch_dims(&[5, 8, 3]).is_err());
        assert!(shape.check_batch_dims(&[3, 8]).is_err());
    }
}
