//! Burn tensor interface for [`RunningMoments`].
//!
//! Observation batches usually live on a device as `Tensor<B, D>` with the
//! batch axis first. These methods check the tensor dimensions against the
//! configured sample shape, read the values back for updates, and apply the
//! transform with broadcast statistics so the output stays on the input's
//! device.
//!
//! # Usage
//!
//! ```ignore
//! let config = MomentsConfig::new().with_per_channel(true);
//! let mut obs_stats = RunningMoments::with_config(&[3, 64, 64], config)?;
//!
//! // During rollouts: update statistics and normalize
//! let obs = obs_stats.forward_tensor(obs, Mode::Train, Direction::Normalize)?;
//!
//! // During evaluation: statistics stay frozen
//! let obs = obs_stats.forward_tensor(obs, Mode::Eval, Direction::Normalize)?;
//! ```

use crate::core::{Direction, Mode, RunningMoments};
use crate::error::{NormError, Result};
use burn::prelude::*;

impl RunningMoments {
    /// Absorb a batch tensor of shape `[N, ..sample_shape]`.
    pub fn update_tensor<B: Backend, const D: usize>(
        &mut self,
        batch: Tensor<B, D>,
        mode: Mode,
    ) -> Result<()> {
        if !mode.is_training() {
            return Ok(());
        }
        self.shape().check_batch_dims(&batch.dims())?;
        let values = tensor_to_vec(batch)?;
        self.update(&values, mode)
    }

    /// Apply the transform to a tensor of shape `[N, ..sample_shape]`.
    ///
    /// Statistics are cast to the tensor's float type and broadcast as
    /// `[1, C, 1, ..]` (per-channel) or `[1, ..sample_shape]` (flat).
    pub fn transform_tensor<B: Backend, const D: usize>(
        &self,
        input: Tensor<B, D>,
        direction: Direction,
    ) -> Result<Tensor<B, D>> {
        self.shape().check_batch_dims(&input.dims())?;

        let device = input.device();
        let mut stat_dims = [1usize; D];
        stat_dims.copy_from_slice(&self.shape().broadcast_dims());

        let mean = stat_tensor::<B, D>(self.mean(), stat_dims, &device);
        let std = stat_tensor::<B, D>(&self.std(), stat_dims, &device);
        let clip = self.config().clip;

        let output = match direction {
            Direction::Normalize if self.config().norm_only => input / std,
            Direction::Normalize => ((input - mean) / std).clamp(-clip, clip),
            Direction::Unnormalize => input.clamp(-clip, clip) * std + mean,
        };
        Ok(output)
    }

    /// Update (in [`Mode::Train`]) and then transform a tensor.
    pub fn forward_tensor<B: Backend, const D: usize>(
        &mut self,
        input: Tensor<B, D>,
        mode: Mode,
        direction: Direction,
    ) -> Result<Tensor<B, D>> {
        self.update_tensor(input.clone(), mode)?;
        self.transform_tensor(input, direction)
    }
}

/// Build a statistics tensor in broadcast layout.
fn stat_tensor<B: Backend, const D: usize>(
    values: &[f64],
    dims: [usize; D],
    device: &B::Device,
) -> Tensor<B, D> {
    let values: Vec<f32> = values.iter().map(|&v| v as f32).collect();
    Tensor::<B, 1>::from_floats(values.as_slice(), device).reshape(dims)
}

/// Read a float tensor back as row-major `f32` values.
pub(crate) fn tensor_to_vec<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Result<Vec<f32>> {
    tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| NormError::TensorData(format!("{:?}", e)))
}
