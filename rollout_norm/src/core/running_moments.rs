//! Running mean and variance over a stream of batches.
//!
//! Provides the online statistics used to normalize observations and rewards
//! during RL rollouts.
//!
//! # Features
//! - Batch updates merged with the parallel-moments combination
//! - Per-channel statistics broadcast across trailing axes, or one statistic
//!   per flattened element
//! - Clamped normalize transform and its inverse
//! - Explicit [`Mode`] argument instead of a stored training flag
//! - Opaque state snapshots for checkpointing
//!
//! # Example
//! ```ignore
//! use rollout_norm::{Direction, Mode, MomentsConfig, RunningMoments};
//!
//! let mut stats = RunningMoments::new(&[4])?; // 4-dim observations
//! stats.update(&[1.0, 2.0, 3.0, 4.0, 2.0, 3.0, 4.0, 5.0], Mode::Train)?;
//!
//! let normalized = stats.transform(&[1.5, 2.5, 3.5, 4.5], Direction::Normalize)?;
//! ```

use super::moments::{batch_moments, combine_moments, remove_moments, Moments};
use super::sample_shape::SampleShape;
use crate::error::{NormError, Result};
use serde::{Deserialize, Serialize};

/// Whether an update call accumulates statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mode {
    /// Statistics absorb every batch.
    Train,
    /// Statistics are frozen; only the transform applies.
    Eval,
}

impl Mode {
    pub fn is_training(self) -> bool {
        matches!(self, Mode::Train)
    }
}

/// Direction of the normalizing transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Center and scale by the running statistics.
    Normalize,
    /// Map normalized values back to the original scale.
    Unnormalize,
}

/// Configuration for [`RunningMoments`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MomentsConfig {
    /// Keep one statistic per axis-0 channel instead of per element.
    pub per_channel: bool,

    /// Scale by the standard deviation only, without centering or clamping.
    pub norm_only: bool,

    /// Added to the variance under the square root.
    pub epsilon: f64,

    /// Normalized values are clamped to `[-clip, clip]`.
    pub clip: f32,
}

impl Default for MomentsConfig {
    fn default() -> Self {
        Self {
            per_channel: false,
            norm_only: false,
            epsilon: 1e-5,
            clip: 5.0,
        }
    }
}

impl MomentsConfig {
    /// Create a new config with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep statistics per channel (axis 0 of the sample shape).
    pub fn with_per_channel(mut self, per_channel: bool) -> Self {
        self.per_channel = per_channel;
        self
    }

    /// Skip mean-centering in the forward transform.
    pub fn with_norm_only(mut self, norm_only: bool) -> Self {
        self.norm_only = norm_only;
        self
    }

    /// Set epsilon for numerical stability.
    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    /// Set the clamp bound of the transform.
    pub fn with_clip(mut self, clip: f32) -> Self {
        self.clip = clip;
        self
    }

    /// Check the scalar settings.
    pub fn validate(&self) -> Result<()> {
        if !self.epsilon.is_finite() || self.epsilon < 0.0 {
            return Err(NormError::InvalidConfig(format!(
                "epsilon must be finite and non-negative, got {}",
                self.epsilon
            )));
        }
        if !self.clip.is_finite() || self.clip <= 0.0 {
            return Err(NormError::InvalidConfig(format!(
                "clip must be finite and positive, got {}",
                self.clip
            )));
        }
        Ok(())
    }
}

/// Snapshot of the running statistics.
///
/// Treated as an opaque blob by the owning system: saved and restored verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MomentsState {
    pub mean: Vec<f64>,
    pub var: Vec<f64>,
    pub count: f64,
}

impl MomentsState {
    /// Little-endian encoding: `[slots: u64, count, mean.., var..]`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(16 + self.mean.len() * 16);
        bytes.extend_from_slice(&(self.mean.len() as u64).to_le_bytes());
        bytes.extend_from_slice(&self.count.to_le_bytes());
        for &m in &self.mean {
            bytes.extend_from_slice(&m.to_le_bytes());
        }
        for &v in &self.var {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        bytes
    }

    /// Decode a buffer written by [`MomentsState::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut words = bytes.chunks_exact(8).map(|chunk| {
            let mut word = [0u8; 8];
            word.copy_from_slice(chunk);
            word
        });

        let (Some(header), Some(count)) = (words.next(), words.next()) else {
            return Err(NormError::Snapshot("buffer too small".into()));
        };
        let slots = u64::from_le_bytes(header) as usize;
        let expected_len = slots
            .checked_mul(16)
            .and_then(|n| n.checked_add(16))
            .ok_or_else(|| NormError::Snapshot(format!("slot count {} overflows", slots)))?;
        if bytes.len() != expected_len {
            return Err(NormError::Snapshot(format!(
                "expected {} bytes for {} slots, got {}",
                expected_len,
                slots,
                bytes.len()
            )));
        }

        let values: Vec<f64> = words.map(f64::from_le_bytes).collect();
        let (mean, var) = values.split_at(slots);

        Ok(Self {
            mean: mean.to_vec(),
            var: var.to_vec(),
            count: f64::from_le_bytes(count),
        })
    }
}

/// Starting moments of every slot: mean 0, variance 1, count 1.
const PRIOR: Moments = Moments {
    mean: 0.0,
    var: 1.0,
    count: 1.0,
};

/// Running mean and variance with a reversible normalizing transform.
///
/// Statistics start at mean 0, variance 1 and count 1; the unit count keeps
/// the first merge well defined and biases early estimates toward the prior.
#[derive(Debug, Clone)]
pub struct RunningMoments {
    shape: SampleShape,
    config: MomentsConfig,
    mean: Vec<f64>,
    var: Vec<f64>,
    count: f64,
}

impl RunningMoments {
    /// Create flat statistics for samples of the given shape.
    pub fn new(shape: &[usize]) -> Result<Self> {
        Self::with_config(shape, MomentsConfig::default())
    }

    /// Create with a custom configuration.
    ///
    /// # Errors
    /// Fails on an invalid config or a shape the layout cannot support
    /// (see [`SampleShape::new`]).
    pub fn with_config(shape: &[usize], config: MomentsConfig) -> Result<Self> {
        config.validate()?;
        let shape = SampleShape::new(shape, config.per_channel)?;
        let slots = shape.num_slots();

        log::debug!(
            "RunningMoments: shape={:?} per_channel={} norm_only={} slots={}",
            shape.dims(),
            config.per_channel,
            config.norm_only,
            slots
        );

        Ok(Self {
            shape,
            config,
            mean: vec![PRIOR.mean; slots],
            var: vec![PRIOR.var; slots],
            count: PRIOR.count,
        })
    }

    /// Absorb a flattened batch of samples.
    ///
    /// Does nothing in [`Mode::Eval`] or when the batch is empty. A batch whose
    /// length is not a whole number of samples is rejected and leaves the
    /// statistics untouched.
    pub fn update(&mut self, batch: &[f32], mode: Mode) -> Result<()> {
        if !mode.is_training() || batch.is_empty() {
            return Ok(());
        }
        let num_samples = self.shape.num_samples(batch.len())?;
        let batch = batch_moments(batch, &self.shape, num_samples);

        if batch.iter().any(|m| !m.is_finite()) {
            log::warn!(
                "Non-finite batch moments for shape {:?}; running statistics will degrade",
                self.shape.dims()
            );
        }

        self.absorb(&batch);
        Ok(())
    }

    /// Apply the transform to a flattened batch without touching the statistics.
    pub fn transform(&self, input: &[f32], direction: Direction) -> Result<Vec<f32>> {
        let mut output = input.to_vec();
        self.transform_in_place(&mut output, direction)?;
        Ok(output)
    }

    /// Apply the transform in place.
    pub fn transform_in_place(&self, values: &mut [f32], direction: Direction) -> Result<()> {
        self.shape.num_samples(values.len())?;

        let std = self.std();
        let clip = self.config.clip as f64;
        for (i, x) in values.iter_mut().enumerate() {
            let slot = self.shape.slot_of(i);
            let (mean, std) = (self.mean[slot], std[slot]);
            let v = *x as f64;
            let y = match direction {
                Direction::Normalize if self.config.norm_only => v / std,
                Direction::Normalize => ((v - mean) / std).clamp(-clip, clip),
                Direction::Unnormalize => std * v.clamp(-clip, clip) + mean,
            };
            *x = y as f32;
        }
        Ok(())
    }

    /// Update (in [`Mode::Train`]) and then transform the same batch.
    pub fn forward(&mut self, input: &[f32], mode: Mode, direction: Direction) -> Result<Vec<f32>> {
        self.update(input, mode)?;
        self.transform(input, direction)
    }

    /// Merge statistics accumulated by another instance over the same layout.
    ///
    /// `other`'s starting prior is split out before combining, so the result
    /// equals feeding `other`'s batches to `self` with [`RunningMoments::update`].
    /// Merging an instance that has seen no samples is a no-op.
    pub fn merge(&mut self, other: &RunningMoments) -> Result<()> {
        if other.shape != self.shape {
            return Err(NormError::ShapeMismatch {
                expected: format!("{:?} (per_channel={})", self.shape.dims(), self.shape.per_channel()),
                actual: format!("{:?} (per_channel={})", other.shape.dims(), other.shape.per_channel()),
            });
        }

        let incoming: Vec<Moments> = other
            .mean
            .iter()
            .zip(&other.var)
            .map(|(&mean, &var)| remove_moments(Moments::new(mean, var, other.count), PRIOR))
            .collect();
        if incoming.iter().all(|m| m.count <= 0.0) {
            return Ok(());
        }
        self.absorb(&incoming);
        Ok(())
    }

    fn absorb(&mut self, batch: &[Moments]) {
        let mut count = self.count;
        for (slot, &incoming) in batch.iter().enumerate() {
            let merged = combine_moments(
                Moments::new(self.mean[slot], self.var[slot], self.count),
                incoming,
            );
            self.mean[slot] = merged.mean;
            self.var[slot] = merged.var;
            count = merged.count;
        }
        self.count = count;
    }

    /// Snapshot the statistics.
    pub fn state(&self) -> MomentsState {
        MomentsState {
            mean: self.mean.clone(),
            var: self.var.clone(),
            count: self.count,
        }
    }

    /// Replace the statistics with a snapshot.
    ///
    /// The snapshot must match the slot count, have `count >= 1` and
    /// non-negative variances.
    pub fn restore(&mut self, state: MomentsState) -> Result<()> {
        let slots = self.shape.num_slots();
        let problem = if state.mean.len() != slots || state.var.len() != slots {
            Some(format!(
                "expected {} slots, got mean={} var={}",
                slots,
                state.mean.len(),
                state.var.len()
            ))
        } else if !(state.count >= 1.0) {
            Some(format!("count must be >= 1, got {}", state.count))
        } else if state.var.iter().any(|&v| !(v >= 0.0)) {
            Some("variance entries must be non-negative".to_string())
        } else {
            None
        };

        if let Some(problem) = problem {
            log::warn!("Rejected RunningMoments snapshot: {}", problem);
            return Err(NormError::Snapshot(problem));
        }

        self.mean = state.mean;
        self.var = state.var;
        self.count = state.count;
        Ok(())
    }

    /// Serialize the statistics to bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.state().to_bytes()
    }

    /// Restore the statistics from bytes written by [`RunningMoments::to_bytes`].
    pub fn restore_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.restore(MomentsState::from_bytes(bytes)?)
    }

    /// Reset statistics to mean 0, variance 1, count 1.
    pub fn reset(&mut self) {
        self.mean.fill(PRIOR.mean);
        self.var.fill(PRIOR.var);
        self.count = PRIOR.count;
    }

    /// Get the mean per slot.
    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    /// Get the variance per slot.
    pub fn var(&self) -> &[f64] {
        &self.var
    }

    /// Get `sqrt(var + epsilon)` per slot.
    pub fn std(&self) -> Vec<f64> {
        self.var
            .iter()
            .map(|&v| (v + self.config.epsilon).sqrt())
            .collect()
    }

    /// Get the number of samples absorbed, including the initial unit count.
    pub fn count(&self) -> f64 {
        self.count
    }

    pub fn shape(&self) -> &SampleShape {
        &self.shape
    }

    /// Get the number of statistic slots.
    pub fn num_slots(&self) -> usize {
        self.shape.num_slots()
    }

    pub fn config(&self) -> &MomentsConfig {
        &self.config
    }
}
