//! Bounded-window running average for logged scalars (e.g. episode returns).
//!
//! The window is approximated with two scalars instead of a ring buffer of raw
//! values: each update blends the batch mean into the current mean, keeping at
//! most `window_size - batch_size` samples' worth of history. A batch larger
//! than the window counts as exactly `window_size` samples.

use crate::error::{NormError, Result};
use crate::normalization::tensor_to_vec;
use burn::prelude::*;
use serde::{Deserialize, Serialize};

/// Windowed running mean of scalar values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowedAverager {
    window_size: usize,
    current_size: usize,
    mean: f64,
}

impl WindowedAverager {
    /// Create an averager over at most `window_size` samples.
    pub fn new(window_size: usize) -> Result<Self> {
        if window_size == 0 {
            return Err(NormError::InvalidConfig(
                "window_size must be positive".to_string(),
            ));
        }
        Ok(Self {
            window_size,
            current_size: 0,
            mean: 0.0,
        })
    }

    /// Blend a batch of values into the windowed mean. Empty batches are ignored.
    pub fn update(&mut self, values: &[f32]) {
        if values.is_empty() {
            return;
        }

        let batch_mean = values.iter().map(|&v| v as f64).sum::<f64>() / values.len() as f64;
        let batch_size = values.len().min(self.window_size);
        let old_size = (self.window_size - batch_size).min(self.current_size);
        let total = old_size + batch_size;

        self.mean = (self.mean * old_size as f64 + batch_mean * batch_size as f64) / total as f64;
        self.current_size = total;
    }

    /// Blend a 1-D tensor of values into the windowed mean.
    pub fn update_tensor<B: Backend>(&mut self, values: Tensor<B, 1>) -> Result<()> {
        let values = tensor_to_vec(values)?;
        self.update(&values);
        Ok(())
    }

    /// Forget all history.
    pub fn clear(&mut self) {
        self.current_size = 0;
        self.mean = 0.0;
    }

    /// Number of samples the mean currently represents.
    pub fn len(&self) -> usize {
        self.current_size
    }

    pub fn is_empty(&self) -> bool {
        self.current_size == 0
    }

    /// Current windowed mean, 0 before any samples.
    pub fn mean(&self) -> f64 {
        if self.current_size == 0 {
            0.0
        } else {
            self.mean
        }
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }
}
