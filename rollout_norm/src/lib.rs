//! # rollout_norm: online normalization statistics for RL rollouts
//!
//! Streaming statistics used to normalize observation and reward tensors
//! while a policy collects experience, plus a windowed averager for logged
//! metrics.
//!
//! ## Components
//!
//! ```text
//! ┌──────────────────────────────┐     ┌──────────────────────────┐
//! │        RunningMoments        │     │     WindowedAverager     │
//! │  batch ──► batch moments     │     │  values ──► blended mean │
//! │        ──► Chan merge        │     │  (len <= window_size)    │
//! │  input ──► (x - μ) / σ, clip │     └──────────────────────────┘
//! │        ◄── σ · clip(y) + μ   │
//! └──────────────────────────────┘
//! ```
//!
//! Both components are plain single-owner values. The training loop decides
//! when statistics accumulate by passing [`Mode::Train`] or [`Mode::Eval`].
//!
//! ## Usage
//!
//! ```rust,ignore
//! use rollout_norm::{Direction, Mode, MomentsConfig, RunningMoments, WindowedAverager};
//!
//! let mut obs_stats = RunningMoments::with_config(&[17], MomentsConfig::new())?;
//! let normalized = obs_stats.forward(&batch, Mode::Train, Direction::Normalize)?;
//!
//! let mut returns = WindowedAverager::new(100)?;
//! returns.update(&episode_returns);
//! log::info!("mean return {:.2}", returns.mean());
//! ```

pub mod core;
pub mod error;
pub mod metrics;
pub mod normalization;

pub use crate::core::{
    combine_moments, remove_moments, Direction, Mode, Moments, MomentsConfig, MomentsState,
    RunningMoments, SampleShape,
};
pub use error::{NormError, Result};
pub use metrics::WindowedAverager;
