//! Running statistics for observation and reward normalization.

pub mod moments;
pub mod running_moments;
pub mod sample_shape;


pub use moments::{batch_moments, combine_moments, remove_moments, Moments};
pub use running_moments::{Direction, Mode, MomentsConfig, MomentsState, RunningMoments};
pub use sample_shape::{SampleShape, MAX_CHANNEL_RANK};
