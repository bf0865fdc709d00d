//! Batch-level reporting: outlier flags, grid statistics, average curves and
//! terminal output.

pub mod aggregate;
pub mod average;
pub mod format;
pub mod outliers;

pub use aggregate::{ChannelStatistics, GridStatistics, Histogram, ResultAggregator, channel_values};
pub use average::{AverageCurve, AveragedSegment, average_curve};
pub use format::{format_channel_table, format_problem_curves, format_run_summary};
pub use outliers::{flag_indices, flag_outliers};
