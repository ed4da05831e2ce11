pub mod attitude;
pub mod calibration;
pub mod field;
pub mod frequency;
pub mod geometry;
pub mod gnss_fusion;
pub mod interpolation;
pub mod segmentation;
pub mod time_sync;

pub use attitude::AttitudeStage;
pub use calibration::{CalibrationStage, MagCalibration};
pub use field::{ResidualFieldStage, TotalFieldStage};
pub use frequency::{FrequencyIncreaseStage, FrequencyReduceStage};
pub use geometry::SensorGeometryStage;
pub use gnss_fusion::GnssFusionStage;
pub use interpolation::InterpolationStage;
pub use segmentation::SegmentationStage;
pub use time_sync::{TimeReference, TimeSyncStage};
