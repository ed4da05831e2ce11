pub mod angles;
pub mod geodesy;
pub mod geomagnetic;
pub mod matrix;
pub mod stats;

pub use geomagnetic::{FixedReference, GeomagneticReference, WorldMagneticModel};
pub use matrix::MatrixHelper;
pub use stats::StatsHelper;
