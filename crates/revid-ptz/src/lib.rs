//! PTZ calibration and targeting.
//!
//! Covers the geometric side of aiming a PTZ camera: geodesic helpers over
//! camera locations, a driver trait with ONVIF-normalized coordinates,
//! speed calibration (units-per-second), visual calibration (feature
//! centering with template re-location), RBF interpolation over confirmed
//! reference points, and absolute targeting from a bbox on a source camera.

pub mod driver;
pub mod error;
pub mod geo;
pub mod rbf;
pub mod speed;
pub mod target;
pub mod vision;
pub mod visual;

pub use driver::{FrameSource, PtzDriver, PtzRegistry, PtzStatus};
pub use error::{PtzError, PtzResult};
pub use geo::{bearing_between, destination_point, fov_polygon, wrap_degrees};
pub use rbf::RbfInterpolator;
pub use speed::{calibrate_speed, SpeedCalibration};
pub use target::{compute_target, TargetMethod, TargetSolution};
pub use visual::{VisualCalibrator, VisualCalibrationConfig, VisualCalibrationReport};
