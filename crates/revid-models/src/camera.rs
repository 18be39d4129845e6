//! Camera configuration.

use serde::{Deserialize, Serialize};

/// PTZ-specific settings for a camera.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PtzSettings {
    /// Total pan range in degrees covered by the ONVIF [-1, 1] axis
    pub pan_range_deg: f64,
    /// Compass bearing of the PTZ home position (pan = 0)
    pub home_bearing_deg: f64,
}

/// Static camera configuration. Mutated only by the operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    /// Camera identifier (matches the upstream NVR name)
    pub camera_id: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Compass bearing the camera faces, degrees clockwise from north
    pub bearing_deg: f64,
    /// Horizontal field of view in degrees
    pub fov_angle_deg: f64,
    /// Usable viewing range in meters
    pub fov_range_m: f64,
    /// Present when the camera is a PTZ
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ptz: Option<PtzSettings>,
    /// ONVIF endpoint host, when the camera supports PTZ control
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub onvif_endpoint: Option<String>,
}

impl Camera {
    /// True when this camera can be aimed.
    pub fn is_ptz(&self) -> bool {
        self.ptz.is_some()
    }
}
