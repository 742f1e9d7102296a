use serde::{Deserialize, Serialize};

/// Pinhole intrinsics in pixels, paired 1:1 with a captured frame.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    pub fx: f64,
    pub fy: f64,
    pub px: f64,
    pub py: f64,
    pub width: u32,
    pub height: u32,
}

impl CameraIntrinsics {
    /// Maps a column-major NDC projection matrix to pixel-space intrinsics.
    ///
    /// `fx = w/2 * P[0]`, `fy = h/2 * P[5]`, `px = (1 - P[8]) * w/2`, `py = (1 - P[9]) * h/2`.
    /// The pose solver expects exactly this mapping.
    pub fn from_projection(projection: &[f32; 16], width: u32, height: u32) -> Self {
        let half_w = width as f64 / 2.0;
        let half_h = height as f64 / 2.0;
        Self {
            fx: half_w * projection[0] as f64,
            fy: half_h * projection[5] as f64,
            px: (1.0 - projection[8] as f64) * half_w,
            py: (1.0 - projection[9] as f64) * half_h,
            width,
            height,
        }
    }
}
