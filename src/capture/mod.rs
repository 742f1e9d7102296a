//! Frame capture pipeline.
//!
//! Produces exactly one (`CapturedFrame`, `CameraIntrinsics`) pair from the next rendering
//! frame, or determines that none is available. The pipeline is responsible for:
//! - Scheduling work on the next frame callback (camera textures are only valid there)
//! - Reading the camera texture back through one offscreen framebuffer per capture
//! - Flipping rows to top-down order and encoding JPEG at quality 0.7
//! - Deriving intrinsics from the same view's projection matrix
//! - Restoring the default framebuffer before the callback returns
//!
//! The pipeline MUST NOT:
//! - Combine an image and intrinsics from different frames or views
//! - Cache camera bindings or framebuffers across captures
//! - Run network requests inside the frame callback

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

pub mod intrinsics;
pub mod pixels;

pub use intrinsics::CameraIntrinsics;

use crate::error::LocalizeError;
use crate::xr::{
    CameraBindingId, GpuContext, ReferenceSpace, TextureId, XrCamera, XrFrame, XrSession,
};
use pixels::{encode_jpeg, flip_vertical, JPEG_QUALITY, RGBA_BYTES_PER_PIXEL};

pub const DEFAULT_CAPTURE_TIMEOUT: Duration = Duration::from_secs(5);

/// Encoded camera image. Immutable once produced.
#[derive(Clone, PartialEq, Eq)]
pub struct CapturedFrame {
    jpeg: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl CapturedFrame {
    pub fn new(jpeg: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            jpeg,
            width,
            height,
        }
    }

    pub fn jpeg_bytes(&self) -> &[u8] {
        &self.jpeg
    }

    pub fn byte_len(&self) -> usize {
        self.jpeg.len()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.jpeg
    }
}

impl std::fmt::Debug for CapturedFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapturedFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.jpeg.len())
            .finish()
    }
}

/// Image and intrinsics taken from the same frame and view.
pub type FrameCaptureOutput = (CapturedFrame, CameraIntrinsics);

/// Single-flight frame grabber.
pub struct FrameCapture {
    in_flight: Arc<AtomicBool>,
    timeout: Duration,
}

/// Clears the in-flight flag when the capture resolves, whatever the outcome.
#[derive(Debug)]
pub struct InFlightGuard {
    flag: Arc<AtomicBool>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

impl FrameCapture {
    pub fn new(timeout: Duration) -> Self {
        Self {
            in_flight: Arc::new(AtomicBool::new(false)),
            timeout,
        }
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Marks a capture as started. Rejects a second capture until the guard drops.
    pub fn begin(&self) -> Result<InFlightGuard> {
        self.in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| LocalizeError::CaptureInFlight)?;
        Ok(InFlightGuard {
            flag: Arc::clone(&self.in_flight),
        })
    }

    /// Grabs one frame from `session` on its next frame callback and waits for the result.
    ///
    /// `Ok(None)` means no usable frame (tracking loss, no camera texture).
    pub fn grab(
        &self,
        session: &Arc<dyn XrSession>,
        space: ReferenceSpace,
    ) -> Result<Option<FrameCaptureOutput>> {
        let (tx, rx) = mpsc::channel();
        session.request_frame(Box::new(move |frame, gpu| {
            let outcome = capture_in_frame(frame, gpu, &space);
            restore_default_framebuffer(gpu);
            // The receiver is gone only if the caller timed out.
            let _ = tx.send(outcome);
        }));
        match rx.recv_timeout(self.timeout) {
            Ok(outcome) => outcome,
            Err(_) => Err(LocalizeError::FrameTimeout(self.timeout.as_millis() as u64).into()),
        }
    }
}

impl Default for FrameCapture {
    fn default() -> Self {
        Self::new(DEFAULT_CAPTURE_TIMEOUT)
    }
}

fn restore_default_framebuffer(gpu: &mut dyn GpuContext) {
    let default = gpu.default_framebuffer();
    gpu.bind_framebuffer(default);
}

/// Body of the frame callback. Runs on the rendering thread.
pub(crate) fn capture_in_frame(
    frame: &dyn XrFrame,
    gpu: &mut dyn GpuContext,
    space: &ReferenceSpace,
) -> Result<Option<FrameCaptureOutput>> {
    let Some(pose) = frame.viewer_pose(space) else {
        log::debug!("no viewer pose this frame");
        return Ok(None);
    };

    // A fresh binding per capture: bindings do not outlive session changes.
    let binding = gpu.create_camera_binding().context("create camera binding")?;
    let result = capture_first_usable_view(&pose.views, gpu, binding);
    gpu.release_camera_binding(binding);
    result
}

fn capture_first_usable_view(
    views: &[crate::xr::XrView],
    gpu: &mut dyn GpuContext,
    binding: CameraBindingId,
) -> Result<Option<FrameCaptureOutput>> {
    for (index, view) in views.iter().enumerate() {
        let Some(camera) = view.camera else {
            continue;
        };
        let Some(texture) = gpu.camera_image(binding, &camera) else {
            log::debug!("view {} has no camera image", index);
            continue;
        };

        let mut rgba = read_back(gpu, texture, &camera)?;
        flip_vertical(&mut rgba, camera.width, camera.height, RGBA_BYTES_PER_PIXEL)?;
        let jpeg = encode_jpeg(&rgba, camera.width, camera.height, JPEG_QUALITY)?;
        if jpeg.is_empty() {
            log::debug!("view {} encoded to zero bytes; skipping", index);
            continue;
        }

        let intrinsics =
            CameraIntrinsics::from_projection(&view.projection_matrix, camera.width, camera.height);
        log::debug!(
            "captured view {}: {}x{}, {} bytes",
            index,
            camera.width,
            camera.height,
            jpeg.len()
        );
        return Ok(Some((
            CapturedFrame::new(jpeg, camera.width, camera.height),
            intrinsics,
        )));
    }
    Ok(None)
}

/// Copies `texture` into CPU memory through one temporary framebuffer.
fn read_back(gpu: &mut dyn GpuContext, texture: TextureId, camera: &XrCamera) -> Result<Vec<u8>> {
    let framebuffer = gpu.create_framebuffer().context("create read-back framebuffer")?;
    gpu.bind_framebuffer(Some(framebuffer));
    let pixels = gpu
        .attach_texture(framebuffer, texture)
        .and_then(|_| gpu.read_pixels(camera.width, camera.height))
        .context("read camera texture");
    gpu.delete_framebuffer(framebuffer);
    pixels
}
