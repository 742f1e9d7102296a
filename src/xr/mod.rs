//! Rendering-runtime seam.
//!
//! The AR runtime (session management, per-frame callbacks, GPU access) lives outside
//! this crate. These traits describe the narrow surface the pipeline needs:
//! - `XrRuntime`: secure-context check, renderer creation, launch affordance,
//!   session signals, animation loop, current session and reference space
//! - `XrSession`: single-shot frame callback scheduling
//! - `XrFrame`: viewer pose lookup inside a frame callback
//! - `GpuContext`: camera image binding and framebuffer read-back
//!
//! Implementations must invoke frame callbacks and the animation loop from a single
//! rendering thread. Handles passed into a frame callback are only valid for that call.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Result;

use crate::scene::{PerspectiveCamera, Scene};

pub mod stub;

pub use stub::StubRuntime;

/// Single-shot callback run on the next rendering frame.
pub type FrameCallback = Box<dyn FnOnce(&dyn XrFrame, &mut dyn GpuContext) + Send>;

/// Continuous per-frame callback, independent of session state.
pub type AnimationLoop = Box<dyn FnMut(&mut dyn GpuContext) + Send>;

/// Session start/end listener.
pub type SessionListener = Box<dyn FnMut(SessionSignal) + Send>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionSignal {
    Started,
    Ended,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FramebufferId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CameraBindingId(pub u32);

/// Spatial frame the viewer pose is reported against.
#[derive(Clone, Debug, PartialEq)]
pub struct ReferenceSpace {
    pub kind: String,
}

impl ReferenceSpace {
    pub fn local() -> Self {
        Self {
            kind: "local".to_string(),
        }
    }
}

/// Device camera exposed by a view, in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct XrCamera {
    pub width: u32,
    pub height: u32,
}

/// One camera perspective for the current frame.
#[derive(Clone, Debug)]
pub struct XrView {
    /// 4x4 projection matrix, column-major.
    pub projection_matrix: [f32; 16],
    /// Present only when the session grants raw camera access for this view.
    pub camera: Option<XrCamera>,
}

#[derive(Clone, Debug)]
pub struct ViewerPose {
    pub position: [f32; 3],
    pub orientation: [f32; 4],
    pub views: Vec<XrView>,
}

pub trait XrFrame {
    fn viewer_pose(&self, space: &ReferenceSpace) -> Option<ViewerPose>;
}

/// GPU operations available inside a frame callback.
pub trait GpuContext {
    /// Creates a fresh binding between the session and this context.
    fn create_camera_binding(&mut self) -> Result<CameraBindingId>;

    fn release_camera_binding(&mut self, binding: CameraBindingId);

    /// Camera texture for `camera`, valid until the frame callback returns.
    fn camera_image(&mut self, binding: CameraBindingId, camera: &XrCamera) -> Option<TextureId>;

    fn create_framebuffer(&mut self) -> Result<FramebufferId>;

    fn delete_framebuffer(&mut self, framebuffer: FramebufferId);

    /// `None` binds the runtime's default framebuffer.
    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>);

    fn attach_texture(&mut self, framebuffer: FramebufferId, texture: TextureId) -> Result<()>;

    /// Reads RGBA8 pixels from the bound framebuffer, bottom row first.
    fn read_pixels(&mut self, width: u32, height: u32) -> Result<Vec<u8>>;

    /// Framebuffer the runtime renders into while presenting.
    fn default_framebuffer(&self) -> Option<FramebufferId> {
        None
    }
}

pub trait XrSession: Send + Sync {
    /// Schedules `callback` for the next rendering frame.
    fn request_frame(&self, callback: FrameCallback);
}

/// Renderer backend owned by the runtime.
pub trait RenderSurface: Send {
    fn render(&mut self, gpu: &mut dyn GpuContext, scene: &Scene, camera: &PerspectiveCamera);

    fn set_size(&mut self, width: u32, height: u32);

    fn dispose(&mut self);
}

/// Options forwarded to the session-launching affordance.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionOptions {
    pub required_features: Vec<String>,
    pub optional_features: Vec<String>,
    pub overlay_root: Option<UiContainer>,
}

impl SessionOptions {
    /// Immersive AR with raw camera access and an optional DOM overlay.
    pub fn camera_access(overlay_root: Option<UiContainer>) -> Self {
        Self {
            required_features: vec!["camera-access".to_string()],
            optional_features: vec!["dom-overlay".to_string()],
            overlay_root,
        }
    }
}

/// UI element a launch affordance can be attached to.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct UiContainer(pub String);

impl UiContainer {
    pub const OVERLAY_ROOT: &'static str = "overlay-root";

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn overlay_root() -> Self {
        Self(Self::OVERLAY_ROOT.to_string())
    }
}

static NEXT_BUTTON_ID: AtomicU64 = AtomicU64::new(1);

/// Session-launching UI affordance. Opaque apart from its identity and label.
#[derive(Debug, PartialEq, Eq)]
pub struct LaunchButton {
    id: u64,
    pub label: String,
}

impl LaunchButton {
    pub fn new(label: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_BUTTON_ID.fetch_add(1, Ordering::Relaxed),
            label: label.into(),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

pub trait XrRuntime: Send {
    /// HTTPS-equivalent origin; camera access is refused otherwise.
    fn is_secure_context(&self) -> bool;

    fn create_renderer(&mut self) -> Result<Box<dyn RenderSurface>>;

    /// Viewport size used for the initial camera aspect and renderer size.
    fn viewport(&self) -> (u32, u32);

    fn create_launch_button(&mut self, options: &SessionOptions) -> Result<Arc<LaunchButton>>;

    fn attach(&mut self, button: &Arc<LaunchButton>, container: &UiContainer) -> Result<()>;

    fn detach(&mut self, button: &Arc<LaunchButton>);

    fn add_session_listener(&mut self, listener: SessionListener) -> ListenerId;

    fn remove_session_listener(&mut self, id: ListenerId);

    /// `None` stops the loop.
    fn set_animation_loop(&mut self, animation: Option<AnimationLoop>);

    /// True while the runtime is presenting an immersive session.
    fn is_presenting(&self) -> bool;

    fn session(&self) -> Option<Arc<dyn XrSession>>;

    fn reference_space(&self) -> Option<ReferenceSpace>;
}
