//! AR frame capture and cloud visual localization.
//!
//! This crate lets an AR application find its pose by matching one captured camera
//! frame against a cloud-hosted 3-D map.
//!
//! # Architecture
//!
//! Three components, composed top-down:
//!
//! 1. **Session lifecycle** (`session`): brings up the rendering environment once,
//!    tracks session start/end signals, lends out scene/camera/renderer handles.
//! 2. **Frame capture** (`capture`): pulls one camera image and its intrinsics out of
//!    the next rendering frame, flips it top-down and encodes it as JPEG.
//! 3. **Localization client** (`client`): authorizes, uploads the frame and
//!    intrinsics, and enriches a found pose with map metadata.
//!
//! `controller::XrController` wires them together. The AR runtime itself sits behind
//! the traits in `xr`; `xr::stub::StubRuntime` is a headless implementation.
//!
//! # Module Structure
//!
//! - `xr`: runtime seam and the headless stub runtime
//! - `scene`: shared rendering handles
//! - `session`, `capture`, `client`, `controller`: the pipeline
//! - `config`, `error`, `ui`: ambient concerns

pub mod capture;
pub mod client;
pub mod config;
pub mod controller;
pub mod error;
pub mod scene;
pub mod session;
pub mod ui;
pub mod xr;

pub use capture::{CameraIntrinsics, CapturedFrame, FrameCapture};
pub use client::{
    AccessToken, HttpTransport, LocalizationClient, LocalizationResult, LocalizeResponse,
    MapDetails, Notifications, UreqTransport,
};
pub use config::{EndpointOverrides, Endpoints, LocalizerConfig, MapType};
pub use controller::XrController;
pub use error::{Handle, LocalizeError};
pub use scene::{PerspectiveCamera, Renderer, Scene, SceneNode, Shared};
pub use session::{LifecycleState, SessionManager};
pub use xr::{StubRuntime, UiContainer, XrRuntime};
