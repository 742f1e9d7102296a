//! AR localization controller.
//!
//! Composes the session manager, the frame capture pipeline and the localization
//! client. One controller drives at most one live session and one in-flight capture.

use std::sync::Arc;

use anyhow::Result;

use crate::capture::{FrameCapture, FrameCaptureOutput, InFlightGuard};
use crate::client::{HttpTransport, LocalizationClient, LocalizationResult};
use crate::error::{Handle, LocalizeError};
use crate::scene::{PerspectiveCamera, Renderer, Scene, Shared};
use crate::session::{LifecycleState, SessionManager};
use crate::xr::{LaunchButton, ReferenceSpace, UiContainer, XrRuntime, XrSession};

pub struct XrController<R: XrRuntime, T: HttpTransport> {
    session: SessionManager<R>,
    capture: FrameCapture,
    client: LocalizationClient<T>,
}

impl<R: XrRuntime, T: HttpTransport> XrController<R, T> {
    pub fn new(runtime: R, client: LocalizationClient<T>, container: Option<UiContainer>) -> Self {
        let capture = FrameCapture::new(client.config().capture_timeout);
        Self {
            session: SessionManager::new(runtime, container),
            capture,
            client,
        }
    }

    pub fn client(&self) -> &LocalizationClient<T> {
        &self.client
    }

    pub fn client_mut(&mut self) -> &mut LocalizationClient<T> {
        &mut self.client
    }

    pub fn session_manager(&self) -> &SessionManager<R> {
        &self.session
    }

    pub fn state(&self) -> LifecycleState {
        self.session.state()
    }

    pub fn initialize(&mut self, container: Option<UiContainer>) -> Result<Arc<LaunchButton>> {
        self.session.initialize(container).map_err(|err| {
            self.client.report(&err);
            err
        })
    }

    pub fn scene(&self) -> Result<Shared<Scene>> {
        self.session.scene()
    }

    pub fn camera(&self) -> Result<Shared<PerspectiveCamera>> {
        self.session.camera()
    }

    pub fn renderer(&self) -> Result<Shared<Renderer>> {
        self.session.renderer()
    }

    pub fn has_active_session(&self) -> bool {
        self.session.has_active_session()
    }

    pub fn is_capturing(&self) -> bool {
        self.capture.is_in_flight()
    }

    /// Captures one frame from the live session and localizes it.
    ///
    /// Rejects on usage errors (not initialized, no session, no reference space,
    /// capture already in flight, missing token) and on frame read-back failures.
    /// Every rejection also goes to `on_error`. `Ok(None)` means no usable frame,
    /// no pose, or an absorbed network failure.
    pub fn capture_frame(&self) -> Result<Option<LocalizationResult>> {
        let (_guard, output) = self.grab().map_err(|err| {
            log::warn!("frame capture failed: {:#}", err);
            self.client.report(&err);
            err
        })?;
        let Some((frame, intrinsics)) = output else {
            log::debug!("no usable camera frame");
            return Ok(None);
        };
        self.client.localize_with_frame(&frame, &intrinsics)
    }

    /// Grabs one frame; the guard keeps the capture in flight until localization ends.
    fn grab(&self) -> Result<(InFlightGuard, Option<FrameCaptureOutput>)> {
        let (session, space) = self.capture_target()?;
        let guard = self.capture.begin()?;
        let output = self.capture.grab(&session, space)?;
        Ok((guard, output))
    }

    fn capture_target(&self) -> Result<(Arc<dyn XrSession>, ReferenceSpace)> {
        if !self.session.is_initialized() {
            return Err(LocalizeError::NotInitialized(Handle::Renderer).into());
        }
        let session = self
            .session
            .session()
            .ok_or(LocalizeError::NoActiveSession)?;
        let space = self
            .session
            .reference_space()
            .ok_or(LocalizeError::NoReferenceSpace)?;
        Ok((session, space))
    }

    pub fn dispose(&mut self) {
        if self.capture.is_in_flight() {
            log::warn!("disposing while a frame capture is in flight");
        }
        self.session.dispose();
    }
}
