//! Headless in-memory AR runtime.
//!
//! `StubRuntime` implements the full runtime seam without a device:
//! - Secure-context flag, viewport and launch affordance bookkeeping
//! - Session start/end signalling to registered listeners
//! - A programmable viewer pose and a synthetic camera texture
//! - Framebuffer read-back returning bottom-up RGBA rows like a GPU would
//!
//! `StubRuntime` is a cheap clonable handle. Keep a clone to drive the session
//! (`start_session`, `end_session`, `advance_frame`) after handing one to the manager.
//!
//! By default a requested frame callback runs immediately (the "next frame" arrives
//! synchronously). `set_auto_frame(false)` queues callbacks until `advance_frame()`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, Result};

use super::{
    AnimationLoop, CameraBindingId, FrameCallback, FramebufferId, GpuContext, LaunchButton,
    ListenerId, ReferenceSpace, RenderSurface, SessionListener, SessionOptions, SessionSignal,
    TextureId, UiContainer, ViewerPose, XrCamera, XrFrame, XrRuntime, XrSession, XrView,
};
use crate::scene::{PerspectiveCamera, Scene};

const CAMERA_TEXTURE: TextureId = TextureId(1);
const DEFAULT_FRAMEBUFFER: FramebufferId = FramebufferId(0);

/// Column-major OpenGL-style perspective projection.
pub fn perspective_projection(fov_y_deg: f32, aspect: f32, near: f32, far: f32) -> [f32; 16] {
    let f = 1.0 / (fov_y_deg.to_radians() / 2.0).tan();
    let range_inv = 1.0 / (near - far);
    let mut m = [0.0f32; 16];
    m[0] = f / aspect;
    m[5] = f;
    m[10] = (near + far) * range_inv;
    m[11] = -1.0;
    m[14] = 2.0 * near * far * range_inv;
    m
}

/// Synthetic top-down RGBA gradient.
pub fn gradient_rgba(width: u32, height: u32) -> Vec<u8> {
    let mut pixels = Vec::with_capacity((width * height * 4) as usize);
    for y in 0..height {
        for x in 0..width {
            pixels.push((x * 255 / width.max(1)) as u8);
            pixels.push((y * 255 / height.max(1)) as u8);
            pixels.push(96);
            pixels.push(255);
        }
    }
    pixels
}

/// Counters recorded by the stub GPU and runtime.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StubStats {
    pub renderers_created: usize,
    pub renderers_disposed: usize,
    pub frames_rendered: u64,
    pub frame_callbacks_run: usize,
    pub camera_bindings_created: usize,
    pub framebuffers_created: usize,
    pub framebuffers_deleted: usize,
    pub pixel_reads: usize,
    /// Framebuffer bound when the last frame callback returned.
    pub bound_after_callback: Option<FramebufferId>,
}

struct StubState {
    secure: bool,
    viewport: (u32, u32),
    auto_frame: bool,
    listeners: Vec<(ListenerId, SessionListener)>,
    next_listener: u64,
    animation: Option<AnimationLoop>,
    animation_installs: usize,
    presenting: bool,
    session: Option<Arc<StubSession>>,
    reference_space: Option<ReferenceSpace>,
    viewer_pose: Option<ViewerPose>,
    camera_pixels: Option<(XrCamera, Vec<u8>)>,
    buttons_created: usize,
    attached: Vec<(u64, UiContainer)>,
    pending_frames: Vec<FrameCallback>,
    stats: StubStats,
}

#[derive(Clone)]
pub struct StubRuntime {
    state: Arc<Mutex<StubState>>,
}

impl Default for StubRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl StubRuntime {
    /// Secure context, 640x480 viewport, one camera view with a gradient image.
    pub fn new() -> Self {
        let (width, height) = (640, 480);
        let camera = XrCamera { width, height };
        let pose = ViewerPose {
            position: [0.0; 3],
            orientation: [0.0, 0.0, 0.0, 1.0],
            views: vec![XrView {
                projection_matrix: perspective_projection(
                    60.0,
                    width as f32 / height as f32,
                    0.01,
                    20.0,
                ),
                camera: Some(camera),
            }],
        };
        Self {
            state: Arc::new(Mutex::new(StubState {
                secure: true,
                viewport: (width, height),
                auto_frame: true,
                listeners: Vec::new(),
                next_listener: 1,
                animation: None,
                animation_installs: 0,
                presenting: false,
                session: None,
                reference_space: None,
                viewer_pose: Some(pose),
                camera_pixels: Some((camera, gradient_rgba(width, height))),
                buttons_created: 0,
                attached: Vec::new(),
                pending_frames: Vec::new(),
                stats: StubStats::default(),
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, StubState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn set_secure_context(&self, secure: bool) {
        self.state().secure = secure;
    }

    pub fn set_auto_frame(&self, auto: bool) {
        self.state().auto_frame = auto;
    }

    /// `None` simulates tracking loss.
    pub fn set_viewer_pose(&self, pose: Option<ViewerPose>) {
        self.state().viewer_pose = pose;
    }

    /// Top-down RGBA pixels served as the camera texture. `None` withholds the texture.
    pub fn set_camera_image(&self, image: Option<(XrCamera, Vec<u8>)>) {
        self.state().camera_pixels = image;
    }

    /// Begins presenting and notifies listeners with `SessionSignal::Started`.
    pub fn start_session(&self) {
        {
            let mut state = self.state();
            state.presenting = true;
            state.session = Some(Arc::new(StubSession {
                state: Arc::clone(&self.state),
            }));
            state.reference_space = Some(ReferenceSpace::local());
        }
        self.notify(SessionSignal::Started);
    }

    /// Stops presenting and notifies listeners with `SessionSignal::Ended`.
    pub fn end_session(&self) {
        {
            let mut state = self.state();
            state.presenting = false;
            state.session = None;
            state.reference_space = None;
            state.pending_frames.clear();
        }
        self.notify(SessionSignal::Ended);
    }

    /// Drops presentation without emitting a signal, as on abrupt device loss.
    pub fn lose_session(&self) {
        let mut state = self.state();
        state.presenting = false;
        state.session = None;
    }

    /// Keeps the session but removes its reference space.
    pub fn drop_reference_space(&self) {
        self.state().reference_space = None;
    }

    /// Runs queued frame callbacks, then one animation loop iteration.
    pub fn advance_frame(&self) {
        let pending = std::mem::take(&mut self.state().pending_frames);
        for callback in pending {
            run_frame_callback(&self.state, callback);
        }
        let animation = self.state().animation.take();
        if let Some(mut animation) = animation {
            let mut gpu = StubGpu::from_state(&self.state());
            animation(&mut gpu);
            let mut state = self.state();
            // The loop may have been replaced or cleared while it ran.
            if state.animation.is_none() && state.animation_installs > 0 {
                state.animation = Some(animation);
            }
        }
    }

    pub fn listener_count(&self) -> usize {
        self.state().listeners.len()
    }

    pub fn has_animation_loop(&self) -> bool {
        self.state().animation.is_some()
    }

    pub fn animation_installs(&self) -> usize {
        self.state().animation_installs
    }

    pub fn buttons_created(&self) -> usize {
        self.state().buttons_created
    }

    /// Containers holding an attached launch affordance.
    pub fn attached_containers(&self) -> Vec<UiContainer> {
        self.state()
            .attached
            .iter()
            .map(|(_, container)| container.clone())
            .collect()
    }

    pub fn pending_frames(&self) -> usize {
        self.state().pending_frames.len()
    }

    pub fn stats(&self) -> StubStats {
        self.state().stats.clone()
    }

    fn notify(&self, signal: SessionSignal) {
        let mut listeners = std::mem::take(&mut self.state().listeners);
        for (_, listener) in listeners.iter_mut() {
            listener(signal);
        }
        let mut state = self.state();
        // Keep listeners registered while we were notifying.
        listeners.append(&mut state.listeners);
        state.listeners = listeners;
    }
}

fn run_frame_callback(state: &Arc<Mutex<StubState>>, callback: FrameCallback) {
    let (frame, mut gpu) = {
        let state = state.lock().unwrap_or_else(|p| p.into_inner());
        (
            StubFrame {
                pose: state.viewer_pose.clone(),
            },
            StubGpu::from_state(&state),
        )
    };
    callback(&frame, &mut gpu);
    let mut state = state.lock().unwrap_or_else(|p| p.into_inner());
    state.stats.frame_callbacks_run += 1;
    state.stats.camera_bindings_created += gpu.bindings_created;
    state.stats.framebuffers_created += gpu.framebuffers_created;
    state.stats.framebuffers_deleted += gpu.framebuffers_deleted;
    state.stats.pixel_reads += gpu.pixel_reads;
    state.stats.bound_after_callback = gpu.bound;
}

impl XrRuntime for StubRuntime {
    fn is_secure_context(&self) -> bool {
        self.state().secure
    }

    fn create_renderer(&mut self) -> Result<Box<dyn RenderSurface>> {
        self.state().stats.renderers_created += 1;
        Ok(Box::new(StubSurface {
            state: Arc::clone(&self.state),
            size: (0, 0),
        }))
    }

    fn viewport(&self) -> (u32, u32) {
        self.state().viewport
    }

    fn create_launch_button(&mut self, options: &SessionOptions) -> Result<Arc<LaunchButton>> {
        if !options
            .required_features
            .iter()
            .any(|feature| feature == "camera-access")
        {
            return Err(anyhow!("stub runtime only launches camera-access sessions"));
        }
        self.state().buttons_created += 1;
        Ok(LaunchButton::new("START AR"))
    }

    fn attach(&mut self, button: &Arc<LaunchButton>, container: &UiContainer) -> Result<()> {
        let mut state = self.state();
        state.attached.retain(|(id, _)| *id != button.id());
        state.attached.push((button.id(), container.clone()));
        Ok(())
    }

    fn detach(&mut self, button: &Arc<LaunchButton>) {
        self.state().attached.retain(|(id, _)| *id != button.id());
    }

    fn add_session_listener(&mut self, listener: SessionListener) -> ListenerId {
        let mut state = self.state();
        let id = ListenerId(state.next_listener);
        state.next_listener += 1;
        state.listeners.push((id, listener));
        id
    }

    fn remove_session_listener(&mut self, id: ListenerId) {
        self.state().listeners.retain(|(existing, _)| *existing != id);
    }

    fn set_animation_loop(&mut self, animation: Option<AnimationLoop>) {
        let mut state = self.state();
        match animation {
            Some(animation) => {
                state.animation_installs += 1;
                state.animation = Some(animation);
            }
            None => {
                state.animation = None;
                state.animation_installs = 0;
            }
        }
    }

    fn is_presenting(&self) -> bool {
        self.state().presenting
    }

    fn session(&self) -> Option<Arc<dyn XrSession>> {
        self.state()
            .session
            .clone()
            .map(|session| session as Arc<dyn XrSession>)
    }

    fn reference_space(&self) -> Option<ReferenceSpace> {
        self.state().reference_space.clone()
    }
}

struct StubSession {
    state: Arc<Mutex<StubState>>,
}

impl XrSession for StubSession {
    fn request_frame(&self, callback: FrameCallback) {
        {
            let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
            if !state.auto_frame {
                state.pending_frames.push(callback);
                return;
            }
        }
        run_frame_callback(&self.state, callback);
    }
}

struct StubFrame {
    pose: Option<ViewerPose>,
}

impl XrFrame for StubFrame {
    fn viewer_pose(&self, _space: &ReferenceSpace) -> Option<ViewerPose> {
        self.pose.clone()
    }
}

struct StubGpu {
    /// Camera texture stored bottom-up, as GPU memory is.
    texture: Option<(XrCamera, Vec<u8>)>,
    framebuffers: HashMap<FramebufferId, Option<TextureId>>,
    bound: Option<FramebufferId>,
    next_id: u32,
    bindings_created: usize,
    framebuffers_created: usize,
    framebuffers_deleted: usize,
    pixel_reads: usize,
}

impl StubGpu {
    fn from_state(state: &StubState) -> Self {
        let texture = state.camera_pixels.as_ref().map(|(camera, top_down)| {
            let row = (camera.width * 4) as usize;
            let bottom_up: Vec<u8> = top_down
                .chunks(row.max(1))
                .rev()
                .flatten()
                .copied()
                .collect();
            (*camera, bottom_up)
        });
        Self {
            texture,
            framebuffers: HashMap::new(),
            bound: Some(DEFAULT_FRAMEBUFFER),
            next_id: 1,
            bindings_created: 0,
            framebuffers_created: 0,
            framebuffers_deleted: 0,
            pixel_reads: 0,
        }
    }
}

impl GpuContext for StubGpu {
    fn create_camera_binding(&mut self) -> Result<CameraBindingId> {
        self.bindings_created += 1;
        self.next_id += 1;
        Ok(CameraBindingId(self.next_id))
    }

    fn release_camera_binding(&mut self, _binding: CameraBindingId) {}

    fn camera_image(&mut self, _binding: CameraBindingId, camera: &XrCamera) -> Option<TextureId> {
        match &self.texture {
            Some((texture_camera, _)) if texture_camera == camera => Some(CAMERA_TEXTURE),
            _ => None,
        }
    }

    fn create_framebuffer(&mut self) -> Result<FramebufferId> {
        self.next_id += 1;
        let id = FramebufferId(self.next_id);
        self.framebuffers.insert(id, None);
        self.framebuffers_created += 1;
        Ok(id)
    }

    fn delete_framebuffer(&mut self, framebuffer: FramebufferId) {
        if self.framebuffers.remove(&framebuffer).is_some() {
            self.framebuffers_deleted += 1;
        }
        if self.bound == Some(framebuffer) {
            self.bound = None;
        }
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>) {
        self.bound = framebuffer;
    }

    fn attach_texture(&mut self, framebuffer: FramebufferId, texture: TextureId) -> Result<()> {
        let slot = self
            .framebuffers
            .get_mut(&framebuffer)
            .ok_or_else(|| anyhow!("unknown framebuffer {:?}", framebuffer))?;
        *slot = Some(texture);
        Ok(())
    }

    fn read_pixels(&mut self, width: u32, height: u32) -> Result<Vec<u8>> {
        let bound = self
            .bound
            .ok_or_else(|| anyhow!("no framebuffer bound"))?;
        let attached = self.framebuffers.get(&bound).copied().flatten();
        if attached != Some(CAMERA_TEXTURE) {
            return Err(anyhow!("framebuffer {:?} has no readable attachment", bound));
        }
        let (camera, pixels) = self
            .texture
            .as_ref()
            .ok_or_else(|| anyhow!("camera texture released"))?;
        if camera.width != width || camera.height != height {
            return Err(anyhow!(
                "read size {}x{} does not match texture {}x{}",
                width,
                height,
                camera.width,
                camera.height
            ));
        }
        self.pixel_reads += 1;
        Ok(pixels.clone())
    }

    fn default_framebuffer(&self) -> Option<FramebufferId> {
        Some(DEFAULT_FRAMEBUFFER)
    }
}

struct StubSurface {
    state: Arc<Mutex<StubState>>,
    size: (u32, u32),
}

impl RenderSurface for StubSurface {
    fn render(&mut self, _gpu: &mut dyn GpuContext, _scene: &Scene, _camera: &PerspectiveCamera) {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        state.stats.frames_rendered += 1;
        log::trace!("stub frame rendered at {}x{}", self.size.0, self.size.1);
    }

    fn set_size(&mut self, width: u32, height: u32) {
        self.size = (width, height);
    }

    fn dispose(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        state.stats.renderers_disposed += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn projection_is_symmetric_perspective() {
        let p = perspective_projection(90.0, 1.0, 0.1, 10.0);
        assert!((p[0] - 1.0).abs() < 1e-6);
        assert!((p[5] - 1.0).abs() < 1e-6);
        assert_eq!(p[8], 0.0);
        assert_eq!(p[9], 0.0);
        assert_eq!(p[11], -1.0);
    }

    #[test]
    fn signals_reach_listeners_until_removed() {
        let mut runtime = StubRuntime::new();
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let id = runtime.add_session_listener(Box::new(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        }));
        runtime.start_session();
        runtime.end_session();
        assert_eq!(count.load(Ordering::SeqCst), 2);

        runtime.remove_session_listener(id);
        runtime.start_session();
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn queued_frames_run_on_advance() {
        let runtime = StubRuntime::new();
        runtime.set_auto_frame(false);
        runtime.start_session();
        let session = runtime.session().expect("session");
        let ran = Arc::new(AtomicUsize::new(0));
        let flag = Arc::clone(&ran);
        session.request_frame(Box::new(move |_, _| {
            flag.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(runtime.pending_frames(), 1);
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        runtime.advance_frame();
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert_eq!(runtime.stats().frame_callbacks_run, 1);
    }

    #[test]
    fn read_back_returns_bottom_up_rows() {
        let runtime = StubRuntime::new();
        let camera = XrCamera {
            width: 1,
            height: 2,
        };
        runtime.set_camera_image(Some((camera, vec![1, 1, 1, 1, 2, 2, 2, 2])));
        runtime.start_session();
        let out = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&out);
        runtime
            .session()
            .expect("session")
            .request_frame(Box::new(move |_, gpu| {
                let binding = gpu.create_camera_binding().unwrap();
                let texture = gpu.camera_image(binding, &camera).unwrap();
                let fb = gpu.create_framebuffer().unwrap();
                gpu.bind_framebuffer(Some(fb));
                gpu.attach_texture(fb, texture).unwrap();
                *sink.lock().unwrap() = gpu.read_pixels(1, 2).unwrap();
                gpu.delete_framebuffer(fb);
            }));
        assert_eq!(*out.lock().unwrap(), vec![2, 2, 2, 2, 1, 1, 1, 1]);
    }
}
