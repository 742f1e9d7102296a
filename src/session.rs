//! Session lifecycle manager.
//!
//! Brings up the rendering environment once, tracks whether an AR session is live,
//! and lends out the scene, camera and renderer. Session start/end transitions are
//! driven by runtime signals; the manager only reacts to them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};

use crate::error::{Handle, LocalizeError};
use crate::scene::{lock, PerspectiveCamera, Renderer, Scene, Shared};
use crate::xr::{
    LaunchButton, ListenerId, ReferenceSpace, SessionOptions, SessionSignal, UiContainer,
    XrRuntime, XrSession,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    /// Initialized, no session presenting.
    Ready,
    SessionActive,
    Disposed,
}

struct Environment {
    scene: Shared<Scene>,
    camera: Shared<PerspectiveCamera>,
    renderer: Shared<Renderer>,
    button: Arc<LaunchButton>,
    listener: ListenerId,
}

pub struct SessionManager<R: XrRuntime> {
    runtime: R,
    container: Option<UiContainer>,
    env: Option<Environment>,
    active: Arc<AtomicBool>,
    disposed: bool,
}

impl<R: XrRuntime> SessionManager<R> {
    /// `container` is where the launch affordance goes when `initialize` gets none.
    pub fn new(runtime: R, container: Option<UiContainer>) -> Self {
        Self {
            runtime,
            container,
            env: None,
            active: Arc::new(AtomicBool::new(false)),
            disposed: false,
        }
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    pub fn state(&self) -> LifecycleState {
        match (&self.env, self.disposed) {
            (None, true) => LifecycleState::Disposed,
            (None, false) => LifecycleState::Uninitialized,
            (Some(_), _) if self.has_active_session() => LifecycleState::SessionActive,
            (Some(_), _) => LifecycleState::Ready,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.env.is_some()
    }

    /// Sets up renderer, camera, scene, session listeners and the launch affordance.
    ///
    /// Returns the existing affordance when already initialized. The affordance is
    /// attached to `container`, else the constructor container, else the overlay root.
    pub fn initialize(&mut self, container: Option<UiContainer>) -> Result<Arc<LaunchButton>> {
        if let Some(env) = &self.env {
            return Ok(Arc::clone(&env.button));
        }
        if !self.runtime.is_secure_context() {
            return Err(LocalizeError::SecureContext.into());
        }

        let (width, height) = self.runtime.viewport();
        let mut renderer = Renderer::new(self.runtime.create_renderer().context("create renderer")?);
        renderer.set_size(width, height);
        let renderer = Arc::new(Mutex::new(renderer));
        let camera = Arc::new(Mutex::new(PerspectiveCamera::for_viewport(
            width, height,
        )));
        let scene = Arc::new(Mutex::new(Scene::new()));

        let active = Arc::clone(&self.active);
        let listener = self
            .runtime
            .add_session_listener(Box::new(move |signal| match signal {
                SessionSignal::Started => {
                    log::info!("AR session started");
                    active.store(true, Ordering::SeqCst);
                }
                SessionSignal::Ended => {
                    log::info!("AR session ended");
                    active.store(false, Ordering::SeqCst);
                }
            }));

        let overlay = container
            .or_else(|| self.container.clone())
            .unwrap_or_else(UiContainer::overlay_root);
        let button = match self
            .runtime
            .create_launch_button(&SessionOptions::camera_access(Some(overlay.clone())))
            .and_then(|button| {
                self.runtime.attach(&button, &overlay)?;
                Ok(button)
            }) {
            Ok(button) => button,
            Err(err) => {
                self.runtime.remove_session_listener(listener);
                lock(&renderer).dispose();
                return Err(err.context("create AR launch button"));
            }
        };

        let (loop_renderer, loop_scene, loop_camera) =
            (Arc::clone(&renderer), Arc::clone(&scene), Arc::clone(&camera));
        self.runtime.set_animation_loop(Some(Box::new(move |gpu| {
            let scene = lock(&loop_scene);
            let camera = lock(&loop_camera);
            lock(&loop_renderer).render(gpu, &scene, &camera);
        })));

        log::info!(
            "AR environment initialized ({}x{}), launch button in '{}'",
            width,
            height,
            overlay.0
        );
        self.disposed = false;
        self.env = Some(Environment {
            scene,
            camera,
            renderer,
            button: Arc::clone(&button),
            listener,
        });
        Ok(button)
    }

    pub fn scene(&self) -> Result<Shared<Scene>> {
        self.env
            .as_ref()
            .map(|env| Arc::clone(&env.scene))
            .ok_or_else(|| LocalizeError::NotInitialized(Handle::Scene).into())
    }

    pub fn camera(&self) -> Result<Shared<PerspectiveCamera>> {
        self.env
            .as_ref()
            .map(|env| Arc::clone(&env.camera))
            .ok_or_else(|| LocalizeError::NotInitialized(Handle::Camera).into())
    }

    pub fn renderer(&self) -> Result<Shared<Renderer>> {
        self.env
            .as_ref()
            .map(|env| Arc::clone(&env.renderer))
            .ok_or_else(|| LocalizeError::NotInitialized(Handle::Renderer).into())
    }

    /// Both our flag and the runtime must agree; the runtime wins after abrupt loss.
    pub fn has_active_session(&self) -> bool {
        self.active.load(Ordering::SeqCst) && self.runtime.is_presenting()
    }

    /// Live session handle, if presenting.
    pub fn session(&self) -> Option<Arc<dyn XrSession>> {
        if !self.has_active_session() {
            return None;
        }
        self.runtime.session()
    }

    pub fn reference_space(&self) -> Option<ReferenceSpace> {
        self.runtime.reference_space()
    }

    /// Tears everything down. Safe to call repeatedly.
    pub fn dispose(&mut self) {
        let Some(env) = self.env.take() else {
            self.disposed = true;
            return;
        };
        self.runtime.set_animation_loop(None);
        self.runtime.remove_session_listener(env.listener);
        lock(&env.renderer).dispose();
        self.runtime.detach(&env.button);
        self.active.store(false, Ordering::SeqCst);
        self.disposed = true;
        log::info!("AR environment disposed");
    }
}

impl<R: XrRuntime> Drop for SessionManager<R> {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xr::StubRuntime;

    fn manager() -> (SessionManager<StubRuntime>, StubRuntime) {
        let runtime = StubRuntime::new();
        (SessionManager::new(runtime.clone(), None), runtime)
    }

    fn not_initialized(err: &anyhow::Error) -> Option<Handle> {
        match err.downcast_ref::<LocalizeError>() {
            Some(LocalizeError::NotInitialized(handle)) => Some(*handle),
            _ => None,
        }
    }

    #[test]
    fn insecure_context_is_rejected() {
        let (mut mgr, runtime) = manager();
        runtime.set_secure_context(false);
        let err = mgr.initialize(None).unwrap_err();
        assert_eq!(
            err.downcast_ref::<LocalizeError>(),
            Some(&LocalizeError::SecureContext)
        );
        assert_eq!(mgr.state(), LifecycleState::Uninitialized);
        assert_eq!(runtime.listener_count(), 0);
    }

    #[test]
    fn accessors_fail_before_initialize() {
        let (mgr, _) = manager();
        assert_eq!(not_initialized(&mgr.scene().unwrap_err()), Some(Handle::Scene));
        assert_eq!(not_initialized(&mgr.camera().unwrap_err()), Some(Handle::Camera));
        assert_eq!(
            not_initialized(&mgr.renderer().unwrap_err()),
            Some(Handle::Renderer)
        );
    }

    #[test]
    fn initialize_is_idempotent() {
        let (mut mgr, runtime) = manager();
        let first = mgr.initialize(None).unwrap();
        let second = mgr.initialize(Some(UiContainer::new("elsewhere"))).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(runtime.listener_count(), 1);
        assert_eq!(runtime.animation_installs(), 1);
        assert_eq!(runtime.buttons_created(), 1);
        assert_eq!(runtime.attached_containers(), vec![UiContainer::overlay_root()]);
    }

    #[test]
    fn container_priority() {
        let runtime = StubRuntime::new();
        let mut mgr = SessionManager::new(runtime.clone(), Some(UiContainer::new("configured")));
        mgr.initialize(Some(UiContainer::new("explicit"))).unwrap();
        assert_eq!(runtime.attached_containers(), vec![UiContainer::new("explicit")]);
        mgr.dispose();

        mgr.initialize(None).unwrap();
        assert_eq!(runtime.attached_containers(), vec![UiContainer::new("configured")]);
    }

    #[test]
    fn session_signals_drive_state() {
        let (mut mgr, runtime) = manager();
        mgr.initialize(None).unwrap();
        assert_eq!(mgr.state(), LifecycleState::Ready);
        assert!(!mgr.has_active_session());

        runtime.start_session();
        assert_eq!(mgr.state(), LifecycleState::SessionActive);
        assert!(mgr.session().is_some());

        runtime.end_session();
        assert_eq!(mgr.state(), LifecycleState::Ready);
        assert!(mgr.session().is_none());
    }

    #[test]
    fn abrupt_loss_is_not_active() {
        let (mut mgr, runtime) = manager();
        mgr.initialize(None).unwrap();
        runtime.start_session();
        runtime.lose_session();
        assert!(!mgr.has_active_session());
    }

    #[test]
    fn render_loop_runs_without_session() {
        let (mut mgr, runtime) = manager();
        mgr.initialize(None).unwrap();
        runtime.advance_frame();
        runtime.advance_frame();
        assert_eq!(runtime.stats().frames_rendered, 2);
        assert_eq!(mgr.renderer().unwrap().lock().unwrap().frames_rendered(), 2);
    }

    #[test]
    fn handles_are_shared_not_copied() {
        let (mut mgr, _) = manager();
        mgr.initialize(None).unwrap();
        mgr.scene()
            .unwrap()
            .lock()
            .unwrap()
            .add(crate::scene::SceneNode::new("marker"));
        assert_eq!(mgr.scene().unwrap().lock().unwrap().nodes().len(), 1);
    }

    #[test]
    fn dispose_tears_down_and_is_repeatable() {
        let (mut mgr, runtime) = manager();
        mgr.initialize(None).unwrap();
        runtime.start_session();
        mgr.dispose();
        mgr.dispose();

        assert_eq!(mgr.state(), LifecycleState::Disposed);
        assert_eq!(not_initialized(&mgr.scene().unwrap_err()), Some(Handle::Scene));
        assert_eq!(runtime.listener_count(), 0);
        assert!(!runtime.has_animation_loop());
        assert!(runtime.attached_containers().is_empty());
        assert_eq!(runtime.stats().renderers_disposed, 1);
        assert!(!mgr.has_active_session());
    }
}
