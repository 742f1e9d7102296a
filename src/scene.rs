//! Rendering primitives lent out by the session manager.
//!
//! The scene graph is deliberately minimal: callers add named nodes for visual content
//! and the runtime's `RenderSurface` draws them. Handles are `Shared<T>` and are handed
//! out by reference count, not copied. Mutate them only from the rendering thread.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::xr::{GpuContext, RenderSurface};

pub type Shared<T> = Arc<Mutex<T>>;

/// Locks a shared handle, recovering the data if a previous holder panicked.
pub fn lock<T>(handle: &Shared<T>) -> MutexGuard<'_, T> {
    handle.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Clone, Debug, PartialEq)]
pub struct SceneNode {
    pub name: String,
    pub position: [f32; 3],
    pub rotation: [f32; 4],
    pub visible: bool,
}

impl SceneNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            position: [0.0; 3],
            rotation: [0.0, 0.0, 0.0, 1.0],
            visible: true,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Scene {
    nodes: Vec<SceneNode>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, node: SceneNode) {
        self.nodes.push(node);
    }

    /// Removes every node named `name`. Returns how many were removed.
    pub fn remove(&mut self, name: &str) -> usize {
        let before = self.nodes.len();
        self.nodes.retain(|node| node.name != name);
        before - self.nodes.len()
    }

    pub fn find_mut(&mut self, name: &str) -> Option<&mut SceneNode> {
        self.nodes.iter_mut().find(|node| node.name == name)
    }

    pub fn nodes(&self) -> &[SceneNode] {
        &self.nodes
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
    }
}

/// Perspective camera. The runtime overrides its pose and projection while presenting.
#[derive(Clone, Debug, PartialEq)]
pub struct PerspectiveCamera {
    pub fov_deg: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl PerspectiveCamera {
    pub fn new(fov_deg: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self {
            fov_deg,
            aspect,
            near,
            far,
        }
    }

    /// 70 degree field of view, 1 cm to 20 m clip range.
    pub fn for_viewport(width: u32, height: u32) -> Self {
        let aspect = if height == 0 {
            1.0
        } else {
            width as f32 / height as f32
        };
        Self::new(70.0, aspect, 0.01, 20.0)
    }
}

/// Owns the runtime render surface and tracks its lifetime.
pub struct Renderer {
    surface: Box<dyn RenderSurface>,
    frames_rendered: u64,
    disposed: bool,
}

impl std::fmt::Debug for Renderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer")
            .field("frames_rendered", &self.frames_rendered)
            .field("disposed", &self.disposed)
            .finish_non_exhaustive()
    }
}

impl Renderer {
    pub fn new(surface: Box<dyn RenderSurface>) -> Self {
        Self {
            surface,
            frames_rendered: 0,
            disposed: false,
        }
    }

    pub fn render(&mut self, gpu: &mut dyn GpuContext, scene: &Scene, camera: &PerspectiveCamera) {
        if self.disposed {
            return;
        }
        self.surface.render(gpu, scene, camera);
        self.frames_rendered += 1;
    }

    pub fn set_size(&mut self, width: u32, height: u32) {
        self.surface.set_size(width, height);
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Releases the surface. Subsequent `render` calls are no-ops.
    pub fn dispose(&mut self) {
        if !self.disposed {
            self.surface.dispose();
            self.disposed = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scene_remove_counts_matches() {
        let mut scene = Scene::new();
        scene.add(SceneNode::new("anchor"));
        scene.add(SceneNode::new("anchor"));
        scene.add(SceneNode::new("label"));
        assert_eq!(scene.remove("anchor"), 2);
        assert_eq!(scene.nodes().len(), 1);
        assert!(scene.find_mut("label").is_some());
    }

    #[test]
    fn camera_aspect_handles_zero_height() {
        assert_eq!(PerspectiveCamera::for_viewport(640, 0).aspect, 1.0);
        let cam = PerspectiveCamera::for_viewport(640, 480);
        assert!((cam.aspect - 4.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn renderer_debug_reports_lifetime() {
        use crate::xr::{StubRuntime, XrRuntime};
        let mut runtime = StubRuntime::new();
        let mut renderer = Renderer::new(runtime.create_renderer().unwrap());
        renderer.dispose();
        let shown = format!("{:?}", renderer);
        assert!(shown.contains("frames_rendered: 0"));
        assert!(shown.contains("disposed: true"));
    }
}
