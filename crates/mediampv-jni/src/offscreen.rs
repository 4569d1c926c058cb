//! Offscreen render targets for Kotlin's `OffscreenGL` and `GLExt`.
//!
//! A target is an RGBA8 texture with a framebuffer attached, allocated in the
//! GL context current on the calling thread. Kotlin holds it as an id; ids
//! that are unknown or already disposed are refused.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::LazyLock;

use jni::sys::jlong;
use mediampv_core::gl::GlowTextureAllocator;
use mediampv_core::{BridgeError, RenderBuffer, TextureAllocator};
use parking_lot::Mutex;

thread_local! {
    // SAFETY: only the offscreen entry points touch this, and Kotlin calls
    // them from its render thread with the GL context current.
    static CURRENT_GL: GlowTextureAllocator =
        unsafe { GlowTextureAllocator::from_current_context() };
}

static TARGETS: LazyLock<OffscreenTargets> = LazyLock::new(OffscreenTargets::default);

/// Live offscreen targets by id. Ids start at 1 and are never reused.
pub struct OffscreenTargets {
    next_id: AtomicI64,
    targets: Mutex<HashMap<jlong, RenderBuffer>>,
}

impl Default for OffscreenTargets {
    fn default() -> Self {
        Self {
            next_id: AtomicI64::new(1),
            targets: Mutex::new(HashMap::new()),
        }
    }
}

impl OffscreenTargets {
    pub fn create(
        &self,
        allocator: &dyn TextureAllocator,
        width: u32,
        height: u32,
    ) -> Result<jlong, BridgeError> {
        let buffer = allocator.allocate(width, height)?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.targets.lock().insert(id, buffer);
        tracing::debug!(
            "offscreen target {id}: texture {} / fbo {} ({width}x{height})",
            buffer.texture,
            buffer.fbo
        );
        Ok(id)
    }

    pub fn fbo(&self, id: jlong) -> Result<u32, BridgeError> {
        self.targets
            .lock()
            .get(&id)
            .map(|buffer| buffer.fbo)
            .ok_or_else(|| unknown_target(id))
    }

    /// Releases the target. Id 0 is the Kotlin side's "none" and is ignored.
    pub fn dispose(&self, allocator: &dyn TextureAllocator, id: jlong) -> Result<(), BridgeError> {
        if id == 0 {
            return Ok(());
        }
        let buffer = self.targets.lock().remove(&id).ok_or_else(|| unknown_target(id))?;
        allocator.release(buffer);
        tracing::debug!("offscreen target {id} disposed");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.targets.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn unknown_target(id: jlong) -> BridgeError {
    BridgeError::Validation(format!("unknown offscreen target {id}"))
}

pub fn create_target(width: u32, height: u32) -> Result<jlong, BridgeError> {
    CURRENT_GL.with(|gl| TARGETS.create(gl, width, height))
}

pub fn fbo_id(id: jlong) -> Result<u32, BridgeError> {
    TARGETS.fbo(id)
}

pub fn dispose_target(id: jlong) -> Result<(), BridgeError> {
    CURRENT_GL.with(|gl| TARGETS.dispose(gl, id))
}

pub fn viewport(x: i32, y: i32, width: i32, height: i32) {
    CURRENT_GL.with(|gl| gl.viewport(x, y, width, height));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[derive(Default)]
    struct Counting {
        next: AtomicU32,
        released: Mutex<Vec<u32>>,
    }

    impl TextureAllocator for Counting {
        fn allocate(&self, width: u32, height: u32) -> Result<RenderBuffer, BridgeError> {
            let id = self.next.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(RenderBuffer {
                texture: id,
                fbo: id + 10,
                width,
                height,
            })
        }

        fn release(&self, buffer: RenderBuffer) {
            self.released.lock().push(buffer.texture);
        }
    }

    struct Failing;

    impl TextureAllocator for Failing {
        fn allocate(&self, _width: u32, _height: u32) -> Result<RenderBuffer, BridgeError> {
            Err(BridgeError::Graphics("framebuffer incomplete".into()))
        }

        fn release(&self, _buffer: RenderBuffer) {
            panic!("nothing to release");
        }
    }

    #[test]
    fn test_create_lookup_dispose() {
        let targets = OffscreenTargets::default();
        let gl = Counting::default();

        let first = targets.create(&gl, 800, 600).unwrap();
        let second = targets.create(&gl, 400, 300).unwrap();
        assert_ne!(first, 0);
        assert_ne!(first, second);
        assert_eq!(targets.fbo(first), Ok(11));
        assert_eq!(targets.fbo(second), Ok(12));

        targets.dispose(&gl, first).unwrap();
        assert_eq!(*gl.released.lock(), vec![1]);
        assert!(matches!(targets.fbo(first), Err(BridgeError::Validation(_))));
        assert_eq!(targets.len(), 1);
    }

    #[test]
    fn test_double_dispose_is_refused() {
        let targets = OffscreenTargets::default();
        let gl = Counting::default();
        let id = targets.create(&gl, 16, 16).unwrap();

        targets.dispose(&gl, id).unwrap();
        assert!(matches!(
            targets.dispose(&gl, id),
            Err(BridgeError::Validation(_))
        ));
        assert_eq!(*gl.released.lock(), vec![1]);
        assert!(targets.is_empty());
    }

    #[test]
    fn test_dispose_zero_is_noop() {
        let targets = OffscreenTargets::default();
        let gl = Counting::default();
        assert_eq!(targets.dispose(&gl, 0), Ok(()));
        assert!(gl.released.lock().is_empty());
    }

    #[test]
    fn test_failed_allocation_registers_nothing() {
        let targets = OffscreenTargets::default();
        assert!(matches!(
            targets.create(&Failing, 16, 16),
            Err(BridgeError::Graphics(_))
        ));
        assert!(targets.is_empty());
    }
}
