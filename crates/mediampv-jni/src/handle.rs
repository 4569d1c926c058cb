//! The peer object behind a Kotlin `MPVHandle`.
//!
//! [`MpvHandle`] is boxed and handed to Kotlin as a `jlong`. Every entry
//! point goes through [`with_handle`], which refuses addresses that are not
//! in the live-handle registry.

use jni::sys::jlong;
use mediampv_core::{BridgeError, EngineHandle};

#[cfg(feature = "opengl")]
use mediampv_core::gl::GlowTextureAllocator;
#[cfg(feature = "opengl")]
use parking_lot::Mutex;

use crate::diagnostics;

pub struct MpvHandle {
    pub(crate) core: EngineHandle,
    /// GL entry points for the caller's context, loaded when the render
    /// context is created.
    #[cfg(feature = "opengl")]
    pub(crate) textures: Mutex<Option<GlowTextureAllocator>>,
}

impl MpvHandle {
    pub fn new(core: EngineHandle) -> Self {
        Self {
            core,
            #[cfg(feature = "opengl")]
            textures: Mutex::new(None),
        }
    }

    pub fn core(&self) -> &EngineHandle {
        &self.core
    }

    /// Boxes and registers the handle; the returned value is the Kotlin side's
    /// `ptr`.
    pub fn into_raw(self) -> jlong {
        let ptr = Box::into_raw(Box::new(self));
        let registered = diagnostics::register_handle(ptr as *const u8);
        debug_assert!(registered, "fresh allocation already registered");
        #[cfg(debug_assertions)]
        diagnostics::record_handle_created();
        tracing::debug!(live = diagnostics::live_handle_count(), "handle created");
        ptr as jlong
    }
}

/// Runs `f` on the live handle at `ptr`.
pub fn with_handle<T>(
    ptr: jlong,
    f: impl FnOnce(&MpvHandle) -> Result<T, BridgeError>,
) -> Result<T, BridgeError> {
    #[cfg(debug_assertions)]
    diagnostics::record_entry_call();

    let raw = ptr as *const MpvHandle;
    if raw.is_null() || !diagnostics::is_live_handle(raw as *const u8) {
        return Err(BridgeError::Validation(format!("unknown handle {ptr:#x}")));
    }
    // SAFETY: registered addresses come from `into_raw` and stay valid until
    // `finalize` unregisters them.
    f(unsafe { &*raw })
}

/// Unregisters and drops the handle. Returns `false` for a null, unknown or
/// already finalized pointer, which is left untouched.
pub fn finalize(ptr: jlong) -> bool {
    let raw = ptr as *mut MpvHandle;
    if raw.is_null() || !diagnostics::unregister_handle(raw as *const u8) {
        return false;
    }
    #[cfg(debug_assertions)]
    diagnostics::record_handle_finalized();

    // SAFETY: the registry held this address, so it came from `into_raw` and
    // has not been freed; unregistering made this the only release.
    let handle = unsafe { Box::from_raw(raw) };
    drop(handle);
    tracing::debug!(live = diagnostics::live_handle_count(), "handle finalized");
    true
}
