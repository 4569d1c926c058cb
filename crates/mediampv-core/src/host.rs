//! Managed-runtime side of the bridge: thread attachment and callback contracts.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::BridgeError;

/// The managed runtime hosting the caller.
///
/// Pump threads attach themselves before invoking any callback and detach on
/// exit. For the JVM this is `AttachCurrentThread` / `DetachCurrentThread`.
pub trait RuntimeHost: Send + Sync {
    fn attach_current_thread(&self, thread_name: &str) -> Result<(), BridgeError>;

    fn detach_current_thread(&self);
}

/// Host for callers that live entirely in Rust: attaching always succeeds.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeHost;

impl RuntimeHost for NativeHost {
    fn attach_current_thread(&self, _thread_name: &str) -> Result<(), BridgeError> {
        Ok(())
    }

    fn detach_current_thread(&self) {}
}

/// Keeps the current thread attached; detaches on drop.
pub(crate) struct ThreadAttachment<'a> {
    host: &'a dyn RuntimeHost,
}

impl<'a> ThreadAttachment<'a> {
    pub(crate) fn attach(host: &'a dyn RuntimeHost, thread_name: &str) -> Result<Self, BridgeError> {
        host.attach_current_thread(thread_name)?;
        Ok(Self { host })
    }
}

impl Drop for ThreadAttachment<'_> {
    fn drop(&mut self) {
        self.host.detach_current_thread();
    }
}

/// Receives property changes, one entry point per payload kind.
///
/// Always invoked on the event pump thread, never on the caller's thread.
pub trait PropertyObserver: Send + Sync {
    fn on_property_none(&self, name: &str);
    fn on_property_flag(&self, name: &str, value: bool);
    fn on_property_int64(&self, name: &str, value: i64);
    fn on_property_double(&self, name: &str, value: f64);
    fn on_property_string(&self, name: &str, value: &str);
}

/// Turns a caller-supplied reference into an installed observer.
///
/// This is where a managed reference is checked against the observer
/// contract and where the reference cache gets populated.
pub trait ObserverBinder {
    fn bind(self) -> Result<Arc<dyn PropertyObserver>, BridgeError>;
}

impl<T: PropertyObserver + 'static> ObserverBinder for Arc<T> {
    fn bind(self) -> Result<Arc<dyn PropertyObserver>, BridgeError> {
        Ok(self)
    }
}

/// Receives frames rendered by the software render pump.
///
/// `pixels` is a fresh `width * height * 4` buffer in `bgr0` layout
/// (B, G, R, padding), tightly packed.
pub trait FrameConsumer: Send + Sync {
    fn on_frame(&self, width: u32, height: u32, pixels: Vec<u8>);
}

/// The single observer slot of a handle, shared with the event pump.
#[derive(Clone, Default)]
pub(crate) struct ObserverSlot {
    inner: Arc<Mutex<Option<Arc<dyn PropertyObserver>>>>,
}

impl ObserverSlot {
    /// Current observer, cloned out so callbacks run without the lock held.
    pub(crate) fn current(&self) -> Option<Arc<dyn PropertyObserver>> {
        self.inner.lock().clone()
    }

    pub(crate) fn install(&self, observer: Arc<dyn PropertyObserver>) {
        *self.inner.lock() = Some(observer);
    }

    /// Releases the observer. Returns whether one was installed.
    pub(crate) fn release(&self) -> bool {
        // Drop outside the lock: releasing a managed reference may call into the runtime.
        let previous = self.inner.lock().take();
        previous.is_some()
    }

    pub(crate) fn is_installed(&self) -> bool {
        self.inner.lock().is_some()
    }
}
