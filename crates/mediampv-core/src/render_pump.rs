//! Render pump: software rendering on a dedicated thread.
//!
//! The engine's update callback only raises a dirty flag. The pump consumes
//! the flag, renders one `bgr0` frame into a fresh buffer and hands it to
//! the frame consumer. A burst of updates between two wakes collapses into a
//! single render.
//!
//! Everything that touches the render context or the texture/framebuffer
//! pair goes through [`RenderShared`], whose mutex is also taken by texture
//! creation and release on the caller's thread.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::engine::{Engine, Format, RenderContext, RenderTarget};
use crate::error::BridgeError;
use crate::host::{FrameConsumer, RuntimeHost, ThreadAttachment};

/// Pixel format requested from the software renderer.
pub const SOFTWARE_FORMAT: &str = "bgr0";
/// Bytes per pixel of [`SOFTWARE_FORMAT`].
pub const BYTES_PER_PIXEL: usize = 4;

/// GPU texture and framebuffer currently backing the hardware output.
///
/// Zero width or height means no buffer is allocated.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RenderBuffer {
    pub texture: u32,
    pub fbo: u32,
    pub width: u32,
    pub height: u32,
}

impl RenderBuffer {
    pub fn is_active(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

/// Render context plus the buffer it draws into.
pub(crate) struct RenderCore {
    pub(crate) context: Box<dyn RenderContext>,
    pub(crate) buffer: RenderBuffer,
}

/// The render mutex.
pub(crate) struct RenderShared {
    core: Mutex<RenderCore>,
}

impl RenderShared {
    pub(crate) fn new(context: Box<dyn RenderContext>) -> Self {
        Self {
            core: Mutex::new(RenderCore {
                context,
                buffer: RenderBuffer::default(),
            }),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, RenderCore> {
        self.core.lock()
    }
}

/// Dirty flag and stop request, with a condvar so either one interrupts the
/// pump's idle sleep.
#[derive(Default)]
pub(crate) struct RenderSignal {
    dirty: AtomicBool,
    stop: AtomicBool,
    lock: Mutex<()>,
    wake: Condvar,
}

impl RenderSignal {
    /// Raised by the engine's update callback, from any thread.
    pub(crate) fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
        self.notify();
    }

    pub(crate) fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
        self.notify();
    }

    fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// Consumes the dirty flag.
    fn take_dirty(&self) -> bool {
        self.dirty.swap(false, Ordering::AcqRel)
    }

    /// Sleeps at most `interval` unless a signal is already pending.
    fn wait_for(&self, interval: Duration) {
        let mut guard = self.lock.lock();
        if self.dirty.load(Ordering::Acquire) || self.stop_requested() {
            return;
        }
        self.wake.wait_for(&mut guard, interval);
    }

    fn notify(&self) {
        let _guard = self.lock.lock();
        self.wake.notify_all();
    }
}

/// Lifecycle of a render pump thread.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderPumpState {
    Idle = 0,
    Running = 1,
    Stopping = 2,
    Stopped = 3,
}

impl RenderPumpState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => RenderPumpState::Idle,
            1 => RenderPumpState::Running,
            2 => RenderPumpState::Stopping,
            _ => RenderPumpState::Stopped,
        }
    }
}

/// Everything the pump thread needs.
pub(crate) struct RenderPumpParams {
    pub(crate) engine: Weak<dyn Engine>,
    pub(crate) host: Arc<dyn RuntimeHost>,
    pub(crate) shared: Arc<RenderShared>,
    pub(crate) signal: Arc<RenderSignal>,
    pub(crate) consumer: Arc<dyn FrameConsumer>,
    pub(crate) idle_interval: Duration,
}

/// Owner side of a running render pump.
pub(crate) struct RenderPump {
    handle: Option<JoinHandle<()>>,
    signal: Arc<RenderSignal>,
    state: Arc<AtomicU8>,
}

impl RenderPump {
    pub(crate) fn spawn(params: RenderPumpParams, thread_name: &str) -> Result<Self, BridgeError> {
        let signal = Arc::clone(&params.signal);
        let state = Arc::new(AtomicU8::new(RenderPumpState::Idle as u8));
        let thread_state = Arc::clone(&state);
        let name = thread_name.to_string();

        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                render_loop(params, &thread_state, &name);
                thread_state.store(RenderPumpState::Stopped as u8, Ordering::Release);
            })
            .map_err(|e| BridgeError::Thread(e.to_string()))?;

        tracing::debug!("render pump spawned ({thread_name})");

        Ok(Self {
            handle: Some(handle),
            signal,
            state,
        })
    }

    pub(crate) fn state(&self) -> RenderPumpState {
        RenderPumpState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Signals the pump and blocks until the thread has exited.
    pub(crate) fn shutdown(&mut self) {
        self.signal.request_stop();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("render pump thread panicked");
            }
        }
    }
}

impl Drop for RenderPump {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn render_loop(params: RenderPumpParams, state: &AtomicU8, thread_name: &str) {
    let _attachment = match ThreadAttachment::attach(params.host.as_ref(), thread_name) {
        Ok(attachment) => attachment,
        Err(e) => {
            tracing::error!("render pump could not attach to runtime host: {e}");
            return;
        }
    };
    state.store(RenderPumpState::Running as u8, Ordering::Release);

    let mut frames: u64 = 0;
    loop {
        if params.signal.stop_requested() {
            break;
        }
        if !params.signal.take_dirty() {
            params.signal.wait_for(params.idle_interval);
            continue;
        }
        let Some(engine) = params.engine.upgrade() else {
            tracing::debug!("engine released, render pump stopping");
            break;
        };
        if render_frame(engine.as_ref(), &params.shared, params.consumer.as_ref()) {
            frames += 1;
        }
    }

    state.store(RenderPumpState::Stopping as u8, Ordering::Release);
    tracing::debug!("render pump stopped after {frames} frames");
}

/// Renders and delivers one frame if the engine has one. Returns whether a
/// frame reached the consumer.
///
/// The render mutex is held from the update check through the swap report,
/// and released before the consumer runs.
fn render_frame(engine: &dyn Engine, shared: &RenderShared, consumer: &dyn FrameConsumer) -> bool {
    let mut core = shared.lock();
    if !core.context.update().has_frame() {
        return false;
    }

    let Some((width, height)) = frame_dimensions(engine) else {
        tracing::trace!("frame update without valid dimensions");
        return false;
    };
    let Some((stride, len)) = frame_layout(width, height) else {
        tracing::trace!("frame {width}x{height} too large for a software buffer");
        return false;
    };

    let mut pixels = vec![0u8; len];
    let status = core.context.render(RenderTarget::Software {
        width,
        height,
        stride,
        format: SOFTWARE_FORMAT,
        pixels: &mut pixels,
    });
    if status < 0 {
        tracing::warn!("software render failed: status {status}");
        return false;
    }
    core.context.report_swap();
    drop(core);

    consumer.on_frame(width, height, pixels);
    true
}

/// Stride and total byte length of a tightly packed frame, `None` on
/// overflow.
fn frame_layout(width: u32, height: u32) -> Option<(usize, usize)> {
    let stride = usize::try_from(width).ok()?.checked_mul(BYTES_PER_PIXEL)?;
    let len = stride.checked_mul(usize::try_from(height).ok()?)?;
    Some((stride, len))
}

/// Current decoded-frame size, if both dimensions are positive.
pub(crate) fn frame_dimensions(engine: &dyn Engine) -> Option<(u32, u32)> {
    let dimension = |name: &str| {
        engine
            .get_property(name, Format::Int64)
            .ok()
            .and_then(|value| value.as_int64())
            .and_then(|v| u32::try_from(v).ok())
            .filter(|&v| v > 0)
    };
    Some((dimension("dwidth")?, dimension("dheight")?))
}
