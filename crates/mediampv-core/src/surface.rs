//! Output adapter: where the engine's video goes.
//!
//! Exactly one of three modes is active at a time:
//! - native surface: the engine draws into a platform window (`wid`)
//! - software: frames are rendered to CPU buffers by the render pump
//! - hardware: the caller renders into its own GL texture+framebuffer pair
//!
//! Attaching while any mode is active fails with [`BridgeError::OutputBusy`];
//! the previous mode has to be detached explicitly.

use std::any::Any;
use std::ffi::c_void;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::HandleConfig;
use crate::engine::{Engine, GetProcAddressFn, PropertyValue, RenderApi, RenderTarget};
use crate::error::BridgeError;
use crate::host::{FrameConsumer, RuntimeHost};
use crate::render_pump::{
    RenderBuffer, RenderPump, RenderPumpParams, RenderPumpState, RenderShared, RenderSignal,
};

/// Opaque token kept alive while a native surface is attached (for the JVM,
/// a global reference to the `Surface`).
pub type KeepAlive = Box<dyn Any + Send>;

/// Allocates texture+framebuffer pairs in the caller's graphics context.
///
/// Called on the caller's thread, with its context current.
pub trait TextureAllocator {
    fn allocate(&self, width: u32, height: u32) -> Result<RenderBuffer, BridgeError>;

    fn release(&self, buffer: RenderBuffer);
}

/// Active output mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Detached,
    NativeSurface,
    Software,
    Hardware,
}

impl OutputMode {
    pub fn name(self) -> &'static str {
        match self {
            OutputMode::Detached => "detached",
            OutputMode::NativeSurface => "native surface",
            OutputMode::Software => "software renderer",
            OutputMode::Hardware => "hardware render context",
        }
    }
}

#[derive(Default)]
enum Output {
    #[default]
    Detached,
    NativeSurface {
        wid: i64,
        _keep_alive: KeepAlive,
    },
    Software {
        pump: RenderPump,
        shared: Arc<RenderShared>,
    },
    Hardware {
        shared: Arc<RenderShared>,
    },
}

impl Output {
    fn mode(&self) -> OutputMode {
        match self {
            Output::Detached => OutputMode::Detached,
            Output::NativeSurface { .. } => OutputMode::NativeSurface,
            Output::Software { .. } => OutputMode::Software,
            Output::Hardware { .. } => OutputMode::Hardware,
        }
    }

    fn ensure_detached(&self) -> Result<(), BridgeError> {
        match self {
            Output::Detached => Ok(()),
            other => Err(BridgeError::OutputBusy {
                active: other.mode().name(),
            }),
        }
    }
}

/// The surface-attach mutex and the mode it guards.
#[derive(Default)]
pub(crate) struct OutputAdapter {
    output: Mutex<Output>,
}

impl OutputAdapter {
    pub(crate) fn mode(&self) -> OutputMode {
        self.output.lock().mode()
    }

    pub(crate) fn render_pump_state(&self) -> Option<RenderPumpState> {
        match &*self.output.lock() {
            Output::Software { pump, .. } => Some(pump.state()),
            _ => None,
        }
    }

    pub(crate) fn attach_surface(
        &self,
        engine: &dyn Engine,
        wid: i64,
        keep_alive: KeepAlive,
    ) -> Result<(), BridgeError> {
        let mut output = self.output.lock();
        output.ensure_detached()?;

        BridgeError::check(
            "attach_surface",
            engine.set_option("wid", &PropertyValue::Int64(wid)),
        )?;
        *output = Output::NativeSurface {
            wid,
            _keep_alive: keep_alive,
        };
        tracing::info!("native surface attached (wid {wid:#x})");
        Ok(())
    }

    pub(crate) fn detach_surface(&self, engine: &dyn Engine) -> Result<(), BridgeError> {
        let mut output = self.output.lock();
        let Output::NativeSurface { wid, .. } = &*output else {
            return Err(BridgeError::Validation("no native surface attached".into()));
        };
        let wid = *wid;

        BridgeError::check(
            "detach_surface",
            engine.set_option("wid", &PropertyValue::Int64(0)),
        )?;
        let previous = std::mem::take(&mut *output);
        drop(output);
        drop(previous);
        tracing::info!("native surface detached (wid {wid:#x})");
        Ok(())
    }

    pub(crate) fn attach_buffer_renderer(
        &self,
        engine: &Arc<dyn Engine>,
        host: Arc<dyn RuntimeHost>,
        consumer: Arc<dyn FrameConsumer>,
        config: &HandleConfig,
    ) -> Result<(), BridgeError> {
        let mut output = self.output.lock();
        output.ensure_detached()?;

        let mut context = engine
            .create_render_context(RenderApi::Software)
            .map_err(|status| BridgeError::Engine {
                operation: "create_render_context",
                status,
            })?;

        let signal = Arc::new(RenderSignal::default());
        let callback_signal = Arc::clone(&signal);
        context.set_update_callback(Box::new(move || callback_signal.mark_dirty()));

        let shared = Arc::new(RenderShared::new(context));
        let pump = RenderPump::spawn(
            RenderPumpParams {
                engine: Arc::downgrade(engine),
                host,
                shared: Arc::clone(&shared),
                signal,
                consumer,
                idle_interval: config.render_idle_interval,
            },
            &config.render_thread_name,
        )?;

        *output = Output::Software { pump, shared };
        tracing::info!("software buffer renderer attached");
        Ok(())
    }

    pub(crate) fn detach_buffer_renderer(&self) -> Result<(), BridgeError> {
        let mut output = self.output.lock();
        if !matches!(*output, Output::Software { .. }) {
            return Err(BridgeError::Validation(
                "no software buffer renderer attached".into(),
            ));
        }
        let previous = std::mem::take(&mut *output);
        drop(output);

        teardown(previous, None);
        tracing::info!("software buffer renderer detached");
        Ok(())
    }

    /// Creates an OpenGL render context for the context current on the
    /// calling thread.
    pub(crate) fn create_render_context(
        &self,
        engine: &dyn Engine,
        get_proc_address: GetProcAddressFn,
        proc_context: *mut c_void,
    ) -> Result<(), BridgeError> {
        let mut output = self.output.lock();
        output.ensure_detached()?;

        let context = engine
            .create_render_context(RenderApi::OpenGl {
                get_proc_address,
                context: proc_context,
            })
            .map_err(|status| BridgeError::Engine {
                operation: "create_render_context",
                status,
            })?;

        *output = Output::Hardware {
            shared: Arc::new(RenderShared::new(context)),
        };
        tracing::info!("hardware render context created");
        Ok(())
    }

    pub(crate) fn destroy_render_context(&self) -> Result<(), BridgeError> {
        let mut output = self.output.lock();
        if !matches!(*output, Output::Hardware { .. }) {
            return Err(BridgeError::Validation("no hardware render context".into()));
        }
        let previous = std::mem::take(&mut *output);
        drop(output);

        teardown(previous, None);
        tracing::info!("hardware render context destroyed");
        Ok(())
    }

    /// Replaces the texture+framebuffer pair with a new one of the given
    /// size. Returns the texture id.
    pub(crate) fn create_texture(
        &self,
        allocator: &dyn TextureAllocator,
        width: u32,
        height: u32,
    ) -> Result<u32, BridgeError> {
        if width == 0 || height == 0 {
            return Err(BridgeError::Validation(format!(
                "invalid texture size {width}x{height}"
            )));
        }
        let shared = self.hardware()?;
        let mut core = shared.lock();

        if core.buffer.is_active() {
            allocator.release(std::mem::take(&mut core.buffer));
        }
        let buffer = allocator.allocate(width, height)?;
        core.buffer = buffer;
        tracing::debug!(
            "texture {} / fbo {} allocated ({width}x{height})",
            buffer.texture,
            buffer.fbo
        );
        Ok(buffer.texture)
    }

    /// Releases the texture+framebuffer pair, if any.
    pub(crate) fn release_texture(&self, allocator: &dyn TextureAllocator) -> Result<(), BridgeError> {
        let shared = self.hardware()?;
        let mut core = shared.lock();
        if core.buffer.is_active() {
            allocator.release(std::mem::take(&mut core.buffer));
        }
        Ok(())
    }

    /// Renders the pending frame into the current framebuffer. Returns
    /// whether a frame was rendered.
    pub(crate) fn render_frame_to_texture(&self) -> Result<bool, BridgeError> {
        let shared = self.hardware()?;
        let mut core = shared.lock();

        let RenderBuffer {
            fbo, width, height, ..
        } = core.buffer;
        if !core.buffer.is_active() || !core.context.update().has_frame() {
            return Ok(false);
        }

        let status = core.context.render(RenderTarget::Framebuffer {
            fbo,
            width,
            height,
            flip_y: false,
        });
        BridgeError::check("render_frame_to_texture", status)?;
        core.context.report_swap();
        Ok(true)
    }

    /// Tears down whatever mode is active. Returns the mode that was active.
    ///
    /// A texture+framebuffer pair still allocated in hardware mode is handed
    /// back to `allocator`; without one it can only be reported.
    pub(crate) fn shutdown(&self, allocator: Option<&dyn TextureAllocator>) -> OutputMode {
        let previous = std::mem::take(&mut *self.output.lock());
        let mode = previous.mode();
        teardown(previous, allocator);
        mode
    }

    /// The render state of the hardware mode. Cloned out so the attach
    /// mutex is not held while rendering.
    fn hardware(&self) -> Result<Arc<RenderShared>, BridgeError> {
        match &*self.output.lock() {
            Output::Hardware { shared } => Ok(Arc::clone(shared)),
            _ => Err(BridgeError::Validation("no hardware render context".into())),
        }
    }
}

fn teardown(output: Output, allocator: Option<&dyn TextureAllocator>) {
    match output {
        Output::Detached => {}
        Output::NativeSurface { .. } => {}
        Output::Software { mut pump, shared } => {
            pump.shutdown();
            drop(shared);
        }
        Output::Hardware { shared } => {
            let mut core = shared.lock();
            if !core.buffer.is_active() {
                return;
            }
            let buffer = std::mem::take(&mut core.buffer);
            match allocator {
                Some(allocator) => {
                    allocator.release(buffer);
                    tracing::debug!("texture {} released on teardown", buffer.texture);
                }
                None => tracing::warn!(
                    "render context destroyed with texture {} still allocated",
                    buffer.texture
                ),
            }
        }
    }
}
