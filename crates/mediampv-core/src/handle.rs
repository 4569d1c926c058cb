//! Engine handle: one engine instance, its pumps and its output.

use std::ffi::c_void;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::config::HandleConfig;
use crate::engine::{status, Engine, Format, GetProcAddressFn, PropertyValue};
use crate::error::BridgeError;
use crate::event_pump::{EventPump, PumpState};
use crate::host::{FrameConsumer, ObserverBinder, ObserverSlot, RuntimeHost};
use crate::render_pump::RenderPumpState;
use crate::surface::{KeepAlive, OutputAdapter, OutputMode, TextureAllocator};

/// Owns one engine instance and everything running on its behalf.
///
/// Every operation is callable from any thread. Calling [`destroy`] while
/// other threads still issue commands is the caller's responsibility: those
/// calls fail with [`BridgeError::NotInitialized`] once the engine is gone.
///
/// Dropping a handle that was never destroyed runs [`destroy`] first, so a
/// handle can never be freed while its pumps are still running.
///
/// [`destroy`]: EngineHandle::destroy
pub struct EngineHandle {
    host: Arc<dyn RuntimeHost>,
    config: HandleConfig,
    engine: RwLock<Option<Arc<dyn Engine>>>,
    /// Status of a failed engine creation, reported by `initialize`.
    creation_status: i32,
    event_pump: Mutex<Option<EventPump>>,
    observer: ObserverSlot,
    output: OutputAdapter,
}

impl EngineHandle {
    /// Creates the engine through `factory` and applies the creation-time
    /// options (log message request and initial `msg-level`).
    ///
    /// A failing factory still yields a handle; its `initialize` reports the
    /// engine's status.
    pub fn create<E, F>(host: Arc<dyn RuntimeHost>, config: HandleConfig, factory: F) -> Self
    where
        E: Engine + 'static,
        F: FnOnce() -> Result<E, i32>,
    {
        let (engine, creation_status) = match factory() {
            Ok(engine) => {
                let engine: Arc<dyn Engine> = Arc::new(engine);
                apply_creation_options(engine.as_ref(), &config);
                tracing::info!("engine created");
                (Some(engine), status::SUCCESS)
            }
            Err(status) => {
                tracing::error!("engine creation failed: status {status}");
                (None, status)
            }
        };

        Self {
            host,
            config,
            engine: RwLock::new(engine),
            creation_status,
            event_pump: Mutex::new(None),
            observer: ObserverSlot::default(),
            output: OutputAdapter::default(),
        }
    }

    pub fn config(&self) -> &HandleConfig {
        &self.config
    }

    /// Starts the engine and spawns the event pump.
    pub fn initialize(&self) -> Result<(), BridgeError> {
        let engine = self.engine_for("initialize").map_err(|e| {
            if self.creation_status < 0 {
                BridgeError::Engine {
                    operation: "create",
                    status: self.creation_status,
                }
            } else {
                e
            }
        })?;

        let mut event_pump = self.event_pump.lock();
        BridgeError::check("initialize", engine.initialize())?;

        *event_pump = Some(EventPump::spawn(
            &engine,
            Arc::clone(&self.host),
            self.observer.clone(),
            &self.config.event_thread_name,
        )?);
        tracing::info!("engine initialized");
        Ok(())
    }

    /// Replaces the observer.
    ///
    /// The previous observer is released before the new reference is
    /// validated. If validation fails the handle is left without an observer.
    pub fn set_observer<B: ObserverBinder>(&self, binder: B) -> Result<(), BridgeError> {
        if self.observer.release() {
            tracing::debug!("previous observer released");
        }
        let observer = binder.bind()?;
        self.observer.install(observer);
        tracing::debug!("observer installed");
        Ok(())
    }

    /// Releases the observer, if any. Later events are dropped.
    pub fn clear_observer(&self) {
        if self.observer.release() {
            tracing::debug!("observer cleared");
        }
    }

    pub fn has_observer(&self) -> bool {
        self.observer.is_installed()
    }

    pub fn command(&self, args: &[&str]) -> Result<(), BridgeError> {
        let engine = self.engine_for("command")?;
        if args.len() > self.config.max_command_args {
            return Err(BridgeError::ArgumentLimit {
                count: args.len(),
                limit: self.config.max_command_args,
            });
        }
        tracing::debug!("command {args:?}");
        BridgeError::check("command", engine.command(args))
    }

    pub fn set_option(&self, key: &str, value: &str) -> Result<(), BridgeError> {
        let engine = self.engine_for("set_option")?;
        BridgeError::check("set_option", engine.set_option_string(key, value))
    }

    pub fn get_property(&self, name: &str, format: Format) -> Result<PropertyValue, BridgeError> {
        let engine = self.engine_for("get_property")?;
        engine
            .get_property(name, format)
            .map_err(|status| BridgeError::Engine {
                operation: "get_property",
                status,
            })
    }

    pub fn set_property(&self, name: &str, value: &PropertyValue) -> Result<(), BridgeError> {
        let engine = self.engine_for("set_property")?;
        BridgeError::check("set_property", engine.set_property(name, value))
    }

    /// Requests change notifications for `name`, tagged with `token`.
    pub fn observe_property(&self, name: &str, format: Format, token: u64) -> Result<(), BridgeError> {
        let engine = self.engine_for("observe_property")?;
        BridgeError::check("observe_property", engine.observe_property(token, name, format))
    }

    pub fn unobserve_property(&self, token: u64) -> Result<(), BridgeError> {
        let engine = self.engine_for("unobserve_property")?;
        BridgeError::check("unobserve_property", engine.unobserve_property(token))
    }

    /// Binds video output to a native window. `keep_alive` is held until
    /// the surface is detached.
    pub fn attach_surface(&self, wid: i64, keep_alive: KeepAlive) -> Result<(), BridgeError> {
        let engine = self.engine_for("attach_surface")?;
        self.output.attach_surface(engine.as_ref(), wid, keep_alive)
    }

    pub fn detach_surface(&self) -> Result<(), BridgeError> {
        let engine = self.engine_for("detach_surface")?;
        self.output.detach_surface(engine.as_ref())
    }

    /// Starts software rendering; frames go to `consumer` on the render pump.
    pub fn attach_buffer_renderer(&self, consumer: Arc<dyn FrameConsumer>) -> Result<(), BridgeError> {
        let engine = self.engine_for("attach_buffer_renderer")?;
        self.output
            .attach_buffer_renderer(&engine, Arc::clone(&self.host), consumer, &self.config)
    }

    pub fn detach_buffer_renderer(&self) -> Result<(), BridgeError> {
        self.output.detach_buffer_renderer()
    }

    /// Creates an OpenGL render context.
    ///
    /// # Safety
    ///
    /// `get_proc_address` and `proc_context` must stay valid for as long as
    /// the render context exists, and every later hardware-mode call must be
    /// made with the same GL context current.
    pub unsafe fn create_render_context(
        &self,
        get_proc_address: GetProcAddressFn,
        proc_context: *mut c_void,
    ) -> Result<(), BridgeError> {
        let engine = self.engine_for("create_render_context")?;
        self.output
            .create_render_context(engine.as_ref(), get_proc_address, proc_context)
    }

    pub fn destroy_render_context(&self) -> Result<(), BridgeError> {
        self.output.destroy_render_context()
    }

    /// (Re)allocates the texture+framebuffer pair. Returns the texture id.
    pub fn create_texture(
        &self,
        allocator: &dyn TextureAllocator,
        width: u32,
        height: u32,
    ) -> Result<u32, BridgeError> {
        self.output.create_texture(allocator, width, height)
    }

    pub fn release_texture(&self, allocator: &dyn TextureAllocator) -> Result<(), BridgeError> {
        self.output.release_texture(allocator)
    }

    /// Renders the pending frame into the texture, on the calling thread.
    pub fn render_frame_to_texture(&self) -> Result<bool, BridgeError> {
        self.output.render_frame_to_texture()
    }

    pub fn output_mode(&self) -> OutputMode {
        self.output.mode()
    }

    /// State of the render pump, `None` unless a buffer renderer is attached.
    pub fn render_pump_state(&self) -> Option<RenderPumpState> {
        self.output.render_pump_state()
    }

    /// State of the event pump, `None` before `initialize`.
    pub fn event_pump_state(&self) -> Option<PumpState> {
        self.event_pump.lock().as_ref().map(EventPump::state)
    }

    /// Tears everything down: output, pumps, observer, then the engine.
    ///
    /// Blocks until every pump thread has exited. A second call fails with
    /// [`BridgeError::NotInitialized`].
    pub fn destroy(&self) -> Result<(), BridgeError> {
        self.destroy_with(None)
    }

    /// [`destroy`](Self::destroy), handing a texture+framebuffer pair that is
    /// still allocated back to `allocator` first.
    ///
    /// Must be called with the allocator's GL context current.
    pub fn destroy_releasing(&self, allocator: &dyn TextureAllocator) -> Result<(), BridgeError> {
        self.destroy_with(Some(allocator))
    }

    fn destroy_with(&self, allocator: Option<&dyn TextureAllocator>) -> Result<(), BridgeError> {
        let Some(engine) = self.engine.write().take() else {
            return Err(BridgeError::NotInitialized {
                operation: "destroy",
            });
        };

        let mode = self.output.shutdown(allocator);
        if mode != OutputMode::Detached {
            tracing::debug!("{} torn down", mode.name());
        }

        if let Some(mut pump) = self.event_pump.lock().take() {
            pump.shutdown();
        }

        if self.observer.release() {
            tracing::debug!("observer released");
        }

        drop(engine);
        tracing::info!("engine destroyed");
        Ok(())
    }

    fn engine_for(&self, operation: &'static str) -> Result<Arc<dyn Engine>, BridgeError> {
        self.engine
            .read()
            .clone()
            .ok_or(BridgeError::NotInitialized { operation })
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        let alive = self.engine.read().is_some();
        if alive {
            tracing::warn!("engine handle dropped without destroy, tearing down");
            let _ = self.destroy();
        }
    }
}

fn apply_creation_options(engine: &dyn Engine, config: &HandleConfig) {
    let status = engine.request_log_messages(&config.log_request_level);
    if status < 0 {
        tracing::warn!(
            "failed to request engine log messages at {}: status {status}",
            config.log_request_level
        );
    }
    let status = engine.set_option_string("msg-level", &config.initial_msg_level);
    if status < 0 {
        tracing::warn!(
            "failed to set msg-level {}: status {status}",
            config.initial_msg_level
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::NativeHost;
    use crate::scripted::{ScriptedController, ScriptedEngine};

    fn handle() -> (EngineHandle, ScriptedController) {
        let (engine, controller) = ScriptedEngine::new();
        let handle = EngineHandle::create(Arc::new(NativeHost), HandleConfig::default(), || {
            Ok(engine)
        });
        (handle, controller)
    }

    #[test]
    fn test_create_applies_logging_options() {
        let (_handle, controller) = handle();
        assert_eq!(controller.log_level().as_deref(), Some("terminal-default"));
        assert_eq!(
            controller.option("msg-level"),
            Some(PropertyValue::String("all=v".into()))
        );
    }

    #[test]
    fn test_failed_creation_reports_engine_error() {
        let handle = EngineHandle::create(
            Arc::new(NativeHost),
            HandleConfig::default(),
            || -> Result<ScriptedEngine, i32> { Err(status::NOMEM) },
        );
        assert_eq!(
            handle.initialize(),
            Err(BridgeError::Engine {
                operation: "create",
                status: status::NOMEM
            })
        );
        assert_eq!(
            handle.command(&["stop"]),
            Err(BridgeError::NotInitialized {
                operation: "command"
            })
        );
        assert_eq!(
            handle.destroy(),
            Err(BridgeError::NotInitialized {
                operation: "destroy"
            })
        );
    }

    #[test]
    fn test_initialize_failure_is_engine_error() {
        let (handle, controller) = handle();
        controller.fail_initialize(status::GENERIC);
        assert_eq!(
            handle.initialize(),
            Err(BridgeError::Engine {
                operation: "initialize",
                status: status::GENERIC
            })
        );
        assert_eq!(handle.event_pump_state(), None);
    }

    #[test]
    fn test_command_argument_limit() {
        let (engine, _controller) = ScriptedEngine::new();
        let handle = EngineHandle::create(
            Arc::new(NativeHost),
            HandleConfig::default().with_max_command_args(2),
            || Ok(engine),
        );
        handle.initialize().unwrap();
        handle.command(&["loadfile", "a.mkv"]).unwrap();
        assert_eq!(
            handle.command(&["loadfile", "a.mkv", "replace"]),
            Err(BridgeError::ArgumentLimit { count: 3, limit: 2 })
        );
        handle.destroy().unwrap();
    }

    #[test]
    fn test_engine_status_maps_to_error() {
        let (handle, controller) = handle();
        handle.initialize().unwrap();
        controller.fail_command("seek", status::COMMAND);
        assert_eq!(
            handle.command(&["seek", "10"]),
            Err(BridgeError::Engine {
                operation: "command",
                status: status::COMMAND
            })
        );
        assert!(matches!(
            handle.get_property("missing", Format::Int64),
            Err(BridgeError::Engine { .. })
        ));
        handle.destroy().unwrap();
    }

    #[test]
    fn test_property_round_trip() {
        let (handle, _controller) = handle();
        handle.initialize().unwrap();
        handle
            .set_property("volume", &PropertyValue::Int64(55))
            .unwrap();
        assert_eq!(
            handle.get_property("volume", Format::Int64).unwrap(),
            PropertyValue::Int64(55)
        );
        handle.set_option("hwdec", "auto").unwrap();
        handle.destroy().unwrap();
    }

    #[test]
    fn test_drop_without_destroy_terminates_engine() {
        let (handle, controller) = handle();
        handle.initialize().unwrap();
        assert!(handle.event_pump_state().is_some());
        drop(handle);
        assert!(controller.is_terminated());
    }
}
