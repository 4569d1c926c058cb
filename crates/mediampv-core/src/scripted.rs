//! In-memory engine driven by a [`ScriptedController`].
//!
//! Behaves like the real engine where the bridge can observe it: properties
//! are typed, setting one emits a change event to every matching
//! observation, unobserving a token stops its pending events, and only one
//! render context may exist at a time. Nothing is decoded; frames are
//! "presented" by the controller and rendered as a flat color.
//!
//! Used by the test suites and by hosts that want to exercise the bridge
//! without libmpv.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;

use crate::engine::{
    status, Engine, EngineEvent, Format, LogMessage, PropertyPayload, PropertyValue, RenderApi,
    RenderContext, RenderTarget, RenderUpdate, UpdateCallback,
};

/// Color written by software renders, in `bgr0` order.
pub const FRAME_COLOR: [u8; 4] = [0x20, 0x40, 0x80, 0x00];

enum Queued {
    Event(EngineEvent),
    Wakeup,
}

#[derive(Debug, Clone, PartialEq)]
struct Observation {
    token: u64,
    name: String,
    format: Format,
}

#[derive(Default)]
struct RenderScript {
    callback: Option<Arc<dyn Fn() + Send + Sync>>,
    pending_frame: bool,
    context_alive: bool,
    last_fbo: Option<u32>,
    delay: Duration,
}

#[derive(Default)]
struct Counters {
    updates_polled: AtomicUsize,
    renders_started: AtomicUsize,
    renders_completed: AtomicUsize,
    swaps_reported: AtomicUsize,
}

struct ScriptedState {
    events: Sender<Queued>,
    options: Mutex<HashMap<String, PropertyValue>>,
    properties: Mutex<HashMap<String, PropertyValue>>,
    observations: Mutex<Vec<Observation>>,
    commands: Mutex<Vec<Vec<String>>>,
    command_failures: Mutex<HashMap<String, i32>>,
    log_level: Mutex<Option<String>>,
    render: Mutex<RenderScript>,
    counters: Counters,
    initialize_status: AtomicI32,
    initialized: AtomicBool,
    terminated: AtomicBool,
}

impl ScriptedState {
    fn push(&self, event: EngineEvent) {
        // The engine owns the receiver; after termination events go nowhere.
        let _ = self.events.send(Queued::Event(event));
    }

    fn is_observed(&self, token: u64) -> bool {
        self.observations.lock().iter().any(|o| o.token == token)
    }

    /// Stores a property and notifies every observation of it.
    fn store_property(&self, name: &str, value: PropertyValue) {
        self.properties.lock().insert(name.to_string(), value.clone());

        let matching: Vec<Observation> = self
            .observations
            .lock()
            .iter()
            .filter(|o| o.name == name)
            .cloned()
            .collect();
        for observation in matching {
            let payload = match observation.format {
                Format::Node | Format::NodeArray | Format::NodeMap | Format::ByteArray => {
                    PropertyPayload::Unsupported(observation.format.as_raw())
                }
                format => convert(&value, format)
                    .map(PropertyPayload::from)
                    .unwrap_or(PropertyPayload::None),
            };
            self.push(EngineEvent::PropertyChange {
                name: name.to_string(),
                token: observation.token,
                payload,
            });
        }
    }
}

/// Converts a stored value to the requested format, the way the engine
/// converts between its property formats.
fn convert(value: &PropertyValue, format: Format) -> Option<PropertyValue> {
    match (value, format) {
        (_, Format::None) => Some(PropertyValue::None),
        (v, f) if v.format() == f => Some(v.clone()),
        (PropertyValue::None, _) => None,
        (v, Format::String | Format::OsdString) => Some(PropertyValue::String(v.to_string())),
        (PropertyValue::Int64(v), Format::Double) => Some(PropertyValue::Double(*v as f64)),
        (PropertyValue::Flag(v), Format::Int64) => Some(PropertyValue::Int64(i64::from(*v))),
        _ => None,
    }
}

/// Engine half: implements [`Engine`].
pub struct ScriptedEngine {
    state: Arc<ScriptedState>,
    events: Receiver<Queued>,
}

impl ScriptedEngine {
    /// A fresh, uninitialized engine and the controller driving it.
    pub fn new() -> (ScriptedEngine, ScriptedController) {
        let (tx, rx) = crossbeam_channel::unbounded();
        let state = Arc::new(ScriptedState {
            events: tx,
            options: Mutex::new(HashMap::new()),
            properties: Mutex::new(HashMap::new()),
            observations: Mutex::new(Vec::new()),
            commands: Mutex::new(Vec::new()),
            command_failures: Mutex::new(HashMap::new()),
            log_level: Mutex::new(None),
            render: Mutex::new(RenderScript::default()),
            counters: Counters::default(),
            initialize_status: AtomicI32::new(status::SUCCESS),
            initialized: AtomicBool::new(false),
            terminated: AtomicBool::new(false),
        });
        let controller = ScriptedController {
            state: Arc::clone(&state),
        };
        (ScriptedEngine { state, events: rx }, controller)
    }

    fn require_initialized(&self) -> Result<(), i32> {
        if self.state.initialized.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(status::UNINITIALIZED)
        }
    }
}

impl Engine for ScriptedEngine {
    fn initialize(&self) -> i32 {
        let configured = self.state.initialize_status.load(Ordering::Acquire);
        if configured < 0 {
            return configured;
        }
        if self.state.initialized.swap(true, Ordering::AcqRel) {
            return status::INVALID_PARAMETER;
        }
        status::SUCCESS
    }

    fn request_log_messages(&self, min_level: &str) -> i32 {
        *self.state.log_level.lock() = Some(min_level.to_string());
        status::SUCCESS
    }

    fn set_option_string(&self, key: &str, value: &str) -> i32 {
        self.set_option(key, &PropertyValue::String(value.to_string()))
    }

    fn set_option(&self, name: &str, value: &PropertyValue) -> i32 {
        if name.is_empty() {
            return status::INVALID_PARAMETER;
        }
        self.state
            .options
            .lock()
            .insert(name.to_string(), value.clone());
        status::SUCCESS
    }

    fn command(&self, args: &[&str]) -> i32 {
        if let Err(status) = self.require_initialized() {
            return status;
        }
        let Some(name) = args.first() else {
            return status::INVALID_PARAMETER;
        };
        self.state
            .commands
            .lock()
            .push(args.iter().map(|a| a.to_string()).collect());
        self.state
            .command_failures
            .lock()
            .get(*name)
            .copied()
            .unwrap_or(status::SUCCESS)
    }

    fn get_property(&self, name: &str, format: Format) -> Result<PropertyValue, i32> {
        let properties = self.state.properties.lock();
        let value = properties.get(name).ok_or(status::PROPERTY_NOT_FOUND)?;
        convert(value, format).ok_or(status::PROPERTY_FORMAT)
    }

    fn set_property(&self, name: &str, value: &PropertyValue) -> i32 {
        if name.is_empty() {
            return status::INVALID_PARAMETER;
        }
        self.state.store_property(name, value.clone());
        status::SUCCESS
    }

    fn observe_property(&self, token: u64, name: &str, format: Format) -> i32 {
        if name.is_empty() {
            return status::INVALID_PARAMETER;
        }
        self.state.observations.lock().push(Observation {
            token,
            name: name.to_string(),
            format,
        });
        status::SUCCESS
    }

    fn unobserve_property(&self, token: u64) -> i32 {
        let mut observations = self.state.observations.lock();
        let before = observations.len();
        observations.retain(|o| o.token != token);
        (before - observations.len()) as i32
    }

    fn wait_event(&self, timeout: f64) -> EngineEvent {
        loop {
            let queued = if timeout < 0.0 {
                self.events.recv().ok()
            } else {
                self.events
                    .recv_timeout(Duration::from_secs_f64(timeout))
                    .ok()
            };
            match queued {
                None | Some(Queued::Wakeup) => return EngineEvent::None,
                Some(Queued::Event(EngineEvent::PropertyChange { token, .. }))
                    if !self.state.is_observed(token) =>
                {
                    continue
                }
                Some(Queued::Event(event)) => return event,
            }
        }
    }

    fn wakeup(&self) {
        let _ = self.state.events.send(Queued::Wakeup);
    }

    fn create_render_context(&self, api: RenderApi) -> Result<Box<dyn RenderContext>, i32> {
        let mut render = self.state.render.lock();
        if render.context_alive {
            return Err(status::UNSUPPORTED);
        }
        render.context_alive = true;
        render.pending_frame = false;
        tracing::debug!("scripted render context created ({api:?})");
        Ok(Box::new(ScriptedRenderContext {
            state: Arc::clone(&self.state),
        }))
    }
}

impl Drop for ScriptedEngine {
    fn drop(&mut self) {
        self.state.initialized.store(false, Ordering::Release);
        self.state.terminated.store(true, Ordering::Release);
    }
}

struct ScriptedRenderContext {
    state: Arc<ScriptedState>,
}

impl RenderContext for ScriptedRenderContext {
    fn set_update_callback(&mut self, callback: UpdateCallback) {
        self.state.render.lock().callback = Some(Arc::from(callback));
    }

    fn update(&mut self) -> RenderUpdate {
        self.state
            .counters
            .updates_polled
            .fetch_add(1, Ordering::AcqRel);
        let mut render = self.state.render.lock();
        if std::mem::take(&mut render.pending_frame) {
            RenderUpdate::FRAME
        } else {
            RenderUpdate::default()
        }
    }

    fn render(&mut self, target: RenderTarget<'_>) -> i32 {
        let counters = &self.state.counters;
        counters.renders_started.fetch_add(1, Ordering::AcqRel);

        let delay = self.state.render.lock().delay;
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        let status = match target {
            RenderTarget::Software {
                width,
                height,
                stride,
                format,
                pixels,
            } => {
                let row = width as usize * FRAME_COLOR.len();
                if format != "bgr0" || stride < row || pixels.len() < stride * height as usize {
                    status::INVALID_PARAMETER
                } else {
                    for line in pixels.chunks_mut(stride).take(height as usize) {
                        for pixel in line[..row].chunks_exact_mut(FRAME_COLOR.len()) {
                            pixel.copy_from_slice(&FRAME_COLOR);
                        }
                    }
                    status::SUCCESS
                }
            }
            RenderTarget::Framebuffer { fbo, .. } => {
                self.state.render.lock().last_fbo = Some(fbo);
                status::SUCCESS
            }
        };

        counters.renders_completed.fetch_add(1, Ordering::AcqRel);
        status
    }

    fn report_swap(&mut self) {
        self.state
            .counters
            .swaps_reported
            .fetch_add(1, Ordering::AcqRel);
    }
}

impl Drop for ScriptedRenderContext {
    fn drop(&mut self) {
        let mut render = self.state.render.lock();
        render.callback = None;
        render.pending_frame = false;
        render.context_alive = false;
    }
}

/// Test-side half of a [`ScriptedEngine`].
#[derive(Clone)]
pub struct ScriptedController {
    state: Arc<ScriptedState>,
}

impl ScriptedController {
    /// Queues a raw event, bypassing property storage.
    pub fn push_event(&self, event: EngineEvent) {
        self.state.push(event);
    }

    pub fn push_property_change(&self, name: &str, token: u64, payload: PropertyPayload) {
        self.state.push(EngineEvent::PropertyChange {
            name: name.to_string(),
            token,
            payload,
        });
    }

    pub fn push_log(&self, prefix: &str, level: &str, text: &str) {
        self.state.push(EngineEvent::LogMessage(LogMessage {
            prefix: prefix.to_string(),
            level: level.to_string(),
            text: text.to_string(),
        }));
    }

    /// Changes a property from the engine side, notifying observations.
    pub fn set_property(&self, name: &str, value: PropertyValue) {
        self.state.store_property(name, value);
    }

    /// Same as [`Engine::wakeup`].
    pub fn wake(&self) {
        let _ = self.state.events.send(Queued::Wakeup);
    }

    /// Makes the next `initialize` fail with `status`.
    pub fn fail_initialize(&self, status: i32) {
        self.state.initialize_status.store(status, Ordering::Release);
    }

    /// Makes every command named `name` fail with `status`.
    pub fn fail_command(&self, name: &str, status: i32) {
        self.state
            .command_failures
            .lock()
            .insert(name.to_string(), status);
    }

    /// Sets `dwidth`/`dheight`, marks a frame pending and fires the render
    /// context's update callback.
    pub fn present_frame(&self, width: i64, height: i64) {
        self.state
            .store_property("dwidth", PropertyValue::Int64(width));
        self.state
            .store_property("dheight", PropertyValue::Int64(height));

        let callback = {
            let mut render = self.state.render.lock();
            if !render.context_alive {
                return;
            }
            render.pending_frame = true;
            render.callback.clone()
        };
        if let Some(callback) = callback {
            callback();
        }
    }

    /// Slows every render call down by `delay`.
    pub fn set_render_delay(&self, delay: Duration) {
        self.state.render.lock().delay = delay;
    }

    pub fn option(&self, name: &str) -> Option<PropertyValue> {
        self.state.options.lock().get(name).cloned()
    }

    pub fn property(&self, name: &str) -> Option<PropertyValue> {
        self.state.properties.lock().get(name).cloned()
    }

    pub fn commands(&self) -> Vec<Vec<String>> {
        self.state.commands.lock().clone()
    }

    /// Tokens with at least one active observation, in registration order.
    pub fn observed_tokens(&self) -> Vec<u64> {
        let mut tokens: Vec<u64> = Vec::new();
        for observation in self.state.observations.lock().iter() {
            if !tokens.contains(&observation.token) {
                tokens.push(observation.token);
            }
        }
        tokens
    }

    pub fn log_level(&self) -> Option<String> {
        self.state.log_level.lock().clone()
    }

    pub fn is_initialized(&self) -> bool {
        self.state.initialized.load(Ordering::Acquire)
    }

    /// Whether the engine was dropped (terminated and freed).
    pub fn is_terminated(&self) -> bool {
        self.state.terminated.load(Ordering::Acquire)
    }

    pub fn render_context_alive(&self) -> bool {
        self.state.render.lock().context_alive
    }

    pub fn last_fbo(&self) -> Option<u32> {
        self.state.render.lock().last_fbo
    }

    pub fn updates_polled(&self) -> usize {
        self.state.counters.updates_polled.load(Ordering::Acquire)
    }

    pub fn renders_started(&self) -> usize {
        self.state.counters.renders_started.load(Ordering::Acquire)
    }

    pub fn renders_completed(&self) -> usize {
        self.state.counters.renders_completed.load(Ordering::Acquire)
    }

    pub fn swaps_reported(&self) -> usize {
        self.state.counters.swaps_reported.load(Ordering::Acquire)
    }
}
