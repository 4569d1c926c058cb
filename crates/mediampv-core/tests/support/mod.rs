//! Test doubles shared by the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing_subscriber::EnvFilter;

use mediampv_core::scripted::{ScriptedController, ScriptedEngine};
use mediampv_core::{
    BridgeError, EngineHandle, FrameConsumer, HandleConfig, ObserverBinder, PropertyObserver,
    PropertyPayload, RuntimeHost,
};

/// Routes bridge logs to the test harness; filtered by `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn scripted_handle(host: Arc<dyn RuntimeHost>) -> (Arc<EngineHandle>, ScriptedController) {
    init_tracing();
    let (engine, controller) = ScriptedEngine::new();
    let handle = EngineHandle::create(host, HandleConfig::default(), || Ok(engine));
    (Arc::new(handle), controller)
}

pub fn wait_until(what: &str, mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !done() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(1));
    }
}

/// One observer invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub name: String,
    pub payload: PropertyPayload,
    pub thread: ThreadId,
}

/// Observer recording every call with the thread it arrived on.
#[derive(Default)]
pub struct Recorder {
    calls: Mutex<Vec<Call>>,
}

impl Recorder {
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn names(&self) -> Vec<String> {
        self.calls.lock().iter().map(|c| c.name.clone()).collect()
    }

    fn record(&self, name: &str, payload: PropertyPayload) {
        self.calls.lock().push(Call {
            name: name.to_string(),
            payload,
            thread: thread::current().id(),
        });
    }
}

impl PropertyObserver for Recorder {
    fn on_property_none(&self, name: &str) {
        self.record(name, PropertyPayload::None);
    }

    fn on_property_flag(&self, name: &str, value: bool) {
        self.record(name, PropertyPayload::Flag(value));
    }

    fn on_property_int64(&self, name: &str, value: i64) {
        self.record(name, PropertyPayload::Int64(value));
    }

    fn on_property_double(&self, name: &str, value: f64) {
        self.record(name, PropertyPayload::Double(value));
    }

    fn on_property_string(&self, name: &str, value: &str) {
        self.record(name, PropertyPayload::String(value.to_string()));
    }
}

/// Binder standing in for a managed reference of the wrong type.
pub struct WrongType;

impl ObserverBinder for WrongType {
    fn bind(self) -> Result<Arc<dyn PropertyObserver>, BridgeError> {
        Err(BridgeError::Validation(
            "object does not implement EventListener".into(),
        ))
    }
}

/// Host counting attach/detach calls.
#[derive(Default)]
pub struct CountingHost {
    pub attached: AtomicUsize,
    pub detached: AtomicUsize,
}

impl CountingHost {
    pub fn attached(&self) -> usize {
        self.attached.load(Ordering::SeqCst)
    }

    pub fn detached(&self) -> usize {
        self.detached.load(Ordering::SeqCst)
    }
}

impl RuntimeHost for CountingHost {
    fn attach_current_thread(&self, _thread_name: &str) -> Result<(), BridgeError> {
        self.attached.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn detach_current_thread(&self) {
        self.detached.fetch_add(1, Ordering::SeqCst);
    }
}

/// Host whose attach always fails.
pub struct DetachedHost;

impl RuntimeHost for DetachedHost {
    fn attach_current_thread(&self, thread_name: &str) -> Result<(), BridgeError> {
        Err(BridgeError::RuntimeHost(format!(
            "cannot attach {thread_name}"
        )))
    }

    fn detach_current_thread(&self) {
        panic!("detach without a successful attach");
    }
}

/// Frame consumer that can hold the render pump inside `on_frame`.
#[derive(Default)]
pub struct GatedFrames {
    frames: Mutex<Vec<(u32, u32, Vec<u8>)>>,
    gate: Mutex<bool>,
    opened: Condvar,
    entered: AtomicUsize,
}

impl GatedFrames {
    /// A consumer that blocks every call until [`GatedFrames::open`].
    pub fn closed() -> Self {
        Self::default()
    }

    /// A consumer that never blocks.
    pub fn open_gate() -> Self {
        let frames = Self::default();
        frames.open();
        frames
    }

    pub fn open(&self) {
        *self.gate.lock() = true;
        self.opened.notify_all();
    }

    pub fn entered(&self) -> usize {
        self.entered.load(Ordering::SeqCst)
    }

    pub fn count(&self) -> usize {
        self.frames.lock().len()
    }

    pub fn frames(&self) -> Vec<(u32, u32, Vec<u8>)> {
        self.frames.lock().clone()
    }
}

impl FrameConsumer for GatedFrames {
    fn on_frame(&self, width: u32, height: u32, pixels: Vec<u8>) {
        self.entered.fetch_add(1, Ordering::SeqCst);
        let mut open = self.gate.lock();
        while !*open {
            self.opened.wait(&mut open);
        }
        drop(open);
        self.frames.lock().push((width, height, pixels));
    }
}
