//! Event pump: the thread that drains the engine's event queue.
//!
//! The pump attaches itself to the runtime host, then blocks on
//! [`Engine::wait_event`] and forwards property changes to the handle's
//! observer in exactly the order the engine produced them. Log messages go
//! to `tracing` under the `mpv` target.
//!
//! The pump only holds a weak reference to the engine and upgrades it for
//! the duration of one wait. Once the handle drops the engine the upgrade
//! fails and the pump stops on its next iteration.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};

use crate::engine::{Engine, EngineEvent, LogMessage, PropertyPayload};
use crate::error::BridgeError;
use crate::host::{ObserverSlot, RuntimeHost, ThreadAttachment};

/// Lifecycle of an event pump thread.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpState {
    NotStarted = 0,
    Attaching = 1,
    Running = 2,
    Stopping = 3,
    Stopped = 4,
}

impl PumpState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => PumpState::NotStarted,
            1 => PumpState::Attaching,
            2 => PumpState::Running,
            3 => PumpState::Stopping,
            _ => PumpState::Stopped,
        }
    }
}

/// State shared between the pump thread and its owner.
struct PumpShared {
    state: AtomicU8,
    stop_flag: AtomicBool,
}

impl PumpShared {
    fn set_state(&self, state: PumpState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

/// Marks the pump stopped however the thread exits, including unwinding
/// out of an observer callback.
struct StoppedOnExit<'a>(&'a PumpShared);

impl Drop for StoppedOnExit<'_> {
    fn drop(&mut self) {
        self.0.set_state(PumpState::Stopped);
    }
}

/// Owner side of a running event pump.
pub(crate) struct EventPump {
    handle: Option<JoinHandle<()>>,
    shared: Arc<PumpShared>,
    engine: Weak<dyn Engine>,
}

impl EventPump {
    /// Spawns the pump thread. The thread attaches to `host` before the
    /// first wait.
    pub(crate) fn spawn(
        engine: &Arc<dyn Engine>,
        host: Arc<dyn RuntimeHost>,
        observer: ObserverSlot,
        thread_name: &str,
    ) -> Result<Self, BridgeError> {
        let shared = Arc::new(PumpShared {
            state: AtomicU8::new(PumpState::NotStarted as u8),
            stop_flag: AtomicBool::new(false),
        });

        let weak_engine = Arc::downgrade(engine);
        let thread_shared = Arc::clone(&shared);
        let thread_engine = weak_engine.clone();
        let name = thread_name.to_string();

        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                event_loop(thread_engine, host, observer, thread_shared, &name);
            })
            .map_err(|e| BridgeError::Thread(e.to_string()))?;

        tracing::debug!("event pump spawned ({thread_name})");

        Ok(Self {
            handle: Some(handle),
            shared,
            engine: weak_engine,
        })
    }

    pub(crate) fn state(&self) -> PumpState {
        PumpState::from_u8(self.shared.state.load(Ordering::Acquire))
    }

    /// Sets the stop flag and wakes a blocked wait. Does not join.
    pub(crate) fn stop(&self) {
        self.shared.stop_flag.store(true, Ordering::Release);
        if let Some(engine) = self.engine.upgrade() {
            engine.wakeup();
        }
    }

    /// Stops the pump and blocks until the thread has exited.
    pub(crate) fn shutdown(&mut self) {
        self.stop();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("event pump thread panicked");
            }
        }
    }
}

impl Drop for EventPump {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn event_loop(
    engine: Weak<dyn Engine>,
    host: Arc<dyn RuntimeHost>,
    observer: ObserverSlot,
    shared: Arc<PumpShared>,
    thread_name: &str,
) {
    let _stopped = StoppedOnExit(&shared);
    shared.set_state(PumpState::Attaching);

    let attachment = match ThreadAttachment::attach(host.as_ref(), thread_name) {
        Ok(attachment) => attachment,
        Err(e) => {
            tracing::error!("event pump could not attach to runtime host: {e}");
            return;
        }
    };

    shared.set_state(PumpState::Running);
    tracing::debug!("event pump running");

    loop {
        if shared.stop_flag.load(Ordering::Acquire) {
            break;
        }
        let Some(engine) = engine.upgrade() else {
            tracing::debug!("engine released, event pump stopping");
            break;
        };
        let event = engine.wait_event(-1.0);
        drop(engine);

        match event {
            EngineEvent::None => continue,
            EngineEvent::Shutdown => {
                tracing::info!("engine shut down, event pump stopping");
                break;
            }
            EngineEvent::LogMessage(message) => forward_log(&message),
            EngineEvent::PropertyChange {
                name,
                token,
                payload,
            } => dispatch_property(&observer, &name, token, payload),
            EngineEvent::Other { id } => {
                tracing::trace!("ignoring engine event {id}");
            }
        }
    }

    shared.set_state(PumpState::Stopping);
    drop(attachment);
    tracing::debug!("event pump stopped");
}

/// The single decode site for property payloads.
fn dispatch_property(observer: &ObserverSlot, name: &str, token: u64, payload: PropertyPayload) {
    let Some(observer) = observer.current() else {
        tracing::trace!("no observer installed, dropping change of {name} (token {token})");
        return;
    };

    match payload {
        PropertyPayload::None => observer.on_property_none(name),
        PropertyPayload::Flag(value) => observer.on_property_flag(name, value),
        PropertyPayload::Int64(value) => observer.on_property_int64(name, value),
        PropertyPayload::Double(value) => observer.on_property_double(name, value),
        PropertyPayload::String(value) => observer.on_property_string(name, &value),
        PropertyPayload::Unsupported(format) => {
            tracing::warn!("dropping change of {name} (token {token}): unsupported format {format}");
        }
    }
}

fn forward_log(message: &LogMessage) {
    let prefix = message.prefix.as_str();
    let text = message.text.trim_end();
    match message.level.as_str() {
        "fatal" | "error" => tracing::error!(target: "mpv", "[{prefix}] {text}"),
        "warn" => tracing::warn!(target: "mpv", "[{prefix}] {text}"),
        "info" => tracing::info!(target: "mpv", "[{prefix}] {text}"),
        "v" | "debug" => tracing::debug!(target: "mpv", "[{prefix}] {text}"),
        _ => tracing::trace!(target: "mpv", "[{prefix}] {text}"),
    }
}
