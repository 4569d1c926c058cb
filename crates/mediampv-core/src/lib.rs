//! mediampv-core: handle lifecycle and pump threads around an mpv engine.
//!
//! An [`EngineHandle`] owns one playback engine and everything running on its
//! behalf:
//!
//! - the event pump ([`event_pump`]), which forwards property changes to a
//!   [`PropertyObserver`] and engine logs to `tracing`
//! - the output adapter ([`surface`]): native surface, software rendering
//!   through the render pump ([`render_pump`]), or a caller-owned GL texture
//! - the process-wide pieces shared by all handles ([`global`],
//!   [`reference_cache`])
//!
//! The engine itself is a black box behind the [`Engine`] trait. With the
//! `libmpv` feature, `libmpv::MpvEngine` drives the real library;
//! [`scripted::ScriptedEngine`] is an in-memory stand-in.
//!
//! This crate has no managed-runtime dependency. The JVM glue lives in
//! `mediampv-jni`.

pub mod config;
pub mod engine;
pub mod error;
pub mod event_pump;
pub mod global;
pub mod handle;
pub mod host;
pub mod reference_cache;
pub mod render_pump;
pub mod scripted;
pub mod surface;

#[cfg(feature = "opengl")]
pub mod gl;
#[cfg(feature = "libmpv")]
pub mod libmpv;

pub use config::HandleConfig;
pub use engine::{Engine, EngineEvent, Format, PropertyPayload, PropertyValue};
pub use error::{BridgeError, ErrorCode};
pub use event_pump::PumpState;
pub use handle::EngineHandle;
pub use host::{FrameConsumer, NativeHost, ObserverBinder, PropertyObserver, RuntimeHost};
pub use render_pump::{RenderBuffer, RenderPumpState};
pub use surface::{KeepAlive, OutputMode, TextureAllocator};
