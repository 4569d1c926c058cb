//! Playback engine contract.
//!
//! The engine is a black box reached only through its command, property and
//! event API. [`Engine`] mirrors the mpv client API closely: every operation
//! returns a raw status where negative values are failures, so backends can
//! pass the engine's own error codes straight through.
//!
//! Two backends exist:
//! - `libmpv::MpvEngine` (feature `libmpv`) for the real engine
//! - [`ScriptedEngine`](crate::scripted::ScriptedEngine) for tests and headless hosts

use std::ffi::{c_char, c_void};
use std::fmt;

/// Raw engine status codes (mpv numbering).
pub mod status {
    pub const SUCCESS: i32 = 0;
    pub const NOMEM: i32 = -1;
    pub const UNINITIALIZED: i32 = -3;
    pub const INVALID_PARAMETER: i32 = -4;
    pub const PROPERTY_NOT_FOUND: i32 = -8;
    pub const PROPERTY_FORMAT: i32 = -9;
    pub const PROPERTY_UNAVAILABLE: i32 = -10;
    pub const COMMAND: i32 = -12;
    pub const UNSUPPORTED: i32 = -18;
    pub const NOT_IMPLEMENTED: i32 = -19;
    pub const GENERIC: i32 = -20;
}

/// Data format of a property or option value.
///
/// Discriminants follow the engine's numbering, which is also the ordinal
/// order the managed side uses.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    None = 0,
    String = 1,
    OsdString = 2,
    Flag = 3,
    Int64 = 4,
    Double = 5,
    Node = 6,
    NodeArray = 7,
    NodeMap = 8,
    ByteArray = 9,
}

impl Format {
    pub fn from_raw(raw: i32) -> Option<Self> {
        Some(match raw {
            0 => Format::None,
            1 => Format::String,
            2 => Format::OsdString,
            3 => Format::Flag,
            4 => Format::Int64,
            5 => Format::Double,
            6 => Format::Node,
            7 => Format::NodeArray,
            8 => Format::NodeMap,
            9 => Format::ByteArray,
            _ => return None,
        })
    }

    pub fn as_raw(self) -> i32 {
        self as i32
    }
}

/// A property value in one of the deliverable kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    None,
    Flag(bool),
    Int64(i64),
    Double(f64),
    String(String),
}

impl PropertyValue {
    pub fn format(&self) -> Format {
        match self {
            PropertyValue::None => Format::None,
            PropertyValue::Flag(_) => Format::Flag,
            PropertyValue::Int64(_) => Format::Int64,
            PropertyValue::Double(_) => Format::Double,
            PropertyValue::String(_) => Format::String,
        }
    }

    pub fn as_int64(&self) -> Option<i64> {
        match self {
            PropertyValue::Int64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            PropertyValue::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_flag(&self) -> Option<bool> {
        match self {
            PropertyValue::Flag(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::None => write!(f, "<none>"),
            PropertyValue::Flag(v) => write!(f, "{}", if *v { "yes" } else { "no" }),
            PropertyValue::Int64(v) => write!(f, "{v}"),
            PropertyValue::Double(v) => write!(f, "{v}"),
            PropertyValue::String(v) => write!(f, "{v}"),
        }
    }
}

/// Payload carried by a property-change event.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyPayload {
    None,
    Flag(bool),
    Int64(i64),
    Double(f64),
    String(String),
    /// Observed with a format that cannot be delivered to an observer.
    Unsupported(i32),
}

impl From<PropertyValue> for PropertyPayload {
    fn from(value: PropertyValue) -> Self {
        match value {
            PropertyValue::None => PropertyPayload::None,
            PropertyValue::Flag(v) => PropertyPayload::Flag(v),
            PropertyValue::Int64(v) => PropertyPayload::Int64(v),
            PropertyValue::Double(v) => PropertyPayload::Double(v),
            PropertyValue::String(v) => PropertyPayload::String(v),
        }
    }
}

/// Engine log message, already copied out of engine memory.
#[derive(Debug, Clone, PartialEq)]
pub struct LogMessage {
    pub prefix: String,
    pub level: String,
    pub text: String,
}

/// An event returned by [`Engine::wait_event`].
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Timeout or wakeup: nothing happened.
    None,
    /// The engine is shutting down and will not produce further events.
    Shutdown,
    LogMessage(LogMessage),
    PropertyChange {
        name: String,
        /// Token passed to [`Engine::observe_property`].
        token: u64,
        payload: PropertyPayload,
    },
    /// Any other engine event id.
    Other { id: i32 },
}

/// Bit set returned by [`RenderContext::update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RenderUpdate(pub u64);

impl RenderUpdate {
    /// A new video frame must be rendered.
    pub const FRAME: RenderUpdate = RenderUpdate(1);

    pub fn has_frame(self) -> bool {
        self.0 & Self::FRAME.0 != 0
    }
}

/// OpenGL symbol loader handed to the engine's render API.
pub type GetProcAddressFn =
    unsafe extern "C" fn(ctx: *mut c_void, name: *const c_char) -> *mut c_void;

/// Render API requested from the engine.
#[derive(Debug, Clone, Copy)]
pub enum RenderApi {
    /// CPU rendering into caller-owned memory.
    Software,
    /// OpenGL rendering into a framebuffer of the context current on the
    /// rendering thread.
    OpenGl {
        get_proc_address: GetProcAddressFn,
        context: *mut c_void,
    },
}

/// Destination of a single render call.
pub enum RenderTarget<'a> {
    Software {
        width: u32,
        height: u32,
        stride: usize,
        /// Engine pixel format name, e.g. `bgr0`.
        format: &'a str,
        pixels: &'a mut [u8],
    },
    Framebuffer {
        fbo: u32,
        width: u32,
        height: u32,
        flip_y: bool,
    },
}

/// Callback the engine invokes (from any thread) when new content is ready.
///
/// Must not call back into the engine.
pub type UpdateCallback = Box<dyn Fn() + Send + Sync>;

/// A render context created by [`Engine::create_render_context`].
///
/// Dropping it frees the engine-side context; the engine instance stays
/// alive at least until then.
pub trait RenderContext: Send {
    /// Installs the "content updated" callback, replacing any previous one.
    fn set_update_callback(&mut self, callback: UpdateCallback);

    /// Polls what needs to be done since the last update.
    fn update(&mut self) -> RenderUpdate;

    /// Renders the current frame. Returns the raw engine status.
    fn render(&mut self, target: RenderTarget<'_>) -> i32;

    /// Reports that the rendered frame was presented.
    fn report_swap(&mut self);
}

/// Playback engine instance.
///
/// All methods are callable from any thread. [`Engine::wait_event`] must only
/// be called from one thread at a time (the event pump). Dropping the last
/// reference terminates the engine and frees it.
pub trait Engine: Send + Sync {
    /// Starts the engine after pre-initialization options were applied.
    fn initialize(&self) -> i32;

    /// Enables log message events at `min_level` and above.
    fn request_log_messages(&self, min_level: &str) -> i32;

    fn set_option_string(&self, key: &str, value: &str) -> i32;

    /// Sets a typed option (e.g. the `wid` surface id).
    fn set_option(&self, name: &str, value: &PropertyValue) -> i32;

    fn command(&self, args: &[&str]) -> i32;

    fn get_property(&self, name: &str, format: Format) -> Result<PropertyValue, i32>;

    fn set_property(&self, name: &str, value: &PropertyValue) -> i32;

    /// Registers asynchronous change notifications tagged with `token`.
    fn observe_property(&self, token: u64, name: &str, format: Format) -> i32;

    /// Cancels every observation registered with `token`. Returns the number
    /// of removed observations, or a negative status.
    fn unobserve_property(&self, token: u64) -> i32;

    /// Blocks until the next event. A negative timeout waits forever.
    fn wait_event(&self, timeout: f64) -> EngineEvent;

    /// Forces a blocked [`Engine::wait_event`] to return [`EngineEvent::None`].
    fn wakeup(&self);

    fn create_render_context(&self, api: RenderApi) -> Result<Box<dyn RenderContext>, i32>;
}
