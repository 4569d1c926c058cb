//! [`Engine`] backed by the system libmpv.
//!
//! Every string crossing into mpv is converted to a `CString` for the
//! duration of the call; everything mpv hands back is copied into owned Rust
//! values before the next `mpv_wait_event`, which invalidates event memory.

mod render;
pub mod sys;

use std::ffi::{c_char, c_int, c_void, CStr, CString};
use std::ptr;
use std::sync::Arc;

use crate::engine::{
    status, Engine, EngineEvent, Format, LogMessage, PropertyPayload, PropertyValue, RenderApi,
    RenderContext,
};

use self::render::MpvRenderContext;

/// Owned `mpv_handle`; terminated and freed on drop.
pub(crate) struct RawHandle(*mut sys::mpv_handle);

// The client API is thread-safe; only `mpv_wait_event` is restricted to one
// thread at a time, which the event pump guarantees.
unsafe impl Send for RawHandle {}
unsafe impl Sync for RawHandle {}

impl RawHandle {
    pub(crate) fn as_ptr(&self) -> *mut sys::mpv_handle {
        self.0
    }
}

impl Drop for RawHandle {
    fn drop(&mut self) {
        unsafe { sys::mpv_terminate_destroy(self.0) };
        tracing::debug!("mpv instance terminated");
    }
}

/// A libmpv instance.
///
/// Render contexts keep the instance alive; it is terminated once the engine
/// and every render context created from it are dropped.
pub struct MpvEngine {
    raw: Arc<RawHandle>,
}

impl MpvEngine {
    /// `mpv_create`. Fails with [`status::NOMEM`] if mpv returns null.
    pub fn create() -> Result<Self, i32> {
        let handle = unsafe { sys::mpv_create() };
        if handle.is_null() {
            return Err(status::NOMEM);
        }
        Ok(Self {
            raw: Arc::new(RawHandle(handle)),
        })
    }

    fn ptr(&self) -> *mut sys::mpv_handle {
        self.raw.as_ptr()
    }
}

fn to_cstring(value: &str) -> Result<CString, i32> {
    CString::new(value).map_err(|_| status::INVALID_PARAMETER)
}

/// Copies a C string owned by mpv. Null becomes an empty string.
unsafe fn copy_cstr(ptr: *const c_char) -> String {
    if ptr.is_null() {
        String::new()
    } else {
        CStr::from_ptr(ptr).to_string_lossy().into_owned()
    }
}

/// Calls `f` with the mpv format code and a pointer to `value` in mpv's
/// in-memory representation.
fn with_raw_value<R>(
    value: &PropertyValue,
    f: impl FnOnce(c_int, *mut c_void) -> R,
) -> Result<R, i32> {
    Ok(match value {
        PropertyValue::None => f(Format::None.as_raw(), ptr::null_mut()),
        PropertyValue::Flag(v) => {
            let mut raw = c_int::from(*v);
            f(Format::Flag.as_raw(), &mut raw as *mut c_int as *mut c_void)
        }
        PropertyValue::Int64(v) => {
            let mut raw = *v;
            f(Format::Int64.as_raw(), &mut raw as *mut i64 as *mut c_void)
        }
        PropertyValue::Double(v) => {
            let mut raw = *v;
            f(Format::Double.as_raw(), &mut raw as *mut f64 as *mut c_void)
        }
        PropertyValue::String(v) => {
            let string = to_cstring(v)?;
            let mut raw = string.as_ptr();
            f(
                Format::String.as_raw(),
                &mut raw as *mut *const c_char as *mut c_void,
            )
        }
    })
}

impl Engine for MpvEngine {
    fn initialize(&self) -> i32 {
        unsafe { sys::mpv_initialize(self.ptr()) }
    }

    fn request_log_messages(&self, min_level: &str) -> i32 {
        match to_cstring(min_level) {
            Ok(level) => unsafe { sys::mpv_request_log_messages(self.ptr(), level.as_ptr()) },
            Err(status) => status,
        }
    }

    fn set_option_string(&self, key: &str, value: &str) -> i32 {
        let (key, value) = match (to_cstring(key), to_cstring(value)) {
            (Ok(key), Ok(value)) => (key, value),
            _ => return status::INVALID_PARAMETER,
        };
        unsafe { sys::mpv_set_option_string(self.ptr(), key.as_ptr(), value.as_ptr()) }
    }

    fn set_option(&self, name: &str, value: &PropertyValue) -> i32 {
        let name = match to_cstring(name) {
            Ok(name) => name,
            Err(status) => return status,
        };
        with_raw_value(value, |format, data| unsafe {
            sys::mpv_set_option(self.ptr(), name.as_ptr(), format, data)
        })
        .unwrap_or_else(|status| status)
    }

    fn command(&self, args: &[&str]) -> i32 {
        let owned: Result<Vec<CString>, i32> = args.iter().map(|arg| to_cstring(arg)).collect();
        let owned = match owned {
            Ok(owned) => owned,
            Err(status) => return status,
        };
        let mut argv: Vec<*const c_char> = owned.iter().map(|arg| arg.as_ptr()).collect();
        argv.push(ptr::null());
        unsafe { sys::mpv_command(self.ptr(), argv.as_mut_ptr()) }
    }

    fn get_property(&self, name: &str, format: Format) -> Result<PropertyValue, i32> {
        let name = to_cstring(name)?;
        let get = |data: *mut c_void| unsafe {
            let status = sys::mpv_get_property(self.ptr(), name.as_ptr(), format.as_raw(), data);
            if status < 0 {
                Err(status)
            } else {
                Ok(())
            }
        };

        match format {
            Format::None => get(ptr::null_mut()).map(|()| PropertyValue::None),
            Format::Flag => {
                let mut raw: c_int = 0;
                get(&mut raw as *mut c_int as *mut c_void)?;
                Ok(PropertyValue::Flag(raw != 0))
            }
            Format::Int64 => {
                let mut raw: i64 = 0;
                get(&mut raw as *mut i64 as *mut c_void)?;
                Ok(PropertyValue::Int64(raw))
            }
            Format::Double => {
                let mut raw: f64 = 0.0;
                get(&mut raw as *mut f64 as *mut c_void)?;
                Ok(PropertyValue::Double(raw))
            }
            Format::String | Format::OsdString => {
                let mut raw: *mut c_char = ptr::null_mut();
                get(&mut raw as *mut *mut c_char as *mut c_void)?;
                let value = unsafe { copy_cstr(raw) };
                unsafe { sys::mpv_free(raw as *mut c_void) };
                Ok(PropertyValue::String(value))
            }
            Format::Node | Format::NodeArray | Format::NodeMap | Format::ByteArray => {
                Err(status::PROPERTY_FORMAT)
            }
        }
    }

    fn set_property(&self, name: &str, value: &PropertyValue) -> i32 {
        let name = match to_cstring(name) {
            Ok(name) => name,
            Err(status) => return status,
        };
        with_raw_value(value, |format, data| unsafe {
            sys::mpv_set_property(self.ptr(), name.as_ptr(), format, data)
        })
        .unwrap_or_else(|status| status)
    }

    fn observe_property(&self, token: u64, name: &str, format: Format) -> i32 {
        match to_cstring(name) {
            Ok(name) => unsafe {
                sys::mpv_observe_property(self.ptr(), token, name.as_ptr(), format.as_raw())
            },
            Err(status) => status,
        }
    }

    fn unobserve_property(&self, token: u64) -> i32 {
        unsafe { sys::mpv_unobserve_property(self.ptr(), token) }
    }

    fn wait_event(&self, timeout: f64) -> EngineEvent {
        let event = unsafe { sys::mpv_wait_event(self.ptr(), timeout) };
        if event.is_null() {
            return EngineEvent::None;
        }
        unsafe { convert_event(&*event) }
    }

    fn wakeup(&self) {
        unsafe { sys::mpv_wakeup(self.ptr()) }
    }

    fn create_render_context(&self, api: RenderApi) -> Result<Box<dyn RenderContext>, i32> {
        let context = MpvRenderContext::create(&self.raw, api)?;
        Ok(Box::new(context))
    }
}

/// Copies an mpv event into an owned [`EngineEvent`].
unsafe fn convert_event(event: &sys::mpv_event) -> EngineEvent {
    match event.event_id {
        sys::MPV_EVENT_NONE => EngineEvent::None,
        sys::MPV_EVENT_SHUTDOWN => EngineEvent::Shutdown,
        sys::MPV_EVENT_LOG_MESSAGE if !event.data.is_null() => {
            let message = &*(event.data as *const sys::mpv_event_log_message);
            EngineEvent::LogMessage(LogMessage {
                prefix: copy_cstr(message.prefix),
                level: copy_cstr(message.level),
                text: copy_cstr(message.text),
            })
        }
        sys::MPV_EVENT_PROPERTY_CHANGE if !event.data.is_null() => {
            let property = &*(event.data as *const sys::mpv_event_property);
            EngineEvent::PropertyChange {
                name: copy_cstr(property.name),
                token: event.reply_userdata,
                payload: convert_payload(property),
            }
        }
        id => EngineEvent::Other { id },
    }
}

unsafe fn convert_payload(property: &sys::mpv_event_property) -> PropertyPayload {
    let data = property.data;
    match Format::from_raw(property.format) {
        Some(Format::None) => PropertyPayload::None,
        _ if data.is_null() => PropertyPayload::None,
        Some(Format::Flag) => PropertyPayload::Flag(*(data as *const c_int) != 0),
        Some(Format::Int64) => PropertyPayload::Int64(*(data as *const i64)),
        Some(Format::Double) => PropertyPayload::Double(*(data as *const f64)),
        Some(Format::String | Format::OsdString) => {
            PropertyPayload::String(copy_cstr(*(data as *const *const c_char)))
        }
        _ => PropertyPayload::Unsupported(property.format),
    }
}
