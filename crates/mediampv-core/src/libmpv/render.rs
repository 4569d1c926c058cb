use std::ffi::{c_int, c_void, CString};
use std::ptr;
use std::sync::Arc;

use super::sys;
use super::RawHandle;
use crate::engine::{status, RenderApi, RenderContext, RenderTarget, RenderUpdate, UpdateCallback};

/// An `mpv_render_context` plus the callback registered with it.
pub(super) struct MpvRenderContext {
    ctx: *mut sys::mpv_render_context,
    /// Boxed again so mpv gets a thin pointer.
    _callback: Option<Box<UpdateCallback>>,
    _engine: Arc<RawHandle>,
}

// Render calls are serialized by the render mutex; mpv allows them from any
// thread as long as they do not overlap.
unsafe impl Send for MpvRenderContext {}

fn param(type_: c_int, data: *mut c_void) -> sys::mpv_render_param {
    sys::mpv_render_param { type_, data }
}

fn end() -> sys::mpv_render_param {
    param(sys::MPV_RENDER_PARAM_INVALID, ptr::null_mut())
}

unsafe extern "C" fn update_trampoline(cb_ctx: *mut c_void) {
    let callback = &*(cb_ctx as *const UpdateCallback);
    callback();
}

impl MpvRenderContext {
    pub(super) fn create(engine: &Arc<RawHandle>, api: RenderApi) -> Result<Self, i32> {
        let mut ctx: *mut sys::mpv_render_context = ptr::null_mut();

        let status = match api {
            RenderApi::Software => {
                let mut params = [
                    param(sys::MPV_RENDER_PARAM_API_TYPE, c"sw".as_ptr() as *mut c_void),
                    end(),
                ];
                unsafe {
                    sys::mpv_render_context_create(&mut ctx, engine.as_ptr(), params.as_mut_ptr())
                }
            }
            RenderApi::OpenGl {
                get_proc_address,
                context,
            } => {
                let mut init = sys::mpv_opengl_init_params {
                    get_proc_address: Some(get_proc_address),
                    get_proc_address_ctx: context,
                };
                let mut params = [
                    param(sys::MPV_RENDER_PARAM_API_TYPE, c"opengl".as_ptr() as *mut c_void),
                    param(
                        sys::MPV_RENDER_PARAM_OPENGL_INIT_PARAMS,
                        &mut init as *mut sys::mpv_opengl_init_params as *mut c_void,
                    ),
                    end(),
                ];
                unsafe {
                    sys::mpv_render_context_create(&mut ctx, engine.as_ptr(), params.as_mut_ptr())
                }
            }
        };

        if status < 0 || ctx.is_null() {
            tracing::error!("mpv_render_context_create failed: status {status}");
            return Err(if status < 0 { status } else { status::GENERIC });
        }
        Ok(Self {
            ctx,
            _callback: None,
            _engine: Arc::clone(engine),
        })
    }
}

impl RenderContext for MpvRenderContext {
    fn set_update_callback(&mut self, callback: UpdateCallback) {
        let callback = Box::new(callback);
        let cb_ctx = &*callback as *const UpdateCallback as *mut c_void;
        unsafe {
            sys::mpv_render_context_set_update_callback(self.ctx, Some(update_trampoline), cb_ctx)
        };
        // The previous callback is unreachable from mpv once the call returns.
        self._callback = Some(callback);
    }

    fn update(&mut self) -> RenderUpdate {
        RenderUpdate(unsafe { sys::mpv_render_context_update(self.ctx) })
    }

    fn render(&mut self, target: RenderTarget<'_>) -> i32 {
        match target {
            RenderTarget::Software {
                width,
                height,
                stride,
                format,
                pixels,
            } => {
                let (Ok(w), Ok(h)) = (c_int::try_from(width), c_int::try_from(height)) else {
                    return status::INVALID_PARAMETER;
                };
                if pixels.len() < stride * height as usize {
                    return status::INVALID_PARAMETER;
                }
                let Ok(format) = CString::new(format) else {
                    return status::INVALID_PARAMETER;
                };
                let mut size: [c_int; 2] = [w, h];
                let mut stride = stride;
                let mut params = [
                    param(sys::MPV_RENDER_PARAM_SW_SIZE, size.as_mut_ptr() as *mut c_void),
                    param(sys::MPV_RENDER_PARAM_SW_FORMAT, format.as_ptr() as *mut c_void),
                    param(
                        sys::MPV_RENDER_PARAM_SW_STRIDE,
                        &mut stride as *mut usize as *mut c_void,
                    ),
                    param(
                        sys::MPV_RENDER_PARAM_SW_POINTER,
                        pixels.as_mut_ptr() as *mut c_void,
                    ),
                    end(),
                ];
                unsafe { sys::mpv_render_context_render(self.ctx, params.as_mut_ptr()) }
            }
            RenderTarget::Framebuffer {
                fbo,
                width,
                height,
                flip_y,
            } => {
                let (Ok(fbo), Ok(w), Ok(h)) = (
                    c_int::try_from(fbo),
                    c_int::try_from(width),
                    c_int::try_from(height),
                ) else {
                    return status::INVALID_PARAMETER;
                };
                let mut target = sys::mpv_opengl_fbo {
                    fbo,
                    w,
                    h,
                    internal_format: 0,
                };
                let mut flip: c_int = c_int::from(flip_y);
                let mut params = [
                    param(
                        sys::MPV_RENDER_PARAM_OPENGL_FBO,
                        &mut target as *mut sys::mpv_opengl_fbo as *mut c_void,
                    ),
                    param(
                        sys::MPV_RENDER_PARAM_FLIP_Y,
                        &mut flip as *mut c_int as *mut c_void,
                    ),
                    end(),
                ];
                unsafe { sys::mpv_render_context_render(self.ctx, params.as_mut_ptr()) }
            }
        }
    }

    fn report_swap(&mut self) {
        unsafe { sys::mpv_render_context_report_swap(self.ctx) }
    }
}

impl Drop for MpvRenderContext {
    fn drop(&mut self) {
        // Frees the context before the callback and the engine reference go.
        unsafe { sys::mpv_render_context_free(self.ctx) };
        tracing::debug!("mpv render context freed");
    }
}
