//! `glow`-backed [`TextureAllocator`].

use std::ffi::{c_char, c_void, CStr, CString};
use std::num::NonZeroU32;

use glow::HasContext;

use crate::engine::GetProcAddressFn;
use crate::error::BridgeError;
use crate::render_pump::RenderBuffer;
use crate::surface::TextureAllocator;

/// Allocates RGBA8 textures with a framebuffer attached, the format the
/// engine's OpenGL renderer draws into.
pub struct GlowTextureAllocator {
    gl: glow::Context,
}

impl GlowTextureAllocator {
    pub fn new(gl: glow::Context) -> Self {
        Self { gl }
    }

    /// Loads GL entry points through the same loader handed to the engine.
    ///
    /// # Safety
    ///
    /// `get_proc_address` must be a valid loader for the GL context current
    /// on the calling thread, and `proc_context` whatever it expects.
    pub unsafe fn from_loader(get_proc_address: GetProcAddressFn, proc_context: *mut c_void) -> Self {
        let gl = glow::Context::from_loader_function(|name| match CString::new(name) {
            Ok(name) => get_proc_address(proc_context, name.as_ptr()) as *const c_void,
            Err(_) => std::ptr::null(),
        });
        Self { gl }
    }

    /// Loads GL entry points for the context current on the calling thread
    /// from the GL library the host process already loaded.
    ///
    /// # Safety
    ///
    /// A GL context must be current on the calling thread, and every later
    /// call must be made with a context sharing its function table.
    pub unsafe fn from_current_context() -> Self {
        let gl = glow::Context::from_loader_function(|name| match CString::new(name) {
            Ok(name) => lookup_current_gl(&name),
            Err(_) => std::ptr::null(),
        });
        Self { gl }
    }

    /// Sets the viewport of the current context.
    pub fn viewport(&self, x: i32, y: i32, width: i32, height: i32) {
        unsafe { self.gl.viewport(x, y, width, height) };
    }
}

#[cfg(windows)]
unsafe fn lookup_current_gl(name: &CStr) -> *const c_void {
    #[link(name = "opengl32")]
    extern "system" {
        fn wglGetProcAddress(name: *const c_char) -> *const c_void;
    }
    extern "system" {
        fn GetModuleHandleA(name: *const c_char) -> *mut c_void;
        fn GetProcAddress(module: *mut c_void, name: *const c_char) -> *const c_void;
    }

    // Extension entry points; 1.1 functions only live in the module itself.
    let ptr = wglGetProcAddress(name.as_ptr());
    if !matches!(ptr as isize, -1..=3) {
        return ptr;
    }
    let module = GetModuleHandleA(c"opengl32.dll".as_ptr());
    if module.is_null() {
        return std::ptr::null();
    }
    GetProcAddress(module, name.as_ptr())
}

#[cfg(not(windows))]
unsafe fn lookup_current_gl(name: &CStr) -> *const c_void {
    #[cfg_attr(target_os = "linux", link(name = "dl"))]
    extern "C" {
        fn dlsym(handle: *mut c_void, symbol: *const c_char) -> *const c_void;
    }

    #[cfg(target_vendor = "apple")]
    let default_scope = -2isize as *mut c_void;
    #[cfg(not(target_vendor = "apple"))]
    let default_scope = std::ptr::null_mut();

    // Searches every shared object loaded into the process.
    dlsym(default_scope, name.as_ptr())
}

impl TextureAllocator for GlowTextureAllocator {
    fn allocate(&self, width: u32, height: u32) -> Result<RenderBuffer, BridgeError> {
        let gl = &self.gl;
        let (Ok(w), Ok(h)) = (i32::try_from(width), i32::try_from(height)) else {
            return Err(BridgeError::Graphics(format!(
                "texture size {width}x{height} out of range"
            )));
        };

        unsafe {
            let texture = gl
                .create_texture()
                .map_err(|e| BridgeError::Graphics(format!("failed to create texture: {e}")))?;
            gl.bind_texture(glow::TEXTURE_2D, Some(texture));
            gl.tex_image_2d(
                glow::TEXTURE_2D,
                0,
                glow::RGBA8 as i32,
                w,
                h,
                0,
                glow::RGBA,
                glow::UNSIGNED_BYTE,
                glow::PixelUnpackData::Slice(None),
            );
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MIN_FILTER, glow::LINEAR as i32);
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MAG_FILTER, glow::LINEAR as i32);

            let fbo = match gl.create_framebuffer() {
                Ok(fbo) => fbo,
                Err(e) => {
                    gl.bind_texture(glow::TEXTURE_2D, None);
                    gl.delete_texture(texture);
                    return Err(BridgeError::Graphics(format!(
                        "failed to create framebuffer: {e}"
                    )));
                }
            };
            gl.bind_framebuffer(glow::FRAMEBUFFER, Some(fbo));
            gl.framebuffer_texture_2d(
                glow::FRAMEBUFFER,
                glow::COLOR_ATTACHMENT0,
                glow::TEXTURE_2D,
                Some(texture),
                0,
            );
            let complete = gl.check_framebuffer_status(glow::FRAMEBUFFER) == glow::FRAMEBUFFER_COMPLETE;
            gl.bind_framebuffer(glow::FRAMEBUFFER, None);
            gl.bind_texture(glow::TEXTURE_2D, None);

            if !complete {
                gl.delete_framebuffer(fbo);
                gl.delete_texture(texture);
                return Err(BridgeError::Graphics("framebuffer incomplete".into()));
            }

            Ok(RenderBuffer {
                texture: texture.0.get(),
                fbo: fbo.0.get(),
                width,
                height,
            })
        }
    }

    fn release(&self, buffer: RenderBuffer) {
        unsafe {
            if let Some(fbo) = NonZeroU32::new(buffer.fbo) {
                self.gl.delete_framebuffer(glow::NativeFramebuffer(fbo));
            }
            if let Some(texture) = NonZeroU32::new(buffer.texture) {
                self.gl.delete_texture(glow::NativeTexture(texture));
            }
        }
    }
}
