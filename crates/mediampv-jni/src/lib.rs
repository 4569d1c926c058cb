//! JNI entry points for the mediamp mpv backend.
//!
//! Exports the `external fun`s of `MPVHandleKt` (all platforms),
//! `MPVHandleAndroid` (Android) and `MPVHandleDesktop` (everything else),
//! plus `OffscreenGL` and `GLExt` on desktop builds with `opengl`.
//! Every function is callable from any Java thread.
//!
//! Conventions:
//! - A handle is a boxed [`MpvHandle`] passed around as `jlong`; unknown or
//!   finalized pointers are refused, never dereferenced.
//! - Nothing is thrown into the JVM. Failures are logged and reported as
//!   `false`, `0`, `0.0` or `null`.
//! - Panics are caught at the boundary.

pub mod call_targets;
pub mod diagnostics;
pub mod handle;
pub mod host;
pub mod logging;
pub mod marshal;
pub mod observer;
#[cfg(all(not(target_os = "android"), feature = "opengl"))]
pub mod offscreen;
pub mod safety;

use std::ptr;
use std::sync::Arc;

use jni::objects::{JClass, JObject, JObjectArray, JString};
use jni::sys::{jboolean, jdouble, jint, jlong, jstring, JNI_FALSE};
use jni::JNIEnv;

use mediampv_core::{EngineHandle, Format, HandleConfig, PropertyValue};

use crate::handle::{with_handle, MpvHandle};
use crate::host::JniHost;
use crate::marshal::{from_jboolean, get_string, jni_failure, to_jboolean};
use crate::observer::JniObserverBinder;
use crate::safety::{ffi_boundary, ffi_boundary_or};

#[cfg(feature = "libmpv")]
fn create_engine() -> Result<mediampv_core::libmpv::MpvEngine, i32> {
    mediampv_core::libmpv::MpvEngine::create()
}

#[cfg(not(feature = "libmpv"))]
fn create_engine() -> Result<mediampv_core::scripted::ScriptedEngine, i32> {
    tracing::error!("mediampv was built without libmpv, no engine available");
    Err(mediampv_core::engine::status::NOT_IMPLEMENTED)
}

// =========================================================================
// Lifecycle
// =========================================================================

/// Installs logging and acquires the `JavaVM`.
#[no_mangle]
pub extern "system" fn Java_org_openani_mediamp_mpv_MPVHandleKt_nGlobalInit(
    env: JNIEnv,
    _class: JClass,
) -> jboolean {
    logging::init();
    ffi_boundary("nGlobalInit", || host::acquire_vm(&env).map(|_| ()))
}

/// Creates an engine handle. Returns 0 if the `JavaVM` is unavailable; a
/// failed engine creation still yields a handle whose `nInitialize` fails.
#[no_mangle]
pub extern "system" fn Java_org_openani_mediamp_mpv_MPVHandleKt_nMake(
    env: JNIEnv,
    _class: JClass,
    _context: JObject,
) -> jlong {
    logging::init();
    ffi_boundary_or("nMake", 0, || {
        let vm = host::acquire_vm(&env)?;
        let core = EngineHandle::create(
            Arc::new(JniHost::new(vm)),
            HandleConfig::from_env(),
            create_engine,
        );
        Ok(MpvHandle::new(core).into_raw())
    })
}

#[no_mangle]
pub extern "system" fn Java_org_openani_mediamp_mpv_MPVHandleKt_nInitialize(
    _env: JNIEnv,
    _class: JClass,
    ptr: jlong,
) -> jboolean {
    ffi_boundary("nInitialize", || with_handle(ptr, |h| h.core().initialize()))
}

/// Replaces the event listener. `null` clears it.
#[no_mangle]
pub extern "system" fn Java_org_openani_mediamp_mpv_MPVHandleKt_nSetEventListener<'a>(
    mut env: JNIEnv<'a>,
    _class: JClass,
    ptr: jlong,
    listener: JObject<'a>,
) -> jboolean {
    ffi_boundary("nSetEventListener", || {
        with_handle(ptr, |h| {
            if listener.is_null() {
                h.core().clear_observer();
                return Ok(());
            }
            let vm = host::acquire_vm(&env)?;
            h.core().set_observer(JniObserverBinder {
                env: &mut env,
                vm,
                listener: &listener,
            })
        })
    })
}

#[no_mangle]
pub extern "system" fn Java_org_openani_mediamp_mpv_MPVHandleKt_nDestroy(
    _env: JNIEnv,
    _class: JClass,
    ptr: jlong,
) -> jboolean {
    ffi_boundary("nDestroy", || with_handle(ptr, destroy))
}

/// A texture still allocated through the render context is released with
/// the GL entry points it was created with.
#[cfg(feature = "opengl")]
fn destroy(h: &MpvHandle) -> Result<(), mediampv_core::BridgeError> {
    let textures = h.textures.lock().take();
    match textures {
        Some(textures) => h.core().destroy_releasing(&textures),
        None => h.core().destroy(),
    }
}

#[cfg(not(feature = "opengl"))]
fn destroy(h: &MpvHandle) -> Result<(), mediampv_core::BridgeError> {
    h.core().destroy()
}

/// Frees the handle. Runs the full teardown first if `nDestroy` was never
/// called.
#[no_mangle]
pub extern "system" fn Java_org_openani_mediamp_mpv_MPVHandleKt_nFinalize(
    _env: JNIEnv,
    _class: JClass,
    ptr: jlong,
) {
    ffi_boundary_or("nFinalize", (), || {
        if !handle::finalize(ptr) {
            tracing::warn!("nFinalize: unknown or already finalized handle {ptr:#x}");
        }
        Ok(())
    })
}

// =========================================================================
// Commands and options
// =========================================================================

#[no_mangle]
pub extern "system" fn Java_org_openani_mediamp_mpv_MPVHandleKt_nCommand(
    mut env: JNIEnv,
    _class: JClass,
    ptr: jlong,
    command: JObjectArray,
) -> jboolean {
    ffi_boundary("nCommand", || {
        with_handle(ptr, |h| {
            let limit = h.core().config().max_command_args;
            let args = marshal::string_array(&mut env, &command, limit)?;
            let args: Vec<&str> = args.iter().map(String::as_str).collect();
            h.core().command(&args)
        })
    })
}

#[no_mangle]
pub extern "system" fn Java_org_openani_mediamp_mpv_MPVHandleKt_nOption(
    mut env: JNIEnv,
    _class: JClass,
    ptr: jlong,
    key: JString,
    value: JString,
) -> jboolean {
    ffi_boundary("nOption", || {
        with_handle(ptr, |h| {
            let key = get_string(&mut env, &key, "option key")?;
            let value = get_string(&mut env, &value, "option value")?;
            h.core().set_option(&key, &value)
        })
    })
}

// =========================================================================
// Properties
// =========================================================================

fn get_property(
    env: &mut JNIEnv,
    ptr: jlong,
    name: &JString,
    format: Format,
) -> Result<PropertyValue, mediampv_core::BridgeError> {
    with_handle(ptr, |h| {
        let name = get_string(env, name, "property name")?;
        h.core().get_property(&name, format)
    })
}

fn set_property(
    env: &mut JNIEnv,
    ptr: jlong,
    name: &JString,
    value: PropertyValue,
) -> Result<(), mediampv_core::BridgeError> {
    with_handle(ptr, |h| {
        let name = get_string(env, name, "property name")?;
        h.core().set_property(&name, &value)
    })
}

/// Reads the property as int64; the Kotlin side takes the low 32 bits.
#[no_mangle]
pub extern "system" fn Java_org_openani_mediamp_mpv_MPVHandleKt_nGetPropertyInt(
    mut env: JNIEnv,
    _class: JClass,
    ptr: jlong,
    name: JString,
) -> jint {
    ffi_boundary_or("nGetPropertyInt", 0, || {
        let value = get_property(&mut env, ptr, &name, Format::Int64)?;
        Ok(value.as_int64().unwrap_or_default() as jint)
    })
}

#[no_mangle]
pub extern "system" fn Java_org_openani_mediamp_mpv_MPVHandleKt_nGetPropertyDouble(
    mut env: JNIEnv,
    _class: JClass,
    ptr: jlong,
    name: JString,
) -> jdouble {
    ffi_boundary_or("nGetPropertyDouble", 0.0, || {
        let value = get_property(&mut env, ptr, &name, Format::Double)?;
        Ok(value.as_double().unwrap_or_default())
    })
}

#[no_mangle]
pub extern "system" fn Java_org_openani_mediamp_mpv_MPVHandleKt_nGetPropertyBoolean(
    mut env: JNIEnv,
    _class: JClass,
    ptr: jlong,
    name: JString,
) -> jboolean {
    ffi_boundary_or("nGetPropertyBoolean", JNI_FALSE, || {
        let value = get_property(&mut env, ptr, &name, Format::Flag)?;
        Ok(to_jboolean(value.as_flag().unwrap_or_default()))
    })
}

/// Returns `null` if the property cannot be read.
#[no_mangle]
pub extern "system" fn Java_org_openani_mediamp_mpv_MPVHandleKt_nGetPropertyString(
    mut env: JNIEnv,
    _class: JClass,
    ptr: jlong,
    name: JString,
) -> jstring {
    ffi_boundary_or("nGetPropertyString", ptr::null_mut(), || {
        let value = get_property(&mut env, ptr, &name, Format::String)?;
        env.new_string(value.as_str().unwrap_or_default())
            .map(JString::into_raw)
            .map_err(|e| jni_failure(&mut env, "NewStringUTF", e))
    })
}

#[no_mangle]
pub extern "system" fn Java_org_openani_mediamp_mpv_MPVHandleKt_nSetPropertyInt(
    mut env: JNIEnv,
    _class: JClass,
    ptr: jlong,
    name: JString,
    value: jint,
) -> jboolean {
    ffi_boundary("nSetPropertyInt", || {
        set_property(&mut env, ptr, &name, PropertyValue::Int64(value.into()))
    })
}

#[no_mangle]
pub extern "system" fn Java_org_openani_mediamp_mpv_MPVHandleKt_nSetPropertyDouble(
    mut env: JNIEnv,
    _class: JClass,
    ptr: jlong,
    name: JString,
    value: jdouble,
) -> jboolean {
    ffi_boundary("nSetPropertyDouble", || {
        set_property(&mut env, ptr, &name, PropertyValue::Double(value))
    })
}

#[no_mangle]
pub extern "system" fn Java_org_openani_mediamp_mpv_MPVHandleKt_nSetPropertyBoolean(
    mut env: JNIEnv,
    _class: JClass,
    ptr: jlong,
    name: JString,
    value: jboolean,
) -> jboolean {
    ffi_boundary("nSetPropertyBoolean", || {
        set_property(&mut env, ptr, &name, PropertyValue::Flag(from_jboolean(value)))
    })
}

#[no_mangle]
pub extern "system" fn Java_org_openani_mediamp_mpv_MPVHandleKt_nSetPropertyString(
    mut env: JNIEnv,
    _class: JClass,
    ptr: jlong,
    name: JString,
    value: JString,
) -> jboolean {
    ffi_boundary("nSetPropertyString", || {
        let value = get_string(&mut env, &value, "property value")?;
        set_property(&mut env, ptr, &name, PropertyValue::String(value))
    })
}

/// `reply_data` is the token delivered with each change; `format` uses the
/// engine's format numbering.
#[no_mangle]
pub extern "system" fn Java_org_openani_mediamp_mpv_MPVHandleKt_nObserveProperty(
    mut env: JNIEnv,
    _class: JClass,
    ptr: jlong,
    name: JString,
    format: jint,
    reply_data: jlong,
) -> jboolean {
    ffi_boundary("nObserveProperty", || {
        with_handle(ptr, |h| {
            let name = get_string(&mut env, &name, "property name")?;
            let format = marshal::format_from_raw(format)?;
            h.core().observe_property(&name, format, reply_data as u64)
        })
    })
}

#[no_mangle]
pub extern "system" fn Java_org_openani_mediamp_mpv_MPVHandleKt_nUnobserveProperty(
    _env: JNIEnv,
    _class: JClass,
    ptr: jlong,
    reply_data: jlong,
) -> jboolean {
    ffi_boundary("nUnobserveProperty", || {
        with_handle(ptr, |h| h.core().unobserve_property(reply_data as u64))
    })
}

// =========================================================================
// Android surface
// =========================================================================

/// Renders into an `android.view.Surface`. The surface's global reference
/// doubles as the `wid` and is held until detach.
#[cfg(target_os = "android")]
#[no_mangle]
pub extern "system" fn Java_org_openani_mediamp_mpv_MPVHandleAndroid_nAttachAndroidSurface(
    mut env: JNIEnv,
    _class: JClass,
    ptr: jlong,
    surface: JObject,
) -> jboolean {
    use crate::call_targets::{SurfaceClass, SURFACE_TARGETS};
    use mediampv_core::BridgeError;

    ffi_boundary("nAttachAndroidSurface", || {
        with_handle(ptr, |h| {
            if surface.is_null() {
                return Err(BridgeError::Validation("surface is null".into()));
            }
            let target =
                call_targets::resolve(&SURFACE_TARGETS, &mut env, SurfaceClass::AndroidSurface)?;
            if !target.is_instance(&mut env, &surface)? {
                return Err(BridgeError::Validation(
                    "surface is not an android.view.Surface".into(),
                ));
            }
            let surface = env
                .new_global_ref(&surface)
                .map_err(|e| jni_failure(&mut env, "NewGlobalRef", e))?;
            let wid = surface.as_obj().as_raw() as i64;
            h.core().attach_surface(wid, Box::new(surface))
        })
    })
}

#[cfg(target_os = "android")]
#[no_mangle]
pub extern "system" fn Java_org_openani_mediamp_mpv_MPVHandleAndroid_nDetachAndroidSurface(
    _env: JNIEnv,
    _class: JClass,
    ptr: jlong,
) -> jboolean {
    ffi_boundary("nDetachAndroidSurface", || {
        with_handle(ptr, |h| h.core().detach_surface())
    })
}

// =========================================================================
// Desktop buffer renderer and render context
// =========================================================================

/// Starts software rendering; frames go to `renderer.onFrame` on the render
/// thread.
#[cfg(not(target_os = "android"))]
#[no_mangle]
pub extern "system" fn Java_org_openani_mediamp_mpv_MPVHandleDesktop_nAttachDesktopBufferRenderer(
    mut env: JNIEnv,
    _class: JClass,
    ptr: jlong,
    renderer: JObject,
) -> jboolean {
    ffi_boundary("nAttachDesktopBufferRenderer", || {
        with_handle(ptr, |h| {
            let vm = host::acquire_vm(&env)?;
            let consumer = observer::JniFrameConsumer::bind(&mut env, vm, &renderer)?;
            h.core().attach_buffer_renderer(consumer)
        })
    })
}

#[cfg(not(target_os = "android"))]
#[no_mangle]
pub extern "system" fn Java_org_openani_mediamp_mpv_MPVHandleDesktop_nDetachDesktopBufferRenderer(
    _env: JNIEnv,
    _class: JClass,
    ptr: jlong,
) -> jboolean {
    ffi_boundary("nDetachDesktopBufferRenderer", || {
        with_handle(ptr, |h| h.core().detach_buffer_renderer())
    })
}

/// Creates the OpenGL render context. `device_ptr` is the address of the
/// native `get_proc_address` loader and `context_ptr` its context argument.
/// The GL context must be current on the calling thread.
#[cfg(not(target_os = "android"))]
#[no_mangle]
pub extern "system" fn Java_org_openani_mediamp_mpv_MPVHandleDesktop_nCreateRenderContext(
    _env: JNIEnv,
    _class: JClass,
    ptr: jlong,
    device_ptr: jlong,
    context_ptr: jlong,
) -> jboolean {
    ffi_boundary("nCreateRenderContext", || {
        with_handle(ptr, |h| {
            let get_proc_address = marshal::proc_address_fn(device_ptr)?;
            let proc_context = context_ptr as *mut std::ffi::c_void;
            // SAFETY: the Kotlin side keeps the loader and its GL context
            // alive, and current for every hardware-mode call, until
            // nDestroyRenderContext.
            unsafe { h.core().create_render_context(get_proc_address, proc_context) }?;

            #[cfg(feature = "opengl")]
            {
                let textures = unsafe {
                    mediampv_core::gl::GlowTextureAllocator::from_loader(
                        get_proc_address,
                        proc_context,
                    )
                };
                *h.textures.lock() = Some(textures);
            }
            Ok(())
        })
    })
}

#[cfg(not(target_os = "android"))]
#[no_mangle]
pub extern "system" fn Java_org_openani_mediamp_mpv_MPVHandleDesktop_nDestroyRenderContext(
    _env: JNIEnv,
    _class: JClass,
    ptr: jlong,
) -> jboolean {
    ffi_boundary("nDestroyRenderContext", || {
        with_handle(ptr, |h| {
            #[cfg(feature = "opengl")]
            if let Some(textures) = h.textures.lock().take() {
                h.core().release_texture(&textures)?;
            }
            h.core().destroy_render_context()
        })
    })
}

/// (Re)creates the texture the render context draws into. Returns the GL
/// texture id, 0 on failure.
#[cfg(not(target_os = "android"))]
#[no_mangle]
pub extern "system" fn Java_org_openani_mediamp_mpv_MPVHandleDesktop_nCreateTexture(
    _env: JNIEnv,
    _class: JClass,
    ptr: jlong,
    width: jint,
    height: jint,
) -> jint {
    ffi_boundary_or("nCreateTexture", 0, || {
        with_handle(ptr, |h| {
            let (width, height) = marshal::texture_size(width, height)?;
            let texture = create_texture(h, width, height)?;
            jint::try_from(texture).map_err(|_| {
                mediampv_core::BridgeError::Graphics(format!("texture id {texture} exceeds jint"))
            })
        })
    })
}

#[cfg(all(not(target_os = "android"), feature = "opengl"))]
fn create_texture(
    h: &MpvHandle,
    width: u32,
    height: u32,
) -> Result<u32, mediampv_core::BridgeError> {
    let textures = h.textures.lock();
    let Some(allocator) = textures.as_ref() else {
        return Err(mediampv_core::BridgeError::Validation(
            "no hardware render context".into(),
        ));
    };
    h.core().create_texture(allocator, width, height)
}

#[cfg(all(not(target_os = "android"), not(feature = "opengl")))]
fn create_texture(
    _h: &MpvHandle,
    width: u32,
    height: u32,
) -> Result<u32, mediampv_core::BridgeError> {
    Err(mediampv_core::BridgeError::Graphics(format!(
        "cannot allocate {width}x{height} texture: built without OpenGL support"
    )))
}

#[cfg(not(target_os = "android"))]
#[no_mangle]
pub extern "system" fn Java_org_openani_mediamp_mpv_MPVHandleDesktop_nReleaseTexture(
    _env: JNIEnv,
    _class: JClass,
    ptr: jlong,
) -> jboolean {
    ffi_boundary("nReleaseTexture", || with_handle(ptr, release_texture))
}

#[cfg(all(not(target_os = "android"), feature = "opengl"))]
fn release_texture(h: &MpvHandle) -> Result<(), mediampv_core::BridgeError> {
    match h.textures.lock().as_ref() {
        Some(allocator) => h.core().release_texture(allocator),
        None => Err(mediampv_core::BridgeError::Validation(
            "no hardware render context".into(),
        )),
    }
}

#[cfg(all(not(target_os = "android"), not(feature = "opengl")))]
fn release_texture(_h: &MpvHandle) -> Result<(), mediampv_core::BridgeError> {
    Err(mediampv_core::BridgeError::Graphics(
        "built without OpenGL support".into(),
    ))
}

/// Renders the pending frame into the texture on the calling thread.
/// Returns `true` only if a frame was rendered.
#[cfg(not(target_os = "android"))]
#[no_mangle]
pub extern "system" fn Java_org_openani_mediamp_mpv_MPVHandleDesktop_nRenderFrameToTexture(
    _env: JNIEnv,
    _class: JClass,
    ptr: jlong,
) -> jboolean {
    ffi_boundary_or("nRenderFrameToTexture", JNI_FALSE, || {
        with_handle(ptr, |h| h.core().render_frame_to_texture().map(to_jboolean))
    })
}

// =========================================================================
// Offscreen GL targets
// =========================================================================

/// Allocates an offscreen texture+framebuffer in the current GL context.
/// Returns its id, 0 on failure.
#[cfg(all(not(target_os = "android"), feature = "opengl"))]
#[no_mangle]
pub extern "system" fn Java_org_openani_mediamp_mpv_OffscreenGL_createTextureFbo(
    _env: JNIEnv,
    _class: JClass,
    width: jint,
    height: jint,
) -> jlong {
    ffi_boundary_or("createTextureFbo", 0, || {
        let (width, height) = marshal::texture_size(width, height)?;
        offscreen::create_target(width, height)
    })
}

/// Framebuffer id of an offscreen target, 0 if the id is unknown.
#[cfg(all(not(target_os = "android"), feature = "opengl"))]
#[no_mangle]
pub extern "system" fn Java_org_openani_mediamp_mpv_OffscreenGL_getFboId(
    _env: JNIEnv,
    _class: JClass,
    target: jlong,
) -> jint {
    ffi_boundary_or("getFboId", 0, || {
        let fbo = offscreen::fbo_id(target)?;
        jint::try_from(fbo).map_err(|_| {
            mediampv_core::BridgeError::Graphics(format!("framebuffer id {fbo} exceeds jint"))
        })
    })
}

#[cfg(all(not(target_os = "android"), feature = "opengl"))]
#[no_mangle]
pub extern "system" fn Java_org_openani_mediamp_mpv_OffscreenGL_disposeTextureFbo(
    _env: JNIEnv,
    _class: JClass,
    target: jlong,
) {
    ffi_boundary_or("disposeTextureFbo", (), || offscreen::dispose_target(target))
}

#[cfg(all(not(target_os = "android"), feature = "opengl"))]
#[no_mangle]
pub extern "system" fn Java_org_openani_mediamp_mpv_GLExt_glViewport(
    _env: JNIEnv,
    _class: JClass,
    x: jint,
    y: jint,
    width: jint,
    height: jint,
) {
    ffi_boundary_or("glViewport", (), || {
        offscreen::viewport(x, y, width, height);
        Ok(())
    })
}
