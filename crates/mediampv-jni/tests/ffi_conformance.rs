//! FFI conformance tests for the mediampv JNI library.
//!
//! The exported functions need a live `JNIEnv`, so these tests exercise the
//! layer underneath them: the handle registry, `with_handle`/`finalize` and
//! the boundary wrappers. Handles are backed by the scripted engine.

use std::sync::Arc;

use jni::objects::{JClass, JObject, JObjectArray, JString};
use jni::sys::{jboolean, jdouble, jint, jlong, jstring, JNI_FALSE, JNI_TRUE};
use jni::JNIEnv;
use mediampv::diagnostics;
use mediampv::handle::{self, with_handle, MpvHandle};
use mediampv::safety::{ffi_boundary, ffi_boundary_or};
use mediampv_core::host::NativeHost;
use mediampv_core::scripted::{ScriptedController, ScriptedEngine};
use mediampv_core::{BridgeError, EngineHandle, ErrorCode, HandleConfig, PropertyValue};

fn make_handle() -> (i64, ScriptedController) {
    let (engine, controller) = ScriptedEngine::new();
    let core = EngineHandle::create(Arc::new(NativeHost), HandleConfig::default(), move || {
        Ok::<_, i32>(engine)
    });
    (MpvHandle::new(core).into_raw(), controller)
}

// =========================================================================
// Lifecycle tests
// =========================================================================

#[test]
fn make_initialize_finalize() {
    let (ptr, controller) = make_handle();
    assert_ne!(ptr, 0);
    assert!(diagnostics::is_live_handle(ptr as *const u8));

    let result = with_handle(ptr, |h| h.core().initialize());
    assert_eq!(result, Ok(()));
    assert!(controller.is_initialized());

    assert!(handle::finalize(ptr));
    assert!(!diagnostics::is_live_handle(ptr as *const u8));
    assert!(controller.is_terminated());
}

#[test]
fn finalize_runs_destroy_when_skipped() {
    let (ptr, controller) = make_handle();
    with_handle(ptr, |h| h.core().initialize()).unwrap();
    assert!(!controller.is_terminated());

    assert!(handle::finalize(ptr));
    assert!(controller.is_terminated());
}

#[test]
fn destroy_then_finalize() {
    let (ptr, controller) = make_handle();
    with_handle(ptr, |h| h.core().initialize()).unwrap();
    with_handle(ptr, |h| h.core().destroy()).unwrap();
    assert!(controller.is_terminated());

    // Destroyed handles stay addressable until finalize.
    let again = with_handle(ptr, |h| h.core().destroy());
    assert!(matches!(again, Err(BridgeError::NotInitialized { .. })));
    assert!(handle::finalize(ptr));
}

#[test]
fn double_finalize_is_refused() {
    let (ptr, _controller) = make_handle();
    assert!(handle::finalize(ptr));
    assert!(!handle::finalize(ptr));
}

#[test]
fn properties_through_handle() {
    let (ptr, _controller) = make_handle();
    with_handle(ptr, |h| {
        h.core().initialize()?;
        h.core().set_property("volume", &PropertyValue::Int64(70))
    })
    .unwrap();

    let volume = ffi_boundary_or("nGetPropertyInt", 0, || {
        with_handle(ptr, |h| {
            let value = h.core().get_property("volume", mediampv_core::Format::Int64)?;
            Ok(value.as_int64().unwrap_or_default() as i32)
        })
    });
    assert_eq!(volume, 70);
    assert!(handle::finalize(ptr));
}

// =========================================================================
// NULL and stale pointer tests
// =========================================================================

#[test]
fn null_handle_is_rejected() {
    let result = with_handle(0, |_| Ok(()));
    assert!(matches!(result, Err(BridgeError::Validation(_))));
    assert!(!handle::finalize(0));
}

#[test]
fn unknown_handle_is_rejected() {
    let bogus = Box::new(0u64);
    let ptr = &*bogus as *const u64 as i64;
    let result = with_handle(ptr, |_| Ok(()));
    assert!(matches!(result, Err(BridgeError::Validation(_))));
    assert!(!handle::finalize(ptr));
}

#[test]
fn finalized_handle_is_rejected() {
    let (ptr, _controller) = make_handle();
    assert!(handle::finalize(ptr));

    let mut called = false;
    let result = with_handle(ptr, |_| {
        called = true;
        Ok(())
    });
    assert!(matches!(result, Err(BridgeError::Validation(_))));
    assert!(!called);
}

#[test]
fn handles_are_independent() {
    let (first, first_controller) = make_handle();
    let (second, second_controller) = make_handle();
    assert_ne!(first, second);

    with_handle(first, |h| h.core().initialize()).unwrap();
    with_handle(second, |h| h.core().initialize()).unwrap();
    assert!(handle::finalize(first));

    assert!(first_controller.is_terminated());
    assert!(!second_controller.is_terminated());
    assert_eq!(with_handle(second, |h| h.core().command(&["stop"])), Ok(()));
    assert!(handle::finalize(second));
}

// =========================================================================
// Boundary tests
// =========================================================================

#[test]
fn boundary_maps_results_to_jboolean() {
    assert_eq!(ffi_boundary("ok", || Ok(())), JNI_TRUE);
    assert_eq!(
        ffi_boundary("fail", || Err(BridgeError::Validation("bad".into()))),
        JNI_FALSE
    );
}

#[test]
fn boundary_catches_panic_on_stale_handle_path() {
    let (ptr, _controller) = make_handle();
    let result = ffi_boundary("panicking", || {
        with_handle(ptr, |_| -> Result<(), BridgeError> { panic!("entry point bug") })
    });
    assert_eq!(result, JNI_FALSE);

    // The handle survives a panicking entry point.
    assert_eq!(with_handle(ptr, |h| h.core().initialize()), Ok(()));
    assert!(handle::finalize(ptr));
}

#[test]
fn error_codes_are_distinct() {
    let codes = [
        ErrorCode::Ok,
        ErrorCode::NotInitialized,
        ErrorCode::Engine,
        ErrorCode::Thread,
        ErrorCode::Validation,
        ErrorCode::ArgumentLimit,
        ErrorCode::OutputBusy,
        ErrorCode::RuntimeHost,
        ErrorCode::Internal,
        ErrorCode::Graphics,
    ];
    for (i, a) in codes.iter().enumerate() {
        for b in &codes[i + 1..] {
            assert_ne!(a.as_raw(), b.as_raw(), "{a:?} and {b:?} share a code");
        }
    }
}

#[cfg(debug_assertions)]
#[test]
fn metrics_count_handles() {
    let before = diagnostics::snapshot();
    let (ptr, _controller) = make_handle();
    assert!(handle::finalize(ptr));
    let after = diagnostics::snapshot();

    assert!(after.handles_created > before.handles_created);
    assert!(after.handles_finalized > before.handles_finalized);
    assert!(after.handles_peak >= 1);
}

// =========================================================================
// Exported symbols
// =========================================================================

type HandleOp = extern "system" fn(JNIEnv, JClass, jlong) -> jboolean;
type NamedGet<T> = extern "system" fn(JNIEnv, JClass, jlong, JString) -> T;
type NamedSet<T> = extern "system" fn(JNIEnv, JClass, jlong, JString, T) -> jboolean;

/// Coerces an export to its JNI signature and records its name.
macro_rules! export {
    ($name:ident: $ty:ty) => {{
        let f: $ty = mediampv::$name;
        (stringify!($name), f as usize)
    }};
}

#[test]
fn exports_match_kotlin_declarations() {
    let mut exports = vec![
        export!(Java_org_openani_mediamp_mpv_MPVHandleKt_nGlobalInit:
            extern "system" fn(JNIEnv, JClass) -> jboolean),
        export!(Java_org_openani_mediamp_mpv_MPVHandleKt_nMake:
            extern "system" fn(JNIEnv, JClass, JObject) -> jlong),
        export!(Java_org_openani_mediamp_mpv_MPVHandleKt_nInitialize: HandleOp),
        export!(Java_org_openani_mediamp_mpv_MPVHandleKt_nSetEventListener:
            extern "system" fn(JNIEnv, JClass, jlong, JObject) -> jboolean),
        export!(Java_org_openani_mediamp_mpv_MPVHandleKt_nDestroy: HandleOp),
        export!(Java_org_openani_mediamp_mpv_MPVHandleKt_nFinalize:
            extern "system" fn(JNIEnv, JClass, jlong)),
        export!(Java_org_openani_mediamp_mpv_MPVHandleKt_nCommand:
            extern "system" fn(JNIEnv, JClass, jlong, JObjectArray) -> jboolean),
        export!(Java_org_openani_mediamp_mpv_MPVHandleKt_nOption:
            extern "system" fn(JNIEnv, JClass, jlong, JString, JString) -> jboolean),
        export!(Java_org_openani_mediamp_mpv_MPVHandleKt_nGetPropertyInt: NamedGet<jint>),
        export!(Java_org_openani_mediamp_mpv_MPVHandleKt_nGetPropertyDouble: NamedGet<jdouble>),
        export!(Java_org_openani_mediamp_mpv_MPVHandleKt_nGetPropertyBoolean: NamedGet<jboolean>),
        export!(Java_org_openani_mediamp_mpv_MPVHandleKt_nGetPropertyString: NamedGet<jstring>),
        export!(Java_org_openani_mediamp_mpv_MPVHandleKt_nSetPropertyInt: NamedSet<jint>),
        export!(Java_org_openani_mediamp_mpv_MPVHandleKt_nSetPropertyDouble: NamedSet<jdouble>),
        export!(Java_org_openani_mediamp_mpv_MPVHandleKt_nSetPropertyBoolean: NamedSet<jboolean>),
        export!(Java_org_openani_mediamp_mpv_MPVHandleKt_nSetPropertyString: NamedSet<JString>),
        export!(Java_org_openani_mediamp_mpv_MPVHandleKt_nObserveProperty:
            extern "system" fn(JNIEnv, JClass, jlong, JString, jint, jlong) -> jboolean),
        export!(Java_org_openani_mediamp_mpv_MPVHandleKt_nUnobserveProperty:
            extern "system" fn(JNIEnv, JClass, jlong, jlong) -> jboolean),
    ];

    #[cfg(target_os = "android")]
    exports.extend([
        export!(Java_org_openani_mediamp_mpv_MPVHandleAndroid_nAttachAndroidSurface:
            extern "system" fn(JNIEnv, JClass, jlong, JObject) -> jboolean),
        export!(Java_org_openani_mediamp_mpv_MPVHandleAndroid_nDetachAndroidSurface: HandleOp),
    ]);

    #[cfg(not(target_os = "android"))]
    exports.extend([
        export!(Java_org_openani_mediamp_mpv_MPVHandleDesktop_nAttachDesktopBufferRenderer:
            extern "system" fn(JNIEnv, JClass, jlong, JObject) -> jboolean),
        export!(Java_org_openani_mediamp_mpv_MPVHandleDesktop_nDetachDesktopBufferRenderer: HandleOp),
        export!(Java_org_openani_mediamp_mpv_MPVHandleDesktop_nCreateRenderContext:
            extern "system" fn(JNIEnv, JClass, jlong, jlong, jlong) -> jboolean),
        export!(Java_org_openani_mediamp_mpv_MPVHandleDesktop_nDestroyRenderContext: HandleOp),
        export!(Java_org_openani_mediamp_mpv_MPVHandleDesktop_nCreateTexture:
            extern "system" fn(JNIEnv, JClass, jlong, jint, jint) -> jint),
        export!(Java_org_openani_mediamp_mpv_MPVHandleDesktop_nReleaseTexture: HandleOp),
        export!(Java_org_openani_mediamp_mpv_MPVHandleDesktop_nRenderFrameToTexture: HandleOp),
    ]);

    #[cfg(all(not(target_os = "android"), feature = "opengl"))]
    exports.extend([
        export!(Java_org_openani_mediamp_mpv_OffscreenGL_createTextureFbo:
            extern "system" fn(JNIEnv, JClass, jint, jint) -> jlong),
        export!(Java_org_openani_mediamp_mpv_OffscreenGL_getFboId:
            extern "system" fn(JNIEnv, JClass, jlong) -> jint),
        export!(Java_org_openani_mediamp_mpv_OffscreenGL_disposeTextureFbo:
            extern "system" fn(JNIEnv, JClass, jlong)),
        export!(Java_org_openani_mediamp_mpv_GLExt_glViewport:
            extern "system" fn(JNIEnv, JClass, jint, jint, jint, jint)),
    ]);

    let classes = [
        "MPVHandleKt_",
        "MPVHandleAndroid_",
        "MPVHandleDesktop_",
        "OffscreenGL_",
        "GLExt_",
    ];
    for (name, address) in &exports {
        let rest = name
            .strip_prefix("Java_org_openani_mediamp_mpv_")
            .unwrap_or_else(|| panic!("{name} is outside org.openani.mediamp.mpv"));
        assert!(
            classes.iter().any(|class| rest.starts_with(class)),
            "{name} belongs to no Kotlin class"
        );
        assert_ne!(*address, 0, "{name}");
    }

    let mut names: Vec<_> = exports.iter().map(|(name, _)| *name).collect();
    names.sort_unstable();
    names.dedup();
    assert_eq!(names.len(), exports.len());

    let mut addresses: Vec<_> = exports.iter().map(|(_, address)| *address).collect();
    addresses.sort_unstable();
    addresses.dedup();
    assert_eq!(addresses.len(), exports.len(), "two exports share one body");
}
