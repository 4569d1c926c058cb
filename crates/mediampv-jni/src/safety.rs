//! FFI boundary safety utilities.
//!
//! Every JNI entry point wraps its body in [`ffi_boundary`] or
//! [`ffi_boundary_or`], which:
//! 1. Catch panics via `std::panic::catch_unwind()`
//! 2. Log the error and collapse it to the value the Kotlin side expects

use std::panic::{catch_unwind, AssertUnwindSafe};

use jni::sys::{jboolean, JNI_FALSE, JNI_TRUE};
use mediampv_core::{BridgeError, ErrorCode};

/// Runs a `Result` entry point body. `Ok` becomes `JNI_TRUE`; errors and
/// panics are logged and become `JNI_FALSE`.
///
/// # Safety rationale for `AssertUnwindSafe`
///
/// Shared state reachable from entry points uses `parking_lot` locks
/// (poison-free); on unwind the guards are dropped and the locks released.
pub fn ffi_boundary<F>(operation: &str, f: F) -> jboolean
where
    F: FnOnce() -> Result<(), BridgeError>,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => JNI_TRUE,
        Ok(Err(e)) => {
            log_failure(operation, &e);
            JNI_FALSE
        }
        Err(_panic) => {
            tracing::error!(
                code = ErrorCode::Internal.as_raw(),
                "{operation}: caught Rust panic at FFI boundary"
            );
            JNI_FALSE
        }
    }
}

/// Runs an entry point body producing a value. Errors and panics are logged
/// and replaced by `default`.
pub fn ffi_boundary_or<T, F>(operation: &str, default: T, f: F) -> T
where
    F: FnOnce() -> Result<T, BridgeError>,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => value,
        Ok(Err(e)) => {
            log_failure(operation, &e);
            default
        }
        Err(_panic) => {
            tracing::error!(
                code = ErrorCode::Internal.as_raw(),
                "{operation}: caught Rust panic at FFI boundary"
            );
            default
        }
    }
}

fn log_failure(operation: &str, error: &BridgeError) {
    let code = error.code().as_raw();
    match error {
        // Getters on properties that are not available yet are routine.
        BridgeError::Engine { .. } => tracing::debug!(code, "{operation}: {error}"),
        _ => tracing::warn!(code, "{operation}: {error}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_maps_to_true() {
        assert_eq!(ffi_boundary("test", || Ok(())), JNI_TRUE);
    }

    #[test]
    fn test_error_maps_to_false() {
        let result = ffi_boundary("test", || {
            Err(BridgeError::NotInitialized {
                operation: "command",
            })
        });
        assert_eq!(result, JNI_FALSE);
    }

    #[test]
    fn test_panic_is_caught() {
        assert_eq!(ffi_boundary("test", || panic!("boom")), JNI_FALSE);
        assert_eq!(ffi_boundary_or("test", -1, || -> Result<i32, _> { panic!("boom") }), -1);
    }

    #[test]
    fn test_value_or_default() {
        assert_eq!(ffi_boundary_or("test", 0, || Ok(42)), 42);
        assert_eq!(
            ffi_boundary_or("test", 0, || Err(BridgeError::Validation("bad".into()))),
            0
        );
    }
}
