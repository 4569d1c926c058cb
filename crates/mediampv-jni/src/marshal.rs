//! Conversions between JNI values and the bridge's Rust types.

use jni::errors::Error as JniError;
use jni::objects::{JObjectArray, JString};
use jni::sys::{jboolean, jint, jlong, JNI_FALSE, JNI_TRUE};
use jni::JNIEnv;
use mediampv_core::engine::GetProcAddressFn;
use mediampv_core::{BridgeError, Format};

/// Describes and clears a pending Java exception. Returns whether one was
/// pending.
pub fn clear_pending_exception(env: &mut JNIEnv) -> bool {
    match env.exception_check() {
        Ok(true) => {
            let _ = env.exception_describe();
            let _ = env.exception_clear();
            true
        }
        _ => false,
    }
}

/// Converts a failed JNI call, clearing any exception it left pending.
pub fn jni_failure(env: &mut JNIEnv, what: &str, error: JniError) -> BridgeError {
    if clear_pending_exception(env) {
        BridgeError::RuntimeHost(format!("{what} threw: {error}"))
    } else {
        BridgeError::RuntimeHost(format!("{what}: {error}"))
    }
}

pub fn get_string(env: &mut JNIEnv, value: &JString, what: &str) -> Result<String, BridgeError> {
    if value.is_null() {
        return Err(BridgeError::Validation(format!("{what} is null")));
    }
    env.get_string(value)
        .map(String::from)
        .map_err(|e| jni_failure(env, what, e))
}

/// Copies a `String[]`, refusing arrays longer than `limit` before reading
/// any element.
pub fn string_array(
    env: &mut JNIEnv,
    array: &JObjectArray,
    limit: usize,
) -> Result<Vec<String>, BridgeError> {
    if array.is_null() {
        return Err(BridgeError::Validation("command array is null".into()));
    }
    let len = env
        .get_array_length(array)
        .map_err(|e| jni_failure(env, "GetArrayLength", e))?;
    let len = usize::try_from(len).unwrap_or_default();
    if len > limit {
        return Err(BridgeError::ArgumentLimit { count: len, limit });
    }

    let mut args = Vec::with_capacity(len);
    for index in 0..len as jint {
        let element = env
            .get_object_array_element(array, index)
            .map_err(|e| jni_failure(env, "GetObjectArrayElement", e))?;
        let element = JString::from(element);
        let arg = get_string(env, &element, "command argument")?;
        env.delete_local_ref(element)
            .map_err(|e| jni_failure(env, "DeleteLocalRef", e))?;
        args.push(arg);
    }
    Ok(args)
}

pub fn format_from_raw(raw: jint) -> Result<Format, BridgeError> {
    Format::from_raw(raw).ok_or_else(|| BridgeError::Validation(format!("unknown property format {raw}")))
}

/// Reinterprets a `jlong` carrying a native `get_proc_address` function.
pub fn proc_address_fn(raw: jlong) -> Result<GetProcAddressFn, BridgeError> {
    if raw == 0 {
        return Err(BridgeError::Validation("get_proc_address is null".into()));
    }
    // SAFETY: non-null, and the Kotlin side only ever passes the address of
    // a loader with this signature.
    Ok(unsafe { std::mem::transmute::<usize, GetProcAddressFn>(raw as usize) })
}

pub fn texture_size(width: jint, height: jint) -> Result<(u32, u32), BridgeError> {
    match (u32::try_from(width), u32::try_from(height)) {
        (Ok(w), Ok(h)) if w > 0 && h > 0 => Ok((w, h)),
        _ => Err(BridgeError::Validation(format!(
            "invalid texture size {width}x{height}"
        ))),
    }
}

pub fn to_jboolean(value: bool) -> jboolean {
    if value {
        JNI_TRUE
    } else {
        JNI_FALSE
    }
}

pub fn from_jboolean(value: jboolean) -> bool {
    value != JNI_FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_codes() {
        assert_eq!(format_from_raw(3).unwrap(), Format::Flag);
        assert_eq!(format_from_raw(4).unwrap(), Format::Int64);
        assert!(matches!(
            format_from_raw(42),
            Err(BridgeError::Validation(_))
        ));
    }

    #[test]
    fn test_texture_size() {
        assert_eq!(texture_size(1920, 1080).unwrap(), (1920, 1080));
        assert!(texture_size(0, 1080).is_err());
        assert!(texture_size(-1, 1080).is_err());
    }

    #[test]
    fn test_null_proc_address_rejected() {
        assert!(matches!(
            proc_address_fn(0),
            Err(BridgeError::Validation(_))
        ));
    }

    #[test]
    fn test_jboolean_round_trip() {
        assert_eq!(to_jboolean(true), JNI_TRUE);
        assert!(from_jboolean(JNI_TRUE));
        assert!(!from_jboolean(to_jboolean(false)));
        // Any non-zero byte is true on the Java side.
        assert!(from_jboolean(2));
    }
}
