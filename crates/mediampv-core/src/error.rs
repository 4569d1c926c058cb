//! Error types shared by the handle, the pumps and the FFI layer.

use std::fmt;

/// Errors surfaced by [`EngineHandle`](crate::handle::EngineHandle) operations.
///
/// Every operation is all-or-nothing: an `Err` means nothing was changed on
/// the engine side, except where a variant documents otherwise.
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeError {
    /// The engine (or the handle itself) is absent when the operation needs it
    NotInitialized { operation: &'static str },
    /// The engine reported a negative status
    Engine { operation: &'static str, status: i32 },
    /// A pump thread could not be started
    Thread(String),
    /// A managed reference (observer, surface, renderer) failed its type check
    Validation(String),
    /// Command argument count exceeds the configured cap
    ArgumentLimit { count: usize, limit: usize },
    /// Another output mode is still attached
    OutputBusy { active: &'static str },
    /// The runtime host could not be obtained, or a call into it failed
    RuntimeHost(String),
    /// Texture or framebuffer allocation failed in the caller's graphics context
    Graphics(String),
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeError::NotInitialized { operation } => {
                write!(f, "engine is not initialized ({operation})")
            }
            BridgeError::Engine { operation, status } => {
                write!(f, "engine error in {operation}: status {status}")
            }
            BridgeError::Thread(msg) => write!(f, "failed to start pump thread: {msg}"),
            BridgeError::Validation(msg) => write!(f, "validation failed: {msg}"),
            BridgeError::ArgumentLimit { count, limit } => {
                write!(f, "too many command arguments: {count} (limit {limit})")
            }
            BridgeError::OutputBusy { active } => {
                write!(f, "output already attached: {active} (detach it first)")
            }
            BridgeError::RuntimeHost(msg) => write!(f, "runtime host unavailable: {msg}"),
            BridgeError::Graphics(msg) => write!(f, "graphics error: {msg}"),
        }
    }
}

impl std::error::Error for BridgeError {}

impl BridgeError {
    /// Maps a raw engine status to `Ok(())` or [`BridgeError::Engine`].
    pub fn check(operation: &'static str, status: i32) -> Result<(), BridgeError> {
        if status < 0 {
            Err(BridgeError::Engine { operation, status })
        } else {
            Ok(())
        }
    }

    /// Stable code for FFI return values.
    pub fn code(&self) -> ErrorCode {
        match self {
            BridgeError::NotInitialized { .. } => ErrorCode::NotInitialized,
            BridgeError::Engine { .. } => ErrorCode::Engine,
            BridgeError::Thread(_) => ErrorCode::Thread,
            BridgeError::Validation(_) => ErrorCode::Validation,
            BridgeError::ArgumentLimit { .. } => ErrorCode::ArgumentLimit,
            BridgeError::OutputBusy { .. } => ErrorCode::OutputBusy,
            BridgeError::RuntimeHost(_) => ErrorCode::RuntimeHost,
            BridgeError::Graphics(_) => ErrorCode::Graphics,
        }
    }
}

/// FFI error codes. `Ok` is never produced by [`BridgeError::code`].
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Ok = 0,
    NotInitialized = 1,
    Engine = 2,
    Thread = 3,
    Validation = 4,
    ArgumentLimit = 5,
    OutputBusy = 6,
    RuntimeHost = 7,
    Internal = 8,
    Graphics = 9,
}

impl ErrorCode {
    /// Convert to the raw i32 for FFI return.
    pub fn as_raw(self) -> i32 {
        self as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_maps_negative_status() {
        assert!(BridgeError::check("command", 0).is_ok());
        assert!(BridgeError::check("command", 3).is_ok());
        assert_eq!(
            BridgeError::check("command", -12),
            Err(BridgeError::Engine {
                operation: "command",
                status: -12
            })
        );
    }

    #[test]
    fn test_error_display() {
        let err = BridgeError::ArgumentLimit {
            count: 200,
            limit: 127,
        };
        assert!(err.to_string().contains("200"));
        assert!(err.to_string().contains("127"));

        let err = BridgeError::NotInitialized {
            operation: "set_property",
        };
        assert!(err.to_string().contains("set_property"));
    }

    #[test]
    fn test_codes_are_distinct_and_nonzero() {
        let errors = [
            BridgeError::NotInitialized { operation: "x" },
            BridgeError::Engine {
                operation: "x",
                status: -1,
            },
            BridgeError::Thread(String::new()),
            BridgeError::Validation(String::new()),
            BridgeError::ArgumentLimit { count: 1, limit: 0 },
            BridgeError::OutputBusy { active: "x" },
            BridgeError::RuntimeHost(String::new()),
            BridgeError::Graphics(String::new()),
        ];
        let mut codes: Vec<i32> = errors.iter().map(|e| e.code().as_raw()).collect();
        assert!(codes.iter().all(|&c| c != ErrorCode::Ok.as_raw()));
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }
}
