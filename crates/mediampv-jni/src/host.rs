//! The process-wide `JavaVM` and the [`RuntimeHost`] built on it.

use jni::{JNIEnv, JavaVM};
use mediampv_core::global::ProcessGlobal;
use mediampv_core::{BridgeError, RuntimeHost};

static JAVA_VM: ProcessGlobal<JavaVM> = ProcessGlobal::new();

#[cfg(all(target_os = "android", feature = "libmpv"))]
#[link(name = "avcodec")]
extern "C" {
    fn av_jni_set_java_vm(vm: *mut std::ffi::c_void, log_ctx: *mut std::ffi::c_void) -> i32;
}

/// The `JavaVM` of the calling thread's environment, obtained once per
/// process.
///
/// Failure is returned to the caller; the next call retries.
pub fn acquire_vm(env: &JNIEnv) -> Result<&'static JavaVM, BridgeError> {
    JAVA_VM.get_or_try_init(|| {
        let vm = env
            .get_java_vm()
            .map_err(|e| BridgeError::RuntimeHost(format!("failed to get JavaVM: {e}")))?;

        // FFmpeg's MediaCodec wrappers look the VM up on their own.
        #[cfg(all(target_os = "android", feature = "libmpv"))]
        unsafe {
            av_jni_set_java_vm(vm.get_java_vm_pointer().cast(), std::ptr::null_mut());
        }

        tracing::info!("JavaVM acquired");
        Ok(vm)
    })
}

/// Attaches pump threads to the JVM for the lifetime of the pump.
pub struct JniHost {
    vm: &'static JavaVM,
}

impl JniHost {
    pub fn new(vm: &'static JavaVM) -> Self {
        Self { vm }
    }
}

impl RuntimeHost for JniHost {
    fn attach_current_thread(&self, thread_name: &str) -> Result<(), BridgeError> {
        self.vm
            .attach_current_thread_permanently()
            .map(|_env| tracing::debug!("{thread_name} attached to JVM"))
            .map_err(|e| BridgeError::RuntimeHost(format!("failed to attach {thread_name}: {e}")))
    }

    fn detach_current_thread(&self) {
        // SAFETY: called from the pump thread itself on its way out; no
        // JNIEnv or local reference obtained on this thread outlives it.
        unsafe { self.vm.detach_current_thread() };
    }
}
