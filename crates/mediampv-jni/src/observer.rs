//! Managed listeners behind the core callback traits.
//!
//! Calls arrive on pump threads that the host attached permanently, so each
//! call runs inside its own local frame and clears any exception the Kotlin
//! side threw before returning to the pump.

use std::sync::Arc;

use jni::objects::{GlobalRef, JObject, JValue};
use jni::signature::{Primitive, ReturnType};
use jni::sys::{jint, jvalue};
use jni::{JNIEnv, JavaVM};
use mediampv_core::{BridgeError, FrameConsumer, ObserverBinder, PropertyObserver};

use crate::call_targets::{self, ListenerCall, RendererCall, LISTENER_TARGETS, RENDERER_TARGETS};
use crate::marshal::{clear_pending_exception, to_jboolean};

/// A Kotlin `EventListener`.
pub struct JniObserver {
    vm: &'static JavaVM,
    listener: GlobalRef,
}

enum Arg<'a> {
    Flag(bool),
    Int64(i64),
    Double(f64),
    String(&'a str),
}

impl JniObserver {
    fn notify(&self, call: ListenerCall, name: &str, value: Option<Arg<'_>>) {
        let Some(method) = LISTENER_TARGETS.get(call).and_then(|target| target.method) else {
            tracing::warn!("no call target for {call:?}, dropping {name}");
            return;
        };
        let mut env = match self.vm.get_env() {
            Ok(env) => env,
            Err(e) => {
                tracing::error!("listener called from a detached thread: {e}");
                return;
            }
        };

        let result = env.with_local_frame(4, |env| -> jni::errors::Result<()> {
            let name = env.new_string(name)?;
            let mut args: Vec<jvalue> = vec![JValue::Object(&name).as_jni()];
            match value {
                None => {}
                Some(Arg::Flag(v)) => args.push(JValue::Bool(to_jboolean(v)).as_jni()),
                Some(Arg::Int64(v)) => args.push(JValue::Long(v).as_jni()),
                Some(Arg::Double(v)) => args.push(JValue::Double(v).as_jni()),
                Some(Arg::String(v)) => {
                    let value = env.new_string(v)?;
                    args.push(JValue::Object(&value).as_jni());
                }
            }
            // SAFETY: `method` was resolved on the listener's class with the
            // signature matching `call`, and `args` follow that signature.
            unsafe {
                env.call_method_unchecked(
                    &self.listener,
                    method,
                    ReturnType::Primitive(Primitive::Void),
                    &args,
                )
            }?;
            Ok(())
        });

        if let Err(e) = result {
            if clear_pending_exception(&mut env) {
                tracing::warn!("EventListener threw while handling {name}");
            } else {
                tracing::error!("failed to call EventListener for {name}: {e}");
            }
        }
    }
}

impl PropertyObserver for JniObserver {
    fn on_property_none(&self, name: &str) {
        self.notify(ListenerCall::None, name, None);
    }

    fn on_property_flag(&self, name: &str, value: bool) {
        self.notify(ListenerCall::Flag, name, Some(Arg::Flag(value)));
    }

    fn on_property_int64(&self, name: &str, value: i64) {
        self.notify(ListenerCall::Int64, name, Some(Arg::Int64(value)));
    }

    fn on_property_double(&self, name: &str, value: f64) {
        self.notify(ListenerCall::Double, name, Some(Arg::Double(value)));
    }

    fn on_property_string(&self, name: &str, value: &str) {
        self.notify(ListenerCall::String, name, Some(Arg::String(value)));
    }
}

/// Validates a Kotlin object against `EventListener` and pins it with a
/// global reference.
pub struct JniObserverBinder<'a, 'local> {
    pub env: &'a mut JNIEnv<'local>,
    pub vm: &'static JavaVM,
    pub listener: &'a JObject<'local>,
}

impl ObserverBinder for JniObserverBinder<'_, '_> {
    fn bind(self) -> Result<Arc<dyn PropertyObserver>, BridgeError> {
        let target = call_targets::resolve(&LISTENER_TARGETS, self.env, ListenerCall::None)?;
        if !target.is_instance(self.env, self.listener)? {
            return Err(BridgeError::Validation(
                "listener does not implement EventListener".into(),
            ));
        }
        let listener = self
            .env
            .new_global_ref(self.listener)
            .map_err(|e| BridgeError::RuntimeHost(format!("NewGlobalRef: {e}")))?;
        Ok(Arc::new(JniObserver {
            vm: self.vm,
            listener,
        }))
    }
}

/// A Kotlin `MpvBufferRenderer`.
pub struct JniFrameConsumer {
    vm: &'static JavaVM,
    renderer: GlobalRef,
}

impl JniFrameConsumer {
    /// Validates `renderer` against `MpvBufferRenderer` and pins it.
    pub fn bind(
        env: &mut JNIEnv,
        vm: &'static JavaVM,
        renderer: &JObject,
    ) -> Result<Arc<dyn FrameConsumer>, BridgeError> {
        if renderer.is_null() {
            return Err(BridgeError::Validation("renderer is null".into()));
        }
        let target = call_targets::resolve(&RENDERER_TARGETS, env, RendererCall::OnFrame)?;
        if !target.is_instance(env, renderer)? {
            return Err(BridgeError::Validation(
                "renderer does not implement MpvBufferRenderer".into(),
            ));
        }
        let renderer = env
            .new_global_ref(renderer)
            .map_err(|e| BridgeError::RuntimeHost(format!("NewGlobalRef: {e}")))?;
        Ok(Arc::new(JniFrameConsumer { vm, renderer }))
    }
}

impl FrameConsumer for JniFrameConsumer {
    fn on_frame(&self, width: u32, height: u32, pixels: Vec<u8>) {
        let Some(method) = RENDERER_TARGETS
            .get(RendererCall::OnFrame)
            .and_then(|target| target.method)
        else {
            return;
        };
        let (Ok(w), Ok(h)) = (jint::try_from(width), jint::try_from(height)) else {
            tracing::warn!("frame {width}x{height} does not fit a jint");
            return;
        };
        let mut env = match self.vm.get_env() {
            Ok(env) => env,
            Err(e) => {
                tracing::error!("renderer called from a detached thread: {e}");
                return;
            }
        };

        let result = env.with_local_frame(2, |env| -> jni::errors::Result<()> {
            let data = env.byte_array_from_slice(&pixels)?;
            let args = [
                JValue::Int(w).as_jni(),
                JValue::Int(h).as_jni(),
                JValue::Object(&data).as_jni(),
            ];
            // SAFETY: `method` is `onFrame(II[B)V` on the renderer's class.
            unsafe {
                env.call_method_unchecked(
                    &self.renderer,
                    method,
                    ReturnType::Primitive(Primitive::Void),
                    &args,
                )
            }?;
            Ok(())
        });

        if let Err(e) = result {
            if clear_pending_exception(&mut env) {
                tracing::warn!("MpvBufferRenderer.onFrame threw");
            } else {
                tracing::error!("failed to deliver frame: {e}");
            }
        }
    }
}
