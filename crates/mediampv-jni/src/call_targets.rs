//! Managed classes and methods the bridge calls into, resolved once.
//!
//! Resolution happens on the thread that registers the first listener or
//! renderer, which has the application class loader; pump threads attached
//! later only see the system class loader and could not find these classes.

use jni::objects::{GlobalRef, JClass, JMethodID, JObject};
use jni::JNIEnv;
use mediampv_core::reference_cache::{CallKey, ReferenceCache};
use mediampv_core::BridgeError;

use crate::marshal::jni_failure;

/// A managed class, and optionally one of its methods.
pub struct ResolvedTarget {
    pub class: GlobalRef,
    pub method: Option<JMethodID>,
}

impl ResolvedTarget {
    /// Whether `object` is an instance of the target's class.
    pub fn is_instance(&self, env: &mut JNIEnv, object: &JObject) -> Result<bool, BridgeError> {
        let class: &JClass = self.class.as_obj().into();
        env.is_instance_of(object, class)
            .map_err(|e| jni_failure(env, "IsInstanceOf", e))
    }
}

/// A [`CallKey`] that names a managed class and method.
pub trait JniTarget: CallKey {
    fn class_name(self) -> &'static str;

    /// `(name, signature)`, or `None` for a class-only target.
    fn method(self) -> Option<(&'static str, &'static str)>;
}

const EVENT_LISTENER: &str = "org/openani/mediamp/mpv/EventListener";

/// The five `EventListener.onPropertyChange` overloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenerCall {
    None,
    Flag,
    Int64,
    Double,
    String,
}

impl CallKey for ListenerCall {
    const ALL: &'static [Self] = &[
        ListenerCall::None,
        ListenerCall::Flag,
        ListenerCall::Int64,
        ListenerCall::Double,
        ListenerCall::String,
    ];
}

impl JniTarget for ListenerCall {
    fn class_name(self) -> &'static str {
        EVENT_LISTENER
    }

    fn method(self) -> Option<(&'static str, &'static str)> {
        let signature = match self {
            ListenerCall::None => "(Ljava/lang/String;)V",
            ListenerCall::Flag => "(Ljava/lang/String;Z)V",
            ListenerCall::Int64 => "(Ljava/lang/String;J)V",
            ListenerCall::Double => "(Ljava/lang/String;D)V",
            ListenerCall::String => "(Ljava/lang/String;Ljava/lang/String;)V",
        };
        Some(("onPropertyChange", signature))
    }
}

/// `MpvBufferRenderer.onFrame(int, int, byte[])`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RendererCall {
    OnFrame,
}

impl CallKey for RendererCall {
    const ALL: &'static [Self] = &[RendererCall::OnFrame];
}

impl JniTarget for RendererCall {
    fn class_name(self) -> &'static str {
        "org/openani/mediamp/mpv/MpvBufferRenderer"
    }

    fn method(self) -> Option<(&'static str, &'static str)> {
        Some(("onFrame", "(II[B)V"))
    }
}

/// `android.view.Surface`, for the surface type check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SurfaceClass {
    AndroidSurface,
}

impl CallKey for SurfaceClass {
    const ALL: &'static [Self] = &[SurfaceClass::AndroidSurface];
}

impl JniTarget for SurfaceClass {
    fn class_name(self) -> &'static str {
        "android/view/Surface"
    }

    fn method(self) -> Option<(&'static str, &'static str)> {
        None
    }
}

pub static LISTENER_TARGETS: ReferenceCache<ListenerCall, ResolvedTarget> = ReferenceCache::new();
pub static RENDERER_TARGETS: ReferenceCache<RendererCall, ResolvedTarget> = ReferenceCache::new();
pub static SURFACE_TARGETS: ReferenceCache<SurfaceClass, ResolvedTarget> = ReferenceCache::new();

/// Populates `cache` from the calling thread's class loader (no-op once
/// populated) and returns the target for `key`.
pub fn resolve<'c, K: JniTarget>(
    cache: &'c ReferenceCache<K, ResolvedTarget>,
    env: &mut JNIEnv,
    key: K,
) -> Result<&'c ResolvedTarget, BridgeError> {
    cache.populate(|target| resolve_one(env, target))?;
    cache
        .get(key)
        .ok_or_else(|| BridgeError::Validation(format!("{key:?} missing from call target cache")))
}

fn resolve_one<K: JniTarget>(env: &mut JNIEnv, key: K) -> Result<ResolvedTarget, BridgeError> {
    let class_name = key.class_name();
    let class = env
        .find_class(class_name)
        .map_err(|e| jni_failure(env, class_name, e))?;
    let method = match key.method() {
        Some((name, signature)) => Some(
            env.get_method_id(&class, name, signature)
                .map_err(|e| jni_failure(env, name, e))?,
        ),
        None => None,
    };
    let class = env
        .new_global_ref(&class)
        .map_err(|e| jni_failure(env, "NewGlobalRef", e))?;
    tracing::debug!("resolved {key:?} in {class_name}");
    Ok(ResolvedTarget { class, method })
}
