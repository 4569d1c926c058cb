//! Video output modes: native surface, software buffer renderer and the
//! hardware render context with its texture.

mod support;

use std::ffi::{c_char, c_void};
use std::ptr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use mediampv_core::scripted::FRAME_COLOR;
use mediampv_core::{
    BridgeError, NativeHost, OutputMode, PropertyValue, RenderBuffer, RenderPumpState,
    TextureAllocator,
};

use support::{scripted_handle, wait_until, CountingHost, GatedFrames};

unsafe extern "C" fn no_symbols(_ctx: *mut c_void, _name: *const c_char) -> *mut c_void {
    ptr::null_mut()
}

/// Hands out sequential ids; framebuffer ids are offset by 100.
#[derive(Default)]
struct SequentialTextures {
    next: AtomicU32,
    released: Mutex<Vec<u32>>,
}

impl TextureAllocator for SequentialTextures {
    fn allocate(&self, width: u32, height: u32) -> Result<RenderBuffer, BridgeError> {
        let id = self.next.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(RenderBuffer {
            texture: id,
            fbo: id + 100,
            width,
            height,
        })
    }

    fn release(&self, buffer: RenderBuffer) {
        self.released.lock().push(buffer.texture);
    }
}

// ============================================================================
// Native surface
// ============================================================================

#[test]
fn surface_keep_alive_is_held_until_detach() {
    let (handle, controller) = scripted_handle(Arc::new(NativeHost));
    handle.initialize().unwrap();

    let window = Arc::new(());
    handle
        .attach_surface(0x5500, Box::new(Arc::clone(&window)))
        .unwrap();
    assert_eq!(controller.option("wid"), Some(PropertyValue::Int64(0x5500)));
    assert_eq!(Arc::strong_count(&window), 2);

    handle.detach_surface().unwrap();
    assert_eq!(Arc::strong_count(&window), 1);
    assert_eq!(controller.option("wid"), Some(PropertyValue::Int64(0)));
    handle.destroy().unwrap();
}

#[test]
fn destroy_releases_attached_surface() {
    let (handle, _controller) = scripted_handle(Arc::new(NativeHost));
    let window = Arc::new(());
    handle
        .attach_surface(0x10, Box::new(Arc::clone(&window)))
        .unwrap();
    handle.destroy().unwrap();
    assert_eq!(Arc::strong_count(&window), 1);
}

// ============================================================================
// Software buffer renderer
// ============================================================================

#[test]
fn software_frames_are_packed_bgr0() {
    let (handle, controller) = scripted_handle(Arc::new(NativeHost));
    handle.initialize().unwrap();
    let frames = Arc::new(GatedFrames::open_gate());
    handle.attach_buffer_renderer(frames.clone()).unwrap();
    assert_eq!(handle.output_mode(), OutputMode::Software);

    controller.present_frame(3, 2);
    wait_until("first frame", || frames.count() == 1);

    let (width, height, pixels) = frames.frames().remove(0);
    assert_eq!((width, height), (3, 2));
    assert_eq!(pixels.len(), 3 * 2 * 4);
    assert!(pixels.chunks_exact(4).all(|px| px == FRAME_COLOR));
    wait_until("swap", || controller.swaps_reported() == 1);

    handle.destroy().unwrap();
}

#[test]
fn burst_of_updates_renders_once() {
    let (handle, controller) = scripted_handle(Arc::new(NativeHost));
    handle.initialize().unwrap();
    let frames = Arc::new(GatedFrames::closed());
    handle.attach_buffer_renderer(frames.clone()).unwrap();

    // Hold the pump inside the consumer, then pile up updates behind it.
    controller.present_frame(8, 8);
    wait_until("pump inside consumer", || frames.entered() == 1);
    for _ in 0..25 {
        controller.present_frame(8, 8);
    }
    frames.open();

    wait_until("second frame", || frames.count() == 2);
    thread::sleep(Duration::from_millis(100));
    assert_eq!(frames.count(), 2);
    assert_eq!(controller.renders_completed(), 2);

    handle.destroy().unwrap();
}

#[test]
fn detach_buffer_renderer_joins_pump() {
    let host = Arc::new(CountingHost::default());
    let (handle, controller) = scripted_handle(host.clone());
    handle.initialize().unwrap();
    handle
        .attach_buffer_renderer(Arc::new(GatedFrames::open_gate()))
        .unwrap();
    wait_until("render pump", || {
        handle.render_pump_state() == Some(RenderPumpState::Running)
    });
    assert!(controller.render_context_alive());

    handle.detach_buffer_renderer().unwrap();
    assert_eq!(handle.render_pump_state(), None);
    assert_eq!(handle.output_mode(), OutputMode::Detached);
    assert!(!controller.render_context_alive());
    assert_eq!(host.detached(), 1);

    handle.destroy().unwrap();
    assert_eq!(host.attached(), 2);
    assert_eq!(host.detached(), 2);
}

#[test]
fn destroy_stops_software_output() {
    let (handle, controller) = scripted_handle(Arc::new(NativeHost));
    handle.initialize().unwrap();
    handle
        .attach_buffer_renderer(Arc::new(GatedFrames::open_gate()))
        .unwrap();
    handle.destroy().unwrap();
    assert!(!controller.render_context_alive());
    assert!(controller.is_terminated());
}

// ============================================================================
// Mode exclusivity
// ============================================================================

#[test]
fn one_output_mode_at_a_time() {
    let (handle, _controller) = scripted_handle(Arc::new(NativeHost));
    handle.initialize().unwrap();
    handle.attach_surface(0x20, Box::new(())).unwrap();

    assert_eq!(
        handle.attach_buffer_renderer(Arc::new(GatedFrames::open_gate())),
        Err(BridgeError::OutputBusy {
            active: "native surface"
        })
    );
    assert_eq!(
        unsafe { handle.create_render_context(no_symbols, ptr::null_mut()) },
        Err(BridgeError::OutputBusy {
            active: "native surface"
        })
    );
    assert!(matches!(
        handle.detach_buffer_renderer(),
        Err(BridgeError::Validation(_))
    ));

    handle.detach_surface().unwrap();
    unsafe { handle.create_render_context(no_symbols, ptr::null_mut()) }.unwrap();
    assert_eq!(handle.output_mode(), OutputMode::Hardware);
    handle.destroy().unwrap();
}

// ============================================================================
// Hardware render context
// ============================================================================

#[test]
fn texture_requires_render_context() {
    let (handle, _controller) = scripted_handle(Arc::new(NativeHost));
    let textures = SequentialTextures::default();
    assert!(matches!(
        handle.create_texture(&textures, 640, 360),
        Err(BridgeError::Validation(_))
    ));
    assert!(matches!(
        handle.render_frame_to_texture(),
        Err(BridgeError::Validation(_))
    ));
    handle.destroy().unwrap();
}

#[test]
fn renders_pending_frame_into_current_texture() {
    let (handle, controller) = scripted_handle(Arc::new(NativeHost));
    handle.initialize().unwrap();
    unsafe { handle.create_render_context(no_symbols, ptr::null_mut()) }.unwrap();
    let textures = SequentialTextures::default();

    controller.present_frame(640, 360);
    // No texture yet: nothing to render into.
    assert!(!handle.render_frame_to_texture().unwrap());

    assert_eq!(handle.create_texture(&textures, 640, 360).unwrap(), 1);
    controller.present_frame(640, 360);
    assert!(handle.render_frame_to_texture().unwrap());
    assert_eq!(controller.last_fbo(), Some(101));
    assert_eq!(controller.swaps_reported(), 1);

    // The frame was consumed.
    assert!(!handle.render_frame_to_texture().unwrap());

    assert_eq!(handle.create_texture(&textures, 1280, 720).unwrap(), 2);
    assert_eq!(*textures.released.lock(), [1]);
    handle.release_texture(&textures).unwrap();
    handle.release_texture(&textures).unwrap();
    assert_eq!(*textures.released.lock(), [1, 2]);

    handle.destroy_render_context().unwrap();
    assert!(!controller.render_context_alive());
    handle.destroy().unwrap();
}

#[test]
fn texture_creation_waits_for_inflight_render() {
    let (handle, controller) = scripted_handle(Arc::new(NativeHost));
    handle.initialize().unwrap();
    unsafe { handle.create_render_context(no_symbols, ptr::null_mut()) }.unwrap();
    let textures = Arc::new(SequentialTextures::default());
    handle.create_texture(textures.as_ref(), 320, 240).unwrap();

    controller.set_render_delay(Duration::from_millis(200));
    controller.present_frame(320, 240);

    let renderer = {
        let handle = Arc::clone(&handle);
        thread::spawn(move || handle.render_frame_to_texture())
    };
    wait_until("render to start", || controller.renders_started() == 1);

    handle.create_texture(textures.as_ref(), 640, 480).unwrap();
    assert_eq!(controller.renders_completed(), 1);
    assert_eq!(controller.last_fbo(), Some(101));
    assert_eq!(*textures.released.lock(), [1]);

    assert!(renderer.join().unwrap().unwrap());
    handle.release_texture(textures.as_ref()).unwrap();
    handle.destroy().unwrap();
}

#[test]
fn destroy_releases_live_texture() {
    let (handle, controller) = scripted_handle(Arc::new(NativeHost));
    handle.initialize().unwrap();
    unsafe { handle.create_render_context(no_symbols, ptr::null_mut()) }.unwrap();
    let textures = SequentialTextures::default();
    handle.create_texture(&textures, 640, 360).unwrap();
    handle.create_texture(&textures, 1280, 720).unwrap();
    assert_eq!(*textures.released.lock(), [1]);

    // Closed without destroying the render context first.
    handle.destroy_releasing(&textures).unwrap();
    assert_eq!(*textures.released.lock(), [1, 2]);
    assert!(!controller.render_context_alive());
    assert_eq!(handle.output_mode(), OutputMode::Detached);
    assert!(matches!(
        handle.destroy_releasing(&textures),
        Err(BridgeError::NotInitialized { .. })
    ));
    assert_eq!(*textures.released.lock(), [1, 2]);
}
