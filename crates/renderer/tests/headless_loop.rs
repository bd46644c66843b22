use renderer::clock::FrozenClock;
use renderer::compile::{wrap_fragment, TORUS_FRAGMENT_PAYLOAD, VERTEX_SHADER_GLSL};
use renderer::headless::{HeadlessHost, HostCall};
use renderer::{
    CancelToken, FrameScheduler, GraphicsHost, LoopStatus, RenderLoop, ShaderSource, TickOutcome,
};

/// Queue of pending frames, drained by the test like a display refresh would.
#[derive(Default)]
struct PendingFrames(usize);

impl FrameScheduler for PendingFrames {
    fn request_frame(&mut self) {
        self.0 += 1;
    }
}

fn torus_loop(cancel: CancelToken) -> RenderLoop<HeadlessHost> {
    RenderLoop::start(
        HeadlessHost::new(),
        &ShaderSource::vertex(VERTEX_SHADER_GLSL),
        &ShaderSource::fragment(wrap_fragment(TORUS_FRAGMENT_PAYLOAD)),
        Box::new(FrozenClock::at(2.0)),
        cancel,
    )
}

fn pump(render: &mut RenderLoop<HeadlessHost>, pending: &mut PendingFrames, frames: usize) {
    for _ in 0..frames {
        if pending.0 == 0 {
            break;
        }
        pending.0 -= 1;
        render.tick(pending).expect("headless present never fails");
    }
}

#[test]
fn loop_keeps_one_frame_in_flight() {
    let mut render = torus_loop(CancelToken::new());
    let mut pending = PendingFrames::default();
    assert!(render.arm(&mut pending));

    pump(&mut render, &mut pending, 5);
    assert_eq!(pending.0, 1);
    assert_eq!(render.frames_rendered(), 5);
    assert_eq!(render.host().draw_count(), 5);
}

#[test]
fn every_frame_follows_display_size() {
    let mut render = torus_loop(CancelToken::new());
    let mut pending = PendingFrames::default();
    render.arm(&mut pending);

    pump(&mut render, &mut pending, 1);
    render.host_mut().set_display_size(1920, 1080);
    render.host_mut().take_calls();
    pump(&mut render, &mut pending, 1);

    let calls = render.host().calls();
    let resize = calls
        .iter()
        .position(|call| matches!(call, HostCall::ResizeBacking(_)))
        .expect("backing store resized");
    let viewport = calls
        .iter()
        .position(|call| {
            *call
                == HostCall::Viewport {
                    x: 0,
                    y: 0,
                    width: 1920,
                    height: 1080,
                }
        })
        .expect("viewport covers the new size");
    assert!(resize < viewport);
    assert_eq!(render.host().backing_size().width(), 1920);
}

#[test]
fn cancelling_from_another_handle_stops_the_loop() {
    let cancel = CancelToken::new();
    let mut render = torus_loop(cancel.clone());
    let mut pending = PendingFrames::default();
    render.arm(&mut pending);
    pump(&mut render, &mut pending, 2);

    let remote = cancel.clone();
    std::thread::spawn(move || remote.cancel())
        .join()
        .expect("cancel thread");

    assert_eq!(render.status(), LoopStatus::Cancelled);
    assert_eq!(
        render.tick(&mut pending).expect("tick"),
        TickOutcome::Stopped
    );
    pump(&mut render, &mut pending, 10);
    assert_eq!(render.host().draw_count(), 2);
}

#[test]
fn link_failure_leaves_loop_idle() {
    let vertex_only_outputs = "#version 450
layout(location = 0) in vec2 a_position;
void main() {
    gl_Position = vec4(a_position, 0.0, 1.0);
}
";
    let fragment_needs_varying = "#version 450
layout(location = 3) in vec2 v_uv;
layout(location = 0) out vec4 color;
void main() {
    color = vec4(v_uv, 0.0, 1.0);
}
";
    let mut render = RenderLoop::start(
        HeadlessHost::new(),
        &ShaderSource::vertex(vertex_only_outputs),
        &ShaderSource::fragment(fragment_needs_varying),
        Box::new(FrozenClock::at(0.0)),
        CancelToken::new(),
    );

    assert_eq!(render.status(), LoopStatus::Idle);
    let err = render.startup_error().expect("link error kept");
    assert_eq!(err.stage(), None);
    assert!(err.log().contains("location 3"));

    let mut pending = PendingFrames::default();
    assert!(!render.arm(&mut pending));
    assert_eq!(
        render.tick(&mut pending).expect("tick"),
        TickOutcome::Stopped
    );
    assert_eq!(render.host().draw_count(), 0);
}
