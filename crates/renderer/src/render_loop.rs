use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::clock::{BoxedClock, FrameStats};
use crate::host::{FrameScheduler, GraphicsHost, PresentError};
use crate::program::{build_program, ProgramError};
use crate::surface::sync_to_display_size;
use crate::types::{FrameParameters, ShaderSource, VertexGeometry, CLEAR_COLOR};
use crate::uniforms::{bind, GeometryBuffer};

type Waker = Box<dyn Fn() + Send>;

#[derive(Default)]
struct CancelState {
    cancelled: AtomicBool,
    wakers: Mutex<Vec<Waker>>,
}

/// Shared flag that stops a running loop at its next tick.
///
/// Whoever drives the loop can register a waker with
/// [`CancelToken::on_cancel`] so a cancel from another thread does not wait
/// for the next frame to be noticed.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<CancelState>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        if self.0.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        let wakers = std::mem::take(&mut *self.wakers());
        for wake in wakers {
            wake();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.cancelled.load(Ordering::Acquire)
    }

    /// Runs `wake` once when the token is cancelled, or right away if it
    /// already is.
    pub fn on_cancel(&self, wake: impl Fn() + Send + 'static) {
        let mut wakers = self.wakers();
        if self.is_cancelled() {
            drop(wakers);
            wake();
            return;
        }
        wakers.push(Box::new(wake));
    }

    fn wakers(&self) -> MutexGuard<'_, Vec<Waker>> {
        self.0.wakers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Coarse state reported by [`RenderLoop::status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopStatus {
    /// Start-up failed; nothing will be drawn.
    Idle,
    Running,
    Cancelled,
}

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A frame was drawn and the next one requested.
    Rendered,
    /// No GPU work was done and nothing was scheduled.
    Stopped,
}

enum LoopState<H: GraphicsHost> {
    Idle {
        error: Option<ProgramError>,
    },
    Running {
        program: H::Program,
        geometry: GeometryBuffer<H::Buffer>,
    },
}

/// Owns the host and, once start-up succeeded, the linked program and quad.
///
/// Each [`RenderLoop::tick`] renders one frame and asks the scheduler for
/// exactly one more.
pub struct RenderLoop<H: GraphicsHost> {
    host: H,
    state: LoopState<H>,
    clock: BoxedClock,
    cancel: CancelToken,
    stats: FrameStats,
}

impl<H: GraphicsHost> RenderLoop<H> {
    /// Builds the program and uploads the quad.
    ///
    /// A build failure has already been logged by [`build_program`]; the loop
    /// is returned idle and keeps the error for [`RenderLoop::startup_error`].
    pub fn start(
        mut host: H,
        vertex: &ShaderSource,
        fragment: &ShaderSource,
        mut clock: BoxedClock,
        cancel: CancelToken,
    ) -> Self {
        let state = match build_program(&mut host, vertex, fragment) {
            Ok(program) => {
                let geometry = GeometryBuffer::upload(&mut host, VertexGeometry::FULLSCREEN_QUAD);
                info!(vertices = geometry.vertex_count(), "render loop ready");
                LoopState::Running { program, geometry }
            }
            Err(err) => LoopState::Idle { error: Some(err) },
        };
        clock.restart();

        Self {
            host,
            state,
            clock,
            cancel,
            stats: FrameStats::new(Instant::now()),
        }
    }

    pub fn status(&self) -> LoopStatus {
        match self.state {
            LoopState::Idle { .. } => LoopStatus::Idle,
            LoopState::Running { .. } if self.cancel.is_cancelled() => LoopStatus::Cancelled,
            LoopState::Running { .. } => LoopStatus::Running,
        }
    }

    /// The build error that left the loop idle, if any.
    pub fn startup_error(&self) -> Option<&ProgramError> {
        match &self.state {
            LoopState::Idle { error } => error.as_ref(),
            LoopState::Running { .. } => None,
        }
    }

    /// Schedules the first tick. Returns `false` when there is nothing to run.
    pub fn arm(&self, scheduler: &mut impl FrameScheduler) -> bool {
        if self.status() != LoopStatus::Running {
            return false;
        }
        scheduler.request_frame();
        true
    }

    /// Renders one frame and requests the next.
    ///
    /// Presentation failures are returned without scheduling another frame;
    /// the caller decides whether the surface can recover.
    pub fn tick(
        &mut self,
        scheduler: &mut impl FrameScheduler,
    ) -> Result<TickOutcome, PresentError> {
        let LoopState::Running { program, geometry } = &self.state else {
            return Ok(TickOutcome::Stopped);
        };
        if self.cancel.is_cancelled() {
            debug!("render loop cancelled");
            return Ok(TickOutcome::Stopped);
        }

        let host = &mut self.host;
        sync_to_display_size(host);
        let surface = host.backing_size();
        host.viewport(0, 0, surface.width(), surface.height());
        host.clear_color(CLEAR_COLOR);
        host.clear();

        host.use_program(program);
        let reading = self.clock.read();
        bind(
            host,
            program,
            geometry,
            &FrameParameters::new(surface, reading.elapsed_seconds),
        );
        host.draw_triangle_strip(0, geometry.vertex_count());
        host.present()?;

        self.stats.record(Instant::now(), reading);
        scheduler.request_frame();
        Ok(TickOutcome::Rendered)
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn frames_rendered(&self) -> u64 {
        self.stats.frames_rendered()
    }

    pub fn frames_per_second(&self) -> f32 {
        self.stats.frames_per_second()
    }
}

impl<H: GraphicsHost> Drop for RenderLoop<H> {
    fn drop(&mut self) {
        let state = std::mem::replace(&mut self.state, LoopState::Idle { error: None });
        if let LoopState::Running { program, .. } = state {
            self.host.delete_program(program);
            if self.stats.frames_rendered() == 0 {
                warn!("render loop dropped before drawing a frame");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FrozenClock;
    use crate::compile::{wrap_fragment, TORUS_FRAGMENT_PAYLOAD, VERTEX_SHADER_GLSL};
    use crate::headless::{HeadlessHost, HostCall};
    use crate::types::StageKind;

    #[derive(Default)]
    struct CountingScheduler {
        requests: usize,
    }

    impl FrameScheduler for CountingScheduler {
        fn request_frame(&mut self) {
            self.requests += 1;
        }
    }

    fn start(payload: &str, cancel: CancelToken) -> RenderLoop<HeadlessHost> {
        RenderLoop::start(
            HeadlessHost::new(),
            &ShaderSource::vertex(VERTEX_SHADER_GLSL),
            &ShaderSource::fragment(wrap_fragment(payload)),
            Box::new(FrozenClock::at(0.5)),
            cancel,
        )
    }

    #[test]
    fn one_tick_draws_one_frame() {
        let mut render = start(TORUS_FRAGMENT_PAYLOAD, CancelToken::new());
        assert_eq!(render.status(), LoopStatus::Running);
        render.host_mut().take_calls();

        let mut scheduler = CountingScheduler::default();
        assert_eq!(render.tick(&mut scheduler).unwrap(), TickOutcome::Rendered);

        let calls = render.host().calls();
        let viewports: Vec<_> = calls
            .iter()
            .filter(|call| matches!(call, HostCall::Viewport { .. }))
            .collect();
        assert_eq!(
            viewports,
            [&HostCall::Viewport {
                x: 0,
                y: 0,
                width: 300,
                height: 150
            }]
        );
        assert_eq!(calls.iter().filter(|call| **call == HostCall::Clear).count(), 1);
        assert!(calls.contains(&HostCall::ClearColor(CLEAR_COLOR)));
        assert!(calls.contains(&HostCall::DrawTriangleStrip { first: 0, count: 4 }));
        assert_eq!(render.host().draw_count(), 1);
        assert_eq!(scheduler.requests, 1);
        assert_eq!(render.frames_rendered(), 1);
    }

    #[test]
    fn clear_comes_before_draw_and_present_last() {
        let mut render = start(TORUS_FRAGMENT_PAYLOAD, CancelToken::new());
        render.host_mut().take_calls();
        render.tick(&mut CountingScheduler::default()).unwrap();

        let calls = render.host().calls();
        let position = |wanted: &HostCall| calls.iter().position(|call| call == wanted);
        let clear = position(&HostCall::Clear).unwrap();
        let draw = position(&HostCall::DrawTriangleStrip { first: 0, count: 4 }).unwrap();
        assert!(clear < draw);
        assert_eq!(calls.last(), Some(&HostCall::Present));
    }

    #[test]
    fn resize_is_picked_up_on_next_tick() {
        let mut render = start(TORUS_FRAGMENT_PAYLOAD, CancelToken::new());
        let mut scheduler = CountingScheduler::default();
        render.tick(&mut scheduler).unwrap();

        render.host_mut().set_display_size(640, 480);
        render.host_mut().take_calls();
        render.tick(&mut scheduler).unwrap();

        assert!(render.host().calls().contains(&HostCall::Viewport {
            x: 0,
            y: 0,
            width: 640,
            height: 480
        }));
        assert_eq!(scheduler.requests, 2);
    }

    #[test]
    fn broken_fragment_leaves_loop_idle() {
        let payload = "void mainImage(out vec4 fragColor, in vec2 fragCoord) {\n    fragColor = vec4(undeclared, 1.0);\n}\n";
        let mut render = start(payload, CancelToken::new());
        assert_eq!(render.status(), LoopStatus::Idle);
        let err = render.startup_error().expect("startup error kept");
        assert_eq!(err.stage(), Some(StageKind::Fragment));
        assert!(!err.log().trim().is_empty());

        let mut scheduler = CountingScheduler::default();
        assert!(!render.arm(&mut scheduler));
        for _ in 0..3 {
            assert_eq!(render.tick(&mut scheduler).unwrap(), TickOutcome::Stopped);
        }
        assert_eq!(render.host().draw_count(), 0);
        assert_eq!(scheduler.requests, 0);
        assert_eq!(render.host().live_stages(), 0);
        assert_eq!(render.host().live_programs(), 0);
    }

    #[test]
    fn cancellation_stops_rescheduling() {
        let cancel = CancelToken::new();
        let mut render = start(TORUS_FRAGMENT_PAYLOAD, cancel.clone());
        let mut scheduler = CountingScheduler::default();
        assert!(render.arm(&mut scheduler));
        render.tick(&mut scheduler).unwrap();
        assert_eq!(scheduler.requests, 2);

        cancel.cancel();
        assert_eq!(render.status(), LoopStatus::Cancelled);
        assert_eq!(render.tick(&mut scheduler).unwrap(), TickOutcome::Stopped);
        assert_eq!(scheduler.requests, 2);
        assert_eq!(render.host().draw_count(), 1);
    }

    #[test]
    fn cancel_wakes_registered_waker_once() {
        let cancel = CancelToken::new();
        let (tx, rx) = std::sync::mpsc::channel();
        cancel.on_cancel(move || tx.send(()).unwrap());

        let remote = cancel.clone();
        std::thread::spawn(move || {
            remote.cancel();
            remote.cancel();
        })
        .join()
        .unwrap();

        rx.recv_timeout(std::time::Duration::from_secs(1)).unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn waker_registered_after_cancel_runs_immediately() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let (tx, rx) = std::sync::mpsc::channel();
        cancel.on_cancel(move || tx.send(()).unwrap());
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn time_uniform_follows_clock() {
        let mut render = start(TORUS_FRAGMENT_PAYLOAD, CancelToken::new());
        render.tick(&mut CountingScheduler::default()).unwrap();

        let LoopState::Running { program, .. } = &render.state else {
            panic!("loop should be running");
        };
        let program = *program;
        assert_eq!(render.host().uniform_value(&program, "u_time"), Some(vec![0.5]));
        assert_eq!(
            render.host().uniform_value(&program, "u_resolution"),
            Some(vec![300.0, 150.0])
        );
    }
}
