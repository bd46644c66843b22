use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tracing::{debug, error, info, warn};
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, Event, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoopBuilder};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowBuilder};

use crate::clock::MonotonicClock;
use crate::compile::{wrap_fragment, VERTEX_SHADER_GLSL};
use crate::gpu::WgpuHost;
use crate::host::{FrameScheduler, PresentError};
use crate::render_loop::{CancelToken, LoopStatus, RenderLoop, TickOutcome};
use crate::types::{RendererConfig, ShaderSource};

/// Sent through the event loop proxy to wake a waiting loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WindowCommand {
    Shutdown,
}

/// Schedules ticks through winit's redraw requests, which the platform
/// delivers in step with the display refresh.
struct RedrawScheduler<'a> {
    window: &'a Window,
}

impl FrameScheduler for RedrawScheduler<'_> {
    fn request_frame(&mut self) {
        self.window.request_redraw();
    }
}

/// What the event loop does once a redraw has been handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AfterTick {
    Continue,
    Retry,
    Exit,
}

fn after_tick(outcome: Result<TickOutcome, PresentError>, cancel: &CancelToken) -> AfterTick {
    match outcome {
        Ok(TickOutcome::Stopped) if cancel.is_cancelled() => AfterTick::Exit,
        Ok(_) => AfterTick::Continue,
        Err(PresentError::OutOfMemory) => {
            error!("surface out of memory; exiting");
            cancel.cancel();
            AfterTick::Exit
        }
        Err(err) => {
            warn!(error = %err, "retrying next frame");
            AfterTick::Retry
        }
    }
}

/// Opens the window and drives the render loop until it is closed.
///
/// A shader that fails to build leaves the window open and black; the
/// diagnostics have already been logged by then.
pub(crate) fn run(config: &RendererConfig, cancel: CancelToken) -> Result<()> {
    let event_loop = EventLoopBuilder::<WindowCommand>::with_user_event()
        .build()
        .context("failed to initialize event loop")?;
    let proxy = event_loop.create_proxy();
    cancel.on_cancel(move || {
        let _ = proxy.send_event(WindowCommand::Shutdown);
    });
    let window_size = PhysicalSize::new(config.surface_size.0, config.surface_size.1);
    let window = WindowBuilder::new()
        .with_title(config.title.as_str())
        .with_inner_size(window_size)
        .build(&event_loop)
        .context("failed to create window")?;
    let window = Arc::new(window);

    let host = WgpuHost::new(window.clone(), config.gpu_power)?;
    let mut render = RenderLoop::start(
        host,
        &ShaderSource::vertex(VERTEX_SHADER_GLSL),
        &ShaderSource::fragment(wrap_fragment(&config.fragment_payload)),
        Box::new(MonotonicClock::new()),
        cancel.clone(),
    );
    if render.status() == LoopStatus::Idle {
        warn!("shader program unavailable; the window will stay blank");
    }
    render.arm(&mut RedrawScheduler { window: &window });

    let run_result = event_loop.run(move |event, elwt| {
        elwt.set_control_flow(ControlFlow::Wait);

        match event {
            Event::UserEvent(WindowCommand::Shutdown) => {
                debug!("shutdown requested");
                elwt.exit();
            }
            Event::AboutToWait if cancel.is_cancelled() => elwt.exit(),
            Event::WindowEvent { window_id, event } if window_id == window.id() => match event {
                WindowEvent::CloseRequested | WindowEvent::Destroyed => {
                    cancel.cancel();
                    elwt.exit();
                }
                WindowEvent::KeyboardInput { event, .. }
                    if event.state == ElementState::Pressed
                        && matches!(event.logical_key, Key::Named(NamedKey::Escape)) =>
                {
                    cancel.cancel();
                    elwt.exit();
                }
                WindowEvent::RedrawRequested => {
                    let mut scheduler = RedrawScheduler { window: &window };
                    match after_tick(render.tick(&mut scheduler), &cancel) {
                        AfterTick::Continue => {}
                        AfterTick::Retry => scheduler.request_frame(),
                        AfterTick::Exit => elwt.exit(),
                    }
                }
                _ => {}
            },
            Event::LoopExiting => {
                info!(
                    frames = render.frames_rendered(),
                    fps = render.frames_per_second().round(),
                    "render loop finished"
                );
            }
            _ => {}
        }
    });

    run_result.map_err(|err| anyhow!("window event loop error: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FrozenClock;
    use crate::compile::TORUS_FRAGMENT_PAYLOAD;
    use crate::headless::HeadlessHost;

    struct NoopScheduler;

    impl FrameScheduler for NoopScheduler {
        fn request_frame(&mut self) {}
    }

    fn torus_loop(cancel: CancelToken) -> RenderLoop<HeadlessHost> {
        RenderLoop::start(
            HeadlessHost::new(),
            &ShaderSource::vertex(VERTEX_SHADER_GLSL),
            &ShaderSource::fragment(wrap_fragment(TORUS_FRAGMENT_PAYLOAD)),
            Box::new(FrozenClock::at(0.0)),
            cancel,
        )
    }

    #[test]
    fn cancelled_loop_ends_the_event_loop() {
        let cancel = CancelToken::new();
        let mut render = torus_loop(cancel.clone());
        assert_eq!(
            after_tick(render.tick(&mut NoopScheduler), &cancel),
            AfterTick::Continue
        );

        let remote = cancel.clone();
        std::thread::spawn(move || remote.cancel()).join().unwrap();
        assert_eq!(
            after_tick(render.tick(&mut NoopScheduler), &cancel),
            AfterTick::Exit
        );
    }

    #[test]
    fn cancel_sends_shutdown_command() {
        let cancel = CancelToken::new();
        let (tx, rx) = std::sync::mpsc::channel();
        cancel.on_cancel(move || {
            let _ = tx.send(WindowCommand::Shutdown);
        });
        cancel.cancel();
        assert_eq!(rx.try_recv(), Ok(WindowCommand::Shutdown));
    }

    #[test]
    fn present_failures_retry_or_exit() {
        let cancel = CancelToken::new();
        let timeout = PresentError::Surface("timeout".into());
        assert_eq!(after_tick(Err(timeout), &cancel), AfterTick::Retry);
        assert!(!cancel.is_cancelled());
        assert_eq!(
            after_tick(Err(PresentError::OutOfMemory), &cancel),
            AfterTick::Exit
        );
        assert!(cancel.is_cancelled());
    }

    #[test]
    fn idle_loop_keeps_window_open_until_cancelled() {
        let cancel = CancelToken::new();
        assert_eq!(after_tick(Ok(TickOutcome::Stopped), &cancel), AfterTick::Continue);
        cancel.cancel();
        assert_eq!(after_tick(Ok(TickOutcome::Stopped), &cancel), AfterTick::Exit);
    }
}
