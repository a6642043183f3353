//! winit host window and the two threading modes that drive it.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context as _};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, TryRecvError};
use tracing::{debug, info, warn};
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, Event, WindowEvent};
use winit::event_loop::{EventLoop, EventLoopBuilder, EventLoopProxy, EventLoopWindowTarget};
use winit::keyboard::{Key, NamedKey};
use winit::platform::pump_events::{EventLoopExtPumpEvents, PumpStatus};
use winit::window::{Fullscreen, Window, WindowBuilder, WindowId};

use crate::clock::SystemClock;
use crate::gpu::WgpuBackend;
use crate::scheduler::{ClosedFlag, EventPump, HostEvent};
use crate::types::{SaverConfig, WindowStyle};
use crate::{start_scheduler, SaverError};

/// Maps a pressed key to the request it stands for.
fn key_request(key: &Key) -> HostEvent {
    match key {
        Key::Named(NamedKey::Escape) => HostEvent::CloseRequested,
        Key::Named(NamedKey::Space) => HostEvent::PowerOff,
        Key::Character(text) if text.as_str().eq_ignore_ascii_case("p") => HostEvent::PowerOff,
        Key::Character(text) if text.as_str() == " " => HostEvent::PowerOff,
        _ => HostEvent::PowerOn,
    }
}

/// Translates a winit window event into a render loop request, if any.
pub(crate) fn translate_window_event(event: &WindowEvent) -> Option<HostEvent> {
    match event {
        WindowEvent::CloseRequested | WindowEvent::Destroyed => Some(HostEvent::CloseRequested),
        WindowEvent::Resized(size) => Some(HostEvent::Resized {
            width: size.width,
            height: size.height,
        }),
        WindowEvent::KeyboardInput { event, .. }
            if event.state == ElementState::Pressed && !event.repeat =>
        {
            Some(key_request(&event.logical_key))
        }
        WindowEvent::MouseInput {
            state: ElementState::Pressed,
            ..
        } => Some(HostEvent::PowerOn),
        _ => None,
    }
}

fn build_event_loop<T: 'static>() -> Result<EventLoop<T>, SaverError> {
    EventLoopBuilder::<T>::with_user_event()
        .build()
        .map_err(|err| SaverError::Startup(anyhow!("failed to create event loop: {err}")))
}

/// Creates the host window hidden; [`reveal_window`] shows it once the GPU is ready.
fn create_window<T>(
    target: &EventLoopWindowTarget<T>,
    config: &SaverConfig,
) -> Result<Arc<Window>, SaverError> {
    let mut builder = WindowBuilder::new()
        .with_title(config.title.clone())
        .with_visible(false);
    builder = match config.style {
        WindowStyle::Fullscreen => builder
            .with_decorations(false)
            .with_fullscreen(Some(Fullscreen::Borderless(None))),
        WindowStyle::Windowed { width, height } => {
            builder.with_inner_size(PhysicalSize::new(width.max(1), height.max(1)))
        }
    };
    let window = builder
        .build(target)
        .map_err(|err| SaverError::Startup(anyhow!("failed to create saver window: {err}")))?;
    Ok(Arc::new(window))
}

fn reveal_window(window: &Window, style: WindowStyle) {
    window.set_visible(true);
    if style == WindowStyle::Fullscreen {
        window.set_cursor_visible(false);
    }
    window.focus_window();
}

fn create_backend(window: Arc<Window>, config: &SaverConfig) -> Result<WgpuBackend, SaverError> {
    WgpuBackend::new(window, config.gpu_power, config.vsync).map_err(SaverError::Startup)
}

/// Event pump for the cooperative mode: drains winit on the render thread.
struct WinitPump {
    event_loop: EventLoop<()>,
    window_id: WindowId,
    pending: Vec<HostEvent>,
}

impl WinitPump {
    fn pump(&mut self, timeout: Duration) {
        let window_id = self.window_id;
        let pending = &mut self.pending;
        let status = self.event_loop.pump_events(Some(timeout), |event, _| {
            if let Event::WindowEvent { window_id: id, event } = event {
                if id == window_id {
                    pending.extend(translate_window_event(&event));
                }
            }
        });
        if let PumpStatus::Exit(code) = status {
            debug!(code, "host event loop exited");
            self.pending.push(HostEvent::CloseRequested);
        }
    }
}

impl EventPump for WinitPump {
    fn drain(&mut self, events: &mut Vec<HostEvent>) {
        self.pump(Duration::ZERO);
        events.append(&mut self.pending);
    }

    fn idle_wait(&mut self, limit: Duration) {
        self.pump(limit);
    }
}

/// Runs the event pump and the frame scheduler on the calling thread.
pub(crate) fn run_cooperative(config: SaverConfig) -> Result<(), SaverError> {
    let event_loop = build_event_loop::<()>()?;
    let window = create_window(&event_loop, &config)?;
    let backend = create_backend(window.clone(), &config)?;
    let mut scheduler = start_scheduler(backend, &config, SystemClock)?;
    reveal_window(&window, config.style);
    info!(mode = "cooperative", "saver window shown");

    let mut pump = WinitPump {
        event_loop,
        window_id: window.id(),
        pending: Vec::new(),
    };
    scheduler.run(&mut pump)?;
    Ok(())
}

/// Event pump for the dedicated mode: receives forwarded events on the
/// render thread.
///
/// A disconnected channel or a raised closed flag both read as a close
/// request, so the loop stops even if the event thread vanished.
pub(crate) struct ChannelPump {
    events: Receiver<HostEvent>,
    closed: ClosedFlag,
    stash: Vec<HostEvent>,
}

impl ChannelPump {
    pub(crate) fn new(events: Receiver<HostEvent>, closed: ClosedFlag) -> Self {
        Self {
            events,
            closed,
            stash: Vec::new(),
        }
    }
}

impl EventPump for ChannelPump {
    fn drain(&mut self, events: &mut Vec<HostEvent>) {
        events.append(&mut self.stash);
        loop {
            match self.events.try_recv() {
                Ok(event) => events.push(event),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    events.push(HostEvent::CloseRequested);
                    break;
                }
            }
        }
        if self.closed.is_closed() {
            events.push(HostEvent::CloseRequested);
        }
    }

    fn idle_wait(&mut self, limit: Duration) {
        match self.events.recv_timeout(limit) {
            Ok(event) => self.stash.push(event),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => self.stash.push(HostEvent::CloseRequested),
        }
    }
}

/// Wakes the event thread when the render thread is done.
#[derive(Debug, Clone, Copy)]
enum RenderSignal {
    Finished,
}

/// Sends [`RenderSignal::Finished`] when dropped, even while unwinding.
struct FinishGuard(EventLoopProxy<RenderSignal>);

impl Drop for FinishGuard {
    fn drop(&mut self) {
        let _ = self.0.send_event(RenderSignal::Finished);
    }
}

/// Keeps the event loop on the calling thread and renders on a dedicated one.
pub(crate) fn run_dedicated(config: SaverConfig) -> Result<(), SaverError> {
    let event_loop = build_event_loop::<RenderSignal>()?;
    let window = create_window(&event_loop, &config)?;
    let backend = create_backend(window.clone(), &config)?;
    let style = config.style;

    let (event_tx, event_rx) = unbounded();
    let closed = ClosedFlag::new();
    let guard = FinishGuard(event_loop.create_proxy());
    let render_closed = closed.clone();
    let handle = thread::Builder::new()
        .name("oledsaver-render".into())
        .spawn(move || {
            let _guard = guard;
            let mut scheduler = start_scheduler(backend, &config, SystemClock)?;
            let mut pump = ChannelPump::new(event_rx, render_closed);
            scheduler.run(&mut pump)?;
            Ok::<(), SaverError>(())
        })
        .context("failed to spawn render thread")
        .map_err(SaverError::Startup)?;

    reveal_window(&window, style);
    info!(mode = "dedicated", "saver window shown");

    let window_id = window.id();
    let event_closed = closed.clone();
    let run_result = event_loop.run(move |event, elwt| match event {
        Event::UserEvent(RenderSignal::Finished) => {
            debug!("render thread finished");
            elwt.exit();
        }
        Event::WindowEvent { window_id: id, event } if id == window_id => {
            let Some(request) = translate_window_event(&event) else {
                return;
            };
            if request == HostEvent::CloseRequested {
                // Keep the window alive until the render thread stops drawing.
                event_closed.close();
            }
            if event_tx.send(request).is_err() {
                elwt.exit();
            }
        }
        _ => {}
    });
    closed.close();

    let render_result = handle
        .join()
        .map_err(|_| SaverError::Startup(anyhow!("render thread panicked")))?;
    if let Err(err) = run_result {
        warn!(error = %err, "host event loop ended with an error");
        render_result?;
        return Err(SaverError::Startup(anyhow!("host event loop failed: {err}")));
    }
    render_result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::LoopExit;
    use crate::surface::tests::FakeBackend;
    use crossbeam_channel::bounded;
    use std::time::Instant;

    #[test]
    fn resize_and_close_are_forwarded() {
        assert_eq!(
            translate_window_event(&WindowEvent::Resized(PhysicalSize::new(640, 480))),
            Some(HostEvent::Resized {
                width: 640,
                height: 480
            })
        );
        assert_eq!(
            translate_window_event(&WindowEvent::CloseRequested),
            Some(HostEvent::CloseRequested)
        );
        assert_eq!(translate_window_event(&WindowEvent::Focused(true)), None);
    }

    #[test]
    fn keys_map_to_power_requests() {
        assert_eq!(
            key_request(&Key::Named(NamedKey::Escape)),
            HostEvent::CloseRequested
        );
        assert_eq!(key_request(&Key::Named(NamedKey::Space)), HostEvent::PowerOff);
        assert_eq!(key_request(&Key::Character("P".into())), HostEvent::PowerOff);
        assert_eq!(key_request(&Key::Character("p".into())), HostEvent::PowerOff);
        assert_eq!(key_request(&Key::Character("x".into())), HostEvent::PowerOn);
        assert_eq!(key_request(&Key::Named(NamedKey::Enter)), HostEvent::PowerOn);
    }

    #[test]
    fn channel_pump_drains_in_order() {
        let (tx, rx) = unbounded();
        let mut pump = ChannelPump::new(rx, ClosedFlag::new());
        tx.send(HostEvent::PowerOff).unwrap();
        tx.send(HostEvent::PowerOn).unwrap();

        let mut events = Vec::new();
        pump.drain(&mut events);
        assert_eq!(events, vec![HostEvent::PowerOff, HostEvent::PowerOn]);

        events.clear();
        pump.drain(&mut events);
        assert!(events.is_empty());
    }

    #[test]
    fn channel_pump_reports_close_when_flag_raised_or_sender_dropped() {
        let (tx, rx) = unbounded::<HostEvent>();
        let closed = ClosedFlag::new();
        let mut pump = ChannelPump::new(rx, closed.clone());
        closed.close();
        let mut events = Vec::new();
        pump.drain(&mut events);
        assert_eq!(events, vec![HostEvent::CloseRequested]);

        let (tx2, rx2) = unbounded::<HostEvent>();
        let mut pump = ChannelPump::new(rx2, ClosedFlag::new());
        drop(tx2);
        let mut events = Vec::new();
        pump.drain(&mut events);
        assert_eq!(events, vec![HostEvent::CloseRequested]);
        drop(tx);
    }

    #[test]
    fn idle_wait_returns_early_on_input() {
        let (tx, rx) = bounded(1);
        let mut pump = ChannelPump::new(rx, ClosedFlag::new());
        let sender = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            tx.send(HostEvent::PowerOn).unwrap();
        });

        let start = Instant::now();
        pump.idle_wait(Duration::from_secs(10));
        assert!(start.elapsed() < Duration::from_secs(5));
        sender.join().unwrap();

        let mut events = Vec::new();
        pump.drain(&mut events);
        assert_eq!(events.first(), Some(&HostEvent::PowerOn));
    }

    #[test]
    fn idle_wait_times_out_without_input() {
        let (_tx, rx) = unbounded::<HostEvent>();
        let mut pump = ChannelPump::new(rx, ClosedFlag::new());
        let start = Instant::now();
        pump.idle_wait(Duration::from_millis(30));
        assert!(start.elapsed() >= Duration::from_millis(30));
        let mut events = Vec::new();
        pump.drain(&mut events);
        assert!(events.is_empty());
    }

    #[test]
    fn render_thread_observes_closed_flag_and_joins() {
        let (tx, rx) = unbounded();
        let closed = ClosedFlag::new();
        let render_closed = closed.clone();
        let handle = thread::spawn(move || {
            let config = SaverConfig {
                idle_interval: Duration::from_millis(5),
                ..SaverConfig::default()
            };
            let mut scheduler =
                start_scheduler(FakeBackend::default(), &config, SystemClock).unwrap();
            let mut pump = ChannelPump::new(rx, render_closed);
            let exit = scheduler.run(&mut pump).unwrap();
            (exit, scheduler.surface().presented_frames())
        });

        thread::sleep(Duration::from_millis(20));
        closed.close();
        let (exit, frames) = handle.join().unwrap();
        assert_eq!(exit, LoopExit::Closed);
        assert!(frames > 0);
        drop(tx);
    }
}
