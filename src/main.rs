//! Pulsewave - audio-reactive synthwave visualizer
//!
//! Rows of neon bars, a breathing sun and a scrolling grid, all driven
//! by the spectrum of the track that is playing.

mod logging_setup;

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use winit::{
    application::ApplicationHandler,
    event::*,
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowId},
};

use pulsewave::audio::{AudioSource, CpalBackend, PlaybackState, SignalAnalyzer};
use pulsewave::camera::CameraSystem;
use pulsewave::cli::Args;
use pulsewave::error::PlaybackError;
use pulsewave::params::VisualizerConfig;
use pulsewave::player::{Player, SEEK_STEP_SECS, VOLUME_STEP};
use pulsewave::reactive::{FrameOutcome, ReactiveLoop};
use pulsewave::rendering::RenderSystem;

/// Headless frame interval (~60 Hz)
const HEADLESS_FRAME: Duration = Duration::from_millis(16);

/// Main application state
struct App {
    // Window and rendering
    window: Option<Arc<Window>>,
    render_system: Option<RenderSystem>,

    // Playback and animation
    player: Player<CpalBackend>,
    reactive: ReactiveLoop,
    camera: CameraSystem,

    // Configuration
    config: VisualizerConfig,

    // Time tracking
    start_time: Instant,

    /// Track index the scene hue was last set from
    hue_track: Option<usize>,
    title: String,
}

impl App {
    fn new(player: Player<CpalBackend>, config: VisualizerConfig) -> Self {
        let reactive = new_reactive_loop(&config);
        let camera = CameraSystem::new(&config.render, config.scene.camera_sway_m);

        Self {
            window: None,
            render_system: None,
            player,
            reactive,
            camera,
            config,
            start_time: Instant::now(),
            hue_track: None,
            title: String::new(),
        }
    }

    fn handle_key(&mut self, key: KeyCode, event_loop: &ActiveEventLoop) {
        let result = match key {
            KeyCode::Escape => {
                event_loop.exit();
                Ok(())
            }
            KeyCode::Space => self.player.toggle(),
            KeyCode::ArrowRight => self.player.next(),
            KeyCode::ArrowLeft => self.player.previous(),
            KeyCode::ArrowUp => {
                self.player.set_volume(self.player.volume() + VOLUME_STEP);
                Ok(())
            }
            KeyCode::ArrowDown => {
                self.player.set_volume(self.player.volume() - VOLUME_STEP);
                Ok(())
            }
            KeyCode::Period => self.player.seek_by(SEEK_STEP_SECS),
            KeyCode::Comma => self.player.seek_by(-SEEK_STEP_SECS),
            _ => return,
        };
        report(result);
    }
}

impl ApplicationHandler for App {
    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }

    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return; // Already initialized
        }

        // Create window
        let window_attributes = Window::default_attributes()
            .with_title("Pulsewave")
            .with_inner_size(winit::dpi::LogicalSize::new(
                self.config.render.window_width,
                self.config.render.window_height,
            ));

        let window = match event_loop.create_window(window_attributes) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                error!("Failed to create window: {}", e);
                event_loop.exit();
                return;
            }
        };

        // Initialize rendering system
        let bar_count = self.reactive.scene().bars.len();
        let render_system =
            match pollster::block_on(RenderSystem::new(Arc::clone(&window), bar_count)) {
                Ok(render_system) => render_system,
                Err(e) => {
                    error!("Failed to initialize renderer: {}", e);
                    event_loop.exit();
                    return;
                }
            };

        info!("Pulsewave is running");
        info!("Space play/pause, arrows track and volume, comma/period seek, Esc quit");

        self.window = Some(window);
        self.render_system = Some(render_system);
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        state: ElementState::Pressed,
                        physical_key: PhysicalKey::Code(key),
                        repeat: false,
                        ..
                    },
                ..
            } => self.handle_key(key, event_loop),
            WindowEvent::Resized(size) => {
                if size.width > 0 && size.height > 0 {
                    self.config.render.window_width = size.width;
                    self.config.render.window_height = size.height;
                }
                if let Some(render_system) = &mut self.render_system {
                    render_system.resize(size.width, size.height);
                }
            }
            WindowEvent::RedrawRequested => {
                self.render_frame();
            }
            _ => {}
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.player.source_mut().stop();
    }
}

impl App {
    /// Render a single frame
    fn render_frame(&mut self) {
        let Some(render_system) = &mut self.render_system else {
            return;
        };

        // Get current time
        let time_s = self.start_time.elapsed().as_secs_f32();

        // Auto-advance, then tint the scene if the track changed
        report(self.player.tick().map(|_| ()));
        sync_track_hue(&self.player, &mut self.reactive, &mut self.hue_track);

        // Poll the spectrum and advance the scene
        self.reactive.frame(self.player.source_mut(), time_s);
        let scene = self.reactive.scene();

        // Update camera
        let (view_proj, _eye) = self
            .camera
            .create_view_proj_matrix(scene, &self.config.render);

        render_system.apply_scene(scene, &self.config.scene, view_proj);

        // Render
        match render_system.render() {
            Ok(()) => {}
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                render_system.resize(
                    self.config.render.window_width,
                    self.config.render.window_height,
                );
            }
            Err(e) => error!("Render error: {:?}", e),
        }

        self.update_title();
    }

    fn update_title(&mut self) {
        let Some(window) = &self.window else {
            return;
        };
        let title = window_title(&self.player);
        if title != self.title {
            window.set_title(&title);
            self.title = title;
        }
    }
}

fn new_reactive_loop(config: &VisualizerConfig) -> ReactiveLoop {
    ReactiveLoop::new(
        config.reactive.clone(),
        config.scene.clone(),
        config.analyser.bin_count(),
    )
}

/// Re-tint the scene when the current track differs from the last one seen
fn sync_track_hue(
    player: &Player<CpalBackend>,
    reactive: &mut ReactiveLoop,
    hue_track: &mut Option<usize>,
) {
    let index = player.current_index();
    if *hue_track == Some(index) {
        return;
    }
    *hue_track = Some(index);
    if let Some(hue) = player.current_track().and_then(|t| t.hue()) {
        reactive.set_base_hue(hue);
    }
}

fn window_title(player: &Player<CpalBackend>) -> String {
    let state = match player.state() {
        PlaybackState::Playing => "Playing",
        PlaybackState::Paused => "Paused",
        PlaybackState::Stopped => "Stopped",
    };
    let track = player
        .current_track()
        .map(|t| t.label())
        .unwrap_or_else(|| "No track".to_string());
    format!(
        "Pulsewave - {} [{}] {:.0}%",
        track,
        state,
        player.volume() * 100.0
    )
}

/// Playback failures are reported and the visuals carry on
fn report(result: Result<(), PlaybackError>) {
    match result {
        Ok(()) => {}
        Err(e @ PlaybackError::NoOutputDevice) => error!("Playback failed: {}", e),
        Err(e) => warn!("Playback failed: {}", e),
    }
}

/// Drive the player and reactive loop without a window, logging once a second
fn run_headless(mut player: Player<CpalBackend>, config: &VisualizerConfig, seconds: f32) {
    info!("Headless run for {:.1}s", seconds);

    let mut reactive = new_reactive_loop(config);
    let mut hue_track = None;
    let start = Instant::now();
    let mut next_report = 1.0;
    let mut beats = 0u32;

    loop {
        let time_s = start.elapsed().as_secs_f32();
        if time_s >= seconds {
            break;
        }

        report(player.tick().map(|_| ()));
        sync_track_hue(&player, &mut reactive, &mut hue_track);

        if let FrameOutcome::Active { beat: true } = reactive.frame(player.source_mut(), time_s) {
            beats += 1;
        }

        if time_s >= next_report {
            let metrics = reactive.metrics();
            info!(
                "t={:5.1}s {:?} pos={:6.1}s bass={:.3} mid={:.3} peak={:.3} beats={}",
                time_s,
                reactive.phase(),
                player.position_secs(),
                metrics.bass,
                metrics.mid,
                metrics.peak,
                beats
            );
            beats = 0;
            next_report += 1.0;
        }

        thread::sleep(HEADLESS_FRAME);
    }

    if reactive.held_frames() > 0 {
        info!("Held {} frames waiting for audio", reactive.held_frames());
    }
    player.source_mut().stop();
}

fn main() -> Result<()> {
    let args = Args::parse();
    logging_setup::init(&args.log_level)?;

    info!("Pulsewave - audio-reactive synthwave visualizer");

    let config = args.load_config().context("Failed to load configuration")?;
    let playlist = args.load_playlist().context("Failed to load track list")?;

    let analyzer = SignalAnalyzer::new(CpalBackend::new(), config.analyser.clone());
    let mut player = Player::new(analyzer, playlist);
    player.set_volume(args.volume);

    if let Some(id) = &args.track {
        match player.select(id) {
            Ok(true) => {}
            Ok(false) => warn!("Unknown track id '{}', starting from the first track", id),
            Err(e) => warn!("Playback failed: {}", e),
        }
    }

    if args.autoplay || args.headless.is_some() {
        report(player.play());
    }

    if let Some(seconds) = args.headless {
        run_headless(player, &config, seconds);
        return Ok(());
    }

    let mut app = App::new(player, config);
    let event_loop = EventLoop::new().context("Failed to create event loop")?;
    event_loop
        .run_app(&mut app)
        .context("Event loop terminated with an error")?;
    Ok(())
}
