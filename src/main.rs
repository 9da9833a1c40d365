// =============================================================================
// SPINNING TRIANGLE - Launcher
// =============================================================================
//
// Opens a fixed-size window, hands its raw handles to the Vulkan engine and
// redraws continuously. Any engine error is fatal: it is logged and the
// process exits with status 1 after releasing what was created.
//
// =============================================================================

use anyhow::{Context, Result};
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};
use spinning_triangle::config::{Config, DEFAULT_EXTENT};
use spinning_triangle::geometry::cycle_at;
use spinning_triangle::{Engine, EngineOptions};
use std::time::{Duration, Instant};
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowAttributes},
};

const CONFIG_PATH: &str = "config.toml";

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> Result<()> {
    // Logging depends on the config, so load errors are reported afterwards
    let (config, config_error) = match Config::load_from_path(CONFIG_PATH) {
        Ok(config) => (config, None),
        Err(e) => (Config::default(), Some(e)),
    };

    init_logging(&config);
    if let Some(e) = config_error {
        log::warn!("Failed to load {}: {:#}. Using defaults.", CONFIG_PATH, e);
    }
    log::info!("Starting {}", config.window.title);

    let event_loop = EventLoop::new()?;
    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    if let Some(e) = app.error.take() {
        log::error!("{:#}", e);
        std::process::exit(1);
    }
    Ok(())
}

/// Info by default; the config filter wins over RUST_LOG.
fn init_logging(config: &Config) {
    use env_logger::Builder;
    use log::LevelFilter;

    let mut builder = Builder::new();
    builder.filter_level(LevelFilter::Info);

    match &config.debug.log_filter {
        Some(filter) => {
            builder.parse_filters(filter);
        }
        None => {
            if let Ok(filter) = std::env::var("RUST_LOG") {
                builder.parse_filters(&filter);
            }
        }
    }

    builder.init();
}

// =============================================================================
// APPLICATION STATE
// =============================================================================

/// Field order matters for Drop: the engine's surface must go before the
/// window it was created from.
struct App {
    config: Config,
    rotation_period: Duration,

    engine: Option<Engine>,
    window: Option<Window>,

    started: Instant,
    /// First fatal error; reported once the event loop has returned
    error: Option<anyhow::Error>,
}

impl App {
    fn new(config: Config) -> Self {
        let rotation_period = config.rotation_period();
        Self {
            config,
            rotation_period,
            engine: None,
            window: None,
            started: Instant::now(),
            error: None,
        }
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window_attributes = WindowAttributes::default()
            .with_title(&self.config.window.title)
            .with_inner_size(PhysicalSize::new(DEFAULT_EXTENT.width, DEFAULT_EXTENT.height))
            .with_resizable(false);

        let window = event_loop
            .create_window(window_attributes)
            .context("Failed to create window")?;

        let display = window.raw_display_handle();
        let raw_window = window.raw_window_handle();

        let options = EngineOptions {
            app_name: self.config.window.title.clone(),
            // Validation only ever runs in debug builds
            enable_validation: self.config.debug.validation_layers && cfg!(debug_assertions),
        };

        // Store the window first so it outlives an engine created from it
        self.window = Some(window);

        let engine =
            Engine::new(display, raw_window, &options).context("Failed to initialize Vulkan")?;
        let extent = engine.extent();
        log::info!(
            "Rendering at {}x{}, one rotation every {:.2}s",
            extent.width,
            extent.height,
            self.rotation_period.as_secs_f32()
        );

        self.engine = Some(engine);
        self.started = Instant::now();
        Ok(())
    }

    fn redraw(&mut self) -> Result<()> {
        let Some(engine) = self.engine.as_mut() else {
            return Ok(());
        };
        let cycle = cycle_at(self.started.elapsed(), self.rotation_period);
        engine.draw(cycle).context("Failed to draw frame")?;
        Ok(())
    }

    /// Release Vulkan before the window, then leave the event loop.
    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        drop(self.engine.take());
        self.window = None;
        event_loop.exit();
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        if self.error.is_none() {
            self.error = Some(error);
        }
        self.shutdown(event_loop);
    }
}

// =============================================================================
// EVENT HANDLING
// =============================================================================

impl ApplicationHandler for App {
    /// Called when the application is ready to create windows.
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        if let Err(e) = self.init(event_loop) {
            self.fail(event_loop, e);
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                self.shutdown(event_loop);
            }

            WindowEvent::RedrawRequested => {
                if let Err(e) = self.redraw() {
                    self.fail(event_loop, e);
                }
            }

            WindowEvent::KeyboardInput { event, .. } => {
                if event.state.is_pressed()
                    && event.physical_key == PhysicalKey::Code(KeyCode::Escape)
                {
                    log::info!("ESC pressed, exiting...");
                    self.shutdown(event_loop);
                }
            }

            _ => {}
        }
    }

    /// Keep redrawing; FIFO presentation paces the loop.
    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }
}
