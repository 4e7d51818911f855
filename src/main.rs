mod audio_feedback;
mod backends;
mod config;
mod config_persistence;
mod console_input;
mod console_renderer;
mod error;
mod extrapolation;
mod glitch_filter;
mod lifecycle;
mod playlist_navigator;
mod progress_surface;
mod protocol;
mod seek_bar;
mod session_controller;
mod session_state;
mod transport;

use std::io;
use std::sync::Arc;
use std::thread;

use log::{error, info};
use tokio::sync::broadcast;

use audio_feedback::BusAudioFeedback;
use backends::http::HttpSessionBackend;
use config_persistence::{
    apply_env_overrides, default_config_path, load_or_create_config, API_BASE_ENV_VAR,
};
use console_input::{run_console_input, HELP_TEXT};
use console_renderer::ConsoleRenderer;
use progress_surface::RetainedProgressHandle;
use session_controller::SessionController;

fn panic_payload_to_string(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        return (*s).to_string();
    }
    if let Some(s) = payload.downcast_ref::<String>() {
        return s.clone();
    }
    "non-string panic payload".to_string()
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut clog = colog::default_builder();
    clog.filter(None, log::LevelFilter::Trace);
    clog.init();
    log::set_max_level(log::LevelFilter::Info);

    std::panic::set_hook(Box::new(|panic_info| {
        let current_thread = std::thread::current();
        let thread_name = current_thread.name().unwrap_or("unnamed");
        log::error!("panic in thread '{}': {}", thread_name, panic_info);
    }));

    let config_path = default_config_path();
    let config = load_or_create_config(&config_path)?;
    let config = apply_env_overrides(config, std::env::var(API_BASE_ENV_VAR).ok());
    log::set_max_level(config.logging.level.to_filter());

    info!(
        "Session backend: {} (config {})",
        config.backend.api_base,
        config_path.display()
    );

    // Bus for communication between components
    let (bus_sender, _) = broadcast::channel(1024);
    let progress = RetainedProgressHandle::new();

    // Setup session controller
    let controller_bus_receiver = bus_sender.subscribe();
    let controller_bus_sender = bus_sender.clone();
    let controller_progress = progress.clone();
    let controller_config = config.clone();
    let controller_thread = thread::Builder::new()
        .name("session-controller".to_string())
        .spawn(move || {
            let backend = Arc::new(HttpSessionBackend::new(&controller_config.backend));
            let audio = Arc::new(BusAudioFeedback::new(controller_bus_sender.clone()));
            let controller = SessionController::new(
                controller_bus_receiver,
                controller_bus_sender,
                backend,
                audio,
                Arc::new(controller_progress),
                &controller_config,
            );
            let run_result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                controller.run_blocking()
            }));
            match run_result {
                Ok(Ok(())) => {}
                Ok(Err(err)) => error!("SessionController runtime failed to start: {}", err),
                Err(payload) => error!(
                    "SessionController thread terminated due to panic: {}",
                    panic_payload_to_string(payload.as_ref())
                ),
            }
        })?;

    // Setup console renderer
    let renderer_bus_receiver = bus_sender.subscribe();
    let renderer_thread = thread::Builder::new()
        .name("console-renderer".to_string())
        .spawn(move || {
            let mut renderer = ConsoleRenderer::new(renderer_bus_receiver, progress);
            renderer.run();
        })?;

    println!("{HELP_TEXT}");
    run_console_input(io::stdin().lock(), bus_sender);

    let _ = controller_thread.join();
    let _ = renderer_thread.join();
    info!("Application exiting");
    Ok(())
}
