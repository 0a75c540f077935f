//! `rover-cli` – the rover's ignition switch.
//!
//! This binary:
//!
//! 1. Checks for `~/.rover/config.toml`, writing defaults on first run.
//! 2. Wires the camera, motion coordinator, inference queue and TTS client
//!    into a [`ControlLoop`].
//! 3. Runs the perception-action loop until **Ctrl-C**, then ramps every
//!    actuator to a safe stop before exiting.

mod config;

use std::sync::Arc;
use std::time::Duration;

use colored::Colorize;
use tracing::warn;

use rover_client::{
    ChatHistory, InferenceQueue, OllamaBackend, PromptBuilder, ResponseParser, SpeechSink,
    TtsClient,
};
use rover_hal::sim::{SimCamera, SimServo, SimTrack};
use rover_motion::MotionCoordinator;
use rover_runtime::{ControlLoop, ControlLoopConfig};
use rover_types::RoverError;

#[tokio::main]
async fn main() {
    // Initialise tracing-subscriber using RUST_LOG (defaults to "info").
    // Set ROVER_LOG_FORMAT=json to emit newline-delimited JSON logs suitable
    // for log aggregators.  User-facing output still uses println! for UX
    // consistency.
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    if std::env::var("ROVER_LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .compact()
            .init();
    }

    print_banner();

    let cfg = match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => {
            let cfg = config::Config::default();
            match config::save(&cfg) {
                Ok(()) => println!(
                    "  {} Default config written to {}",
                    "✓".green().bold(),
                    config::config_path().display().to_string().bold()
                ),
                Err(e) => println!("{}: {}", "Error saving config".red(), e),
            }
            cfg
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            config::Config::default()
        }
    };

    if let Err(err) = run(cfg).await {
        eprintln!("{}: {}", "Fatal".red().bold(), err);
        std::process::exit(1);
    }
}

async fn run(cfg: config::Config) -> Result<(), RoverError> {
    // Sim drivers keep the stack runnable on any workstation; physical
    // servo/track/camera drivers slot in behind the same HAL traits.
    let (servo, _servo_log) = SimServo::new("head");
    let (left, _left_log) = SimTrack::new("left_track");
    let (right, _right_log) = SimTrack::new("right_track");
    let mut coordinator = MotionCoordinator::new();
    coordinator.register_head(servo);
    coordinator.register_tracks(left, right);
    let coordinator = Arc::new(coordinator);

    let request_timeout = Duration::from_secs(cfg.request_timeout_secs);
    let backend = OllamaBackend::new(
        cfg.ollama_url.clone(),
        cfg.model.clone(),
        request_timeout,
        cfg.max_response_bytes,
    )?;
    let queue = Arc::new(InferenceQueue::new(
        Arc::new(backend),
        ResponseParser::default(),
    ));
    queue.start().await;

    let speech: Arc<dyn SpeechSink> = Arc::new(TtsClient::new(
        cfg.tts_url.clone(),
        cfg.tts_language.clone(),
        cfg.tts_voice.clone(),
        cfg.tts_speed,
        Duration::from_secs(10),
    )?);

    let prompt = match &cfg.prompt_template {
        Some(path) => PromptBuilder::from_file(path)?,
        None => PromptBuilder::default(),
    };

    let history_path = config::history_path();
    let history = if history_path.exists() {
        ChatHistory::load(&history_path, cfg.max_history_size)?
    } else {
        ChatHistory::new(cfg.max_history_size, cfg.model.clone())
    };

    println!(
        "  Model {} via {}\n",
        cfg.model.bold(),
        cfg.ollama_url.dimmed()
    );

    let mut control = ControlLoop::new(
        SimCamera::new("front_rgb"),
        Arc::clone(&coordinator),
        Arc::clone(&queue),
        speech,
        prompt,
        history,
        ControlLoopConfig {
            max_iterations: cfg.max_iterations,
            request_timeout,
            default_move_duration: Duration::from_secs_f32(cfg.default_move_secs.max(0.0)),
            head_move_duration: Duration::from_secs_f32(cfg.head_move_secs.max(0.0)),
            head_steps: cfg.head_steps,
            track_ramp: Duration::from_secs_f32(cfg.track_ramp_secs.max(0.0)),
            track_steps: cfg.track_steps,
            history_path: Some(history_path),
        },
    );

    let outcome = tokio::select! {
        result = control.run() => result,
        signal = tokio::signal::ctrl_c() => {
            if let Err(err) = signal {
                warn!(error = %err, "Ctrl-C handler failed; stopping anyway");
            }
            println!();
            println!("{}", "⚠  Ctrl-C received – stopping the rover …".yellow().bold());
            Ok(())
        }
    };

    // Shutdown order matters: stop feeding the actuators, then settle them.
    queue.stop().await;
    coordinator.settle_all().await?;
    println!("{}", "  ✓ Actuators settled. Goodbye.".green());
    outcome
}

fn print_banner() {
    println!();
    println!("{}", r#"   ___  ____ _  _________"#.bold().cyan());
    println!("{}", r#"  / _ \/ __ \ |/ / __/ _ \"#.bold().cyan());
    println!("{}", r#" / , _/ /_/ /    / _// , _/"#.bold().cyan());
    println!("{}", r#"/_/|_|\____/___/___/_/|_| "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "Rover".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Camera → VLM → Actuator perception-action loop");
    println!();
}
