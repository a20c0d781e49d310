pub mod acquisition;
pub mod audio;
pub mod classifier;
pub mod cli;
pub mod error;
pub mod events;
pub mod feedback;
pub mod interpret;
pub mod liveness;
pub mod models;
pub mod progress;
pub mod session;
pub mod settings;
mod utils;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

use acquisition::{DeviceStreamSource, FrameDirSource, SampleSource, SimulatedGloveSource};
use audio::RodioPlayback;
use classifier::HttpClassifier;
use cli::{CliArgs, Command};
use events::ControllerEvent;
use progress::{EchoPolicy, PracticePolicy, TargetPolicy};
use session::SessionController;
use settings::SettingsStore;

pub fn run() -> Result<()> {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let args = CliArgs::parse();

    let store = SettingsStore::new(args.config.clone().unwrap_or_else(SettingsStore::default_path))?;
    let mut settings = store.get();
    settings.apply_env_overrides();
    if let Some(url) = &args.url {
        settings.classifier.base_url = url.clone();
    }
    if args.no_audio {
        settings.audio_enabled = false;
    }

    let (source, policy): (Arc<dyn SampleSource>, Box<dyn TargetPolicy>) = match &args.command {
        Command::Practice { frames } => {
            settings.classifier.device_status_path = None;
            (
                Arc::new(FrameDirSource::new(frames.clone())),
                Box::new(PracticePolicy::new(settings.practice_set.clone())),
            )
        }
        Command::Pair { simulate } => {
            let source: Arc<dyn SampleSource> = if *simulate {
                Arc::new(SimulatedGloveSource)
            } else {
                Arc::new(DeviceStreamSource)
            };
            (source, Box::new(EchoPolicy))
        }
    };
    settings.validate().context("invalid settings")?;

    info!(
        "Using classifier at {} (settings: {})",
        settings.classifier.base_url,
        store.path().display()
    );

    let classifier = HttpClassifier::new(settings.classifier.clone(), settings.request_timeout())?
        .with_probe_timeout(settings.probe_timeout());
    let controller = SessionController::new(
        settings,
        Arc::new(classifier),
        source,
        policy,
        Arc::new(RodioPlayback::new()),
    );

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    runtime.block_on(drive(controller, store))
}

async fn drive(controller: SessionController, store: SettingsStore) -> Result<()> {
    let mut events = controller.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => print_event(&event),
                Err(RecvError::Lagged(missed)) => warn!("Event printer lagged by {missed} events"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    if let Err(err) = controller.start().await {
        error!("Could not start session: {err}");
        println!("{}", err.user_message());
        return Ok(());
    }

    println!("Commands: audio on | audio off | reset | quit (or Ctrl-C)");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => {
                let Ok(Some(line)) = line else { break };
                match line.trim() {
                    "audio on" | "audio off" => {
                        let enabled = line.trim() == "audio on";
                        controller.set_audio_enabled(enabled);
                        if let Err(err) = store.update_audio_enabled(enabled) {
                            warn!("Failed to persist audio setting: {err:#}");
                        }
                    }
                    "reset" => {
                        if let Err(err) = controller.reset_progress().await {
                            println!("{err}");
                        }
                    }
                    "quit" | "q" => break,
                    "" => {}
                    other => println!("Unknown command: {other}"),
                }
            }
        }
    }

    match controller.stop().await {
        Ok(Some(summary)) => {
            println!(
                "Session {} finished: {} completed over {} rounds in {:.1}s",
                summary.id,
                summary.completed_count,
                summary.rounds,
                summary.duration_ms() as f64 / 1000.0
            );
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Ok(None) => {}
        Err(err) => error!("Failed to stop session: {err}"),
    }
    Ok(())
}

fn print_event(event: &ControllerEvent) {
    match event {
        ControllerEvent::StateChanged { snapshot } => {
            println!("[{}] {}", snapshot.status.as_str(), snapshot.status_text);
            if let Some(feedback) = &snapshot.feedback {
                println!("  {feedback}");
            }
        }
        ControllerEvent::OutcomeReported { feedback, .. } => println!("  {feedback}"),
        ControllerEvent::TargetAdvanced {
            target: Some(target),
            round,
            ..
        } => println!("Round {round}: sign the letter {target}"),
        ControllerEvent::TargetAdvanced { target: None, .. } => {}
    }
}
