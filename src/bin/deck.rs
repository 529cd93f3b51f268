#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use deck_harness::gateway::{ProviderGateway, TracingUsageSink};
use deck_harness::images::{ImageSearch, UnsplashClient};
use deck_harness::{
    JsonDeckRenderer, JsonlTraceSink, LoggingObserver, ModelRouter, Pipeline, RunRequest, Settings,
    SpeakerProfile, Theme, TraceSink,
};

#[derive(Parser)]
#[command(name = "deck", version, about = "Generate a slide deck from a short brief")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a deck
    Run {
        #[arg(long)]
        topic: String,
        /// Talk length in minutes (1-120)
        #[arg(long)]
        duration: u32,
        #[arg(long)]
        audience: String,
        #[arg(long, default_value = "English")]
        language: String,
        #[arg(long, default_value = "presentation.json")]
        out: PathBuf,
        /// LIGHT_PROFESSIONAL, DARK_TECH, CORPORATE_BLUE, MINIMAL_CLEAN, BOLD_GRADIENT
        #[arg(long)]
        theme: Option<String>,
        #[arg(long)]
        speaker_age: Option<u32>,
        #[arg(long, requires = "speaker_age")]
        speaker_role: Option<String>,
        #[arg(long, requires = "speaker_age")]
        speaker_experience: Option<String>,
        /// JSON settings file
        #[arg(long)]
        config: Option<PathBuf>,
        /// Write one JSON line per provider call
        #[arg(long)]
        trace: Option<PathBuf>,
        /// Skip writing the spoken script next to the deck
        #[arg(long)]
        no_manuscript: bool,
    },
    /// Print the resolved task → model table
    Models {
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// List available themes
    Themes,
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("deck_harness=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing();

    match cli.command {
        Commands::Themes => {
            for theme in Theme::ALL {
                let marker = if theme == Theme::default() { " (default)" } else { "" };
                println!("{}\t{}{marker}", theme.as_str(), theme.style().name);
            }
        }
        Commands::Models { config } => {
            let settings = Settings::load(config.as_deref())?;
            let router = ModelRouter::from_settings(&settings.models);
            for (task, model) in router.table() {
                println!("{:<24} {model}", task.as_str());
            }
        }
        Commands::Run {
            topic,
            duration,
            audience,
            language,
            out,
            theme,
            speaker_age,
            speaker_role,
            speaker_experience,
            config,
            trace,
            no_manuscript,
        } => {
            let settings = Settings::load(config.as_deref())?;

            let mut req = RunRequest::new(topic, duration, audience, language)
                .with_theme(theme.as_deref().map(Theme::parse_or_default).unwrap_or_default());
            if let Some(age) = speaker_age {
                req = req.with_speaker(SpeakerProfile {
                    age,
                    role: speaker_role,
                    experience_level: speaker_experience,
                });
            }

            let gateway = Arc::new(ProviderGateway::from_env(Arc::new(TracingUsageSink))?);
            let mut options = deck_harness::PipelineOptions::from_settings(&settings);
            options.export_manuscript = !no_manuscript;
            let mut pipeline = Pipeline::from_settings(gateway, Arc::new(JsonDeckRenderer), &settings)
                .with_options(options)
                .with_observer(Arc::new(LoggingObserver));

            match UnsplashClient::from_env() {
                Ok(search) => {
                    pipeline = pipeline.with_image_search(Arc::new(search) as Arc<dyn ImageSearch>);
                }
                Err(err) => tracing::warn!(error = %err, "image search disabled"),
            }

            let (trace_sink, trace_worker) = match trace {
                Some(path) => {
                    let (sink, worker) = JsonlTraceSink::new(path)?;
                    (Some(Arc::new(sink)), Some(worker))
                }
                None => (None, None),
            };
            if let Some(sink) = &trace_sink {
                pipeline = pipeline.with_trace(sink.clone() as Arc<dyn TraceSink>);
            }

            // Ctrl-C only raises the flag; the run winds down at its next check.
            let cancel = AtomicBool::new(false);
            let result = {
                let run = pipeline.run(req, &out, Some(&cancel));
                tokio::pin!(run);
                loop {
                    tokio::select! {
                        result = &mut run => break result,
                        signal = tokio::signal::ctrl_c() => match signal {
                            Ok(()) => {
                                if !cancel.swap(true, Ordering::SeqCst) {
                                    eprintln!("cancelling...");
                                }
                            }
                            Err(err) => {
                                tracing::warn!(error = %err, "ctrl-c handler unavailable");
                                break (&mut run).await;
                            }
                        },
                    }
                }
            };

            drop(pipeline);
            drop(trace_sink);
            if let Some(worker) = trace_worker {
                if let Err(err) = worker.join() {
                    tracing::warn!(error = %err, "trace writer failed");
                }
            }

            let result = result?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            if result.images_missing > 0 {
                eprintln!(
                    "{} of {} slides could not be illustrated",
                    result.images_missing, result.slide_count
                );
            }
        }
    }

    Ok(())
}
