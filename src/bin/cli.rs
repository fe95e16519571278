//! Biosense CLI
//!
//! Command-line interface for Biosense operations:
//! - Start and stop monitoring
//! - Inspect sessions and server health
//! - Watch a user's live updates
//! - Run the classifier offline over simulated data

use anyhow::Context;
use biosense::classifier::{AnxietyAnalysis, Baseline, Classifier, HysteresisState};
use biosense::client::{ClientError, MonitorClient};
use biosense::config::{generate_default_config, Config};
use biosense::hub::ListenerError;
use biosense::sensor::{Sample, SampleSource, SimulatedSource};
use biosense::session::{SessionConfig, SessionSnapshot};
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "biosense")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Real-time HRV/EDA anxiety monitoring")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Server URL (default: from config)
    #[arg(long, global = true)]
    pub server: Option<String>,

    /// Streaming URL (default: from config)
    #[arg(long, global = true)]
    pub stream: Option<String>,

    /// Output format (table, json)
    #[arg(short, long, default_value = "table", global = true)]
    pub format: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start monitoring a user
    Start {
        user_id: String,
        /// Samples per second
        #[arg(short, long, default_value = "1.0")]
        rate: f64,
        /// Seconds of simulated data (default: unbounded)
        #[arg(short, long)]
        duration: Option<f64>,
        /// Baseline HRV (ms); requires --baseline-eda
        #[arg(long, requires = "baseline_eda")]
        baseline_hrv: Option<f64>,
        /// Baseline EDA (µS); requires --baseline-hrv
        #[arg(long, requires = "baseline_hrv")]
        baseline_eda: Option<f64>,
    },

    /// Stop monitoring a user
    Stop { user_id: String },

    /// Show server health, or one user's session
    Status { user_id: Option<String> },

    /// List active sessions
    Sessions,

    /// Start a session and print its updates until Ctrl+C
    Watch {
        user_id: String,
        #[arg(short, long, default_value = "1.0")]
        rate: f64,
        /// Leave the session running on exit
        #[arg(long)]
        keep: bool,
    },

    /// Classify simulated samples locally, without a server
    Simulate {
        #[arg(short = 'n', long, default_value = "60")]
        samples: usize,
        #[arg(short, long, default_value = "1.0")]
        rate: f64,
        /// RNG seed for reproducible runs
        #[arg(long)]
        seed: Option<u64>,
        /// Chance per second of entering an episode
        #[arg(long)]
        episode_probability: Option<f64>,
    },

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load_default();
    if let Some(server) = &cli.server {
        config.client.base_url = server.clone();
    }
    if let Some(stream) = &cli.stream {
        config.transport.url = stream.clone();
    }
    let json = cli.format == "json";

    match cli.command {
        Commands::Config { output } => {
            let content = generate_default_config();
            match output {
                Some(path) => {
                    std::fs::write(&path, content)
                        .with_context(|| format!("writing {}", path.display()))?;
                    println!("Config written to {:?}", path);
                }
                None => print!("{}", content),
            }
        }

        Commands::Simulate {
            samples,
            rate,
            seed,
            episode_probability,
        } => {
            let mut sim = config.simulation.source.clone();
            sim.seed = seed.or(sim.seed);
            if let Some(p) = episode_probability {
                sim.episode_probability = p;
            }
            simulate(&config, sim, samples, rate, json)?;
        }

        command => {
            let client = MonitorClient::new(&config.client, &config.transport, config.hub.clone())?;
            if let Err(e) = run_remote(&client, command, json).await {
                if matches!(
                    e.downcast_ref::<ClientError>(),
                    Some(ClientError::Unavailable(_))
                ) {
                    eprintln!("Cannot connect to Biosense API at {}", config.client.base_url);
                    eprintln!();
                    eprintln!("Make sure the Biosense API server is running:");
                    eprintln!("  cargo run --bin biosense-api");
                    std::process::exit(1);
                }
                return Err(e);
            }
        }
    }

    Ok(())
}

async fn run_remote(client: &MonitorClient, command: Commands, json: bool) -> anyhow::Result<()> {
    match command {
        Commands::Start {
            user_id,
            rate,
            duration,
            baseline_hrv,
            baseline_eda,
        } => {
            let mut session = SessionConfig::new(user_id, rate);
            session.simulation_duration = duration;
            if let (Some(hrv), Some(eda)) = (baseline_hrv, baseline_eda) {
                session = session.baseline(Baseline::new(hrv, eda));
            }

            let response = client.start(&session).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                println!("{}: {}", response.status, response.session.user_id);
                print_session(&response.session);
            }
            client.shutdown().await;
        }

        Commands::Stop { user_id } => {
            let response = client.stop(&user_id).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                println!("{}: {}", response.status, user_id);
                if let Some(session) = &response.session {
                    print_session(session);
                }
            }
        }

        Commands::Status { user_id: Some(user_id) } => match client.status(&user_id).await {
            Ok(session) if json => println!("{}", serde_json::to_string_pretty(&session)?),
            Ok(session) => print_session(&session),
            Err(e) if e.is_not_found() => println!("No active session for {}", user_id),
            Err(e) => return Err(e.into()),
        },

        Commands::Status { user_id: None } => {
            let health = client.health().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&health)?);
            } else {
                println!("Biosense v{}", health.version);
                println!();
                println!("Status: {}", health.status);
                println!("Active sessions: {}", health.active_sessions);
                println!("Listeners: {}", health.listeners);
                println!("Uptime: {}", format_duration(health.uptime_seconds));
            }
        }

        Commands::Sessions => {
            let list = client.sessions().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&list)?);
            } else if list.sessions.is_empty() {
                println!("No active sessions.");
            } else {
                println!(
                    "{:<24} {:>8} {:>10} {:>8} {:>10}",
                    "User", "Rate", "Samples", "Anxious", "Streak"
                );
                println!("{}", "-".repeat(64));
                for s in &list.sessions {
                    println!(
                        "{:<24} {:>8.2} {:>10} {:>8} {:>10}",
                        s.user_id,
                        s.sampling_rate,
                        s.samples_processed,
                        if s.is_anxious { "yes" } else { "no" },
                        s.consecutive_anxious_readings
                    );
                }
                println!();
                println!("{} session(s)", list.count);
            }
        }

        Commands::Watch { user_id, rate, keep } => {
            client.subscribe_user(&user_id, move |update| {
                if json {
                    let line = serde_json::to_string(update)
                        .map_err(|e| ListenerError::Failed(e.to_string()))?;
                    println!("{}", line);
                } else {
                    print_analysis(&update.sensor_data, &update.analysis);
                }
                Ok(())
            })?;

            let response = client.start(&SessionConfig::new(user_id.clone(), rate)).await?;
            eprintln!(
                "{} {} (stream {}); Ctrl+C to exit",
                response.status,
                user_id,
                client.connection_state(&user_id)
            );

            tokio::signal::ctrl_c().await?;

            if keep {
                client.shutdown().await;
            } else {
                let stopped = client.stop(&user_id).await?;
                eprintln!("{}: {}", stopped.status, user_id);
            }
        }

        Commands::Config { .. } | Commands::Simulate { .. } => {}
    }

    Ok(())
}

fn simulate(
    config: &Config,
    sim: biosense::sensor::SimulationConfig,
    samples: usize,
    rate: f64,
    json: bool,
) -> anyhow::Result<()> {
    if !(rate.is_finite() && rate > 0.0) {
        anyhow::bail!("rate must be a positive number");
    }

    let classifier = Classifier::new(config.classifier.clone());
    let baseline = config.baseline.defaults();
    let mut source = SimulatedSource::new("simulated", sim);

    let step = Duration::milliseconds((1000.0 / rate).round() as i64);
    let mut timestamp = Utc::now();
    let mut previous: Option<Sample> = None;
    let mut hysteresis = HysteresisState::default();
    let mut anxious_samples = 0usize;

    if !json {
        println!(
            "{:<8} {:>8} {:>8} {:>8} {:>8} {:>10}",
            "#", "HRV", "EDA", "Score", "Streak", "Severity"
        );
        println!("{}", "-".repeat(56));
    }

    for i in 0..samples {
        let sample = source.next_sample(timestamp);
        let result = classifier.classify(&sample, &baseline, previous.as_ref(), hysteresis);
        hysteresis = result.hysteresis;
        if result.analysis.is_anxious {
            anxious_samples += 1;
        }

        if json {
            println!("{}", serde_json::to_string(&result.analysis)?);
        } else {
            print!("{:<8} ", i + 1);
            print_analysis(&sample, &result.analysis);
        }

        previous = Some(sample);
        timestamp += step;
    }

    if !json {
        println!();
        println!(
            "Baseline HRV {:.1} ms, EDA {:.2} µS; anxious in {} of {} samples",
            baseline.hrv, baseline.eda, anxious_samples, samples
        );
    }
    Ok(())
}

fn print_session(session: &SessionSnapshot) {
    println!("  User: {}", session.user_id);
    println!("  Active: {}", session.is_active);
    println!(
        "  Baseline: HRV {:.1} ms, EDA {:.2} µS",
        session.baseline_hrv, session.baseline_eda
    );
    println!("  Sampling rate: {}/s", session.sampling_rate);
    println!("  Samples processed: {}", session.samples_processed);
    println!(
        "  Anxious: {} (streak {})",
        session.is_anxious, session.consecutive_anxious_readings
    );
    println!("  Started: {}", session.started_at.to_rfc3339());
}

fn print_analysis(sample: &Sample, analysis: &AnxietyAnalysis) {
    println!(
        "{:>8.1} {:>8.2} {:>8.2} {:>8} {:>10}",
        sample.hrv.value,
        sample.eda.value,
        analysis.anxiety_score,
        analysis.consecutive_readings,
        analysis
            .severity
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string())
    );
}

fn format_duration(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, secs)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}
