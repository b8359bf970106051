use std::{fs::OpenOptions, path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context;
use clap::{Parser, Subcommand};
use client::{
    auth_repository::AuthRepository,
    config::{ClientConfig, DEFAULT_SERVER_URL},
    pipeline::AuthPipeline,
    reissue::HttpReissueEndpoint,
    running_repository::HttpPersistenceSink,
    token_store::{FileTokenStore, TokenStore},
};
use run_tracker_lib::auth::{ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY};
use run_tracker_session::{location::ScriptedLocationSource, session::TrackingMode, SessionTracker, TrackerConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "run-tracker")]
#[command(about = "Track runs and sync them with the server", long_about = None)]
struct Cli {
    /// Base URL of the server
    #[arg(long, env = "RUN_TRACKER_SERVER_URL", default_value = DEFAULT_SERVER_URL)]
    server_url: String,
    /// Where the token pair is kept between invocations
    #[arg(long, env = "RUN_TRACKER_TOKEN_FILE")]
    token_file: Option<PathBuf>,
    /// Seconds a request waits for a token refresh started by another request
    #[arg(long, env = "RUN_TRACKER_REFRESH_TIMEOUT", default_value_t = 5)]
    refresh_timeout: u64,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in and store the token pair
    SignIn {
        email: String,
        #[arg(long, env = "RUN_TRACKER_PASSWORD")]
        password: String,
    },
    /// Forget the stored tokens
    SignOut,
    /// Show whether tokens are stored
    Status,
    /// Replay the built-in route as a run, then save it
    Simulate {
        /// How long to run before stopping
        #[arg(long, default_value_t = 26)]
        seconds: u64,
        #[arg(long, default_value = "Simulated run")]
        title: String,
        /// Throw the run away instead of saving it
        #[arg(long)]
        discard: bool,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    std::fs::create_dir_all("log").context("Failed to create log directory")?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open("log/run-tracker.log")
        .context("Failed to open log file")?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| format!("{}=trace,client=debug,run_tracker_session=debug", env!("CARGO_CRATE_NAME")).into())
        )
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(file))
        .init();

    let mut config = ClientConfig::new(cli.server_url);
    config.refresh_timeout = Duration::from_secs(cli.refresh_timeout);
    if let Some(token_file) = cli.token_file {
        config.token_file = token_file;
    }

    let http = reqwest::Client::new();
    let tokens: Arc<dyn TokenStore> = Arc::new(FileTokenStore::open(&config.token_file).await);

    match cli.command {
        Commands::SignIn { email, password } => {
            let auth = AuthRepository::new(http, &config, tokens);
            auth.sign_in(&email, &password).await.context("Sign-in failed")?;
            println!("Signed in as {email}");
        },
        Commands::SignOut => {
            AuthRepository::new(http, &config, tokens).sign_out().await;
            println!("Signed out");
        },
        Commands::Status => {
            let access = tokens.get(ACCESS_TOKEN_KEY).await.is_some();
            let refresh = tokens.get(REFRESH_TOKEN_KEY).await.is_some();
            println!("server:        {}", config.server_url);
            println!("token file:    {:?}", config.token_file);
            println!("access token:  {}", if access { "present" } else { "missing" });
            println!("refresh token: {}", if refresh { "present" } else { "missing" });
        },
        Commands::Simulate { seconds, title, discard } => {
            let reissuer = Arc::new(HttpReissueEndpoint::new(http.clone(), &config));
            let pipeline = AuthPipeline::new(http, &config, tokens, reissuer);
            simulate(pipeline, &config, seconds, &title, discard).await?;
        },
    }

    Ok(())
}

async fn simulate(pipeline: AuthPipeline, config: &ClientConfig, seconds: u64, title: &str, discard: bool) -> anyhow::Result<()> {
    let mut auth_events = pipeline.events();
    tokio::spawn(async move {
        while let Ok(event) = auth_events.recv().await {
            eprintln!("{event} Run `run-tracker sign-in` to continue.");
        }
    });

    let sink = Arc::new(HttpPersistenceSink::new(pipeline, config.running_path.clone()));
    // No positioning hardware here, so only the simulated route can be tracked.
    let location = Arc::new(ScriptedLocationSource::denied());
    let tracker = SessionTracker::new(location, sink, TrackerConfig::default());

    let mut updates = tracker.subscribe_locations();
    tracker.start(TrackingMode::Simulated).await.context("Failed to start run")?;

    let deadline = tokio::time::sleep(Duration::from_secs(seconds));
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            _ = &mut deadline => break,
            Ok(update) = updates.recv() => {
                let snapshot = tracker.snapshot();
                println!(
                    "{}  {:.4}, {:.4}  {:.2} km",
                    snapshot.elapsed(),
                    update.coordinate.latitude,
                    update.coordinate.longitude,
                    snapshot.distance_km(),
                );
            },
        }
    }

    let summary = tracker.stop()?;
    println!(
        "Stopped: {} over {:.2} km, {:.1} m/s average",
        summary.elapsed(),
        summary.distance_km(),
        summary.average_speed_mps,
    );

    if discard {
        tracker.discard()?;
        println!("Run discarded");
        return Ok(());
    }

    let record = tracker.save(title).await.context("Run was not saved, it is still pending")?;
    println!("Saved {:?} ({} samples)", record.title, record.samples.len());
    Ok(())
}
