use std::env;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{error, info, warn};
use rollcall::config::{self, Modality};
use rollcall::enroll::run_enrollment_loop;
use rollcall::fingerprint;
use rollcall::matcher::{FaceMatcher, MatchOutcome};
use rollcall::session::{Session, SessionError};
use rollcall::sink::sink_from_config;
use rollcall::storage::IdentityStore;
use rollcall::{DriverBridge, FaceSource};

#[derive(Parser)]
#[command(name = "rollcall")]
#[command(version, about = "Biometric attendance kiosk - face and fingerprint check-in")]
struct Cli {
    /// Config file (defaults to the compiled-in path)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll identities interactively
    Enroll,
    /// Run an attendance session
    Attend,
    /// Match one probe against enrolled identities without logging attendance
    Test {
        /// Probes to try before giving up
        #[arg(short, long, default_value_t = 30)]
        attempts: usize,
    },
    /// List enrolled identities
    List,
    /// Open config file in editor
    Config,
}

fn main() -> Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .format_target(false)
        .format_timestamp(None)
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.as_deref();
    let cfg = config::load_config(config_path)?;

    match cli.command {
        Commands::Enroll => enroll(&cfg),
        Commands::Attend => attend(&cfg),
        Commands::Test { attempts } => test(&cfg, attempts),
        Commands::List => list(&cfg),
        Commands::Config => open_config(&cfg, config_path),
    }
}

fn load_store(cfg: &config::Config) -> Result<IdentityStore> {
    IdentityStore::load(&cfg.store_path).context("Cannot operate without the identity store")
}

fn open_driver(cfg: &config::Config) -> Result<DriverBridge> {
    info!("Starting driver: {}", cfg.driver.command);
    DriverBridge::spawn(&cfg.driver.command, &cfg.driver.args).context("Failed to start driver")
}

fn enroll(cfg: &config::Config) -> Result<()> {
    let mut store = load_store(cfg)?;
    let mut driver = open_driver(cfg)?;

    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut output = io::stdout();
    let reports = run_enrollment_loop(
        &mut store,
        &mut driver,
        &cfg.exit_keyword,
        &mut input,
        &mut output,
    )?;

    info!("Enrollment finished: {} identities processed", reports.len());
    Ok(())
}

fn attend(cfg: &config::Config) -> Result<()> {
    let store = load_store(cfg)?;
    if store.is_empty() {
        warn!("No identities enrolled; every scan will be rejected");
    }
    let driver = open_driver(cfg)?;
    let sink = sink_from_config(&cfg.sink);
    let matcher = FaceMatcher::new(cfg.face_threshold, cfg.distance);
    let mut session = Session::new(&store, driver, sink, matcher, cfg.modalities.clone())?;
    session.prompt_title()?;

    let stdin = io::stdin();
    let mut input = stdin.lock();
    loop {
        print!("Enter the class title: ");
        io::stdout().flush()?;
        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            anyhow::bail!("No class title given");
        }
        match session.submit_title(&line) {
            Ok(()) => break,
            Err(SessionError::EmptyTitle) => warn!("Class title must not be empty"),
            Err(e) => return Err(e.into()),
        }
    }

    info!("Press the button to start");
    let summary = session.run()?;

    info!(
        "Session '{}' finished: {} credited, {} logged",
        summary.class_title.unwrap_or_default(),
        summary.credited,
        summary.delivered
    );
    if !summary.undelivered.is_empty() {
        for event in &summary.undelivered {
            error!("Not logged: {},{}", event.display_name, event.timestamp);
        }
        anyhow::bail!(
            "{} attendance event(s) could not be logged",
            summary.undelivered.len()
        );
    }
    Ok(())
}

fn test(cfg: &config::Config, attempts: usize) -> Result<()> {
    let store = load_store(cfg)?;
    info!("Found {} enrolled identities", store.len());

    let mut driver = open_driver(cfg)?;
    let matcher = FaceMatcher::new(cfg.face_threshold, cfg.distance);

    for i in 0..attempts {
        let modality = cfg.modalities[i % cfg.modalities.len()];
        let outcome = match modality {
            Modality::Face => {
                let probe = driver.capture_face_probe()?;
                matcher.match_probe(&store, &probe)
            }
            Modality::Fingerprint => fingerprint::capture_and_match(&mut driver, &store)?,
        };

        match outcome {
            MatchOutcome::Accepted(identity_id) => {
                let name = store
                    .get(&identity_id)
                    .map(|identity| identity.display_name.as_str())
                    .unwrap_or_default();
                info!("✓ {:?} match: {} ({})", modality, identity_id, name);
                return Ok(());
            }
            MatchOutcome::Rejected => {
                info!("✗ {:?} probe not recognized", modality);
                return Ok(());
            }
            MatchOutcome::InconsistentState { slot } => {
                anyhow::bail!("Sensor slot {} has no identity in the store", slot);
            }
            MatchOutcome::NoFaceDetected | MatchOutcome::CaptureFailed => {
                warn!("Attempt {}: {:?}", i + 1, outcome);
            }
        }

        std::thread::sleep(std::time::Duration::from_millis(100));
    }

    anyhow::bail!("No usable probe after {} attempts", attempts)
}

fn list(cfg: &config::Config) -> Result<()> {
    let store = load_store(cfg)?;
    if store.is_empty() {
        info!("No identities enrolled in {}", store.path().display());
        return Ok(());
    }
    for identity in store.all().values() {
        let face = if identity.face_template.is_some() { "face" } else { "-" };
        let finger = match identity.fingerprint_slot {
            Some(slot) => format!("finger#{}", slot),
            None => "-".to_string(),
        };
        let pending = if identity.is_pending() { " (pending)" } else { "" };
        println!(
            "{}\t{}\t{}\t{}{}",
            identity.identity_id, identity.display_name, face, finger, pending
        );
    }
    Ok(())
}

fn open_config(cfg: &config::Config, path: Option<&Path>) -> Result<()> {
    let config_path = path.unwrap_or(&config::CONFIG_PATH);
    if !config_path.exists() {
        config::save_config(cfg, Some(config_path)).context("Failed to write default config")?;
    }
    let editor = env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());

    info!("Opening config file: {:?}", config_path);

    let status = std::process::Command::new(editor)
        .arg(config_path)
        .status()
        .context("Failed to open editor")?;

    if !status.success() {
        anyhow::bail!("Editor exited with non-zero status");
    }

    Ok(())
}
