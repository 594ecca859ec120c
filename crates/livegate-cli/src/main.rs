use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use livegate_core::{DeviceProfile, EuclideanMatcher, FaceDescriptor, Matcher};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use livegate_cli::config::Config;
use livegate_cli::engine;
use livegate_cli::replay::{ReplayCamera, ReplaySource};

#[derive(Parser)]
#[command(name = "livegate", version, about = "Active liveness sessions and face match scoring")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct SettingsArgs {
    /// Device profile preset (desktop or constrained).
    #[arg(long)]
    profile: Option<DeviceProfile>,
    /// TOML file with liveness overrides.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Run a liveness session over a recorded detection trace.
    Replay {
        /// JSON-lines trace file.
        trace: PathBuf,
        #[command(flatten)]
        settings: SettingsArgs,
        /// Directory to write captured JPEG frames into.
        #[arg(long)]
        out: Option<PathBuf>,
        /// Stop after this many ticks (default: one per trace record).
        #[arg(long)]
        max_ticks: Option<u64>,
    },
    /// Compare face descriptors (JSON arrays of numbers).
    Verify {
        reference: PathBuf,
        #[arg(required = true)]
        samples: Vec<PathBuf>,
    },
    /// Print the effective liveness configuration as TOML.
    Config {
        #[command(flatten)]
        settings: SettingsArgs,
    },
}

fn apply_settings(mut config: Config, settings: SettingsArgs) -> Config {
    if settings.profile.is_some() {
        config.profile = settings.profile;
    }
    if settings.config.is_some() {
        config.config_path = settings.config;
    }
    config
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    match cli.command {
        Command::Replay {
            trace,
            settings,
            out,
            max_ticks,
        } => run_replay(apply_settings(config, settings), &trace, out.as_deref(), max_ticks).await,
        Command::Verify { reference, samples } => run_verify(&reference, &samples),
        Command::Config { settings } => {
            let liveness = apply_settings(config, settings).liveness()?;
            print!("{}", liveness.to_toml_string()?);
            Ok(())
        }
    }
}

async fn run_replay(
    config: Config,
    trace: &Path,
    out: Option<&Path>,
    max_ticks: Option<u64>,
) -> Result<()> {
    let liveness = config.liveness().context("failed to load liveness config")?;
    let source = ReplaySource::open(trace)?;
    let max_ticks = max_ticks.unwrap_or(source.remaining().max(1) as u64);
    let camera = ReplayCamera::new(config.frame_width, config.frame_height);
    let interval = liveness.tick_interval();

    let handle =
        engine::spawn_engine(camera, source, liveness).context("failed to start engine")?;
    tracing::info!(session = %handle.session_id(), max_ticks, "replay started");

    let (tx, mut rx) = mpsc::channel(16);
    let printer = tokio::spawn(async move {
        while let Some(report) = rx.recv().await {
            match serde_json::to_string(&report) {
                Ok(line) => println!("{line}"),
                Err(e) => tracing::warn!(error = %e, "failed to render tick report"),
            }
        }
    });

    let summary = tokio::select! {
        result = engine::run_session(&handle, interval, Some(max_ticks), tx) => result?,
        _ = tokio::signal::ctrl_c() => {
            handle.stop().await?;
            bail!("interrupted");
        }
    };
    printer.await.context("report printer panicked")?;

    let frames = handle.take_captured().await?;
    if let Some(dir) = out {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
        for (i, frame) in frames.iter().enumerate() {
            let step = format!("{:?}", frame.step).to_lowercase();
            let path = dir.join(format!("{i:02}-{step}.jpg"));
            std::fs::write(&path, &frame.jpeg)
                .with_context(|| format!("failed to write {}", path.display()))?;
        }
        tracing::info!(count = frames.len(), dir = %dir.display(), "captured frames written");
    }
    handle.stop().await?;

    println!("{}", serde_json::to_string(&summary)?);
    if !summary.passed() {
        bail!(
            "session ended in {:?} after {} ticks",
            summary.final_step,
            summary.ticks
        );
    }
    Ok(())
}

fn read_descriptor(path: &Path) -> Result<FaceDescriptor> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("invalid descriptor in {}", path.display()))
}

fn run_verify(reference: &Path, samples: &[PathBuf]) -> Result<()> {
    let reference = read_descriptor(reference)?;
    let samples = samples
        .iter()
        .map(|path| read_descriptor(path))
        .collect::<Result<Vec<_>>>()?;

    let matcher = EuclideanMatcher::default();
    let result = match samples.as_slice() {
        [single] => matcher.verify(&reference, single)?,
        many => matcher.verify_multiple(&reference, many)?,
    };
    tracing::info!(status = ?result.status, distance = result.distance, "verification finished");
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_replay() {
        let cli = Cli::try_parse_from([
            "livegate",
            "replay",
            "trace.jsonl",
            "--profile",
            "constrained",
            "--max-ticks",
            "20",
        ])
        .unwrap();
        let Command::Replay {
            trace,
            settings,
            max_ticks,
            out,
        } = cli.command
        else {
            panic!("expected replay");
        };
        assert_eq!(trace, PathBuf::from("trace.jsonl"));
        assert_eq!(settings.profile, Some(DeviceProfile::Constrained));
        assert_eq!(max_ticks, Some(20));
        assert!(out.is_none());
    }

    #[test]
    fn test_cli_rejects_unknown_profile() {
        assert!(Cli::try_parse_from(["livegate", "config", "--profile", "tablet"]).is_err());
    }

    #[test]
    fn test_verify_needs_a_sample() {
        assert!(Cli::try_parse_from(["livegate", "verify", "ref.json"]).is_err());
    }

    #[test]
    fn test_flags_override_env_config() {
        let config = apply_settings(
            Config::default(),
            SettingsArgs {
                profile: Some(DeviceProfile::Constrained),
                config: None,
            },
        );
        assert_eq!(config.profile, Some(DeviceProfile::Constrained));
        assert_eq!(config.config_path, None);
    }

    #[test]
    fn test_profile_flag_survives_config_flag() {
        let cli = Cli::try_parse_from([
            "livegate",
            "config",
            "--config",
            "overrides.toml",
            "--profile",
            "constrained",
        ])
        .unwrap();
        let Command::Config { settings } = cli.command else {
            panic!("expected config");
        };
        let config = apply_settings(Config::default(), settings);
        assert_eq!(config.profile, Some(DeviceProfile::Constrained));
        assert_eq!(config.config_path, Some(PathBuf::from("overrides.toml")));
    }
}
