use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use facemark_core::{DistanceMetric, FacialZones, Identity, Session, SessionConfig};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

mod config;
mod replay;

use config::Config;
use replay::Outcome;

#[derive(Parser)]
#[command(name = "facemark", about = "Landmark-based face recognition demo")]
struct Cli {
    /// Prototype file (default: $FACEMARK_DB_PATH or ~/.local/share/facemark/prototypes.json)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll (or refine) a person from a recorded landmark stream
    Enroll {
        /// Person identifier
        #[arg(short, long)]
        name: String,
        /// JSON-lines detector stream
        #[arg(short, long)]
        frames: PathBuf,
    },
    /// Classify every frame of a recorded landmark stream
    Classify {
        #[arg(short, long)]
        frames: PathBuf,
        /// Number of voting neighbors
        #[arg(short)]
        k: Option<usize>,
        /// euclidean or cosine
        #[arg(long)]
        metric: Option<DistanceMetric>,
        /// Rejection threshold on the nearest distance
        #[arg(long)]
        threshold: Option<f32>,
        /// Deactivate a facial zone (repeatable)
        #[arg(long = "disable-zone")]
        disable_zones: Vec<String>,
        /// Override a zone weight, as NAME=WEIGHT (repeatable)
        #[arg(long = "zone-weight", value_parser = parse_zone_weight)]
        zone_weights: Vec<(String, f32)>,
    },
    /// List enrolled people
    List,
    /// Remove an enrolled person
    Remove {
        name: String,
    },
    /// Remove everyone
    Clear,
    /// Write all prototypes to a JSON file
    Export {
        /// Output path (default: prototypes_<date>.json)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Merge prototypes from a JSON file, overwriting same-named entries
    Import {
        file: PathBuf,
    },
    /// Show the facial zone table
    Zones,
}

fn parse_zone_weight(s: &str) -> Result<(String, f32), String> {
    let (name, weight) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=WEIGHT, got {s}"))?;
    let weight = weight
        .trim()
        .parse::<f32>()
        .map_err(|e| format!("bad weight in {s}: {e}"))?;
    Ok((name.trim().to_string(), weight))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();
    let db_path = cli.db.clone().unwrap_or_else(|| config.db_path.clone());

    let mut session = open_session(&config, &db_path)?;

    match cli.command {
        Commands::Enroll { name, frames } => {
            let frames = load_frames(&frames)?;
            let report = replay::run_enroll(&mut session, &frames, &name)
                .with_context(|| format!("enrolling {name}"))?;
            save(&session, &db_path)?;
            println!(
                "Enrolled {}: {} frames, {} samples total",
                report.identifier,
                report.frames,
                report.outcome.sample_count()
            );
        }
        Commands::Classify {
            frames,
            k,
            metric,
            threshold,
            disable_zones,
            zone_weights,
        } => {
            let mut classifier = *session.classifier_config();
            classifier.k = k.unwrap_or(classifier.k);
            classifier.metric = metric.unwrap_or(classifier.metric);
            classifier.threshold = threshold.unwrap_or(classifier.threshold);
            session.set_classifier_config(classifier);

            for zone in &disable_zones {
                session.zones_mut().set_active(zone, false)?;
            }
            for (zone, weight) in &zone_weights {
                session.zones_mut().set_weight(zone, *weight)?;
            }

            let frames = load_frames(&frames)?;
            for (ts, outcome) in replay::run_classify(&mut session, &frames)? {
                match outcome {
                    Outcome::Prediction(c) => {
                        let marker = match c.identity {
                            Identity::Known(_) => "",
                            Identity::Unknown => "?",
                        };
                        println!("{ts:>8} ms  {}{marker}  distance {:.3}", c.identity, c.distance);
                    }
                    Outcome::NoFace => println!("{ts:>8} ms  --"),
                    Outcome::NoReferenceData => println!("{ts:>8} ms  no prototypes"),
                    Outcome::Failed(e) => println!("{ts:>8} ms  error: {e}"),
                }
            }
        }
        Commands::List => {
            if session.store().is_empty() {
                println!("No one enrolled");
            }
            for (id, proto) in session.store().iter() {
                println!("{id}\t{} samples\t{} dims", proto.sample_count, proto.vector.len());
            }
        }
        Commands::Remove { name } => {
            if session.remove(&name).is_none() {
                bail!("{name} is not enrolled");
            }
            save(&session, &db_path)?;
            println!("Removed {name}");
        }
        Commands::Clear => {
            if session.store().is_empty() {
                println!("Nothing to clear");
                return Ok(());
            }
            session.clear();
            save(&session, &db_path)?;
            println!("All prototypes removed");
        }
        Commands::Export { out } => {
            if session.store().is_empty() {
                bail!("nothing to export");
            }
            let out = out.unwrap_or_else(|| {
                PathBuf::from(facemark_core::exchange::default_export_file_name(
                    chrono::Local::now().date_naive(),
                ))
            });
            std::fs::write(&out, session.export_pretty()?)
                .with_context(|| format!("writing {}", out.display()))?;
            println!("Exported {} prototypes to {}", session.store().len(), out.display());
        }
        Commands::Import { file } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let report = session
                .import_str(&text)
                .with_context(|| format!("importing {}", file.display()))?;
            save(&session, &db_path)?;
            if report.overwritten.is_empty() {
                println!("Imported {} prototypes", report.imported.len());
            } else {
                println!(
                    "Imported {} prototypes (overwritten: {})",
                    report.imported.len(),
                    report.overwritten.join(", ")
                );
            }
        }
        Commands::Zones => {
            for zone in session.zones().iter() {
                println!(
                    "{:<10} weight {:<4} {:<8} {} landmarks",
                    zone.name,
                    zone.weight,
                    if zone.active { "active" } else { "inactive" },
                    zone.indices.len()
                );
            }
        }
    }

    Ok(())
}

fn open_session(config: &Config, db_path: &Path) -> Result<Session> {
    let zones = match &config.zones_path {
        Some(path) => {
            let src = std::fs::read_to_string(path)
                .with_context(|| format!("reading zone table {}", path.display()))?;
            FacialZones::from_toml_str(&src)?
        }
        None => FacialZones::mediapipe_default(),
    };

    let mut session = Session::new(SessionConfig {
        classifier: config.classifier(),
        capture_window: config.capture_window,
        target_fps: config.target_fps,
        zones,
        ..SessionConfig::default()
    });

    if db_path.exists() {
        let text = std::fs::read_to_string(db_path)
            .with_context(|| format!("reading {}", db_path.display()))?;
        let report = session
            .import_str(&text)
            .with_context(|| format!("loading {}", db_path.display()))?;
        tracing::debug!(path = %db_path.display(), count = report.imported.len(), "prototypes loaded");
    }
    Ok(session)
}

fn save(session: &Session, db_path: &Path) -> Result<()> {
    if let Some(dir) = db_path.parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating {}", dir.display()))?;
        }
    }
    std::fs::write(db_path, session.export_pretty()?)
        .with_context(|| format!("writing {}", db_path.display()))?;
    tracing::debug!(path = %db_path.display(), "prototypes saved");
    Ok(())
}

fn load_frames(path: &Path) -> Result<Vec<replay::RecordedFrame>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    Ok(replay::read_frames(BufReader::new(file))?)
}
