//! choucalerte command-line tool
//!
//! ```bash
//! # Check an export document against the object schemas
//! choucalerte check investigation.json
//!
//! # Re-derive every clue zone and print the probable zone as GeoJSON
//! CHOUCAS_SERVICE_URL=http://localhost:8008 choucalerte zlp investigation.json
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use choucalerte::validation::{self, SchemaViolation};
use choucalerte::{ChoucasError, ChoucasResult, ExportDocument, HttpGeometryService, ServiceConfig, Session, SessionConfig};

#[derive(Parser, Debug)]
#[command(name = "choucalerte")]
#[command(about = "Search-and-rescue clue zones and probable location zone")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate an export document
    Check {
        file: PathBuf,
    },
    /// Recompute every clue zone and the probable zone against the geometry service
    Zlp {
        file: PathBuf,
    },
}

fn check(doc: &ExportDocument) -> Vec<SchemaViolation> {
    let mut violations = Vec::new();
    if let Some(isa) = &doc.initial_search_area {
        violations.extend(validation::check_boundary(isa));
    }
    if let Some(victim) = &doc.victim {
        violations.extend(validation::check_victim(victim));
    }
    for clue in &doc.clues {
        violations.extend(validation::check_clue(clue));
    }
    violations
}

async fn zlp(mut doc: ExportDocument) -> ChoucasResult<Option<String>> {
    let service_cfg = ServiceConfig::from_env();
    let service = Arc::new(HttpGeometryService::new(&service_cfg)?);
    let mut session = Session::builder(service)
        .config(SessionConfig {
            service: service_cfg,
            ..SessionConfig::default()
        })
        .build()?;

    let clues = std::mem::take(&mut doc.clues);
    session.load(doc).await?;

    for mut clue in clues {
        clue.corresponding_zone = None;
        let id = clue.clue_id.clone();
        if let Err(e) = session.add_clue(clue).await {
            warn!(clue_id = %id, error = %e, "clue skipped");
        }
    }
    info!(clues = session.state().clues.len(), "clue zones recomputed");

    match &session.state().probable_zone {
        Some(zone) => serde_json::to_string_pretty(zone)
            .map(Some)
            .map_err(|e| ChoucasError::internal(e.to_string())),
        None => Ok(None),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    match args.command {
        Command::Check { file } => match ExportDocument::read_from(&file) {
            Ok(doc) => {
                let violations = check(&doc);
                for v in &violations {
                    println!("{v}");
                }
                if violations.is_empty() {
                    println!("{}: ok ({} clues)", file.display(), doc.clues.len());
                    ExitCode::SUCCESS
                } else {
                    ExitCode::FAILURE
                }
            }
            Err(e) => {
                eprintln!("error: {e}");
                ExitCode::FAILURE
            }
        },
        Command::Zlp { file } => {
            let result = match ExportDocument::read_from(&file) {
                Ok(doc) => zlp(doc).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(Some(json)) => {
                    println!("{json}");
                    ExitCode::SUCCESS
                }
                Ok(None) => {
                    eprintln!("no probable zone: fewer than two overlapping trusted clues");
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    eprintln!("error: {e}");
                    ExitCode::FAILURE
                }
            }
        }
    }
}
