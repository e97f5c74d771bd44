//! MIRQI CLI - Command-line interface
//!
//! Usage:
//!   mirqi label --input <reports.json> [--vectors] [--output <labels.json>]
//!   mirqi score --gt <gt_entities.json> --cand <cand_entities.json>
//!   mirqi evaluate --gt <gt_reports.json> --cand <cand_reports.json>

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use mirqi_core::{AppConfig, Document};
use mirqi_extractor::{
    DocumentScore, LabeledEntity, Labeler, MirqiScorer, MirqiScores, ScoreSummary,
};

#[derive(Parser)]
#[command(name = "mirqi")]
#[command(about = "Radiology report labeling and MIRQI scoring")]
#[command(version)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve negation/uncertainty and emit labels per report
    Label {
        /// Annotated reports (JSON array of documents)
        #[arg(short, long)]
        input: PathBuf,

        /// Also emit one category vector per report
        #[arg(long)]
        vectors: bool,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Score already labeled entity lists
    Score {
        /// Ground-truth entity lists (JSON array of arrays)
        #[arg(long)]
        gt: PathBuf,

        /// Candidate entity lists (JSON array of arrays)
        #[arg(long)]
        cand: PathBuf,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Label both collections of annotated reports, then score them
    Evaluate {
        /// Ground-truth annotated reports
        #[arg(long)]
        gt: PathBuf,

        /// Candidate annotated reports
        #[arg(long)]
        cand: PathBuf,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Scores as written by `score` and `evaluate`
#[derive(Serialize)]
struct ScoreOutput<'a> {
    summary: ScoreSummary,
    documents: &'a [DocumentScore],
}

impl<'a> From<&'a MirqiScores> for ScoreOutput<'a> {
    fn from(scores: &'a MirqiScores) -> Self {
        Self {
            summary: scores.summary(),
            documents: &scores.documents,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())?;
    init_tracing(&config, cli.verbose);

    match cli.command {
        Commands::Label {
            input,
            vectors,
            output,
        } => {
            let documents: Vec<Document> = read_json(&input)?;
            info!("Labeling {} report(s) from {}", documents.len(), input.display());

            let labeler = Labeler::from_config(&config)?;
            let reports = labeler.label(&documents, vectors)?;
            write_json(output.as_deref(), &reports)?;
        }
        Commands::Score { gt, cand, output } => {
            let gt_entities: Vec<Vec<LabeledEntity>> = read_json(&gt)?;
            let cand_entities: Vec<Vec<LabeledEntity>> = read_json(&cand)?;

            let scores = score(&config, &gt_entities, &cand_entities)?;
            write_json(output.as_deref(), &ScoreOutput::from(&scores))?;
        }
        Commands::Evaluate { gt, cand, output } => {
            let gt_documents: Vec<Document> = read_json(&gt)?;
            let cand_documents: Vec<Document> = read_json(&cand)?;

            let labeler = Labeler::from_config(&config)?;
            let gt_entities = labeler.entities(&gt_documents)?;
            let cand_entities = labeler.entities(&cand_documents)?;

            let scores = score(&config, &gt_entities, &cand_entities)?;
            write_json(output.as_deref(), &ScoreOutput::from(&scores))?;
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> anyhow::Result<AppConfig> {
    let config = match path {
        Some(path) => AppConfig::from_file(path)?.with_env_override()?,
        None => AppConfig::from_env()?,
    };
    config.validate()?;
    Ok(config)
}

/// RUST_LOG wins over the configured level; `--verbose` forces debug
fn init_tracing(config: &AppConfig, verbose: bool) {
    let level = if verbose {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_file(config.logging.include_location)
        .with_line_number(config.logging.include_location);

    if config.logging.json_format {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn score(
    config: &AppConfig,
    gt: &[Vec<LabeledEntity>],
    cand: &[Vec<LabeledEntity>],
) -> anyhow::Result<MirqiScores> {
    let scorer = MirqiScorer::from_config(&config.scoring)?;
    let scores = scorer.score(gt, cand)?;

    let summary = scores.summary();
    info!(
        "Scored {} report(s): recall={:.3} precision={:.3} f1={:.3}",
        summary.num_documents, summary.mean_recall, summary.mean_precision, summary.mean_f1
    );
    debug!("\n{}", scores.report());

    Ok(scores)
}

fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

fn write_json<T: Serialize + ?Sized>(path: Option<&Path>, value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    match path {
        Some(path) => {
            fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
            info!("Wrote {}", path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirqi_core::Polarity;

    #[test]
    fn test_cli_parses_evaluate() {
        let cli = Cli::try_parse_from([
            "mirqi", "evaluate", "--gt", "gt.json", "--cand", "cand.json", "-v",
        ])
        .unwrap();

        assert!(cli.verbose);
        match cli.command {
            Commands::Evaluate { gt, cand, output } => {
                assert_eq!(gt, PathBuf::from("gt.json"));
                assert_eq!(cand, PathBuf::from("cand.json"));
                assert!(output.is_none());
            }
            _ => panic!("expected evaluate"),
        }
    }

    #[test]
    fn test_json_roundtrip_through_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("entities.json");
        let entities = vec![vec![LabeledEntity::new(
            "effusion",
            "Pleural Effusion",
            Polarity::Positive,
            "left",
        )]];

        write_json(Some(&path), &entities).unwrap();
        let loaded: Vec<Vec<LabeledEntity>> = read_json(&path).unwrap();
        assert_eq!(loaded, entities);
    }

    #[test]
    fn test_read_json_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{not json").unwrap();

        let err = read_json::<Vec<Document>>(&path).unwrap_err();
        assert!(err.to_string().contains("broken.json"));
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mirqi.toml");
        fs::write(&path, "[scoring]\npos_weight = 0.5\n").unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert!(config.scoring.attribute_weight > 0.0);
        assert!(config.scoring.pos_weight <= 1.0);
    }
}
