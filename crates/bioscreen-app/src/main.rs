//! Bioscreen: bioactivity prediction from SMILES.
//! Entry point for the `bioscreen` binary.
//!
//! Run with: cargo run -p bioscreen-app -- [serve|predict|features]

use std::path::{Path, PathBuf};

use anyhow::Context;
use bioscreen_chem::{FingerprintComputer, FingerprintTable, FingerprintVector};
use bioscreen_common::entities::read_structures;
use bioscreen_common::Config;
use bioscreen_pipeline::{CancelToken, Pipeline, PipelineRequest};
use bioscreen_web::{build_router, AppState};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "bioscreen", version, about = "Predict pIC50 values for SMILES structures")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start the local web GUI (default)
    Serve {
        /// Address to listen on, overriding `web.bind`
        #[arg(long)]
        bind: Option<String>,
    },
    /// Run the pipeline once on a `SMILES,ID` file
    Predict {
        input: PathBuf,
        /// Output CSV, defaults to `predictions.csv` next to the input
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Print the Morgan fingerprint of each structure
    Features {
        input: PathBuf,
        /// Write the fingerprint table as CSV instead of printing set bits
        #[arg(long, short)]
        output: Option<PathBuf>,
        /// Fail on the first unparseable structure
        #[arg(long)]
        strict: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("bioscreen=debug,info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load()?;

    match cli.command.unwrap_or(Command::Serve { bind: None }) {
        Command::Serve { bind } => serve(config, bind).await,
        Command::Predict { input, output } => predict(config, input, output).await,
        Command::Features { input, output, strict } => features(&config, &input, output.as_deref(), strict),
    }
}

async fn serve(config: Config, bind: Option<String>) -> anyhow::Result<()> {
    let addr = bind.unwrap_or_else(|| config.web.bind.clone());
    info!("Bioscreen {} starting", env!("CARGO_PKG_VERSION"));

    let app = build_router(AppState::new(config));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Server listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}

async fn predict(config: Config, input: PathBuf, output: Option<PathBuf>) -> anyhow::Result<()> {
    let mut request = PipelineRequest::new(input);
    if let Some(output) = output {
        request = request.with_output(output);
    }

    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling run");
                cancel.cancel();
            }
        });
    }

    let pipeline = Pipeline::new(config);
    let outcome = pipeline
        .run(&request, None, cancel)
        .await
        .map_err(|e| anyhow::anyhow!("{}: {e}", e.kind()))?;

    for line in &outcome.warnings {
        eprintln!("warning: {line}");
    }
    println!(
        "{} predictions written to {}",
        outcome.predictions.len(),
        outcome.output.display()
    );
    Ok(())
}

fn features(config: &Config, input: &Path, output: Option<&Path>, strict: bool) -> anyhow::Result<()> {
    let table = fingerprint_table(config, input, strict)?;
    match output {
        Some(path) => {
            table
                .write_csv(path, &config.features.id_column)
                .map_err(|e| anyhow::anyhow!("{}: {e}", e.kind()))?;
            println!("{} fingerprints written to {}", table.rows.len(), path.display());
        }
        None => {
            for row in &table.rows {
                println!("{}", feature_line(&row.id, &row.vector));
            }
        }
    }
    Ok(())
}

fn fingerprint_table(config: &Config, input: &Path, strict: bool) -> anyhow::Result<FingerprintTable> {
    let records = read_structures(input).map_err(|e| anyhow::anyhow!("{}: {e}", e.kind()))?;
    let computer = FingerprintComputer::from_config(&config.fingerprint);
    if strict {
        computer
            .compute_strict(&records)
            .map_err(|e| anyhow::anyhow!("{}: {e}", e.kind()))
    } else {
        Ok(computer.compute(&records))
    }
}

/// `ID<TAB>bit,bit,...` or `ID<TAB>missing`.
fn feature_line(id: &str, vector: &FingerprintVector) -> String {
    match vector {
        FingerprintVector::Bits(bits) => {
            let on: Vec<String> = bits.iter_ones().map(|i| i.to_string()).collect();
            format!("{id}\t{}", on.join(","))
        }
        FingerprintVector::Missing { .. } => format!("{id}\tmissing"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_subcommand_means_serve() {
        let cli = Cli::try_parse_from(["bioscreen"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_predict_args() {
        let cli = Cli::try_parse_from(["bioscreen", "predict", "in.csv", "--output", "out.csv"]).unwrap();
        match cli.command {
            Some(Command::Predict { input, output }) => {
                assert_eq!(input, PathBuf::from("in.csv"));
                assert_eq!(output, Some(PathBuf::from("out.csv")));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_serve_bind() {
        let cli = Cli::try_parse_from(["bioscreen", "serve", "--bind", "127.0.0.1:9000"]).unwrap();
        assert!(matches!(cli.command, Some(Command::Serve { bind: Some(b) }) if b == "127.0.0.1:9000"));
    }

    #[test]
    fn test_features_args() {
        let cli = Cli::try_parse_from(["bioscreen", "features", "in.csv", "-o", "fp.csv", "--strict"]).unwrap();
        match cli.command {
            Some(Command::Features { input, output, strict }) => {
                assert_eq!(input, PathBuf::from("in.csv"));
                assert_eq!(output, Some(PathBuf::from("fp.csv")));
                assert!(strict);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    fn screen(dir: &Path) -> PathBuf {
        let input = dir.join("screen.csv");
        std::fs::write(&input, "CCO,m1\nC1CC,bad\nc1ccccc1c1ccccc1,m3\n").unwrap();
        input
    }

    #[test]
    fn test_strict_features_name_the_bad_structure() {
        let dir = tempfile::tempdir().unwrap();
        let err = fingerprint_table(&Config::default(), &screen(dir.path()), true).unwrap_err();
        let message = err.to_string();
        assert!(message.starts_with("unparseable_structure: "), "{message}");
        assert!(message.contains("bad"), "{message}");
    }

    #[test]
    fn test_features_csv_output() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.fingerprint.n_bits = 16;
        let out = dir.path().join("fp.csv");
        features(&config, &screen(dir.path()), Some(&out), false).unwrap();

        let text = std::fs::read_to_string(&out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("fp_0,fp_1,"));
        assert!(lines[0].ends_with(",fp_15,Name"));
        assert!(lines[2].ends_with(",bad"));
        assert!(lines[2].starts_with(",,"));
    }

    #[test]
    fn test_feature_line() {
        let computer = FingerprintComputer::new(2, 64);
        assert_eq!(feature_line("bad", &computer.compute_one("C1CC")), "bad\tmissing");
        let line = feature_line("ok", &computer.compute_one("CCO"));
        assert!(line.starts_with("ok\t"));
        assert!(line.len() > 3);
    }
}
