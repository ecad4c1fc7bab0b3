use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use ledgerguard::config::{self, AnalyzerConfig, ConfigError};
use ledgerguard::pipeline::analysis::format_currency;
use ledgerguard::{
    export_json, render_summary_report, AnalysisError, BatchAnalyzer, BatchItem, BatchItemResult,
    BatchReport, DocumentInput, FraudAnalyzer,
};

#[derive(Parser)]
#[command(name = "ledgerguard", version, about = "Fraud analysis for financial documents")]
struct Cli {
    /// JSON config file; defaults to the per-user config when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze one document and print the audit report.
    Analyze {
        file: PathBuf,
        #[arg(long)]
        name: Option<String>,
        #[arg(long = "type")]
        document_type: Option<String>,
        /// Also write the result as JSON.
        #[arg(long)]
        json: Option<PathBuf>,
    },
    /// Analyze several documents concurrently; one line per document.
    Batch {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

fn load_config(explicit: Option<PathBuf>) -> Result<AnalyzerConfig, ConfigError> {
    match explicit {
        Some(path) => AnalyzerConfig::from_file(&path),
        None => match config::default_config_path().filter(|p| p.exists()) {
            Some(path) => AnalyzerConfig::from_file(&path),
            None => AnalyzerConfig::from_env(),
        },
    }
}

fn read_document(path: &Path) -> Result<String, Box<dyn std::error::Error>> {
    std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read {}: {e}", path.display()).into())
}

/// Read every batch file. Unreadable files become failed results keyed by
/// their position in `files`, so they keep their place in the report.
fn load_batch(files: &[PathBuf]) -> (Vec<BatchItem>, Vec<(usize, BatchItemResult)>) {
    let mut items = Vec::with_capacity(files.len());
    let mut unreadable = Vec::new();
    for (position, path) in files.iter().enumerate() {
        let document_id = path.display().to_string();
        match read_document(path) {
            Ok(text) => items.push(BatchItem::from_text(document_id, text)),
            Err(e) => {
                tracing::warn!(document_id = %document_id, error = %e, "Skipping unreadable document");
                let outcome = Err(AnalysisError::InputValidation(e.to_string()));
                unreadable.push((position, BatchItemResult::from_outcome(document_id, outcome)));
            }
        }
    }
    (items, unreadable)
}

/// Put unreadable-file results back at their input positions.
fn merge_unreadable(report: &mut BatchReport, unreadable: Vec<(usize, BatchItemResult)>) {
    for (position, item) in unreadable {
        let position = position.min(report.items.len());
        report.items.insert(position, item);
    }
}

fn run(cli: Cli) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let config = load_config(cli.config)?;
    tracing::info!("{} v{} ({})", config::APP_NAME, config::APP_VERSION, config.model);

    match cli.cmd {
        Commands::Analyze {
            file,
            name,
            document_type,
            json,
        } => {
            let analyzer = FraudAnalyzer::from_config(&config)?;
            let mut input = DocumentInput::new(read_document(&file)?);
            input.name = name.or_else(|| file.file_name().map(|n| n.to_string_lossy().into_owned()));
            input.document_type = document_type;

            match analyzer.analyze(&input) {
                Ok(result) => {
                    println!("{}", render_summary_report(&result));
                    if let Some(path) = json {
                        export_json(&result, &path)?;
                    }
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) => {
                    eprintln!("{}", serde_json::to_string_pretty(&e.to_structured())?);
                    Ok(ExitCode::FAILURE)
                }
            }
        }
        Commands::Batch { files } => {
            let batch = BatchAnalyzer::from_config(&config)?;
            let (items, unreadable) = load_batch(&files);
            let mut report = batch.run_blocking(items)?;
            merge_unreadable(&mut report, unreadable);
            for item in &report.items {
                match (&item.result, &item.error) {
                    (Some(result), _) => println!(
                        "{}\t{}\t{} flag(s)\t{}",
                        item.document_id,
                        result.risk_level(),
                        result.flags().len(),
                        format_currency(result.total_flagged_amount())
                    ),
                    (None, Some(error)) => {
                        println!("{}\tERROR\t{:?}\t{}", item.document_id, error.kind, error.message)
                    }
                    (None, None) => println!("{}\tERROR", item.document_id),
                }
            }
            println!(
                "batch {}: {} succeeded, {} failed",
                report.batch_id,
                report.successful(),
                report.failed()
            );
            Ok(if report.failed() == 0 {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
    }
}

// The HTTP transport is blocking, so the entry point stays synchronous and
// batches get their own runtime.
fn main() -> ExitCode {
    ledgerguard::init_tracing();
    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerguard::ErrorKind;

    fn empty_report() -> BatchReport {
        let now = chrono::Utc::now();
        BatchReport {
            batch_id: uuid::Uuid::new_v4(),
            started_at: now,
            finished_at: now,
            items: Vec::new(),
        }
    }

    #[test]
    fn unreadable_file_becomes_failed_item_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("a.txt");
        let third = dir.path().join("c.txt");
        std::fs::write(&first, "first document").unwrap();
        std::fs::write(&third, "third document").unwrap();
        let files = vec![first, dir.path().join("missing.txt"), third];

        let (items, unreadable) = load_batch(&files);
        assert_eq!(items.len(), 2);
        assert_eq!(unreadable.len(), 1);
        assert_eq!(unreadable[0].0, 1);

        // Stand-in results for the two readable documents.
        let mut report = empty_report();
        for item in &items {
            report.items.push(BatchItemResult::from_outcome(
                item.document_id.clone(),
                Err(AnalysisError::TaskFailed("not run".into())),
            ));
        }
        merge_unreadable(&mut report, unreadable);

        let ids: Vec<&str> = report.items.iter().map(|i| i.document_id.as_str()).collect();
        assert!(ids[0].ends_with("a.txt"));
        assert!(ids[1].ends_with("missing.txt"));
        assert!(ids[2].ends_with("c.txt"));
        let error = report.items[1].error.as_ref().unwrap();
        assert_eq!(error.kind, ErrorKind::InputValidation);
        assert!(error.message.contains("cannot read"));
    }
}
