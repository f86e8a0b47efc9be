use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use walkdir::WalkDir;

use querygen_catalog::{Caches, PostgresCatalog};
use querygen_core::{
    Config, ConnectionConfig, Diagnostic, DiagnosticCode, FileReport, Location, Report, Severity,
};
use querygen_infer::Inferrer;
use querygen_sql::{parse_file, ParseOptions, ParseOutcome, MAX_ERRORS};

/// querygen - typed query descriptors from annotated SQL
#[derive(Parser)]
#[command(name = "querygen")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: querygen.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse query files and report syntax errors
    Check {
        /// Query files or directories of query files
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Infer query types against the catalog database
    Infer {
        /// Query files or directories of query files
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Output file for report.json
        #[arg(short, long, default_value = "report.json")]
        output: PathBuf,

        /// Connect to the database over TLS
        #[arg(long)]
        tls: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(cli.config.as_deref(), cli.verbose)?;

    if cli.verbose {
        eprintln!("{} namespace: {}", "Using".cyan(), config.namespace);
    }

    let report = match cli.command {
        Commands::Check { paths } => check_command(&config, &paths, cli.verbose)?,
        Commands::Infer { paths, output, tls } => {
            infer_command(&config, &paths, &output, tls, cli.verbose).await?
        }
    };

    print_report_summary(&report);

    if report.has_errors() {
        std::process::exit(1);
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_directive = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn load_config(path: Option<&Path>, verbose: bool) -> Result<Config> {
    if let Some(path) = path {
        return Config::from_file(path).with_context(|| format!("Failed to load {}", path.display()));
    }

    let default_path = Path::new("querygen.toml");
    if default_path.exists() {
        return Ok(Config::from_file(default_path)?);
    }

    if verbose {
        eprintln!("{}", "No config file found, using defaults".yellow());
    }
    Ok(Config::default())
}

/// Expand directories into the `.sql` files below them
///
/// Explicit file arguments are kept even without a `.sql` extension;
/// excluded paths are dropped either way.
fn collect_query_files(paths: &[PathBuf], config: &Config) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for path in paths {
        if path.is_dir() {
            let mut found = Vec::new();
            for entry in WalkDir::new(path).follow_links(true) {
                let entry = entry.with_context(|| format!("Failed to walk {}", path.display()))?;
                let is_sql = entry.path().extension().is_some_and(|ext| ext == "sql");
                if entry.file_type().is_file() && is_sql {
                    found.push(entry.into_path());
                }
            }
            found.sort();
            files.extend(found);
        } else if path.exists() {
            files.push(path.clone());
        } else {
            anyhow::bail!("Query path not found: {}", path.display());
        }
    }

    files.retain(|f| !config.is_excluded(&f.display().to_string()));
    files.dedup();
    Ok(files)
}

/// Parse every file, recording its diagnostics in the report
fn parse_all(config: &Config, paths: &[PathBuf], report: &mut Report, verbose: bool) -> Result<Vec<ParseOutcome>> {
    let options = ParseOptions::from_config(config);
    let files = collect_query_files(paths, config)?;

    if verbose {
        eprintln!("{} {} query files", "Parsing".cyan(), files.len());
    }

    let mut outcomes = Vec::with_capacity(files.len());
    for path in &files {
        let outcome = parse_file(path, &options)?;
        let name = outcome.file.name.clone();

        for diagnostic in outcome.errors.to_diagnostics(&name) {
            report.add_diagnostic(diagnostic);
        }
        if outcome.errors.len() > MAX_ERRORS {
            let diagnostic = Diagnostic::error(
                DiagnosticCode::ParseTooManyErrors,
                format!("more than {} errors, stopped parsing", MAX_ERRORS),
            );
            report.add_diagnostic(diagnostic.with_location(Location::new(name.clone())));
        }

        if verbose {
            if outcome.has_errors() {
                eprintln!("  {} {} ({} errors)", "✗".red(), name, outcome.errors.len());
            } else {
                eprintln!("  {} {}", "✓".green(), name);
            }
        }

        outcomes.push(outcome);
    }

    Ok(outcomes)
}

/// Check command - parse only, no database
fn check_command(config: &Config, paths: &[PathBuf], verbose: bool) -> Result<Report> {
    let mut report = Report::new();
    let outcomes = parse_all(config, paths, &mut report, verbose)?;

    for outcome in outcomes {
        let queries = outcome.file.queries.iter().filter(|q| !q.is_bad()).count();
        tracing::debug!(file = %outcome.file.name, queries, "parsed file");
        if !outcome.has_errors() {
            report.add_file(FileReport {
                path: outcome.file.name,
                doc_comment: outcome.file.doc_comment,
                queries: Vec::new(),
            });
        }
    }

    Ok(report)
}

/// Resolve the connection: config first, then `DATABASE_URL`
fn connection_config(config: &Config, tls: bool) -> Result<ConnectionConfig> {
    let mut connection = match &config.connection {
        Some(connection) => connection.clone(),
        None => {
            let _ = dotenvy::dotenv();
            let url = std::env::var("DATABASE_URL").map_err(|_| {
                anyhow::anyhow!(
                    "No database connection configured. Add a [connection] section to \
                     querygen.toml or set DATABASE_URL."
                )
            })?;
            ConnectionConfig::from_url(url)
        }
    };
    connection.tls |= tls;
    Ok(connection)
}

/// Infer command - parse, then type every query against the catalog
///
/// The report file is written only when every file was typed; any parse or
/// inference error ends the run without output.
async fn infer_command(
    config: &Config,
    paths: &[PathBuf],
    output: &Path,
    tls: bool,
    verbose: bool,
) -> Result<Report> {
    let mut report = Report::new();
    let outcomes = parse_all(config, paths, &mut report, verbose)?;
    if report.has_errors() {
        return Ok(report);
    }

    let connection = connection_config(config, tls)?;
    let catalog = PostgresCatalog::connect(&connection).await?;

    if verbose {
        eprintln!(
            "{} {}:{}/{}",
            "Connected to".cyan(),
            catalog.host(),
            catalog.port(),
            catalog.database()
        );
    }

    let caches = Caches::new();
    let inferrer = Inferrer::from_config(&catalog, &caches, config);
    if !infer_outcomes(&inferrer, outcomes, &mut report, verbose).await {
        return Ok(report);
    }

    report.save_to_file(output)?;

    if verbose {
        eprintln!("{} {}", "Report saved to:".green(), output.display());
    }

    Ok(report)
}

/// Type every parsed file, stopping at the first failure
///
/// Returns false when a file failed; its diagnostic is the last one in the
/// report and later files are not inferred.
async fn infer_outcomes(
    inferrer: &Inferrer<'_>,
    outcomes: Vec<ParseOutcome>,
    report: &mut Report,
    verbose: bool,
) -> bool {
    for outcome in outcomes {
        let name = outcome.file.name.clone();
        match inferrer.infer_file(&outcome.file).await {
            Ok(queries) => {
                if verbose {
                    eprintln!("  {} {} ({} queries)", "✓".green(), name, queries.len());
                }
                report.add_file(FileReport {
                    path: name,
                    doc_comment: outcome.file.doc_comment,
                    queries,
                });
            }
            Err(err) => {
                tracing::warn!(file = %name, error = %err, "inference failed, stopping run");
                report.add_diagnostic(err.to_diagnostic(&name));
                return false;
            }
        }
    }
    true
}

fn print_report_summary(report: &Report) {
    println!("\n{}", "=".repeat(60).bright_blue());
    println!("{}", "Query Type Report".bold().bright_blue());
    println!("{}", "=".repeat(60).bright_blue());
    println!();

    println!("Version: {}.{}", report.version.major, report.version.minor);
    println!("Timestamp: {}", report.timestamp);
    println!();

    println!("{}", "Summary:".bold());
    println!("  Files:    {}", report.summary.files);
    println!("  Queries:  {}", report.summary.queries);

    if report.summary.errors > 0 {
        println!("  Errors:   {}", format!("{}", report.summary.errors).red().bold());
    } else {
        println!("  Errors:   {}", format!("{}", report.summary.errors).green());
    }

    if report.summary.warnings > 0 {
        println!("  Warnings: {}", format!("{}", report.summary.warnings).yellow());
    } else {
        println!("  Warnings: {}", format!("{}", report.summary.warnings).green());
    }
    println!();

    if report.diagnostics.is_empty() {
        println!("{}", "✓ No issues found!".green().bold());
        return;
    }

    println!("{}", "Diagnostics:".bold());
    for diag in &report.diagnostics {
        let severity_str = match diag.severity {
            Severity::Error => "ERROR".red().bold(),
            Severity::Warn => "WARN".yellow().bold(),
            Severity::Info => "INFO".cyan(),
        };

        println!("  [{}] {}: {}", severity_str, diag.code, diag.message);

        if let Some(loc) = &diag.location {
            println!("    at {}", loc);
        }
        if let Some(query) = &diag.query {
            println!("    in query {}", query);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use querygen_catalog::{Field, MockCatalog, StatementDescription};
    use querygen_core::types::oid;
    use querygen_sql::parse_source;
    use std::time::Duration;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("querygen-cli-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(dir.join("nested")).unwrap();
        dir
    }

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn collects_sql_files_from_directories() {
        let dir = scratch_dir("collect");
        std::fs::write(dir.join("b.sql"), "").unwrap();
        std::fs::write(dir.join("nested/a.sql"), "").unwrap();
        std::fs::write(dir.join("notes.txt"), "").unwrap();

        let files = collect_query_files(&[dir.clone()], &Config::default()).unwrap();
        assert_eq!(files, vec![dir.join("b.sql"), dir.join("nested/a.sql")]);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn missing_paths_are_errors() {
        let missing = std::env::temp_dir().join("querygen-cli-definitely-missing.sql");
        assert!(collect_query_files(&[missing], &Config::default()).is_err());
    }

    #[test]
    fn check_reports_parse_errors() {
        let dir = scratch_dir("check");
        std::fs::write(dir.join("good.sql"), "-- name: One :one\nSELECT 1;\n").unwrap();
        std::fs::write(dir.join("bad.sql"), "SELECT 1;\n").unwrap();

        let report = check_command(&Config::default(), &[dir.clone()], false).unwrap();
        assert!(report.has_errors());
        assert_eq!(report.summary.files, 1);
        assert!(report
            .diagnostics
            .iter()
            .all(|d| d.location.as_ref().is_some_and(|l| l.file.ends_with("bad.sql"))));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn configured_connection_wins() {
        let config = Config {
            connection: Some(ConnectionConfig::from_url("postgres://localhost/app")),
            ..Config::default()
        };
        let connection = connection_config(&config, true).unwrap();
        assert_eq!(connection.connection_string(), "postgres://localhost/app");
        assert!(connection.tls);
    }

    #[tokio::test]
    async fn inference_stops_at_the_first_failing_file() {
        let options = ParseOptions::default();
        let outcomes = vec![
            parse_source("broken.sql", "-- name: Broken :one\nSELECT broken;", &options),
            parse_source("good.sql", "-- name: One :one\nSELECT 1;", &options),
        ];
        let catalog = MockCatalog::new().with_statement(
            "SELECT 1;",
            StatementDescription {
                params: vec![],
                columns: vec![Field::new("?column?", oid::INT4)],
            },
        );
        let caches = Caches::new();
        let inferrer = Inferrer::new(&catalog, &caches, Duration::from_secs(5));

        let mut report = Report::new();
        let complete = infer_outcomes(&inferrer, outcomes, &mut report, false).await;

        assert!(!complete);
        assert!(report.files.is_empty());
        assert_eq!(report.diagnostics.len(), 1);
        assert_eq!(report.diagnostics[0].query.as_deref(), Some("Broken"));
        assert_eq!(catalog.calls().describe, 1);
    }

    #[tokio::test]
    async fn parse_errors_end_the_run_before_connecting() {
        let dir = scratch_dir("infer");
        std::fs::write(dir.join("bad.sql"), "SELECT 1;\n").unwrap();
        let output = dir.join("report.json");

        let report = infer_command(&Config::default(), &[dir.clone()], &output, false, false)
            .await
            .unwrap();
        assert!(report.has_errors());
        assert!(!output.exists());

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
