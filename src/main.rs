use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use groupscholar_performance_engine::batch;
use groupscholar_performance_engine::report;
use groupscholar_performance_engine::settings;
use groupscholar_performance_engine::store::{self, CsvSources};
use groupscholar_performance_engine::{ReportScope, SummaryReportBuilder, Term};

#[derive(Parser)]
#[command(name = "performance-engine")]
#[command(about = "Grade and attendance summaries for Group Scholar classes", long_about = None)]
struct Cli {
    /// Settings file (defaults to ./performance.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ScopeArgs {
    #[arg(long)]
    input: PathBuf,
    #[arg(long)]
    class: String,
    /// Defaults to today (UTC)
    #[arg(long)]
    as_of: Option<NaiveDate>,
    #[arg(long, requires_all = ["term_start", "term_end"])]
    term: Option<String>,
    #[arg(long, requires = "term")]
    term_start: Option<NaiveDate>,
    #[arg(long, requires = "term")]
    term_end: Option<NaiveDate>,
}

impl ScopeArgs {
    fn scope(&self) -> ReportScope {
        let scope = ReportScope::new(self.class.clone(), resolve_as_of(self.as_of));
        match (&self.term, self.term_start, self.term_end) {
            (Some(name), Some(start), Some(end)) => scope.with_term(Term {
                name: name.clone(),
                start,
                end,
            }),
            _ => scope,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Build a record set JSON file from CSV exports
    Import {
        #[arg(long)]
        grades: PathBuf,
        #[arg(long)]
        attendance: PathBuf,
        #[arg(long)]
        sessions: PathBuf,
        #[arg(long)]
        roster: Option<PathBuf>,
        #[arg(long, default_value_t = 1)]
        version: u64,
        #[arg(long, default_value = "records.json")]
        out: PathBuf,
    },
    /// Print a class summary, or one student's, as JSON
    Summarize {
        #[command(flatten)]
        scope: ScopeArgs,
        #[arg(long)]
        student: Option<String>,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Generate a markdown report for a class
    Report {
        #[command(flatten)]
        scope: ScopeArgs,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Summarize every class in a record set
    Batch {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        as_of: Option<NaiveDate>,
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

fn resolve_as_of(as_of: Option<NaiveDate>) -> NaiveDate {
    as_of.unwrap_or_else(|| Utc::now().date_naive())
}

fn emit(json: String, out: Option<&PathBuf>) -> anyhow::Result<()> {
    match out {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("failed to write {}", path.display()))?;
            info!(path = %path.display(), "summary written");
        }
        None => println!("{json}"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let cli = Cli::parse();
    let settings = settings::load_settings(cli.config.as_deref())
        .context("failed to load engine settings")?;
    let builder = SummaryReportBuilder::new(&settings);

    match cli.command {
        Commands::Import {
            grades,
            attendance,
            sessions,
            roster,
            version,
            out,
        } => {
            let sources = CsvSources {
                grades,
                attendance,
                sessions,
                roster,
            };
            let records = store::import_csv(&sources, version)?;
            store::save_record_set(&out, &records)?;
            println!(
                "Imported {} grades, {} attendance entries and {} sessions into {}.",
                records.grades.len(),
                records.attendance.len(),
                records.sessions.len(),
                out.display()
            );
        }
        Commands::Summarize {
            scope,
            student,
            out,
        } => {
            let records = store::load_record_set(&scope.input)?;
            let scope = scope.scope();
            let json = match student.as_deref() {
                Some(student_id) => {
                    let summary = builder.build_student_summary(&records, &scope, student_id)?;
                    serde_json::to_string_pretty(&summary)?
                }
                None => {
                    let summary = builder.build_class_summary(&records, &scope)?;
                    serde_json::to_string_pretty(&summary)?
                }
            };
            emit(json, out.as_ref())?;
        }
        Commands::Report { scope, out } => {
            let records = store::load_record_set(&scope.input)?;
            let summary = builder.build_class_summary(&records, &scope.scope())?;
            std::fs::write(&out, report::build_report(&summary))
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
        Commands::Batch { input, as_of, out } => {
            let records = store::load_record_set(&input)?;
            let scopes = batch::scopes_for_all_classes(&records, resolve_as_of(as_of));
            if scopes.is_empty() {
                println!("No classes found in {}.", input.display());
                return Ok(());
            }

            let class_ids: Vec<String> = scopes.iter().map(|s| s.class_id.clone()).collect();
            let results = batch::summarize_classes(
                Arc::new(builder),
                Arc::new(records),
                scopes,
                &settings.batch,
            )
            .await;

            let outcomes = batch::outcomes(class_ids, results);
            emit(serde_json::to_string_pretty(&outcomes)?, out.as_ref())?;

            let failed = outcomes.iter().filter(|o| o.failed()).count();
            if failed > 0 {
                anyhow::bail!("{failed} of {} class summaries failed", outcomes.len());
            }
        }
    }

    Ok(())
}
