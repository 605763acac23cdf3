use std::path::PathBuf;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

mod db;
mod gpa;
mod guest;
mod models;
mod report;

use models::RawEntry;

#[derive(Parser)]
#[command(name = "cgpa-tracker")]
#[command(about = "CGPA and graduation progress tracker", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load the default grade scale, settings, and sample catalog
    Seed,
    /// Replace the grade scale from a CSV file
    ImportScale {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Show or update the global calculation settings
    Settings {
        #[arg(long)]
        precision: Option<u32>,
        #[arg(long)]
        lab_cgpa: Option<bool>,
        #[arg(long)]
        lab_credits: Option<bool>,
    },
    /// Add a semester from a JSON file of raw enrollment entries
    AddSemester {
        #[arg(long)]
        email: String,
        #[arg(long)]
        term: String,
        #[arg(long)]
        entries: PathBuf,
    },
    /// Re-submit a semester's enrollment entries
    UpdateSemester {
        #[arg(long)]
        email: String,
        #[arg(long)]
        term: String,
        #[arg(long)]
        entries: PathBuf,
    },
    /// Print per-semester GPA and cumulative CGPA for a student
    Summary {
        #[arg(long)]
        email: String,
    },
    /// Compute a summary from a local plan file, no database needed
    Guest {
        #[arg(long)]
        file: PathBuf,
        #[arg(long)]
        precision: Option<u32>,
    },
    /// Write a markdown academic progress report
    Report {
        #[arg(long)]
        email: String,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
        #[arg(long)]
        credits_required: Option<f64>,
    },
}

fn load_entries(path: &std::path::Path) -> anyhow::Result<Vec<RawEntry>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let entries: Vec<RawEntry> = serde_json::from_str(&contents)
        .with_context(|| format!("{} is not a valid entries file", path.display()))?;
    Ok(entries)
}

async fn connect() -> anyhow::Result<PgPool> {
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a production Postgres instance")?;

    PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")
}

fn print_summary(summary: &models::Summary, precision: u32) {
    let places = gpa::display_precision(precision);

    if summary.per_semester.is_empty() {
        println!("No semesters recorded.");
        return;
    }

    for standing in summary.per_semester.iter() {
        println!(
            "- {}: GPA {:.places$} over {} credits",
            standing.term_name,
            standing.gpa,
            standing.credits,
            places = places
        );
    }
    println!(
        "CGPA {:.places$} across {} credits and {} courses",
        summary.cgpa,
        summary.total_credits,
        summary.total_courses,
        places = places
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Guest mode never touches the database.
    if let Commands::Guest { file, precision } = &cli.command {
        let plan = guest::load_plan(file)?;
        let (summary, precision) = guest::summarize_plan(&plan, *precision);
        print_summary(&summary, precision);
        return Ok(());
    }

    let pool = connect().await?;

    match cli.command {
        Commands::Guest { .. } => unreachable!("handled before connecting"),
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::ImportScale { csv } => {
            let imported = db::import_scale_csv(&pool, &csv).await?;
            println!("Imported {imported} grade bands from {}.", csv.display());
        }
        Commands::Settings {
            precision,
            lab_cgpa,
            lab_credits,
        } => {
            let settings = if precision.is_none() && lab_cgpa.is_none() && lab_credits.is_none() {
                db::fetch_settings(&pool).await?
            } else {
                db::update_settings(&pool, precision, lab_cgpa, lab_credits).await?
            };
            println!("CGPA precision: {}", settings.cgpa_precision);
            println!("Lab counts towards CGPA: {}", settings.lab_counts_towards_cgpa);
            println!(
                "Lab counts towards credits: {}",
                settings.lab_counts_towards_credits
            );
        }
        Commands::AddSemester {
            email,
            term,
            entries,
        } => {
            let raw_entries = load_entries(&entries)?;
            let student_id = db::ensure_student(&pool, &email).await?;
            let (scale, settings, courses) = db::fetch_calc_snapshot(&pool).await?;
            let resolved =
                gpa::resolve_batch(&raw_entries, &scale, &settings, &courses, Utc::now());
            db::create_semester(&pool, student_id, &term, &resolved).await?;
            println!("Added {term} with {} enrollments for {email}.", resolved.len());
        }
        Commands::UpdateSemester {
            email,
            term,
            entries,
        } => {
            let raw_entries = load_entries(&entries)?;
            let student_id = db::find_student(&pool, &email).await?;
            let (scale, settings, courses) = db::fetch_calc_snapshot(&pool).await?;
            let resolved =
                gpa::resolve_batch(&raw_entries, &scale, &settings, &courses, Utc::now());
            db::update_semester(&pool, student_id, &term, &resolved).await?;
            println!("Updated {term} with {} enrollments for {email}.", resolved.len());
        }
        Commands::Summary { email } => {
            let student_id = db::find_student(&pool, &email).await?;
            let semesters = db::fetch_semesters(&pool, student_id).await?;
            let settings = db::fetch_settings(&pool).await?;
            let summary = gpa::compute_summary(&semesters, settings.cgpa_precision);
            print_summary(&summary, settings.cgpa_precision);
        }
        Commands::Report {
            email,
            out,
            credits_required,
        } => {
            let student_id = db::find_student(&pool, &email).await?;
            let semesters = db::fetch_semesters(&pool, student_id).await?;
            let settings = db::fetch_settings(&pool).await?;
            let summary = gpa::compute_summary(&semesters, settings.cgpa_precision);
            let report = report::build_report(
                &email,
                &semesters,
                &summary,
                settings.cgpa_precision,
                credits_required,
            );
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
