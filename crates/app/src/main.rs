use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use services::{AppServices, Clock, EvaluationContext};
use wellness_core::achievements::AchievementCategory;
use wellness_core::model::{ExerciseId, ModuleId, SectionId, UserId};

mod commands;
mod db;

#[derive(Parser)]
#[command(name = "wellness")]
#[command(about = "Training progress and achievements for wellness modules")]
#[command(version)]
struct Cli {
    /// SQLite database URL or path
    #[arg(long, global = true, env = "WELLNESS_DB_URL", default_value = "sqlite://wellness.sqlite3")]
    db: String,

    /// Learner's offset from UTC in minutes, used for time-of-day, weekend and streak badges
    #[arg(
        long,
        global = true,
        env = "WELLNESS_UTC_OFFSET_MINUTES",
        default_value_t = 0,
        allow_negative_numbers = true
    )]
    utc_offset_minutes: i32,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import modules from a JSON array, replacing modules with the same id
    ImportCatalog { file: PathBuf },

    /// Show every module with the learner's status
    Modules {
        #[arg(long)]
        user: UserId,
    },

    /// Open a module and show its sections
    Open {
        #[arg(long)]
        user: UserId,
        #[arg(long)]
        module: ModuleId,
    },

    /// Mark a section complete
    Complete {
        #[arg(long)]
        user: UserId,
        #[arg(long)]
        module: ModuleId,
        #[arg(long)]
        section: SectionId,
    },

    /// Submit an exercise
    Submit {
        #[arg(long)]
        user: UserId,
        #[arg(long)]
        module: ModuleId,
        #[arg(long)]
        section: SectionId,
        #[arg(long)]
        exercise: ExerciseId,
        /// Response field as key=value; values are read as JSON when they parse
        #[arg(long = "response", value_parser = commands::parse_response)]
        responses: Vec<(String, serde_json::Value)>,
        /// Time spent on the exercise
        #[arg(long, default_value_t = 0)]
        seconds: u32,
    },

    /// List achievements, earned first
    Achievements {
        #[arg(long)]
        user: UserId,
        #[arg(long, value_parser = parse_category)]
        category: Option<AchievementCategory>,
        #[arg(long)]
        earned_only: bool,
    },
}

fn parse_category(raw: &str) -> Result<AchievementCategory, String> {
    AchievementCategory::parse(raw)
        .ok_or_else(|| format!("unknown category `{raw}` (module, exercise, streak, score, special)"))
}

fn init_tracing(verbose: bool) {
    let log_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let ctx = EvaluationContext::from_offset_minutes(cli.utc_offset_minutes).with_context(|| {
        format!("utc offset out of range: {} minutes", cli.utc_offset_minutes)
    })?;

    let db_url = db::normalize_sqlite_url(&cli.db);
    db::prepare_sqlite_file(&db_url)?;
    let app = AppServices::new_sqlite(&db_url, Clock::default_clock())
        .await
        .with_context(|| format!("opening {db_url}"))?;
    tracing::debug!(db = %db_url, "storage ready");

    match cli.command {
        Commands::ImportCatalog { file } => commands::import_catalog(&app, &file).await,
        Commands::Modules { user } => commands::modules(&app, &user).await,
        Commands::Open { user, module } => commands::open(&app, &user, &module).await,
        Commands::Complete {
            user,
            module,
            section,
        } => commands::complete(&app, &user, &module, &section).await,
        Commands::Submit {
            user,
            module,
            section,
            exercise,
            responses,
            seconds,
        } => {
            let attempt = services::ExerciseAttempt {
                user_id: user,
                module_id: module,
                section_id: section,
                exercise_id: exercise,
                responses: responses.into_iter().collect(),
                time_spent_secs: seconds,
            };
            commands::submit(&app, attempt).await
        }
        Commands::Achievements {
            user,
            category,
            earned_only,
        } => commands::achievements(&app, &user, &ctx, category, earned_only).await,
    }
}
