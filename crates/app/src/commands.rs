//! Command handlers. Results go to stdout, logs to stderr.

use std::path::Path;

use anyhow::{Context, Result};
use serde_json::Value;
use services::{AppServices, EvaluationContext, ExerciseAttempt, ModuleSession};
use wellness_core::achievements::{AchievementCategory, AchievementFilter};
use wellness_core::gate::SectionAccess;
use wellness_core::model::{ModuleId, SectionId, TrainingModule, UserId};

/// Parses `key=value`; the value is JSON when it parses, a string otherwise.
pub fn parse_response(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got `{raw}`"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty response key in `{raw}`"));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_owned()));
    Ok((key.to_owned(), value))
}

pub async fn import_catalog(app: &AppServices, file: &Path) -> Result<()> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("reading {}", file.display()))?;
    let modules: Vec<TrainingModule> =
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", file.display()))?;
    let count = app.catalog().import(modules).await?;
    println!("imported {count} module(s)");
    Ok(())
}

pub async fn modules(app: &AppServices, user: &UserId) -> Result<()> {
    for row in app.progress().overview(user).await? {
        println!(
            "{:>3}  {:<24} {:<12} {:>3}%  {}",
            row.number,
            row.module_id,
            row.status.as_str(),
            row.progress_percentage,
            row.title
        );
    }
    Ok(())
}

fn print_sections(session: &ModuleSession) -> Result<()> {
    let gate = session.gate()?;
    for state in gate.section_states() {
        let marker = match state.access {
            SectionAccess::Completed => "done",
            SectionAccess::Current => "next",
            SectionAccess::Available => "open",
            SectionAccess::Locked => "locked",
        };
        println!("  [{marker:^6}] {}  {}", state.section.id, state.section.title);
    }
    Ok(())
}

pub async fn open(app: &AppServices, user: &UserId, module: &ModuleId) -> Result<()> {
    let opened = app.progress().open_module(user, module).await?;
    if let Some(warning) = &opened.warning {
        eprintln!("warning: {warning}");
    }
    let session = &opened.session;
    println!(
        "{} ({}%)",
        session.module().title,
        session.local().progress_percentage()
    );
    print_sections(session)
}

pub async fn complete(
    app: &AppServices,
    user: &UserId,
    module: &ModuleId,
    section: &SectionId,
) -> Result<()> {
    let progress = app.progress();
    let opened = progress.open_module(user, module).await?;
    if let Some(warning) = &opened.warning {
        eprintln!("warning: {warning}");
    }
    let mut session = opened.session;
    let outcome = progress.complete_section(&mut session, section).await?;
    if let Some(warning) = &outcome.warning {
        eprintln!("warning: {warning}");
    }

    if outcome.completion.newly_completed {
        println!(
            "completed {} ({}%)",
            outcome.completion.section, outcome.completion.progress_percentage
        );
    } else {
        println!("{} was already completed", outcome.completion.section);
    }
    if outcome.completion.module_completed {
        match &outcome.next_module {
            Some(next) => println!("module finished; up next: {next}"),
            None => println!("module finished; that was the last one"),
        }
    }
    print_sections(&session)
}

pub async fn submit(app: &AppServices, attempt: ExerciseAttempt) -> Result<()> {
    let stored = app.submissions().submit_exercise(attempt).await?;
    match stored.score {
        Some(score) => println!("submission {} scored {score}: {}", stored.id, stored.feedback),
        None => println!("submission {} recorded: {}", stored.id, stored.feedback),
    }
    Ok(())
}

pub async fn achievements(
    app: &AppServices,
    user: &UserId,
    ctx: &EvaluationContext,
    category: Option<AchievementCategory>,
    earned_only: bool,
) -> Result<()> {
    let filter = AchievementFilter {
        category,
        earned_only,
    };
    let report = app.achievements().report(user, ctx, &filter).await?;

    println!("{}/{} earned", report.summary.earned, report.summary.total);
    for status in &report.achievements {
        let def = &status.definition;
        let when = status
            .earned_at
            .map(|at| ctx.local(at).format("%Y-%m-%d %H:%M").to_string());
        println!(
            "{} {:<10} {:<22} {}{}",
            if status.earned { def.icon } else { "  " },
            def.rarity.as_str(),
            def.title,
            def.description,
            when.map(|w| format!(" (earned {w})")).unwrap_or_default()
        );
    }
    Ok(())
}
