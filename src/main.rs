mod ai;
mod api;
mod cli;
mod config;
mod db;
mod engine;
mod error;
mod recommend;
mod report;
mod scheduler;
mod tracker;

use crate::cli::onboard::run_onboarding;
use crate::cli::{
    AiCommands, ChallengeCommands, Cli, Commands, ConfigCommands, HobbyCommands, MoodCommands,
    RecoCommands, TaskCommands,
};
use crate::config::Config;
use crate::db::{Database, NewHobby, NewTask, TaskRow};
use crate::engine::MutationOutcome;
use crate::engine::model::{ActivityKind, WeeklyAggregate};
use crate::recommend::Catalog;
use crate::scheduler::ReportSchedule;
use crate::tracker::Tracker;
use crate::tracker::tasks::CompletedFilter;
use crate::tracker::teacher::LabelCount;
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use clap::Parser;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();
    let user = cli.user;

    match cli.command {
        Commands::Onboard => {
            let _ = run_onboarding()?;
            Ok(())
        }
        Commands::Config { command } => handle_config_command(command),
        Commands::Status => handle_status(),
        Commands::Doctor => handle_doctor(),
        Commands::Dashboard => handle_dashboard(user.as_deref()),
        Commands::Mood { command } => handle_mood_command(user.as_deref(), command),
        Commands::Reco { command } => handle_reco_command(user.as_deref(), command),
        Commands::Task { command } => handle_task_command(user.as_deref(), command),
        Commands::Hobby { command } => handle_hobby_command(user.as_deref(), command),
        Commands::Streak => handle_streak(user.as_deref()),
        Commands::Challenge { command } => handle_challenge_command(user.as_deref(), command),
        Commands::Report { date, all } => handle_report(user.as_deref(), date, all),
        Commands::Teacher { student, from, to } => handle_teacher(student.as_deref(), from, to),
        Commands::Ask { question } => handle_ask(user.as_deref(), &question),
        Commands::Ai { command } => handle_ai_command(command),
        Commands::Serve => {
            let config = load_config()?;
            run_service(config).await
        }
    }
}

fn handle_config_command(command: ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Set { key, value } => {
            let mut config = load_or_default_config()?;
            config.set_value(&key, &value)?;
            config.ensure_bootstrap_files()?;
            config.save()?;

            let masked = if key.contains("api_key") {
                "***hidden***".to_string()
            } else {
                value
            };
            println!("Config saved: {key} = {masked}");
            Ok(())
        }
        ConfigCommands::Get { key } => {
            let config = load_config()?;
            let value = config
                .get_value(&key)
                .with_context(|| format!("Unsupported config key: {key}"))?;

            println!("{value}");
            Ok(())
        }
    }
}

fn handle_status() -> Result<()> {
    let config = load_config()?;
    let database = Database::open(&config.db_path)?;
    let users = database.known_users()?;

    println!("MindTrack status");
    println!("- db_path: {}", config.db_path.display());
    println!("- students: {}", users.len());
    println!(
        "- default_user: {}",
        config.default_user.as_deref().unwrap_or("not_set")
    );
    println!("- day_offset_minutes: {}", config.utc_offset_minutes);
    println!("- comeback_trigger: {}", config.comeback_trigger.as_str());
    println!("- report_time: {}", config.report_time);

    if let Some(user) = config.default_user.as_deref() {
        println!(
            "- latest_report_date: {}",
            database
                .list_reports(user, 1)?
                .into_iter()
                .next()
                .map(|meta| meta.date)
                .unwrap_or_else(|| "none".to_string())
        );
    }

    Ok(())
}

fn handle_doctor() -> Result<()> {
    let config_path = Config::config_path()?;
    let mut issues = Vec::new();

    if config_path.exists() {
        println!("[OK] config.json found: {}", config_path.display());
    } else {
        println!("[WARN] config.json not found: {}", config_path.display());
        issues.push("config missing".to_string());
    }

    let config = load_or_default_config()?;

    match Database::open(&config.db_path) {
        Ok(_) => println!("[OK] SQLite reachable: {}", config.db_path.display()),
        Err(error) => {
            println!("[WARN] SQLite check failed: {error}");
            issues.push("db unreachable".to_string());
        }
    }

    if config.report_dir.exists() {
        println!("[OK] report dir exists: {}", config.report_dir.display());
    } else {
        println!("[WARN] report dir missing: {}", config.report_dir.display());
        issues.push("report dir missing".to_string());
    }

    if let Err(error) = config.parse_report_time() {
        println!("[WARN] invalid report_time setting: {error}");
        issues.push("invalid report_time".to_string());
    } else {
        println!("[OK] report_time format valid: {}", config.report_time);
    }

    match Catalog::load(&config.recommendations_path) {
        Ok(catalog) => println!(
            "[OK] recommendation catalog loaded: {} entries",
            catalog.recommendations.len()
        ),
        Err(error) => {
            println!("[WARN] recommendation catalog unusable, built-in list will be used: {error:#}");
            issues.push("catalog unusable".to_string());
        }
    }

    if config.default_user.is_none() {
        println!("[WARN] default_user not set; pass --user on every command");
        issues.push("default user missing".to_string());
    } else {
        println!("[OK] default_user set");
    }

    if config.ai_enabled {
        if ai::has_api_key(&config) {
            println!("[OK] AI API key is configured");
        } else {
            println!("[WARN] study buddy is enabled but API key is missing");
            issues.push("ai api key missing".to_string());
        }
    } else {
        println!("[OK] study buddy disabled");
    }

    if issues.is_empty() {
        println!("doctor result: no issues");
    } else {
        println!("doctor result: {} warning(s)", issues.len());
    }

    Ok(())
}

fn handle_dashboard(user: Option<&str>) -> Result<()> {
    let (mut tracker, user) = open_tracker(user)?;
    let dashboard = tracker.dashboard(&user, Utc::now())?;

    println!("Dashboard for {} ({})", dashboard.user_id, dashboard.today);
    println!("- mood streak: {} day(s)", dashboard.mood_streak);
    println!(
        "- recommendation streak: {} day(s)",
        dashboard.recommendation_streak
    );
    println!("- task streak: {} day(s)", dashboard.task_streak);
    println!(
        "- streaks saved: {} ({} until next milestone)",
        dashboard.streaks_saved, dashboard.saves_until_milestone
    );
    if let Some(challenge) = &dashboard.active_challenge {
        println!(
            "- comeback challenge #{}: {}",
            challenge.id, challenge.challenge_text
        );
    }
    println!(
        "- completed tasks: {} this week, {} this month",
        dashboard.completed.this_week, dashboard.completed.this_month
    );
    println!("- pending tasks: {}", dashboard.pending_tasks.len());
    dashboard.pending_tasks.iter().for_each(print_task);
    println!("- hobbies: {}", dashboard.hobbies.len());
    if let Some(weekly) = &dashboard.weekly {
        print_weekly(weekly);
    }

    Ok(())
}

fn handle_mood_command(user: Option<&str>, command: MoodCommands) -> Result<()> {
    match command {
        MoodCommands::Log { mood, energy } => {
            let (mut tracker, user) = open_tracker(user)?;
            let check_in = tracker.check_in(&user, mood, energy, Utc::now())?;

            println!(
                "Logged mood {} (energy {})",
                check_in.mood.as_str(),
                check_in.energy
            );
            if let Some(streak) = check_in.mood_streak {
                println!("- mood streak: {streak} day(s)");
            }
            match check_in.suggestion.id {
                Some(id) => println!("- try this (#{id}): {}", check_in.suggestion.text),
                None => println!("- {}", check_in.suggestion.text),
            }
            if check_in.stale {
                println!("- some totals could not be refreshed and may be out of date");
            }
            Ok(())
        }
        MoodCommands::Another {
            mood,
            energy,
            current,
        } => {
            let (mut tracker, _) = open_tracker(user)?;
            let suggestion = tracker.another_suggestion(mood, energy, current)?;
            match suggestion.id {
                Some(id) => println!("#{id}: {}", suggestion.text),
                None => println!("{}", suggestion.text),
            }
            Ok(())
        }
        MoodCommands::History { limit } => {
            let (tracker, user) = open_tracker(user)?;
            for entry in tracker.mood_history(&user, limit)? {
                println!(
                    "#{} {} {} energy={}",
                    entry.id,
                    entry.created_at,
                    entry.mood.map(|mood| mood.as_str()).unwrap_or("unknown"),
                    entry
                        .energy
                        .map(|energy| energy.to_string())
                        .unwrap_or_else(|| "-".to_string())
                );
            }
            Ok(())
        }
        MoodCommands::Delete { id } => {
            let (mut tracker, user) = open_tracker(user)?;
            tracker.delete_check_in(&user, id, Utc::now())?;
            println!("Mood check-in #{id} deleted");
            Ok(())
        }
    }
}

fn handle_reco_command(user: Option<&str>, command: RecoCommands) -> Result<()> {
    match command {
        RecoCommands::List { mood } => {
            let (tracker, _) = open_tracker(user)?;
            let catalog = tracker.catalog()?;
            for entry in catalog
                .recommendations
                .iter()
                .filter(|entry| mood.is_none_or(|mood| entry.mood == mood))
            {
                println!(
                    "#{} [{} {}-{}] {}",
                    entry.id,
                    entry.mood.as_str(),
                    entry.energy_min,
                    entry.energy_max,
                    entry.text
                );
            }
            Ok(())
        }
        RecoCommands::Done { id } => {
            let (mut tracker, user) = open_tracker(user)?;
            let outcome = tracker.complete_recommendation(&user, id, Utc::now())?;
            println!("Recommendation #{id} marked done");
            print_outcome(&outcome);
            Ok(())
        }
    }
}

fn handle_task_command(user: Option<&str>, command: TaskCommands) -> Result<()> {
    let (mut tracker, user) = open_tracker(user)?;
    let now = Utc::now();

    match command {
        TaskCommands::Add {
            title,
            category,
            priority,
            due,
        } => {
            let task = tracker.create_task(
                &user,
                &NewTask {
                    title,
                    category,
                    priority,
                    due_date: due,
                },
                now,
            )?;
            println!("Task created");
            print_task(&task);
        }
        TaskCommands::List => {
            let tasks = tracker.pending_tasks(&user)?;
            if tasks.is_empty() {
                println!("No pending tasks");
            }
            tasks.iter().for_each(print_task);
        }
        TaskCommands::Done { id, on } => {
            let completed_at = on.map(|date| backdated_instant(&tracker, date, now));
            let completion = tracker.complete_task(&user, id, completed_at, now)?;
            println!("Task #{} done: {}", completion.task.id, completion.task.title);
            print_outcome(&completion.outcome);
        }
        TaskCommands::Restore { id } => {
            tracker.restore_task(&user, id)?;
            println!("Task #{id} restored to pending");
        }
        TaskCommands::Delete { id } => {
            tracker.delete_task(&user, id)?;
            println!("Task #{id} deleted");
        }
        TaskCommands::Completed {
            search,
            category,
            priority,
            from,
            to,
            sort,
            page,
            page_size,
        } => {
            let listing = tracker.completed_tasks(
                &user,
                &CompletedFilter {
                    search,
                    category,
                    priority,
                    from,
                    to,
                    sort,
                    page: Some(page),
                    page_size: Some(page_size),
                },
            )?;
            println!(
                "Completed tasks: {} total (page {}, {} per page)",
                listing.total, listing.page, listing.page_size
            );
            listing.tasks.iter().for_each(print_task);
        }
        TaskCommands::Counts => {
            let counts = tracker.completion_counts(&user, now)?;
            println!("Completed this week: {}", counts.this_week);
            println!("Completed this month: {}", counts.this_month);
        }
    }

    Ok(())
}

fn handle_hobby_command(user: Option<&str>, command: HobbyCommands) -> Result<()> {
    let (mut tracker, user) = open_tracker(user)?;
    let now = Utc::now();

    match command {
        HobbyCommands::Add {
            name,
            sessions_per_week,
            minutes_per_session,
        } => {
            let hobby = tracker.create_hobby(
                &user,
                &NewHobby {
                    name,
                    sessions_per_week,
                    minutes_per_session,
                },
                now,
            )?;
            println!(
                "Hobby #{} created: {} ({}x/week, {} min)",
                hobby.id, hobby.name, hobby.sessions_per_week, hobby.minutes_per_session
            );
        }
        HobbyCommands::List => {
            for hobby in tracker.hobbies(&user)? {
                println!(
                    "#{} {} ({}x/week, {} min)",
                    hobby.id, hobby.name, hobby.sessions_per_week, hobby.minutes_per_session
                );
            }
        }
        HobbyCommands::Delete { id } => {
            tracker.delete_hobby(&user, id)?;
            println!("Hobby #{id} deleted");
        }
        HobbyCommands::Log { id, minutes, note } => {
            let outcome = tracker.log_session(&user, id, minutes, note.as_deref(), now)?;
            println!("Hobby session logged");
            print_outcome(&outcome);
        }
    }

    Ok(())
}

fn handle_streak(user: Option<&str>) -> Result<()> {
    let (mut tracker, user) = open_tracker(user)?;
    let today = tracker.today(Utc::now());

    println!("Streaks for {user} as of {today}");
    for kind in ActivityKind::ALL {
        let summary = tracker.streak_summary(&user, kind, today)?;
        println!(
            "- {}: current {}, longest {}, active days {}",
            kind.as_str(),
            summary.current,
            summary.longest,
            summary.active_days
        );
    }

    Ok(())
}

fn handle_challenge_command(user: Option<&str>, command: ChallengeCommands) -> Result<()> {
    let (mut tracker, user) = open_tracker(user)?;

    match command {
        ChallengeCommands::Show => {
            let view = tracker.challenge_view(&user)?;
            match &view.active {
                Some(challenge) => {
                    println!("Comeback challenge #{}", challenge.id);
                    println!("  {}", challenge.challenge_text);
                }
                None => println!("No active comeback challenge"),
            }
            println!(
                "Streaks saved: {} ({} until next milestone)",
                view.streaks_saved, view.saves_until_milestone
            );
        }
        ChallengeCommands::Accept { id } => {
            let saved = tracker.accept_challenge(&user, id)?;
            println!("Challenge #{id} completed. Streaks saved: {saved}");
        }
        ChallengeCommands::Skip { id } => {
            tracker.skip_challenge(&user, id)?;
            println!("Challenge #{id} skipped");
        }
        ChallengeCommands::History { limit } => {
            for challenge in tracker.challenge_history(&user, limit)? {
                println!(
                    "#{} {} {}",
                    challenge.id, challenge.created_at, challenge.challenge_text
                );
            }
        }
    }

    Ok(())
}

fn handle_report(user: Option<&str>, date: Option<NaiveDate>, all: bool) -> Result<()> {
    let config = load_config()?;
    let now = Utc::now();
    let mut tracker = Tracker::open(config)?;
    let as_of = date.unwrap_or_else(|| tracker.today(now));

    if all {
        let generated = report::generate_all_reports(&mut tracker, as_of, now)?;
        println!("Reports generated for {as_of}: {}", generated.len());
        for (report, saved) in generated {
            println!("- {}: {}", report.user_id, saved.markdown_path.display());
        }
        return Ok(());
    }

    let user = tracker.config().resolve_user(user)?;
    let (report, saved) = report::generate_and_store_report(&mut tracker, &user, as_of, now)?;

    println!("Report generated: {} ({})", report.user_id, report.as_of);
    println!("- Markdown: {}", saved.markdown_path.display());
    println!("- JSON: {}", saved.json_path.display());

    Ok(())
}

fn handle_teacher(
    student: Option<&str>,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> Result<()> {
    let config = load_config()?;
    let mut tracker = Tracker::open(config)?;
    let overview = tracker.teacher_overview(student, from, to, Utc::now())?;

    println!("Teacher overview as of {}", overview.as_of);
    if overview.students.is_empty() {
        println!("No students yet");
    }
    for row in &overview.students {
        println!(
            "- {}: mood {} (best {}), reco {}, task {}, saved {}/{}, questions {}",
            row.user_id,
            row.mood_streak,
            row.longest_mood_streak,
            row.recommendation_streak,
            row.task_streak,
            row.streaks_saved,
            row.challenges_offered,
            row.study_questions
        );
    }

    let class = &overview.class;
    println!("Class summary");
    match class.average_energy {
        Some(average) => println!(
            "- mood check-ins {} (avg energy {average:.2}; low {}, medium {}, high {})",
            class.mood_checkins,
            class.energy_distribution.low,
            class.energy_distribution.medium,
            class.energy_distribution.high
        ),
        None => println!("- mood check-ins 0"),
    }
    println!(
        "- tasks {} (done {}, pending {}, overdue {}, completion {:.1}%)",
        class.tasks.total,
        class.tasks.completed,
        class.tasks.pending,
        class.tasks.overdue,
        class.tasks.completion_rate
    );
    println!("- categories: {}", join_counts(&class.categories));
    println!("- priorities: {}", join_counts(&class.priorities));
    println!("- top task completers: {}", join_counts(&class.top_task_completers));
    println!("- top study askers: {}", join_counts(&class.top_study_askers));

    Ok(())
}

fn join_counts(rows: &[LabelCount]) -> String {
    if rows.is_empty() {
        return "none".to_string();
    }
    rows.iter()
        .map(|row| format!("{} {}", row.label, row.count))
        .collect::<Vec<_>>()
        .join(", ")
}

fn handle_ask(user: Option<&str>, question: &str) -> Result<()> {
    let (tracker, user) = open_tracker(user)?;
    let reply = tracker.ask(&user, question, Utc::now())?;
    println!("{}", reply.answer);
    Ok(())
}

fn handle_ai_command(command: AiCommands) -> Result<()> {
    match command {
        AiCommands::Test {
            key,
            base_url,
            model,
        } => {
            let mut config = load_or_default_config()?;

            if let Some(value) = key {
                config.ai_api_key = Some(value);
            }
            if let Some(value) = base_url {
                config.ai_api_base_url = value;
            }
            if let Some(value) = model {
                config.ai_model = value;
            }

            let response = ai::test_connection(&config)?;
            println!("AI API connection successful");
            println!("{response}");

            Ok(())
        }
    }
}

async fn run_service(config: Config) -> Result<()> {
    config.ensure_bootstrap_files()?;

    let shared_config = Arc::new(config);
    let scheduler_config = Arc::clone(&shared_config);
    let scheduler_schedule_fallback = Arc::clone(&shared_config);
    let api_config = Arc::clone(&shared_config);

    info!("MindTrack service started");

    tokio::select! {
        scheduler_result = scheduler::run_cron_scheduler(move || {
            let runtime = Config::load().unwrap_or_else(|_| (*scheduler_schedule_fallback).clone());

            Ok(ReportSchedule {
                cron: scheduler::cron_from_report_time(&runtime.report_time)?,
                policy: runtime.day_policy()?,
            })
        }, move |date| {
            let config = Arc::clone(&scheduler_config);
            async move {
                let runtime_config = Config::load().unwrap_or_else(|_| (*config).clone());
                run_scheduled_reports(runtime_config, date)
            }
        }) => {
            scheduler_result?;
        }
        api_result = api::serve_until(api_config, shutdown_signal()) => {
            api_result?;
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    match signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(error) => {
            warn!(error = %error, "ctrl-c handler unavailable; serving until killed");
            std::future::pending::<()>().await;
        }
    }
}

fn run_scheduled_reports(config: Config, date: NaiveDate) -> Result<()> {
    let mut tracker = Tracker::open(config)?;
    report::generate_all_reports(&mut tracker, date, Utc::now())?;
    Ok(())
}

/// Noon of `date` in the day policy, clamped to `now` so it is never in the future.
fn backdated_instant(tracker: &Tracker, date: NaiveDate, now: DateTime<Utc>) -> DateTime<Utc> {
    (tracker.policy().start_of_day(date) + Duration::hours(12)).min(now)
}

fn print_task(task: &TaskRow) {
    let due = task
        .due_date
        .map(|date| format!(" due {date}"))
        .unwrap_or_default();
    println!(
        "  #{} [{} | {}] {}{}",
        task.id,
        task.category.as_str(),
        task.priority.as_str(),
        task.title,
        due
    );
}

fn print_outcome(outcome: &MutationOutcome) {
    if let Some(streak) = outcome.streak {
        println!("- {} streak: {streak} day(s)", outcome.kind.as_str());
    }
    if let Some(challenge) = &outcome.challenge {
        println!("- streak broken! comeback challenge #{}:", challenge.id);
        println!("  {}", challenge.challenge_text);
    }
    if outcome.stale {
        println!("- some totals could not be refreshed and may be out of date");
    }
}

fn print_weekly(weekly: &WeeklyAggregate) {
    println!("- last 7 days ({} to {}):", weekly.window_start, weekly.as_of);
    println!("  mood logs {}", weekly.mood_logs_7d);
    println!("  recommendations done {}", weekly.recommendations_done_7d);
    println!(
        "  tasks done/created {}/{}",
        weekly.tasks_done_7d, weekly.tasks_created_7d
    );
    println!(
        "  hobby sessions {} ({} min)",
        weekly.hobby_sessions_7d, weekly.hobby_minutes_7d
    );
}

fn open_tracker(user: Option<&str>) -> Result<(Tracker, String)> {
    let config = load_config()?;
    let user = config.resolve_user(user)?;
    Ok((Tracker::open(config)?, user))
}

fn load_or_default_config() -> Result<Config> {
    Config::load().or_else(|_| {
        let config = Config::default();
        config.ensure_bootstrap_files()?;
        config.save()?;
        Ok(config)
    })
}

fn load_config() -> Result<Config> {
    Config::load().with_context(|| "Config file not found. Run `mindtrack onboard` first.".to_string())
}
