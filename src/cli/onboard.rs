use crate::config::{Config, default_report_dir, expand_home, parse_hhmm};
use crate::db::Database;
use crate::engine::time::DayPolicy;
use anyhow::{Context, Result};
use dialoguer::{Confirm, Input, Select, theme::ColorfulTheme};

pub fn run_onboarding() -> Result<Config> {
    println!("──────────────────────────────────────────");
    println!("  Welcome to MindTrack onboarding.");
    println!("──────────────────────────────────────────");

    let theme = ColorfulTheme::default();

    println!("\n[1/5] Default student");
    println!("  Commands without --user act on this student.");
    let default_user: String = Input::with_theme(&theme)
        .with_prompt("  Student id")
        .validate_with(|input: &String| -> std::result::Result<(), &str> {
            if input.trim().is_empty() {
                Err("Student id must not be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()
        .context("Failed to read student id")?;
    println!("  ✓ Default student: {}", default_user.trim());

    println!("\n[2/5] Day boundary");
    println!("  Streaks count calendar days in this UTC offset.");
    let utc_offset_minutes: i32 = Input::with_theme(&theme)
        .with_prompt("  UTC offset in minutes (e.g. 540 for UTC+9, -300 for UTC-5)")
        .default(0)
        .validate_with(|input: &i32| -> std::result::Result<(), &str> {
            DayPolicy::from_offset_minutes(*input)
                .map(|_| ())
                .map_err(|_| "Offset must be within ±840 minutes")
        })
        .interact_text()
        .context("Failed to read UTC offset")?;
    println!("  ✓ Day offset: {utc_offset_minutes} minutes");

    println!("\n[3/5] Set weekly report time");
    let report_time: String = Input::with_theme(&theme)
        .with_prompt("  Enter daily report generation time")
        .default("21:00".to_string())
        .validate_with(|input: &String| -> std::result::Result<(), &str> {
            parse_hhmm(input)
                .map(|_| ())
                .map_err(|_| "Use HH:MM format (example: 21:00)")
        })
        .interact_text()
        .context("Failed to read report time")?;
    println!("  ✓ Reports will be generated daily at {report_time}");

    println!("\n[4/5] Report output directory");
    let default_report_dir = default_report_dir().display().to_string();
    let report_dir_input: String = Input::with_theme(&theme)
        .with_prompt("  Folder where reports will be saved")
        .default(default_report_dir)
        .interact_text()
        .context("Failed to read report directory")?;

    let report_dir = expand_home(&report_dir_input);
    println!("  ✓ {}", report_dir.display());

    println!("\n[5/5] Study buddy");
    println!("  Answers study questions through an OpenAI-compatible API.");
    let ai_enabled = Confirm::with_theme(&theme)
        .with_prompt("  Enable the study buddy?")
        .default(false)
        .interact()
        .context("Failed to read study buddy choice")?;

    let mut config = Config {
        default_user: Some(default_user.trim().to_string()),
        utc_offset_minutes,
        report_time,
        report_dir,
        ai_enabled,
        ..Config::default()
    };

    if ai_enabled {
        let key_sources = ["Enter an API key now", "Use MINDTRACK_AI_API_KEY from the environment"];
        let source = Select::with_theme(&theme)
            .with_prompt("  Where should the API key come from?")
            .default(0)
            .items(&key_sources)
            .interact()
            .context("Failed to select API key source")?;

        if source == 0 {
            let key: String = Input::with_theme(&theme)
                .with_prompt("  API key")
                .interact_text()
                .context("Failed to read API key")?;
            config.set_value("ai.api_key", &key)?;
        }
        println!("  ✓ Study buddy enabled");
    } else {
        println!("  ✓ Study buddy disabled (answers fall back to an apology)");
    }

    config.ensure_bootstrap_files()?;
    config.save()?;
    let _ = Database::open(&config.db_path)?;

    println!("\n──────────────────────────────────────────");
    println!("  Onboarding complete!");
    println!("  Run `mindtrack mood log calm 3` to check in,");
    println!("  or `mindtrack serve` to start the API and report scheduler.");
    println!("──────────────────────────────────────────");

    Ok(config)
}
