use crate::config::parse_hhmm;
use crate::engine::time::DayPolicy;
use anyhow::{Context, Result, bail};
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, NaiveTime, Timelike, Utc};
use std::future::Future;
use tokio::time::{Duration, sleep};
use tracing::{error, info};

const RESCHEDULE_POLL_SECONDS: u64 = 30;

/// Daily report schedule: a `<minute> <hour> * * *` expression read in the policy's offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportSchedule {
    pub cron: String,
    pub policy: DayPolicy,
}

pub fn cron_from_report_time(report_time: &str) -> Result<String> {
    let time = parse_hhmm(report_time)?;
    Ok(format!("{} {} * * *", time.minute(), time.hour()))
}

/// Runs `task` once a day. The schedule is re-read on every poll so config edits apply
/// without a restart.
pub async fn run_cron_scheduler<S, F, Fut>(mut schedule_provider: S, mut task: F) -> Result<()>
where
    S: FnMut() -> Result<ReportSchedule>,
    F: FnMut(NaiveDate) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let mut last_logged_cron = String::new();

    loop {
        let schedule = match schedule_provider() {
            Ok(value) => value,
            Err(error) => {
                error!(error = %error, "failed to load report schedule");
                sleep(Duration::from_secs(RESCHEDULE_POLL_SECONDS)).await;
                continue;
            }
        };

        let delay = match seconds_until_next_run(&schedule, Utc::now()) {
            Ok(value) => value,
            Err(error) => {
                error!(error = %error, cron = %schedule.cron, "invalid report cron expression");
                sleep(Duration::from_secs(RESCHEDULE_POLL_SECONDS)).await;
                continue;
            }
        };

        if schedule.cron != last_logged_cron {
            info!(seconds = delay.as_secs(), cron = %schedule.cron, "next report schedule set");
            last_logged_cron = schedule.cron.clone();
        }

        if delay > Duration::from_secs(RESCHEDULE_POLL_SECONDS) {
            sleep(Duration::from_secs(RESCHEDULE_POLL_SECONDS)).await;
            continue;
        }

        sleep(delay).await;

        let date = schedule.policy.today(Utc::now());
        if let Err(error) = task(date).await {
            error!(error = %error, date = %date, "scheduled report generation failed");
        }

        sleep(Duration::from_secs(1)).await;
    }
}

fn seconds_until_next_run(schedule: &ReportSchedule, now: DateTime<Utc>) -> Result<Duration> {
    let target_time = parse_daily_cron_time(&schedule.cron)?;
    let today = schedule.policy.today(now);
    let at = |date: NaiveDate| {
        schedule.policy.start_of_day(date)
            + ChronoDuration::seconds(i64::from(target_time.num_seconds_from_midnight()))
    };

    let candidate_today = at(today);
    let next_run = if candidate_today > now {
        candidate_today
    } else {
        at(today + ChronoDuration::days(1))
    };

    (next_run - now)
        .to_std()
        .context("Failed to compute next execution delay")
}

fn parse_daily_cron_time(cron_expr: &str) -> Result<NaiveTime> {
    let fields = cron_expr.split_whitespace().collect::<Vec<_>>();

    if fields.len() != 5 {
        bail!("Invalid cron expression: {cron_expr}. Expected format: '<minute> <hour> * * *'");
    }

    if fields[2] != "*" || fields[3] != "*" || fields[4] != "*" {
        bail!(
            "Unsupported cron expression: {cron_expr}. Only daily format '<minute> <hour> * * *' is supported"
        );
    }

    let minute = fields[0]
        .parse::<u32>()
        .with_context(|| format!("Invalid cron minute: {}", fields[0]))?;
    let hour = fields[1]
        .parse::<u32>()
        .with_context(|| format!("Invalid cron hour: {}", fields[1]))?;

    NaiveTime::from_hms_opt(hour, minute, 0)
        .with_context(|| format!("Invalid cron time values: hour={hour}, minute={minute}"))
}
