//! Daily trigger for scans.

use chrono::{
    DateTime, Datelike, Duration, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Weekday,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use tracing::{error, info, warn};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleMode {
    /// Scan and notify in the same pass.
    #[default]
    SinglePhase,
    /// Scan at `scan_at`, persist the flagged list, notify at `notify_at`.
    TwoPhase,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ScheduleConfig {
    pub mode: ScheduleMode,
    pub scan_at: String,   // "HH:MM", local time
    pub notify_at: String, // only used in two-phase mode
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            mode: ScheduleMode::SinglePhase,
            scan_at: "00:00".to_string(),
            notify_at: "06:00".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Scan,
    Notify,
}

impl ScheduleConfig {
    /// Trigger times of one day, sorted.
    pub fn triggers(&self) -> anyhow::Result<Vec<(NaiveTime, Phase)>> {
        let mut triggers = vec![(parse_time(&self.scan_at)?, Phase::Scan)];
        if self.mode == ScheduleMode::TwoPhase {
            triggers.push((parse_time(&self.notify_at)?, Phase::Notify));
        }
        triggers.sort_by_key(|(time, _)| *time);
        Ok(triggers)
    }
}

fn parse_time(text: &str) -> anyhow::Result<NaiveTime> {
    NaiveTime::parse_from_str(text.trim(), "%H:%M")
        .map_err(|e| anyhow::anyhow!("invalid trigger time {text:?}: {e}"))
}

/// Markets are closed on weekends; holidays are not tracked.
pub fn is_trading_day(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Next trigger strictly after `now`.
pub fn next_trigger(
    now: NaiveDateTime,
    triggers: &[(NaiveTime, Phase)],
) -> Option<(NaiveDateTime, Phase)> {
    let today = now.date();
    triggers
        .iter()
        .map(|(time, phase)| {
            let at = today.and_time(*time);
            if at > now {
                (at, *phase)
            } else {
                (at + Duration::days(1), *phase)
            }
        })
        .min_by_key(|(at, _)| *at)
}

fn to_local(at: NaiveDateTime) -> Option<DateTime<Local>> {
    Local.from_local_datetime(&at).earliest()
}

/// Sleeps until each trigger and runs `job` for it. Never returns unless the
/// trigger configuration is invalid. Job errors are logged and the loop
/// moves on to the next trigger.
pub async fn run_daily<F, Fut>(config: &ScheduleConfig, mut job: F) -> anyhow::Result<()>
where
    F: FnMut(Phase) -> Fut,
    Fut: Future<Output = anyhow::Result<()>>,
{
    let triggers = config.triggers()?;
    loop {
        let now = Local::now();
        let Some((at, phase)) = next_trigger(now.naive_local(), &triggers) else {
            anyhow::bail!("no trigger configured");
        };
        let wait = match to_local(at) {
            Some(target) => (target - now).to_std().unwrap_or_default(),
            None => {
                // Local time skipped by a DST jump; try again in an hour.
                warn!(%at, "trigger time does not exist locally");
                std::time::Duration::from_secs(3600)
            }
        };
        info!(next = %at, ?phase, "waiting {}s", wait.as_secs());
        tokio::time::sleep(wait).await;

        if let Err(e) = job(phase).await {
            error!(?phase, "scheduled run failed: {:#}", e);
        }
    }
}
