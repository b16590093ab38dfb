//! Scheduler contract.
//!
//! The OS task installer lives outside this crate; the pipeline only
//! maintains `scheduler.meta.json` so unattended verifiers can tell whether
//! the daily trigger exists and when it fires next. The file exists even
//! when nothing is installed (`installed=false`).

use chrono::{DateTime, Duration, FixedOffset, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// The daily trigger fires at this Beijing wall-clock time.
pub const DAILY_TIME: &str = "09:00";
pub const TIMEZONE: &str = "Asia/Shanghai";
pub const TASK_NAME: &str = "briefbot_daily";

/// Contents of `scheduler.meta.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerMeta {
    pub installed: bool,
    pub task_name: String,
    pub timezone: String,
    pub daily_time: String,
    pub next_run_at_beijing: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_run_status: Option<String>,
}

fn beijing_offset() -> FixedOffset {
    FixedOffset::east_opt(8 * 3600).expect("+08:00 is a valid offset")
}

/// Next 09:00 Beijing strictly after `now`.
pub fn next_run_at_beijing(now: DateTime<Utc>) -> DateTime<FixedOffset> {
    let beijing_now = now.with_timezone(&beijing_offset());
    let fire_time = NaiveTime::from_hms_opt(9, 0, 0).expect("static time");

    let today_fire = beijing_now
        .date_naive()
        .and_time(fire_time)
        .and_local_timezone(beijing_offset())
        .single()
        .expect("fixed offsets have no DST gaps");

    if beijing_now < today_fire {
        today_fire
    } else {
        today_fire + Duration::days(1)
    }
}

/// Build the meta block for this run.
pub fn scheduler_meta(
    installed: bool,
    now: DateTime<Utc>,
    last_run_status: Option<&str>,
) -> SchedulerMeta {
    SchedulerMeta {
        installed,
        task_name: TASK_NAME.to_string(),
        timezone: TIMEZONE.to_string(),
        daily_time: DAILY_TIME.to_string(),
        next_run_at_beijing: next_run_at_beijing(now).to_rfc3339(),
        last_run_status: last_run_status.map(str::to_string),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn before_nine_beijing_fires_same_day() {
        // 2026-07-01 00:30 UTC = 08:30 Beijing.
        let now = Utc.with_ymd_and_hms(2026, 7, 1, 0, 30, 0).unwrap();
        let next = next_run_at_beijing(now);
        assert_eq!(next.to_rfc3339(), "2026-07-01T09:00:00+08:00");
    }

    #[test]
    fn after_nine_beijing_fires_next_day() {
        // 2026-07-01 02:00 UTC = 10:00 Beijing.
        let now = Utc.with_ymd_and_hms(2026, 7, 1, 2, 0, 0).unwrap();
        let next = next_run_at_beijing(now);
        assert_eq!(next.to_rfc3339(), "2026-07-02T09:00:00+08:00");
    }

    #[test]
    fn meta_exists_even_when_not_installed() {
        let now = Utc.with_ymd_and_hms(2026, 7, 1, 12, 0, 0).unwrap();
        let meta = scheduler_meta(false, now, Some("OK"));
        assert!(!meta.installed);
        assert_eq!(meta.timezone, "Asia/Shanghai");
        assert_eq!(meta.daily_time, "09:00");
        assert_eq!(meta.last_run_status.as_deref(), Some("OK"));
        assert!(meta.next_run_at_beijing.ends_with("+08:00"));
    }
}
