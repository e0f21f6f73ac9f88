use std::time::Duration;

use chrono::{Datelike, Local, NaiveDate, NaiveDateTime, Timelike, Weekday};
use rand::Rng;
use tracing::{error, info};

use crate::analytics::Analytics;
use crate::config::{AppConfig, RuntimeSettings};
use crate::error::Result;
use crate::pipeline::{Pipeline, RunRequest};

/// No runs before 06:00 or from 23:00 on.
pub const ACTIVE_HOURS: std::ops::Range<u32> = 6..23;
pub const CHECK_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Hours with the most short-form engagement, per weekday.
pub fn peak_hours(weekday: Weekday) -> &'static [u32] {
    match weekday {
        Weekday::Mon => &[7, 8, 12, 19, 20],
        Weekday::Tue => &[7, 8, 12, 19, 20, 21],
        Weekday::Wed => &[7, 8, 12, 19, 20, 21],
        Weekday::Thu => &[7, 8, 12, 19, 20],
        Weekday::Fri => &[7, 8, 12, 19],
        Weekday::Sat => &[10, 11, 12, 14, 20],
        Weekday::Sun => &[11, 12, 14, 19],
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub hour: u32,
    pub minute: u32,
}

/// Up to `max_videos` peak hours inside the active window, each at a random minute.
pub fn build_daily_schedule<R: Rng + ?Sized>(weekday: Weekday, max_videos: u32, rng: &mut R) -> Vec<Slot> {
    peak_hours(weekday)
        .iter()
        .copied()
        .filter(|h| ACTIVE_HOURS.contains(h))
        .take(max_videos as usize)
        .map(|hour| Slot {
            hour,
            minute: rng.random_range(5..=55),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Run,
    Wait(String),
}

/// Whether a run should start at `now`.
pub fn should_run(
    now: NaiveDateTime,
    schedule: &[Slot],
    last_run: Option<NaiveDateTime>,
    today_count: u32,
    max_videos: u32,
) -> Decision {
    let hour = now.hour();
    if !ACTIVE_HOURS.contains(&hour) {
        return Decision::Wait(format!(
            "outside active hours ({}:00-{}:00)",
            ACTIVE_HOURS.start, ACTIVE_HOURS.end
        ));
    }
    if let Some(last) = last_run {
        if last.date() == now.date() && last.hour() == hour {
            return Decision::Wait("already ran this hour".to_string());
        }
    }
    if today_count >= max_videos {
        return Decision::Wait(format!("daily cap reached ({}/{})", today_count, max_videos));
    }
    match schedule.iter().find(|slot| slot.hour == hour) {
        None => {
            let next = schedule
                .iter()
                .find(|slot| slot.hour > hour)
                .map(|s| format!("{:02}:{:02}", s.hour, s.minute))
                .unwrap_or_else(|| "none remaining today".to_string());
            Decision::Wait(format!("not a scheduled slot, next: {}", next))
        }
        Some(slot) if now.minute() < slot.minute => {
            Decision::Wait(format!("waiting for :{:02}", slot.minute))
        }
        Some(_) => Decision::Run,
    }
}

/// Runs the pipeline at today's slots until the process is stopped.
pub struct Scheduler {
    config: AppConfig,
    pipeline: Pipeline,
    schedule_date: Option<NaiveDate>,
    schedule: Vec<Slot>,
    last_run: Option<NaiveDateTime>,
}

impl Scheduler {
    pub fn new(config: AppConfig, pipeline: Pipeline) -> Self {
        Self {
            config,
            pipeline,
            schedule_date: None,
            schedule: Vec::new(),
            last_run: None,
        }
    }

    fn refresh_schedule(&mut self, today: NaiveDate, max_videos: u32) {
        if self.schedule_date == Some(today) {
            return;
        }
        self.schedule = build_daily_schedule(today.weekday(), max_videos, &mut rand::rng());
        self.schedule_date = Some(today);
        let slots: Vec<String> = self
            .schedule
            .iter()
            .map(|s| format!("{:02}:{:02}", s.hour, s.minute))
            .collect();
        info!("Schedule for {}: {}", today, slots.join(", "));
    }

    async fn run_once(&mut self) {
        let now = Local::now().naive_local();
        self.last_run = Some(now);
        match self.pipeline.run(&RunRequest::default()).await {
            Ok(report) => info!("Scheduled run {} finished: {}", report.run_id, report.rendered.path.display()),
            Err(e) => error!("Scheduled run failed: {}", e),
        }
    }

    async fn tick(&mut self) -> Result<()> {
        let settings = RuntimeSettings::load_or_default(&self.config.settings_file())?;
        let today_count = Analytics::open(&self.config.analytics_db())?.today_count()?;
        let now = Local::now().naive_local();
        self.refresh_schedule(now.date(), settings.max_videos_per_day);

        match should_run(now, &self.schedule, self.last_run, today_count, settings.max_videos_per_day) {
            Decision::Run => {
                info!("Scheduled slot reached ({}/{} today)", today_count, settings.max_videos_per_day);
                self.run_once().await;
            }
            Decision::Wait(reason) => info!("Not running: {}", reason),
        }
        Ok(())
    }

    pub async fn run_forever(mut self, run_now: bool) -> Result<()> {
        info!(
            "Scheduler started: active {}:00-{}:00, checking every {} minutes",
            ACTIVE_HOURS.start,
            ACTIVE_HOURS.end,
            CHECK_INTERVAL.as_secs() / 60
        );
        if run_now {
            info!("Forced run requested");
            self.run_once().await;
        }

        let mut ticker = tokio::time::interval(CHECK_INTERVAL);
        loop {
            ticker.tick().await;
            if let Err(e) = self.tick().await {
                error!("Scheduler check failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn at(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, day)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    #[test]
    fn schedule_takes_first_peak_hours_with_jitter() {
        let mut rng = StdRng::seed_from_u64(7);
        let slots = build_daily_schedule(Weekday::Tue, 4, &mut rng);
        let hours: Vec<u32> = slots.iter().map(|s| s.hour).collect();
        assert_eq!(hours, vec![7, 8, 12, 19]);
        assert!(slots.iter().all(|s| (5..=55).contains(&s.minute)));
        assert_eq!(build_daily_schedule(Weekday::Sun, 10, &mut rng).len(), 4);
    }

    #[test]
    fn runs_once_the_slot_minute_passes() {
        let schedule = [Slot { hour: 12, minute: 20 }, Slot { hour: 19, minute: 40 }];
        assert_eq!(should_run(at(3, 12, 25), &schedule, None, 0, 4), Decision::Run);
        assert!(matches!(should_run(at(3, 12, 10), &schedule, None, 0, 4), Decision::Wait(_)));
        match should_run(at(3, 14, 0), &schedule, None, 0, 4) {
            Decision::Wait(reason) => assert!(reason.contains("19:40")),
            Decision::Run => panic!("14:00 is not a slot"),
        }
    }

    #[test]
    fn respects_window_cap_and_hourly_limit() {
        let schedule = [Slot { hour: 7, minute: 5 }, Slot { hour: 23, minute: 5 }];
        assert!(matches!(should_run(at(3, 23, 30), &schedule, None, 0, 4), Decision::Wait(_)));
        assert!(matches!(should_run(at(3, 7, 30), &schedule, None, 4, 4), Decision::Wait(_)));
        assert!(matches!(
            should_run(at(3, 7, 30), &schedule, Some(at(3, 7, 6)), 1, 4),
            Decision::Wait(_)
        ));
        // Same hour on a different day is fine.
        assert_eq!(should_run(at(3, 7, 30), &schedule, Some(at(2, 7, 6)), 1, 4), Decision::Run);
    }
}
