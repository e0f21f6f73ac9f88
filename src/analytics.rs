use std::path::Path;

use chrono::{DateTime, Local, NaiveDate};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use tracing::info;

use crate::error::Result;

const CURRENT_SCHEMA_VERSION: i32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Rendered and probed, waiting for someone to watch it.
    Rendered,
    /// A human confirmed the output. Only this counts as complete.
    Approved,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Rendered => "rendered",
            RunStatus::Approved => "approved",
        }
    }

    fn parse(raw: &str) -> Self {
        match raw {
            "approved" => RunStatus::Approved,
            _ => RunStatus::Rendered,
        }
    }
}

/// One rendered run as stored in `analytics.db`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoRecord {
    pub run_id: String,
    pub created_at: String,
    pub topic: String,
    pub format: String,
    pub hook: String,
    pub output_path: String,
    pub duration: f64,
    pub status: RunStatus,
}

impl VideoRecord {
    pub fn rendered(
        run_id: &str,
        created_at: DateTime<Local>,
        topic: &str,
        format: &str,
        hook: &str,
        output_path: &Path,
        duration: f64,
    ) -> Self {
        VideoRecord {
            run_id: run_id.to_string(),
            created_at: created_at.to_rfc3339(),
            topic: topic.to_string(),
            format: format.to_string(),
            hook: hook.to_string(),
            output_path: output_path.to_string_lossy().into_owned(),
            duration,
            status: RunStatus::Rendered,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stats {
    pub total: u32,
    pub approved: u32,
    pub by_format: Vec<(String, u32)>,
}

pub struct Analytics {
    conn: Connection,
}

impl Analytics {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;
        Ok(Analytics { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Analytics { conn })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER NOT NULL PRIMARY KEY,
                updated TEXT NOT NULL
            )",
            (),
        )?;

        let version: i32 = conn
            .query_row(
                "SELECT version FROM schema_version ORDER BY version DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?
            .unwrap_or(0);

        if version < CURRENT_SCHEMA_VERSION {
            conn.execute(
                "CREATE TABLE IF NOT EXISTS videos (
                    run_id TEXT NOT NULL PRIMARY KEY,
                    created_at TEXT NOT NULL,
                    day TEXT NOT NULL,
                    topic TEXT NOT NULL,
                    format TEXT NOT NULL,
                    hook TEXT NOT NULL,
                    output_path TEXT NOT NULL,
                    duration REAL NOT NULL,
                    status TEXT NOT NULL
                )",
                (),
            )?;
            conn.execute(
                "INSERT OR REPLACE INTO schema_version (version, updated) VALUES (?1, datetime('now'))",
                [CURRENT_SCHEMA_VERSION],
            )?;
        }
        Ok(())
    }

    pub fn log_video(&self, record: &VideoRecord) -> Result<()> {
        let day = DateTime::parse_from_rfc3339(&record.created_at)
            .map(|t| t.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|_| Local::now().format("%Y-%m-%d").to_string());
        self.conn.execute(
            "INSERT OR REPLACE INTO videos
                (run_id, created_at, day, topic, format, hook, output_path, duration, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                record.run_id,
                record.created_at,
                day,
                record.topic,
                record.format,
                record.hook,
                record.output_path,
                record.duration,
                record.status.as_str(),
            ],
        )?;
        info!("Logged run {} ({})", record.run_id, record.status.as_str());
        Ok(())
    }

    /// Marks a run as confirmed by a human. False when the run id is unknown.
    pub fn approve(&self, run_id: &str) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE videos SET status = ?1 WHERE run_id = ?2",
            params![RunStatus::Approved.as_str(), run_id],
        )?;
        Ok(changed > 0)
    }

    pub fn count_on(&self, day: NaiveDate) -> Result<u32> {
        let count: u32 = self.conn.query_row(
            "SELECT COUNT(*) FROM videos WHERE day = ?1",
            [day.format("%Y-%m-%d").to_string()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn today_count(&self) -> Result<u32> {
        self.count_on(Local::now().date_naive())
    }

    fn recent_column(&self, column: &str, limit: u32) -> Result<Vec<String>> {
        let sql = format!(
            "SELECT {col} FROM videos WHERE {col} != '' ORDER BY created_at DESC LIMIT ?1",
            col = column
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([limit], |row| row.get(0))?;
        let mut values = Vec::new();
        for value in rows {
            values.push(value?);
        }
        Ok(values)
    }

    pub fn used_topics(&self, limit: u32) -> Result<Vec<String>> {
        self.recent_column("topic", limit)
    }

    pub fn used_hooks(&self, limit: u32) -> Result<Vec<String>> {
        self.recent_column("hook", limit)
    }

    pub fn recent(&self, limit: u32) -> Result<Vec<VideoRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT run_id, created_at, topic, format, hook, output_path, duration, status
             FROM videos ORDER BY created_at DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map([limit], |row| {
            let status: String = row.get(7)?;
            Ok(VideoRecord {
                run_id: row.get(0)?,
                created_at: row.get(1)?,
                topic: row.get(2)?,
                format: row.get(3)?,
                hook: row.get(4)?,
                output_path: row.get(5)?,
                duration: row.get(6)?,
                status: RunStatus::parse(&status),
            })
        })?;
        let mut records = Vec::new();
        for record in rows {
            records.push(record?);
        }
        Ok(records)
    }

    pub fn stats(&self) -> Result<Stats> {
        let (total, approved): (u32, u32) = self.conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(status = 'approved'), 0) FROM videos",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        let mut stmt = self
            .conn
            .prepare("SELECT format, COUNT(*) FROM videos GROUP BY format ORDER BY format")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        let mut by_format = Vec::new();
        for row in rows {
            by_format.push(row?);
        }
        Ok(Stats {
            total,
            approved,
            by_format,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32, hour: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 3, day, hour, 0, 0).single().unwrap()
    }

    fn record(run_id: &str, when: DateTime<Local>, topic: &str, hook: &str) -> VideoRecord {
        VideoRecord::rendered(run_id, when, topic, "scary_truth", hook, Path::new("output/x.mp4"), 58.2)
    }

    #[test]
    fn logs_and_lists_recent_runs() {
        let db = Analytics::open_in_memory().unwrap();
        db.log_video(&record("a", at(1, 9), "bank vault heist", "Nobody checked")).unwrap();
        db.log_video(&record("b", at(2, 9), "sleep paralysis", "")).unwrap();

        let recent = db.recent(10).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].run_id, "b");
        assert_eq!(recent[0].status, RunStatus::Rendered);
        assert_eq!(db.used_topics(10).unwrap(), vec!["sleep paralysis", "bank vault heist"]);
        assert_eq!(db.used_hooks(10).unwrap(), vec!["Nobody checked"]);
    }

    #[test]
    fn counts_runs_per_day() {
        let db = Analytics::open_in_memory().unwrap();
        db.log_video(&record("a", at(5, 8), "one", "")).unwrap();
        db.log_video(&record("b", at(5, 19), "two", "")).unwrap();
        db.log_video(&record("c", at(6, 8), "three", "")).unwrap();
        let day = NaiveDate::from_ymd_opt(2026, 3, 5).unwrap();
        assert_eq!(db.count_on(day).unwrap(), 2);
    }

    #[test]
    fn approval_marks_completion() {
        let db = Analytics::open_in_memory().unwrap();
        db.log_video(&record("a", at(1, 9), "one", "")).unwrap();
        assert!(db.approve("a").unwrap());
        assert!(!db.approve("missing").unwrap());

        let stats = db.stats().unwrap();
        assert_eq!(stats.total, 1);
        assert_eq!(stats.approved, 1);
        assert_eq!(stats.by_format, vec![("scary_truth".to_string(), 1)]);
        assert_eq!(db.recent(1).unwrap()[0].status, RunStatus::Approved);
    }

    #[test]
    fn reopening_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data/analytics.db");
        Analytics::open(&path)
            .unwrap()
            .log_video(&record("a", at(1, 9), "one", ""))
            .unwrap();
        assert_eq!(Analytics::open(&path).unwrap().recent(5).unwrap().len(), 1);
    }
}
