use crate::tracker::Registry;
use crate::types::ProcessKey;
use anyhow::{Context, Result};
use duckdb::{Connection, params};

/// DuckDB store for a finished leak report
pub struct Database {
    conn: Connection,
}

fn pid_column(pid: &ProcessKey) -> Option<&str> {
    match pid {
        ProcessKey::Known(pid) => Some(pid.as_str()),
        ProcessKey::Untraced => None,
    }
}

impl Database {
    /// Initialize a new database with schema
    pub fn init(path: &str) -> Result<Self> {
        let conn =
            Connection::open(path).context(format!("Failed to open database at {}", path))?;

        // NULL pid is the untraced initial process
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS processes (
                pid VARCHAR,
                cwd VARCHAR,
                open_handles BIGINT
            )
            "#,
            [],
        )?;
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS leaks (
                pid VARCHAR,
                fd BIGINT,
                path VARCHAR,
                flags VARCHAR
            )
            "#,
            [],
        )?;

        conn.execute("CREATE INDEX IF NOT EXISTS idx_leak_pid ON leaks(pid)", [])?;

        Ok(Self { conn })
    }

    /// Store every process and every handle still open, in report order
    pub fn write_registry(&self, registry: &Registry) -> Result<()> {
        let mut appender = self.conn.appender("processes")?;
        for process in registry.processes() {
            appender.append_row(params![
                pid_column(&process.pid),
                &process.cwd,
                i64::try_from(process.open_count())?,
            ])?;
        }
        appender.flush()?;

        let mut appender = self.conn.appender("leaks")?;
        for (pid, fd, handle) in registry.leaks() {
            appender.append_row(params![
                pid_column(pid),
                i64::try_from(fd)?,
                &handle.path,
                &handle.flags,
            ])?;
        }
        appender.flush()?;

        Ok(())
    }

    /// Count leaked handles
    pub fn count_leaks(&self) -> Result<usize> {
        let mut stmt = self.conn.prepare("SELECT COUNT(*) FROM leaks")?;
        let count: i64 = stmt.query_row([], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Count processes
    pub fn count_processes(&self) -> Result<usize> {
        let mut stmt = self.conn.prepare("SELECT COUNT(*) FROM processes")?;
        let count: i64 = stmt.query_row([], |row| row.get(0))?;
        Ok(count as usize)
    }
}
