// ABOUTME: Server version detection for version-dependent catalog queries
// ABOUTME: Chooses the pg_stat_activity backend pid column for the connected server

use anyhow::{Context, Result};
use std::fmt;
use tokio_postgres::Client;

/// First release where `pg_stat_activity` exposes `pid` instead of `procpid`
const PID_COLUMN_SINCE: u32 = 90200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ServerVersion {
    /// Numeric form as reported by `server_version_num`, e.g. 160002
    pub num: u32,
}

impl ServerVersion {
    pub fn major(&self) -> u32 {
        self.num / 10000
    }

    /// Minor release; for 10 and later this is the patch level
    pub fn minor(&self) -> u32 {
        if self.num >= 100000 {
            self.num % 10000
        } else {
            (self.num / 100) % 100
        }
    }

    /// Column of `pg_stat_activity` holding the backend process id
    pub fn backend_pid_column(&self) -> &'static str {
        if self.num < PID_COLUMN_SINCE {
            "procpid"
        } else {
            "pid"
        }
    }
}

impl fmt::Display for ServerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.num >= 100000 {
            write!(f, "{}.{}", self.major(), self.minor())
        } else {
            write!(f, "{}.{}.{}", self.major(), self.minor(), self.num % 100)
        }
    }
}

/// Parse a `server_version_num` value such as `"160002"`
pub fn parse_server_version_num(raw: &str) -> Result<ServerVersion> {
    let num = raw
        .trim()
        .parse::<u32>()
        .with_context(|| format!("Unexpected server_version_num value '{}'", raw))?;
    Ok(ServerVersion { num })
}

/// Query the version of the server behind `client`
pub async fn server_version(client: &Client) -> Result<ServerVersion> {
    let row = client
        .query_one("SHOW server_version_num", &[])
        .await
        .context("Failed to get PostgreSQL version")?;

    let raw: String = row.get(0);
    parse_server_version_num(&raw)
}
