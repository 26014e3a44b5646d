// Server configuration - command line flags with environment fallbacks

use anyhow::{Context, Result};
use clap::Parser;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

pub const DEFAULT_DATABASE: &str = "expenses.db";
pub const DEFAULT_PORT: u16 = 5000;

#[derive(Debug, Clone, Parser)]
#[command(name = "expense-server", version, about = "Expense tracking HTTP service")]
pub struct ServerConfig {
    /// SQLite database file, created on first start
    #[arg(long, env = "EXPENSE_DB", default_value = DEFAULT_DATABASE)]
    pub database: PathBuf,

    /// Address to listen on
    #[arg(long, env = "EXPENSE_HOST", default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub host: IpAddr,

    #[arg(long, env = "EXPENSE_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,
}

impl ServerConfig {
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Make sure the directory holding the database file exists
    pub fn ensure_database_dir(&self) -> Result<()> {
        match self.database.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create directory {}", dir.display())),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::try_parse_from(["expense-server"]).unwrap();

        assert_eq!(config.database, PathBuf::from("expenses.db"));
        assert_eq!(config.bind_addr().to_string(), "0.0.0.0:5000");
    }

    #[test]
    fn test_flags_override_defaults() {
        let config = ServerConfig::try_parse_from([
            "expense-server",
            "--database",
            "/tmp/spend.db",
            "--host",
            "127.0.0.1",
            "--port",
            "8081",
        ])
        .unwrap();

        assert_eq!(config.database, PathBuf::from("/tmp/spend.db"));
        assert_eq!(config.bind_addr().to_string(), "127.0.0.1:8081");
    }

    #[test]
    fn test_rejects_bad_port() {
        assert!(ServerConfig::try_parse_from(["expense-server", "--port", "99999"]).is_err());
    }

    #[test]
    fn test_ensure_database_dir_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("nested").join("expenses.db");
        let config = ServerConfig::try_parse_from([
            "expense-server",
            "--database",
            db_path.to_str().unwrap(),
        ])
        .unwrap();

        config.ensure_database_dir().unwrap();

        assert!(dir.path().join("nested").is_dir());
    }
}
