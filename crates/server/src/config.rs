// crates/server/src/config.rs
//! Command-line and environment configuration.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;

use crate::jobs::RunnerConfig;

/// Default port for the server.
pub const DEFAULT_PORT: u16 = 47890;

#[derive(Parser, Debug, Clone)]
#[command(name = "jobwatch")]
#[command(about = "Background job tracker with live progress over WebSocket and SSE")]
#[command(version)]
pub struct Config {
    /// Address to bind
    #[arg(long, env = "JOBWATCH_HOST", default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    pub host: IpAddr,

    /// Port to listen on
    #[arg(long, env = "JOBWATCH_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Directory holding the job snapshot and artifacts
    #[arg(long, env = "JOBWATCH_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Milliseconds between progress ticks of each job
    #[arg(long, env = "JOBWATCH_TICK_MS", default_value_t = 3000, value_parser = clap::value_parser!(u64).range(1..))]
    pub tick_ms: u64,
}

impl Config {
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Explicit data dir, or the platform data directory.
    pub fn data_dir(&self) -> anyhow::Result<PathBuf> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => jobwatch_core::paths::default_data_dir()
                .context("Could not determine a data directory; pass --data-dir"),
        }
    }

    pub fn runner(&self) -> RunnerConfig {
        RunnerConfig::with_tick(Duration::from_millis(self.tick_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_flags() {
        let config = Config::try_parse_from([
            "jobwatch",
            "--host",
            "0.0.0.0",
            "--port",
            "9000",
            "--data-dir",
            "/tmp/jobwatch",
            "--tick-ms",
            "250",
        ])
        .unwrap();

        assert_eq!(config.addr(), "0.0.0.0:9000".parse::<SocketAddr>().unwrap());
        assert_eq!(config.data_dir().unwrap(), PathBuf::from("/tmp/jobwatch"));
        assert_eq!(config.runner().tick, Duration::from_millis(250));
        assert_eq!(config.runner().step, 5);
    }

    #[test]
    fn test_zero_tick_is_rejected() {
        assert!(Config::try_parse_from(["jobwatch", "--tick-ms", "0"]).is_err());
    }
}
