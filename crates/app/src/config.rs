use clap::{Args, Parser, Subcommand};
use hashmark_engine::EngineConfig;

#[derive(Parser)]
#[command(name = "hashmark")]
#[command(version, about = "Hashmark - prediction markets with a perpetuals engine", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the hashmark daemon
    Start(Box<StartConfig>),
    /// Display version information
    Version,
}

#[derive(Args)]
pub struct StartConfig {
    /// HTTP server address
    #[arg(long = "http.addr", default_value = "0.0.0.0:3000")]
    pub http_addr: String,

    /// State directory (one JSON file per domain)
    #[arg(long = "state.dir", env = "STATE_DIR", default_value = "./data/state")]
    pub state_dir: String,

    /// Persist state to disk (on/off)
    #[arg(long = "state.persist", env = "PERSIST_STATE", default_value = "on")]
    pub persist_state: String,

    /// Admin key for privileged routes; they answer 503 until set
    #[arg(long = "admin.key", env = "ADMIN_KEY")]
    pub admin_key: Option<String>,

    /// Funding settlement cadence in milliseconds
    #[arg(
        long = "funding.interval-ms",
        env = "FUNDING_INTERVAL_MS",
        default_value_t = 3_600_000
    )]
    pub funding_interval_ms: i64,

    /// Background liquidation sweep cadence in milliseconds
    #[arg(
        long = "liquidation.sweep-interval-ms",
        env = "LIQUIDATION_SWEEP_INTERVAL_MS",
        default_value_t = 5_000
    )]
    pub liquidation_sweep_interval_ms: i64,

    /// Maximum position leverage
    #[arg(long = "risk.max-leverage", env = "MAX_LEVERAGE", default_value_t = 10)]
    pub max_leverage: u32,

    /// Enable debug logging
    #[arg(long = "log.debug")]
    pub debug: bool,
}

impl StartConfig {
    pub fn persist_enabled(&self) -> bool {
        !matches!(
            self.persist_state.to_ascii_lowercase().as_str(),
            "off" | "false" | "0"
        )
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            max_leverage: self.max_leverage,
            funding_interval_ms: self.funding_interval_ms,
            ..EngineConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start_config(args: &[&str]) -> StartConfig {
        let mut full = vec!["hashmark", "start"];
        full.extend_from_slice(args);
        match Cli::parse_from(full).command {
            Commands::Start(config) => *config,
            _ => panic!("expected start command"),
        }
    }

    #[test]
    fn test_defaults() {
        let config = start_config(&[]);
        assert_eq!(config.http_addr, "0.0.0.0:3000");
        assert_eq!(config.funding_interval_ms, 3_600_000);
        assert_eq!(config.max_leverage, 10);
        assert!(config.persist_enabled());
        assert!(config.admin_key.is_none());
    }

    #[test]
    fn test_persist_toggle() {
        let config = start_config(&["--state.persist", "off"]);
        assert!(!config.persist_enabled());
    }

    #[test]
    fn test_engine_config_mapping() {
        let config = start_config(&["--risk.max-leverage", "25"]);
        assert_eq!(config.engine_config().max_leverage, 25);
    }
}
