use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Default config file location.
pub const DEFAULT_CONFIG_PATH: &str = "./relay.toml";

/// Command-line flags. Only flags that were actually passed take part in
/// the merge, so an omitted flag never masks the TOML file or environment.
#[derive(Parser, Serialize, Clone, Debug, Default)]
#[command(name = "relay-server", version, about = "Real-time event relay server")]
pub struct Cli {
    /// Port to listen on
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Bind address
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind_address: Option<String>,

    /// Origin allowed to connect (repeat or comma-separate for several)
    #[arg(long = "allowed-origin", value_delimiter = ',')]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub allowed_origins: Vec<String>,

    /// Enable structured JSON logging (for Docker/production)
    #[arg(long)]
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub json_logs: bool,

    /// Path to TOML config file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    #[serde(skip)]
    pub config: String,

    /// Output a commented TOML config template and exit
    #[arg(long)]
    #[serde(skip)]
    pub generate_config: bool,
}

/// Effective server configuration.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub port: u16,
    pub bind_address: String,
    /// Origins accepted on both the HTTP and WebSocket surfaces.
    /// Requests without an Origin header are always accepted.
    pub allowed_origins: Vec<String>,
    pub json_logs: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 4000,
            bind_address: "0.0.0.0".to_string(),
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "https://console-dev.inferless.com".to_string(),
            ],
            json_logs: false,
        }
    }
}

impl Config {
    /// Load config with layered precedence:
    /// built-in defaults < TOML file < env vars (RELAY_*) < CLI args
    pub fn load(cli: &Cli) -> Result<Self, figment::Error> {
        Self::figment(cli).extract()
    }

    pub fn figment(cli: &Cli) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&cli.config))
            .merge(Env::prefixed("RELAY_"))
            .merge(Serialized::defaults(cli))
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

/// Generate a commented TOML config template
pub fn generate_config_template() -> String {
    r#"# Relay Server Configuration
# Place this file at ./relay.toml or specify with --config <path>
# All settings can be overridden via environment variables (RELAY_PORT, etc.)
# or CLI flags (--port, etc.)

# Server port (default: 4000)
# port = 4000

# Bind address (default: 0.0.0.0 - all interfaces)
# bind_address = "0.0.0.0"

# Origins allowed to call the HTTP API and open WebSocket connections.
# Requests without an Origin header (server-to-server) are always allowed.
# Env: RELAY_ALLOWED_ORIGINS='["http://localhost:3000"]'
# CLI: --allowed-origin http://localhost:3000,https://app.example.com
# allowed_origins = ["http://localhost:3000", "https://console-dev.inferless.com"]

# Enable structured JSON logging for Docker/production
# json_logs = false
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    fn cli_with_config(path: &str) -> Cli {
        Cli {
            config: path.to_string(),
            ..Cli::default()
        }
    }

    #[test]
    fn test_defaults_without_file() {
        Jail::expect_with(|_jail| {
            let config = Config::load(&cli_with_config("missing.toml"))?;
            assert_eq!(config, Config::default());
            assert_eq!(config.listen_addr(), "0.0.0.0:4000");
            Ok(())
        });
    }

    #[test]
    fn test_toml_overrides_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "relay.toml",
                r#"
                port = 5000
                allowed_origins = ["https://app.example.com"]
                "#,
            )?;

            let config = Config::load(&cli_with_config("relay.toml"))?;
            assert_eq!(config.port, 5000);
            assert_eq!(config.bind_address, "0.0.0.0");
            assert_eq!(config.allowed_origins, vec!["https://app.example.com"]);
            Ok(())
        });
    }

    #[test]
    fn test_env_overrides_toml_and_cli_overrides_env() {
        Jail::expect_with(|jail| {
            jail.create_file("relay.toml", "port = 5000\nbind_address = \"10.0.0.1\"")?;
            jail.set_env("RELAY_PORT", "6000");
            jail.set_env("RELAY_JSON_LOGS", "true");

            let config = Config::load(&cli_with_config("relay.toml"))?;
            assert_eq!(config.port, 6000);
            assert_eq!(config.bind_address, "10.0.0.1");
            assert!(config.json_logs);

            let cli = Cli {
                port: Some(7000),
                ..cli_with_config("relay.toml")
            };
            let config = Config::load(&cli)?;
            assert_eq!(config.port, 7000);
            assert_eq!(config.bind_address, "10.0.0.1");
            Ok(())
        });
    }

    #[test]
    fn test_cli_parses_origin_list() {
        let cli = Cli::parse_from([
            "relay-server",
            "--allowed-origin",
            "http://a.test,http://b.test",
            "--allowed-origin",
            "http://c.test",
        ]);
        assert_eq!(
            cli.allowed_origins,
            vec!["http://a.test", "http://b.test", "http://c.test"]
        );
        assert_eq!(cli.config, DEFAULT_CONFIG_PATH);
        assert!(cli.port.is_none());
    }

    #[test]
    fn test_template_is_valid_toml() {
        let parsed: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::string(&generate_config_template()))
            .extract()
            .unwrap();
        assert_eq!(parsed, Config::default());
    }
}
