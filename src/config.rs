use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::time::Duration;

use crate::drivers::DriverSettings;
use crate::models::{PayloadMode, Protocol, TestConfiguration};
use crate::orchestrator::OrchestratorSettings;

pub const MAX_REQUESTS: usize = 10_000;
pub const MAX_CONCURRENCY: usize = 100;
pub const MAX_PAYLOAD_BYTES: usize = 100 * 1024 * 1024;

/// RPC vs HTTP performance comparison engine
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub settings: SettingsArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Serve the HTTP API
    Serve,
    /// Run one comparison and print the report
    Run(RunArgs),
    /// Start a mock echo upstream for local runs
    MockUpstream(MockUpstreamArgs),
}

/// Settings shared by every subcommand
#[derive(Args, Debug, Clone)]
pub struct SettingsArgs {
    /// Server host address
    #[arg(short = 'H', long, env = "SERVER_HOST", default_value = "0.0.0.0", global = true)]
    pub host: String,

    /// Server port
    #[arg(short, long, env = "SERVER_PORT", default_value = "3000", global = true)]
    pub port: u16,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "LOG_FORMAT", default_value = "text", global = true)]
    pub log_format: String,

    /// Binary-RPC upstream URL
    #[arg(long, env = "GRPC_URL", default_value = "http://127.0.0.1:9090", global = true)]
    pub grpc_url: String,

    /// HTTP upstream base URL
    #[arg(long, env = "HTTP_URL", default_value = "http://127.0.0.1:8080", global = true)]
    pub http_url: String,

    /// Max concurrent HTTP sockets
    #[arg(long, env = "HTTP_MAX_SOCKETS", default_value = "50", global = true)]
    pub http_max_sockets: usize,

    /// Connect timeout in milliseconds
    #[arg(long, env = "CONNECT_TIMEOUT_MS", default_value = "10000", global = true)]
    pub connect_timeout_ms: u64,

    /// Lower bound of the per-request timeout in milliseconds
    #[arg(long, env = "MIN_REQUEST_TIMEOUT_MS", default_value = "120000", global = true)]
    pub min_request_timeout_ms: u64,

    /// Timeout added per payload byte, in milliseconds
    #[arg(long, env = "TIMEOUT_MS_PER_BYTE", default_value = "0.01", global = true)]
    pub timeout_ms_per_byte: f64,

    /// Pause between protocol runs in milliseconds
    #[arg(long, env = "PROTOCOL_COOLDOWN_MS", default_value = "1000", global = true)]
    pub protocol_cooldown_ms: u64,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Requests per protocol
    #[arg(short = 'n', long, default_value = "100")]
    pub requests: usize,

    /// Requests in flight at once
    #[arg(short, long, default_value = "10")]
    pub concurrency: usize,

    /// Request payload size in bytes
    #[arg(long, default_value = "1024")]
    pub request_size: usize,

    /// Response payload size in bytes
    #[arg(long, default_value = "1024")]
    pub response_size: usize,

    /// Protocols to run, comma separated (binaryRpc, http)
    #[arg(long, value_delimiter = ',', default_value = "binaryRpc,http")]
    pub protocols: Vec<Protocol>,

    /// Use the binary-RPC bidirectional stream
    #[arg(long)]
    pub streaming: bool,

    /// Payload shape (binary, structured)
    #[arg(long, default_value = "binary")]
    pub payload_mode: PayloadMode,

    /// Unmeasured requests sent before each protocol run
    #[arg(long, default_value = "0")]
    pub warmup: usize,

    /// Test name
    #[arg(long, default_value = "comparison")]
    pub name: String,

    /// Print the record as JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

impl RunArgs {
    pub fn to_test_configuration(&self) -> TestConfiguration {
        TestConfiguration {
            num_requests: self.requests,
            concurrency: self.concurrency,
            request_size: self.request_size,
            response_size: self.response_size,
            protocols: self.protocols.iter().copied().collect(),
            use_streaming: self.streaming,
            test_name: self.name.clone(),
            payload_mode: self.payload_mode,
            warmup_requests: self.warmup,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct MockUpstreamArgs {
    /// Listen port (0 picks a free port)
    #[arg(long, env = "MOCK_PORT", default_value = "8080")]
    pub mock_port: u16,

    /// Base latency added to every response, in milliseconds
    #[arg(long, default_value = "0")]
    pub latency_ms: u64,

    /// Random extra latency up to this many milliseconds
    #[arg(long, default_value = "0")]
    pub jitter_ms: u64,

    /// Fraction of requests answered with 500 (0.0 - 1.0)
    #[arg(long, default_value = "0.0")]
    pub error_rate: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Clone, Debug)]
pub struct Config {
    // Server settings
    pub server_host: String,
    pub server_port: u16,

    // Logging
    pub log_level: String,
    pub log_format: LogFormat,

    // Upstreams and timeouts
    pub drivers: DriverSettings,
    pub protocol_cooldown: Duration,
}

impl Config {
    /// Load configuration with priority: CLI > ENV > defaults
    pub fn load() -> Result<(Self, Command)> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let cli = Cli::parse();
        let config = Self::from_args(&cli.settings)?;
        Ok((config, cli.command))
    }

    pub fn from_args(args: &SettingsArgs) -> Result<Self> {
        let config = Config {
            server_host: args.host.clone(),
            server_port: args.port,
            log_level: args.log_level.clone(),
            log_format: parse_log_format(&args.log_format),
            drivers: DriverSettings {
                grpc_url: args.grpc_url.clone(),
                http_url: args.http_url.clone(),
                http_max_sockets: args.http_max_sockets,
                connect_timeout: Duration::from_millis(args.connect_timeout_ms),
                min_request_timeout: Duration::from_millis(args.min_request_timeout_ms),
                timeout_ms_per_byte: args.timeout_ms_per_byte,
            },
            protocol_cooldown: Duration::from_millis(args.protocol_cooldown_ms),
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.drivers.http_max_sockets == 0 {
            anyhow::bail!("HTTP_MAX_SOCKETS must be at least 1");
        }
        if !self.drivers.timeout_ms_per_byte.is_finite() || self.drivers.timeout_ms_per_byte < 0.0 {
            anyhow::bail!(
                "TIMEOUT_MS_PER_BYTE must be a non-negative number, got {}",
                self.drivers.timeout_ms_per_byte
            );
        }
        for (name, url) in [
            ("GRPC_URL", &self.drivers.grpc_url),
            ("HTTP_URL", &self.drivers.http_url),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                anyhow::bail!("{} must start with http:// or https://, got '{}'", name, url);
            }
        }
        Ok(())
    }

    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            protocol_cooldown: self.protocol_cooldown,
        }
    }
}

/// Clamp a caller-supplied configuration into the accepted bounds
pub fn clamp_test_configuration(mut config: TestConfiguration) -> TestConfiguration {
    config.num_requests = config.num_requests.clamp(1, MAX_REQUESTS);
    config.concurrency = config.concurrency.clamp(1, MAX_CONCURRENCY);
    config.request_size = config.request_size.min(MAX_PAYLOAD_BYTES);
    config.response_size = config.response_size.min(MAX_PAYLOAD_BYTES);
    config.warmup_requests = config.warmup_requests.min(MAX_REQUESTS);
    config
}

fn parse_log_format(s: &str) -> LogFormat {
    match s.to_lowercase().as_str() {
        "json" => LogFormat::Json,
        _ => LogFormat::Text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_parse_log_format() {
        assert_eq!(parse_log_format("json"), LogFormat::Json);
        assert_eq!(parse_log_format("JSON"), LogFormat::Json);
        assert_eq!(parse_log_format("text"), LogFormat::Text);
        assert_eq!(parse_log_format("anything"), LogFormat::Text);
    }

    #[test]
    fn test_run_subcommand() {
        let cli = parse(&[
            "rpc-perf",
            "run",
            "-n",
            "50",
            "--concurrency",
            "5",
            "--protocols",
            "http",
            "--payload-mode",
            "structured",
            "--grpc-url",
            "http://10.0.0.1:9090",
        ]);

        assert_eq!(cli.settings.grpc_url, "http://10.0.0.1:9090");
        let Command::Run(run) = cli.command else {
            panic!("expected run subcommand");
        };
        let config = run.to_test_configuration();
        assert_eq!(config.num_requests, 50);
        assert_eq!(config.concurrency, 5);
        assert_eq!(config.protocols.len(), 1);
        assert!(config.protocols.contains(&Protocol::Http));
        assert_eq!(config.payload_mode, PayloadMode::Structured);
    }

    #[test]
    fn test_run_defaults_cover_both_protocols() {
        let cli = parse(&["rpc-perf", "run"]);
        let Command::Run(run) = cli.command else {
            panic!("expected run subcommand");
        };
        let config = run.to_test_configuration();
        assert_eq!(
            config.protocols.iter().copied().collect::<Vec<_>>(),
            vec![Protocol::BinaryRpc, Protocol::Http]
        );
    }

    #[test]
    fn test_unknown_protocol_rejected() {
        assert!(Cli::try_parse_from(["rpc-perf", "run", "--protocols", "smtp"]).is_err());
    }

    #[test]
    fn test_settings_map_to_drivers() {
        let cli = parse(&[
            "rpc-perf",
            "serve",
            "--http-max-sockets",
            "8",
            "--min-request-timeout-ms",
            "500",
            "--protocol-cooldown-ms",
            "0",
        ]);
        let config = Config::from_args(&cli.settings).unwrap();
        assert_eq!(config.drivers.http_max_sockets, 8);
        assert_eq!(config.drivers.min_request_timeout, Duration::from_millis(500));
        assert_eq!(config.orchestrator_settings().protocol_cooldown, Duration::ZERO);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let cli = parse(&["rpc-perf", "serve", "--http-max-sockets", "0"]);
        assert!(Config::from_args(&cli.settings).is_err());

        let cli = parse(&["rpc-perf", "serve", "--http-url", "localhost:8080"]);
        assert!(Config::from_args(&cli.settings).is_err());
    }

    #[test]
    fn test_clamp_test_configuration() {
        let config = TestConfiguration {
            num_requests: 0,
            concurrency: 500,
            request_size: usize::MAX,
            response_size: 10,
            ..Default::default()
        };
        let clamped = clamp_test_configuration(config);
        assert_eq!(clamped.num_requests, 1);
        assert_eq!(clamped.concurrency, MAX_CONCURRENCY);
        assert_eq!(clamped.request_size, MAX_PAYLOAD_BYTES);
        assert_eq!(clamped.response_size, 10);

        let clamped = clamp_test_configuration(TestConfiguration {
            num_requests: 20_000,
            ..Default::default()
        });
        assert_eq!(clamped.num_requests, MAX_REQUESTS);
    }
}
