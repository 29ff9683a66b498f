use anyhow::Result;
use std::sync::Arc;

use rpc_perf::config::{Command, Config, LogFormat, MockUpstreamArgs, RunArgs};
use rpc_perf::drivers::UpstreamConnector;
use rpc_perf::mock_server::{MockEchoServer, MockServerConfig};
use rpc_perf::orchestrator::Orchestrator;
use rpc_perf::registry::TestRegistry;
use rpc_perf::report::ComparisonReport;
use rpc_perf::routes::{self, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (for log level)
    let (config, command) = Config::load()?;

    init_logging(&config);

    match command {
        Command::Serve => serve(config).await,
        Command::Run(args) => run_once(config, args).await,
        Command::MockUpstream(args) => mock_upstream(args).await,
    }
}

/// Initialize logging with the configured level and format
fn init_logging(config: &Config) {
    let log_level = config.log_level.to_lowercase();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true);

    match config.log_format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

fn build_orchestrator(config: &Config) -> Arc<Orchestrator> {
    Arc::new(Orchestrator::new(
        TestRegistry::new(),
        Arc::new(UpstreamConnector::new(config.drivers.clone())),
        config.orchestrator_settings(),
    ))
}

/// Serve the HTTP API until a shutdown signal arrives
async fn serve(config: Config) -> Result<()> {
    tracing::info!("🚀 rpc-perf starting...");

    let orchestrator = build_orchestrator(&config);
    let app_state = AppState {
        orchestrator: orchestrator.clone(),
        config: Arc::new(config.clone()),
    };
    let app = routes::build_app(app_state);

    let addr = format!("{}:{}", config.server_host, config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    print_startup_banner(&config);
    tracing::info!("🚀 Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            orchestrator.interrupt_running();
        })
        .await?;

    tracing::info!("👋 Server shutdown complete");

    Ok(())
}

/// Run a single comparison and print the report
async fn run_once(config: Config, args: RunArgs) -> Result<()> {
    let orchestrator = build_orchestrator(&config);
    let test_config = args.to_test_configuration();

    tracing::info!(
        grpc_url = %config.drivers.grpc_url,
        http_url = %config.drivers.http_url,
        "Running comparison"
    );

    let record = tokio::select! {
        record = orchestrator.run_comparison(test_config) => record?,
        _ = shutdown_signal() => {
            orchestrator.interrupt_running();
            match orchestrator.list_tests().pop() {
                Some(record) => record,
                None => return Ok(()),
            }
        }
    };

    let report = ComparisonReport::new(&record);
    if args.json {
        println!("{}", report.to_json());
    } else {
        report.print_table();
    }

    Ok(())
}

/// Run the mock echo upstream until a shutdown signal arrives
async fn mock_upstream(args: MockUpstreamArgs) -> Result<()> {
    let mut server = MockEchoServer::new(MockServerConfig {
        port: args.mock_port,
        latency_ms: args.latency_ms,
        jitter_ms: args.jitter_ms,
        error_rate: args.error_rate.clamp(0.0, 1.0),
    });
    let port = server.start().await?;
    println!("Mock echo upstream: http://127.0.0.1:{}", port);

    shutdown_signal().await;
    server.stop();

    Ok(())
}

/// Print startup banner
fn print_startup_banner(config: &Config) {
    let banner = r#"
╔═══════════════════════════════════════════════════════════╗
║                                                           ║
║                  🚀 rpc-perf - RPC vs HTTP                ║
║                                                           ║
║    Side-by-side throughput and latency comparison         ║
║                                                           ║
╚═══════════════════════════════════════════════════════════╝
"#;

    println!("{}", banner);
    println!("  Version:     {}", env!("CARGO_PKG_VERSION"));
    println!(
        "  Server:      http://{}:{}",
        config.server_host, config.server_port
    );
    println!("  Binary RPC:  {}", config.drivers.grpc_url);
    println!("  HTTP:        {}", config.drivers.http_url);
    println!("  Max sockets: {}", config.drivers.http_max_sockets);
    println!("  Cooldown:    {:?}", config.protocol_cooldown);
    println!("  Log Level:   {}", config.log_level);
    println!();
}

/// Handle graceful shutdown signal
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown...");
        },
    }
}
