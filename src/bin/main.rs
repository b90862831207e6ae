use persona_sync::cli::{self, Commands, Status};
use persona_sync::{config, telemetry};

fn main() {
    let cli = cli::parse_from(std::env::args_os());

    let config = match cli::load_config(&cli) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("config load failed: {err}");
            std::process::exit(1);
        }
    };
    let telemetry_guard = init_tracing(&cli, &config);

    let status = match cli::run(cli, config) {
        Ok(status) => status,
        Err(e) => {
            tracing::error!(effect = e.effect().as_str(), "error: {e}");
            Status::Failed
        }
    };
    // Flush the file writer before `exit` skips destructors.
    drop(telemetry_guard);
    std::process::exit(status.exit_code());
}

fn init_tracing(cli: &cli::Cli, config: &config::Config) -> telemetry::TelemetryGuard {
    let mut logging = config.logging.clone();
    if matches!(cli.command, Commands::Run) {
        telemetry::apply_pool_logging_defaults(&mut logging);
    }
    telemetry::init(telemetry::TelemetryConfig::new(cli.verbose, logging))
}
