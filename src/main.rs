//! vibe-state binary entry point.

use std::process::ExitCode;

use tracing::{error, info};
use vibe_state::api::{serve_with_state, AppState};
use vibe_state::cli::{self, parse_args};
use vibe_state::config::Config;
use vibe_state::logging;

#[tokio::main]
async fn main() -> ExitCode {
    let args = match parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("error: {}", e);
            eprintln!("Run with --help for usage.");
            return ExitCode::FAILURE;
        }
    };

    if args.help {
        cli::print_help();
        return ExitCode::SUCCESS;
    }
    if args.version {
        cli::print_version();
        return ExitCode::SUCCESS;
    }

    let config = match Config::load(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = logging::init_with_filter(config.log_filter()) {
        eprintln!("warning: logging already initialized: {}", e);
    }

    info!("vibe-state v{}", env!("CARGO_PKG_VERSION"));

    let server_config = match config.to_server_config() {
        Ok(server_config) => server_config,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    info!(
        ttl_ms = config.session.ttl_ms,
        capacity = config.session.capacity,
        history_limit = config.history.limit,
        history_max_bytes = config.history.max_bytes,
        "Session registry initialized"
    );

    let state = AppState::from_config(&config);
    if let Err(e) = serve_with_state(server_config, state).await {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
