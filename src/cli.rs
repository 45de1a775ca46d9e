//! Command-line interface for vibe-state.
//!
//! Uses lexopt for minimal binary size overhead.

use std::ffi::OsString;
use std::net::IpAddr;
use std::path::PathBuf;

/// Command-line arguments.
///
/// Every setting is optional so that unset flags leave environment and file
/// configuration in place.
#[derive(Debug, Clone, Default)]
pub struct Args {
    /// Host address to bind to.
    pub host: Option<IpAddr>,
    /// Port to listen on.
    pub port: Option<u16>,
    /// Path to configuration file.
    pub config: Option<PathBuf>,
    /// Log level (error, warn, info, debug, trace).
    pub log_level: Option<String>,
    /// Session idle timeout in milliseconds.
    pub session_ttl_ms: Option<u64>,
    /// Maximum number of sessions.
    pub session_cap: Option<usize>,
    /// Most recent history entries replayed per prompt.
    pub history_limit: Option<usize>,
    /// Byte ceiling for replayed history.
    pub history_bytes: Option<usize>,
    /// Show version and exit.
    pub version: bool,
    /// Show help and exit.
    pub help: bool,
}

/// Parse command-line arguments.
pub fn parse_args() -> Result<Args, ArgsError> {
    parse_args_from(std::env::args_os())
}

/// Parse arguments from an iterator (for testing).
pub fn parse_args_from<I>(args: I) -> Result<Args, ArgsError>
where
    I: IntoIterator<Item = OsString>,
{
    use lexopt::prelude::*;

    let mut result = Args::default();
    let mut parser = lexopt::Parser::from_iter(args);

    while let Some(arg) = parser.next()? {
        match arg {
            Short('h') | Long("help") => {
                result.help = true;
            }
            Short('V') | Long("version") => {
                result.version = true;
            }
            Short('H') | Long("host") => {
                result.host = Some(parse_value(&mut parser, "host")?);
            }
            Short('p') | Long("port") => {
                result.port = Some(parse_value(&mut parser, "port")?);
            }
            Short('c') | Long("config") => {
                result.config = Some(parser.value()?.parse()?);
            }
            Short('l') | Long("log-level") => {
                result.log_level = Some(parser.value()?.parse()?);
            }
            Long("session-ttl-ms") => {
                result.session_ttl_ms = Some(parse_value(&mut parser, "session-ttl-ms")?);
            }
            Long("session-cap") => {
                result.session_cap = Some(parse_value(&mut parser, "session-cap")?);
            }
            Long("history-limit") => {
                result.history_limit = Some(parse_value(&mut parser, "history-limit")?);
            }
            Long("history-bytes") => {
                result.history_bytes = Some(parse_value(&mut parser, "history-bytes")?);
            }
            Value(val) => {
                return Err(ArgsError::UnexpectedArgument(val.to_string_lossy().into()));
            }
            _ => return Err(arg.unexpected().into()),
        }
    }

    Ok(result)
}

fn parse_value<T: std::str::FromStr>(
    parser: &mut lexopt::Parser,
    name: &'static str,
) -> Result<T, ArgsError> {
    use lexopt::ValueExt;

    let value: String = parser.value()?.parse()?;
    value
        .parse()
        .map_err(|_| ArgsError::InvalidValue(name, value))
}

/// Print help message.
pub fn print_help() {
    let version = env!("CARGO_PKG_VERSION");
    println!(
        r#"vibe-state {version}
Session and context-state engine for LLM-rendered web apps

USAGE:
    vibe-state [OPTIONS]

OPTIONS:
    -H, --host <ADDR>           Host address to bind [default: 127.0.0.1]
    -p, --port <PORT>           Port to listen on [default: 3000]
    -c, --config <FILE>         Path to configuration file (JSON)
    -l, --log-level <LVL>       Log level (error, warn, info, debug, trace)
        --session-ttl-ms <MS>   Session idle timeout [default: 86400000]
        --session-cap <N>       Maximum live sessions [default: 200]
        --history-limit <N>     History entries per prompt [default: 30]
        --history-bytes <N>     History byte budget per prompt [default: 200000]
    -h, --help                  Print help
    -V, --version               Print version

ENVIRONMENT VARIABLES:
    VIBE_STATE_HOST               Host address (overrides config)
    VIBE_STATE_PORT               Port number (overrides config)
    VIBE_STATE_SESSION_TTL_MS     Session idle timeout (overrides config)
    VIBE_STATE_SESSION_CAP        Maximum live sessions (overrides config)
    VIBE_STATE_HISTORY_LIMIT      History entries per prompt (overrides config)
    VIBE_STATE_HISTORY_MAX_BYTES  History byte budget (overrides config)
    VIBE_STATE_LOG_LEVEL          Log level (overrides config)
    RUST_LOG                      Alternative log level setting

EXAMPLES:
    # Start with defaults (localhost:3000)
    vibe-state

    # Short-lived sessions for a demo
    vibe-state --session-ttl-ms 600000 --session-cap 20

    # Start with config file
    vibe-state -c /etc/vibe-state/config.json
"#
    );
}

/// Print version.
pub fn print_version() {
    println!("vibe-state {}", env!("CARGO_PKG_VERSION"));
}

/// Argument parsing errors.
#[derive(Debug)]
pub enum ArgsError {
    /// Lexopt parsing error.
    Lexopt(lexopt::Error),
    /// Invalid argument value.
    InvalidValue(&'static str, String),
    /// Unexpected positional argument.
    UnexpectedArgument(String),
}

impl std::fmt::Display for ArgsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lexopt(e) => write!(f, "{}", e),
            Self::InvalidValue(name, value) => {
                write!(f, "invalid value for --{}: '{}'", name, value)
            }
            Self::UnexpectedArgument(arg) => {
                write!(f, "unexpected argument: '{}'", arg)
            }
        }
    }
}

impl std::error::Error for ArgsError {}

impl From<lexopt::Error> for ArgsError {
    fn from(e: lexopt::Error) -> Self {
        Self::Lexopt(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(args: &[&str]) -> Vec<OsString> {
        std::iter::once("vibe-state")
            .chain(args.iter().copied())
            .map(OsString::from)
            .collect()
    }

    #[test]
    fn test_default_args() {
        let result = parse_args_from(args(&[])).unwrap();
        assert!(result.host.is_none());
        assert!(result.port.is_none());
        assert!(result.session_cap.is_none());
        assert!(!result.help);
    }

    #[test]
    fn test_host_port() {
        let result = parse_args_from(args(&["-H", "0.0.0.0", "-p", "8080"])).unwrap();
        assert_eq!(result.host.unwrap().to_string(), "0.0.0.0");
        assert_eq!(result.port, Some(8080));
    }

    #[test]
    fn test_session_and_history_options() {
        let result = parse_args_from(args(&[
            "--session-ttl-ms",
            "60000",
            "--session-cap",
            "10",
            "--history-limit",
            "5",
            "--history-bytes",
            "4096",
        ]))
        .unwrap();
        assert_eq!(result.session_ttl_ms, Some(60_000));
        assert_eq!(result.session_cap, Some(10));
        assert_eq!(result.history_limit, Some(5));
        assert_eq!(result.history_bytes, Some(4096));
    }

    #[test]
    fn test_config_file() {
        let result = parse_args_from(args(&["-c", "/etc/config.json"])).unwrap();
        assert_eq!(result.config, Some(PathBuf::from("/etc/config.json")));
    }

    #[test]
    fn test_help_and_version_flags() {
        assert!(parse_args_from(args(&["--help"])).unwrap().help);
        assert!(parse_args_from(args(&["-V"])).unwrap().version);
    }

    #[test]
    fn test_log_level() {
        let result = parse_args_from(args(&["-l", "debug"])).unwrap();
        assert_eq!(result.log_level, Some("debug".to_string()));
    }

    #[test]
    fn test_invalid_values() {
        assert!(parse_args_from(args(&["-p", "invalid"])).is_err());
        assert!(parse_args_from(args(&["-H", "not-an-ip"])).is_err());

        let err = parse_args_from(args(&["--session-cap", "-3"])).unwrap_err();
        assert!(err.to_string().contains("session-cap"));
    }

    #[test]
    fn test_unexpected_argument() {
        let err = parse_args_from(args(&["serve"])).unwrap_err();
        assert!(matches!(err, ArgsError::UnexpectedArgument(_)));
    }
}
