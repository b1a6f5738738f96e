pub mod auth;
pub mod storage;

use clap::{
    builder::styling::{AnsiColor, Effects, Styles},
    Arg, ArgAction, ColorChoice, Command,
};
use tracing::Level;

pub const ARG_VERBOSITY: &str = "verbosity";

/// Indexed by the `-v` count that enables each level.
const LEVELS: [Level; 5] = [
    Level::ERROR,
    Level::WARN,
    Level::INFO,
    Level::DEBUG,
    Level::TRACE,
];

/// `TESSERA_LOG_LEVEL` holds either a `-v` count or a level name.
fn parse_verbosity(value: &str) -> Result<u8, String> {
    if let Ok(count) = value.parse::<u8>() {
        return Ok(count);
    }

    let level: Level = value
        .parse()
        .map_err(|_| format!("unknown log level '{value}'"))?;
    LEVELS
        .iter()
        .position(|candidate| *candidate == level)
        .and_then(|index| u8::try_from(index).ok())
        .ok_or_else(|| format!("unknown log level '{value}'"))
}

/// Tracing level for a verbosity count, `None` keeps the ERROR default.
#[must_use]
pub fn verbosity_level(count: u8) -> Option<Level> {
    match count {
        0 => None,
        count => Some(LEVELS[usize::from(count).min(LEVELS.len() - 1)]),
    }
}

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    let command = Command::new("tessera")
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .help("Port to listen on")
                .default_value("4000")
                .env("TESSERA_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new(ARG_VERBOSITY)
                .short('v')
                .long("verbose")
                .help("Increase log verbosity, -v WARN up to -vvvv TRACE (default: ERROR)")
                .env("TESSERA_LOG_LEVEL")
                .global(true)
                .action(ArgAction::Count)
                .value_parser(parse_verbosity),
        );

    let command = auth::with_args(command);
    storage::with_args(command)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new() {
        let command = new();

        assert_eq!(command.get_name(), "tessera");
        assert_eq!(
            command.get_about().map(ToString::to_string),
            Some(env!("CARGO_PKG_DESCRIPTION").to_string())
        );
        assert_eq!(
            command.get_version().map(ToString::to_string),
            Some(env!("CARGO_PKG_VERSION").to_string())
        );
    }

    #[test]
    fn test_client_id_required() {
        temp_env::with_vars([("TESSERA_GOOGLE_CLIENT_ID", None::<&str>)], || {
            let result = new().try_get_matches_from(vec!["tessera"]);
            assert_eq!(
                result.map_err(|e| e.kind()).err(),
                Some(clap::error::ErrorKind::MissingRequiredArgument)
            );
        });
    }

    #[test]
    fn test_check_port() {
        let matches = new().get_matches_from(vec![
            "tessera",
            "--port",
            "8080",
            "--google-client-id",
            "client-123",
        ]);

        assert_eq!(matches.get_one::<u16>("port").copied(), Some(8080));
        assert_eq!(
            matches.get_one::<String>("google-client-id").cloned(),
            Some("client-123".to_string())
        );
    }

    #[test]
    fn test_check_env() {
        temp_env::with_vars(
            [
                ("TESSERA_PORT", Some("443")),
                ("TESSERA_GOOGLE_CLIENT_ID", Some("client-123")),
                ("TESSERA_SESSIONS_INDEX", Some("sessions")),
                ("TESSERA_LOG_LEVEL", Some("info")),
            ],
            || {
                let matches = new().get_matches_from(vec!["tessera"]);
                assert_eq!(matches.get_one::<u16>("port").copied(), Some(443));
                assert_eq!(
                    matches.get_one::<String>("sessions-index").cloned(),
                    Some("sessions".to_string())
                );
                assert_eq!(
                    matches.get_one::<u8>(ARG_VERBOSITY).copied(),
                    Some(2)
                );
            },
        );
    }

    #[test]
    fn test_check_log_level_env() {
        let levels = ["error", "warn", "info", "debug", "trace"];
        for (index, &level) in levels.iter().enumerate() {
            temp_env::with_vars(
                [
                    ("TESSERA_LOG_LEVEL", Some(level)),
                    ("TESSERA_GOOGLE_CLIENT_ID", Some("client-123")),
                ],
                || {
                    let matches = new().get_matches_from(vec!["tessera"]);
                    assert_eq!(
                        matches.get_one::<u8>(ARG_VERBOSITY).copied(),
                        u8::try_from(index).ok()
                    );
                },
            );
        }
    }

    #[test]
    fn test_parse_verbosity() {
        assert_eq!(parse_verbosity("3"), Ok(3));
        assert_eq!(parse_verbosity("DEBUG"), Ok(3));
        assert_eq!(parse_verbosity("Warn"), Ok(1));
        assert!(parse_verbosity("loud").is_err());
    }

    #[test]
    fn test_verbosity_level() {
        assert_eq!(verbosity_level(0), None);
        assert_eq!(verbosity_level(1), Some(Level::WARN));
        assert_eq!(verbosity_level(2), Some(Level::INFO));
        assert_eq!(verbosity_level(3), Some(Level::DEBUG));
        assert_eq!(verbosity_level(4), Some(Level::TRACE));
        assert_eq!(verbosity_level(9), Some(Level::TRACE));
    }

    #[test]
    fn test_check_log_level_verbosity() {
        let levels = ["error", "warn", "info", "debug", "trace"];
        for (index, _) in levels.iter().enumerate() {
            temp_env::with_vars([("TESSERA_LOG_LEVEL", None::<String>)], || {
                let mut args = vec![
                    "tessera".to_string(),
                    "--google-client-id".to_string(),
                    "client-123".to_string(),
                ];

                if index > 0 {
                    args.push(format!("-{}", "v".repeat(index)));
                }

                let matches = new().get_matches_from(args);

                assert_eq!(
                    matches.get_one::<u8>(ARG_VERBOSITY).copied(),
                    u8::try_from(index).ok()
                );
            });
        }
    }
}
