use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

use crate::auth::jwks::GOOGLE_JWKS_URL;

pub const ARG_ENCRYPTION_KEYS: &str = "encryption-keys";
pub const ARG_ADMIN_SECRET: &str = "admin-secret";
pub const ARG_GOOGLE_CLIENT_ID: &str = "google-client-id";
pub const ARG_GOOGLE_CLIENT_SECRET: &str = "google-client-secret";
pub const ARG_GOOGLE_JWKS_URL: &str = "google-jwks-url";
pub const ARG_JWKS_REFRESH_SECONDS: &str = "jwks-refresh-seconds";

pub struct Options {
    pub encryption_keys: Vec<SecretString>,
    pub admin_secret: Option<SecretString>,
    pub google_client_id: String,
    pub google_client_secret: SecretString,
    pub google_jwks_url: String,
    pub jwks_refresh_seconds: u64,
}

impl Options {
    /// Parse session and Google arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the client id is missing or empty.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let google_client_id = match matches.get_one::<String>(ARG_GOOGLE_CLIENT_ID).cloned() {
            Some(value) if !value.trim().is_empty() => value,
            _ => anyhow::bail!("missing required argument: --{ARG_GOOGLE_CLIENT_ID}"),
        };

        // clap passes empty env values through
        let get_non_empty = |id: &str| {
            matches
                .get_one::<String>(id)
                .cloned()
                .filter(|v| !v.trim().is_empty())
        };

        let encryption_keys = get_non_empty(ARG_ENCRYPTION_KEYS)
            .map(|keys| {
                keys.split_whitespace()
                    .map(|key| SecretString::from(key.to_string()))
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            encryption_keys,
            admin_secret: get_non_empty(ARG_ADMIN_SECRET).map(SecretString::from),
            google_client_id,
            google_client_secret: SecretString::from(
                get_non_empty(ARG_GOOGLE_CLIENT_SECRET).unwrap_or_default(),
            ),
            google_jwks_url: get_non_empty(ARG_GOOGLE_JWKS_URL)
                .unwrap_or_else(|| GOOGLE_JWKS_URL.to_string()),
            jwks_refresh_seconds: matches
                .get_one::<u64>(ARG_JWKS_REFRESH_SECONDS)
                .copied()
                .unwrap_or(3600),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    let command = with_session_args(command);
    with_google_args(command)
}

fn with_session_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_ENCRYPTION_KEYS)
                .long(ARG_ENCRYPTION_KEYS)
                .help("Whitespace separated base64 cookie keys, the first one encrypts")
                .long_help(
                    "Whitespace separated base64 cookie keys of 32 or 64 bytes each.\n\nThe first key seals new cookies, every key is tried when opening one, so keys can be rotated by prepending a new one. Without keys cookies are stored in clear text.",
                )
                .env("TESSERA_ENCRYPTION_KEYS"),
        )
        .arg(
            Arg::new(ARG_ADMIN_SECRET)
                .long(ARG_ADMIN_SECRET)
                .help("Basic-Auth password for /api/admin")
                .env("TESSERA_ADMIN_SECRET"),
        )
}

fn with_google_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_GOOGLE_CLIENT_ID)
                .long(ARG_GOOGLE_CLIENT_ID)
                .help("Google OAuth client id, also the expected ID token audience")
                .env("TESSERA_GOOGLE_CLIENT_ID")
                .required(true),
        )
        .arg(
            Arg::new(ARG_GOOGLE_CLIENT_SECRET)
                .long(ARG_GOOGLE_CLIENT_SECRET)
                .help("Google OAuth client secret")
                .env("TESSERA_GOOGLE_CLIENT_SECRET"),
        )
        .arg(
            Arg::new(ARG_GOOGLE_JWKS_URL)
                .long(ARG_GOOGLE_JWKS_URL)
                .help("JWKS endpoint used to verify ID tokens")
                .env("TESSERA_GOOGLE_JWKS_URL")
                .default_value(GOOGLE_JWKS_URL),
        )
        .arg(
            Arg::new(ARG_JWKS_REFRESH_SECONDS)
                .long(ARG_JWKS_REFRESH_SECONDS)
                .help("Interval between JWKS refreshes in seconds")
                .env("TESSERA_JWKS_REFRESH_SECONDS")
                .default_value("3600")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
}
