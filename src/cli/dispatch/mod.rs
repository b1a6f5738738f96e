//! Maps validated CLI matches to the action to run.

use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::{auth, storage};
use anyhow::Result;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(4000);

    let auth_opts = auth::Options::parse(matches)?;
    let storage_opts = storage::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        encryption_keys: auth_opts.encryption_keys,
        admin_secret: auth_opts.admin_secret,
        google_client_id: auth_opts.google_client_id,
        google_client_secret: auth_opts.google_client_secret,
        google_jwks_url: auth_opts.google_jwks_url,
        jwks_refresh_seconds: auth_opts.jwks_refresh_seconds,
        elasticsearch_url: storage_opts.elasticsearch_url,
        elasticsearch_api_key: storage_opts.elasticsearch_api_key,
        sessions_index: storage_opts.sessions_index,
        apm_server_url: storage_opts.apm_server_url,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_action_from_env() {
        temp_env::with_vars(
            [
                ("TESSERA_PORT", Some("4443")),
                ("TESSERA_GOOGLE_CLIENT_ID", Some("client-123")),
                ("TESSERA_ENCRYPTION_KEYS", Some("a b")),
                ("TESSERA_ADMIN_SECRET", Some("s3cret")),
                ("TESSERA_ELASTICSEARCH_API_KEY", None),
            ],
            || {
                let matches = crate::cli::commands::new().get_matches_from(vec!["tessera"]);
                let action = handler(&matches);
                assert!(action.is_ok());
                if let Ok(Action::Server(args)) = action {
                    assert_eq!(args.port, 4443);
                    assert_eq!(args.google_client_id, "client-123");
                    assert_eq!(args.encryption_keys.len(), 2);
                    assert!(args.admin_secret.is_some());
                    assert!(args.elasticsearch_api_key.is_none());

                    let debug = format!("{args:?}");
                    assert!(!debug.contains("s3cret"));
                }
            },
        );
    }

    #[test]
    fn blank_client_id_fails() {
        temp_env::with_vars([("TESSERA_GOOGLE_CLIENT_ID", Some("   "))], || {
            let matches = crate::cli::commands::new().get_matches_from(vec!["tessera"]);
            let result = handler(&matches);
            assert!(result.is_err());
        });
    }
}
