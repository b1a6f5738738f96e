use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

use crate::auth::tokens::DEFAULT_INDEX;

pub const ARG_ELASTICSEARCH_URL: &str = "elasticsearch-url";
pub const ARG_ELASTICSEARCH_API_KEY: &str = "elasticsearch-api-key";
pub const ARG_SESSIONS_INDEX: &str = "sessions-index";
pub const ARG_APM_SERVER_URL: &str = "apm-server-url";

pub struct Options {
    pub elasticsearch_url: String,
    pub elasticsearch_api_key: Option<SecretString>,
    pub sessions_index: String,
    pub apm_server_url: String,
}

impl Options {
    /// Parse storage arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the Elasticsearch URL is empty while an API key is set.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let get_non_empty = |id: &str| {
            matches
                .get_one::<String>(id)
                .cloned()
                .filter(|v| !v.trim().is_empty())
        };

        let elasticsearch_api_key = get_non_empty(ARG_ELASTICSEARCH_API_KEY).map(SecretString::from);
        let elasticsearch_url = get_non_empty(ARG_ELASTICSEARCH_URL).unwrap_or_default();
        if elasticsearch_api_key.is_some() && elasticsearch_url.is_empty() {
            anyhow::bail!("missing required argument: --{ARG_ELASTICSEARCH_URL}");
        }

        Ok(Self {
            elasticsearch_url,
            elasticsearch_api_key,
            sessions_index: get_non_empty(ARG_SESSIONS_INDEX)
                .unwrap_or_else(|| DEFAULT_INDEX.to_string()),
            apm_server_url: get_non_empty(ARG_APM_SERVER_URL).unwrap_or_default(),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_ELASTICSEARCH_URL)
                .long(ARG_ELASTICSEARCH_URL)
                .help("Elasticsearch URL holding refresh tokens")
                .env("TESSERA_ELASTICSEARCH_URL")
                .default_value("http://localhost:9200"),
        )
        .arg(
            Arg::new(ARG_ELASTICSEARCH_API_KEY)
                .long(ARG_ELASTICSEARCH_API_KEY)
                .help("Elasticsearch API key, tokens stay in memory without it")
                .env("TESSERA_ELASTICSEARCH_API_KEY"),
        )
        .arg(
            Arg::new(ARG_SESSIONS_INDEX)
                .long(ARG_SESSIONS_INDEX)
                .help("Index storing refresh tokens")
                .env("TESSERA_SESSIONS_INDEX")
                .default_value(DEFAULT_INDEX),
        )
        .arg(
            Arg::new(ARG_APM_SERVER_URL)
                .long(ARG_APM_SERVER_URL)
                .help("APM server URL advertised to the frontend")
                .env("TESSERA_APM_SERVER_URL")
                .default_value("http://localhost:8200"),
        )
}
