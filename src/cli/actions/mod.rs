pub mod server;

/// What the parsed command line asked for.
#[derive(Debug)]
pub enum Action {
    /// Serve the HTTP API until the process is stopped.
    Server(server::Args),
}

impl Action {
    /// # Errors
    ///
    /// Returns an error if the action fails.
    pub async fn execute(self) -> anyhow::Result<()> {
        match self {
            Self::Server(args) => server::execute(args).await,
        }
    }
}
