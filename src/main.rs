use tracing::error;
use tracing_subscriber::EnvFilter;
use url_relay::Config;

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env is optional, real environment variables win
    _ = dotenvy::dotenv();
    init_tracing();

    // Load configuration from CLI, environment and/or config file
    let config = Config::load()?;
    url_relay::run(config)
        .await
        .inspect_err(|error| error!(%error, "Server stopped"))
}
