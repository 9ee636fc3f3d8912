/// Image asset service entry point
use imagery::config::{LoggingConfig, ServerConfig};
use imagery::server;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    let logging = LoggingConfig::from_env();
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("imagery={},tower_http=debug", logging.level).into());
    let registry = tracing_subscriber::registry().with(filter);
    if logging.json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    // Load configuration (.env, then Secret Manager when enabled)
    let config = ServerConfig::load().await?;

    print_banner();

    server::run(config).await?;

    Ok(())
}

fn print_banner() {
    println!(
        r#"
    _
   (_)___ ___  ____ _____ ____  _______  __
  / / __ `__ \/ __ `/ __ `/ _ \/ ___/ / / /
 / / / / / / / /_/ / /_/ /  __/ /  / /_/ /
/_/_/ /_/ /_/\__,_/\__, /\___/_/   \__, /
                  /____/          /____/

        Image Asset Service v{}
        "#,
        env!("CARGO_PKG_VERSION")
    );
}
