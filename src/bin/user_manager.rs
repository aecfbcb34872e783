use anyhow::Result;
use clap::Parser;
use linkdata_formatter::user_cli::{handle_user_command, UserCli};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = UserCli::parse();
    handle_user_command(cli).await
}
