use clap::Parser;
use meltseg::cli::{self, Cli};
use meltseg::{AppError, Settings};
use tracing::Level;

fn init_logging(level: Level) {
    tracing_subscriber::fmt().with_max_level(level).init();
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;
    init_logging(settings.log_level());

    cli::run(cli, settings).await
}
