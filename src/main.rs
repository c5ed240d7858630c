use clap::Parser;

use rust_route::cli::Cli;
use rust_route::config::Config;
use rust_route::driver::{self, DumpFormat};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();

    let level = if cli.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();

    let config = Config::from_file(&cli.config)?;
    log::info!("{config}");

    let dump_format = if cli.autotesting {
        DumpFormat::Json
    } else {
        DumpFormat::HumanReadable
    };

    driver::run(config, dump_format).await?;
    Ok(())
}
