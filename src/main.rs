use std::process::ExitCode;

use amspy::cli::Command;
use amspy::seeds::{Driver, RunConfig};
use anyhow::Context as _;
use clap::Parser as _;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    amspy::logging::init().context("init logging")?;

    let cli = amspy::cli::Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    match cli.command {
        Command::Book(args) => {
            let config = RunConfig::for_books(Driver::Book, &args).context("configure book crawl")?;
            amspy::crawl::run(config).await.context("book")?;
        }
        Command::Top100(args) => {
            let config = RunConfig::for_top100(&args).context("configure top100 crawl")?;
            amspy::crawl::run(config).await.context("top100")?;
        }
        Command::AlsoBought(args) => {
            let config = RunConfig::for_books(Driver::AlsoBought, &args)
                .context("configure also-bought crawl")?;
            amspy::crawl::run(config).await.context("also-bought")?;
        }
        Command::RankComp(args) => {
            amspy::rank_comp::run(args).context("rank-comp")?;
        }
    }

    Ok(())
}
