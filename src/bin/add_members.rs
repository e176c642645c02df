use std::path::Path;

use clap::Parser;
use tracing::{error, info};

use member_relay::cli::Paths;
use member_relay::dispatcher::{self, Dispatcher, Settings};
use member_relay::logging;
use member_relay::telegram::TelegramGateway;
use member_relay::Config;

/// Invites previously scraped members into the target group, rotating accounts.
#[derive(Parser, Debug)]
struct Cli {
    #[command(flatten)]
    paths: Paths,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = logging::init(Some(Path::new(logging::ADD_LOG))) {
        eprintln!("could not set up logging: {e:#}");
    }

    let config = match Config::load(&cli.paths.config) {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            return;
        }
    };

    let data = match cli.paths.prepare() {
        Ok(data) => data,
        Err(e) => {
            error!("Error creating directories: {e:#}");
            return;
        }
    };

    let members = dispatcher::load_candidates(&data, &config.group_source);
    if members.is_empty() {
        error!("No members found to add!");
        return;
    }

    let gateway = TelegramGateway::new(config.api_id, config.api_hash.clone(), &cli.paths.sessions_dir);
    let report = Dispatcher::new(gateway, Settings::from(&config), config.accounts.clone(), data)
        .run(members)
        .await;

    info!("Run finished ({:?})", report.finish);
}
