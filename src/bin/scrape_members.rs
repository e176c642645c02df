use std::path::Path;

use clap::Parser;
use tracing::{error, info};

use member_relay::cli::Paths;
use member_relay::collector::{self, Limits, DEFAULT_MESSAGE_LIMIT, DEFAULT_REACTION_LIMIT};
use member_relay::logging;
use member_relay::telegram::TelegramGateway;
use member_relay::{Config, Gateway, Session};

/// Collects members of the source group with the first configured account.
#[derive(Parser, Debug)]
struct Cli {
    #[command(flatten)]
    paths: Paths,

    /// Most recent messages scanned for senders
    #[arg(long, default_value_t = DEFAULT_MESSAGE_LIMIT)]
    message_limit: usize,

    /// Most recent messages scanned for reactions
    #[arg(long, default_value_t = DEFAULT_REACTION_LIMIT)]
    reaction_limit: usize,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = logging::init(Some(Path::new(logging::SCRAPE_LOG))) {
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

    let gateway = TelegramGateway::new(config.api_id, config.api_hash.clone(), &cli.paths.sessions_dir);
    let account = &config.accounts[0];
    info!("Using session file: {}", gateway.session_path(account).display());

    let session = match gateway.open(account).await {
        Ok(session) => session,
        Err(e) => {
            error!("Error: {e}");
            return;
        }
    };

    let limits = Limits {
        messages: cli.message_limit,
        reactions: cli.reaction_limit,
    };
    collector::scrape(&session, &config.group_source, &data, limits).await;
    session.close().await;
}
