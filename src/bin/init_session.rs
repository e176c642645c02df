use std::io::Write;

use clap::Parser;
use grammers_client::SignInError;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

use member_relay::cli::Paths;
use member_relay::logging;
use member_relay::telegram::{TelegramGateway, TelegramSession};
use member_relay::{Config, Gateway, Session};

/// Logs every configured account in once and stores its session file.
#[derive(Parser, Debug)]
struct Cli {
    #[command(flatten)]
    paths: Paths,
}

async fn prompt(lines: &mut tokio::io::Lines<BufReader<tokio::io::Stdin>>, question: &str) -> anyhow::Result<String> {
    print!("{question}");
    std::io::stdout().flush()?;
    let line = lines
        .next_line()
        .await?
        .ok_or_else(|| anyhow::anyhow!("stdin closed"))?;
    Ok(line.trim().to_string())
}

async fn sign_in(
    session: &TelegramSession,
    account: &str,
    lines: &mut tokio::io::Lines<BufReader<tokio::io::Stdin>>,
) -> anyhow::Result<()> {
    if session.is_authorized().await? {
        info!("Already authorized for {account}");
        return Ok(());
    }

    info!("Sending code request to {account}");
    let token = session.client().request_login_code(account).await?;
    let code = prompt(lines, &format!("Enter the code received on {account}: ")).await?;

    match session.client().sign_in(&token, &code).await {
        Ok(_) => {
            session.save()?;
            info!("Successfully logged in with {account}");
        }
        Err(SignInError::PasswordRequired(_)) => {
            warn!("{account} has two-step verification enabled; log in with a client that supports it");
        }
        Err(e) => return Err(anyhow::anyhow!("{e}")),
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = logging::init(None) {
        eprintln!("could not set up logging: {e:#}");
    }

    let config = match Config::load(&cli.paths.config) {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            return;
        }
    };
    if let Err(e) = cli.paths.prepare() {
        error!("Error creating directories: {e:#}");
        return;
    }

    let gateway = TelegramGateway::new(config.api_id, config.api_hash.clone(), &cli.paths.sessions_dir);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    for account in &config.accounts {
        info!("Initializing session for {account}");
        let session = match gateway.open(account).await {
            Ok(session) => session,
            Err(e) => {
                error!("Error with {account}: {e}");
                continue;
            }
        };

        if let Err(e) = sign_in(&session, account, &mut lines).await {
            error!("Error with {account}: {e:#}");
        }
        session.close().await;
    }

    info!("Session initialization completed!");
}
