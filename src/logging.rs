use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

pub const SCRAPE_LOG: &str = "scraping_members.log";
pub const ADD_LOG: &str = "adding_members.log";

/// Console output plus, when given, an appended plain-text copy in `log_file`.
/// `RUST_LOG` overrides the default `info` level.
pub fn init(log_file: Option<&Path>) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file = match log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(file)
        .try_init()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mirrors_lines_into_the_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(ADD_LOG);

        init(Some(&path)).unwrap();
        tracing::info!("Switching to account: +15550001");

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("INFO"));
        assert!(text.contains("Switching to account: +15550001"));
        assert!(!text.contains("\u{1b}["));
    }
}
