use std::collections::VecDeque;
use std::time::Duration;

use rand::Rng;
use tracing::{error, info, warn};

use crate::candidate::Candidate;
use crate::client::{ClientError, Gateway, Session};
use crate::config::Config;
use crate::store::{self, DataDir, ProgressRecord};

/// Pause after a flood-of-requests signal and after infrastructure failures.
pub const COOLDOWN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct Settings {
    pub group_target: String,
    pub members_to_add: usize,
    pub min_delay: u64,
    pub max_delay: u64,
    pub daily_cap: u32,
}

impl From<&Config> for Settings {
    fn from(config: &Config) -> Self {
        Self {
            group_target: config.group_target.clone(),
            members_to_add: config.members_to_add,
            min_delay: config.min_delay,
            max_delay: config.max_delay,
            daily_cap: config.max_adds_per_day_per_account,
        }
    }
}

/// Round-robin account pointer plus per-account add counters for this run.
#[derive(Debug, Clone)]
pub struct Rotation {
    accounts: Vec<String>,
    current: usize,
    added: Vec<u32>,
}

impl Rotation {
    pub fn new(accounts: Vec<String>) -> Self {
        let added = vec![0; accounts.len()];
        Self {
            accounts,
            current: 0,
            added,
        }
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    pub fn index(&self) -> usize {
        self.current
    }

    pub fn current(&self) -> &str {
        &self.accounts[self.current]
    }

    pub fn advance(&mut self) -> &str {
        self.current = (self.current + 1) % self.accounts.len();
        info!("Switching to account: {}", self.current());
        self.current()
    }

    pub fn record_add(&mut self) {
        self.added[self.current] += 1;
    }

    pub fn added_by_current(&self) -> u32 {
        self.added[self.current]
    }

    pub fn quota_reached(&self, cap: u32) -> bool {
        self.added_by_current() >= cap
    }

    pub fn daily_stats(&self) -> serde_json::Map<String, serde_json::Value> {
        self.accounts
            .iter()
            .zip(&self.added)
            .map(|(account, count)| (account.clone(), (*count).into()))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finish {
    TargetReached,
    CandidatesExhausted,
    NoUsableAccount,
}

#[derive(Debug)]
pub struct Report {
    pub added: Vec<Candidate>,
    pub finish: Finish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Added,
    Dropped,
    Rotated,
}

pub fn pick_delay<R: Rng>(rng: &mut R, min: u64, max: u64) -> Duration {
    Duration::from_secs(rng.random_range(min..=max))
}

/// Reads the collector output, treating a missing or unreadable file as empty.
pub fn load_candidates(data: &DataDir, group_source: &str) -> Vec<Candidate> {
    match data.load_members(group_source) {
        Ok(members) => members,
        Err(e) => {
            error!("Error loading members: {e:#}");
            Vec::new()
        }
    }
}

pub struct Dispatcher<G: Gateway> {
    gateway: G,
    settings: Settings,
    rotation: Rotation,
    data: DataDir,
    added: Vec<Candidate>,
}

impl<G: Gateway> Dispatcher<G> {
    pub fn new(gateway: G, settings: Settings, accounts: Vec<String>, data: DataDir) -> Self {
        Self {
            gateway,
            settings,
            rotation: Rotation::new(accounts),
            data,
            added: Vec::new(),
        }
    }

    pub async fn run(mut self, candidates: Vec<Candidate>) -> Report {
        let mut queue = VecDeque::from(candidates);
        info!("Starting member addition process with {} members", queue.len());

        // Accounts passed over in a row without reaching the dispatch loop.
        let mut skipped = 0;

        let finish = loop {
            if self.added.len() >= self.settings.members_to_add {
                break Finish::TargetReached;
            }
            if queue.is_empty() {
                break Finish::CandidatesExhausted;
            }
            if self.rotation.is_empty() || skipped >= self.rotation.len() {
                error!("No usable account left: every account is unauthorized or at its daily limit");
                break Finish::NoUsableAccount;
            }

            let account = self.rotation.current().to_string();
            let session = match self.gateway.open(&account).await {
                Ok(session) => session,
                Err(e) => {
                    error!("Error in main loop: {e}");
                    tokio::time::sleep(COOLDOWN).await;
                    continue;
                }
            };

            match session.is_authorized().await {
                Ok(true) => {}
                Ok(false) => {
                    error!("Session not authorized for {account}. Please run init_session first");
                    session.close().await;
                    self.rotation.advance();
                    skipped += 1;
                    continue;
                }
                Err(e) => {
                    error!("Error in main loop: {e}");
                    session.close().await;
                    tokio::time::sleep(COOLDOWN).await;
                    continue;
                }
            }

            if self.rotation.quota_reached(self.settings.daily_cap) {
                warn!("Daily limit reached for {account}");
                session.close().await;
                self.rotation.advance();
                skipped += 1;
                continue;
            }

            let group = match session.resolve_group(&self.settings.group_target).await {
                Ok(group) => group,
                Err(e) => {
                    error!("Error in main loop: {e}");
                    session.close().await;
                    tokio::time::sleep(COOLDOWN).await;
                    continue;
                }
            };

            skipped = 0;
            self.drain(&session, &group, &mut queue).await;
            session.close().await;
        };

        self.checkpoint();
        match finish {
            Finish::TargetReached => info!("Target of {} members reached", self.settings.members_to_add),
            Finish::CandidatesExhausted => info!("No candidates left"),
            Finish::NoUsableAccount => {}
        }
        info!("Addition process completed. Added {} members", self.added.len());

        Report {
            added: self.added,
            finish,
        }
    }

    /// Works through the queue with one account until the target, the queue or
    /// the account's quota runs out, or the account has to be rotated away.
    async fn drain(
        &mut self,
        session: &G::Session,
        group: &<G::Session as Session>::Group,
        queue: &mut VecDeque<Candidate>,
    ) {
        while self.added.len() < self.settings.members_to_add {
            let Some(candidate) = queue.pop_front() else {
                return;
            };

            match self.add_one(session, group, &candidate).await {
                Outcome::Added => {
                    self.added.push(candidate);
                    self.rotation.record_add();
                    self.checkpoint();
                }
                Outcome::Dropped => {}
                Outcome::Rotated => return,
            }

            if self.rotation.quota_reached(self.settings.daily_cap) {
                return;
            }
        }
    }

    async fn add_one(
        &mut self,
        session: &G::Session,
        group: &<G::Session as Session>::Group,
        candidate: &Candidate,
    ) -> Outcome {
        let label = candidate.label();

        match session.invite(group, candidate).await {
            Ok(()) => {
                let delay = pick_delay(
                    &mut rand::rng(),
                    self.settings.min_delay,
                    self.settings.max_delay,
                );
                info!("Successfully added user {label}. Waiting {} seconds...", delay.as_secs());
                tokio::time::sleep(delay).await;
                Outcome::Added
            }
            Err(ClientError::FloodWait(wait)) => {
                warn!("Hit flood limit, waiting {} seconds", wait.as_secs());
                tokio::time::sleep(wait).await;
                Outcome::Dropped
            }
            Err(ClientError::PrivacyRestricted) => {
                warn!("User {label} has privacy restrictions");
                Outcome::Dropped
            }
            Err(ClientError::NotMutualContact) => {
                warn!("User {label} is not a mutual contact");
                Outcome::Dropped
            }
            Err(ClientError::BannedInChannel) => {
                warn!("User {label} is banned in the channel");
                Outcome::Dropped
            }
            Err(ClientError::Blocked) => {
                warn!("User {label} has blocked this account");
                Outcome::Dropped
            }
            Err(ClientError::InvalidId) => {
                warn!("User {label} has an invalid id");
                Outcome::Dropped
            }
            Err(ClientError::PeerFlood) => {
                warn!("Too many requests, switching account");
                self.rotation.advance();
                tokio::time::sleep(COOLDOWN).await;
                Outcome::Rotated
            }
            Err(ClientError::Other(message)) => {
                error!("Unexpected error adding user {label}: {message}");
                Outcome::Dropped
            }
        }
    }

    fn checkpoint(&self) {
        let progress = ProgressRecord {
            timestamp: store::timestamp(),
            added_members: self.added.clone(),
            daily_stats: self.rotation.daily_stats(),
        };
        if let Err(e) = self.data.save_progress(&progress) {
            error!("Error saving progress: {e:#}");
        }
    }
}
