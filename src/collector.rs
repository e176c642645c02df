use std::time::Duration;

use futures::StreamExt;
use tracing::{error, info, warn};

use crate::candidate::{CandidateSet, Profile, ScrapeStats};
use crate::client::{ClientError, Session};
use crate::store::{self, DataDir};

pub const PARTICIPANT_PAGE: usize = 200;
pub const DEFAULT_MESSAGE_LIMIT: usize = 3000;
pub const DEFAULT_REACTION_LIMIT: usize = 100;
const SEARCH_PAUSE: Duration = Duration::from_secs(2);

pub const SEARCH_PATTERNS: &[&str] = &[
    "a", "e", "i", "o", "u",
    "al", "an", "be", "ch", "de", "el", "jo", "ka", "ma", "mi", "mo", "ra", "sa", "sh", "st",
    "th", "wi",
    "1", "2", "3", "4", "5", "6", "7", "8", "9", "0",
];

#[derive(Debug, Clone, Copy)]
pub struct Limits {
    pub messages: usize,
    pub reactions: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            messages: DEFAULT_MESSAGE_LIMIT,
            reactions: DEFAULT_REACTION_LIMIT,
        }
    }
}

/// Gathers candidates from one source group through four best-effort passes.
pub struct Collector<'a, S: Session> {
    session: &'a S,
    group: &'a S::Group,
    limits: Limits,
    members: CandidateSet,
}

impl<'a, S: Session> Collector<'a, S> {
    pub fn new(session: &'a S, group: &'a S::Group, limits: Limits) -> Self {
        Self {
            session,
            group,
            limits,
            members: CandidateSet::new(),
        }
    }

    pub async fn collect(mut self) -> CandidateSet {
        self.from_recent().await;
        self.from_messages().await;
        self.from_reactions().await;
        self.from_search().await;
        self.members
    }

    fn admit(&mut self, profiles: Vec<Profile>) -> usize {
        self.members.extend(
            profiles
                .into_iter()
                .filter(|p| !p.deleted)
                .map(|p| p.record),
        )
    }

    async fn from_recent(&mut self) {
        info!("Getting recent members...");
        match self.session.recent_participants(self.group, PARTICIPANT_PAGE).await {
            Ok(profiles) => {
                info!("Found {} recent members", profiles.len());
                self.admit(profiles);
            }
            Err(e) => error!("Error getting recent members: {e}"),
        }
    }

    async fn from_messages(&mut self) {
        info!("Getting members from recent messages...");
        let mut history = self.session.history(self.group, self.limits.messages);

        while let Some(post) = history.next().await {
            match post {
                Ok(post) => {
                    if let Some(sender) = post.sender {
                        self.admit(vec![sender]);
                    }
                }
                Err(e) => {
                    error!("Error getting members from messages: {e}");
                    break;
                }
            }
        }
        info!("Found {} members from messages", self.members.len());
    }

    async fn from_reactions(&mut self) {
        info!("Getting members from reactions...");
        let mut history = self.session.history(self.group, self.limits.reactions);
        let mut message_ids = Vec::new();

        while let Some(post) = history.next().await {
            match post {
                Ok(post) => message_ids.push(post.id),
                Err(e) => {
                    error!("Error getting members from reactions: {e}");
                    return;
                }
            }
        }

        for id in message_ids {
            // Reactions can be disabled or hidden on individual messages.
            let Ok(reactors) = self.session.reaction_authors(self.group, id).await else {
                continue;
            };
            self.members
                .extend(reactors.into_iter().map(|p| p.record));
        }
        info!("Found {} members after reactions", self.members.len());
    }

    async fn from_search(&mut self) {
        for pattern in SEARCH_PATTERNS {
            info!("Searching with pattern: {pattern}");
            match self
                .session
                .search_participants(self.group, pattern, PARTICIPANT_PAGE)
                .await
            {
                Ok(profiles) => {
                    info!("Found {} members with pattern '{pattern}'", profiles.len());
                    self.admit(profiles);
                    tokio::time::sleep(SEARCH_PAUSE).await;
                }
                Err(ClientError::FloodWait(wait)) => {
                    warn!("Hit flood limit, waiting {} seconds", wait.as_secs());
                    tokio::time::sleep(wait).await;
                }
                Err(e) => error!("Error searching with pattern '{pattern}': {e}"),
            }
        }
    }
}

/// Full collector job for one authorized session. Returns whether a candidate
/// file was written.
pub async fn scrape<S: Session>(session: &S, group_source: &str, data: &DataDir, limits: Limits) -> bool {
    match session.is_authorized().await {
        Ok(true) => {}
        Ok(false) => {
            error!("Session not authorized. Please run init_session first");
            return false;
        }
        Err(e) => {
            error!("Error: {e}");
            return false;
        }
    }

    let group = match session.resolve_group(group_source).await {
        Ok(group) => {
            info!("Successfully found group: {group_source}");
            group
        }
        Err(e) => {
            error!("Error resolving group {group_source}: {e}");
            return false;
        }
    };

    let members = Collector::new(session, &group, limits).collect().await;
    match persist(data, group_source, members) {
        Ok(saved) => saved,
        Err(e) => {
            error!("Error saving members: {e:#}");
            false
        }
    }
}

/// Writes the candidate file and the stats summary. Nothing is written for an
/// empty set.
pub fn persist(data: &DataDir, group_source: &str, members: CandidateSet) -> anyhow::Result<bool> {
    if members.is_empty() {
        error!("No members found!");
        return Ok(false);
    }

    let records = members.into_records();
    let path = data.save_members(group_source, &records)?;
    info!(
        "Successfully saved {} unique members to {}",
        records.len(),
        path.display()
    );

    data.save_stats(&ScrapeStats::summarize(&records, store::timestamp()))?;
    info!("Saved scraping statistics");
    Ok(true)
}

#[cfg(test)]
mod fake {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use futures::stream::{self, BoxStream, StreamExt};

    use crate::candidate::{Candidate, Profile};
    use crate::client::{ClientError, Post, Session};

    /// In-memory group for exercising the collection passes.
    #[derive(Default)]
    pub struct FakeGroup {
        pub unauthorized: bool,
        pub recent: Option<Vec<Profile>>,
        pub posts: Vec<Post>,
        pub history_fails_after: Option<usize>,
        pub reactions: HashMap<i32, Result<Vec<Profile>, ClientError>>,
        pub searches: HashMap<&'static str, Result<Vec<Profile>, ClientError>>,
        pub search_log: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Session for FakeGroup {
        type Group = ();

        async fn is_authorized(&self) -> Result<bool, ClientError> {
            Ok(!self.unauthorized)
        }

        async fn resolve_group(&self, _name: &str) -> Result<(), ClientError> {
            Ok(())
        }

        async fn recent_participants(&self, _: &(), limit: usize) -> Result<Vec<Profile>, ClientError> {
            match &self.recent {
                Some(profiles) => Ok(profiles.iter().take(limit).cloned().collect()),
                None => Err(ClientError::Other("CHAT_ADMIN_REQUIRED".into())),
            }
        }

        async fn search_participants(
            &self,
            _: &(),
            query: &str,
            _limit: usize,
        ) -> Result<Vec<Profile>, ClientError> {
            self.search_log.lock().unwrap().push(query.to_string());
            self.searches
                .get(query)
                .cloned()
                .unwrap_or_else(|| Ok(Vec::new()))
        }

        fn history(&self, _: &(), limit: usize) -> BoxStream<'static, Result<Post, ClientError>> {
            let mut items: Vec<Result<Post, ClientError>> =
                self.posts.iter().take(limit).cloned().map(Ok).collect();
            if let Some(n) = self.history_fails_after {
                items.truncate(n);
                items.push(Err(ClientError::Other("connection reset".into())));
            }
            stream::iter(items).boxed()
        }

        async fn reaction_authors(&self, _: &(), message_id: i32) -> Result<Vec<Profile>, ClientError> {
            self.reactions
                .get(&message_id)
                .cloned()
                .unwrap_or_else(|| Ok(Vec::new()))
        }

        async fn invite(&self, _: &(), _candidate: &Candidate) -> Result<(), ClientError> {
            Ok(())
        }

        async fn close(self) {}
    }

    pub fn person(record: Candidate) -> Profile {
        Profile { record, deleted: false }
    }

    pub fn post(id: i32, sender: Option<Profile>) -> Post {
        Post { id, sender }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::*;
    use super::*;
    use crate::candidate::user;
    use crate::candidate::Profile;

    fn bot(id: i64) -> Profile {
        let mut record = user(id, "some_bot");
        record.bot = true;
        person(record)
    }

    fn deleted(id: i64) -> Profile {
        Profile { record: user(id, ""), deleted: true }
    }

    #[tokio::test(start_paused = true)]
    async fn passes_merge_in_order_and_skip_bots_and_deleted() {
        let mut group = FakeGroup {
            recent: Some(vec![person(user(1, "alice")), bot(90), deleted(91)]),
            posts: vec![
                post(300, Some(person(user(2, "bob")))),
                post(299, Some(person(user(1, "alice_renamed")))),
                post(298, None),
                post(297, Some(bot(92))),
            ],
            ..Default::default()
        };
        group.reactions.insert(300, Ok(vec![person(user(3, "carol")), bot(93)]));
        group.searches.insert("a", Ok(vec![person(user(4, "dave")), person(user(2, "bob"))]));

        let members = Collector::new(&group, &(), Limits::default()).collect().await;

        let ids: Vec<i64> = members.records().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
        assert_eq!(members.records()[0].username.as_deref(), Some("alice"));
        assert!(members.records().iter().all(|r| !r.bot));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_passes_do_not_abort_the_run() {
        let mut group = FakeGroup {
            recent: None,
            posts: vec![
                post(10, Some(person(user(1, "a")))),
                post(9, Some(person(user(2, "b")))),
                post(8, Some(person(user(3, "c")))),
            ],
            history_fails_after: Some(1),
            ..Default::default()
        };
        group.searches.insert("e", Err(ClientError::Other("internal".into())));
        group.searches.insert("i", Ok(vec![person(user(5, "e"))]));

        let members = Collector::new(&group, &(), Limits::default()).collect().await;

        let ids: Vec<i64> = members.records().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 5]);
    }

    #[tokio::test(start_paused = true)]
    async fn reaction_failure_on_one_message_moves_to_the_next() {
        let mut group = FakeGroup {
            recent: Some(Vec::new()),
            posts: vec![post(3, None), post(2, None), post(1, None)],
            ..Default::default()
        };
        group.reactions.insert(3, Err(ClientError::Other("REACTION_INVALID".into())));
        group.reactions.insert(2, Ok(vec![person(user(20, "x"))]));
        group.reactions.insert(1, Ok(vec![person(user(21, "y"))]));

        let members = Collector::new(&group, &(), Limits::default()).collect().await;

        assert!(members.contains(20));
        assert!(members.contains(21));
    }

    #[tokio::test(start_paused = true)]
    async fn message_and_reaction_caps_are_respected() {
        let group = FakeGroup {
            recent: Some(Vec::new()),
            posts: (0..10).map(|i| post(i, Some(person(user(i as i64 + 100, ""))))).collect(),
            ..Default::default()
        };
        let limits = Limits { messages: 4, reactions: 2 };

        let members = Collector::new(&group, &(), limits).collect().await;

        assert_eq!(members.len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn search_sleeps_between_patterns_and_on_flood_wait() {
        let mut group = FakeGroup {
            recent: Some(Vec::new()),
            ..Default::default()
        };
        group.searches.insert("al", Err(ClientError::FloodWait(Duration::from_secs(30))));

        let started = tokio::time::Instant::now();
        Collector::new(&group, &(), Limits::default()).collect().await;
        let elapsed = started.elapsed();

        let searched = group.search_log.lock().unwrap().clone();
        assert_eq!(searched, SEARCH_PATTERNS.iter().map(|p| p.to_string()).collect::<Vec<_>>());
        let pauses = (SEARCH_PATTERNS.len() as u64 - 1) * 2;
        assert_eq!(elapsed, Duration::from_secs(pauses + 30));
    }

    #[tokio::test(start_paused = true)]
    async fn scrape_writes_deduplicated_members_file() {
        let dir = tempfile::tempdir().unwrap();
        let data = DataDir::new(dir.path());
        let mut group = FakeGroup {
            recent: Some(vec![person(user(1, "alice")), person(user(2, "bob"))]),
            posts: vec![post(5, Some(person(user(1, "alice_again"))))],
            ..Default::default()
        };
        group.searches.insert("o", Ok(vec![person(user(3, "olga")), bot(4)]));

        assert!(scrape(&group, "src", &data, Limits::default()).await);

        let saved = data.load_members("src").unwrap();
        let ids: Vec<i64> = saved.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(saved[0].username.as_deref(), Some("alice"));
        assert!(data.stats_path().exists());
    }

    #[tokio::test]
    async fn unauthorized_session_scrapes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let data = DataDir::new(dir.path());
        let group = FakeGroup {
            unauthorized: true,
            recent: Some(vec![person(user(1, "alice"))]),
            ..Default::default()
        };

        assert!(!scrape(&group, "src", &data, Limits::default()).await);
        assert!(!data.members_path("src").exists());
    }

    #[test]
    fn empty_set_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let data = DataDir::new(dir.path());

        assert!(!persist(&data, "src", CandidateSet::new()).unwrap());
        assert!(!data.members_path("src").exists());
        assert!(!data.stats_path().exists());
    }

    #[test]
    fn persist_writes_members_and_stats() {
        let dir = tempfile::tempdir().unwrap();
        let data = DataDir::new(dir.path());
        let mut members = CandidateSet::new();
        members.extend([user(1, "alice"), user(2, ""), user(1, "dup")]);

        assert!(persist(&data, "src", members).unwrap());

        let saved = data.load_members("src").unwrap();
        assert_eq!(saved.len(), 2);
        let stats: ScrapeStats =
            serde_json::from_str(&std::fs::read_to_string(data.stats_path()).unwrap()).unwrap();
        assert_eq!(stats.total_members, 2);
        assert_eq!(stats.with_username, 1);
    }
}
