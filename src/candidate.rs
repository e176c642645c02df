use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Snapshot of one scraped user, keyed by `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: i64,
    pub access_hash: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    #[serde(default)]
    pub bot: bool,
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub restricted: bool,
    #[serde(default)]
    pub scam: bool,
    #[serde(default)]
    pub fake: bool,
    #[serde(default)]
    pub premium: bool,
}

impl Candidate {
    /// Username when present, numeric id otherwise. Used in log lines.
    pub fn label(&self) -> String {
        match self.username.as_deref() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => self.id.to_string(),
        }
    }
}

/// A user as the platform reported it, before it becomes a candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub record: Candidate,
    pub deleted: bool,
}

/// Insertion-ordered, id-deduplicated collection of candidates.
///
/// The first record seen for an id wins; later sightings are ignored. Bots are
/// never admitted.
#[derive(Debug, Default)]
pub struct CandidateSet {
    seen: HashSet<i64>,
    records: Vec<Candidate>,
}

impl CandidateSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` when the record was new.
    pub fn insert(&mut self, record: Candidate) -> bool {
        if record.bot || !self.seen.insert(record.id) {
            return false;
        }
        self.records.push(record);
        true
    }

    /// Merges a batch, returning how many ids were new.
    pub fn extend<I: IntoIterator<Item = Candidate>>(&mut self, records: I) -> usize {
        records
            .into_iter()
            .map(|record| self.insert(record))
            .filter(|new| *new)
            .count()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, id: i64) -> bool {
        self.seen.contains(&id)
    }

    pub fn records(&self) -> &[Candidate] {
        &self.records
    }

    pub fn into_records(self) -> Vec<Candidate> {
        self.records
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapeStats {
    pub total_members: usize,
    pub with_username: usize,
    pub with_phone: usize,
    pub premium_users: usize,
    pub verified_users: usize,
    pub timestamp: String,
}

impl ScrapeStats {
    pub fn summarize(records: &[Candidate], timestamp: String) -> Self {
        let present = |value: &Option<String>| value.as_deref().is_some_and(|v| !v.is_empty());

        Self {
            total_members: records.len(),
            with_username: records.iter().filter(|r| present(&r.username)).count(),
            with_phone: records.iter().filter(|r| present(&r.phone)).count(),
            premium_users: records.iter().filter(|r| r.premium).count(),
            verified_users: records.iter().filter(|r| r.verified).count(),
            timestamp,
        }
    }
}

#[cfg(test)]
pub(crate) fn user(id: i64, username: &str) -> Candidate {
    Candidate {
        id,
        access_hash: id * 1000,
        username: (!username.is_empty()).then(|| username.to_string()),
        first_name: Some(format!("First{id}")),
        last_name: None,
        phone: None,
        bot: false,
        verified: false,
        restricted: false,
        scam: false,
        fake: false,
        premium: false,
    }
}
