//! Boundary between the jobs and the messaging platform.
//!
//! The collector and dispatcher only talk to [`Gateway`] and [`Session`]. The
//! platform library's errors are folded into [`ClientError`] by the
//! implementation in [`crate::telegram`].

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

use crate::candidate::{Candidate, Profile};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error("rate limited, retry after {}s", .0.as_secs())]
    FloodWait(Duration),

    #[error("user privacy settings forbid the invite")]
    PrivacyRestricted,

    #[error("user is not a mutual contact")]
    NotMutualContact,

    #[error("user is banned in the channel")]
    BannedInChannel,

    #[error("user has blocked this account")]
    Blocked,

    #[error("user id is invalid")]
    InvalidId,

    #[error("too many requests from this account")]
    PeerFlood,

    #[error("{0}")]
    Other(String),
}

/// One message of a group's history, reduced to what the collector needs.
#[derive(Debug, Clone)]
pub struct Post {
    pub id: i32,
    pub sender: Option<Profile>,
}

/// Opens per-account sessions.
#[async_trait]
pub trait Gateway: Send + Sync {
    type Session: Session;

    async fn open(&self, account: &str) -> Result<Self::Session, ClientError>;
}

/// An open connection on behalf of one account.
#[async_trait]
pub trait Session: Send + Sync {
    type Group: Send + Sync;

    async fn is_authorized(&self) -> Result<bool, ClientError>;

    async fn resolve_group(&self, name: &str) -> Result<Self::Group, ClientError>;

    async fn recent_participants(
        &self,
        group: &Self::Group,
        limit: usize,
    ) -> Result<Vec<Profile>, ClientError>;

    async fn search_participants(
        &self,
        group: &Self::Group,
        query: &str,
        limit: usize,
    ) -> Result<Vec<Profile>, ClientError>;

    /// Newest-first history, at most `limit` messages.
    fn history(&self, group: &Self::Group, limit: usize) -> BoxStream<'static, Result<Post, ClientError>>;

    async fn reaction_authors(
        &self,
        group: &Self::Group,
        message_id: i32,
    ) -> Result<Vec<Profile>, ClientError>;

    async fn invite(&self, group: &Self::Group, candidate: &Candidate) -> Result<(), ClientError>;

    /// Persists session state and drops the connection.
    async fn close(self);
}
