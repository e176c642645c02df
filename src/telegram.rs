//! [`Gateway`] backed by an MTProto user session.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use grammers_client::types::{Chat, Message};
use grammers_client::{Client, Config as ClientConfig, InitParams, InvocationError};
use grammers_session::{PackedChat, Session as StoredSession};
use grammers_tl_types as tl;
use tracing::{debug, error};

use crate::candidate::{Candidate, Profile};
use crate::client::{ClientError, Gateway, Post, Session};

const REACTION_PAGE: i32 = 100;

pub struct TelegramGateway {
    api_id: i32,
    api_hash: String,
    sessions_dir: PathBuf,
}

impl TelegramGateway {
    pub fn new(api_id: i32, api_hash: String, sessions_dir: impl Into<PathBuf>) -> Self {
        Self {
            api_id,
            api_hash,
            sessions_dir: sessions_dir.into(),
        }
    }

    pub fn session_path(&self, account: &str) -> PathBuf {
        self.sessions_dir.join(format!("{account}.session"))
    }
}

#[async_trait]
impl Gateway for TelegramGateway {
    type Session = TelegramSession;

    async fn open(&self, account: &str) -> Result<TelegramSession, ClientError> {
        let path = self.session_path(account);
        let stored = StoredSession::load_file_or_create(&path)
            .map_err(|e| ClientError::Other(format!("loading {}: {e}", path.display())))?;

        let client = Client::connect(ClientConfig {
            session: stored,
            api_id: self.api_id,
            api_hash: self.api_hash.clone(),
            params: InitParams {
                // Flood waits are surfaced to the jobs, never slept away here.
                flood_sleep_threshold: 0,
                ..Default::default()
            },
        })
        .await
        .map_err(|e| ClientError::Other(format!("connecting as {account}: {e}")))?;

        debug!("Connected with session {}", path.display());
        Ok(TelegramSession { client, path })
    }
}

pub struct TelegramSession {
    client: Client,
    path: PathBuf,
}

impl TelegramSession {
    /// Raw client, for the interactive login flow.
    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn save(&self) -> Result<(), ClientError> {
        self.client
            .session()
            .save_to_file(&self.path)
            .map_err(|e| ClientError::Other(format!("saving {}: {e}", self.path.display())))
    }

    async fn participants(
        &self,
        group: &PackedChat,
        filter: tl::enums::ChannelParticipantsFilter,
        limit: usize,
    ) -> Result<Vec<Profile>, ClientError> {
        let request = tl::functions::channels::GetParticipants {
            channel: input_channel(group)?,
            filter,
            offset: 0,
            limit: limit as i32,
            hash: 0,
        };

        Ok(match self.client.invoke(&request).await? {
            tl::enums::channels::ChannelParticipants::Participants(page) => {
                page.users.iter().filter_map(profile).collect()
            }
            tl::enums::channels::ChannelParticipants::NotModified => Vec::new(),
        })
    }
}

#[async_trait]
impl Session for TelegramSession {
    type Group = PackedChat;

    async fn is_authorized(&self) -> Result<bool, ClientError> {
        Ok(self.client.is_authorized().await?)
    }

    async fn resolve_group(&self, name: &str) -> Result<PackedChat, ClientError> {
        let username = public_name(name);
        match self.client.resolve_username(username).await? {
            Some(chat) => Ok(chat.pack()),
            None => Err(ClientError::Other(format!("group {name} not found"))),
        }
    }

    async fn recent_participants(
        &self,
        group: &PackedChat,
        limit: usize,
    ) -> Result<Vec<Profile>, ClientError> {
        self.participants(group, tl::enums::ChannelParticipantsFilter::ChannelParticipantsRecent, limit)
            .await
    }

    async fn search_participants(
        &self,
        group: &PackedChat,
        query: &str,
        limit: usize,
    ) -> Result<Vec<Profile>, ClientError> {
        let filter = tl::enums::ChannelParticipantsFilter::ChannelParticipantsSearch(
            tl::types::ChannelParticipantsSearch {
                q: query.to_string(),
            },
        );
        self.participants(group, filter, limit).await
    }

    fn history(&self, group: &PackedChat, limit: usize) -> BoxStream<'static, Result<Post, ClientError>> {
        let messages = self.client.iter_messages(*group).limit(limit);

        stream::try_unfold(messages, |mut messages| async move {
            let next = messages.next().await.map_err(ClientError::from)?;
            Ok::<_, ClientError>(next.map(|message| (post(&message), messages)))
        })
        .boxed()
    }

    async fn reaction_authors(
        &self,
        group: &PackedChat,
        message_id: i32,
    ) -> Result<Vec<Profile>, ClientError> {
        let request = tl::functions::messages::GetMessageReactionsList {
            peer: group.to_input_peer(),
            id: message_id,
            reaction: None,
            offset: None,
            limit: REACTION_PAGE,
        };

        let tl::enums::messages::MessageReactionsList::List(list) = self.client.invoke(&request).await?;
        Ok(list.users.iter().filter_map(profile).collect())
    }

    async fn invite(&self, group: &PackedChat, candidate: &Candidate) -> Result<(), ClientError> {
        let user = tl::enums::InputUser::User(tl::types::InputUser {
            user_id: candidate.id,
            access_hash: candidate.access_hash,
        });
        let request = tl::functions::channels::InviteToChannel {
            channel: input_channel(group)?,
            users: vec![user],
        };

        self.client.invoke(&request).await?;
        Ok(())
    }

    async fn close(self) {
        if let Err(e) = self.save() {
            error!("{e}");
        }
    }
}

impl From<InvocationError> for ClientError {
    fn from(err: InvocationError) -> Self {
        match err {
            InvocationError::Rpc(rpc) => classify(&rpc.name, rpc.value)
                .unwrap_or_else(|| ClientError::Other(rpc.to_string())),
            other => ClientError::Other(other.to_string()),
        }
    }
}

/// Maps the RPC error names the jobs branch on. `None` for everything else.
fn classify(name: &str, value: Option<u32>) -> Option<ClientError> {
    Some(match name {
        "FLOOD_WAIT" | "FLOOD_PREMIUM_WAIT" => {
            ClientError::FloodWait(Duration::from_secs(value.unwrap_or(0).into()))
        }
        "USER_PRIVACY_RESTRICTED" => ClientError::PrivacyRestricted,
        "USER_NOT_MUTUAL_CONTACT" => ClientError::NotMutualContact,
        "USER_BANNED_IN_CHANNEL" => ClientError::BannedInChannel,
        "USER_BLOCKED" | "YOU_BLOCKED_USER" => ClientError::Blocked,
        "USER_ID_INVALID" => ClientError::InvalidId,
        "PEER_FLOOD" => ClientError::PeerFlood,
        _ => return None,
    })
}

fn input_channel(group: &PackedChat) -> Result<tl::enums::InputChannel, ClientError> {
    group
        .try_to_input_channel()
        .ok_or_else(|| ClientError::Other("target is not a channel or supergroup".into()))
}

/// Accepts `name`, `@name` and `t.me/name` links.
fn public_name(name: &str) -> &str {
    let name = name.trim();
    let name = name
        .strip_prefix("https://")
        .or_else(|| name.strip_prefix("http://"))
        .unwrap_or(name);
    let name = name.strip_prefix("t.me/").unwrap_or(name);
    name.trim_start_matches('@').trim_end_matches('/')
}

fn post(message: &Message) -> Post {
    let sender = match message.sender() {
        Some(Chat::User(user)) => Some(from_raw(&user.raw)),
        _ => None,
    };
    Post {
        id: message.id(),
        sender,
    }
}

fn profile(user: &tl::enums::User) -> Option<Profile> {
    match user {
        tl::enums::User::User(user) => Some(from_raw(user)),
        tl::enums::User::Empty(_) => None,
    }
}

fn from_raw(user: &tl::types::User) -> Profile {
    Profile {
        record: Candidate {
            id: user.id,
            access_hash: user.access_hash.unwrap_or_default(),
            username: user.username.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            phone: user.phone.clone(),
            bot: user.bot,
            verified: user.verified,
            restricted: user.restricted,
            scam: user.scam,
            fake: user.fake,
            premium: user.premium,
        },
        deleted: user.deleted,
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;

    #[test]
    fn rpc_names_map_to_outcomes() {
        assert_eq!(
            classify("FLOOD_WAIT", Some(30)),
            Some(ClientError::FloodWait(Duration::from_secs(30)))
        );
        assert_eq!(classify("USER_PRIVACY_RESTRICTED", None), Some(ClientError::PrivacyRestricted));
        assert_eq!(classify("USER_NOT_MUTUAL_CONTACT", None), Some(ClientError::NotMutualContact));
        assert_eq!(classify("USER_BANNED_IN_CHANNEL", None), Some(ClientError::BannedInChannel));
        assert_eq!(classify("USER_BLOCKED", None), Some(ClientError::Blocked));
        assert_eq!(classify("USER_ID_INVALID", None), Some(ClientError::InvalidId));
        assert_eq!(classify("PEER_FLOOD", None), Some(ClientError::PeerFlood));
        assert_eq!(classify("CHAT_ADMIN_REQUIRED", None), None);
    }

    #[test]
    fn group_names_are_normalized() {
        assert_eq!(public_name("source_group"), "source_group");
        assert_eq!(public_name("@source_group"), "source_group");
        assert_eq!(public_name("https://t.me/source_group/"), "source_group");
        assert_eq!(public_name(" t.me/source_group "), "source_group");
    }

    #[test]
    fn session_files_are_named_by_account() {
        let gateway = TelegramGateway::new(1, "hash".into(), "sessions");
        assert_eq!(
            gateway.session_path("+15550001"),
            Path::new("sessions").join("+15550001.session")
        );
    }
}
