//! Handler types, dependencies and update helpers

use std::sync::Arc;

use teloxide::dispatching::dialogue::{Dialogue, InMemStorage};
use teloxide::prelude::*;
use teloxide::types::{MediaKind, MessageKind};

use clancore::core::validation::{handle_for, Attachment};
use clancore::core::RateLimiter;
use clancore::{AdminService, Applicant, Config, RegistrationEvent, RegistrationFlow, RegistrationState, SqliteRepository};

/// Error type for handlers
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type DialogueStorage = InMemStorage<RegistrationState>;
pub type RegistrationDialogue = Dialogue<RegistrationState, DialogueStorage>;

/// Dependencies required by handlers
#[derive(Clone)]
pub struct HandlerDeps {
    pub config: Arc<Config>,
    pub flow: RegistrationFlow<SqliteRepository>,
    pub admin: AdminService<SqliteRepository>,
    pub rate_limiter: Arc<RateLimiter>,
    pub dialogues: Arc<DialogueStorage>,
}

impl HandlerDeps {
    pub fn new(config: Arc<Config>, repo: SqliteRepository, rate_limiter: Arc<RateLimiter>) -> Self {
        let leader_id = config.leader_id;
        Self {
            config,
            flow: RegistrationFlow::new(repo.clone()),
            admin: AdminService::new(repo, leader_id),
            rate_limiter,
            dialogues: InMemStorage::new(),
        }
    }

    /// Dialogue of a private chat. In private chats the chat id equals the
    /// user id, which lets the review handler reach the submitter's dialogue.
    pub fn dialogue(&self, chat_id: ChatId) -> RegistrationDialogue {
        Dialogue::new(Arc::clone(&self.dialogues), chat_id)
    }
}

/// Telegram user id of the sender, if the update has one.
pub fn sender_id(msg: &Message) -> Option<i64> {
    msg.from.as_ref().and_then(|u| i64::try_from(u.id.0).ok())
}

/// Builds the applicant identity from a message sender.
pub fn applicant_from(msg: &Message) -> Option<Applicant> {
    let user = msg.from.as_ref()?;
    let id = i64::try_from(user.id.0).ok()?;
    Some(Applicant::new(id, handle_for(user.username.as_deref(), id)))
}

/// Converts media of a message into the core's attachment type.
pub fn attachment_of(msg: &Message) -> Option<Attachment> {
    if let Some(sizes) = msg.photo() {
        // Sizes come smallest first
        return sizes.last().map(|largest| Attachment::Photo {
            file_id: largest.file.id.0.clone(),
        });
    }
    if let Some(doc) = msg.document() {
        return Some(Attachment::Document {
            file_id: doc.file.id.0.clone(),
            mime_type: doc.mime_type.as_ref().map(|m| m.essence_str().to_string()),
        });
    }
    match &msg.kind {
        MessageKind::Common(common) if !matches!(common.media_kind, MediaKind::Text(_)) => Some(Attachment::Other),
        _ => None,
    }
}

/// Maps a non-command message to a registration event.
///
/// Returns `None` for service messages (joins, pins and so on), which the
/// conversation ignores.
pub fn event_from(msg: &Message) -> Option<RegistrationEvent> {
    if let Some(text) = msg.text() {
        return Some(RegistrationEvent::Text(text.to_string()));
    }
    attachment_of(msg).map(|attachment| match attachment {
        Attachment::Other => RegistrationEvent::Media(None),
        usable => RegistrationEvent::Media(Some(usable)),
    })
}
