use crate::core::validation::{Attachment, NicknameIssue};
use crate::models::PendingRegistration;

/// Per-conversation registration state.
///
/// `Approved` and `Rejected` are terminal for the conversation; a new
/// `/register` starts over from the nickname prompt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RegistrationState {
    #[default]
    Idle,
    AwaitingNickname,
    AwaitingScreenshot {
        nickname: String,
    },
    PendingReview {
        pending_id: i64,
        nickname: String,
    },
    Approved {
        nickname: String,
    },
    Rejected {
        nickname: String,
    },
}

impl RegistrationState {
    /// True while the user is filling in the form.
    pub fn is_collecting(&self) -> bool {
        matches!(self, Self::AwaitingNickname | Self::AwaitingScreenshot { .. })
    }

    /// States from which `/register` starts a fresh attempt.
    pub fn is_at_rest(&self) -> bool {
        matches!(self, Self::Idle | Self::Approved { .. } | Self::Rejected { .. })
    }
}

/// What the user did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationEvent {
    /// `/register`
    Register,
    /// `/cancel`
    Cancel,
    /// Plain text message
    Text(String),
    /// A message carrying media; `None` for anything unusable
    Media(Option<Attachment>),
}

/// The Telegram user driving the conversation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applicant {
    pub telegram_id: i64,
    /// `@username` or `user_<id>`
    pub handle: String,
}

impl Applicant {
    pub fn new(telegram_id: i64, handle: impl Into<String>) -> Self {
        Self {
            telegram_id,
            handle: handle.into(),
        }
    }
}

/// Message to send back to the user. Rendering lives in `formatting`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Ask for the in-game nickname
    NicknamePrompt,
    /// Nickname accepted, ask for the profile screenshot
    ScreenshotPrompt { nickname: String },
    InvalidNickname { issue: NicknameIssue },
    NicknameTaken { nickname: String },
    /// Got media while waiting for a nickname
    NicknameExpected,
    /// Got text or a non-image while waiting for the screenshot
    ScreenshotExpected,
    Submitted { nickname: String },
    AlreadyMember { nickname: Option<String> },
    AlreadyPending { nickname: Option<String> },
    Cancelled,
    NothingToCancel,
    CannotCancelSubmitted,
    StorageFailure,
    /// Say nothing
    Nothing,
}

/// Side effect the adapter has to carry out after replying
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Forward the new application to the leader for review
    NotifyAdmin(PendingRegistration),
}

/// Result of feeding one event into the state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub next: RegistrationState,
    pub reply: Reply,
    pub effect: Option<Effect>,
}

impl Transition {
    pub fn to(next: RegistrationState, reply: Reply) -> Self {
        Self {
            next,
            reply,
            effect: None,
        }
    }

    /// Keep the current state.
    pub fn stay(current: &RegistrationState, reply: Reply) -> Self {
        Self::to(current.clone(), reply)
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effect = Some(effect);
        self
    }
}
