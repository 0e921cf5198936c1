use crate::core::validation::{validate_nickname, validate_screenshot, Attachment, ValidationError};
use crate::models::{NewPendingRegistration, PendingRegistration};
use crate::registration::state::{Applicant, Effect, RegistrationEvent, RegistrationState, Reply, Transition};
use crate::storage::{ClanRepository, PlayerKey, RepositoryError};

/// Drives one user's registration conversation.
///
/// The flow never touches the chat: it maps (state, event) to a
/// [`Transition`] and leaves sending and dialogue storage to the caller.
/// Only the final screenshot step writes to the repository.
#[derive(Clone)]
pub struct RegistrationFlow<R> {
    repo: R,
}

impl<R: ClanRepository> RegistrationFlow<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    pub fn handle(&self, state: &RegistrationState, applicant: &Applicant, event: RegistrationEvent) -> Transition {
        use RegistrationEvent as E;
        use RegistrationState as S;

        match (state, event) {
            (S::PendingReview { .. }, E::Register) => self.resync_pending(state, applicant),
            (_, E::Register) if state.is_at_rest() => self.start(state, applicant),
            (_, E::Register) => Transition::to(S::AwaitingNickname, Reply::NicknamePrompt),

            (S::PendingReview { .. }, E::Cancel) => Transition::stay(state, Reply::CannotCancelSubmitted),
            (_, E::Cancel) if state.is_collecting() => Transition::to(S::Idle, Reply::Cancelled),
            (_, E::Cancel) => self.cancel_at_rest(state, applicant),

            (S::AwaitingNickname, E::Text(text)) => self.accept_nickname(state, &text),
            (S::AwaitingNickname, E::Media(_)) => Transition::stay(state, Reply::NicknameExpected),

            (S::AwaitingScreenshot { .. }, E::Text(_)) => Transition::stay(state, Reply::ScreenshotExpected),
            (S::AwaitingScreenshot { nickname }, E::Media(attachment)) => {
                self.submit(state, applicant, nickname, attachment.as_ref())
            }

            (_, E::Text(_) | E::Media(_)) => Transition::stay(state, Reply::Nothing),
        }
    }

    /// `/register` from a resting state: refuse members and open applications.
    fn start(&self, state: &RegistrationState, applicant: &Applicant) -> Transition {
        match self.repo.get_player(&PlayerKey::ExternalId(applicant.telegram_id)) {
            Ok(Some(player)) if player.is_active() => {
                return Transition::to(
                    RegistrationState::Idle,
                    Reply::AlreadyMember {
                        nickname: Some(player.nickname),
                    },
                );
            }
            Ok(_) => {}
            Err(e) => return storage_failure(state, "member lookup", applicant, &e),
        }

        match self.repo.pending_for_user(applicant.telegram_id) {
            Ok(Some(pending)) => {
                let nickname = Some(pending.nickname.clone());
                Transition::to(under_review(pending), Reply::AlreadyPending { nickname })
            }
            Ok(None) => Transition::to(RegistrationState::AwaitingNickname, Reply::NicknamePrompt),
            Err(e) => storage_failure(state, "pending lookup", applicant, &e),
        }
    }

    /// `/register` while under review. If the application was resolved
    /// behind this conversation's back, start over instead.
    fn resync_pending(&self, state: &RegistrationState, applicant: &Applicant) -> Transition {
        let nickname = match state {
            RegistrationState::PendingReview { nickname, .. } => Some(nickname.clone()),
            _ => None,
        };
        match self.repo.pending_for_user(applicant.telegram_id) {
            Ok(None) => self.start(&RegistrationState::Idle, applicant),
            Ok(Some(_)) => Transition::stay(state, Reply::AlreadyPending { nickname }),
            Err(e) => storage_failure(state, "pending resync", applicant, &e),
        }
    }

    /// `/cancel` with nothing being collected. Dialogues do not survive a
    /// restart, so an open application is looked up before answering.
    fn cancel_at_rest(&self, state: &RegistrationState, applicant: &Applicant) -> Transition {
        match self.repo.pending_for_user(applicant.telegram_id) {
            Ok(Some(pending)) => Transition::to(under_review(pending), Reply::CannotCancelSubmitted),
            Ok(None) => Transition::stay(state, Reply::NothingToCancel),
            Err(e) => storage_failure(state, "pending lookup", applicant, &e),
        }
    }

    fn accept_nickname(&self, state: &RegistrationState, text: &str) -> Transition {
        let nickname = match validate_nickname(text) {
            Ok(nickname) => nickname,
            Err(ValidationError::InvalidNickname { issue, .. }) => {
                return Transition::stay(state, Reply::InvalidNickname { issue });
            }
            Err(ValidationError::MissingScreenshot) => return Transition::stay(state, Reply::NicknameExpected),
        };

        match self.repo.is_nickname_taken(&nickname) {
            Ok(true) => Transition::stay(state, Reply::NicknameTaken { nickname }),
            Ok(false) => Transition::to(
                RegistrationState::AwaitingScreenshot {
                    nickname: nickname.clone(),
                },
                Reply::ScreenshotPrompt { nickname },
            ),
            Err(e) => {
                log::error!("Nickname lookup for '{}' failed: {}", nickname, e);
                Transition::stay(state, Reply::StorageFailure)
            }
        }
    }

    fn submit(
        &self,
        state: &RegistrationState,
        applicant: &Applicant,
        nickname: &str,
        attachment: Option<&Attachment>,
    ) -> Transition {
        let screenshot = match validate_screenshot(attachment) {
            Ok(screenshot) => screenshot,
            Err(_) => return Transition::stay(state, Reply::ScreenshotExpected),
        };

        let new = NewPendingRegistration {
            external_id: applicant.telegram_id,
            handle: applicant.handle.clone(),
            nickname: nickname.to_string(),
            screenshot_ref: screenshot.file_id,
        };

        match self.repo.create_pending(new) {
            Ok(pending) => Transition::to(
                RegistrationState::PendingReview {
                    pending_id: pending.id,
                    nickname: pending.nickname.clone(),
                },
                Reply::Submitted {
                    nickname: pending.nickname.clone(),
                },
            )
            .with_effect(Effect::NotifyAdmin(pending)),
            Err(RepositoryError::DuplicatePending { .. }) => match self.repo.pending_for_user(applicant.telegram_id) {
                Ok(Some(existing)) => {
                    let nickname = Some(existing.nickname.clone());
                    Transition::to(under_review(existing), Reply::AlreadyPending { nickname })
                }
                Ok(None) => Transition::to(RegistrationState::Idle, Reply::AlreadyPending { nickname: None }),
                Err(e) => storage_failure(state, "pending lookup", applicant, &e),
            },
            Err(RepositoryError::NicknameTaken { nickname }) => {
                Transition::to(RegistrationState::AwaitingNickname, Reply::NicknameTaken { nickname })
            }
            Err(RepositoryError::AlreadyMember { .. }) => {
                Transition::to(RegistrationState::Idle, Reply::AlreadyMember { nickname: None })
            }
            Err(e) => storage_failure(state, "application submit", applicant, &e),
        }
    }
}

fn under_review(pending: PendingRegistration) -> RegistrationState {
    RegistrationState::PendingReview {
        pending_id: pending.id,
        nickname: pending.nickname,
    }
}

fn storage_failure(
    state: &RegistrationState,
    operation: &str,
    applicant: &Applicant,
    err: &RepositoryError,
) -> Transition {
    log::error!(
        "Registration {} failed for {} ({}): {}",
        operation,
        applicant.handle,
        applicant.telegram_id,
        err
    );
    Transition::stay(state, Reply::StorageFailure)
}
