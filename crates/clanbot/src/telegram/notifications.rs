//! Messages the bot sends on its own initiative: applications for the
//! leader and verdicts for the applicants.

use teloxide::prelude::*;
use teloxide::types::{FileId, InputFile, ParseMode};

use clancore::formatting::{self, truncate_message, MAX_MESSAGE_LENGTH};
use clancore::{PendingRegistration, Player, ReviewOutcome};

use crate::telegram::keyboards::review_keyboard;

/// Telegram caps media captions well below the text limit.
pub(crate) const MAX_CAPTION_LENGTH: usize = 1000;

/// Sends a new application to the leader with Approve/Reject buttons.
///
/// The screenshot reference is a Telegram file id that may belong to a photo
/// or to a document, so the photo form is tried first. If neither can be
/// sent the leader still gets the caption as plain text.
pub async fn notify_leader(bot: &Bot, leader_id: i64, pending: &PendingRegistration) {
    let chat_id = ChatId(leader_id);
    let caption = truncate_message(&formatting::admin_notification(pending), MAX_CAPTION_LENGTH);
    let file_id = FileId(pending.screenshot_ref.clone());

    let photo = bot
        .send_photo(chat_id, InputFile::file_id(file_id.clone()))
        .caption(caption.clone())
        .parse_mode(ParseMode::Html)
        .reply_markup(review_keyboard(pending.id))
        .await;
    let Err(photo_err) = photo else {
        log::info!("Application #{} sent to the leader", pending.id);
        return;
    };
    log::debug!("Screenshot of #{} is not a photo: {}", pending.id, photo_err);

    let document = bot
        .send_document(chat_id, InputFile::file_id(file_id))
        .caption(caption.clone())
        .parse_mode(ParseMode::Html)
        .reply_markup(review_keyboard(pending.id))
        .await;
    let Err(document_err) = document else {
        log::info!("Application #{} sent to the leader as a document", pending.id);
        return;
    };
    log::warn!(
        "Failed to attach the screenshot of #{}: {}; falling back to text",
        pending.id,
        document_err
    );

    if let Err(e) = bot
        .send_message(chat_id, caption)
        .parse_mode(ParseMode::Html)
        .reply_markup(review_keyboard(pending.id))
        .await
    {
        log::error!("Failed to notify the leader about application #{}: {}", pending.id, e);
    }
}

/// Sends an HTML message to a user. Failures are logged, not propagated:
/// the user may have blocked the bot, which must not undo a decision.
pub async fn notify_user(bot: &Bot, user_id: i64, text: &str) {
    if let Err(e) = bot
        .send_message(ChatId(user_id), truncate_message(text, MAX_MESSAGE_LENGTH))
        .parse_mode(ParseMode::Html)
        .await
    {
        log::warn!("Failed to notify user {}: {}", user_id, e);
    }
}

/// Tells the applicant how the leader decided.
pub async fn notify_submitter(bot: &Bot, outcome: &ReviewOutcome) {
    let text = match outcome {
        ReviewOutcome::Approved(player) => formatting::approval_notice(player),
        ReviewOutcome::Rejected(pending) => formatting::rejection_notice(pending),
    };
    notify_user(bot, outcome.submitter_id(), &text).await;
}

pub async fn notify_excluded(bot: &Bot, player: &Player) {
    notify_user(bot, player.external_id, &formatting::exclusion_notice(player)).await;
}
