//! Dispatcher schema and handler chain builders

use teloxide::dispatching::{UpdateFilterExt, UpdateHandler};
use teloxide::prelude::*;
use teloxide::types::{MaybeInaccessibleMessage, ParseMode};

use clancore::formatting::{self, truncate_message, MAX_MESSAGE_LENGTH};
use clancore::{Decision, Effect, RegistrationEvent, ReviewOutcome};

use super::types::{applicant_from, event_from, sender_id, HandlerDeps, HandlerError};
use crate::telegram::archive::spawn_archive;
use crate::telegram::bot::Command;
use crate::telegram::keyboards::parse_review_callback;
use crate::telegram::notifications::{notify_excluded, notify_leader, notify_submitter, MAX_CAPTION_LENGTH};

/// Creates the dispatcher schema for the bot.
///
/// Commands first, then free-form messages of the registration dialogue,
/// then the leader's review buttons. Only private chats are served.
pub fn schema(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    dptree::entry()
        .branch(command_handler(deps.clone()))
        .branch(message_handler(deps.clone()))
        .branch(callback_handler(deps))
}

fn command_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    Update::filter_message()
        .filter(|msg: Message| msg.chat.is_private())
        .filter_command::<Command>()
        .endpoint(move |bot: Bot, msg: Message, cmd: Command| {
            let deps = deps.clone();
            async move {
                let Some(user_id) = sender_id(&msg) else {
                    return Ok(());
                };
                log::info!("Received command {:?} from user {}", cmd, user_id);

                if !cmd.is_leader_only() && !check_rate_limit(&bot, &deps, &msg, user_id).await? {
                    return Ok(());
                }

                let is_leader = deps.admin.is_leader(user_id);
                match cmd {
                    Command::Start => send_html(&bot, msg.chat.id, &formatting::welcome_text(is_leader)).await?,
                    Command::Help => send_html(&bot, msg.chat.id, &formatting::help_text(is_leader)).await?,
                    Command::Register => run_registration(&bot, &deps, &msg, RegistrationEvent::Register).await?,
                    Command::Cancel => run_registration(&bot, &deps, &msg, RegistrationEvent::Cancel).await?,
                    Command::Pending => {
                        let text = deps
                            .admin
                            .pending_report(user_id)
                            .unwrap_or_else(|e| formatting::admin_error_text(&e));
                        send_html(&bot, msg.chat.id, &text).await?;
                    }
                    Command::List(args) => {
                        let text = deps
                            .admin
                            .list_report(user_id, &args)
                            .unwrap_or_else(|e| formatting::admin_error_text(&e));
                        send_html(&bot, msg.chat.id, &text).await?;
                    }
                    Command::Exclude(args) => match deps.admin.exclude(user_id, &args) {
                        Ok(player) => {
                            log::info!("Player '{}' excluded by {}", player.nickname, user_id);
                            send_html(&bot, msg.chat.id, &formatting::exclusion_confirmation(&player)).await?;
                            notify_excluded(&bot, &player).await;
                        }
                        Err(e) => {
                            log::warn!("/exclude from {} failed: {}", user_id, e);
                            send_html(&bot, msg.chat.id, &formatting::admin_error_text(&e)).await?;
                        }
                    },
                    Command::Add(args) => match deps.admin.add(user_id, &args) {
                        Ok(player) => {
                            log::info!("Player '{}' added directly by {}", player.nickname, user_id);
                            send_html(&bot, msg.chat.id, &formatting::added_confirmation(&player)).await?;
                        }
                        Err(e) => {
                            log::warn!("/add from {} failed: {}", user_id, e);
                            send_html(&bot, msg.chat.id, &formatting::admin_error_text(&e)).await?;
                        }
                    },
                }
                Ok(())
            }
        })
}

/// Everything that is not a known command: nickname text, screenshots and
/// stray messages.
fn message_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    Update::filter_message()
        .filter(|msg: Message| msg.chat.is_private())
        .endpoint(move |bot: Bot, msg: Message| {
            let deps = deps.clone();
            async move {
                let Some(user_id) = sender_id(&msg) else {
                    return Ok(());
                };
                if !check_rate_limit(&bot, &deps, &msg, user_id).await? {
                    return Ok(());
                }

                if msg.text().is_some_and(|text| text.starts_with('/')) {
                    bot.send_message(msg.chat.id, formatting::UNKNOWN_COMMAND).await?;
                    return Ok(());
                }

                match event_from(&msg) {
                    Some(event) => run_registration(&bot, &deps, &msg, event).await,
                    None => Ok(()),
                }
            }
        })
}

fn callback_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    Update::filter_callback_query().endpoint(move |bot: Bot, q: CallbackQuery| {
        let deps = deps.clone();
        async move { handle_review_callback(&bot, &deps, q).await }
    })
}

/// Returns false (and tells the user) when the sender is over the limit.
/// The leader is never limited.
async fn check_rate_limit(bot: &Bot, deps: &HandlerDeps, msg: &Message, user_id: i64) -> Result<bool, HandlerError> {
    if deps.admin.is_leader(user_id) {
        return Ok(true);
    }
    match deps.rate_limiter.try_acquire(user_id).await {
        None => Ok(true),
        Some(wait) => {
            log::warn!("Rate limit hit by user {} ({}s left)", user_id, wait.as_secs());
            bot.send_message(msg.chat.id, formatting::rate_limited(wait)).await?;
            Ok(false)
        }
    }
}

/// Feeds one event into the sender's registration dialogue.
async fn run_registration(
    bot: &Bot,
    deps: &HandlerDeps,
    msg: &Message,
    event: RegistrationEvent,
) -> Result<(), HandlerError> {
    let Some(applicant) = applicant_from(msg) else {
        return Ok(());
    };
    let dialogue = deps.dialogue(msg.chat.id);
    let state = dialogue.get_or_default().await?;

    let transition = deps.flow.handle(&state, &applicant, event);
    if transition.next != state {
        log::debug!("User {}: {:?} -> {:?}", applicant.telegram_id, state, transition.next);
        dialogue.update(transition.next.clone()).await?;
    }

    if let Some(text) = formatting::render_reply(&transition.reply) {
        send_html(bot, msg.chat.id, &text).await?;
    }

    match transition.effect {
        Some(Effect::NotifyAdmin(pending)) => {
            log::info!(
                "Application #{} from {} for '{}' submitted",
                pending.id,
                applicant.handle,
                pending.nickname
            );
            notify_leader(bot, deps.config.leader_id, &pending).await;
            spawn_archive(
                bot.clone(),
                deps.config.screenshots_dir.clone(),
                pending.external_id,
                pending.screenshot_ref.clone(),
            );
        }
        None => {}
    }
    Ok(())
}

async fn handle_review_callback(bot: &Bot, deps: &HandlerDeps, q: CallbackQuery) -> Result<(), HandlerError> {
    let Some((decision, pending_id)) = q.data.as_deref().and_then(parse_review_callback) else {
        log::warn!("Unknown callback data {:?}", q.data);
        bot.answer_callback_query(q.id.clone()).await?;
        return Ok(());
    };
    let admin_id = i64::try_from(q.from.id.0).unwrap_or_default();

    let outcome = match deps.admin.review(pending_id, admin_id, decision) {
        Ok(outcome) => outcome,
        Err(e) => {
            log::warn!("Review of #{} by {} failed: {}", pending_id, admin_id, e);
            bot.answer_callback_query(q.id.clone())
                .text(formatting::capitalize(&e.to_string()))
                .show_alert(true)
                .await?;
            return Ok(());
        }
    };

    log::info!(
        "Application #{} ('{}') {} by {}",
        pending_id,
        outcome.nickname(),
        match decision {
            Decision::Approve => "approved",
            Decision::Reject => "rejected",
        },
        admin_id
    );
    let answer = match &outcome {
        ReviewOutcome::Approved(_) => "✅ Approved",
        ReviewOutcome::Rejected(_) => "❌ Rejected",
    };
    bot.answer_callback_query(q.id.clone()).text(answer).await?;

    if let Some(MaybeInaccessibleMessage::Regular(message)) = &q.message {
        mark_reviewed(bot, message, &outcome).await;
    }

    let submitter = deps.dialogue(ChatId(outcome.submitter_id()));
    if let Err(e) = submitter.update(outcome.submitter_state()).await {
        log::error!("Failed to update dialogue of user {}: {}", outcome.submitter_id(), e);
    }
    notify_submitter(bot, &outcome).await;
    Ok(())
}

/// Appends the verdict to the review message. An edit without
/// `reply_markup` also drops the Approve/Reject buttons.
async fn mark_reviewed(bot: &Bot, message: &Message, outcome: &ReviewOutcome) {
    let result = match message.caption() {
        Some(original) => bot
            .edit_message_caption(message.chat.id, message.id)
            .caption(truncate_message(
                &formatting::reviewed_caption(original, outcome),
                MAX_CAPTION_LENGTH,
            ))
            .parse_mode(ParseMode::Html)
            .await
            .map(drop),
        None => bot
            .edit_message_text(
                message.chat.id,
                message.id,
                truncate_message(
                    &formatting::reviewed_caption(message.text().unwrap_or_default(), outcome),
                    MAX_MESSAGE_LENGTH,
                ),
            )
            .parse_mode(ParseMode::Html)
            .await
            .map(drop),
    };
    if let Err(e) = result {
        log::warn!("Failed to update review message {}: {}", message.id.0, e);
    }
}

async fn send_html(bot: &Bot, chat_id: ChatId, text: &str) -> Result<(), HandlerError> {
    bot.send_message(chat_id, truncate_message(text, MAX_MESSAGE_LENGTH))
        .parse_mode(ParseMode::Html)
        .await?;
    Ok(())
}
