//! User-visible text, rendered for Telegram's HTML parse mode.
//!
//! Everything a user or the leader reads is built here. Values that come
//! from users (nicknames, handles, reasons) always pass through
//! [`escape_html`].

use std::time::Duration;

use chrono::{DateTime, Utc};
use indoc::{formatdoc, indoc};

use crate::admin::{AdminError, ReviewOutcome};
use crate::core::validation::{NicknameIssue, ValidationError, NICKNAME_MAX_LEN};
use crate::models::{PendingRegistration, Player, PlayerStatus};
use crate::registration::Reply;
use crate::storage::{ErrorKind, RepositoryError};

/// Telegram allows 4096 characters per message; keep a margin for markup.
pub const MAX_MESSAGE_LENGTH: usize = 4000;

/// Rows shown per section of the unfiltered `/list` report
const ACTIVE_LIST_LIMIT: usize = 20;
const EXCLUDED_LIST_LIMIT: usize = 10;

/// Escapes text for HTML parse mode.
///
/// # Examples
/// ```
/// use clancore::formatting::escape_html;
///
/// assert_eq!(escape_html("<b>&"), "&lt;b&gt;&amp;");
/// ```
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

const TRUNCATION_MARKER: &str = "\n... (truncated)";

/// Cuts a message to `max` characters, marking the cut.
///
/// Every line built here closes its own tags, so the cut falls on the last
/// whole line that fits. A single overlong line is cut before any tag or
/// entity it was in the middle of.
pub fn truncate_message(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let budget = max.saturating_sub(TRUNCATION_MARKER.chars().count());
    let end = text.char_indices().nth(budget).map_or(text.len(), |(i, _)| i);
    let head = &text[..end];

    let mut trimmed = match head.rfind('\n') {
        Some(newline) if newline > 0 => head[..newline].to_string(),
        _ => strip_markup(head),
    };
    trimmed.push_str(TRUNCATION_MARKER);
    trimmed
}

/// Plain text of an HTML fragment that may end inside a tag or entity.
fn strip_markup(fragment: &str) -> String {
    let mut out = String::with_capacity(fragment.len());
    let mut in_tag = false;
    let mut entity = String::new();
    for c in fragment.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if in_tag => {}
            '&' => entity.push(c),
            ';' if !entity.is_empty() => {
                entity.push(c);
                out.push_str(&entity);
                entity.clear();
            }
            _ if !entity.is_empty() => entity.push(c),
            _ => out.push(c),
        }
    }
    out
}

fn format_time(at: &DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M UTC").to_string()
}

fn nickname_issue_text(issue: &NicknameIssue) -> String {
    match issue {
        NicknameIssue::Empty => "❌ The nickname can't be empty. Try again:".to_string(),
        NicknameIssue::TooLong => format!(
            "❌ The nickname must be at most {} characters. Try again:",
            NICKNAME_MAX_LEN
        ),
        NicknameIssue::DisallowedChar(c) => format!(
            "❌ The character «{}» is not allowed. Use letters, digits, spaces, <code>_</code> <code>-</code> and <code>.</code> only. Try again:",
            escape_html(&c.to_string())
        ),
    }
}

/// Text for a registration reply, or `None` when nothing should be sent.
pub fn render_reply(reply: &Reply) -> Option<String> {
    let text = match reply {
        Reply::NicknamePrompt => formatdoc! {"
            📝 Send your in-game nickname ({} to {} characters).

            Send /cancel to stop.",
            1, NICKNAME_MAX_LEN
        },
        Reply::ScreenshotPrompt { nickname } => format!(
            "✅ Nickname <b>{}</b> accepted.\n\n📸 Now send a screenshot of your game profile.",
            escape_html(nickname)
        ),
        Reply::InvalidNickname { issue } => nickname_issue_text(issue),
        Reply::NicknameTaken { nickname } => format!(
            "❌ The nickname <b>{}</b> is already taken. Choose another one:",
            escape_html(nickname)
        ),
        Reply::NicknameExpected => "✏️ Please send your nickname as text.".to_string(),
        Reply::ScreenshotExpected => "📸 Please send a screenshot of your game profile as a photo.".to_string(),
        Reply::Submitted { nickname } => format!(
            "🎉 Application for <b>{}</b> sent! The clan leader will review it soon.",
            escape_html(nickname)
        ),
        Reply::AlreadyMember { nickname: Some(nickname) } => format!(
            "✅ You are already a clan member as <b>{}</b>.",
            escape_html(nickname)
        ),
        Reply::AlreadyMember { nickname: None } => "✅ You are already a clan member.".to_string(),
        Reply::AlreadyPending { nickname: Some(nickname) } => format!(
            "⏳ Your application for <b>{}</b> is already waiting for review.",
            escape_html(nickname)
        ),
        Reply::AlreadyPending { nickname: None } => "⏳ Your application is already waiting for review.".to_string(),
        Reply::Cancelled => "🚫 Registration cancelled. Send /register to start again.".to_string(),
        Reply::NothingToCancel => "There is nothing to cancel.".to_string(),
        Reply::CannotCancelSubmitted => {
            "⏳ Your application has already been sent to the leader and can't be cancelled.".to_string()
        }
        Reply::StorageFailure => "⚠️ Something went wrong on our side. Please try again later.".to_string(),
        Reply::Nothing => return None,
    };
    Some(text)
}

pub fn welcome_text(is_leader: bool) -> String {
    let mut text = indoc! {"
        👋 Welcome to the clan registration bot!

        To join the clan, send /register and follow the steps:
        1. your in-game nickname
        2. a screenshot of your game profile

        The clan leader reviews every application."}
    .to_string();
    if is_leader {
        text.push_str("\n\n👑 You are the clan leader. See /help for admin commands.");
    }
    text
}

pub fn help_text(is_leader: bool) -> String {
    let mut text = indoc! {"
        <b>Commands</b>
        /register - apply to join the clan
        /cancel - stop the current registration
        /help - this message"}
    .to_string();
    if is_leader {
        text.push_str(indoc! {"


            <b>Leader commands</b>
            /pending - applications waiting for review
            /list [active|excluded] - clan roster
            /exclude &lt;@username|nickname&gt; &lt;reason&gt; - exclude a player
            /add &lt;telegram_id&gt; &lt;@username&gt; &lt;nickname&gt; - add a player directly"});
    }
    text
}

/// `/pending` report body.
pub fn pending_report(pending: &[PendingRegistration]) -> String {
    if pending.is_empty() {
        return "📭 No pending applications.".to_string();
    }

    let mut text = format!("📋 <b>Pending applications ({})</b>\n", pending.len());
    for entry in pending {
        text.push_str(&format!(
            "\n#{} · <b>{}</b> · {} · {}",
            entry.id,
            escape_html(&entry.nickname),
            escape_html(&entry.handle),
            format_time(&entry.submitted_at)
        ));
    }
    text
}

fn player_line(index: usize, player: &Player) -> String {
    let mut line = format!(
        "{}. <b>{}</b> · {}",
        index + 1,
        escape_html(&player.nickname),
        escape_html(&player.handle)
    );
    match (&player.status, &player.exclusion_reason) {
        (PlayerStatus::Excluded, Some(reason)) => line.push_str(&format!(" · {}", escape_html(reason))),
        _ => line.push_str(&format!(" · since {}", player.registered_at.format("%Y-%m-%d"))),
    }
    line
}

fn push_section(text: &mut String, title: &str, players: &[&Player], limit: Option<usize>) {
    text.push_str(&format!("\n<b>{} ({})</b>\n", title, players.len()));
    let shown = limit.unwrap_or(players.len()).min(players.len());
    for (i, player) in players.iter().take(shown).enumerate() {
        text.push_str(&player_line(i, player));
        text.push('\n');
    }
    if players.len() > shown {
        text.push_str(&format!("... and {} more\n", players.len() - shown));
    }
}

/// `/list` report body.
///
/// Unfiltered, shows the first 20 active and first 10 excluded players
/// with totals. Filtered, shows every player of that status.
pub fn players_report(players: &[Player], filter: Option<PlayerStatus>) -> String {
    if players.is_empty() {
        return match filter {
            Some(PlayerStatus::Active) => "📭 No active players.".to_string(),
            Some(PlayerStatus::Excluded) => "📭 No excluded players.".to_string(),
            None => "📭 No players yet.".to_string(),
        };
    }

    let active: Vec<&Player> = players.iter().filter(|p| p.status == PlayerStatus::Active).collect();
    let excluded: Vec<&Player> = players.iter().filter(|p| p.status == PlayerStatus::Excluded).collect();

    let mut text = "👥 <b>Clan roster</b>\n".to_string();
    match filter {
        Some(PlayerStatus::Active) => push_section(&mut text, "Active", &active, None),
        Some(PlayerStatus::Excluded) => push_section(&mut text, "Excluded", &excluded, None),
        None => {
            push_section(&mut text, "Active", &active, Some(ACTIVE_LIST_LIMIT));
            if !excluded.is_empty() {
                push_section(&mut text, "Excluded", &excluded, Some(EXCLUDED_LIST_LIMIT));
            }
            text.push_str(&format!("\nTotal: {}", players.len()));
        }
    }
    text.trim_end().to_string()
}

/// Caption of the screenshot sent to the leader for review.
pub fn admin_notification(pending: &PendingRegistration) -> String {
    formatdoc! {"
        🆕 <b>New application #{id}</b>

        Nickname: <b>{nickname}</b>
        User: {handle} (<code>{user_id}</code>)
        Sent: {sent}",
        id = pending.id,
        nickname = escape_html(&pending.nickname),
        handle = escape_html(&pending.handle),
        user_id = pending.external_id,
        sent = format_time(&pending.submitted_at),
    }
}

/// Review caption with the decision appended. `original` is the plain
/// text of the caption as Telegram returns it.
pub fn reviewed_caption(original: &str, outcome: &ReviewOutcome) -> String {
    let verdict = match outcome {
        ReviewOutcome::Approved(_) => "✅ <b>Approved</b>",
        ReviewOutcome::Rejected(_) => "❌ <b>Rejected</b>",
    };
    format!("{}\n\n{}", escape_html(original), verdict)
}

pub fn approval_notice(player: &Player) -> String {
    format!(
        "🎉 Your application has been approved! Welcome to the clan, <b>{}</b>.",
        escape_html(&player.nickname)
    )
}

pub fn rejection_notice(pending: &PendingRegistration) -> String {
    format!(
        "😔 Your application for <b>{}</b> was rejected. You can apply again with /register.",
        escape_html(&pending.nickname)
    )
}

/// Message to a player who has just been excluded.
pub fn exclusion_notice(player: &Player) -> String {
    let reason = player.exclusion_reason.as_deref().unwrap_or("-");
    format!(
        "🚫 You have been excluded from the clan.\nReason: {}",
        escape_html(reason)
    )
}

pub fn exclusion_confirmation(player: &Player) -> String {
    format!(
        "✅ <b>{}</b> ({}) excluded.\nReason: {}",
        escape_html(&player.nickname),
        escape_html(&player.handle),
        escape_html(player.exclusion_reason.as_deref().unwrap_or("-"))
    )
}

pub fn added_confirmation(player: &Player) -> String {
    format!(
        "✅ <b>{}</b> ({}) added to the clan.",
        escape_html(&player.nickname),
        escape_html(&player.handle)
    )
}

pub const UNKNOWN_COMMAND: &str = "🤔 Unknown command. Send /help for the list of commands.";

pub fn rate_limited(wait: Duration) -> String {
    format!(
        "⏳ Too many messages. Please wait {} s and try again.",
        wait.as_secs().max(1)
    )
}

fn repository_error_text(err: &RepositoryError) -> String {
    match err {
        RepositoryError::AlreadyResolved { pending_id, status } => {
            format!("ℹ️ Application #{} has already been {}.", pending_id, status)
        }
        RepositoryError::AlreadyExcluded { nickname } => {
            format!("ℹ️ <b>{}</b> is already excluded.", escape_html(nickname))
        }
        RepositoryError::NotFound { .. } => format!("❓ {}", escape_html(&capitalize(&err.to_string()))),
        RepositoryError::NicknameTaken { nickname } => {
            format!("❌ The nickname <b>{}</b> is already taken.", escape_html(nickname))
        }
        RepositoryError::AlreadyMember { external_id } => {
            format!("❌ User <code>{}</code> is already an active member.", external_id)
        }
        RepositoryError::DuplicatePending { external_id } => format!(
            "❌ User <code>{}</code> already has an application waiting for review.",
            external_id
        ),
        _ => {
            debug_assert_eq!(err.kind(), ErrorKind::Storage);
            "⚠️ Database error, see the log for details.".to_string()
        }
    }
}

/// Leader-facing text for a failed admin command.
pub fn admin_error_text(err: &AdminError) -> String {
    match err {
        AdminError::NotAuthorized => "⛔ This command is only available to the clan leader.".to_string(),
        AdminError::Usage(usage) => format!("Usage: <code>{}</code>", escape_html(usage)),
        AdminError::Validation(ValidationError::InvalidNickname { issue, .. }) => nickname_issue_text(issue),
        AdminError::Validation(ValidationError::MissingScreenshot) => "📸 A screenshot is required.".to_string(),
        AdminError::Repository(err) => repository_error_text(err),
    }
}

pub fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
