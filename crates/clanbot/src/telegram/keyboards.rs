//! Inline keyboards and their callback data

use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

use clancore::Decision;

const APPROVE_PREFIX: &str = "approve:";
const REJECT_PREFIX: &str = "reject:";

/// Approve/Reject buttons attached to an application sent to the leader.
pub fn review_keyboard(pending_id: i64) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![
        InlineKeyboardButton::callback("✅ Approve", format!("{}{}", APPROVE_PREFIX, pending_id)),
        InlineKeyboardButton::callback("❌ Reject", format!("{}{}", REJECT_PREFIX, pending_id)),
    ]])
}

/// Parses `approve:<id>` / `reject:<id>`.
pub fn parse_review_callback(data: &str) -> Option<(Decision, i64)> {
    let (decision, raw_id) = if let Some(rest) = data.strip_prefix(APPROVE_PREFIX) {
        (Decision::Approve, rest)
    } else if let Some(rest) = data.strip_prefix(REJECT_PREFIX) {
        (Decision::Reject, rest)
    } else {
        return None;
    };

    raw_id.parse::<i64>().ok().filter(|id| *id > 0).map(|id| (decision, id))
}
