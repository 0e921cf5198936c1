//! Input validation for the registration flow
//!
//! All functions here are pure. Anything that needs storage (nickname
//! collisions, duplicate applications) is checked by the repository.

use thiserror::Error;

/// Inclusive nickname length bounds, counted in characters
pub const NICKNAME_MIN_LEN: usize = 1;
pub const NICKNAME_MAX_LEN: usize = 15;

const MAX_FILENAME_LEN: usize = 255;

/// Punctuation accepted in nicknames besides letters, digits and spaces
const NICKNAME_EXTRA_CHARS: [char; 3] = ['_', '-', '.'];

/// Why a nickname was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NicknameIssue {
    Empty,
    TooLong,
    DisallowedChar(char),
}

/// Validation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Nickname failed the syntax rules
    #[error("Invalid nickname '{nickname}': {issue:?}")]
    InvalidNickname { nickname: String, issue: NicknameIssue },

    /// No usable image in the message
    #[error("No screenshot attached")]
    MissingScreenshot,
}

/// Media attached to an incoming message, as seen by the core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attachment {
    /// A compressed photo; `file_id` is the largest size
    Photo { file_id: String },
    /// A file sent as a document
    Document { file_id: String, mime_type: Option<String> },
    /// Stickers, voice notes, videos and the like
    Other,
}

/// An accepted profile screenshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Screenshot {
    /// Opaque platform file handle
    pub file_id: String,
}

/// Validates a nickname and returns it trimmed.
///
/// Rules: 1..=15 characters after trimming; letters and digits of any
/// script, spaces, `_`, `-` and `.` only.
///
/// # Examples
/// ```
/// use clancore::core::validation::validate_nickname;
///
/// assert_eq!(validate_nickname("  DragonSlayer ").unwrap(), "DragonSlayer");
/// assert!(validate_nickname("").is_err());
/// assert!(validate_nickname("Player@123").is_err());
/// ```
pub fn validate_nickname(raw: &str) -> Result<String, ValidationError> {
    let nickname = raw.trim();
    let invalid = |issue| ValidationError::InvalidNickname {
        nickname: nickname.to_string(),
        issue,
    };

    let len = nickname.chars().count();
    if len < NICKNAME_MIN_LEN {
        return Err(invalid(NicknameIssue::Empty));
    }
    if len > NICKNAME_MAX_LEN {
        return Err(invalid(NicknameIssue::TooLong));
    }

    if let Some(bad) = nickname
        .chars()
        .find(|c| !(c.is_alphanumeric() || *c == ' ' || NICKNAME_EXTRA_CHARS.contains(c)))
    {
        return Err(invalid(NicknameIssue::DisallowedChar(bad)));
    }

    Ok(nickname.to_string())
}

/// Case-insensitive comparison key used for nickname uniqueness.
pub fn nickname_key(nickname: &str) -> String {
    nickname.trim().to_lowercase()
}

/// Checks that a message carried an image.
///
/// Photos are always accepted; documents only with an `image/*` mime type.
pub fn validate_screenshot(attachment: Option<&Attachment>) -> Result<Screenshot, ValidationError> {
    match attachment {
        Some(Attachment::Photo { file_id }) => Ok(Screenshot {
            file_id: file_id.clone(),
        }),
        Some(Attachment::Document {
            file_id,
            mime_type: Some(mime),
        }) if mime.starts_with("image/") => Ok(Screenshot {
            file_id: file_id.clone(),
        }),
        _ => Err(ValidationError::MissingScreenshot),
    }
}

/// Returns true when `user_id` is the configured leader.
pub fn is_admin(user_id: i64, leader_id: i64) -> bool {
    leader_id > 0 && user_id == leader_id
}

/// Ensures a handle starts with `@`.
pub fn normalize_handle(handle: &str) -> String {
    let handle = handle.trim();
    if handle.starts_with('@') {
        handle.to_string()
    } else {
        format!("@{}", handle)
    }
}

/// Display handle for a user: `@username`, or `user_<id>` when the
/// account has no public username.
pub fn handle_for(username: Option<&str>, user_id: i64) -> String {
    match username.map(str::trim).filter(|u| !u.is_empty()) {
        Some(name) => normalize_handle(name),
        None => format!("user_{}", user_id),
    }
}

/// Sanitizes a filename by replacing filesystem-unsafe characters.
///
/// # Examples
/// ```
/// use clancore::core::validation::sanitize_filename;
///
/// assert_eq!(sanitize_filename("shot:1.jpg"), "shot_1.jpg");
/// assert_eq!(sanitize_filename(" ..."), "unnamed");
/// ```
pub fn sanitize_filename(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| {
            if ['<', '>', ':', '"', '/', '\\', '|', '?', '*'].contains(&c) || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();

    let trimmed: String = replaced
        .trim_matches(|c| c == '.' || c == ' ')
        .chars()
        .take(MAX_FILENAME_LEN)
        .collect();

    if trimmed.is_empty() {
        "unnamed".to_string()
    } else {
        trimmed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== validate_nickname Tests ====================

    #[test]
    fn test_valid_nicknames() {
        for nick in ["Player123", "Дракон", "Test_User", "Pro-Gamer", "А Б", "x", "Mr.Smith"] {
            assert!(validate_nickname(nick).is_ok(), "{} should be valid", nick);
        }
    }

    #[test]
    fn test_nickname_is_trimmed() {
        assert_eq!(validate_nickname("  DragonSlayer\n").unwrap(), "DragonSlayer");
    }

    #[test]
    fn test_length_bounds() {
        assert!(validate_nickname(&"A".repeat(15)).is_ok());

        let sixteen = "A".repeat(16);
        let forty = "Я".repeat(40);
        for bad in ["", "   ", sixteen.as_str(), forty.as_str()] {
            match validate_nickname(bad) {
                Err(ValidationError::InvalidNickname { issue, .. }) => {
                    assert!(matches!(issue, NicknameIssue::Empty | NicknameIssue::TooLong))
                }
                other => panic!("{:?} should fail with InvalidNickname, got {:?}", bad, other),
            }
        }
    }

    #[test]
    fn test_length_counts_chars_not_bytes() {
        // 15 Cyrillic letters are 30 bytes
        assert!(validate_nickname(&"Ж".repeat(15)).is_ok());
    }

    #[test]
    fn test_disallowed_characters() {
        for nick in ["Player@123", "Test#User", "Name!", "User$$$", "Player😀", "/register"] {
            assert!(
                matches!(
                    validate_nickname(nick),
                    Err(ValidationError::InvalidNickname {
                        issue: NicknameIssue::DisallowedChar(_),
                        ..
                    })
                ),
                "{} should be invalid",
                nick
            );
        }
    }

    #[test]
    fn test_nickname_key_is_case_insensitive() {
        assert_eq!(nickname_key("DragonSlayer"), nickname_key("dragonslayer"));
        assert_eq!(nickname_key("ДРАКОН"), nickname_key("дракон"));
    }

    // ==================== validate_screenshot Tests ====================

    #[test]
    fn test_photo_is_accepted() {
        let photo = Attachment::Photo {
            file_id: "AgAD".to_string(),
        };
        assert_eq!(validate_screenshot(Some(&photo)).unwrap().file_id, "AgAD");
    }

    #[test]
    fn test_image_document_is_accepted() {
        let doc = Attachment::Document {
            file_id: "BQAD".to_string(),
            mime_type: Some("image/png".to_string()),
        };
        assert!(validate_screenshot(Some(&doc)).is_ok());
    }

    #[test]
    fn test_missing_or_non_image_is_rejected() {
        let pdf = Attachment::Document {
            file_id: "BQAD".to_string(),
            mime_type: Some("application/pdf".to_string()),
        };
        let unknown = Attachment::Document {
            file_id: "BQAD".to_string(),
            mime_type: None,
        };
        assert_eq!(validate_screenshot(None), Err(ValidationError::MissingScreenshot));
        assert_eq!(validate_screenshot(Some(&pdf)), Err(ValidationError::MissingScreenshot));
        assert_eq!(validate_screenshot(Some(&unknown)), Err(ValidationError::MissingScreenshot));
        assert_eq!(
            validate_screenshot(Some(&Attachment::Other)),
            Err(ValidationError::MissingScreenshot)
        );
    }

    // ==================== identity helpers ====================

    #[test]
    fn test_is_admin() {
        assert!(is_admin(42, 42));
        assert!(!is_admin(41, 42));
        assert!(!is_admin(0, 0));
    }

    #[test]
    fn test_handles() {
        assert_eq!(normalize_handle("player"), "@player");
        assert_eq!(normalize_handle(" @player "), "@player");
        assert_eq!(handle_for(Some("knight"), 5), "@knight");
        assert_eq!(handle_for(None, 5), "user_5");
        assert_eq!(handle_for(Some(""), 5), "user_5");
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("screenshot_1.jpg"), "screenshot_1.jpg");
        assert_eq!(sanitize_filename("a/b\\c?.jpg"), "a_b_c_.jpg");
        assert_eq!(sanitize_filename("..hidden.."), "hidden");
        assert_eq!(sanitize_filename(""), "unnamed");
        assert_eq!(sanitize_filename(&"x".repeat(300)).len(), 255);
    }
}
