//! Input validation for credential flows: email, name and password policy.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use warden_db::models::{Department, Region};

pub const MIN_PASSWORD_LENGTH: usize = 8;
pub const MAX_PASSWORD_LENGTH: usize = 128;
pub const MAX_EMAIL_LENGTH: usize = 255;
pub const MIN_NAME_LENGTH: usize = 2;
pub const MAX_NAME_LENGTH: usize = 100;

/// Name fragments and email local parts shorter than this are not checked.
const MIN_PERSONAL_TOKEN: usize = 3;

// Constant pattern; failure to compile is a programming error.
static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)+$")
        .expect("EMAIL_REGEX is a valid regex pattern")
});

static NAME_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\p{L}[\p{L} .'-]*$").expect("NAME_REGEX is a valid regex pattern")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PasswordStrength {
    Weak,
    Fair,
    Good,
    Strong,
}

impl PasswordStrength {
    /// 0–2 weak, 3–4 fair, 5 good, 6 strong.
    #[must_use]
    pub fn from_score(score: u8) -> Self {
        match score {
            0..=2 => PasswordStrength::Weak,
            3..=4 => PasswordStrength::Fair,
            5 => PasswordStrength::Good,
            _ => PasswordStrength::Strong,
        }
    }
}

/// One point each for: length ≥ 8, length ≥ 12, lowercase, uppercase, digit, symbol.
#[must_use]
pub fn password_score(password: &str) -> u8 {
    let len = password.chars().count();
    [
        len >= 8,
        len >= 12,
        password.chars().any(char::is_lowercase),
        password.chars().any(char::is_uppercase),
        password.chars().any(|c| c.is_ascii_digit()),
        password
            .chars()
            .any(|c| !c.is_alphanumeric() && !c.is_whitespace()),
    ]
    .into_iter()
    .map(u8::from)
    .sum()
}

#[must_use]
pub fn password_strength(password: &str) -> PasswordStrength {
    PasswordStrength::from_score(password_score(password))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PasswordValidationError {
    TooShort { min: usize, actual: usize },
    TooLong { max: usize, actual: usize },
    MissingLetter,
    MissingDigit,
    TooWeak,
    /// `what` names the personal detail found, e.g. `"name"`.
    ContainsPersonalInfo { what: &'static str },
    SameAsCurrent,
}

impl std::fmt::Display for PasswordValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooShort { min, actual } => {
                write!(f, "Password too short: {actual} characters (minimum {min})")
            }
            Self::TooLong { max, actual } => {
                write!(f, "Password too long: {actual} characters (maximum {max})")
            }
            Self::MissingLetter => write!(f, "Password must contain at least one letter"),
            Self::MissingDigit => write!(f, "Password must contain at least one digit"),
            Self::TooWeak => write!(
                f,
                "Password is too weak; mix upper and lower case letters, digits and symbols"
            ),
            Self::ContainsPersonalInfo { what } => {
                write!(f, "Password must not contain your {what}")
            }
            Self::SameAsCurrent => write!(f, "New password must differ from the current one"),
        }
    }
}

/// Personal details a password may not embed.
#[derive(Debug, Clone, Copy)]
pub struct PersonalInfo<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub department: Department,
    pub region: Region,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordValidationResult {
    pub is_valid: bool,
    pub strength: PasswordStrength,
    pub errors: Vec<PasswordValidationError>,
}

/// Length, composition and strength rules. Weak passwords are rejected.
#[must_use]
pub fn validate_password(password: &str) -> PasswordValidationResult {
    let mut errors = Vec::new();
    let len = password.chars().count();

    if len < MIN_PASSWORD_LENGTH {
        errors.push(PasswordValidationError::TooShort {
            min: MIN_PASSWORD_LENGTH,
            actual: len,
        });
    }
    if len > MAX_PASSWORD_LENGTH {
        errors.push(PasswordValidationError::TooLong {
            max: MAX_PASSWORD_LENGTH,
            actual: len,
        });
    }
    if !password.chars().any(char::is_alphabetic) {
        errors.push(PasswordValidationError::MissingLetter);
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        errors.push(PasswordValidationError::MissingDigit);
    }

    let strength = password_strength(password);
    if strength == PasswordStrength::Weak {
        errors.push(PasswordValidationError::TooWeak);
    }

    PasswordValidationResult {
        is_valid: errors.is_empty(),
        strength,
        errors,
    }
}

/// The first personal detail embedded in the password, compared case-insensitively.
#[must_use]
pub fn find_personal_info(password: &str, info: &PersonalInfo<'_>) -> Option<&'static str> {
    let lowered = password.to_lowercase();

    let name_hit = info
        .name
        .split(|c: char| !c.is_alphanumeric())
        .filter(|part| part.chars().count() >= MIN_PERSONAL_TOKEN)
        .any(|part| lowered.contains(&part.to_lowercase()));
    if name_hit {
        return Some("name");
    }

    let local = info.email.split('@').next().unwrap_or_default();
    if local.chars().count() >= MIN_PERSONAL_TOKEN && lowered.contains(&local.to_lowercase()) {
        return Some("email");
    }

    if lowered.contains(&info.department.as_str().to_lowercase()) {
        return Some("department");
    }
    if lowered.contains(&info.region.as_str().to_lowercase()) {
        return Some("region");
    }
    None
}

/// Full policy: composition rules plus personal-info exclusion.
#[must_use]
pub fn validate_password_for(password: &str, info: &PersonalInfo<'_>) -> PasswordValidationResult {
    let mut result = validate_password(password);
    if let Some(what) = find_personal_info(password, info) {
        result
            .errors
            .push(PasswordValidationError::ContainsPersonalInfo { what });
        result.is_valid = false;
    }
    result
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmailValidationError {
    Empty,
    TooLong { max: usize, actual: usize },
    InvalidFormat,
}

impl std::fmt::Display for EmailValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "Email address is required"),
            Self::TooLong { max, actual } => {
                write!(f, "Email too long: {actual} characters (maximum {max})")
            }
            Self::InvalidFormat => write!(f, "Invalid email format"),
        }
    }
}

pub fn validate_email(email: &str) -> Result<(), EmailValidationError> {
    if email.is_empty() {
        return Err(EmailValidationError::Empty);
    }
    if email.len() > MAX_EMAIL_LENGTH {
        return Err(EmailValidationError::TooLong {
            max: MAX_EMAIL_LENGTH,
            actual: email.len(),
        });
    }
    if !EMAIL_REGEX.is_match(email) {
        return Err(EmailValidationError::InvalidFormat);
    }
    Ok(())
}

/// Letters, spaces, apostrophes, hyphens and periods; must start with a letter.
pub fn validate_name(name: &str) -> Result<(), String> {
    let len = name.chars().count();
    if !(MIN_NAME_LENGTH..=MAX_NAME_LENGTH).contains(&len) {
        return Err(format!(
            "Name must be {MIN_NAME_LENGTH}-{MAX_NAME_LENGTH} characters"
        ));
    }
    if !NAME_REGEX.is_match(name) {
        return Err("Name contains invalid characters".to_string());
    }
    Ok(())
}

/// Emails are stored lower-cased and trimmed.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
