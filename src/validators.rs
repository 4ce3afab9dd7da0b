/// Input validators for user account fields
/// Features:
/// 1. DoS Protection: Input length limits
/// 2. Email normalization: case-insensitive matching key
/// 3. SQL Injection Prevention: pattern rejection on free-text fields

use regex::Regex;
use lazy_static::lazy_static;

use crate::error::ValidationError;

const MAX_EMAIL_LENGTH: usize = 254; // RFC 5321
const MIN_EMAIL_LENGTH: usize = 5;
const MAX_LOCAL_PART_LENGTH: usize = 64;
const MAX_NAME_LENGTH: usize = 50;
const MAX_PHONE_LENGTH: usize = 10;
const MAX_LOCATION_LENGTH: usize = 100;
const MIN_PASSWORD_LENGTH: usize = 8;
/// bcrypt only reads the first 72 bytes of its input
pub const MAX_PASSWORD_BYTES: usize = 72;

pub const DEFAULT_LOCATION: &str = "yourcity";

lazy_static! {
    // RFC 5322 simplified email regex (practical validation)
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$"
    ).unwrap();

    static ref PHONE_REGEX: Regex = Regex::new(r"^[0-9]+$").unwrap();

    // Regex to detect potentially malicious SQL patterns
    static ref SQL_INJECTION_PATTERNS: [Regex; 4] = [
        Regex::new(r"(?i)\s+UNION\s+").unwrap(),
        Regex::new(r"(?i);\s*(INSERT|UPDATE|DELETE|DROP|CREATE|ALTER)").unwrap(),
        Regex::new(r"(?i)\b(SLEEP|WAITFOR|BENCHMARK)\s*\(").unwrap(),
        Regex::new(r#"(?i)(\bOR\b|\bAND\b)\s*(['"][0-9]*['"]|[0-9]*)\s*=\s*(['"][0-9]*['"]|[0-9]*|True|False)"#).unwrap(),
    ];
}

/// Validates and normalizes an email address
///
/// The domain part is lower-cased; the local part is kept as typed.
/// Lookups are case-insensitive on the whole address regardless.
pub fn is_valid_email(email: &str) -> Result<String, ValidationError> {
    let trimmed = email.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField("email".to_string()));
    }

    if trimmed.len() < MIN_EMAIL_LENGTH {
        return Err(ValidationError::TooShort("email".to_string(), MIN_EMAIL_LENGTH));
    }

    if trimmed.len() > MAX_EMAIL_LENGTH {
        return Err(ValidationError::TooLong("email".to_string(), MAX_EMAIL_LENGTH));
    }

    if trimmed.matches('@').count() != 1 || trimmed.contains('\0') {
        return Err(ValidationError::InvalidFormat("email".to_string()));
    }

    if !EMAIL_REGEX.is_match(trimmed) {
        return Err(ValidationError::InvalidFormat("email".to_string()));
    }

    if contains_sql_injection_patterns(trimmed) {
        return Err(ValidationError::PossibleSQLInjection);
    }

    let (local, domain) = trimmed
        .split_once('@')
        .ok_or_else(|| ValidationError::InvalidFormat("email".to_string()))?;

    if local.len() > MAX_LOCAL_PART_LENGTH {
        return Err(ValidationError::SuspiciousContent("email".to_string()));
    }

    Ok(format!("{}@{}", local, domain.to_ascii_lowercase()))
}

/// Validates the display name (`userName`)
pub fn is_valid_name(name: &str) -> Result<String, ValidationError> {
    let trimmed = name.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField("userName".to_string()));
    }

    if trimmed.chars().count() > MAX_NAME_LENGTH {
        return Err(ValidationError::TooLong("userName".to_string(), MAX_NAME_LENGTH));
    }

    if has_suspicious_text_patterns(trimmed) {
        return Err(ValidationError::SuspiciousContent("userName".to_string()));
    }

    if contains_sql_injection_patterns(trimmed) {
        return Err(ValidationError::PossibleSQLInjection);
    }

    Ok(trimmed.to_string())
}

/// Validates a phone number: 1 to 10 ASCII digits
pub fn is_valid_phone(phone: &str) -> Result<String, ValidationError> {
    let trimmed = phone.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField("phone".to_string()));
    }

    if trimmed.len() > MAX_PHONE_LENGTH {
        return Err(ValidationError::TooLong("phone".to_string(), MAX_PHONE_LENGTH));
    }

    if !PHONE_REGEX.is_match(trimmed) {
        return Err(ValidationError::InvalidFormat("phone".to_string()));
    }

    Ok(trimmed.to_string())
}

pub fn is_valid_location(location: &str) -> Result<String, ValidationError> {
    let trimmed = location.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField("location".to_string()));
    }

    if trimmed.chars().count() > MAX_LOCATION_LENGTH {
        return Err(ValidationError::TooLong("location".to_string(), MAX_LOCATION_LENGTH));
    }

    if has_suspicious_text_patterns(trimmed) {
        return Err(ValidationError::SuspiciousContent("location".to_string()));
    }

    if contains_sql_injection_patterns(trimmed) {
        return Err(ValidationError::PossibleSQLInjection);
    }

    Ok(trimmed.to_string())
}

/// Password policy: length only. The value is never trimmed.
pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    if password.is_empty() {
        return Err(ValidationError::EmptyField("password".to_string()));
    }

    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(ValidationError::TooShort("password".to_string(), MIN_PASSWORD_LENGTH));
    }

    // Measured in bytes: anything past 72 would be silently ignored
    if password.len() > MAX_PASSWORD_BYTES {
        return Err(ValidationError::TooLong("password".to_string(), MAX_PASSWORD_BYTES));
    }

    Ok(())
}

fn has_suspicious_text_patterns(text: &str) -> bool {
    if text.chars().any(|c| c.is_control()) {
        return true;
    }

    let special_char_count = text
        .chars()
        .filter(|c| {
            !c.is_alphanumeric()
                && !c.is_whitespace()
                && !matches!(c, '-' | '.' | '_' | '\'' | ',')
        })
        .count();

    special_char_count > 5
}

fn contains_sql_injection_patterns(input: &str) -> bool {
    SQL_INJECTION_PATTERNS.iter().any(|pattern| pattern.is_match(input))
}
