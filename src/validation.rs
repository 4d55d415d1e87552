//! Input validation and phone-number canonicalization.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::VerifyError;
use crate::session::ImageUpload;

/// Maximum accepted size for an uploaded image.
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid"));

static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{10,12}$").expect("phone pattern is valid"));

/// Country calling code used when converting between local and
/// international formats.
const COUNTRY_CODE: &str = "254";

/// Check that an email address is syntactically plausible.
pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email.trim())
}

/// Validate an email and return it trimmed.
pub fn validate_email(email: &str) -> Result<String, VerifyError> {
    let email = email.trim();
    if email.is_empty() {
        return Err(VerifyError::validation("email", "Please enter your email address"));
    }
    if !is_valid_email(email) {
        return Err(VerifyError::validation("email", "Please enter a valid email address"));
    }
    Ok(email.to_string())
}

/// Require a non-blank text field and return it trimmed.
pub fn require_text(field: &str, value: &str) -> Result<String, VerifyError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(VerifyError::validation(field, format!("{field} must not be empty")));
    }
    Ok(value.to_string())
}

/// Validate an uploaded image: non-empty, `image/*` MIME, at most 5 MiB.
pub fn validate_image(field: &str, upload: &ImageUpload) -> Result<(), VerifyError> {
    validate_image_parts(field, &upload.content_type, upload.bytes.len())
}

pub fn validate_image_parts(field: &str, content_type: &str, size: usize) -> Result<(), VerifyError> {
    let mime = content_type.trim().to_ascii_lowercase();
    if !mime.starts_with("image/") {
        return Err(VerifyError::validation(field, "Please upload an image file"));
    }
    if size == 0 {
        return Err(VerifyError::validation(field, "Uploaded file is empty"));
    }
    if size > MAX_IMAGE_BYTES {
        return Err(VerifyError::validation(field, "File size exceeds 5MB limit"));
    }
    Ok(())
}

/// Strip formatting from a phone number and check its shape.
///
/// Accepts an optional leading `+`; spaces and dashes are ignored. The
/// remaining digits must number 10 to 12.
pub fn phone_digits(phone: &str) -> Result<String, VerifyError> {
    let cleaned: String = phone
        .trim()
        .trim_start_matches('+')
        .chars()
        .filter(|c| !matches!(c, ' ' | '-'))
        .collect();
    if cleaned.is_empty() {
        return Err(VerifyError::validation("phoneNumber", "Please enter your phone number"));
    }
    if !PHONE_RE.is_match(&cleaned) {
        return Err(VerifyError::validation("phoneNumber", "Please enter a valid phone number"));
    }
    Ok(cleaned)
}

/// Local format expected by the phone registry: `+254712345678` → `0712345678`.
pub fn registry_phone(phone: &str) -> Result<String, VerifyError> {
    let digits = phone_digits(phone)?;
    Ok(match digits.strip_prefix(COUNTRY_CODE) {
        Some(rest) => format!("0{rest}"),
        None => digits,
    })
}

/// International format without `+` expected by the messaging provider:
/// `+254712345678` → `254712345678`, `0712345678` → `254712345678`.
pub fn messaging_phone(phone: &str) -> Result<String, VerifyError> {
    let digits = phone_digits(phone)?;
    if digits.starts_with(COUNTRY_CODE) {
        return Ok(digits);
    }
    Ok(match digits.strip_prefix('0') {
        Some(rest) => format!("{COUNTRY_CODE}{rest}"),
        None => digits,
    })
}
