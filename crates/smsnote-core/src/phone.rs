//! Phone number validation and normalization.

use phonenumber::{country, Mode};

use crate::error::{Result, SmsNoteError};

/// Region assumed for numbers written without a country code.
pub const DEFAULT_REGION: country::Id = country::Id::US;

/// Parse `input`, require a valid number, and return its E.164 form
/// (`+` followed by country code and national number).
pub fn normalize_phone(input: &str) -> Result<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(SmsNoteError::Validation(
            "Phone number cannot be empty".to_string(),
        ));
    }

    let number = phonenumber::parse(Some(DEFAULT_REGION), trimmed).map_err(|e| {
        SmsNoteError::Validation(format!("Could not read phone number: {}", e))
    })?;
    if !phonenumber::is_valid(&number) {
        return Err(SmsNoteError::Validation(
            "Invalid phone number; try again".to_string(),
        ));
    }

    let normalized = number.format().mode(Mode::E164).to_string();
    if normalized.len() < 3 || !normalized[1..].bytes().all(|b| b.is_ascii_digit()) {
        return Err(SmsNoteError::Validation(
            "Invalid phone number; try again".to_string(),
        ));
    }
    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalizes_national_format() {
        assert_eq!(normalize_phone("(201) 555-0123").unwrap(), "+12015550123");
        assert_eq!(normalize_phone("650 253 0000").unwrap(), "+16502530000");
    }

    #[test]
    fn test_normalizes_international_format() {
        assert_eq!(normalize_phone("+1 201-555-0123").unwrap(), "+12015550123");
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(matches!(
            normalize_phone("not a phone"),
            Err(SmsNoteError::Validation(_))
        ));
        assert!(matches!(normalize_phone("  "), Err(SmsNoteError::Validation(_))));
    }

    #[test]
    fn test_rejects_implausible_number() {
        assert!(matches!(
            normalize_phone("123"),
            Err(SmsNoteError::Validation(_))
        ));
    }
}
