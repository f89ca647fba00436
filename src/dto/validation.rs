//! Validation helpers for DTOs.

use validator::ValidationError;

/// Length of a room PIN in digits.
pub const PIN_LENGTH: usize = 6;

/// Validates that a room PIN is exactly [`PIN_LENGTH`] ASCII digits.
///
/// # Examples
///
/// ```ignore
/// validate_pin("483920")  // Ok
/// validate_pin("48392")   // Err - too short
/// validate_pin("48392a")  // Err - not numeric
/// ```
pub fn validate_pin(pin: &str) -> Result<(), ValidationError> {
    if pin.len() != PIN_LENGTH {
        let mut err = ValidationError::new("pin_length");
        err.message =
            Some(format!("PIN must be exactly {PIN_LENGTH} digits (got {})", pin.len()).into());
        return Err(err);
    }

    if !pin.chars().all(|c| c.is_ascii_digit()) {
        let mut err = ValidationError::new("pin_format");
        err.message = Some("PIN must contain only digits".into());
        return Err(err);
    }

    Ok(())
}

/// Validates that a display name is non-empty once surrounding whitespace is
/// stripped.
pub fn validate_display_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        let mut err = ValidationError::new("display_name_empty");
        err.message = Some("display name must not be blank".into());
        return Err(err);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_pin_valid() {
        assert!(validate_pin("483920").is_ok());
        assert!(validate_pin("000000").is_ok());
        assert!(validate_pin("999999").is_ok());
    }

    #[test]
    fn test_validate_pin_invalid_length() {
        assert!(validate_pin("48392").is_err()); // too short
        assert!(validate_pin("4839201").is_err()); // too long
        assert!(validate_pin("").is_err()); // empty
    }

    #[test]
    fn test_validate_pin_invalid_format() {
        assert!(validate_pin("48392a").is_err()); // letter
        assert!(validate_pin("48 392").is_err()); // space
        assert!(validate_pin("٤٨٣٩٢٠").is_err()); // non-ASCII digits
    }

    #[test]
    fn test_validate_display_name() {
        assert!(validate_display_name("Sara").is_ok());
        assert!(validate_display_name("  ").is_err());
        assert!(validate_display_name("").is_err());
    }
}
