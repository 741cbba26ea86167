//! Small validators shared by the configuration checks.

use crate::ports::SUPPORTED_BAUD_RATES;

/// Validates if a given string is a valid file path.
///
/// # Arguments
///
/// * `path` - The string to validate.
///
/// # Returns
///
/// * `Ok(())` if the file path is valid.
/// * `Err(&'static str)` if the file path is invalid.
pub fn is_valid_path(path: &str) -> Result<(), &'static str> {
    if path.is_empty() {
        return Err("File path cannot be empty");
    }
    if path.contains('\0') {
        return Err("File path cannot contain null bytes");
    }
    Ok(())
}

/// Validates if a given string is not empty.
pub fn is_not_empty(value: &str) -> Result<(), &'static str> {
    if !value.trim().is_empty() {
        Ok(())
    } else {
        Err("Value cannot be empty")
    }
}

/// Validates that a baud rate is one the bench offers.
pub fn is_supported_baud(baud: u32) -> Result<(), &'static str> {
    if SUPPORTED_BAUD_RATES.contains(&baud) {
        Ok(())
    } else {
        Err("Baud rate must be one of 2400, 4800, 9600, 14400, 115200")
    }
}

/// Validates a frame marker pair.
///
/// Markers must be non-empty, free of line breaks, and neither may contain
/// the other, otherwise a marker search could match inside its partner.
pub fn is_valid_marker_pair(start: &str, stop: &str) -> Result<(), &'static str> {
    if start.is_empty() || stop.is_empty() {
        return Err("Frame markers cannot be empty");
    }
    if start.contains(['\n', '\r']) || stop.contains(['\n', '\r']) {
        return Err("Frame markers cannot contain line breaks");
    }
    if start.contains(stop) || stop.contains(start) {
        return Err("Frame markers cannot contain each other");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths() {
        assert!(is_valid_path("AM60.csv").is_ok());
        assert!(is_valid_path("").is_err());
        assert!(is_valid_path("a\0b").is_err());
    }

    #[test]
    fn bauds() {
        assert!(is_supported_baud(115200).is_ok());
        assert!(is_supported_baud(14400).is_ok());
        assert!(is_supported_baud(57600).is_err());
    }

    #[test]
    fn markers() {
        assert!(is_valid_marker_pair("START", "STOP").is_ok());
        assert!(is_valid_marker_pair("", "STOP").is_err());
        assert!(is_valid_marker_pair("END", "ENDX").is_err());
        assert!(is_valid_marker_pair("A\n", "B").is_err());
    }

    #[test]
    fn not_empty() {
        assert!(is_not_empty(" x ").is_ok());
        assert!(is_not_empty("   ").is_err());
    }
}
