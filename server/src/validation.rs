use narration_core::Voice;

use crate::error::ApiError;

/// Validate narration text against a character limit.
pub fn validate_text(text: &str, max_length: usize) -> Result<(), ApiError> {
    if text.trim().is_empty() {
        return Err(ApiError::InvalidInput("Text cannot be empty".to_string()));
    }
    if text.chars().count() > max_length {
        return Err(ApiError::InvalidInput(format!(
            "Text too long (max {} characters)",
            max_length
        )));
    }
    Ok(())
}

/// Resolve a voice id or display label.
pub fn validate_voice(voice: &str) -> Result<Voice, ApiError> {
    voice.parse::<Voice>().map_err(ApiError::from)
}

pub fn validate_narration_request(text: &str, voice: &str, max_length: usize) -> Result<Voice, ApiError> {
    validate_text(text, max_length)?;
    validate_voice(voice)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_narration_request_valid() {
        assert_eq!(validate_narration_request("Hello.", "nova", 100).unwrap(), Voice::Nova);
        assert_eq!(validate_narration_request("Hello.", "Felix (UK)", 100).unwrap(), Voice::Fable);
    }

    #[test]
    fn test_validate_text_empty() {
        for text in ["", "   \n"] {
            match validate_text(text, 100) {
                Err(ApiError::InvalidInput(msg)) => assert!(msg.contains("empty")),
                other => panic!("expected InvalidInput, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_validate_text_too_long() {
        let long_text = "a".repeat(6000);
        match validate_text(&long_text, 5000) {
            Err(ApiError::InvalidInput(msg)) => assert!(msg.contains("too long")),
            other => panic!("expected InvalidInput, got {other:?}"),
        }
        // limit counts characters, not bytes
        assert!(validate_text(&"é".repeat(5000), 5000).is_ok());
    }

    #[test]
    fn test_validate_voice_unknown() {
        match validate_voice("robot") {
            Err(ApiError::InvalidInput(msg)) => assert!(msg.contains("Unsupported voice")),
            other => panic!("expected InvalidInput, got {other:?}"),
        }
    }
}
