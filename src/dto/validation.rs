//! Validation helpers for DTOs.

use validator::ValidationError;

/// Longest accepted tag.
pub const MAX_TAG_LEN: usize = 60;
/// Most tags a match may carry.
pub const MAX_TAGS: usize = 30;

/// Validates that a text field contains something other than whitespace.
pub fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("value must not be blank".into());
        return Err(err);
    }
    Ok(())
}

/// Validates the size of a tag list and of each tag.
///
/// Blank entries are accepted here; they are dropped when the list is normalised.
pub fn validate_tags(tags: &[String]) -> Result<(), ValidationError> {
    if tags.len() > MAX_TAGS {
        let mut err = ValidationError::new("tags_count");
        err.message = Some(format!("at most {MAX_TAGS} tags are allowed (got {})", tags.len()).into());
        return Err(err);
    }

    if let Some(tag) = tags.iter().find(|tag| tag.trim().chars().count() > MAX_TAG_LEN) {
        let mut err = ValidationError::new("tag_length");
        err.message = Some(format!("tag `{tag}` exceeds {MAX_TAG_LEN} characters").into());
        return Err(err);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_values_are_rejected() {
        assert!(validate_not_blank("Dubois").is_ok());
        assert!(validate_not_blank("   ").is_err());
        assert!(validate_not_blank("").is_err());
    }

    #[test]
    fn tag_limits() {
        assert!(validate_tags(&["Practice".into(), " ".into()]).is_ok());
        assert!(validate_tags(&vec!["x".to_string(); MAX_TAGS + 1]).is_err());
        assert!(validate_tags(&["y".repeat(MAX_TAG_LEN + 1)]).is_err());
    }
}
