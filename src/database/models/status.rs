use crate::error::ApiError;

/// Publication workflow shared by every taxonomy entity.
///
/// Stored as lowercase text in the status column. Allowed transitions:
/// draft -> published, published <-> unpublished. A draft cannot be
/// unpublished because it was never published in the first place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentStatus {
    Draft,
    Published,
    Unpublished,
}

impl ContentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentStatus::Draft => "draft",
            ContentStatus::Published => "published",
            ContentStatus::Unpublished => "unpublished",
        }
    }

    pub fn parse(value: &str) -> Result<Self, ApiError> {
        match value {
            "draft" => Ok(ContentStatus::Draft),
            "published" => Ok(ContentStatus::Published),
            "unpublished" => Ok(ContentStatus::Unpublished),
            other => Err(ApiError::unprocessable(format!("Invalid status: {}", other))),
        }
    }

    /// Validate a transition from the persisted status to the requested one.
    /// Re-submitting the current status is a no-op and allowed.
    pub fn validate_transition(from: Self, to: Self) -> Result<(), ApiError> {
        if from == to {
            return Ok(());
        }
        match (from, to) {
            (ContentStatus::Draft, ContentStatus::Published)
            | (ContentStatus::Published, ContentStatus::Unpublished)
            | (ContentStatus::Unpublished, ContentStatus::Published) => Ok(()),
            (ContentStatus::Draft, ContentStatus::Unpublished) => {
                Err(ApiError::unprocessable("not published yet"))
            }
            (_, ContentStatus::Draft) => {
                Err(ApiError::unprocessable("cannot move back to draft"))
            }
            // Remaining combinations are same-status, handled above
            _ => Ok(()),
        }
    }
}

impl std::fmt::Display for ContentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draft_to_published_allowed() {
        assert!(ContentStatus::validate_transition(
            ContentStatus::Draft,
            ContentStatus::Published
        )
        .is_ok());
    }

    #[test]
    fn published_unpublished_both_ways() {
        assert!(ContentStatus::validate_transition(
            ContentStatus::Published,
            ContentStatus::Unpublished
        )
        .is_ok());
        assert!(ContentStatus::validate_transition(
            ContentStatus::Unpublished,
            ContentStatus::Published
        )
        .is_ok());
    }

    #[test]
    fn draft_to_unpublished_rejected() {
        let err = ContentStatus::validate_transition(
            ContentStatus::Draft,
            ContentStatus::Unpublished,
        )
        .unwrap_err();
        assert_eq!(err.message(), "not published yet");
    }

    #[test]
    fn same_status_is_noop() {
        assert!(ContentStatus::validate_transition(
            ContentStatus::Published,
            ContentStatus::Published
        )
        .is_ok());
    }

    #[test]
    fn unknown_status_rejected() {
        assert!(ContentStatus::parse("archived").is_err());
        assert_eq!(ContentStatus::parse("published").unwrap(), ContentStatus::Published);
    }
}
