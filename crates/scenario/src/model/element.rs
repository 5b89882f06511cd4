use std::fmt;

use super::master::SectionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidateMode {
    /// Unresolved references and precondition violations are errors.
    Strict,
    /// Tolerates incomplete documents; misses are stored as `None`.
    Editor,
}

impl ValidateMode {
    pub fn is_strict(self) -> bool {
        matches!(self, ValidateMode::Strict)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidateErrorCode {
    UnresolvedVariable,
    UnresolvedImage,
    UnresolvedEntity,
    UnresolvedFaction,
    CategoryMismatch,
    MissingClassReference,
    TerrainStackOrder,
    ValueOutOfRange,
    EmptyIdentifier,
    DuplicateIdentifier,
}

#[derive(Debug, Clone)]
pub struct ValidateError {
    pub code: ValidateErrorCode,
    pub section: SectionId,
    pub owner: String,
    pub field: &'static str,
    pub identifier: String,
    pub message: String,
}

impl fmt::Display for ValidateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?}: {} (section={}, owner={}, field={})",
            self.code,
            self.message,
            self.section.label(),
            self.owner,
            self.field
        )
    }
}

impl std::error::Error for ValidateError {}

/// Identifier bookkeeping contract implemented by every data node. Counts,
/// renames, or deletes occurrences of `old_id` in the node's own tables and
/// in every owned child. References into other nodes are never followed, so
/// each occurrence is counted exactly once.
pub trait Element {
    fn process_identifier(&mut self, old_id: &str, new_id: Option<&str>) -> usize;
}

pub fn process_all<E: Element>(items: &mut [E], old_id: &str, new_id: Option<&str>) -> usize {
    items
        .iter_mut()
        .map(|item| item.process_identifier(old_id, new_id))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Leaf {
        hits: usize,
    }

    impl Element for Leaf {
        fn process_identifier(&mut self, _old_id: &str, _new_id: Option<&str>) -> usize {
            self.hits += 1;
            self.hits
        }
    }

    #[test]
    fn process_all_sums_over_items() {
        let mut items = vec![Leaf { hits: 0 }, Leaf { hits: 0 }, Leaf { hits: 4 }];

        assert_eq!(process_all(&mut items, "iron", None), 1 + 1 + 5);
    }

    #[test]
    fn validate_error_display_carries_context() {
        let error = ValidateError {
            code: ValidateErrorCode::UnresolvedVariable,
            section: SectionId::Entities,
            owner: "pikeman".to_string(),
            field: "attributes",
            identifier: "morale".to_string(),
            message: "attribute 'morale' does not resolve".to_string(),
        };

        let rendered = error.to_string();
        assert!(rendered.contains("UnresolvedVariable"));
        assert!(rendered.contains("section=entities"));
        assert!(rendered.contains("owner=pikeman"));
        assert!(rendered.contains("field=attributes"));
    }
}
