//! # Matcher
//!
//! Intersects image sets across `key=value` constraints.
//!
//! A constraint selects the node `key.value`, where `key` is fully schema
//! qualified (`io.archspec.cpu.target=x86_64` selects
//! `io.archspec.cpu.target.x86_64`). No traversal happens: each constraint is
//! one lookup in the node side of the [`ImageIndex`].
//!
//! Constraints are processed in input order and the first failure aborts the
//! whole match. An empty constraint list matches every indexed image.

use crate::index::ImageIndex;
use crate::primitives::{ASSIGNMENT, MAX_CONSTRAINTS};
use crate::{CompspecError, ImageRef, NodeId};
use std::collections::BTreeSet;

/// A parsed `key=value` constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constraint {
    pub key: String,
    pub value: String,
}

impl Constraint {
    /// Parse `key=value`, splitting on the first `=`.
    ///
    /// The value may itself contain `=`. A missing `=` or an empty key is
    /// malformed.
    pub fn parse(raw: &str) -> Result<Self, CompspecError> {
        let (key, value) = raw
            .split_once(ASSIGNMENT)
            .ok_or_else(|| CompspecError::MalformedConstraint(raw.to_string()))?;

        if key.is_empty() {
            return Err(CompspecError::MalformedConstraint(raw.to_string()));
        }

        Ok(Self {
            key: key.to_string(),
            value: value.to_string(),
        })
    }

    /// The graph node this constraint selects.
    #[must_use]
    pub fn node_id(&self) -> NodeId {
        NodeId::new(self.key.as_str()).child(&self.value)
    }
}

/// Parse every constraint up front so a malformed one aborts before any lookup.
pub fn parse_constraints<S: AsRef<str>>(raw: &[S]) -> Result<Vec<Constraint>, CompspecError> {
    if raw.len() > MAX_CONSTRAINTS {
        return Err(CompspecError::Config(format!(
            "{} constraints exceed the maximum of {}",
            raw.len(),
            MAX_CONSTRAINTS
        )));
    }
    raw.iter().map(|c| Constraint::parse(c.as_ref())).collect()
}

/// Find the images satisfying all constraints.
pub fn match_images<S: AsRef<str>>(
    index: &ImageIndex,
    raw: &[S],
) -> Result<BTreeSet<ImageRef>, CompspecError> {
    let constraints = parse_constraints(raw)?;

    if constraints.is_empty() {
        return Ok(index.images().cloned().collect());
    }

    let mut matches: Option<BTreeSet<ImageRef>> = None;

    for (constraint, raw) in constraints.iter().zip(raw) {
        let field = raw.as_ref();
        let images = index
            .images_for(&constraint.node_id())
            .filter(|images| !images.is_empty())
            .ok_or_else(|| CompspecError::UnknownField(field.to_string()))?;

        let next = match matches {
            None => images.clone(),
            Some(current) => current.intersection(images).cloned().collect(),
        };

        if next.is_empty() {
            return Err(CompspecError::UnsatisfiableConstraints(field.to_string()));
        }
        matches = Some(next);
    }

    Ok(matches.unwrap_or_default())
}

// =============================================================================
// TESTS
// =============================================================================
