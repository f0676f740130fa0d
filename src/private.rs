//! Deciding whether a private DICOM element is safe to keep.
//!
//! "Tag -> operator" rules cannot answer this on their own: whether a
//! vendor's private element is harmless often depends on the rest of the
//! dataset, for example on modality or manufacturer. A
//! [`SafePrivateDefinition`] holds blocks of known-safe private elements,
//! each optionally guarded by a predicate over the whole dataset.

use std::fmt;
use std::sync::Arc;

use dicom_core::header::Header;
use dicom_object::mem::InMemElement;
use dicom_object::InMemDicomObject;
use thiserror::Error;

use crate::identifiers::PrivateBlockTag;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SafePrivateError {
    #[error("cannot evaluate safe private criterion: {}", .0.to_lowercase())]
    Criterion(String),
}

/// Raised by a criterion when it cannot give a true-or-false answer, for
/// example because an element it needs is absent. Never treated as "safe".
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct CriterionError(pub String);

pub type Criterion = Arc<dyn Fn(&InMemDicomObject) -> Result<bool, CriterionError> + Send + Sync>;

/// One or more private elements that are safe under the same condition.
#[derive(Clone)]
pub struct SafePrivateBlock {
    tags: Vec<PrivateBlockTag>,
    criterion: Option<Criterion>,
    comment: String,
}

impl SafePrivateBlock {
    /// `comment` should say why these elements are safe, or in which domain
    /// they are (only this hospital, only these machines).
    pub fn new(
        tags: Vec<PrivateBlockTag>,
        criterion: Option<Criterion>,
        comment: impl Into<String>,
    ) -> Self {
        Self {
            tags,
            criterion,
            comment: comment.into(),
        }
    }

    pub fn comment(&self) -> &str {
        &self.comment
    }

    /// True if any of this block's tags designates the given element.
    fn contains(&self, elem: &InMemElement, dataset: &InMemDicomObject) -> bool {
        self.tags.iter().any(|tag| tag.matches(elem.tag(), dataset))
    }

    /// True if this block's elements are safe to keep in the given dataset.
    fn tags_are_safe(&self, dataset: &InMemDicomObject) -> Result<bool, CriterionError> {
        match &self.criterion {
            Some(criterion) => criterion(dataset),
            // no criterion, the listed tags are safe in any dataset
            None => Ok(true),
        }
    }
}

impl fmt::Debug for SafePrivateBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SafePrivateBlock")
            .field("tags", &self.tags)
            .field("criterion", &self.criterion.as_ref().map(|_| "<criterion>"))
            .field("comment", &self.comment)
            .finish()
    }
}

/// Holds all information on which private elements can be considered safe.
#[derive(Debug, Clone, Default)]
pub struct SafePrivateDefinition {
    blocks: Vec<SafePrivateBlock>,
}

impl SafePrivateDefinition {
    pub fn new(blocks: Vec<SafePrivateBlock>) -> Self {
        Self { blocks }
    }

    /// A definition that considers no private element safe.
    pub fn empty() -> Self {
        Self { blocks: Vec::new() }
    }

    /// True if the given private element is safe to keep in this dataset.
    ///
    /// A criterion that cannot be evaluated surfaces as an error, distinct
    /// from `Ok(false)`; the caller decides how to fail, but never treats
    /// the element as safe.
    pub fn is_safe(
        &self,
        elem: &InMemElement,
        dataset: &InMemDicomObject,
    ) -> Result<bool, SafePrivateError> {
        for block in &self.blocks {
            if !block.contains(elem, dataset) {
                continue;
            }
            let safe = block
                .tags_are_safe(dataset)
                .map_err(|e| SafePrivateError::Criterion(e.0))?;
            if safe {
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dicom_core::{PrimitiveValue, Tag, VR};
    use dicom_dictionary_std::tags;

    fn block_tag(s: &str) -> PrivateBlockTag {
        s.parse().unwrap()
    }

    fn dataset_with_private(modality: Option<&str>) -> InMemDicomObject {
        let mut dataset = InMemDicomObject::new_empty();
        dataset.put(InMemElement::new(
            Tag(0x0075, 0x0010),
            VR::LO,
            PrimitiveValue::from("MyCompany"),
        ));
        dataset.put(InMemElement::new(
            Tag(0x0075, 0x1001),
            VR::LO,
            PrimitiveValue::from("exposure index"),
        ));
        if let Some(modality) = modality {
            dataset.put(InMemElement::new(
                tags::MODALITY,
                VR::CS,
                PrimitiveValue::from(modality),
            ));
        }
        dataset
    }

    fn modality_is_ct() -> Criterion {
        Arc::new(|dataset: &InMemDicomObject| {
            let modality = dataset
                .element(tags::MODALITY)
                .map_err(|_| CriterionError("modality not present".into()))?;
            let value = modality
                .to_str()
                .map_err(|e| CriterionError(e.to_string()))?;
            Ok(value.trim() == "CT")
        })
    }

    #[test]
    fn test_listed_tag_without_criterion_is_safe() {
        let definition = SafePrivateDefinition::new(vec![SafePrivateBlock::new(
            vec![block_tag("0075,[MyCompany]01")],
            None,
            "contains only physical measurements",
        )]);
        let dataset = dataset_with_private(None);
        let elem = dataset.element(Tag(0x0075, 0x1001)).unwrap();
        assert!(definition.is_safe(elem, &dataset).unwrap());
    }

    #[test]
    fn test_unlisted_tag_is_unsafe() {
        let definition = SafePrivateDefinition::new(vec![SafePrivateBlock::new(
            vec![block_tag("0075,[MyCompany]02")],
            None,
            "",
        )]);
        let dataset = dataset_with_private(None);
        let elem = dataset.element(Tag(0x0075, 0x1001)).unwrap();
        assert!(!definition.is_safe(elem, &dataset).unwrap());
    }

    #[test]
    fn test_criterion_gates_safety() {
        let definition = SafePrivateDefinition::new(vec![SafePrivateBlock::new(
            vec![block_tag("0075,[MyCompany]01")],
            Some(modality_is_ct()),
            "safe on CT only",
        )]);

        let ct = dataset_with_private(Some("CT"));
        let elem = ct.element(Tag(0x0075, 0x1001)).unwrap();
        assert!(definition.is_safe(elem, &ct).unwrap());

        let us = dataset_with_private(Some("US"));
        let elem = us.element(Tag(0x0075, 0x1001)).unwrap();
        assert!(!definition.is_safe(elem, &us).unwrap());
    }

    #[test]
    fn test_criterion_failure_is_an_error_not_false() {
        let definition = SafePrivateDefinition::new(vec![SafePrivateBlock::new(
            vec![block_tag("0075,[MyCompany]01")],
            Some(modality_is_ct()),
            "safe on CT only",
        )]);

        // modality missing: the criterion cannot answer
        let dataset = dataset_with_private(None);
        let elem = dataset.element(Tag(0x0075, 0x1001)).unwrap();
        let result = definition.is_safe(elem, &dataset);
        assert!(matches!(result, Err(SafePrivateError::Criterion(_))));
    }

    #[test]
    fn test_empty_definition_keeps_nothing() {
        let definition = SafePrivateDefinition::empty();
        let dataset = dataset_with_private(None);
        let elem = dataset.element(Tag(0x0075, 0x1001)).unwrap();
        assert!(!definition.is_safe(elem, &dataset).unwrap());
    }
}
