//! Before/after change signatures, used to verify that a configuration
//! does to a dataset what its policy says it should.

use std::fmt;

use dicom_core::header::Header;
use dicom_core::value::Value;
use dicom_core::{PrimitiveValue, Tag};
use dicom_object::mem::InMemElement;
use dicom_object::DefaultDicomObject;

use crate::core::{Core, DeidentificationError};
use crate::identifiers::TagIdentifier;

/// How an element changed during de-identification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaStatus {
    Unchanged,
    Changed,
    Removed,
    Emptied,
    Created,
}

impl fmt::Display for DeltaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeltaStatus::Unchanged => "Unchanged",
            DeltaStatus::Changed => "Changed",
            DeltaStatus::Removed => "Removed",
            DeltaStatus::Emptied => "Emptied",
            DeltaStatus::Created => "Created",
        };
        write!(f, "{name}")
    }
}

/// The change in one element's value after de-identification.
#[derive(Debug, Clone, PartialEq)]
pub struct Delta {
    pub tag: Tag,
    pub before: Option<InMemElement>,
    pub after: Option<InMemElement>,
}

impl Delta {
    pub fn new(tag: Tag, before: Option<InMemElement>, after: Option<InMemElement>) -> Self {
        Self { tag, before, after }
    }

    pub fn status(&self) -> DeltaStatus {
        match (&self.before, &self.after) {
            (None, Some(_)) => DeltaStatus::Created,
            (Some(_), None) => DeltaStatus::Removed,
            (Some(before), Some(after)) if before.value() == after.value() => {
                DeltaStatus::Unchanged
            }
            (Some(_), Some(after)) if is_empty(after) => DeltaStatus::Emptied,
            (Some(_), Some(_)) => DeltaStatus::Changed,
            (None, None) => DeltaStatus::Unchanged,
        }
    }

    pub fn has_changed(&self) -> bool {
        self.status() != DeltaStatus::Unchanged
    }

    /// Full human-readable description of the change that happened.
    pub fn full_description(&self) -> String {
        let render = |elem: &Option<InMemElement>| match elem {
            Some(elem) => elem.to_str().map(|v| v.to_string()).unwrap_or_else(|_| "<binary>".into()),
            None => "<absent>".into(),
        };
        format!(
            "{} - {} - {}: {} -> {}",
            self.tag,
            TagIdentifier::Single(self.tag).name(),
            self.status(),
            render(&self.before),
            render(&self.after),
        )
    }
}

impl fmt::Display for Delta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.tag, self.status())
    }
}

fn is_empty(elem: &InMemElement) -> bool {
    elem.value() == &Value::Primitive(PrimitiveValue::Empty)
}

/// Runs `deidentify` on a copy of the dataset and records what happened to
/// every element: one [`Delta`] per element of the original, plus a
/// `Created` delta for every element present only afterwards.
///
/// The caller's dataset is never mutated. Only top-level elements are
/// compared; nested changes surface as a `Changed` sequence element.
pub fn extract_signature(
    core: &Core,
    obj: &DefaultDicomObject,
) -> Result<Vec<Delta>, DeidentificationError> {
    let after = core.deidentify(obj.clone())?;

    let mut deltas = Vec::new();
    for elem in obj.iter() {
        let tag = elem.tag();
        let after_elem = after.element(tag).ok().cloned();
        deltas.push(Delta::new(tag, Some(elem.clone()), after_elem));
    }

    for elem in after.iter() {
        if obj.element(elem.tag()).is_err() {
            deltas.push(Delta::new(elem.tag(), None, Some(elem.clone())));
        }
    }

    Ok(deltas)
}
