//! Operators transform or remove one DICOM element.
//!
//! Each operator is a small struct implementing [`ApplyOperator`]; the
//! [`Operator`] enum is the closed, serializable set of them. Removal is a
//! distinct [`Outcome`] variant rather than an in-place edit, so the core
//! can special-case it (private creator integrity) with an exhaustive match
//! instead of runtime type checks.

mod clean;
mod empty;
pub(crate) mod errors;
pub mod hash;
mod hash_uid;
mod keep;
mod remove;
mod replace;
mod set_value;

use std::fmt;

use dicom_object::mem::InMemElement;
use dicom_object::InMemDicomObject;
use garde::Validate;
use serde::{Deserialize, Serialize};

use crate::config::UidRoot;
use crate::private::SafePrivateDefinition;
use crate::time_shift::TimeDeltaProvider;

use clean::Clean;
use empty::Empty;
pub use errors::OperatorError;
use hash::{Hash, HashLength};
use hash_uid::HashUid;
use keep::Keep;
use remove::Remove;
use replace::Replace;
use set_value::SetFixedValue;

/// Shared context operators may consult. Operators never mutate it.
pub struct OperatorContext<'a> {
    pub uid_root: &'a UidRoot,
    pub safe_private: &'a SafePrivateDefinition,
    pub time_shift: &'a TimeDeltaProvider,
}

/// What should happen to the element an operator was applied to.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Leave the element in place, unchanged.
    Keep,
    /// Put this element in its place.
    Replace(InMemElement),
    /// Take the element out of the dataset.
    Remove,
}

pub(crate) trait ApplyOperator {
    fn apply(
        &self,
        ctx: &OperatorContext<'_>,
        dataset: &InMemDicomObject,
        elem: &InMemElement,
    ) -> Result<Outcome, OperatorError>;
}

/// The de-identification action to perform on a matched DICOM element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(tag = "operator", rename_all = "snake_case")]
pub enum Operator {
    /// Preserve the element value without modification.
    Keep,

    /// Completely remove the element from the dataset.
    Remove,

    /// Clear the value, preserving tag and VR.
    Empty,

    /// Substitute a synthetic dummy value consistent with the VR.
    Replace,

    /// Replace the value with a one-way digest of it, optionally truncated.
    Hash {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        #[garde(inner(range(min = 8)))]
        length: Option<usize>,
    },

    /// Replace a UID with a digest re-encoded as a valid UID.
    HashUid,

    /// Type-directed cleaning: shift dates, blank free text, consult the
    /// safe private definition for private elements.
    Clean,

    /// Unconditionally set the value to the given string.
    SetFixedValue {
        #[garde(length(min = 1))]
        value: String,
    },
}

impl Operator {
    /// Applies this operator to one element.
    ///
    /// `dataset` is the dataset the element came from; it is context only
    /// and is never altered here.
    pub fn apply(
        &self,
        ctx: &OperatorContext<'_>,
        dataset: &InMemDicomObject,
        elem: &InMemElement,
    ) -> Result<Outcome, OperatorError> {
        match self {
            Operator::Keep => Keep.apply(ctx, dataset, elem),
            Operator::Remove => Remove.apply(ctx, dataset, elem),
            Operator::Empty => Empty.apply(ctx, dataset, elem),
            Operator::Replace => Replace.apply(ctx, dataset, elem),
            Operator::Hash { length } => {
                let length = (*length).map(HashLength::new).transpose()?;
                Hash::new(length).apply(ctx, dataset, elem)
            }
            Operator::HashUid => HashUid.apply(ctx, dataset, elem),
            Operator::Clean => Clean.apply(ctx, dataset, elem),
            Operator::SetFixedValue { value } => {
                SetFixedValue::new(value.clone()).apply(ctx, dataset, elem)
            }
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operator::Keep => "Keep",
            Operator::Remove => "Remove",
            Operator::Empty => "Empty",
            Operator::Replace => "Replace",
            Operator::Hash { .. } => "Hash",
            Operator::HashUid => "HashUID",
            Operator::Clean => "Clean",
            Operator::SetFixedValue { .. } => "SetFixedValue",
        };
        write!(f, "{name}")
    }
}

pub(crate) fn is_empty_element(elem: &InMemElement) -> bool {
    use dicom_core::{PrimitiveValue, value::Value};
    elem.value() == &Value::Primitive(PrimitiveValue::Empty)
}
