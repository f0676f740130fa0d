use dicom_object::mem::InMemElement;
use dicom_object::InMemDicomObject;

use crate::operators::errors::OperatorError;
use crate::operators::{ApplyOperator, OperatorContext, Outcome};

/// Leaves the element untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct Keep;

impl ApplyOperator for Keep {
    fn apply(
        &self,
        _ctx: &OperatorContext<'_>,
        _dataset: &InMemDicomObject,
        _elem: &InMemElement,
    ) -> Result<Outcome, OperatorError> {
        Ok(Outcome::Keep)
    }
}
