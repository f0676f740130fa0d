use dicom_object::mem::InMemElement;
use dicom_object::InMemDicomObject;

use crate::operators::errors::OperatorError;
use crate::operators::{ApplyOperator, OperatorContext, Outcome};

/// Signals that the element should be taken out of the dataset.
///
/// Removal is not performed here; operators only see one element. The core
/// stages the removal so it can run the private creator integrity pass over
/// the whole dataset first.
#[derive(Debug, Clone, PartialEq)]
pub struct Remove;

impl ApplyOperator for Remove {
    fn apply(
        &self,
        _ctx: &OperatorContext<'_>,
        _dataset: &InMemDicomObject,
        _elem: &InMemElement,
    ) -> Result<Outcome, OperatorError> {
        Ok(Outcome::Remove)
    }
}
