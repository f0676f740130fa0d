use dicom_core::header::Header;
use dicom_core::{DataElement, PrimitiveValue};
use dicom_object::mem::InMemElement;
use dicom_object::InMemDicomObject;

use crate::operators::errors::OperatorError;
use crate::operators::{ApplyOperator, OperatorContext, Outcome};

/// Clears the element value, preserving tag and VR.
#[derive(Debug, Clone, PartialEq)]
pub struct Empty;

impl ApplyOperator for Empty {
    fn apply(
        &self,
        _ctx: &OperatorContext<'_>,
        _dataset: &InMemDicomObject,
        elem: &InMemElement,
    ) -> Result<Outcome, OperatorError> {
        let new_elem =
            DataElement::new::<PrimitiveValue>(elem.tag(), elem.vr(), PrimitiveValue::Empty);
        Ok(Outcome::Replace(new_elem))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{operator_context, ContextParts};
    use dicom_core::value::Value;
    use dicom_core::VR;
    use dicom_dictionary_std::tags;

    #[test]
    fn test_apply() {
        let parts = ContextParts::default();
        let ctx = operator_context(&parts);
        let dataset = InMemDicomObject::new_empty();
        let elem = InMemElement::new(tags::PATIENT_NAME, VR::PN, PrimitiveValue::from("John Doe"));

        let outcome = Empty.apply(&ctx, &dataset, &elem).unwrap();
        match outcome {
            Outcome::Replace(new_elem) => {
                assert_eq!(new_elem.tag(), tags::PATIENT_NAME);
                assert_eq!(new_elem.vr(), VR::PN);
                assert_eq!(new_elem.value(), &Value::Primitive(PrimitiveValue::Empty));
            }
            other => panic!("expected replacement, got {other:?}"),
        }
    }

    #[test]
    fn test_idempotent() {
        let parts = ContextParts::default();
        let ctx = operator_context(&parts);
        let dataset = InMemDicomObject::new_empty();
        let elem = InMemElement::new(tags::PATIENT_NAME, VR::PN, PrimitiveValue::from("John Doe"));

        let first = match Empty.apply(&ctx, &dataset, &elem).unwrap() {
            Outcome::Replace(e) => e,
            other => panic!("expected replacement, got {other:?}"),
        };
        let second = match Empty.apply(&ctx, &dataset, &first).unwrap() {
            Outcome::Replace(e) => e,
            other => panic!("expected replacement, got {other:?}"),
        };
        assert_eq!(first, second);
    }
}
