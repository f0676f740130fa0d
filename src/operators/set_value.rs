use dicom_core::header::Header;
use dicom_core::{DataElement, PrimitiveValue};
use dicom_object::mem::InMemElement;
use dicom_object::InMemDicomObject;

use crate::operators::errors::OperatorError;
use crate::operators::{ApplyOperator, OperatorContext, Outcome};

/// Unconditionally sets the element value to a fixed string.
#[derive(Debug, Clone, PartialEq)]
pub struct SetFixedValue {
    value: String,
}

impl SetFixedValue {
    pub fn new(value: String) -> Self {
        Self { value }
    }
}

impl ApplyOperator for SetFixedValue {
    fn apply(
        &self,
        _ctx: &OperatorContext<'_>,
        _dataset: &InMemDicomObject,
        elem: &InMemElement,
    ) -> Result<Outcome, OperatorError> {
        let new_elem = DataElement::new::<PrimitiveValue>(
            elem.tag(),
            elem.vr(),
            PrimitiveValue::from(self.value.clone()),
        );
        Ok(Outcome::Replace(new_elem))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{operator_context, ContextParts};
    use dicom_core::VR;
    use dicom_dictionary_std::tags;

    #[test]
    fn test_apply() {
        let parts = ContextParts::default();
        let ctx = operator_context(&parts);
        let dataset = InMemDicomObject::new_empty();
        let elem = InMemElement::new(
            tags::DEIDENTIFICATION_METHOD,
            VR::LO,
            PrimitiveValue::from("previous"),
        );

        let action = SetFixedValue::new("MYAPP".into());
        match action.apply(&ctx, &dataset, &elem).unwrap() {
            Outcome::Replace(new_elem) => {
                assert_eq!(new_elem.vr(), VR::LO);
                assert_eq!(new_elem.to_str().unwrap(), "MYAPP");
            }
            other => panic!("expected replacement, got {other:?}"),
        }
    }
}
