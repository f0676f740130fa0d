use dicom_core::header::Header;
use dicom_core::{DataElement, PrimitiveValue, VR};
use dicom_object::mem::InMemElement;
use dicom_object::InMemDicomObject;

use crate::operators::errors::OperatorError;
use crate::operators::{ApplyOperator, OperatorContext, Outcome};

/// Substitutes a synthetic dummy value consistent with the element's VR.
///
/// No stability is guaranteed across elements or runs; use `Hash` or
/// `HashUid` where cross-references must survive.
#[derive(Debug, Clone, PartialEq)]
pub struct Replace;

fn dummy_value(vr: VR) -> PrimitiveValue {
    match vr {
        VR::DA => PrimitiveValue::from("19000101"),
        VR::DT => PrimitiveValue::from("19000101000000"),
        VR::TM => PrimitiveValue::from("000000"),
        VR::PN => PrimitiveValue::from("Anonymized^Person"),
        VR::UI => PrimitiveValue::from("2.25.0"),
        VR::AS => PrimitiveValue::from("000Y"),
        VR::DS | VR::IS => PrimitiveValue::from("0"),
        VR::FL => PrimitiveValue::from(0f32),
        VR::FD => PrimitiveValue::from(0f64),
        VR::SL | VR::SS | VR::UL | VR::US => PrimitiveValue::from(0),
        vr if crate::vr::is_text_like(vr) => PrimitiveValue::from("ANONYMIZED"),
        _ => PrimitiveValue::Empty,
    }
}

impl ApplyOperator for Replace {
    fn apply(
        &self,
        _ctx: &OperatorContext<'_>,
        _dataset: &InMemDicomObject,
        elem: &InMemElement,
    ) -> Result<Outcome, OperatorError> {
        let new_elem =
            DataElement::new::<PrimitiveValue>(elem.tag(), elem.vr(), dummy_value(elem.vr()));
        Ok(Outcome::Replace(new_elem))
    }
}
