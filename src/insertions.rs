//! Elements commonly inserted into de-identified datasets.
//!
//! DICOM PS3.15 E.1-1.6: PatientIdentityRemoved (0012,0062) shall be set to
//! YES, and a description of the method used may be placed in
//! DeidentificationMethod (0012,0063).

use dicom_core::{DataElement, PrimitiveValue, VR};
use dicom_dictionary_std::tags;
use dicom_object::mem::InMemElement;

/// `(0012,0062) PatientIdentityRemoved = YES`.
pub fn patient_identity_removed() -> InMemElement {
    DataElement::new::<PrimitiveValue>(
        tags::PATIENT_IDENTITY_REMOVED,
        VR::CS,
        PrimitiveValue::from("YES"),
    )
}

/// `(0012,0063) DeidentificationMethod` with the given description.
pub fn deidentification_method(method: &str) -> InMemElement {
    DataElement::new::<PrimitiveValue>(
        tags::DEIDENTIFICATION_METHOD,
        VR::LO,
        PrimitiveValue::from(method),
    )
}

/// Default method description: this crate's name and version.
pub fn default_method() -> String {
    concat!("dicom-deidentify ", env!("CARGO_PKG_VERSION")).to_string()
}
