use dicom_core::header::Header;
use dicom_core::{DataElement, PrimitiveValue};
use dicom_object::mem::InMemElement;
use dicom_object::InMemDicomObject;

use crate::hashing::{Blake3Hasher, Hasher};
use crate::operators::errors::OperatorError;
use crate::operators::{is_empty_element, ApplyOperator, OperatorContext, Outcome};

const UID_MAX_LENGTH: usize = 64;

/// Replaces a UID with a digest of it, re-encoded as a valid UID.
///
/// The new UID is the configured UID root followed by the decimal digest of
/// the old value, truncated to the 64 characters the UI representation
/// allows. A digest starting with `0` gets a `9` prepended, since no UID
/// component may have a leading zero. Equal input UIDs map to equal output
/// UIDs on every invocation, so cross-references between elements survive.
#[derive(Debug, Clone, PartialEq)]
pub struct HashUid;

impl ApplyOperator for HashUid {
    fn apply(
        &self,
        ctx: &OperatorContext<'_>,
        _dataset: &InMemDicomObject,
        elem: &InMemElement,
    ) -> Result<Outcome, OperatorError> {
        if is_empty_element(elem) {
            return Ok(Outcome::Keep);
        }

        let hasher = Blake3Hasher::new();
        let value = elem.value().to_str()?;
        let hashed = hasher.hash(value.trim_end_matches(['\0', ' ']))?;
        let extra = if hashed.starts_with('0') { "9" } else { "" };
        let mut new_uid = format!("{}{}{}", ctx.uid_root.as_prefix(), extra, hashed);
        new_uid.truncate(UID_MAX_LENGTH);

        let new_elem = DataElement::new::<PrimitiveValue>(
            elem.tag(),
            elem.vr(),
            PrimitiveValue::from(new_uid),
        );
        Ok(Outcome::Replace(new_elem))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UidRoot;
    use crate::test_utils::{operator_context, ContextParts};
    use dicom_core::VR;
    use dicom_dictionary_std::tags;

    fn uid_element(value: &str) -> InMemElement {
        InMemElement::new(tags::STUDY_INSTANCE_UID, VR::UI, PrimitiveValue::from(value))
    }

    fn apply_with_root(root: &str, elem: &InMemElement) -> String {
        let parts = ContextParts {
            uid_root: root.parse::<UidRoot>().unwrap(),
            ..ContextParts::default()
        };
        let ctx = operator_context(&parts);
        let dataset = InMemDicomObject::new_empty();
        match HashUid.apply(&ctx, &dataset, elem).unwrap() {
            Outcome::Replace(new_elem) => new_elem.to_str().unwrap().to_string(),
            other => panic!("expected replacement, got {other:?}"),
        }
    }

    #[test]
    fn test_no_root() {
        let result = apply_with_root("", &uid_element("1.2.3.4.5"));
        assert_eq!(result.len(), 64);
        assert!(!result.contains('.'));
    }

    #[test]
    fn test_with_root() {
        let result = apply_with_root("2.16.840", &uid_element("1.2.3.4.5"));
        assert_eq!(result.len(), 64);
        assert!(result.starts_with("2.16.840."));
    }

    #[test]
    fn test_stable_across_invocations() {
        let elem = uid_element("1.2.3.4.5");
        assert_eq!(
            apply_with_root("9999", &elem),
            apply_with_root("9999", &elem)
        );
    }

    #[test]
    fn test_distinct_inputs_distinct_outputs() {
        assert_ne!(
            apply_with_root("9999", &uid_element("1.2.3.4.5")),
            apply_with_root("9999", &uid_element("1.2.3.4.6"))
        );
    }

    #[test]
    fn test_empty_element_kept() {
        let parts = ContextParts::default();
        let ctx = operator_context(&parts);
        let dataset = InMemDicomObject::new_empty();
        let elem = InMemElement::new(
            tags::STUDY_INSTANCE_UID,
            VR::UI,
            dicom_core::value::Value::Primitive(PrimitiveValue::Empty),
        );
        let outcome = HashUid.apply(&ctx, &dataset, &elem).unwrap();
        assert_eq!(outcome, Outcome::Keep);
    }
}
