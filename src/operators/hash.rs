use dicom_core::header::Header;
use dicom_core::{DataElement, PrimitiveValue};
use dicom_object::mem::InMemElement;
use dicom_object::InMemDicomObject;
use thiserror::Error;

use crate::hashing::{Blake3Hasher, Hasher};
use crate::operators::errors::OperatorError;
use crate::operators::{is_empty_element, ApplyOperator, OperatorContext, Outcome};
use crate::vr;

const HASH_LENGTH_MINIMUM: usize = 8;

#[derive(Error, Debug, Clone, Eq, PartialEq)]
#[error("hash length must be at least {HASH_LENGTH_MINIMUM}, got {0}")]
pub struct HashLengthError(pub(crate) usize);

/// The number of characters a hashed value should be truncated to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HashLength(pub(crate) usize);

impl HashLength {
    pub fn new(length: usize) -> Result<Self, HashLengthError> {
        if length < HASH_LENGTH_MINIMUM {
            return Err(HashLengthError(length));
        }
        Ok(HashLength(length))
    }
}

impl TryFrom<usize> for HashLength {
    type Error = HashLengthError;

    fn try_from(value: usize) -> Result<Self, HashLengthError> {
        HashLength::new(value)
    }
}

/// Replaces the element value with a deterministic digest of it.
///
/// Same input value, same output, with no external state involved. The
/// digest is truncated to the configured length and, independently, to the
/// maximum length the element's VR allows.
#[derive(Debug, Clone, PartialEq)]
pub struct Hash {
    length: Option<HashLength>,
}

impl Hash {
    pub fn new(length: Option<HashLength>) -> Self {
        Self { length }
    }

    fn effective_length(&self, elem: &InMemElement) -> Option<usize> {
        let max_length = vr::max_length(elem.vr());
        match (self.length, max_length) {
            (Some(HashLength(wanted)), Some(max)) => Some(wanted.min(max)),
            (Some(HashLength(wanted)), None) => Some(wanted),
            (None, max) => max,
        }
    }
}

impl ApplyOperator for Hash {
    fn apply(
        &self,
        _ctx: &OperatorContext<'_>,
        _dataset: &InMemDicomObject,
        elem: &InMemElement,
    ) -> Result<Outcome, OperatorError> {
        if is_empty_element(elem) {
            return Ok(Outcome::Keep);
        }

        let hasher = Blake3Hasher::new();
        let value = elem.value().to_str()?;
        let mut hashed = hasher.hash(&value)?;
        if let Some(length) = self.effective_length(elem) {
            hashed.truncate(length);
        }

        let new_elem =
            DataElement::new::<PrimitiveValue>(elem.tag(), elem.vr(), PrimitiveValue::from(hashed));
        Ok(Outcome::Replace(new_elem))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{operator_context, ContextParts};
    use dicom_core::VR;
    use dicom_dictionary_std::tags;

    fn accession_number(value: &str) -> InMemElement {
        InMemElement::new(tags::ACCESSION_NUMBER, VR::SH, PrimitiveValue::from(value))
    }

    fn apply(hash: &Hash, elem: &InMemElement) -> Outcome {
        let parts = ContextParts::default();
        let ctx = operator_context(&parts);
        let dataset = InMemDicomObject::new_empty();
        hash.apply(&ctx, &dataset, elem).unwrap()
    }

    #[test]
    fn test_hash_length_bounds() {
        assert!(HashLength::new(8).is_ok());
        assert!(HashLength::new(9).is_ok());
        assert!(HashLength::new(7).is_err());
    }

    #[test]
    fn test_truncated_to_vr_max_length() {
        // SH allows 16 characters at most
        let outcome = apply(&Hash::new(None), &accession_number("0123456789ABCDEF"));
        match outcome {
            Outcome::Replace(elem) => assert_eq!(elem.to_str().unwrap().len(), 16),
            other => panic!("expected replacement, got {other:?}"),
        }
    }

    #[test]
    fn test_configured_length_respected() {
        let outcome = apply(
            &Hash::new(Some(HashLength(10))),
            &accession_number("0123456789ABCDEF"),
        );
        match outcome {
            Outcome::Replace(elem) => assert_eq!(elem.to_str().unwrap().len(), 10),
            other => panic!("expected replacement, got {other:?}"),
        }
    }

    #[test]
    fn test_configured_length_capped_at_vr_max() {
        let outcome = apply(
            &Hash::new(Some(HashLength(32))),
            &accession_number("0123456789ABCDEF"),
        );
        match outcome {
            Outcome::Replace(elem) => assert_eq!(elem.to_str().unwrap().len(), 16),
            other => panic!("expected replacement, got {other:?}"),
        }
    }

    #[test]
    fn test_stable_and_distinct() {
        let first = apply(&Hash::new(None), &accession_number("A"));
        let again = apply(&Hash::new(None), &accession_number("A"));
        let other = apply(&Hash::new(None), &accession_number("B"));
        assert_eq!(first, again);
        assert_ne!(first, other);
    }

    #[test]
    fn test_empty_element_kept() {
        let elem = InMemElement::new(
            tags::ACCESSION_NUMBER,
            VR::SH,
            dicom_core::value::Value::Primitive(PrimitiveValue::Empty),
        );
        let outcome = apply(&Hash::new(None), &elem);
        assert_eq!(outcome, Outcome::Keep);
    }
}
