use chrono::{Days, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use dicom_core::header::Header;
use dicom_core::{DataElement, PrimitiveValue, VR};
use dicom_object::mem::InMemElement;
use dicom_object::InMemDicomObject;

use crate::identifiers::is_private_tag;
use crate::operators::errors::OperatorError;
use crate::operators::{is_empty_element, ApplyOperator, OperatorContext, Outcome};
use crate::time_shift::TimeShift;
use crate::vr;

/// What free text becomes after cleaning.
const CLEANED_MARKER: &str = "CLEANED";

// hyphenated and shortened forms are accepted on input even though only the
// first is DICOM compliant; output re-uses whatever format matched
const DATE_FORMATS: [&str; 2] = ["%Y%m%d", "%Y-%m-%d"];
const DATE_TIME_FORMATS: [&str; 2] = ["%Y%m%d%H%M%S", "%Y%m%d%H%M"];
const TIME_FORMATS: [&str; 2] = ["%H%M%S", "%H%M"];

/// Replaces values with ones of similar meaning that carry no identifying
/// information.
///
/// What that means depends on the element:
///
/// * private elements are kept when the safe private definition vouches for
///   them and removed otherwise
/// * dates and times are shifted back by the dataset's time delta, keeping
///   intervals within a study intact
/// * free text becomes a fixed marker value
/// * sequences pass through; their items are cleaned by the recursive walk
///
/// Anything else cannot be cleaned and raises an error rather than slipping
/// through unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct Clean;

impl ApplyOperator for Clean {
    fn apply(
        &self,
        ctx: &OperatorContext<'_>,
        dataset: &InMemDicomObject,
        elem: &InMemElement,
    ) -> Result<Outcome, OperatorError> {
        if is_private_tag(elem.tag()) {
            return if ctx.safe_private.is_safe(elem, dataset)? {
                Ok(Outcome::Keep)
            } else {
                Ok(Outcome::Remove)
            };
        }

        if elem.vr() == VR::SQ {
            return Ok(Outcome::Keep);
        }

        if is_empty_element(elem) {
            return Ok(Outcome::Keep);
        }

        if vr::is_date_like(elem.vr()) {
            let value = elem.value().to_str()?;
            let shift = ctx.time_shift.shift_for(dataset);
            let shifted = shift_date_like(elem.vr(), value.trim_end_matches(['\0', ' ']), shift)?;
            let new_elem = DataElement::new::<PrimitiveValue>(
                elem.tag(),
                elem.vr(),
                PrimitiveValue::from(shifted),
            );
            return Ok(Outcome::Replace(new_elem));
        }

        if vr::is_text_like(elem.vr()) {
            let new_elem = DataElement::new::<PrimitiveValue>(
                elem.tag(),
                elem.vr(),
                PrimitiveValue::from(CLEANED_MARKER),
            );
            return Ok(Outcome::Replace(new_elem));
        }

        Err(OperatorError::UnsupportedVr(elem.vr()))
    }
}

fn shift_date_like(vr: VR, value: &str, shift: TimeShift) -> Result<String, OperatorError> {
    match vr {
        VR::DA => shift_date(value, shift),
        VR::DT => shift_date_time(value, shift),
        VR::TM => shift_time(value, shift),
        other => Err(OperatorError::UnsupportedVr(other)),
    }
}

fn shift_date(value: &str, shift: TimeShift) -> Result<String, OperatorError> {
    let (date, remainder, format) = DATE_FORMATS
        .iter()
        .find_map(|&format| {
            NaiveDate::parse_and_remainder(value, format)
                .ok()
                .map(|(date, remainder)| (date, remainder, format))
        })
        .ok_or_else(|| unparsable("date", value))?;

    let new_date = date - Days::new(shift.days as u64);
    Ok(new_date.format(format).to_string() + remainder)
}

fn shift_date_time(value: &str, shift: TimeShift) -> Result<String, OperatorError> {
    let parsed = DATE_TIME_FORMATS.iter().find_map(|&format| {
        NaiveDateTime::parse_and_remainder(value, format)
            .ok()
            .map(|(date_time, remainder)| (date_time, remainder, format))
    });

    if let Some((date_time, remainder, format)) = parsed {
        let new_date_time = date_time - Duration::seconds(shift.total_seconds());
        return Ok(new_date_time.format(format).to_string() + remainder);
    }

    // a DT value may legally hold only a date part
    shift_date(value, shift).map_err(|_| unparsable("date-time", value))
}

fn shift_time(value: &str, shift: TimeShift) -> Result<String, OperatorError> {
    let (time, remainder, format) = TIME_FORMATS
        .iter()
        .find_map(|&format| {
            NaiveTime::parse_and_remainder(value, format)
                .ok()
                .map(|(time, remainder)| (time, remainder, format))
        })
        .ok_or_else(|| unparsable("time", value))?;

    // times wrap around midnight, only the seconds part of the shift applies
    let (new_time, _) = time.overflowing_sub_signed(Duration::seconds(shift.seconds));
    Ok(new_time.format(format).to_string() + remainder)
}

fn unparsable(kind: &str, value: &str) -> OperatorError {
    OperatorError::InvalidInput(format!("unable to parse {kind} from \"{value}\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::private::{SafePrivateBlock, SafePrivateDefinition};
    use crate::test_utils::{operator_context, ContextParts};
    use dicom_core::value::Value;
    use dicom_core::Tag;
    use dicom_dictionary_std::tags;

    fn shift(days: i64, seconds: i64) -> TimeShift {
        TimeShift { days, seconds }
    }

    #[test]
    fn test_shift_date() {
        assert_eq!(shift_date("20010102", shift(1, 0)).unwrap(), "20010101");
        assert_eq!(shift_date("2001-01-02", shift(1, 0)).unwrap(), "2001-01-01");
        assert_eq!(shift_date("20010102", shift(366, 0)).unwrap(), "20000101");
    }

    #[test]
    fn test_shift_date_unparsable() {
        assert!(shift_date("2001/01/02", shift(1, 0)).is_err());
        assert!(shift_date("tomorrow", shift(1, 0)).is_err());
    }

    #[test]
    fn test_shift_date_time() {
        assert_eq!(
            shift_date_time("20010102131110", shift(1, 70)).unwrap(),
            "20010101131000"
        );
        // date-only DT values shift by days alone
        assert_eq!(
            shift_date_time("20010102", shift(1, 70)).unwrap(),
            "20010101"
        );
    }

    #[test]
    fn test_shift_time_wraps_at_midnight() {
        assert_eq!(shift_time("000010", shift(0, 20)).unwrap(), "235950");
        assert_eq!(shift_time("131110", shift(0, 70)).unwrap(), "131000");
    }

    #[test]
    fn test_shift_preserves_fractional_remainder() {
        assert_eq!(
            shift_time("131110.123456", shift(0, 70)).unwrap(),
            "131000.123456"
        );
    }

    #[test]
    fn test_clean_date_element() {
        let parts = ContextParts::default();
        let ctx = operator_context(&parts);
        let mut dataset = InMemDicomObject::new_empty();
        dataset.put(InMemElement::new(
            tags::STUDY_INSTANCE_UID,
            VR::UI,
            PrimitiveValue::from("1.2.3"),
        ));
        let elem = InMemElement::new(tags::STUDY_DATE, VR::DA, PrimitiveValue::from("20010102"));

        match Clean.apply(&ctx, &dataset, &elem).unwrap() {
            Outcome::Replace(new_elem) => {
                let value = new_elem.to_str().unwrap();
                assert_eq!(value.len(), 8);
                assert_ne!(value, "20010102");
            }
            other => panic!("expected replacement, got {other:?}"),
        }
    }

    #[test]
    fn test_clean_dates_share_the_group_delta() {
        let parts = ContextParts::default();
        let ctx = operator_context(&parts);
        let mut dataset = InMemDicomObject::new_empty();
        dataset.put(InMemElement::new(
            tags::STUDY_INSTANCE_UID,
            VR::UI,
            PrimitiveValue::from("1.2.3"),
        ));

        let study = InMemElement::new(tags::STUDY_DATE, VR::DA, PrimitiveValue::from("20010110"));
        let birth = InMemElement::new(
            tags::PATIENT_BIRTH_DATE,
            VR::DA,
            PrimitiveValue::from("19630110"),
        );

        let study_shifted = match Clean.apply(&ctx, &dataset, &study).unwrap() {
            Outcome::Replace(e) => NaiveDate::parse_from_str(&e.to_str().unwrap(), "%Y%m%d").unwrap(),
            other => panic!("expected replacement, got {other:?}"),
        };
        let birth_shifted = match Clean.apply(&ctx, &dataset, &birth).unwrap() {
            Outcome::Replace(e) => NaiveDate::parse_from_str(&e.to_str().unwrap(), "%Y%m%d").unwrap(),
            other => panic!("expected replacement, got {other:?}"),
        };

        let original_gap = NaiveDate::from_ymd_opt(2001, 1, 10).unwrap()
            - NaiveDate::from_ymd_opt(1963, 1, 10).unwrap();
        assert_eq!(study_shifted - birth_shifted, original_gap);
    }

    #[test]
    fn test_clean_free_text() {
        let parts = ContextParts::default();
        let ctx = operator_context(&parts);
        let dataset = InMemDicomObject::new_empty();
        let elem = InMemElement::new(
            tags::STUDY_DESCRIPTION,
            VR::LO,
            PrimitiveValue::from("CT scan of John Doe"),
        );

        match Clean.apply(&ctx, &dataset, &elem).unwrap() {
            Outcome::Replace(new_elem) => {
                assert_eq!(new_elem.to_str().unwrap(), CLEANED_MARKER)
            }
            other => panic!("expected replacement, got {other:?}"),
        }
    }

    #[test]
    fn test_clean_sequence_passes_through() {
        let parts = ContextParts::default();
        let ctx = operator_context(&parts);
        let dataset = InMemDicomObject::new_empty();
        let elem = InMemElement::new(
            tags::REFERENCED_STUDY_SEQUENCE,
            VR::SQ,
            Value::Sequence(vec![InMemDicomObject::new_empty()].into()),
        );

        let outcome = Clean.apply(&ctx, &dataset, &elem).unwrap();
        assert_eq!(outcome, Outcome::Keep);
    }

    #[test]
    fn test_clean_unsupported_vr_is_an_error() {
        let parts = ContextParts::default();
        let ctx = operator_context(&parts);
        let dataset = InMemDicomObject::new_empty();
        let elem = InMemElement::new(
            tags::PIXEL_DATA,
            VR::OW,
            PrimitiveValue::U8(vec![0u8, 1, 2, 3].into()),
        );

        let result = Clean.apply(&ctx, &dataset, &elem);
        assert!(matches!(result, Err(OperatorError::UnsupportedVr(VR::OW))));
    }

    #[test]
    fn test_clean_unsafe_private_is_removed() {
        let parts = ContextParts::default();
        let ctx = operator_context(&parts);
        let dataset = InMemDicomObject::new_empty();
        let elem = InMemElement::new(
            Tag(0x0075, 0x1001),
            VR::LO,
            PrimitiveValue::from("serial 1234"),
        );

        let outcome = Clean.apply(&ctx, &dataset, &elem).unwrap();
        assert_eq!(outcome, Outcome::Remove);
    }

    #[test]
    fn test_clean_safe_private_is_kept() {
        let safe_private = SafePrivateDefinition::new(vec![SafePrivateBlock::new(
            vec!["0075,[MyCompany]01".parse().unwrap()],
            None,
            "physical measurements only",
        )]);
        let parts = ContextParts {
            safe_private,
            ..ContextParts::default()
        };
        let ctx = operator_context(&parts);

        let mut dataset = InMemDicomObject::new_empty();
        dataset.put(InMemElement::new(
            Tag(0x0075, 0x0010),
            VR::LO,
            PrimitiveValue::from("MyCompany"),
        ));
        let elem = InMemElement::new(
            Tag(0x0075, 0x1001),
            VR::LO,
            PrimitiveValue::from("exposure index"),
        );

        let outcome = Clean.apply(&ctx, &dataset, &elem).unwrap();
        assert_eq!(outcome, Outcome::Keep);
    }
}
