//! Per-study random time shifting for the clean operator.
//!
//! Dates and times are not blanked but moved back by a random delta, so
//! relative timing within one study stays intact while absolute dates are
//! lost. The delta is drawn once per grouping key and cached, which keeps
//! every date in a study consistent within one run.

use std::collections::HashMap;
use std::sync::Mutex;

use dicom_core::Tag;
use dicom_dictionary_std::tags;
use dicom_object::InMemDicomObject;
use rand::Rng;

const MAX_SHIFT_DAYS: i64 = 5 * 365;
const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

/// A backwards shift applied to date and time values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeShift {
    pub days: i64,
    pub seconds: i64,
}

impl TimeShift {
    pub fn total_seconds(&self) -> i64 {
        self.days * SECONDS_PER_DAY + self.seconds
    }
}

/// Draws and caches one random [`TimeShift`] per grouping key.
///
/// The grouping key is the value of a study-level identifier element
/// (StudyInstanceUID by default). Datasets sharing the key get the identical
/// shift for the lifetime of this provider. Datasets without the key get a
/// fresh shift on every call; that draw is deliberately not cached, so
/// ungroupable datasets are shifted independently.
///
/// The provider is an explicit dependency of the core, never global state.
/// Sharing one provider between threads is safe; the read-check-then-insert
/// on the cache happens under a single lock acquisition.
#[derive(Debug)]
pub struct TimeDeltaProvider {
    grouping_tag: Tag,
    cache: Mutex<HashMap<String, TimeShift>>,
}

impl TimeDeltaProvider {
    pub fn new() -> Self {
        Self::with_grouping_tag(tags::STUDY_INSTANCE_UID)
    }

    /// Groups by the given element instead of StudyInstanceUID.
    pub fn with_grouping_tag(grouping_tag: Tag) -> Self {
        Self {
            grouping_tag,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// The shift to apply to date/time values of the given dataset.
    pub fn shift_for(&self, dataset: &InMemDicomObject) -> TimeShift {
        match self.grouping_key(dataset) {
            Some(key) => {
                let mut cache = self.cache.lock().expect("time shift cache poisoned");
                *cache.entry(key).or_insert_with(draw_shift)
            }
            None => draw_shift(),
        }
    }

    fn grouping_key(&self, dataset: &InMemDicomObject) -> Option<String> {
        let value = dataset
            .element(self.grouping_tag)
            .ok()
            .and_then(|elem| elem.to_str().ok())?;
        let trimmed = value.trim_end_matches(['\0', ' ']);
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }
}

impl Default for TimeDeltaProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn draw_shift() -> TimeShift {
    let mut rng = rand::thread_rng();
    TimeShift {
        days: rng.gen_range(0..=MAX_SHIFT_DAYS),
        seconds: rng.gen_range(0..SECONDS_PER_DAY),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dicom_core::{PrimitiveValue, VR};
    use dicom_object::mem::InMemElement;

    fn dataset_with_study_uid(uid: &str) -> InMemDicomObject {
        let mut dataset = InMemDicomObject::new_empty();
        dataset.put(InMemElement::new(
            tags::STUDY_INSTANCE_UID,
            VR::UI,
            PrimitiveValue::from(uid),
        ));
        dataset
    }

    #[test]
    fn test_same_key_same_shift() {
        let provider = TimeDeltaProvider::new();
        let dataset = dataset_with_study_uid("1.2.3.4");
        let first = provider.shift_for(&dataset);
        let second = provider.shift_for(&dataset);
        assert_eq!(first, second);
    }

    #[test]
    fn test_shift_within_bounds() {
        let provider = TimeDeltaProvider::new();
        for i in 0..32 {
            let dataset = dataset_with_study_uid(&format!("1.2.3.{i}"));
            let shift = provider.shift_for(&dataset);
            assert!((0..=MAX_SHIFT_DAYS).contains(&shift.days));
            assert!((0..SECONDS_PER_DAY).contains(&shift.seconds));
        }
    }

    #[test]
    fn test_different_keys_usually_differ() {
        let provider = TimeDeltaProvider::new();
        let shifts: Vec<TimeShift> = (0..16)
            .map(|i| provider.shift_for(&dataset_with_study_uid(&format!("1.2.{i}"))))
            .collect();
        let all_equal = shifts.windows(2).all(|pair| pair[0] == pair[1]);
        assert!(!all_equal, "sixteen independent draws came out identical");
    }

    #[test]
    fn test_missing_key_not_cached() {
        let provider = TimeDeltaProvider::new();
        let dataset = InMemDicomObject::new_empty();
        // no grouping element: draws must not populate the cache
        let _ = provider.shift_for(&dataset);
        let _ = provider.shift_for(&dataset);
        assert!(provider.cache.lock().unwrap().is_empty());
    }

    #[test]
    fn test_custom_grouping_tag() {
        let provider = TimeDeltaProvider::with_grouping_tag(tags::PATIENT_ID);
        let mut dataset = InMemDicomObject::new_empty();
        dataset.put(InMemElement::new(
            tags::PATIENT_ID,
            VR::LO,
            PrimitiveValue::from("patient-1"),
        ));
        let first = provider.shift_for(&dataset);
        let second = provider.shift_for(&dataset);
        assert_eq!(first, second);
    }
}
