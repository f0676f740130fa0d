//! Dataset-level gatekeepers.
//!
//! A bouncer inspects a whole dataset before any element-level processing
//! and may reject it outright, for example because its SOP class is known
//! to carry identifying information in places no rule can reach.

use dicom_core::Tag;
use dicom_dictionary_std::{tags, uids};
use dicom_object::InMemDicomObject;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BounceError {
    /// The dataset must not be de-identified; the reason is for humans.
    #[error("{reason}")]
    Rejected { reason: String },

    /// No verdict possible, usually because a needed element is absent.
    /// Callers must treat this as rejection, never as acceptance.
    #[error("{reason}")]
    Undecidable { reason: String },
}

/// Inspects a dataset and either lets it through or rejects it.
pub trait Bouncer: Send + Sync {
    /// Single-line description, used in error messages and reports.
    fn description(&self) -> &'static str;

    /// Returns `Ok(())` to let the dataset through.
    fn inspect(&self, dataset: &InMemDicomObject) -> Result<(), BounceError>;
}

impl std::fmt::Debug for dyn Bouncer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Bouncer({})", self.description())
    }
}

fn required_str(
    dataset: &InMemDicomObject,
    tag: Tag,
    keyword: &str,
) -> Result<String, BounceError> {
    let elem = dataset.element(tag).map_err(|_| BounceError::Undecidable {
        reason: format!("required element {keyword} not found, cannot determine whether this dataset is safe"),
    })?;
    let value = elem.to_str().map_err(|e| BounceError::Undecidable {
        reason: format!("cannot read {keyword}: {e}"),
    })?;
    Ok(value.trim_end_matches(['\0', ' ']).to_string())
}

/// Rejects datasets whose SOP class is not a standard DICOM one.
#[derive(Debug, Default)]
pub struct RejectNonStandardDicom;

impl Bouncer for RejectNonStandardDicom {
    fn description(&self) -> &'static str {
        "Reject non-standard DICOM types by SOPClassUID"
    }

    fn inspect(&self, dataset: &InMemDicomObject) -> Result<(), BounceError> {
        let sop_class_uid = required_str(dataset, tags::SOP_CLASS_UID, "SOPClassUID")?;
        if !sop_class_uid.starts_with("1.2.840.10008") {
            return Err(BounceError::Rejected {
                reason: format!(
                    "this dataset has SOPClassUID \"{sop_class_uid}\", which is non-standard; de-identification would be too risky"
                ),
            });
        }
        Ok(())
    }
}

/// Rejects presentation state and key object selection datasets.
///
/// These often hold ids and physician names in their SeriesDescription.
/// Presentation states described as "Annotation" are let through.
#[derive(Debug, Default)]
pub struct RejectKogsps;

impl Bouncer for RejectKogsps {
    fn description(&self) -> &'static str {
        "Reject PresentationStorage and KeyObjectSelectionDocument"
    }

    fn inspect(&self, dataset: &InMemDicomObject) -> Result<(), BounceError> {
        let sop_class_uid = required_str(dataset, tags::SOP_CLASS_UID, "SOPClassUID")?;
        if sop_class_uid == uids::KEY_OBJECT_SELECTION_DOCUMENT_STORAGE {
            return Err(BounceError::Rejected {
                reason: format!("SOPClass {sop_class_uid} often contains physician information"),
            });
        }
        if sop_class_uid == uids::GRAYSCALE_SOFTCOPY_PRESENTATION_STATE_STORAGE
            || sop_class_uid == uids::COLOR_SOFTCOPY_PRESENTATION_STATE_STORAGE
        {
            let series_description =
                required_str(dataset, tags::SERIES_DESCRIPTION, "SeriesDescription")?;
            if series_description != "Annotation" {
                return Err(BounceError::Rejected {
                    reason: format!(
                        "SOPClass \"{sop_class_uid}\" is only safe for annotations, but this series is described as \"{series_description}\""
                    ),
                });
            }
        }
        Ok(())
    }
}

/// Rejects encapsulated PDF and CDA documents.
#[derive(Debug, Default)]
pub struct RejectEncapsulatedImageStorage;

impl Bouncer for RejectEncapsulatedImageStorage {
    fn description(&self) -> &'static str {
        "Reject encapsulated PDF and CDA"
    }

    fn inspect(&self, dataset: &InMemDicomObject) -> Result<(), BounceError> {
        let sop_class_uid = required_str(dataset, tags::SOP_CLASS_UID, "SOPClassUID")?;
        if sop_class_uid == uids::ENCAPSULATED_PDF_STORAGE
            || sop_class_uid == uids::ENCAPSULATED_CDA_STORAGE
        {
            return Err(BounceError::Rejected {
                reason: format!(
                    "this dataset holds encapsulated document data (SOPClassUID \"{sop_class_uid}\"), which often contains patient information"
                ),
            });
        }
        Ok(())
    }
}

/// Rejects suspicious image datasets that do not declare themselves free of
/// burned-in annotations.
///
/// This is the bouncer that pixel cleaning can satisfy: after blanking, the
/// dataset declares "no burned-in annotation" and passes.
#[derive(Debug, Default)]
pub struct RejectBurnedInAnnotation;

impl Bouncer for RejectBurnedInAnnotation {
    fn description(&self) -> &'static str {
        "Reject suspicious images without a burned-in annotation disclaimer"
    }

    fn inspect(&self, dataset: &InMemDicomObject) -> Result<(), BounceError> {
        let modality = required_str(dataset, tags::MODALITY, "Modality")?;
        if modality != "US" && modality != "SC" {
            return Ok(());
        }
        let declares_clean = dataset
            .element(tags::BURNED_IN_ANNOTATION)
            .ok()
            .and_then(|elem| elem.to_str().ok())
            .map(|value| matches!(value.trim_end_matches(['\0', ' ']), "NO" | "No" | "no"))
            .unwrap_or(false);
        if !declares_clean {
            return Err(BounceError::Rejected {
                reason: format!(
                    "modality {modality} images may contain burned-in annotations and this dataset does not declare otherwise"
                ),
            });
        }
        Ok(())
    }
}
