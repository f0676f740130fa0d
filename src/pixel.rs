//! Finding and blanking burned-in information in image pixel data.
//!
//! Some modalities routinely burn patient names into the image itself.
//! Element-level rules cannot touch those, so suspicious datasets get their
//! known text regions blanked before the dataset is let through.

use std::fmt;

use dicom_core::header::Header;
use dicom_core::{DataElement, PrimitiveValue, Tag};
use dicom_dictionary_std::{tags, uids};
use dicom_object::InMemDicomObject;
use thiserror::Error;

use crate::private::{Criterion, CriterionError};

#[derive(Error, Debug)]
pub enum PixelProcessingError {
    #[error("missing element {0} - cannot determine whether pixel cleaning is needed")]
    MissingElement(&'static str),

    #[error("image data is suspicious but no cleaning location applies to it ({0})")]
    NoApplicableLocation(String),

    #[error("cannot evaluate pixel location criterion: {}", .0.to_lowercase())]
    Criterion(String),

    #[error("invalid pixel data: {}", .0.to_lowercase())]
    InvalidPixelData(String),
}

/// An axis-aligned rectangle in pixel coordinates.
///
/// `origin_x` is the column and `origin_y` the row of the top-left corner;
/// blanking covers rows `origin_y..origin_y+height` and columns
/// `origin_x..origin_x+width`. Pixel data is row-major with the origin at
/// the top-left of the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SquareArea {
    pub origin_x: u32,
    pub origin_y: u32,
    pub width: u32,
    pub height: u32,
}

impl SquareArea {
    pub fn new(origin_x: u32, origin_y: u32, width: u32, height: u32) -> Self {
        Self {
            origin_x,
            origin_y,
            width,
            height,
        }
    }
}

/// One or more areas in an image slice that may hold personally
/// identifiable information, with an optional predicate saying for which
/// datasets the location applies.
///
/// Holds location information only; blanking is done by [`PixelProcessor`].
pub struct PIILocation {
    areas: Vec<SquareArea>,
    criterion: Option<Criterion>,
}

impl PIILocation {
    /// Without a criterion the location applies to every dataset.
    pub fn new(areas: Vec<SquareArea>, criterion: Option<Criterion>) -> Self {
        Self { areas, criterion }
    }

    pub fn areas(&self) -> &[SquareArea] {
        &self.areas
    }

    /// True if this location exists in the given dataset.
    pub fn exists_in(&self, dataset: &InMemDicomObject) -> Result<bool, CriterionError> {
        match &self.criterion {
            Some(criterion) => criterion(dataset),
            None => Ok(true),
        }
    }
}

impl fmt::Debug for PIILocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PIILocation")
            .field("areas", &self.areas)
            .field("criterion", &self.criterion.as_ref().map(|_| "<criterion>"))
            .finish()
    }
}

/// Where in images personally identifiable information might be.
#[derive(Debug, Default)]
pub struct PIILocationList {
    pub locations: Vec<PIILocation>,
}

impl PIILocationList {
    pub fn new(locations: Vec<PIILocation>) -> Self {
        Self { locations }
    }
}

/// Decides whether a dataset's image needs redaction and blanks the
/// configured regions.
#[derive(Debug, Default)]
pub struct PixelProcessor {
    locations: Vec<PIILocation>,
}

impl PixelProcessor {
    pub fn new(location_list: PIILocationList) -> Self {
        Self {
            locations: location_list.locations,
        }
    }

    /// Whether this dataset cannot be passed through without pixel cleaning.
    ///
    /// True for suspicious datasets: modality US or SC, or the secondary
    /// capture SOP class, without an explicit "no burned-in annotation"
    /// declaration. Kept separate from the cleaning itself so the slow path
    /// can be skipped for the vast majority of datasets.
    ///
    /// A dataset that lacks the elements needed for this decision raises an
    /// error; an undecidable dataset is never silently treated as clean.
    pub fn needs_cleaning(&self, dataset: &InMemDicomObject) -> Result<bool, PixelProcessingError> {
        if !is_suspicious(dataset)? {
            return Ok(false);
        }
        // if the dataset says it carries no burned-in annotation, believe it
        Ok(!declares_no_burned_in_annotation(dataset))
    }

    /// All configured locations that apply to this dataset.
    fn applicable_locations(
        &self,
        dataset: &InMemDicomObject,
    ) -> Result<Vec<&PIILocation>, PixelProcessingError> {
        let mut applicable = Vec::new();
        for location in &self.locations {
            if location
                .exists_in(dataset)
                .map_err(|e| PixelProcessingError::Criterion(e.0))?
            {
                applicable.push(location);
            }
        }
        Ok(applicable)
    }

    /// Blanks every applicable area and marks the dataset as clean.
    ///
    /// Does nothing when the dataset needs no cleaning. A suspicious dataset
    /// that no configured location applies to is an error; it must never
    /// pass through uncleaned.
    pub fn clean_pixel_data(
        &self,
        dataset: &mut InMemDicomObject,
    ) -> Result<(), PixelProcessingError> {
        if !self.needs_cleaning(dataset)? {
            return Ok(());
        }

        let areas: Vec<SquareArea> = self
            .applicable_locations(dataset)?
            .iter()
            .flat_map(|location| location.areas().iter().copied())
            .collect();

        if areas.is_empty() {
            return Err(PixelProcessingError::NoApplicableLocation(
                describe_image(dataset),
            ));
        }

        let rows = required_u32(dataset, tags::ROWS, "Rows")?;
        let columns = required_u32(dataset, tags::COLUMNS, "Columns")?;
        let bits_allocated = required_u32(dataset, tags::BITS_ALLOCATED, "BitsAllocated")?;
        let bytes_per_sample = (bits_allocated as usize).div_ceil(8);

        let pixel_elem = dataset
            .element(tags::PIXEL_DATA)
            .map_err(|_| PixelProcessingError::MissingElement("PixelData"))?;
        let pixel_vr = pixel_elem.vr();
        let mut pixels = pixel_elem
            .value()
            .to_bytes()
            .map_err(|e| PixelProcessingError::InvalidPixelData(e.to_string()))?
            .into_owned();

        let expected = rows as usize * columns as usize * bytes_per_sample;
        if pixels.len() < expected {
            return Err(PixelProcessingError::InvalidPixelData(format!(
                "expected at least {expected} bytes for {rows}x{columns} at {bits_allocated} bits, got {}",
                pixels.len()
            )));
        }

        for area in &areas {
            blank_area(&mut pixels, rows, columns, bytes_per_sample, area);
        }

        dataset.put(DataElement::new::<PrimitiveValue>(
            tags::PIXEL_DATA,
            pixel_vr,
            PrimitiveValue::U8(pixels.into()),
        ));

        // mark as clean as per PS3.15 E.3.1
        dataset.put(DataElement::new::<PrimitiveValue>(
            tags::BURNED_IN_ANNOTATION,
            dicom_core::VR::CS,
            PrimitiveValue::from("NO"),
        ));

        Ok(())
    }
}

/// Zeroes one rectangle, clipped to the image bounds.
fn blank_area(
    pixels: &mut [u8],
    rows: u32,
    columns: u32,
    bytes_per_sample: usize,
    area: &SquareArea,
) {
    if area.origin_y >= rows || area.origin_x >= columns {
        return;
    }
    let row_end = area.origin_y.saturating_add(area.height).min(rows);
    let column_end = area.origin_x.saturating_add(area.width).min(columns);
    for row in area.origin_y..row_end {
        let start = (row as usize * columns as usize + area.origin_x as usize) * bytes_per_sample;
        let end = (row as usize * columns as usize + column_end as usize) * bytes_per_sample;
        pixels[start..end].fill(0);
    }
}

fn is_suspicious(dataset: &InMemDicomObject) -> Result<bool, PixelProcessingError> {
    let modality = required_str(dataset, tags::MODALITY, "Modality")?;
    if modality == "US" || modality == "SC" {
        return Ok(true);
    }
    let sop_class_uid = required_str(dataset, tags::SOP_CLASS_UID, "SOPClassUID")?;
    Ok(sop_class_uid == uids::SECONDARY_CAPTURE_IMAGE_STORAGE)
}

fn declares_no_burned_in_annotation(dataset: &InMemDicomObject) -> bool {
    dataset
        .element(tags::BURNED_IN_ANNOTATION)
        .ok()
        .and_then(|elem| elem.to_str().ok())
        .map(|value| matches!(value.trim_end_matches(['\0', ' ']), "NO" | "No" | "no"))
        .unwrap_or(false)
}

fn required_str(
    dataset: &InMemDicomObject,
    tag: Tag,
    keyword: &'static str,
) -> Result<String, PixelProcessingError> {
    let elem = dataset
        .element(tag)
        .map_err(|_| PixelProcessingError::MissingElement(keyword))?;
    let value = elem
        .to_str()
        .map_err(|e| PixelProcessingError::InvalidPixelData(e.to_string()))?;
    Ok(value.trim_end_matches(['\0', ' ']).to_string())
}

fn required_u32(
    dataset: &InMemDicomObject,
    tag: Tag,
    keyword: &'static str,
) -> Result<u32, PixelProcessingError> {
    dataset
        .element(tag)
        .map_err(|_| PixelProcessingError::MissingElement(keyword))?
        .value()
        .to_int::<u32>()
        .map_err(|e| PixelProcessingError::InvalidPixelData(e.to_string()))
}

fn describe_image(dataset: &InMemDicomObject) -> String {
    let describe = |tag: Tag| {
        dataset
            .element(tag)
            .ok()
            .and_then(|e| e.to_str().ok().map(|v| v.to_string()))
            .unwrap_or_else(|| "?".to_string())
    };
    format!(
        "modality {}, manufacturer {}, {}x{}",
        describe(tags::MODALITY),
        describe(tags::MANUFACTURER),
        describe(tags::ROWS),
        describe(tags::COLUMNS),
    )
}
