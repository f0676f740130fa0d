//! Rule-based de-identification of DICOM datasets.
//!
//! The engine applies a precedence-ordered set of element-level rules to a
//! dataset: every element is matched against [`TagIdentifier`]s from most
//! to least specific, and the winning rule's [`Operator`] decides whether
//! the element is kept, removed, emptied, hashed or cleaned. Around that
//! sit dataset-level acceptance checks ([`bouncers`]), burned-in annotation
//! redaction ([`pixel`]), a safe-list for private elements ([`private`])
//! and before/after change extraction ([`delta`]).
//!
//! # Example
//!
//! ```no_run
//! use std::fs::File;
//! use dicom_deidentify::Deidentifier;
//!
//! let deidentifier = Deidentifier::default();
//! let result = deidentifier
//!     .deidentify(File::open("ct.dcm").unwrap())
//!     .unwrap();
//! result.write(File::create("ct_deid.dcm").unwrap()).unwrap();
//! ```
//!
//! Parsing and encoding of the wire format, the element dictionary and the
//! value representation table all come from the `dicom-object`,
//! `dicom-core` and `dicom-dictionary-std` crates; this crate only decides
//! what happens to each element.

pub mod bouncers;
pub mod config;
pub mod core;
pub mod delta;
pub mod hashing;
pub mod identifiers;
pub mod insertions;
pub mod operators;
pub mod pixel;
pub mod private;
pub mod rules;
pub mod time_shift;
mod vr;

#[cfg(test)]
pub(crate) mod test_utils;

use std::io::{Read, Write};

use dicom_object::DefaultDicomObject;

pub use crate::core::{Core, CoreBuilder, DeidentificationError, UnmatchedTagPolicy};
pub use crate::identifiers::TagIdentifier;
pub use crate::operators::Operator;
pub use crate::rules::{Profile, Rule, RuleSet};

// convenient access to tag constants without a separate import
pub use dicom_dictionary_std::tags;

const PREAMBLE_LENGTH: usize = 128;
const MAGIC: &[u8; 4] = b"DICM";

/// De-identifies DICOM streams and objects using a configured [`Core`].
pub struct Deidentifier {
    core: Core,
}

impl Deidentifier {
    pub fn new(core: Core) -> Self {
        Self { core }
    }

    /// Reads one DICOM object from `src`, with or without the 128-byte
    /// preamble, and de-identifies it.
    pub fn deidentify(&self, mut src: impl Read) -> Result<DeidentifiedObject, DeidentificationError> {
        let mut bytes = Vec::new();
        src.read_to_end(&mut bytes)?;

        let start = if bytes.len() >= PREAMBLE_LENGTH + MAGIC.len()
            && &bytes[PREAMBLE_LENGTH..PREAMBLE_LENGTH + MAGIC.len()] == MAGIC
        {
            PREAMBLE_LENGTH
        } else {
            0
        };

        let obj = dicom_object::from_reader(&bytes[start..])?;
        self.deidentify_object(obj)
    }

    /// De-identifies an already-parsed object.
    pub fn deidentify_object(
        &self,
        obj: DefaultDicomObject,
    ) -> Result<DeidentifiedObject, DeidentificationError> {
        let deidentified = self.core.deidentify(obj)?;
        Ok(DeidentifiedObject {
            deidentified,
        })
    }

    pub fn core(&self) -> &Core {
        &self.core
    }
}

impl Default for Deidentifier {
    /// A deidentifier with the default [`Core`] configuration.
    fn default() -> Self {
        Self::new(Core::default())
    }
}

/// The outcome of a successful de-identification.
pub struct DeidentifiedObject {
    pub deidentified: DefaultDicomObject,
}

impl DeidentifiedObject {
    /// Writes the object, preamble and file meta included.
    pub fn write(&self, to: impl Write) -> Result<(), DeidentificationError> {
        self.deidentified.write_all(to)?;
        Ok(())
    }
}
