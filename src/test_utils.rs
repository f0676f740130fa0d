//! Helpers shared by the unit tests.

use dicom_core::{DataElement, PrimitiveValue, VR};
use dicom_dictionary_std::{tags, uids};
use dicom_object::meta::FileMetaTable;
use dicom_object::meta::FileMetaTableBuilder;
use dicom_object::{DefaultDicomObject, FileDicomObject};

use crate::config::UidRoot;
use crate::operators::OperatorContext;
use crate::private::SafePrivateDefinition;
use crate::time_shift::TimeDeltaProvider;

pub(crate) fn make_file_meta() -> FileMetaTable {
    FileMetaTableBuilder::new()
        .media_storage_sop_class_uid("1.2.3")
        .media_storage_sop_instance_uid("2.3.4")
        .transfer_syntax("1.2.840.10008.1.2.1") // Explicit VR Little Endian
        .build()
        .unwrap()
}

/// Everything an [`OperatorContext`] borrows, bundled so tests can build a
/// context from one owner.
pub(crate) struct ContextParts {
    pub uid_root: UidRoot,
    pub safe_private: SafePrivateDefinition,
    pub time_shift: TimeDeltaProvider,
}

impl Default for ContextParts {
    fn default() -> Self {
        Self {
            uid_root: UidRoot::default(),
            safe_private: SafePrivateDefinition::empty(),
            time_shift: TimeDeltaProvider::new(),
        }
    }
}

pub(crate) fn operator_context(parts: &ContextParts) -> OperatorContext<'_> {
    OperatorContext {
        uid_root: &parts.uid_root,
        safe_private: &parts.safe_private,
        time_shift: &parts.time_shift,
    }
}

pub(crate) struct TestObjectOptions {
    pub modality: &'static str,
    pub sop_class_uid: &'static str,
    pub with_pixel_data: bool,
}

impl Default for TestObjectOptions {
    fn default() -> Self {
        Self {
            modality: "CT",
            sop_class_uid: uids::CT_IMAGE_STORAGE,
            with_pixel_data: false,
        }
    }
}

/// A small but structurally complete dataset for exercising the engine.
pub(crate) fn make_test_object(options: TestObjectOptions) -> DefaultDicomObject {
    let mut obj = FileDicomObject::new_empty_with_meta(make_file_meta());

    let put_str = |obj: &mut DefaultDicomObject, tag, vr, value: &str| {
        obj.put(DataElement::new::<PrimitiveValue>(
            tag,
            vr,
            PrimitiveValue::from(value),
        ));
    };

    put_str(&mut obj, tags::SOP_CLASS_UID, VR::UI, options.sop_class_uid);
    put_str(&mut obj, tags::SOP_INSTANCE_UID, VR::UI, "1.2.3.4.5.6.7");
    put_str(&mut obj, tags::STUDY_INSTANCE_UID, VR::UI, "1.2.3.4.5");
    put_str(&mut obj, tags::SERIES_INSTANCE_UID, VR::UI, "1.2.3.4.5.1");
    put_str(&mut obj, tags::MODALITY, VR::CS, options.modality);
    put_str(&mut obj, tags::PATIENT_NAME, VR::PN, "Doe^John");
    put_str(&mut obj, tags::PATIENT_ID, VR::LO, "12345");
    put_str(&mut obj, tags::STUDY_DATE, VR::DA, "20010102");

    if options.with_pixel_data {
        obj.put(DataElement::new::<PrimitiveValue>(
            tags::ROWS,
            VR::US,
            PrimitiveValue::from(4u16),
        ));
        obj.put(DataElement::new::<PrimitiveValue>(
            tags::COLUMNS,
            VR::US,
            PrimitiveValue::from(4u16),
        ));
        obj.put(DataElement::new::<PrimitiveValue>(
            tags::BITS_ALLOCATED,
            VR::US,
            PrimitiveValue::from(8u16),
        ));
        obj.put(DataElement::new::<PrimitiveValue>(
            tags::PIXEL_DATA,
            VR::OW,
            PrimitiveValue::U8(vec![0xFFu8; 16].into()),
        ));
    }

    obj
}
