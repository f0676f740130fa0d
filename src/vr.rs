//! Small helpers for branching on a value representation.

use dicom_core::VR;

/// Maximum number of characters a value of the given VR may hold, if the
/// standard defines one.
pub(crate) fn max_length(vr: VR) -> Option<usize> {
    match vr {
        VR::AE => Some(16),
        VR::AS => Some(4),
        VR::CS => Some(16),
        VR::DA => Some(8),
        VR::DS => Some(16),
        VR::DT => Some(26),
        VR::IS => Some(12),
        VR::LO => Some(64),
        VR::LT => Some(10240),
        VR::PN => Some(64),
        VR::SH => Some(16),
        VR::ST => Some(1024),
        VR::TM => Some(14),
        VR::UI => Some(64),
        _ => None,
    }
}

pub(crate) fn is_date_like(vr: VR) -> bool {
    matches!(vr, VR::DA | VR::DT | VR::TM)
}

pub(crate) fn is_text_like(vr: VR) -> bool {
    matches!(
        vr,
        VR::AE | VR::CS | VR::LO | VR::LT | VR::PN | VR::SH | VR::ST | VR::UC | VR::UT
    )
}
