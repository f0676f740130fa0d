use dicom_core::value::ConvertValueError;
use dicom_core::VR;
use thiserror::Error;

use crate::hashing::Error as HashingError;
use crate::operators::hash::HashLengthError;
use crate::private::SafePrivateError;

#[derive(Error, Debug)]
pub enum OperatorError {
    #[error("invalid input: {}", .0.to_lowercase())]
    InvalidInput(String),

    #[error("cannot clean elements with value representation {0}")]
    UnsupportedVr(VR),

    #[error("value error: {}", .0.to_string().to_lowercase())]
    ValueError(#[from] ConvertValueError),

    #[error(transparent)]
    SafePrivate(#[from] SafePrivateError),
}

impl From<HashingError> for OperatorError {
    fn from(err: HashingError) -> Self {
        OperatorError::InvalidInput(format!("{err}"))
    }
}

impl From<HashLengthError> for OperatorError {
    fn from(err: HashLengthError) -> Self {
        OperatorError::InvalidInput(err.to_string())
    }
}
