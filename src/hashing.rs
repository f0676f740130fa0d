use num_bigint::{BigUint, ParseBigIntError};
use num_traits::Num;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum Error {
    #[error("invalid input: {}", .0.to_lowercase())]
    InvalidInput(String),
}

impl From<ParseBigIntError> for Error {
    fn from(err: ParseBigIntError) -> Self {
        Error::InvalidInput(format!("{err}"))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// One-way digest of a string value, rendered as decimal digits.
///
/// The decimal form is what de-identification operators need: it can be
/// written back into numeric string VRs and re-encoded as a UID component
/// without further escaping.
pub trait Hasher {
    fn hash(&self, input: &str) -> Result<String>;
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Blake3Hasher;

impl Blake3Hasher {
    pub fn new() -> Self {
        Self {}
    }
}

impl Hasher for Blake3Hasher {
    fn hash(&self, input: &str) -> Result<String> {
        let digest = blake3::hash(input.as_bytes());
        let digest_as_number = BigUint::from_str_radix(digest.to_hex().as_str(), 16)?;
        Ok(digest_as_number.to_string())
    }
}
