//! Profile configuration: the UID root, the serialized profile shape, and
//! the default de-identification profile.
//!
//! A profile is data. On disk it is an ordered list of named rule sets,
//! each mapping identifier strings to operators. Re-loading a dumped
//! profile and flattening it resolves identically to the in-memory
//! construction that produced it.

use std::str::FromStr;
use std::sync::OnceLock;

use dicom_core::Tag;
use dicom_dictionary_std::tags;
use garde::Validate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::identifiers::TagIdentifier;
use crate::operators::Operator;
use crate::rules::{Profile, Rule, RuleSet};

static UID_ROOT_REGEX: OnceLock<Regex> = OnceLock::new();

const UID_ROOT_MAX_LENGTH: usize = 32;
pub const UID_ROOT_DEFAULT_VALUE: &str = "9999";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid UID root: {0}")]
    InvalidUidRoot(String),

    #[error("invalid identifier \"{identifier}\": {message}")]
    InvalidIdentifier { identifier: String, message: String },

    #[error("invalid operator for \"{identifier}\": {message}")]
    InvalidOperator { identifier: String, message: String },

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// A DICOM UID root used as prefix when deriving new UIDs.
///
/// Must be empty or start with a digit 1-9, contain only digits and dots,
/// and be at most 32 characters long.
///
/// # Example
///
/// ```
/// use dicom_deidentify::config::UidRoot;
///
/// let uid_root = "1.2.840.123".parse::<UidRoot>().unwrap();
/// assert!("0.1.2".parse::<UidRoot>().is_err());
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq, Ord, PartialOrd)]
pub struct UidRoot(String);

#[derive(Error, Debug, Clone, Eq, PartialEq)]
#[error("{0} is not a valid UID root")]
pub struct UidRootError(pub String);

impl UidRoot {
    pub fn new(uid_root: &str) -> Result<Self, UidRootError> {
        let regex = UID_ROOT_REGEX.get_or_init(|| {
            Regex::new(&format!(
                r"^([1-9][0-9.]{{0,{}}})?$",
                UID_ROOT_MAX_LENGTH - 1
            ))
            .unwrap()
        });

        if !regex.is_match(uid_root) {
            return Err(UidRootError(format!(
                "UID root must be empty or start with 1-9, contain only numbers and dots, and be no longer than {UID_ROOT_MAX_LENGTH} characters"
            )));
        }

        Ok(Self(uid_root.into()))
    }

    /// The root formatted for use as a UID prefix: non-empty roots get a
    /// trailing dot if they lack one.
    pub fn as_prefix(&self) -> String {
        if !self.0.is_empty() && !self.0.ends_with('.') {
            format!("{}.", self.0.trim())
        } else {
            self.0.trim().into()
        }
    }
}

impl Default for UidRoot {
    fn default() -> Self {
        Self("".into())
    }
}

impl FromStr for UidRoot {
    type Err = UidRootError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        UidRoot::new(s)
    }
}

impl AsRef<str> for UidRoot {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<UidRootError> for ConfigError {
    fn from(err: UidRootError) -> Self {
        ConfigError::InvalidUidRoot(err.0)
    }
}

/// One serialized rule: identifier string, operator, optional comment.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RuleConfig {
    pub tag: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,

    #[serde(flatten)]
    pub operator: Operator,
}

/// One serialized rule set.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RuleSetConfig {
    pub name: String,
    pub rules: Vec<RuleConfig>,
}

/// The on-disk shape of a [`Profile`].
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ProfileConfig {
    pub name: String,
    pub rule_sets: Vec<RuleSetConfig>,
}

impl ProfileConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::Serialization(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::Serialization(e.to_string()))
    }

    /// Builds the in-memory profile, validating identifiers and operator
    /// parameters.
    pub fn to_profile(&self) -> Result<Profile, ConfigError> {
        let mut rule_sets = Vec::with_capacity(self.rule_sets.len());
        for set_config in &self.rule_sets {
            let mut rules = Vec::with_capacity(set_config.rules.len());
            for rule_config in &set_config.rules {
                let identifier: TagIdentifier = rule_config.tag.parse().map_err(
                    |e: crate::identifiers::IdentifierError| ConfigError::InvalidIdentifier {
                        identifier: rule_config.tag.clone(),
                        message: e.to_string(),
                    },
                )?;
                rule_config
                    .operator
                    .validate()
                    .map_err(|e| ConfigError::InvalidOperator {
                        identifier: rule_config.tag.clone(),
                        message: e.to_string(),
                    })?;
                rules.push(Rule::new(identifier, rule_config.operator.clone()));
            }
            rule_sets.push(RuleSet::new(set_config.name.clone(), rules));
        }
        Ok(Profile::new(self.name.clone(), rule_sets))
    }

    /// The serializable mirror of the given profile, with dictionary
    /// keywords as comments where available.
    pub fn from_profile(profile: &Profile) -> Self {
        let rule_sets = profile
            .rule_sets()
            .iter()
            .map(|rule_set| RuleSetConfig {
                name: rule_set.name().to_string(),
                rules: rule_set
                    .rules()
                    .map(|rule| RuleConfig {
                        tag: rule.identifier.key(),
                        comment: match &rule.identifier {
                            TagIdentifier::Single(_) => Some(rule.identifier.name()),
                            _ => None,
                        },
                        operator: rule.operator.clone(),
                    })
                    .collect(),
            })
            .collect();
        ProfileConfig {
            name: profile.name().to_string(),
            rule_sets,
        }
    }
}

fn single(tag: Tag, operator: Operator) -> Rule {
    Rule::new(TagIdentifier::Single(tag), operator)
}

fn group(pattern: &str, operator: Operator) -> Rule {
    Rule::new(
        pattern.parse::<TagIdentifier>().expect("valid pattern"),
        operator,
    )
}

/// The default de-identification profile.
///
/// Element coverage follows DICOM PS3.15 E.1 in spirit: identifying text is
/// removed or hashed, UIDs are re-derived so references stay consistent,
/// dates are shifted, curve and overlay groups are dropped, and private
/// attributes are cleaned against the safe private definition.
pub fn default_profile() -> Profile {
    use Operator::*;

    let basic = RuleSet::new(
        "basic profile",
        vec![
            single(tags::SPECIFIC_CHARACTER_SET, Keep),
            single(tags::IMAGE_TYPE, Keep),
            single(tags::MODALITY, Keep),
            single(tags::BURNED_IN_ANNOTATION, Keep),
            single(tags::SOP_CLASS_UID, Keep),
            single(tags::SOP_INSTANCE_UID, HashUid),
            single(tags::STUDY_INSTANCE_UID, HashUid),
            single(tags::SERIES_INSTANCE_UID, HashUid),
            single(tags::FRAME_OF_REFERENCE_UID, HashUid),
            single(tags::INSTANCE_CREATOR_UID, HashUid),
            single(tags::REFERENCED_SOP_INSTANCE_UID, HashUid),
            single(tags::IRRADIATION_EVENT_UID, HashUid),
            single(tags::DEVICE_UID, HashUid),
            single(tags::ACCESSION_NUMBER, Hash { length: Some(16) }),
            single(tags::STUDY_ID, Hash { length: Some(16) }),
            single(tags::PATIENT_NAME, Hash { length: Some(10) }),
            single(tags::PATIENT_ID, Hash { length: Some(10) }),
            single(tags::ISSUER_OF_PATIENT_ID, Remove),
            single(tags::OTHER_PATIENT_I_DS, Remove),
            single(tags::OTHER_PATIENT_NAMES, Remove),
            single(tags::PATIENT_BIRTH_NAME, Remove),
            single(tags::PATIENT_MOTHER_BIRTH_NAME, Remove),
            single(tags::PATIENT_BIRTH_DATE, Clean),
            single(tags::PATIENT_BIRTH_TIME, Remove),
            single(tags::PATIENT_SEX, Empty),
            single(tags::PATIENT_AGE, Remove),
            single(tags::PATIENT_SIZE, Remove),
            single(tags::PATIENT_WEIGHT, Remove),
            single(tags::PATIENT_ADDRESS, Remove),
            single(tags::PATIENT_TELEPHONE_NUMBERS, Remove),
            single(tags::PATIENT_COMMENTS, Remove),
            single(tags::ADDITIONAL_PATIENT_HISTORY, Remove),
            single(tags::ETHNIC_GROUP, Remove),
            single(tags::OCCUPATION, Remove),
            single(tags::MILITARY_RANK, Remove),
            single(tags::MEDICAL_RECORD_LOCATOR, Remove),
            single(tags::COUNTRY_OF_RESIDENCE, Remove),
            single(tags::REGION_OF_RESIDENCE, Remove),
            single(tags::STUDY_DATE, Clean),
            single(tags::SERIES_DATE, Clean),
            single(tags::ACQUISITION_DATE, Clean),
            single(tags::CONTENT_DATE, Clean),
            single(tags::ACQUISITION_DATE_TIME, Clean),
            single(tags::STUDY_TIME, Clean),
            single(tags::SERIES_TIME, Clean),
            single(tags::ACQUISITION_TIME, Clean),
            single(tags::CONTENT_TIME, Clean),
            single(tags::TIMEZONE_OFFSET_FROM_UTC, Remove),
            single(tags::STUDY_DESCRIPTION, Clean),
            single(tags::SERIES_DESCRIPTION, Clean),
            single(tags::IMAGE_COMMENTS, Remove),
            single(tags::DERIVATION_DESCRIPTION, Remove),
            single(tags::REFERRING_PHYSICIAN_NAME, Empty),
            single(tags::REFERRING_PHYSICIAN_ADDRESS, Remove),
            single(tags::REFERRING_PHYSICIAN_TELEPHONE_NUMBERS, Remove),
            single(tags::PERFORMING_PHYSICIAN_NAME, Remove),
            single(tags::NAME_OF_PHYSICIANS_READING_STUDY, Remove),
            single(tags::PHYSICIANS_OF_RECORD, Remove),
            single(tags::OPERATORS_NAME, Remove),
            single(tags::INSTITUTION_NAME, Remove),
            single(tags::INSTITUTION_ADDRESS, Remove),
            single(tags::INSTITUTIONAL_DEPARTMENT_NAME, Remove),
            single(tags::STATION_NAME, Remove),
            single(tags::MANUFACTURER, Empty),
            single(tags::MANUFACTURER_MODEL_NAME, Remove),
            single(tags::DEVICE_SERIAL_NUMBER, Remove),
            single(tags::SOFTWARE_VERSIONS, Remove),
            single(tags::PROTOCOL_NAME, Remove),
            // re-inserted with fresh values after processing
            single(tags::PATIENT_IDENTITY_REMOVED, Remove),
            single(tags::DEIDENTIFICATION_METHOD, Remove),
            single(tags::DEIDENTIFICATION_METHOD_CODE_SEQUENCE, Remove),
        ],
    );

    let repeating = RuleSet::new(
        "curves and overlays",
        vec![
            group("50xx,xxxx", Remove),
            group("60xx,xxxx", Remove),
        ],
    );

    let private = RuleSet::new("private attributes", vec![group("private", Clean)]);

    Profile::new("default", vec![basic, repeating, private])
}

#[cfg(test)]
mod tests {
    use super::*;
    use dicom_core::PrimitiveValue;
    use dicom_core::VR;
    use dicom_object::mem::InMemElement;
    use dicom_object::InMemDicomObject;

    #[test]
    fn test_uid_root_validation() {
        assert!(UidRoot::new("").is_ok());
        assert!(UidRoot::new("9999").is_ok());
        assert!(UidRoot::new("1.2.840.123").is_ok());
        assert!(UidRoot::new("0.1.2").is_err());
        assert!(UidRoot::new("abc").is_err());
        assert!(UidRoot::new(&"9".repeat(33)).is_err());
    }

    #[test]
    fn test_uid_root_as_prefix() {
        assert_eq!(UidRoot::new("9999").unwrap().as_prefix(), "9999.");
        assert_eq!(UidRoot::new("9999.").unwrap().as_prefix(), "9999.");
        assert_eq!(UidRoot::new("").unwrap().as_prefix(), "");
    }

    #[test]
    fn test_profile_config_round_trip() {
        let profile = default_profile();
        let config = ProfileConfig::from_profile(&profile);
        let json = config.to_json().unwrap();
        let reloaded = ProfileConfig::from_json(&json).unwrap();
        let profile_again = reloaded.to_profile().unwrap();

        // the reloaded profile must resolve identically to the original
        let flattened = profile.flatten(&[]);
        let flattened_again = profile_again.flatten(&[]);
        let dataset = InMemDicomObject::new_empty();
        for (group, elem) in [
            (0x0010u16, 0x0010u16), // PatientName
            (0x0010, 0x0020),       // PatientID
            (0x5010, 0x3000),       // curve data
            (0x6000, 0x3000),       // overlay data
            (0x0009, 0x1001),       // private
            (0x0008, 0x0018),       // SOPInstanceUID
            (0x4321, 0x0012),       // unmatched
        ] {
            let elem = InMemElement::new(
                Tag(group, elem),
                VR::LO,
                PrimitiveValue::from("value"),
            );
            let original = flattened.get_rule(&elem, &dataset).map(|r| &r.operator);
            let reloaded = flattened_again.get_rule(&elem, &dataset).map(|r| &r.operator);
            assert_eq!(original, reloaded);
        }
    }

    #[test]
    fn test_profile_config_rejects_bad_identifier() {
        let json = r#"{
            "name": "broken",
            "rule_sets": [{
                "name": "set",
                "rules": [{"tag": "not-a-tag", "operator": "remove"}]
            }]
        }"#;
        let config = ProfileConfig::from_json(json).unwrap();
        assert!(matches!(
            config.to_profile(),
            Err(ConfigError::InvalidIdentifier { .. })
        ));
    }

    #[test]
    fn test_profile_config_rejects_bad_operator_params() {
        let json = r#"{
            "name": "broken",
            "rule_sets": [{
                "name": "set",
                "rules": [{"tag": "0010,0010", "operator": "hash", "length": 2}]
            }]
        }"#;
        let config = ProfileConfig::from_json(json).unwrap();
        assert!(matches!(
            config.to_profile(),
            Err(ConfigError::InvalidOperator { .. })
        ));
    }

    #[test]
    fn test_default_profile_covers_core_tags() {
        let profile = default_profile();
        let flattened = profile.flatten(&[]);
        let dataset = InMemDicomObject::new_empty();

        let patient_name = InMemElement::new(
            tags::PATIENT_NAME,
            VR::PN,
            PrimitiveValue::from("Doe^John"),
        );
        assert_eq!(
            flattened.get_rule(&patient_name, &dataset).unwrap().operator,
            Operator::Hash { length: Some(10) }
        );

        let curve = InMemElement::new(Tag(0x5012, 0x0040), VR::LO, PrimitiveValue::from("x"));
        assert_eq!(
            flattened.get_rule(&curve, &dataset).unwrap().operator,
            Operator::Remove
        );

        let private = InMemElement::new(Tag(0x0009, 0x1001), VR::LO, PrimitiveValue::from("x"));
        assert_eq!(
            flattened.get_rule(&private, &dataset).unwrap().operator,
            Operator::Clean
        );
    }
}
