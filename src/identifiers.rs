//! Ways to designate a single DICOM tag or a whole group of tags.
//!
//! Plain tags are not expressive enough for de-identification rules. A rule
//! may need to cover all curve data (`50xx,xxxx`), every private element, or
//! one element inside a named private block whose group position is only
//! known at runtime. [`TagIdentifier`] is the closed set of these shapes.

use std::fmt;
use std::str::FromStr;

use dicom_core::header::Header;
use dicom_core::{DataDictionary, Tag};
use dicom_dictionary_std::StandardDataDictionary;
use dicom_object::mem::InMemElement;
use dicom_object::InMemDicomObject;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentifierError {
    #[error("invalid tag identifier: {}", .0.to_lowercase())]
    InvalidFormat(String),
}

pub type Result<T, E = IdentifierError> = std::result::Result<T, E>;

/// Identifies one DICOM tag or a group of tags that a rule applies to.
///
/// Identifiers are ordered by how many distinct tags they could match
/// ([`TagIdentifier::number_of_matchable_tags`]); the fewer, the more
/// specific. Rule lookup relies on this ordering so that, for example, a
/// rule for one named private block wins over a blanket private-tags rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TagIdentifier {
    /// Exactly one tag, like `(0010,0010)`.
    Single(Tag),
    /// A repeater pattern with `x` wildcard nibbles, like `(50xx,xxxx)`.
    RepeatingGroup(RepeatingTag),
    /// One element offset inside a named private block, like
    /// `0075,[MyCompany]01`.
    PrivateBlock(PrivateBlockTag),
    /// Any element with an odd group number.
    AnyPrivate,
}

impl TagIdentifier {
    /// True if the given element is covered by this identifier.
    ///
    /// Private-block identifiers need the containing dataset to resolve the
    /// private creator reservation; the other variants ignore it.
    pub fn matches(&self, elem: &InMemElement, dataset: &InMemDicomObject) -> bool {
        match self {
            TagIdentifier::Single(tag) => elem.tag() == *tag,
            TagIdentifier::RepeatingGroup(pattern) => pattern.matches(elem.tag()),
            TagIdentifier::PrivateBlock(block) => block.matches(elem.tag(), dataset),
            TagIdentifier::AnyPrivate => is_private_tag(elem.tag()),
        }
    }

    /// The number of distinct tags this identifier could match. Lower means
    /// more specific.
    pub fn number_of_matchable_tags(&self) -> u64 {
        match self {
            TagIdentifier::Single(_) => 1,
            TagIdentifier::PrivateBlock(_) => 1,
            TagIdentifier::RepeatingGroup(pattern) => {
                16u64.pow(pattern.wildcard_nibbles())
            }
            TagIdentifier::AnyPrivate => 1 << 31,
        }
    }

    /// Stable string form, used as dictionary key and for equality. Feeding
    /// the key back through [`FromStr`] recreates the identifier.
    pub fn key(&self) -> String {
        match self {
            TagIdentifier::Single(tag) => tag_to_key(*tag),
            TagIdentifier::RepeatingGroup(pattern) => pattern.pattern().to_string(),
            TagIdentifier::PrivateBlock(block) => block.to_string(),
            TagIdentifier::AnyPrivate => "private".to_string(),
        }
    }

    /// Human-readable name, resolved through the standard data dictionary
    /// where possible.
    pub fn name(&self) -> String {
        match self {
            TagIdentifier::Single(tag) => {
                let dict = StandardDataDictionary;
                dict.by_tag(*tag)
                    .map(|entry| entry.alias.to_string())
                    .unwrap_or_else(|| format!("Unknown tag {tag}"))
            }
            TagIdentifier::RepeatingGroup(pattern) => format!("Repeating group {pattern}"),
            TagIdentifier::PrivateBlock(block) => format!("Private element {block}"),
            TagIdentifier::AnyPrivate => "Private attributes".to_string(),
        }
    }
}

impl fmt::Display for TagIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagIdentifier::Single(tag) => write!(f, "{tag}"),
            TagIdentifier::RepeatingGroup(pattern) => write!(f, "{pattern}"),
            TagIdentifier::PrivateBlock(block) => write!(f, "{block}"),
            TagIdentifier::AnyPrivate => write!(f, "private"),
        }
    }
}

impl From<Tag> for TagIdentifier {
    fn from(tag: Tag) -> Self {
        TagIdentifier::Single(tag)
    }
}

impl FromStr for TagIdentifier {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("private") {
            return Ok(TagIdentifier::AnyPrivate);
        }
        if trimmed.contains('[') {
            return Ok(TagIdentifier::PrivateBlock(trimmed.parse()?));
        }
        let normalized = normalize_tag_string(trimmed)?;
        if normalized.contains('x') {
            Ok(TagIdentifier::RepeatingGroup(RepeatingTag::new(trimmed)?))
        } else {
            let value = u32::from_str_radix(&normalized, 16)
                .map_err(|e| IdentifierError::InvalidFormat(format!("{trimmed}: {e}")))?;
            Ok(TagIdentifier::Single(Tag(
                (value >> 16) as u16,
                (value & 0xFFFF) as u16,
            )))
        }
    }
}

/// Tags with an odd group number are private.
pub(crate) fn is_private_tag(tag: Tag) -> bool {
    tag.group() % 2 != 0
}

/// A private creator reservation element, like `(0075,0010)`. Its value
/// names the vendor owning data elements `(0075,10xx)`.
pub(crate) fn is_private_creator_tag(tag: Tag) -> bool {
    is_private_tag(tag) && (0x0010..=0x00FF).contains(&tag.element())
}

/// Eight lowercase hex characters, like `00100010`. The internal dictionary
/// key format for exact-match lookup.
pub(crate) fn tag_to_key(tag: Tag) -> String {
    format!("{:04x}{:04x}", tag.group(), tag.element())
}

/// The private creator name reserving the block that `tag` belongs to, read
/// from the dataset, or `None` when no reservation is present.
pub(crate) fn private_creator_for(dataset: &InMemDicomObject, tag: Tag) -> Option<String> {
    let block = tag.element() >> 8;
    if !(0x10..=0xFF).contains(&block) {
        return None;
    }
    dataset
        .element(Tag(tag.group(), block))
        .ok()
        .and_then(|elem| elem.to_str().ok())
        .map(|value| value.trim_end_matches(['\0', ' ']).to_string())
}

/// Strips brackets, comma and whitespace; lowercases. Result is exactly 8
/// characters of hex or `x`, or an error.
fn normalize_tag_string(tag: &str) -> Result<String> {
    let cleaned: String = tag
        .chars()
        .filter(|c| !matches!(c, '(' | ')' | ',' | ' '))
        .collect::<String>()
        .to_lowercase();
    if cleaned.len() != 8 {
        return Err(IdentifierError::InvalidFormat(format!(
            "tag should be 8 characters long, got \"{tag}\""
        )));
    }
    if !cleaned.chars().all(|c| c.is_ascii_hexdigit() || c == 'x') {
        return Err(IdentifierError::InvalidFormat(format!(
            "non-\"x\" parts of \"{tag}\" are not hexadecimal"
        )));
    }
    Ok(cleaned)
}

/// A DICOM repeater tag with `x` wildcard nibbles, like `50xx,xxxx` for
/// curve data. Matching uses a bitmask over the 32-bit tag value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepeatingTag {
    // normalized: 8 chars, lowercase hex or 'x'
    pattern: String,
}

impl RepeatingTag {
    pub fn new(pattern: &str) -> Result<Self> {
        let normalized = normalize_tag_string(pattern)?;
        Ok(Self {
            pattern: normalized,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Byte mask that removes the nibble positions holding `x`.
    ///
    /// `50xx,xxxx` -> `0xFF000000`, `0010,xx10` -> `0xFFFF00FF`.
    pub fn as_mask(&self) -> u32 {
        self.pattern
            .chars()
            .fold(0u32, |acc, c| (acc << 4) | if c == 'x' { 0x0 } else { 0xF })
    }

    /// The value of all non-`x` nibbles: `50xx,xxxx` -> `0x50000000`.
    pub fn static_component(&self) -> u32 {
        let hex: String = self
            .pattern
            .chars()
            .map(|c| if c == 'x' { '0' } else { c })
            .collect();
        u32::from_str_radix(&hex, 16).expect("normalized pattern is valid hex")
    }

    pub fn wildcard_nibbles(&self) -> u32 {
        self.pattern.chars().filter(|c| *c == 'x').count() as u32
    }

    pub fn matches(&self, tag: Tag) -> bool {
        let value = ((tag.group() as u32) << 16) | tag.element() as u32;
        value & self.as_mask() == self.static_component()
    }
}

impl fmt::Display for RepeatingTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", &self.pattern[..4], &self.pattern[4..])
    }
}

impl FromStr for RepeatingTag {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self> {
        RepeatingTag::new(s)
    }
}

/// One element offset inside a named private block.
///
/// `0075,[MyCompany]01` designates element offset `0x01` of whichever block
/// in group `0x0075` the dataset has reserved for creator `MyCompany`. The
/// concrete tag can only be resolved against a dataset.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PrivateBlockTag {
    group: u16,
    creator: String,
    element_offset: u8,
}

impl PrivateBlockTag {
    pub fn new(group: u16, creator: impl Into<String>, element_offset: u8) -> Result<Self> {
        if group % 2 == 0 {
            return Err(IdentifierError::InvalidFormat(format!(
                "group {group:04x} is even, private blocks live in odd groups"
            )));
        }
        let creator = creator.into();
        if creator.is_empty() {
            return Err(IdentifierError::InvalidFormat(
                "private creator name cannot be empty".to_string(),
            ));
        }
        Ok(Self {
            group,
            creator,
            element_offset,
        })
    }

    pub fn group(&self) -> u16 {
        self.group
    }

    pub fn creator(&self) -> &str {
        &self.creator
    }

    pub fn element_offset(&self) -> u8 {
        self.element_offset
    }

    /// True when `tag` sits at this offset of a block that the dataset has
    /// reserved for this creator.
    pub fn matches(&self, tag: Tag, dataset: &InMemDicomObject) -> bool {
        if tag.group() != self.group || (tag.element() & 0xFF) as u8 != self.element_offset {
            return false;
        }
        match private_creator_for(dataset, tag) {
            Some(creator) => creator == self.creator,
            None => false,
        }
    }
}

impl fmt::Display for PrivateBlockTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04x},[{}]{:02x}",
            self.group, self.creator, self.element_offset
        )
    }
}

impl FromStr for PrivateBlockTag {
    type Err = IdentifierError;

    /// Parses `"gggg,[Creator]ee"`, parentheses optional.
    fn from_str(s: &str) -> Result<Self> {
        let cleaned = s.trim().trim_start_matches('(').trim_end_matches(')');
        let open = cleaned
            .find('[')
            .ok_or_else(|| bad_private_block(cleaned))?;
        let close = cleaned
            .rfind(']')
            .ok_or_else(|| bad_private_block(cleaned))?;
        if close < open {
            return Err(bad_private_block(cleaned));
        }
        let group_part = cleaned[..open].trim().trim_end_matches(',');
        let creator = &cleaned[open + 1..close];
        let offset_part = cleaned[close + 1..].trim();

        let group = u16::from_str_radix(group_part, 16).map_err(|_| bad_private_block(cleaned))?;
        let element_offset =
            u8::from_str_radix(offset_part, 16).map_err(|_| bad_private_block(cleaned))?;
        PrivateBlockTag::new(group, creator, element_offset)
    }
}

fn bad_private_block(input: &str) -> IdentifierError {
    IdentifierError::InvalidFormat(format!(
        "\"{input}\" is not a valid private block tag, expected \"gggg,[Creator]ee\""
    ))
}
