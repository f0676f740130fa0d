//! The orchestrator: composes bouncers, pixel processing, the profile and
//! the safe private definition into one `deidentify` call.

use dicom_core::header::Header;
use dicom_core::value::{DataSetSequence, Value};
use dicom_core::{DataElement, PrimitiveValue, Tag, VR};
use dicom_dictionary_std::tags;
use dicom_object::mem::InMemElement;
use dicom_object::meta::FileMetaTableBuilder;
use dicom_object::{DefaultDicomObject, InMemDicomObject, ReadError, WriteError};
use log::warn;
use thiserror::Error;

use crate::bouncers::{
    BounceError, Bouncer, RejectBurnedInAnnotation, RejectEncapsulatedImageStorage, RejectKogsps,
    RejectNonStandardDicom,
};
use crate::config::{default_profile, UidRoot, UID_ROOT_DEFAULT_VALUE};
use crate::identifiers::is_private_creator_tag;
use crate::insertions;
use crate::operators::{OperatorContext, OperatorError, Outcome};
use crate::pixel::{PixelProcessingError, PixelProcessor};
use crate::private::SafePrivateDefinition;
use crate::rules::{Profile, RuleSet};
use crate::time_shift::TimeDeltaProvider;

const MAX_SEQUENCE_DEPTH: usize = 32;

#[derive(Error, Debug)]
pub enum DeidentificationError {
    #[error("dataset rejected ({description}): {reason}")]
    BounceRejected { description: String, reason: String },

    #[error("cannot decide whether dataset is acceptable ({description}): {reason}")]
    BounceUndecidable { description: String, reason: String },

    #[error("pixel processing: {0}")]
    Pixel(#[from] PixelProcessingError),

    #[error("operator failed on tag {tag}: {source}")]
    Operator { tag: Tag, source: OperatorError },

    #[error("sequences nested deeper than {0} levels")]
    NestingTooDeep(usize),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("read error: {0}")]
    Read(#[from] ReadError),

    #[error("write error: {0}")]
    Write(#[from] WriteError),

    #[error("file meta error: {0}")]
    Meta(String),
}

pub type Result<T, E = DeidentificationError> = std::result::Result<T, E>;

/// What happens to elements no rule matches.
///
/// The default is [`Keep`](UnmatchedTagPolicy::Keep): an unmatched element
/// passes through unchanged, and removal must be opted into per rule or by
/// switching the policy to `Remove`. The policy is deliberately explicit
/// configuration so the behaviour is never implicit in the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnmatchedTagPolicy {
    #[default]
    Keep,
    Remove,
}

/// De-identifies DICOM datasets. Holds all configuration needed to do so.
///
/// Construction goes through [`CoreBuilder`]. A `Core` is immutable once
/// built and can be shared across threads; the only interior state is the
/// time shift cache, which synchronizes itself.
#[derive(Debug)]
pub struct Core {
    profile: Profile,
    bouncers: Vec<Box<dyn Bouncer>>,
    safe_private: SafePrivateDefinition,
    pixel_processor: PixelProcessor,
    time_shift: TimeDeltaProvider,
    insertions: Vec<InMemElement>,
    unmatched_policy: UnmatchedTagPolicy,
    uid_root: UidRoot,
}

impl Core {
    pub fn builder() -> CoreBuilder {
        CoreBuilder::new()
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    /// De-identifies one dataset.
    ///
    /// 1. Runs the two-phase bounce protocol; terminal rejections abort.
    /// 2. Cleans pixel data when the dataset needs it, then gives bouncers
    ///    that objected to the uncleaned dataset exactly one more look.
    /// 3. Applies the flattened profile to every element, recursing into
    ///    sequence items before their parent element.
    /// 4. Downgrades private creator removals that would orphan surviving
    ///    private elements.
    /// 5. Appends the configured insertion elements.
    pub fn deidentify(&self, obj: DefaultDicomObject) -> Result<DefaultDicomObject> {
        let mut obj = obj;

        let maybe_allow = self.determine_bouncer_results(&obj)?;

        if self.pixel_processor.needs_cleaning(&obj)? {
            self.pixel_processor.clean_pixel_data(&mut obj)?;
        }

        // bouncers that rejected the real dataset but passed the optimistic
        // check get re-run once against the cleaned dataset
        for index in maybe_allow {
            let bouncer = &self.bouncers[index];
            match bouncer.inspect(&obj) {
                Ok(()) => {}
                Err(BounceError::Rejected { reason }) => {
                    return Err(DeidentificationError::BounceRejected {
                        description: bouncer.description().to_string(),
                        reason,
                    });
                }
                Err(BounceError::Undecidable { reason }) => {
                    return Err(DeidentificationError::BounceUndecidable {
                        description: bouncer.description().to_string(),
                        reason,
                    });
                }
            }
        }

        let rules = self.profile.flatten(&[]);
        let ctx = OperatorContext {
            uid_root: &self.uid_root,
            safe_private: &self.safe_private,
            time_shift: &self.time_shift,
        };

        self.deidentify_dataset(&rules, &ctx, &mut obj, 0)?;

        for elem in &self.insertions {
            obj.put(elem.clone());
        }

        self.rebuild_file_meta(obj)
    }

    /// The two-phase acceptance check.
    ///
    /// Phase one inspects a virtual copy of the dataset patched with
    /// `BurnedInAnnotation = NO`: a rejection under this optimistic patch is
    /// terminal, since no amount of pixel cleaning could change the verdict.
    /// Phase two inspects the dataset as it really is; bouncers that reject
    /// (or cannot decide) here may be satisfied by pixel cleaning and are
    /// returned for a single re-check.
    ///
    /// The patch is applied to a clone, so the caller's dataset is
    /// untouched whatever happens.
    fn determine_bouncer_results(&self, obj: &DefaultDicomObject) -> Result<Vec<usize>> {
        if self.bouncers.is_empty() {
            return Ok(Vec::new());
        }

        let mut patched = obj.clone();
        patched.put(DataElement::new::<PrimitiveValue>(
            tags::BURNED_IN_ANNOTATION,
            VR::CS,
            PrimitiveValue::from("NO"),
        ));

        for bouncer in &self.bouncers {
            match bouncer.inspect(&patched) {
                Ok(()) => {}
                Err(BounceError::Rejected { reason }) => {
                    return Err(DeidentificationError::BounceRejected {
                        description: bouncer.description().to_string(),
                        reason,
                    });
                }
                Err(BounceError::Undecidable { reason }) => {
                    return Err(DeidentificationError::BounceUndecidable {
                        description: bouncer.description().to_string(),
                        reason,
                    });
                }
            }
        }

        let mut maybe_allow = Vec::new();
        for (index, bouncer) in self.bouncers.iter().enumerate() {
            if bouncer.inspect(obj).is_err() {
                maybe_allow.push(index);
            }
        }
        Ok(maybe_allow)
    }

    /// Applies the flattened rules to one dataset level.
    ///
    /// Sequence items are processed before the rule for their containing
    /// element, so a rule removing a whole sequence still wins. Mutations
    /// are staged first and applied afterwards; the private creator
    /// integrity pass runs strictly after all other mutations.
    fn deidentify_dataset(
        &self,
        rules: &RuleSet,
        ctx: &OperatorContext<'_>,
        dataset: &mut InMemDicomObject,
        depth: usize,
    ) -> Result<()> {
        if depth >= MAX_SEQUENCE_DEPTH {
            return Err(DeidentificationError::NestingTooDeep(MAX_SEQUENCE_DEPTH));
        }

        // recurse into sequence items first
        let sequence_tags: Vec<Tag> = dataset
            .iter()
            .filter(|elem| matches!(elem.value(), Value::Sequence(_)))
            .map(|elem| elem.tag())
            .collect();
        for tag in sequence_tags {
            let items: Vec<InMemDicomObject> = match dataset.element(tag) {
                Ok(elem) => match elem.value() {
                    Value::Sequence(seq) => seq.items().to_vec(),
                    _ => continue,
                },
                Err(_) => continue,
            };
            let mut new_items = items;
            for item in &mut new_items {
                self.deidentify_dataset(rules, ctx, item, depth + 1)?;
            }
            dataset.put(InMemElement::new(
                tag,
                VR::SQ,
                Value::Sequence(DataSetSequence::from(new_items)),
            ));
        }

        enum Staged {
            Replace(InMemElement),
            Remove,
        }

        let mut staged: Vec<(Tag, Staged)> = Vec::new();
        let view: &InMemDicomObject = dataset;
        for elem in view.iter() {
            let outcome = match rules.get_rule(elem, view) {
                Some(rule) => rule.operator.apply(ctx, view, elem).map_err(|source| {
                    DeidentificationError::Operator {
                        tag: elem.tag(),
                        source,
                    }
                })?,
                None => match self.unmatched_policy {
                    UnmatchedTagPolicy::Keep => Outcome::Keep,
                    UnmatchedTagPolicy::Remove => Outcome::Remove,
                },
            };
            match outcome {
                Outcome::Keep => {}
                Outcome::Replace(new_elem) => staged.push((elem.tag(), Staged::Replace(new_elem))),
                Outcome::Remove => staged.push((elem.tag(), Staged::Remove)),
            }
        }

        // apply replacements and plain removals; creator removals wait for
        // the integrity pass
        let mut creator_removals: Vec<Tag> = Vec::new();
        for (tag, mutation) in staged {
            match mutation {
                Staged::Replace(new_elem) => {
                    dataset.put(new_elem);
                }
                Staged::Remove if is_private_creator_tag(tag) => creator_removals.push(tag),
                Staged::Remove => {
                    dataset.remove_element(tag);
                }
            }
        }

        // integrity beats policy: a creator declaration whose block still
        // holds elements is kept, with a warning
        for tag in creator_removals {
            if has_dependent_private_elements(dataset, tag) {
                warn!(
                    "not removing private creator {tag} because private elements in its block remain"
                );
            } else {
                dataset.remove_element(tag);
            }
        }

        Ok(())
    }

    /// Rebuilds the file meta group so its media storage UIDs match the
    /// possibly re-derived SOP instance and class UIDs.
    fn rebuild_file_meta(&self, obj: DefaultDicomObject) -> Result<DefaultDicomObject> {
        let transfer_syntax = obj.meta().transfer_syntax().to_string();
        let dataset = obj.into_inner();

        let read_uid = |tag: Tag| -> Option<String> {
            dataset
                .element(tag)
                .ok()
                .and_then(|elem| elem.to_str().ok())
                .map(|value| value.trim_end_matches(['\0', ' ']).to_string())
        };

        let mut builder = FileMetaTableBuilder::new().transfer_syntax(transfer_syntax);
        if let Some(sop_class_uid) = read_uid(tags::SOP_CLASS_UID) {
            builder = builder.media_storage_sop_class_uid(sop_class_uid);
        }
        if let Some(sop_instance_uid) = read_uid(tags::SOP_INSTANCE_UID) {
            builder = builder.media_storage_sop_instance_uid(sop_instance_uid);
        }
        let meta = builder
            .build()
            .map_err(|e| DeidentificationError::Meta(e.to_string()))?;

        Ok(dataset.with_exact_meta(meta))
    }
}

/// True if the dataset still holds private data elements belonging to the
/// block that this creator element reserves.
fn has_dependent_private_elements(dataset: &InMemDicomObject, creator: Tag) -> bool {
    dataset.iter().any(|elem| {
        elem.tag().group() == creator.group() && (elem.tag().element() >> 8) == creator.element()
    })
}

/// Builds a [`Core`].
///
/// # Example
///
/// ```
/// use dicom_deidentify::core::{Core, UnmatchedTagPolicy};
///
/// let core = Core::builder()
///     .uid_root("1.2.840.123".parse().unwrap())
///     .unmatched_policy(UnmatchedTagPolicy::Keep)
///     .build();
/// ```
pub struct CoreBuilder {
    profile: Profile,
    bouncers: Vec<Box<dyn Bouncer>>,
    safe_private: SafePrivateDefinition,
    pixel_processor: PixelProcessor,
    time_shift: Option<TimeDeltaProvider>,
    insertions: Vec<InMemElement>,
    unmatched_policy: UnmatchedTagPolicy,
    uid_root: UidRoot,
}

impl CoreBuilder {
    /// Starts from an empty configuration: no bouncers, no safe private
    /// blocks, no pixel locations, an empty profile, and unmatched elements
    /// kept.
    pub fn new() -> Self {
        Self {
            profile: Profile::new("empty", vec![]),
            bouncers: Vec::new(),
            safe_private: SafePrivateDefinition::empty(),
            pixel_processor: PixelProcessor::default(),
            time_shift: None,
            insertions: Vec::new(),
            unmatched_policy: UnmatchedTagPolicy::Keep,
            uid_root: UidRoot::default(),
        }
    }

    pub fn profile(mut self, profile: Profile) -> Self {
        self.profile = profile;
        self
    }

    pub fn bouncer(mut self, bouncer: Box<dyn Bouncer>) -> Self {
        self.bouncers.push(bouncer);
        self
    }

    pub fn safe_private(mut self, safe_private: SafePrivateDefinition) -> Self {
        self.safe_private = safe_private;
        self
    }

    pub fn pixel_processor(mut self, pixel_processor: PixelProcessor) -> Self {
        self.pixel_processor = pixel_processor;
        self
    }

    /// Supplies the time shift provider. One provider per batch keeps date
    /// shifts consistent across all datasets of a study within that batch.
    pub fn time_shift(mut self, time_shift: TimeDeltaProvider) -> Self {
        self.time_shift = Some(time_shift);
        self
    }

    pub fn insertion(mut self, elem: InMemElement) -> Self {
        self.insertions.push(elem);
        self
    }

    pub fn unmatched_policy(mut self, policy: UnmatchedTagPolicy) -> Self {
        self.unmatched_policy = policy;
        self
    }

    pub fn uid_root(mut self, uid_root: UidRoot) -> Self {
        self.uid_root = uid_root;
        self
    }

    pub fn build(self) -> Core {
        Core {
            profile: self.profile,
            bouncers: self.bouncers,
            safe_private: self.safe_private,
            pixel_processor: self.pixel_processor,
            time_shift: self.time_shift.unwrap_or_default(),
            insertions: self.insertions,
            unmatched_policy: self.unmatched_policy,
            uid_root: self.uid_root,
        }
    }
}

impl Default for CoreBuilder {
    /// The default configuration: the default profile, the standard
    /// bouncers, the default UID root, and the PS3.15 insertion elements.
    fn default() -> Self {
        Self::new()
            .profile(default_profile())
            .bouncer(Box::new(RejectNonStandardDicom))
            .bouncer(Box::new(RejectKogsps))
            .bouncer(Box::new(RejectEncapsulatedImageStorage))
            .bouncer(Box::new(RejectBurnedInAnnotation))
            .uid_root(UidRoot::new(UID_ROOT_DEFAULT_VALUE).expect("default UID root is valid"))
            .insertion(insertions::patient_identity_removed())
            .insertion(insertions::deidentification_method(
                &insertions::default_method(),
            ))
    }
}

impl Default for Core {
    fn default() -> Self {
        CoreBuilder::default().build()
    }
}
