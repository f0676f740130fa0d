//! Rules tie tag identifiers to operators, rule sets resolve the most
//! specific rule for an element, and profiles stack rule sets with
//! later-overrides-earlier semantics.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use dicom_core::header::Header;
use dicom_object::mem::InMemElement;
use dicom_object::InMemDicomObject;

use crate::identifiers::{tag_to_key, TagIdentifier};
use crate::operators::Operator;

/// Defines what to do with a single DICOM element or group of elements.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub identifier: TagIdentifier,
    pub operator: Operator,
}

impl Rule {
    pub fn new(identifier: impl Into<TagIdentifier>, operator: Operator) -> Self {
        Self {
            identifier: identifier.into(),
            operator,
        }
    }

    /// The number of distinct tags this rule could match.
    pub fn number_of_matchable_tags(&self) -> u64 {
        self.identifier.number_of_matchable_tags()
    }

    pub fn matches(&self, elem: &InMemElement, dataset: &InMemDicomObject) -> bool {
        self.identifier.matches(elem, dataset)
    }

    pub fn as_human_readable(&self) -> String {
        format!(
            "{} - {} - {}",
            self.identifier.name(),
            self.identifier,
            self.operator
        )
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.identifier, self.operator)
    }
}

/// A named collection of rules with most-specific-match lookup.
///
/// Single-tag rules live in a dictionary for O(1) lookup; everything else
/// is kept in a list sorted ascending by generality. The sort is stable, so
/// rules of equal specificity keep their declaration order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RuleSet {
    name: String,
    // ordered by key so listings and serialized output are deterministic
    single_tag_rules: BTreeMap<String, Rule>,
    group_rules: Vec<Rule>,
}

impl RuleSet {
    pub fn new(name: impl Into<String>, rules: impl IntoIterator<Item = Rule>) -> Self {
        let mut set = Self {
            name: name.into(),
            single_tag_rules: BTreeMap::new(),
            group_rules: Vec::new(),
        };
        for rule in rules {
            set.insert(rule);
        }
        set
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Adds a rule. A rule for an already-present single tag replaces the
    /// earlier one; group rules accumulate.
    pub fn insert(&mut self, rule: Rule) {
        match &rule.identifier {
            TagIdentifier::Single(tag) => {
                self.single_tag_rules.insert(tag_to_key(*tag), rule);
            }
            _ => {
                let generality = rule.number_of_matchable_tags();
                // keep ascending order, inserting after equals to preserve
                // declaration order on ties
                let position = self
                    .group_rules
                    .partition_point(|r| r.number_of_matchable_tags() <= generality);
                self.group_rules.insert(position, rule);
            }
        }
    }

    /// The most specific rule for the given element, or `None`.
    ///
    /// Lookup is always done from specific to general: an exact single-tag
    /// rule first, then group rules in ascending order of how many tags they
    /// could match. A private-block rule for one named creator therefore
    /// wins over a blanket private rule regardless of declaration order.
    pub fn get_rule(&self, elem: &InMemElement, dataset: &InMemDicomObject) -> Option<&Rule> {
        if let Some(rule) = self.single_tag_rules.get(&tag_to_key(elem.tag())) {
            return Some(rule);
        }
        self.group_rules
            .iter()
            .find(|rule| rule.matches(elem, dataset))
    }

    /// All rules in this set, single-tag rules first.
    pub fn rules(&self) -> impl Iterator<Item = &Rule> {
        self.single_tag_rules.values().chain(self.group_rules.iter())
    }

    pub fn len(&self) -> usize {
        self.single_tag_rules.len() + self.group_rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All rules in this set as text, sorted by tag name.
    pub fn as_human_readable_list(&self) -> String {
        let mut lines: Vec<String> = self.rules().map(Rule::as_human_readable).collect();
        lines.sort();
        lines.join("\n")
    }
}

impl fmt::Display for RuleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RuleSet \"{}\"", self.name)
    }
}

/// An ordered stack of rule sets modelling one complete de-identification
/// procedure.
///
/// If two sets hold a rule for the same identifier, the set with the higher
/// index takes precedence. Identifiers that merely overlap in coverage (a
/// single tag and a repeating group that could match it) are left alone;
/// they are disambiguated at match time by specificity.
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    name: String,
    rule_sets: Vec<RuleSet>,
}

impl Profile {
    pub fn new(name: impl Into<String>, rule_sets: Vec<RuleSet>) -> Self {
        Self {
            name: name.into(),
            rule_sets,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rule_sets(&self) -> &[RuleSet] {
        &self.rule_sets
    }

    /// Collapses all rule sets into one, keyed by identifier.
    ///
    /// `additional_rule_sets` are treated as if appended to the profile, so
    /// they overrule it. Useful for one-off additions such as
    /// dataset-specific safe-private rules.
    pub fn flatten(&self, additional_rule_sets: &[RuleSet]) -> RuleSet {
        let mut merged: Vec<(String, Rule)> = Vec::new();
        let mut index_of: HashMap<String, usize> = HashMap::new();

        for rule_set in self.rule_sets.iter().chain(additional_rule_sets) {
            for rule in rule_set.rules() {
                let key = rule.identifier.key();
                match index_of.get(&key) {
                    Some(&i) => merged[i].1 = rule.clone(),
                    None => {
                        index_of.insert(key.clone(), merged.len());
                        merged.push((key, rule.clone()));
                    }
                }
            }
        }

        RuleSet::new("flattened", merged.into_iter().map(|(_, rule)| rule))
    }

    /// Human-readable listing of every rule set and its rules.
    pub fn describe(&self) -> String {
        let mut output = format!("Profile \"{}\"\n", self.name);
        for rule_set in &self.rule_sets {
            output.push_str(&format!("\n{}\n", rule_set));
            output.push_str(&rule_set.as_human_readable_list());
            output.push('\n');
        }
        output
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Profile \"{}\"", self.name)
    }
}
