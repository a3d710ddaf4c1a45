//! Declarative network rule model.
//!
//! Rules are shaped after the declarative packet-filter API the add-on talks
//! to: an id, a priority, a match condition and a single action. Ids are
//! partitioned by [`RuleGroup`] so a group can always be reinstalled by
//! removing its whole range and adding whatever the current flags imply.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;

/// Resource types a rule condition can match.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    MainFrame,
    SubFrame,
    Stylesheet,
    Script,
    Image,
    Font,
    Xmlhttprequest,
    Websocket,
    Media,
    Other,
}

/// A single header mutation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "camelCase")]
pub enum HeaderOperation {
    Set { header: String, value: String },
    Remove { header: String },
}

impl HeaderOperation {
    pub fn set(header: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Set {
            header: header.into(),
            value: value.into(),
        }
    }

    pub fn remove(header: impl Into<String>) -> Self {
        Self::Remove {
            header: header.into(),
        }
    }
}

/// What a matching rule does.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RuleAction {
    #[serde(rename_all = "camelCase")]
    ModifyHeaders {
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        request_headers: Vec<HeaderOperation>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        response_headers: Vec<HeaderOperation>,
    },
    Block,
    Redirect { url: String },
}

/// When a rule applies.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleCondition {
    pub url_filter: String,
    pub resource_types: Vec<ResourceType>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub initiator_domains: Vec<String>,
}

/// One declarative rule.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub id: u32,
    pub priority: u32,
    pub action: RuleAction,
    pub condition: RuleCondition,
}

impl Rule {
    pub fn is_block(&self) -> bool {
        matches!(self.action, RuleAction::Block)
    }
}

/// Disjoint partitions of the rule id namespace.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleGroup {
    /// Origin/Referer/Host rewrites for panel traffic. Always installed.
    HeaderRewrite,
    /// Asset redirect plus third-party block rules.
    OverrideRedirect,
    /// Strips the HTTP/3 advertisement header.
    QuicSuppression,
}

impl RuleGroup {
    pub const ALL: [RuleGroup; 3] = [
        RuleGroup::HeaderRewrite,
        RuleGroup::OverrideRedirect,
        RuleGroup::QuicSuppression,
    ];

    /// The id range this group owns.
    pub fn id_range(self) -> RangeInclusive<u32> {
        match self {
            Self::HeaderRewrite => 1..=99,
            Self::OverrideRedirect => 100..=199,
            Self::QuicSuppression => 200..=209,
        }
    }

    pub fn owns(self, id: u32) -> bool {
        self.id_range().contains(&id)
    }

    /// The group owning `id`, if any.
    pub fn for_id(id: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|g| g.owns(id))
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::HeaderRewrite => "header_rewrite",
            Self::OverrideRedirect => "override_redirect",
            Self::QuicSuppression => "quic_suppression",
        }
    }
}

impl fmt::Display for RuleGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One call to the rule-installation sink.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleDiff {
    pub remove_rule_ids: Vec<u32>,
    pub add_rules: Vec<Rule>,
}

impl RuleDiff {
    /// Build the full replacement diff for `group`.
    ///
    /// Removes every id the group owns and adds `rules`, which must all carry
    /// ids inside the group's range and be unique.
    pub fn replace_group(group: RuleGroup, rules: Vec<Rule>) -> Result<Self> {
        let mut seen = std::collections::HashSet::new();
        for rule in &rules {
            if !group.owns(rule.id) {
                return Err(Error::InvalidRule(format!(
                    "rule id {} is outside the {} range {:?}",
                    rule.id,
                    group,
                    group.id_range()
                )));
            }
            if !seen.insert(rule.id) {
                return Err(Error::InvalidRule(format!("duplicate rule id {}", rule.id)));
            }
        }
        Ok(Self {
            remove_rule_ids: group.id_range().collect(),
            add_rules: rules,
        })
    }
}
