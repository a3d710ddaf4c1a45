//! Declarative rule engine.
//!
//! Every group is recomputed from the current flags and reinstalled by
//! removing its whole id range and adding the rules the flags imply. Nothing
//! is diffed against what the sink currently holds, so applying a group twice
//! is always safe.

use crate::error::RelayResult;
use crate::metrics;
use crate::traits::RuleSink;
use burner_core::config::{PanelConfig, RulesConfig};
use burner_core::flags::{ConfigFlags, FLAG_KEYS};
use burner_core::rules::{
    HeaderOperation, ResourceType, Rule, RuleAction, RuleCondition, RuleDiff, RuleGroup,
};
use burner_storage::KeyValueStore;
use std::sync::Arc;

/// Response header advertising HTTP/3.
pub const ALT_SVC_HEADER: &str = "alt-svc";

/// Computes and installs rule groups.
pub struct RuleEngine {
    rules: RulesConfig,
    panel: PanelConfig,
    synced: Arc<dyn KeyValueStore>,
    sink: Arc<dyn RuleSink>,
}

impl RuleEngine {
    pub fn new(
        rules: RulesConfig,
        panel: PanelConfig,
        synced: Arc<dyn KeyValueStore>,
        sink: Arc<dyn RuleSink>,
    ) -> Self {
        Self {
            rules,
            panel,
            synced,
            sink,
        }
    }

    /// Current flags, absent keys decoded as their defaults.
    pub async fn load_flags(&self) -> RelayResult<ConfigFlags> {
        let entries = self.synced.get(&FLAG_KEYS).await?;
        Ok(ConfigFlags::from_entries(&entries))
    }

    /// Recompute and install every group. Returns false if any group failed;
    /// the remaining groups are still attempted.
    pub async fn apply_all(&self) -> bool {
        self.apply_groups(&RuleGroup::ALL).await
    }

    /// Recompute and install the given groups.
    pub async fn apply_groups(&self, groups: &[RuleGroup]) -> bool {
        let flags = match self.load_flags().await {
            Ok(flags) => flags,
            Err(e) => {
                tracing::error!(error = %e, "Could not read flags, rules left unchanged");
                return false;
            }
        };

        let mut all_ok = true;
        for group in groups {
            all_ok &= self.install(*group, &flags).await;
        }
        all_ok
    }

    /// Recompute and install one group.
    pub async fn apply_group(&self, group: RuleGroup) -> bool {
        self.apply_groups(&[group]).await
    }

    async fn install(&self, group: RuleGroup, flags: &ConfigFlags) -> bool {
        let rules = self.desired_rules(group, flags);
        let count = rules.len();
        let diff = match RuleDiff::replace_group(group, rules) {
            Ok(diff) => diff,
            Err(e) => {
                metrics::RULE_INSTALL_FAILURES
                    .with_label_values(&[group.as_str()])
                    .inc();
                tracing::error!(group = %group, error = %e, "Rule group is malformed");
                return false;
            }
        };

        match self.sink.update_rules(diff).await {
            Ok(()) => {
                tracing::debug!(group = %group, rules = count, "Rule group installed");
                true
            }
            Err(e) => {
                metrics::RULE_INSTALL_FAILURES
                    .with_label_values(&[group.as_str()])
                    .inc();
                tracing::error!(group = %group, error = %e, "Rule group install failed");
                false
            }
        }
    }

    /// The rules `group` should hold under `flags`.
    pub fn desired_rules(&self, group: RuleGroup, flags: &ConfigFlags) -> Vec<Rule> {
        match group {
            RuleGroup::HeaderRewrite => self.header_rules(),
            RuleGroup::OverrideRedirect if flags.override_active() => self.override_rules(),
            RuleGroup::QuicSuppression if flags.quic_disabled => self.quic_rules(),
            RuleGroup::OverrideRedirect | RuleGroup::QuicSuppression => Vec::new(),
        }
    }

    fn header_rules(&self) -> Vec<Rule> {
        let start = *RuleGroup::HeaderRewrite.id_range().start();
        let domain = &self.panel.domain;
        vec![
            Rule {
                id: start,
                priority: self.rules.header_priority,
                action: RuleAction::ModifyHeaders {
                    request_headers: vec![
                        HeaderOperation::set("Origin", &self.panel.origin),
                        HeaderOperation::set("Referer", &self.panel.referer),
                        HeaderOperation::set("Host", domain),
                    ],
                    response_headers: vec![],
                },
                condition: RuleCondition {
                    url_filter: format!("||{domain}/"),
                    resource_types: vec![ResourceType::Xmlhttprequest, ResourceType::Other],
                    initiator_domains: self.rules.initiator_domains.clone(),
                },
            },
            Rule {
                id: start + 1,
                priority: self.rules.header_priority,
                action: RuleAction::ModifyHeaders {
                    request_headers: vec![HeaderOperation::set("Origin", &self.panel.origin)],
                    response_headers: vec![],
                },
                condition: RuleCondition {
                    url_filter: format!("||{domain}^"),
                    resource_types: vec![ResourceType::Websocket],
                    initiator_domains: self.rules.initiator_domains.clone(),
                },
            },
        ]
    }

    fn override_rules(&self) -> Vec<Rule> {
        let start = *RuleGroup::OverrideRedirect.id_range().start();
        let priority = self.rules.override_priority;

        // Blocks come first; the redirect shares their tier.
        let mut rules: Vec<Rule> = self
            .rules
            .block_url_filters
            .iter()
            .zip(start + 1..)
            .map(|(filter, id)| Rule {
                id,
                priority,
                action: RuleAction::Block,
                condition: RuleCondition {
                    url_filter: filter.clone(),
                    resource_types: vec![
                        ResourceType::Script,
                        ResourceType::Stylesheet,
                        ResourceType::Image,
                        ResourceType::Font,
                        ResourceType::SubFrame,
                        ResourceType::Xmlhttprequest,
                    ],
                    initiator_domains: vec![],
                },
            })
            .collect();

        rules.push(Rule {
            id: start,
            priority,
            action: RuleAction::Redirect {
                url: self.rules.override_redirect_url.clone(),
            },
            condition: RuleCondition {
                url_filter: self.rules.override_url_filter.clone(),
                resource_types: vec![ResourceType::Script],
                initiator_domains: vec![],
            },
        });
        rules
    }

    fn quic_rules(&self) -> Vec<Rule> {
        vec![Rule {
            id: *RuleGroup::QuicSuppression.id_range().start(),
            priority: self.rules.header_priority,
            action: RuleAction::ModifyHeaders {
                request_headers: vec![],
                response_headers: vec![HeaderOperation::remove(ALT_SVC_HEADER)],
            },
            condition: RuleCondition {
                url_filter: format!("||{}^", self.panel.domain),
                resource_types: vec![
                    ResourceType::MainFrame,
                    ResourceType::SubFrame,
                    ResourceType::Script,
                    ResourceType::Stylesheet,
                    ResourceType::Xmlhttprequest,
                    ResourceType::Websocket,
                    ResourceType::Other,
                ],
                initiator_domains: vec![],
            },
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::MemoryRuleSink;
    use burner_storage::MemoryStore;

    fn engine() -> RuleEngine {
        RuleEngine::new(
            RulesConfig::default(),
            PanelConfig::default(),
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryRuleSink::new()),
        )
    }

    #[test]
    fn every_group_stays_inside_its_range() {
        let engine = engine();
        let all_on = ConfigFlags {
            enabled: true,
            override_source_enabled: true,
            quic_disabled: true,
        };
        for group in RuleGroup::ALL {
            let rules = engine.desired_rules(group, &all_on);
            assert!(!rules.is_empty(), "{group} should have rules");
            assert!(rules.iter().all(|r| group.owns(r.id)), "{group} leaks ids");
            RuleDiff::replace_group(group, rules).unwrap();
        }
    }

    #[test]
    fn override_blocks_share_the_redirect_tier() {
        let engine = engine();
        let rules = engine.desired_rules(RuleGroup::OverrideRedirect, &ConfigFlags::default());
        let redirect = rules
            .iter()
            .find(|r| matches!(r.action, RuleAction::Redirect { .. }))
            .unwrap();
        assert!(rules.iter().filter(|r| r.is_block()).count() >= 1);
        assert!(rules.iter().all(|r| r.priority == redirect.priority));
        assert!(rules.first().unwrap().is_block());
    }

    #[test]
    fn controlling_flags_empty_their_groups() {
        let engine = engine();
        let flags = ConfigFlags {
            enabled: false,
            override_source_enabled: true,
            quic_disabled: false,
        };
        assert!(engine.desired_rules(RuleGroup::OverrideRedirect, &flags).is_empty());
        assert!(engine.desired_rules(RuleGroup::QuicSuppression, &flags).is_empty());
        assert!(!engine.desired_rules(RuleGroup::HeaderRewrite, &flags).is_empty());
    }

    #[test]
    fn quic_rule_strips_alt_svc() {
        let engine = engine();
        let flags = ConfigFlags {
            quic_disabled: true,
            ..Default::default()
        };
        let rules = engine.desired_rules(RuleGroup::QuicSuppression, &flags);
        match &rules[0].action {
            RuleAction::ModifyHeaders {
                response_headers, ..
            } => assert_eq!(response_headers, &vec![HeaderOperation::remove("alt-svc")]),
            other => panic!("unexpected action: {other:?}"),
        }
    }
}
