//! In-process rule sink and cookie jar.

use crate::error::{RelayError, RelayResult};
use crate::traits::{Cookie, CookieStore, RuleSink};
use async_trait::async_trait;
use burner_core::rules::{Rule, RuleDiff};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        tracing::warn!("Mutex was poisoned, recovering");
        poisoned.into_inner()
    })
}

/// Rule sink that keeps the installed rule set in memory.
///
/// Applies removals before additions and rejects a diff that would leave two
/// rules under one id.
#[derive(Debug, Default)]
pub struct MemoryRuleSink {
    installed: Mutex<BTreeMap<u32, Rule>>,
}

impl MemoryRuleSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installed rules ordered by id.
    pub fn installed(&self) -> Vec<Rule> {
        lock(&self.installed).values().cloned().collect()
    }

    pub fn installed_ids(&self) -> Vec<u32> {
        lock(&self.installed).keys().copied().collect()
    }
}

#[async_trait]
impl RuleSink for MemoryRuleSink {
    async fn update_rules(&self, diff: RuleDiff) -> RelayResult<()> {
        let mut installed = lock(&self.installed);
        let mut next = installed.clone();
        for id in &diff.remove_rule_ids {
            next.remove(id);
        }
        for rule in diff.add_rules {
            if next.contains_key(&rule.id) {
                return Err(RelayError::RuleInstallFailed(format!(
                    "rule id {} is already installed",
                    rule.id
                )));
            }
            next.insert(rule.id, rule);
        }
        *installed = next;
        Ok(())
    }
}

/// Cookie store backed by a map of domain to cookies.
#[derive(Debug, Default)]
pub struct MemoryCookieJar {
    cookies: Mutex<HashMap<String, Vec<Cookie>>>,
}

impl MemoryCookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set or replace cookie `name` for `domain`.
    pub fn insert(&self, domain: &str, name: &str, value: &str) {
        let mut cookies = lock(&self.cookies);
        let jar = cookies.entry(normalize_domain(domain)).or_default();
        jar.retain(|c| c.name != name);
        jar.push(Cookie {
            name: name.to_string(),
            value: value.to_string(),
        });
    }
}

fn normalize_domain(domain: &str) -> String {
    domain.trim_start_matches('.').to_ascii_lowercase()
}

#[async_trait]
impl CookieStore for MemoryCookieJar {
    /// Cookies for `domain` and every parent domain, most specific first.
    async fn get_all(&self, domain: &str) -> RelayResult<Vec<Cookie>> {
        let cookies = lock(&self.cookies);
        let mut domain = normalize_domain(domain);
        let mut found = Vec::new();
        loop {
            if let Some(jar) = cookies.get(&domain) {
                found.extend(jar.iter().cloned());
            }
            match domain.split_once('.') {
                Some((_, parent)) if parent.contains('.') => domain = parent.to_string(),
                _ => break,
            }
        }
        Ok(found)
    }
}
