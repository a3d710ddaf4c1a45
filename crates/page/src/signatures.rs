//! Challenge signature matching.
//!
//! Substring markers are compiled into Aho-Corasick automata once per page
//! load; every sample is then a single pass per attribute.

use crate::error::{PageError, PageResult};
use crate::traits::PageSnapshot;
use aho_corasick::AhoCorasick;
use burner_core::config::ChallengeSignatures;

/// Which signature matched.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Detection {
    Selector(String),
    Iframe(String),
    Form(String),
    Text(String),
}

/// Compiled challenge signatures.
#[derive(Clone, Debug)]
pub struct SignatureMatcher {
    selectors: Vec<String>,
    iframe: Option<Marker>,
    form: Option<Marker>,
    text: Option<Marker>,
}

#[derive(Clone, Debug)]
struct Marker {
    patterns: Vec<String>,
    automaton: AhoCorasick,
}

impl Marker {
    /// `None` when there is nothing to match.
    fn build(patterns: &[String], case_insensitive: bool) -> PageResult<Option<Self>> {
        let patterns: Vec<String> = patterns
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect();
        if patterns.is_empty() {
            return Ok(None);
        }
        let automaton = AhoCorasick::builder()
            .ascii_case_insensitive(case_insensitive)
            .build(&patterns)
            .map_err(|e| PageError::Signatures(e.to_string()))?;
        Ok(Some(Self {
            patterns,
            automaton,
        }))
    }

    fn find(&self, haystack: &str) -> Option<&str> {
        self.automaton
            .find(haystack)
            .map(|m| self.patterns[m.pattern().as_usize()].as_str())
    }
}

impl SignatureMatcher {
    pub fn new(signatures: &ChallengeSignatures) -> PageResult<Self> {
        Ok(Self {
            selectors: signatures
                .selectors
                .iter()
                .filter(|s| !s.trim().is_empty())
                .cloned()
                .collect(),
            iframe: Marker::build(&signatures.iframe_markers, false)?,
            form: Marker::build(&signatures.form_markers, false)?,
            text: Marker::build(&signatures.text_patterns, true)?,
        })
    }

    /// Selectors the probe should check for visibility.
    pub fn selectors(&self) -> &[String] {
        &self.selectors
    }

    /// The first signature present in `snapshot`, checked in the order
    /// selectors, iframes, forms, text.
    pub fn detect(&self, snapshot: &PageSnapshot) -> Option<Detection> {
        if let Some(selector) = snapshot
            .visible_selectors
            .iter()
            .find(|s| self.selectors.contains(s))
        {
            return Some(Detection::Selector(selector.clone()));
        }
        if let Some(marker) = &self.iframe
            && let Some(hit) = snapshot.iframe_sources.iter().find_map(|src| marker.find(src))
        {
            return Some(Detection::Iframe(hit.to_string()));
        }
        if let Some(marker) = &self.form
            && let Some(hit) = snapshot.form_actions.iter().find_map(|a| marker.find(a))
        {
            return Some(Detection::Form(hit.to_string()));
        }
        if let Some(marker) = &self.text
            && let Some(hit) = marker.find(&snapshot.visible_text)
        {
            return Some(Detection::Text(hit.to_string()));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher() -> SignatureMatcher {
        SignatureMatcher::new(&ChallengeSignatures::default()).unwrap()
    }

    #[test]
    fn clean_page_is_not_a_challenge() {
        let snapshot = PageSnapshot {
            visible_selectors: vec![],
            iframe_sources: vec!["https://bot-hosting.net/embed/stats".to_string()],
            form_actions: vec!["/panel/login".to_string()],
            visible_text: "Your servers".to_string(),
        };
        assert_eq!(matcher().detect(&snapshot), None);
    }

    #[test]
    fn each_signature_kind_is_detected() {
        let m = matcher();

        let snapshot = PageSnapshot {
            visible_selectors: vec!["#challenge-form".to_string()],
            ..Default::default()
        };
        assert_eq!(
            m.detect(&snapshot),
            Some(Detection::Selector("#challenge-form".to_string()))
        );

        let snapshot = PageSnapshot {
            iframe_sources: vec![
                "https://challenges.cloudflare.com/cdn-cgi/turnstile?x=1".to_string(),
            ],
            ..Default::default()
        };
        assert_eq!(
            m.detect(&snapshot),
            Some(Detection::Iframe("challenges.cloudflare.com".to_string()))
        );

        let snapshot = PageSnapshot {
            form_actions: vec!["/?__cf_chl_f_tk=abc".to_string()],
            ..Default::default()
        };
        assert_eq!(
            m.detect(&snapshot),
            Some(Detection::Form("__cf_chl_f_tk".to_string()))
        );

        let snapshot = PageSnapshot {
            visible_text: "Please wait. CHECKING YOUR BROWSER before accessing".to_string(),
            ..Default::default()
        };
        assert_eq!(
            m.detect(&snapshot),
            Some(Detection::Text("checking your browser".to_string()))
        );
    }

    #[test]
    fn selectors_outside_the_library_are_ignored() {
        let snapshot = PageSnapshot {
            visible_selectors: vec!["#not-a-challenge".to_string()],
            ..Default::default()
        };
        assert_eq!(matcher().detect(&snapshot), None);
    }

    #[test]
    fn empty_library_never_matches() {
        let empty = ChallengeSignatures {
            selectors: vec![],
            iframe_markers: vec![" ".to_string()],
            form_markers: vec![],
            text_patterns: vec![],
        };
        let m = SignatureMatcher::new(&empty).unwrap();
        assert!(m.selectors().is_empty());
        let snapshot = PageSnapshot {
            visible_text: "just a moment...".to_string(),
            ..Default::default()
        };
        assert_eq!(m.detect(&snapshot), None);
    }
}
