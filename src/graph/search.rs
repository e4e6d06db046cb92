use std::collections::HashSet;
use std::time::Instant;

use fuzzy_matcher::FuzzyMatcher;
use fuzzy_matcher::skim::SkimMatcherV2;

use super::TrafficGraph;

fn fuzzy_match_score(matcher: &SkimMatcherV2, text: &str, query: &str) -> Option<i64> {
    matcher
        .fuzzy_match(text, query)
        .or_else(|| matcher.fuzzy_match(&text.to_ascii_lowercase(), &query.to_ascii_lowercase()))
}

impl TrafficGraph {
    pub fn search(&self) -> Option<&str> {
        self.search.as_deref()
    }

    pub fn search_matches(&self) -> &HashSet<String> {
        &self.search_matches
    }

    /// Fuzzy-matches node names and dims the rest. A blank query clears the
    /// search. Returns the number of matching nodes.
    pub fn set_search(&mut self, query: &str, now: Instant) -> usize {
        let query = query.trim();
        if query.is_empty() {
            self.search = None;
            self.search_matches.clear();
        } else {
            let matcher = SkimMatcherV2::default();
            self.search_matches = self
                .nodes
                .keys()
                .filter(|name| fuzzy_match_score(&matcher, name, query).is_some())
                .cloned()
                .collect();
            self.search = Some(query.to_owned());
            log::debug!(
                "{}: search {query:?} matched {} nodes",
                self.name,
                self.search_matches.len()
            );
        }

        self.refresh_overlay(now);
        self.search_matches.len()
    }
}
