use tracing::debug;

use crate::models::{Skill, StudentRecord};

/// Active search and threshold predicates for one roster view.
///
/// Thresholds are `None` when unset; a record passes only if it satisfies
/// every active predicate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterState {
    search: String,
    min_leetcode: Option<u32>,
    min_stars: [Option<u32>; 4],
}

impl FilterState {
    pub fn search(&self) -> &str {
        &self.search
    }

    pub fn min_leetcode(&self) -> Option<u32> {
        self.min_leetcode
    }

    pub fn min_stars(&self, skill: Skill) -> Option<u32> {
        self.min_stars[skill.index()]
    }

    pub fn set_search(&mut self, text: impl Into<String>) {
        self.search = text.into();
    }

    /// Takes the raw input text; anything that is not a non-negative
    /// integer clears the threshold.
    pub fn set_min_leetcode(&mut self, raw: &str) {
        self.min_leetcode = parse_threshold("min_leetcode", raw);
    }

    pub fn set_min_stars(&mut self, skill: Skill, raw: &str) {
        self.min_stars[skill.index()] = parse_threshold(skill.key(), raw);
    }

    pub fn with_search(mut self, text: impl Into<String>) -> Self {
        self.set_search(text);
        self
    }

    pub fn with_min_leetcode(mut self, raw: &str) -> Self {
        self.set_min_leetcode(raw);
        self
    }

    pub fn with_min_stars(mut self, skill: Skill, raw: &str) -> Self {
        self.set_min_stars(skill, raw);
        self
    }

    /// Clears the numeric thresholds. The search text is left alone.
    pub fn reset_thresholds(&mut self) {
        self.min_leetcode = None;
        self.min_stars = [None; 4];
    }

    pub fn matches(&self, record: &StudentRecord) -> bool {
        self.matches_search(record)
            && meets(record.leetcode_solved, self.min_leetcode)
            && Skill::ALL.into_iter().all(|skill| {
                meets(
                    record.stars(skill).map(u32::from),
                    self.min_stars[skill.index()],
                )
            })
    }

    fn matches_search(&self, record: &StudentRecord) -> bool {
        if self.search.is_empty() {
            return true;
        }
        let needle = self.search.to_lowercase();
        record.name.to_lowercase().contains(&needle)
            || record.roll_number.to_lowercase().contains(&needle)
    }
}

/// Absent metrics count as 0 against an active threshold.
fn meets(value: Option<u32>, threshold: Option<u32>) -> bool {
    match threshold {
        None => true,
        Some(min) => value.unwrap_or(0) >= min,
    }
}

/// Parses raw threshold input. Empty or malformed input means "no
/// constraint"; it is never turned into 0.
pub fn parse_threshold(field: &str, raw: &str) -> Option<u32> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.parse::<u32>() {
        Ok(value) => Some(value),
        Err(err) => {
            debug!(field, input = raw, error = %err, "ignoring threshold input");
            None
        }
    }
}
