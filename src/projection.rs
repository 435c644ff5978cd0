//! Filtered, sorted views of a roster.
//!
//! `project` is pure: the same roster, filter and sort always give the same
//! sequence. Sorting is stable, so records with equal keys keep roster
//! order in both directions. An absent metric sorts below every present
//! value, including 0.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::RosterError;
use crate::filter::FilterState;
use crate::models::{Skill, StudentRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Name,
    RollNumber,
    LeetcodeSolved,
    Stars(Skill),
}

impl SortKey {
    pub const ALL: [SortKey; 7] = [
        SortKey::Name,
        SortKey::RollNumber,
        SortKey::LeetcodeSolved,
        SortKey::Stars(Skill::Java),
        SortKey::Stars(Skill::Python),
        SortKey::Stars(Skill::C),
        SortKey::Stars(Skill::Sql),
    ];

    /// Field name as it appears on the wire.
    pub fn field_name(self) -> &'static str {
        match self {
            SortKey::Name => "name",
            SortKey::RollNumber => "roll_number",
            SortKey::LeetcodeSolved => "leetcode_solved",
            SortKey::Stars(Skill::Java) => "hr_java_stars",
            SortKey::Stars(Skill::Python) => "hr_python_stars",
            SortKey::Stars(Skill::C) => "hr_c_stars",
            SortKey::Stars(Skill::Sql) => "hr_sql_stars",
        }
    }

    fn compare(self, a: &StudentRecord, b: &StudentRecord) -> Ordering {
        match self {
            SortKey::Name => compare_text(&a.name, &b.name),
            SortKey::RollNumber => compare_text(&a.roll_number, &b.roll_number),
            SortKey::LeetcodeSolved => a.leetcode_solved.cmp(&b.leetcode_solved),
            SortKey::Stars(skill) => a.stars(skill).cmp(&b.stars(skill)),
        }
    }
}

// `Option` orders `None` first, which is the absent-lowest policy.
fn compare_text(a: &str, b: &str) -> Ordering {
    a.to_lowercase().cmp(&b.to_lowercase())
}

impl FromStr for SortKey {
    type Err = RosterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        let short = match wanted.as_str() {
            "roll" => Some(SortKey::RollNumber),
            "lc" | "leetcode" => Some(SortKey::LeetcodeSolved),
            other => other.parse::<Skill>().ok().map(SortKey::Stars),
        };
        short
            .or_else(|| SortKey::ALL.into_iter().find(|key| key.field_name() == wanted))
            .ok_or_else(|| RosterError::validation("sort key", format!("unknown column `{s}`")))
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.field_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn flipped(self) -> Self {
        match self {
            SortDirection::Ascending => SortDirection::Descending,
            SortDirection::Descending => SortDirection::Ascending,
        }
    }

    pub fn arrow(self) -> &'static str {
        match self {
            SortDirection::Ascending => "↑",
            SortDirection::Descending => "↓",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortState {
    pub key: SortKey,
    pub direction: SortDirection,
}

impl Default for SortState {
    fn default() -> Self {
        Self {
            key: SortKey::RollNumber,
            direction: SortDirection::Ascending,
        }
    }
}

impl SortState {
    pub fn new(key: SortKey, direction: SortDirection) -> Self {
        Self { key, direction }
    }

    /// Column-header click: same key toggles, a new key starts ascending.
    pub fn click(&mut self, key: SortKey) {
        if self.key == key {
            self.direction = self.direction.flipped();
        } else {
            self.key = key;
            self.direction = SortDirection::Ascending;
        }
    }

    fn compare(&self, a: &StudentRecord, b: &StudentRecord) -> Ordering {
        let ordering = self.key.compare(a, b);
        match self.direction {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        }
    }
}

pub fn project<'a>(
    roster: &'a [StudentRecord],
    filter: &FilterState,
    sort: &SortState,
) -> Vec<&'a StudentRecord> {
    let mut rows: Vec<&StudentRecord> = roster.iter().filter(|s| filter.matches(s)).collect();
    rows.sort_by(|a, b| sort.compare(a, b));
    rows
}

/// Filter and sort state owned by one dashboard view, driven by user
/// intents.
#[derive(Debug, Clone, Default)]
pub struct ViewState {
    pub filter: FilterState,
    pub sort: SortState,
}

impl ViewState {
    pub fn project<'a>(&self, roster: &'a [StudentRecord]) -> Vec<&'a StudentRecord> {
        project(roster, &self.filter, &self.sort)
    }

    pub fn set_search(&mut self, text: impl Into<String>) {
        self.filter.set_search(text);
    }

    pub fn set_min_leetcode(&mut self, raw: &str) {
        self.filter.set_min_leetcode(raw);
    }

    pub fn set_min_stars(&mut self, skill: Skill, raw: &str) {
        self.filter.set_min_stars(skill, raw);
    }

    pub fn reset_filters(&mut self) {
        self.filter.reset_thresholds();
    }

    pub fn click_sort(&mut self, key: SortKey) {
        self.sort.click(key);
    }

    /// Header marker for a column: its arrow when active, `↕` otherwise.
    pub fn sort_marker(&self, key: SortKey) -> &'static str {
        if self.sort.key == key {
            self.sort.direction.arrow()
        } else {
            "↕"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StudentId;

    fn student(id: &str, name: &str, roll: &str, solved: Option<u32>) -> StudentRecord {
        StudentRecord {
            id: StudentId::new(id),
            name: name.to_string(),
            roll_number: roll.to_string(),
            leetcode_url: None,
            hackerrank_url: None,
            leetcode_solved: solved,
            hr_java_stars: None,
            hr_python_stars: None,
            hr_c_stars: None,
            hr_sql_stars: None,
            last_fetched: None,
        }
    }

    fn alice_and_bob() -> Vec<StudentRecord> {
        vec![
            student("1", "Alice", "R1", None),
            student("2", "Bob", "R2", Some(10)),
        ]
    }

    fn ids(rows: &[&StudentRecord]) -> Vec<String> {
        rows.iter().map(|s| s.id.to_string()).collect()
    }

    #[test]
    fn threshold_excludes_absent_metric() {
        let roster = alice_and_bob();
        let filter = FilterState::default().with_min_leetcode("5");
        let rows = project(&roster, &filter, &SortState::default());
        assert_eq!(ids(&rows), vec!["2"]);
    }

    #[test]
    fn search_is_case_insensitive_substring() {
        let roster = alice_and_bob();
        let filter = FilterState::default().with_search("ali");
        let rows = project(&roster, &filter, &SortState::default());
        assert_eq!(ids(&rows), vec!["1"]);
    }

    #[test]
    fn absent_sorts_lowest_in_both_directions() {
        let roster = alice_and_bob();
        let filter = FilterState::default();

        let asc = SortState::new(SortKey::LeetcodeSolved, SortDirection::Ascending);
        assert_eq!(ids(&project(&roster, &filter, &asc)), vec!["1", "2"]);
        assert_eq!(ids(&project(&roster, &filter, &asc)), vec!["1", "2"]);

        let desc = SortState::new(SortKey::LeetcodeSolved, SortDirection::Descending);
        assert_eq!(ids(&project(&roster, &filter, &desc)), vec!["2", "1"]);
    }

    #[test]
    fn absent_sorts_below_zero() {
        let roster = vec![
            student("1", "A", "R1", Some(0)),
            student("2", "B", "R2", None),
        ];
        let asc = SortState::new(SortKey::LeetcodeSolved, SortDirection::Ascending);
        let rows = project(&roster, &FilterState::default(), &asc);
        assert_eq!(ids(&rows), vec!["2", "1"]);
    }

    #[test]
    fn equal_keys_keep_roster_order_after_toggling() {
        let roster = vec![
            student("a", "Zed", "R9", Some(5)),
            student("b", "Amy", "R1", Some(5)),
            student("c", "Kim", "R5", Some(1)),
            student("d", "Bea", "R2", Some(5)),
        ];
        let filter = FilterState::default();
        let mut sort = SortState::default();
        sort.click(SortKey::LeetcodeSolved);
        assert_eq!(ids(&project(&roster, &filter, &sort)), vec!["c", "a", "b", "d"]);

        sort.click(SortKey::LeetcodeSolved);
        assert_eq!(sort.direction, SortDirection::Descending);
        assert_eq!(ids(&project(&roster, &filter, &sort)), vec!["a", "b", "d", "c"]);

        sort.click(SortKey::LeetcodeSolved);
        assert_eq!(ids(&project(&roster, &filter, &sort)), vec!["c", "a", "b", "d"]);
    }

    #[test]
    fn text_keys_ignore_case() {
        let roster = vec![
            student("1", "bob", "r2", None),
            student("2", "Alice", "R10", None),
            student("3", "alan", "R1", None),
        ];
        let by_name = SortState::new(SortKey::Name, SortDirection::Ascending);
        let rows = project(&roster, &FilterState::default(), &by_name);
        assert_eq!(ids(&rows), vec!["3", "2", "1"]);

        let rows = project(&roster, &FilterState::default(), &SortState::default());
        assert_eq!(ids(&rows), vec!["3", "2", "1"]);
    }

    #[test]
    fn new_key_resets_to_ascending() {
        let mut sort = SortState::default();
        sort.click(SortKey::RollNumber);
        assert_eq!(sort.direction, SortDirection::Descending);
        sort.click(SortKey::Stars(Skill::Java));
        assert_eq!(sort.key, SortKey::Stars(Skill::Java));
        assert_eq!(sort.direction, SortDirection::Ascending);
    }

    #[test]
    fn every_match_is_kept_and_every_kept_row_matches() {
        let mut roster = Vec::new();
        for i in 0..30u32 {
            let mut record = student(&i.to_string(), &format!("Student {i}"), &format!("R{i}"), None);
            record.leetcode_solved = (i % 3 != 0).then_some(i * 7 % 50);
            record.hr_python_stars = (i % 4 != 0).then_some((i % 6) as u8);
            roster.push(record);
        }
        let filter = FilterState::default()
            .with_search("student 1")
            .with_min_leetcode("10")
            .with_min_stars(Skill::Python, "2");

        let rows = project(&roster, &filter, &SortState::default());
        assert!(rows.iter().all(|s| filter.matches(s)));
        let expected = roster.iter().filter(|s| filter.matches(s)).count();
        assert_eq!(rows.len(), expected);
    }

    #[test]
    fn sort_key_parses_aliases_and_wire_names() {
        assert_eq!("roll".parse::<SortKey>().unwrap(), SortKey::RollNumber);
        assert_eq!("lc".parse::<SortKey>().unwrap(), SortKey::LeetcodeSolved);
        assert_eq!("sql".parse::<SortKey>().unwrap(), SortKey::Stars(Skill::Sql));
        assert_eq!(
            "hr_java_stars".parse::<SortKey>().unwrap(),
            SortKey::Stars(Skill::Java)
        );
        assert!("email".parse::<SortKey>().is_err());
    }

    #[test]
    fn view_state_tracks_markers() {
        let mut view = ViewState::default();
        assert_eq!(view.sort_marker(SortKey::RollNumber), "↑");
        assert_eq!(view.sort_marker(SortKey::Name), "↕");
        view.click_sort(SortKey::RollNumber);
        assert_eq!(view.sort_marker(SortKey::RollNumber), "↓");
    }
}
