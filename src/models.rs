use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::RosterError;

/// Opaque student identifier assigned by the backend.
///
/// The backend sends integers today; strings are accepted so the client
/// never depends on the id being numeric.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct StudentId(String);

impl StudentId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StudentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for StudentId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Number(u64),
            Text(String),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Number(n) => StudentId(n.to_string()),
            RawId::Text(s) => StudentId(s),
        })
    }
}

/// HackerRank skill tracks shown on the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Skill {
    Java,
    Python,
    C,
    Sql,
}

impl Skill {
    pub const ALL: [Skill; 4] = [Skill::Java, Skill::Python, Skill::C, Skill::Sql];

    pub fn key(self) -> &'static str {
        match self {
            Skill::Java => "java",
            Skill::Python => "python",
            Skill::C => "c",
            Skill::Sql => "sql",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Skill::Java => "Java",
            Skill::Python => "Python",
            Skill::C => "C",
            Skill::Sql => "SQL",
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            Skill::Java => 0,
            Skill::Python => 1,
            Skill::C => 2,
            Skill::Sql => 3,
        }
    }
}

impl FromStr for Skill {
    type Err = RosterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Skill::ALL
            .into_iter()
            .find(|skill| skill.key().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                RosterError::validation("skill", format!("`{s}` is not one of java, python, c, sql"))
            })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentRecord {
    pub id: StudentId,
    pub name: String,
    pub roll_number: String,
    #[serde(default)]
    pub leetcode_url: Option<String>,
    #[serde(default)]
    pub hackerrank_url: Option<String>,
    #[serde(default)]
    pub leetcode_solved: Option<u32>,
    #[serde(default)]
    pub hr_java_stars: Option<u8>,
    #[serde(default)]
    pub hr_python_stars: Option<u8>,
    #[serde(default)]
    pub hr_c_stars: Option<u8>,
    #[serde(default)]
    pub hr_sql_stars: Option<u8>,
    #[serde(default, deserialize_with = "deserialize_fetched_at")]
    pub last_fetched: Option<NaiveDateTime>,
}

impl StudentRecord {
    pub fn stars(&self, skill: Skill) -> Option<u8> {
        match skill {
            Skill::Java => self.hr_java_stars,
            Skill::Python => self.hr_python_stars,
            Skill::C => self.hr_c_stars,
            Skill::Sql => self.hr_sql_stars,
        }
    }
}

/// The backend writes either an offset-aware or a naive ISO timestamp.
fn deserialize_fetched_at<'de, D>(deserializer: D) -> Result<Option<NaiveDateTime>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(raw) = Option::<String>::deserialize(deserializer)? else {
        return Ok(None);
    };

    if let Ok(stamped) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(Some(stamped.naive_utc()));
    }

    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(Some)
        .map_err(serde::de::Error::custom)
}

/// Cohort partition such as `2nd_year`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Category(String);

impl Category {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `2nd_year` → `2nd Year`
    pub fn label(&self) -> String {
        self.0
            .split('_')
            .filter(|part| !part.is_empty())
            .map(|part| {
                let mut chars = part.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl FromStr for Category {
    type Err = RosterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let slug = s.trim().to_ascii_lowercase();
        if slug.is_empty() {
            return Err(RosterError::validation("category", "must not be empty"));
        }
        if !slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        {
            return Err(RosterError::validation(
                "category",
                format!("`{s}` may only contain letters, digits and underscores"),
            ));
        }
        Ok(Category(slug))
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: i64,
    pub username: String,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Profile {
    pub fn has_uploaded(&self, category: &Category) -> bool {
        self.extra
            .get(&format!("has_uploaded_{}", category.as_str()))
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserAccount {
    pub username: String,
    #[serde(default)]
    pub is_admin: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RefreshPhase {
    Idle,
    Running,
    Completed,
}

pub const COMPLETED_SENTINEL: &str = "Completed";
pub const CANCELLED_SENTINEL: &str = "Cancelled";

/// One snapshot of bulk refresh progress.
///
/// `current_index` counts finished attempts; while running,
/// `current_student_name` names the student being processed right now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefreshProgress {
    pub current_index: usize,
    pub total: usize,
    pub current_student_name: String,
    pub phase: RefreshPhase,
}

impl RefreshProgress {
    pub fn idle() -> Self {
        Self {
            current_index: 0,
            total: 0,
            current_student_name: String::new(),
            phase: RefreshPhase::Idle,
        }
    }

    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 0;
        }
        ((self.current_index * 100) / self.total).min(100) as u8
    }
}
