use std::path::{Path, PathBuf};

use crate::filter::FilterState;
use crate::models::{Category, Skill};

/// Export predicates, mirrored from the view's `FilterState`.
///
/// Unset thresholds are left out of the query entirely so the server applies
/// no constraint for them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportQuery {
    pub search: Option<String>,
    pub min_leetcode: Option<u32>,
    pub min_stars: Vec<(Skill, u32)>,
}

impl ExportQuery {
    pub fn from_filter(filter: &FilterState) -> Self {
        let search = Some(filter.search().trim())
            .filter(|text| !text.is_empty())
            .map(str::to_string);
        let min_stars = Skill::ALL
            .into_iter()
            .filter_map(|skill| filter.min_stars(skill).map(|min| (skill, min)))
            .collect();

        Self {
            search,
            min_leetcode: filter.min_leetcode(),
            min_stars,
        }
    }

    pub fn is_unfiltered(&self) -> bool {
        self.search.is_none() && self.min_leetcode.is_none() && self.min_stars.is_empty()
    }

    pub fn query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        if let Some(min) = self.min_leetcode {
            pairs.push(("min_lc".to_string(), min.to_string()));
        }
        for (skill, min) in &self.min_stars {
            pairs.push((format!("min_{}", skill.key()), min.to_string()));
        }
        if let Some(search) = &self.search {
            pairs.push(("search".to_string(), search.clone()));
        }
        pairs
    }
}

/// A rendered spreadsheet returned by the export collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl ExportFile {
    /// Where to write the file: `target` if it names a file, inside it if it
    /// is a directory, the working directory otherwise.
    pub fn destination(&self, target: Option<&Path>) -> PathBuf {
        match target {
            Some(path) if path.is_dir() => path.join(&self.file_name),
            Some(path) => path.to_path_buf(),
            None => PathBuf::from(&self.file_name),
        }
    }
}

pub fn default_file_name(category: &Category) -> String {
    format!("{}_data.xlsx", category.as_str())
}

/// Pulls the filename out of a `Content-Disposition` header value.
pub fn file_name_from_disposition(header: &str) -> Option<String> {
    header
        .split(';')
        .map(str::trim)
        .find_map(|part| part.strip_prefix("filename="))
        .map(|name| name.trim_matches('"'))
        .and_then(|name| Path::new(name).file_name())
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_thresholds_are_omitted() {
        let query = ExportQuery::from_filter(&FilterState::default());
        assert!(query.is_unfiltered());
        assert!(query.query_pairs().is_empty());
    }

    #[test]
    fn active_predicates_become_query_pairs() {
        let filter = FilterState::default()
            .with_search("  ali ")
            .with_min_leetcode("25")
            .with_min_stars(Skill::Python, "3")
            .with_min_stars(Skill::Sql, "junk");
        let query = ExportQuery::from_filter(&filter);

        assert_eq!(
            query.query_pairs(),
            vec![
                ("min_lc".to_string(), "25".to_string()),
                ("min_python".to_string(), "3".to_string()),
                ("search".to_string(), "ali".to_string()),
            ]
        );
    }

    #[test]
    fn disposition_filename_is_sanitised() {
        assert_eq!(
            file_name_from_disposition("attachment; filename=2nd_year_coding_stats_20260201.xlsx"),
            Some("2nd_year_coding_stats_20260201.xlsx".to_string())
        );
        assert_eq!(
            file_name_from_disposition("attachment; filename=\"../../etc/passwd\""),
            Some("passwd".to_string())
        );
        assert_eq!(file_name_from_disposition("inline"), None);
    }

    #[test]
    fn destination_respects_directories() {
        let dir = tempfile::tempdir().unwrap();
        let file = ExportFile {
            file_name: "3rd_year_data.xlsx".to_string(),
            bytes: Vec::new(),
        };
        assert_eq!(file.destination(Some(dir.path())), dir.path().join("3rd_year_data.xlsx"));
        assert_eq!(file.destination(None), PathBuf::from("3rd_year_data.xlsx"));

        let category: Category = "3rd_year".parse().unwrap();
        assert_eq!(default_file_name(&category), "3rd_year_data.xlsx");
    }
}
