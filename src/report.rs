use std::fmt::Write;

use clap::ValueEnum;

use crate::error::RosterResult;
use crate::models::{Skill, StudentRecord};
use crate::projection::{SortKey, ViewState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Csv,
    Json,
}

const MISSING: &str = "N/A";

fn metric<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| MISSING.to_string(), |v| v.to_string())
}

fn fetched(record: &StudentRecord) -> String {
    record
        .last_fetched
        .map_or_else(|| "Never".to_string(), |at| at.format("%Y-%m-%d %H:%M").to_string())
}

fn row(position: usize, record: &StudentRecord) -> Vec<String> {
    let mut cells = vec![
        position.to_string(),
        record.name.clone(),
        record.roll_number.clone(),
        metric(record.leetcode_solved),
    ];
    cells.extend(Skill::ALL.into_iter().map(|skill| metric(record.stars(skill))));
    cells.push(fetched(record));
    cells
}

fn headers(view: &ViewState) -> Vec<String> {
    let mut headers = vec![
        "S.No".to_string(),
        format!("Name {}", view.sort_marker(SortKey::Name)),
        format!("Roll No {}", view.sort_marker(SortKey::RollNumber)),
        format!("LeetCode {}", view.sort_marker(SortKey::LeetcodeSolved)),
    ];
    headers.extend(Skill::ALL.into_iter().map(|skill| {
        format!("{} {}", skill.label(), view.sort_marker(SortKey::Stars(skill)))
    }));
    headers.push("Last Fetched".to_string());
    headers
}

fn write_cells(output: &mut String, cells: &[String], widths: &[usize]) {
    let padded: Vec<String> = cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| {
            let pad = width.saturating_sub(cell.chars().count());
            format!("{cell}{}", " ".repeat(pad))
        })
        .collect();
    let _ = writeln!(output, "{}", padded.join("  ").trim_end());
}

/// Aligned text table of the projected rows, numbered from 1 in display
/// order.
pub fn render_table(rows: &[StudentRecord], view: &ViewState, total: usize) -> String {
    let headers = headers(view);
    let body: Vec<Vec<String>> = rows
        .iter()
        .enumerate()
        .map(|(index, record)| row(index + 1, record))
        .collect();

    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for cells in &body {
        for (width, cell) in widths.iter_mut().zip(cells) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut output = String::new();
    write_cells(&mut output, &headers, &widths);
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    write_cells(&mut output, &rule, &widths);
    if body.is_empty() {
        let _ = writeln!(output, "No students match the current filters.");
    }
    for cells in &body {
        write_cells(&mut output, cells, &widths);
    }
    let _ = writeln!(output);
    let _ = writeln!(output, "Showing {} of {} students", rows.len(), total);
    output
}

pub fn render_csv(rows: &[StudentRecord]) -> RosterResult<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record([
            "id",
            "name",
            "roll_number",
            "leetcode_solved",
            "hr_java_stars",
            "hr_python_stars",
            "hr_c_stars",
            "hr_sql_stars",
            "last_fetched",
        ])
        .map_err(std::io::Error::from)?;
    for record in rows {
        let optional = |value: Option<String>| value.unwrap_or_default();
        let mut fields = vec![
            record.id.to_string(),
            record.name.clone(),
            record.roll_number.clone(),
            optional(record.leetcode_solved.map(|v| v.to_string())),
        ];
        fields.extend(
            Skill::ALL
                .into_iter()
                .map(|skill| optional(record.stars(skill).map(|v| v.to_string()))),
        );
        fields.push(optional(record.last_fetched.map(|at| at.to_string())));
        writer.write_record(&fields).map_err(std::io::Error::from)?;
    }
    let bytes = writer.into_inner().map_err(|err| err.into_error())?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

pub fn render_json(rows: &[StudentRecord]) -> RosterResult<String> {
    Ok(serde_json::to_string_pretty(rows)?)
}

pub fn render(
    format: OutputFormat,
    rows: &[StudentRecord],
    view: &ViewState,
    total: usize,
) -> RosterResult<String> {
    match format {
        OutputFormat::Table => Ok(render_table(rows, view, total)),
        OutputFormat::Csv => render_csv(rows),
        OutputFormat::Json => render_json(rows),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::student;

    fn rows() -> Vec<StudentRecord> {
        let mut bob = student("2", "Bob", "R2", Some(10));
        bob.hr_sql_stars = Some(3);
        vec![student("1", "Alice", "R1", None), bob]
    }

    #[test]
    fn table_numbers_rows_and_marks_absent_values() {
        let view = ViewState::default();
        let table = render_table(&rows(), &view, 5);
        let lines: Vec<&str> = table.lines().collect();

        assert!(lines[0].starts_with("S.No"));
        assert!(lines[0].contains("Roll No ↑"));
        assert!(lines[0].contains("Name ↕"));
        assert!(lines[2].starts_with("1     Alice"));
        assert!(lines[2].contains("N/A"));
        assert!(lines[2].ends_with("Never"));
        assert!(lines[3].starts_with("2     Bob"));
        assert!(table.ends_with("Showing 2 of 5 students\n"));
    }

    #[test]
    fn empty_table_says_so() {
        let table = render_table(&[], &ViewState::default(), 3);
        assert!(table.contains("No students match the current filters."));
        assert!(table.contains("Showing 0 of 3 students"));
    }

    #[test]
    fn csv_leaves_absent_values_blank() {
        let csv = render_csv(&rows()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("id,name,roll_number"));
        assert_eq!(lines[1], "1,Alice,R1,,,,,,");
        assert_eq!(lines[2], "2,Bob,R2,10,,,,3,");
    }

    #[test]
    fn json_keeps_display_order() {
        let json = render_json(&rows()).unwrap();
        let parsed: Vec<StudentRecord> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, rows());
    }
}
