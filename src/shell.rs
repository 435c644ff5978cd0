use std::io::Write as _;
use std::path::PathBuf;
use std::str::FromStr;

use clap::ValueEnum;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};
use tracing::debug;

use crate::dashboard::Dashboard;
use crate::error::{RosterError, RosterResult};
use crate::models::{Skill, StudentId};
use crate::progress;
use crate::projection::SortKey;
use crate::report::{self, OutputFormat};

const HELP: &str = "\
commands:
  search [text]            filter by name or roll number (blank clears)
  min lc|<skill> [n]       minimum LeetCode solved or stars (blank clears)
  sort <column>            sort by name, roll, lc, java, python, c or sql;
                           repeat to flip direction
  reset                    clear thresholds (search and sort are kept)
  show [table|csv|json]    print the current view
  refresh <id>             refresh one student
  refresh-all              refresh every student (Ctrl-C cancels)
  export [path]            download the current view as a spreadsheet
  reload                   fetch the roster again
  delete-all               delete every student in this category
  help                     this text
  quit                     leave the dashboard";

#[derive(Debug, Clone, PartialEq)]
pub enum ShellCommand {
    Search(String),
    MinLeetcode(String),
    MinStars(Skill, String),
    Sort(SortKey),
    Reset,
    Show(OutputFormat),
    Refresh(StudentId),
    RefreshAll,
    Export(Option<PathBuf>),
    Reload,
    DeleteAll,
    Help,
    Quit,
}

impl FromStr for ShellCommand {
    type Err = RosterError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (word, rest) = line
            .split_once(char::is_whitespace)
            .map(|(word, rest)| (word, rest.trim()))
            .unwrap_or((line, ""));

        let command = match word.to_ascii_lowercase().as_str() {
            "search" => ShellCommand::Search(rest.to_string()),
            "min" => {
                let (target, value) = rest
                    .split_once(char::is_whitespace)
                    .map(|(target, value)| (target, value.trim()))
                    .unwrap_or((rest, ""));
                match target.to_ascii_lowercase().as_str() {
                    "" => return Err(RosterError::validation("command", "usage: min lc|<skill> [n]")),
                    "lc" | "leetcode" => ShellCommand::MinLeetcode(value.to_string()),
                    skill => ShellCommand::MinStars(skill.parse()?, value.to_string()),
                }
            }
            "sort" if rest.is_empty() => {
                return Err(RosterError::validation("command", "usage: sort <column>"))
            }
            "sort" => ShellCommand::Sort(rest.parse()?),
            "reset" => ShellCommand::Reset,
            "show" if rest.is_empty() => ShellCommand::Show(OutputFormat::Table),
            "show" => ShellCommand::Show(
                OutputFormat::from_str(rest, true)
                    .map_err(|err| RosterError::validation("format", err))?,
            ),
            "refresh" if rest.is_empty() => {
                return Err(RosterError::validation("command", "usage: refresh <id>"))
            }
            "refresh" => ShellCommand::Refresh(StudentId::new(rest)),
            "refresh-all" => ShellCommand::RefreshAll,
            "export" => ShellCommand::Export((!rest.is_empty()).then(|| PathBuf::from(rest))),
            "reload" => ShellCommand::Reload,
            "delete-all" => ShellCommand::DeleteAll,
            "help" | "?" => ShellCommand::Help,
            "quit" | "exit" | "q" => ShellCommand::Quit,
            other => {
                return Err(RosterError::validation(
                    "command",
                    format!("unknown command `{other}`; try `help`"),
                ))
            }
        };
        Ok(command)
    }
}

/// Asks a yes/no question on stdout and reads the answer from `lines`.
/// End of input counts as no.
pub async fn confirm<R>(lines: &mut Lines<R>, question: &str) -> RosterResult<bool>
where
    R: AsyncBufRead + Unpin,
{
    print!("{question} [y/N] ");
    std::io::stdout().flush()?;
    let answer = lines.next_line().await?.unwrap_or_default();
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

/// Prints `label` and reads one trimmed line. End of input gives "".
pub async fn prompt<R>(lines: &mut Lines<R>, label: &str) -> RosterResult<String>
where
    R: AsyncBufRead + Unpin,
{
    print!("{label}");
    std::io::stdout().flush()?;
    Ok(lines.next_line().await?.unwrap_or_default().trim().to_string())
}

enum Flow {
    Continue,
    Quit,
}

/// Runs the dashboard until `quit` or end of input. Errors that end the
/// session are returned; anything else is printed and the loop goes on.
pub async fn run<R>(dashboard: &mut Dashboard, lines: &mut Lines<R>) -> RosterResult<()>
where
    R: AsyncBufRead + Unpin,
{
    print_scope(dashboard);

    loop {
        print!("{}> ", dashboard.category());
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            println!();
            return Ok(());
        };
        if line.trim().is_empty() {
            continue;
        }

        let outcome = match line.parse::<ShellCommand>() {
            Ok(command) => {
                debug!(?command, "shell command");
                execute(dashboard, command, lines).await
            }
            Err(err) => Err(err),
        };
        match outcome {
            Ok(Flow::Continue) => {}
            Ok(Flow::Quit) => return Ok(()),
            Err(err) if err.is_auth() => return Err(err),
            Err(err) => eprintln!("error: {err}"),
        }
    }
}

fn print_scope(dashboard: &Dashboard) {
    let scope = dashboard.export_scope();
    println!(
        "{}: showing {} of {} students",
        dashboard.category().label(),
        scope.shown,
        scope.total
    );
}

async fn execute<R>(
    dashboard: &mut Dashboard,
    command: ShellCommand,
    lines: &mut Lines<R>,
) -> RosterResult<Flow>
where
    R: AsyncBufRead + Unpin,
{
    match command {
        ShellCommand::Search(text) => {
            dashboard.view.set_search(text);
            print_scope(dashboard);
        }
        ShellCommand::MinLeetcode(raw) => {
            dashboard.view.set_min_leetcode(&raw);
            print_scope(dashboard);
        }
        ShellCommand::MinStars(skill, raw) => {
            dashboard.view.set_min_stars(skill, &raw);
            print_scope(dashboard);
        }
        ShellCommand::Sort(key) => {
            dashboard.view.click_sort(key);
            println!(
                "sorted by {} {}",
                key,
                dashboard.view.sort.direction.arrow()
            );
        }
        ShellCommand::Reset => {
            dashboard.view.reset_filters();
            print_scope(dashboard);
        }
        ShellCommand::Show(format) => {
            let rows = dashboard.projected();
            let total = dashboard.store().len();
            print!("{}", report::render(format, &rows, &dashboard.view, total)?);
        }
        ShellCommand::Refresh(id) => {
            let record = dashboard.refresh_student(&id).await?;
            println!(
                "refreshed {} ({} solved)",
                record.name,
                record
                    .leetcode_solved
                    .map_or_else(|| "N/A".to_string(), |n| n.to_string())
            );
        }
        ShellCommand::RefreshAll => {
            let question = format!(
                "Refresh all {} students in {}? This can take a while.",
                dashboard.store().len(),
                dashboard.category().label()
            );
            if !confirm(lines, &question).await? {
                println!("nothing refreshed");
                return Ok(Flow::Continue);
            }
            let summary = progress::drive(dashboard.refresh_all()?).await?;
            println!(
                "{} refreshed, {} failed{}",
                summary.refreshed.len(),
                summary.failed.len(),
                if summary.cancelled { " (cancelled)" } else { "" }
            );
        }
        ShellCommand::Export(target) => {
            let scope = dashboard.export_scope();
            let file = dashboard.export().await?;
            let path = file.destination(target.as_deref());
            tokio::fs::write(&path, &file.bytes).await?;
            println!(
                "exported {} of {} students to {}",
                scope.shown,
                scope.total,
                path.display()
            );
        }
        ShellCommand::Reload => {
            dashboard.reload().await?;
            print_scope(dashboard);
        }
        ShellCommand::DeleteAll => {
            let question = format!(
                "Delete all {} students in {}?",
                dashboard.store().len(),
                dashboard.category().label()
            );
            if confirm(lines, &question).await? {
                println!("{}", dashboard.delete_all().await?);
            } else {
                println!("nothing deleted");
            }
        }
        ShellCommand::Help => println!("{HELP}"),
        ShellCommand::Quit => return Ok(Flow::Quit),
    }
    Ok(Flow::Continue)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::api::testing::{student, FakeApi, TOKEN};

    #[test]
    fn parses_view_commands() {
        assert_eq!(
            "search  ali ".parse::<ShellCommand>().unwrap(),
            ShellCommand::Search("ali".to_string())
        );
        assert_eq!(
            "min lc 25".parse::<ShellCommand>().unwrap(),
            ShellCommand::MinLeetcode("25".to_string())
        );
        assert_eq!(
            "min SQL".parse::<ShellCommand>().unwrap(),
            ShellCommand::MinStars(Skill::Sql, String::new())
        );
        assert_eq!(
            "sort lc".parse::<ShellCommand>().unwrap(),
            ShellCommand::Sort(SortKey::LeetcodeSolved)
        );
        assert_eq!(
            "show csv".parse::<ShellCommand>().unwrap(),
            ShellCommand::Show(OutputFormat::Csv)
        );
        assert_eq!(
            "export".parse::<ShellCommand>().unwrap(),
            ShellCommand::Export(None)
        );
    }

    #[test]
    fn rejects_incomplete_commands() {
        for line in ["sort", "refresh", "min", "min rust 3", "show pdf", "frobnicate"] {
            let err = line.parse::<ShellCommand>().unwrap_err();
            assert!(matches!(err, RosterError::Validation { .. }), "{line}");
        }
    }

    async fn dashboard(api: Arc<FakeApi>) -> Dashboard {
        Dashboard::open(api, TOKEN, "2nd_year".parse().unwrap(), Duration::ZERO)
            .await
            .unwrap()
    }

    fn roster() -> Vec<crate::models::StudentRecord> {
        vec![
            student("1", "Alice", "R1", None),
            student("2", "Bob", "R2", Some(10)),
        ]
    }

    #[tokio::test]
    async fn scripted_session_filters_and_exports() {
        let dir = tempfile::tempdir().unwrap();
        let api = Arc::new(FakeApi::new().with_roster("2nd_year", roster()));
        let mut dashboard = dashboard(api.clone()).await;

        let script = format!(
            "min lc 5\nbogus\nsort name\nexport {}\nquit\nsearch never-reached\n",
            dir.path().display()
        );
        run(&mut dashboard, &mut script.as_bytes().lines())
            .await
            .unwrap();

        assert_eq!(dashboard.view.filter.min_leetcode(), Some(5));
        assert_eq!(dashboard.view.filter.search(), "");
        assert_eq!(api.calls().last().unwrap(), "export:2nd_year?min_lc=5");
        assert!(dir.path().join("2nd_year_data.xlsx").exists());
    }

    #[tokio::test]
    async fn delete_all_needs_confirmation() {
        let api = Arc::new(FakeApi::new().with_roster("2nd_year", roster()));
        let mut dashboard = dashboard(api.clone()).await;

        run(&mut dashboard, &mut b"delete-all\nn\n".as_slice().lines())
            .await
            .unwrap();
        assert_eq!(dashboard.store().len(), 2);

        run(&mut dashboard, &mut b"delete-all\nyes\n".as_slice().lines())
            .await
            .unwrap();
        assert_eq!(dashboard.store().len(), 0);
        assert!(api.calls().contains(&"delete:2nd_year".to_string()));
    }

    #[tokio::test]
    async fn consecutive_prompts_share_one_reader() {
        let mut lines = b"old\n  new \ny\n".as_slice().lines();
        assert_eq!(prompt(&mut lines, "Current password: ").await.unwrap(), "old");
        assert_eq!(prompt(&mut lines, "New password: ").await.unwrap(), "new");
        assert!(confirm(&mut lines, "Sure?").await.unwrap());
        assert_eq!(prompt(&mut lines, "More: ").await.unwrap(), "");
        assert!(!confirm(&mut lines, "Again?").await.unwrap());
    }

    #[tokio::test]
    async fn refresh_all_waits_for_confirmation() {
        let api = Arc::new(
            FakeApi::new()
                .with_roster("2nd_year", roster())
                .with_refreshed(student("1", "Alice", "R1", Some(3)))
                .with_refreshed(student("2", "Bob", "R2", Some(12))),
        );
        let mut dashboard = dashboard(api.clone()).await;

        let mut declined = b"refresh-all\nn\nreload\n".as_slice().lines();
        run(&mut dashboard, &mut declined).await.unwrap();
        assert!(!api.calls().iter().any(|c| c.starts_with("refresh")));
        assert_eq!(
            api.calls(),
            vec!["list:2nd_year".to_string(), "list:2nd_year".to_string()]
        );

        let mut accepted = b"refresh-all\ny\n".as_slice().lines();
        run(&mut dashboard, &mut accepted).await.unwrap();
        let refreshed: Vec<_> = api
            .calls()
            .into_iter()
            .filter(|c| c.starts_with("refresh"))
            .collect();
        assert_eq!(refreshed, vec!["refresh:1".to_string(), "refresh:2".to_string()]);
    }

    #[tokio::test]
    async fn single_refresh_errors_keep_the_shell_open() {
        let api = Arc::new(
            FakeApi::new()
                .with_roster("2nd_year", roster())
                .failing_on("1")
                .with_refreshed(student("2", "Bob", "R2", Some(11))),
        );
        let mut dashboard = dashboard(api).await;

        run(&mut dashboard, &mut b"refresh 1\nrefresh 2\n".as_slice().lines())
            .await
            .unwrap();
        let bob = dashboard.store().get(&StudentId::new("2")).unwrap();
        assert_eq!(bob.leetcode_solved, Some(11));
    }
}
