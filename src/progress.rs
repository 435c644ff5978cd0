use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use crate::error::RosterResult;
use crate::models::{RefreshPhase, RefreshProgress, CANCELLED_SENTINEL};
use crate::refresh::{BulkRefresh, RefreshSummary};

/// One-line status for a progress event, as shown next to the bar.
pub fn progress_line(progress: &RefreshProgress) -> String {
    match progress.phase {
        RefreshPhase::Idle => "Idle".to_string(),
        RefreshPhase::Running => format!(
            "Refreshing {} ({}/{}, {}%)",
            progress.current_student_name,
            progress.current_index + 1,
            progress.total,
            progress.percent()
        ),
        RefreshPhase::Completed if progress.current_student_name == CANCELLED_SENTINEL => {
            format!(
                "Cancelled after {} of {} students",
                progress.current_index, progress.total
            )
        }
        RefreshPhase::Completed => format!("Completed {} students", progress.total),
    }
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.green} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ")
}

/// Draws the run's progress stream until the run settles back to idle.
async fn render(run: &mut BulkRefresh) {
    let bar = ProgressBar::new(0);
    bar.set_style(bar_style());

    while let Some(progress) = run.next().await {
        match progress.phase {
            RefreshPhase::Running => {
                bar.set_length(progress.total as u64);
                bar.set_position(progress.current_index as u64);
                bar.set_message(progress.current_student_name.clone());
            }
            RefreshPhase::Completed => {
                bar.set_position(progress.current_index as u64);
                bar.finish_with_message(progress_line(&progress));
            }
            RefreshPhase::Idle => {}
        }
    }
    if !bar.is_finished() {
        bar.abandon();
    }
}

/// Renders a run to completion. Ctrl-C cancels it before the next student.
pub async fn drive(mut run: BulkRefresh) -> RosterResult<RefreshSummary> {
    let run_id = run.run_id;
    let cancel = run.cancel_token();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!(%run_id, "interrupt received; cancelling bulk refresh");
            cancel.cancel();
        }
    });

    render(&mut run).await;
    interrupt.abort();

    run.join().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::COMPLETED_SENTINEL;

    fn event(index: usize, name: &str, phase: RefreshPhase) -> RefreshProgress {
        RefreshProgress {
            current_index: index,
            total: 4,
            current_student_name: name.to_string(),
            phase,
        }
    }

    #[test]
    fn running_line_counts_from_one() {
        let line = progress_line(&event(1, "Bob", RefreshPhase::Running));
        assert_eq!(line, "Refreshing Bob (2/4, 25%)");
    }

    #[test]
    fn terminal_lines_distinguish_cancellation() {
        let done = event(4, COMPLETED_SENTINEL, RefreshPhase::Completed);
        assert_eq!(progress_line(&done), "Completed 4 students");

        let cancelled = event(2, CANCELLED_SENTINEL, RefreshPhase::Completed);
        assert_eq!(progress_line(&cancelled), "Cancelled after 2 of 4 students");

        assert_eq!(progress_line(&RefreshProgress::idle()), "Idle");
    }
}
