//! User-visible wording for proposals and outcome reports

use std::time::Duration;

use crate::job::{Candidate, Job};

/// Render a duration the way people say it: `45 s`, `15 min`, `2 h 30 min`
pub fn format_window(window: Duration) -> String {
    let total = window.as_secs();
    if total < 60 {
        return format!("{} s", total.max(1));
    }
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;

    let mut parts = Vec::new();
    if hours > 0 {
        parts.push(format!("{} h", hours));
    }
    if minutes > 0 {
        parts.push(format!("{} min", minutes));
    }
    if seconds > 0 && hours == 0 {
        parts.push(format!("{} s", seconds));
    }
    parts.join(" ")
}

/// Offer text delivered to a candidate
pub fn proposal_text(job: &Job, window: Duration) -> String {
    format!(
        "New job available:\n{}\n\nPlease accept or decline within {}.",
        job.format_summary(),
        format_window(window)
    )
}

/// Replacement text for a proposal whose response window elapsed
pub fn timeout_text(original: &str) -> String {
    format!(
        "{}\n\nNo reply in time. The job was offered to the next candidate.",
        original
    )
}

/// Supervisor report when a candidate took the job
pub fn accepted_text(job: &Job, candidate: &Candidate) -> String {
    format!(
        "Job accepted by {}.\n{}",
        candidate.name,
        job.format_summary()
    )
}

/// Supervisor report when nobody took the job
pub fn exhausted_text(job: &Job) -> String {
    format!(
        "No candidate accepted the job.\n{}",
        job.format_summary()
    )
}
