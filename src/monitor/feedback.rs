//! Review feedback selection and formatting (pure)

use crate::types::{Review, ReviewComment, ReviewState};
use std::fmt::Write;

/// Opening marker of the feedback section in a task description
pub const FEEDBACK_START: &str = "<!-- review-feedback:start -->";
/// Closing marker of the feedback section in a task description
pub const FEEDBACK_END: &str = "<!-- review-feedback:end -->";

/// Newest `CHANGES_REQUESTED` review not yet actioned
///
/// Reviews at or below `watermark` were handled on an earlier poll. Review
/// ids grow monotonically on the host, so the highest id is the newest.
#[must_use]
pub fn latest_actionable(reviews: &[Review], watermark: Option<u64>) -> Option<&Review> {
    reviews
        .iter()
        .filter(|r| r.state == ReviewState::ChangesRequested)
        .filter(|r| watermark.is_none_or(|w| r.id > w))
        .max_by_key(|r| r.id)
}

/// Whether a task has used up its review cycles
#[must_use]
pub const fn budget_exceeded(pipeline_attempt: u32, max_review_cycles: u32) -> bool {
    pipeline_attempt >= max_review_cycles
}

/// Human-readable feedback: review body followed by its diff comments
///
/// Only comments belonging to `review` are included.
#[must_use]
pub fn render_feedback(review: &Review, comments: &[ReviewComment]) -> String {
    let mut out = String::new();
    let author = review.author.as_deref().unwrap_or("reviewer");
    let _ = writeln!(out, "### Changes requested by @{author}");

    let body = review.body.trim();
    if !body.is_empty() {
        let _ = write!(out, "\n{body}\n");
    }

    let mut inline = comments
        .iter()
        .filter(|c| c.review_id == Some(review.id))
        .peekable();
    if inline.peek().is_some() {
        out.push_str("\n#### Inline comments\n");
        for c in inline {
            let location = match c.line {
                Some(line) => format!("{}:{line}", c.path),
                None => c.path.clone(),
            };
            let _ = writeln!(out, "\n- `{location}`: {}", c.body.trim());
        }
    }
    out
}

/// Replace (or append) the feedback section of a task description
#[must_use]
pub fn embed_feedback(description: &str, feedback: &str) -> String {
    let section = format!("{FEEDBACK_START}\n## Review feedback\n\n{}\n{FEEDBACK_END}", feedback.trim_end());

    if let Some(start) = description.find(FEEDBACK_START)
        && let Some(end_rel) = description[start..].find(FEEDBACK_END)
    {
        let end = start + end_rel + FEEDBACK_END.len();
        return format!("{}{section}{}", &description[..start], &description[end..]);
    }

    let head = description.trim_end();
    if head.is_empty() {
        section
    } else {
        format!("{head}\n\n{section}")
    }
}

/// Directive asking the implementer to address review feedback
#[must_use]
pub fn fix_directive(title: &str, pr_number: u64, branch: &str, feedback: &str) -> String {
    format!(
        "PR #{pr_number} for \"{title}\" received review feedback. Fix the issues below on \
         branch `{branch}` and push to the same PR. Do not create new tasks or open a new PR.\n\n\
         {feedback}"
    )
}

/// Completion report for a task that ran out of review cycles
#[must_use]
pub fn budget_exceeded_report(pr_number: u64, cycles: u32, max_review_cycles: u32) -> String {
    format!(
        "FAILED: review cycle budget exceeded for PR #{pr_number} \
         ({cycles} of {max_review_cycles} cycles used); needs human attention"
    )
}
