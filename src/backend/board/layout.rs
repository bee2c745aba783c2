//! Physical board layout: column directories, name suffixes, and moves.
//!
//! The filesystem is the database. Column directory = status, a `--done` /
//! `--blocked` / `--aborted` name suffix marks terminal annotations so that
//! status is recoverable from the path alone, and epic folders contain their
//! sprints.

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};

use crate::error::{Result, WorkflowError};
use crate::workflow::{EpicStatus, SprintStatus};

/// Column directories in board order.
pub const COLUMNS: [&str; 8] = [
    "0-backlog",
    "1-todo",
    "2-in-progress",
    "3-review",
    "4-done",
    "5-blocked",
    "6-abandoned",
    "7-archive",
];

pub fn status_for_column(column: &str) -> Option<SprintStatus> {
    match column {
        "0-backlog" => Some(SprintStatus::Backlog),
        "1-todo" => Some(SprintStatus::Todo),
        "2-in-progress" => Some(SprintStatus::InProgress),
        "3-review" => Some(SprintStatus::Review),
        "4-done" => Some(SprintStatus::Done),
        "5-blocked" => Some(SprintStatus::Blocked),
        "6-abandoned" => Some(SprintStatus::Abandoned),
        _ => None,
    }
}

pub fn column_for_status(status: SprintStatus) -> &'static str {
    match status {
        SprintStatus::Backlog => "0-backlog",
        SprintStatus::Todo => "1-todo",
        SprintStatus::InProgress => "2-in-progress",
        SprintStatus::Review => "3-review",
        SprintStatus::Done => "4-done",
        SprintStatus::Blocked => "5-blocked",
        SprintStatus::Abandoned => "6-abandoned",
    }
}

pub fn epic_status_for_column(column: &str) -> EpicStatus {
    match column {
        "2-in-progress" | "3-review" | "5-blocked" => EpicStatus::InProgress,
        "4-done" | "7-archive" => EpicStatus::Done,
        _ => EpicStatus::Todo,
    }
}

static SLUG_STRIP: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9\s-]").unwrap());
static SLUG_SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static SPRINT_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^sprint-(\d+)_").unwrap());
static EPIC_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^epic-(\d+)_").unwrap());
static ID_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)").unwrap());

pub fn slugify(title: &str) -> String {
    let lower = title.to_lowercase();
    let stripped = SLUG_STRIP.replace_all(&lower, "");
    let dashed = SLUG_SPACES.replace_all(stripped.trim(), "-");
    let mut slug = dashed.trim_matches('-').to_string();
    slug.truncate(40);
    slug.trim_matches('-').to_string()
}

/// Extracts the numeric part of an id like `s-29`, `e-7`, or a bare `29`.
pub fn id_number(id: &str) -> Result<u32> {
    ID_NUMBER
        .captures(id)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .ok_or_else(|| WorkflowError::SprintNotFound(id.to_string()))
}

pub fn sprint_number_from_name(name: &str) -> Option<u32> {
    SPRINT_NAME
        .captures(name)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

pub fn epic_number_from_name(name: &str) -> Option<u32> {
    EPIC_NAME
        .captures(name)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Companion artifacts that share the sprint filename prefix but are not the
/// sprint document itself.
pub fn is_artifact_file(name: &str) -> bool {
    ["_postmortem", "_quality", "_contracts", "_deferred"]
        .iter()
        .any(|suffix| name.contains(suffix))
}

/// Which column a path lives under, if any.
pub fn column_of(path: &Path) -> Option<&'static str> {
    path.iter()
        .filter_map(|part| part.to_str())
        .find_map(|part| COLUMNS.iter().find(|c| **c == part).copied())
}

/// Status derived from the path: terminal suffixes first, then the column.
/// `None` means the path carries no signal and metadata must decide.
pub fn status_from_path(path: &Path) -> Option<SprintStatus> {
    let file = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let parent = path
        .parent()
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .unwrap_or("");
    let combined = format!("{file} {parent}");
    if combined.contains("--done") {
        return Some(SprintStatus::Done);
    }
    if combined.contains("--aborted") {
        return Some(SprintStatus::Abandoned);
    }
    if combined.contains("--blocked") {
        return Some(SprintStatus::Blocked);
    }
    column_of(path).and_then(status_for_column)
}

/// The enclosing `epic-NN_*` directory, if the path is nested in one.
pub fn enclosing_epic_dir(path: &Path) -> Option<PathBuf> {
    path.ancestors()
        .skip(1)
        .find(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with("epic-"))
                .unwrap_or(false)
        })
        .map(Path::to_path_buf)
}

fn rename(from: &Path, to: &Path) -> Result<PathBuf> {
    std::fs::rename(from, to)?;
    Ok(to.to_path_buf())
}

/// Adds a `--suffix` annotation to a sprint file and its `sprint-*` folder.
/// Returns the new path of the sprint file.
pub fn add_suffix(path: &Path, suffix: &str) -> Result<PathBuf> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .map(|e| format!(".{e}"))
        .unwrap_or_default();
    let new_file_name = format!("{stem}--{suffix}{ext}");

    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let parent_name = parent
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();

    if parent_name.starts_with("sprint-") && !parent_name.contains(&format!("--{suffix}")) {
        let new_dir = parent.with_file_name(format!("{parent_name}--{suffix}"));
        std::fs::rename(parent, &new_dir)?;
        let old_file = new_dir.join(path.file_name().unwrap_or_default());
        rename(&old_file, &new_dir.join(&new_file_name))
    } else {
        rename(path, &path.with_file_name(new_file_name))
    }
}

/// Removes a `--suffix` annotation from a sprint file and its folder.
pub fn remove_suffix(path: &Path, suffix: &str) -> Result<PathBuf> {
    let marker = format!("--{suffix}");
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    let new_file_name = file_name.replace(&marker, "");

    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let parent_name = parent
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();

    if parent_name.starts_with("sprint-") && parent_name.contains(&marker) {
        let new_dir = parent.with_file_name(parent_name.replace(&marker, ""));
        std::fs::rename(parent, &new_dir)?;
        let old_file = new_dir.join(file_name);
        rename(&old_file, &new_dir.join(&new_file_name))
    } else {
        rename(path, &path.with_file_name(new_file_name))
    }
}

/// Moves a sprint file (with its folder, or its whole epic folder when
/// nested) to a target column. Returns the sprint file's new path.
pub fn move_to_column(path: &Path, board_dir: &Path, target_col: &str) -> Result<PathBuf> {
    let target_dir = board_dir.join(target_col);
    std::fs::create_dir_all(&target_dir)?;

    if let Some(epic_dir) = enclosing_epic_dir(path) {
        let epic_name = epic_dir.file_name().unwrap_or_default();
        let new_epic_dir = target_dir.join(epic_name);
        let rel = path
            .strip_prefix(&epic_dir)
            .map_err(|_| {
                WorkflowError::PersistenceInconsistency(format!(
                    "sprint {} not under its epic folder {}",
                    path.display(),
                    epic_dir.display()
                ))
            })?
            .to_path_buf();
        if !new_epic_dir.exists() {
            std::fs::rename(&epic_dir, &new_epic_dir)?;
        }
        return Ok(new_epic_dir.join(rel));
    }

    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let parent_name = parent
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    if parent_name.starts_with("sprint-") {
        let new_dir = target_dir.join(parent_name);
        std::fs::rename(parent, &new_dir)?;
        Ok(new_dir.join(path.file_name().unwrap_or_default()))
    } else {
        rename(path, &target_dir.join(path.file_name().unwrap_or_default()))
    }
}
