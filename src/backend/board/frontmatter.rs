//! YAML frontmatter for sprint and epic markdown documents.
//!
//! The frontmatter `history` list is the authoritative transition record: an
//! append-only sequence of `{column, timestamp}` entries. Older documents may
//! carry a legacy `status` scalar instead; the first write after reading such
//! a document migrates it to `history` and the scalar is never written again.

use chrono::{DateTime, Utc};
use gray_matter::engine::YAML;
use gray_matter::Matter;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::workflow::TaskPlan;

/// One append-only transition record. `reason` carries block and rejection
/// context when present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub column: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Epic reference as written by hand: a number or a slug.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EpicRef {
    Number(u32),
    Name(String),
}

impl EpicRef {
    pub fn number(&self) -> Option<u32> {
        match self {
            EpicRef::Number(n) => Some(*n),
            EpicRef::Name(name) => super::layout::epic_number_from_name(name)
                .or_else(|| name.parse().ok()),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SprintFrontmatter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sprint: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epic: Option<EpicRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocker: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abort_reason: Option<String>,
    /// Legacy single-value status. Read for migration, never written once
    /// `history` has entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<HistoryEntry>,
}

impl SprintFrontmatter {
    /// Appends a transition record and drops the legacy scalar.
    pub fn record(&mut self, column: &str, reason: Option<String>) {
        self.history.push(HistoryEntry {
            column: column.to_string(),
            timestamp: Utc::now(),
            reason,
        });
        self.status = None;
    }

    /// The most recent recorded column, falling back to the legacy scalar.
    pub fn last_column(&self) -> Option<&str> {
        self.history
            .last()
            .map(|e| e.column.as_str())
            .or(self.status.as_deref())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EpicFrontmatter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epic: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<DateTime<Utc>>,
}

fn split_frontmatter(content: &str) -> Option<(&str, String)> {
    let parsed = Matter::<YAML>::new()
        .parse::<serde_yaml::Value>(content)
        .ok()?;
    parsed.data.as_ref()?;
    // gray_matter leaves the raw YAML in the source; slice it out so serde
    // can deserialize into the typed struct.
    let yaml_start = content.find("---\n")? + 4;
    let yaml_len = content[yaml_start..].find("---\n")?;
    Some((&content[yaml_start..yaml_start + yaml_len], parsed.content))
}

pub fn parse_sprint_doc(content: &str) -> Result<(SprintFrontmatter, String)> {
    match split_frontmatter(content) {
        Some((yaml, body)) => Ok((serde_yaml::from_str(yaml)?, body)),
        None => Ok((SprintFrontmatter::default(), content.to_string())),
    }
}

pub fn parse_epic_doc(content: &str) -> Result<(EpicFrontmatter, String)> {
    match split_frontmatter(content) {
        Some((yaml, body)) => Ok((serde_yaml::from_str(yaml)?, body)),
        None => Ok((EpicFrontmatter::default(), content.to_string())),
    }
}

pub fn render_sprint_doc(fm: &SprintFrontmatter, body: &str) -> Result<String> {
    let yaml = serde_yaml::to_string(fm)?;
    Ok(format!("---\n{yaml}---\n\n{}", body.trim_start_matches('\n')))
}

pub fn render_epic_doc(fm: &EpicFrontmatter, body: &str) -> Result<String> {
    let yaml = serde_yaml::to_string(fm)?;
    Ok(format!("---\n{yaml}---\n\n{}", body.trim_start_matches('\n')))
}

static TASK_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*-\s*\[([ xX])\]\s*(.+)$").unwrap());
static AGENT_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+@([A-Za-z0-9_-]+)\s*$").unwrap());

/// Task plan from the document body. Each `- [ ]` checkbox line is a task;
/// a trailing `@agent` token names the agent type, otherwise the task name
/// doubles as the agent label.
pub fn parse_tasks(body: &str) -> Vec<TaskPlan> {
    body.lines()
        .filter_map(|line| {
            let caps = TASK_LINE.captures(line)?;
            let raw = caps.get(2)?.as_str().trim();
            match AGENT_SUFFIX.captures(raw) {
                Some(a) => {
                    let name = AGENT_SUFFIX.replace(raw, "").trim().to_string();
                    Some(TaskPlan::new(name, a.get(1).unwrap().as_str()))
                }
                None => Some(TaskPlan {
                    name: raw.to_string(),
                    agent: None,
                }),
            }
        })
        .collect()
}

/// Rewrites the checkbox lines so the document mirrors step completion.
pub fn render_tasks(body: &str, done_names: &[String]) -> String {
    body.lines()
        .map(|line| {
            if let Some(caps) = TASK_LINE.captures(line) {
                let raw = caps.get(2).map(|m| m.as_str().trim()).unwrap_or("");
                let name = AGENT_SUFFIX.replace(raw, "").trim().to_string();
                let mark = if done_names.contains(&name) { "x" } else { " " };
                format!("- [{mark}] {raw}")
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEGACY_DOC: &str = "---\nsprint: 3\ntitle: Add login\ntype: backend\nstatus: in-progress\ndepends_on:\n  - s-1\n---\n\n# Sprint 3\n\n- [ ] Design schema @architect\n- [x] Implement endpoint\n";

    #[test]
    fn parses_legacy_status_and_body_tasks() {
        let (fm, body) = parse_sprint_doc(LEGACY_DOC).unwrap();
        assert_eq!(fm.sprint, Some(3));
        assert_eq!(fm.kind.as_deref(), Some("backend"));
        assert_eq!(fm.status.as_deref(), Some("in-progress"));
        assert_eq!(fm.last_column(), Some("in-progress"));
        assert_eq!(fm.depends_on, vec!["s-1"]);

        let tasks = parse_tasks(&body);
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].name, "Design schema");
        assert_eq!(tasks[0].agent_label(), "architect");
        assert_eq!(tasks[1].agent_label(), "Implement endpoint");
    }

    #[test]
    fn recording_history_retires_the_legacy_scalar() {
        let (mut fm, body) = parse_sprint_doc(LEGACY_DOC).unwrap();
        fm.record("5-blocked", Some("waiting on credentials".into()));

        assert!(fm.status.is_none());
        assert_eq!(fm.last_column(), Some("5-blocked"));

        let rendered = render_sprint_doc(&fm, &body).unwrap();
        assert!(!rendered.contains("status:"));
        assert!(rendered.contains("column: 5-blocked"));
        assert!(rendered.contains("reason: waiting on credentials"));

        // Round trip keeps the history intact and the scalar gone.
        let (again, _) = parse_sprint_doc(&rendered).unwrap();
        assert!(again.status.is_none());
        assert_eq!(again.history.len(), 1);
    }

    #[test]
    fn history_is_append_only_across_records() {
        let mut fm = SprintFrontmatter::default();
        fm.record("1-todo", None);
        fm.record("2-in-progress", None);
        fm.record("3-review", None);
        let columns: Vec<_> = fm.history.iter().map(|e| e.column.as_str()).collect();
        assert_eq!(columns, ["1-todo", "2-in-progress", "3-review"]);
    }

    #[test]
    fn documents_without_frontmatter_parse_as_defaults() {
        let (fm, body) = parse_sprint_doc("# Just a body\n").unwrap();
        assert!(fm.history.is_empty());
        assert!(fm.status.is_none());
        assert_eq!(body.trim(), "# Just a body");
    }

    #[test]
    fn checkbox_rendering_marks_done_tasks() {
        let body = "- [ ] Design schema @architect\n- [ ] Implement endpoint";
        let out = render_tasks(body, &["Design schema".to_string()]);
        assert!(out.contains("- [x] Design schema @architect"));
        assert!(out.contains("- [ ] Implement endpoint"));
    }

    #[test]
    fn epic_ref_accepts_numbers_and_slugs() {
        let yaml = "epic: 4\n";
        let fm: SprintFrontmatter = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(fm.epic.unwrap().number(), Some(4));

        let yaml = "epic: epic-02_auth\n";
        let fm: SprintFrontmatter = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(fm.epic.unwrap().number(), Some(2));
    }
}
