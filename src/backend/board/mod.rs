//! Durable backend where a kanban directory tree is the source of truth.
//!
//! Sprints are markdown documents with YAML frontmatter, filed under column
//! directories named for their status. Moving a file between columns is the
//! state change; metadata and the step side-file follow. On read, the path
//! wins: a crash between the move and the metadata write leaves stale
//! metadata that the next successful operation rewrites.

pub mod frontmatter;
pub mod layout;
pub mod state_file;

use async_trait::async_trait;
use chrono::Utc;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{Result, WorkflowError};
use crate::workflow::{
    validate_transition, Epic, Sprint, SprintStatus, Step, StepStatus, TaskPlan, Transition,
};

use super::{
    step_status_report, summarize, NewSprint, SprintPatch, StatusSummary, StepStatusReport,
    WorkflowBackend,
};
use frontmatter::SprintFrontmatter;
use state_file::{RejectionRecord, SprintStateFile};

/// Accepts both column names ("2-in-progress") and bare status labels
/// ("in-progress") as written in legacy frontmatter.
fn status_from_label(label: &str) -> Option<SprintStatus> {
    layout::status_for_column(label).or_else(|| match label {
        "backlog" => Some(SprintStatus::Backlog),
        "todo" => Some(SprintStatus::Todo),
        "in-progress" => Some(SprintStatus::InProgress),
        "review" => Some(SprintStatus::Review),
        "done" => Some(SprintStatus::Done),
        "blocked" => Some(SprintStatus::Blocked),
        "abandoned" => Some(SprintStatus::Abandoned),
        _ => None,
    })
}

/// A sprint document loaded from disk, with everything needed to write it
/// back.
struct LoadedSprint {
    sprint: Sprint,
    fm: SprintFrontmatter,
    body: String,
    path: PathBuf,
    number: u32,
}

pub struct BoardBackend {
    board_dir: PathBuf,
    /// Project root holding the side-file directory, one level above the
    /// board.
    root: PathBuf,
    /// Serializes mutations. Reads go lock-free since the filesystem is the
    /// store.
    ops: Mutex<()>,
}

impl BoardBackend {
    /// Opens an existing board. Fails when the directory is absent so a typo
    /// never silently creates an empty project.
    pub fn new(board_dir: impl Into<PathBuf>) -> Result<Self> {
        let board_dir = board_dir.into();
        if !board_dir.is_dir() {
            return Err(WorkflowError::PersistenceInconsistency(format!(
                "board directory does not exist: {}",
                board_dir.display()
            )));
        }
        let root = board_dir
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Ok(Self {
            board_dir,
            root,
            ops: Mutex::new(()),
        })
    }

    /// Creates the column directories and opens the board.
    pub fn init(board_dir: impl Into<PathBuf>) -> Result<Self> {
        let board_dir = board_dir.into();
        for column in layout::COLUMNS {
            std::fs::create_dir_all(board_dir.join(column))?;
        }
        Self::new(board_dir)
    }

    pub fn board_dir(&self) -> &Path {
        &self.board_dir
    }

    fn sprint_files(&self) -> Vec<PathBuf> {
        WalkDir::new(&self.board_dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| {
                let name = e.file_name().to_string_lossy();
                name.starts_with("sprint-")
                    && name.ends_with(".md")
                    && !layout::is_artifact_file(&name)
            })
            .map(|e| e.into_path())
            .collect()
    }

    fn epic_dirs(&self) -> Vec<PathBuf> {
        WalkDir::new(&self.board_dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_dir())
            .filter(|e| e.file_name().to_string_lossy().starts_with("epic-"))
            .map(|e| e.into_path())
            .collect()
    }

    fn find_sprint_path(&self, sprint_id: &str) -> Result<PathBuf> {
        let number = layout::id_number(sprint_id)?;
        self.sprint_files()
            .into_iter()
            .find(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .and_then(layout::sprint_number_from_name)
                    == Some(number)
            })
            .ok_or_else(|| WorkflowError::SprintNotFound(sprint_id.to_string()))
    }

    fn find_epic_dir(&self, epic_id: &str) -> Result<PathBuf> {
        let number = layout::id_number(epic_id)
            .map_err(|_| WorkflowError::EpicNotFound(epic_id.to_string()))?;
        self.epic_dirs()
            .into_iter()
            .find(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .and_then(layout::epic_number_from_name)
                    == Some(number)
            })
            .ok_or_else(|| WorkflowError::EpicNotFound(epic_id.to_string()))
    }

    async fn load(&self, path: &Path) -> Result<LoadedSprint> {
        let content = fs::read_to_string(path).await?;
        let (fm, body) = frontmatter::parse_sprint_doc(&content)?;

        let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        let number = layout::sprint_number_from_name(file_name)
            .or(fm.sprint)
            .ok_or_else(|| {
                WorkflowError::PersistenceInconsistency(format!(
                    "cannot determine sprint number for {}",
                    path.display()
                ))
            })?;

        // Path wins. Metadata is only consulted when the file sits outside
        // any known column.
        let status = layout::status_from_path(path)
            .or_else(|| fm.last_column().and_then(status_from_label))
            .ok_or_else(|| {
                WorkflowError::PersistenceInconsistency(format!(
                    "no status signal for {}: file is outside the board and carries no metadata",
                    path.display()
                ))
            })?;

        let epic_id = fm
            .epic
            .as_ref()
            .and_then(|e| e.number())
            .or_else(|| {
                layout::enclosing_epic_dir(path)
                    .and_then(|d| d.file_name().map(|n| n.to_string_lossy().into_owned()))
                    .and_then(|n| layout::epic_number_from_name(&n))
            })
            .map(|n| format!("e-{n}"));

        let state = state_file::read(&self.root, number).await?;
        let (steps, state_blocker) = match &state {
            Some(s) => (s.steps.clone(), s.blocker.clone()),
            None => (Vec::new(), None),
        };

        let transitions = fm
            .history
            .windows(2)
            .filter_map(|pair| {
                let from = status_from_label(&pair[0].column)?;
                let to = status_from_label(&pair[1].column)?;
                Some(Transition {
                    from,
                    to,
                    timestamp: pair[1].timestamp,
                    reason: pair[1].reason.clone(),
                })
            })
            .collect();

        let goal = fm
            .title
            .clone()
            .unwrap_or_else(|| file_name.trim_end_matches(".md").to_string());

        let sprint = Sprint {
            id: format!("s-{number}"),
            goal,
            status,
            epic_id,
            kind: fm.kind.clone().unwrap_or_else(|| "fullstack".to_string()),
            tasks: frontmatter::parse_tasks(&body),
            steps,
            transitions,
            dependencies: fm.depends_on.clone(),
            blocker: fm.blocker.clone().or(state_blocker),
            rejection_reason: fm.rejection_reason.clone(),
            created_at: fm.created,
            started_at: fm.started,
            completed_at: fm.completed,
        };

        Ok(LoadedSprint {
            sprint,
            fm,
            body,
            path: path.to_path_buf(),
            number,
        })
    }

    async fn load_by_id(&self, sprint_id: &str) -> Result<LoadedSprint> {
        let path = self.find_sprint_path(sprint_id)?;
        self.load(&path).await
    }

    async fn save_doc(&self, loaded: &LoadedSprint) -> Result<()> {
        let content = frontmatter::render_sprint_doc(&loaded.fm, &loaded.body)?;
        fs::write(&loaded.path, content).await?;
        Ok(())
    }

    async fn update_state(
        &self,
        number: u32,
        sprint_id: &str,
        apply: impl FnOnce(&mut SprintStateFile),
    ) -> Result<SprintStateFile> {
        let mut state = state_file::read(&self.root, number)
            .await?
            .unwrap_or_else(|| SprintStateFile {
                sprint_id: sprint_id.to_string(),
                ..SprintStateFile::default()
            });
        apply(&mut state);
        state_file::write(&self.root, number, &state).await?;
        Ok(state)
    }

    fn next_sprint_number(&self) -> u32 {
        self.sprint_files()
            .iter()
            .filter_map(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .and_then(layout::sprint_number_from_name)
            })
            .max()
            .unwrap_or(0)
            + 1
    }

    fn next_epic_number(&self) -> u32 {
        self.epic_dirs()
            .iter()
            .filter_map(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .and_then(layout::epic_number_from_name)
            })
            .max()
            .unwrap_or(0)
            + 1
    }

    fn render_body(number: u32, goal: &str, tasks: &[TaskPlan]) -> String {
        let mut body = format!("# Sprint {number}: {goal}\n\n## Tasks\n\n");
        for task in tasks {
            match &task.agent {
                Some(agent) => body.push_str(&format!("- [ ] {} @{agent}\n", task.name)),
                None => body.push_str(&format!("- [ ] {}\n", task.name)),
            }
        }
        body
    }

    async fn load_epic_at(&self, dir: &Path) -> Result<Epic> {
        let doc = dir.join("_epic.md");
        let content = fs::read_to_string(&doc).await?;
        let (fm, body) = frontmatter::parse_epic_doc(&content)?;

        let name = dir.file_name().and_then(|n| n.to_str()).unwrap_or("");
        let number = layout::epic_number_from_name(name).or(fm.epic).ok_or_else(|| {
            WorkflowError::PersistenceInconsistency(format!(
                "cannot determine epic number for {}",
                dir.display()
            ))
        })?;

        let status = layout::column_of(dir)
            .map(layout::epic_status_for_column)
            .unwrap_or(crate::workflow::EpicStatus::Todo);

        let mut sprint_ids: Vec<(u32, String)> = WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter_map(|e| {
                let file = e.file_name().to_string_lossy().into_owned();
                if layout::is_artifact_file(&file) {
                    return None;
                }
                layout::sprint_number_from_name(&file).map(|n| (n, format!("s-{n}")))
            })
            .collect();
        sprint_ids.sort();
        sprint_ids.dedup();

        Ok(Epic {
            id: format!("e-{number}"),
            title: fm.title.unwrap_or_else(|| name.to_string()),
            description: fm.description.unwrap_or_else(|| body.trim().to_string()),
            status,
            sprint_ids: sprint_ids.into_iter().map(|(_, id)| id).collect(),
        })
    }

    /// Completing the last sprint of an epic pulls the whole epic folder to
    /// done.
    async fn settle_epic_after_completion(&self, sprint_path: &Path) -> Result<()> {
        let Some(epic_dir) = layout::enclosing_epic_dir(sprint_path) else {
            return Ok(());
        };
        let all_done = WalkDir::new(&epic_dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| {
                let name = e.file_name().to_string_lossy();
                name.starts_with("sprint-")
                    && name.ends_with(".md")
                    && !layout::is_artifact_file(&name)
            })
            .all(|e| layout::status_from_path(e.path()) == Some(SprintStatus::Done));
        if !all_done {
            return Ok(());
        }

        debug!(epic = %epic_dir.display(), "all sprints done, moving epic to 4-done");
        let target = self.board_dir.join("4-done").join(
            epic_dir
                .file_name()
                .ok_or_else(|| {
                    WorkflowError::PersistenceInconsistency(format!(
                        "epic directory has no name: {}",
                        epic_dir.display()
                    ))
                })?,
        );
        if target != epic_dir {
            std::fs::rename(&epic_dir, &target)?;
        }

        let doc = target.join("_epic.md");
        if doc.is_file() {
            let content = fs::read_to_string(&doc).await?;
            let (mut fm, body) = frontmatter::parse_epic_doc(&content)?;
            fm.completed = Some(Utc::now());
            fs::write(&doc, frontmatter::render_epic_doc(&fm, &body)?).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl WorkflowBackend for BoardBackend {
    async fn get_epic(&self, epic_id: &str) -> Result<Epic> {
        let dir = self.find_epic_dir(epic_id)?;
        self.load_epic_at(&dir).await
    }

    async fn get_sprint(&self, sprint_id: &str) -> Result<Sprint> {
        Ok(self.load_by_id(sprint_id).await?.sprint)
    }

    async fn list_epics(&self) -> Result<Vec<Epic>> {
        let mut epics = Vec::new();
        for dir in self.epic_dirs() {
            epics.push(self.load_epic_at(&dir).await?);
        }
        epics.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(epics)
    }

    async fn list_sprints(&self, epic_id: Option<&str>) -> Result<Vec<Sprint>> {
        let mut sprints = Vec::new();
        for path in self.sprint_files() {
            let loaded = self.load(&path).await?;
            if epic_id.is_none() || loaded.sprint.epic_id.as_deref() == epic_id {
                sprints.push(loaded.sprint);
            }
        }
        sprints.sort_by_key(|s| layout::id_number(&s.id).unwrap_or(0));
        Ok(sprints)
    }

    async fn create_epic(&self, title: &str, description: &str) -> Result<Epic> {
        let _guard = self.ops.lock().await;
        let number = self.next_epic_number();
        let dir = self
            .board_dir
            .join("1-todo")
            .join(format!("epic-{number:02}_{}", layout::slugify(title)));
        fs::create_dir_all(&dir).await?;

        let fm = frontmatter::EpicFrontmatter {
            epic: Some(number),
            title: Some(title.to_string()),
            description: Some(description.to_string()),
            created: Some(Utc::now()),
            completed: None,
        };
        let body = format!("# Epic {number}: {title}\n\n{description}\n");
        fs::write(
            dir.join("_epic.md"),
            frontmatter::render_epic_doc(&fm, &body)?,
        )
        .await?;

        self.load_epic_at(&dir).await
    }

    async fn create_sprint(&self, new: NewSprint) -> Result<Sprint> {
        let _guard = self.ops.lock().await;
        let number = self.next_sprint_number();
        let slug = layout::slugify(&new.goal);
        let name = format!("sprint-{number:02}_{slug}");

        let (dir, epic_number) = match &new.epic_id {
            Some(epic_id) => {
                let epic_dir = self.find_epic_dir(epic_id)?;
                let n = layout::id_number(epic_id)
                    .map_err(|_| WorkflowError::EpicNotFound(epic_id.clone()))?;
                (epic_dir.join(&name), Some(n))
            }
            None => (self.board_dir.join("1-todo").join(&name), None),
        };
        fs::create_dir_all(&dir).await?;

        let mut fm = SprintFrontmatter {
            sprint: Some(number),
            title: Some(new.goal.clone()),
            kind: new.kind.clone(),
            epic: epic_number.map(frontmatter::EpicRef::Number),
            depends_on: new.dependencies.clone(),
            created: Some(Utc::now()),
            ..SprintFrontmatter::default()
        };
        fm.record("1-todo", None);

        let body = Self::render_body(number, &new.goal, &new.tasks);
        let path = dir.join(format!("{name}.md"));
        fs::write(&path, frontmatter::render_sprint_doc(&fm, &body)?).await?;

        Ok(self.load(&path).await?.sprint)
    }

    async fn update_sprint(&self, sprint_id: &str, patch: SprintPatch) -> Result<Sprint> {
        let _guard = self.ops.lock().await;
        let mut loaded = self.load_by_id(sprint_id).await?;

        if let Some(goal) = patch.goal {
            loaded.fm.title = Some(goal);
        }
        if let Some(kind) = patch.kind {
            loaded.fm.kind = Some(kind);
        }
        if let Some(dependencies) = patch.dependencies {
            loaded.fm.depends_on = dependencies;
        }
        if let Some(tasks) = patch.tasks {
            let goal = loaded.fm.title.clone().unwrap_or_default();
            loaded.body = Self::render_body(loaded.number, &goal, &tasks);
        }

        self.save_doc(&loaded).await?;
        self.load(&loaded.path).await.map(|l| l.sprint)
    }

    async fn start_sprint(&self, sprint_id: &str) -> Result<Sprint> {
        let _guard = self.ops.lock().await;
        let mut loaded = self.load_by_id(sprint_id).await?;
        validate_transition(sprint_id, loaded.sprint.status, SprintStatus::InProgress)?;

        // Every prerequisite must be Done; report the full unmet list.
        let mut unmet = Vec::new();
        for dep in &loaded.sprint.dependencies {
            match self.find_sprint_path(dep) {
                Ok(path) => {
                    if self.load(&path).await?.sprint.status != SprintStatus::Done {
                        unmet.push(dep.clone());
                    }
                }
                Err(WorkflowError::SprintNotFound(_)) => unmet.push(dep.clone()),
                Err(e) => return Err(e),
            }
        }
        if !unmet.is_empty() {
            return Err(WorkflowError::DependencyNotMet {
                sprint_id: sprint_id.to_string(),
                unmet,
            });
        }

        let now = Utc::now();
        loaded.fm.started = Some(now);
        loaded.fm.record("2-in-progress", None);
        self.save_doc(&loaded).await?;

        let new_path = layout::move_to_column(&loaded.path, &self.board_dir, "2-in-progress")?;

        let mut steps: Vec<Step> = loaded
            .sprint
            .tasks
            .iter()
            .enumerate()
            .map(|(i, task)| Step::new(format!("step-{}", i + 1), &task.name, task.agent_label()))
            .collect();
        if let Some(first) = steps.first_mut() {
            first.status = StepStatus::InProgress;
            first.started_at = Some(now);
        }

        self.update_state(loaded.number, sprint_id, |state| {
            state.status = "in-progress".into();
            state.started_at = Some(now);
            state.steps = steps;
        })
        .await?;

        self.load(&new_path).await.map(|l| l.sprint)
    }

    async fn advance_step(
        &self,
        sprint_id: &str,
        output: Option<serde_json::Value>,
    ) -> Result<Sprint> {
        let _guard = self.ops.lock().await;
        let mut loaded = self.load_by_id(sprint_id).await?;

        let idx = loaded
            .sprint
            .steps
            .iter()
            .position(|s| s.status == StepStatus::InProgress)
            .ok_or_else(|| WorkflowError::NoStepInProgress(sprint_id.to_string()))?;

        let now = Utc::now();
        let mut steps = loaded.sprint.steps.clone();
        steps[idx].status = StepStatus::Done;
        steps[idx].completed_at = Some(now);
        steps[idx].output = output;
        if let Some(next) = steps.get_mut(idx + 1) {
            next.status = StepStatus::InProgress;
            next.started_at = Some(now);
        }

        let done_names: Vec<String> = steps
            .iter()
            .filter(|s| s.status == StepStatus::Done)
            .map(|s| s.name.clone())
            .collect();
        loaded.body = frontmatter::render_tasks(&loaded.body, &done_names);
        self.save_doc(&loaded).await?;

        self.update_state(loaded.number, sprint_id, |state| {
            state.steps = steps;
        })
        .await?;

        self.load(&loaded.path).await.map(|l| l.sprint)
    }

    async fn complete_sprint(&self, sprint_id: &str) -> Result<Sprint> {
        let _guard = self.ops.lock().await;
        let mut loaded = self.load_by_id(sprint_id).await?;
        validate_transition(sprint_id, loaded.sprint.status, SprintStatus::Done)?;
        if !loaded.sprint.all_steps_complete() {
            return Err(WorkflowError::StepsIncomplete(sprint_id.to_string()));
        }

        let now = Utc::now();
        loaded.fm.completed = Some(now);
        loaded.fm.record("4-done", None);
        self.save_doc(&loaded).await?;

        let mut path = layout::add_suffix(&loaded.path, "done")?;
        if layout::enclosing_epic_dir(&path).is_none() {
            path = layout::move_to_column(&path, &self.board_dir, "4-done")?;
        }

        self.update_state(loaded.number, sprint_id, |state| {
            state.status = "done".into();
            state.completed_at = Some(now);
        })
        .await?;

        self.settle_epic_after_completion(&path).await?;

        // The epic folder may have moved out from under us.
        let path = self.find_sprint_path(sprint_id)?;
        self.load(&path).await.map(|l| l.sprint)
    }

    async fn move_to_review(&self, sprint_id: &str) -> Result<Sprint> {
        let _guard = self.ops.lock().await;
        let mut loaded = self.load_by_id(sprint_id).await?;
        validate_transition(sprint_id, loaded.sprint.status, SprintStatus::Review)?;
        if !loaded.sprint.all_steps_complete() {
            return Err(WorkflowError::StepsIncomplete(sprint_id.to_string()));
        }

        loaded.fm.record("3-review", None);
        self.save_doc(&loaded).await?;
        let new_path = layout::move_to_column(&loaded.path, &self.board_dir, "3-review")?;

        self.update_state(loaded.number, sprint_id, |state| {
            state.status = "review".into();
        })
        .await?;

        self.load(&new_path).await.map(|l| l.sprint)
    }

    async fn reject_sprint(&self, sprint_id: &str, reason: &str) -> Result<Sprint> {
        let _guard = self.ops.lock().await;
        let mut loaded = self.load_by_id(sprint_id).await?;
        validate_transition(sprint_id, loaded.sprint.status, SprintStatus::InProgress)?;

        loaded.fm.rejection_reason = Some(reason.to_string());
        loaded.fm.record("2-in-progress", Some(reason.to_string()));
        self.save_doc(&loaded).await?;
        let new_path = layout::move_to_column(&loaded.path, &self.board_dir, "2-in-progress")?;

        let now = Utc::now();
        self.update_state(loaded.number, sprint_id, |state| {
            state.status = "in-progress".into();
            state.rejection_history.push(RejectionRecord {
                reason: reason.to_string(),
                timestamp: now,
            });
        })
        .await?;

        self.load(&new_path).await.map(|l| l.sprint)
    }

    async fn block_sprint(&self, sprint_id: &str, reason: &str) -> Result<Sprint> {
        let _guard = self.ops.lock().await;
        let mut loaded = self.load_by_id(sprint_id).await?;
        validate_transition(sprint_id, loaded.sprint.status, SprintStatus::Blocked)?;

        loaded.fm.blocker = Some(reason.to_string());
        loaded.fm.record("5-blocked", Some(reason.to_string()));
        self.save_doc(&loaded).await?;

        // Blocked sprints keep their column; the name suffix carries the
        // status so work-in-progress context stays visible.
        let new_path = layout::add_suffix(&loaded.path, "blocked")?;

        self.update_state(loaded.number, sprint_id, |state| {
            state.status = "blocked".into();
            state.blocker = Some(reason.to_string());
        })
        .await?;

        self.load(&new_path).await.map(|l| l.sprint)
    }

    async fn resume_sprint(&self, sprint_id: &str) -> Result<Sprint> {
        let _guard = self.ops.lock().await;
        let mut loaded = self.load_by_id(sprint_id).await?;
        validate_transition(sprint_id, loaded.sprint.status, SprintStatus::InProgress)?;

        loaded.fm.blocker = None;
        loaded.fm.record("2-in-progress", None);
        self.save_doc(&loaded).await?;

        let mut path = layout::remove_suffix(&loaded.path, "blocked")?;
        if layout::column_of(&path) != Some("2-in-progress") {
            path = layout::move_to_column(&path, &self.board_dir, "2-in-progress")?;
        }

        let now = Utc::now();
        let mut steps = loaded.sprint.steps.clone();
        if !steps.iter().any(|s| s.status == StepStatus::InProgress) {
            if let Some(idx) = steps.iter().position(|s| !s.status.is_complete()) {
                steps[idx].status = StepStatus::InProgress;
                steps[idx].started_at = Some(now);
            }
        }

        self.update_state(loaded.number, sprint_id, |state| {
            state.status = "in-progress".into();
            state.blocker = None;
            state.steps = steps;
        })
        .await?;

        self.load(&path).await.map(|l| l.sprint)
    }

    async fn abandon_sprint(&self, sprint_id: &str, reason: &str) -> Result<Sprint> {
        let _guard = self.ops.lock().await;
        let mut loaded = self.load_by_id(sprint_id).await?;
        validate_transition(sprint_id, loaded.sprint.status, SprintStatus::Abandoned)?;

        loaded.fm.abort_reason = Some(reason.to_string());
        loaded.fm.record("6-abandoned", Some(reason.to_string()));
        self.save_doc(&loaded).await?;

        let mut path = layout::add_suffix(&loaded.path, "aborted")?;
        if layout::enclosing_epic_dir(&path).is_none() {
            path = layout::move_to_column(&path, &self.board_dir, "6-abandoned")?;
        }

        self.load(&path).await.map(|l| l.sprint)
    }

    async fn schedule_sprint(&self, sprint_id: &str) -> Result<Sprint> {
        let _guard = self.ops.lock().await;
        let mut loaded = self.load_by_id(sprint_id).await?;
        validate_transition(sprint_id, loaded.sprint.status, SprintStatus::Todo)?;

        loaded.fm.record("1-todo", None);
        self.save_doc(&loaded).await?;
        let new_path = layout::move_to_column(&loaded.path, &self.board_dir, "1-todo")?;
        self.load(&new_path).await.map(|l| l.sprint)
    }

    async fn deschedule_sprint(&self, sprint_id: &str) -> Result<Sprint> {
        let _guard = self.ops.lock().await;
        let mut loaded = self.load_by_id(sprint_id).await?;
        validate_transition(sprint_id, loaded.sprint.status, SprintStatus::Backlog)?;

        loaded.fm.record("0-backlog", None);
        self.save_doc(&loaded).await?;
        let new_path = layout::move_to_column(&loaded.path, &self.board_dir, "0-backlog")?;
        self.load(&new_path).await.map(|l| l.sprint)
    }

    async fn get_step_status(&self, sprint_id: &str) -> Result<StepStatusReport> {
        let loaded = self.load_by_id(sprint_id).await?;
        Ok(step_status_report(&loaded.sprint))
    }

    async fn status_summary(&self) -> Result<StatusSummary> {
        let epics = self.list_epics().await?;
        let sprints = self.list_sprints(None).await?;
        Ok(summarize(epics.len(), &sprints))
    }

    async fn archive_epic(&self, epic_id: &str) -> Result<()> {
        let _guard = self.ops.lock().await;
        let dir = self.find_epic_dir(epic_id)?;
        let name = dir.file_name().ok_or_else(|| {
            WorkflowError::PersistenceInconsistency(format!(
                "epic directory has no name: {}",
                dir.display()
            ))
        })?;
        let target = self.board_dir.join("7-archive").join(name);
        if target.exists() {
            warn!(epic = epic_id, "archive target already exists, leaving epic in place");
            return Err(WorkflowError::PersistenceInconsistency(format!(
                "archive target already exists: {}",
                target.display()
            )));
        }
        std::fs::rename(&dir, &target)?;
        Ok(())
    }
}
