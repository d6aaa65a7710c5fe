use super::matching::{same_day, task_notes, task_title, TaskIndex};
use super::throttle::Throttle;
use super::{IssueTracker, TaskService};
use crate::errors::SyncError;
use crate::models::issue::JiraIssue;
use crate::models::task::{Task, TaskDraft, TaskList};
use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use futures::future::try_join_all;
use serde::Deserialize;
use tracing::{debug, error, info, warn};

/// Which side wins when a task's due date and its issue's due date disagree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DueDateSource {
    /// The task's due date is written back to Jira.
    #[default]
    Google,
    /// The issue's due date is written to the task.
    Jira,
}

#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Base URL used for the browse link in task notes.
    pub jira_url: String,
    /// List that receives new tasks. `None` means the first list.
    pub tasklist_id: Option<String>,
    pub due_date_source: DueDateSource,
    pub dry_run: bool,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub issues: usize,
    pub created: usize,
    pub completed: usize,
    pub jira_due_dates: usize,
    pub task_due_dates: usize,
    pub unchanged: usize,
    pub duplicates: usize,
    pub failures: usize,
}

impl SyncReport {
    /// Number of writes made (or planned, in a dry run).
    pub fn writes(&self) -> usize {
        self.created + self.completed + self.jira_due_dates + self.task_due_dates
    }

    pub fn summary(&self) -> String {
        format!(
            "{} issues: {} created, {} completed, {} due dates sent to Jira, {} due dates sent to Google, {} unchanged, {} duplicate titles, {} failures",
            self.issues,
            self.created,
            self.completed,
            self.jira_due_dates,
            self.task_due_dates,
            self.unchanged,
            self.duplicates,
            self.failures
        )
    }

    fn count(&mut self, action: &Action) {
        match action {
            Action::Create(_) => self.created += 1,
            Action::Complete { .. } => self.completed += 1,
            Action::DueDateToJira(_) => self.jira_due_dates += 1,
            Action::DueDateToTask { .. } => self.task_due_dates += 1,
            Action::Nothing => self.unchanged += 1,
        }
    }
}

/// What one issue needs in this run.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Create(TaskDraft),
    Complete {
        task_id: String,
        tasklist_id: String,
        completed_at: DateTime<FixedOffset>,
    },
    DueDateToJira(NaiveDate),
    DueDateToTask {
        task_id: String,
        tasklist_id: String,
        due: NaiveDate,
    },
    Nothing,
}

/// Decides the action for `issue` given its matched task, if any.
///
/// Completion takes priority: a due-date mismatch is left for the next run
/// when the task is completed in this one.
pub fn plan(issue: &JiraIssue, existing: Option<&Task>, options: &SyncOptions) -> Action {
    let Some(task) = existing else {
        return Action::Create(TaskDraft {
            title: task_title(issue),
            notes: task_notes(issue, &options.jira_url),
            resolved: issue.is_resolved(),
            resolution_date: issue.fields.resolution_date,
            due: issue.fields.due_date,
        });
    };

    if issue.is_resolved() && !task.is_completed() {
        let completed_at = issue
            .fields
            .resolution_date
            .unwrap_or_else(|| DateTime::<FixedOffset>::from(Utc::now()));
        return Action::Complete {
            task_id: task.id.clone(),
            tasklist_id: task.list_id.clone(),
            completed_at,
        };
    }

    match options.due_date_source {
        DueDateSource::Google => {
            if let Some(task_due) = task.due {
                if !same_day(issue.fields.due_date, &task_due) {
                    return Action::DueDateToJira(task_due.date_naive());
                }
            }
        }
        DueDateSource::Jira => {
            if let Some(jira_due) = issue.fields.due_date {
                let in_sync = task
                    .due
                    .map(|task_due| same_day(Some(jira_due), &task_due))
                    .unwrap_or(false);
                if !in_sync {
                    return Action::DueDateToTask {
                        task_id: task.id.clone(),
                        tasklist_id: task.list_id.clone(),
                        due: jira_due,
                    };
                }
            }
        }
    }

    Action::Nothing
}

/// Picks the configured list, or the first one the account returns.
pub fn select_task_list<'a>(lists: &'a [TaskList], configured: Option<&str>) -> Result<&'a TaskList> {
    match configured {
        Some(id) => lists
            .iter()
            .find(|list| list.id == id)
            .ok_or_else(|| SyncError::TaskListNotFound(id.to_string()).into()),
        None => {
            let first = lists.first().ok_or(SyncError::NoTaskLists)?;
            if lists.len() > 1 {
                warn!(
                    tasklist = %first.id,
                    title = %first.title,
                    "No task list configured; using the first of {} lists",
                    lists.len()
                );
            }
            Ok(first)
        }
    }
}

/// Tasks of every list, fetched concurrently and concatenated in list order.
pub async fn fetch_all_tasks<T>(service: &T, lists: &[TaskList]) -> Result<Vec<Task>>
where
    T: TaskService + ?Sized,
{
    let per_list = try_join_all(lists.iter().map(|list| service.list_tasks(&list.id))).await?;
    Ok(per_list.into_iter().flatten().collect())
}

pub struct Reconciler<'a, J: ?Sized, T: ?Sized> {
    jira: &'a J,
    tasks: &'a T,
    throttle: &'a dyn Throttle,
    options: SyncOptions,
}

impl<'a, J, T> Reconciler<'a, J, T>
where
    J: IssueTracker + ?Sized,
    T: TaskService + ?Sized,
{
    pub fn new(jira: &'a J, tasks: &'a T, throttle: &'a dyn Throttle, options: SyncOptions) -> Self {
        Self {
            jira,
            tasks,
            throttle,
            options,
        }
    }

    /// One reconciliation pass. Listing failures abort the run; failures of
    /// individual writes are logged and counted.
    pub async fn run(&self) -> Result<SyncReport> {
        let lists = self
            .tasks
            .list_task_lists()
            .await
            .context("Failed to list Google task lists")?;
        let target = select_task_list(&lists, self.options.tasklist_id.as_deref())?;
        info!(tasklist = %target.id, title = %target.title, "Syncing into task list");

        let (issues, tasks) = tokio::try_join!(
            async {
                self.jira
                    .fetch_assigned_issues()
                    .await
                    .context("Failed to fetch Jira issues")
            },
            async {
                fetch_all_tasks(self.tasks, &lists)
                    .await
                    .context("Failed to fetch Google tasks")
            },
        )?;
        info!(issues = issues.len(), tasks = tasks.len(), "Fetched issues and tasks");

        let index = TaskIndex::new(&tasks);
        let mut report = SyncReport {
            issues: issues.len(),
            ..Default::default()
        };

        // One issue at a time; the task API rate-limits writes.
        for issue in &issues {
            self.reconcile(issue, &index, &target.id, &mut report).await;
        }

        Ok(report)
    }

    async fn reconcile(
        &self,
        issue: &JiraIssue,
        index: &TaskIndex<'_>,
        target_list: &str,
        report: &mut SyncReport,
    ) {
        let title = task_title(issue);
        let found = index.lookup(&title);

        if let Some(found) = &found {
            if found.duplicates > 0 {
                warn!(
                    title = %title,
                    duplicates = found.duplicates,
                    "Several tasks share this title; using the first"
                );
                report.duplicates += found.duplicates;
            }
        }

        let action = plan(issue, found.map(|m| m.task), &self.options);

        if self.options.dry_run {
            if action != Action::Nothing {
                info!(title = %title, action = ?action, "Dry run: skipping write");
            }
            report.count(&action);
            return;
        }

        let outcome = match &action {
            Action::Create(draft) => {
                info!(title = %draft.title, "Creating task");
                self.throttle.wait().await;
                self.tasks
                    .create_task(target_list, draft)
                    .await
                    .with_context(|| format!("Error creating new task: {}", draft.title))
            }
            Action::Complete {
                task_id,
                tasklist_id,
                completed_at,
            } => {
                info!(title = %title, "Completing task");
                let list = if tasklist_id.is_empty() { target_list } else { tasklist_id.as_str() };
                self.tasks
                    .complete_task(list, task_id, *completed_at)
                    .await
                    .with_context(|| format!("Error updating task: {}", task_id))
            }
            Action::DueDateToJira(due) => {
                info!(title = %title, due = %due, "Updating Jira due date");
                self.jira
                    .set_due_date(&issue.key, *due)
                    .await
                    .with_context(|| format!("Error updating due date of {}", issue.key))
            }
            Action::DueDateToTask {
                task_id,
                tasklist_id,
                due,
            } => {
                info!(title = %title, due = %due, "Updating task due date");
                let list = if tasklist_id.is_empty() { target_list } else { tasklist_id.as_str() };
                self.tasks
                    .update_due_date(list, task_id, *due)
                    .await
                    .with_context(|| format!("Error updating task: {}", task_id))
            }
            Action::Nothing => {
                debug!(title = %title, "Up to date");
                Ok(())
            }
        };

        match outcome {
            Ok(()) => report.count(&action),
            Err(e) => {
                error!(title = %title, error = %format!("{:#}", e), "Sync step failed");
                report.failures += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::issue::{IssueFields, Resolution};
    use crate::models::task::{format_due, TaskStatus};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    enum TaskCall {
        Create { list: String, draft: TaskDraft },
        Complete { list: String, task_id: String, completed_at: DateTime<FixedOffset> },
        UpdateDue { list: String, task_id: String, due: NaiveDate },
    }

    #[derive(Default)]
    struct FakeJira {
        issues: Mutex<Vec<JiraIssue>>,
        due_updates: Mutex<Vec<(String, NaiveDate)>>,
        fail_fetch: bool,
        fail_due_dates: bool,
    }

    impl FakeJira {
        fn with(issues: Vec<JiraIssue>) -> Self {
            Self {
                issues: Mutex::new(issues),
                ..Default::default()
            }
        }

        fn due_updates(&self) -> Vec<(String, NaiveDate)> {
            self.due_updates.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl IssueTracker for FakeJira {
        async fn fetch_assigned_issues(&self) -> Result<Vec<JiraIssue>> {
            if self.fail_fetch {
                anyhow::bail!("search failed");
            }
            Ok(self.issues.lock().unwrap().clone())
        }

        async fn set_due_date(&self, issue_key: &str, due: NaiveDate) -> Result<()> {
            self.due_updates.lock().unwrap().push((issue_key.to_string(), due));
            if self.fail_due_dates {
                anyhow::bail!("Field 'duedate' cannot be set");
            }
            for issue in self.issues.lock().unwrap().iter_mut() {
                if issue.key == issue_key {
                    issue.fields.due_date = Some(due);
                }
            }
            Ok(())
        }
    }

    struct FakeTasks {
        lists: Vec<TaskList>,
        store: Mutex<Vec<Task>>,
        calls: Mutex<Vec<TaskCall>>,
        fail_titles: Vec<String>,
        fail_updates: bool,
    }

    impl FakeTasks {
        fn new(list_ids: &[&str], tasks: Vec<Task>) -> Self {
            Self {
                lists: list_ids
                    .iter()
                    .map(|id| TaskList {
                        id: id.to_string(),
                        title: format!("List {}", id),
                    })
                    .collect(),
                store: Mutex::new(tasks),
                calls: Mutex::new(Vec::new()),
                fail_titles: Vec::new(),
                fail_updates: false,
            }
        }

        fn calls(&self) -> Vec<TaskCall> {
            self.calls.lock().unwrap().clone()
        }

        fn clear_calls(&self) {
            self.calls.lock().unwrap().clear();
        }
    }

    #[async_trait]
    impl TaskService for FakeTasks {
        async fn list_task_lists(&self) -> Result<Vec<TaskList>> {
            Ok(self.lists.clone())
        }

        async fn list_tasks(&self, tasklist_id: &str) -> Result<Vec<Task>> {
            Ok(self
                .store
                .lock()
                .unwrap()
                .iter()
                .filter(|t| t.list_id == tasklist_id)
                .cloned()
                .collect())
        }

        async fn create_task(&self, tasklist_id: &str, draft: &TaskDraft) -> Result<()> {
            self.calls.lock().unwrap().push(TaskCall::Create {
                list: tasklist_id.to_string(),
                draft: draft.clone(),
            });
            if self.fail_titles.contains(&draft.title) {
                anyhow::bail!("quota exceeded");
            }

            let mut store = self.store.lock().unwrap();
            let completed = draft.completed_at();
            let id = format!("new-{}", store.len());
            store.push(Task {
                id,
                title: draft.title.clone(),
                notes: Some(draft.notes.clone()),
                status: if completed.is_some() {
                    TaskStatus::Completed
                } else {
                    TaskStatus::NeedsAction
                },
                completed,
                due: draft.due.map(midnight),
                list_id: tasklist_id.to_string(),
            });
            Ok(())
        }

        async fn complete_task(
            &self,
            tasklist_id: &str,
            task_id: &str,
            completed_at: DateTime<FixedOffset>,
        ) -> Result<()> {
            self.calls.lock().unwrap().push(TaskCall::Complete {
                list: tasklist_id.to_string(),
                task_id: task_id.to_string(),
                completed_at,
            });
            if self.fail_updates {
                anyhow::bail!("task not found");
            }
            for task in self.store.lock().unwrap().iter_mut() {
                if task.id == task_id {
                    task.status = TaskStatus::Completed;
                    task.completed = Some(completed_at);
                }
            }
            Ok(())
        }

        async fn update_due_date(&self, tasklist_id: &str, task_id: &str, due: NaiveDate) -> Result<()> {
            self.calls.lock().unwrap().push(TaskCall::UpdateDue {
                list: tasklist_id.to_string(),
                task_id: task_id.to_string(),
                due,
            });
            if self.fail_updates {
                anyhow::bail!("task not found");
            }
            for task in self.store.lock().unwrap().iter_mut() {
                if task.id == task_id {
                    task.due = Some(midnight(due));
                }
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct CountingThrottle {
        waits: AtomicUsize,
    }

    #[async_trait]
    impl Throttle for CountingThrottle {
        async fn wait(&self) {
            self.waits.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn midnight(day: NaiveDate) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(&format_due(day)).unwrap()
    }

    fn issue(key: &str, summary: &str) -> JiraIssue {
        JiraIssue {
            key: key.to_string(),
            fields: IssueFields {
                summary: summary.to_string(),
                description: Some(format!("About {}", key)),
                ..Default::default()
            },
        }
    }

    fn resolved(mut issue: JiraIssue, at: &str) -> JiraIssue {
        issue.fields.resolution = Some(Resolution {
            name: "Done".to_string(),
        });
        issue.fields.resolution_date = Some(DateTime::parse_from_rfc3339(at).unwrap());
        issue
    }

    fn due(mut issue: JiraIssue, day: NaiveDate) -> JiraIssue {
        issue.fields.due_date = Some(day);
        issue
    }

    fn task(id: &str, list: &str, title: &str) -> Task {
        Task {
            id: id.to_string(),
            title: title.to_string(),
            list_id: list.to_string(),
            ..Default::default()
        }
    }

    fn options() -> SyncOptions {
        SyncOptions {
            jira_url: "https://jira.example.com".to_string(),
            tasklist_id: None,
            due_date_source: DueDateSource::Google,
            dry_run: false,
        }
    }

    async fn run(jira: &FakeJira, tasks: &FakeTasks, options: SyncOptions) -> SyncReport {
        let throttle = CountingThrottle::default();
        Reconciler::new(jira, tasks, &throttle, options).run().await.unwrap()
    }

    #[tokio::test]
    async fn test_creates_missing_task_in_first_list() {
        let jira = FakeJira::with(vec![issue("X-1", "Write docs")]);
        let tasks = FakeTasks::new(&["L1", "L2"], vec![]);

        let report = run(&jira, &tasks, options()).await;

        let calls = tasks.calls();
        assert_eq!(calls.len(), 1);
        match &calls[0] {
            TaskCall::Create { list, draft } => {
                assert_eq!(list, "L1");
                assert_eq!(draft.title, "[X-1] Write docs");
                assert_eq!(draft.notes, "About X-1\n\nhttps://jira.example.com/browse/X-1");
                assert_eq!(draft.completed_at(), None);
                assert_eq!(draft.due, None);
            }
            other => panic!("unexpected call: {:?}", other),
        }
        assert_eq!(report.created, 1);
        assert_eq!(report.writes(), 1);
    }

    #[tokio::test]
    async fn test_create_carries_resolution_and_due_date() {
        let jira = FakeJira::with(vec![due(
            resolved(issue("X-5", "Old work"), "2024-01-05T09:00:00+00:00"),
            date(2024, 1, 3),
        )]);
        let tasks = FakeTasks::new(&["L1"], vec![]);

        run(&jira, &tasks, options()).await;

        match &tasks.calls()[0] {
            TaskCall::Create { draft, .. } => {
                assert_eq!(
                    draft.completed_at(),
                    Some(DateTime::parse_from_rfc3339("2024-01-05T09:00:00+00:00").unwrap())
                );
                assert_eq!(draft.due, Some(date(2024, 1, 3)));
            }
            other => panic!("unexpected call: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_completes_open_task_of_resolved_issue() {
        let jira = FakeJira::with(vec![due(
            resolved(issue("X-2", "Ship it"), "2024-01-05T00:00:00+00:00"),
            date(2024, 1, 1),
        )]);
        let mut existing = task("t2", "L1", "[X-2] Ship it");
        existing.due = Some(midnight(date(2024, 1, 20)));
        let tasks = FakeTasks::new(&["L1"], vec![existing]);

        let report = run(&jira, &tasks, options()).await;

        assert_eq!(
            tasks.calls(),
            vec![TaskCall::Complete {
                list: "L1".to_string(),
                task_id: "t2".to_string(),
                completed_at: DateTime::parse_from_rfc3339("2024-01-05T00:00:00+00:00").unwrap(),
            }]
        );
        // Completion wins over the due-date mismatch in the same pass
        assert!(jira.due_updates().is_empty());
        assert_eq!(report.completed, 1);
        assert_eq!(report.jira_due_dates, 0);
    }

    #[tokio::test]
    async fn test_task_due_date_is_written_back_to_jira() {
        let jira = FakeJira::with(vec![due(issue("X-3", "Plan"), date(2024, 2, 10))]);
        let mut existing = task("t3", "L1", "[X-3] Plan");
        existing.status = TaskStatus::Completed;
        existing.due = Some(midnight(date(2024, 2, 20)));
        let tasks = FakeTasks::new(&["L1"], vec![existing]);

        let report = run(&jira, &tasks, options()).await;

        assert!(tasks.calls().is_empty());
        assert_eq!(jira.due_updates(), vec![("X-3".to_string(), date(2024, 2, 20))]);
        assert_eq!(report.jira_due_dates, 1);
    }

    #[tokio::test]
    async fn test_same_day_due_dates_are_left_alone() {
        let jira = FakeJira::with(vec![due(issue("X-4", "Review"), date(2024, 3, 1))]);
        let mut existing = task("t4", "L1", "[X-4] Review");
        existing.due = Some(DateTime::parse_from_rfc3339("2024-03-01T00:00:00.000Z").unwrap());
        let tasks = FakeTasks::new(&["L1"], vec![existing]);

        let report = run(&jira, &tasks, options()).await;

        assert!(tasks.calls().is_empty());
        assert!(jira.due_updates().is_empty());
        assert_eq!(report.unchanged, 1);
    }

    #[tokio::test]
    async fn test_task_without_due_date_is_left_alone() {
        let jira = FakeJira::with(vec![due(issue("X-6", "Triage"), date(2024, 3, 1))]);
        let tasks = FakeTasks::new(&["L1"], vec![task("t6", "L1", "[X-6] Triage")]);

        let report = run(&jira, &tasks, options()).await;

        assert!(tasks.calls().is_empty());
        assert!(jira.due_updates().is_empty());
        assert_eq!(report.unchanged, 1);
    }

    #[tokio::test]
    async fn test_jira_as_due_date_source_updates_task() {
        let jira = FakeJira::with(vec![due(issue("X-3", "Plan"), date(2024, 2, 10))]);
        let mut existing = task("t3", "L1", "[X-3] Plan");
        existing.due = Some(midnight(date(2024, 2, 20)));
        let tasks = FakeTasks::new(&["L1"], vec![existing]);

        let mut opts = options();
        opts.due_date_source = DueDateSource::Jira;
        let report = run(&jira, &tasks, opts).await;

        assert!(jira.due_updates().is_empty());
        assert_eq!(
            tasks.calls(),
            vec![TaskCall::UpdateDue {
                list: "L1".to_string(),
                task_id: "t3".to_string(),
                due: date(2024, 2, 10),
            }]
        );
        assert_eq!(report.task_due_dates, 1);
    }

    #[tokio::test]
    async fn test_second_run_makes_no_writes() {
        let mut drifted = task("t9", "L1", "[X-9] Drifted");
        drifted.due = Some(midnight(date(2024, 5, 2)));

        let jira = FakeJira::with(vec![
            issue("X-1", "Open"),
            resolved(issue("X-2", "Closed"), "2024-01-05T00:00:00+00:00"),
            due(issue("X-3", "Dated"), date(2024, 2, 10)),
            due(issue("X-9", "Drifted"), date(2024, 5, 1)),
            resolved(issue("X-10", "Closed later"), "2024-04-01T12:00:00+00:00"),
        ]);
        let tasks = FakeTasks::new(
            &["L1"],
            vec![drifted, task("t10", "L1", "[X-10] Closed later")],
        );

        let first = run(&jira, &tasks, options()).await;
        assert_eq!(first.created, 3);
        assert_eq!(first.completed, 1);
        assert_eq!(first.jira_due_dates, 1);

        tasks.clear_calls();
        let before = jira.due_updates().len();

        let second = run(&jira, &tasks, options()).await;
        assert!(tasks.calls().is_empty());
        assert_eq!(jira.due_updates().len(), before);
        assert_eq!(second.writes(), 0);
        assert_eq!(second.unchanged, 5);
    }

    #[tokio::test]
    async fn test_duplicate_titles_use_first_and_are_reported() {
        let jira = FakeJira::with(vec![resolved(issue("X-7", "Twice"), "2024-01-05T00:00:00+00:00")]);
        let tasks = FakeTasks::new(
            &["L1"],
            vec![
                task("first", "L1", "[X-7] Twice"),
                task("second", "L1", "[X-7] Twice"),
            ],
        );

        let report = run(&jira, &tasks, options()).await;

        assert_eq!(report.duplicates, 1);
        assert_eq!(report.created, 0);
        match &tasks.calls()[..] {
            [TaskCall::Complete { task_id, .. }] => assert_eq!(task_id, "first"),
            other => panic!("unexpected calls: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_tasks_from_other_lists_match_and_update_in_place() {
        let jira = FakeJira::with(vec![resolved(issue("X-8", "Elsewhere"), "2024-01-05T00:00:00+00:00")]);
        let tasks = FakeTasks::new(&["L1", "L2"], vec![task("t8", "L2", "[X-8] Elsewhere")]);

        let report = run(&jira, &tasks, options()).await;

        assert_eq!(report.created, 0);
        match &tasks.calls()[..] {
            [TaskCall::Complete { list, task_id, .. }] => {
                assert_eq!(list, "L2");
                assert_eq!(task_id, "t8");
            }
            other => panic!("unexpected calls: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_create_failure_is_counted_and_run_continues() {
        let jira = FakeJira::with(vec![issue("X-1", "Fails"), issue("X-2", "Works")]);
        let mut tasks = FakeTasks::new(&["L1"], vec![]);
        tasks.fail_titles = vec!["[X-1] Fails".to_string()];

        let report = run(&jira, &tasks, options()).await;

        assert_eq!(tasks.calls().len(), 2);
        assert_eq!(report.failures, 1);
        assert_eq!(report.created, 1);
    }

    #[tokio::test]
    async fn test_failed_updates_are_counted_and_run_continues() {
        let mut jira = FakeJira::with(vec![
            resolved(issue("X-1", "Close me"), "2024-01-05T00:00:00+00:00"),
            due(issue("X-2", "Reschedule"), date(2024, 2, 10)),
            issue("X-3", "Still created"),
        ]);
        jira.fail_due_dates = true;

        let mut rescheduled = task("t2", "L1", "[X-2] Reschedule");
        rescheduled.due = Some(midnight(date(2024, 2, 20)));
        let mut tasks = FakeTasks::new(&["L1"], vec![task("t1", "L1", "[X-1] Close me"), rescheduled]);
        tasks.fail_updates = true;

        let throttle = CountingThrottle::default();
        let report = Reconciler::new(&jira, &tasks, &throttle, options())
            .run()
            .await
            .unwrap();

        assert_eq!(jira.due_updates(), vec![("X-2".to_string(), date(2024, 2, 20))]);
        assert_eq!(report.failures, 2);
        assert_eq!(report.completed, 0);
        assert_eq!(report.jira_due_dates, 0);
        assert_eq!(report.created, 1);
        match &tasks.calls()[..] {
            [TaskCall::Complete { task_id, .. }, TaskCall::Create { draft, .. }] => {
                assert_eq!(task_id, "t1");
                assert_eq!(draft.title, "[X-3] Still created");
            }
            other => panic!("unexpected calls: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failed_task_due_date_update_is_counted() {
        let jira = FakeJira::with(vec![due(issue("X-3", "Plan"), date(2024, 2, 10))]);
        let mut existing = task("t3", "L1", "[X-3] Plan");
        existing.due = Some(midnight(date(2024, 2, 20)));
        let mut tasks = FakeTasks::new(&["L1"], vec![existing]);
        tasks.fail_updates = true;

        let mut opts = options();
        opts.due_date_source = DueDateSource::Jira;
        let report = run(&jira, &tasks, opts).await;

        assert_eq!(tasks.calls().len(), 1);
        assert_eq!(report.failures, 1);
        assert_eq!(report.task_due_dates, 0);
    }

    #[tokio::test]
    async fn test_throttle_waits_before_each_creation() {
        let jira = FakeJira::with(vec![
            issue("X-1", "One"),
            issue("X-2", "Two"),
            resolved(issue("X-3", "Three"), "2024-01-05T00:00:00+00:00"),
        ]);
        let tasks = FakeTasks::new(&["L1"], vec![task("t3", "L1", "[X-3] Three")]);
        let throttle = CountingThrottle::default();

        Reconciler::new(&jira, &tasks, &throttle, options())
            .run()
            .await
            .unwrap();

        assert_eq!(throttle.waits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_dry_run_makes_no_writes() {
        let jira = FakeJira::with(vec![
            issue("X-1", "New"),
            due(issue("X-3", "Plan"), date(2024, 2, 10)),
        ]);
        let mut existing = task("t3", "L1", "[X-3] Plan");
        existing.due = Some(midnight(date(2024, 2, 20)));
        let tasks = FakeTasks::new(&["L1"], vec![existing]);

        let mut opts = options();
        opts.dry_run = true;
        let report = run(&jira, &tasks, opts).await;

        assert!(tasks.calls().is_empty());
        assert!(jira.due_updates().is_empty());
        assert_eq!(report.created, 1);
        assert_eq!(report.jira_due_dates, 1);
    }

    #[tokio::test]
    async fn test_configured_task_list_is_used() {
        let jira = FakeJira::with(vec![issue("X-1", "Write docs")]);
        let tasks = FakeTasks::new(&["L1", "L2"], vec![]);

        let mut opts = options();
        opts.tasklist_id = Some("L2".to_string());
        run(&jira, &tasks, opts).await;

        match &tasks.calls()[..] {
            [TaskCall::Create { list, .. }] => assert_eq!(list, "L2"),
            other => panic!("unexpected calls: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_configured_list_fails() {
        let jira = FakeJira::with(vec![issue("X-1", "Write docs")]);
        let tasks = FakeTasks::new(&["L1"], vec![]);
        let throttle = CountingThrottle::default();

        let mut opts = options();
        opts.tasklist_id = Some("missing".to_string());
        let err = Reconciler::new(&jira, &tasks, &throttle, opts)
            .run()
            .await
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<SyncError>(),
            Some(SyncError::TaskListNotFound(id)) if id == "missing"
        ));
        assert!(tasks.calls().is_empty());
    }

    #[tokio::test]
    async fn test_no_task_lists_fails() {
        let jira = FakeJira::with(vec![]);
        let tasks = FakeTasks::new(&[], vec![]);
        let throttle = CountingThrottle::default();

        let err = Reconciler::new(&jira, &tasks, &throttle, options())
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<SyncError>(), Some(SyncError::NoTaskLists)));
    }

    #[tokio::test]
    async fn test_jira_failure_aborts_run() {
        let jira = FakeJira {
            fail_fetch: true,
            ..Default::default()
        };
        let tasks = FakeTasks::new(&["L1"], vec![]);
        let throttle = CountingThrottle::default();

        let result = Reconciler::new(&jira, &tasks, &throttle, options()).run().await;

        assert!(result.is_err());
        assert!(tasks.calls().is_empty());
    }

    #[test]
    fn test_plan_without_resolution_date_completes_now() {
        let mut closed = issue("X-2", "Ship it");
        closed.fields.resolution = Some(Resolution {
            name: "Done".to_string(),
        });
        let existing = task("t2", "L1", "[X-2] Ship it");

        let before = Utc::now();
        match plan(&closed, Some(&existing), &options()) {
            Action::Complete { completed_at, .. } => {
                assert!(completed_at.timestamp() >= before.timestamp())
            }
            other => panic!("unexpected action: {:?}", other),
        }
    }

    #[test]
    fn test_report_summary() {
        let report = SyncReport {
            issues: 4,
            created: 1,
            completed: 1,
            jira_due_dates: 1,
            unchanged: 1,
            ..Default::default()
        };
        assert_eq!(report.writes(), 3);
        assert!(report.summary().starts_with("4 issues: 1 created, 1 completed"));
    }
}
