//! Tasks: an ephemeral to-do list with batch creation and text search.

use std::sync::{Arc, LazyLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::app::AppState;
use crate::docs::{Body, Operation, Param, ParamKind, Returns};
use crate::error::ApiError;
use crate::method::Method;
use crate::request::{Query, Request};
use crate::response::Response;
use crate::router::Router;
use crate::status::Status;
use crate::store::{self, Entity, Page, Store};
use crate::validate::{Field, FieldError, Mode, Schema};

use super::{FieldErrors, Resource};

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Todo,
    InProgress,
    Done,
}

impl TaskStatus {
    pub const VARIANTS: &'static [&'static str] = &["todo", "in_progress", "done"];

    fn from_wire(s: &str) -> Option<Self> {
        match s {
            "todo" => Some(Self::Todo),
            "in_progress" => Some(Self::InProgress),
            "done" => Some(Self::Done),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub const VARIANTS: &'static [&'static str] = &["low", "medium", "high"];

    fn from_wire(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

static SCHEMA: LazyLock<Schema> = LazyLock::new(|| {
    Schema::new("Task", vec![
        Field::integer("id").read_only().describe("Unique identifier"),
        Field::string("title").required().min_length(1).max_length(100).describe("Short title"),
        Field::string("description").nullable().max_length(500).describe("Longer description"),
        Field::one_of("status", TaskStatus::VARIANTS).default("todo").describe("Progress state"),
        Field::one_of("priority", Priority::VARIANTS).default("medium").describe("Relative importance"),
        Field::timestamp("created_at").describe("When the task was created"),
    ])
    .unwrap_or_else(|e| panic!("invalid Task schema: {e}"))
});

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Task {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct TaskInput {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: Priority,
}

#[derive(Debug, Default, Deserialize)]
pub struct TaskPatch {
    pub title: Option<String>,
    #[serde(default, deserialize_with = "crate::validate::present")]
    pub description: Option<Option<String>>,
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
}

#[derive(Debug, Default)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    pub text: Option<TextMatch>,
}

/// Case-insensitive substring search over the chosen text fields.
#[derive(Debug)]
pub struct TextMatch {
    needle: String,
    in_title: bool,
    in_description: bool,
}

impl TextMatch {
    pub fn new(query: &str, in_title: bool, in_description: bool) -> Self {
        Self { needle: query.trim().to_lowercase(), in_title, in_description }
    }

    fn hits(&self, task: &Task) -> bool {
        let found = |text: &str| text.to_lowercase().contains(&self.needle);
        (self.in_title && found(&task.title))
            || (self.in_description && task.description.as_deref().is_some_and(found))
    }
}

impl Entity for Task {
    type Input = TaskInput;
    type Patch = TaskPatch;
    type Filter = TaskFilter;

    const KIND: &'static str = "Task";

    fn schema() -> &'static Schema {
        &SCHEMA
    }

    fn id(&self) -> i64 {
        self.id
    }

    fn build(id: i64, input: TaskInput, now: DateTime<Utc>) -> Self {
        Task {
            id,
            title: input.title,
            description: input.description,
            status: input.status,
            priority: input.priority,
            created_at: now,
        }
    }

    // Tasks carry no updated_at, so there is nothing to touch.
    fn replace(&mut self, input: TaskInput, _now: DateTime<Utc>) {
        *self = Task::build(self.id, input, self.created_at);
    }

    fn merge(&mut self, patch: TaskPatch, _now: DateTime<Utc>) {
        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(description) = patch.description {
            self.description = description;
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(priority) = patch.priority {
            self.priority = priority;
        }
    }

    fn matches(&self, filter: &TaskFilter) -> bool {
        filter.status.is_none_or(|s| s == self.status)
            && filter.priority.is_none_or(|p| p == self.priority)
            && filter.text.as_ref().is_none_or(|t| t.hits(self))
    }
}

impl Resource for Task {
    const PATH: &'static str = "/tasks";
    const TAG: &'static str = "tasks";
    const DELETABLE: bool = true;

    fn store(state: &AppState) -> Arc<dyn Store<Self>> {
        Arc::clone(&state.tasks)
    }

    fn filter(query: &Query, errors: &mut FieldErrors) -> TaskFilter {
        let status = errors.take(query.one_of("status", TaskStatus::VARIANTS));
        let priority = errors.take(query.one_of("priority", Priority::VARIANTS));
        TaskFilter {
            status: status.as_deref().and_then(TaskStatus::from_wire),
            priority: priority.as_deref().and_then(Priority::from_wire),
            text: None,
        }
    }

    fn filter_params() -> Vec<Param> {
        vec![
            Param::query("status", ParamKind::Enum(TaskStatus::VARIANTS), "Only tasks in this state"),
            Param::query("priority", ParamKind::Enum(Priority::VARIANTS), "Only tasks with this priority"),
        ]
    }
}

/// Registers `POST /tasks/batch` and `GET /tasks/search`.
pub fn mount_bulk(router: Router<AppState>) -> Router<AppState> {
    router
        .route(
            Method::Post,
            "/tasks/batch",
            Operation::new("Create several tasks at once")
                .tag(Task::TAG)
                .body(Body::Batch { schema: Task::schema(), key: "tasks" })
                .success(Status::Created)
                .errors([Status::BadRequest, Status::UnprocessableContent]),
            create_batch,
        )
        .route(
            Method::Get,
            "/tasks/search",
            Operation::new("Search tasks by text")
                .tag(Task::TAG)
                .params([
                    Param::query("q", ParamKind::String, "Text to look for, case-insensitive").required(),
                    Param::query("in_title", ParamKind::Boolean, "Search titles (default true)"),
                    Param::query("in_description", ParamKind::Boolean, "Search descriptions (default true)"),
                ])
                .returns(Returns::Json)
                .errors([Status::UnprocessableContent]),
            search,
        )
}

#[derive(Serialize)]
struct BatchCreated {
    message: String,
    tasks: Vec<Task>,
    notification_sent: bool,
}

/// Validates every item before creating any, then inserts them atomically.
async fn create_batch(req: Request, state: AppState) -> Result<Response, ApiError> {
    let body = req.json()?;
    let mut errors = FieldErrors::default();

    let items: &[Value] = match body.get("tasks") {
        Some(Value::Array(items)) => items.as_slice(),
        Some(_) => {
            errors.push(FieldError::new("tasks", "must be an array"));
            &[]
        }
        None if body.is_object() => {
            errors.push(FieldError::new("tasks", "field required"));
            &[]
        }
        None => {
            errors.push(FieldError::new("body", "must be a JSON object"));
            &[]
        }
    };
    let notify = match body.get("notify") {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(_) => {
            errors.push(FieldError::new("notify", "must be a boolean"));
            false
        }
    };

    let mut inputs = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        match Task::schema().validate::<TaskInput>(item, Mode::Full) {
            Ok(input) => inputs.push(input),
            Err(e) => errors.extend(e.prefixed(&format!("tasks[{i}]"))),
        }
    }
    errors.finish()?;

    let tasks = state.tasks.clone();
    let created = store::run(state.store_timeout, move || tasks.create_many(inputs)).await?;
    info!(count = created.len(), notify, "batch of tasks created");

    Ok(Response::builder().status(Status::Created).json(&BatchCreated {
        message: format!("Created {} tasks successfully", created.len()),
        tasks: created,
        notification_sent: notify,
    }))
}

#[derive(Serialize)]
struct SearchResults {
    message: String,
    query: String,
    results: Vec<Task>,
}

async fn search(req: Request, state: AppState) -> Result<Response, ApiError> {
    let query = req.query();
    let mut errors = FieldErrors::default();

    let q = query.get("q").map(str::to_owned);
    if q.is_none() {
        errors.push(FieldError::new("q", "must not be empty"));
    }
    let in_title = errors.take(query.bool("in_title")).unwrap_or(true);
    let in_description = errors.take(query.bool("in_description")).unwrap_or(true);
    errors.finish()?;
    let q = q.unwrap_or_default();

    let filter = TaskFilter { text: Some(TextMatch::new(&q, in_title, in_description)), ..TaskFilter::default() };
    let tasks = state.tasks.clone();
    let results = store::run(state.store_timeout, move || tasks.list(&filter, Page::everything())).await?;

    let message = match results.len() {
        0 => "No tasks found matching your search".to_owned(),
        n => format!("Found {n} matching tasks"),
    };
    Ok(Response::json(&SearchResults { message, query: q, results }))
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use serde_json::json;

    use super::*;

    fn task(title: &str, description: Option<&str>) -> Task {
        let input = TaskInput {
            title: title.to_owned(),
            description: description.map(str::to_owned),
            status: TaskStatus::Todo,
            priority: Priority::Medium,
        };
        Task::build(1, input, DateTime::<Utc>::UNIX_EPOCH)
    }

    #[test]
    fn enums_use_snake_case_on_the_wire() {
        assert_eq!(serde_json::to_value(TaskStatus::InProgress).unwrap(), json!("in_progress"));
        for v in TaskStatus::VARIANTS {
            assert!(TaskStatus::from_wire(v).is_some());
        }
        for v in Priority::VARIANTS {
            assert!(Priority::from_wire(v).is_some());
        }
    }

    #[test]
    fn defaults_apply_on_create() {
        let input: TaskInput = Task::schema().validate(&json!({"title": "t"}), Mode::Full).unwrap();
        assert_eq!(input.status, TaskStatus::Todo);
        assert_eq!(input.priority, Priority::Medium);

        let err = Task::schema()
            .validate::<TaskInput>(&json!({"title": "t", "status": "blocked"}), Mode::Full)
            .unwrap_err();
        assert_eq!(err.message_for("status"), Some("must be one of: todo, in_progress, done"));
    }

    #[test]
    fn replace_keeps_id_and_created_at() {
        let mut t = task("a", None);
        let input = TaskInput { title: "b".into(), description: None, status: TaskStatus::Done, priority: Priority::Low };
        t.replace(input, DateTime::<Utc>::UNIX_EPOCH + Duration::hours(1));
        assert_eq!((t.id, t.created_at, t.title.as_str()), (1, DateTime::<Utc>::UNIX_EPOCH, "b"));
        assert_eq!(t.status, TaskStatus::Done);
    }

    #[test]
    fn text_match_honours_field_switches() {
        let t = task("Write Docs", Some("for the router"));
        assert!(TextMatch::new("docs", true, true).hits(&t));
        assert!(TextMatch::new("ROUTER", true, true).hits(&t));
        assert!(!TextMatch::new("router", true, false).hits(&t));
        assert!(!TextMatch::new("docs", false, true).hits(&t));
        assert!(!TextMatch::new("docs", false, false).hits(&t));
    }
}
