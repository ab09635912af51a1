use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{lenient, Record};

/// Task workflow state. Statuses this client does not know are kept
/// verbatim so they survive a round trip to disk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Value", into = "String")]
pub enum TaskStatus {
    #[default]
    Todo,
    InProgress,
    Done,
    Other(String),
}

impl TaskStatus {
    pub fn as_str(&self) -> &str {
        match self {
            TaskStatus::Todo => "TODO",
            TaskStatus::InProgress => "IN_PROGRESS",
            TaskStatus::Done => "DONE",
            TaskStatus::Other(raw) => raw,
        }
    }
}

impl From<Value> for TaskStatus {
    fn from(value: Value) -> Self {
        match value {
            Value::String(s) => match s.as_str() {
                "TODO" => TaskStatus::Todo,
                "IN_PROGRESS" => TaskStatus::InProgress,
                "DONE" => TaskStatus::Done,
                _ => TaskStatus::Other(s),
            },
            _ => TaskStatus::default(),
        }
    }
}

impl From<TaskStatus> for String {
    fn from(status: TaskStatus) -> Self {
        match status {
            TaskStatus::Other(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Todo => write!(f, "To do"),
            TaskStatus::InProgress => write!(f, "In progress"),
            TaskStatus::Done => write!(f, "Done"),
            TaskStatus::Other(raw) => write!(f, "{}", raw),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(deserialize_with = "lenient::id")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub name: String,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(
        default,
        deserialize_with = "lenient::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub description: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub due_date: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub assignee_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Task {
    pub fn is_done(&self) -> bool {
        self.status == TaskStatus::Done
    }
}

impl Record for Task {
    fn id(&self) -> &str {
        &self.id
    }
}
