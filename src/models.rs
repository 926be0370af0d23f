use crate::schema::{task_completions, task_groups, tasks};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

pub const DEFAULT_TASK_TYPE: &str = "daily";

// Absent field -> None, JSON null -> Some(None), value -> Some(Some(v))
fn deserialize_opt_opt_string<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer) {
        Ok(Some(s)) => Ok(Some(Some(s))),
        Ok(None) => Ok(Some(None)),
        Err(e) => Err(e),
    }
}

// --- TaskGroup Model ---
#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, PartialEq)]
#[diesel(table_name = task_groups)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[serde(rename_all = "camelCase")]
pub struct TaskGroup {
    pub id: Uuid,
    pub name: String,
    pub color: Option<String>,
    pub duration: i32,
    pub start_date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskGroup {
    /// Last calendar day the group runs, inclusive.
    pub fn end_date(&self) -> NaiveDate {
        group_end_date(self.start_date, self.duration)
    }

    pub fn is_active_on(&self, day: NaiveDate) -> bool {
        self.start_date <= day && day <= self.end_date()
    }
}

pub fn group_end_date(start_date: NaiveDate, duration: i32) -> NaiveDate {
    start_date + Duration::days(i64::from(duration.max(1)) - 1)
}

#[derive(Insertable, Debug)]
#[diesel(table_name = task_groups)]
pub struct NewTaskGroup {
    pub name: String,
    pub color: Option<String>,
    pub duration: i32,
    pub start_date: NaiveDate,
}

#[derive(AsChangeset, Debug, Default)]
#[diesel(table_name = task_groups)]
pub struct UpdateTaskGroupChangeset {
    pub name: Option<String>,
    pub color: Option<Option<String>>,
    pub duration: Option<i32>,
    pub start_date: Option<NaiveDate>,
    pub updated_at: Option<DateTime<Utc>>,
}

// --- Task Model ---
#[derive(
    Queryable, Selectable, Identifiable, Associations, Serialize, Debug, Clone, PartialEq,
)]
#[diesel(table_name = tasks)]
#[diesel(belongs_to(TaskGroup, foreign_key = group_id))]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: Uuid,
    pub group_id: Uuid,
    pub text: String,
    #[serde(rename = "type")]
    pub task_type: String,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Debug, Clone, PartialEq)]
#[diesel(table_name = tasks)]
pub struct NewTask {
    pub group_id: Uuid,
    pub text: String,
    pub task_type: String,
    pub completed: bool,
}

#[derive(AsChangeset, Debug, Clone, PartialEq)]
#[diesel(table_name = tasks)]
pub struct UpdateTaskChangeset {
    pub text: Option<String>,
    pub task_type: Option<String>,
    pub completed: Option<bool>,
    pub updated_at: Option<DateTime<Utc>>,
}

// --- TaskCompletion Model ---
#[derive(
    Queryable, Selectable, Identifiable, Associations, Serialize, Debug, Clone, PartialEq,
)]
#[diesel(table_name = task_completions)]
#[diesel(belongs_to(Task))]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[serde(rename_all = "camelCase")]
pub struct TaskCompletion {
    pub id: Uuid,
    pub task_id: Uuid,
    pub completed_date: NaiveDate,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = task_completions)]
pub struct NewTaskCompletion {
    pub task_id: Uuid,
    pub completed_date: NaiveDate,
    pub completed: bool,
}

// What the client receives for a group: the row, its derived end date and its tasks.
#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TaskGroupApiResponse {
    pub id: Uuid,
    pub name: String,
    pub color: Option<String>,
    pub duration: i32,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub tasks: Vec<Task>,
}

impl From<(TaskGroup, Vec<Task>)> for TaskGroupApiResponse {
    fn from((group, group_tasks): (TaskGroup, Vec<Task>)) -> Self {
        TaskGroupApiResponse {
            end_date: group.end_date(),
            id: group.id,
            name: group.name,
            color: group.color,
            duration: group.duration,
            start_date: group.start_date,
            created_at: group.created_at,
            updated_at: group.updated_at,
            tasks: group_tasks,
        }
    }
}

// --- PAYLOAD DTOs ---

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskPayload {
    pub text: String,
    #[serde(rename = "type")]
    pub task_type: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskGroupPayload {
    pub name: String,
    pub color: Option<String>,
    pub duration: i32,
    pub start_date: String,
    #[serde(default)]
    pub tasks: Vec<CreateTaskPayload>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct UpsertTaskPayload {
    pub id: Option<Uuid>,
    pub text: String,
    #[serde(rename = "type")]
    pub task_type: Option<String>,
    pub completed: Option<bool>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTaskGroupPayload {
    pub name: Option<String>,
    #[serde(deserialize_with = "deserialize_opt_opt_string", default)]
    pub color: Option<Option<String>>,
    pub duration: Option<i32>,
    pub start_date: Option<String>,
    pub tasks: Option<Vec<UpsertTaskPayload>>,
}

#[derive(Deserialize, Debug)]
pub struct TaskGroupQueryParams {
    pub date: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct CompletionQueryParams {
    pub date: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct UpsertCompletionPayload {
    pub task_id: Uuid,
    #[serde(alias = "completedDate")]
    pub date: String,
    #[serde(default = "default_completed")]
    pub completed: bool,
}

fn default_completed() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn group(start: NaiveDate, duration: i32) -> TaskGroup {
        let stamp = Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap();
        TaskGroup {
            id: Uuid::new_v4(),
            name: "Morning routine".into(),
            color: Some("#22aa88".into()),
            duration,
            start_date: start,
            created_at: stamp,
            updated_at: stamp,
        }
    }

    #[test]
    fn end_date_counts_start_day() {
        let start = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        assert_eq!(group(start, 1).end_date(), start);
        assert_eq!(
            group(start, 30).end_date(),
            NaiveDate::from_ymd_opt(2025, 3, 30).unwrap()
        );
    }

    #[test]
    fn active_window_is_inclusive() {
        let start = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        let g = group(start, 7);
        assert!(!g.is_active_on(NaiveDate::from_ymd_opt(2025, 2, 28).unwrap()));
        assert!(g.is_active_on(start));
        assert!(g.is_active_on(NaiveDate::from_ymd_opt(2025, 3, 7).unwrap()));
        assert!(!g.is_active_on(NaiveDate::from_ymd_opt(2025, 3, 8).unwrap()));
    }

    #[test]
    fn api_response_uses_camel_case_and_type() {
        let start = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        let g = group(start, 3);
        let task = Task {
            id: Uuid::new_v4(),
            group_id: g.id,
            text: "Stretch".into(),
            task_type: DEFAULT_TASK_TYPE.into(),
            completed: false,
            created_at: g.created_at,
            updated_at: g.updated_at,
        };
        let body = serde_json::to_value(TaskGroupApiResponse::from((g, vec![task]))).unwrap();
        assert_eq!(body["startDate"], "2025-03-01");
        assert_eq!(body["endDate"], "2025-03-03");
        assert_eq!(body["tasks"][0]["type"], "daily");
        assert!(body["tasks"][0]["groupId"].is_string());
    }

    #[test]
    fn update_payload_distinguishes_null_color_from_absent() {
        let cleared: UpdateTaskGroupPayload = serde_json::from_str(r#"{"color": null}"#).unwrap();
        assert_eq!(cleared.color, Some(None));

        let untouched: UpdateTaskGroupPayload = serde_json::from_str(r#"{"name": "x"}"#).unwrap();
        assert_eq!(untouched.color, None);
    }

    #[test]
    fn completion_payload_accepts_completed_date_alias() {
        let payload: UpsertCompletionPayload = serde_json::from_str(
            r#"{"taskId": "6f1c1f9e-9a7b-4c55-8d1e-0b1d2b6c7e11", "completedDate": "2025-03-04"}"#,
        )
        .unwrap();
        assert_eq!(payload.date, "2025-03-04");
        assert!(payload.completed);
    }
}
