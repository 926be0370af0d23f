use crate::dates::to_utc_date;
use crate::db::DbPool;
use crate::error_handler::ServiceError;
use crate::models::{
    CreateTaskGroupPayload, CreateTaskPayload, NewTask, NewTaskGroup, Task, TaskGroup,
    TaskGroupApiResponse, TaskGroupQueryParams, UpdateTaskChangeset, UpdateTaskGroupChangeset,
    UpdateTaskGroupPayload, UpsertTaskPayload, DEFAULT_TASK_TYPE,
};
use crate::schema::{task_groups, tasks};
use actix_web::{delete, get, post, put, web, HttpResponse};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use serde_json::json;
use std::collections::HashSet;
use uuid::Uuid;

pub const MAX_GROUP_DURATION: i32 = 365;

fn validate_name(name: &str) -> Result<String, ServiceError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ServiceError::BadRequest("Name cannot be empty".to_string()));
    }
    Ok(trimmed.to_string())
}

fn validate_duration(duration: i32) -> Result<i32, ServiceError> {
    if !(1..=MAX_GROUP_DURATION).contains(&duration) {
        return Err(ServiceError::BadRequest(format!(
            "Duration must be between 1 and {} days",
            MAX_GROUP_DURATION
        )));
    }
    Ok(duration)
}

/// Accepts `#rrggbb` only.
fn validate_color(color: &str) -> Result<String, ServiceError> {
    let valid = color.len() == 7
        && color.starts_with('#')
        && color[1..].chars().all(|c| c.is_ascii_hexdigit());
    if !valid {
        return Err(ServiceError::BadRequest(format!(
            "Color '{}' must look like #rrggbb",
            color
        )));
    }
    Ok(color.to_lowercase())
}

fn validate_task_text(text: &str) -> Result<String, ServiceError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ServiceError::BadRequest(
            "Task text cannot be empty".to_string(),
        ));
    }
    Ok(trimmed.to_string())
}

fn task_type_or_default(task_type: Option<&str>) -> String {
    task_type
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(DEFAULT_TASK_TYPE)
        .to_string()
}

fn new_group_from_payload(payload: &CreateTaskGroupPayload) -> Result<NewTaskGroup, ServiceError> {
    Ok(NewTaskGroup {
        name: validate_name(&payload.name)?,
        color: payload.color.as_deref().map(validate_color).transpose()?,
        duration: validate_duration(payload.duration)?,
        start_date: to_utc_date(&payload.start_date)?,
    })
}

fn new_tasks(group_id: Uuid, payload: &[CreateTaskPayload]) -> Result<Vec<NewTask>, ServiceError> {
    payload
        .iter()
        .map(|task| {
            Ok(NewTask {
                group_id,
                text: validate_task_text(&task.text)?,
                task_type: task_type_or_default(task.task_type.as_deref()),
                completed: false,
            })
        })
        .collect()
}

fn changeset_from_payload(
    payload: &UpdateTaskGroupPayload,
    now: DateTime<Utc>,
) -> Result<UpdateTaskGroupChangeset, ServiceError> {
    let color = match &payload.color {
        Some(Some(color)) => Some(Some(validate_color(color)?)),
        Some(None) => Some(None),
        None => None,
    };
    Ok(UpdateTaskGroupChangeset {
        name: payload.name.as_deref().map(validate_name).transpose()?,
        color,
        duration: payload.duration.map(validate_duration).transpose()?,
        start_date: payload.start_date.as_deref().map(to_utc_date).transpose()?,
        updated_at: Some(now),
    })
}

/// What to do with a group's tasks so they match a submitted list.
#[derive(Debug, Default, PartialEq)]
pub struct TaskSyncPlan {
    pub updates: Vec<(Uuid, UpdateTaskChangeset)>,
    pub inserts: Vec<NewTask>,
    pub deletes: Vec<Uuid>,
}

/// Tasks with an id are updated, tasks without one are inserted, and
/// existing tasks left out of `incoming` are deleted.
pub fn plan_task_sync(
    group_id: Uuid,
    existing: &[Uuid],
    incoming: &[UpsertTaskPayload],
    now: DateTime<Utc>,
) -> Result<TaskSyncPlan, ServiceError> {
    let known: HashSet<Uuid> = existing.iter().copied().collect();
    let mut kept = HashSet::new();
    let mut plan = TaskSyncPlan::default();

    for task in incoming {
        let text = validate_task_text(&task.text)?;
        match task.id {
            Some(task_id) => {
                if !known.contains(&task_id) {
                    return Err(ServiceError::BadRequest(format!(
                        "Task {} does not belong to group {}",
                        task_id, group_id
                    )));
                }
                if !kept.insert(task_id) {
                    return Err(ServiceError::BadRequest(format!(
                        "Task {} is listed more than once",
                        task_id
                    )));
                }
                plan.updates.push((
                    task_id,
                    UpdateTaskChangeset {
                        text: Some(text),
                        task_type: task
                            .task_type
                            .as_deref()
                            .map(|t| task_type_or_default(Some(t))),
                        completed: task.completed,
                        updated_at: Some(now),
                    },
                ));
            }
            None => plan.inserts.push(NewTask {
                group_id,
                text,
                task_type: task_type_or_default(task.task_type.as_deref()),
                completed: task.completed.unwrap_or(false),
            }),
        }
    }

    plan.deletes = existing
        .iter()
        .copied()
        .filter(|task_id| !kept.contains(task_id))
        .collect();
    Ok(plan)
}

async fn load_tasks_for(
    conn: &mut AsyncPgConnection,
    group: &TaskGroup,
) -> Result<Vec<Task>, ServiceError> {
    let group_tasks = Task::belonging_to(group)
        .select(Task::as_select())
        .order(tasks::created_at.asc())
        .load::<Task>(conn)
        .await?;
    Ok(group_tasks)
}

#[get("")]
pub async fn list_task_groups_handler(
    pool: web::Data<DbPool>,
    query: web::Query<TaskGroupQueryParams>,
) -> Result<HttpResponse, ServiceError> {
    let active_on = query.date.as_deref().map(to_utc_date).transpose()?;

    let mut conn = pool.get().await?;

    let mut groups_query = task_groups::table
        .select(TaskGroup::as_select())
        .order(task_groups::created_at.desc())
        .into_boxed();
    if let Some(day) = active_on {
        groups_query = groups_query.filter(task_groups::start_date.le(day));
    }
    let mut groups = groups_query
        .load::<TaskGroup>(&mut conn)
        .await
        .map_err(ServiceError::from)?;
    if let Some(day) = active_on {
        groups.retain(|group| group.is_active_on(day));
    }

    let all_tasks = Task::belonging_to(&groups)
        .select(Task::as_select())
        .order(tasks::created_at.asc())
        .load::<Task>(&mut conn)
        .await
        .map_err(ServiceError::from)?;

    let response: Vec<TaskGroupApiResponse> = all_tasks
        .grouped_by(&groups)
        .into_iter()
        .zip(groups)
        .map(|(group_tasks, group)| TaskGroupApiResponse::from((group, group_tasks)))
        .collect();

    Ok(HttpResponse::Ok().json(response))
}

#[post("")]
pub async fn create_task_group_handler(
    pool: web::Data<DbPool>,
    payload: web::Json<CreateTaskGroupPayload>,
) -> Result<HttpResponse, ServiceError> {
    let new_group = new_group_from_payload(&payload)?;
    // Placeholder id; the real one is filled in once the group row exists.
    let pending_tasks = new_tasks(Uuid::nil(), &payload.tasks)?;

    let mut conn = pool.get().await?;

    let response = conn
        .transaction::<_, ServiceError, _>(|conn| {
            async move {
                let group = diesel::insert_into(task_groups::table)
                    .values(&new_group)
                    .returning(TaskGroup::as_returning())
                    .get_result::<TaskGroup>(conn)
                    .await?;

                let rows: Vec<NewTask> = pending_tasks
                    .into_iter()
                    .map(|task| NewTask {
                        group_id: group.id,
                        ..task
                    })
                    .collect();
                let group_tasks = if rows.is_empty() {
                    Vec::new()
                } else {
                    diesel::insert_into(tasks::table)
                        .values(&rows)
                        .returning(Task::as_returning())
                        .get_results::<Task>(conn)
                        .await?
                };

                Ok(TaskGroupApiResponse::from((group, group_tasks)))
            }
            .scope_boxed()
        })
        .await?;

    log::info!(
        "Created task group {} with {} tasks",
        response.id,
        response.tasks.len()
    );
    Ok(HttpResponse::Created().json(response))
}

#[get("/{group_id_path}")]
pub async fn get_task_group_handler(
    pool: web::Data<DbPool>,
    group_id_path: web::Path<Uuid>,
) -> Result<HttpResponse, ServiceError> {
    let group_to_find_id = group_id_path.into_inner();

    let mut conn = pool.get().await?;

    let group_option = task_groups::table
        .find(group_to_find_id)
        .select(TaskGroup::as_select())
        .first::<TaskGroup>(&mut conn)
        .await
        .optional()
        .map_err(ServiceError::from)?;

    match group_option {
        Some(group) => {
            let group_tasks = load_tasks_for(&mut conn, &group).await?;
            Ok(HttpResponse::Ok().json(TaskGroupApiResponse::from((group, group_tasks))))
        }
        None => Err(ServiceError::NotFound(format!(
            "Task group with id {} not found",
            group_to_find_id
        ))),
    }
}

#[put("/{group_id_path}")]
pub async fn update_task_group_handler(
    pool: web::Data<DbPool>,
    group_id_path: web::Path<Uuid>,
    payload: web::Json<UpdateTaskGroupPayload>,
) -> Result<HttpResponse, ServiceError> {
    let group_to_update_id = group_id_path.into_inner();
    let now = Utc::now();
    let group_changes = changeset_from_payload(&payload, now)?;
    let incoming_tasks = payload.into_inner().tasks;

    let mut conn = pool.get().await?;

    let response = conn
        .transaction::<_, ServiceError, _>(|conn| {
            async move {
                let group = diesel::update(task_groups::table.find(group_to_update_id))
                    .set(&group_changes)
                    .returning(TaskGroup::as_returning())
                    .get_result::<TaskGroup>(conn)
                    .await
                    .optional()?
                    .ok_or_else(|| {
                        ServiceError::NotFound(format!(
                            "Task group with id {} not found",
                            group_to_update_id
                        ))
                    })?;

                if let Some(incoming) = incoming_tasks {
                    let existing: Vec<Uuid> = Task::belonging_to(&group)
                        .select(tasks::id)
                        .load::<Uuid>(conn)
                        .await?;
                    let plan = plan_task_sync(group.id, &existing, &incoming, now)?;

                    if !plan.deletes.is_empty() {
                        diesel::delete(tasks::table.filter(tasks::id.eq_any(&plan.deletes)))
                            .execute(conn)
                            .await?;
                    }
                    for (task_id, changes) in &plan.updates {
                        diesel::update(tasks::table.find(*task_id))
                            .set(changes)
                            .execute(conn)
                            .await?;
                    }
                    if !plan.inserts.is_empty() {
                        diesel::insert_into(tasks::table)
                            .values(&plan.inserts)
                            .execute(conn)
                            .await?;
                    }
                    log::debug!(
                        "Task group {}: {} tasks updated, {} added, {} removed",
                        group.id,
                        plan.updates.len(),
                        plan.inserts.len(),
                        plan.deletes.len()
                    );
                }

                let group_tasks = load_tasks_for(conn, &group).await?;
                Ok(TaskGroupApiResponse::from((group, group_tasks)))
            }
            .scope_boxed()
        })
        .await?;

    Ok(HttpResponse::Ok().json(response))
}

#[delete("/{group_id_path}")]
pub async fn delete_task_group_handler(
    pool: web::Data<DbPool>,
    group_id_path: web::Path<Uuid>,
) -> Result<HttpResponse, ServiceError> {
    let group_to_delete_id = group_id_path.into_inner();

    let mut conn = pool.get().await?;

    let num_deleted = diesel::delete(task_groups::table.find(group_to_delete_id))
        .execute(&mut conn)
        .await
        .map_err(ServiceError::from)?;

    if num_deleted > 0 {
        Ok(HttpResponse::Ok().json(json!({
            "status": "success",
            "message": format!("Task group with id {} deleted successfully", group_to_delete_id)
        })))
    } else {
        Err(ServiceError::NotFound(format!(
            "Task group with id {} not found to delete",
            group_to_delete_id
        )))
    }
}
