use crate::dates::{days_between, to_utc_date};
use crate::db::DbPool;
use crate::error_handler::ServiceError;
use crate::models::{
    CompletionQueryParams, NewTaskCompletion, TaskCompletion, UpsertCompletionPayload,
};
use crate::schema::{task_completions, tasks};
use actix_web::{get, post, web, HttpResponse};
use chrono::NaiveDate;
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, RunQueryDsl};
use uuid::Uuid;

/// Inclusive date range requested by `?date=` or `?startDate=&endDate=`.
pub fn completion_range(
    params: &CompletionQueryParams,
) -> Result<(NaiveDate, NaiveDate), ServiceError> {
    match (&params.date, &params.start_date, &params.end_date) {
        (Some(date), None, None) => {
            let day = to_utc_date(date)?;
            Ok((day, day))
        }
        (None, Some(start), Some(end)) => {
            let start = to_utc_date(start)?;
            let end = to_utc_date(end)?;
            if days_between(start, end) < 0 {
                return Err(ServiceError::BadRequest(format!(
                    "startDate {} is after endDate {}",
                    start, end
                )));
            }
            Ok((start, end))
        }
        _ => Err(ServiceError::BadRequest(
            "Provide either date or both startDate and endDate".to_string(),
        )),
    }
}

#[get("")]
pub async fn list_task_completions_handler(
    pool: web::Data<DbPool>,
    query: web::Query<CompletionQueryParams>,
) -> Result<HttpResponse, ServiceError> {
    let (start, end) = completion_range(&query)?;

    let mut conn = pool.get().await?;

    let completions = task_completions::table
        .filter(task_completions::completed_date.between(start, end))
        .select(TaskCompletion::as_select())
        .order((
            task_completions::completed_date.asc(),
            task_completions::created_at.asc(),
        ))
        .load::<TaskCompletion>(&mut conn)
        .await
        .map_err(ServiceError::from)?;

    Ok(HttpResponse::Ok().json(completions))
}

type LockTask =
    diesel::dsl::ForUpdate<diesel::dsl::Select<diesel::dsl::Find<tasks::table, Uuid>, tasks::id>>;

// Concurrent upserts for one task queue on the task row, so the second
// sees the first one's insert instead of adding a duplicate day.
fn lock_task(task_id: Uuid) -> LockTask {
    tasks::table.find(task_id).select(tasks::id).for_update()
}

/// One record per task and day: an existing one is updated in place.
#[post("")]
pub async fn upsert_task_completion_handler(
    pool: web::Data<DbPool>,
    payload: web::Json<UpsertCompletionPayload>,
) -> Result<HttpResponse, ServiceError> {
    let UpsertCompletionPayload {
        task_id,
        date,
        completed,
    } = payload.into_inner();
    let day = to_utc_date(&date)?;

    let mut conn = pool.get().await?;

    let (completion, created) = conn
        .transaction::<_, ServiceError, _>(|conn| {
            async move {
                let task_exists = lock_task(task_id)
                    .first::<Uuid>(conn)
                    .await
                    .optional()?
                    .is_some();
                if !task_exists {
                    return Err(ServiceError::NotFound(format!(
                        "Task with id {} not found",
                        task_id
                    )));
                }

                let existing = task_completions::table
                    .filter(task_completions::task_id.eq(task_id))
                    .filter(task_completions::completed_date.eq(day))
                    .select(TaskCompletion::as_select())
                    .first::<TaskCompletion>(conn)
                    .await
                    .optional()?;

                match existing {
                    Some(record) => {
                        let updated = diesel::update(task_completions::table.find(record.id))
                            .set(task_completions::completed.eq(completed))
                            .returning(TaskCompletion::as_returning())
                            .get_result::<TaskCompletion>(conn)
                            .await?;
                        Ok((updated, false))
                    }
                    None => {
                        let inserted = diesel::insert_into(task_completions::table)
                            .values(&NewTaskCompletion {
                                task_id,
                                completed_date: day,
                                completed,
                            })
                            .returning(TaskCompletion::as_returning())
                            .get_result::<TaskCompletion>(conn)
                            .await?;
                        Ok((inserted, true))
                    }
                }
            }
            .scope_boxed()
        })
        .await?;

    log::debug!(
        "Task {} on {} marked completed={}",
        completion.task_id,
        completion.completed_date,
        completion.completed
    );
    if created {
        Ok(HttpResponse::Created().json(completion))
    } else {
        Ok(HttpResponse::Ok().json(completion))
    }
}
