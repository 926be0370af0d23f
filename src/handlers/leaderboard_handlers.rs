use crate::error_handler::ServiceError;
use crate::leaderboard::{ScoreStore, ScoreSubmission, LEADERBOARD_SIZE};
use actix_web::{delete, get, post, web, HttpResponse};
use serde_json::{json, Value};

#[get("/leaderboard")]
pub async fn get_leaderboard_handler(store: web::Data<ScoreStore>) -> HttpResponse {
    HttpResponse::Ok().json(store.top(LEADERBOARD_SIZE).await)
}

#[post("/scores")]
pub async fn submit_score_handler(
    store: web::Data<ScoreStore>,
    payload: web::Json<Value>,
) -> Result<HttpResponse, ServiceError> {
    let submission = ScoreSubmission::from_json(&payload)?;
    let submitted = store.submit(submission).await?;

    Ok(HttpResponse::Created().json(json!({
        "success": true,
        "entry": submitted.entry,
        "rank": submitted.rank
    })))
}

#[get("/player/{name}")]
pub async fn get_player_handler(
    store: web::Data<ScoreStore>,
    name_path: web::Path<String>,
) -> Result<HttpResponse, ServiceError> {
    let name = name_path.into_inner();
    match store.player(&name).await {
        Some(standing) => Ok(HttpResponse::Ok().json(standing)),
        None => Err(ServiceError::NotFound(format!(
            "No scores recorded for player {}",
            name
        ))),
    }
}

#[delete("/scores")]
pub async fn clear_scores_handler(
    store: web::Data<ScoreStore>,
) -> Result<HttpResponse, ServiceError> {
    store.clear().await?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "All scores cleared"
    })))
}

#[get("/health")]
pub async fn health_check_handler(store: web::Data<ScoreStore>) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "scores": store.count().await
    }))
}
