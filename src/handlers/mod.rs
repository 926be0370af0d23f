pub mod leaderboard_handlers;
pub mod task_completion_handlers;
pub mod task_group_handlers;

use crate::error_handler::ServiceError;
use actix_web::web;

// Extractor failures answer with the same JSON error body as the handlers.
fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .error_handler(|err, _req| ServiceError::BadRequest(err.to_string()).into())
}

fn query_config() -> web::QueryConfig {
    web::QueryConfig::default()
        .error_handler(|err, _req| ServiceError::BadRequest(err.to_string()).into())
}

fn path_config() -> web::PathConfig {
    web::PathConfig::default()
        .error_handler(|err, _req| ServiceError::BadRequest(err.to_string()).into())
}

/// Leaderboard routes; expects `web::Data<ScoreStore>`.
pub fn configure_leaderboard(cfg: &mut web::ServiceConfig) {
    cfg.app_data(json_config())
        .app_data(path_config())
        .service(leaderboard_handlers::get_leaderboard_handler)
        .service(leaderboard_handlers::submit_score_handler)
        .service(leaderboard_handlers::clear_scores_handler)
        .service(leaderboard_handlers::get_player_handler)
        .service(leaderboard_handlers::health_check_handler);
}

/// Daily Tracker routes; expects `web::Data<DbPool>`.
pub fn configure_tracker(cfg: &mut web::ServiceConfig) {
    cfg.app_data(json_config())
        .app_data(query_config())
        .app_data(path_config())
        .service(
            web::scope("/task-groups")
                .service(task_group_handlers::list_task_groups_handler)
                .service(task_group_handlers::create_task_group_handler)
                .service(task_group_handlers::get_task_group_handler)
                .service(task_group_handlers::update_task_group_handler)
                .service(task_group_handlers::delete_task_group_handler),
        )
        .service(
            web::scope("/task-completions")
                .service(task_completion_handlers::list_task_completions_handler)
                .service(task_completion_handlers::upsert_task_completion_handler),
        );
}
