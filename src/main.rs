use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use portfolio_backend::config::Config;
use portfolio_backend::db;
use portfolio_backend::handlers::{configure_leaderboard, configure_tracker};
use portfolio_backend::leaderboard::ScoreStore;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init();

    if cfg!(debug_assertions) {
        match dotenvy::dotenv() {
            Ok(path) => log::info!(".env file loaded from path: {}", path.display()),
            Err(e) => log::warn!(
                "Could not load .env file: {}, using environment variables.",
                e
            ),
        }
    }

    let config = Config::from_env().expect("Invalid configuration");

    let pool = db::create_pool(&config.database_url, config.db_pool_size)
        .await
        .expect("Failed to create database connection pool.");

    let scores = web::Data::new(
        ScoreStore::open(&config.scores_file)
            .await
            .expect("Failed to open scores file."),
    );

    log::info!("Portfolio backend starting...");
    log::info!("Server will start at http://{}", config.bind_address());

    HttpServer::new(move || {
        // The leaderboard is called from static pages on any host.
        let cors = Cors::default()
            .allow_any_origin()
            .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
            .allow_any_header()
            .max_age(3600);

        App::new()
            .wrap(Logger::default())
            .wrap(cors)
            .app_data(web::Data::new(pool.clone()))
            .app_data(scores.clone())
            .service(
                web::scope("/api")
                    .configure(configure_leaderboard)
                    .configure(configure_tracker),
            )
    })
    .bind(config.bind_address())?
    .run()
    .await
}
