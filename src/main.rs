#[macro_use]
extern crate rocket;

mod api;
mod auth;
mod db;
mod error;
mod executor;
mod models;
mod session;
mod store;
mod telemetry;
#[cfg(test)]
mod test;
mod validation;

use std::sync::Arc;

use api::{
    api_admin_clear_records, api_admin_login, api_admin_results, api_analysis, api_exam_event,
    api_exam_progress, api_exam_save, api_exam_start, api_exam_state, api_exam_submit, api_execute,
    api_languages, api_leaderboard, api_login, api_logout, api_me, api_me_unauthorized,
    api_questions, api_terminal, health,
};
use auth::{forbidden_api, unauthorized_api};
use db::SqliteStore;
use executor::ExecutionAdapter;
use rocket::{Build, Rocket, tokio};
use session::SessionRegistry;
use store::{SharedStore, keys, write_record};
use telemetry::TelemetryFairing;
use telemetry::init_tracing;

use sqlx::SqlitePool;
use tracing::info;

#[launch]
async fn rocket() -> _ {
    match dotenvy::dotenv() {
        Ok(path) => tracing::debug!("Loaded environment from {:?}", path),
        Err(e) => tracing::debug!("Could not load .env file: {}", e),
    }

    init_tracing();

    let database_url = std::env::var("DATABASE_URL").unwrap_or_default();

    let pool = SqlitePool::connect(&database_url)
        .await
        .expect("Failed to connect to SQLite database");

    info!("Running database migrations...");
    match sqlx::migrate!("./migrations").run(&pool).await {
        Ok(_) => info!("Migrations completed successfully"),
        Err(e) => {
            error!("Failed to run migrations: {}", e);
            panic!("Database migration failed: {}", e);
        }
    }

    let store: SharedStore = Arc::new(SqliteStore::new(pool));
    let registry = Arc::new(SessionRegistry::new());

    // Countdown driver: one tick per second for every live session.
    // Sessions that reach zero are auto-submitted and their result
    // records persisted here.
    let tick_registry = registry.clone();
    let tick_store = store.clone();
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(tokio::time::Duration::from_secs(1)).await;

            for record in tick_registry.tick_all().await {
                if let Err(e) =
                    write_record(tick_store.as_ref(), keys::EXAM_RESULTS, &record).await
                {
                    error!("Failed to persist auto-submitted result: {}", e);
                }
            }
        }
    });

    let reap_registry = registry.clone();
    tokio::spawn(async move {
        tokio::time::sleep(tokio::time::Duration::from_secs(5)).await;

        loop {
            let count = reap_registry.reap_terminal().await;
            if count > 0 {
                info!("Reaped {} finished exam sessions", count);
            }

            tokio::time::sleep(tokio::time::Duration::from_secs(3600)).await;
        }
    });

    init_rocket(store, registry, ExecutionAdapter::from_env()).await
}

pub async fn init_rocket(
    store: SharedStore,
    registry: Arc<SessionRegistry>,
    adapter: ExecutionAdapter,
) -> Rocket<Build> {
    info!("Starting exam service");

    rocket::build()
        .manage(store)
        .manage(registry)
        .manage(adapter)
        .mount(
            "/api",
            routes![
                api_login,
                api_admin_login,
                api_me,
                api_me_unauthorized,
                api_logout,
                api_exam_start,
                api_exam_state,
                api_exam_save,
                api_exam_progress,
                api_exam_event,
                api_exam_submit,
                api_execute,
                api_terminal,
                api_analysis,
                api_leaderboard,
                api_admin_results,
                api_admin_clear_records,
                api_questions,
                api_languages,
            ],
        )
        .register("/api", catchers![unauthorized_api, forbidden_api])
        .mount("/api", routes![health])
        .attach(TelemetryFairing)
}
