#[cfg(test)]
pub mod test_utils {
    use std::sync::{Arc, Once};

    use rocket::http::ContentType;
    use rocket::local::asynchronous::Client;
    use serde_json::json;
    use sqlx::SqlitePool;
    use tracing::log::LevelFilter;

    use crate::api::LoginResponse;
    use crate::db::SqliteStore;
    use crate::executor::ExecutionAdapter;
    use crate::init_rocket;
    use crate::session::SessionRegistry;
    use crate::store::{MemoryStore, SharedStore};

    static INIT: Once = Once::new();

    fn init_logging() {
        INIT.call_once(|| {
            let _ = env_logger::builder()
                .filter_level(LevelFilter::Debug)
                .is_test(true)
                .try_init();
        });
    }

    pub fn memory_store() -> SharedStore {
        init_logging();
        Arc::new(MemoryStore::new())
    }

    /// Record store backed by an in-memory SQLite database with the real
    /// migrations applied.
    pub async fn sqlite_store() -> SharedStore {
        init_logging();

        let pool = SqlitePool::connect("sqlite::memory:")
            .await
            .expect("Failed to create in-memory database");

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("Failed to run migrations");

        Arc::new(SqliteStore::new(pool))
    }

    /// Builds a full application instance against the given store, with a
    /// disconnected execution adapter so no network calls ever leave the
    /// test. The countdown task is not running: tests drive ticks through
    /// the returned registry.
    pub async fn setup_test_client(store: SharedStore) -> (Client, Arc<SessionRegistry>) {
        let registry = Arc::new(SessionRegistry::new());
        let rocket = init_rocket(store, registry.clone(), ExecutionAdapter::disconnected()).await;

        let client = Client::tracked(rocket)
            .await
            .expect("valid rocket instance");

        (client, registry)
    }

    /// Logs a student in through the API; the tracked client keeps the
    /// private cookie for subsequent requests.
    pub async fn login_test_student(client: &Client, name: &str, roll: &str) {
        let response = client
            .post("/api/login")
            .header(ContentType::JSON)
            .body(json!({ "name": name, "roll": roll }).to_string())
            .dispatch()
            .await;

        let body = response.into_string().await.expect("login response body");
        let login: LoginResponse = serde_json::from_str(&body).expect("login response json");
        assert!(login.success, "Test login failed for {roll}");
    }

    pub async fn login_test_admin(client: &Client, roll: &str) {
        let response = client
            .post("/api/admin/login")
            .header(ContentType::JSON)
            .body(json!({ "roll": roll }).to_string())
            .dispatch()
            .await;

        let body = response.into_string().await.expect("admin login body");
        let login: LoginResponse = serde_json::from_str(&body).expect("admin login json");
        assert!(login.success, "Test admin login failed for {roll}");
    }
}
