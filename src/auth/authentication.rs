use rocket::Request;
use rocket::http::Status;
use rocket::request::{FromRequest, Outcome};
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use serde_json::{Value, json};

use crate::db::load_identity;
use crate::error::AppError;
use crate::models::Identity;
use crate::store::{SharedStore, keys};

use super::Role;

/// Default admin access code for local runs; overridden by setting
/// `ADMIN_CODE_HASH` to a bcrypt hash.
const DEFAULT_ADMIN_CODE: &str = "ADMIN123";

/// Identity guard: the exam, analysis and leaderboard routes require the
/// identity fields to be present in the record store and to match the
/// private cookie set at login. This is the only enforced precondition.
#[rocket::async_trait]
impl<'r> FromRequest<'r> for Identity {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let auth_span = tracing::info_span!("identity_guard");
        let _guard = auth_span.enter();

        let cookies = request.cookies();

        let roll = cookies
            .get_private("student_roll")
            .map(|c| c.value().to_string());

        if let Some(roll) = roll {
            let store = match request.rocket().state::<SharedStore>() {
                Some(store) => store,
                _ => {
                    tracing::error!("Record store not found in managed state");
                    return Outcome::Error((Status::InternalServerError, ()));
                }
            };

            match load_identity(store.as_ref()).await {
                Ok(Some(identity)) if identity.roll == roll => {
                    tracing::info!(roll = %identity.roll, "Student authenticated");
                    return Outcome::Success(identity);
                }
                Ok(_) => {
                    tracing::warn!(roll = %roll, "Cookie does not match stored identity");
                    return Outcome::Forward(Status::Unauthorized);
                }
                Err(err) => {
                    tracing::error!(error = ?err, "Failed to load stored identity");
                    return Outcome::Error((Status::InternalServerError, ()));
                }
            }
        }

        Outcome::Error((Status::Unauthorized, ()))
    }
}

/// Admin guard: gated on the stored admin roll flag matching the private
/// cookie. Demo-grade access control, not a real trust boundary.
pub struct Admin {
    pub roll: String,
    pub role: Role,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Admin {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let cookies = request.cookies();

        let roll = cookies
            .get_private("admin_roll")
            .map(|c| c.value().to_string());

        if let Some(roll) = roll {
            let store = match request.rocket().state::<SharedStore>() {
                Some(store) => store,
                _ => {
                    tracing::error!("Record store not found in managed state");
                    return Outcome::Error((Status::InternalServerError, ()));
                }
            };

            match store.read_raw(keys::ADMIN_ROLL).await {
                Ok(Some(stored)) if stored == roll => {
                    tracing::info!(roll = %roll, "Admin authenticated");
                    return Outcome::Success(Admin {
                        roll,
                        role: Role::Admin,
                    });
                }
                Ok(_) => {
                    tracing::warn!(roll = %roll, "Admin cookie does not match stored flag");
                    return Outcome::Forward(Status::Unauthorized);
                }
                Err(err) => {
                    tracing::error!(error = ?err, "Failed to read admin flag");
                    return Outcome::Error((Status::InternalServerError, ()));
                }
            }
        }

        Outcome::Error((Status::Unauthorized, ()))
    }
}

/// Checks a submitted admin access code. When `ADMIN_CODE_HASH` is set it
/// must be a bcrypt hash; otherwise the fixed demo code is accepted.
pub fn verify_admin_code(code: &str) -> Result<bool, AppError> {
    match std::env::var("ADMIN_CODE_HASH") {
        Ok(hash) => Ok(bcrypt::verify(code, &hash)?),
        Err(_) => Ok(code == DEFAULT_ADMIN_CODE),
    }
}

#[catch(401)]
pub fn unauthorized_api(_req: &Request) -> Custom<Json<Value>> {
    let error_json = json!({
        "error": "Unauthorized",
        "message": "Authentication required",
        "redirect_url": "/login"
    });

    Custom(Status::Unauthorized, Json(error_json))
}

#[catch(403)]
pub fn forbidden_api(_req: &Request) -> Custom<Json<Value>> {
    let error_json = json!({
        "error": "Forbidden",
        "message": "You don't have permission to perform this action"
    });

    Custom(Status::Forbidden, Json(error_json))
}
