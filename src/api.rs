use chrono::{Duration, Utc};
use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;
use rocket::State;
use rocket::http::{Cookie, CookieJar, SameSite, Status};
use rocket::response::status::Custom;
use rocket::serde::{Deserialize, Serialize, json::Json};
use std::sync::Arc;
use validator::Validate;

use crate::auth::{Admin, Permission, verify_admin_code};
use crate::db::{clear_identity, load_all_results, load_progress, save_identity, save_progress};
use crate::error::AppError;
use crate::executor::{
    ExecutionAdapter, ExecutionRequest, SourceFile, TerminalReply, output_matches_expected,
    terminal_command,
};
use crate::models::{
    EXAM_QUESTIONS, Identity, Language, LeaderboardEntry, Question, ResultRecord, SessionProgress,
};
use crate::session::{
    DEFAULT_EXAM_DURATION_SECS, ProctorEvent, SessionRegistry, SessionSnapshot,
};
use crate::store::{Loaded, SharedStore, keys, load_record, write_record};
use crate::validation::{AppErrorExt, JsonValidateExt, ValidationResponse};

static ROLL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z]{2,6}[0-9]{1,4}$").expect("roll pattern is valid"));

fn exam_duration_secs() -> u32 {
    std::env::var("EXAM_DURATION_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_EXAM_DURATION_SECS)
}

fn identity_cookie(name: &'static str, value: String) -> Cookie<'static> {
    Cookie::build((name, value))
        .same_site(SameSite::Lax)
        .http_only(true)
        .max_age(rocket::time::Duration::hours(2))
        .build()
}

#[derive(Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "Name is required"))]
    name: String,
    #[validate(regex(path = *ROLL_PATTERN, message = "Roll number must look like CS001"))]
    roll: String,
}

#[derive(Serialize, Deserialize)]
pub struct LoginResponse {
    pub success: bool,
    pub identity: Option<Identity>,
    pub error: Option<String>,
    pub redirect_url: Option<String>,
}

#[post("/login", data = "<login>")]
pub async fn api_login(
    login: Json<LoginRequest>,
    cookies: &CookieJar<'_>,
    store: &State<SharedStore>,
) -> Result<Json<LoginResponse>, Custom<Json<ValidationResponse>>> {
    let validated = login.validate_custom()?;

    let identity = Identity {
        display_name: validated.name,
        roll: validated.roll,
    };

    save_identity(store.inner().as_ref(), &identity)
        .await
        .validate_custom()?;

    cookies.add_private(identity_cookie("student_roll", identity.roll.clone()));

    Ok(Json(LoginResponse {
        success: true,
        identity: Some(identity),
        error: None,
        redirect_url: Some("/exam".to_string()),
    }))
}

#[derive(Deserialize, Validate)]
pub struct AdminLoginRequest {
    #[validate(length(min = 1, message = "Admin roll number is required"))]
    roll: String,
}

#[post("/admin/login", data = "<login>")]
pub async fn api_admin_login(
    login: Json<AdminLoginRequest>,
    cookies: &CookieJar<'_>,
    store: &State<SharedStore>,
) -> Result<Json<LoginResponse>, Custom<Json<ValidationResponse>>> {
    let validated = login.validate_custom()?;

    if !verify_admin_code(&validated.roll).validate_custom()? {
        return Ok(Json(LoginResponse {
            success: false,
            identity: None,
            error: Some("Invalid admin roll number".to_string()),
            redirect_url: None,
        }));
    }

    store
        .write_raw(keys::ADMIN_ROLL, &validated.roll)
        .await
        .validate_custom()?;

    cookies.add_private(identity_cookie("admin_roll", validated.roll.clone()));

    Ok(Json(LoginResponse {
        success: true,
        identity: None,
        error: None,
        redirect_url: Some("/admin-dashboard".to_string()),
    }))
}

#[get("/me")]
pub async fn api_me(identity: Identity) -> Json<Identity> {
    Json(identity)
}

#[get("/me", rank = 2)]
pub async fn api_me_unauthorized() -> Status {
    Status::Unauthorized
}

#[post("/logout")]
pub async fn api_logout(
    cookies: &CookieJar<'_>,
    store: &State<SharedStore>,
) -> Result<Json<LoginResponse>, AppError> {
    clear_identity(store.inner().as_ref()).await?;

    cookies.remove_private(Cookie::build("student_roll"));
    cookies.remove_private(Cookie::build("admin_roll"));

    Ok(Json(LoginResponse {
        success: true,
        identity: None,
        error: None,
        redirect_url: Some("/".to_string()),
    }))
}

#[derive(Serialize, Deserialize)]
pub struct ExamStartResponse {
    pub phase: String,
    pub duration_secs: u32,
    pub questions: Vec<QuestionResponse>,
}

#[derive(Serialize, Deserialize)]
pub struct QuestionResponse {
    pub id: u32,
    pub title: String,
    pub description: String,
    pub difficulty: String,
    pub points: u32,
}

impl From<&Question> for QuestionResponse {
    fn from(q: &Question) -> Self {
        Self {
            id: q.id,
            title: q.title.to_string(),
            description: q.description.to_string(),
            difficulty: q.difficulty.to_string(),
            points: q.points,
        }
    }
}

#[post("/exam/start")]
pub async fn api_exam_start(
    identity: Identity,
    registry: &State<Arc<SessionRegistry>>,
) -> Result<Json<ExamStartResponse>, AppError> {
    let duration = exam_duration_secs();
    let snapshot = registry.start_session(identity, duration).await?;

    Ok(Json(ExamStartResponse {
        phase: format!("{:?}", snapshot.phase).to_lowercase(),
        duration_secs: duration,
        questions: EXAM_QUESTIONS.iter().map(QuestionResponse::from).collect(),
    }))
}

#[get("/exam/state")]
pub async fn api_exam_state(
    identity: Identity,
    registry: &State<Arc<SessionRegistry>>,
) -> Result<Json<SessionSnapshot>, AppError> {
    registry
        .snapshot(&identity.roll)
        .await
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("No exam session for roll {}", identity.roll)))
}

#[post("/exam/save", data = "<progress>")]
pub async fn api_exam_save(
    progress: Json<SessionProgress>,
    identity: Identity,
    store: &State<SharedStore>,
) -> Result<Status, AppError> {
    save_progress(store.inner().as_ref(), &identity.roll, &progress).await?;

    Ok(Status::Ok)
}

#[get("/exam/progress")]
pub async fn api_exam_progress(
    identity: Identity,
    store: &State<SharedStore>,
) -> Result<Json<SessionProgress>, AppError> {
    let key = keys::exam_progress(&identity.roll);
    let progress = load_progress(store.inner().as_ref(), &identity.roll)
        .await?
        .require(&key)?;

    Ok(Json(progress))
}

#[derive(Deserialize)]
pub struct ProctorEventRequest {
    pub event: ProctorEvent,
}

#[derive(Serialize, Deserialize)]
pub struct ProctorEventResponse {
    pub advisory: String,
    pub warnings: u32,
}

#[post("/exam/event", data = "<request>")]
pub async fn api_exam_event(
    request: Json<ProctorEventRequest>,
    identity: Identity,
    registry: &State<Arc<SessionRegistry>>,
) -> Result<Json<ProctorEventResponse>, AppError> {
    let (advisory, warnings) = registry.record_event(&identity.roll, request.event).await?;

    Ok(Json(ProctorEventResponse {
        advisory: advisory.to_string(),
        warnings,
    }))
}

#[derive(Serialize, Deserialize)]
pub struct SubmitResponse {
    pub result: ResultRecord,
    pub already_submitted: bool,
    pub redirect_url: String,
}

#[post("/exam/submit")]
pub async fn api_exam_submit(
    identity: Identity,
    registry: &State<Arc<SessionRegistry>>,
    store: &State<SharedStore>,
) -> Result<Json<SubmitResponse>, AppError> {
    match registry.submit(&identity.roll).await? {
        Some(record) => {
            write_record(store.inner().as_ref(), keys::EXAM_RESULTS, &record).await?;

            Ok(Json(SubmitResponse {
                result: record,
                already_submitted: false,
                redirect_url: "/analysis".to_string(),
            }))
        }
        // The countdown beat the request to it; the stored record is the
        // one and only result for this attempt.
        None => {
            let record: ResultRecord = load_record(store.inner().as_ref(), keys::EXAM_RESULTS)
                .await?
                .require(keys::EXAM_RESULTS)?;

            Ok(Json(SubmitResponse {
                result: record,
                already_submitted: true,
                redirect_url: "/analysis".to_string(),
            }))
        }
    }
}

#[derive(Deserialize)]
pub struct ExecuteRequest {
    pub language: Language,
    #[serde(default)]
    pub stdin: String,
    pub source: SourceFile,
    pub expected_output: Option<String>,
}

#[derive(Serialize, Deserialize)]
pub struct ExecuteResponse {
    pub output: String,
    pub fallback: bool,
    pub expected_matched: Option<bool>,
}

#[post("/execute", data = "<request>")]
pub async fn api_execute(
    request: Json<ExecuteRequest>,
    adapter: &State<ExecutionAdapter>,
) -> Json<ExecuteResponse> {
    let request = request.into_inner();
    let outcome = adapter
        .execute(&ExecutionRequest {
            language: request.language,
            stdin: request.stdin,
            source: request.source,
        })
        .await;

    let expected_matched = request
        .expected_output
        .as_deref()
        .map(|expected| output_matches_expected(&outcome.output, expected));

    Json(ExecuteResponse {
        output: outcome.output,
        fallback: outcome.fallback,
        expected_matched,
    })
}

#[derive(Deserialize)]
pub struct TerminalRequest {
    pub input: String,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub active_file: String,
}

#[post("/terminal", data = "<request>")]
pub async fn api_terminal(request: Json<TerminalRequest>) -> Json<TerminalReply> {
    Json(terminal_command(
        &request.input,
        &request.files,
        &request.active_file,
    ))
}

#[derive(Serialize, Deserialize)]
pub struct AnalysisResponse {
    pub result: ResultRecord,
    pub rank: u32,
    pub performance_level: String,
}

#[get("/analysis")]
pub async fn api_analysis(
    identity: Identity,
    store: &State<SharedStore>,
) -> Result<Json<AnalysisResponse>, AppError> {
    let record: ResultRecord = match load_record(store.inner().as_ref(), keys::EXAM_RESULTS).await?
    {
        Loaded::Valid(record) => record,
        Loaded::Missing => {
            return Err(AppError::Authentication(format!(
                "No exam results found for roll {}",
                identity.roll
            )));
        }
        Loaded::Corrupt { reason } => {
            return Err(AppError::CorruptRecord {
                key: keys::EXAM_RESULTS.to_string(),
                reason,
            });
        }
    };

    let rank = record.rank();
    let performance_level = record.performance_level().to_string();

    Ok(Json(AnalysisResponse {
        result: record,
        rank,
        performance_level,
    }))
}

#[derive(Serialize, Deserialize)]
pub struct LeaderboardResponse {
    pub board: Vec<LeaderboardEntry>,
    pub current_user: Option<LeaderboardEntry>,
}

const BOARD_NAMES: [(&str, &str); 12] = [
    ("Alex Johnson", "CS001"),
    ("Sarah Chen", "CS002"),
    ("Michael Brown", "CS003"),
    ("Emily Davis", "CS004"),
    ("David Wilson", "CS005"),
    ("Lisa Wang", "CS006"),
    ("James Miller", "CS007"),
    ("Anna Rodriguez", "CS008"),
    ("Kevin Lee", "CS009"),
    ("Maya Patel", "CS010"),
    ("Ryan Taylor", "CS011"),
    ("Zoe Kim", "CS012"),
];

/// Synthetic board of fixed names with random scores, re-ranked by score.
fn generate_board() -> Vec<LeaderboardEntry> {
    let mut rng = rand::rng();
    let now = Utc::now();

    let mut entries: Vec<LeaderboardEntry> = BOARD_NAMES
        .iter()
        .map(|(name, roll)| LeaderboardEntry {
            rank: 0,
            name: name.to_string(),
            roll: roll.to_string(),
            score: rng.random_range(70u8..100),
            speed: rng.random_range(60u8..100),
            efficiency: rng.random_range(65u8..100),
            completed_at: now - Duration::seconds(rng.random_range(0i64..86_400)),
        })
        .collect();

    entries.sort_by(|a, b| b.score.cmp(&a.score));
    for (index, entry) in entries.iter_mut().enumerate() {
        entry.rank = index as u32 + 1;
    }

    entries
}

#[get("/leaderboard")]
pub async fn api_leaderboard(
    store: &State<SharedStore>,
) -> Result<Json<LeaderboardResponse>, AppError> {
    let board = generate_board();

    let current_user = load_record::<ResultRecord>(store.inner().as_ref(), keys::EXAM_RESULTS)
        .await?
        .into_option()
        .map(|record| LeaderboardEntry {
            rank: record.rank(),
            name: record.display_name.clone(),
            roll: record.roll.clone(),
            score: record.score,
            speed: record.speed,
            efficiency: record.efficiency,
            completed_at: record.completed_at,
        });

    Ok(Json(LeaderboardResponse {
        board,
        current_user,
    }))
}

#[get("/admin/results")]
pub async fn api_admin_results(
    admin: Admin,
    store: &State<SharedStore>,
) -> Result<Json<Vec<ResultRecord>>, Status> {
    admin.role.require_permission(Permission::ViewAllResults)?;

    let results = load_all_results(store.inner().as_ref()).await?;

    Ok(Json(results))
}

#[delete("/admin/records")]
pub async fn api_admin_clear_records(
    admin: Admin,
    store: &State<SharedStore>,
) -> Result<Status, Status> {
    admin.role.require_permission(Permission::ClearStoredRecords)?;

    let store = store.inner().as_ref();
    store.delete(keys::EXAM_RESULTS).await?;
    for key in store.keys_with_prefix(keys::EXAM_PROGRESS_PREFIX).await? {
        store.delete(&key).await?;
    }

    Ok(Status::Ok)
}

#[get("/questions")]
pub async fn api_questions() -> Json<Vec<QuestionResponse>> {
    Json(EXAM_QUESTIONS.iter().map(QuestionResponse::from).collect())
}

#[derive(Serialize, Deserialize)]
pub struct LanguageResponse {
    pub value: String,
    pub label: String,
    pub extension: String,
    pub template: String,
}

#[get("/languages")]
pub async fn api_languages() -> Json<Vec<LanguageResponse>> {
    Json(
        Language::ALL
            .iter()
            .map(|lang| LanguageResponse {
                value: lang.tag().to_string(),
                label: lang.label().to_string(),
                extension: lang.file_extension().to_string(),
                template: lang.template().to_string(),
            })
            .collect(),
    )
}

#[get("/health")]
pub fn health() -> &'static str {
    "OK"
}
