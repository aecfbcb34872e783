// src/web/mod.rs

pub mod handlers;
pub mod types;

pub use handlers::*;
pub use types::*;

use crate::auth::{AdminUser, AuthConfig, AuthenticatedUser, OptionalAuth};
use crate::config::ServiceConfig;
use crate::database::{DatabaseConfig, UserDirectory};
use crate::pipeline::{
    GeminiBackend, NormalizationClient, PipelineStation, WebhookDispatcher,
};
use anyhow::Result;
use rocket::fairing::{Fairing, Info, Kind};
use rocket::http::{Header, Status};
use rocket::serde::json::Json;
use rocket::{catchers, get, options, post, routes, Request, Response, State};
use std::path::PathBuf;
use tracing::{error, info};

// CORS Fairing
pub struct Cors;

#[rocket::async_trait]
impl Fairing for Cors {
    fn info(&self) -> Info {
        Info {
            name: "Add CORS headers to responses",
            kind: Kind::Response,
        }
    }

    async fn on_response<'r>(&self, _request: &'r Request<'_>, response: &mut Response<'r>) {
        response.set_header(Header::new("Access-Control-Allow-Origin", "*"));
        response.set_header(Header::new(
            "Access-Control-Allow-Methods",
            "POST, GET, PATCH, OPTIONS",
        ));
        response.set_header(Header::new("Access-Control-Allow-Headers", "*"));
        response.set_header(Header::new("Access-Control-Allow-Credentials", "true"));
    }
}

// API routes

#[post("/auth/signup", data = "<request>")]
pub async fn signup(
    request: Json<SignUpRequest>,
    auth_config: &State<AuthConfig>,
    db_config: &State<DatabaseConfig>,
) -> Result<Json<DataResponse<SessionData>>, Json<StandardErrorResponse>> {
    handlers::signup_handler(request, auth_config, db_config).await
}

#[post("/auth/signin", data = "<request>")]
pub async fn signin(
    request: Json<SignInRequest>,
    auth_config: &State<AuthConfig>,
    db_config: &State<DatabaseConfig>,
) -> Result<Json<DataResponse<SessionData>>, Json<StandardErrorResponse>> {
    handlers::signin_handler(request, auth_config, db_config).await
}

#[post("/auth/signout")]
pub async fn signout(
    auth: AuthenticatedUser,
    db_config: &State<DatabaseConfig>,
) -> Result<Json<ActionResponse>, Json<StandardErrorResponse>> {
    handlers::signout_handler(auth, db_config).await
}

#[get("/me")]
pub async fn get_current_user(auth: AuthenticatedUser) -> Json<DataResponse<UserInfo>> {
    handlers::current_user_handler(auth).await
}

#[post("/process", data = "<request>")]
pub async fn process_profile(
    request: Json<ProcessRequest>,
    auth: AuthenticatedUser,
    station: &State<PipelineStation>,
    db_config: &State<DatabaseConfig>,
) -> Result<Json<DataResponse<crate::pipeline::PipelineReport>>, Json<StandardErrorResponse>> {
    handlers::process_handler(request, auth, station, db_config).await
}

#[get("/status")]
pub async fn pipeline_status(
    station: &State<PipelineStation>,
) -> Json<DataResponse<crate::pipeline::StationStatus>> {
    handlers::status_handler(station).await
}

#[post("/export/csv", data = "<request>")]
pub async fn export_csv(
    request: Json<ExportRequest>,
    auth: AuthenticatedUser,
) -> Result<CsvResponse, Json<StandardErrorResponse>> {
    handlers::export_csv_handler(request, auth).await
}

#[get("/admin/users")]
pub async fn admin_users(
    admin: AdminUser,
    db_config: &State<DatabaseConfig>,
) -> Result<Json<DataResponse<AdminDirectoryData>>, Json<StandardErrorResponse>> {
    handlers::list_users_handler(admin, db_config).await
}

#[get("/health")]
pub async fn health(auth: OptionalAuth) -> Json<TextResponse> {
    let message = match auth.user {
        Some(user) => format!("Service healthy. Signed in as {}", user.email()),
        None => "Service healthy".to_string(),
    };
    Json(TextResponse::success(message))
}

#[options("/<_..>")]
pub async fn options() -> Status {
    Status::Ok
}

// Error catchers
#[rocket::catch(400)]
pub fn bad_request() -> Json<StandardErrorResponse> {
    Json(StandardErrorResponse::new(
        "Invalid request format".to_string(),
        "BAD_REQUEST".to_string(),
        vec![
            "Check your request JSON format".to_string(),
            "Verify all required fields are present".to_string(),
        ],
    ))
}

#[rocket::catch(401)]
pub fn unauthorized() -> Json<StandardErrorResponse> {
    Json(StandardErrorResponse::new(
        "Authentication required".to_string(),
        "UNAUTHORIZED".to_string(),
        vec!["Sign in and send the session token as a Bearer header".to_string()],
    ))
}

#[rocket::catch(500)]
pub fn internal_error() -> Json<StandardErrorResponse> {
    Json(StandardErrorResponse::new(
        "Internal server error".to_string(),
        "INTERNAL_ERROR".to_string(),
        vec![
            "Try again in a few moments".to_string(),
            "Contact support if the problem persists".to_string(),
        ],
    ))
}

// Main server start function
pub async fn start_web_server(
    database_path: PathBuf,
    service: ServiceConfig,
    jwt_secret: String,
    port: u16,
) -> Result<()> {
    let mut db_config = DatabaseConfig::new(database_path);

    if let Err(e) = db_config.init_pool().await {
        error!("Failed to initialize database: {}", e);
        return Err(e);
    }

    if let Err(e) = db_config.migrate().await {
        error!("Failed to run database migrations: {}", e);
        return Err(e);
    }

    // Seed the reserved admin account when a password is provided.
    if let Ok(admin_password) = std::env::var("ADMIN_PASSWORD") {
        let pool = db_config.pool()?;
        UserDirectory::new(pool)
            .ensure_admin(&service.admin_email, &admin_password)
            .await?;
    }

    let auth_config = AuthConfig::new(jwt_secret, service.admin_email.clone());

    let dispatcher = WebhookDispatcher::new(&service)?;
    let normalizer = NormalizationClient::new(Box::new(GeminiBackend::new(&service)?));
    let station = PipelineStation::new(Box::new(dispatcher), normalizer);

    info!("Starting LinkData Formatter API server");
    info!("Database: {}", db_config.database_path.display());
    info!("Webhook endpoint: {}", service.webhook_url);

    let figment = rocket::Config::figment().merge(("port", port));

    let _rocket = rocket::custom(figment)
        .attach(Cors)
        .manage(auth_config)
        .manage(db_config)
        .manage(station)
        .register("/api", catchers![bad_request, unauthorized, internal_error])
        .mount(
            "/api",
            routes![
                signup,
                signin,
                signout,
                get_current_user,
                process_profile,
                pipeline_status,
                export_csv,
                admin_users,
                health,
                options,
            ],
        )
        .launch()
        .await;

    Ok(())
}
