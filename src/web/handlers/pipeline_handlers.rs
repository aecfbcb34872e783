// src/web/handlers/pipeline_handlers.rs
use crate::auth::AuthenticatedUser;
use crate::database::{DatabaseConfig, UserRepository};
use crate::export;
use crate::pipeline::{PipelineError, PipelineReport, PipelineStation, StationStatus};
use crate::web::types::{
    CsvResponse, DataResponse, ExportRequest, ProcessRequest, StandardErrorResponse,
};
use rocket::serde::json::Json;
use rocket::State;
use tracing::{error, info};

fn suggestions_for(err: &PipelineError) -> Vec<String> {
    match err {
        PipelineError::EmptyProfileUrl => {
            vec!["Provide a LinkedIn profile URL".to_string()]
        }
        PipelineError::Transport { .. } => vec![
            "Check that the webhook workflow is running".to_string(),
            "Verify network connectivity".to_string(),
        ],
        PipelineError::WebhookStatus { .. } => {
            vec!["Verify the webhook endpoint configuration".to_string()]
        }
        PipelineError::Busy => vec!["Wait for the current submission to finish".to_string()],
    }
}

pub async fn process_handler(
    request: Json<ProcessRequest>,
    auth: AuthenticatedUser,
    station: &State<PipelineStation>,
    db_config: &State<DatabaseConfig>,
) -> Result<Json<DataResponse<PipelineReport>>, Json<StandardErrorResponse>> {
    info!(
        "User {} processing profile: {}",
        auth.email(),
        request.linkedin_url
    );

    let api_key = request.api_key.clone().unwrap_or_default();
    let report = match station.submit(&request.linkedin_url, &api_key).await {
        Ok(report) => report,
        Err(err) => {
            return Err(Json(StandardErrorResponse::new(
                err.user_message(),
                err.error_code().to_string(),
                suggestions_for(&err),
            )));
        }
    };

    // Usage counter feeds the admin portal; a failed bump never fails the run.
    match db_config.pool() {
        Ok(pool) => {
            let repo = UserRepository::new(pool);
            if let Err(e) = repo.increment_profiles_processed(auth.email()).await {
                error!("Failed to bump usage counter for {}: {}", auth.email(), e);
            }
        }
        Err(e) => error!("Database connection failed: {}", e),
    }

    Ok(Json(DataResponse::success(
        "Profile processed".to_string(),
        report,
    )))
}

pub async fn status_handler(station: &State<PipelineStation>) -> Json<DataResponse<StationStatus>> {
    Json(DataResponse::success(
        "Pipeline status".to_string(),
        station.status(),
    ))
}

pub async fn export_csv_handler(
    request: Json<ExportRequest>,
    _auth: AuthenticatedUser,
) -> Result<CsvResponse, Json<StandardErrorResponse>> {
    let csv_text = match export::table_to_csv(&request.headers, &request.rows) {
        Ok(text) => text,
        Err(e) => {
            error!("CSV export failed: {}", e);
            return Err(Json(StandardErrorResponse::new(
                "Failed to build CSV export".to_string(),
                "EXPORT_ERROR".to_string(),
                vec!["Check the table contents and retry".to_string()],
            )));
        }
    };

    let filename = request
        .filename
        .clone()
        .unwrap_or_else(export::export_filename);

    Ok(CsvResponse::new(csv_text.into_bytes(), filename))
}
