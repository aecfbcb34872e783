// src/web/handlers/admin_handlers.rs
use crate::auth::AdminUser;
use crate::database::{DatabaseConfig, UserDirectory};
use crate::web::types::{AdminDirectoryData, DataResponse, StandardErrorResponse};
use rocket::serde::json::Json;
use rocket::State;
use tracing::error;

pub async fn list_users_handler(
    admin: AdminUser,
    db_config: &State<DatabaseConfig>,
) -> Result<Json<DataResponse<AdminDirectoryData>>, Json<StandardErrorResponse>> {
    let pool = match db_config.pool() {
        Ok(pool) => pool,
        Err(e) => {
            error!("Database connection failed: {}", e);
            return Err(Json(StandardErrorResponse::new(
                "Database error occurred".to_string(),
                "DATABASE_ERROR".to_string(),
                vec!["Try again in a few moments".to_string()],
            )));
        }
    };

    let directory = UserDirectory::new(pool);
    let stats = match directory.stats().await {
        Ok(stats) => stats,
        Err(e) => {
            error!("Failed to load directory stats: {}", e);
            return Err(Json(StandardErrorResponse::new(
                "Failed to load directory stats".to_string(),
                "DATABASE_ERROR".to_string(),
                vec!["Try again in a few moments".to_string()],
            )));
        }
    };

    let users = match directory.repo().list_all().await {
        Ok(users) => users,
        Err(e) => {
            error!(
                "Failed to list users for admin {}: {}",
                admin.auth.email(),
                e
            );
            return Err(Json(StandardErrorResponse::new(
                "Failed to list users".to_string(),
                "DATABASE_ERROR".to_string(),
                vec!["Try again in a few moments".to_string()],
            )));
        }
    };

    Ok(Json(DataResponse::success(
        "User directory".to_string(),
        AdminDirectoryData { stats, users },
    )))
}
