// src/web/handlers/auth_handlers.rs
use crate::auth::{AuthConfig, AuthenticatedUser};
use crate::database::{DatabaseConfig, UserRepository, ROLE_USER, STATUS_OFFLINE};
use crate::web::types::{
    ActionResponse, DataResponse, SessionData, SignInRequest, SignUpRequest,
    StandardErrorResponse, UserInfo,
};
use rocket::serde::json::Json;
use rocket::State;
use tracing::{error, info, warn};

fn database_error() -> Json<StandardErrorResponse> {
    Json(StandardErrorResponse::new(
        "Database error occurred".to_string(),
        "DATABASE_ERROR".to_string(),
        vec!["Try again in a few moments".to_string()],
    ))
}

pub async fn signup_handler(
    request: Json<SignUpRequest>,
    auth_config: &State<AuthConfig>,
    db_config: &State<DatabaseConfig>,
) -> Result<Json<DataResponse<SessionData>>, Json<StandardErrorResponse>> {
    let first_name = request.first_name.trim();
    let last_name = request.last_name.trim();
    let email = request.email.trim();

    if first_name.is_empty() || last_name.is_empty() || email.is_empty() || request.password.is_empty()
    {
        return Err(Json(StandardErrorResponse::new(
            "All fields are required to create an account.".to_string(),
            "VALIDATION_ERROR".to_string(),
            vec!["Fill in first name, last name, email and password".to_string()],
        )));
    }

    if email.eq_ignore_ascii_case(&auth_config.admin_email) {
        return Err(Json(StandardErrorResponse::new(
            "This email is reserved. Please sign in.".to_string(),
            "EMAIL_RESERVED".to_string(),
            vec!["Use the sign-in form instead".to_string()],
        )));
    }

    let pool = match db_config.pool() {
        Ok(pool) => pool,
        Err(e) => {
            error!("Database connection failed: {}", e);
            return Err(database_error());
        }
    };
    let repo = UserRepository::new(pool);

    match repo.find_by_email(email).await {
        Ok(Some(_)) => {
            return Err(Json(StandardErrorResponse::new(
                "User already exists with this email. Please sign in.".to_string(),
                "EMAIL_TAKEN".to_string(),
                vec!["Use the sign-in form instead".to_string()],
            )));
        }
        Ok(None) => {}
        Err(e) => {
            error!("Account lookup failed for {}: {}", email, e);
            return Err(database_error());
        }
    }

    let name = format!("{} {}", first_name, last_name);
    let user = match repo.create(&name, email, &request.password, ROLE_USER).await {
        Ok(user) => user,
        Err(e) => {
            error!("Failed to create account for {}: {}", email, e);
            return Err(database_error());
        }
    };

    let token = match auth_config.issue_token(&user, request.remember_me) {
        Ok(token) => token,
        Err(e) => {
            error!("Failed to issue session token for {}: {}", email, e);
            return Err(database_error());
        }
    };

    info!("New account registered: {}", email);
    Ok(Json(DataResponse::success(
        "Account created".to_string(),
        SessionData {
            token,
            user: UserInfo::from(&user),
        },
    )))
}

pub async fn signin_handler(
    request: Json<SignInRequest>,
    auth_config: &State<AuthConfig>,
    db_config: &State<DatabaseConfig>,
) -> Result<Json<DataResponse<SessionData>>, Json<StandardErrorResponse>> {
    let email = request.email.trim();

    let pool = match db_config.pool() {
        Ok(pool) => pool,
        Err(e) => {
            error!("Database connection failed: {}", e);
            return Err(database_error());
        }
    };
    let repo = UserRepository::new(pool);

    let user = match repo.find_by_email(email).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            warn!("Sign-in attempt for unknown email: {}", email);
            return Err(Json(StandardErrorResponse::new(
                "Incorrect email. Account not found.".to_string(),
                "ACCOUNT_NOT_FOUND".to_string(),
                vec!["Check the email address or sign up first".to_string()],
            )));
        }
        Err(e) => {
            error!("Account lookup failed for {}: {}", email, e);
            return Err(database_error());
        }
    };

    // Stored credentials are compared verbatim.
    if user.password != request.password {
        warn!("Failed sign-in for {}", email);
        return Err(Json(StandardErrorResponse::new(
            "Incorrect password. Please try again.".to_string(),
            "INVALID_PASSWORD".to_string(),
            vec!["Check the password and retry".to_string()],
        )));
    }

    if let Err(e) = repo.touch_login(email).await {
        error!("Failed to stamp sign-in for {}: {}", email, e);
    }

    let token = match auth_config.issue_token(&user, request.remember_me) {
        Ok(token) => token,
        Err(e) => {
            error!("Failed to issue session token for {}: {}", email, e);
            return Err(database_error());
        }
    };

    info!("User signed in: {}", email);
    Ok(Json(DataResponse::success(
        "Signed in".to_string(),
        SessionData {
            token,
            user: UserInfo::from(&user),
        },
    )))
}

pub async fn signout_handler(
    auth: AuthenticatedUser,
    db_config: &State<DatabaseConfig>,
) -> Result<Json<ActionResponse>, Json<StandardErrorResponse>> {
    let pool = match db_config.pool() {
        Ok(pool) => pool,
        Err(e) => {
            error!("Database connection failed: {}", e);
            return Err(database_error());
        }
    };

    let repo = UserRepository::new(pool);
    if let Err(e) = repo.set_status(auth.email(), STATUS_OFFLINE).await {
        error!("Failed to mark {} offline: {}", auth.email(), e);
        return Err(database_error());
    }

    info!("User signed out: {}", auth.email());
    Ok(Json(ActionResponse::success(
        "Signed out".to_string(),
        "signout".to_string(),
    )))
}

pub async fn current_user_handler(auth: AuthenticatedUser) -> Json<DataResponse<UserInfo>> {
    Json(DataResponse::success(
        "Current user".to_string(),
        UserInfo::from(&auth.user),
    ))
}
