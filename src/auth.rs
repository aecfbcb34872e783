// src/auth.rs
use crate::database::{DatabaseConfig, User, UserRepository};
use anyhow::Result;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rocket::http::Status;
use rocket::request::{FromRequest, Outcome};
use rocket::{Request, State};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

const SESSION_HOURS: i64 = 24;
const REMEMBERED_SESSION_DAYS: i64 = 30;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // User email
    pub name: String,
    pub role: String,
    pub exp: usize, // Expiration timestamp
    pub iat: usize, // Issued at timestamp
}

/// Identity carried by a verified session token.
#[derive(Debug, Clone, Serialize)]
pub struct SessionUser {
    pub email: String,
    pub name: String,
    pub role: String,
}

impl From<Claims> for SessionUser {
    fn from(claims: Claims) -> Self {
        Self {
            email: claims.sub,
            name: claims.name,
            role: claims.role,
        }
    }
}

pub struct AuthConfig {
    pub jwt_secret: String,
    pub admin_email: String,
}

impl AuthConfig {
    pub fn new(jwt_secret: String, admin_email: String) -> Self {
        Self {
            jwt_secret,
            admin_email,
        }
    }

    /// Issue a session token for a signed-in user. A remembered session
    /// lives 30 days instead of 24 hours.
    pub fn issue_token(&self, user: &User, remember_me: bool) -> Result<String> {
        let now = Utc::now();
        let lifetime = if remember_me {
            Duration::days(REMEMBERED_SESSION_DAYS)
        } else {
            Duration::hours(SESSION_HOURS)
        };

        let claims = Claims {
            sub: user.email.clone(),
            name: user.name.clone(),
            role: user.role.clone(),
            exp: (now + lifetime).timestamp() as usize,
            iat: now.timestamp() as usize,
        };

        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )?;

        Ok(token)
    }

    pub fn verify_token(&self, token: &str) -> Result<SessionUser> {
        let validation = Validation::new(Algorithm::HS256);
        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &validation,
        )?;

        Ok(token_data.claims.into())
    }
}

/// Authenticated user with its directory record
pub struct AuthenticatedUser {
    pub session: SessionUser,
    pub user: User,
}

impl AuthenticatedUser {
    pub fn email(&self) -> &str {
        &self.user.email
    }

    pub fn is_admin(&self) -> bool {
        self.user.is_admin()
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AuthenticatedUser {
    type Error = AuthError;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let auth_config = match req.guard::<&State<AuthConfig>>().await {
            Outcome::Success(config) => config,
            Outcome::Error((status, _)) => {
                return Outcome::Error((status, AuthError::DatabaseError))
            }
            Outcome::Forward(f) => return Outcome::Forward(f),
        };

        let db_config = match req.guard::<&State<DatabaseConfig>>().await {
            Outcome::Success(config) => config,
            Outcome::Error((status, _)) => {
                return Outcome::Error((status, AuthError::DatabaseError))
            }
            Outcome::Forward(f) => return Outcome::Forward(f),
        };

        // Extract Authorization header
        let token = match req.headers().get_one("Authorization") {
            Some(header) if header.starts_with("Bearer ") => &header[7..],
            Some(_) => {
                warn!("Invalid Authorization header format");
                return Outcome::Error((Status::Unauthorized, AuthError::InvalidToken));
            }
            None => {
                warn!("Missing Authorization header");
                return Outcome::Error((Status::Unauthorized, AuthError::MissingToken));
            }
        };

        let session = match auth_config.verify_token(token) {
            Ok(session) => session,
            Err(e) => {
                warn!("Token verification failed: {}", e);
                return Outcome::Error((Status::Unauthorized, AuthError::TokenVerificationFailed));
            }
        };

        let pool = match db_config.pool() {
            Ok(pool) => pool,
            Err(e) => {
                error!("Database connection failed: {}", e);
                return Outcome::Error((Status::InternalServerError, AuthError::DatabaseError));
            }
        };

        // The token may outlive the account; re-check the directory.
        let repo = UserRepository::new(pool);
        let user = match repo.find_by_email(&session.email).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                warn!("Session for unknown account: {}", session.email);
                return Outcome::Error((Status::Unauthorized, AuthError::UnknownAccount));
            }
            Err(e) => {
                error!("Failed to look up account {}: {}", session.email, e);
                return Outcome::Error((Status::InternalServerError, AuthError::DatabaseError));
            }
        };

        Outcome::Success(AuthenticatedUser { session, user })
    }
}

/// Guard that additionally requires the admin role
pub struct AdminUser {
    pub auth: AuthenticatedUser,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AdminUser {
    type Error = AuthError;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        match AuthenticatedUser::from_request(req).await {
            Outcome::Success(auth) if auth.is_admin() => Outcome::Success(AdminUser { auth }),
            Outcome::Success(auth) => {
                warn!("Non-admin {} attempted admin access", auth.email());
                Outcome::Error((Status::Forbidden, AuthError::NotAuthorized))
            }
            Outcome::Error(e) => Outcome::Error(e),
            Outcome::Forward(f) => Outcome::Forward(f),
        }
    }
}

#[derive(Debug)]
pub enum AuthError {
    MissingToken,
    InvalidToken,
    TokenVerificationFailed,
    UnknownAccount,
    NotAuthorized,
    DatabaseError,
}

impl AuthError {
    pub fn message(&self) -> &'static str {
        match self {
            AuthError::MissingToken => "Authorization token required",
            AuthError::InvalidToken => "Invalid authorization token format",
            AuthError::TokenVerificationFailed => "Token verification failed",
            AuthError::UnknownAccount => "Account no longer exists",
            AuthError::NotAuthorized => "Administrator access required",
            AuthError::DatabaseError => "Database error occurred",
        }
    }
}

// Optional auth guard that doesn't fail if no auth is provided
pub struct OptionalAuth {
    pub user: Option<AuthenticatedUser>,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for OptionalAuth {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        match AuthenticatedUser::from_request(req).await {
            Outcome::Success(auth) => Outcome::Success(OptionalAuth { user: Some(auth) }),
            _ => Outcome::Success(OptionalAuth { user: None }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{ROLE_USER, STATUS_ACTIVE};

    fn sample_user() -> User {
        User {
            id: "7e7c63cf-1dd2-4b60-a9e3-1fb6c1e0a111".to_string(),
            email: "jane@example.com".to_string(),
            name: "Jane Doe".to_string(),
            password: "secret".to_string(),
            role: ROLE_USER.to_string(),
            status: STATUS_ACTIVE.to_string(),
            last_login: None,
            profiles_processed: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn issued_token_round_trips() {
        let config = AuthConfig::new("test-secret".to_string(), "admin@gmail.com".to_string());
        let token = config.issue_token(&sample_user(), false).unwrap();

        let session = config.verify_token(&token).unwrap();
        assert_eq!(session.email, "jane@example.com");
        assert_eq!(session.name, "Jane Doe");
        assert_eq!(session.role, ROLE_USER);
    }

    #[test]
    fn token_from_other_secret_is_rejected() {
        let issuer = AuthConfig::new("secret-a".to_string(), "admin@gmail.com".to_string());
        let verifier = AuthConfig::new("secret-b".to_string(), "admin@gmail.com".to_string());

        let token = issuer.issue_token(&sample_user(), true).unwrap();
        assert!(verifier.verify_token(&token).is_err());
    }
}
