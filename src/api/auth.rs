use actix_web::{web, HttpResponse};
use chrono::Utc;
use mongodb::bson::{doc, DateTime as BsonDateTime};
use mongodb::Database;
use serde_json::json;
use validator::Validate;

use crate::auth::{create_token, hash_password, verify_password, AuthenticatedUser, Claims};
use crate::config::Config;
use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::models::{AuthResponse, LoginRequest, RegisterRequest, User, UserPreferences, UserResponse};

#[utoipa::path(
    post,
    path = "/api/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = AuthResponse),
        (status = 400, description = "Validation failed or email already registered")
    ),
    tag = "auth"
)]
pub async fn register(
    req: web::Json<RegisterRequest>,
    db: web::Data<Database>,
    config: web::Data<Config>,
) -> ApiResult<HttpResponse> {
    let req = req.into_inner();
    req.validate()?;

    let email = req.email.trim().to_lowercase();
    if db::users(&db).find_one(doc! { "email": &email }, None).await?.is_some() {
        return Err(ApiError::conflict("User already exists with this email"));
    }

    let now = Utc::now();
    let mut user = User {
        id: None,
        name: req.name.trim().to_string(),
        email,
        password_hash: hash_password(&req.password)?,
        role: req.role,
        avatar: None,
        phone: None,
        location: None,
        preferences: UserPreferences::default(),
        is_verified: false,
        is_active: true,
        last_login: now,
        created_at: now,
        updated_at: now,
    };

    // Two concurrent registrations can both pass the lookup; the unique
    // index on email settles it.
    let inserted = match db::users(&db).insert_one(&user, None).await {
        Ok(result) => result,
        Err(err) if db::is_duplicate_key_error(&err) => {
            return Err(ApiError::conflict("User already exists with this email"))
        }
        Err(err) => return Err(err.into()),
    };
    user.id = inserted.inserted_id.as_object_id();
    let user_id = user.id.ok_or_else(|| ApiError::internal("insert returned no object id"))?;

    let token = create_token(&Claims::new(&user_id, config.jwt.expiration_hours), &config.jwt.secret)?;
    Ok(HttpResponse::Created().json(AuthResponse {
        message: "User registered successfully".to_string(),
        token,
        user: UserResponse::from(user),
    }))
}

#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials or deactivated account")
    ),
    tag = "auth"
)]
pub async fn login(
    req: web::Json<LoginRequest>,
    db: web::Data<Database>,
    config: web::Data<Config>,
) -> ApiResult<HttpResponse> {
    let req = req.into_inner();
    req.validate()?;

    let email = req.email.trim().to_lowercase();
    let mut user = db::users(&db)
        .find_one(doc! { "email": &email }, None)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid email or password"))?;

    if !user.is_active {
        return Err(ApiError::unauthorized("Account is deactivated. Please contact support."));
    }
    if !verify_password(&req.password, &user.password_hash)? {
        return Err(ApiError::unauthorized("Invalid email or password"));
    }

    let user_id = user.id.ok_or_else(|| ApiError::internal("user document missing id"))?;
    let now = Utc::now();
    db::users(&db)
        .update_one(
            doc! { "_id": user_id },
            doc! { "$set": { "lastLogin": BsonDateTime::from_chrono(now) } },
            None,
        )
        .await?;
    user.last_login = now;

    let token = create_token(&Claims::new(&user_id, config.jwt.expiration_hours), &config.jwt.secret)?;
    Ok(HttpResponse::Ok().json(AuthResponse {
        message: "Login successful".to_string(),
        token,
        user: UserResponse::from(user),
    }))
}

#[utoipa::path(
    get,
    path = "/api/auth/me",
    responses(
        (status = 200, description = "Current user", body = UserResponse),
        (status = 401, description = "Missing or invalid token")
    ),
    security(("bearer_auth" = [])),
    tag = "auth"
)]
pub async fn me(user: AuthenticatedUser) -> ApiResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(json!({ "user": UserResponse::from(user.user) })))
}

#[utoipa::path(
    post,
    path = "/api/auth/refresh",
    responses(
        (status = 200, description = "Fresh token issued"),
        (status = 401, description = "Missing or invalid token")
    ),
    security(("bearer_auth" = [])),
    tag = "auth"
)]
pub async fn refresh(user: AuthenticatedUser, config: web::Data<Config>) -> ApiResult<HttpResponse> {
    let token = create_token(&Claims::new(&user.id, config.jwt.expiration_hours), &config.jwt.secret)?;
    Ok(HttpResponse::Ok().json(json!({
        "message": "Token refreshed successfully",
        "token": token,
    })))
}

#[utoipa::path(
    post,
    path = "/api/auth/logout",
    responses(
        (status = 200, description = "Logged out"),
        (status = 401, description = "Missing or invalid token")
    ),
    security(("bearer_auth" = [])),
    tag = "auth"
)]
pub async fn logout(_user: AuthenticatedUser) -> ApiResult<HttpResponse> {
    // Tokens are stateless; the client just drops its copy.
    Ok(HttpResponse::Ok().json(json!({ "message": "Logout successful" })))
}
