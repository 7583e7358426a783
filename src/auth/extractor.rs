use actix_web::dev::Payload;
use actix_web::{web, FromRequest, HttpRequest};
use futures_util::future::LocalBoxFuture;
use jsonwebtoken::errors::ErrorKind as JwtErrorKind;
use mongodb::bson::oid::ObjectId;
use mongodb::Database;

use crate::auth::verify_token;
use crate::config::Config;
use crate::db;
use crate::error::ApiError;
use crate::models::{Role, User};

/// Identity resolved from a bearer token. The user document is loaded fresh
/// on every request, so deactivated accounts are locked out even while their
/// tokens are still unexpired. Handlers that allow anonymous access take
/// `Option<AuthenticatedUser>` instead.
pub struct AuthenticatedUser {
    pub id: ObjectId,
    pub user: User,
}

impl AuthenticatedUser {
    /// Role gate for routes restricted to one side of the marketplace.
    pub fn require_role(&self, allowed: &[Role]) -> Result<(), ApiError> {
        if allowed.contains(&self.user.role) {
            return Ok(());
        }
        let wanted = allowed.iter().map(Role::as_str).collect::<Vec<_>>().join(" or ");
        Err(ApiError::forbidden(format!("Access denied. Required role: {}", wanted)))
    }
}

impl FromRequest for AuthenticatedUser {
    type Error = ApiError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let req = req.clone();
        Box::pin(async move {
            let token = bearer_token(&req)
                .ok_or_else(|| ApiError::unauthorized("Access denied. No token provided."))?;

            let config = req
                .app_data::<web::Data<Config>>()
                .ok_or_else(|| ApiError::internal("server configuration missing"))?;
            let db = req
                .app_data::<web::Data<Database>>()
                .ok_or_else(|| ApiError::internal("database handle missing"))?;

            let claims = verify_token(&token, &config.jwt.secret).map_err(|err| match err.kind() {
                JwtErrorKind::ExpiredSignature => ApiError::unauthorized("Token expired."),
                _ => ApiError::unauthorized("Invalid token."),
            })?;
            let user_id = ObjectId::parse_str(&claims.sub)
                .map_err(|_| ApiError::unauthorized("Invalid token."))?;

            let user: User = db::find_user(db.get_ref(), &user_id)
                .await?
                .ok_or_else(|| ApiError::unauthorized("Invalid token. User not found."))?;
            if !user.is_active {
                return Err(ApiError::unauthorized("Account is deactivated."));
            }

            Ok(AuthenticatedUser { id: user_id, user })
        })
    }
}

fn bearer_token(req: &HttpRequest) -> Option<String> {
    req.headers()
        .get("Authorization")?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::to_owned)
}
