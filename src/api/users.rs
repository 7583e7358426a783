use actix_multipart::Multipart;
use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use mongodb::bson::{doc, to_bson, Bson, DateTime as BsonDateTime, Document};
use mongodb::options::{FindOneAndUpdateOptions, ReturnDocument};
use mongodb::Database;
use serde_json::json;
use validator::Validate;

use crate::api::request_base;
use crate::auth::AuthenticatedUser;
use crate::config::Config;
use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::models::{ProfileUpdate, Role, UpdatePreferencesRequest, UserResponse};
use crate::services::uploads::{self, UploadForm, UploadKind};

fn absolutize_avatar(mut profile: UserResponse, base_url: &str) -> UserResponse {
    if let Some(avatar) = profile.avatar.take() {
        profile.avatar = Some(uploads::absolute_url(base_url, &avatar));
    }
    profile
}

#[utoipa::path(
    get,
    path = "/api/users/profile",
    responses(
        (status = 200, description = "The caller's profile", body = UserResponse),
        (status = 401, description = "Missing or invalid token")
    ),
    security(("bearer_auth" = [])),
    tag = "users"
)]
pub async fn get_profile(
    http_req: HttpRequest,
    user: AuthenticatedUser,
) -> ApiResult<HttpResponse> {
    let profile = absolutize_avatar(UserResponse::from(user.user), &request_base(&http_req));
    Ok(HttpResponse::Ok().json(profile))
}

#[utoipa::path(
    put,
    path = "/api/users/profile",
    request_body(content = ProfileUpdate, content_type = "multipart/form-data",
        description = "Only provided fields change; `location` and `preferences` are JSON strings, `avatar` an optional image file"),
    responses(
        (status = 200, description = "Profile updated", body = UserResponse),
        (status = 400, description = "Validation failed")
    ),
    security(("bearer_auth" = [])),
    tag = "users"
)]
pub async fn update_profile(
    http_req: HttpRequest,
    payload: Multipart,
    user: AuthenticatedUser,
    db: web::Data<Database>,
    config: web::Data<Config>,
) -> ApiResult<HttpResponse> {
    let form = uploads::collect_form(payload, &config, UploadKind::Avatar).await?;
    match apply_profile_update(&db, &config, &user, &form, &http_req).await {
        Ok(response) => Ok(response),
        Err(err) => {
            uploads::cleanup_files(&form.files).await;
            Err(err)
        }
    }
}

async fn apply_profile_update(
    db: &Database,
    config: &Config,
    user: &AuthenticatedUser,
    form: &UploadForm,
    http_req: &HttpRequest,
) -> ApiResult<HttpResponse> {
    let update = parse_profile_form(form)?;
    update.validate()?;

    let mut set = Document::new();
    if let Some(name) = &update.name {
        set.insert("name", name);
    }
    if let Some(phone) = &update.phone {
        set.insert("phone", phone);
    }
    if let Some(location) = &update.location {
        set.insert("location", to_bson(location)?);
    }
    if let Some(preferences) = &update.preferences {
        set.insert("preferences", to_bson(preferences)?);
    }
    if let Some(file) = form.files.first() {
        // A replaced avatar retires its old file.
        if let Some(old) = &user.user.avatar {
            if let Some(path) = uploads::stored_file_path(&config.uploads.dir, old) {
                uploads::remove_file(&path).await;
            }
        }
        set.insert("avatar", &file.url_path);
    }
    set.insert("updatedAt", BsonDateTime::from_chrono(Utc::now()));

    let options = FindOneAndUpdateOptions::builder()
        .return_document(ReturnDocument::After)
        .build();
    let updated = db::users(db)
        .find_one_and_update(doc! { "_id": user.id }, doc! { "$set": set }, options)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    let profile = absolutize_avatar(UserResponse::from(updated), &request_base(http_req));
    Ok(HttpResponse::Ok().json(json!({
        "message": "Profile updated successfully",
        "user": profile,
    })))
}

fn parse_profile_form(form: &UploadForm) -> ApiResult<ProfileUpdate> {
    Ok(ProfileUpdate {
        name: form.field("name").map(|n| n.trim().to_string()),
        phone: form.field("phone").map(|p| p.trim().to_string()),
        location: form.json_field("location", "Invalid location data")?,
        preferences: form.json_field("preferences", "Invalid preferences data")?,
    })
}

#[utoipa::path(
    put,
    path = "/api/users/preferences",
    request_body = UpdatePreferencesRequest,
    responses(
        (status = 200, description = "Preferences replaced per provided group"),
        (status = 401, description = "Missing or invalid token")
    ),
    security(("bearer_auth" = [])),
    tag = "users"
)]
pub async fn update_preferences(
    body: web::Json<UpdatePreferencesRequest>,
    user: AuthenticatedUser,
    db: web::Data<Database>,
) -> ApiResult<HttpResponse> {
    let body = body.into_inner();

    let mut set = Document::new();
    if let Some(notifications) = &body.notifications {
        set.insert("preferences.notifications", to_bson(notifications)?);
    }
    if let Some(privacy) = &body.privacy {
        set.insert("preferences.privacy", to_bson(privacy)?);
    }
    set.insert("updatedAt", BsonDateTime::from_chrono(Utc::now()));

    let options = FindOneAndUpdateOptions::builder()
        .return_document(ReturnDocument::After)
        .build();
    let updated = db::users(&db)
        .find_one_and_update(doc! { "_id": user.id }, doc! { "$set": set }, options)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    Ok(HttpResponse::Ok().json(json!({
        "message": "Preferences updated successfully",
        "preferences": updated.preferences,
    })))
}

#[utoipa::path(
    delete,
    path = "/api/users/avatar",
    responses(
        (status = 200, description = "Avatar file and reference removed"),
        (status = 400, description = "No avatar set")
    ),
    security(("bearer_auth" = [])),
    tag = "users"
)]
pub async fn delete_avatar(
    user: AuthenticatedUser,
    db: web::Data<Database>,
    config: web::Data<Config>,
) -> ApiResult<HttpResponse> {
    let avatar = user
        .user
        .avatar
        .as_deref()
        .ok_or_else(|| ApiError::validation("No avatar to delete"))?;
    if let Some(path) = uploads::stored_file_path(&config.uploads.dir, avatar) {
        uploads::remove_file(&path).await;
    }

    db::users(&db)
        .update_one(
            doc! { "_id": user.id },
            doc! { "$set": {
                "avatar": Bson::Null,
                "updatedAt": BsonDateTime::from_chrono(Utc::now()),
            } },
            None,
        )
        .await?;

    Ok(HttpResponse::Ok().json(json!({ "message": "Avatar deleted successfully" })))
}

#[utoipa::path(
    get,
    path = "/api/users/stats",
    responses(
        (status = 200, description = "Role-specific account statistics"),
        (status = 401, description = "Missing or invalid token")
    ),
    security(("bearer_auth" = [])),
    tag = "users"
)]
pub async fn user_stats(
    user: AuthenticatedUser,
    db: web::Data<Database>,
) -> ApiResult<HttpResponse> {
    let account_age = (Utc::now() - user.user.created_at).num_days();
    let mut stats = json!({
        "accountAge": account_age,
        "lastLogin": user.user.last_login,
        "isVerified": user.user.is_verified,
    });

    match user.user.role {
        Role::Farmer => {
            let mut cursor = db::farms(&db).find(doc! { "owner": user.id }, None).await?;
            let mut farms = Vec::new();
            while cursor.advance().await? {
                farms.push(cursor.deserialize_current()?);
            }

            let total = farms.len();
            let views: i64 = farms.iter().map(|farm| farm.views).sum();
            let average_rating = if total > 0 {
                farms.iter().map(|farm| farm.ratings.average).sum::<f64>() / total as f64
            } else {
                0.0
            };
            stats["totalFarms"] = json!(total);
            stats["activeFarms"] = json!(farms.iter().filter(|farm| farm.is_active).count());
            stats["totalViews"] = json!(views);
            stats["averageRating"] = json!(average_rating);
        }
        Role::Buyer => {
            let mut cursor = db::reviews(&db).find(doc! { "buyer": user.id }, None).await?;
            let mut ratings = Vec::new();
            while cursor.advance().await? {
                let review = cursor.deserialize_current()?;
                ratings.push(review.rating);
            }
            let wishlist = db::wishlists(&db).find_one(doc! { "buyer": user.id }, None).await?;

            let total = ratings.len();
            let average_given = if total > 0 {
                ratings.iter().map(|r| f64::from(*r)).sum::<f64>() / total as f64
            } else {
                0.0
            };
            stats["totalReviews"] = json!(total);
            stats["averageRatingGiven"] = json!(average_given);
            stats["wishlistItems"] = json!(wishlist.map(|w| w.farms.len()).unwrap_or(0));
        }
    }

    Ok(HttpResponse::Ok().json(stats))
}

#[utoipa::path(
    post,
    path = "/api/users/deactivate",
    responses(
        (status = 200, description = "Account disabled; further logins are refused"),
        (status = 401, description = "Missing or invalid token")
    ),
    security(("bearer_auth" = [])),
    tag = "users"
)]
pub async fn deactivate_account(
    user: AuthenticatedUser,
    db: web::Data<Database>,
) -> ApiResult<HttpResponse> {
    db::users(&db)
        .update_one(
            doc! { "_id": user.id },
            doc! { "$set": {
                "isActive": false,
                "updatedAt": BsonDateTime::from_chrono(Utc::now()),
            } },
            None,
        )
        .await?;

    Ok(HttpResponse::Ok().json(json!({ "message": "Account deactivated successfully" })))
}
