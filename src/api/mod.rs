pub mod auth;
pub mod farms;
pub mod reviews;
pub mod users;
pub mod wishlist;

use actix_web::{web, HttpRequest, HttpResponse};
use serde_json::json;
use utoipa::OpenApi;

use crate::error::FieldError;
use crate::models::{
    AddWishlistRequest, Aspects, AuthResponse, Availability, Capacity, ContactInfo, Coordinates,
    CreateFarmRequest, CreateReviewRequest, FarmBrief, FarmFeature, FarmImage, FarmListQuery,
    FarmListResponse, FarmLocation, FarmOwner, FarmPagination, FarmResponse, FarmSearchResponse,
    FarmSortBy, HelpfulRequest, LoginRequest, MyReviewsResponse, NotificationSettings,
    OwnerReplyRequest, PrivacySettings, ProfileUpdate, RatingDistribution, RatingSummary,
    RegisterRequest, ReviewListQuery, ReviewListResponse, ReviewPagination, ReviewReply,
    ReviewResponse, ReviewSortBy, ReviewStatistics, Role, SearchQuery, UpdateFarmRequest,
    UpdateNotesRequest, UpdatePreferencesRequest, UpdateReviewRequest, UserBrief, UserLocation,
    UserPreferences, UserResponse, WishlistCheckResponse, WishlistEntryResponse, WishlistResponse,
    WishlistStatsResponse,
};

/// Scheme and host the request arrived on, used to resolve stored upload
/// paths into absolute URLs.
pub fn request_base(req: &HttpRequest) -> String {
    let info = req.connection_info();
    format!("{}://{}", info.scheme(), info.host())
}

#[utoipa::path(
    get,
    path = "/api/health",
    responses((status = 200, description = "Service is up")),
    tag = "health"
)]
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "OK",
        "message": "MilkWay API is running",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

pub async fn not_found() -> HttpResponse {
    HttpResponse::NotFound().json(json!({ "message": "Route not found" }))
}

/// Route table, shared by the server binary and the integration tests.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/health", web::get().to(health))
            .service(
                web::scope("/auth")
                    .route("/register", web::post().to(auth::register))
                    .route("/login", web::post().to(auth::login))
                    .route("/me", web::get().to(auth::me))
                    .route("/refresh", web::post().to(auth::refresh))
                    .route("/logout", web::post().to(auth::logout)),
            )
            .service(
                web::scope("/farms")
                    .route("", web::get().to(farms::list_farms))
                    .route("", web::post().to(farms::create_farm))
                    .route("/search", web::get().to(farms::search_farms))
                    .route("/my-farms", web::get().to(farms::my_farms))
                    .route("/{id}", web::get().to(farms::get_farm))
                    .route("/{id}", web::put().to(farms::update_farm))
                    .route("/{id}", web::delete().to(farms::delete_farm)),
            )
            .service(
                web::scope("/reviews")
                    .route("", web::post().to(reviews::create_review))
                    .route("/farm/{farm_id}", web::get().to(reviews::farm_reviews))
                    .route("/my-reviews", web::get().to(reviews::my_reviews))
                    .route("/{id}", web::put().to(reviews::update_review))
                    .route("/{id}", web::delete().to(reviews::delete_review))
                    .route("/{id}/helpful", web::post().to(reviews::mark_helpful))
                    .route("/{id}/response", web::post().to(reviews::respond_to_review)),
            )
            .service(
                web::scope("/wishlist")
                    .route("", web::get().to(wishlist::get_wishlist))
                    .route("", web::post().to(wishlist::add_to_wishlist))
                    .route("/stats", web::get().to(wishlist::wishlist_stats))
                    .route("/check/{farm_id}", web::get().to(wishlist::check_wishlist))
                    .route("/{farm_id}", web::delete().to(wishlist::remove_from_wishlist))
                    .route("/{farm_id}/notes", web::put().to(wishlist::update_notes)),
            )
            .service(
                web::scope("/users")
                    .route("/profile", web::get().to(users::get_profile))
                    .route("/profile", web::put().to(users::update_profile))
                    .route("/preferences", web::put().to(users::update_preferences))
                    .route("/avatar", web::delete().to(users::delete_avatar))
                    .route("/stats", web::get().to(users::user_stats))
                    .route("/deactivate", web::post().to(users::deactivate_account)),
            )
            .default_service(web::route().to(not_found)),
    );
}

#[derive(OpenApi)]
#[openapi(
    paths(
        // Auth endpoints
        auth::register,
        auth::login,
        auth::me,
        auth::refresh,
        auth::logout,
        // Farm endpoints
        farms::list_farms,
        farms::search_farms,
        farms::my_farms,
        farms::get_farm,
        farms::create_farm,
        farms::update_farm,
        farms::delete_farm,
        // Review endpoints
        reviews::farm_reviews,
        reviews::my_reviews,
        reviews::create_review,
        reviews::update_review,
        reviews::delete_review,
        reviews::mark_helpful,
        reviews::respond_to_review,
        // Wishlist endpoints
        wishlist::get_wishlist,
        wishlist::add_to_wishlist,
        wishlist::remove_from_wishlist,
        wishlist::update_notes,
        wishlist::check_wishlist,
        wishlist::wishlist_stats,
        // User endpoints
        users::get_profile,
        users::update_profile,
        users::update_preferences,
        users::delete_avatar,
        users::user_stats,
        users::deactivate_account,
        // Misc
        health,
    ),
    components(schemas(
        // Auth schemas
        RegisterRequest,
        LoginRequest,
        AuthResponse,
        UserResponse,
        Role,
        UserLocation,
        UserPreferences,
        NotificationSettings,
        PrivacySettings,
        ProfileUpdate,
        UpdatePreferencesRequest,
        // Farm schemas
        Availability,
        FarmFeature,
        FarmSortBy,
        Coordinates,
        FarmLocation,
        ContactInfo,
        FarmImage,
        Capacity,
        RatingSummary,
        CreateFarmRequest,
        UpdateFarmRequest,
        FarmListQuery,
        SearchQuery,
        FarmOwner,
        FarmResponse,
        FarmPagination,
        FarmListResponse,
        FarmSearchResponse,
        // Review schemas
        Aspects,
        CreateReviewRequest,
        UpdateReviewRequest,
        HelpfulRequest,
        OwnerReplyRequest,
        ReviewSortBy,
        ReviewListQuery,
        UserBrief,
        FarmBrief,
        ReviewReply,
        ReviewResponse,
        RatingDistribution,
        ReviewStatistics,
        ReviewPagination,
        ReviewListResponse,
        MyReviewsResponse,
        // Wishlist schemas
        AddWishlistRequest,
        UpdateNotesRequest,
        WishlistEntryResponse,
        WishlistResponse,
        WishlistCheckResponse,
        WishlistStatsResponse,
        // Error schema
        FieldError,
    )),
    tags(
        (name = "auth", description = "Authentication endpoints"),
        (name = "farms", description = "Farm listing and discovery endpoints"),
        (name = "reviews", description = "Farm review endpoints"),
        (name = "wishlist", description = "Buyer wishlist endpoints"),
        (name = "users", description = "Profile and account endpoints"),
        (name = "health", description = "Service health"),
    ),
    modifiers(&SecurityAddon),
)]
pub struct ApiDoc;

use utoipa::Modify;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                utoipa::openapi::security::SecurityScheme::Http(
                    utoipa::openapi::security::HttpBuilder::new()
                        .scheme(utoipa::openapi::security::HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            )
        }
    }
}
