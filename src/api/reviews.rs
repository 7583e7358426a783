use std::collections::HashMap;

use actix_web::{web, HttpResponse};
use chrono::Utc;
use mongodb::bson::{doc, oid::ObjectId, to_bson, DateTime as BsonDateTime, Document};
use mongodb::options::{FindOneAndUpdateOptions, FindOptions, ReturnDocument};
use mongodb::Database;
use serde_json::json;
use validator::Validate;

use crate::auth::AuthenticatedUser;
use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::models::{
    parse_object_id, CreateReviewRequest, FarmBrief, HelpfulRequest, MyReviewsResponse, OwnerReply,
    OwnerReplyRequest, Review, ReviewListQuery, ReviewListResponse, ReviewPagination, ReviewReply,
    ReviewResponse, ReviewSortBy, Role, UpdateReviewRequest, User, UserBrief,
};
use crate::services::rating;

const DEFAULT_PAGE_SIZE: i64 = 10;
const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Clone, Copy)]
struct PageWindow {
    page: u64,
    limit: i64,
}

impl PageWindow {
    fn skip(&self) -> u64 {
        (self.page - 1) * self.limit as u64
    }
}

/// Review listings tolerate sloppy paging input instead of rejecting it.
fn window(query: &ReviewListQuery) -> PageWindow {
    PageWindow {
        page: u64::from(query.page.unwrap_or(1).max(1)),
        limit: i64::from(query.limit.unwrap_or(DEFAULT_PAGE_SIZE as u32)).clamp(1, MAX_PAGE_SIZE),
    }
}

fn paginate(total: u64, page: u64, limit: i64) -> ReviewPagination {
    let limit = limit.max(1) as u64;
    let total_pages = (total + limit - 1) / limit;
    ReviewPagination {
        current_page: page,
        total_pages,
        total_reviews: total,
        has_next: page < total_pages,
        has_prev: page > 1,
    }
}

fn sort_for(sort_by: ReviewSortBy) -> Document {
    match sort_by {
        ReviewSortBy::Newest => doc! { "createdAt": -1 },
        ReviewSortBy::Oldest => doc! { "createdAt": 1 },
        ReviewSortBy::RatingHigh => doc! { "rating": -1, "createdAt": -1 },
        ReviewSortBy::RatingLow => doc! { "rating": 1, "createdAt": -1 },
        // Votes live in an array, so ordering by their count would need an
        // aggregation; the listing falls back to newest-first.
        ReviewSortBy::Helpful => doc! { "createdAt": -1 },
    }
}

fn user_brief(user: &User) -> UserBrief {
    UserBrief {
        id: user.id.map(|id| id.to_hex()).unwrap_or_default(),
        name: user.name.clone(),
    }
}

fn brief_for(users: &HashMap<ObjectId, User>, id: &ObjectId) -> UserBrief {
    users
        .get(id)
        .map(user_brief)
        .unwrap_or_else(|| UserBrief { id: id.to_hex(), name: String::new() })
}

/// Buyer plus any response author, for batch user resolution.
fn participant_ids(reviews: &[Review]) -> Vec<ObjectId> {
    let mut ids = Vec::new();
    for review in reviews {
        ids.push(review.buyer);
        if let Some(reply) = &review.response {
            ids.push(reply.responder);
        }
    }
    ids
}

fn review_response(
    mut review: Review,
    farm: Option<FarmBrief>,
    users: &HashMap<ObjectId, User>,
) -> ReviewResponse {
    let helpful_count = review.helpful_count();
    let overall_rating = review.overall_rating();
    let response = review.response.take().map(|reply| ReviewReply {
        responder: users.get(&reply.responder).map(user_brief),
        text: reply.text,
        responded_at: reply.responded_at,
    });
    ReviewResponse {
        id: review.id.map(|id| id.to_hex()).unwrap_or_default(),
        farm,
        buyer: brief_for(users, &review.buyer),
        rating: review.rating,
        comment: review.comment,
        aspects: review.aspects,
        is_verified: review.is_verified,
        helpful_count,
        overall_rating,
        response,
        created_at: review.created_at,
        updated_at: review.updated_at,
    }
}

#[utoipa::path(
    get,
    path = "/api/reviews/farm/{farm_id}",
    params(
        ("farm_id" = String, Path, description = "Farm id"),
        ("page" = Option<u32>, Query, description = "Page number (default: 1)"),
        ("limit" = Option<u32>, Query, description = "Reviews per page (default: 10)"),
        ("sortBy" = Option<String>, Query, description = "newest | oldest | rating_high | rating_low | helpful")
    ),
    responses(
        (status = 200, description = "Reviews with pagination and rating statistics", body = ReviewListResponse),
        (status = 400, description = "Malformed farm id")
    ),
    tag = "reviews"
)]
pub async fn farm_reviews(
    path: web::Path<String>,
    query: web::Query<ReviewListQuery>,
    db: web::Data<Database>,
) -> ApiResult<HttpResponse> {
    let farm_id = parse_object_id(&path, "farm")?;
    let window = window(&query);

    let filter = doc! { "farm": farm_id, "isActive": true };
    let options = FindOptions::builder()
        .sort(sort_for(query.sort_by.unwrap_or_default()))
        .skip(window.skip())
        .limit(window.limit)
        .build();
    let mut cursor = db::reviews(&db).find(filter.clone(), options).await?;
    let mut page = Vec::new();
    while cursor.advance().await? {
        page.push(cursor.deserialize_current()?);
    }

    let total = db::reviews(&db).count_documents(filter, None).await?;
    let users = db::users_by_ids(&db, participant_ids(&page)).await?;
    let statistics = rating::farm_review_stats(&db, &farm_id).await?;

    let reviews: Vec<ReviewResponse> =
        page.into_iter().map(|review| review_response(review, None, &users)).collect();
    Ok(HttpResponse::Ok().json(ReviewListResponse {
        reviews,
        pagination: paginate(total, window.page, window.limit),
        statistics,
    }))
}

#[utoipa::path(
    get,
    path = "/api/reviews/my-reviews",
    params(
        ("page" = Option<u32>, Query, description = "Page number (default: 1)"),
        ("limit" = Option<u32>, Query, description = "Reviews per page (default: 10)")
    ),
    responses(
        (status = 200, description = "The caller's reviews, newest first", body = MyReviewsResponse),
        (status = 403, description = "Caller is not a buyer")
    ),
    security(("bearer_auth" = [])),
    tag = "reviews"
)]
pub async fn my_reviews(
    query: web::Query<ReviewListQuery>,
    user: AuthenticatedUser,
    db: web::Data<Database>,
) -> ApiResult<HttpResponse> {
    user.require_role(&[Role::Buyer])?;
    let window = window(&query);

    let filter = doc! { "buyer": user.id, "isActive": true };
    let options = FindOptions::builder()
        .sort(doc! { "createdAt": -1 })
        .skip(window.skip())
        .limit(window.limit)
        .build();
    let mut cursor = db::reviews(&db).find(filter.clone(), options).await?;
    let mut page = Vec::new();
    while cursor.advance().await? {
        page.push(cursor.deserialize_current()?);
    }

    let total = db::reviews(&db).count_documents(filter, None).await?;
    let farms = db::farms_by_ids(&db, page.iter().map(|review| review.farm).collect()).await?;
    let users = db::users_by_ids(&db, participant_ids(&page)).await?;

    let reviews: Vec<ReviewResponse> = page
        .into_iter()
        .map(|review| {
            // A farm that has been deleted since leaves the brief empty.
            let farm = farms.get(&review.farm).map(|farm| FarmBrief {
                id: review.farm.to_hex(),
                name: farm.name.clone(),
                images: Some(farm.images.clone()),
                location: Some(farm.location.clone()),
            });
            review_response(review, farm, &users)
        })
        .collect();
    Ok(HttpResponse::Ok().json(MyReviewsResponse {
        reviews,
        pagination: paginate(total, window.page, window.limit),
    }))
}

#[utoipa::path(
    post,
    path = "/api/reviews",
    request_body = CreateReviewRequest,
    responses(
        (status = 201, description = "Review created and farm rating recomputed", body = ReviewResponse),
        (status = 400, description = "Validation failed or farm already reviewed"),
        (status = 403, description = "Caller is not a buyer"),
        (status = 404, description = "Unknown farm")
    ),
    security(("bearer_auth" = [])),
    tag = "reviews"
)]
pub async fn create_review(
    body: web::Json<CreateReviewRequest>,
    user: AuthenticatedUser,
    db: web::Data<Database>,
) -> ApiResult<HttpResponse> {
    user.require_role(&[Role::Buyer])?;
    let body = body.into_inner();
    body.validate()?;

    let farm_id = parse_object_id(&body.farm, "farm")?;
    let farm = db::find_farm(&db, &farm_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Farm not found"))?;

    let existing =
        db::reviews(&db).find_one(doc! { "buyer": user.id, "farm": farm_id }, None).await?;
    if existing.is_some() {
        return Err(ApiError::conflict("You have already reviewed this farm"));
    }

    let now = Utc::now();
    let mut review = Review {
        id: None,
        farm: farm_id,
        buyer: user.id,
        rating: body.rating,
        comment: body.comment.map(|c| c.trim().to_string()).filter(|c| !c.is_empty()),
        aspects: body.aspects,
        is_verified: false,
        helpful: Vec::new(),
        response: None,
        is_active: true,
        created_at: now,
        updated_at: now,
    };
    let inserted = match db::reviews(&db).insert_one(&review, None).await {
        Ok(inserted) => inserted,
        // Two submissions can pass the lookup at once; the unique
        // (farm, buyer) index settles it.
        Err(err) if db::is_duplicate_key_error(&err) => {
            return Err(ApiError::conflict("You have already reviewed this farm"))
        }
        Err(err) => return Err(err.into()),
    };
    review.id = inserted.inserted_id.as_object_id();

    rating::recompute_farm_rating(&db, &farm_id).await?;

    let farm_brief =
        Some(FarmBrief { id: farm_id.to_hex(), name: farm.name, images: None, location: None });
    let mut users = HashMap::new();
    users.insert(user.id, user.user);
    Ok(HttpResponse::Created().json(json!({
        "message": "Review created successfully",
        "review": review_response(review, farm_brief, &users),
    })))
}

#[utoipa::path(
    put,
    path = "/api/reviews/{id}",
    params(("id" = String, Path, description = "Review id")),
    request_body = UpdateReviewRequest,
    responses(
        (status = 200, description = "Review updated and farm rating recomputed", body = ReviewResponse),
        (status = 403, description = "Caller did not write this review"),
        (status = 404, description = "Unknown review")
    ),
    security(("bearer_auth" = [])),
    tag = "reviews"
)]
pub async fn update_review(
    path: web::Path<String>,
    body: web::Json<UpdateReviewRequest>,
    user: AuthenticatedUser,
    db: web::Data<Database>,
) -> ApiResult<HttpResponse> {
    user.require_role(&[Role::Buyer])?;
    let review_id = parse_object_id(&path, "review")?;
    let body = body.into_inner();
    body.validate()?;

    let review = db::find_review(&db, &review_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Review not found"))?;
    if review.buyer != user.id {
        return Err(ApiError::forbidden("Access denied. You can only update your own reviews."));
    }

    let mut set = Document::new();
    if let Some(rating) = body.rating {
        set.insert("rating", rating);
    }
    if let Some(comment) = &body.comment {
        set.insert("comment", comment.trim());
    }
    if let Some(aspects) = &body.aspects {
        set.insert("aspects", to_bson(aspects)?);
    }
    set.insert("updatedAt", BsonDateTime::from_chrono(Utc::now()));

    let options = FindOneAndUpdateOptions::builder()
        .return_document(ReturnDocument::After)
        .build();
    let updated = db::reviews(&db)
        .find_one_and_update(doc! { "_id": review_id }, doc! { "$set": set }, options)
        .await?
        .ok_or_else(|| ApiError::not_found("Review not found"))?;

    // A changed rating has to flow into the farm's aggregate.
    rating::recompute_farm_rating(&db, &updated.farm).await?;

    let farm_brief = db::find_farm(&db, &updated.farm).await?.map(|farm| FarmBrief {
        id: updated.farm.to_hex(),
        name: farm.name,
        images: None,
        location: None,
    });
    let mut users = HashMap::new();
    users.insert(user.id, user.user);
    Ok(HttpResponse::Ok().json(json!({
        "message": "Review updated successfully",
        "review": review_response(updated, farm_brief, &users),
    })))
}

#[utoipa::path(
    delete,
    path = "/api/reviews/{id}",
    params(("id" = String, Path, description = "Review id")),
    responses(
        (status = 200, description = "Review removed and farm rating recomputed"),
        (status = 403, description = "Caller did not write this review"),
        (status = 404, description = "Unknown review")
    ),
    security(("bearer_auth" = [])),
    tag = "reviews"
)]
pub async fn delete_review(
    path: web::Path<String>,
    user: AuthenticatedUser,
    db: web::Data<Database>,
) -> ApiResult<HttpResponse> {
    user.require_role(&[Role::Buyer])?;
    let review_id = parse_object_id(&path, "review")?;

    let review = db::find_review(&db, &review_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Review not found"))?;
    if review.buyer != user.id {
        return Err(ApiError::forbidden("Access denied. You can only delete your own reviews."));
    }

    db::reviews(&db).delete_one(doc! { "_id": review_id }, None).await?;
    rating::recompute_farm_rating(&db, &review.farm).await?;

    Ok(HttpResponse::Ok().json(json!({ "message": "Review deleted successfully" })))
}

#[utoipa::path(
    post,
    path = "/api/reviews/{id}/helpful",
    params(("id" = String, Path, description = "Review id")),
    request_body = HelpfulRequest,
    responses(
        (status = 200, description = "Vote recorded, returns the new helpful count"),
        (status = 404, description = "Unknown review")
    ),
    security(("bearer_auth" = [])),
    tag = "reviews"
)]
pub async fn mark_helpful(
    path: web::Path<String>,
    body: Option<web::Json<HelpfulRequest>>,
    user: AuthenticatedUser,
    db: web::Data<Database>,
) -> ApiResult<HttpResponse> {
    let review_id = parse_object_id(&path, "review")?;
    let is_helpful = body.and_then(|b| b.into_inner().is_helpful).unwrap_or(true);

    let mut review = db::find_review(&db, &review_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Review not found"))?;
    review.mark_helpful(user.id, is_helpful);

    db::reviews(&db)
        .update_one(
            doc! { "_id": review_id },
            doc! { "$set": {
                "helpful": to_bson(&review.helpful)?,
                "updatedAt": BsonDateTime::from_chrono(Utc::now()),
            } },
            None,
        )
        .await?;

    let message =
        if is_helpful { "Review marked as helpful" } else { "Review marked as not helpful" };
    Ok(HttpResponse::Ok().json(json!({
        "message": message,
        "helpfulCount": review.helpful_count(),
    })))
}

#[utoipa::path(
    post,
    path = "/api/reviews/{id}/response",
    params(("id" = String, Path, description = "Review id")),
    request_body = OwnerReplyRequest,
    responses(
        (status = 200, description = "Owner response stored on the review", body = ReviewResponse),
        (status = 400, description = "Empty response text"),
        (status = 403, description = "Caller does not own the reviewed farm"),
        (status = 404, description = "Unknown review")
    ),
    security(("bearer_auth" = [])),
    tag = "reviews"
)]
pub async fn respond_to_review(
    path: web::Path<String>,
    body: web::Json<OwnerReplyRequest>,
    user: AuthenticatedUser,
    db: web::Data<Database>,
) -> ApiResult<HttpResponse> {
    user.require_role(&[Role::Farmer])?;
    let review_id = parse_object_id(&path, "review")?;

    let text = body.text.trim().to_string();
    if text.is_empty() {
        return Err(ApiError::validation("Response text is required"));
    }

    let review = db::find_review(&db, &review_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Review not found"))?;
    let owns_farm = db::find_farm(&db, &review.farm)
        .await?
        .map(|farm| farm.owner == user.id)
        .unwrap_or(false);
    if !owns_farm {
        return Err(ApiError::forbidden(
            "Access denied. You can only respond to reviews of your farms.",
        ));
    }

    let reply = OwnerReply { text, responder: user.id, responded_at: Utc::now() };
    let options = FindOneAndUpdateOptions::builder()
        .return_document(ReturnDocument::After)
        .build();
    let updated = db::reviews(&db)
        .find_one_and_update(
            doc! { "_id": review_id },
            doc! { "$set": {
                "response": to_bson(&reply)?,
                "updatedAt": BsonDateTime::from_chrono(Utc::now()),
            } },
            options,
        )
        .await?
        .ok_or_else(|| ApiError::not_found("Review not found"))?;

    let users = db::users_by_ids(&db, participant_ids(std::slice::from_ref(&updated))).await?;
    Ok(HttpResponse::Ok().json(json!({
        "message": "Response added successfully",
        "review": review_response(updated, None, &users),
    })))
}
