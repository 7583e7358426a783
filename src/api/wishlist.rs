use actix_web::{web, HttpRequest, HttpResponse};
use chrono::{Duration, Utc};
use mongodb::bson::{doc, oid::ObjectId, to_bson, DateTime as BsonDateTime};
use mongodb::Database;
use serde_json::json;
use validator::Validate;

use crate::api::request_base;
use crate::auth::AuthenticatedUser;
use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::models::{
    parse_object_id, AddWishlistRequest, FarmOwner, Role, UpdateNotesRequest, Wishlist,
    WishlistCheckResponse, WishlistEntry, WishlistEntryResponse, WishlistResponse,
    WishlistStatsResponse,
};
use crate::services::discovery;

/// Loads the buyer's wishlist, creating an empty one on first touch. An
/// insert race against a parallel request resolves through the unique
/// index on `buyer`.
async fn find_or_create(db: &Database, buyer: ObjectId) -> ApiResult<Wishlist> {
    if let Some(wishlist) = db::wishlists(db).find_one(doc! { "buyer": buyer }, None).await? {
        return Ok(wishlist);
    }

    let now = Utc::now();
    let mut wishlist =
        Wishlist { id: None, buyer, farms: Vec::new(), created_at: now, updated_at: now };
    match db::wishlists(db).insert_one(&wishlist, None).await {
        Ok(inserted) => {
            wishlist.id = inserted.inserted_id.as_object_id();
            Ok(wishlist)
        }
        Err(err) if db::is_duplicate_key_error(&err) => db::wishlists(db)
            .find_one(doc! { "buyer": buyer }, None)
            .await?
            .ok_or_else(|| ApiError::internal("wishlist missing after duplicate-key insert")),
        Err(err) => Err(err.into()),
    }
}

fn wishlist_doc_id(wishlist: &Wishlist) -> ApiResult<ObjectId> {
    wishlist.id.ok_or_else(|| ApiError::internal("wishlist document missing id"))
}

/// Resolves the farms behind a wishlist for the response. Entries whose farm
/// was deleted or deactivated since are dropped and also written back, so
/// the stored list never accumulates dead references.
async fn populate(
    db: &Database,
    mut wishlist: Wishlist,
    viewer: &ObjectId,
    base_url: &str,
) -> ApiResult<WishlistResponse> {
    let farms = db::farms_by_ids(db, wishlist.farms.iter().map(|e| e.farm).collect()).await?;

    let before = wishlist.farms.len();
    wishlist
        .farms
        .retain(|entry| farms.get(&entry.farm).map(|farm| farm.is_active).unwrap_or(false));
    if wishlist.farms.len() != before {
        wishlist.updated_at = Utc::now();
        db::wishlists(db)
            .update_one(
                doc! { "_id": wishlist_doc_id(&wishlist)? },
                doc! { "$set": {
                    "farms": to_bson(&wishlist.farms)?,
                    "updatedAt": BsonDateTime::from_chrono(wishlist.updated_at),
                } },
                None,
            )
            .await?;
    }

    let owner_ids = wishlist
        .farms
        .iter()
        .filter_map(|entry| farms.get(&entry.farm))
        .map(|farm| farm.owner)
        .collect();
    let owners = db::users_by_ids(db, owner_ids).await?;

    let entries: Vec<WishlistEntryResponse> = wishlist
        .farms
        .into_iter()
        .filter_map(|entry| {
            let farm = farms.get(&entry.farm)?.clone();
            let owner = owners
                .get(&farm.owner)
                .map(FarmOwner::public)
                .unwrap_or_else(|| FarmOwner::missing(farm.owner));
            Some(WishlistEntryResponse {
                farm: discovery::farm_response(farm, owner, Some(viewer), base_url),
                added_at: entry.added_at,
                notes: entry.notes,
            })
        })
        .collect();

    Ok(WishlistResponse {
        id: wishlist.id.map(|id| id.to_hex()).unwrap_or_default(),
        buyer: wishlist.buyer.to_hex(),
        total_farms: entries.len() as u64,
        farms: entries,
        created_at: wishlist.created_at,
        updated_at: wishlist.updated_at,
    })
}

#[utoipa::path(
    get,
    path = "/api/wishlist",
    responses(
        (status = 200, description = "The caller's wishlist with populated farms", body = WishlistResponse),
        (status = 403, description = "Caller is not a buyer")
    ),
    security(("bearer_auth" = [])),
    tag = "wishlist"
)]
pub async fn get_wishlist(
    http_req: HttpRequest,
    user: AuthenticatedUser,
    db: web::Data<Database>,
) -> ApiResult<HttpResponse> {
    user.require_role(&[Role::Buyer])?;

    let wishlist = find_or_create(&db, user.id).await?;
    let response = populate(&db, wishlist, &user.id, &request_base(&http_req)).await?;
    Ok(HttpResponse::Ok().json(json!({ "wishlist": response })))
}

#[utoipa::path(
    post,
    path = "/api/wishlist",
    request_body = AddWishlistRequest,
    responses(
        (status = 201, description = "Farm added", body = WishlistResponse),
        (status = 400, description = "Missing farm id or farm already saved"),
        (status = 403, description = "Caller is not a buyer"),
        (status = 404, description = "Farm unknown or inactive")
    ),
    security(("bearer_auth" = [])),
    tag = "wishlist"
)]
pub async fn add_to_wishlist(
    http_req: HttpRequest,
    body: web::Json<AddWishlistRequest>,
    user: AuthenticatedUser,
    db: web::Data<Database>,
) -> ApiResult<HttpResponse> {
    user.require_role(&[Role::Buyer])?;
    let body = body.into_inner();
    body.validate()?;

    let raw_id = body
        .farm_id
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ApiError::validation("Farm ID is required"))?;
    let farm_id = parse_object_id(raw_id, "farm")?;

    let active = db::find_farm(&db, &farm_id)
        .await?
        .map(|farm| farm.is_active)
        .unwrap_or(false);
    if !active {
        return Err(ApiError::not_found("Farm not found or not available"));
    }

    let mut wishlist = find_or_create(&db, user.id).await?;
    if wishlist.has_farm(&farm_id) {
        return Err(ApiError::conflict("Farm is already in your wishlist"));
    }

    let entry = WishlistEntry {
        farm: farm_id,
        added_at: Utc::now(),
        notes: body.notes.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()),
    };
    db::wishlists(&db)
        .update_one(
            doc! { "_id": wishlist_doc_id(&wishlist)? },
            doc! {
                "$push": { "farms": to_bson(&entry)? },
                "$set": { "updatedAt": BsonDateTime::from_chrono(entry.added_at) },
            },
            None,
        )
        .await?;
    wishlist.updated_at = entry.added_at;
    wishlist.farms.push(entry);

    let response = populate(&db, wishlist, &user.id, &request_base(&http_req)).await?;
    Ok(HttpResponse::Created().json(json!({
        "message": "Farm added to wishlist successfully",
        "wishlist": response,
    })))
}

#[utoipa::path(
    delete,
    path = "/api/wishlist/{farm_id}",
    params(("farm_id" = String, Path, description = "Farm id")),
    responses(
        (status = 200, description = "Farm removed"),
        (status = 403, description = "Caller is not a buyer"),
        (status = 404, description = "Farm not in the wishlist")
    ),
    security(("bearer_auth" = [])),
    tag = "wishlist"
)]
pub async fn remove_from_wishlist(
    path: web::Path<String>,
    user: AuthenticatedUser,
    db: web::Data<Database>,
) -> ApiResult<HttpResponse> {
    user.require_role(&[Role::Buyer])?;
    let farm_id = parse_object_id(&path, "farm")?;

    let wishlist = find_or_create(&db, user.id).await?;
    if !wishlist.has_farm(&farm_id) {
        return Err(ApiError::not_found("Farm not found in wishlist"));
    }

    db::wishlists(&db)
        .update_one(
            doc! { "_id": wishlist_doc_id(&wishlist)? },
            doc! {
                "$pull": { "farms": { "farm": farm_id } },
                "$set": { "updatedAt": BsonDateTime::from_chrono(Utc::now()) },
            },
            None,
        )
        .await?;

    Ok(HttpResponse::Ok().json(json!({ "message": "Farm removed from wishlist successfully" })))
}

#[utoipa::path(
    put,
    path = "/api/wishlist/{farm_id}/notes",
    params(("farm_id" = String, Path, description = "Farm id")),
    request_body = UpdateNotesRequest,
    responses(
        (status = 200, description = "Notes replaced"),
        (status = 400, description = "Notes too long"),
        (status = 403, description = "Caller is not a buyer"),
        (status = 404, description = "Farm not in the wishlist")
    ),
    security(("bearer_auth" = [])),
    tag = "wishlist"
)]
pub async fn update_notes(
    path: web::Path<String>,
    body: web::Json<UpdateNotesRequest>,
    user: AuthenticatedUser,
    db: web::Data<Database>,
) -> ApiResult<HttpResponse> {
    user.require_role(&[Role::Buyer])?;
    let farm_id = parse_object_id(&path, "farm")?;
    let body = body.into_inner();
    body.validate()?;

    let wishlist = find_or_create(&db, user.id).await?;
    if !wishlist.has_farm(&farm_id) {
        return Err(ApiError::not_found("Farm not found in wishlist"));
    }

    let notes = body.notes.unwrap_or_default();
    db::wishlists(&db)
        .update_one(
            doc! { "_id": wishlist_doc_id(&wishlist)?, "farms.farm": farm_id },
            doc! { "$set": {
                "farms.$.notes": notes.trim(),
                "updatedAt": BsonDateTime::from_chrono(Utc::now()),
            } },
            None,
        )
        .await?;

    Ok(HttpResponse::Ok().json(json!({ "message": "Notes updated successfully" })))
}

#[utoipa::path(
    get,
    path = "/api/wishlist/check/{farm_id}",
    params(("farm_id" = String, Path, description = "Farm id")),
    responses(
        (status = 200, description = "Whether the farm is saved", body = WishlistCheckResponse),
        (status = 403, description = "Caller is not a buyer")
    ),
    security(("bearer_auth" = [])),
    tag = "wishlist"
)]
pub async fn check_wishlist(
    path: web::Path<String>,
    user: AuthenticatedUser,
    db: web::Data<Database>,
) -> ApiResult<HttpResponse> {
    user.require_role(&[Role::Buyer])?;
    let farm_id = parse_object_id(&path, "farm")?;

    // Checking must not create a wishlist as a side effect.
    let wishlist = db::wishlists(&db).find_one(doc! { "buyer": user.id }, None).await?;
    let is_in_wishlist = wishlist.map(|w| w.has_farm(&farm_id)).unwrap_or(false);

    Ok(HttpResponse::Ok().json(WishlistCheckResponse { is_in_wishlist, farm_id: farm_id.to_hex() }))
}

#[utoipa::path(
    get,
    path = "/api/wishlist/stats",
    responses(
        (status = 200, description = "Wishlist size, recent additions and mean farm rating", body = WishlistStatsResponse),
        (status = 403, description = "Caller is not a buyer")
    ),
    security(("bearer_auth" = [])),
    tag = "wishlist"
)]
pub async fn wishlist_stats(
    user: AuthenticatedUser,
    db: web::Data<Database>,
) -> ApiResult<HttpResponse> {
    user.require_role(&[Role::Buyer])?;

    let wishlist = match db::wishlists(&db).find_one(doc! { "buyer": user.id }, None).await? {
        Some(wishlist) => wishlist,
        None => {
            return Ok(HttpResponse::Ok().json(WishlistStatsResponse {
                total_farms: 0,
                recently_added: 0,
                average_rating: 0.0,
            }))
        }
    };

    let farms = db::farms_by_ids(&db, wishlist.farms.iter().map(|e| e.farm).collect()).await?;
    let week_ago = Utc::now() - Duration::days(7);

    let mut total = 0u64;
    let mut recent = 0u64;
    let mut rating_sum = 0.0;
    for entry in &wishlist.farms {
        let farm = match farms.get(&entry.farm) {
            Some(farm) if farm.is_active => farm,
            _ => continue,
        };
        total += 1;
        if entry.added_at >= week_ago {
            recent += 1;
        }
        rating_sum += farm.ratings.average;
    }
    let average_rating =
        if total > 0 { ((rating_sum / total as f64) * 10.0).round() / 10.0 } else { 0.0 };

    Ok(HttpResponse::Ok().json(WishlistStatsResponse {
        total_farms: total,
        recently_added: recent,
        average_rating,
    }))
}
