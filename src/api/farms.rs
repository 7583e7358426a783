use actix_multipart::Multipart;
use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use mongodb::bson::{doc, to_bson, DateTime as BsonDateTime, Document};
use mongodb::options::{FindOneAndUpdateOptions, FindOptions, ReturnDocument};
use mongodb::Database;
use serde_json::json;
use validator::Validate;

use crate::api::request_base;
use crate::auth::AuthenticatedUser;
use crate::config::Config;
use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::models::{
    parse_object_id, CreateFarmRequest, Farm, FarmFeature, FarmImage, FarmListQuery,
    FarmListResponse, FarmOwner, FarmResponse, FarmSearchResponse, RatingSummary, Role,
    SearchQuery, UpdateFarmRequest,
};
use crate::services::discovery::{self, FarmListParams};
use crate::services::uploads::{self, SavedFile, UploadForm, UploadKind};

#[utoipa::path(
    get,
    path = "/api/farms",
    params(
        ("page" = Option<u32>, Query, description = "Page number (default: 1)"),
        ("limit" = Option<u32>, Query, description = "Farms per page (default: 12, max: 100)"),
        ("search" = Option<String>, Query, description = "Substring match on name, description and location"),
        ("availability" = Option<String>, Query, description = "morning | evening | both"),
        ("minRating" = Option<f64>, Query, description = "Minimum average rating (0-5)"),
        ("features" = Option<String>, Query, description = "Comma separated feature slugs"),
        ("lat" = Option<f64>, Query, description = "Origin latitude for distance filter"),
        ("lng" = Option<f64>, Query, description = "Origin longitude for distance filter"),
        ("maxDistance" = Option<f64>, Query, description = "Radius in kilometers"),
        ("sortBy" = Option<String>, Query, description = "nearest | rating | price_low | price_high | newest")
    ),
    responses(
        (status = 200, description = "Page of active farms", body = FarmListResponse),
        (status = 400, description = "Malformed or out-of-range filter")
    ),
    tag = "farms"
)]
pub async fn list_farms(
    http_req: HttpRequest,
    query: web::Query<FarmListQuery>,
    user: Option<AuthenticatedUser>,
    db: web::Data<Database>,
) -> ApiResult<HttpResponse> {
    let params = FarmListParams::from_query(query.into_inner())?;

    let options = FindOptions::builder()
        .sort(discovery::sort(&params))
        .skip(params.skip())
        .limit(params.limit)
        .build();
    let mut cursor = db::farms(&db).find(discovery::page_filter(&params), options).await?;
    let mut page = Vec::new();
    while cursor.advance().await? {
        page.push(cursor.deserialize_current()?);
    }

    // `$near` is not allowed inside a count, so the total uses the
    // `$geoWithin` form of the same predicate.
    let total = db::farms(&db).count_documents(discovery::count_filter(&params), None).await?;

    let owners = db::users_by_ids(&db, page.iter().map(|farm| farm.owner).collect()).await?;
    let viewer = user.as_ref().map(|u| u.id);
    let base = request_base(&http_req);
    let farms: Vec<FarmResponse> = page
        .into_iter()
        .map(|farm| {
            let owner = owners
                .get(&farm.owner)
                .map(FarmOwner::public)
                .unwrap_or_else(|| FarmOwner::missing(farm.owner));
            discovery::farm_response(farm, owner, viewer.as_ref(), &base)
        })
        .collect();

    Ok(HttpResponse::Ok().json(FarmListResponse {
        farms,
        pagination: discovery::paginate(total, params.page, params.limit),
    }))
}

#[utoipa::path(
    get,
    path = "/api/farms/search",
    params(("q" = String, Query, description = "Search needle, at least 2 characters")),
    responses(
        (status = 200, description = "Top matches by rating", body = FarmSearchResponse),
        (status = 400, description = "Needle too short")
    ),
    tag = "farms"
)]
pub async fn search_farms(
    http_req: HttpRequest,
    query: web::Query<SearchQuery>,
    db: web::Data<Database>,
) -> ApiResult<HttpResponse> {
    let q = query.q.as_deref().map(str::trim).unwrap_or("");
    if q.chars().count() < 2 {
        return Err(ApiError::validation("Search query must be at least 2 characters long"));
    }

    let options = FindOptions::builder()
        .sort(doc! { "ratings.average": -1, "createdAt": -1 })
        .limit(discovery::SEARCH_LIMIT)
        .build();
    let mut cursor = db::farms(&db).find(discovery::search_filter(q), options).await?;
    let mut page = Vec::new();
    while cursor.advance().await? {
        page.push(cursor.deserialize_current()?);
    }

    let owners = db::users_by_ids(&db, page.iter().map(|farm| farm.owner).collect()).await?;
    let base = request_base(&http_req);
    let farms: Vec<FarmResponse> = page
        .into_iter()
        .map(|farm| {
            let owner = owners
                .get(&farm.owner)
                .map(FarmOwner::public)
                .unwrap_or_else(|| FarmOwner::missing(farm.owner));
            discovery::farm_response(farm, owner, None, &base)
        })
        .collect();

    let total = farms.len() as u64;
    Ok(HttpResponse::Ok().json(FarmSearchResponse { farms, total }))
}

#[utoipa::path(
    get,
    path = "/api/farms/my-farms",
    responses(
        (status = 200, description = "All farms owned by the caller", body = FarmSearchResponse),
        (status = 403, description = "Caller is not a farmer")
    ),
    security(("bearer_auth" = [])),
    tag = "farms"
)]
pub async fn my_farms(
    http_req: HttpRequest,
    user: AuthenticatedUser,
    db: web::Data<Database>,
) -> ApiResult<HttpResponse> {
    user.require_role(&[Role::Farmer])?;

    let options = FindOptions::builder().sort(doc! { "createdAt": -1 }).build();
    let mut cursor = db::farms(&db).find(doc! { "owner": user.id }, options).await?;
    let mut page = Vec::new();
    while cursor.advance().await? {
        page.push(cursor.deserialize_current()?);
    }

    let base = request_base(&http_req);
    let owner = FarmOwner::with_phone(&user.user);
    let farms: Vec<FarmResponse> = page
        .into_iter()
        .map(|farm| discovery::farm_response(farm, owner.clone(), Some(&user.id), &base))
        .collect();

    let total = farms.len() as u64;
    Ok(HttpResponse::Ok().json(FarmSearchResponse { farms, total }))
}

#[utoipa::path(
    get,
    path = "/api/farms/{id}",
    params(("id" = String, Path, description = "Farm id")),
    responses(
        (status = 200, description = "Farm detail", body = FarmResponse),
        (status = 404, description = "Unknown or inactive farm")
    ),
    tag = "farms"
)]
pub async fn get_farm(
    http_req: HttpRequest,
    path: web::Path<String>,
    user: Option<AuthenticatedUser>,
    db: web::Data<Database>,
) -> ApiResult<HttpResponse> {
    let farm_id = parse_object_id(&path, "farm")?;
    let farm = db::find_farm(&db, &farm_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Farm not found"))?;
    if !farm.is_active {
        return Err(ApiError::not_found("Farm is not available"));
    }

    // Count the visit; the response carries the pre-increment count.
    db::farms(&db)
        .update_one(doc! { "_id": farm_id }, doc! { "$inc": { "views": 1 } }, None)
        .await?;

    let owner = db::find_user(&db, &farm.owner).await?;
    let owner = owner
        .as_ref()
        .map(FarmOwner::with_phone)
        .unwrap_or_else(|| FarmOwner::missing(farm.owner));
    let viewer = user.as_ref().map(|u| u.id);
    Ok(HttpResponse::Ok().json(discovery::farm_response(
        farm,
        owner,
        viewer.as_ref(),
        &request_base(&http_req),
    )))
}

#[utoipa::path(
    post,
    path = "/api/farms",
    request_body(content = CreateFarmRequest, content_type = "multipart/form-data",
        description = "Form fields plus up to 5 `farmImages` files; `location`, `contact`, `availability` and `features` are JSON strings"),
    responses(
        (status = 201, description = "Farm created", body = FarmResponse),
        (status = 400, description = "Validation failed"),
        (status = 403, description = "Caller is not a farmer")
    ),
    security(("bearer_auth" = [])),
    tag = "farms"
)]
pub async fn create_farm(
    http_req: HttpRequest,
    payload: Multipart,
    user: AuthenticatedUser,
    db: web::Data<Database>,
    config: web::Data<Config>,
) -> ApiResult<HttpResponse> {
    user.require_role(&[Role::Farmer])?;

    let form = uploads::collect_form(payload, &config, UploadKind::FarmImages).await?;
    match insert_farm(&db, &user, &form, &http_req).await {
        Ok(response) => Ok(response),
        Err(err) => {
            // A rejected listing must not leave its images behind.
            uploads::cleanup_files(&form.files).await;
            Err(err)
        }
    }
}

async fn insert_farm(
    db: &Database,
    user: &AuthenticatedUser,
    form: &UploadForm,
    http_req: &HttpRequest,
) -> ApiResult<HttpResponse> {
    let parsed = parse_create_form(form)?;
    parsed.validate()?;

    let now = Utc::now();
    let mut farm = Farm {
        id: None,
        images: farm_images(&form.files, &parsed.name, 0),
        name: parsed.name,
        description: parsed.description,
        owner: user.id,
        location: parsed.location,
        availability: parsed.availability,
        price: parsed.price,
        contact: parsed.contact,
        features: parsed.features,
        capacity: None,
        ratings: RatingSummary::default(),
        is_verified: false,
        is_active: true,
        featured: false,
        views: 0,
        created_at: now,
        updated_at: now,
    };
    let inserted = db::farms(db).insert_one(&farm, None).await?;
    farm.id = inserted.inserted_id.as_object_id();

    let response = discovery::farm_response(
        farm,
        FarmOwner::with_phone(&user.user),
        Some(&user.id),
        &request_base(http_req),
    );
    Ok(HttpResponse::Created().json(json!({
        "message": "Farm created successfully",
        "farm": response,
    })))
}

#[utoipa::path(
    put,
    path = "/api/farms/{id}",
    params(("id" = String, Path, description = "Farm id")),
    request_body(content = UpdateFarmRequest, content_type = "multipart/form-data",
        description = "Only provided fields change; new `farmImages` files append to the existing gallery"),
    responses(
        (status = 200, description = "Farm updated", body = FarmResponse),
        (status = 403, description = "Caller does not own this farm"),
        (status = 404, description = "Unknown farm")
    ),
    security(("bearer_auth" = [])),
    tag = "farms"
)]
pub async fn update_farm(
    http_req: HttpRequest,
    path: web::Path<String>,
    payload: Multipart,
    user: AuthenticatedUser,
    db: web::Data<Database>,
    config: web::Data<Config>,
) -> ApiResult<HttpResponse> {
    user.require_role(&[Role::Farmer])?;

    let farm_id = parse_object_id(&path, "farm")?;
    let farm = db::find_farm(&db, &farm_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Farm not found"))?;
    if farm.owner != user.id {
        return Err(ApiError::forbidden("Access denied. You can only update your own farms."));
    }

    let form = uploads::collect_form(payload, &config, UploadKind::FarmImages).await?;
    match apply_farm_update(&db, farm, &form, &user, &http_req).await {
        Ok(response) => Ok(response),
        Err(err) => {
            uploads::cleanup_files(&form.files).await;
            Err(err)
        }
    }
}

async fn apply_farm_update(
    db: &Database,
    farm: Farm,
    form: &UploadForm,
    user: &AuthenticatedUser,
    http_req: &HttpRequest,
) -> ApiResult<HttpResponse> {
    let parsed = parse_update_form(form)?;
    parsed.validate()?;

    let mut set = Document::new();
    if let Some(name) = &parsed.name {
        set.insert("name", name);
    }
    if let Some(description) = &parsed.description {
        set.insert("description", description);
    }
    if let Some(price) = parsed.price {
        set.insert("price", price);
    }
    if let Some(location) = &parsed.location {
        set.insert("location", to_bson(location)?);
    }
    if let Some(contact) = &parsed.contact {
        set.insert("contact", to_bson(contact)?);
    }
    if let Some(availability) = &parsed.availability {
        set.insert("availability", to_bson(availability)?);
    }
    if let Some(features) = &parsed.features {
        set.insert("features", to_bson(features)?);
    }
    if !form.files.is_empty() {
        let alt_name = parsed.name.as_deref().unwrap_or(&farm.name);
        let mut images = farm.images.clone();
        images.extend(farm_images(&form.files, alt_name, images.len()));
        set.insert("images", to_bson(&images)?);
    }
    set.insert("updatedAt", BsonDateTime::from_chrono(Utc::now()));

    let farm_id = farm.id.ok_or_else(|| ApiError::internal("farm document missing id"))?;
    let options = FindOneAndUpdateOptions::builder()
        .return_document(ReturnDocument::After)
        .build();
    let updated = db::farms(db)
        .find_one_and_update(doc! { "_id": farm_id }, doc! { "$set": set }, options)
        .await?
        .ok_or_else(|| ApiError::not_found("Farm not found"))?;

    let response = discovery::farm_response(
        updated,
        FarmOwner::with_phone(&user.user),
        Some(&user.id),
        &request_base(http_req),
    );
    Ok(HttpResponse::Ok().json(json!({
        "message": "Farm updated successfully",
        "farm": response,
    })))
}

#[utoipa::path(
    delete,
    path = "/api/farms/{id}",
    params(("id" = String, Path, description = "Farm id")),
    responses(
        (status = 200, description = "Farm and its image files removed"),
        (status = 403, description = "Caller does not own this farm"),
        (status = 404, description = "Unknown farm")
    ),
    security(("bearer_auth" = [])),
    tag = "farms"
)]
pub async fn delete_farm(
    path: web::Path<String>,
    user: AuthenticatedUser,
    db: web::Data<Database>,
    config: web::Data<Config>,
) -> ApiResult<HttpResponse> {
    user.require_role(&[Role::Farmer])?;

    let farm_id = parse_object_id(&path, "farm")?;
    let farm = db::find_farm(&db, &farm_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Farm not found"))?;
    if farm.owner != user.id {
        return Err(ApiError::forbidden("Access denied. You can only delete your own farms."));
    }

    for image in &farm.images {
        if let Some(file) = uploads::stored_file_path(&config.uploads.dir, &image.url) {
            uploads::remove_file(&file).await;
        }
    }
    db::farms(&db).delete_one(doc! { "_id": farm_id }, None).await?;

    Ok(HttpResponse::Ok().json(json!({ "message": "Farm deleted successfully" })))
}

fn farm_images(files: &[SavedFile], farm_name: &str, existing: usize) -> Vec<FarmImage> {
    files
        .iter()
        .enumerate()
        .map(|(i, file)| FarmImage {
            url: file.url_path.clone(),
            alt: format!("{} - Image {}", farm_name, existing + i + 1),
            is_primary: existing == 0 && i == 0,
        })
        .collect()
}

fn parse_create_form(form: &UploadForm) -> ApiResult<CreateFarmRequest> {
    let name = form.field("name").unwrap_or("").trim().to_string();
    let description = form
        .field("description")
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty());
    let price = form
        .field("price")
        .ok_or_else(|| ApiError::validation("Price is required"))?
        .trim()
        .parse::<f64>()
        .map_err(|_| ApiError::validation("Price must be a number"))?;
    let location = form
        .json_field("location", "Invalid location data")?
        .ok_or_else(|| ApiError::validation("Location is required"))?;
    let contact = form
        .json_field("contact", "Invalid contact data")?
        .ok_or_else(|| ApiError::validation("Contact information is required"))?;
    let availability = form
        .json_field("availability", "Invalid availability data")?
        .ok_or_else(|| ApiError::validation("At least one availability option is required"))?;

    Ok(CreateFarmRequest {
        name,
        description,
        price,
        location,
        contact,
        availability,
        features: parse_features_field(form)?,
    })
}

fn parse_update_form(form: &UploadForm) -> ApiResult<UpdateFarmRequest> {
    let features = match form.field("features") {
        Some(_) => Some(parse_features_field(form)?),
        None => None,
    };
    Ok(UpdateFarmRequest {
        name: form.field("name").map(|n| n.trim().to_string()),
        description: form.field("description").map(|d| d.trim().to_string()),
        price: match form.field("price") {
            Some(raw) => Some(
                raw.trim()
                    .parse::<f64>()
                    .map_err(|_| ApiError::validation("Price must be a number"))?,
            ),
            None => None,
        },
        location: form.json_field("location", "Invalid location data")?,
        contact: form.json_field("contact", "Invalid contact data")?,
        availability: form.json_field("availability", "Invalid availability data")?,
        features,
    })
}

/// A features field that is not valid JSON falls back to the empty list; a
/// well-formed list with an unknown slug is still rejected.
fn parse_features_field(form: &UploadForm) -> ApiResult<Vec<FarmFeature>> {
    let raw = match form.field("features") {
        Some(raw) => raw,
        None => return Ok(Vec::new()),
    };
    match serde_json::from_str(raw) {
        Ok(features) => Ok(features),
        Err(err) if err.classify() == serde_json::error::Category::Data => {
            Err(ApiError::validation("Invalid feature data"))
        }
        Err(_) => Ok(Vec::new()),
    }
}
