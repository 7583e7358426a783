use mongodb::bson::{doc, oid::ObjectId, Bson, Document, Regex};
use serde_json::Value;

use crate::error::{ApiError, ApiResult};
use crate::models::{
    Availability, Farm, FarmFeature, FarmListQuery, FarmOwner, FarmPagination, FarmResponse,
    FarmSortBy,
};
use crate::services::uploads;

/// Mean Earth radius used to turn kilometers into `$centerSphere` radians.
const EARTH_RADIUS_KM: f64 = 6378.1;

pub const DEFAULT_PAGE_SIZE: i64 = 12;
pub const MAX_PAGE_SIZE: i64 = 100;
pub const SEARCH_LIMIT: i64 = 20;

/// Radius constraint around an origin point. Only applied when the client
/// sends all three of lat, lng and maxDistance.
#[derive(Debug, Clone, Copy)]
pub struct GeoFilter {
    pub lat: f64,
    pub lng: f64,
    pub max_distance_km: f64,
}

/// Listing parameters after validation of the raw query string.
#[derive(Debug, Clone)]
pub struct FarmListParams {
    pub page: u64,
    pub limit: i64,
    pub search: Option<String>,
    pub availability: Option<Availability>,
    pub min_rating: Option<f64>,
    pub features: Vec<FarmFeature>,
    pub geo: Option<GeoFilter>,
    pub sort_by: FarmSortBy,
}

impl FarmListParams {
    pub fn from_query(query: FarmListQuery) -> ApiResult<Self> {
        let page = match query.page {
            Some(0) => return Err(ApiError::validation("Page must be a positive integer")),
            Some(page) => u64::from(page),
            None => 1,
        };
        let limit = match query.limit {
            Some(limit) if !(1..=MAX_PAGE_SIZE as u32).contains(&limit) => {
                return Err(ApiError::validation("Limit must be between 1 and 100"))
            }
            Some(limit) => i64::from(limit),
            None => DEFAULT_PAGE_SIZE,
        };
        if let Some(rating) = query.min_rating {
            if !(0.0..=5.0).contains(&rating) {
                return Err(ApiError::validation("Rating must be between 0 and 5"));
            }
        }

        let geo = match (query.lat, query.lng, query.max_distance) {
            (Some(lat), Some(lng), Some(max_distance_km)) => {
                if !(-90.0..=90.0).contains(&lat) {
                    return Err(ApiError::validation("Invalid latitude"));
                }
                if !(-180.0..=180.0).contains(&lng) {
                    return Err(ApiError::validation("Invalid longitude"));
                }
                if max_distance_km <= 0.0 {
                    return Err(ApiError::validation("Max distance must be a positive number"));
                }
                Some(GeoFilter { lat, lng, max_distance_km })
            }
            _ => None,
        };

        Ok(FarmListParams {
            page,
            limit,
            search: query.search.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()),
            availability: query.availability,
            min_rating: query.min_rating,
            features: parse_features(query.features.as_deref())?,
            geo,
            sort_by: query.sort_by.unwrap_or_default(),
        })
    }

    pub fn skip(&self) -> u64 {
        (self.page - 1) * self.limit as u64
    }
}

fn parse_features(raw: Option<&str>) -> ApiResult<Vec<FarmFeature>> {
    let raw = match raw {
        Some(raw) => raw,
        None => return Ok(Vec::new()),
    };
    let mut features = Vec::new();
    for slug in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let feature = serde_json::from_value(Value::String(slug.to_string()))
            .map_err(|_| ApiError::validation(format!("Invalid feature: {}", slug)))?;
        features.push(feature);
    }
    Ok(features)
}

/// Escapes regex metacharacters so a search needle always means a literal
/// substring match.
fn regex_escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(
            c,
            '.' | '^' | '$' | '*' | '+' | '?' | '(' | ')' | '[' | ']' | '{' | '}' | '|' | '\\' | '/'
        ) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn needle(input: &str) -> Bson {
    Bson::RegularExpression(Regex { pattern: regex_escape(input), options: "i".to_string() })
}

fn text_clauses(regex: &Bson, fields: &[&str]) -> Vec<Document> {
    fields
        .iter()
        .map(|field| {
            let mut clause = Document::new();
            clause.insert(*field, regex.clone());
            clause
        })
        .collect()
}

fn base_filter(params: &FarmListParams) -> Document {
    let mut filter = doc! { "isActive": true };
    if let Some(search) = &params.search {
        let regex = needle(search);
        filter.insert(
            "$or",
            text_clauses(
                &regex,
                &["name", "description", "location.address", "location.city", "location.state"],
            ),
        );
    }
    if let Some(availability) = params.availability {
        filter.insert("availability", doc! { "$in": [availability.as_str()] });
    }
    if let Some(min_rating) = params.min_rating {
        filter.insert("ratings.average", doc! { "$gte": min_rating });
    }
    if !params.features.is_empty() {
        let slugs: Vec<&str> = params.features.iter().map(FarmFeature::as_str).collect();
        filter.insert("features", doc! { "$in": slugs });
    }
    filter
}

/// Filter for the page query. With a geo constraint this uses `$near`, so
/// the server returns matches ordered by distance.
pub fn page_filter(params: &FarmListParams) -> Document {
    let mut filter = base_filter(params);
    if let Some(geo) = params.geo {
        filter.insert(
            "location.coordinates",
            doc! {
                "$near": {
                    "$geometry": { "type": "Point", "coordinates": [geo.lng, geo.lat] },
                    "$maxDistance": geo.max_distance_km * 1000.0,
                }
            },
        );
    }
    filter
}

/// Same predicate with `$geoWithin` standing in for `$near`, which the
/// server rejects inside count queries. `$centerSphere` takes radians.
pub fn count_filter(params: &FarmListParams) -> Document {
    let mut filter = base_filter(params);
    if let Some(geo) = params.geo {
        filter.insert(
            "location.coordinates",
            doc! {
                "$geoWithin": {
                    "$centerSphere": [[geo.lng, geo.lat], geo.max_distance_km / EARTH_RADIUS_KM]
                }
            },
        );
    }
    filter
}

/// Sort for the page query. `None` when `$near` distance ordering should
/// stand; an explicit sort would override it server-side.
pub fn sort(params: &FarmListParams) -> Option<Document> {
    if params.geo.is_some() {
        return None;
    }
    Some(match params.sort_by {
        FarmSortBy::Rating => doc! { "ratings.average": -1, "ratings.count": -1 },
        FarmSortBy::PriceLow => doc! { "price": 1 },
        FarmSortBy::PriceHigh => doc! { "price": -1 },
        FarmSortBy::Nearest | FarmSortBy::Newest => doc! { "createdAt": -1 },
    })
}

/// Filter for the quick search box: active farms matching the needle on
/// name, description, city or state.
pub fn search_filter(q: &str) -> Document {
    let regex = needle(q);
    doc! {
        "isActive": true,
        "$or": text_clauses(&regex, &["name", "description", "location.city", "location.state"]),
    }
}

pub fn paginate(total: u64, page: u64, limit: i64) -> FarmPagination {
    let limit = limit.max(1) as u64;
    let total_pages = (total + limit - 1) / limit;
    FarmPagination {
        current_page: page,
        total_pages,
        total_farms: total,
        has_next: page < total_pages,
        has_prev: page > 1,
    }
}

/// Wire view of a farm: absolute image URLs, populated owner, and whether
/// the viewer may edit it.
pub fn farm_response(
    farm: Farm,
    owner: FarmOwner,
    viewer: Option<&ObjectId>,
    base_url: &str,
) -> FarmResponse {
    let can_edit = viewer.map_or(false, |viewer| *viewer == farm.owner);
    let images = farm
        .images
        .into_iter()
        .map(|mut image| {
            image.url = uploads::absolute_url(base_url, &image.url);
            image
        })
        .collect();

    FarmResponse {
        id: farm.id.map(|id| id.to_hex()).unwrap_or_default(),
        name: farm.name,
        description: farm.description,
        owner,
        location: farm.location,
        images,
        availability: farm.availability,
        price: farm.price,
        contact: farm.contact,
        features: farm.features,
        capacity: farm.capacity,
        ratings: farm.ratings,
        is_verified: farm.is_verified,
        is_active: farm.is_active,
        featured: farm.featured,
        views: farm.views,
        can_edit,
        created_at: farm.created_at,
        updated_at: farm.updated_at,
    }
}
