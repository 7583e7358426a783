use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use super::user::{default_true, User};

/// Daily milking slots a farm sells into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Availability {
    Morning,
    Evening,
    Both,
}

impl Availability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Availability::Morning => "morning",
            Availability::Evening => "evening",
            Availability::Both => "both",
        }
    }
}

/// Closed set of searchable farm attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum FarmFeature {
    Organic,
    GrassFed,
    A2Milk,
    HomeDelivery,
    BulkOrders,
    Pasteurized,
    RawMilk,
    EcoFriendly,
}

impl FarmFeature {
    pub const ALL: [FarmFeature; 8] = [
        FarmFeature::Organic,
        FarmFeature::GrassFed,
        FarmFeature::A2Milk,
        FarmFeature::HomeDelivery,
        FarmFeature::BulkOrders,
        FarmFeature::Pasteurized,
        FarmFeature::RawMilk,
        FarmFeature::EcoFriendly,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FarmFeature::Organic => "organic",
            FarmFeature::GrassFed => "grass-fed",
            FarmFeature::A2Milk => "a2-milk",
            FarmFeature::HomeDelivery => "home-delivery",
            FarmFeature::BulkOrders => "bulk-orders",
            FarmFeature::Pasteurized => "pasteurized",
            FarmFeature::RawMilk => "raw-milk",
            FarmFeature::EcoFriendly => "eco-friendly",
        }
    }
}

/// Sort keys accepted by the farm listing endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FarmSortBy {
    Nearest,
    Rating,
    PriceLow,
    PriceHigh,
    #[default]
    Newest,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, Validate, ToSchema)]
pub struct Coordinates {
    // Longitude must stay the first field: the pair is stored as a MongoDB
    // legacy coordinate document, which reads fields in order as (x, y).
    #[validate(range(min = -180.0, max = 180.0, message = "Invalid longitude"))]
    pub lng: f64,
    #[validate(range(min = -90.0, max = 90.0, message = "Invalid latitude"))]
    pub lat: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FarmLocation {
    #[validate(length(min = 1, message = "Address is required"))]
    pub address: String,
    #[validate(length(min = 1, message = "City is required"))]
    pub city: String,
    #[validate(length(min = 1, message = "State is required"))]
    pub state: String,
    #[serde(default = "default_country")]
    pub country: String,
    #[serde(default)]
    pub pincode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate]
    pub coordinates: Option<Coordinates>,
}

fn default_country() -> String {
    "India".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContactInfo {
    #[validate(length(min = 1, message = "Phone number is required"))]
    pub phone: String,
    #[serde(default)]
    pub whatsapp: Option<String>,
    #[serde(default)]
    #[validate(email(message = "Please provide a valid email"))]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FarmImage {
    pub url: String,
    #[serde(default)]
    pub alt: String,
    #[serde(default)]
    pub is_primary: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Capacity {
    #[serde(default)]
    pub daily_production: Option<f64>,
    #[serde(default)]
    pub available_quantity: Option<f64>,
}

/// Denormalized review aggregate kept on each farm.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RatingSummary {
    #[serde(default)]
    pub average: f64,
    #[serde(default)]
    pub count: i64,
}

/// Farm document as stored in the `farms` collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Farm {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub owner: ObjectId,
    pub location: FarmLocation,
    #[serde(default)]
    pub images: Vec<FarmImage>,
    pub availability: Vec<Availability>,
    pub price: f64,
    pub contact: ContactInfo,
    #[serde(default)]
    pub features: Vec<FarmFeature>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<Capacity>,
    #[serde(default)]
    pub ratings: RatingSummary,
    #[serde(default)]
    pub is_verified: bool,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub featured: bool,
    #[serde(default)]
    pub views: i64,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

/// Fields a farmer supplies when listing a farm. Assembled from multipart
/// form fields, so nested values arrive as JSON strings and get decoded
/// before this struct is validated as a whole.
#[derive(Debug, Clone, Validate, ToSchema)]
pub struct CreateFarmRequest {
    #[validate(length(min = 2, max = 100, message = "Farm name must be between 2 and 100 characters"))]
    pub name: String,
    #[validate(length(max = 1000, message = "Description cannot exceed 1000 characters"))]
    pub description: Option<String>,
    #[validate(range(min = 1.0, max = 1000.0, message = "Price must be between ₹1 and ₹1000"))]
    pub price: f64,
    #[validate]
    pub location: FarmLocation,
    #[validate]
    pub contact: ContactInfo,
    #[validate(length(min = 1, message = "At least one availability option is required"))]
    pub availability: Vec<Availability>,
    pub features: Vec<FarmFeature>,
}

/// Partial update for an existing farm. Only the provided fields change.
#[derive(Debug, Clone, Default, Validate, ToSchema)]
pub struct UpdateFarmRequest {
    #[validate(length(min = 2, max = 100, message = "Farm name must be between 2 and 100 characters"))]
    pub name: Option<String>,
    #[validate(length(max = 1000, message = "Description cannot exceed 1000 characters"))]
    pub description: Option<String>,
    #[validate(range(min = 1.0, max = 1000.0, message = "Price must be between ₹1 and ₹1000"))]
    pub price: Option<f64>,
    #[validate]
    pub location: Option<FarmLocation>,
    #[validate]
    pub contact: Option<ContactInfo>,
    #[validate(length(min = 1, message = "At least one availability option is required"))]
    pub availability: Option<Vec<Availability>>,
    pub features: Option<Vec<FarmFeature>>,
}

/// Query string accepted by `GET /api/farms`.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct FarmListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub search: Option<String>,
    pub availability: Option<Availability>,
    pub min_rating: Option<f64>,
    /// Kilometers from (lat, lng).
    pub max_distance: Option<f64>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub sort_by: Option<FarmSortBy>,
    /// Comma separated list of feature slugs.
    pub features: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct SearchQuery {
    pub q: Option<String>,
}

/// Owner summary embedded in farm responses.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FarmOwner {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl FarmOwner {
    /// Listing view: name and email only.
    pub fn public(user: &User) -> Self {
        FarmOwner {
            id: user.id.map(|id| id.to_hex()).unwrap_or_default(),
            name: user.name.clone(),
            email: user.email.clone(),
            phone: None,
        }
    }

    /// Detail view, which also exposes the owner's phone number.
    pub fn with_phone(user: &User) -> Self {
        FarmOwner { phone: user.phone.clone(), ..FarmOwner::public(user) }
    }

    /// Placeholder for farms whose owner account no longer resolves.
    pub fn missing(id: ObjectId) -> Self {
        FarmOwner { id: id.to_hex(), name: String::new(), email: String::new(), phone: None }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FarmResponse {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub owner: FarmOwner,
    pub location: FarmLocation,
    pub images: Vec<FarmImage>,
    pub availability: Vec<Availability>,
    pub price: f64,
    pub contact: ContactInfo,
    pub features: Vec<FarmFeature>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<Capacity>,
    pub ratings: RatingSummary,
    pub is_verified: bool,
    pub is_active: bool,
    pub featured: bool,
    pub views: i64,
    pub can_edit: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FarmPagination {
    pub current_page: u64,
    pub total_pages: u64,
    pub total_farms: u64,
    pub has_next: bool,
    pub has_prev: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct FarmListResponse {
    pub farms: Vec<FarmResponse>,
    pub pagination: FarmPagination,
}

/// Flat farm collection with a count, used by search and my-farms.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct FarmSearchResponse {
    pub farms: Vec<FarmResponse>,
    pub total: u64,
}
