use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use super::farm::{FarmImage, FarmLocation};
use super::user::default_true;

/// Per-aspect ratings a buyer may attach to a review.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, Validate, ToSchema)]
pub struct Aspects {
    #[validate(range(min = 1, max = 5, message = "Aspect ratings must be between 1 and 5"))]
    pub quality: Option<i32>,
    #[validate(range(min = 1, max = 5, message = "Aspect ratings must be between 1 and 5"))]
    pub service: Option<i32>,
    #[validate(range(min = 1, max = 5, message = "Aspect ratings must be between 1 and 5"))]
    pub value: Option<i32>,
    #[validate(range(min = 1, max = 5, message = "Aspect ratings must be between 1 and 5"))]
    pub cleanliness: Option<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelpfulVote {
    pub user: ObjectId,
    pub is_helpful: bool,
}

/// Farmer reply embedded in a review.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerReply {
    pub text: String,
    pub responder: ObjectId,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub responded_at: DateTime<Utc>,
}

/// Review document as stored in the `reviews` collection. One per
/// (farm, buyer) pair, enforced by a unique index.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub farm: ObjectId,
    pub buyer: ObjectId,
    pub rating: i32,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aspects: Option<Aspects>,
    #[serde(default)]
    pub is_verified: bool,
    #[serde(default)]
    pub helpful: Vec<HelpfulVote>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<OwnerReply>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl Review {
    pub fn helpful_count(&self) -> u64 {
        self.helpful.iter().filter(|v| v.is_helpful).count() as u64
    }

    /// Records or updates a single helpfulness vote per user.
    pub fn mark_helpful(&mut self, user: ObjectId, is_helpful: bool) {
        match self.helpful.iter_mut().find(|v| v.user == user) {
            Some(vote) => vote.is_helpful = is_helpful,
            None => self.helpful.push(HelpfulVote { user, is_helpful }),
        }
    }

    /// Mean of the aspect ratings rounded to one decimal, falling back to
    /// the main rating when no aspect was scored.
    pub fn overall_rating(&self) -> f64 {
        let aspects = match &self.aspects {
            Some(aspects) => aspects,
            None => return f64::from(self.rating),
        };
        let scored: Vec<i32> = [aspects.quality, aspects.service, aspects.value, aspects.cleanliness]
            .into_iter()
            .flatten()
            .collect();
        if scored.is_empty() {
            return f64::from(self.rating);
        }
        let sum: i32 = scored.iter().sum();
        let mean = f64::from(sum) / scored.len() as f64;
        (mean * 10.0).round() / 10.0
    }
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateReviewRequest {
    /// Hex id of the farm being reviewed.
    pub farm: String,
    #[validate(range(min = 1, max = 5, message = "Rating must be between 1 and 5"))]
    pub rating: i32,
    #[validate(length(max = 500, message = "Comment cannot exceed 500 characters"))]
    pub comment: Option<String>,
    #[validate]
    pub aspects: Option<Aspects>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateReviewRequest {
    #[validate(range(min = 1, max = 5, message = "Rating must be between 1 and 5"))]
    pub rating: Option<i32>,
    #[validate(length(max = 500, message = "Comment cannot exceed 500 characters"))]
    pub comment: Option<String>,
    #[validate]
    pub aspects: Option<Aspects>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HelpfulRequest {
    /// Defaults to a positive vote when omitted.
    pub is_helpful: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct OwnerReplyRequest {
    pub text: String,
}

/// Sort keys accepted by the review listing endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReviewSortBy {
    #[default]
    Newest,
    Oldest,
    RatingHigh,
    RatingLow,
    Helpful,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct ReviewListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub sort_by: Option<ReviewSortBy>,
}

/// Minimal populated user reference.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserBrief {
    pub id: String,
    pub name: String,
}

/// Populated farm reference. Listing endpoints only carry the name; the
/// my-reviews view also includes images and location for rendering cards.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FarmBrief {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<FarmImage>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<FarmLocation>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReviewReply {
    pub text: String,
    pub responder: Option<UserBrief>,
    pub responded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReviewResponse {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub farm: Option<FarmBrief>,
    pub buyer: UserBrief,
    pub rating: i32,
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aspects: Option<Aspects>,
    pub is_verified: bool,
    pub helpful_count: u64,
    pub overall_rating: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<ReviewReply>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Star histogram keyed by rating value, highest first on the wire.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, ToSchema)]
pub struct RatingDistribution {
    #[serde(rename = "5")]
    pub five: i64,
    #[serde(rename = "4")]
    pub four: i64,
    #[serde(rename = "3")]
    pub three: i64,
    #[serde(rename = "2")]
    pub two: i64,
    #[serde(rename = "1")]
    pub one: i64,
}

impl RatingDistribution {
    pub fn record(&mut self, rating: i32) {
        match rating {
            5 => self.five += 1,
            4 => self.four += 1,
            3 => self.three += 1,
            2 => self.two += 1,
            1 => self.one += 1,
            _ => {}
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReviewStatistics {
    pub average_rating: f64,
    pub total_reviews: i64,
    pub rating_distribution: RatingDistribution,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReviewPagination {
    pub current_page: u64,
    pub total_pages: u64,
    pub total_reviews: u64,
    pub has_next: bool,
    pub has_prev: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ReviewListResponse {
    pub reviews: Vec<ReviewResponse>,
    pub pagination: ReviewPagination,
    pub statistics: ReviewStatistics,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MyReviewsResponse {
    pub reviews: Vec<ReviewResponse>,
    pub pagination: ReviewPagination,
}
