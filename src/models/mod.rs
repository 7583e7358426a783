pub mod farm;
pub mod review;
pub mod user;
pub mod wishlist;

pub use farm::*;
pub use review::*;
pub use user::*;
pub use wishlist::*;

use mongodb::bson::oid::ObjectId;

use crate::error::ApiError;

/// Parses a path/body identifier into an [`ObjectId`], rejecting malformed
/// values before any database round trip.
pub fn parse_object_id(raw: &str, what: &str) -> Result<ObjectId, ApiError> {
    ObjectId::parse_str(raw).map_err(|_| ApiError::validation(format!("Invalid {} ID", what)))
}
