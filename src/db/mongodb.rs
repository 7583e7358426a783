use std::collections::HashMap;

use mongodb::bson::{doc, oid::ObjectId};
use mongodb::error::{Error, ErrorKind, WriteFailure};
use mongodb::options::IndexOptions;
use mongodb::{Client, Collection, Database, IndexModel};

use crate::config::Config;
use crate::models::{Farm, Review, User, Wishlist};

pub const USERS: &str = "users";
pub const FARMS: &str = "farms";
pub const REVIEWS: &str = "reviews";
pub const WISHLISTS: &str = "wishlists";

pub async fn create_mongodb_client(config: &Config) -> Result<Database, anyhow::Error> {
    let client = Client::with_uri_str(&config.mongodb.uri).await?;
    let db = client.database(&config.mongodb.database);
    Ok(db)
}

pub fn users(db: &Database) -> Collection<User> {
    db.collection(USERS)
}

pub fn farms(db: &Database) -> Collection<Farm> {
    db.collection(FARMS)
}

pub fn reviews(db: &Database) -> Collection<Review> {
    db.collection(REVIEWS)
}

pub fn wishlists(db: &Database) -> Collection<Wishlist> {
    db.collection(WISHLISTS)
}

/// Creates the indexes the query paths rely on. Safe to run on every boot,
/// existing indexes are left untouched.
pub async fn ensure_indexes(db: &Database) -> Result<(), Error> {
    let unique = || IndexOptions::builder().unique(true).build();

    users(db)
        .create_index(
            IndexModel::builder().keys(doc! { "email": 1 }).options(unique()).build(),
            None,
        )
        .await?;

    farms(db)
        .create_indexes(
            vec![
                IndexModel::builder().keys(doc! { "location.coordinates": "2dsphere" }).build(),
                IndexModel::builder().keys(doc! { "owner": 1 }).build(),
                IndexModel::builder().keys(doc! { "isActive": 1, "createdAt": -1 }).build(),
                IndexModel::builder().keys(doc! { "ratings.average": -1 }).build(),
                IndexModel::builder().keys(doc! { "price": 1 }).build(),
            ],
            None,
        )
        .await?;

    reviews(db)
        .create_indexes(
            vec![
                IndexModel::builder()
                    .keys(doc! { "farm": 1, "buyer": 1 })
                    .options(unique())
                    .build(),
                IndexModel::builder().keys(doc! { "farm": 1, "isActive": 1, "createdAt": -1 }).build(),
                IndexModel::builder().keys(doc! { "buyer": 1 }).build(),
            ],
            None,
        )
        .await?;

    wishlists(db)
        .create_index(
            IndexModel::builder().keys(doc! { "buyer": 1 }).options(unique()).build(),
            None,
        )
        .await?;

    Ok(())
}

/// True when the server refused a write because of a unique index collision.
pub fn is_duplicate_key_error(err: &Error) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write_err)) => write_err.code == 11000,
        ErrorKind::Command(command_err) => command_err.code == 11000,
        _ => false,
    }
}

pub async fn find_user(db: &Database, id: &ObjectId) -> Result<Option<User>, Error> {
    users(db).find_one(doc! { "_id": id }, None).await
}

pub async fn find_farm(db: &Database, id: &ObjectId) -> Result<Option<Farm>, Error> {
    farms(db).find_one(doc! { "_id": id }, None).await
}

pub async fn find_review(db: &Database, id: &ObjectId) -> Result<Option<Review>, Error> {
    reviews(db).find_one(doc! { "_id": id }, None).await
}

/// Batch-fetches users by id. Ids that no longer resolve are simply absent
/// from the map.
pub async fn users_by_ids(
    db: &Database,
    mut ids: Vec<ObjectId>,
) -> Result<HashMap<ObjectId, User>, Error> {
    ids.sort_unstable();
    ids.dedup();
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let mut found = HashMap::new();
    let mut cursor = users(db).find(doc! { "_id": { "$in": ids } }, None).await?;
    while cursor.advance().await? {
        let user = cursor.deserialize_current()?;
        if let Some(id) = user.id {
            found.insert(id, user);
        }
    }
    Ok(found)
}

pub async fn farms_by_ids(
    db: &Database,
    mut ids: Vec<ObjectId>,
) -> Result<HashMap<ObjectId, Farm>, Error> {
    ids.sort_unstable();
    ids.dedup();
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let mut found = HashMap::new();
    let mut cursor = farms(db).find(doc! { "_id": { "$in": ids } }, None).await?;
    while cursor.advance().await? {
        let farm = cursor.deserialize_current()?;
        if let Some(id) = farm.id {
            found.insert(id, farm);
        }
    }
    Ok(found)
}
