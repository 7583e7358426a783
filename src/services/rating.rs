use log::debug;
use mongodb::bson::{doc, oid::ObjectId};
use mongodb::error::Error;
use mongodb::Database;

use crate::db;
use crate::models::{RatingDistribution, RatingSummary, ReviewStatistics};

/// Mean of the given ratings rounded to one decimal place, with the count.
/// An empty slice yields the zero summary.
pub fn summarize(ratings: &[i32]) -> RatingSummary {
    if ratings.is_empty() {
        return RatingSummary::default();
    }
    let sum: i64 = ratings.iter().map(|r| i64::from(*r)).sum();
    let average = sum as f64 / ratings.len() as f64;
    RatingSummary {
        average: (average * 10.0).round() / 10.0,
        count: ratings.len() as i64,
    }
}

async fn active_ratings(db: &Database, farm_id: &ObjectId) -> Result<Vec<i32>, Error> {
    let mut cursor = db::reviews(db)
        .find(doc! { "farm": farm_id, "isActive": true }, None)
        .await?;
    let mut ratings = Vec::new();
    while cursor.advance().await? {
        let review = cursor.deserialize_current()?;
        ratings.push(review.rating);
    }
    Ok(ratings)
}

/// Rebuilds a farm's denormalized rating from its active reviews. Runs after
/// every review write; a farm that has since disappeared is skipped quietly.
pub async fn recompute_farm_rating(db: &Database, farm_id: &ObjectId) -> Result<(), Error> {
    let summary = summarize(&active_ratings(db, farm_id).await?);
    let result = db::farms(db)
        .update_one(
            doc! { "_id": farm_id },
            doc! { "$set": {
                "ratings.average": summary.average,
                "ratings.count": summary.count,
            } },
            None,
        )
        .await?;
    if result.matched_count == 0 {
        debug!("rating recompute skipped, farm {} no longer exists", farm_id);
    }
    Ok(())
}

/// Aggregate shown alongside a farm's review page: average, total and the
/// star histogram, all over active reviews only.
pub async fn farm_review_stats(db: &Database, farm_id: &ObjectId) -> Result<ReviewStatistics, Error> {
    let ratings = active_ratings(db, farm_id).await?;
    let summary = summarize(&ratings);
    let mut distribution = RatingDistribution::default();
    for rating in &ratings {
        distribution.record(*rating);
    }
    Ok(ReviewStatistics {
        average_rating: summary.average,
        total_reviews: summary.count,
        rating_distribution: distribution,
    })
}
