use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::db::{Store, StoreError};
use crate::domain::{Identity, NewReview, Rating, Review};
use crate::error::AppError;
use crate::service::requests::owned_request;

pub struct ReviewService {
    store: Arc<dyn Store>,
}

impl ReviewService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Attach the one review a finished request may carry.
    ///
    /// The rating is checked before anything else, so an out-of-range value
    /// fails validation whatever state the request is in.
    pub async fn add(
        &self,
        identity: &Identity,
        request_id: i32,
        rating: i64,
        comments: Option<String>,
    ) -> Result<Review, AppError> {
        let rating = Rating::new(rating)?;
        let request = owned_request(self.store.as_ref(), identity, request_id).await?;

        if !request.status.is_finished() {
            return Err(AppError::Conflict(
                "Can only review completed or closed requests".to_string(),
            ));
        }
        if self.store.find_review(request_id).await?.is_some() {
            return Err(already_reviewed());
        }

        let review = self
            .store
            .create_review(NewReview {
                service_request_id: request_id,
                rating,
                comments,
                created_at: Utc::now().naive_utc(),
            })
            .await
            .map_err(|e| match e {
                // Lost the race against a concurrent submission.
                StoreError::Duplicate(_) => {
                    warn!(request_id, "Concurrent review rejected by unique constraint");
                    already_reviewed()
                }
                other => other.into(),
            })?;

        info!(request_id, rating = rating.value(), "Review added");
        Ok(review)
    }
}

fn already_reviewed() -> AppError {
    AppError::Conflict("A review already exists for this request".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::InMemoryStore;
    use crate::domain::RequestStatus;
    use crate::tests::support::{at, Marketplace};
    use rstest::rstest;

    async fn setup() -> (ReviewService, Marketplace) {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let market = Marketplace::seed(store.clone()).await;
        (ReviewService::new(store), market)
    }

    #[rstest]
    #[case(RequestStatus::Requested)]
    #[case(RequestStatus::Completed)]
    #[case(RequestStatus::Closed)]
    #[tokio::test]
    async fn out_of_range_rating_fails_in_any_state(#[case] status: RequestStatus) {
        let (reviews, market) = setup().await;
        let request = market.request_in(status, None, at(2024, 5, 2)).await;
        for rating in [0, 6] {
            assert!(matches!(
                reviews.add(&market.carol.identity, request.id, rating, None).await,
                Err(AppError::Validation(_))
            ));
        }
    }

    #[rstest]
    #[case(RequestStatus::Requested)]
    #[case(RequestStatus::Assigned)]
    #[case(RequestStatus::Accepted)]
    #[tokio::test]
    async fn unfinished_requests_cannot_be_reviewed(#[case] status: RequestStatus) {
        let (reviews, market) = setup().await;
        let request = market.request_in(status, None, at(2024, 5, 2)).await;
        assert!(matches!(
            reviews.add(&market.carol.identity, request.id, 4, None).await,
            Err(AppError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn one_review_per_request() {
        let (reviews, market) = setup().await;
        let request = market.request_in(RequestStatus::Completed, None, at(2024, 5, 2)).await;

        let review = reviews
            .add(&market.carol.identity, request.id, 5, Some("Spotless".into()))
            .await
            .expect("first review");
        assert_eq!(review.rating.value(), 5);

        let err = reviews
            .add(&market.carol.identity, request.id, 3, None)
            .await
            .expect_err("second review");
        assert!(matches!(err, AppError::Conflict(ref m) if m == "A review already exists for this request"));
    }

    #[tokio::test]
    async fn only_the_owner_reviews() {
        let (reviews, market) = setup().await;
        let request = market.request_in(RequestStatus::Closed, None, at(2024, 5, 2)).await;
        let dana = market.customer("dana").await;
        assert!(matches!(
            reviews.add(&dana.identity, request.id, 4, None).await,
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            reviews.add(&market.admin, request.id, 4, None).await,
            Err(AppError::Forbidden(_))
        ));
    }
}
