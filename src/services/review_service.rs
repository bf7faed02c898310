use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::LockType;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, ModelTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit::{AuditAction, log_audit},
    dto::reviews::{CreateReviewRequest, ReviewList, ReviewView, UpdateReviewRequest},
    entity::{
        products::{ActiveModel as ProductActive, Entity as Products},
        reviews::{
            ActiveModel as ReviewActive, Column as ReviewCol, Entity as Reviews,
            Model as ReviewModel,
        },
        users::Entity as Users,
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin, ensure_owner_or_admin},
    models::Review,
    response::{ApiResponse, Meta},
    state::AppState,
};

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Aggregate update applied on review insertion and update.
///
/// Note: this blends the new rating with the current aggregate instead of
/// recomputing a mean, so the aggregate drifts toward recent ratings as
/// reviews accumulate. Deletion recomputes a true mean. The mismatch ships
/// as-is until product signs off on recomputing stored ratings.
fn blended_rating(current: f64, new_rating: i32) -> f64 {
    if current == 0.0 {
        f64::from(new_rating)
    } else {
        round2((current + f64::from(new_rating)) / 2.0)
    }
}

/// True arithmetic mean, used on the deletion path only. Zero when no
/// reviews remain.
fn mean_rating(ratings: &[i32]) -> f64 {
    if ratings.is_empty() {
        return 0.0;
    }
    let sum: i32 = ratings.iter().sum();
    f64::from(sum) / ratings.len() as f64
}

fn validate_review_input(rating: i32, comment: &str) -> AppResult<()> {
    if !(0..=5).contains(&rating) {
        return Err(AppError::Validation("Rating must be between 0 and 5".into()));
    }
    if comment.trim().is_empty() {
        return Err(AppError::Validation("Comment must not be empty".into()));
    }
    Ok(())
}

pub async fn create_review(
    state: &AppState,
    user: &AuthUser,
    payload: CreateReviewRequest,
) -> AppResult<ApiResponse<Review>> {
    validate_review_input(payload.rating, &payload.comment)?;

    let txn = state.orm.begin().await?;

    let product = Products::find_by_id(payload.product_id)
        .lock(LockType::Update)
        .one(&txn)
        .await?;
    let product = match product {
        Some(p) => p,
        None => return Err(AppError::NotFound),
    };

    // One review per (user, product), enforced here rather than by a
    // uniqueness constraint.
    let already_reviewed = Reviews::find()
        .filter(
            Condition::all()
                .add(ReviewCol::UserId.eq(user.user_id))
                .add(ReviewCol::ProductId.eq(product.id)),
        )
        .count(&txn)
        .await?;
    if already_reviewed > 0 {
        return Err(AppError::Validation(
            "You have already reviewed this product".into(),
        ));
    }

    let review = ReviewActive {
        id: Set(Uuid::new_v4()),
        user_id: Set(user.user_id),
        product_id: Set(product.id),
        rating: Set(payload.rating),
        comment: Set(payload.comment.trim().to_string()),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&txn)
    .await?;

    let new_rating = blended_rating(product.rating, review.rating);
    let new_count = product.num_reviews + 1;
    let mut active: ProductActive = product.into();
    active.rating = Set(new_rating);
    active.num_reviews = Set(new_count);
    active.updated_at = Set(Utc::now().into());
    active.update(&txn).await?;

    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        AuditAction::ReviewCreate,
        Some(serde_json::json!({ "review_id": review.id, "product_id": review.product_id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Review created",
        review_from_entity(review),
        Some(Meta::empty()),
    ))
}

pub async fn update_review(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateReviewRequest,
) -> AppResult<ApiResponse<Review>> {
    validate_review_input(payload.rating, &payload.comment)?;

    let txn = state.orm.begin().await?;

    let review = Reviews::find_by_id(id).one(&txn).await?;
    let review = match review {
        Some(r) => r,
        None => return Err(AppError::NotFound),
    };
    ensure_owner_or_admin(user, review.user_id)?;

    let product = Products::find_by_id(review.product_id)
        .lock(LockType::Update)
        .one(&txn)
        .await?;
    let product = match product {
        Some(p) => p,
        None => return Err(AppError::NotFound),
    };

    let mut active: ReviewActive = review.into();
    active.rating = Set(payload.rating);
    active.comment = Set(payload.comment.trim().to_string());
    active.updated_at = Set(Utc::now().into());
    let review = active.update(&txn).await?;

    // Same blend as insertion, applied against the current aggregate.
    let new_rating = blended_rating(product.rating, review.rating);
    let mut active: ProductActive = product.into();
    active.rating = Set(new_rating);
    active.updated_at = Set(Utc::now().into());
    active.update(&txn).await?;

    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        AuditAction::ReviewUpdate,
        Some(serde_json::json!({ "review_id": review.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Review updated",
        review_from_entity(review),
        Some(Meta::empty()),
    ))
}

pub async fn delete_review(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let txn = state.orm.begin().await?;

    let review = Reviews::find_by_id(id).one(&txn).await?;
    let review = match review {
        Some(r) => r,
        None => return Err(AppError::NotFound),
    };
    ensure_owner_or_admin(user, review.user_id)?;

    let product = Products::find_by_id(review.product_id)
        .lock(LockType::Update)
        .one(&txn)
        .await?;
    let product = match product {
        Some(p) => p,
        None => return Err(AppError::NotFound),
    };

    let review_id = review.id;
    review.delete(&txn).await?;

    let remaining: Vec<i32> = Reviews::find()
        .filter(ReviewCol::ProductId.eq(product.id))
        .all(&txn)
        .await?
        .into_iter()
        .map(|r| r.rating)
        .collect();

    let mut active: ProductActive = product.into();
    active.rating = Set(mean_rating(&remaining));
    active.num_reviews = Set(remaining.len() as i32);
    active.updated_at = Set(Utc::now().into());
    active.update(&txn).await?;

    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        AuditAction::ReviewDelete,
        Some(serde_json::json!({ "review_id": review_id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Review deleted",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

pub async fn get_review(state: &AppState, id: Uuid) -> AppResult<ApiResponse<ReviewView>> {
    let result = Reviews::find_by_id(id)
        .find_also_related(Users)
        .one(&state.orm)
        .await?;
    let (review, author) = match result {
        Some(pair) => pair,
        None => return Err(AppError::NotFound),
    };

    Ok(ApiResponse::success(
        "Review",
        review_view(review, author),
        Some(Meta::empty()),
    ))
}

pub async fn list_product_reviews(
    state: &AppState,
    product_id: Uuid,
) -> AppResult<ApiResponse<ReviewList>> {
    let rows = Reviews::find()
        .filter(ReviewCol::ProductId.eq(product_id))
        .order_by_desc(ReviewCol::CreatedAt)
        .find_also_related(Users)
        .all(&state.orm)
        .await?;

    let items = rows
        .into_iter()
        .map(|(review, author)| review_view(review, author))
        .collect();
    Ok(ApiResponse::success(
        "Reviews",
        ReviewList { items },
        Some(Meta::empty()),
    ))
}

pub async fn list_all_reviews(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<ReviewList>> {
    ensure_admin(user)?;

    let rows = Reviews::find()
        .order_by_desc(ReviewCol::CreatedAt)
        .find_also_related(Users)
        .all(&state.orm)
        .await?;

    let items = rows
        .into_iter()
        .map(|(review, author)| review_view(review, author))
        .collect();
    Ok(ApiResponse::success(
        "Reviews",
        ReviewList { items },
        Some(Meta::empty()),
    ))
}

fn review_from_entity(model: ReviewModel) -> Review {
    Review {
        id: model.id,
        user_id: model.user_id,
        product_id: model.product_id,
        rating: model.rating,
        comment: model.comment,
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    }
}

pub(crate) fn review_view(
    review: ReviewModel,
    author: Option<crate::entity::users::Model>,
) -> ReviewView {
    let (user_name, user_email) = author
        .map(|u| (u.name, u.email))
        .unwrap_or_default();
    ReviewView {
        id: review.id,
        product_id: review.product_id,
        user_id: review.user_id,
        user_name,
        user_email,
        rating: review.rating,
        comment: review.comment,
        created_at: review.created_at.with_timezone(&Utc),
        updated_at: review.updated_at.with_timezone(&Utc),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_review_sets_the_aggregate() {
        assert_eq!(blended_rating(0.0, 4), 4.0);
    }

    #[test]
    fn later_reviews_blend_with_the_aggregate() {
        // Not a true mean: (4 + 2) / 2 = 3.00 regardless of review count.
        assert_eq!(blended_rating(4.0, 2), 3.0);
        assert_eq!(blended_rating(3.0, 4), 3.5);
        assert_eq!(blended_rating(3.33, 5), 4.17);
    }

    #[test]
    fn deletion_mean_handles_empty_set() {
        assert_eq!(mean_rating(&[]), 0.0);
        assert!(mean_rating(&[]).is_finite());
    }

    #[test]
    fn deletion_mean_is_a_true_mean() {
        assert_eq!(mean_rating(&[4]), 4.0);
        assert_eq!(mean_rating(&[5, 4, 3]), 4.0);
        assert_eq!(mean_rating(&[5, 2]), 3.5);
    }

    #[test]
    fn review_input_validation() {
        assert!(validate_review_input(0, "fine").is_ok());
        assert!(validate_review_input(5, "great").is_ok());
        assert!(validate_review_input(6, "too high").is_err());
        assert!(validate_review_input(-1, "too low").is_err());
        assert!(validate_review_input(3, "   ").is_err());
    }
}
