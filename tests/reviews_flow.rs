use sea_orm::ActiveValue::NotSet;
use sea_orm::{ActiveModelTrait, ConnectionTrait, EntityTrait, Set, Statement};
use std::sync::Arc;
use uuid::Uuid;

use async_trait::async_trait;
use storefront_api::{
    db::{create_orm_conn, create_pool, run_migrations},
    dto::reviews::{CreateReviewRequest, UpdateReviewRequest},
    entity::{
        categories::ActiveModel as CategoryActive, products::Entity as Products,
        products::ActiveModel as ProductActive, users::ActiveModel as UserActive,
    },
    error::AppError,
    middleware::auth::{AuthUser, Role},
    payment::{PaymentError, PaymentGateway, VerifiedPayment},
    pricing::PricingConfig,
    services::review_service,
    state::AppState,
};

// Reviews never touch the payment gateway; this double only satisfies state
// construction.
struct NoPayments;

#[async_trait]
impl PaymentGateway for NoPayments {
    async fn verify_transaction(
        &self,
        _transaction_id: &str,
    ) -> Result<VerifiedPayment, PaymentError> {
        Err(PaymentError::Transport("unused in this test".into()))
    }
}

// Review flow: ratings blend on insert and update, and deletion recomputes a
// true mean over whatever remains.
#[tokio::test]
async fn review_aggregate_flow() -> anyhow::Result<()> {
    // Allow skipping when no DB is configured in the environment.
    let database_url = match std::env::var("TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
    {
        Ok(url) => url,
        Err(_) => {
            eprintln!(
                "Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration flow tests."
            );
            return Ok(());
        }
    };

    let state = setup_state(&database_url).await?;

    let alice = create_user(&state, "alice@example.com").await?;
    let bob = create_user(&state, "bob@example.com").await?;
    let product_id = create_product(&state, alice).await?;

    let auth_alice = AuthUser {
        user_id: alice,
        role: Role::User,
    };
    let auth_bob = AuthUser {
        user_id: bob,
        role: Role::User,
    };

    // First review seeds the aggregate directly.
    let first = review_service::create_review(
        &state,
        &auth_alice,
        CreateReviewRequest {
            product_id,
            rating: 4,
            comment: "Solid".into(),
        },
    )
    .await?
    .data
    .unwrap();
    assert_eq!(first.rating, 4);

    let product = fetch_product(&state, product_id).await?;
    assert_eq!(product.rating, 4.0);
    assert_eq!(product.num_reviews, 1);

    // Second reviewer blends with the aggregate: (4 + 2) / 2 = 3.00.
    let second = review_service::create_review(
        &state,
        &auth_bob,
        CreateReviewRequest {
            product_id,
            rating: 2,
            comment: "Meh".into(),
        },
    )
    .await?
    .data
    .unwrap();

    let product = fetch_product(&state, product_id).await?;
    assert_eq!(product.rating, 3.0);
    assert_eq!(product.num_reviews, 2);

    // One review per user per product.
    let err = review_service::create_review(
        &state,
        &auth_alice,
        CreateReviewRequest {
            product_id,
            rating: 5,
            comment: "Changed my mind".into(),
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    // Out-of-range rating is rejected before any write.
    let err = review_service::create_review(
        &state,
        &auth_bob,
        CreateReviewRequest {
            product_id,
            rating: 6,
            comment: "Too good".into(),
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    // Only the author (or an admin) may touch a review.
    let err = review_service::update_review(
        &state,
        &auth_alice,
        second.id,
        UpdateReviewRequest {
            rating: 5,
            comment: "Hijacked".into(),
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Forbidden));

    // Author update re-blends against the current aggregate: (3 + 5) / 2 = 4.00.
    review_service::update_review(
        &state,
        &auth_bob,
        second.id,
        UpdateReviewRequest {
            rating: 5,
            comment: "Grew on me".into(),
        },
    )
    .await?;

    let product = fetch_product(&state, product_id).await?;
    assert_eq!(product.rating, 4.0);
    assert_eq!(product.num_reviews, 2);

    // Deleting recomputes a true mean over the remaining reviews.
    review_service::delete_review(&state, &auth_bob, second.id).await?;
    let product = fetch_product(&state, product_id).await?;
    assert_eq!(product.rating, 4.0);
    assert_eq!(product.num_reviews, 1);

    // Removing the last review resets the aggregate to zero, not NaN.
    review_service::delete_review(&state, &auth_alice, first.id).await?;
    let product = fetch_product(&state, product_id).await?;
    assert_eq!(product.rating, 0.0);
    assert_eq!(product.num_reviews, 0);

    // Listing reviews for a product with none is still a success.
    let listed = review_service::list_product_reviews(&state, product_id).await?;
    assert!(listed.success);
    assert!(listed.data.unwrap().items.is_empty());

    Ok(())
}

async fn setup_state(database_url: &str) -> anyhow::Result<AppState> {
    let pool = create_pool(database_url).await?;
    let orm = create_orm_conn(database_url).await?;
    run_migrations(&orm).await?;

    // Clean tables between runs
    let backend = orm.get_database_backend();
    orm.execute(Statement::from_string(
        backend,
        "TRUNCATE TABLE order_items, orders, reviews, audit_logs, products, categories, users RESTART IDENTITY CASCADE",
    ))
    .await?;

    Ok(AppState {
        pool,
        orm,
        pricing: PricingConfig::default(),
        payments: Arc::new(NoPayments),
    })
}

async fn create_user(state: &AppState, email: &str) -> anyhow::Result<Uuid> {
    let user = UserActive {
        id: Set(Uuid::new_v4()),
        name: Set("Test Reviewer".into()),
        email: Set(email.to_string()),
        password_hash: Set("dummy".into()),
        role: Set("user".into()),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    Ok(user.id)
}

async fn create_product(state: &AppState, owner_id: Uuid) -> anyhow::Result<Uuid> {
    let category = CategoryActive {
        id: Set(Uuid::new_v4()),
        name: Set(format!("Category {}", Uuid::new_v4())),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    let product = ProductActive {
        id: Set(Uuid::new_v4()),
        category_id: Set(category.id),
        user_id: Set(owner_id),
        name: Set(format!("Reviewed Widget {}", Uuid::new_v4())),
        brand: Set("Acme".into()),
        image: Set("/images/widget.jpg".into()),
        description: Set("A product for testing".into()),
        price: Set(1_000),
        count_in_stock: Set(10),
        rating: Set(0.0),
        num_reviews: Set(0),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    Ok(product.id)
}

async fn fetch_product(
    state: &AppState,
    id: Uuid,
) -> anyhow::Result<storefront_api::entity::products::Model> {
    Ok(Products::find_by_id(id)
        .one(&state.orm)
        .await?
        .expect("product exists"))
}
