use std::sync::{Arc, Mutex, OnceLock};

use async_trait::async_trait;
use sea_orm::ActiveValue::NotSet;
use sea_orm::{ActiveModelTrait, ConnectionTrait, EntityTrait, Set, Statement};
use uuid::Uuid;

use storefront_api::{
    db::{create_orm_conn, create_pool, run_migrations},
    dto::orders::{CreateOrderRequest, OrderItemInput, PayerInfo, PaymentConfirmation},
    entity::{
        categories::ActiveModel as CategoryActive, orders::Entity as Orders,
        products::ActiveModel as ProductActive, users::ActiveModel as UserActive,
    },
    error::AppError,
    middleware::auth::{AuthUser, Role},
    models::{PaymentMethod, ShippingAddress},
    payment::{PaymentError, PaymentGateway, VerifiedPayment},
    pricing::PricingConfig,
    services::{order_service, product_service, user_service},
    state::AppState,
};

/// Gateway double whose next verification outcome is set by the test.
struct StubGateway {
    next: Mutex<Result<VerifiedPayment, u16>>,
}

impl StubGateway {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            next: Mutex::new(Ok(VerifiedPayment {
                verified: true,
                amount: 0,
            })),
        })
    }

    fn respond(&self, verified: bool, amount: i64) {
        *self.next.lock().unwrap() = Ok(VerifiedPayment { verified, amount });
    }

    fn fail(&self, status: u16) {
        *self.next.lock().unwrap() = Err(status);
    }
}

#[async_trait]
impl PaymentGateway for StubGateway {
    async fn verify_transaction(
        &self,
        _transaction_id: &str,
    ) -> Result<VerifiedPayment, PaymentError> {
        self.next
            .lock()
            .unwrap()
            .clone()
            .map_err(PaymentError::Provider)
    }
}

// Both tests truncate the same tables; serialize them.
static DB_LOCK: OnceLock<tokio::sync::Mutex<()>> = OnceLock::new();

fn db_lock() -> &'static tokio::sync::Mutex<()> {
    DB_LOCK.get_or_init(|| tokio::sync::Mutex::new(()))
}

// Integration flow: user places an order priced from the catalog, confirms
// payment through the gateway, and an admin marks it delivered.
#[tokio::test]
async fn order_create_pay_and_deliver_flow() -> anyhow::Result<()> {
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

    let _guard = db_lock().lock().await;
    let gateway = StubGateway::new();
    let state = setup_state(&database_url, gateway.clone()).await?;

    let user_id = create_user(&state, "user", "user@example.com").await?;
    let admin_id = create_user(&state, "admin", "admin@example.com").await?;
    let product_id = create_product(&state, admin_id, 2_500).await?;

    let auth_user = AuthUser {
        user_id,
        role: Role::User,
    };
    let auth_admin = AuthUser {
        user_id: admin_id,
        role: Role::Admin,
    };

    // No orders yet; an empty history is still a success.
    let empty = order_service::list_user_orders(&state, &auth_user).await?;
    assert!(empty.success);
    assert!(empty.data.unwrap().items.is_empty());

    // 2 x $25.00 -> $50.00 items, $7.50 tax, $10.00 shipping.
    let created = order_service::create_order(
        &state,
        &auth_user,
        CreateOrderRequest {
            order_items: vec![OrderItemInput { product_id, qty: 2 }],
            shipping_address: address(),
            payment_method: PaymentMethod::Paypal,
        },
    )
    .await?;
    let order = created.data.unwrap().order;
    assert_eq!(order.items_price, 5_000);
    assert_eq!(order.tax_price, 750);
    assert_eq!(order.shipping_price, 1_000);
    assert_eq!(order.total_price, 6_750);
    assert!(!order.is_paid);

    // A stranger cannot read someone else's order.
    let stranger = AuthUser {
        user_id: Uuid::new_v4(),
        role: Role::User,
    };
    let err = order_service::get_order(&state, &stranger, order.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden));

    // Unverified transaction never marks the order paid.
    gateway.respond(false, 6_750);
    let err = order_service::mark_paid(&state, &auth_user, order.id, confirmation("TXN-1"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::PaymentNotVerified));

    // Provider outage is a distinct failure from a rejected payment.
    gateway.fail(500);
    let err = order_service::mark_paid(&state, &auth_user, order.id, confirmation("TXN-1"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::PaymentVerificationFailed(_)));

    // Amount must match the stored total exactly.
    gateway.respond(true, 6_749);
    let err = order_service::mark_paid(&state, &auth_user, order.id, confirmation("TXN-1"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::AmountMismatch));

    let unpaid = Orders::find_by_id(order.id)
        .one(&state.orm)
        .await?
        .unwrap();
    assert!(!unpaid.is_paid, "failed confirmations must not mark paid");

    // Exact amount succeeds.
    gateway.respond(true, 6_750);
    let paid = order_service::mark_paid(&state, &auth_user, order.id, confirmation("TXN-1"))
        .await?
        .data
        .unwrap()
        .order;
    assert!(paid.is_paid);
    assert!(paid.paid_at.is_some());
    let result = paid.payment_result.expect("payment result");
    assert_eq!(result.id, "TXN-1");
    assert_eq!(result.email_address, "payer@example.com");

    // Confirming again reuses the transaction id and is rejected.
    let err = order_service::mark_paid(&state, &auth_user, order.id, confirmation("TXN-1"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::DuplicateTransaction));

    // The same transaction cannot pay a different order either.
    let second = order_service::create_order(
        &state,
        &auth_user,
        CreateOrderRequest {
            order_items: vec![OrderItemInput { product_id, qty: 1 }],
            shipping_address: address(),
            payment_method: PaymentMethod::Paypal,
        },
    )
    .await?
    .data
    .unwrap()
    .order;
    gateway.respond(true, second.total_price);
    let err = order_service::mark_paid(&state, &auth_user, second.id, confirmation("TXN-1"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::DuplicateTransaction));

    // Delivery is admin-only.
    let err = order_service::mark_delivered(&state, &auth_user, order.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden));

    let delivered = order_service::mark_delivered(&state, &auth_admin, order.id)
        .await?
        .data
        .unwrap();
    assert!(delivered.is_delivered);
    assert!(delivered.delivered_at.is_some());

    // Admin sees both orders; the owner's detail view carries line items.
    let all = order_service::list_all_orders(&state, &auth_admin)
        .await?
        .data
        .unwrap();
    assert_eq!(all.items.len(), 2);

    let detail = order_service::get_order(&state, &auth_user, order.id)
        .await?
        .data
        .unwrap();
    assert_eq!(detail.user.email, "user@example.com");
    assert_eq!(detail.items.len(), 1);
    assert_eq!(detail.items[0].quantity, 2);
    assert_eq!(detail.items[0].price, 2_500);

    // A product with order lines and a user with orders are both referenced
    // rows; deleting them is a validation failure, not a server error.
    let err = product_service::delete_product(&state, &auth_admin, product_id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let err = user_service::delete_user(&state, &auth_admin, user_id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    // An unreferenced product still deletes cleanly.
    let unused = create_product(&state, user_id, 500).await?;
    let deleted = product_service::delete_product(&state, &auth_admin, unused).await?;
    assert!(deleted.success);

    Ok(())
}

// Two confirmations race past the replay check; the unique index on the
// stored transaction id must let exactly one commit and the loser must
// still surface as a duplicate, not a server error.
#[tokio::test]
async fn racing_confirmations_cannot_reuse_a_transaction() -> anyhow::Result<()> {
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

    let _guard = db_lock().lock().await;
    let gateway = StubGateway::new();
    let state = setup_state(&database_url, gateway.clone()).await?;

    let user_id = create_user(&state, "user", "racer@example.com").await?;
    let product_id = create_product(&state, user_id, 2_000).await?;
    let auth_user = AuthUser {
        user_id,
        role: Role::User,
    };

    // Two identical orders, so one stubbed amount matches both.
    let mut order_ids = Vec::new();
    for _ in 0..2 {
        let order = order_service::create_order(
            &state,
            &auth_user,
            CreateOrderRequest {
                order_items: vec![OrderItemInput { product_id, qty: 1 }],
                shipping_address: address(),
                payment_method: PaymentMethod::Paypal,
            },
        )
        .await?
        .data
        .unwrap()
        .order;
        gateway.respond(true, order.total_price);
        order_ids.push(order.id);
    }

    let (first, second) = tokio::join!(
        order_service::mark_paid(&state, &auth_user, order_ids[0], confirmation("TXN-RACE")),
        order_service::mark_paid(&state, &auth_user, order_ids[1], confirmation("TXN-RACE")),
    );

    let outcomes = [first, second];
    let wins = outcomes.iter().filter(|r| r.is_ok()).count();
    assert_eq!(wins, 1, "exactly one confirmation may claim the transaction");

    let loser = outcomes
        .into_iter()
        .find(|r| r.is_err())
        .unwrap()
        .unwrap_err();
    assert!(matches!(loser, AppError::DuplicateTransaction));

    Ok(())
}

#[tokio::test]
async fn order_rejects_unknown_product_and_bad_input() -> anyhow::Result<()> {
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

    let _guard = db_lock().lock().await;
    let gateway = StubGateway::new();
    let state = setup_state(&database_url, gateway).await?;

    let user_id = create_user(&state, "user", "user2@example.com").await?;
    let product_id = create_product(&state, user_id, 1_000).await?;
    let auth_user = AuthUser {
        user_id,
        role: Role::User,
    };

    // Unknown product fails before anything is written.
    let err = order_service::create_order(
        &state,
        &auth_user,
        CreateOrderRequest {
            order_items: vec![OrderItemInput {
                product_id: Uuid::new_v4(),
                qty: 1,
            }],
            shipping_address: address(),
            payment_method: PaymentMethod::Card,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::NotFound));

    let err = order_service::create_order(
        &state,
        &auth_user,
        CreateOrderRequest {
            order_items: vec![],
            shipping_address: address(),
            payment_method: PaymentMethod::Card,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let err = order_service::create_order(
        &state,
        &auth_user,
        CreateOrderRequest {
            order_items: vec![OrderItemInput { product_id, qty: 0 }],
            shipping_address: address(),
            payment_method: PaymentMethod::Card,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let orders = order_service::list_user_orders(&state, &auth_user)
        .await?
        .data
        .unwrap();
    assert!(orders.items.is_empty(), "rejected orders must not persist");

    Ok(())
}

fn address() -> ShippingAddress {
    ShippingAddress {
        address: "1 Main St".into(),
        city: "Springfield".into(),
        postal_code: "12345".into(),
        country: "USA".into(),
    }
}

fn confirmation(txn_id: &str) -> PaymentConfirmation {
    PaymentConfirmation {
        id: txn_id.into(),
        status: "COMPLETED".into(),
        update_time: "2024-01-01T00:00:00Z".into(),
        payer: PayerInfo {
            email_address: "payer@example.com".into(),
        },
    }
}

async fn setup_state(database_url: &str, gateway: Arc<StubGateway>) -> anyhow::Result<AppState> {
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
        payments: gateway,
    })
}

async fn create_user(state: &AppState, role: &str, email: &str) -> anyhow::Result<Uuid> {
    let user = UserActive {
        id: Set(Uuid::new_v4()),
        name: Set("Test User".into()),
        email: Set(email.to_string()),
        password_hash: Set("dummy".into()),
        role: Set(role.into()),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    Ok(user.id)
}

async fn create_product(state: &AppState, owner_id: Uuid, price: i64) -> anyhow::Result<Uuid> {
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
        name: Set(format!("Test Widget {}", Uuid::new_v4())),
        brand: Set("Acme".into()),
        image: Set("/images/widget.jpg".into()),
        description: Set("A product for testing".into()),
        price: Set(price),
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
