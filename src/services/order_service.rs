use std::collections::HashMap;

use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::LockType;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, SqlErr, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit::{AuditAction, log_audit},
    dto::orders::{
        CreateOrderRequest, OrderCustomer, OrderDetail, OrderItemView, OrderList, OrderWithItems,
        PaymentConfirmation,
    },
    entity::{
        order_items::{
            ActiveModel as OrderItemActive, Column as OrderItemCol, Entity as OrderItems,
            Model as OrderItemModel,
        },
        orders::{
            ActiveModel as OrderActive, Column as OrderCol, Entity as Orders, Model as OrderModel,
        },
        products::{Column as ProdCol, Entity as Products},
        users::Entity as Users,
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin, ensure_owner_or_admin},
    models::{Order, OrderItem, PaymentMethod, PaymentResult, ShippingAddress},
    pricing::{self, PricedItem},
    response::{ApiResponse, Meta},
    state::AppState,
};

pub async fn create_order(
    state: &AppState,
    user: &AuthUser,
    payload: CreateOrderRequest,
) -> AppResult<ApiResponse<OrderWithItems>> {
    if payload.order_items.is_empty() {
        return Err(AppError::Validation("Please enter all order details".into()));
    }
    validate_address(&payload.shipping_address)?;
    for item in &payload.order_items {
        if item.qty < 1 {
            return Err(AppError::Validation("Quantity must be at least 1".into()));
        }
    }

    let product_ids: Vec<Uuid> = payload.order_items.iter().map(|i| i.product_id).collect();
    let db_products = Products::find()
        .filter(ProdCol::Id.is_in(product_ids))
        .all(&state.orm)
        .await?;

    // Unit prices come from the catalog at this instant; the client-supplied
    // payload never carries a price.
    let mut priced: Vec<PricedItem> = Vec::with_capacity(payload.order_items.len());
    for item in &payload.order_items {
        let product = db_products
            .iter()
            .find(|p| p.id == item.product_id)
            .ok_or(AppError::NotFound)?;
        priced.push(PricedItem {
            quantity: item.qty,
            unit_price: product.price,
        });
    }

    let totals = pricing::compute_totals(&priced, &state.pricing)?;

    let txn = state.orm.begin().await?;

    let order_id = Uuid::new_v4();
    let order = OrderActive {
        id: Set(order_id),
        user_id: Set(user.user_id),
        ship_address: Set(payload.shipping_address.address.trim().to_string()),
        ship_city: Set(payload.shipping_address.city.trim().to_string()),
        ship_postal_code: Set(payload.shipping_address.postal_code.trim().to_string()),
        ship_country: Set(payload.shipping_address.country.trim().to_string()),
        payment_method: Set(payload.payment_method.as_str().to_string()),
        items_price: Set(totals.items_price),
        tax_price: Set(totals.tax_price),
        shipping_price: Set(totals.shipping_price),
        total_price: Set(totals.total_price),
        is_paid: Set(false),
        paid_at: Set(None),
        payment_txn_id: Set(None),
        payment_txn_status: Set(None),
        payment_update_time: Set(None),
        payer_email: Set(None),
        is_delivered: Set(false),
        delivered_at: Set(None),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&txn)
    .await?;

    let mut items: Vec<OrderItem> = Vec::new();
    for (input, line) in payload.order_items.iter().zip(priced.iter()) {
        let item = OrderItemActive {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            product_id: Set(input.product_id),
            quantity: Set(line.quantity),
            price: Set(line.unit_price),
            created_at: NotSet,
        }
        .insert(&txn)
        .await?;
        items.push(order_item_from_entity(item));
    }

    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        AuditAction::OrderCreate,
        Some(serde_json::json!({ "order_id": order.id, "total_price": order.total_price })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Order created",
        OrderWithItems {
            order: order_from_entity(order)?,
            items,
        },
        Some(Meta::empty()),
    ))
}

/// Confirm an order as paid after provider-side verification.
///
/// The gateway check happens first and fails closed; the replay check, the
/// row lock, the amount comparison and the final write all share one
/// transaction, so two concurrent confirmations of the same transaction id
/// cannot both succeed. A partial unique index on the stored transaction id
/// backs this at the database level.
pub async fn mark_paid(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: PaymentConfirmation,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let payment = state
        .payments
        .verify_transaction(&payload.id)
        .await
        .map_err(|e| AppError::PaymentVerificationFailed(e.to_string()))?;
    if !payment.verified {
        return Err(AppError::PaymentNotVerified);
    }

    let txn = state.orm.begin().await?;

    let reused = Orders::find()
        .filter(OrderCol::PaymentTxnId.eq(payload.id.as_str()))
        .count(&txn)
        .await?;
    if reused > 0 {
        return Err(AppError::DuplicateTransaction);
    }

    let order = Orders::find_by_id(id)
        .lock(LockType::Update)
        .one(&txn)
        .await?;
    let order = match order {
        Some(o) => o,
        None => return Err(AppError::NotFound),
    };
    ensure_owner_or_admin(user, order.user_id)?;

    if order.is_paid {
        return Err(AppError::Validation("Order already paid".into()));
    }
    if payment.amount != order.total_price {
        return Err(AppError::AmountMismatch);
    }

    let mut active: OrderActive = order.into();
    active.is_paid = Set(true);
    active.paid_at = Set(Some(Utc::now().into()));
    active.payment_txn_id = Set(Some(payload.id.clone()));
    active.payment_txn_status = Set(Some(payload.status));
    active.payment_update_time = Set(Some(payload.update_time));
    active.payer_email = Set(Some(payload.payer.email_address));
    active.updated_at = Set(Utc::now().into());
    // The partial unique index on the transaction id backstops the replay
    // check when two confirmations race past it.
    let order = active.update(&txn).await.map_err(|err| {
        if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) {
            AppError::DuplicateTransaction
        } else {
            AppError::from(err)
        }
    })?;

    let items = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order.id))
        .all(&txn)
        .await?
        .into_iter()
        .map(order_item_from_entity)
        .collect();

    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        AuditAction::OrderPaid,
        Some(serde_json::json!({ "order_id": order.id, "txn_id": payload.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Payment recorded",
        OrderWithItems {
            order: order_from_entity(order)?,
            items,
        },
        Some(Meta::empty()),
    ))
}

pub async fn mark_delivered(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<Order>> {
    ensure_admin(user)?;

    let order = Orders::find_by_id(id).one(&state.orm).await?;
    let order = match order {
        Some(o) => o,
        None => return Err(AppError::NotFound),
    };

    let mut active: OrderActive = order.into();
    active.is_delivered = Set(true);
    active.delivered_at = Set(Some(Utc::now().into()));
    active.updated_at = Set(Utc::now().into());
    let order = active.update(&state.orm).await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        AuditAction::OrderDelivered,
        Some(serde_json::json!({ "order_id": order.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Order delivered",
        order_from_entity(order)?,
        Some(Meta::empty()),
    ))
}

pub async fn list_user_orders(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<OrderList>> {
    let orders = Orders::find()
        .filter(OrderCol::UserId.eq(user.user_id))
        .order_by_desc(OrderCol::CreatedAt)
        .all(&state.orm)
        .await?;

    // An empty order history is a valid result, not an error.
    let items = orders
        .into_iter()
        .map(order_from_entity)
        .collect::<AppResult<Vec<_>>>()?;
    Ok(ApiResponse::success(
        "Ok",
        OrderList { items },
        Some(Meta::empty()),
    ))
}

pub async fn list_all_orders(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<OrderList>> {
    ensure_admin(user)?;

    let orders = Orders::find()
        .order_by_desc(OrderCol::CreatedAt)
        .all(&state.orm)
        .await?;

    let items = orders
        .into_iter()
        .map(order_from_entity)
        .collect::<AppResult<Vec<_>>>()?;
    Ok(ApiResponse::success(
        "Ok",
        OrderList { items },
        Some(Meta::empty()),
    ))
}

pub async fn get_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderDetail>> {
    let order = Orders::find_by_id(id).one(&state.orm).await?;
    let order = match order {
        Some(o) => o,
        None => return Err(AppError::NotFound),
    };
    ensure_owner_or_admin(user, order.user_id)?;

    let customer = Users::find_by_id(order.user_id)
        .one(&state.orm)
        .await?
        .map(|u| OrderCustomer {
            id: u.id,
            name: u.name,
            email: u.email,
        })
        .ok_or(AppError::NotFound)?;

    let item_models = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order.id))
        .all(&state.orm)
        .await?;

    let product_ids: Vec<Uuid> = item_models.iter().map(|i| i.product_id).collect();
    let products: HashMap<Uuid, (String, String)> = Products::find()
        .filter(ProdCol::Id.is_in(product_ids))
        .all(&state.orm)
        .await?
        .into_iter()
        .map(|p| (p.id, (p.name, p.image)))
        .collect();

    let items = item_models
        .into_iter()
        .map(|item| {
            let (product_name, product_image) = products
                .get(&item.product_id)
                .cloned()
                .unwrap_or_default();
            OrderItemView {
                product_id: item.product_id,
                product_name,
                product_image,
                quantity: item.quantity,
                price: item.price,
            }
        })
        .collect();

    Ok(ApiResponse::success(
        "Ok",
        OrderDetail {
            order: order_from_entity(order)?,
            user: customer,
            items,
        },
        Some(Meta::empty()),
    ))
}

fn validate_address(address: &ShippingAddress) -> AppResult<()> {
    let fields = [
        &address.address,
        &address.city,
        &address.postal_code,
        &address.country,
    ];
    if fields.iter().any(|f| f.trim().is_empty()) {
        return Err(AppError::Validation(
            "Shipping address must be complete".into(),
        ));
    }
    Ok(())
}

pub(crate) fn order_from_entity(model: OrderModel) -> AppResult<Order> {
    let payment_method = PaymentMethod::from_db(&model.payment_method).ok_or_else(|| {
        AppError::Internal(anyhow::anyhow!(
            "unknown payment method in order {}",
            model.id
        ))
    })?;

    let payment_result = model.payment_txn_id.map(|txn_id| PaymentResult {
        id: txn_id,
        status: model.payment_txn_status.unwrap_or_default(),
        update_time: model.payment_update_time.unwrap_or_default(),
        email_address: model.payer_email.unwrap_or_default(),
    });

    Ok(Order {
        id: model.id,
        user_id: model.user_id,
        shipping_address: ShippingAddress {
            address: model.ship_address,
            city: model.ship_city,
            postal_code: model.ship_postal_code,
            country: model.ship_country,
        },
        payment_method,
        items_price: model.items_price,
        tax_price: model.tax_price,
        shipping_price: model.shipping_price,
        total_price: model.total_price,
        is_paid: model.is_paid,
        paid_at: model.paid_at.map(|dt| dt.with_timezone(&Utc)),
        payment_result,
        is_delivered: model.is_delivered,
        delivered_at: model.delivered_at.map(|dt| dt.with_timezone(&Utc)),
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    })
}

fn order_item_from_entity(model: OrderItemModel) -> OrderItem {
    OrderItem {
        id: model.id,
        order_id: model.order_id,
        product_id: model.product_id,
        quantity: model.quantity,
        price: model.price,
        created_at: model.created_at.with_timezone(&Utc),
    }
}
