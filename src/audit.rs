use serde_json::Value;
use uuid::Uuid;

use crate::{db::DbPool, error::AppResult};

/// Closed set of audited actions. Each action knows the table it touches,
/// so call sites cannot mislabel the resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    UserRegister,
    UserLogin,
    UserUpdate,
    UserDelete,
    CategoryCreate,
    CategoryUpdate,
    CategoryDelete,
    ProductCreate,
    ProductUpdate,
    ProductDelete,
    OrderCreate,
    OrderPaid,
    OrderDelivered,
    ReviewCreate,
    ReviewUpdate,
    ReviewDelete,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::UserRegister => "user_register",
            AuditAction::UserLogin => "user_login",
            AuditAction::UserUpdate => "user_update",
            AuditAction::UserDelete => "user_delete",
            AuditAction::CategoryCreate => "category_create",
            AuditAction::CategoryUpdate => "category_update",
            AuditAction::CategoryDelete => "category_delete",
            AuditAction::ProductCreate => "product_create",
            AuditAction::ProductUpdate => "product_update",
            AuditAction::ProductDelete => "product_delete",
            AuditAction::OrderCreate => "order_create",
            AuditAction::OrderPaid => "order_paid",
            AuditAction::OrderDelivered => "order_delivered",
            AuditAction::ReviewCreate => "review_create",
            AuditAction::ReviewUpdate => "review_update",
            AuditAction::ReviewDelete => "review_delete",
        }
    }

    pub fn resource(&self) -> &'static str {
        match self {
            AuditAction::UserRegister
            | AuditAction::UserLogin
            | AuditAction::UserUpdate
            | AuditAction::UserDelete => "users",
            AuditAction::CategoryCreate
            | AuditAction::CategoryUpdate
            | AuditAction::CategoryDelete => "categories",
            AuditAction::ProductCreate
            | AuditAction::ProductUpdate
            | AuditAction::ProductDelete => "products",
            AuditAction::OrderCreate | AuditAction::OrderPaid | AuditAction::OrderDelivered => {
                "orders"
            }
            AuditAction::ReviewCreate | AuditAction::ReviewUpdate | AuditAction::ReviewDelete => {
                "reviews"
            }
        }
    }
}

pub async fn log_audit(
    pool: &DbPool,
    user_id: Option<Uuid>,
    action: AuditAction,
    metadata: Option<Value>,
) -> AppResult<()> {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO audit_logs (id, user_id, action, resource, metadata)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(id)
    .bind(user_id)
    .bind(action.as_str())
    .bind(action.resource())
    .bind(metadata)
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actions_carry_their_resource() {
        assert_eq!(AuditAction::OrderPaid.as_str(), "order_paid");
        assert_eq!(AuditAction::OrderPaid.resource(), "orders");
        assert_eq!(AuditAction::ReviewDelete.resource(), "reviews");
        assert_eq!(AuditAction::UserLogin.resource(), "users");
        assert_eq!(AuditAction::CategoryUpdate.as_str(), "category_update");
        assert_eq!(AuditAction::ProductCreate.resource(), "products");
    }
}
