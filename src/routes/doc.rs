use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        auth::{LoginRequest, LoginResponse, RegisterRequest},
        categories::{CategoryList, CreateCategoryRequest, UpdateCategoryRequest},
        orders::{
            CreateOrderRequest, OrderCustomer, OrderDetail, OrderItemInput, OrderItemView,
            OrderList, OrderWithItems, PayerInfo, PaymentConfirmation,
        },
        products::{CreateProductRequest, ProductDetail, ProductList, UpdateProductRequest},
        reviews::{CreateReviewRequest, ReviewList, ReviewView, UpdateReviewRequest},
        users::{AdminUpdateUserRequest, UpdateProfileRequest, UserList},
    },
    models::{
        Category, Order, OrderItem, PaymentMethod, PaymentResult, Product, Review,
        ShippingAddress, User,
    },
    response::{ApiResponse, Meta},
    routes::{
        auth, categories, health, orders, params, products as product_routes, reviews, users,
    },
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        auth::register,
        auth::login,
        auth::profile,
        auth::update_profile,
        users::list_users,
        users::get_user,
        users::update_user,
        users::delete_user,
        categories::list_categories,
        categories::get_category,
        categories::create_category,
        categories::update_category,
        categories::delete_category,
        product_routes::list_products,
        product_routes::top_products,
        product_routes::get_product,
        product_routes::list_product_reviews,
        product_routes::create_product,
        product_routes::update_product,
        product_routes::delete_product,
        orders::create_order,
        orders::list_my_orders,
        orders::list_all_orders,
        orders::get_order,
        orders::pay_order,
        orders::deliver_order,
        reviews::create_review,
        reviews::list_all_reviews,
        reviews::get_review,
        reviews::update_review,
        reviews::delete_review
    ),
    components(
        schemas(
            User,
            Category,
            Product,
            Review,
            Order,
            OrderItem,
            PaymentMethod,
            PaymentResult,
            ShippingAddress,
            RegisterRequest,
            LoginRequest,
            LoginResponse,
            UpdateProfileRequest,
            AdminUpdateUserRequest,
            UserList,
            CreateCategoryRequest,
            UpdateCategoryRequest,
            CategoryList,
            CreateProductRequest,
            UpdateProductRequest,
            ProductList,
            ProductDetail,
            CreateOrderRequest,
            OrderItemInput,
            PaymentConfirmation,
            PayerInfo,
            OrderCustomer,
            OrderItemView,
            OrderDetail,
            OrderList,
            OrderWithItems,
            CreateReviewRequest,
            UpdateReviewRequest,
            ReviewView,
            ReviewList,
            params::Pagination,
            params::ProductQuery,
            Meta,
            ApiResponse<User>,
            ApiResponse<Product>,
            ApiResponse<ProductList>,
            ApiResponse<OrderWithItems>,
            ApiResponse<OrderList>,
            ApiResponse<ReviewList>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Auth", description = "Authentication endpoints"),
        (name = "Users", description = "User administration endpoints"),
        (name = "Categories", description = "Category endpoints"),
        (name = "Products", description = "Product catalog endpoints"),
        (name = "Orders", description = "Order lifecycle endpoints"),
        (name = "Reviews", description = "Review endpoints"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
