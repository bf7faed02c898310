use argon2::{
    Argon2, PasswordHasher,
    password_hash::{SaltString, rand_core::OsRng},
};
use storefront_api::{config::AppConfig, db::create_pool};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let pool = create_pool(&config.database_url).await?;
    // Ensure migrations are applied.
    sqlx::migrate!("./migrations").run(&pool).await?;

    let admin_id = ensure_user(&pool, "Admin", "admin@example.com", "admin123", "admin").await?;
    let user_id = ensure_user(&pool, "Jane Doe", "user@example.com", "user123", "user").await?;

    let category_id = ensure_category(&pool, "Electronics").await?;
    seed_products(&pool, category_id, admin_id).await?;

    println!("Seed completed. Admin ID: {admin_id}, User ID: {user_id}");
    Ok(())
}

async fn ensure_user(
    pool: &sqlx::PgPool,
    name: &str,
    email: &str,
    password: &str,
    role: &str,
) -> anyhow::Result<Uuid> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let password_hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!(e.to_string()))?
        .to_string();

    let row: Option<(Uuid,)> = sqlx::query_as(
        r#"
        INSERT INTO users (id, name, email, password_hash, role)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (email) DO UPDATE SET role = EXCLUDED.role
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(name)
    .bind(email)
    .bind(password_hash)
    .bind(role)
    .fetch_optional(pool)
    .await?;

    // If user already exists, fetch id
    let user_id = match row {
        Some((id,)) => id,
        None => {
            let existing: (Uuid,) = sqlx::query_as("SELECT id FROM users WHERE email = $1")
                .bind(email)
                .fetch_one(pool)
                .await?;
            existing.0
        }
    };

    println!("Ensured user {email} (role={role})");
    Ok(user_id)
}

async fn ensure_category(pool: &sqlx::PgPool, name: &str) -> anyhow::Result<Uuid> {
    let row: Option<(Uuid,)> = sqlx::query_as(
        r#"
        INSERT INTO categories (id, name)
        VALUES ($1, $2)
        ON CONFLICT (name) DO NOTHING
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(name)
    .fetch_optional(pool)
    .await?;

    let category_id = match row {
        Some((id,)) => id,
        None => {
            let existing: (Uuid,) = sqlx::query_as("SELECT id FROM categories WHERE name = $1")
                .bind(name)
                .fetch_one(pool)
                .await?;
            existing.0
        }
    };

    println!("Ensured category {name}");
    Ok(category_id)
}

async fn seed_products(
    pool: &sqlx::PgPool,
    category_id: Uuid,
    owner_id: Uuid,
) -> anyhow::Result<()> {
    // Prices are minor units (cents).
    let products = vec![
        (
            "Airpods Wireless Bluetooth Headphones",
            "Apple",
            "/images/airpods.jpg",
            "Bluetooth technology lets you connect it with compatible devices wirelessly",
            8999_i64,
            10,
        ),
        (
            "iPhone 13 Pro 256GB Memory",
            "Apple",
            "/images/phone.jpg",
            "A transformative triple-camera system that adds tons of capability",
            59999,
            7,
        ),
        (
            "Cannon EOS 80D DSLR Camera",
            "Cannon",
            "/images/camera.jpg",
            "Characterized by versatile imaging specs and a robust focus system",
            92999,
            5,
        ),
        (
            "Logitech G-Series Gaming Mouse",
            "Logitech",
            "/images/mouse.jpg",
            "Get a better handle on your games with this gaming mouse",
            4999,
            7,
        ),
    ];

    for (name, brand, image, description, price, stock) in products {
        sqlx::query(
            r#"
            INSERT INTO products
                (id, category_id, user_id, name, brand, image, description, price, count_in_stock)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (name) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(category_id)
        .bind(owner_id)
        .bind(name)
        .bind(brand)
        .bind(image)
        .bind(description)
        .bind(price)
        .bind(stock)
        .execute(pool)
        .await?;
    }

    println!("Seeded products");
    Ok(())
}
