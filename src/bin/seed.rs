use anyhow::Context;
use axum_commerce_api::{
    db::{create_orm_conn, run_migrations},
    entity::{
        products::{self, Column as ProdCol, Entity as Products},
        users::{self, Column as UserCol, Entity as Users},
    },
    models::Role,
};
use chrono::Utc;
use sea_orm::{DatabaseConnection, EntityTrait, Set, prelude::DateTimeWithTimeZone, sea_query::OnConflict};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is not set")?;

    let orm = create_orm_conn(&database_url).await?;
    // Ensure migrations are applied.
    run_migrations(&orm).await?;

    ensure_user(&orm, "admin@example.com", Role::Admin).await?;
    ensure_user(&orm, "user@example.com", Role::User).await?;
    seed_products(&orm).await?;

    println!("Seed completed");
    Ok(())
}

async fn ensure_user(orm: &DatabaseConnection, email: &str, role: Role) -> anyhow::Result<()> {
    let user = users::ActiveModel {
        id: Set(Uuid::new_v4()),
        email: Set(email.to_string()),
        role: Set(role.as_str().to_string()),
        created_at: Set(DateTimeWithTimeZone::from(Utc::now())),
    };
    Users::insert(user)
        .on_conflict(
            OnConflict::column(UserCol::Email)
                .update_column(UserCol::Role)
                .to_owned(),
        )
        .exec_without_returning(orm)
        .await?;

    println!("Ensured user {email} (role={})", role.as_str());
    Ok(())
}

async fn seed_products(orm: &DatabaseConnection) -> anyhow::Result<()> {
    let products = vec![
        ("SKU-HOODIE", "Axum Hoodie", 550000, 50),
        ("SKU-MUG", "Ferris Mug", 120000, 100),
        ("SKU-STICKERS", "Rust Sticker Pack", 50000, 200),
        ("SKU-EBOOK", "E-book: Async Rust", 250000, 75),
    ];

    let mut inserted = 0;
    for (sku, name, price, stock) in products {
        let product = products::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            price: Set(price),
            stock: Set(stock),
            external_id: Set(Some(sku.to_string())),
            created_at: Set(DateTimeWithTimeZone::from(Utc::now())),
        };
        inserted += Products::insert(product)
            .on_conflict(OnConflict::column(ProdCol::ExternalId).do_nothing().to_owned())
            .exec_without_returning(orm)
            .await?;
    }

    println!("Seeded {inserted} products");
    Ok(())
}
