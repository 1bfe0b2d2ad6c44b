use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::DbError;

struct SeedCategory {
    name: &'static str,
    slug: &'static str,
    description: &'static str,
    sort_order: i32,
}

struct SeedProduct {
    name: &'static str,
    slug: &'static str,
    description: &'static str,
    /// Price in cents, to keep the table free of float literals.
    price_cents: i64,
    compare_at_cents: Option<i64>,
    sku: &'static str,
    inventory: i32,
    image_url: &'static str,
    materials: &'static str,
    category_slug: &'static str,
    is_featured: bool,
}

const CATEGORIES: &[SeedCategory] = &[
    SeedCategory {
        name: "Leather Jackets",
        slug: "clothing",
        description: "Jackets and outerwear in full-grain leather",
        sort_order: 1,
    },
    SeedCategory {
        name: "Leather Bags",
        slug: "bags",
        description: "Totes, messengers and travel bags",
        sort_order: 2,
    },
    SeedCategory {
        name: "Leather Shoes",
        slug: "footwear",
        description: "Boots, loafers and sandals",
        sort_order: 3,
    },
    SeedCategory {
        name: "Home & Office",
        slug: "home",
        description: "Desk accessories and home goods",
        sort_order: 4,
    },
];

const PRODUCTS: &[SeedProduct] = &[
    SeedProduct {
        name: "Classic Biker Jacket",
        slug: "classic-biker-jacket",
        description: "Hand-finished lambskin biker jacket with a quilted lining.",
        price_cents: 29_999,
        compare_at_cents: Some(34_999),
        sku: "JKT-BIKER-001",
        inventory: 12,
        image_url: "https://images.unsplash.com/photo-1551028719-00167b16eac5?w=800",
        materials: "Lambskin leather, cotton lining",
        category_slug: "clothing",
        is_featured: true,
    },
    SeedProduct {
        name: "Weekender Duffel",
        slug: "weekender-duffel",
        description: "Roomy vegetable-tanned duffel with brass hardware.",
        price_cents: 18_950,
        compare_at_cents: None,
        sku: "BAG-DUFFEL-001",
        inventory: 20,
        image_url: "https://images.unsplash.com/photo-1553062407-98eeb64c6a62?w=800",
        materials: "Vegetable-tanned cowhide, brass",
        category_slug: "bags",
        is_featured: true,
    },
    SeedProduct {
        name: "Everyday Tote",
        slug: "everyday-tote",
        description: "Unlined tote that softens with use.",
        price_cents: 8_900,
        compare_at_cents: None,
        sku: "BAG-TOTE-001",
        inventory: 35,
        image_url: "https://images.unsplash.com/photo-1590874103328-eac38a683ce7?w=800",
        materials: "Full-grain cowhide",
        category_slug: "bags",
        is_featured: false,
    },
    SeedProduct {
        name: "Chelsea Boot",
        slug: "chelsea-boot",
        description: "Goodyear-welted Chelsea boot in burnished brown.",
        price_cents: 21_500,
        compare_at_cents: None,
        sku: "SHO-CHELSEA-001",
        inventory: 18,
        image_url: "https://images.unsplash.com/photo-1549298916-b41d501d3772?w=800",
        materials: "Calf leather, leather sole",
        category_slug: "footwear",
        is_featured: true,
    },
    SeedProduct {
        name: "Desk Pad",
        slug: "desk-pad",
        description: "Large desk pad with stitched edges.",
        price_cents: 6_500,
        compare_at_cents: None,
        sku: "HOM-DESKPAD-001",
        inventory: 40,
        image_url: "https://images.unsplash.com/photo-1586075010923-2dd4570fb338?w=800",
        materials: "Bridle leather",
        category_slug: "home",
        is_featured: false,
    },
];

/// Counts of rows written by [`seed_catalog`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedSummary {
    pub categories: usize,
    pub products: usize,
}

/// Upsert the sample catalogue: four categories and a handful of products.
///
/// Rows are matched by slug, so running the seed twice updates in place.
/// All upserts run inside a single transaction; if any operation fails
/// the entire batch is rolled back.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any database operation fails.
pub async fn seed_catalog(pool: &PgPool) -> Result<SeedSummary, DbError> {
    let mut tx = pool.begin().await?;

    for category in CATEGORIES {
        sqlx::query(
            "INSERT INTO categories (name, slug, description, sort_order) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (slug) DO UPDATE SET \
                 name = EXCLUDED.name, \
                 description = EXCLUDED.description, \
                 sort_order = EXCLUDED.sort_order, \
                 updated_at = NOW()",
        )
        .bind(category.name)
        .bind(category.slug)
        .bind(category.description)
        .bind(category.sort_order)
        .execute(&mut *tx)
        .await?;
    }

    for product in PRODUCTS {
        sqlx::query(
            "INSERT INTO products ( \
                 name, slug, description, price, compare_at_price, sku, inventory_quantity, \
                 image_url, gallery_images, materials, category_id, is_published, is_featured \
             ) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, jsonb_build_array($8::text), $9, \
                     (SELECT id FROM categories WHERE slug = $10), true, $11) \
             ON CONFLICT (slug) DO UPDATE SET \
                 name = EXCLUDED.name, \
                 description = EXCLUDED.description, \
                 price = EXCLUDED.price, \
                 compare_at_price = EXCLUDED.compare_at_price, \
                 sku = EXCLUDED.sku, \
                 image_url = EXCLUDED.image_url, \
                 materials = EXCLUDED.materials, \
                 category_id = EXCLUDED.category_id, \
                 is_featured = EXCLUDED.is_featured, \
                 updated_at = NOW()",
        )
        .bind(product.name)
        .bind(product.slug)
        .bind(product.description)
        .bind(Decimal::new(product.price_cents, 2))
        .bind(product.compare_at_cents.map(|cents| Decimal::new(cents, 2)))
        .bind(product.sku)
        .bind(product.inventory)
        .bind(product.image_url)
        .bind(product.materials)
        .bind(product.category_slug)
        .bind(product.is_featured)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    Ok(SeedSummary {
        categories: CATEGORIES.len(),
        products: PRODUCTS.len(),
    })
}
