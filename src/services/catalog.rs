use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set,
};
use serde::Deserialize;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::entities::{
    category::{self, Entity as Category},
    product::{self, Entity as Product},
};
use crate::errors::ServiceError;

/// Catalog reads and admin mutations for products and categories.
#[derive(Clone)]
pub struct CatalogService {
    db: Arc<DatabaseConnection>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProductFilter {
    pub category: Option<String>,
    pub available_only: bool,
    pub search: Option<String>,
}

#[derive(Debug)]
pub struct NewProduct {
    pub name: String,
    pub description: Option<String>,
    pub category: String,
    pub price: Decimal,
    pub discount: Decimal,
    pub stock: i32,
    pub is_available: bool,
    pub images: Vec<String>,
    pub colors: Vec<String>,
}

#[derive(Debug, Default)]
pub struct ProductPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub price: Option<Decimal>,
    pub discount: Option<Decimal>,
    pub stock: Option<i32>,
    pub is_available: Option<bool>,
    pub images: Option<Vec<String>>,
    pub colors: Option<Vec<String>>,
}

impl CatalogService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub async fn list_products(
        &self,
        filter: ProductFilter,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<product::Model>, u64), ServiceError> {
        let mut query = Product::find().order_by_desc(product::Column::CreatedAt);
        if let Some(category) = &filter.category {
            query = query.filter(product::Column::Category.eq(category.clone()));
        }
        if filter.available_only {
            query = query.filter(product::Column::IsAvailable.eq(true));
        }
        if let Some(term) = &filter.search {
            query = query.filter(product::Column::Name.contains(term.clone()));
        }

        let paginator = query.paginate(&*self.db, limit.max(1));
        let total = paginator.num_items().await?;
        let products = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((products, total))
    }

    pub async fn get_product(&self, id: Uuid) -> Result<product::Model, ServiceError> {
        Product::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", id)))
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_product(&self, input: NewProduct) -> Result<product::Model, ServiceError> {
        if input.price < Decimal::ZERO || input.stock < 0 {
            return Err(ServiceError::ValidationError(
                "price and stock must be non-negative".into(),
            ));
        }
        let now = Utc::now();
        let model = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(input.name),
            description: Set(input.description),
            category: Set(input.category),
            price: Set(input.price),
            discount: Set(input.discount),
            stock: Set(input.stock),
            sales_count: Set(0),
            is_available: Set(input.is_available),
            average_rating: Set(Decimal::ZERO),
            review_count: Set(0),
            images: Set(serde_json::json!(input.images)),
            colors: Set(Some(serde_json::json!(input.colors))),
            created_at: Set(now),
            updated_at: Set(Some(now)),
        }
        .insert(&*self.db)
        .await?;
        info!(product_id = %model.id, "product created");
        Ok(model)
    }

    #[instrument(skip(self, patch), fields(product_id = %id))]
    pub async fn update_product(
        &self,
        id: Uuid,
        patch: ProductPatch,
    ) -> Result<product::Model, ServiceError> {
        let existing = self.get_product(id).await?;
        let mut active: product::ActiveModel = existing.into();

        if let Some(name) = patch.name {
            active.name = Set(name);
        }
        if let Some(description) = patch.description {
            active.description = Set(Some(description));
        }
        if let Some(category) = patch.category {
            active.category = Set(category);
        }
        if let Some(price) = patch.price {
            if price < Decimal::ZERO {
                return Err(ServiceError::ValidationError(
                    "price must be non-negative".into(),
                ));
            }
            active.price = Set(price);
        }
        if let Some(discount) = patch.discount {
            active.discount = Set(discount);
        }
        if let Some(stock) = patch.stock {
            if stock < 0 {
                return Err(ServiceError::ValidationError(
                    "stock must be non-negative".into(),
                ));
            }
            active.stock = Set(stock);
        }
        if let Some(is_available) = patch.is_available {
            active.is_available = Set(is_available);
        }
        if let Some(images) = patch.images {
            active.images = Set(serde_json::json!(images));
        }
        if let Some(colors) = patch.colors {
            active.colors = Set(Some(serde_json::json!(colors)));
        }
        active.updated_at = Set(Some(Utc::now()));

        Ok(active.update(&*self.db).await?)
    }

    pub async fn delete_product(&self, id: Uuid) -> Result<(), ServiceError> {
        let result = Product::delete_by_id(id).exec(&*self.db).await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!("Product {} not found", id)));
        }
        Ok(())
    }

    /// Categories with a product-count histogram recomputed per request.
    /// Counts are never stored; cheap at boutique catalog scale.
    #[instrument(skip(self))]
    pub async fn list_categories(
        &self,
    ) -> Result<Vec<(category::Model, i64)>, ServiceError> {
        let categories = Category::find()
            .filter(category::Column::IsActive.eq(true))
            .order_by_asc(category::Column::Name)
            .all(&*self.db)
            .await?;

        let counts: Vec<(String, i64)> = Product::find()
            .select_only()
            .column(product::Column::Category)
            .column_as(product::Column::Id.count(), "count")
            .group_by(product::Column::Category)
            .into_tuple()
            .all(&*self.db)
            .await?;
        let histogram: HashMap<String, i64> = counts.into_iter().collect();

        Ok(categories
            .into_iter()
            .map(|c| {
                let count = histogram.get(&c.name).copied().unwrap_or(0);
                (c, count)
            })
            .collect())
    }

    pub async fn create_category(
        &self,
        name: String,
        image: Option<String>,
    ) -> Result<category::Model, ServiceError> {
        if name.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "category name is required".into(),
            ));
        }
        let model = category::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.trim().to_string()),
            image: Set(image),
            is_active: Set(true),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await?;
        Ok(model)
    }
}

/// Conditionally takes `quantity` units of stock. The filter guarantees the
/// decrement can never drive stock negative; zero rows affected means the
/// caller lost the race or the shelf is empty.
pub async fn reserve_stock<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
    quantity: i32,
) -> Result<(), ServiceError> {
    let result = Product::update_many()
        .col_expr(
            product::Column::Stock,
            Expr::col(product::Column::Stock).sub(quantity),
        )
        .filter(product::Column::Id.eq(product_id))
        .filter(product::Column::Stock.gte(quantity))
        .exec(conn)
        .await?;
    if result.rows_affected == 0 {
        return Err(ServiceError::InsufficientStock(format!(
            "product {} has insufficient stock for quantity {}",
            product_id, quantity
        )));
    }
    Ok(())
}

/// Returns units to the shelf (cancellation, return approval).
pub async fn restore_stock<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
    quantity: i32,
) -> Result<(), ServiceError> {
    Product::update_many()
        .col_expr(
            product::Column::Stock,
            Expr::col(product::Column::Stock).add(quantity),
        )
        .filter(product::Column::Id.eq(product_id))
        .exec(conn)
        .await?;
    Ok(())
}

pub async fn increment_sales<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
    quantity: i32,
) -> Result<(), ServiceError> {
    Product::update_many()
        .col_expr(
            product::Column::SalesCount,
            Expr::col(product::Column::SalesCount).add(quantity),
        )
        .filter(product::Column::Id.eq(product_id))
        .exec(conn)
        .await?;
    Ok(())
}

/// Decrements the sales counter, floored at zero. Two conditional statements
/// keep the floor portable across backends.
pub async fn decrement_sales_floor<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
    quantity: i32,
) -> Result<(), ServiceError> {
    let result = Product::update_many()
        .col_expr(
            product::Column::SalesCount,
            Expr::col(product::Column::SalesCount).sub(quantity),
        )
        .filter(product::Column::Id.eq(product_id))
        .filter(product::Column::SalesCount.gte(quantity))
        .exec(conn)
        .await?;
    if result.rows_affected == 0 {
        Product::update_many()
            .col_expr(product::Column::SalesCount, Expr::value(0))
            .filter(product::Column::Id.eq(product_id))
            .exec(conn)
            .await?;
    }
    Ok(())
}
