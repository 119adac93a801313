use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Catalog product. `stock` and `sales_count` are mutated exclusively through
/// the conditional updates in the catalog service.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "products")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    #[sea_orm(nullable)]
    pub description: Option<String>,
    pub category: String,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub price: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub discount: Decimal,
    pub stock: i32,
    pub sales_count: i32,
    pub is_available: bool,
    #[sea_orm(column_type = "Decimal(Some((4, 2)))")]
    pub average_rating: Decimal,
    pub review_count: i32,
    #[sea_orm(column_type = "Json")]
    pub images: Json,
    #[sea_orm(column_type = "Json", nullable)]
    pub colors: Option<Json>,
    pub created_at: DateTime<Utc>,
    #[sea_orm(nullable)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
