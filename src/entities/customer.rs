use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Storefront account, created on first sign-in. Addresses, wishlist entries
/// and device tokens live in satellite tables so profile updates can never
/// clobber them.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "customers")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    /// External identity-provider subject.
    #[sea_orm(unique)]
    pub uid: String,
    #[sea_orm(nullable)]
    pub email: Option<String>,
    #[sea_orm(nullable)]
    pub display_name: Option<String>,
    #[sea_orm(nullable)]
    pub photo_url: Option<String>,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    #[sea_orm(nullable)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    Default,
    utoipa::ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[sea_orm(string_value = "customer")]
    #[default]
    Customer,
    #[sea_orm(string_value = "admin")]
    Admin,
    #[sea_orm(string_value = "delivery")]
    Delivery,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Customer => "customer",
            Role::Admin => "admin",
            Role::Delivery => "delivery",
        }
    }
}
