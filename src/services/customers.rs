use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::entities::{
    customer::{self, Entity as Customer, Role},
    customer_address::{self, Entity as CustomerAddress},
    device_token::{self, Entity as DeviceToken},
    product::{self, Entity as Product},
    wishlist_item::{self, Entity as WishlistItem},
};
use crate::errors::ServiceError;

/// Customer profiles and their satellites: addresses, wishlist, device
/// tokens. Satellite tables give merge semantics structurally; a profile
/// update cannot clobber them.
#[derive(Clone)]
pub struct CustomerService {
    db: Arc<DatabaseConnection>,
}

#[derive(Debug, Default)]
pub struct ProfileInput {
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
}

#[derive(Debug)]
pub struct AddressInput {
    pub label: String,
    pub full_address: String,
    pub city: String,
    pub pincode: String,
    pub phone: Option<String>,
}

impl CustomerService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// First-sign-in upsert. Creates the record with the customer role, or
    /// merges only the provided profile fields into an existing one.
    #[instrument(skip(self, input), fields(uid = %uid))]
    pub async fn sync_profile(
        &self,
        uid: &str,
        input: ProfileInput,
    ) -> Result<customer::Model, ServiceError> {
        match self.find_by_uid(uid).await? {
            Some(existing) => {
                let mut active: customer::ActiveModel = existing.into();
                if let Some(email) = input.email {
                    active.email = Set(Some(email));
                }
                if let Some(display_name) = input.display_name {
                    active.display_name = Set(Some(display_name));
                }
                if let Some(photo_url) = input.photo_url {
                    active.photo_url = Set(Some(photo_url));
                }
                active.updated_at = Set(Some(Utc::now()));
                Ok(active.update(&*self.db).await?)
            }
            None => {
                let model = customer::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    uid: Set(uid.to_string()),
                    email: Set(input.email),
                    display_name: Set(input.display_name),
                    photo_url: Set(input.photo_url),
                    role: Set(Role::Customer),
                    created_at: Set(Utc::now()),
                    updated_at: Set(None),
                }
                .insert(&*self.db)
                .await?;
                info!(uid = %uid, "customer created on first sign-in");
                Ok(model)
            }
        }
    }

    pub async fn find_by_uid(&self, uid: &str) -> Result<Option<customer::Model>, ServiceError> {
        Ok(Customer::find()
            .filter(customer::Column::Uid.eq(uid))
            .one(&*self.db)
            .await?)
    }

    pub async fn find_by_uids(
        &self,
        uids: Vec<String>,
    ) -> Result<Vec<customer::Model>, ServiceError> {
        if uids.is_empty() {
            return Ok(Vec::new());
        }
        Ok(Customer::find()
            .filter(customer::Column::Uid.is_in(uids))
            .all(&*self.db)
            .await?)
    }

    // ---- addresses ----

    pub async fn list_addresses(
        &self,
        uid: &str,
    ) -> Result<Vec<customer_address::Model>, ServiceError> {
        Ok(CustomerAddress::find()
            .filter(customer_address::Column::CustomerUid.eq(uid))
            .order_by_desc(customer_address::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    pub async fn add_address(
        &self,
        uid: &str,
        input: AddressInput,
    ) -> Result<customer_address::Model, ServiceError> {
        Ok(customer_address::ActiveModel {
            id: Set(Uuid::new_v4()),
            customer_uid: Set(uid.to_string()),
            label: Set(input.label),
            full_address: Set(input.full_address),
            city: Set(input.city),
            pincode: Set(input.pincode),
            phone: Set(input.phone),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await?)
    }

    pub async fn update_address(
        &self,
        uid: &str,
        address_id: Uuid,
        input: AddressInput,
    ) -> Result<customer_address::Model, ServiceError> {
        let existing = self.owned_address(uid, address_id).await?;
        let mut active: customer_address::ActiveModel = existing.into();
        active.label = Set(input.label);
        active.full_address = Set(input.full_address);
        active.city = Set(input.city);
        active.pincode = Set(input.pincode);
        active.phone = Set(input.phone);
        Ok(active.update(&*self.db).await?)
    }

    pub async fn delete_address(&self, uid: &str, address_id: Uuid) -> Result<(), ServiceError> {
        let existing = self.owned_address(uid, address_id).await?;
        let active: customer_address::ActiveModel = existing.into();
        active.delete(&*self.db).await?;
        Ok(())
    }

    async fn owned_address(
        &self,
        uid: &str,
        address_id: Uuid,
    ) -> Result<customer_address::Model, ServiceError> {
        CustomerAddress::find_by_id(address_id)
            .filter(customer_address::Column::CustomerUid.eq(uid))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Address {} not found", address_id)))
    }

    // ---- wishlist ----

    pub async fn list_wishlist(&self, uid: &str) -> Result<Vec<product::Model>, ServiceError> {
        let items = WishlistItem::find()
            .filter(wishlist_item::Column::CustomerUid.eq(uid))
            .order_by_desc(wishlist_item::Column::CreatedAt)
            .all(&*self.db)
            .await?;
        let ids: Vec<Uuid> = items.iter().map(|i| i.product_id).collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        Ok(Product::find()
            .filter(product::Column::Id.is_in(ids))
            .all(&*self.db)
            .await?)
    }

    pub async fn add_to_wishlist(&self, uid: &str, product_id: Uuid) -> Result<(), ServiceError> {
        Product::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

        let already = WishlistItem::find()
            .filter(wishlist_item::Column::CustomerUid.eq(uid))
            .filter(wishlist_item::Column::ProductId.eq(product_id))
            .one(&*self.db)
            .await?;
        if already.is_some() {
            return Ok(());
        }

        wishlist_item::ActiveModel {
            id: Set(Uuid::new_v4()),
            customer_uid: Set(uid.to_string()),
            product_id: Set(product_id),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await?;
        Ok(())
    }

    pub async fn remove_from_wishlist(
        &self,
        uid: &str,
        product_id: Uuid,
    ) -> Result<(), ServiceError> {
        WishlistItem::delete_many()
            .filter(wishlist_item::Column::CustomerUid.eq(uid))
            .filter(wishlist_item::Column::ProductId.eq(product_id))
            .exec(&*self.db)
            .await?;
        Ok(())
    }

    // ---- device tokens ----

    /// Registers a push token, deduplicated per customer by token value.
    pub async fn register_device_token(
        &self,
        uid: &str,
        token: &str,
    ) -> Result<(), ServiceError> {
        if token.trim().is_empty() {
            return Err(ServiceError::ValidationError("token is required".into()));
        }
        let existing = DeviceToken::find()
            .filter(device_token::Column::CustomerUid.eq(uid))
            .filter(device_token::Column::Token.eq(token))
            .one(&*self.db)
            .await?;
        if existing.is_some() {
            return Ok(());
        }
        device_token::ActiveModel {
            id: Set(Uuid::new_v4()),
            customer_uid: Set(uid.to_string()),
            token: Set(token.to_string()),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await?;
        Ok(())
    }

    pub async fn device_tokens(&self, uid: &str) -> Result<Vec<String>, ServiceError> {
        let rows = DeviceToken::find()
            .filter(device_token::Column::CustomerUid.eq(uid))
            .all(&*self.db)
            .await?;
        Ok(rows.into_iter().map(|r| r.token).collect())
    }
}
