use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set,
};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::entities::coupon::{self, DiscountType, Entity as Coupon};
use crate::errors::ServiceError;

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// Coupon lookup, validation, and admin CRUD.
#[derive(Clone)]
pub struct CouponService {
    db: Arc<DatabaseConnection>,
}

#[derive(Debug)]
pub struct NewCoupon {
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_amount: Decimal,
    pub min_order_value: Decimal,
    pub expiry_date: DateTime<Utc>,
    pub is_active: bool,
}

impl CouponService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Validates a coupon against an order total. Codes match
    /// case-insensitively; the stored form is always uppercase.
    #[instrument(skip(self), fields(code = %code))]
    pub async fn validate(
        &self,
        code: &str,
        order_total: Decimal,
    ) -> Result<coupon::Model, ServiceError> {
        self.validate_on(&*self.db, code, order_total).await
    }

    /// Transaction-aware variant used by the order workflow so the lookup
    /// shares the caller's connection.
    pub async fn validate_on<C: ConnectionTrait>(
        &self,
        conn: &C,
        code: &str,
        order_total: Decimal,
    ) -> Result<coupon::Model, ServiceError> {
        let normalized = code.trim().to_uppercase();
        let coupon = Coupon::find()
            .filter(coupon::Column::Code.eq(normalized.clone()))
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Coupon {} not found", normalized)))?;

        check_usable(&coupon, order_total, Utc::now())?;
        Ok(coupon)
    }

    #[instrument(skip(self, input), fields(code = %input.code))]
    pub async fn create(&self, input: NewCoupon) -> Result<coupon::Model, ServiceError> {
        if input.discount_amount <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "discount_amount must be positive".into(),
            ));
        }
        if input.discount_type == DiscountType::Percentage && input.discount_amount > HUNDRED {
            return Err(ServiceError::ValidationError(
                "percentage discount cannot exceed 100".into(),
            ));
        }
        let now = Utc::now();
        let model = coupon::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(input.code.trim().to_uppercase()),
            discount_type: Set(input.discount_type),
            discount_amount: Set(input.discount_amount),
            min_order_value: Set(input.min_order_value),
            expiry_date: Set(input.expiry_date),
            is_active: Set(input.is_active),
            created_at: Set(now),
            updated_at: Set(Some(now)),
        }
        .insert(&*self.db)
        .await?;
        info!(coupon_id = %model.id, code = %model.code, "coupon created");
        Ok(model)
    }

    pub async fn list(&self) -> Result<Vec<coupon::Model>, ServiceError> {
        Ok(Coupon::find()
            .order_by_desc(coupon::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    pub async fn set_active(&self, id: Uuid, is_active: bool) -> Result<coupon::Model, ServiceError> {
        let coupon = Coupon::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Coupon {} not found", id)))?;
        let mut active: coupon::ActiveModel = coupon.into();
        active.is_active = Set(is_active);
        active.updated_at = Set(Some(Utc::now()));
        Ok(active.update(&*self.db).await?)
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), ServiceError> {
        let result = Coupon::delete_by_id(id).exec(&*self.db).await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!("Coupon {} not found", id)));
        }
        Ok(())
    }
}

/// Usability rules: active, unexpired, minimum order met.
pub fn check_usable(
    coupon: &coupon::Model,
    order_total: Decimal,
    now: DateTime<Utc>,
) -> Result<(), ServiceError> {
    if !coupon.is_active {
        return Err(ServiceError::InvalidCoupon(format!(
            "coupon {} is no longer active",
            coupon.code
        )));
    }
    if coupon.expiry_date <= now {
        return Err(ServiceError::CouponExpired(format!(
            "coupon {} expired on {}",
            coupon.code,
            coupon.expiry_date.format("%Y-%m-%d")
        )));
    }
    if order_total < coupon.min_order_value {
        return Err(ServiceError::MinOrderNotMet(format!(
            "order total must be at least {} to use {}",
            coupon.min_order_value, coupon.code
        )));
    }
    Ok(())
}

/// Discount for a usable coupon. Percentage discounts take that share of the
/// total; flat discounts never exceed the total.
pub fn compute_discount(coupon: &coupon::Model, order_total: Decimal) -> Decimal {
    let raw = match coupon.discount_type {
        DiscountType::Percentage => (order_total * coupon.discount_amount / HUNDRED).round_dp(2),
        DiscountType::Flat => coupon.discount_amount,
    };
    raw.min(order_total).max(Decimal::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn sample(discount_type: DiscountType, amount: Decimal, min_order: Decimal) -> coupon::Model {
        coupon::Model {
            id: Uuid::new_v4(),
            code: "WELCOME50".into(),
            discount_type,
            discount_amount: amount,
            min_order_value: min_order,
            expiry_date: Utc::now() + chrono::Duration::days(30),
            is_active: true,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    #[test]
    fn ten_percent_of_1000_is_100() {
        let coupon = sample(DiscountType::Percentage, dec!(10), dec!(500));
        assert!(check_usable(&coupon, dec!(1000), Utc::now()).is_ok());
        assert_eq!(compute_discount(&coupon, dec!(1000)), dec!(100));
    }

    #[test]
    fn below_minimum_order_is_rejected() {
        let coupon = sample(DiscountType::Percentage, dec!(10), dec!(500));
        let err = check_usable(&coupon, dec!(400), Utc::now()).unwrap_err();
        assert_eq!(err.code(), "MIN_ORDER_NOT_MET");
    }

    #[test]
    fn inactive_coupon_is_rejected() {
        let mut coupon = sample(DiscountType::Flat, dec!(50), dec!(0));
        coupon.is_active = false;
        let err = check_usable(&coupon, dec!(1000), Utc::now()).unwrap_err();
        assert_eq!(err.code(), "INVALID_COUPON");
    }

    #[test]
    fn expired_coupon_is_rejected() {
        let mut coupon = sample(DiscountType::Flat, dec!(50), dec!(0));
        coupon.expiry_date = Utc::now() - chrono::Duration::days(1);
        let err = check_usable(&coupon, dec!(1000), Utc::now()).unwrap_err();
        assert_eq!(err.code(), "COUPON_EXPIRED");
    }

    #[test]
    fn flat_discount_is_clamped_to_total() {
        let coupon = sample(DiscountType::Flat, dec!(500), dec!(0));
        assert_eq!(compute_discount(&coupon, dec!(300)), dec!(300));
        assert_eq!(compute_discount(&coupon, dec!(800)), dec!(500));
    }

    proptest! {
        #[test]
        fn discount_never_exceeds_total_nor_goes_negative(
            total_cents in 0i64..10_000_000,
            amount_cents in 0i64..1_000_000,
            percentage in 0u32..=100,
            flat in proptest::bool::ANY,
        ) {
            let total = Decimal::new(total_cents, 2);
            let coupon = if flat {
                sample(DiscountType::Flat, Decimal::new(amount_cents, 2), Decimal::ZERO)
            } else {
                sample(DiscountType::Percentage, Decimal::from(percentage), Decimal::ZERO)
            };
            let discount = compute_discount(&coupon, total);
            prop_assert!(discount >= Decimal::ZERO);
            prop_assert!(discount <= total);
        }
    }
}
