use std::sync::Arc;

use crate::services::{
    catalog::CatalogService, coupons::CouponService, customers::CustomerService,
    notifications::NotificationFeed, orders::OrderService, payments::PaymentService,
    returns::ReturnService,
};

pub mod auth;
pub mod coupons;
pub mod customers;
pub mod notifications;
pub mod orders;
pub mod payments;
pub mod products;
pub mod returns;

/// Service container handed to every handler through [`crate::AppState`].
#[derive(Clone)]
pub struct AppServices {
    pub catalog: Arc<CatalogService>,
    pub coupons: Arc<CouponService>,
    pub customers: Arc<CustomerService>,
    pub orders: Arc<OrderService>,
    pub returns: Arc<ReturnService>,
    pub payments: Arc<PaymentService>,
    pub feed: NotificationFeed,
}
