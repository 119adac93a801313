pub mod category;
pub mod coupon;
pub mod customer;
pub mod customer_address;
pub mod device_token;
pub mod order;
pub mod order_item;
pub mod outbox_event;
pub mod product;
pub mod wishlist_item;

pub use category::Entity as Category;
pub use coupon::Entity as Coupon;
pub use customer::Entity as Customer;
pub use customer_address::Entity as CustomerAddress;
pub use device_token::Entity as DeviceToken;
pub use order::Entity as Order;
pub use order_item::Entity as OrderItem;
pub use outbox_event::Entity as OutboxEvent;
pub use product::Entity as Product;
pub use wishlist_item::Entity as WishlistItem;
