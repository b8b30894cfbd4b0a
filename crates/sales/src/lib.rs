//! Sales domain for the POS terminal.
//!
//! This crate contains the business rules around taking an order at the
//! counter, implemented purely as deterministic domain logic (no IO, no
//! HTTP, no storage): the menu catalog, the cart, order lines and totals,
//! and receipt rendering.

pub mod cart;
pub mod menu;
pub mod order;
pub mod receipt;

pub use cart::{Cart, CartLine};
pub use menu::{MenuCategory, MenuItem, sort_for_display};
pub use order::{OrderLine, OrderStatus, order_total, validate_lines};
pub use receipt::{Receipt, ReceiptRef, ShopInfo};
