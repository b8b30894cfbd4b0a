//! The counter cart: what the cashier is ringing up right now.

use kade_core::{DomainError, DomainResult, Money, ProductId};

use crate::menu::MenuItem;
use crate::order::{OrderLine, order_total};

/// One cart row.
pub type CartLine = OrderLine;

/// In-progress order at the counter.
///
/// Lines keep the order in which products were first added.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cart {
    lines: Vec<CartLine>,
}

impl Cart {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Number of units across all lines.
    pub fn unit_count(&self) -> u32 {
        self.lines.iter().map(|l| l.quantity).sum()
    }

    /// Add one unit of `item`. Adding a product already in the cart bumps
    /// its quantity instead of creating a second line.
    pub fn add(&mut self, item: &MenuItem) -> DomainResult<()> {
        if !item.is_available {
            return Err(DomainError::validation(format!(
                "'{}' is not available",
                item.name
            )));
        }

        match self.lines.iter_mut().find(|l| l.product_id == item.id) {
            Some(line) => line.quantity += 1,
            None => self
                .lines
                .push(OrderLine::new(item.id, item.name.clone(), item.price, 1)),
        }
        Ok(())
    }

    /// Remove the line for `product_id` (no-op if absent).
    pub fn remove(&mut self, product_id: ProductId) {
        self.lines.retain(|l| l.product_id != product_id);
    }

    /// Set the quantity of an existing line; 0 removes the line.
    pub fn set_quantity(&mut self, product_id: ProductId, quantity: u32) -> DomainResult<()> {
        if quantity == 0 {
            self.remove(product_id);
            return Ok(());
        }

        let line = self
            .lines
            .iter_mut()
            .find(|l| l.product_id == product_id)
            .ok_or_else(|| DomainError::not_found(format!("product {product_id} in cart")))?;
        line.quantity = quantity;
        Ok(())
    }

    pub fn total(&self) -> DomainResult<Money> {
        order_total(&self.lines)
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }
}
