use serde::{Deserialize, Serialize};

use kade_core::{DomainError, DomainResult, Money, ProductId};

/// Order status lifecycle on the kitchen board:
/// `pending` → `in_progress` → `ready` → `completed`, or `cancelled`.
///
/// Orders always enter the backend as `Pending`; the kitchen moves them on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    InProgress,
    Ready,
    Completed,
    Cancelled,
}

/// Order line: product, display name, price at the time of sale, quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: ProductId,
    pub name: String,
    pub unit_price: Money,
    pub quantity: u32,
}

impl OrderLine {
    pub fn new(product_id: ProductId, name: impl Into<String>, unit_price: Money, quantity: u32) -> Self {
        Self {
            product_id,
            name: name.into(),
            unit_price,
            quantity,
        }
    }

    /// `unit_price × quantity`.
    pub fn amount(&self) -> DomainResult<Money> {
        self.unit_price.times(self.quantity)
    }
}

/// Sum of line amounts.
pub fn order_total(lines: &[OrderLine]) -> DomainResult<Money> {
    let amounts = lines.iter().map(OrderLine::amount).collect::<DomainResult<Vec<_>>>()?;
    Money::sum(amounts)
}

/// Check that `lines` form a valid order whose total is `total`.
///
/// An order needs at least one line, every quantity must be at least 1 and
/// the recorded total must equal the line sum.
pub fn validate_lines(lines: &[OrderLine], total: Money) -> DomainResult<()> {
    if lines.is_empty() {
        return Err(DomainError::validation("order must contain at least one item"));
    }

    if let Some(line) = lines.iter().find(|l| l.quantity == 0) {
        return Err(DomainError::validation(format!(
            "quantity for '{}' must be at least 1",
            line.name
        )));
    }

    let computed = order_total(lines)?;
    if computed != total {
        return Err(DomainError::invariant(format!(
            "total {total} does not match item sum {computed}"
        )));
    }

    Ok(())
}
