//! Customer receipts.
//!
//! Receipts are rendered to a self-contained HTML page sized for an 80mm
//! thermal printer, or to plain text for the terminal. Orders taken while
//! offline carry a temporary `OFF-NNNN` reference until they are synced.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use kade_core::{DomainResult, Money, OrderId};

use crate::order::{OrderLine, order_total};

/// Printable width of the plain-text receipt, in characters.
const TEXT_WIDTH: usize = 32;

/// Header/footer details printed on every receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShopInfo {
    pub name: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub footer: String,
}

impl Default for ShopInfo {
    fn default() -> Self {
        Self {
            name: "Kade".to_string(),
            address: None,
            phone: None,
            footer: "Thank you! Come again.".to_string(),
        }
    }
}

/// What the receipt refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReceiptRef {
    /// Order stored remotely.
    Order(OrderId),
    /// Order waiting in the offline queue.
    Offline(String),
}

impl ReceiptRef {
    /// Temporary reference for an offline order: `OFF-` followed by the last
    /// four digits of the epoch milliseconds.
    pub fn offline_at(at: DateTime<Utc>) -> Self {
        let millis = at.timestamp_millis().rem_euclid(10_000);
        ReceiptRef::Offline(format!("OFF-{millis:04}"))
    }
}

impl core::fmt::Display for ReceiptRef {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ReceiptRef::Order(id) => write!(f, "#{id}"),
            ReceiptRef::Offline(tmp) => f.write_str(tmp),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub reference: ReceiptRef,
    pub issued_at: DateTime<Utc>,
    pub lines: Vec<OrderLine>,
    pub total: Money,
}

impl Receipt {
    pub fn new(reference: ReceiptRef, issued_at: DateTime<Utc>, lines: Vec<OrderLine>) -> DomainResult<Self> {
        let total = order_total(&lines)?;
        Ok(Self {
            reference,
            issued_at,
            lines,
            total,
        })
    }

    pub fn render_text(&self, shop: &ShopInfo) -> DomainResult<String> {
        let mut out = String::new();
        let width = TEXT_WIDTH;
        let rule = "-".repeat(width);

        let _ = writeln!(out, "{:^width$}", shop.name.to_uppercase());
        if let Some(address) = &shop.address {
            let _ = writeln!(out, "{address:^width$}");
        }
        if let Some(phone) = &shop.phone {
            let _ = writeln!(out, "{phone:^width$}");
        }
        let _ = writeln!(out, "{rule}");
        let _ = writeln!(out, "Order: {}", self.reference);
        let _ = writeln!(out, "Date:  {}", self.issued_at.format("%Y-%m-%d %H:%M"));
        let _ = writeln!(out, "{rule}");

        for line in &self.lines {
            let label = format!("{} x {}", line.quantity, line.name);
            let amount = line.amount()?.to_string();
            let pad = width.saturating_sub(amount.len() + 1);
            let _ = writeln!(out, "{label:<pad$} {amount}");
            let _ = writeln!(out, "    @ {}", line.unit_price);
        }

        let _ = writeln!(out, "{rule}");
        let total = self.total.to_string();
        let pad = width.saturating_sub(total.len() + 1);
        let _ = writeln!(out, "{:<pad$} {total}", "TOTAL");
        let _ = writeln!(out, "{rule}");
        let _ = writeln!(out, "{:^width$}", shop.footer);
        Ok(out)
    }

    pub fn render_html(&self, shop: &ShopInfo) -> DomainResult<String> {
        let mut items = String::new();
        for line in &self.lines {
            let _ = write!(
                items,
                r#"<div class="item"><div class="item-row"><span class="qty">{qty}</span><span class="name">{name}</span></div><div class="price-row"><span class="price-unit">@ {unit}</span><span class="price-total">{amount}</span></div></div>"#,
                qty = line.quantity,
                name = escape_html(&line.name),
                unit = line.unit_price,
                amount = line.amount()?,
            );
        }

        let mut header = format!(r#"<div class="shop-name">{}</div>"#, escape_html(&shop.name));
        for info in [&shop.address, &shop.phone].into_iter().flatten() {
            let _ = write!(header, r#"<div class="shop-info">{}</div>"#, escape_html(info));
        }

        Ok(format!(
            r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>Receipt</title>
<style>
@page {{ margin: 0; size: auto; }}
body {{ font-family: 'Courier New', Courier, monospace; width: 280px; margin: 0; padding: 10px 0; font-size: 12px; color: black; }}
.header {{ margin-bottom: 15px; text-align: center; }}
.shop-name {{ font-size: 18px; font-weight: bold; margin: 5px 0; text-transform: uppercase; }}
.shop-info {{ font-size: 10px; margin-bottom: 2px; }}
.item-row, .price-row, .total {{ display: flex; justify-content: space-between; }}
.qty {{ margin-right: 8px; }}
.price-row {{ font-size: 10px; padding-left: 16px; }}
.total {{ font-weight: bold; font-size: 14px; border-top: 1px dashed black; margin-top: 8px; padding-top: 8px; }}
.footer {{ text-align: center; margin-top: 15px; font-size: 10px; }}
</style>
</head>
<body>
<div class="header">{header}<div class="shop-info">Order {reference}</div><div class="shop-info">{date}</div></div>
{items}
<div class="total"><span>TOTAL</span><span>{total}</span></div>
<div class="footer">{footer}</div>
</body>
</html>
"#,
            reference = escape_html(&self.reference.to_string()),
            date = self.issued_at.format("%Y-%m-%d %H:%M"),
            total = self.total,
            footer = escape_html(&shop.footer),
        ))
    }
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use kade_core::ProductId;

    fn sample() -> Receipt {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        Receipt::new(
            ReceiptRef::Order(OrderId::new(81)),
            at,
            vec![
                OrderLine::new(ProductId::new(1), "Rice", Money::from_units(100), 2),
                OrderLine::new(ProductId::new(4), "Fish & Chips", Money::from_units(550), 1),
            ],
        )
        .unwrap()
    }

    #[test]
    fn offline_reference_uses_last_four_millis_digits() {
        let at = Utc.timestamp_millis_opt(1_714_566_601_234).unwrap();
        assert_eq!(ReceiptRef::offline_at(at), ReceiptRef::Offline("OFF-1234".into()));

        let at = Utc.timestamp_millis_opt(1_714_566_600_007).unwrap();
        assert_eq!(ReceiptRef::offline_at(at).to_string(), "OFF-0007");
    }

    #[test]
    fn text_receipt_lists_every_line_and_total() {
        let text = sample().render_text(&ShopInfo::default()).unwrap();
        assert!(text.contains("Order: #81"));
        assert!(text.contains("2 x Rice"));
        assert!(text.contains("200.00"));
        assert!(text.contains("1 x Fish & Chips"));
        assert!(text.lines().any(|l| l.starts_with("TOTAL") && l.ends_with("750.00")));
    }

    #[test]
    fn html_receipt_escapes_names() {
        let html = sample().render_html(&ShopInfo::default()).unwrap();
        assert!(html.contains("Fish &amp; Chips"));
        assert!(html.contains("<span>750.00</span>"));
        assert!(html.contains("Order #81"));
    }
}
