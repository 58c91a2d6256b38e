//! Fixed-width receipt rendering.
//!
//! Rendering is pure: the same slice and template always produce the same
//! bytes. The printed date comes from the order's payment time, never from
//! the wall clock. Missing fields render as `N/A` instead of failing.

use std::fmt::Write;

use crate::models::order::{LineItem, OrderSlice};

const PLACEHOLDER: &str = "N/A";
const ITEM_NAME_WIDTH: usize = 20;
const PRICE_INDENT: usize = 25;

/// Static text printed around every receipt.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceiptTemplate {
    pub brand: String,
    pub support_contact: String,
    pub pickup_window_minutes: u32,
    pub currency: String,
    pub width: usize,
}

impl Default for ReceiptTemplate {
    fn default() -> Self {
        Self {
            brand: "DIGITAL FOOD STREET".to_string(),
            support_contact: "+91-8306461994".to_string(),
            pickup_window_minutes: 45,
            currency: "₹".to_string(),
            width: 37,
        }
    }
}

/// Render the receipt for one destination's share of an order.
pub fn render_receipt(slice: &OrderSlice, template: &ReceiptTemplate) -> String {
    let rule = "=".repeat(template.width);
    let shop = shop_name(slice);
    let token = or_placeholder(&slice.token_number);
    let date = slice
        .paid_at
        .map(|t| t.format("%d/%m/%Y, %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| PLACEHOLDER.to_string());

    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = writeln!(out, "{rule}");
    let _ = writeln!(out, "{}", center(&shop, template.width));
    let _ = writeln!(out, "{}", center(&template.brand, template.width));
    let _ = writeln!(out, "{rule}");
    let _ = writeln!(out, "Date: {date}");
    let _ = writeln!(out, "Token: {token}");
    let _ = writeln!(out, "Order: {}", short_order_id(&slice.order_id));
    let _ = writeln!(out, "{rule}");
    let _ = writeln!(out, "CUSTOMER DETAILS:");
    let _ = writeln!(out, "Name: {}", opt_or_placeholder(slice.customer.name.as_deref()));
    let _ = writeln!(out, "Phone: {}", opt_or_placeholder(slice.customer.phone.as_deref()));
    let _ = writeln!(out, "Email: {}", opt_or_placeholder(slice.customer.email.as_deref()));
    let _ = writeln!(out, "{rule}");
    let _ = writeln!(out, "ORDER ITEMS:");

    for item in &slice.items {
        write_item(&mut out, item, &template.currency);
    }

    let _ = writeln!(out, "{rule}");
    let _ = writeln!(out, "TOTAL AMOUNT: {}{:.2}", template.currency, slice.subtotal);
    let _ = writeln!(out, "PAYMENT: PAID ONLINE");
    let _ = writeln!(out, "STATUS: CONFIRMED");
    let _ = writeln!(out, "{rule}");
    let _ = writeln!(out, "PICKUP INSTRUCTIONS:");
    let _ = writeln!(out, "1. Show this token: {token}");
    let _ = writeln!(out, "2. Present student ID for verification");
    let _ = writeln!(out, "3. Pickup within {} minutes", template.pickup_window_minutes);
    let _ = writeln!(out, "4. Contact: {}", template.support_contact);
    let _ = writeln!(out, "{rule}");
    let _ = writeln!(out, "{}", center("Thank you for choosing Food Street!", template.width));
    let _ = writeln!(out, "{}", center("Visit us again soon!", template.width));
    let _ = writeln!(out, "{rule}");

    out
}

fn write_item(out: &mut String, item: &LineItem, currency: &str) {
    let name: String = or_placeholder(&item.name).chars().take(ITEM_NAME_WIDTH).collect();
    let _ = writeln!(out, "{name:<ITEM_NAME_WIDTH$} x{}", item.quantity);
    let _ = writeln!(out, "{}{currency}{:.2}", " ".repeat(PRICE_INDENT), item.line_total());
}

fn shop_name(slice: &OrderSlice) -> String {
    let name = if slice.destination_name.trim().is_empty() {
        &slice.destination_id
    } else {
        &slice.destination_name
    };
    or_placeholder(name).to_uppercase()
}

/// Last eight characters, which is what shop staff read out.
fn short_order_id(order_id: &str) -> String {
    let chars: Vec<char> = order_id.trim().chars().collect();
    if chars.is_empty() {
        return PLACEHOLDER.to_string();
    }
    let start = chars.len().saturating_sub(8);
    chars[start..].iter().collect()
}

fn center(text: &str, width: usize) -> String {
    let len = text.chars().count();
    if len >= width {
        return text.to_string();
    }
    format!("{}{text}", " ".repeat((width - len) / 2))
}

fn or_placeholder(value: &str) -> &str {
    if value.trim().is_empty() {
        PLACEHOLDER
    } else {
        value
    }
}

fn opt_or_placeholder(value: Option<&str>) -> &str {
    or_placeholder(value.unwrap_or(""))
}

/// Preparation estimate in minutes: the slowest line (base minutes for its
/// category times quantity), capped at 25.
pub fn estimate_prep_minutes(items: &[LineItem]) -> u32 {
    items
        .iter()
        .map(|item| {
            let base: u32 = match item.category.as_deref().map(str::to_lowercase).as_deref() {
                Some("beverage") => 3,
                Some("snack") => 5,
                Some("main") | None => 12,
                Some("dessert") => 8,
                Some(_) => 10,
            };
            base.saturating_mul(item.quantity)
        })
        .max()
        .unwrap_or(0)
        .min(25)
}
