//! Paid orders used across the dispatch tests

use chrono::{TimeZone, Utc};

use receipt_dispatch::models::order::{CustomerInfo, LineItem, Order};

pub fn item(name: &str, price: f64, quantity: u32, destination_id: &str) -> LineItem {
    LineItem {
        id: format!("{destination_id}-{name}"),
        name: name.to_string(),
        price,
        quantity,
        category: Some("main".to_string()),
        destination_id: destination_id.to_string(),
        destination_name: destination_id.to_uppercase(),
    }
}

pub fn order(token: &str, items: Vec<LineItem>) -> Order {
    let total_amount = items.iter().map(LineItem::line_total).sum();
    Order {
        order_id: format!("order_{token}_20260101"),
        token_number: token.to_string(),
        total_amount,
        customer_info: CustomerInfo {
            name: Some("Asha".to_string()),
            phone: Some("+91-9000000000".to_string()),
            email: Some("asha@example.com".to_string()),
        },
        items,
        payment_reference: Some(format!("pay_{token}")),
        paid_at: Utc.with_ymd_and_hms(2026, 1, 1, 12, 30, 0).single(),
    }
}

/// Two lines for `alpha` (100 x1, 150 x2) and one for `beta` (80 x1).
pub fn split_order() -> Order {
    order(
        "T100",
        vec![
            item("Paneer Roll", 100.0, 1, "alpha"),
            item("Veg Biryani", 150.0, 2, "alpha"),
            item("Mango Shake", 80.0, 1, "beta"),
        ],
    )
}

pub fn alpha_only(token: &str) -> Order {
    order(token, vec![item("Masala Dosa", 90.0, 1, "alpha")])
}
