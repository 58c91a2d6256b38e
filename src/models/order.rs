use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};

/// Customer contact details captured at checkout.
///
/// Every field is optional on the wire; receipts render placeholders for
/// whatever is missing.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CustomerInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// A single line of a paid order. Belongs to exactly one destination.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    #[garde(skip)]
    #[serde(default)]
    pub id: String,

    #[garde(length(max = 200))]
    #[serde(default)]
    pub name: String,

    #[garde(range(min = 0.0))]
    pub price: f64,

    #[garde(range(min = 1))]
    pub quantity: u32,

    /// Drives the preparation-time estimate (beverage, snack, main, dessert).
    #[garde(skip)]
    #[serde(default)]
    pub category: Option<String>,

    #[garde(length(min = 1, max = 64))]
    pub destination_id: String,

    #[garde(length(max = 200))]
    #[serde(default)]
    pub destination_name: String,
}

impl LineItem {
    pub fn line_total(&self) -> f64 {
        self.price * f64::from(self.quantity)
    }
}

/// A completed, paid order handed over by the checkout flow.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    #[garde(length(min = 1, max = 128))]
    pub order_id: String,

    /// Pickup code shown to the customer.
    #[garde(length(min = 1, max = 32))]
    pub token_number: String,

    #[garde(range(min = 0.0))]
    pub total_amount: f64,

    #[garde(skip)]
    #[serde(default)]
    pub customer_info: CustomerInfo,

    #[garde(length(min = 1), dive)]
    pub items: Vec<LineItem>,

    #[garde(skip)]
    #[serde(default)]
    pub payment_reference: Option<String>,

    #[garde(skip)]
    #[serde(default)]
    pub paid_at: Option<DateTime<Utc>>,
}

/// The part of an order that one destination has to prepare.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderSlice {
    pub order_id: String,
    pub token_number: String,
    pub customer: CustomerInfo,
    pub destination_id: String,
    pub destination_name: String,
    pub items: Vec<LineItem>,
    pub subtotal: f64,
    pub paid_at: Option<DateTime<Utc>>,
}

impl OrderSlice {
    /// Number of distinct lines, as printed on alerts.
    pub fn item_count(&self) -> usize {
        self.items.len()
    }
}

impl Order {
    /// Group line items by destination, keeping destinations in the order
    /// they first appear and items in their original order.
    pub fn split_by_destination(&self) -> Vec<OrderSlice> {
        let mut slices: Vec<OrderSlice> = Vec::new();

        for item in &self.items {
            let position = slices
                .iter()
                .position(|s| s.destination_id == item.destination_id);

            let slice = match position {
                Some(idx) => &mut slices[idx],
                None => {
                    slices.push(OrderSlice {
                        order_id: self.order_id.clone(),
                        token_number: self.token_number.clone(),
                        customer: self.customer_info.clone(),
                        destination_id: item.destination_id.clone(),
                        destination_name: item.destination_name.clone(),
                        items: Vec::new(),
                        subtotal: 0.0,
                        paid_at: self.paid_at,
                    });
                    let last = slices.len() - 1;
                    &mut slices[last]
                }
            };

            if slice.destination_name.is_empty() {
                slice.destination_name = item.destination_name.clone();
            }
            slice.subtotal += item.line_total();
            slice.items.push(item.clone());
        }

        slices
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(name: &str, price: f64, quantity: u32, destination: &str) -> LineItem {
        LineItem {
            id: name.to_lowercase(),
            name: name.to_string(),
            price,
            quantity,
            category: None,
            destination_id: destination.to_string(),
            destination_name: destination.to_uppercase(),
        }
    }

    fn order(items: Vec<LineItem>) -> Order {
        Order {
            order_id: "ord-1".to_string(),
            token_number: "A17".to_string(),
            total_amount: items.iter().map(LineItem::line_total).sum(),
            customer_info: CustomerInfo::default(),
            items,
            payment_reference: None,
            paid_at: None,
        }
    }

    #[test]
    fn test_split_groups_and_sums_per_destination() {
        let order = order(vec![
            item("Dosa", 100.0, 1, "alpha"),
            item("Lassi", 80.0, 1, "beta"),
            item("Idli", 150.0, 2, "alpha"),
        ]);

        let slices = order.split_by_destination();
        assert_eq!(slices.len(), 2);

        assert_eq!(slices[0].destination_id, "alpha");
        assert_eq!(slices[0].items.len(), 2);
        assert!((slices[0].subtotal - 400.0).abs() < f64::EPSILON);

        assert_eq!(slices[1].destination_id, "beta");
        assert!((slices[1].subtotal - 80.0).abs() < f64::EPSILON);

        let total: f64 = slices.iter().map(|s| s.subtotal).sum();
        assert!((total - order.total_amount).abs() < f64::EPSILON);
    }

    #[test]
    fn test_split_empty_order() {
        let order = order(Vec::new());
        assert!(order.split_by_destination().is_empty());
    }

    #[test]
    fn test_validation_rejects_zero_quantity() {
        let order = order(vec![item("Tea", 10.0, 0, "alpha")]);
        assert!(order.validate().is_err());
    }

    #[test]
    fn test_order_deserializes_from_checkout_json() {
        let json = serde_json::json!({
            "orderId": "abc123",
            "tokenNumber": "B04",
            "totalAmount": 60.0,
            "customerInfo": { "name": "Asha", "phone": "+91-90000" },
            "items": [{
                "id": "tea",
                "name": "Masala Tea",
                "price": 30.0,
                "quantity": 2,
                "category": "beverage",
                "destinationId": "zuzu",
                "destinationName": "ZUZU"
            }]
        });

        let order: Order = serde_json::from_value(json).unwrap();
        assert_eq!(order.customer_info.email, None);
        assert_eq!(order.items[0].category.as_deref(), Some("beverage"));
        assert!(order.validate().is_ok());
    }
}
