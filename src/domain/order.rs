use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SignalError;

/// Lifecycle status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Accepted,
    Completed,
    Declined,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 5] = [
        OrderStatus::Pending,
        OrderStatus::Accepted,
        OrderStatus::Completed,
        OrderStatus::Declined,
        OrderStatus::Cancelled,
    ];

    /// Returns `true` if no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Declined | Self::Cancelled)
    }

    /// Statuses directly reachable from this one.
    pub fn successors(&self) -> &'static [OrderStatus] {
        match self {
            Self::Pending => &[Self::Accepted, Self::Declined, Self::Cancelled],
            Self::Accepted => &[Self::Completed, Self::Cancelled],
            Self::Completed | Self::Declined | Self::Cancelled => &[],
        }
    }

    /// `true` if `other` is this status or can be reached from it through
    /// any number of transitions.
    pub fn reaches(&self, other: OrderStatus) -> bool {
        *self == other || self.successors().iter().any(|next| next.reaches(other))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Completed => "completed",
            Self::Declined => "declined",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = SignalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "accepted" => Ok(Self::Accepted),
            "completed" => Ok(Self::Completed),
            "declined" => Ok(Self::Declined),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(SignalError::UnknownStatus(other.to_string())),
        }
    }
}

/// A single line of an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub name: String,
    pub unit_price: f64,
    pub quantity: u32,
}

impl OrderItem {
    pub fn new(name: impl Into<String>, unit_price: f64, quantity: u32) -> Self {
        Self {
            name: name.into(),
            unit_price,
            quantity,
        }
    }

    pub fn line_total(&self) -> f64 {
        self.unit_price * f64::from(self.quantity)
    }
}

/// Represents a customer order as stored in the snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    pub status: OrderStatus,
    /// Epoch milliseconds. Anchors the cancellation window.
    pub created_at: i64,
    pub items: Vec<OrderItem>,
    pub total: f64,
    pub customer_id: String,
    pub rider_id: Option<String>,
    pub vendor_ref: Option<String>,
    #[serde(default)]
    pub penalty_charged: bool,
}

impl Order {
    /// Builds a freshly placed order. The status is always `Pending`.
    pub fn placed(id: impl Into<String>, created_at: i64, create: OrderCreate) -> Self {
        let total = create.total.unwrap_or_else(|| create.items_total());
        Self {
            id: id.into(),
            status: OrderStatus::Pending,
            created_at,
            items: create.items,
            total,
            customer_id: create.customer_id,
            rider_id: None,
            vendor_ref: create.vendor_ref,
            penalty_charged: false,
        }
    }

    /// Returns a copy of this order with `status` replaced.
    pub fn with_status(&self, status: OrderStatus) -> Self {
        Self {
            status,
            ..self.clone()
        }
    }
}

/// Payload for placing a new order.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderCreate {
    pub customer_id: String,
    pub vendor_ref: Option<String>,
    pub items: Vec<OrderItem>,
    /// Explicit total; derived from the items when absent.
    pub total: Option<f64>,
}

impl OrderCreate {
    pub fn new(customer_id: impl Into<String>, items: Vec<OrderItem>) -> Self {
        Self {
            customer_id: customer_id.into(),
            vendor_ref: None,
            items,
            total: None,
        }
    }

    pub fn with_vendor(mut self, vendor_ref: impl Into<String>) -> Self {
        self.vendor_ref = Some(vendor_ref.into());
        self
    }

    pub fn with_total(mut self, total: f64) -> Self {
        self.total = Some(total);
        self
    }

    pub fn items_total(&self) -> f64 {
        self.items.iter().map(OrderItem::line_total).sum()
    }

    /// Checks the monetary fields before the order is stored.
    pub fn validate(&self) -> Result<(), String> {
        if self.customer_id.trim().is_empty() {
            return Err("customer id required".to_string());
        }
        for item in &self.items {
            if !item.unit_price.is_finite() || item.unit_price < 0.0 {
                return Err(format!("invalid unit price for {}: {}", item.name, item.unit_price));
            }
        }
        if let Some(total) = self.total {
            if !total.is_finite() || total < 0.0 {
                return Err(format!("invalid total: {}", total));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses_have_no_successors() {
        for status in OrderStatus::ALL {
            assert_eq!(status.is_terminal(), status.successors().is_empty());
        }
    }

    #[test]
    fn nothing_reaches_pending_again() {
        for status in OrderStatus::ALL {
            if status != OrderStatus::Pending {
                assert!(!status.reaches(OrderStatus::Pending), "{status} reaches pending");
            }
        }
        assert!(OrderStatus::Pending.reaches(OrderStatus::Completed));
        assert!(!OrderStatus::Declined.reaches(OrderStatus::Cancelled));
    }

    #[test]
    fn status_parses_only_known_names() {
        assert_eq!("accepted".parse::<OrderStatus>(), Ok(OrderStatus::Accepted));
        assert_eq!(
            "Accepted".parse::<OrderStatus>(),
            Err(SignalError::UnknownStatus("Accepted".to_string()))
        );
    }

    #[test]
    fn placed_order_derives_total_and_uses_camel_case_layout() {
        let create = OrderCreate::new(
            "cust_1",
            vec![OrderItem::new("Jollof", 12.5, 2), OrderItem::new("Water", 1.0, 3)],
        )
        .with_vendor("vendor_9");
        let order = Order::placed("order_1", 1_000, create);

        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.total, 28.0);
        assert!(!order.penalty_charged);

        let json = serde_json::to_value(&order).unwrap();
        assert_eq!(json["createdAt"], 1_000);
        assert_eq!(json["customerId"], "cust_1");
        assert_eq!(json["status"], "pending");
        assert_eq!(json["items"][0]["unitPrice"], 12.5);
        assert!(json["riderId"].is_null());
    }

    #[test]
    fn create_rejects_negative_money() {
        let bad_price = OrderCreate::new("c", vec![OrderItem::new("x", -1.0, 1)]);
        assert!(bad_price.validate().is_err());

        let bad_total = OrderCreate::new("c", vec![]).with_total(f64::NAN);
        assert!(bad_total.validate().is_err());

        let no_customer = OrderCreate::new("  ", vec![]);
        assert!(no_customer.validate().is_err());

        assert!(OrderCreate::new("c", vec![OrderItem::new("x", 0.0, 0)]).validate().is_ok());
    }
}
