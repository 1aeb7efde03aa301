use crate::config::MAX_SYMBOL_LEN;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

const MAX_TITLE_LEN: usize = 255;
const DEFAULT_AMOUNT: f64 = 1.0;

/// A simulated trade owned by a user
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub symbol: String,
    pub amount: Option<f64>,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub leverage: i32,
    pub initial_price: f64,
    pub closing_price: Option<f64>,
    pub start_date_time: DateTime<Utc>,
    pub close_date_time: Option<DateTime<Utc>>,
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.title)
    }
}

/// Compact representation used by list responses
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderSummary {
    pub id: i64,
    pub symbol: String,
    pub initial_price: f64,
    pub start_date_time: DateTime<Utc>,
}

impl From<&Order> for OrderSummary {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id,
            symbol: order.symbol.clone(),
            initial_price: order.initial_price,
            start_date_time: order.start_date_time,
        }
    }
}

/// Full representation used by every non-list response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderDetail {
    pub id: i64,
    pub symbol: String,
    pub initial_price: f64,
    pub start_date_time: DateTime<Utc>,
    pub amount: Option<f64>,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub leverage: i32,
    pub close_date_time: Option<DateTime<Utc>>,
    pub closing_price: Option<f64>,
}

impl From<&Order> for OrderDetail {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id,
            symbol: order.symbol.clone(),
            initial_price: order.initial_price,
            start_date_time: order.start_date_time,
            amount: order.amount,
            stop_loss: order.stop_loss,
            take_profit: order.take_profit,
            leverage: order.leverage,
            close_date_time: order.close_date_time,
            closing_price: order.closing_price,
        }
    }
}

/// Writable order fields, as accepted by create and full update
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewOrder {
    pub symbol: String,
    pub initial_price: f64,
    pub start_date_time: DateTime<Utc>,
    #[serde(default)]
    pub amount: Option<f64>,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub leverage: i32,
    #[serde(default)]
    pub close_date_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub closing_price: Option<f64>,
    #[serde(default)]
    pub title: Option<String>,
}

impl NewOrder {
    /// Check field constraints and fill in defaults (title, amount)
    pub fn validated(mut self) -> Result<Self> {
        self.symbol = self.symbol.trim().to_string();
        if self.symbol.is_empty() || self.symbol.chars().count() > MAX_SYMBOL_LEN {
            return Err(Error::validation(format!(
                "symbol must be 1..={} characters",
                MAX_SYMBOL_LEN
            )));
        }
        if self.leverage < 1 {
            return Err(Error::validation("leverage must be at least 1"));
        }

        let prices = [
            ("initial_price", Some(self.initial_price)),
            ("stop_loss", Some(self.stop_loss)),
            ("take_profit", Some(self.take_profit)),
            ("amount", self.amount),
            ("closing_price", self.closing_price),
        ];
        for (field, value) in prices {
            if let Some(v) = value {
                if !v.is_finite() {
                    return Err(Error::validation(format!("{} must be a finite number", field)));
                }
            }
        }

        if let Some(closed) = self.close_date_time {
            if closed < self.start_date_time {
                return Err(Error::validation(
                    "close_date_time must not be earlier than start_date_time",
                ));
            }
        }

        let title = match self.title.take() {
            Some(t) if !t.trim().is_empty() => t.trim().to_string(),
            _ => default_title(&self.symbol, self.start_date_time),
        };
        if title.chars().count() > MAX_TITLE_LEN {
            return Err(Error::validation(format!(
                "title must be at most {} characters",
                MAX_TITLE_LEN
            )));
        }
        self.title = Some(title);
        self.amount = Some(self.amount.unwrap_or(DEFAULT_AMOUNT));

        Ok(self)
    }

    /// Title after validation; falls back to the generated one
    pub fn title(&self) -> String {
        self.title
            .clone()
            .unwrap_or_else(|| default_title(&self.symbol, self.start_date_time))
    }
}

/// Full update body. Required fields are replaced; an absent optional field
/// keeps its stored value, an explicit `null` clears it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderReplace {
    pub symbol: String,
    pub initial_price: f64,
    pub start_date_time: DateTime<Utc>,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub leverage: i32,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "::serde_with::rust::double_option"
    )]
    pub amount: Option<Option<f64>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "::serde_with::rust::double_option"
    )]
    pub close_date_time: Option<Option<DateTime<Utc>>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "::serde_with::rust::double_option"
    )]
    pub closing_price: Option<Option<f64>>,
    #[serde(default)]
    pub title: Option<String>,
}

impl OrderReplace {
    /// Resolve against the stored order, yielding the full set of new values
    pub fn apply(self, order: &Order) -> NewOrder {
        NewOrder {
            symbol: self.symbol,
            initial_price: self.initial_price,
            start_date_time: self.start_date_time,
            amount: self.amount.unwrap_or(order.amount),
            stop_loss: self.stop_loss,
            take_profit: self.take_profit,
            leverage: self.leverage,
            close_date_time: self.close_date_time.unwrap_or(order.close_date_time),
            closing_price: self.closing_price.unwrap_or(order.closing_price),
            title: Some(self.title.unwrap_or_else(|| order.title.clone())),
        }
    }
}

/// Partial update: only present fields change
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct OrderPatch {
    pub symbol: Option<String>,
    pub initial_price: Option<f64>,
    pub start_date_time: Option<DateTime<Utc>>,
    pub amount: Option<f64>,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub leverage: Option<i32>,
    pub close_date_time: Option<DateTime<Utc>>,
    pub closing_price: Option<f64>,
    pub title: Option<String>,
}

impl OrderPatch {
    /// Merge onto an existing order, yielding the full set of new values
    pub fn apply(self, order: &Order) -> NewOrder {
        NewOrder {
            symbol: self.symbol.unwrap_or_else(|| order.symbol.clone()),
            initial_price: self.initial_price.unwrap_or(order.initial_price),
            start_date_time: self.start_date_time.unwrap_or(order.start_date_time),
            amount: self.amount.or(order.amount),
            stop_loss: self.stop_loss.unwrap_or(order.stop_loss),
            take_profit: self.take_profit.unwrap_or(order.take_profit),
            leverage: self.leverage.unwrap_or(order.leverage),
            close_date_time: self.close_date_time.or(order.close_date_time),
            closing_price: self.closing_price.or(order.closing_price),
            title: Some(self.title.unwrap_or_else(|| order.title.clone())),
        }
    }
}

pub fn default_title(symbol: &str, start: DateTime<Utc>) -> String {
    format!(
        "{} order created on {}",
        symbol,
        start.format("%Y-%m-%d %H:%M:%S")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> NewOrder {
        NewOrder {
            symbol: "BTC".to_string(),
            initial_price: 133100000.0,
            start_date_time: Utc.with_ymd_and_hms(2023, 1, 13, 14, 30, 12).unwrap(),
            amount: None,
            stop_loss: 131100000.0,
            take_profit: 163000000.0,
            leverage: 10,
            close_date_time: None,
            closing_price: None,
            title: None,
        }
    }

    #[test]
    fn test_default_title_and_amount() {
        let order = sample().validated().unwrap();

        assert_eq!(order.title(), "BTC order created on 2023-01-13 14:30:12");
        assert_eq!(order.amount, Some(1.0));
    }

    #[test]
    fn test_explicit_title_kept() {
        let mut input = sample();
        input.title = Some("  my long ".to_string());
        let order = input.validated().unwrap();

        assert_eq!(order.title(), "my long");
    }

    #[test]
    fn test_symbol_length_enforced() {
        let mut input = sample();
        input.symbol = "ABCDEFGHIJK".to_string();
        assert!(matches!(input.validated(), Err(Error::Validation(_))));

        let mut input = sample();
        input.symbol = " ".to_string();
        assert!(matches!(input.validated(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_leverage_must_be_positive() {
        let mut input = sample();
        input.leverage = 0;
        assert!(matches!(input.validated(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_non_finite_price_rejected() {
        let mut input = sample();
        input.closing_price = Some(f64::NAN);
        assert!(matches!(input.validated(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_close_before_start_rejected() {
        let mut input = sample();
        input.close_date_time = Some(Utc.with_ymd_and_hms(2023, 1, 12, 0, 0, 0).unwrap());
        assert!(matches!(input.validated(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_display_is_title() {
        let input = sample().validated().unwrap();
        let order = Order {
            id: 1,
            user_id: 1,
            title: input.title(),
            symbol: input.symbol.clone(),
            amount: input.amount,
            stop_loss: input.stop_loss,
            take_profit: input.take_profit,
            leverage: input.leverage,
            initial_price: input.initial_price,
            closing_price: None,
            start_date_time: input.start_date_time,
            close_date_time: None,
        };

        assert_eq!(order.to_string(), order.title);
    }

    #[test]
    fn test_patch_merges_present_fields() {
        let input = sample().validated().unwrap();
        let order = Order {
            id: 7,
            user_id: 1,
            title: input.title(),
            symbol: input.symbol.clone(),
            amount: input.amount,
            stop_loss: input.stop_loss,
            take_profit: input.take_profit,
            leverage: input.leverage,
            initial_price: input.initial_price,
            closing_price: None,
            start_date_time: input.start_date_time,
            close_date_time: None,
        };

        let patch = OrderPatch {
            closing_price: Some(150000000.0),
            leverage: Some(5),
            ..Default::default()
        };
        let merged = patch.apply(&order);

        assert_eq!(merged.closing_price, Some(150000000.0));
        assert_eq!(merged.leverage, 5);
        assert_eq!(merged.symbol, "BTC");
        assert_eq!(merged.title(), order.title);
    }

    fn stored() -> Order {
        let input = sample().validated().unwrap();
        Order {
            id: 9,
            user_id: 1,
            title: input.title(),
            symbol: input.symbol.clone(),
            amount: Some(5.0),
            stop_loss: input.stop_loss,
            take_profit: input.take_profit,
            leverage: input.leverage,
            initial_price: input.initial_price,
            closing_price: Some(140000000.0),
            start_date_time: input.start_date_time,
            close_date_time: Some(Utc.with_ymd_and_hms(2023, 1, 14, 0, 0, 0).unwrap()),
        }
    }

    #[test]
    fn test_replace_keeps_absent_optionals() {
        let order = stored();
        let body: OrderReplace = serde_json::from_value(serde_json::json!({
            "symbol": "BTC",
            "initial_price": 133100000.0,
            "start_date_time": "2023-01-13T14:30:12Z",
            "stop_loss": 131100000.0,
            "take_profit": 163000000.0,
            "leverage": 3
        }))
        .unwrap();

        let merged = body.apply(&order).validated().unwrap();

        assert_eq!(merged.leverage, 3);
        assert_eq!(merged.amount, Some(5.0));
        assert_eq!(merged.closing_price, order.closing_price);
        assert_eq!(merged.close_date_time, order.close_date_time);
        assert_eq!(merged.title(), order.title);
    }

    #[test]
    fn test_replace_explicit_null_clears() {
        let order = stored();
        let body: OrderReplace = serde_json::from_value(serde_json::json!({
            "symbol": "BTC",
            "initial_price": 133100000.0,
            "start_date_time": "2023-01-13T14:30:12Z",
            "stop_loss": 131100000.0,
            "take_profit": 163000000.0,
            "leverage": 10,
            "amount": 2.5,
            "closing_price": null,
            "close_date_time": null
        }))
        .unwrap();

        let merged = body.apply(&order);

        assert_eq!(merged.amount, Some(2.5));
        assert_eq!(merged.closing_price, None);
        assert_eq!(merged.close_date_time, None);
    }

    #[test]
    fn test_title_limit_counts_characters() {
        let mut input = sample();
        input.title = Some("ü".repeat(200));
        assert!(input.validated().is_ok());

        let mut input = sample();
        input.title = Some("x".repeat(256));
        assert!(matches!(input.validated(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_summary_fields() {
        let json = serde_json::to_value(OrderSummary {
            id: 3,
            symbol: "ETH".to_string(),
            initial_price: 1500.0,
            start_date_time: Utc.with_ymd_and_hms(2023, 1, 13, 0, 0, 0).unwrap(),
        })
        .unwrap();

        let mut keys: Vec<_> = json.as_object().unwrap().keys().cloned().collect();
        keys.sort();
        assert_eq!(keys, vec!["id", "initial_price", "start_date_time", "symbol"]);
    }
}
