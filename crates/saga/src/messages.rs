//! Inbound order messages and their wire format.
//!
//! Payloads are JSON as produced by the order service: camelCase keys, the
//! line items under `articles` (or `lines`), and snake_case timestamps.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use common::{ArticleId, OrderId};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Result, SagaError};

/// Topics the saga consumer subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    OrderPlaced,
    OrderConfirmed,
    OrderCanceled,
}

impl Topic {
    pub const ALL: [Topic; 3] = [Topic::OrderPlaced, Topic::OrderConfirmed, Topic::OrderCanceled];

    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::OrderPlaced => "orders_placed",
            Topic::OrderConfirmed => "orders_confirmed",
            Topic::OrderCanceled => "order.canceled",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Topic {
    type Err = SagaError;

    fn from_str(s: &str) -> Result<Self> {
        Topic::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| SagaError::UnknownTopic(s.to_string()))
    }
}

/// One line item of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
    pub article_id: ArticleId,
    pub quantity: i64,
}

impl OrderLine {
    pub fn new(article_id: impl Into<ArticleId>, quantity: i64) -> Self {
        Self {
            article_id: article_id.into(),
            quantity,
        }
    }
}

/// Common view over the three order messages.
pub trait OrderMessage: DeserializeOwned {
    fn order_id(&self) -> &OrderId;

    fn lines(&self) -> &[OrderLine];

    fn lines_mut(&mut self) -> &mut Vec<OrderLine>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderPlaced {
    pub order_id: OrderId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cart_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(rename = "articles", alias = "lines")]
    pub lines: Vec<OrderLine>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderConfirmed {
    pub order_id: OrderId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cart_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(rename = "articles", alias = "lines")]
    pub lines: Vec<OrderLine>,
    #[serde(
        rename = "confirmed_at",
        alias = "confirmedAt",
        default,
        deserialize_with = "lenient_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub confirmed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCanceled {
    pub order_id: OrderId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cart_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(rename = "articles", alias = "lines")]
    pub lines: Vec<OrderLine>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(
        rename = "canceled_at",
        alias = "canceledAt",
        default,
        deserialize_with = "lenient_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub canceled_at: Option<DateTime<Utc>>,
}

/// Informational timestamps never fail a message: anything that is not a
/// recognizable date, including `""`, decodes as `None`.
fn lenient_timestamp<'de, D>(deserializer: D) -> std::result::Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    let Some(serde_json::Value::String(text)) = raw else {
        return Ok(None);
    };
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }

    if let Ok(at) = DateTime::parse_from_rfc3339(text) {
        return Ok(Some(at.with_timezone(&Utc)));
    }
    let parsed = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .map(|naive| naive.and_utc());
    if parsed.is_none() {
        tracing::debug!(value = text, "ignoring unparseable timestamp");
    }
    Ok(parsed)
}

macro_rules! impl_order_message {
    ($($ty:ty),*) => {
        $(
            impl OrderMessage for $ty {
                fn order_id(&self) -> &OrderId {
                    &self.order_id
                }

                fn lines(&self) -> &[OrderLine] {
                    &self.lines
                }

                fn lines_mut(&mut self) -> &mut Vec<OrderLine> {
                    &mut self.lines
                }
            }
        )*
    };
}

impl_order_message!(OrderPlaced, OrderConfirmed, OrderCanceled);

impl OrderPlaced {
    pub fn new(order_id: impl Into<OrderId>, lines: Vec<OrderLine>) -> Self {
        Self {
            order_id: order_id.into(),
            cart_id: None,
            user_id: None,
            lines,
        }
    }
}

impl OrderConfirmed {
    pub fn new(order_id: impl Into<OrderId>, lines: Vec<OrderLine>) -> Self {
        Self {
            order_id: order_id.into(),
            cart_id: None,
            user_id: None,
            lines,
            confirmed_at: None,
        }
    }
}

impl OrderCanceled {
    pub fn new(order_id: impl Into<OrderId>, lines: Vec<OrderLine>) -> Self {
        Self {
            order_id: order_id.into(),
            cart_id: None,
            user_id: None,
            lines,
            reason: None,
            canceled_at: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// Decodes and validates a payload.
///
/// Lines naming the same article are merged into one, since a reservation is
/// keyed by order and article.
pub fn decode<T: OrderMessage>(payload: &[u8]) -> Result<T> {
    let mut message: T =
        serde_json::from_slice(payload).map_err(|e| SagaError::Malformed(e.to_string()))?;
    validate(&message)?;

    let merged = merge_lines(message.order_id(), message.lines())?;
    *message.lines_mut() = merged;
    Ok(message)
}

/// Rejects messages no redelivery could ever make processable.
pub fn validate<T: OrderMessage>(message: &T) -> Result<()> {
    if message.order_id().is_blank() {
        return Err(SagaError::Malformed("orderId is empty".to_string()));
    }
    if message.lines().is_empty() {
        return Err(SagaError::Malformed(format!(
            "order {} has no articles",
            message.order_id()
        )));
    }
    for line in message.lines() {
        if line.article_id.is_blank() {
            return Err(SagaError::Malformed(format!(
                "order {} has a line without articleId",
                message.order_id()
            )));
        }
        if line.quantity <= 0 {
            return Err(SagaError::Malformed(format!(
                "order {} has non-positive quantity {} for article {}",
                message.order_id(),
                line.quantity,
                line.article_id
            )));
        }
    }
    Ok(())
}

fn merge_lines(order_id: &OrderId, lines: &[OrderLine]) -> Result<Vec<OrderLine>> {
    let mut first_seen: Vec<&ArticleId> = Vec::new();
    let mut totals: BTreeMap<&ArticleId, i64> = BTreeMap::new();
    for line in lines {
        let total = totals.entry(&line.article_id).or_insert_with(|| {
            first_seen.push(&line.article_id);
            0
        });
        *total = total.checked_add(line.quantity).ok_or_else(|| {
            SagaError::Malformed(format!(
                "order {order_id} overflows the quantity of article {}",
                line.article_id
            ))
        })?;
    }

    Ok(first_seen
        .into_iter()
        .map(|id| OrderLine {
            article_id: id.clone(),
            quantity: totals[id],
        })
        .collect())
}
