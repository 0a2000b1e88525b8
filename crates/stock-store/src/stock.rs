use chrono::{DateTime, Utc};
use common::ArticleId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, StoreError};

/// Authoritative counters for one article.
///
/// `0 <= reserved <= quantity` holds for every value handed out by a store.
/// The counters change only through the mutation methods below, which both
/// store backends apply while holding the article's lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stock {
    pub id: Uuid,
    pub article_id: ArticleId,
    /// Units physically on hand.
    pub quantity: i64,
    /// Units held against active reservations.
    pub reserved: i64,
    pub min_stock: i64,
    /// Informational only.
    pub max_stock: i64,
    pub location: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Stock {
    /// Units that can still be reserved or deducted.
    pub fn available_quantity(&self) -> i64 {
        self.quantity - self.reserved
    }

    /// True when on-hand units are at or below the minimum threshold.
    pub fn is_low_stock(&self) -> bool {
        self.quantity <= self.min_stock
    }

    pub fn can_reserve(&self, quantity: i64) -> bool {
        quantity > 0 && self.available_quantity() >= quantity
    }

    /// Moves the on-hand quantity by `delta`.
    ///
    /// A removal can only take unreserved units, so held reservations
    /// survive any adjustment.
    pub fn adjust(&mut self, delta: i64) -> Result<()> {
        if delta == 0 {
            return Err(StoreError::InvalidQuantity(delta));
        }
        if delta < 0 {
            let requested = delta.checked_neg().ok_or(StoreError::InvalidQuantity(delta))?;
            if self.available_quantity() < requested {
                return Err(StoreError::InsufficientStock {
                    article_id: self.article_id.clone(),
                    available: self.available_quantity(),
                    requested,
                });
            }
        }
        self.quantity = self
            .quantity
            .checked_add(delta)
            .ok_or(StoreError::InvalidQuantity(delta))?;
        Ok(())
    }

    /// Holds `quantity` unreserved units.
    pub fn reserve(&mut self, quantity: i64) -> Result<()> {
        ensure_positive(quantity)?;
        if !self.can_reserve(quantity) {
            return Err(StoreError::InsufficientStock {
                article_id: self.article_id.clone(),
                available: self.available_quantity(),
                requested: quantity,
            });
        }
        self.reserved += quantity;
        Ok(())
    }

    /// Releases `quantity` held units back to availability.
    pub fn cancel_reservation(&mut self, quantity: i64) -> Result<()> {
        ensure_positive(quantity)?;
        if self.reserved < quantity {
            return Err(StoreError::InvalidState {
                article_id: self.article_id.clone(),
                reason: format!(
                    "cannot release {quantity} units, only {} reserved",
                    self.reserved
                ),
            });
        }
        self.reserved -= quantity;
        Ok(())
    }

    /// Turns `quantity` held units into a permanent deduction.
    pub fn confirm_reservation(&mut self, quantity: i64) -> Result<()> {
        ensure_positive(quantity)?;
        if self.reserved < quantity {
            return Err(StoreError::InsufficientReserved {
                article_id: self.article_id.clone(),
                reserved: self.reserved,
                requested: quantity,
            });
        }
        self.reserved -= quantity;
        self.quantity -= quantity;
        Ok(())
    }
}

fn ensure_positive(quantity: i64) -> Result<()> {
    if quantity <= 0 {
        return Err(StoreError::InvalidQuantity(quantity));
    }
    Ok(())
}

/// Input for creating a stock row. `reserved` always starts at zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewStock {
    pub article_id: ArticleId,
    pub quantity: i64,
    #[serde(default)]
    pub min_stock: i64,
    #[serde(default)]
    pub max_stock: i64,
    #[serde(default)]
    pub location: Option<String>,
}

impl NewStock {
    pub fn new(article_id: impl Into<ArticleId>, quantity: i64) -> Self {
        Self {
            article_id: article_id.into(),
            quantity,
            min_stock: 0,
            max_stock: 0,
            location: None,
        }
    }

    pub fn min_stock(mut self, min_stock: i64) -> Self {
        self.min_stock = min_stock;
        self
    }

    pub fn max_stock(mut self, max_stock: i64) -> Self {
        self.max_stock = max_stock;
        self
    }

    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Rejects negative counters and thresholds.
    pub fn validate(&self) -> Result<()> {
        for value in [self.quantity, self.min_stock, self.max_stock] {
            if value < 0 {
                return Err(StoreError::InvalidQuantity(value));
            }
        }
        if self.article_id.is_blank() {
            return Err(StoreError::InvalidState {
                article_id: self.article_id.clone(),
                reason: "article id must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Builds the row as the in-memory store keeps it.
    pub fn into_stock(self, now: DateTime<Utc>) -> Stock {
        Stock {
            id: Uuid::new_v4(),
            article_id: self.article_id,
            quantity: self.quantity,
            reserved: 0,
            min_stock: self.min_stock,
            max_stock: self.max_stock,
            location: self.location,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stock(quantity: i64, min_stock: i64) -> Stock {
        NewStock::new("A1", quantity)
            .min_stock(min_stock)
            .into_stock(Utc::now())
    }

    #[test]
    fn new_stock_starts_unreserved() {
        let s = NewStock::new("A1", 10)
            .min_stock(5)
            .max_stock(100)
            .location("shelf-3")
            .into_stock(Utc::now());
        assert_eq!(s.reserved, 0);
        assert_eq!(s.available_quantity(), 10);
        assert_eq!(s.location.as_deref(), Some("shelf-3"));
        assert_eq!(s.created_at, s.updated_at);
    }

    #[test]
    fn validate_rejects_negative_values() {
        assert!(NewStock::new("A1", -1).validate().is_err());
        assert!(NewStock::new("A1", 1).min_stock(-1).validate().is_err());
        assert!(NewStock::new("", 1).validate().is_err());
        assert!(NewStock::new("A1", 0).validate().is_ok());
    }

    #[test]
    fn low_stock_is_inclusive() {
        assert!(stock(5, 5).is_low_stock());
        assert!(stock(4, 5).is_low_stock());
        assert!(!stock(6, 5).is_low_stock());
    }

    #[test]
    fn reserve_confirm_cycle() {
        let mut s = stock(10, 5);
        s.reserve(6).unwrap();
        assert_eq!((s.quantity, s.reserved, s.available_quantity()), (10, 6, 4));

        s.confirm_reservation(6).unwrap();
        assert_eq!((s.quantity, s.reserved), (4, 0));
        assert!(s.is_low_stock());
    }

    #[test]
    fn reserve_beyond_available_leaves_counters_untouched() {
        let mut s = stock(10, 0);
        s.reserve(7).unwrap();

        let err = s.reserve(5).unwrap_err();
        assert!(matches!(
            err,
            StoreError::InsufficientStock {
                available: 3,
                requested: 5,
                ..
            }
        ));
        assert_eq!((s.quantity, s.reserved), (10, 7));
    }

    #[test]
    fn cancel_more_than_reserved_is_invalid_state() {
        let mut s = stock(10, 0);
        s.reserve(2).unwrap();
        assert!(matches!(
            s.cancel_reservation(3),
            Err(StoreError::InvalidState { .. })
        ));
        s.cancel_reservation(2).unwrap();
        assert_eq!(s.reserved, 0);
    }

    #[test]
    fn confirm_more_than_reserved_is_insufficient_reserved() {
        let mut s = stock(10, 0);
        s.reserve(2).unwrap();
        assert!(matches!(
            s.confirm_reservation(3),
            Err(StoreError::InsufficientReserved {
                reserved: 2,
                requested: 3,
                ..
            })
        ));
        assert_eq!((s.quantity, s.reserved), (10, 2));
    }

    #[test]
    fn adjust_cannot_take_reserved_units() {
        let mut s = stock(10, 0);
        s.reserve(6).unwrap();
        assert!(matches!(
            s.adjust(-5),
            Err(StoreError::InsufficientStock {
                available: 4,
                requested: 5,
                ..
            })
        ));
        s.adjust(-4).unwrap();
        assert_eq!((s.quantity, s.reserved, s.available_quantity()), (6, 6, 0));

        s.adjust(3).unwrap();
        assert_eq!(s.quantity, 9);
    }

    #[test]
    fn adjust_overflow_is_invalid_quantity() {
        let mut s = stock(1, 0);
        assert!(matches!(
            s.adjust(i64::MAX),
            Err(StoreError::InvalidQuantity(i64::MAX))
        ));
        assert!(matches!(
            s.adjust(i64::MIN),
            Err(StoreError::InvalidQuantity(i64::MIN))
        ));
        assert_eq!(s.quantity, 1);
    }

    #[test]
    fn non_positive_quantities_are_rejected() {
        let mut s = stock(10, 0);
        assert!(matches!(s.reserve(0), Err(StoreError::InvalidQuantity(0))));
        assert!(matches!(
            s.cancel_reservation(-1),
            Err(StoreError::InvalidQuantity(-1))
        ));
        assert!(matches!(s.adjust(0), Err(StoreError::InvalidQuantity(0))));
    }

    #[test]
    fn counters_stay_within_bounds_over_mixed_operations() {
        let mut s = stock(20, 0);
        let ops: [(&str, i64); 12] = [
            ("reserve", 5),
            ("reserve", 9),
            ("confirm", 4),
            ("cancel", 3),
            ("adjust", -9),
            ("reserve", 30),
            ("confirm", 8),
            ("cancel", 1),
            ("adjust", 4),
            ("reserve", 6),
            ("cancel", 10),
            ("confirm", 6),
        ];

        for (op, q) in ops {
            let _ = match op {
                "reserve" => s.reserve(q),
                "cancel" => s.cancel_reservation(q),
                "adjust" => s.adjust(q),
                _ => s.confirm_reservation(q),
            };
            assert!(0 <= s.reserved && s.reserved <= s.quantity, "{op} {q}: {s:?}");
        }
    }

    #[test]
    fn stock_serializes_round_trip() {
        let s = stock(3, 1);
        let json = serde_json::to_string(&s).unwrap();
        let back: Stock = serde_json::from_str(&json).unwrap();
        assert_eq!(s, back);
    }
}
