use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates an identifier from any string-like value.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Returns true if the identifier is empty or only whitespace.
            pub fn is_blank(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Stable external identifier of an inventory-tracked article.
    ///
    /// Article IDs are assigned by the catalog, not by this system, so they
    /// are opaque strings rather than UUIDs.
    ArticleId
);

string_id!(
    /// Identifier of an order, as assigned by the order service.
    OrderId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn article_id_preserves_value() {
        let id = ArticleId::new("SKU-001");
        assert_eq!(id.as_str(), "SKU-001");
        assert_eq!(id.to_string(), "SKU-001");
    }

    #[test]
    fn blank_ids_are_detected() {
        assert!(OrderId::new("").is_blank());
        assert!(OrderId::new("   ").is_blank());
        assert!(!OrderId::new("O1").is_blank());
    }

    #[test]
    fn ids_serialize_as_plain_strings() {
        let id = OrderId::from("ORD-42");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"ORD-42\"");

        let back: OrderId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn article_and_order_ids_are_distinct_types() {
        let article: ArticleId = "A1".into();
        let order: OrderId = "A1".into();
        assert_eq!(article.as_str(), order.as_str());
    }
}
