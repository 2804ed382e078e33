//! Value objects for the keeper domain
//!
//! Immutable, validated domain primitives.
//! All value objects enforce invariants at construction time.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Domain errors for value object and entity validation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    /// Price must be positive
    #[error("Invalid price: {0}")]
    InvalidPrice(String),

    /// Amount must be positive
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Token symbol must be non-empty
    #[error("Invalid token symbol: {0}")]
    InvalidTokenSymbol(String),

    /// Registration request failed validation
    #[error("Invalid registration: {0}")]
    InvalidRegistration(String),

    /// Invalid state transition
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),
}

// =============================================================================
// Price
// =============================================================================

/// Price represents a positive decimal price
///
/// # Invariants
/// - Must be > 0
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Price(Decimal);

impl Price {
    /// Create a new Price with validation
    ///
    /// # Errors
    /// Returns `DomainError::InvalidPrice` if value <= 0
    pub fn new(value: Decimal) -> Result<Self, DomainError> {
        if value <= Decimal::ZERO {
            return Err(DomainError::InvalidPrice("Price must be positive".to_string()));
        }
        Ok(Self(value))
    }

    /// Get the underlying Decimal value
    pub fn as_decimal(&self) -> Decimal {
        self.0
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Make Price constructable internally (for trailing stop calculations)
impl From<Decimal> for Price {
    fn from(value: Decimal) -> Self {
        Self(value)
    }
}

// =============================================================================
// Amount
// =============================================================================

/// Amount represents a positive decimal trade size
///
/// # Invariants
/// - Must be > 0
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Amount(Decimal);

impl Amount {
    /// Create a new Amount with validation
    ///
    /// # Errors
    /// Returns `DomainError::InvalidAmount` if value <= 0
    pub fn new(value: Decimal) -> Result<Self, DomainError> {
        if value <= Decimal::ZERO {
            return Err(DomainError::InvalidAmount("Amount must be positive".to_string()));
        }
        Ok(Self(value))
    }

    /// Get the underlying Decimal value
    pub fn as_decimal(&self) -> Decimal {
        self.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// TokenSymbol
// =============================================================================

/// TokenSymbol identifies the traded token (e.g., "ETH", "WBTC")
///
/// This is the key into the price oracle. Stored uppercase.
///
/// # Invariants
/// - Must be non-empty after trimming
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenSymbol(String);

impl TokenSymbol {
    /// Create a TokenSymbol with validation
    ///
    /// # Errors
    /// Returns `DomainError::InvalidTokenSymbol` if the symbol is empty
    pub fn new(symbol: &str) -> Result<Self, DomainError> {
        let trimmed = symbol.trim();
        if trimmed.is_empty() {
            return Err(DomainError::InvalidTokenSymbol(
                "Token symbol must be non-empty".to_string(),
            ));
        }
        Ok(Self(trimmed.to_uppercase()))
    }

    /// Get the symbol as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TokenSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Side
// =============================================================================

/// Side represents the direction of the entry trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Entry bought the token (exit sells)
    Buy,
    /// Entry sold the token (exit buys)
    Sell,
}

impl Side {
    /// Get the opposite side, used to build the reversing exit trade
    ///
    /// Buy → Sell, Sell → Buy
    pub fn reversed(&self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    /// Parse a side from its lowercase wire form
    pub fn parse(value: &str) -> Option<Side> {
        match value.to_lowercase().as_str() {
            "buy" => Some(Side::Buy),
            "sell" => Some(Side::Sell),
            _ => None,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "buy"),
            Side::Sell => write!(f, "sell"),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_price_validation() {
        assert!(Price::new(dec!(100.0)).is_ok());
        assert!(Price::new(dec!(0.01)).is_ok());
        assert!(Price::new(dec!(-1.0)).is_err());
        assert!(Price::new(dec!(0.0)).is_err());
    }

    #[test]
    fn test_price_as_decimal() {
        let price = Price::new(dec!(2400.50)).unwrap();
        assert_eq!(price.as_decimal(), dec!(2400.50));
    }

    #[test]
    fn test_amount_validation() {
        assert!(Amount::new(dec!(0.001)).is_ok());
        assert!(Amount::new(dec!(100.0)).is_ok());
        assert!(Amount::new(dec!(-0.1)).is_err());
        assert!(Amount::new(dec!(0.0)).is_err());
    }

    #[test]
    fn test_token_symbol_normalizes() {
        let symbol = TokenSymbol::new(" eth ").unwrap();
        assert_eq!(symbol.as_str(), "ETH");
    }

    #[test]
    fn test_token_symbol_rejects_empty() {
        assert!(TokenSymbol::new("").is_err());
        assert!(TokenSymbol::new("   ").is_err());
    }

    #[test]
    fn test_side_reversed() {
        assert_eq!(Side::Buy.reversed(), Side::Sell);
        assert_eq!(Side::Sell.reversed(), Side::Buy);
    }

    #[test]
    fn test_side_parse() {
        assert_eq!(Side::parse("buy"), Some(Side::Buy));
        assert_eq!(Side::parse("SELL"), Some(Side::Sell));
        assert_eq!(Side::parse("hold"), None);
    }

    #[test]
    fn test_side_serde_lowercase() {
        let json = serde_json::to_string(&Side::Buy).unwrap();
        assert_eq!(json, "\"buy\"");
        let side: Side = serde_json::from_str("\"sell\"").unwrap();
        assert_eq!(side, Side::Sell);
    }
}
