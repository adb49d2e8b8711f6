//! Validation utilities for the Stock Ledger

use rust_decimal::Decimal;

/// Longest category name accepted
pub const MAX_CATEGORY_NAME_LEN: usize = 100;
/// Longest product or supplier name accepted
pub const MAX_NAME_LEN: usize = 200;
/// Longest supplier phone number accepted
pub const MAX_PHONE_LEN: usize = 20;

// ============================================================================
// Catalog Validations
// ============================================================================

/// Validate a display name: non-blank and at most `max_len` characters
pub fn validate_name(name: &str, max_len: usize) -> Result<(), &'static str> {
    if name.trim().is_empty() {
        return Err("Name must not be blank");
    }
    if name.chars().count() > max_len {
        return Err("Name is too long");
    }
    Ok(())
}

/// Validate a price: non-negative, at most 2 decimal places and 10 digits
pub fn validate_price(price: Decimal) -> Result<(), &'static str> {
    if price < Decimal::ZERO {
        return Err("Price cannot be negative");
    }
    if price.normalize().scale() > 2 {
        return Err("Price can have at most 2 decimal places");
    }
    if price >= Decimal::from(100_000_000) {
        return Err("Price must have at most 10 digits");
    }
    Ok(())
}

// ============================================================================
// Stock Validations
// ============================================================================

/// Validate a movement or order quantity
pub fn validate_quantity(quantity: i32) -> Result<(), &'static str> {
    if quantity <= 0 {
        return Err("Quantity must be positive");
    }
    Ok(())
}

/// Validate an opening stock level
pub fn validate_stock_quantity(quantity: i32) -> Result<(), &'static str> {
    if quantity < 0 {
        return Err("Stock quantity cannot be negative");
    }
    Ok(())
}

// ============================================================================
// Contact Validations
// ============================================================================

/// Validate email format (basic check)
pub fn validate_email(email: &str) -> Result<(), &'static str> {
    let Some((local, domain)) = email.split_once('@') else {
        return Err("Invalid email format");
    };
    if local.is_empty() || !domain.contains('.') || domain.starts_with('.') || domain.ends_with('.') {
        return Err("Invalid email format");
    }
    if email.chars().any(char::is_whitespace) {
        return Err("Invalid email format");
    }
    Ok(())
}

/// Validate phone number format.
/// Accepts digits with optional leading `+` and `-`, space or parenthesis
/// separators: 7 to 15 digits, at most 20 characters overall.
pub fn validate_phone(phone: &str) -> Result<(), &'static str> {
    if phone.len() > MAX_PHONE_LEN {
        return Err("Phone number is too long");
    }

    let body = phone.strip_prefix('+').unwrap_or(phone);
    if !body
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '-' | ' ' | '(' | ')'))
    {
        return Err("Phone number contains invalid characters");
    }

    let digits = body.chars().filter(|c| c.is_ascii_digit()).count();
    if !(7..=15).contains(&digits) {
        return Err("Phone number must have 7 to 15 digits");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_validate_name() {
        assert!(validate_name("Widgets", MAX_CATEGORY_NAME_LEN).is_ok());
        assert!(validate_name("   ", MAX_CATEGORY_NAME_LEN).is_err());
        assert!(validate_name(&"x".repeat(101), MAX_CATEGORY_NAME_LEN).is_err());
        assert!(validate_name(&"x".repeat(200), MAX_NAME_LEN).is_ok());
    }

    #[test]
    fn test_validate_price() {
        assert!(validate_price(Decimal::from_str("19.99").unwrap()).is_ok());
        assert!(validate_price(Decimal::ZERO).is_ok());
        assert!(validate_price(Decimal::from_str("19.990").unwrap()).is_ok());
        assert!(validate_price(Decimal::from_str("-1").unwrap()).is_err());
        assert!(validate_price(Decimal::from_str("1.999").unwrap()).is_err());
        assert!(validate_price(Decimal::from(100_000_000)).is_err());
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-3).is_err());
        assert!(validate_stock_quantity(0).is_ok());
        assert!(validate_stock_quantity(-1).is_err());
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("buyer@example.com").is_ok());
        assert!(validate_email("buyer@example").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("buyer example@x.com").is_err());
        assert!(validate_email("no-at-sign.com").is_err());
    }

    #[test]
    fn test_validate_phone() {
        assert!(validate_phone("+353 1 234 5678").is_ok());
        assert!(validate_phone("(01) 234-5678").is_ok());
        assert!(validate_phone("12345").is_err());
        assert!(validate_phone("call me maybe").is_err());
        assert!(validate_phone("+1 234 567 890 123 456").is_err());
    }
}
