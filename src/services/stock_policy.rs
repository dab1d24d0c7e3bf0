use crate::errors::ServiceError;

/// Outcome of applying the stock policy to an add-to-cart request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockDecision {
    /// The requested quantity fits within available stock.
    Accept,
    /// The cart line must be capped at the given quantity.
    AdjustTo(i32),
    /// The request alone exceeds available stock.
    Reject,
}

/// Pure stock decision logic. No dependencies; every store-touching
/// component applies this policy rather than re-deriving the rules.
#[derive(Debug, Clone, Copy)]
pub struct StockPolicy {
    low_stock_threshold: i32,
}

impl StockPolicy {
    pub fn new(low_stock_threshold: i32) -> Self {
        Self {
            low_stock_threshold,
        }
    }

    pub fn has_sufficient(&self, stock: i32, requested: i32) -> bool {
        stock >= requested
    }

    /// Decides an add-to-cart request.
    ///
    /// The requested quantity alone exceeding stock is a rejection; the
    /// combined cart line exceeding stock merely caps the line at what is
    /// available.
    pub fn decide_add(&self, existing_quantity: i32, requested: i32, stock: i32) -> StockDecision {
        if requested > stock {
            return StockDecision::Reject;
        }
        if existing_quantity + requested > stock {
            return StockDecision::AdjustTo(stock);
        }
        StockDecision::Accept
    }

    /// Validates one cart line during checkout against the current stock
    /// reading. Any shortfall aborts the entire checkout unit.
    pub fn validate_checkout_line(
        &self,
        product_name: &str,
        requested: i32,
        stock: i32,
    ) -> Result<(), ServiceError> {
        if requested > stock {
            return Err(ServiceError::InsufficientStock(format!(
                "Insufficient stock for {}",
                product_name
            )));
        }
        Ok(())
    }

    /// The low-stock band is (0, threshold]: still sellable but scarce.
    /// Zero stock is out-of-stock, not low-stock, and raises no alert.
    pub fn is_low_stock(&self, stock: i32) -> bool {
        stock > 0 && stock <= self.low_stock_threshold
    }
}

impl Default for StockPolicy {
    fn default() -> Self {
        Self::new(10)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn accepts_request_within_stock() {
        let policy = StockPolicy::default();
        assert_matches!(policy.decide_add(0, 5, 10), StockDecision::Accept);
        assert_matches!(policy.decide_add(3, 7, 10), StockDecision::Accept);
    }

    #[test]
    fn rejects_when_request_alone_exceeds_stock() {
        let policy = StockPolicy::default();
        assert_matches!(policy.decide_add(0, 11, 10), StockDecision::Reject);
        // Rejection ignores the existing cart quantity.
        assert_matches!(policy.decide_add(100, 11, 10), StockDecision::Reject);
    }

    #[test]
    fn adjusts_when_combined_quantity_exceeds_stock() {
        let policy = StockPolicy::default();
        assert_matches!(policy.decide_add(8, 5, 10), StockDecision::AdjustTo(10));
    }

    #[test]
    fn combined_quantity_exactly_at_stock_is_accepted() {
        let policy = StockPolicy::default();
        assert_matches!(policy.decide_add(4, 6, 10), StockDecision::Accept);
    }

    #[test]
    fn checkout_validation_names_the_product() {
        let policy = StockPolicy::default();
        let err = policy
            .validate_checkout_line("Mechanical Keyboard", 25, 20)
            .unwrap_err();
        assert_eq!(err.to_string(), "Insufficient stock for Mechanical Keyboard");
    }

    #[test]
    fn checkout_validation_passes_at_exact_stock() {
        let policy = StockPolicy::default();
        assert!(policy.validate_checkout_line("Widget", 20, 20).is_ok());
    }

    #[test]
    fn low_stock_band_excludes_zero() {
        let policy = StockPolicy::default();
        assert!(policy.is_low_stock(1));
        assert!(policy.is_low_stock(10));
        assert!(!policy.is_low_stock(0));
        assert!(!policy.is_low_stock(11));
    }

    #[test]
    fn low_stock_threshold_is_configurable() {
        let policy = StockPolicy::new(3);
        assert!(policy.is_low_stock(3));
        assert!(!policy.is_low_stock(4));
    }
}
