//! Affiliate commission recording for referred orders.

use chrono::Utc;
use sea_orm::Set;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::entities::commission::{self, CommissionStatus};
use crate::errors::ServiceError;
use crate::repositories::catalog_repository::CatalogRepository;

const BPS_DENOMINATOR: i128 = 10_000;

/// Commission owed on `subtotal` at `commission_bps`, floored to the minor
/// unit. Negative rates are treated as zero.
pub fn commission_amount(subtotal: i64, commission_bps: i32) -> i64 {
    let bps = i128::from(commission_bps.max(0));
    let amount = i128::from(subtotal) * bps / BPS_DENOMINATOR;
    i64::try_from(amount).unwrap_or(i64::MAX)
}

#[derive(Clone)]
pub struct CommissionService {
    catalog: CatalogRepository,
}

impl CommissionService {
    pub fn new(catalog: CatalogRepository) -> Self {
        Self { catalog }
    }

    /// Builds the commission row for an order carrying a referral code.
    ///
    /// Unknown or inactive codes are logged and yield `None`; a bad code
    /// never blocks checkout. The row is inserted by the caller in the same
    /// transaction as the order.
    #[instrument(skip(self), fields(store_id = %store_id, order_id = %order_id))]
    pub async fn prepare(
        &self,
        store_id: Uuid,
        order_id: Uuid,
        referral_code: &str,
        subtotal: i64,
    ) -> Result<Option<commission::ActiveModel>, ServiceError> {
        let code = referral_code.trim();
        if code.is_empty() {
            return Ok(None);
        }

        let Some(affiliate) = self.catalog.find_active_affiliate(store_id, code).await? else {
            warn!(referral_code = %code, "Referral code does not match an active affiliate; ignoring");
            return Ok(None);
        };

        let amount = commission_amount(subtotal, affiliate.commission_bps);
        info!(
            affiliate_id = %affiliate.id,
            amount,
            commission_bps = affiliate.commission_bps,
            "Commission prepared for referred order"
        );

        Ok(Some(commission::ActiveModel {
            id: Set(Uuid::new_v4()),
            store_id: Set(store_id),
            affiliate_id: Set(affiliate.id),
            order_id: Set(order_id),
            amount: Set(amount),
            status: Set(CommissionStatus::Pending),
            created_at: Set(Utc::now()),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(100_000, 1_000, 10_000)]
    #[case(999, 250, 24)]
    #[case(1_000, 0, 0)]
    #[case(1_000, -50, 0)]
    #[case(0, 1_000, 0)]
    fn commission_is_floored_basis_points(
        #[case] subtotal: i64,
        #[case] bps: i32,
        #[case] expected: i64,
    ) {
        assert_eq!(commission_amount(subtotal, bps), expected);
    }

    #[test]
    fn large_subtotals_do_not_overflow() {
        assert_eq!(commission_amount(i64::MAX, 10_000), i64::MAX);
    }
}
