// Order lifecycle
pub mod orders;
pub mod order_status;

// Payments
pub mod payment_initiation;
pub mod payment_verification;
pub mod webhooks;

// Affiliate referrals
pub mod commissions;
