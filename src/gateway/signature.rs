//! HMAC-SHA256 signatures used by the checkout widget callback and by
//! gateway webhooks. Comparison goes through `Mac::verify_slice`, which is
//! constant time.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::GatewayReference;

type HmacSha256 = Hmac<Sha256>;

fn keyed_mac(secret: &[u8]) -> HmacSha256 {
    <HmacSha256 as Mac>::new_from_slice(secret)
        .unwrap_or_else(|_| unreachable!("HMAC accepts keys of any length"))
}

/// Message signed by the provider for a checkout callback.
///
/// Orders sign `order_id|payment_id`; subscriptions sign
/// `payment_id|subscription_id`.
pub fn checkout_payload(reference: &GatewayReference, payment_id: &str) -> String {
    match reference {
        GatewayReference::Order(order_id) => format!("{}|{}", order_id, payment_id),
        GatewayReference::Subscription(subscription_id) => {
            format!("{}|{}", payment_id, subscription_id)
        }
    }
}

/// Lower-case hex HMAC of `payload`.
pub fn sign(secret: &str, payload: &[u8]) -> String {
    let mut mac = keyed_mac(secret.as_bytes());
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Checks a hex signature against `payload`.
pub fn verify(secret: &str, payload: &[u8], signature_hex: &str) -> bool {
    let Ok(expected) = hex::decode(signature_hex.trim()) else {
        return false;
    };
    let mut mac = keyed_mac(secret.as_bytes());
    mac.update(payload);
    mac.verify_slice(&expected).is_ok()
}

pub fn verify_checkout(
    secret: &str,
    reference: &GatewayReference,
    payment_id: &str,
    signature_hex: &str,
) -> bool {
    verify(
        secret,
        checkout_payload(reference, payment_id).as_bytes(),
        signature_hex,
    )
}
