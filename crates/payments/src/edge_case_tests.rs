// Test file - these are expected patterns in test code
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

//! Edge Case Tests for the Payment System
//!
//! Tests critical boundary conditions in:
//! - Amount normalization (PAY-A01 to PAY-A05)
//! - Provider metadata (PAY-M01 to PAY-M03)
//! - Status resolution (PAY-S01 to PAY-S06)
//! - Webhook signatures (PAY-W01 to PAY-W03)

#[cfg(test)]
mod amount_edge_cases {
    use crate::amount::{is_fixed_two_decimal, normalize_amount};
    use crate::error::PaymentError;

    // =========================================================================
    // PAY-A01: Smallest representable amount - one cent
    // =========================================================================
    #[test]
    fn test_one_cent_normalizes() {
        assert_eq!(normalize_amount("0.01").unwrap(), 1);
    }

    // =========================================================================
    // PAY-A02: Large amount stays exact
    // =========================================================================
    #[test]
    fn test_large_amount_exact() {
        assert_eq!(normalize_amount("999999.99").unwrap(), 99_999_999);
    }

    // =========================================================================
    // PAY-A03: Leading zeros are accepted by both the format check and the
    // normalizer
    // =========================================================================
    #[test]
    fn test_leading_zeros_accepted() {
        assert!(is_fixed_two_decimal("007.50"));
        assert_eq!(normalize_amount("007.50").unwrap(), 750);
    }

    // =========================================================================
    // PAY-A04: Scientific notation parses as a float but never passes the
    // format gate, so it cannot reach the provider
    // =========================================================================
    #[test]
    fn test_scientific_notation_blocked_by_format_gate() {
        assert!(normalize_amount("1e3").is_ok());
        assert!(!is_fixed_two_decimal("1e3"));
    }

    // =========================================================================
    // PAY-A05: Signed input is rejected at both layers
    // =========================================================================
    #[test]
    fn test_signed_input_rejected() {
        assert!(!is_fixed_two_decimal("+10.00"));
        assert!(!is_fixed_two_decimal("-10.00"));
        assert!(matches!(
            normalize_amount("-10.00"),
            Err(PaymentError::Validation(_))
        ));
    }
}

#[cfg(test)]
mod metadata_edge_cases {
    use crate::checkout::build_provider_metadata;
    use uuid::Uuid;

    // =========================================================================
    // PAY-M01: Empty caller map yields only the system keys
    // =========================================================================
    #[test]
    fn test_empty_map_yields_system_keys() {
        let extra = serde_json::Map::new();
        let metadata = build_provider_metadata(Some(&extra), Uuid::new_v4(), Uuid::new_v4());
        assert_eq!(metadata.len(), 2);
    }

    // =========================================================================
    // PAY-M02: JSON null coerces to the string "null", not an absent key
    // =========================================================================
    #[test]
    fn test_null_value_coerces_to_string() {
        let mut extra = serde_json::Map::new();
        extra.insert("note".to_string(), serde_json::Value::Null);
        let metadata = build_provider_metadata(Some(&extra), Uuid::new_v4(), Uuid::new_v4());
        assert_eq!(metadata["note"], "null");
    }

    // =========================================================================
    // PAY-M03: Nested objects are serialized, not flattened
    // =========================================================================
    #[test]
    fn test_nested_object_serialized() {
        let mut extra = serde_json::Map::new();
        extra.insert("cart".to_string(), serde_json::json!({"items": 2}));
        let metadata = build_provider_metadata(Some(&extra), Uuid::new_v4(), Uuid::new_v4());
        assert_eq!(metadata["cart"], "{\"items\":2}");
    }
}

#[cfg(test)]
mod status_resolution_edge_cases {
    use crate::reconcile::{
        resolve_outcome, IntentSnapshot, SessionSnapshot, STATUS_REQUIRES_PAYMENT_METHOD,
        STATUS_SUCCEEDED,
    };
    use time::OffsetDateTime;

    fn at(unix: i64) -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(unix).unwrap()
    }

    fn open_session() -> SessionSnapshot {
        SessionSnapshot {
            id: "cs_edge_1".to_string(),
            status: Some("open".to_string()),
            payment_status: Some("unpaid".to_string()),
            url: Some("https://checkout.example.com/cs_edge_1".to_string()),
            payment_intent_id: None,
            expires_at: Some(at(1_700_100_000)),
        }
    }

    fn succeeded_intent() -> IntentSnapshot {
        IntentSnapshot {
            id: "pi_edge_1".to_string(),
            status: STATUS_SUCCEEDED.to_string(),
            created: Some(at(1_700_000_000)),
            canceled_at: None,
            latest_charge_created: Some(at(1_700_000_600)),
        }
    }

    // =========================================================================
    // PAY-S01: Full lifecycle - a freshly created session resolves to its own
    // state, then a succeeded intent takes over
    // =========================================================================
    #[test]
    fn test_session_then_intent_lifecycle() {
        let session = open_session();
        let before = resolve_outcome(Some(&session), None, at(1_700_000_000));
        assert_eq!(before.status, "unpaid");
        assert!(before.paid_at.is_none());
        assert!(before.failed_at.is_none());

        let after = resolve_outcome(Some(&session), Some(&succeeded_intent()), at(1_700_001_000));
        assert_eq!(after.status, STATUS_SUCCEEDED);
        assert_eq!(after.paid_at, Some(at(1_700_000_600)));
        assert!(after.failed_at.is_none());
    }

    // =========================================================================
    // PAY-S02: Replayed delivery - same provider state at a later wall clock
    // resolves identically (at-least-once safety)
    // =========================================================================
    #[test]
    fn test_replayed_delivery_resolves_identically() {
        let session = open_session();
        let intent = succeeded_intent();

        let first = resolve_outcome(Some(&session), Some(&intent), at(1_700_001_000));
        let replay = resolve_outcome(Some(&session), Some(&intent), at(1_700_009_999));

        assert_eq!(first, replay);
    }

    // =========================================================================
    // PAY-S03: Processing intent sets neither timestamp
    // =========================================================================
    #[test]
    fn test_processing_sets_no_timestamps() {
        let mut intent = succeeded_intent();
        intent.status = "processing".to_string();
        let outcome = resolve_outcome(None, Some(&intent), at(1_700_001_000));
        assert_eq!(outcome.status, "processing");
        assert!(outcome.paid_at.is_none());
        assert!(outcome.failed_at.is_none());
    }

    // =========================================================================
    // PAY-S04: Known ambiguity - "requires_payment_method" describes both a
    // failed attempt and a payment nobody has attempted yet; both get a
    // failed_at stamp at reconciliation time
    // =========================================================================
    #[test]
    fn test_unattempted_intent_still_stamped_failed() {
        let intent = IntentSnapshot {
            id: "pi_edge_2".to_string(),
            status: STATUS_REQUIRES_PAYMENT_METHOD.to_string(),
            created: Some(at(1_700_000_000)),
            canceled_at: None,
            latest_charge_created: None,
        };
        let now = at(1_700_001_000);
        let outcome = resolve_outcome(None, Some(&intent), now);
        assert_eq!(outcome.failed_at, Some(now));
    }

    // =========================================================================
    // PAY-S05: Session URL refresh only happens when the provider returns one
    // =========================================================================
    #[test]
    fn test_absent_url_not_propagated() {
        let mut session = open_session();
        session.url = None;
        let outcome = resolve_outcome(Some(&session), None, at(1_700_000_000));
        assert!(outcome.checkout_url.is_none());
    }

    // =========================================================================
    // PAY-S06: Expired session reports its own status once payment_status is
    // gone
    // =========================================================================
    #[test]
    fn test_expired_session_status() {
        let session = SessionSnapshot {
            id: "cs_edge_2".to_string(),
            status: Some("expired".to_string()),
            payment_status: None,
            url: None,
            payment_intent_id: None,
            expires_at: None,
        };
        let outcome = resolve_outcome(Some(&session), None, at(1_700_000_000));
        assert_eq!(outcome.status, "expired");
    }
}

#[cfg(test)]
mod signature_edge_cases {
    use crate::error::PaymentError;
    use crate::webhooks::{parse_signature_header, verify_signature};
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    const SECRET: &str = "whsec_edge_secret";

    fn sign_with_header(payload: &str, timestamp: i64, header_order_reversed: bool) -> String {
        let key = SECRET.strip_prefix("whsec_").unwrap();
        let mut mac = Hmac::<Sha256>::new_from_slice(key.as_bytes()).unwrap();
        mac.update(format!("{}.{}", timestamp, payload).as_bytes());
        let sig = hex::encode(mac.finalize().into_bytes());
        if header_order_reversed {
            format!("v1={},t={}", sig, timestamp)
        } else {
            format!("t={},v1={}", timestamp, sig)
        }
    }

    // =========================================================================
    // PAY-W01: Header field order does not matter
    // =========================================================================
    #[test]
    fn test_header_field_order_irrelevant() {
        let payload = r#"{"id":"evt_edge"}"#;
        let now = 1_700_000_000;
        let header = sign_with_header(payload, now, true);
        assert!(verify_signature(payload, &header, SECRET, now).is_ok());
    }

    // =========================================================================
    // PAY-W02: A timestamp slightly in the future (clock skew) is accepted
    // within the tolerance window
    // =========================================================================
    #[test]
    fn test_future_timestamp_within_tolerance_accepted() {
        let payload = r#"{"id":"evt_edge"}"#;
        let now = 1_700_000_000;
        let header = sign_with_header(payload, now + 60, false);
        assert!(verify_signature(payload, &header, SECRET, now).is_ok());
    }

    // =========================================================================
    // PAY-W03: An empty header carries neither timestamp nor signature
    // =========================================================================
    #[test]
    fn test_empty_header_rejected() {
        let (ts, v1) = parse_signature_header("");
        assert!(ts.is_none());
        assert!(v1.is_none());
        assert!(matches!(
            verify_signature("{}", "", SECRET, 1_700_000_000),
            Err(PaymentError::WebhookSignatureInvalid)
        ));
    }
}
