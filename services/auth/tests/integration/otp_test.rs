use chrono::{Duration, Utc};

use atelier_auth::domain::repository::OtpRepository;
use atelier_auth::error::{AuthServiceError, DispatchError};
use atelier_auth::usecase::otp::{SendOtpInput, VerifyOtpInput};

use crate::helpers::{DispatchMode, Harness};

const PHONE: &str = "+911234567890";
const EMAIL: &str = "user@example.com";

async fn send(h: &Harness, identifier: &str) -> Result<(), AuthServiceError> {
    h.send()
        .execute(SendOtpInput {
            identifier: identifier.to_owned(),
        })
        .await
        .map(|_| ())
}

async fn verify(h: &Harness, identifier: &str, code: &str) -> Result<(), AuthServiceError> {
    h.verify()
        .execute(VerifyOtpInput {
            identifier: identifier.to_owned(),
            code: code.to_owned(),
        })
        .await
        .map(|_| ())
}

/// A 6-digit code guaranteed to differ from `code`.
fn wrong_code(code: &str) -> String {
    if code == "123456" {
        "654321".to_owned()
    } else {
        "123456".to_owned()
    }
}

// ── sendOtp ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn should_store_and_dispatch_six_digit_code() {
    let h = Harness::new();
    let before = Utc::now();

    send(&h, PHONE).await.unwrap();

    let record = h.otps.get(PHONE).expect("record should be stored");
    assert_eq!(record.code.len(), 6);
    assert!(record.code.chars().all(|c| c.is_ascii_digit()));
    assert_eq!(record.attempts, 0);
    assert!(record.verified_at.is_none());
    assert!(record.expires_at >= before + Duration::seconds(300));
    assert!(record.expires_at <= Utc::now() + Duration::seconds(300));

    assert_eq!(h.dispatcher.sent_count(), 1);
    assert_eq!(h.dispatcher.last_code_for(PHONE), record.code);
}

#[tokio::test]
async fn should_normalize_identifier_before_storing() {
    let h = Harness::new();

    send(&h, "+91 12345-67890").await.unwrap();
    send(&h, "  User@Example.COM ").await.unwrap();

    assert!(h.otps.get(PHONE).is_some());
    assert!(h.otps.get(EMAIL).is_some());
    assert_eq!(h.otps.len(), 2);
}

#[tokio::test]
async fn should_reject_invalid_identifier_before_touching_store() {
    let h = Harness::new();

    for raw in ["", "12345", "not-an-email", "user@", "+0123456789"] {
        let result = send(&h, raw).await;
        assert!(
            matches!(result, Err(AuthServiceError::InvalidIdentifier(_))),
            "expected InvalidIdentifier for {raw:?}, got {result:?}"
        );
    }
    assert_eq!(h.otps.len(), 0);
    assert_eq!(h.dispatcher.sent_count(), 0);
}

#[tokio::test]
async fn should_remove_code_when_dispatch_is_rejected() {
    let h = Harness::with_dispatch_mode(DispatchMode::Reject);

    let result = send(&h, PHONE).await;

    assert!(
        matches!(
            result,
            Err(AuthServiceError::DispatchFailure(DispatchError::Rejected(_)))
        ),
        "expected DispatchFailure, got {result:?}"
    );
    assert!(
        h.otps.get(PHONE).is_none(),
        "undelivered code must not stay verifiable"
    );
}

#[tokio::test(start_paused = true)]
async fn should_time_out_slow_dispatch_and_remove_code() {
    let h = Harness::with_dispatch_mode(DispatchMode::Hang);

    let result = send(&h, EMAIL).await;

    assert!(
        matches!(
            result,
            Err(AuthServiceError::DispatchFailure(DispatchError::Timeout))
        ),
        "expected DispatchFailure(Timeout), got {result:?}"
    );
    assert!(h.otps.get(EMAIL).is_none());
}

#[tokio::test]
async fn should_refuse_resend_within_cooldown() {
    let mut h = Harness::new();
    h.policy.resend_cooldown = Duration::seconds(30);

    send(&h, PHONE).await.unwrap();
    let first_code = h.otps.get(PHONE).unwrap().code;

    let result = send(&h, PHONE).await;
    match result {
        Err(AuthServiceError::ResendCooldown { retry_after_secs }) => {
            assert!((1..=30).contains(&retry_after_secs));
        }
        other => panic!("expected ResendCooldown, got {other:?}"),
    }
    assert_eq!(h.otps.get(PHONE).unwrap().code, first_code);
    assert_eq!(h.dispatcher.sent_count(), 1);

    // Once the cooldown has passed a new code is issued.
    h.otps.backdate(PHONE, Duration::seconds(31));
    send(&h, PHONE).await.unwrap();
    assert_eq!(h.dispatcher.sent_count(), 2);
}

#[tokio::test]
async fn should_keep_recent_code_when_conditional_write_loses() {
    let h = Harness::new();
    send(&h, PHONE).await.unwrap();
    let stored = h.otps.get(PHONE).unwrap();
    let now = Utc::now();

    let mut replacement = stored.clone();
    replacement.code = wrong_code(&stored.code);
    replacement.created_at = now;
    let written = h
        .otps
        .upsert_unless_recent(&replacement, now - Duration::seconds(30))
        .await
        .unwrap();

    assert!(!written);
    assert_eq!(h.otps.get(PHONE).unwrap().code, stored.code);

    // A verified grant never blocks a fresh code.
    h.otps
        .mark_verified(PHONE, &stored.code, now, now + Duration::minutes(2))
        .await
        .unwrap();
    assert!(
        h.otps
            .upsert_unless_recent(&replacement, now - Duration::seconds(30))
            .await
            .unwrap()
    );
    assert_eq!(h.otps.get(PHONE).unwrap().code, replacement.code);
}

#[tokio::test]
async fn should_admit_one_of_two_concurrent_sends_within_cooldown() {
    let mut h = Harness::new();
    h.policy.resend_cooldown = Duration::seconds(30);

    let (first, second) = tokio::join!(send(&h, PHONE), send(&h, PHONE));

    let refused = [&first, &second]
        .iter()
        .filter(|r| matches!(r, Err(AuthServiceError::ResendCooldown { .. })))
        .count();
    assert_eq!(refused, 1, "got {first:?} and {second:?}");
    assert!(first.is_ok() || second.is_ok());
    assert_eq!(h.dispatcher.sent_count(), 1);
}

// ── verifyOtp ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn should_verify_code_only_once() {
    let h = Harness::new();
    send(&h, PHONE).await.unwrap();
    let code = h.dispatcher.last_code_for(PHONE);

    verify(&h, PHONE, &code).await.unwrap();

    let second = verify(&h, PHONE, &code).await;
    assert!(
        matches!(second, Err(AuthServiceError::NotFoundOrExpired)),
        "expected NotFoundOrExpired on reuse, got {second:?}"
    );
}

#[tokio::test]
async fn should_reject_expired_code_and_drop_record() {
    let h = Harness::new();
    send(&h, EMAIL).await.unwrap();
    let code = h.dispatcher.last_code_for(EMAIL);
    h.otps.expire(EMAIL);

    let result = verify(&h, EMAIL, &code).await;

    match result {
        Err(e @ AuthServiceError::OtpExpired) => assert_eq!(e.to_string(), "expired"),
        other => panic!("expected OtpExpired, got {other:?}"),
    }
    assert!(h.otps.get(EMAIL).is_none());
}

#[tokio::test]
async fn should_only_accept_latest_code_after_resend() {
    let h = Harness::new();
    send(&h, PHONE).await.unwrap();
    let first = h.dispatcher.last_code_for(PHONE);
    send(&h, PHONE).await.unwrap();
    let second = h.dispatcher.last_code_for(PHONE);

    if first != second {
        let result = verify(&h, PHONE, &first).await;
        assert!(
            matches!(result, Err(AuthServiceError::CodeMismatch)),
            "expected CodeMismatch for superseded code, got {result:?}"
        );
    }
    verify(&h, PHONE, &second).await.unwrap();
}

#[tokio::test]
async fn should_report_not_found_for_identifier_without_code() {
    let h = Harness::new();

    let result = verify(&h, "+919999999999", "123456").await;

    match result {
        Err(e @ AuthServiceError::NotFoundOrExpired) => {
            assert_eq!(e.to_string(), "not found/expired");
        }
        other => panic!("expected NotFoundOrExpired, got {other:?}"),
    }
}

#[tokio::test]
async fn should_keep_identifiers_isolated() {
    let h = Harness::new();
    send(&h, PHONE).await.unwrap();
    send(&h, EMAIL).await.unwrap();
    let email_before = h.otps.get(EMAIL).unwrap();
    let phone_code = h.dispatcher.last_code_for(PHONE);

    let _ = verify(&h, PHONE, &wrong_code(&phone_code)).await;
    verify(&h, PHONE, &phone_code).await.unwrap();
    send(&h, PHONE).await.unwrap();

    let email_after = h.otps.get(EMAIL).unwrap();
    assert_eq!(email_after.code, email_before.code);
    assert_eq!(email_after.attempts, 0);
    assert!(email_after.verified_at.is_none());

    // The email code is still usable, the phone code cannot unlock it.
    let email_code = h.dispatcher.last_code_for(EMAIL);
    verify(&h, EMAIL, &email_code).await.unwrap();
}

#[tokio::test]
async fn should_count_failed_attempts_and_lock_out_at_limit() {
    let h = Harness::new();
    send(&h, PHONE).await.unwrap();
    let code = h.dispatcher.last_code_for(PHONE);
    let wrong = wrong_code(&code);

    for attempt in 1..h.policy.max_attempts {
        let result = verify(&h, PHONE, &wrong).await;
        assert!(
            matches!(result, Err(AuthServiceError::CodeMismatch)),
            "attempt {attempt}: expected CodeMismatch, got {result:?}"
        );
        assert_eq!(h.otps.get(PHONE).unwrap().attempts, attempt);
    }

    let last = verify(&h, PHONE, &wrong).await;
    assert!(
        matches!(last, Err(AuthServiceError::TooManyAttempts)),
        "expected TooManyAttempts, got {last:?}"
    );
    assert!(h.otps.get(PHONE).is_none());

    // Even the right code is useless now; a new one must be sent.
    let result = verify(&h, PHONE, &code).await;
    assert!(matches!(result, Err(AuthServiceError::NotFoundOrExpired)));
}

#[tokio::test]
async fn should_reset_attempts_on_resend() {
    let h = Harness::new();
    send(&h, PHONE).await.unwrap();
    let code = h.dispatcher.last_code_for(PHONE);
    let _ = verify(&h, PHONE, &wrong_code(&code)).await;
    assert_eq!(h.otps.get(PHONE).unwrap().attempts, 1);

    send(&h, PHONE).await.unwrap();

    assert_eq!(h.otps.get(PHONE).unwrap().attempts, 0);
}

#[tokio::test]
async fn should_leave_verified_grant_for_session_creation() {
    let h = Harness::new();
    send(&h, EMAIL).await.unwrap();
    let code = h.dispatcher.last_code_for(EMAIL);

    let out = h
        .verify()
        .execute(VerifyOtpInput {
            identifier: EMAIL.to_owned(),
            code,
        })
        .await
        .unwrap();

    let record = h.otps.get(EMAIL).expect("grant should be stored");
    assert!(record.verified_at.is_some());
    assert_eq!(record.expires_at, out.grant_expires_at);
    assert!(out.grant_expires_at <= Utc::now() + Duration::seconds(120));
}
