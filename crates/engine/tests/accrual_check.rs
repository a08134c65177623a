mod common;

use std::sync::Arc;
use std::time::Duration;

use rentwatch_core::{AccrualError, Decision};
use rentwatch_engine::{AccrualCheck, CheckError, InputError, NoticeStatus, ACCRUAL_NOTE};
use rentwatch_store::{
    IdentityError, IdentityStore, JsonFileIdentityStore, LedgerStore, MemoryLedgerStore, StoreError,
};

use common::*;

#[tokio::test]
async fn one_week_at_260_charges_and_notifies_once() {
    let h = harness(RecordingNotifier::new(), 10);
    h.identities.insert("tenant", record("42", "chan-42", 260, T0 - WEEK)).await;

    let outcome = AccrualCheck::new(h.ctx.clone()).run("tenant").await.unwrap();

    assert_eq!(outcome.payer_id, "42");
    assert_eq!(outcome.charged, 260);
    assert_eq!(outcome.balance.balance, -260);
    assert_eq!(outcome.notice, NoticeStatus::Sent { attempts: 1 });

    let delivered = h.notifier.delivered();
    assert_eq!(delivered.len(), 1);
    let (channel, text) = &delivered[0];
    assert_eq!(channel, "chan-42");
    assert!(text.contains("<@42>"));
    assert!(text.contains("Amount owing: $2.60"));

    let entries = h.ledger.entries_for("42").await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].amount, -260);
    assert_eq!(entries[0].occurred_at, T0);
    assert_eq!(entries[0].note, ACCRUAL_NOTE);

    let rewritten = h.identities.get("tenant").await.unwrap();
    assert_eq!(rewritten.last_paid_at, T0);
}

#[tokio::test]
async fn repeated_check_does_not_recharge_the_same_period() {
    let h = harness(RecordingNotifier::new(), 10);
    h.identities.insert("tenant", record("42", "chan-42", 260, T0 - WEEK)).await;
    let check = AccrualCheck::new(h.ctx.clone());

    check.run("tenant").await.unwrap();
    let second = check.run("tenant").await.unwrap();

    assert_eq!(second.charged, 0);
    assert_eq!(second.balance.balance, -260);

    h.clock.advance(DAY);
    let third = check.run("tenant").await.unwrap();
    assert_eq!(third.charged, 37);
    assert_eq!(third.balance.balance, -297);
}

#[tokio::test]
async fn concurrent_checks_for_one_payer_charge_once() {
    let h = harness(RecordingNotifier::new(), 10);
    h.identities.insert("tenant", record("42", "chan-42", 260, T0 - WEEK)).await;
    let check = Arc::new(AccrualCheck::new(h.ctx.clone()));

    let (a, b) = tokio::join!(check.run("tenant"), check.run("tenant"));
    let charged = a.unwrap().charged + b.unwrap().charged;

    assert_eq!(charged, 260);
    assert_eq!(h.ledger.aggregate_for("42").await.unwrap().balance, -260);
}

#[tokio::test]
async fn two_keys_for_one_identity_file_charge_once() {
    let dir = tempfile::tempdir().unwrap();
    let files = JsonFileIdentityStore::new(Some(dir.path().to_path_buf()));
    files
        .save("tenant.json", &record("42", "chan-42", 260, T0 - WEEK))
        .await
        .unwrap();

    let h = harness(RecordingNotifier::new(), 10);
    let mut ctx = h.ctx.clone();
    ctx.identities = Arc::new(files.clone());
    let check = AccrualCheck::new(ctx);

    let (a, b) = tokio::join!(check.run("tenant.json"), check.run("./tenant.json"));
    let charged = a.unwrap().charged + b.unwrap().charged;

    assert_eq!(charged, 260);
    assert_eq!(h.ledger.aggregate_for("42").await.unwrap().balance, -260);
    assert_eq!(files.load("tenant.json").await.unwrap().last_paid_at, T0);
}

#[tokio::test]
async fn debt_at_margin_is_charged_but_not_notified() {
    let h = harness(RecordingNotifier::new(), 260);
    h.identities.insert("tenant", record("42", "chan-42", 260, T0 - WEEK)).await;

    let outcome = AccrualCheck::new(h.ctx.clone()).run("tenant").await.unwrap();

    assert_eq!(outcome.balance.balance, -260);
    assert_eq!(
        outcome.notice,
        NoticeStatus::Suppressed { reason: Decision::WithinMargin }
    );
    assert_eq!(h.notifier.call_count(), 0);
}

#[tokio::test]
async fn payer_in_credit_is_not_notified() {
    let h = harness(RecordingNotifier::new(), 10);
    h.ledger
        .append(&rentwatch_core::LedgerEntry::payment("42", 1_000, T0 - WEEK, "bank transfer"))
        .await
        .unwrap();
    h.identities.insert("tenant", record("42", "chan-42", 260, T0 - WEEK)).await;

    let outcome = AccrualCheck::new(h.ctx.clone()).run("tenant").await.unwrap();

    assert_eq!(outcome.balance.balance, 740);
    assert_eq!(outcome.notice, NoticeStatus::Suppressed { reason: Decision::InCredit });
}

#[tokio::test]
async fn missing_identity_is_an_input_error() {
    let h = harness(RecordingNotifier::new(), 10);

    let err = AccrualCheck::new(h.ctx.clone()).run("nobody").await.unwrap_err();

    assert!(matches!(
        err,
        CheckError::Input(InputError::Identity(IdentityError::NotFound(_)))
    ));
    assert!(h.ledger.is_empty().await);
}

#[tokio::test]
async fn clock_behind_last_payment_is_an_input_error() {
    let h = harness(RecordingNotifier::new(), 10);
    h.identities.insert("tenant", record("42", "chan-42", 260, T0 + DAY)).await;

    let err = AccrualCheck::new(h.ctx.clone()).run("tenant").await.unwrap_err();

    assert!(matches!(
        err,
        CheckError::Input(InputError::Accrual(AccrualError::ClockWentBackwards { .. }))
    ));
    assert!(h.ledger.is_empty().await);
    assert_eq!(h.identities.get("tenant").await.unwrap().last_paid_at, T0 + DAY);
}

#[tokio::test]
async fn storage_outage_aborts_before_rewriting_identity() {
    let ledger = Arc::new(MemoryLedgerStore::new());
    ledger.set_unavailable(true);
    let h = harness_with_ledger(RecordingNotifier::new(), 10, ledger);
    h.identities.insert("tenant", record("42", "chan-42", 260, T0 - WEEK)).await;

    let err = AccrualCheck::new(h.ctx.clone()).run("tenant").await.unwrap_err();

    assert!(matches!(err, CheckError::Storage(_)));
    assert_eq!(h.identities.get("tenant").await.unwrap().last_paid_at, T0 - WEEK);
    assert_eq!(h.notifier.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn charge_acknowledged_after_deadline_is_not_posted_twice() {
    let h = harness(RecordingNotifier::new(), 10);
    h.identities.insert("tenant", record("42", "chan-42", 260, T0 - WEEK)).await;
    let mut ctx = h.ctx.clone();
    ctx.ledger = Arc::new(StallingLedger {
        inner: h.ledger.clone(),
        stall: Duration::from_secs(30),
        lands: true,
    });
    let check = AccrualCheck::new(ctx);

    let first = check.run("tenant").await.unwrap();
    assert_eq!(first.charged, 260);
    assert_eq!(first.balance.balance, -260);
    assert_eq!(h.identities.get("tenant").await.unwrap().last_paid_at, T0);
    assert_eq!(h.notifier.call_count(), 1);

    let retry = check.run("tenant").await.unwrap();
    assert_eq!(retry.charged, 0);
    assert_eq!(h.ledger.aggregate_for("42").await.unwrap().balance, -260);
}

#[tokio::test(start_paused = true)]
async fn charge_abandoned_before_writing_leaves_identity_untouched() {
    let h = harness(RecordingNotifier::new(), 10);
    h.identities.insert("tenant", record("42", "chan-42", 260, T0 - WEEK)).await;
    let mut ctx = h.ctx.clone();
    ctx.ledger = Arc::new(StallingLedger {
        inner: h.ledger.clone(),
        stall: Duration::from_secs(30),
        lands: false,
    });

    let err = AccrualCheck::new(ctx).run("tenant").await.unwrap_err();

    assert!(matches!(
        err,
        CheckError::Storage(StoreError::Timeout(d)) if d == Duration::from_secs(10)
    ));
    assert!(h.ledger.entries_for("42").await.unwrap().is_empty());
    assert_eq!(h.identities.get("tenant").await.unwrap().last_paid_at, T0 - WEEK);
    assert_eq!(h.notifier.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn failed_notice_keeps_the_charge() {
    let h = harness(RecordingNotifier::new().failing("chan-42"), 10);
    h.identities.insert("tenant", record("42", "chan-42", 260, T0 - WEEK)).await;

    let outcome = AccrualCheck::new(h.ctx.clone()).run("tenant").await.unwrap();

    assert!(outcome.notice_failed());
    assert_eq!(h.notifier.call_count(), 3);
    assert_eq!(h.ledger.aggregate_for("42").await.unwrap().balance, -260);
    assert_eq!(h.identities.get("tenant").await.unwrap().last_paid_at, T0);
}

#[tokio::test]
async fn directory_row_is_refreshed_from_identity() {
    let h = harness(RecordingNotifier::new(), 10);
    let mut rec = record("42", "chan-42", 260, T0 - WEEK);
    rec.display_name = Some("Flat 3".into());
    h.identities.insert("tenant", rec).await;

    let outcome = AccrualCheck::new(h.ctx.clone()).run("tenant").await.unwrap();

    assert_eq!(outcome.balance.display_name, "Flat 3");
    assert_eq!(outcome.balance.notify_channel.as_deref(), Some("chan-42"));
}
