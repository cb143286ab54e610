mod common;

use std::time::Duration;

use ban_sweep_rs::config::ExecutorConfig;
use ban_sweep_rs::executor::{Executor, RecordOutcome};
use ban_sweep_rs::types::ExecutionSummary;
use common::{record, FakeActions};
use time::macros::datetime;
use tokio_util::sync::CancellationToken;

const NOW: time::PrimitiveDateTime = datetime!(2025-03-01 12:00:00);

fn config() -> ExecutorConfig {
    ExecutorConfig {
        reason: "Cheating (follow-up)".into(),
        pause: Duration::ZERO,
    }
}

#[tokio::test]
async fn mixed_batch_counts_one_execution_two_skips() {
    let actions = FakeActions::default();
    let executor = Executor::new(&actions, config()).with_fixed_now(NOW);
    let records = vec![
        record("76561198000000001", datetime!(2025-02-01 12:00:00)),
        // Window closed on 2025-02-15.
        record("76561198000000002", datetime!(2024-12-15 12:00:00)),
        record("1234", datetime!(2025-02-01 12:00:00)),
    ];

    let summary = executor.execute(&records, &CancellationToken::new()).await;

    assert_eq!(
        summary,
        ExecutionSummary {
            executed: 1,
            skipped: 2
        }
    );
    let requests = actions.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].steamid, "76561198000000001");
    assert_eq!(requests[0].reason, "Cheating (follow-up)");
    assert_eq!(requests[0].punish_type, 0);
    // 2025-04-01 12:00 minus 2025-03-01 12:00.
    assert_eq!(requests[0].duration, 31 * 86_400);
}

#[tokio::test]
async fn response_statuses_map_to_outcomes() {
    let mut actions = FakeActions::default();
    actions.statuses.insert("76561198000000002".into(), 409);
    actions.statuses.insert("76561198000000003".into(), 400);
    actions.statuses.insert("76561198000000004".into(), 500);
    actions.statuses.insert("76561198000000005".into(), 418);
    actions.unreachable.push("76561198000000006".into());
    let executor = Executor::new(&actions, config()).with_fixed_now(NOW);
    let created = datetime!(2025-02-20 00:00:00);

    let mut outcomes = Vec::new();
    for i in 1..=6 {
        let r = record(&format!("7656119800000000{i}"), created);
        outcomes.push(executor.execute_one(&r).await);
    }

    assert_eq!(outcomes[0], (RecordOutcome::Executed, true));
    assert_eq!(outcomes[1], (RecordOutcome::AlreadyActioned, true));
    assert_eq!(outcomes[2], (RecordOutcome::Rejected("status 400".into()), true));
    assert_eq!(outcomes[3], (RecordOutcome::ServerFault(500), true));
    assert_eq!(
        outcomes[4],
        (
            RecordOutcome::Unexpected {
                status: 418,
                body: "status 418".into()
            },
            true
        )
    );
    assert!(matches!(outcomes[5], (RecordOutcome::Failed(_), true)));
}

#[tokio::test]
async fn failures_never_abort_the_batch() {
    let mut actions = FakeActions::default();
    actions.statuses.insert("76561198000000001".into(), 500);
    actions.unreachable.push("76561198000000002".into());
    let executor = Executor::new(&actions, config()).with_fixed_now(NOW);
    let created = datetime!(2025-02-20 00:00:00);
    let records = vec![
        record("76561198000000001", created),
        record("76561198000000002", created),
        record("76561198000000003", created),
    ];

    let summary = executor.execute(&records, &CancellationToken::new()).await;

    assert_eq!(summary.executed, 1);
    assert_eq!(summary.skipped, 2);
    assert_eq!(actions.requests().len(), 3);
}

#[tokio::test]
async fn explicit_expiry_caps_requested_duration() {
    let actions = FakeActions::default();
    let executor = Executor::new(&actions, config()).with_fixed_now(NOW);
    let mut r = record("76561198000000001", datetime!(2025-02-01 12:00:00));
    r.expires = Some(datetime!(2025-03-03 12:00:00));

    executor.execute(&[r], &CancellationToken::new()).await;

    assert_eq!(actions.requests()[0].duration, 2 * 86_400);
}

#[tokio::test]
async fn cancelled_batch_submits_nothing() {
    let actions = FakeActions::default();
    let executor = Executor::new(&actions, config()).with_fixed_now(NOW);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let summary = executor
        .execute(&[record("76561198000000001", datetime!(2025-02-01 12:00:00))], &cancel)
        .await;

    assert_eq!(summary, ExecutionSummary::default());
    assert!(actions.requests().is_empty());
}

#[tokio::test]
async fn pacing_follows_every_record_inside_its_window() {
    let actions = FakeActions::default();
    let executor = Executor::new(
        &actions,
        ExecutorConfig {
            pause: Duration::from_millis(50),
            ..config()
        },
    )
    .with_fixed_now(NOW);
    let invalid = record("1234", datetime!(2025-02-01 12:00:00));
    let closed = record("76561198000000002", datetime!(2024-12-15 12:00:00));

    assert_eq!(
        executor.execute_one(&invalid).await,
        (RecordOutcome::InvalidSteamId, true)
    );
    assert_eq!(
        executor.execute_one(&closed).await,
        (RecordOutcome::Ineligible, false)
    );

    let started = std::time::Instant::now();
    executor.execute(&[invalid], &CancellationToken::new()).await;
    assert!(started.elapsed() >= Duration::from_millis(50));
    assert!(actions.requests().is_empty());
}
