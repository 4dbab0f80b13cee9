mod support;

use std::sync::Arc;
use std::time::Duration;

use support::{monitored, reserved, slot, Call, FakeChannel, FakeSource, RecordingNotifier};
use tcseek_core::{Notice, NoticeKind, TargetState};
use tcseek_daemon::config::Mode;
use tcseek_daemon::scheduler::{Job, Scheduler, TickOutcome};
use tcseek_daemon::workflow::{LegacyJob, Workflow};

const PAGE_A: &str = "https://moodle.test/mod/tc/view.php?id=20";
const PAGE_B: &str = "https://moodle.test/mod/tc/view.php?id=21";

struct Rig {
    source: Arc<FakeSource>,
    notifier: Arc<RecordingNotifier>,
    workflow: Workflow,
}

impl Rig {
    fn job(&self, index: usize) -> Arc<LegacyJob> {
        match &self.workflow {
            Workflow::Legacy(jobs) => Arc::clone(&jobs[index]),
            Workflow::Seeker(_) => panic!("expected legacy workflow"),
        }
    }
}

fn rig() -> Rig {
    let source = Arc::new(FakeSource::new());
    source.set_section(PAGE_A, "Exam", vec![slot("2026-04-01", "09:00", "a-0")], vec![]);
    source.set_section(PAGE_B, "Exam", vec![], vec![]);
    let notifier = Arc::new(RecordingNotifier::default());
    let mode = Mode::Legacy {
        targets: vec![monitored("a", PAGE_A, "Exam"), monitored("b", PAGE_B, "Exam")],
    };
    let workflow = Workflow::build(
        mode,
        source.clone(),
        Arc::new(FakeChannel::silent()),
        notifier.clone(),
    );
    Rig {
        source,
        notifier,
        workflow,
    }
}

fn add_candidates(source: &FakeSource) {
    // Outside the 08:00-20:00 window, then two matching slots.
    source.add_available(PAGE_A, "Exam", slot("2026-04-02", "21:00", "a-late"));
    source.add_available(PAGE_A, "Exam", slot("2026-04-03", "10:00", "a-1"));
    source.add_available(PAGE_A, "Exam", slot("2026-04-04", "11:00", "a-2"));
}

#[tokio::test]
async fn test_job_ids_follow_target_ids() {
    let rig = rig();
    let ids: Vec<String> = rig.workflow.jobs().iter().map(|j| j.id().to_string()).collect();
    assert_eq!(ids, vec!["tc_a", "tc_b"]);
}

#[tokio::test]
async fn test_books_first_new_matching_slot_and_retires() {
    let rig = rig();
    let job = rig.job(0);
    assert_eq!(job.tick().await, TickOutcome::Continue);
    add_candidates(&rig.source);

    assert_eq!(job.tick().await, TickOutcome::Retire);

    assert_eq!(rig.source.count(|c| matches!(c, Call::Reserve(_))), 1);
    assert!(rig.source.position(&Call::Reserve("a-1".into())).is_some());
    assert_eq!(
        rig.notifier.kinds(),
        vec![NoticeKind::SlotsFound, NoticeKind::BookingSucceeded]
    );
    assert_eq!(job.state(), TargetState::Booked);

    let fetches = rig.source.count(|c| matches!(c, Call::Fetch { .. }));
    assert_eq!(job.tick().await, TickOutcome::Retire);
    assert_eq!(rig.source.count(|c| matches!(c, Call::Fetch { .. })), fetches);
}

#[tokio::test]
async fn test_failed_booking_moves_to_next_candidate() {
    let rig = rig();
    let job = rig.job(0);
    job.tick().await;
    add_candidates(&rig.source);
    rig.source.refuse_reserve("a-1");

    assert_eq!(job.tick().await, TickOutcome::Retire);

    let first = rig.source.position(&Call::Reserve("a-1".into())).unwrap();
    let second = rig.source.position(&Call::Reserve("a-2".into())).unwrap();
    assert!(first < second);
    assert_eq!(
        rig.notifier.kinds(),
        vec![
            NoticeKind::SlotsFound,
            NoticeKind::BookingFailed,
            NoticeKind::BookingSucceeded
        ]
    );
}

#[tokio::test]
async fn test_all_bookings_failing_keeps_target_active() {
    let rig = rig();
    let job = rig.job(0);
    job.tick().await;
    add_candidates(&rig.source);
    rig.source.refuse_reserve("a-1");
    rig.source.refuse_reserve("a-2");

    assert_eq!(job.tick().await, TickOutcome::Continue);
    assert_eq!(job.state(), TargetState::Active);
    assert_eq!(rig.notifier.count(NoticeKind::BookingFailed), 2);

    // Same slots are no longer new on the next tick.
    assert_eq!(job.tick().await, TickOutcome::Continue);
    assert_eq!(rig.source.count(|c| matches!(c, Call::Reserve(_))), 2);
}

#[tokio::test]
async fn test_existing_reservation_retires_without_booking() {
    let rig = rig();
    rig.source.set_section(
        PAGE_B,
        "Exam",
        vec![slot("2026-04-05", "12:00", "b-1")],
        vec![reserved("2026-04-06", "12:00", "b-0")],
    );
    let job = rig.job(1);

    assert_eq!(job.tick().await, TickOutcome::Retire);
    assert_eq!(rig.source.count(|c| matches!(c, Call::Reserve(_))), 0);
    assert_eq!(job.state(), TargetState::Booked);
}

#[tokio::test]
async fn test_expired_session_reauthenticates_and_continues() {
    let rig = rig();
    let job = rig.job(0);
    rig.source.expire_on_next_fetch();

    assert_eq!(job.tick().await, TickOutcome::Continue);
    assert!(rig.source.position(&Call::Authenticate).is_some());
    assert_eq!(job.state(), TargetState::Active);
}

#[tokio::test]
async fn test_dead_session_is_renewed_before_fetching() {
    let rig = rig();
    let job = rig.job(0);
    rig.source.invalidate_session();

    job.tick().await;

    let calls = rig.source.calls();
    assert_eq!(calls[0], Call::Authenticate);
    assert!(matches!(calls[1], Call::Fetch { .. }));
}

#[tokio::test]
async fn test_fetch_failure_is_reported_and_target_stays_active() {
    let rig = rig();
    let job = rig.job(0);
    rig.source.break_fetch(PAGE_A, "Exam");

    assert_eq!(job.tick().await, TickOutcome::Continue);
    assert_eq!(rig.notifier.kinds(), vec![NoticeKind::Error]);
    match &rig.notifier.notices()[0] {
        Notice::Error { message, .. } => assert!(message.starts_with("network error"), "{message}"),
        other => panic!("unexpected notice {other:?}"),
    }
    assert_eq!(job.state(), TargetState::Active);
}

#[tokio::test(start_paused = true)]
async fn test_booked_job_is_unscheduled() {
    let rig = rig();
    let scheduler = Arc::new(Scheduler::with_settings(Duration::from_secs(30), 0));
    rig.workflow.schedule(&scheduler);
    assert_eq!(scheduler.job_ids(), vec!["tc_a", "tc_b"]);

    // First tick at 60s records the baseline.
    tokio::time::sleep(Duration::from_secs(61)).await;
    add_candidates(&rig.source);
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert!(!scheduler.is_scheduled("tc_a"));
    assert!(scheduler.is_scheduled("tc_b"));
    assert_eq!(rig.notifier.count(NoticeKind::BookingSucceeded), 1);

    scheduler.shutdown().await;
    assert!(scheduler.job_ids().is_empty());
}
