//! Throttle invariants: cooldown, overlap, backoff, and the history bound.

mod common;

use std::time::Duration;

use tokio::time::Instant;

use cueline::coordinator::{
    AdmissionDecision, ChatHistory, Coordinator, MAX_HISTORY_TURNS, TurnRole,
};

use common::utterance;

#[tokio::test(start_paused = true)]
async fn admitted_attempts_are_separated_by_at_least_the_cooldown() {
    let cooldown = Duration::from_millis(15_000);
    let mut coordinator = Coordinator::new(cooldown);
    let mut admitted_at: Vec<Instant> = Vec::new();

    for i in 0..200 {
        let now = Instant::now();
        if coordinator
            .admit(&utterance(&format!("utterance number {i}")), now)
            .is_admitted()
        {
            admitted_at.push(now);
            coordinator.finish_generation();
        }
        tokio::time::advance(Duration::from_millis(400)).await;
    }

    assert!(admitted_at.len() > 1, "test must admit more than once");
    for pair in admitted_at.windows(2) {
        assert!(
            pair[1].duration_since(pair[0]) >= cooldown,
            "cooldown violated: {:?}",
            pair[1].duration_since(pair[0])
        );
    }
}

#[tokio::test(start_paused = true)]
async fn overlap_guard_holds_until_release() {
    let mut coordinator = Coordinator::new(Duration::ZERO);
    assert!(coordinator
        .admit(&utterance("start the only attempt"), Instant::now())
        .is_admitted());

    // However much time passes, a second attempt stays rejected while the
    // first is outstanding.
    for _ in 0..5 {
        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(
            coordinator.admit(&utterance("attempt while busy"), Instant::now()),
            AdmissionDecision::InFlight
        );
    }

    coordinator.finish_generation();
    assert!(coordinator
        .admit(&utterance("after release"), Instant::now())
        .is_admitted());
}

#[tokio::test(start_paused = true)]
async fn rate_limit_backoff_rejects_until_expiry() {
    let mut coordinator = Coordinator::new(Duration::ZERO);
    coordinator.note_rate_limited(Duration::from_secs(30), Instant::now());

    tokio::time::advance(Duration::from_secs(29)).await;
    assert!(matches!(
        coordinator.admit(&utterance("too early to retry"), Instant::now()),
        AdmissionDecision::RateLimited { .. }
    ));

    tokio::time::advance(Duration::from_secs(2)).await;
    assert!(coordinator
        .admit(&utterance("after the window"), Instant::now())
        .is_admitted());
}

#[tokio::test(start_paused = true)]
async fn check_order_is_length_overlap_backoff_cooldown() {
    let mut coordinator = Coordinator::new(Duration::from_secs(15));
    let now = Instant::now();
    coordinator.note_rate_limited(Duration::from_secs(60), now);

    // Too-short wins over the active backoff window.
    assert_eq!(
        coordinator.admit(&utterance("hi"), now),
        AdmissionDecision::TooShort
    );

    // Overlap wins over backoff once an attempt is in flight.
    let mut busy = Coordinator::new(Duration::from_secs(15));
    assert!(busy.admit(&utterance("first admitted one"), now).is_admitted());
    busy.note_rate_limited(Duration::from_secs(60), now);
    assert_eq!(
        busy.admit(&utterance("second while busy"), now),
        AdmissionDecision::InFlight
    );
}

#[test]
fn twenty_first_turn_evicts_the_oldest() {
    let mut history = ChatHistory::new();
    for i in 0..MAX_HISTORY_TURNS {
        history.push_user(format!("turn {i}"));
    }
    assert_eq!(history.len(), MAX_HISTORY_TURNS);

    history.push_assistant("the twenty-first turn");
    assert_eq!(history.len(), MAX_HISTORY_TURNS);

    let turns = history.snapshot();
    assert_eq!(turns.first().unwrap().text, "turn 1");
    assert_eq!(turns.last().unwrap().text, "the twenty-first turn");
    assert_eq!(turns.last().unwrap().role, TurnRole::Assistant);
}

#[tokio::test(start_paused = true)]
async fn rejected_utterances_leave_no_trace_in_history() {
    let mut coordinator = Coordinator::new(Duration::from_secs(15));
    let now = Instant::now();

    assert!(coordinator.admit(&utterance("the admitted one"), now).is_admitted());
    coordinator.admit(&utterance("rejected by overlap"), now);
    coordinator.finish_generation();
    coordinator.admit(&utterance("rejected by cooldown"), now);

    let turns = coordinator.history().snapshot();
    assert_eq!(turns.len(), 1);
    assert_eq!(turns[0].text, "the admitted one");
}
