//! Endpointing sequences against the public state-machine API.

use std::time::Duration;

use tokio::time::Instant;

use cueline::endpointing::{EndpointAction, Endpointer, FALLBACK_WINDOW, InterimUpdate};
use cueline::transcript::TranscriptEvent;

fn collect_flushes(actions: Vec<EndpointAction>) -> Vec<String> {
    actions
        .into_iter()
        .filter_map(|action| match action {
            EndpointAction::Flush(utterance) => Some(utterance.text),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn interim_interim_final_speechfinal_yields_exactly_one_utterance() {
    let mut endpointer = Endpointer::default();
    let now = Instant::now();

    let actions = vec![
        endpointer.feed(TranscriptEvent::interim("what", "s0"), now),
        endpointer.feed(TranscriptEvent::interim("what is", "s0"), now),
        endpointer.feed(TranscriptEvent::final_segment("What is", "s0", false), now),
        endpointer.feed(
            TranscriptEvent::final_segment("your pricing model?", "s0", true),
            now,
        ),
    ];

    let flushes = collect_flushes(actions);
    assert_eq!(flushes, vec!["What is your pricing model?".to_string()]);
    assert!(endpointer.deadline().is_none(), "timer cancelled after flush");
}

#[tokio::test]
async fn sequence_without_speech_final_flushes_once_via_fallback() {
    let mut endpointer = Endpointer::default();
    let t0 = Instant::now();

    endpointer.feed(TranscriptEvent::final_segment("I think we", "s0", false), t0);
    let t1 = t0 + Duration::from_millis(200);
    endpointer.feed(
        TranscriptEvent::final_segment("should migrate soon", "s0", false),
        t1,
    );

    let (deadline, epoch) = endpointer.deadline().expect("fallback armed");
    assert_eq!(deadline, t1 + FALLBACK_WINDOW, "window re-arms per segment");

    let utterance = endpointer.flush_due(epoch).expect("fallback flush");
    assert_eq!(utterance.text, "I think we should migrate soon");
    assert!(!utterance.is_speech_final);

    // Exactly one stable utterance: a second wake for the same epoch is a
    // no-op and nothing is left buffered.
    assert!(endpointer.flush_due(epoch).is_none());
    assert!(endpointer.drain().is_none());
}

#[tokio::test]
async fn interim_updates_replace_rather_than_accumulate() {
    let mut endpointer = Endpointer::default();
    let now = Instant::now();

    let first = endpointer.feed(TranscriptEvent::interim("hel", "s0"), now);
    let second = endpointer.feed(TranscriptEvent::interim("hello every", "s0"), now);

    assert_eq!(
        first,
        EndpointAction::Interim(InterimUpdate {
            text: "hel".into(),
            speaker: "s0".into(),
            timestamp_ms: 0,
        })
    );
    assert_eq!(
        second,
        EndpointAction::Interim(InterimUpdate {
            text: "hello every".into(),
            speaker: "s0".into(),
            timestamp_ms: 0,
        })
    );
    // Interims never arm the fallback timer.
    assert!(endpointer.deadline().is_none());
}

#[tokio::test]
async fn two_complete_utterances_flush_independently() {
    let mut endpointer = Endpointer::default();
    let now = Instant::now();

    let actions = vec![
        endpointer.feed(TranscriptEvent::final_segment("First thought.", "s0", true), now),
        endpointer.feed(
            TranscriptEvent::final_segment("Second thought.", "s0", true),
            now,
        ),
    ];
    assert_eq!(
        collect_flushes(actions),
        vec!["First thought.".to_string(), "Second thought.".to_string()]
    );
}

#[tokio::test]
async fn malformed_events_do_not_disturb_accumulation() {
    let mut endpointer = Endpointer::default();
    let now = Instant::now();

    endpointer.feed(TranscriptEvent::final_segment("keep this", "s0", false), now);

    let mut malformed = TranscriptEvent::final_segment("noise", "s0", false);
    malformed.speaker = String::new();
    assert_eq!(endpointer.feed(malformed, now), EndpointAction::None);

    let action = endpointer.feed(TranscriptEvent::final_segment("and this", "s0", true), now);
    let EndpointAction::Flush(utterance) = action else {
        panic!("expected flush");
    };
    assert_eq!(utterance.text, "keep this and this");
}
