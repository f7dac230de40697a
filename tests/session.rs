//! Voice session integration tests
//!
//! Drives the full state machine with a scripted recognition backend and an
//! in-test chat transport; no audio hardware or network involved.

use std::time::Duration;

use tokio::sync::mpsc;

use voxchat::chat::TransportEvent;
use voxchat::{
    ListeningState, RecognitionErrorKind, RecognitionEvent, RecognitionSession, Sender,
    SessionEvent, SessionHandle, TranscriptSegment, TransportError, VoiceSession,
};

mod common;
use common::{FakeTransport, RecognitionRemote, fake_recognition, fake_transport};

/// Everything a test needs to drive one session
struct Harness {
    handle: SessionHandle,
    events: mpsc::Receiver<SessionEvent>,
    remote: RecognitionRemote,
    transport: FakeTransport,
}

/// Spawn a session with the given silence timeout
fn start_session(silence_timeout: Duration) -> Harness {
    let (backend, remote) = fake_recognition();
    let (connection, transport) = fake_transport();
    let recognition = RecognitionSession::new(Box::new(backend));
    let (session, handle, events) = VoiceSession::new(recognition, connection, silence_timeout, None);
    tokio::spawn(session.run());

    Harness {
        handle,
        events,
        remote,
        transport,
    }
}

/// Drain events until one matches, panicking after two seconds
async fn wait_for(
    events: &mut mpsc::Receiver<SessionEvent>,
    what: &str,
    pred: impl Fn(&SessionEvent) -> bool,
) -> SessionEvent {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        let remaining = deadline
            .checked_duration_since(tokio::time::Instant::now())
            .unwrap_or_else(|| panic!("timed out waiting for {what}"));
        let event = tokio::time::timeout(remaining, events.recv())
            .await
            .unwrap_or_else(|_| panic!("timed out waiting for {what}"))
            .unwrap_or_else(|| panic!("session dropped while waiting for {what}"));
        if pred(&event) {
            return event;
        }
    }
}

/// Assert that no event matching the predicate arrives for `window`
async fn assert_quiet(
    events: &mut mpsc::Receiver<SessionEvent>,
    window: Duration,
    what: &str,
    pred: impl Fn(&SessionEvent) -> bool,
) {
    let deadline = tokio::time::Instant::now() + window;
    loop {
        let now = tokio::time::Instant::now();
        let Some(remaining) = deadline.checked_duration_since(now) else {
            return;
        };
        match tokio::time::timeout(remaining, events.recv()).await {
            Err(_) => return,
            Ok(Some(event)) => {
                assert!(!pred(&event), "unexpected {what}: {event:?}");
            }
            Ok(None) => return,
        }
    }
}

fn final_segment(text: &str) -> RecognitionEvent {
    RecognitionEvent::Transcript(vec![TranscriptSegment::final_text(text)])
}

fn interim_segment(text: &str) -> RecognitionEvent {
    RecognitionEvent::Transcript(vec![TranscriptSegment::interim(text)])
}

#[tokio::test]
async fn test_utterance_submitted_exactly_once_after_silence() {
    let mut h = start_session(Duration::from_millis(100));

    h.handle.toggle_listening().await.unwrap();
    wait_for(&mut h.events, "listening", |e| {
        matches!(e, SessionEvent::ListeningChanged(ListeningState::Listening))
    })
    .await;

    h.remote.emit(final_segment("hello there")).await;
    wait_for(&mut h.events, "transcript", |e| {
        matches!(e, SessionEvent::TranscriptChanged(t) if t == "hello there")
    })
    .await;

    // silence elapses: exactly one submission reaches the transport
    let submitted = tokio::time::timeout(Duration::from_secs(2), h.transport.submitted.recv())
        .await
        .expect("submission after silence")
        .unwrap();
    assert_eq!(submitted, "hello there");

    // the user message entered the chat log and the display cleared
    wait_for(&mut h.events, "user message", |e| {
        matches!(e, SessionEvent::MessageAppended(m)
            if m.sender == Sender::User && m.text == "hello there")
    })
    .await;

    // no duplicate fire
    let extra = tokio::time::timeout(Duration::from_millis(300), h.transport.submitted.recv()).await;
    assert!(extra.is_err(), "utterance submitted twice");
}

#[tokio::test]
async fn test_toggle_off_cancels_pending_submission() {
    let mut h = start_session(Duration::from_millis(100));

    h.handle.toggle_listening().await.unwrap();
    h.remote.emit(final_segment("abandoned words")).await;
    wait_for(&mut h.events, "transcript", |e| {
        matches!(e, SessionEvent::TranscriptChanged(t) if t == "abandoned words")
    })
    .await;

    // toggle off before the silence threshold
    h.handle.toggle_listening().await.unwrap();
    wait_for(&mut h.events, "idle", |e| {
        matches!(e, SessionEvent::ListeningChanged(ListeningState::Idle))
    })
    .await;

    // well past the timeout: the abandoned utterance must never surface
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(h.transport.submitted.try_recv().is_err());
}

#[tokio::test]
async fn test_no_speech_error_is_invisible() {
    let mut h = start_session(Duration::from_secs(5));

    h.handle.toggle_listening().await.unwrap();
    wait_for(&mut h.events, "listening", |e| {
        matches!(e, SessionEvent::ListeningChanged(ListeningState::Listening))
    })
    .await;

    h.remote
        .emit(RecognitionEvent::Error(RecognitionErrorKind::NoSpeech))
        .await;

    // no error surfaces and listening does not change
    assert_quiet(&mut h.events, Duration::from_millis(200), "error", |e| {
        matches!(
            e,
            SessionEvent::RecognitionError(_) | SessionEvent::ListeningChanged(_)
        )
    })
    .await;

    // the session still processes speech afterwards
    h.remote.emit(interim_segment("still here")).await;
    wait_for(&mut h.events, "transcript", |e| {
        matches!(e, SessionEvent::TranscriptChanged(t) if t == "still here")
    })
    .await;
}

#[tokio::test]
async fn test_stale_events_ignored_while_idle() {
    let mut h = start_session(Duration::from_millis(100));

    // listen briefly, then toggle off; the service is now shutting down
    h.handle.toggle_listening().await.unwrap();
    wait_for(&mut h.events, "listening", |e| {
        matches!(e, SessionEvent::ListeningChanged(ListeningState::Listening))
    })
    .await;
    h.handle.toggle_listening().await.unwrap();
    wait_for(&mut h.events, "idle", |e| {
        matches!(e, SessionEvent::ListeningChanged(ListeningState::Idle))
    })
    .await;

    // late callbacks from the dying session
    h.remote.emit(final_segment("late result")).await;
    h.remote.emit(RecognitionEvent::Ended).await;

    assert_quiet(&mut h.events, Duration::from_millis(200), "stale update", |e| {
        matches!(e, SessionEvent::TranscriptChanged(t) if !t.is_empty())
    })
    .await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(h.transport.submitted.try_recv().is_err());
}

#[tokio::test]
async fn test_restart_waits_for_ended() {
    let mut h = start_session(Duration::from_millis(100));

    h.handle.toggle_listening().await.unwrap();
    h.remote.emit(final_segment("first utterance")).await;

    let submitted = tokio::time::timeout(Duration::from_secs(2), h.transport.submitted.recv())
        .await
        .expect("submission")
        .unwrap();
    assert_eq!(submitted, "first utterance");

    // stop was requested but the service has not ended yet: no restart
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.remote.starts(), 1);
    assert_eq!(h.remote.stops(), 1);

    // the service terminates; only now does a fresh start happen
    h.remote.emit(RecognitionEvent::Ended).await;
    wait_for(&mut h.events, "listening again", |e| {
        matches!(e, SessionEvent::ListeningChanged(ListeningState::Listening))
    })
    .await;
    assert_eq!(h.remote.starts(), 2);

    // and the fresh session works end to end
    h.remote.emit(final_segment("second utterance")).await;
    let submitted = tokio::time::timeout(Duration::from_secs(2), h.transport.submitted.recv())
        .await
        .expect("second submission")
        .unwrap();
    assert_eq!(submitted, "second utterance");
}

#[tokio::test]
async fn test_toggle_off_while_restarting_abandons_restart() {
    let mut h = start_session(Duration::from_millis(100));

    h.handle.toggle_listening().await.unwrap();
    h.remote.emit(final_segment("submit this")).await;
    tokio::time::timeout(Duration::from_secs(2), h.transport.submitted.recv())
        .await
        .expect("submission")
        .unwrap();

    // user toggles off while the stop is still in flight
    h.handle.toggle_listening().await.unwrap();
    wait_for(&mut h.events, "idle", |e| {
        matches!(e, SessionEvent::ListeningChanged(ListeningState::Idle))
    })
    .await;

    // the awaited Ended arrives in Idle: no restart
    h.remote.emit(RecognitionEvent::Ended).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.remote.starts(), 1);
}

#[tokio::test]
async fn test_manual_submit_bypasses_timer() {
    let mut h = start_session(Duration::from_secs(30));

    h.handle.toggle_listening().await.unwrap();
    h.remote.emit(interim_segment("submit me now")).await;
    wait_for(&mut h.events, "transcript", |e| {
        matches!(e, SessionEvent::TranscriptChanged(t) if t == "submit me now")
    })
    .await;

    h.handle.submit_now().await.unwrap();

    // arrives promptly despite the 30s silence timeout
    let submitted = tokio::time::timeout(Duration::from_secs(2), h.transport.submitted.recv())
        .await
        .expect("manual submission")
        .unwrap();
    assert_eq!(submitted, "submit me now");
}

#[tokio::test]
async fn test_unexpected_end_goes_idle() {
    let mut h = start_session(Duration::from_millis(100));

    h.handle.toggle_listening().await.unwrap();
    h.remote.emit(interim_segment("cut off")).await;

    // the platform times the session out on its own
    h.remote.emit(RecognitionEvent::Ended).await;
    wait_for(&mut h.events, "idle", |e| {
        matches!(e, SessionEvent::ListeningChanged(ListeningState::Idle))
    })
    .await;

    // the cancelled timer never submits the partial utterance
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(h.transport.submitted.try_recv().is_err());
}

#[tokio::test]
async fn test_fatal_recognition_error_stops_listening() {
    let mut h = start_session(Duration::from_secs(5));

    h.handle.toggle_listening().await.unwrap();
    h.remote
        .emit(RecognitionEvent::Error(RecognitionErrorKind::AudioCapture(
            "device disappeared".to_string(),
        )))
        .await;

    wait_for(&mut h.events, "surfaced error", |e| {
        matches!(e, SessionEvent::RecognitionError(m) if m.contains("device disappeared"))
    })
    .await;
    wait_for(&mut h.events, "idle", |e| {
        matches!(e, SessionEvent::ListeningChanged(ListeningState::Idle))
    })
    .await;
}

#[tokio::test]
async fn test_nonfatal_recognition_error_keeps_listening() {
    let mut h = start_session(Duration::from_secs(5));

    h.handle.toggle_listening().await.unwrap();
    wait_for(&mut h.events, "listening", |e| {
        matches!(e, SessionEvent::ListeningChanged(ListeningState::Listening))
    })
    .await;

    h.remote
        .emit(RecognitionEvent::Error(RecognitionErrorKind::Network(
            "connection reset".to_string(),
        )))
        .await;

    wait_for(&mut h.events, "surfaced error", |e| {
        matches!(e, SessionEvent::RecognitionError(m) if m.contains("connection reset"))
    })
    .await;

    // still listening: transcripts keep flowing
    h.remote.emit(interim_segment("still speaking")).await;
    wait_for(&mut h.events, "transcript", |e| {
        matches!(e, SessionEvent::TranscriptChanged(t) if t == "still speaking")
    })
    .await;
}

#[tokio::test]
async fn test_reply_fragments_coalesce_into_one_message() {
    let mut h = start_session(Duration::from_millis(100));

    h.handle.toggle_listening().await.unwrap();
    h.remote.emit(final_segment("question")).await;
    tokio::time::timeout(Duration::from_secs(2), h.transport.submitted.recv())
        .await
        .expect("submission")
        .unwrap();

    for fragment in ["Hel", "lo ", "wor", "ld."] {
        h.transport
            .events
            .send(TransportEvent::Fragment(fragment.to_string()))
            .await
            .unwrap();
    }

    let final_update = wait_for(&mut h.events, "coalesced reply", |e| {
        matches!(e, SessionEvent::MessageUpdated(m) if m.text == "Hello world.")
    })
    .await;

    // all fragments landed in one assistant message
    let SessionEvent::MessageUpdated(message) = final_update else {
        unreachable!();
    };
    assert_eq!(message.sender, Sender::Assistant);
}

#[tokio::test]
async fn test_reply_is_sanitized() {
    let mut h = start_session(Duration::from_millis(100));

    h.handle.toggle_listening().await.unwrap();
    h.remote.emit(final_segment("question")).await;
    tokio::time::timeout(Duration::from_secs(2), h.transport.submitted.recv())
        .await
        .expect("submission")
        .unwrap();

    h.transport
        .events
        .send(TransportEvent::Fragment(
            "<script>alert(1)</script> hi".to_string(),
        ))
        .await
        .unwrap();

    let update = wait_for(&mut h.events, "sanitized reply", |e| {
        matches!(e, SessionEvent::MessageUpdated(_))
    })
    .await;
    let SessionEvent::MessageUpdated(message) = update else {
        unreachable!();
    };
    assert!(!message.text.contains("<script>"));
    assert!(message.text.contains("hi"));
}

#[tokio::test]
async fn test_transport_failure_becomes_chat_message() {
    let mut h = start_session(Duration::from_millis(100));

    h.handle.toggle_listening().await.unwrap();
    h.remote.emit(final_segment("question")).await;
    tokio::time::timeout(Duration::from_secs(2), h.transport.submitted.recv())
        .await
        .expect("submission")
        .unwrap();

    h.transport
        .events
        .send(TransportEvent::Failed(TransportError::Network(
            "connection refused".to_string(),
        )))
        .await
        .unwrap();

    // rendered inline, attributed to the assistant, no crash
    wait_for(&mut h.events, "error chat line", |e| {
        matches!(e, SessionEvent::MessageAppended(m)
            if m.sender == Sender::Assistant && m.text.contains("connection refused"))
    })
    .await;
}
