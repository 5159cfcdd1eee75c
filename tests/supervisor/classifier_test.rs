//! Tests for line classification and stage tracking together.

use deckathon_supervisor::script::{Credentials, RunEvent};
use deckathon_supervisor::supervisor::{classify_line, OutcomeMarker, StageTracker, MAX_STAGE_LEN};

fn feed(tracker: &mut StageTracker, lines: &[&str]) -> Vec<RunEvent> {
    let mut accepted = Vec::new();
    for line in lines {
        for event in classify_line(line) {
            if tracker.apply(&event) {
                accepted.push(event);
            }
        }
    }
    accepted
}

#[test]
fn step_lines_render_step_text() {
    for (line, expected) in [
        ("STEP 1: Start", "Step 1: Start"),
        ("STEP 3: Filling login form", "Step 3: Filling login form"),
        ("STEP 10: Selecting courses", "Step 10: Selecting courses"),
    ] {
        assert_eq!(classify_line(line), vec![RunEvent::stage(expected)], "{line}");
    }
}

#[test]
fn second_credential_line_is_ignored() {
    let mut tracker = StageTracker::new();
    let accepted = feed(
        &mut tracker,
        &[
            "Credentials: first | a | b | pw1",
            "Credentials: second | c | d | pw2",
        ],
    );

    assert_eq!(
        accepted,
        vec![RunEvent::CredentialsExtracted(Credentials::new("first", "pw1"))]
    );
    assert_eq!(tracker.credentials(), Some(&Credentials::new("first", "pw1")));
}

#[test]
fn keyword_stage_never_exceeds_limit() {
    let long = format!("Submitting registration {}", "form ".repeat(20));
    let events = classify_line(&long);
    let stage = events[0].stage_text().unwrap();

    assert_eq!(stage.chars().count(), MAX_STAGE_LEN);
    assert_eq!(&stage[..47], &long[..47]);
    assert!(stage.ends_with("..."));
}

#[test]
fn stage_follows_latest_line() {
    let mut tracker = StageTracker::new();
    feed(
        &mut tracker,
        &["STEP 1: Start", "Connecting to portal", "STEP 2: Payment page"],
    );

    let snapshot = tracker.snapshot();
    assert_eq!(snapshot.current_stage, "Step 2: Payment page");
    assert_eq!(snapshot.sequence, 3);
}

#[test]
fn error_line_keeps_current_stage() {
    let mut tracker = StageTracker::new();
    let accepted = feed(&mut tracker, &["STEP 2: Login", "ERROR: network unreachable"]);

    assert_eq!(tracker.current_stage(), "Step 2: Login");
    assert_eq!(
        accepted.last(),
        Some(&RunEvent::Failed {
            message: "ERROR: network unreachable".to_string()
        })
    );
}

#[test]
fn error_line_with_keyword_moves_stage() {
    let mut tracker = StageTracker::new();
    feed(&mut tracker, &["STEP 2: Login", "ERROR: OTP expired"]);

    assert_eq!(tracker.current_stage(), "ERROR: OTP expired");
    assert!(matches!(
        tracker.marker(),
        Some(OutcomeMarker::Failed(message)) if message == "ERROR: OTP expired"
    ));
}
