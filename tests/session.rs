//! Integration tests for the per-call state machine (C6), covering
//! scenarios S5-S6 and invariants 4, 6, 7.

#![cfg(all(target_arch = "wasm32", feature = "mockable"))]

mod common;

use futures::{channel::mpsc, stream};
use sipphone::{
    media::{AudioMediaTemplate, MediaManager},
    platform::sip::{DialogEvent, MockSipDialog, SipDialog, TerminationInfo},
    session::{Session, SessionState},
};
use std::rc::Rc;
use wasm_bindgen_test::*;

use crate::common::timeout;

wasm_bindgen_test_configure!(run_in_browser);

fn new_session(dialog: MockSipDialog, initial_state: SessionState) -> Session {
    let dialog: Rc<dyn SipDialog> = Rc::new(dialog);
    Session::new(
        dialog,
        MediaManager::default(),
        AudioMediaTemplate::default(),
        AudioMediaTemplate::default(),
        initial_state,
    )
}

/// S5: two `hold()` calls issued before the re-INVITE settles observe the
/// same outcome, and only a single `hold()` reaches the dialog.
#[wasm_bindgen_test]
async fn hold_is_idempotent_while_pending() {
    let (tx, rx) = mpsc::unbounded();
    let mut dialog = MockSipDialog::new();
    dialog.expect_call_id().returning(|| "call-1".to_owned());
    dialog.expect_hold().times(1).returning(|| ());
    dialog.expect_on_event().return_once(move || Box::pin(rx));
    let session = new_session(dialog, SessionState::Active);

    let joined =
        futures::future::join(session.hold(), session.hold());

    wasm_bindgen_futures::spawn_local(async move {
        common::delay_for(0).await;
        tx.unbounded_send(DialogEvent::ReinviteAccepted).unwrap();
    });

    let (first, second) = timeout(300, joined).await.unwrap();
    assert_eq!(first.unwrap(), true);
    assert_eq!(second.unwrap(), true);
    assert!(session.hold_state());
    assert_eq!(session.state(), SessionState::OnHold);
}

/// S6: a `BYE` carrying `X-Asterisk-Hangupcausecode: 58` terminates the
/// session with [`SessionError::MisconfiguredAccount`].
#[wasm_bindgen_test]
async fn misconfigured_account_on_hangup_cause_58() {
    let mut dialog = MockSipDialog::new();
    dialog.expect_call_id().returning(|| "call-2".to_owned());
    dialog.expect_on_event().return_once(|| {
        Box::pin(stream::iter(vec![
            DialogEvent::Accepted,
            DialogEvent::Terminated(TerminationInfo {
                cause: Some("Bye".to_owned()),
                hangup_cause_code: Some(58),
            }),
        ]))
    });
    let session = new_session(dialog, SessionState::Initial);

    let result = timeout(300, session.terminated()).await.unwrap();
    let err = result.expect_err("cause code 58 should surface as an error");
    assert_eq!(
        err.to_string(),
        "Account is misconfigured with the registrar"
    );
    assert_eq!(session.state(), SessionState::Terminated);
}

/// Invariant 4: once `terminated()` has resolved, no later dialog event
/// mutates the session further.
#[wasm_bindgen_test]
async fn terminated_session_ignores_further_events() {
    let (tx, rx) = mpsc::unbounded();
    let mut dialog = MockSipDialog::new();
    dialog.expect_call_id().returning(|| "call-3".to_owned());
    dialog.expect_on_event().return_once(move || Box::pin(rx));
    let session = new_session(dialog, SessionState::Active);

    tx.unbounded_send(DialogEvent::Terminated(TerminationInfo::default()))
        .unwrap();
    timeout(300, session.terminated()).await.unwrap().unwrap();
    assert_eq!(session.state(), SessionState::Terminated);

    tx.unbounded_send(DialogEvent::ReinviteAccepted).unwrap();
    common::delay_for(50).await;
    assert!(!session.hold_state());
    assert_eq!(session.state(), SessionState::Terminated);
}

/// Invariant 6: `dtmf(x)` succeeds iff every character of `x` is one of
/// `0-9`, `A-D`, `#`, `*`, `,`.
#[wasm_bindgen_test]
async fn dtmf_validates_tones() {
    let mut dialog = MockSipDialog::new();
    dialog.expect_call_id().returning(|| "call-4".to_owned());
    dialog.expect_on_event().return_once(|| Box::pin(stream::pending()));
    dialog
        .expect_dtmf()
        .withf(|tones| tones == "123A*#,")
        .times(1)
        .returning(|_| ());
    let session = new_session(dialog, SessionState::Active);

    assert!(session.dtmf("123A*#,").is_ok());

    let err = session.dtmf("12x3").expect_err("'x' is not a valid tone");
    assert_eq!(err.to_string(), "Invalid DTMF tones: 12x3");
}

/// `dtmf()` outside `ACTIVE`/`ON_HOLD` rejects with `NotActive` before ever
/// reaching the dialog.
#[wasm_bindgen_test]
async fn dtmf_rejects_outside_active_state() {
    let mut dialog = MockSipDialog::new();
    dialog.expect_call_id().returning(|| "call-5".to_owned());
    dialog.expect_on_event().return_once(|| Box::pin(stream::pending()));
    let session = new_session(dialog, SessionState::Initial);

    let err = session.dtmf("123").expect_err("session is not yet active");
    assert_eq!(err.to_string(), "invalid operation: session is not active");
}

/// Invariant 7: the remote identity header is parsed once and cached.
#[wasm_bindgen_test]
async fn remote_identity_is_parsed_and_cached() {
    let mut dialog = MockSipDialog::new();
    dialog.expect_call_id().returning(|| "call-6".to_owned());
    dialog.expect_on_event().return_once(|| Box::pin(stream::pending()));
    dialog
        .expect_remote_identity_header()
        .times(1)
        .returning(|| Some("\"Alice\" <sip:alice@example.com>".to_owned()));
    let session = new_session(dialog, SessionState::Active);

    let identity = session.remote_identity().expect("header was present");
    assert_eq!(identity.display_name.as_deref(), Some("Alice"));
    assert_eq!(identity.uri, "sip:alice@example.com");

    // Second call hits the cache; `expect_remote_identity_header` would
    // panic if invoked more than once.
    let identity_again = session.remote_identity();
    assert_eq!(identity_again, Some(identity));
}

/// A bare URI with no angle brackets parses with no display name.
#[wasm_bindgen_test]
async fn remote_identity_without_display_name() {
    let mut dialog = MockSipDialog::new();
    dialog.expect_call_id().returning(|| "call-7".to_owned());
    dialog.expect_on_event().return_once(|| Box::pin(stream::pending()));
    dialog
        .expect_remote_identity_header()
        .times(1)
        .returning(|| Some("sip:carol@example.com".to_owned()));
    let session = new_session(dialog, SessionState::Active);

    let identity = session.remote_identity().expect("header was present");
    assert_eq!(identity.display_name, None);
    assert_eq!(identity.uri, "sip:carol@example.com");
}
