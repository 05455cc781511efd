//! Integration tests for the top-level client facade (C5): connection
//! gating on `invite()` and the `sessionAdded` fan-out for both outbound
//! and inbound sessions.

#![cfg(all(target_arch = "wasm32", feature = "mockable"))]

mod common;

use std::rc::Rc;

use futures::{stream, StreamExt as _};
use sipphone::{
    client::{Client, ClientError},
    platform::sip::{MockSipDialog, MockSipUserAgent, SipDialog, UaEvent},
    rpc::UaFactory,
    session::SessionState,
};
use wasm_bindgen_test::*;

use crate::common::{quiet_env, test_config, timeout};

wasm_bindgen_test_configure!(run_in_browser);

fn stub_dialog(call_id: &'static str) -> Rc<dyn SipDialog> {
    let mut dialog = MockSipDialog::new();
    dialog.expect_call_id().returning(move || call_id.to_owned());
    dialog.expect_on_event().returning_st(|| Box::pin(stream::pending()));
    Rc::new(dialog)
}

/// Outside `CONNECTED`, `invite()` rejects synchronously with
/// `ClientError::NotConnected` and never reaches the transport.
#[wasm_bindgen_test]
async fn invite_before_connect_is_rejected() {
    let ua_factory: UaFactory = Rc::new(|_| {
        let mut ua = MockSipUserAgent::new();
        ua.expect_on_event().returning_st(|| Box::pin(stream::pending()));
        Rc::new(ua)
    });
    let client = Client::new(test_config(), ua_factory, quiet_env());

    let err = client
        .invite("sip:bob@example.com")
        .expect_err("client has not connected yet");
    assert!(matches!(err.into_parts().0, ClientError::NotConnected));
}

/// An outbound session created via `Client::invite` is surfaced through
/// `on_session_added`.
#[wasm_bindgen_test]
async fn invite_surfaces_outbound_session() {
    let ua_factory: UaFactory = Rc::new(|_| {
        let mut ua = MockSipUserAgent::new();
        ua.expect_start().returning(|| Ok(()));
        ua.expect_register().returning(|| ());
        ua.expect_invite()
            .withf(|uri| uri == "sip:bob@example.com")
            .returning(|_| stub_dialog("call-out"));
        ua.expect_on_event()
            .returning_st(|| Box::pin(stream::iter(vec![UaEvent::Registered])));
        Rc::new(ua)
    });
    let client = Client::new(test_config(), ua_factory, quiet_env());
    timeout(300, client.connect()).await.unwrap().unwrap();

    let mut added = client.on_session_added();
    let session = client.invite("sip:bob@example.com").unwrap();
    assert_eq!(session.id(), "call-out");
    assert_eq!(session.state(), SessionState::Initial);

    let notified = timeout(300, added.next()).await.unwrap().unwrap();
    assert_eq!(notified.id(), "call-out");
    assert_eq!(client.session("call-out").unwrap().id(), "call-out");
}

/// An inbound `INVITE` surfaced by the user agent is turned into a
/// `RINGING` session and reported through `on_session_added`.
#[wasm_bindgen_test]
async fn inbound_invite_surfaces_ringing_session() {
    let ua_factory: UaFactory = Rc::new(|_| {
        let mut ua = MockSipUserAgent::new();
        ua.expect_start().returning(|| Ok(()));
        ua.expect_register().returning(|| ());
        ua.expect_dialog()
            .withf(|call_id| call_id == "call-in")
            .returning(|_| Some(stub_dialog("call-in")));
        ua.expect_on_event().returning_st(|| {
            Box::pin(stream::iter(vec![
                UaEvent::Registered,
                UaEvent::Invite {
                    call_id: "call-in".to_owned(),
                    remote_uri: "sip:carol@example.com".to_owned(),
                },
            ]))
        });
        Rc::new(ua)
    });
    let client = Client::new(test_config(), ua_factory, quiet_env());
    let mut added = client.on_session_added();

    timeout(300, client.connect()).await.unwrap().unwrap();

    let session = timeout(300, added.next()).await.unwrap().unwrap();
    assert_eq!(session.id(), "call-in");
    assert_eq!(session.state(), SessionState::Ringing);
    assert!(client.session("call-in").is_some());
}
