//! Integration tests for the connection lifecycle engine (C4), covering
//! scenarios S1-S4 and invariants 1-3.

#![cfg(all(target_arch = "wasm32", feature = "mockable"))]

mod common;

use std::{cell::Cell, rc::Rc};

use futures::{stream, StreamExt as _};
use sipphone::{
    config::TransportConfig,
    platform::sip::{MockSipUserAgent, SipError, SipUserAgent, UaEvent},
    rpc::{ClientStatus, Transport},
};
use wasm_bindgen_test::*;

use crate::common::{quiet_env, test_config, timeout};

wasm_bindgen_test_configure!(run_in_browser);

type UaFactory = Rc<dyn Fn(&TransportConfig) -> Rc<dyn SipUserAgent>>;

fn factory_emitting(events: Vec<UaEvent>) -> UaFactory {
    Rc::new(move |_| {
        let events = events.clone();
        let mut ua = MockSipUserAgent::new();
        ua.expect_start().returning(|| Ok(()));
        ua.expect_register().returning(|| ());
        ua.expect_unregister().returning(|| ());
        ua.expect_stop().returning(|| ());
        ua.expect_dialog().returning(|_| None);
        ua.expect_on_event()
            .returning_st(move || Box::pin(stream::iter(events.clone())));
        Rc::new(ua)
    })
}

/// S1: a stub UA that registers immediately drives the status stream
/// `DISCONNECTED -> CONNECTING -> CONNECTED` and `start()` is called once.
#[wasm_bindgen_test]
async fn connect_happy_path() {
    let start_calls = Rc::new(Cell::new(0_u32));
    let start_calls_clone = Rc::clone(&start_calls);
    let ua_factory: UaFactory = Rc::new(move |_| {
        let start_calls = Rc::clone(&start_calls_clone);
        let mut ua = MockSipUserAgent::new();
        ua.expect_start().returning_st(move || {
            start_calls.set(start_calls.get() + 1);
            Ok(())
        });
        ua.expect_register().returning(|| ());
        ua.expect_stop().returning(|| ());
        ua.expect_on_event()
            .returning_st(|| Box::pin(stream::iter(vec![UaEvent::Registered])));
        Rc::new(ua)
    });

    let transport = Transport::new(test_config(), ua_factory, quiet_env());
    let mut statuses = transport.on_status_update();

    let result = timeout(300, Rc::clone(&transport).connect()).await;
    assert!(matches!(result, Ok(Ok(()))));
    assert_eq!(transport.status(), ClientStatus::Connected);
    assert_eq!(start_calls.get(), 1);

    assert_eq!(statuses.next().await, Some(ClientStatus::Disconnected));
    assert_eq!(statuses.next().await, Some(ClientStatus::Connecting));
    assert_eq!(statuses.next().await, Some(ClientStatus::Connected));
}

/// Invariant 2: once `CONNECTED`, a second `connect()` resolves `Ok` without
/// a further `ua.start()` call.
#[wasm_bindgen_test]
async fn connect_while_connected_is_a_no_op() {
    let ua_factory = factory_emitting(vec![UaEvent::Registered]);
    let transport = Transport::new(test_config(), ua_factory, quiet_env());
    timeout(300, Rc::clone(&transport).connect()).await.unwrap().unwrap();

    let second = timeout(300, Rc::clone(&transport).connect()).await.unwrap();
    assert!(second.is_ok());
    assert_eq!(transport.status(), ClientStatus::Connected);
}

/// S3: a UA stub that never opens the transport causes `connect()` to
/// reject once `wsTimeout` elapses, with a final `DISCONNECTED` status.
#[wasm_bindgen_test]
async fn websocket_timeout() {
    let ua_factory: UaFactory = Rc::new(|_| {
        let mut ua = MockSipUserAgent::new();
        ua.expect_start().returning(|| Ok(()));
        ua.expect_register().returning(|| ());
        ua.expect_stop().returning(|| ());
        ua.expect_on_event().returning_st(|| Box::pin(stream::pending()));
        Rc::new(ua)
    });

    let transport = Transport::new(test_config(), ua_factory, quiet_env());
    let result = timeout(500, Rc::clone(&transport).connect())
        .await
        .expect("connect() should settle within the wsTimeout window")
        .expect_err("a UA that never opens should reject connect()");
    assert_eq!(
        result.to_string(),
        "Could not connect to the websocket in time."
    );
    assert_eq!(transport.status(), ClientStatus::Disconnected);
}

/// S4: a UA stub whose `register()` immediately fails causes `connect()` to
/// reject and the final status to be `DISCONNECTED`.
#[wasm_bindgen_test]
async fn registration_failure() {
    let ua_factory = factory_emitting(vec![UaEvent::RegistrationFailed(SipError {
        kind: "Authentication".into(),
        cause: "Unauthorized".into(),
        sip_code: Some(401),
    })]);

    let transport = Transport::new(test_config(), ua_factory, quiet_env());
    let mut statuses = transport.on_status_update();

    let result = timeout(300, Rc::clone(&transport).connect()).await.unwrap();
    assert!(result.is_err());
    assert_eq!(transport.status(), ClientStatus::Disconnected);

    assert_eq!(statuses.next().await, Some(ClientStatus::Disconnected));
    assert_eq!(statuses.next().await, Some(ClientStatus::Connecting));
    assert_eq!(statuses.next().await, Some(ClientStatus::Disconnected));
}

/// S2 / invariant 3: `connect()` while `RECOVERING` rejects synchronously
/// with `RecoveringError`, without the recovery attempt's UA ever settling.
#[wasm_bindgen_test]
async fn connect_while_recovering_rejects() {
    let attempt = Rc::new(Cell::new(0_u32));
    let attempt_clone = Rc::clone(&attempt);
    let ua_factory: UaFactory = Rc::new(move |_| {
        let n = attempt_clone.get();
        attempt_clone.set(n + 1);
        let mut ua = MockSipUserAgent::new();
        ua.expect_start().returning(|| Ok(()));
        ua.expect_register().returning(|| ());
        ua.expect_stop().returning(|| ());
        if n == 0 {
            // First UA: registers, then the transport drops.
            ua.expect_on_event().returning_st(|| {
                Box::pin(stream::iter(vec![
                    UaEvent::Registered,
                    UaEvent::Disconnected(None),
                ]))
            });
        } else {
            // Every recovery attempt after that stalls, keeping the
            // transport in RECOVERING for the rest of the test.
            ua.expect_on_event().returning_st(|| Box::pin(stream::pending()));
        }
        Rc::new(ua)
    });

    let transport = Transport::new(test_config(), ua_factory, quiet_env());
    timeout(300, Rc::clone(&transport).connect()).await.unwrap().unwrap();

    // Let the spawned UA-event loop observe the `Disconnected` event and
    // drive the transport into RECOVERING.
    common::delay_for(0).await;
    assert_eq!(transport.status(), ClientStatus::Recovering);

    let result = timeout(300, Rc::clone(&transport).connect())
        .await
        .expect("connect() while RECOVERING rejects synchronously");
    let err = result.expect_err("connect() while RECOVERING must reject");
    assert_eq!(err.to_string(), "Can not connect while trying to recover.");
    assert_eq!(transport.status(), ClientStatus::Recovering);
}
