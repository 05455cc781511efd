//! Shared harness for the wasm-bindgen-test integration suites.

#![cfg(target_arch = "wasm32")]
#![allow(dead_code)]

use std::rc::Rc;

use futures::{future::Either, stream, Future};
use js_sys::Promise;
use sipphone::{
    config::{AccountConfig, RawConfig, TransportConfig},
    platform::env::MockEnvironmentProbe,
};
use wasm_bindgen_futures::JsFuture;

/// Returns the global [`web_sys::Window`].
///
/// # Panics
///
/// When the global `Window` object is inaccessible.
pub fn window() -> web_sys::Window {
    web_sys::window().unwrap()
}

/// Resolves after `delay_ms` milliseconds.
pub async fn delay_for(delay_ms: i32) {
    JsFuture::from(Promise::new(&mut |yes, _| {
        window()
            .set_timeout_with_callback_and_timeout_and_arguments_0(&yes, delay_ms)
            .unwrap();
    }))
    .await
    .unwrap();
}

/// Awaits `future` for `timeout_ms` milliseconds, failing the test if it has
/// not resolved by then.
pub async fn timeout<T: Future>(
    timeout_ms: i32,
    future: T,
) -> Result<T::Output, String> {
    match futures::future::select(Box::pin(future), Box::pin(delay_for(timeout_ms)))
        .await
    {
        Either::Left((res, _)) => Ok(res),
        Either::Right(_) => Err("Future timed out.".to_string()),
    }
}

/// A minimal, valid [`TransportConfig`] for tests to adjust as needed.
pub fn test_config() -> TransportConfig {
    RawConfig {
        account: AccountConfig {
            user: "alice".into(),
            password: "secret".into(),
            uri: "sip:alice@example.com".into(),
        },
        ws_servers: vec!["wss://example.com/ws".into()],
        ws_timeout_ms: Some(200),
        ice_servers: Vec::new(),
        registration_expires: None,
        user_agent_string: None,
        media_input: Default::default(),
        media_output: Default::default(),
    }
    .try_into()
    .unwrap()
}

/// An [`EnvironmentProbe`](sipphone::platform::env::EnvironmentProbe) double
/// that reports online and visible, and never emits a change.
///
/// [`EnvironmentProbe`]: sipphone::platform::env::EnvironmentProbe
pub fn quiet_env() -> Rc<MockEnvironmentProbe> {
    let mut env = MockEnvironmentProbe::new();
    env.expect_is_online().returning(|| true);
    env.expect_is_page_visible().returning(|| true);
    env.expect_check_required_features().returning(|| Ok(()));
    env.expect_on_online_change().returning_st(|| Box::pin(stream::pending()));
    env.expect_on_visibility_change()
        .returning_st(|| Box::pin(stream::pending()));
    Rc::new(env)
}
