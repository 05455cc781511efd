//! Adapter wrapping a host-supplied JS SIP stack object as a
//! [`platform::sip::SipUserAgent`].
//!
//! This library never opens a `WebSocket` or builds a SIP message itself;
//! the host page constructs a concrete stack (`SIP.js`, `JsSIP`, ...) and
//! hands it to [`WasmSipUserAgent::new`] as a plain `JsValue`. Wire-level
//! events are expected as `CustomEvent`s carrying a JSON `detail` payload
//! shaped like [`WireUaEvent`] / [`WireDialogEvent`].

use std::{cell::RefCell, collections::HashMap, convert::TryFrom as _, rc::Rc};

use futures::{
    channel::mpsc, future::LocalBoxFuture, stream::LocalBoxStream, StreamExt as _,
};
use serde::Deserialize;
use tracerr::Traced;
use wasm_bindgen::{prelude::*, JsCast};
use wasm_bindgen_futures::JsFuture;

use crate::{
    config::TransportConfig,
    platform::{
        self,
        sip::{
            DialogEvent, SipDialog, SipError, SipUserAgent, SipUserAgentError,
            TerminationInfo, UaEvent,
        },
        wasm::utils::EventListener,
        RtcStats, RtcStatsError,
    },
};

#[wasm_bindgen]
extern "C" {
    /// Host-supplied SIP user agent. Extends `EventTarget` so that
    /// [`EventListener`] can bind to its `sip-ua-event` notifications.
    #[wasm_bindgen(extends = web_sys::EventTarget)]
    pub type JsSipUserAgent;

    #[wasm_bindgen(method, js_name = start)]
    fn js_start(this: &JsSipUserAgent) -> Result<(), JsValue>;

    #[wasm_bindgen(method, js_name = stop)]
    fn js_stop(this: &JsSipUserAgent);

    #[wasm_bindgen(method, js_name = register)]
    fn js_register(this: &JsSipUserAgent);

    #[wasm_bindgen(method, js_name = unregister)]
    fn js_unregister(this: &JsSipUserAgent);

    #[wasm_bindgen(method, js_name = invite)]
    fn js_invite(this: &JsSipUserAgent, uri: &str) -> JsSipDialog;

    #[wasm_bindgen(method, js_name = dialogById)]
    fn js_dialog_by_id(
        this: &JsSipUserAgent,
        call_id: &str,
    ) -> Option<JsSipDialog>;

    /// Host-supplied SIP dialog (one call leg).
    #[wasm_bindgen(extends = web_sys::EventTarget)]
    pub type JsSipDialog;

    #[wasm_bindgen(method, getter, js_name = callId)]
    fn call_id(this: &JsSipDialog) -> String;

    #[wasm_bindgen(method, getter, js_name = remoteIdentityHeader)]
    fn remote_identity_header(this: &JsSipDialog) -> Option<String>;

    #[wasm_bindgen(method, js_name = accept)]
    fn js_accept(this: &JsSipDialog);

    #[wasm_bindgen(method, js_name = reject)]
    fn js_reject(this: &JsSipDialog);

    #[wasm_bindgen(method, js_name = bye)]
    fn js_bye(this: &JsSipDialog);

    #[wasm_bindgen(method, js_name = hold)]
    fn js_hold(this: &JsSipDialog);

    #[wasm_bindgen(method, js_name = unhold)]
    fn js_unhold(this: &JsSipDialog);

    #[wasm_bindgen(method, js_name = dtmf)]
    fn js_dtmf(this: &JsSipDialog, tones: &str);

    #[wasm_bindgen(method, js_name = refer)]
    fn js_refer(this: &JsSipDialog, target: &str);

    #[wasm_bindgen(method, js_name = referWithReplaces)]
    fn js_refer_with_replaces(
        this: &JsSipDialog,
        target: &str,
        replaces: &str,
    );

    #[wasm_bindgen(method, js_name = rebuildSessionDescriptionHandler)]
    fn js_rebuild_sdh(this: &JsSipDialog);

    #[wasm_bindgen(method, js_name = getStats)]
    fn js_get_stats(this: &JsSipDialog) -> js_sys::Promise;

    #[wasm_bindgen(method, js_name = setLocalAudioTrack)]
    fn js_set_local_audio_track(
        this: &JsSipDialog,
        track: &web_sys::MediaStreamTrack,
    );
}

/// JSON shape of a `sip-ua-event` `CustomEvent.detail`.
#[derive(Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
enum WireUaEvent {
    Registered,
    RegistrationFailed { cause: WireSipError },
    Unregistered,
    TransportCreated,
    Invite { call_id: String, remote_uri: String },
    Disconnected { cause: Option<WireSipError> },
}

/// JSON shape of a `sip-dialog-event` `CustomEvent.detail`.
#[derive(Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
enum WireDialogEvent {
    Accepted,
    Rejected { cause: WireSipError },
    Failed { cause: WireSipError },
    Terminated {
        cause: Option<String>,
        hangup_cause_code: Option<u16>,
    },
    Bye,
    ReinviteAccepted,
    ReinviteFailed { cause: WireSipError },
    ReferRequested { target: String },
    SessionDescriptionHandlerCreated,
}

#[derive(Deserialize)]
struct WireSipError {
    kind: String,
    cause: String,
    sip_code: Option<u16>,
}

impl From<WireSipError> for SipError {
    fn from(wire: WireSipError) -> Self {
        Self {
            kind: wire.kind,
            cause: wire.cause,
            sip_code: wire.sip_code,
        }
    }
}

impl From<WireUaEvent> for UaEvent {
    fn from(wire: WireUaEvent) -> Self {
        match wire {
            WireUaEvent::Registered => Self::Registered,
            WireUaEvent::RegistrationFailed { cause } => {
                Self::RegistrationFailed(cause.into())
            }
            WireUaEvent::Unregistered => Self::Unregistered,
            WireUaEvent::TransportCreated => Self::TransportCreated,
            WireUaEvent::Invite { call_id, remote_uri } => {
                Self::Invite { call_id, remote_uri }
            }
            WireUaEvent::Disconnected { cause } => {
                Self::Disconnected(cause.map(Into::into))
            }
        }
    }
}

impl From<WireDialogEvent> for DialogEvent {
    fn from(wire: WireDialogEvent) -> Self {
        match wire {
            WireDialogEvent::Accepted => Self::Accepted,
            WireDialogEvent::Rejected { cause } => Self::Rejected(cause.into()),
            WireDialogEvent::Failed { cause } => Self::Failed(cause.into()),
            WireDialogEvent::Terminated { cause, hangup_cause_code } => {
                Self::Terminated(TerminationInfo {
                    cause,
                    hangup_cause_code,
                })
            }
            WireDialogEvent::Bye => Self::Bye,
            WireDialogEvent::ReinviteAccepted => Self::ReinviteAccepted,
            WireDialogEvent::ReinviteFailed { cause } => {
                Self::ReinviteFailed(cause.into())
            }
            WireDialogEvent::ReferRequested { target } => {
                Self::ReferRequested { target }
            }
            WireDialogEvent::SessionDescriptionHandlerCreated => {
                Self::SessionDescriptionHandlerCreated
            }
        }
    }
}

/// Parses a `CustomEvent`'s JSON `detail` into `T`, logging and swallowing
/// malformed payloads rather than panicking the event loop.
fn parse_detail<T: for<'de> Deserialize<'de>>(
    event: web_sys::CustomEvent,
) -> Option<T> {
    event
        .detail()
        .into_serde()
        .map_err(|e| log::error!("Malformed SIP stack event: {e}"))
        .ok()
}

/// [`SipDialog`] implementation wrapping a [`JsSipDialog`].
pub struct WasmSipDialog {
    inner: Rc<JsSipDialog>,
    _listener: EventListener<JsSipDialog, web_sys::CustomEvent>,
    event_txs: Rc<RefCell<Vec<mpsc::UnboundedSender<DialogEvent>>>>,
}

impl WasmSipDialog {
    fn new(js: JsSipDialog) -> Rc<Self> {
        let inner = Rc::new(js);
        let event_txs = Rc::<RefCell<Vec<mpsc::UnboundedSender<DialogEvent>>>>::default();

        let txs = Rc::clone(&event_txs);
        let listener = EventListener::new_mut(
            Rc::clone(&inner),
            "sip-dialog-event",
            move |event: web_sys::CustomEvent| {
                if let Some(wire) = parse_detail::<WireDialogEvent>(event) {
                    let event = DialogEvent::from(wire);
                    txs.borrow_mut()
                        .retain(|tx| tx.unbounded_send(event.clone()).is_ok());
                }
            },
        )
        .expect("binding to SIP dialog events is infallible in practice");

        Rc::new(Self {
            inner,
            _listener: listener,
            event_txs,
        })
    }
}

impl SipDialog for WasmSipDialog {
    fn call_id(&self) -> String {
        self.inner.call_id()
    }

    fn remote_identity_header(&self) -> Option<String> {
        self.inner.remote_identity_header()
    }

    fn accept(&self) {
        self.inner.js_accept();
    }

    fn reject(&self) {
        self.inner.js_reject();
    }

    fn bye(&self) {
        self.inner.js_bye();
    }

    fn hold(&self) {
        self.inner.js_hold();
    }

    fn unhold(&self) {
        self.inner.js_unhold();
    }

    fn dtmf(&self, tones: &str) {
        self.inner.js_dtmf(tones);
    }

    fn refer(&self, target: &str) {
        self.inner.js_refer(target);
    }

    fn refer_with_replaces(&self, target: &str, replaces: &str) {
        self.inner.js_refer_with_replaces(target, replaces);
    }

    fn rebuild_session_description_handler(&self) {
        self.inner.js_rebuild_sdh();
    }

    fn on_event(&self) -> LocalBoxStream<'static, DialogEvent> {
        let (tx, rx) = mpsc::unbounded();
        self.event_txs.borrow_mut().push(tx);
        Box::pin(rx)
    }

    fn set_local_audio_track(&self, track: &platform::MediaStreamTrack) {
        self.inner.js_set_local_audio_track(track.as_ref());
    }

    fn stats(
        &self,
    ) -> LocalBoxFuture<'static, Result<RtcStats, Traced<RtcStatsError>>> {
        let inner = Rc::clone(&self.inner);
        Box::pin(async move {
            let report = JsFuture::from(inner.js_get_stats())
                .await
                .map_err(|e| {
                    tracerr::new!(RtcStatsError::Platform(platform::error::from(
                        e
                    )))
                })?;
            RtcStats::try_from(&report)
        })
    }
}

/// [`SipUserAgent`] implementation wrapping a [`JsSipUserAgent`] supplied by
/// the host page.
pub struct WasmSipUserAgent {
    inner: Rc<JsSipUserAgent>,
    dialogs: RefCell<HashMap<String, Rc<WasmSipDialog>>>,
    _listener: EventListener<JsSipUserAgent, web_sys::CustomEvent>,
    event_txs: Rc<RefCell<Vec<mpsc::UnboundedSender<UaEvent>>>>,
}

impl WasmSipUserAgent {
    /// Wraps a `js` object supplied by the host page as a
    /// [`SipUserAgent`]. `config` is expected to already have been passed to
    /// `js`'s constructor on the JS side; it is accepted here only so
    /// callers don't need a separate code path to thread it through.
    #[must_use]
    pub fn new(js: JsValue, _config: &TransportConfig) -> Rc<Self> {
        let inner = Rc::new(js.unchecked_into::<JsSipUserAgent>());
        let event_txs = Rc::<RefCell<Vec<mpsc::UnboundedSender<UaEvent>>>>::default();

        let txs = Rc::clone(&event_txs);
        let listener = EventListener::new_mut(
            Rc::clone(&inner),
            "sip-ua-event",
            move |event: web_sys::CustomEvent| {
                if let Some(wire) = parse_detail::<WireUaEvent>(event) {
                    let event = UaEvent::from(wire);
                    txs.borrow_mut()
                        .retain(|tx| tx.unbounded_send(event.clone()).is_ok());
                }
            },
        )
        .expect("binding to SIP UA events is infallible in practice");

        Rc::new(Self {
            inner,
            dialogs: RefCell::new(HashMap::new()),
            _listener: listener,
            event_txs,
        })
    }

    fn track_dialog(&self, js: JsSipDialog) -> Rc<WasmSipDialog> {
        let dialog = WasmSipDialog::new(js);
        self.dialogs
            .borrow_mut()
            .insert(dialog.call_id(), Rc::clone(&dialog));
        dialog
    }
}

impl SipUserAgent for WasmSipUserAgent {
    fn start(&self) -> Result<(), Traced<SipUserAgentError>> {
        self.inner.js_start().map_err(|e| {
            tracerr::new!(SipUserAgentError::EventBindFailed(
                platform::error::from(e)
            ))
        })
    }

    fn stop(&self) {
        self.inner.js_stop();
    }

    fn register(&self) {
        self.inner.js_register();
    }

    fn unregister(&self) {
        self.inner.js_unregister();
    }

    fn dialog(&self, call_id: &str) -> Option<Rc<dyn SipDialog>> {
        if let Some(dialog) = self.dialogs.borrow().get(call_id) {
            return Some(Rc::clone(dialog) as Rc<dyn SipDialog>);
        }
        let js = self.inner.js_dialog_by_id(call_id)?;
        Some(self.track_dialog(js) as Rc<dyn SipDialog>)
    }

    fn invite(&self, uri: &str) -> Rc<dyn SipDialog> {
        let js = self.inner.js_invite(uri);
        self.track_dialog(js) as Rc<dyn SipDialog>
    }

    fn on_event(&self) -> LocalBoxStream<'static, UaEvent> {
        let (tx, rx) = mpsc::unbounded();
        self.event_txs.borrow_mut().push(tx);
        Box::pin(rx)
    }
}
