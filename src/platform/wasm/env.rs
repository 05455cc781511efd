//! Browser-backed [`EnvironmentProbe`]: `navigator.onLine`,
//! `document.visibilityState`, and presence checks for the globals the
//! library depends on.

use std::{ops::Deref, rc::Rc};

use futures::{channel::mpsc, stream::LocalBoxStream};
use wasm_bindgen::{JsCast as _, JsValue};
use web_sys::{Document, Window};

use crate::platform::{
    env::{EnvironmentProbe, RequiredFeature},
    wasm::utils::EventListener,
};

/// `document`, viewed as the `EventTarget` it is at runtime.
///
/// [`web_sys::Document`] only `Deref`s to its immediate parent
/// ([`web_sys::Node`]), one hop short of [`web_sys::EventTarget`]; this
/// closes that gap so [`EventListener`] can bind to it directly.
struct DocumentTarget(Document);

impl Deref for DocumentTarget {
    type Target = web_sys::EventTarget;

    fn deref(&self) -> &Self::Target {
        self.0.unchecked_ref()
    }
}

/// [`EnvironmentProbe`] implementation backed by `window`/`document`.
pub struct WasmEnvironmentProbe {
    window: Rc<Window>,
    document: Document,
    _online_listener: EventListener<Window, web_sys::Event>,
    _offline_listener: EventListener<Window, web_sys::Event>,
    _visibility_listener: EventListener<DocumentTarget, web_sys::Event>,
    online_txs: Rc<std::cell::RefCell<Vec<mpsc::UnboundedSender<bool>>>>,
    visibility_txs: Rc<std::cell::RefCell<Vec<mpsc::UnboundedSender<bool>>>>,
}

impl WasmEnvironmentProbe {
    /// Creates a new [`WasmEnvironmentProbe`], binding to `window` and
    /// `document`'s `online`/`offline`/`visibilitychange` events.
    ///
    /// # Panics
    ///
    /// If the global `window`/`document` are inaccessible, or binding to
    /// their events fails.
    #[must_use]
    pub fn new() -> Self {
        let window = Rc::new(super::window());
        let document = window
            .document()
            .expect("`window.document` is unexpectedly absent");

        let online_txs = Rc::<std::cell::RefCell<Vec<_>>>::default();
        let visibility_txs = Rc::<std::cell::RefCell<Vec<_>>>::default();

        let txs = Rc::clone(&online_txs);
        let online_listener = EventListener::new_mut(
            Rc::clone(&window),
            "online",
            move |_: web_sys::Event| {
                txs.borrow_mut().retain(|tx| tx.unbounded_send(true).is_ok());
            },
        )
        .expect("binding to `online` is infallible in practice");

        let txs = Rc::clone(&online_txs);
        let offline_listener = EventListener::new_mut(
            Rc::clone(&window),
            "offline",
            move |_: web_sys::Event| {
                txs.borrow_mut()
                    .retain(|tx| tx.unbounded_send(false).is_ok());
            },
        )
        .expect("binding to `offline` is infallible in practice");

        let txs = Rc::clone(&visibility_txs);
        let document_target = Rc::new(DocumentTarget(document.clone()));
        let document_for_listener = document.clone();
        let visibility_listener = EventListener::new_mut(
            document_target,
            "visibilitychange",
            move |_: web_sys::Event| {
                let visible = is_document_visible(&document_for_listener);
                txs.borrow_mut()
                    .retain(|tx| tx.unbounded_send(visible).is_ok());
            },
        )
        .expect("binding to `visibilitychange` is infallible in practice");

        Self {
            window,
            document,
            _online_listener: online_listener,
            _offline_listener: offline_listener,
            _visibility_listener: visibility_listener,
            online_txs,
            visibility_txs,
        }
    }
}

impl Default for WasmEnvironmentProbe {
    fn default() -> Self {
        Self::new()
    }
}

fn is_document_visible(document: &Document) -> bool {
    document.visibility_state() == web_sys::VisibilityState::Visible
}

impl EnvironmentProbe for WasmEnvironmentProbe {
    fn is_online(&self) -> bool {
        self.window.navigator().on_line()
    }

    fn is_page_visible(&self) -> bool {
        is_document_visible(&self.document)
    }

    fn check_required_features(&self) -> Result<(), RequiredFeature> {
        let global = JsValue::from(self.window.as_ref().clone());
        if !has_property(&global, "RTCPeerConnection") {
            return Err(RequiredFeature::WebRtc);
        }
        if !has_property(&global, "WebSocket") {
            return Err(RequiredFeature::WebSocket);
        }
        let media_devices = self.window.navigator().media_devices();
        if media_devices.is_err() {
            return Err(RequiredFeature::GetUserMedia);
        }
        Ok(())
    }

    fn on_online_change(&self) -> LocalBoxStream<'static, bool> {
        let (tx, rx) = mpsc::unbounded();
        self.online_txs.borrow_mut().push(tx);
        Box::pin(rx)
    }

    fn on_visibility_change(&self) -> LocalBoxStream<'static, bool> {
        let (tx, rx) = mpsc::unbounded();
        self.visibility_txs.borrow_mut().push(tx);
        Box::pin(rx)
    }
}

/// Checks whether `global[name]` is defined.
fn has_property(global: &JsValue, name: &str) -> bool {
    js_sys::Reflect::get(global, &JsValue::from_str(name))
        .map(|v| !v.is_undefined())
        .unwrap_or(false)
}
