//! Platform-agnostic contract for environment signals: online/offline,
//! page-visibility, and required-feature detection.

use futures::stream::LocalBoxStream;

/// One of the runtime capabilities a conforming platform must expose before
/// a [`Client`] may connect.
///
/// [`Client`]: crate::client::Client
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RequiredFeature {
    /// `RTCPeerConnection` constructor is absent.
    WebRtc,

    /// `WebSocket` constructor is absent.
    WebSocket,

    /// `navigator.mediaDevices.getUserMedia` is absent.
    GetUserMedia,
}

/// Online/offline and page-visibility signals, plus a startup feature
/// probe, abstracted away from the concrete browser APIs that back them.
#[cfg_attr(feature = "mockable", mockall::automock)]
pub trait EnvironmentProbe {
    /// Returns the current value of `navigator.onLine`.
    fn is_online(&self) -> bool;

    /// Returns `true` unless `document.visibilityState` is `"hidden"`.
    fn is_page_visible(&self) -> bool;

    /// Checks for the presence of every capability a [`Client`] depends on.
    ///
    /// # Errors
    ///
    /// Returns the first missing [`RequiredFeature`] encountered.
    ///
    /// [`Client`]: crate::client::Client
    fn check_required_features(&self) -> Result<(), RequiredFeature>;

    /// Subscribes to `online`/`offline` transitions; yields the new
    /// online state.
    fn on_online_change(&self) -> LocalBoxStream<'static, bool>;

    /// Subscribes to `visibilitychange`; yields the new visibility state.
    fn on_visibility_change(&self) -> LocalBoxStream<'static, bool>;
}
