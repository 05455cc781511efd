//! Platform-agnostic contract for a SIP user-agent stack.
//!
//! This library does not parse SIP wire bytes or negotiate SDP itself; it
//! consumes an external SIP stack that does, through the narrow capability
//! façade defined here. A conforming implementation wraps whatever concrete
//! JS library (`SIP.js`, `JsSIP`, ...) the host page supplies.

use std::rc::Rc;

use derive_more::Display;
use futures::{future::LocalBoxFuture, stream::LocalBoxStream};
use sipphone_macro::Caused;
use tracerr::Traced;

use crate::{
    platform::{self, RtcStats, RtcStatsError},
    utils::Caused,
};

/// Error surfaced by the underlying SIP stack, normalized to
/// `{kind, cause, sipCode?}` as specified for the adapter's error reporting.
#[derive(Clone, Debug, Display, PartialEq)]
#[display(fmt = "{kind}: {cause}")]
pub struct SipError {
    /// Coarse-grained category of the failure (e.g. `"Authentication"`).
    pub kind: String,

    /// Human-readable cause string reported by the SIP stack.
    pub cause: String,

    /// SIP response code, if the failure is tied to one.
    pub sip_code: Option<u16>,
}

/// Information carried by a dialog's terminal event.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TerminationInfo {
    /// Textual termination cause (`"Bye"`, `"Cancel"`, `"Failure"`, ...).
    pub cause: Option<String>,

    /// Parsed `X-Asterisk-Hangupcausecode` header value, if a `BYE` carried
    /// one.
    pub hangup_cause_code: Option<u16>,
}

/// Errors produced by [`SipUserAgent`] operations that are not surfaced as a
/// [`DialogEvent`] or [`UaEvent`].
#[derive(Clone, Debug, Display, Caused)]
#[cause(error = "platform::Error")]
pub enum SipUserAgentError {
    /// Underlying SIP stack rejected a synchronous call (e.g. invalid URI).
    #[display(fmt = "SIP stack call failed: {}", _0)]
    CallFailed(SipError),

    /// Failed to bind to one of the SIP stack's DOM events.
    #[display(fmt = "Failed to bind to SIP stack event: {}", _0)]
    EventBindFailed(platform::Error),
}

/// Top-level events emitted by a [`SipUserAgent`] while it is started.
#[derive(Clone, Debug, PartialEq)]
pub enum UaEvent {
    /// Registration with the registrar succeeded.
    Registered,

    /// Registration attempt was rejected.
    RegistrationFailed(SipError),

    /// A previously-registered identity was unregistered.
    Unregistered,

    /// The underlying transport (WebSocket) was (re)created and is open.
    TransportCreated,

    /// A new inbound dialog arrived; `call_id` identifies it for the
    /// matching [`SipUserAgent::dialog_events`] subscription.
    Invite {
        /// SIP `Call-ID` of the inbound dialog.
        call_id: String,
        /// Request URI the invite was addressed to.
        remote_uri: String,
    },

    /// The transport was closed, intentionally or not.
    Disconnected(Option<SipError>),
}

/// Per-dialog events, as specified for an invite's sub-stream.
#[derive(Clone, Debug, PartialEq)]
pub enum DialogEvent {
    /// Outbound invite was accepted (200 OK), or `accept()` on an inbound
    /// dialog completed.
    Accepted,

    /// Outbound invite was rejected, or `reject()` on an inbound dialog
    /// completed.
    Rejected(SipError),

    /// Dialog establishment failed (timeout, transport error, ...).
    Failed(SipError),

    /// Dialog reached a terminal state.
    Terminated(TerminationInfo),

    /// A `BYE` was observed prior to termination.
    Bye,

    /// A hold/unhold or device-change re-INVITE was accepted.
    ReinviteAccepted,

    /// A hold/unhold or device-change re-INVITE was rejected.
    ReinviteFailed(SipError),

    /// The remote party issued a `REFER`.
    ReferRequested {
        /// Transfer target carried by the `REFER`.
        target: String,
    },

    /// The stack created its `SessionDescriptionHandler`, meaning a peer
    /// connection now exists for this dialog.
    SessionDescriptionHandlerCreated,
}

/// A single SIP dialog (an outbound or inbound call), as exposed by the
/// underlying SIP stack.
#[cfg_attr(feature = "mockable", mockall::automock)]
pub trait SipDialog {
    /// Returns this dialog's SIP `Call-ID`.
    fn call_id(&self) -> String;

    /// Returns the first present of `P-Asserted-Identity`,
    /// `Remote-Party-Id`, `From` headers, unparsed.
    fn remote_identity_header(&self) -> Option<String>;

    /// Accepts an inbound dialog.
    fn accept(&self);

    /// Rejects an inbound dialog.
    fn reject(&self);

    /// Sends a `BYE`, terminating an active dialog.
    fn bye(&self);

    /// Requests a hold re-INVITE.
    fn hold(&self);

    /// Requests an unhold re-INVITE.
    fn unhold(&self);

    /// Sends DTMF `tones` on this dialog.
    fn dtmf(&self, tones: &str);

    /// Sends a blind `REFER` to `target`.
    fn refer(&self, target: &str);

    /// Sends an attended `REFER` (REFER-with-Replaces) naming `replaces` as
    /// the dialog being replaced.
    fn refer_with_replaces(&self, target: &str, replaces: &str);

    /// Tears the dialog's `SessionDescriptionHandler` down and rebuilds it,
    /// triggering a re-INVITE.
    fn rebuild_session_description_handler(&self);

    /// Subscribes to this dialog's event stream.
    fn on_event(&self) -> LocalBoxStream<'static, DialogEvent>;

    /// Binds `track` as this dialog's outgoing audio track, replacing
    /// whatever track (if any) was bound before without tearing down the
    /// dialog. The underlying stack performs an in-place `replaceTrack` if
    /// the peer connection already exists.
    fn set_local_audio_track(&self, track: &platform::MediaStreamTrack);

    /// Pulls a fresh [`RtcStats`] snapshot from this dialog's peer
    /// connection.
    ///
    /// # Errors
    ///
    /// Errors if no `SessionDescriptionHandler` exists yet, or if parsing
    /// the underlying stats report fails.
    fn stats(&self) -> LocalBoxFuture<'static, Result<RtcStats, Traced<RtcStatsError>>>;
}

/// Thin capability façade over an external SIP user-agent stack.
#[cfg_attr(feature = "mockable", mockall::automock)]
pub trait SipUserAgent {
    /// Starts the underlying transport.
    ///
    /// # Errors
    ///
    /// Errors if the underlying stack rejects the call synchronously.
    fn start(&self) -> Result<(), Traced<SipUserAgentError>>;

    /// Forcibly stops the underlying transport and any pending dialogs.
    fn stop(&self);

    /// Sends a `REGISTER` for the configured identity.
    fn register(&self);

    /// Sends a `REGISTER` with `Expires: 0`.
    fn unregister(&self);

    /// Returns a dialog matching `call_id`, previously surfaced via
    /// [`UaEvent::Invite`].
    fn dialog(&self, call_id: &str) -> Option<Rc<dyn SipDialog>>;

    /// Issues an outbound `INVITE` to `uri`, returning the resulting dialog.
    fn invite(&self, uri: &str) -> Rc<dyn SipDialog>;

    /// Subscribes to this user agent's top-level event stream.
    fn on_event(&self) -> LocalBoxStream<'static, UaEvent>;
}
