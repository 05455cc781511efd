//! Per-call state machine: accept/reject, terminate, hold, re-INVITE,
//! transfer, and DTMF.

pub mod media;
pub mod stats;

use std::{
    cell::{Cell, RefCell},
    rc::{Rc, Weak},
};

use derive_more::Display;
use futures::channel::oneshot;
use sipphone_macro::Caused;
use tracerr::Traced;

use crate::{
    media::{AudioMediaTemplate, MediaManager},
    platform::{self, DialogEvent, SipDialog, SipError},
    session::{media::SessionMedia, stats::SessionStatsSampler},
    utils::{
        Caused, Detached, HasTaskHandlesStorage, ObservableSpawner as _,
        TaskDisposer as _, TaskHandlesStorage,
    },
};

/// States a [`Session`] moves through over its lifetime.
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum SessionState {
    /// Outbound session created, invite not yet acknowledged.
    #[display(fmt = "initial")]
    Initial,

    /// Inbound session awaiting accept/reject, or outbound session that
    /// received a provisional response.
    #[display(fmt = "ringing")]
    Ringing,

    /// Established, media flowing.
    #[display(fmt = "active")]
    Active,

    /// Established, held.
    #[display(fmt = "on_hold")]
    OnHold,

    /// Terminal event initiated; waiting for it to be confirmed.
    #[display(fmt = "terminating")]
    Terminating,

    /// Terminal event observed; the session emits nothing further.
    #[display(fmt = "terminated")]
    Terminated,
}

/// Errors produced by [`Session`] operations.
#[derive(Clone, Debug, Display, Caused)]
#[cause(error = "platform::Error")]
pub enum SessionError {
    /// `accept()` called on a session that was already rejected.
    #[display(fmt = "invalid operation: session is rejected")]
    AlreadyRejected,

    /// `reject()` called on a session that was already accepted.
    #[display(fmt = "invalid operation: session is accepted")]
    AlreadyAccepted,

    /// An operation requiring `ACTIVE`/`ON_HOLD` was attempted outside
    /// those states.
    #[display(fmt = "invalid operation: session is not active")]
    NotActive,

    /// Outbound invite was rejected by the remote side or timed out.
    #[display(fmt = "Invite failed: {}", _0)]
    InviteFailed(SipError),

    /// A `BYE` carried `X-Asterisk-Hangupcausecode: 58`.
    #[display(fmt = "Account is misconfigured with the registrar")]
    MisconfiguredAccount,

    /// A hold/unhold/device-change re-INVITE was rejected.
    #[display(fmt = "Re-INVITE failed: {}", _0)]
    ReinviteFailed(SipError),

    /// `dtmf()` tones did not match `[0-9A-D#*,]`.
    #[display(fmt = "Invalid DTMF tones: {}", _0)]
    InvalidDtmf(String),

    /// The session was torn down while an operation was still pending.
    #[display(fmt = "Session was aborted before the operation completed")]
    Aborted,

    /// The transport recovered from a transport loss, but this session's
    /// peer connection did not survive the UA Adapter rebuild.
    #[display(fmt = "Session was abandoned because transport recovery could \
                      not preserve its peer connection")]
    RecoveryAbandoned,

    /// The [`Session`]'s backing state was dropped.
    #[display(fmt = "{}", _0)]
    Gone(Detached),
}

impl From<Detached> for SessionError {
    fn from(err: Detached) -> Self {
        Self::Gone(err)
    }
}

/// Blind (by URI) or attended (by an already-established [`Session`])
/// transfer target.
pub enum TransferTarget {
    /// Blind transfer to a bare SIP URI.
    Blind(String),

    /// Attended transfer: REFER-with-Replaces naming `0`'s dialog.
    Attended(Session),
}

/// Display name and URI parsed out of a raw `P-Asserted-Identity` /
/// `Remote-Party-Id` / `From` header value.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RemoteIdentity {
    /// Quoted display name, if the header carried one.
    pub display_name: Option<String>,

    /// The header's URI portion, unparsed.
    pub uri: String,
}

impl RemoteIdentity {
    fn parse(header: &str) -> Option<Self> {
        let header = header.trim();
        if header.is_empty() {
            return None;
        }
        if let Some(start) = header.find('<') {
            let uri = header[start + 1..].split('>').next()?.to_owned();
            let name = header[..start].trim().trim_matches('"').trim();
            let display_name =
                if name.is_empty() { None } else { Some(name.to_owned()) };
            Some(Self { display_name, uri })
        } else {
            Some(Self { display_name: None, uri: header.to_owned() })
        }
    }
}

/// A value that settles at most once, broadcasting the result to every
/// caller awaiting it, including ones that start awaiting after it has
/// already settled. Used to model single-flight operations as explicit
/// state rather than by inspecting whether a future is present.
struct Settleable<T: Clone> {
    result: RefCell<Option<T>>,
    waiters: RefCell<Vec<oneshot::Sender<T>>>,
}

impl<T: Clone> Settleable<T> {
    fn new() -> Self {
        Self { result: RefCell::new(None), waiters: RefCell::new(Vec::new()) }
    }

    /// Settles this value, if not already settled. A no-op otherwise.
    fn settle(&self, value: T) {
        if self.result.borrow().is_some() {
            return;
        }
        *self.result.borrow_mut() = Some(value.clone());
        for tx in self.waiters.borrow_mut().drain(..) {
            let _ = tx.send(value.clone());
        }
    }

    async fn wait(&self) -> T {
        if let Some(value) = self.result.borrow().clone() {
            return value;
        }
        let (tx, rx) = oneshot::channel();
        self.waiters.borrow_mut().push(tx);
        rx.await.expect("Settleable never drops its senders before settling")
    }
}

struct PendingReinvite {
    target: bool,
    settled: Rc<Settleable<Result<bool, Traced<SessionError>>>>,
}

struct InnerSession {
    id: String,
    dialog: Rc<dyn SipDialog>,
    media: SessionMedia,
    stats: Rc<SessionStatsSampler>,
    state: Cell<SessionState>,
    remote_identity: RefCell<Option<Option<RemoteIdentity>>>,
    decided: Cell<Option<bool>>,
    pending_action: Cell<Option<bool>>,
    decision: Settleable<bool>,
    decision_result: Settleable<Result<(), Traced<SessionError>>>,
    hold_state: Cell<bool>,
    pending_reinvite: RefCell<Option<PendingReinvite>>,
    said_bye: Cell<bool>,
    terminated: Settleable<Result<(), Traced<SessionError>>>,
    tasks: TaskHandlesStorage,
}

impl HasTaskHandlesStorage for InnerSession {
    fn task_handles_storage(&self) -> &TaskHandlesStorage {
        &self.tasks
    }
}

impl InnerSession {
    /// Drives this session to `Terminated`, settling every pending waiter,
    /// releasing media, and disposing its background tasks. Idempotent:
    /// only the first call has any effect (via the underlying
    /// [`Settleable`]s).
    fn finish(self: &Rc<Self>, result: Result<(), Traced<SessionError>>) {
        self.terminated.settle(result.clone());
        self.decision_result.settle(Err(tracerr::new!(SessionError::Aborted)));
        if let Some(pending) = self.pending_reinvite.borrow_mut().take() {
            pending.settled.settle(Err(tracerr::new!(SessionError::Aborted)));
        }
        self.state.set(SessionState::Terminated);
        self.media.release();
        self.dispose_tasks();
    }

    fn handle_dialog_event(self: &Rc<Self>, event: DialogEvent) {
        match event {
            DialogEvent::Accepted => {
                self.decided.set(Some(true));
                if matches!(
                    self.state.get(),
                    SessionState::Initial | SessionState::Ringing
                ) {
                    self.state.set(SessionState::Active);
                }
                self.decision.settle(true);
                self.decision_result.settle(Ok(()));
            }
            DialogEvent::Rejected(_) => {
                self.decided.set(Some(false));
                self.decision.settle(false);
                self.decision_result.settle(Ok(()));
            }
            DialogEvent::Failed(cause) => {
                self.decision_result
                    .settle(Err(tracerr::new!(SessionError::InviteFailed(
                        cause
                    ))));
            }
            DialogEvent::Terminated(info) => {
                let result = if info.cause.as_deref() == Some("Bye")
                    && info.hangup_cause_code == Some(58)
                {
                    Err(tracerr::new!(SessionError::MisconfiguredAccount))
                } else {
                    Ok(())
                };
                self.finish(result);
            }
            DialogEvent::Bye => {
                self.said_bye.set(true);
            }
            DialogEvent::ReinviteAccepted => {
                if let Some(pending) = self.pending_reinvite.borrow_mut().take()
                {
                    self.hold_state.set(pending.target);
                    self.state.set(if pending.target {
                        SessionState::OnHold
                    } else {
                        SessionState::Active
                    });
                    pending.settled.settle(Ok(pending.target));
                }
            }
            DialogEvent::ReinviteFailed(cause) => {
                if let Some(pending) = self.pending_reinvite.borrow_mut().take()
                {
                    pending.settled.settle(Err(tracerr::new!(
                        SessionError::ReinviteFailed(cause)
                    )));
                }
            }
            DialogEvent::ReferRequested { target } => {
                log::debug!("Remote requested transfer to {target}");
            }
            DialogEvent::SessionDescriptionHandlerCreated => {
                let this = Rc::clone(self);
                platform::spawn(async move {
                    if let Err(err) = this.media.bind(this.dialog.as_ref()).await
                    {
                        log::error!("Failed to bind local media: {err}");
                    }
                });
                let handle = self.stats.start();
                self.tasks.register_handle(handle);
            }
        }
    }

    async fn accept(self: &Rc<Self>) -> Result<(), Traced<SessionError>> {
        match self.decided.get() {
            Some(false) => {
                return Err(tracerr::new!(SessionError::AlreadyRejected));
            }
            Some(true) => return self.decision_result.wait().await,
            None => {}
        }
        if self.pending_action.get() == Some(false) {
            return Err(tracerr::new!(SessionError::AlreadyRejected));
        }
        if self.pending_action.get() != Some(true) {
            self.pending_action.set(Some(true));
            self.dialog.accept();
        }
        self.decision_result.wait().await
    }

    async fn reject(self: &Rc<Self>) -> Result<(), Traced<SessionError>> {
        match self.decided.get() {
            Some(true) => {
                return Err(tracerr::new!(SessionError::AlreadyAccepted));
            }
            Some(false) => return self.decision_result.wait().await,
            None => {}
        }
        if self.pending_action.get() == Some(true) {
            return Err(tracerr::new!(SessionError::AlreadyAccepted));
        }
        if self.pending_action.get() != Some(false) {
            self.pending_action.set(Some(false));
            self.dialog.reject();
        }
        self.decision_result.wait().await
    }

    async fn accepted(&self) -> bool {
        self.decision.wait().await
    }

    async fn terminated(&self) -> Result<(), Traced<SessionError>> {
        self.terminated.wait().await
    }

    async fn terminate(self: &Rc<Self>) -> Result<(), Traced<SessionError>> {
        if self.state.get() != SessionState::Terminated {
            self.state.set(SessionState::Terminating);
            self.dialog.bye();
        }
        self.terminated().await
    }

    fn bye(&self) {
        if matches!(
            self.state.get(),
            SessionState::Active | SessionState::OnHold
        ) {
            self.dialog.bye();
        }
    }

    async fn set_hold_state(
        self: &Rc<Self>,
        target: bool,
    ) -> Result<bool, Traced<SessionError>> {
        if !matches!(
            self.state.get(),
            SessionState::Active | SessionState::OnHold
        ) {
            return Err(tracerr::new!(SessionError::NotActive));
        }
        if self.hold_state.get() == target
            && self.pending_reinvite.borrow().is_none()
        {
            return Ok(target);
        }

        let settled = {
            let mut pending = self.pending_reinvite.borrow_mut();
            if let Some(existing) = pending.as_ref() {
                if existing.target == target {
                    Rc::clone(&existing.settled)
                } else {
                    let settled = Rc::new(Settleable::new());
                    if target {
                        self.dialog.hold();
                    } else {
                        self.dialog.unhold();
                    }
                    *pending =
                        Some(PendingReinvite { target, settled: Rc::clone(&settled) });
                    settled
                }
            } else {
                let settled = Rc::new(Settleable::new());
                if target {
                    self.dialog.hold();
                } else {
                    self.dialog.unhold();
                }
                *pending =
                    Some(PendingReinvite { target, settled: Rc::clone(&settled) });
                settled
            }
        };
        settled.wait().await
    }

    fn dtmf(&self, tones: &str) -> Result<(), Traced<SessionError>> {
        if !matches!(
            self.state.get(),
            SessionState::Active | SessionState::OnHold
        ) {
            return Err(tracerr::new!(SessionError::NotActive));
        }
        if !tones
            .chars()
            .all(|c| matches!(c, '0'..='9' | 'A'..='D' | '#' | '*' | ','))
        {
            return Err(tracerr::new!(SessionError::InvalidDtmf(
                tones.to_owned()
            )));
        }
        self.dialog.dtmf(tones);
        Ok(())
    }

    fn transfer(&self, target: TransferTarget) -> Result<(), Traced<SessionError>> {
        if !matches!(
            self.state.get(),
            SessionState::Active | SessionState::OnHold
        ) {
            return Err(tracerr::new!(SessionError::NotActive));
        }
        match target {
            TransferTarget::Blind(uri) => self.dialog.refer(&uri),
            TransferTarget::Attended(other) => {
                let replaces = other.0.dialog.call_id();
                let target_uri =
                    other.0.dialog.remote_identity_header().unwrap_or_default();
                self.dialog.refer_with_replaces(&target_uri, &replaces);
            }
        }
        Ok(())
    }

    fn remote_identity(&self) -> Option<RemoteIdentity> {
        if let Some(cached) = self.remote_identity.borrow().clone() {
            return cached;
        }
        let parsed = self
            .dialog
            .remote_identity_header()
            .and_then(|header| RemoteIdentity::parse(&header));
        *self.remote_identity.borrow_mut() = Some(parsed.clone());
        parsed
    }
}

impl Drop for InnerSession {
    fn drop(&mut self) {
        self.decision.settle(false);
        self.decision_result
            .settle(Err(tracerr::new!(SessionError::Aborted)));
        self.terminated.settle(Err(tracerr::new!(SessionError::Aborted)));
        if let Some(pending) = self.pending_reinvite.borrow_mut().take() {
            pending.settled.settle(Err(tracerr::new!(SessionError::Aborted)));
        }
    }
}

/// A live call, identified by its SIP `Call-ID`.
///
/// Owned by the [`Client`](crate::client::Client)'s Call-ID map for the
/// session's entire lifetime; [`Session::downgrade`] hands out a
/// [`Weak`]-backed [`SessionHandle`] for external callers.
#[derive(Clone)]
pub struct Session(Rc<InnerSession>);

impl Session {
    pub(crate) fn new(
        dialog: Rc<dyn SipDialog>,
        media_manager: MediaManager,
        input: AudioMediaTemplate,
        output: AudioMediaTemplate,
        initial_state: SessionState,
    ) -> Self {
        let id = dialog.call_id();
        let stats = Rc::new(SessionStatsSampler::new(Rc::clone(&dialog)));
        let media = SessionMedia::new(media_manager, input, output);

        let inner = Rc::new(InnerSession {
            id,
            dialog: Rc::clone(&dialog),
            media,
            stats,
            state: Cell::new(initial_state),
            remote_identity: RefCell::new(None),
            decided: Cell::new(None),
            pending_action: Cell::new(None),
            decision: Settleable::new(),
            decision_result: Settleable::new(),
            hold_state: Cell::new(false),
            pending_reinvite: RefCell::new(None),
            said_bye: Cell::new(false),
            terminated: Settleable::new(),
            tasks: TaskHandlesStorage::new(),
        });

        let weak = Rc::downgrade(&inner);
        inner.spawn_task(dialog.on_event(), weak, |weak, event| async move {
            if let Some(this) = weak.upgrade() {
                this.handle_dialog_event(event);
            }
        });

        Self(inner)
    }

    /// This session's SIP `Call-ID`.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.0.id
    }

    /// Current [`SessionState`].
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.0.state.get()
    }

    /// Whether the remote side sent a `BYE` before the session reached a
    /// terminal state.
    #[must_use]
    pub fn said_bye(&self) -> bool {
        self.0.said_bye.get()
    }

    /// The currently negotiated hold state.
    #[must_use]
    pub fn hold_state(&self) -> bool {
        self.0.hold_state.get()
    }

    /// Display name and URI of the remote party, derived lazily from the
    /// first present of `P-Asserted-Identity`, `Remote-Party-Id`, `From`.
    #[must_use]
    pub fn remote_identity(&self) -> Option<RemoteIdentity> {
        self.0.remote_identity()
    }

    /// Accepts an inbound session.
    ///
    /// # Errors
    ///
    /// See [`SessionError`].
    pub async fn accept(&self) -> Result<(), Traced<SessionError>> {
        self.0.accept().await
    }

    /// Rejects an inbound session.
    ///
    /// # Errors
    ///
    /// See [`SessionError`].
    pub async fn reject(&self) -> Result<(), Traced<SessionError>> {
        self.0.reject().await
    }

    /// Resolves once the session's accept/reject decision settles.
    pub async fn accepted(&self) -> bool {
        self.0.accepted().await
    }

    /// Resolves once the session reaches a terminal state.
    ///
    /// # Errors
    ///
    /// See [`SessionError`].
    pub async fn terminated(&self) -> Result<(), Traced<SessionError>> {
        self.0.terminated().await
    }

    /// Terminates the session, awaiting confirmation.
    ///
    /// # Errors
    ///
    /// See [`SessionError`].
    pub async fn terminate(&self) -> Result<(), Traced<SessionError>> {
        self.0.terminate().await
    }

    /// Sends a `BYE`, fire-and-forget.
    pub fn bye(&self) {
        self.0.bye();
    }

    /// Requests a hold re-INVITE.
    ///
    /// # Errors
    ///
    /// See [`SessionError`].
    pub async fn hold(&self) -> Result<bool, Traced<SessionError>> {
        self.0.set_hold_state(true).await
    }

    /// Requests an unhold re-INVITE.
    ///
    /// # Errors
    ///
    /// See [`SessionError`].
    pub async fn unhold(&self) -> Result<bool, Traced<SessionError>> {
        self.0.set_hold_state(false).await
    }

    /// Sends DTMF `tones`.
    ///
    /// # Errors
    ///
    /// See [`SessionError`].
    pub fn dtmf(&self, tones: &str) -> Result<(), Traced<SessionError>> {
        self.0.dtmf(tones)
    }

    /// Transfers the call, blind or attended.
    ///
    /// # Errors
    ///
    /// See [`SessionError`].
    pub fn transfer(
        &self,
        target: TransferTarget,
    ) -> Result<(), Traced<SessionError>> {
        self.0.transfer(target)
    }

    /// Tears the dialog's media handler down and rebuilds it, triggering a
    /// re-INVITE.
    pub fn rebuild_session_description_handler(&self) {
        self.0.dialog.rebuild_session_description_handler();
    }

    /// Sets the input direction's mute flag.
    pub fn set_input_muted(&self, muted: bool) {
        self.0.media.set_input_muted(muted);
    }

    /// Returns whether the input direction is muted.
    #[must_use]
    pub fn input_muted(&self) -> bool {
        self.0.media.input_muted()
    }

    /// Sets the output direction's mute flag.
    pub fn set_output_muted(&self, muted: bool) {
        self.0.media.set_output_muted(muted);
    }

    /// Returns whether the output direction is muted.
    #[must_use]
    pub fn output_muted(&self) -> bool {
        self.0.media.output_muted()
    }

    /// Switches the input capture device.
    ///
    /// # Errors
    ///
    /// Errors if acquiring the new device's track fails.
    pub async fn change_input_device(
        &self,
        device_id: String,
    ) -> Result<(), Traced<crate::media::MediaManagerError>> {
        self.0.media.change_input_device(self.0.dialog.as_ref(), device_id).await
    }

    /// Subscribes to this session's call-quality updates.
    #[must_use]
    pub fn on_stats_update(
        &self,
    ) -> futures::stream::LocalBoxStream<'static, stats::QualityScore> {
        self.0.stats.on_update()
    }

    /// Hands out a [`Weak`]-backed handle to this session.
    #[must_use]
    pub fn downgrade(&self) -> SessionHandle {
        SessionHandle(Rc::downgrade(&self.0))
    }

    /// Forcibly terminates this session because its peer connection did not
    /// survive a transport recovery pass. A no-op once the session already
    /// reached a terminal state.
    pub(crate) fn abandon(&self) {
        self.0.finish(Err(tracerr::new!(SessionError::RecoveryAbandoned)));
    }
}

/// `Weak`-based handle to a [`Session`], for callers that should not keep
/// the session alive by holding it.
#[derive(Clone)]
pub struct SessionHandle(Weak<InnerSession>);

impl SessionHandle {
    fn upgrade(&self) -> Result<Session, Traced<SessionError>> {
        self.0
            .upgrade()
            .map(Session)
            .ok_or_else(|| tracerr::new!(SessionError::Gone(Detached)))
    }

    /// See [`Session::accept`].
    ///
    /// # Errors
    ///
    /// See [`SessionError`].
    pub async fn accept(&self) -> Result<(), Traced<SessionError>> {
        self.upgrade()?.accept().await
    }

    /// See [`Session::reject`].
    ///
    /// # Errors
    ///
    /// See [`SessionError`].
    pub async fn reject(&self) -> Result<(), Traced<SessionError>> {
        self.upgrade()?.reject().await
    }

    /// See [`Session::terminate`].
    ///
    /// # Errors
    ///
    /// See [`SessionError`].
    pub async fn terminate(&self) -> Result<(), Traced<SessionError>> {
        self.upgrade()?.terminate().await
    }
}
