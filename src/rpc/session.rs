//! The connection lifecycle and recovery engine: owns the single
//! [`SipUserAgent`] instance, drives the transport/registration state
//! machine, and recovers from transport loss with a jittered backoff.

use std::{cell::RefCell, rc::Rc, time::Duration};

use derive_more::Display;
use futures::{
    channel::mpsc,
    future::{self, Either},
    stream::LocalBoxStream,
    StreamExt as _,
};
use medea_reactive::ObservableCell;
use sipphone_macro::Caused;
use tracerr::Traced;

use crate::{
    config::TransportConfig,
    platform::{
        self,
        env::EnvironmentProbe,
        sip::{SipDialog, SipError, SipUserAgent, UaEvent},
    },
    rpc::backoff_delayer::BackoffDelayer,
    utils::{upgrade_or_break, Caused, Detached},
};

/// Base backoff interval between recovery attempts.
const BACKOFF_BASE: Duration = Duration::from_millis(500);

/// Upper bound on the backoff interval between recovery attempts.
const BACKOFF_CAP: Duration = Duration::from_secs(30);

/// Backoff interval multiplier between recovery attempts.
const BACKOFF_MULTIPLIER: f64 = 2.0;

/// Publicly observable connection status, as specified for [`Transport`].
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum ClientStatus {
    /// No UA instance exists; not trying to connect.
    #[display(fmt = "disconnected")]
    Disconnected,

    /// `start()`/`register()` were issued; awaiting the first `registered`.
    #[display(fmt = "connecting")]
    Connecting,

    /// Registered with the registrar.
    #[display(fmt = "connected")]
    Connected,

    /// Transport was lost while connected; retrying with backoff.
    #[display(fmt = "recovering")]
    Recovering,

    /// Graceful teardown (`unregister()` then `stop()`) is in progress.
    #[display(fmt = "disconnecting")]
    Disconnecting,
}

/// Errors produced by [`Transport::connect`].
#[derive(Clone, Debug, Display, Caused)]
#[cause(error = "platform::Error")]
pub enum TransportError {
    /// Neither `transportCreated` nor `registered` arrived within
    /// `wsTimeout`.
    #[display(fmt = "Could not connect to the websocket in time.")]
    WsTimeout,

    /// The registrar rejected the configured credentials.
    #[display(fmt = "Registrar rejected credentials: {}", _0)]
    AuthRejected(SipError),

    /// `connect()` was called while [`ClientStatus::Recovering`].
    #[display(fmt = "Can not connect while trying to recover.")]
    Recovering,

    /// `disconnect()` (or a UA drop) interrupted a pending `connect()`.
    #[display(fmt = "Connection attempt was cancelled")]
    ConnectCancelled,

    /// The [`Transport`] was dropped while a caller awaited it.
    #[display(fmt = "{}", _0)]
    Gone(Detached),
}

impl From<Detached> for TransportError {
    fn from(err: Detached) -> Self {
        Self::Gone(err)
    }
}

/// Constructs a fresh [`SipUserAgent`] bound to the given [`TransportConfig`].
///
/// Injected so [`Transport`] stays agnostic of how the concrete SIP stack
/// object is obtained (a `JsValue` handed in from the host page, or a mock).
pub type UaFactory = Rc<dyn Fn(&TransportConfig) -> Rc<dyn SipUserAgent>>;

/// Outcome of a single registration attempt (either the initial `connect()`
/// or one iteration of the recovery loop).
enum AttemptOutcome {
    /// A fresh `registered` arrived.
    Registered,
    /// A terminal failure was reported; do not retry.
    GaveUp(Traced<TransportError>),
    /// Neither `registered` nor a failure arrived before `wsTimeout`.
    TimedOut,
}

/// Owns the client status, the single UA Adapter, and recovery policy.
pub struct Transport {
    config: TransportConfig,
    ua_factory: UaFactory,
    env: Rc<dyn EnvironmentProbe>,
    status: ObservableCell<ClientStatus>,
    ua: RefCell<Option<Rc<dyn SipUserAgent>>>,
    last_failure: RefCell<Option<SipError>>,
    cancelled: RefCell<bool>,
    ua_event_txs: Rc<RefCell<Vec<mpsc::UnboundedSender<UaEvent>>>>,
}

impl Transport {
    /// Creates a new, `DISCONNECTED` [`Transport`].
    #[must_use]
    pub fn new(
        config: TransportConfig,
        ua_factory: UaFactory,
        env: Rc<dyn EnvironmentProbe>,
    ) -> Rc<Self> {
        let this = Rc::new(Self {
            config,
            ua_factory,
            env,
            status: ObservableCell::new(ClientStatus::Disconnected),
            ua: RefCell::new(None),
            last_failure: RefCell::new(None),
            cancelled: RefCell::new(false),
            ua_event_txs: Rc::default(),
        });

        Rc::clone(&this).spawn_environment_watcher();

        this
    }

    /// Returns the currently observed [`ClientStatus`].
    #[must_use]
    pub fn status(&self) -> ClientStatus {
        self.status.get()
    }

    /// Subscribes to every [`ClientStatus`] transition, in order. Duplicate
    /// identical statuses are coalesced.
    #[must_use]
    pub fn on_status_update(&self) -> LocalBoxStream<'static, ClientStatus> {
        self.status.subscribe()
    }

    /// Fans out every event of the currently-owned UA instance.
    #[must_use]
    pub fn on_ua_event(&self) -> LocalBoxStream<'static, UaEvent> {
        let (tx, rx) = mpsc::unbounded();
        self.ua_event_txs.borrow_mut().push(tx);
        Box::pin(rx)
    }

    /// Returns the dialog for `call_id`, if the current UA instance knows
    /// one.
    #[must_use]
    pub fn dialog(&self, call_id: &str) -> Option<Rc<dyn SipDialog>> {
        self.ua.borrow().as_ref()?.dialog(call_id)
    }

    /// Issues an outbound `INVITE`.
    ///
    /// # Panics
    ///
    /// If called while no UA instance is owned (callers must gate on
    /// [`ClientStatus::Connected`]).
    #[must_use]
    pub fn invite(&self, uri: &str) -> Rc<dyn SipDialog> {
        self.ua
            .borrow()
            .as_ref()
            .expect("invite() requires ClientStatus::Connected")
            .invite(uri)
    }

    /// Connects (or re-attaches to an in-flight connect), following the
    /// `DISCONNECTED → CONNECTING → CONNECTED` transitions.
    ///
    /// Idempotent and single-flight: resolves immediately if already
    /// `CONNECTED`, awaits the in-flight attempt if already `CONNECTING`,
    /// awaits teardown then reconnects if `DISCONNECTING`, and rejects
    /// outright if `RECOVERING`.
    ///
    /// # Errors
    ///
    /// See [`TransportError`].
    pub async fn connect(
        self: Rc<Self>,
    ) -> Result<(), Traced<TransportError>> {
        match self.status.get() {
            ClientStatus::Connected => return Ok(()),
            ClientStatus::Recovering => {
                return Err(tracerr::new!(TransportError::Recovering));
            }
            ClientStatus::Disconnecting => {
                self.await_status(ClientStatus::Disconnected).await;
            }
            ClientStatus::Connecting | ClientStatus::Disconnected => {}
        }

        if self.status.get() == ClientStatus::Connecting {
            return self.await_connect_result().await;
        }

        self.status.set(ClientStatus::Connecting);
        match self.attempt_once().await {
            AttemptOutcome::Registered => Ok(()),
            AttemptOutcome::GaveUp(err) => Err(err),
            AttemptOutcome::TimedOut => {
                self.status.set(ClientStatus::Disconnected);
                Err(tracerr::new!(TransportError::WsTimeout))
            }
        }
    }

    /// Waits for the in-flight attempt (whichever one is live) to settle.
    async fn await_connect_result(
        self: &Rc<Self>,
    ) -> Result<(), Traced<TransportError>> {
        let mut updates = self.status.subscribe();
        while let Some(status) = updates.next().await {
            match status {
                ClientStatus::Connected => return Ok(()),
                ClientStatus::Disconnected => {
                    return Err(self.terminal_error());
                }
                _ => {}
            }
        }
        Err(tracerr::new!(TransportError::ConnectCancelled))
    }

    /// Resolves once `status` reaches `target` (or is already there).
    async fn await_status(&self, target: ClientStatus) {
        if self.status.get() == target {
            return;
        }
        let mut updates = self.status.subscribe();
        while let Some(status) = updates.next().await {
            if status == target {
                return;
            }
        }
    }

    /// Builds the error to report for a status transition into
    /// `DISCONNECTED` that was not a `wsTimeout`: either a `disconnect()`
    /// cancelling this very attempt, or a `registrationFailed` event.
    fn terminal_error(&self) -> Traced<TransportError> {
        if self.cancelled.replace(false) {
            return tracerr::new!(TransportError::ConnectCancelled);
        }
        self.last_failure.borrow().clone().map_or_else(
            || tracerr::new!(TransportError::WsTimeout),
            |cause| tracerr::new!(TransportError::AuthRejected(cause)),
        )
    }

    /// Runs a single registration attempt: builds a fresh UA, starts it, and
    /// races the registration barrier against `wsTimeout`. Does not itself
    /// decide the next [`ClientStatus`] on timeout; callers do that based on
    /// whether this was the initial connect or a recovery attempt.
    async fn attempt_once(self: &Rc<Self>) -> AttemptOutcome {
        *self.last_failure.borrow_mut() = None;
        *self.cancelled.borrow_mut() = false;
        self.start_ua();

        let result = future::select(
            Box::pin(self.await_connect_result()),
            Box::pin(platform::delay_for(self.config.ws_timeout())),
        )
        .await;

        match result {
            Either::Left((Ok(()), _)) => AttemptOutcome::Registered,
            Either::Left((Err(err), _)) => AttemptOutcome::GaveUp(err),
            Either::Right(_) => {
                self.force_stop_ua();
                AttemptOutcome::TimedOut
            }
        }
    }

    /// Builds a fresh UA instance, binds its events, and issues
    /// `start()`/`register()`. Does not mutate [`Transport::status`].
    fn start_ua(self: &Rc<Self>) {
        self.force_stop_ua();

        let ua = (self.ua_factory)(&self.config);
        self.bind_ua_events(&ua);
        *self.ua.borrow_mut() = Some(Rc::clone(&ua));

        if let Err(err) = ua.start() {
            log::error!("Failed to start SIP user agent: {err}");
            self.force_stop_ua();
        } else {
            ua.register();
        }
    }

    /// Subscribes to `ua`'s events and reacts to the ones C4 cares about
    /// (registration barrier, transport loss); everything else is fanned
    /// out to [`Transport::on_ua_event`] subscribers unmodified.
    fn bind_ua_events(self: &Rc<Self>, ua: &Rc<dyn SipUserAgent>) {
        let mut events = ua.on_event();
        let weak_this = Rc::downgrade(self);
        let txs = Rc::clone(&self.ua_event_txs);
        platform::spawn(async move {
            while let Some(event) = events.next().await {
                let this = upgrade_or_break!(weak_this);
                txs.borrow_mut()
                    .retain(|tx| tx.unbounded_send(event.clone()).is_ok());
                this.handle_ua_event(event);
            }
        });
    }

    /// Reacts to a single [`UaEvent`] per the registration barrier and
    /// recovery policy.
    fn handle_ua_event(self: &Rc<Self>, event: UaEvent) {
        match event {
            UaEvent::Registered => {
                if matches!(
                    self.status.get(),
                    ClientStatus::Connecting | ClientStatus::Recovering
                ) {
                    self.status.set(ClientStatus::Connected);
                }
            }
            UaEvent::RegistrationFailed(cause) => {
                if matches!(
                    self.status.get(),
                    ClientStatus::Connecting | ClientStatus::Recovering
                ) {
                    log::warn!("Registration failed: {cause}");
                    *self.last_failure.borrow_mut() = Some(cause);
                    self.status.set(ClientStatus::Disconnected);
                }
            }
            UaEvent::Disconnected(_) => {
                if self.status.get() == ClientStatus::Connected {
                    log::warn!("Transport lost, entering recovery");
                    self.status.set(ClientStatus::Recovering);
                    Rc::clone(self).spawn_recovery_loop();
                }
            }
            UaEvent::Unregistered
            | UaEvent::TransportCreated
            | UaEvent::Invite { .. } => {}
        }
    }

    /// Bounded retry loop gated on online + page-visible, with a jittered
    /// exponential backoff (`base=500ms`, `cap=30s`). Runs each attempt
    /// through the same `wsTimeout`-bounded registration barrier used by
    /// [`Transport::connect`]; a timed-out attempt retries, a terminal
    /// `registrationFailed` gives up.
    fn spawn_recovery_loop(self: Rc<Self>) {
        platform::spawn(async move {
            let delayer = BackoffDelayer::new(
                BACKOFF_BASE,
                BACKOFF_MULTIPLIER,
                BACKOFF_CAP,
                None,
            );
            let this = self;
            let _ = delayer
                .retry(move || {
                    let this = Rc::clone(&this);
                    async move {
                        if this.status.get() != ClientStatus::Recovering {
                            return Err(backoff::Error::Permanent(()));
                        }
                        if !this.env.is_online() || !this.env.is_page_visible()
                        {
                            this.await_recoverable_environment().await;
                            if this.status.get() != ClientStatus::Recovering {
                                return Err(backoff::Error::Permanent(()));
                            }
                        }
                        match this.attempt_once().await {
                            AttemptOutcome::Registered => Ok(()),
                            AttemptOutcome::GaveUp(_) => {
                                Err(backoff::Error::Permanent(()))
                            }
                            AttemptOutcome::TimedOut => {
                                Err(backoff::Error::Transient(()))
                            }
                        }
                    }
                })
                .await;
        });
    }

    /// Suspends recovery until the environment looks recoverable again
    /// (`navigator.onLine` and page visible).
    async fn await_recoverable_environment(&self) {
        let mut online = self.env.on_online_change();
        let mut visible = self.env.on_visibility_change();
        while !(self.env.is_online() && self.env.is_page_visible()) {
            future::select(online.next(), visible.next()).await;
        }
    }

    /// Forces teardown of the current UA instance without waiting for a
    /// confirming `unregistered`.
    fn force_stop_ua(&self) {
        if let Some(ua) = self.ua.borrow_mut().take() {
            ua.stop();
        }
    }

    /// Gracefully disconnects: `unregister()`, wait up to
    /// `registrationExpires` for a confirming event, then `stop()`.
    ///
    /// If a `connect()` is in flight (`CONNECTING`), it is cancelled: it
    /// rejects with [`TransportError::ConnectCancelled`] once this teardown
    /// reaches `DISCONNECTED`.
    pub async fn disconnect(self: Rc<Self>) {
        if matches!(
            self.status.get(),
            ClientStatus::Disconnected | ClientStatus::Disconnecting
        ) {
            return;
        }

        if self.status.get() == ClientStatus::Connecting {
            *self.cancelled.borrow_mut() = true;
        }
        self.status.set(ClientStatus::Disconnecting);
        let ua = self.ua.borrow().clone();
        if let Some(ua) = ua {
            ua.unregister();
            let deadline = Duration::from_secs(u64::from(
                self.config.registration_expires(),
            ));
            let mut events = ua.on_event();
            let wait = async {
                while let Some(event) = events.next().await {
                    if matches!(
                        event,
                        UaEvent::Unregistered | UaEvent::Disconnected(_)
                    ) {
                        return;
                    }
                }
            };
            future::select(
                Box::pin(wait),
                Box::pin(platform::delay_for(deadline)),
            )
            .await;
            ua.stop();
        }
        *self.ua.borrow_mut() = None;
        self.status.set(ClientStatus::Disconnected);
    }

    /// Arms the `online`/`offline` signal that immediately starts recovery
    /// independent of its own backoff timer.
    fn spawn_environment_watcher(self: Rc<Self>) {
        let mut online = self.env.on_online_change();
        let weak_this = Rc::downgrade(&self);
        platform::spawn(async move {
            while let Some(is_online) = online.next().await {
                let this = upgrade_or_break!(weak_this);
                if !is_online && this.status.get() == ClientStatus::Connected
                {
                    log::warn!("Went offline while connected, recovering");
                    this.status.set(ClientStatus::Recovering);
                    Rc::clone(&this).spawn_recovery_loop();
                }
            }
        });
    }
}
