//! Top-level library entry point: connect/disconnect, issue and receive
//! calls, enforce call-gating rules.

use std::{cell::RefCell, collections::HashMap, rc::Rc};

use derive_more::Display;
use futures::{channel::mpsc, stream::LocalBoxStream, StreamExt as _};
use sipphone_macro::Caused;
use tracerr::Traced;

use crate::{
    config::TransportConfig,
    media::{AudioMediaTemplate, InputDeviceInfo, MediaManager, MediaManagerError},
    platform::{
        self,
        env::{EnvironmentProbe, RequiredFeature},
        sip::UaEvent,
    },
    rpc::{ClientStatus, Transport, TransportError, UaFactory},
    session::{Session, SessionState},
    utils::{upgrade_or_break, Caused},
};

/// Errors produced by [`Client`] operations.
#[derive(Clone, Debug, Display, Caused)]
#[cause(error = "platform::Error")]
pub enum ClientError {
    /// A runtime capability the library depends on is absent.
    #[display(fmt = "Required feature is not supported: {:?}", _0)]
    FeatureUnsupported(RequiredFeature),

    /// The underlying transport failed to connect or disconnected.
    #[display(fmt = "{}", _0)]
    Connect(#[cause] TransportError),

    /// `invite()` was called while not `CONNECTED`.
    #[display(fmt = "Client is not connected")]
    NotConnected,
}

/// Registers a SIP identity and manages the calls made and received under
/// it.
///
/// Owns the single [`Transport`] (C4), the shared [`MediaManager`], and the
/// Call-ID → [`Session`] map for every live call.
pub struct Client {
    transport: Rc<Transport>,
    media_manager: MediaManager,
    media_input: AudioMediaTemplate,
    media_output: AudioMediaTemplate,
    env: Rc<dyn EnvironmentProbe>,
    sessions: RefCell<HashMap<String, Session>>,
    session_added_txs: Rc<RefCell<Vec<mpsc::UnboundedSender<Session>>>>,
}

impl Client {
    /// Builds a new, disconnected [`Client`] from `config`, using
    /// `ua_factory` to construct the underlying `SipUserAgent` on each
    /// (re)connect attempt.
    #[must_use]
    pub fn new(
        config: TransportConfig,
        ua_factory: UaFactory,
        env: Rc<dyn EnvironmentProbe>,
    ) -> Rc<Self> {
        let media_input = config.media_input().clone();
        let media_output = config.media_output().clone();
        let transport = Transport::new(config, ua_factory, Rc::clone(&env));

        let this = Rc::new(Self {
            transport,
            media_manager: MediaManager::default(),
            media_input,
            media_output,
            env,
            sessions: RefCell::new(HashMap::new()),
            session_added_txs: Rc::default(),
        });

        Self::spawn_invite_watcher(&this);
        Self::spawn_recovery_watcher(&this);

        this
    }

    /// Attempts to connect and register. See [`Transport::connect`].
    ///
    /// # Errors
    ///
    /// Errors if a required platform feature is missing, or per
    /// [`TransportError`].
    pub async fn connect(&self) -> Result<(), Traced<ClientError>> {
        self.env
            .check_required_features()
            .map_err(|feature| tracerr::new!(ClientError::FeatureUnsupported(feature)))?;
        Rc::clone(&self.transport)
            .connect()
            .await
            .map_err(|err| err.map(ClientError::Connect))
    }

    /// Gracefully unregisters and tears down the transport.
    pub async fn disconnect(&self) {
        Rc::clone(&self.transport).disconnect().await;
    }

    /// Current [`ClientStatus`].
    #[must_use]
    pub fn status(&self) -> ClientStatus {
        self.transport.status()
    }

    /// Subscribes to [`ClientStatus`] transitions.
    #[must_use]
    pub fn on_status_update(&self) -> LocalBoxStream<'static, ClientStatus> {
        self.transport.on_status_update()
    }

    /// Issues an outbound `INVITE` to `uri`.
    ///
    /// # Errors
    ///
    /// Errors with [`ClientError::NotConnected`] unless `status() ==
    /// CONNECTED`.
    pub fn invite(&self, uri: &str) -> Result<Session, Traced<ClientError>> {
        if self.transport.status() != ClientStatus::Connected {
            return Err(tracerr::new!(ClientError::NotConnected));
        }
        let dialog = self.transport.invite(uri);
        let session = Session::new(
            dialog,
            self.media_manager.clone(),
            self.media_input.clone(),
            self.media_output.clone(),
            SessionState::Initial,
        );
        self.track_session(session.clone());
        Ok(session)
    }

    /// Looks up a tracked session by its SIP `Call-ID`.
    #[must_use]
    pub fn session(&self, call_id: &str) -> Option<Session> {
        self.sessions.borrow().get(call_id).cloned()
    }

    /// Subscribes to sessions as they're added, whether created by
    /// [`Client::invite`] or by an inbound `INVITE`.
    #[must_use]
    pub fn on_session_added(&self) -> LocalBoxStream<'static, Session> {
        let (tx, rx) = mpsc::unbounded();
        self.session_added_txs.borrow_mut().push(tx);
        Box::pin(rx)
    }

    /// Lists the input audio devices available on this platform.
    ///
    /// # Errors
    ///
    /// Errors if the platform fails to enumerate its devices.
    pub async fn enumerate_devices(
        &self,
    ) -> Result<Vec<InputDeviceInfo>, Traced<MediaManagerError>> {
        self.media_manager.enumerate_devices().await
    }

    fn track_session(&self, session: Session) {
        self.sessions.borrow_mut().insert(session.id().to_owned(), session.clone());
        self.session_added_txs
            .borrow_mut()
            .retain(|tx| tx.unbounded_send(session.clone()).is_ok());
    }

    fn handle_inbound_invite(self: &Rc<Self>, call_id: &str) {
        let Some(dialog) = self.transport.dialog(call_id) else {
            log::warn!("Invite event for unknown Call-ID: {call_id}");
            return;
        };
        let session = Session::new(
            dialog,
            self.media_manager.clone(),
            self.media_input.clone(),
            self.media_output.clone(),
            SessionState::Ringing,
        );
        self.track_session(session);
    }

    /// Abandons every still-live session once recovery settles (succeeds or
    /// gives up): the sessions' dialogs belonged to the UA instance that
    /// was just torn down and will never emit another event.
    fn abandon_stale_sessions(&self) {
        for (_, session) in self.sessions.borrow_mut().drain() {
            session.abandon();
        }
    }

    fn spawn_invite_watcher(this: &Rc<Self>) {
        let weak = Rc::downgrade(this);
        let mut events = this.transport.on_ua_event();
        platform::spawn(async move {
            while let Some(event) = events.next().await {
                let this = upgrade_or_break!(weak);
                if let UaEvent::Invite { call_id, .. } = event {
                    this.handle_inbound_invite(&call_id);
                }
            }
        });
    }

    fn spawn_recovery_watcher(this: &Rc<Self>) {
        let weak = Rc::downgrade(this);
        let mut statuses = this.transport.on_status_update();
        platform::spawn(async move {
            let mut was_recovering = false;
            while let Some(status) = statuses.next().await {
                let this = upgrade_or_break!(weak);
                if was_recovering && status != ClientStatus::Recovering {
                    this.abandon_stale_sessions();
                }
                was_recovering = status == ClientStatus::Recovering;
            }
        });
    }
}
