//! Connection lifecycle and recovery engine.

mod backoff_delayer;
mod session;

#[doc(inline)]
pub use self::{
    backoff_delayer::BackoffDelayer,
    session::{ClientStatus, Transport, TransportError, UaFactory},
};
