//! Client library for SIP/WebRTC softphones.
//!
//! Registers a SIP identity over secure WebSocket and manages the calls
//! placed and received under it. Does not parse SIP wire bytes or negotiate
//! SDP itself — both are delegated to an external SIP stack consumed
//! through the narrow [`platform::sip`] capability façade.

#![allow(clippy::module_name_repetitions)]
#![deny(broken_intra_doc_links)]
#![cfg_attr(not(feature = "mockable"), warn(missing_docs))]
#![cfg_attr(feature = "mockable", allow(missing_docs))]

#[macro_use]
pub mod utils;

pub mod client;
pub mod config;
pub mod media;
pub mod platform;
pub mod rpc;
pub mod session;

// When the `console_error_panic_hook` feature is enabled, we can call the
// `set_panic_hook` function at least once during initialization, and then
// we will get better error messages if our code ever panics.
//
// For more details see:
// https://github.com/rustwasm/console_error_panic_hook#readme
#[cfg(feature = "console_error_panic_hook")]
pub use console_error_panic_hook::set_once as set_panic_hook;

#[doc(inline)]
pub use self::{
    client::{Client, ClientError},
    config::{AccountConfig, ConfigError, IceServer, RawConfig, TransportConfig},
    media::{AudioMediaTemplate, InputDeviceInfo, MediaManagerError},
    rpc::ClientStatus,
    session::{Session, SessionError, SessionHandle, SessionState, TransferTarget},
};

// When the `wee_alloc` feature is enabled, use `wee_alloc` as the global
// allocator.
#[cfg(feature = "wee_alloc")]
#[global_allocator]
static ALLOC: wee_alloc::WeeAlloc = wee_alloc::WeeAlloc::INIT;
