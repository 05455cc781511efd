//! Platform-agnostic functionality of [`platform::RtcStats`].

use std::rc::Rc;

use derive_more::{Display, From};
use sipphone_macro::Caused;

use crate::{platform, utils::Caused};

/// Errors which can occur while parsing an [RTCStatsReport][1].
///
/// [1]: https://w3.org/TR/webrtc#dom-rtcstatsreport
#[derive(Clone, Debug, Display, From, Caused)]
#[cause(error = "platform::Error")]
pub enum RtcStatsError {
    /// `RTCStats.entries` are undefined.
    #[display(fmt = "RTCStats.entries are undefined")]
    UndefinedEntries,

    /// Some platform error occurred.
    #[display(fmt = "Unexpected platform error: {:?}", _0)]
    Platform(platform::Error),

    /// [`platform::RtcStats`] deserialization error.
    #[display(fmt = "Failed to deserialize into RtcStats: {}", _0)]
    ParseError(Rc<serde_json::Error>),
}
