//! Parsing of [RTCStatsReport][1] entries relevant to audio call quality.
//!
//! [1]: https://w3.org/TR/webrtc#dom-rtcstatsreport

use std::convert::TryFrom;

use js_sys::{Array as JsArray, Function as JsFunction, Iterator as JsIterator};
use serde::Deserialize;
use tracerr::Traced;
use wasm_bindgen::{prelude::*, JsCast};

use crate::platform::{self, get_property_by_name, RtcStatsError};

/// Subset of an `inbound-rtp` [RTCStatsReport][1] entry needed to estimate
/// call quality.
///
/// [1]: https://w3.org/TR/webrtc#dom-rtcstatsreport
#[derive(Clone, Debug, Default, Deserialize)]
pub struct InboundRtpStat {
    /// [`type`][1] discriminant of the entry.
    ///
    /// [1]: https://w3.org/TR/webrtc-stats/#dom-rtcstats-type
    #[serde(rename = "type")]
    pub kind: String,

    /// Packet jitter measured in seconds, as defined by [RFC 3550].
    ///
    /// [RFC 3550]: https://tools.ietf.org/html/rfc3550
    #[serde(default)]
    pub jitter: f64,

    /// Total number of RTP packets lost for this stream.
    #[serde(default, rename = "packetsLost")]
    pub packets_lost: i64,

    /// Total number of RTP packets received for this stream.
    #[serde(default, rename = "packetsReceived")]
    pub packets_received: u64,
}

/// All `inbound-rtp` entries found in a single [RTCStatsReport][1].
///
/// [1]: https://w3.org/TR/webrtc#dom-rtcstatsreport
#[derive(Clone, Debug, Default)]
pub struct RtcStats(pub Vec<InboundRtpStat>);

impl TryFrom<&JsValue> for RtcStats {
    type Error = Traced<RtcStatsError>;

    fn try_from(report: &JsValue) -> Result<Self, Self::Error> {
        use RtcStatsError::Platform;

        let entries_fn =
            get_property_by_name(&report, "entries", |func: JsValue| {
                Some(func.unchecked_into::<JsFunction>())
            })
            .ok_or_else(|| tracerr::new!(RtcStatsError::UndefinedEntries))?;

        let iterator = entries_fn
            .call0(report.as_ref())
            .map_err(|e| tracerr::new!(Platform(platform::error::from(e))))?
            .unchecked_into::<JsIterator>();

        let mut out = Vec::new();
        for entry in iterator {
            let entry = entry
                .map_err(|e| tracerr::new!(Platform(platform::error::from(e))))?
                .unchecked_into::<JsArray>();
            let stats = entry.get(1);
            if stats.is_undefined() {
                continue;
            }
            let stat: InboundRtpStat = stats
                .into_serde()
                .map_err(std::rc::Rc::new)
                .map_err(tracerr::from_and_wrap!())?;
            if stat.kind == "inbound-rtp" {
                out.push(stat);
            }
        }

        Ok(RtcStats(out))
    }
}
