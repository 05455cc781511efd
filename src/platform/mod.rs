//! Platform-specific functionality and the platform-agnostic contracts that
//! it must implement.

mod rtc_stats;
mod wasm;

pub mod env;
pub mod sip;

#[doc(inline)]
pub use self::{
    env::{EnvironmentProbe, RequiredFeature},
    rtc_stats::RtcStatsError,
    sip::{
        DialogEvent, SipDialog, SipError, SipUserAgent, SipUserAgentError,
        TerminationInfo, UaEvent,
    },
    wasm::{
        delay_for, enumerate_devices, error,
        env::WasmEnvironmentProbe,
        get_property_by_name, get_user_media, init_logger,
        media_track::{MediaStreamTrack, MediaStreamTrackState},
        rtc_stats::{InboundRtpStat, RtcStats},
        set_panic_hook,
        sip::WasmSipUserAgent,
        spawn, Error,
    },
};

#[cfg(feature = "mockable")]
pub use self::{env::MockEnvironmentProbe, sip::MockSipUserAgent};

pub use crate::media::device_info::InputDeviceInfo;
pub use web_sys::{MediaDeviceInfo, MediaDeviceKind, MediaStreamConstraints};
