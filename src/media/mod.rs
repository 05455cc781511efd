//! Adapters to the [Media Capture and Streams API][1], scoped to the audio
//! input/output this library needs for a voice call.
//!
//! [1]: https://w3.org/TR/mediacapture-streams

pub mod constraints;
pub mod device_info;
pub mod manager;

#[doc(inline)]
pub use self::{
    constraints::{AudioMediaTemplate, MediaStreamConstraints},
    device_info::InputDeviceInfo,
    manager::{MediaManager, MediaManagerError},
};

/// Kind of a media device/track. This library only ever captures audio, but
/// device enumeration surfaces both kinds present on the system.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MediaKind {
    /// Audio track/device.
    Audio,

    /// Video track/device.
    Video,
}
