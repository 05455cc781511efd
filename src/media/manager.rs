//! Acquisition and caching of local audio media.

use std::{cell::RefCell, rc::Rc};

use derive_more::{Display, From};
use tracerr::Traced;

use sipphone_macro::Caused;

use crate::{
    media::{AudioMediaTemplate, InputDeviceInfo, MediaStreamConstraints},
    platform,
    utils::Caused,
};

/// Errors occurring while acquiring or enumerating audio devices.
#[derive(Clone, Debug, Display, From, Caused)]
#[cause(error = "platform::Error")]
pub enum MediaManagerError {
    /// Failed to acquire a local audio track via `getUserMedia()`.
    #[display(fmt = "Failed to get local media: {}", _0)]
    GetUserMediaFailed(platform::Error),

    /// Failed to enumerate the platform's audio input devices.
    #[display(fmt = "Failed to enumerate media devices: {}", _0)]
    EnumerateDevicesFailed(platform::Error),

    /// `getUserMedia()` resolved without producing any track.
    #[display(fmt = "No local audio track was produced")]
    NoLocalTrack,
}

/// Acquires and caches the local audio track used by a call, so that
/// repeated `hold()`/`unhold()` cycles don't re-prompt the user for capture
/// permission.
#[derive(Clone, Default)]
pub struct MediaManager(Rc<RefCell<Inner>>);

#[derive(Default)]
struct Inner {
    local_track: Option<platform::MediaStreamTrack>,
}

impl MediaManager {
    /// Lists the input audio devices available on this platform.
    ///
    /// # Errors
    ///
    /// Errors if the platform fails to enumerate its devices.
    pub async fn enumerate_devices(
        &self,
    ) -> Result<Vec<InputDeviceInfo>, Traced<MediaManagerError>> {
        platform::enumerate_devices()
            .await
            .map_err(|err| err.map(MediaManagerError::EnumerateDevicesFailed))
    }

    /// Returns the cached local audio track, acquiring one via
    /// `getUserMedia()` from `template` if none is cached yet.
    ///
    /// # Errors
    ///
    /// Errors if capture permission is denied or no matching device exists.
    pub async fn get_track(
        &self,
        template: &AudioMediaTemplate,
    ) -> Result<platform::MediaStreamTrack, Traced<MediaManagerError>> {
        if let Some(track) = self.0.borrow().local_track.clone() {
            return Ok(track);
        }

        let constraints = MediaStreamConstraints::from_template(template);
        let track = platform::get_user_media(constraints.into())
            .await
            .map_err(|err| err.map(MediaManagerError::GetUserMediaFailed))?
            .into_iter()
            .next()
            .ok_or_else(|| tracerr::new!(MediaManagerError::NoLocalTrack))?;

        self.0.borrow_mut().local_track = Some(track.clone());
        Ok(track)
    }

    /// Stops and forgets the cached local audio track, releasing the
    /// capture device. Called once a call has fully terminated.
    pub fn release(&self) {
        if let Some(track) = self.0.borrow_mut().local_track.take() {
            track.stop();
        }
    }

    /// Forcibly re-acquires a local audio track from `template`, bypassing
    /// the cache, stopping whatever track was cached before. Used when the
    /// caller wants a different device, rather than the already-captured
    /// one.
    ///
    /// # Errors
    ///
    /// Errors if capture permission is denied or no matching device exists.
    pub async fn replace_track(
        &self,
        template: &AudioMediaTemplate,
    ) -> Result<platform::MediaStreamTrack, Traced<MediaManagerError>> {
        let constraints = MediaStreamConstraints::from_template(template);
        let track = platform::get_user_media(constraints.into())
            .await
            .map_err(|err| err.map(MediaManagerError::GetUserMediaFailed))?
            .into_iter()
            .next()
            .ok_or_else(|| tracerr::new!(MediaManagerError::NoLocalTrack))?;

        if let Some(old) = self.0.borrow_mut().local_track.replace(track.clone())
        {
            old.stop();
        }
        Ok(track)
    }
}
