//! [MediaDevices][1] functionality.
//!
//! [1]: https://w3.org/TR/mediacapture-streams#mediadevices

use std::convert::TryFrom as _;

use tracerr::Traced;
use wasm_bindgen_futures::JsFuture;

use crate::platform::{self, Error, InputDeviceInfo, MediaStreamTrack};

use super::window;

/// Collects information about the User Agent's available audio input
/// devices.
///
/// Adapter for a [MediaDevices.enumerateDevices()][1] function.
///
/// # Errors
///
/// With [`Error`] if [MediaDevices.enumerateDevices()][1] returns error or
/// cannot get [MediaDevices][2].
///
/// [1]: https://tinyurl.com/w3-streams#dom-mediadevices-enumeratedevices
/// [2]: https://w3.org/TR/mediacapture-streams#mediadevices
pub async fn enumerate_devices() -> Result<Vec<InputDeviceInfo>, Traced<Error>>
{
    let devices = window()
        .navigator()
        .media_devices()
        .map_err(platform::error::from)
        .map_err(tracerr::wrap!())?;
    let devices = JsFuture::from(
        devices
            .enumerate_devices()
            .map_err(platform::error::from)
            .map_err(tracerr::wrap!())?,
    )
    .await
    .map_err(platform::error::from)
    .map_err(tracerr::wrap!())?;

    Ok(js_sys::Array::from(&devices)
        .values()
        .into_iter()
        .filter_map(|info| {
            let info = web_sys::MediaDeviceInfo::from(info.unwrap());
            InputDeviceInfo::try_from(info).ok()
        })
        .collect())
}

/// Prompts the user for permission to use an audio input, producing the
/// [`MediaStreamTrack`]s that matched the requested `caps`.
///
/// Adapter for a [MediaDevices.getUserMedia()][1] function.
///
/// # Errors
///
/// With [`Error`] if [MediaDevices.getUserMedia()][1] returns error or cannot
/// get [MediaDevices][2].
///
/// [1]: https://w3.org/TR/mediacapture-streams#dom-mediadevices-getusermedia
/// [2]: https://w3.org/TR/mediacapture-streams#mediadevices
pub async fn get_user_media(
    caps: platform::MediaStreamConstraints,
) -> Result<Vec<MediaStreamTrack>, Traced<Error>> {
    let media_devices = window()
        .navigator()
        .media_devices()
        .map_err(platform::error::from)
        .map_err(tracerr::wrap!())?;

    let stream = JsFuture::from(
        media_devices
            .get_user_media_with_constraints(&caps)
            .map_err(platform::error::from)
            .map_err(tracerr::wrap!())?,
    )
    .await
    .map(web_sys::MediaStream::from)
    .map_err(platform::error::from)
    .map_err(tracerr::wrap!())?;

    Ok(js_sys::try_iter(&stream.get_tracks())
        .unwrap()
        .unwrap()
        .map(|tr| MediaStreamTrack::from(tr.unwrap()))
        .collect())
}
