//! Audio device templates and capture constraints.

use derive_more::{AsRef, Into};
use serde::Deserialize;
use web_sys::{ConstrainDomStringParameters, MediaTrackConstraints};

/// `{id, volume, muted, audioProcessing?}` template for an input or output
/// audio device, as configured via [`crate::config::TransportConfig`].
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AudioMediaTemplate {
    /// Identifier of the requested device (`deviceId`). `None` lets the
    /// platform pick a default device.
    #[serde(default)]
    pub id: Option<String>,

    /// Initial playback/capture volume in `[0.0, 1.0]`. Only meaningful for
    /// an output device template; ignored for input.
    #[serde(default)]
    pub volume: Option<f64>,

    /// Whether the device should start muted.
    #[serde(default)]
    pub muted: bool,

    /// Whether to request browser-side audio processing (echo cancellation,
    /// noise suppression, automatic gain control). `None` defers to the
    /// platform default.
    #[serde(default)]
    pub audio_processing: Option<bool>,
}

/// [MediaStreamConstraints][1] wrapper, built from an [`AudioMediaTemplate`].
///
/// [1]: https://w3.org/TR/mediacapture-streams/#dom-mediastreamconstraints
#[derive(AsRef, Debug, Into)]
pub struct MediaStreamConstraints(web_sys::MediaStreamConstraints);

impl MediaStreamConstraints {
    /// Builds audio-only [`MediaStreamConstraints`] from the given
    /// [`AudioMediaTemplate`].
    #[must_use]
    pub fn from_template(template: &AudioMediaTemplate) -> Self {
        let mut constraints = web_sys::MediaStreamConstraints::new();

        let mut audio = MediaTrackConstraints::new();
        if let Some(id) = &template.id {
            let mut params = ConstrainDomStringParameters::new();
            params.exact(&wasm_bindgen::JsValue::from_str(id));
            audio.device_id(&params);
        }
        if let Some(enabled) = template.audio_processing {
            audio.echo_cancellation(&wasm_bindgen::JsValue::from_bool(enabled));
            audio.noise_suppression(&wasm_bindgen::JsValue::from_bool(enabled));
            audio
                .auto_gain_control(&wasm_bindgen::JsValue::from_bool(enabled));
        }

        constraints.audio(&audio.into());
        Self(constraints)
    }
}
