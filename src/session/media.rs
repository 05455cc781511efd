//! Binds a capture track to a dialog's peer connection, tracking
//! per-direction mute and supporting device reconfiguration.

use std::cell::{Cell, RefCell};

use tracerr::Traced;

use crate::{
    media::{AudioMediaTemplate, MediaManager, MediaManagerError},
    platform::{self, SipDialog},
};

/// Owns the capture track bound to a single [`SipDialog`], for the
/// session's entire lifetime.
pub struct SessionMedia {
    manager: MediaManager,
    input: RefCell<AudioMediaTemplate>,
    output: RefCell<AudioMediaTemplate>,
    input_muted: Cell<bool>,
    output_muted: Cell<bool>,
    track: RefCell<Option<platform::MediaStreamTrack>>,
}

impl SessionMedia {
    /// Creates a new, unbound [`SessionMedia`] from the configured device
    /// templates.
    #[must_use]
    pub fn new(
        manager: MediaManager,
        input: AudioMediaTemplate,
        output: AudioMediaTemplate,
    ) -> Self {
        let input_muted = Cell::new(input.muted);
        let output_muted = Cell::new(output.muted);
        Self {
            manager,
            input: RefCell::new(input),
            output: RefCell::new(output),
            input_muted,
            output_muted,
            track: RefCell::new(None),
        }
    }

    /// Acquires the configured input device's track and binds it to
    /// `dialog`. Called once the dialog's `SessionDescriptionHandler`
    /// exists.
    ///
    /// # Errors
    ///
    /// Errors if capture fails.
    pub async fn bind(
        &self,
        dialog: &dyn SipDialog,
    ) -> Result<(), Traced<MediaManagerError>> {
        let template = self.input.borrow().clone();
        let track = self.manager.get_track(&template).await?;
        track.set_enabled(!self.input_muted.get());
        dialog.set_local_audio_track(&track);
        *self.track.borrow_mut() = Some(track);
        Ok(())
    }

    /// Switches the bound input device to `device_id`, re-acquiring a track
    /// and swapping it into the peer connection without a full re-INVITE.
    /// Callers fall back to
    /// [`SipDialog::rebuild_session_description_handler`] if the stack
    /// cannot perform an in-place swap.
    ///
    /// # Errors
    ///
    /// Errors if capture of the new device fails.
    pub async fn change_input_device(
        &self,
        dialog: &dyn SipDialog,
        device_id: String,
    ) -> Result<(), Traced<MediaManagerError>> {
        self.input.borrow_mut().id = Some(device_id);
        let template = self.input.borrow().clone();
        let track = self.manager.replace_track(&template).await?;
        track.set_enabled(!self.input_muted.get());
        dialog.set_local_audio_track(&track);
        *self.track.borrow_mut() = Some(track);
        Ok(())
    }

    /// Sets the input direction's mute flag, disabling (or re-enabling) the
    /// bound track in place.
    pub fn set_input_muted(&self, muted: bool) {
        self.input_muted.set(muted);
        if let Some(track) = self.track.borrow().as_ref() {
            track.set_enabled(!muted);
        }
    }

    /// Returns whether the input direction is currently muted.
    #[must_use]
    pub fn input_muted(&self) -> bool {
        self.input_muted.get()
    }

    /// Sets the output direction's mute flag.
    ///
    /// Playback is rendered by the host page from the remote track the SIP
    /// stack exposes; this flag is advisory state for the host to honor.
    pub fn set_output_muted(&self, muted: bool) {
        self.output_muted.set(muted);
    }

    /// Returns whether the output direction is currently muted.
    #[must_use]
    pub fn output_muted(&self) -> bool {
        self.output_muted.get()
    }

    /// Identifier of the currently selected output device template.
    #[must_use]
    pub fn output_device_id(&self) -> Option<String> {
        self.output.borrow().id.clone()
    }

    /// Stops the bound track, releasing the capture device. Called on every
    /// session termination exit path.
    pub fn release(&self) {
        if let Some(track) = self.track.borrow_mut().take() {
            track.stop();
        }
    }
}
