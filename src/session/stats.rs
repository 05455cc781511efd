//! Periodic peer-connection stats polling and quality scoring.

use std::{cell::RefCell, rc::Rc, time::Duration};

use futures::{
    channel::mpsc, future::AbortHandle, stream::LocalBoxStream, FutureExt as _,
};

use crate::platform::{self, SipDialog};

/// Interval between `getStats()` polls, armed once a dialog's
/// `SessionDescriptionHandler` exists.
const SAMPLE_INTERVAL: Duration = Duration::from_secs(5);

/// Bounded mean-opinion-score-like quality estimate, derived from inbound
/// RTP jitter and loss.
pub type QualityScore = f64;

/// Folds successive [`platform::RtcStats`] snapshots into packet-loss and
/// jitter deltas, deriving a [`QualityScore`] per advance.
#[derive(Default)]
struct StatsWindow {
    last_packets_lost: i64,
    last_packets_received: u64,
    has_prior: bool,
}

impl StatsWindow {
    fn fold(&mut self, stats: &platform::RtcStats) -> Option<QualityScore> {
        let entry = stats.0.first()?;

        let (lost_delta, received_delta) = if self.has_prior {
            (
                (entry.packets_lost - self.last_packets_lost).max(0) as f64,
                entry
                    .packets_received
                    .saturating_sub(self.last_packets_received)
                    as f64,
            )
        } else {
            (0.0, 0.0)
        };

        self.last_packets_lost = entry.packets_lost;
        self.last_packets_received = entry.packets_received;
        self.has_prior = true;

        let total = lost_delta + received_delta;
        if total <= 0.0 {
            return None;
        }
        let loss_ratio = lost_delta / total;
        Some(quality_score(loss_ratio, entry.jitter * 1000.0))
    }
}

/// Simplified E-model-style mapping from loss ratio and jitter (ms) to a
/// `[1.0, 4.5]` MOS-like score.
fn quality_score(loss_ratio: f64, jitter_ms: f64) -> QualityScore {
    let r = 93.2 - loss_ratio * 250.0 - jitter_ms * 0.1;
    let r = r.clamp(0.0, 100.0);
    let mos = 1.0 + 0.035 * r + r * (r - 60.0) * (100.0 - r) * 7e-6;
    mos.clamp(1.0, 4.5)
}

/// Polls a dialog's stats every [`SAMPLE_INTERVAL`] while armed, emitting a
/// [`QualityScore`] each time the folded window advances.
pub struct SessionStatsSampler {
    dialog: Rc<dyn SipDialog>,
    window: RefCell<StatsWindow>,
    update_txs: Rc<RefCell<Vec<mpsc::UnboundedSender<QualityScore>>>>,
}

impl SessionStatsSampler {
    /// Creates a new, unarmed [`SessionStatsSampler`] for `dialog`.
    #[must_use]
    pub fn new(dialog: Rc<dyn SipDialog>) -> Self {
        Self {
            dialog,
            window: RefCell::new(StatsWindow::default()),
            update_txs: Rc::default(),
        }
    }

    /// Subscribes to this sampler's [`QualityScore`] updates.
    #[must_use]
    pub fn on_update(&self) -> LocalBoxStream<'static, QualityScore> {
        let (tx, rx) = mpsc::unbounded();
        self.update_txs.borrow_mut().push(tx);
        Box::pin(rx)
    }

    /// Arms the sampling interval. Returns an [`AbortHandle`] the caller
    /// stores and invokes on terminal events or peer-connection rebuild.
    #[must_use]
    pub fn start(self: &Rc<Self>) -> AbortHandle {
        let this = Rc::clone(self);
        let (fut, handle) = futures::future::abortable(async move {
            loop {
                platform::delay_for(SAMPLE_INTERVAL).await;
                match this.dialog.stats().await {
                    Ok(stats) => {
                        if let Some(score) =
                            this.window.borrow_mut().fold(&stats)
                        {
                            this.update_txs
                                .borrow_mut()
                                .retain(|tx| tx.unbounded_send(score).is_ok());
                        }
                    }
                    Err(err) => {
                        log::warn!("Failed to poll call stats: {err}");
                    }
                }
            }
        });
        platform::spawn(fut.map(drop));
        handle
    }
}
