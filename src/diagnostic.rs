//! Diagnostic reporting from running simulations.
//!
//! Rules attach free-form messages to their per-cell results; the engine
//! wraps each non-empty batch in a [`Diagnostic`] and fans it out to every
//! subscribed channel. Channels are bounded, so an engine with a slow
//! consumer applies backpressure to the tick instead of growing without
//! limit. A dropped receiver just unsubscribes its channel.

use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};

use crate::bounds::VoxelIndex;

/// Capacity of each subscriber channel, in diagnostics.
pub(crate) const DIAGNOSTIC_CHANNEL_BOUND: usize = 1024;

/// Messages a rule emitted for one cell during one tick.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    /// The cell the rule was evaluated at.
    pub index: VoxelIndex,
    /// Name of the rule that produced the messages.
    pub rule: String,
    /// The messages, in emission order.
    pub messages: Vec<String>,
}

/// A single-cell evaluation trace with before and after values, produced by
/// [`crate::engine::Engine::diagnostic_evaluate`].
#[derive(Clone, Debug)]
pub struct DetailedDiagnostic<T> {
    /// The cell the rule was evaluated at.
    pub index: VoxelIndex,
    /// Name of the rule evaluated.
    pub rule: String,
    /// The cell value before the rule ran.
    pub initial_value: T,
    /// The cell value after the rule ran, when it differs from the value
    /// already in the next buffer. `None` means the rule wrote nothing.
    pub final_value: Option<T>,
    /// Messages the rule emitted for this cell.
    pub messages: Vec<String>,
}

/// Fan-out of diagnostics to subscribed channels.
///
/// Senders whose receiving half has been dropped are pruned on the next
/// publish. Full channels block, trading tick latency for a hard memory
/// bound.
#[derive(Default)]
pub(crate) struct DiagnosticSink {
    senders: Vec<SyncSender<Diagnostic>>,
}

impl DiagnosticSink {
    /// Open a new subscriber channel and return its receiving half.
    pub(crate) fn subscribe(&mut self) -> Receiver<Diagnostic> {
        let (tx, rx) = mpsc::sync_channel(DIAGNOSTIC_CHANNEL_BOUND);
        self.senders.push(tx);
        rx
    }

    /// Whether any subscriber is attached. When none is, the engine skips
    /// assembling diagnostics entirely.
    #[inline]
    pub(crate) fn is_active(&self) -> bool {
        !self.senders.is_empty()
    }

    /// Deliver one diagnostic to every live subscriber, blocking on full
    /// channels and dropping disconnected ones.
    pub(crate) fn publish(&mut self, diagnostic: Diagnostic) {
        self.senders.retain(|tx| {
            match tx.try_send(diagnostic.clone()) {
                Ok(()) => true,
                Err(TrySendError::Disconnected(_)) => false,
                Err(TrySendError::Full(d)) => tx.send(d).is_ok(),
            }
        });
    }
}
