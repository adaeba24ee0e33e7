//! Subscription Registry
//!
//! Tracks which consumers want which instruments, and how far each
//! instrument's subscription has progressed with the server.
//!
//! # Design
//!
//! The registry keeps two views keyed by instrument:
//! - The ordered callbacks that receive price updates
//! - The subscription status (`Pending` until the server confirms it)
//!
//! Every instrument with a status is part of the desired set, which is what
//! gets replayed to the server after each successful connection.
//!
//! Registering the same callback twice for an instrument appends a second
//! entry; independent widgets watching the same instrument each get their
//! own delivery.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use crate::domain::streaming::{InstrumentId, PriceUpdate};

// =============================================================================
// Types
// =============================================================================

/// Callback invoked with every price update of a subscribed instrument.
///
/// Returning an error is logged by the client and does not affect other
/// callbacks.
pub type PriceCallback = Arc<dyn Fn(&PriceUpdate) -> anyhow::Result<()> + Send + Sync>;

/// Progress of an instrument subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionStatus {
    /// Requested locally, not yet confirmed over the live connection.
    Pending,
    /// Acknowledged by the server.
    Confirmed,
}

impl SubscriptionStatus {
    /// Get the status name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
        }
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Callback registry plus per-instrument subscription status.
#[derive(Default)]
pub struct SubscriptionRegistry {
    callbacks: HashMap<InstrumentId, Vec<PriceCallback>>,
    statuses: BTreeMap<InstrumentId, SubscriptionStatus>,
    /// Unsubscribed locally, server acknowledgement outstanding.
    released: BTreeSet<InstrumentId>,
}

impl fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let callbacks: BTreeMap<&str, usize> = self
            .callbacks
            .iter()
            .map(|(instrument, list)| (instrument.as_str(), list.len()))
            .collect();

        f.debug_struct("SubscriptionRegistry")
            .field("callbacks", &callbacks)
            .field("statuses", &self.statuses)
            .field("released", &self.released)
            .finish()
    }
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `callback` to each instrument's sequence and mark each
    /// instrument pending.
    ///
    /// Instruments already confirmed keep their status.
    pub fn subscribe(&mut self, instruments: &[InstrumentId], callback: &PriceCallback) {
        for instrument in instruments {
            self.released.remove(instrument);
            self.callbacks
                .entry(instrument.clone())
                .or_default()
                .push(Arc::clone(callback));

            self.statuses
                .entry(instrument.clone())
                .or_insert(SubscriptionStatus::Pending);
        }
    }

    /// Remove every callback and the status of each instrument.
    ///
    /// Returns the instruments that were actually registered.
    pub fn unsubscribe(&mut self, instruments: &[InstrumentId]) -> Vec<InstrumentId> {
        let mut removed = Vec::new();

        for instrument in instruments {
            let had_callbacks = self.callbacks.remove(instrument).is_some();
            let had_status = self.statuses.remove(instrument).is_some();
            self.released.insert(instrument.clone());

            if had_callbacks || had_status {
                removed.push(instrument.clone());
            }
        }

        removed
    }

    /// Mark instruments as confirmed by the server, adding any that were
    /// not yet in the desired set.
    ///
    /// Instruments unsubscribed locally whose release the server has not
    /// acknowledged yet are skipped, so a late acknowledgement of an earlier
    /// subscribe cannot bring them back.
    pub fn confirm(&mut self, instruments: &[InstrumentId]) {
        for instrument in instruments {
            if self.released.contains(instrument) {
                continue;
            }
            self.statuses
                .insert(instrument.clone(), SubscriptionStatus::Confirmed);
        }
    }

    /// Drop server-released instruments from the desired set.
    ///
    /// An instrument that gained callbacks again since it was unsubscribed
    /// stays desired and goes back to pending.
    pub fn release(&mut self, instruments: &[InstrumentId]) {
        for instrument in instruments {
            self.released.remove(instrument);
            if self.callbacks.contains_key(instrument) {
                self.statuses
                    .insert(instrument.clone(), SubscriptionStatus::Pending);
            } else {
                self.statuses.remove(instrument);
            }
        }
    }

    /// Revert every confirmed instrument to pending after the connection
    /// that confirmed it went away.
    ///
    /// Outstanding releases are forgotten; the next connection starts from
    /// the desired set alone.
    pub fn revert_to_pending(&mut self) {
        self.released.clear();
        for status in self.statuses.values_mut() {
            *status = SubscriptionStatus::Pending;
        }
    }

    /// Drop all callbacks and statuses.
    pub fn clear(&mut self) {
        self.callbacks.clear();
        self.statuses.clear();
        self.released.clear();
    }

    /// Callbacks registered for an instrument, in registration order.
    #[must_use]
    pub fn callbacks_for(&self, instrument: &str) -> Vec<PriceCallback> {
        self.callbacks.get(instrument).cloned().unwrap_or_default()
    }

    /// Number of callbacks registered for an instrument.
    #[must_use]
    pub fn callback_count(&self, instrument: &str) -> usize {
        self.callbacks.get(instrument).map_or(0, Vec::len)
    }

    /// Status of an instrument, if it is desired.
    #[must_use]
    pub fn status(&self, instrument: &str) -> Option<SubscriptionStatus> {
        self.statuses.get(instrument).copied()
    }

    /// The desired set, sorted.
    #[must_use]
    pub fn desired(&self) -> Vec<InstrumentId> {
        self.statuses.keys().cloned().collect()
    }

    /// Desired instruments still waiting for confirmation, sorted.
    #[must_use]
    pub fn pending(&self) -> Vec<InstrumentId> {
        self.statuses
            .iter()
            .filter(|(_, status)| **status == SubscriptionStatus::Pending)
            .map(|(instrument, _)| instrument.clone())
            .collect()
    }

    /// Desired instruments with their status, sorted.
    #[must_use]
    pub fn statuses(&self) -> Vec<(InstrumentId, SubscriptionStatus)> {
        self.statuses
            .iter()
            .map(|(instrument, status)| (instrument.clone(), *status))
            .collect()
    }

    /// Number of desired instruments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.statuses.len()
    }

    /// Check if nothing is desired.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use proptest::prelude::*;

    use super::*;

    fn ids(instruments: &[&str]) -> Vec<InstrumentId> {
        instruments.iter().map(ToString::to_string).collect()
    }

    fn noop() -> PriceCallback {
        Arc::new(|_| Ok(()))
    }

    fn counting(counter: &Arc<AtomicUsize>) -> PriceCallback {
        let counter = Arc::clone(counter);
        Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    #[test]
    fn subscribe_marks_pending() {
        let mut registry = SubscriptionRegistry::new();
        registry.subscribe(&ids(&["AAPL", "MSFT"]), &noop());

        assert_eq!(registry.status("AAPL"), Some(SubscriptionStatus::Pending));
        assert_eq!(registry.pending(), ids(&["AAPL", "MSFT"]));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn duplicate_registration_appends() {
        let mut registry = SubscriptionRegistry::new();
        let callback = noop();

        registry.subscribe(&ids(&["AAPL"]), &callback);
        registry.subscribe(&ids(&["AAPL"]), &callback);

        assert_eq!(registry.callback_count("AAPL"), 2);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn callbacks_keep_registration_order() {
        let mut registry = SubscriptionRegistry::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let first_cb = counting(&first);
        let second_cb = counting(&second);

        registry.subscribe(&ids(&["AAPL"]), &first_cb);
        registry.subscribe(&ids(&["AAPL"]), &second_cb);

        let callbacks = registry.callbacks_for("AAPL");
        assert!(Arc::ptr_eq(&callbacks[0], &first_cb));
        assert!(Arc::ptr_eq(&callbacks[1], &second_cb));
    }

    #[test]
    fn subscribe_keeps_confirmed_status() {
        let mut registry = SubscriptionRegistry::new();
        registry.confirm(&ids(&["AAPL"]));
        registry.subscribe(&ids(&["AAPL"]), &noop());

        assert_eq!(registry.status("AAPL"), Some(SubscriptionStatus::Confirmed));
    }

    #[test]
    fn unsubscribe_removes_every_callback() {
        let mut registry = SubscriptionRegistry::new();
        registry.subscribe(&ids(&["AAPL", "MSFT"]), &noop());
        registry.subscribe(&ids(&["AAPL"]), &noop());

        let removed = registry.unsubscribe(&ids(&["AAPL", "TSLA"]));

        assert_eq!(removed, ids(&["AAPL"]));
        assert_eq!(registry.callback_count("AAPL"), 0);
        assert!(registry.status("AAPL").is_none());
        assert_eq!(registry.desired(), ids(&["MSFT"]));
    }

    #[test]
    fn confirm_adds_server_held_instruments() {
        let mut registry = SubscriptionRegistry::new();
        registry.confirm(&ids(&["NVDA"]));

        assert_eq!(registry.status("NVDA"), Some(SubscriptionStatus::Confirmed));
        assert_eq!(registry.callback_count("NVDA"), 0);
    }

    #[test]
    fn late_confirmation_of_unsubscribed_instrument_is_ignored() {
        let mut registry = SubscriptionRegistry::new();
        registry.subscribe(&ids(&["AAPL", "MSFT"]), &noop());
        registry.unsubscribe(&ids(&["AAPL"]));

        registry.confirm(&ids(&["AAPL", "MSFT"]));

        assert_eq!(registry.desired(), ids(&["MSFT"]));
        assert_eq!(registry.status("MSFT"), Some(SubscriptionStatus::Confirmed));

        // Once the server acknowledges the release, it may report AAPL again.
        registry.release(&ids(&["AAPL"]));
        registry.confirm(&ids(&["AAPL"]));
        assert_eq!(registry.status("AAPL"), Some(SubscriptionStatus::Confirmed));
    }

    #[test]
    fn resubscribe_cancels_outstanding_release() {
        let mut registry = SubscriptionRegistry::new();
        registry.subscribe(&ids(&["AAPL"]), &noop());
        registry.unsubscribe(&ids(&["AAPL"]));
        registry.subscribe(&ids(&["AAPL"]), &noop());

        registry.confirm(&ids(&["AAPL"]));

        assert_eq!(registry.status("AAPL"), Some(SubscriptionStatus::Confirmed));
    }

    #[test]
    fn connection_loss_forgets_outstanding_releases() {
        let mut registry = SubscriptionRegistry::new();
        registry.subscribe(&ids(&["AAPL"]), &noop());
        registry.unsubscribe(&ids(&["AAPL"]));

        registry.revert_to_pending();
        assert!(registry.is_empty());

        registry.confirm(&ids(&["AAPL"]));
        assert_eq!(registry.status("AAPL"), Some(SubscriptionStatus::Confirmed));
    }

    #[test]
    fn release_keeps_resubscribed_instruments() {
        let mut registry = SubscriptionRegistry::new();
        registry.subscribe(&ids(&["AAPL"]), &noop());
        registry.confirm(&ids(&["AAPL", "MSFT"]));

        registry.release(&ids(&["AAPL", "MSFT"]));

        assert_eq!(registry.status("AAPL"), Some(SubscriptionStatus::Pending));
        assert!(registry.status("MSFT").is_none());
    }

    #[test]
    fn revert_to_pending_downgrades_confirmed() {
        let mut registry = SubscriptionRegistry::new();
        registry.subscribe(&ids(&["AAPL", "MSFT"]), &noop());
        registry.confirm(&ids(&["AAPL"]));

        registry.revert_to_pending();

        assert_eq!(registry.pending(), ids(&["AAPL", "MSFT"]));
    }

    #[test]
    fn clear_drops_everything() {
        let mut registry = SubscriptionRegistry::new();
        registry.subscribe(&ids(&["AAPL"]), &noop());
        registry.clear();

        assert!(registry.is_empty());
        assert!(registry.callbacks_for("AAPL").is_empty());
    }

    #[test]
    fn debug_shows_counts_not_closures() {
        let mut registry = SubscriptionRegistry::new();
        registry.subscribe(&ids(&["AAPL"]), &noop());

        let debug = format!("{registry:?}");
        assert!(debug.contains("AAPL"));
        assert!(debug.contains("Pending"));
    }

    #[derive(Debug, Clone)]
    enum Op {
        Subscribe(Vec<u8>),
        Unsubscribe(Vec<u8>),
        Confirm(Vec<u8>),
        Lost,
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        let instruments = proptest::collection::vec(0u8..6, 0..4);
        prop_oneof![
            instruments.clone().prop_map(Op::Subscribe),
            instruments.clone().prop_map(Op::Unsubscribe),
            instruments.prop_map(Op::Confirm),
            Just(Op::Lost),
        ]
    }

    fn names(raw: &[u8]) -> Vec<InstrumentId> {
        raw.iter().map(|n| format!("SYM{n}")).collect()
    }

    proptest! {
        #[test]
        fn desired_set_matches_model(ops in proptest::collection::vec(op_strategy(), 0..40)) {
            let mut registry = SubscriptionRegistry::new();
            let mut desired: HashSet<InstrumentId> = HashSet::new();
            let mut confirmed: HashSet<InstrumentId> = HashSet::new();
            let mut released: HashSet<InstrumentId> = HashSet::new();

            for op in ops {
                match op {
                    Op::Subscribe(raw) => {
                        let list = names(&raw);
                        registry.subscribe(&list, &noop());
                        for instrument in &list {
                            released.remove(instrument);
                        }
                        desired.extend(list);
                    }
                    Op::Unsubscribe(raw) => {
                        let list = names(&raw);
                        registry.unsubscribe(&list);
                        for instrument in &list {
                            desired.remove(instrument);
                            confirmed.remove(instrument);
                        }
                        released.extend(list);
                    }
                    Op::Confirm(raw) => {
                        let list = names(&raw);
                        registry.confirm(&list);
                        let accepted: Vec<_> =
                            list.into_iter().filter(|i| !released.contains(i)).collect();
                        desired.extend(accepted.iter().cloned());
                        confirmed.extend(accepted);
                    }
                    Op::Lost => {
                        registry.revert_to_pending();
                        confirmed.clear();
                        released.clear();
                    }
                }
            }

            let mut expected: Vec<_> = desired.into_iter().collect();
            expected.sort();
            prop_assert_eq!(registry.desired(), expected);

            for instrument in registry.desired() {
                let status = registry.status(&instrument).unwrap();
                let is_confirmed = status == SubscriptionStatus::Confirmed;
                prop_assert_eq!(is_confirmed, confirmed.contains(&instrument));
            }
        }
    }
}
