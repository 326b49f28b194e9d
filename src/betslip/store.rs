//! Bet slip bound to the current identity.
//!
//! Every mutation writes the whole slip to the `SlipCache` when an
//! identity is present and the slip is non-empty; a mutation that empties
//! the slip drops the cached entry. Cache failures are logged and never
//! fail the mutation.

use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::{BetSlip, SlipCache, Toggle};
use crate::types::{BetMode, BookResult, Identity, Match, OutcomeType};

struct SlipState {
    owner: Option<String>,
    slip: BetSlip,
}

pub struct BetSlipStore {
    cache: Arc<dyn SlipCache>,
    state: RwLock<SlipState>,
}

impl BetSlipStore {
    pub fn new(cache: Arc<dyn SlipCache>) -> Self {
        Self {
            cache,
            state: RwLock::new(SlipState {
                owner: None,
                slip: BetSlip::new(),
            }),
        }
    }

    /// Copy of the current slip.
    pub async fn snapshot(&self) -> BetSlip {
        self.state.read().await.slip.clone()
    }

    /// React to a session change.
    ///
    /// Signing out empties the slip. Signing in restores the slip cached for
    /// that identity. With nothing cached, an anonymous slip is kept and
    /// becomes the identity's; a slip owned by another identity never is.
    pub async fn on_identity(&self, identity: Option<&Identity>) {
        let mut state = self.state.write().await;
        let uid = identity.map(|i| i.uid.clone());
        if state.owner == uid {
            return;
        }
        if state.owner.is_some() {
            state.slip = BetSlip::new();
        }
        state.owner = uid;

        let Some(uid) = state.owner.clone() else {
            state.slip = BetSlip::new();
            debug!("Bet slip reset for signed-out session");
            return;
        };

        match self.cache.load(&uid) {
            Ok(Some(slip)) => {
                info!(uid = %uid, selections = slip.len(), "Restored cached bet slip");
                state.slip = slip;
            }
            Ok(None) => self.persist(&state),
            Err(e) => warn!(uid = %uid, error = %e, "Error loading bet slip data"),
        }
    }

    pub async fn add_or_toggle_selection(&self, m: &Match, outcome: OutcomeType) -> BookResult<Toggle> {
        self.mutate(|slip| slip.add_or_toggle_selection(m, outcome)).await
    }

    pub async fn remove_selection(&self, id: &str) -> bool {
        self.mutate(|slip| slip.remove_selection(id)).await
    }

    pub async fn clear(&self) {
        self.mutate(|slip| slip.clear()).await
    }

    /// Drop what was just placed from `placed`, a snapshot taken before
    /// placement. An untouched slip is cleared outright; otherwise only the
    /// placed selections go and anything added since stays.
    pub async fn clear_placed(&self, placed: &BetSlip) {
        let mut state = self.state.write().await;
        if state.slip == *placed {
            state.slip.clear();
        } else {
            for selection in placed.selections() {
                state.slip.remove_selection(&selection.id);
            }
            debug!(remaining = state.slip.len(), "Slip changed during placement");
        }
        self.persist(&state);
    }

    pub async fn set_mode(&self, mode: BetMode) {
        self.mutate(|slip| slip.set_mode(mode)).await
    }

    pub async fn update_stake(&self, id: &str, amount: Decimal) -> bool {
        self.mutate(|slip| slip.update_stake(id, amount)).await
    }

    pub async fn update_stake_input(&self, id: &str, text: &str) -> bool {
        self.mutate(|slip| slip.update_stake_input(id, text)).await
    }

    pub async fn update_multi_stake(&self, amount: Decimal) -> bool {
        self.mutate(|slip| slip.update_multi_stake(amount)).await
    }

    pub async fn update_multi_stake_input(&self, text: &str) -> bool {
        self.mutate(|slip| slip.update_multi_stake_input(text)).await
    }

    async fn mutate<R>(&self, f: impl FnOnce(&mut BetSlip) -> R) -> R {
        let mut state = self.state.write().await;
        let result = f(&mut state.slip);
        self.persist(&state);
        result
    }

    fn persist(&self, state: &SlipState) {
        let Some(uid) = state.owner.as_deref() else {
            return;
        };
        let outcome = if state.slip.is_empty() {
            self.cache.remove(uid)
        } else {
            self.cache.save(uid, &state.slip)
        };
        if let Err(e) = outcome {
            warn!(uid, error = %e, "Error saving bet slip data");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
