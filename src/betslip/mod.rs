//! Bet slip selection engine.
//!
//! `BetSlip` holds the selections, per-selection stakes, the active mode
//! and the accumulator stake, and derives odds/stake/winnings totals from
//! them. It is plain data; `BetSlipStore` wraps it with per-identity
//! persistence.

pub mod cache;
pub mod store;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::types::{BetDetails, BetLeg, BetMode, BookError, BookResult, Match, OutcomeType, Selection};

pub use cache::{FileSlipCache, MemorySlipCache, SlipCache};
pub use store::BetSlipStore;

/// Stake given to a newly added selection in single mode.
pub const DEFAULT_SINGLE_STAKE: Decimal = dec!(5);
/// Accumulator stake of a fresh slip.
pub const DEFAULT_MULTI_STAKE: Decimal = dec!(10);

fn default_multi_stake() -> Decimal {
    DEFAULT_MULTI_STAKE
}

/// Stakes keyed by selection id, written as decimal strings so a restored
/// slip carries the exact amounts.
mod stake_map {
    use rust_decimal::Decimal;
    use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::BTreeMap;

    pub fn serialize<S: Serializer>(stakes: &BTreeMap<String, Decimal>, serializer: S) -> Result<S::Ok, S::Error> {
        stakes
            .iter()
            .map(|(id, stake)| (id, stake.to_string()))
            .collect::<BTreeMap<_, _>>()
            .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BTreeMap<String, Decimal>, D::Error> {
        BTreeMap::<String, String>::deserialize(deserializer)?
            .into_iter()
            .map(|(id, stake)| {
                stake
                    .parse::<Decimal>()
                    .map(|stake| (id, stake))
                    .map_err(de::Error::custom)
            })
            .collect()
    }
}

/// Result of `add_or_toggle_selection`.
#[derive(Debug, Clone, PartialEq)]
pub enum Toggle {
    Added(Selection),
    Removed(String),
}

/// Parse a user-typed stake.
///
/// Blank or non-numeric text counts as zero. Negative values yield `None`
/// and must be ignored by the caller.
pub fn parse_stake_input(text: &str) -> Option<Decimal> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Some(Decimal::ZERO);
    }
    match Decimal::from_str(trimmed) {
        Ok(v) if v.is_sign_negative() && !v.is_zero() => None,
        Ok(v) => Some(v),
        Err(_) => Some(Decimal::ZERO),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BetSlip {
    #[serde(default)]
    selections: Vec<Selection>,
    #[serde(default, with = "stake_map")]
    stakes: BTreeMap<String, Decimal>,
    #[serde(default, rename = "betMode")]
    mode: BetMode,
    #[serde(default = "default_multi_stake", with = "rust_decimal::serde::str")]
    multi_stake: Decimal,
}

impl Default for BetSlip {
    fn default() -> Self {
        Self {
            selections: Vec::new(),
            stakes: BTreeMap::new(),
            mode: BetMode::Single,
            multi_stake: DEFAULT_MULTI_STAKE,
        }
    }
}

impl BetSlip {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selections(&self) -> &[Selection] {
        &self.selections
    }

    pub fn stakes(&self) -> &BTreeMap<String, Decimal> {
        &self.stakes
    }

    pub fn mode(&self) -> BetMode {
        self.mode
    }

    pub fn multi_stake(&self) -> Decimal {
        self.multi_stake
    }

    pub fn is_empty(&self) -> bool {
        self.selections.is_empty()
    }

    pub fn len(&self) -> usize {
        self.selections.len()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.selections.iter().any(|s| s.id == id)
    }

    /// Stake for one selection; missing entries count as zero.
    pub fn stake_for(&self, id: &str) -> Decimal {
        self.stakes.get(id).copied().unwrap_or(Decimal::ZERO)
    }

    // -- Mutations -------------------------------------------------------

    /// Add the outcome of `m` to the slip, or remove it if already present.
    ///
    /// The new selection freezes the outcome's current odds and gets the
    /// default single stake.
    pub fn add_or_toggle_selection(&mut self, m: &Match, outcome: OutcomeType) -> BookResult<Toggle> {
        let id = Selection::key(m.match_id, outcome);
        if self.remove_selection(&id) {
            return Ok(Toggle::Removed(id));
        }

        let odds = m.odds.for_outcome(outcome).ok_or_else(|| {
            BookError::InvalidSelection(format!("{} offers no {outcome} odds", m.label))
        })?;
        if odds <= Decimal::ONE {
            return Err(BookError::InvalidSelection(format!("odds {odds} must exceed 1")));
        }

        let selection = Selection {
            id: id.clone(),
            match_id: m.match_id,
            sport: m.sport.clone(),
            label: m.label.clone(),
            outcome,
            outcome_name: m.outcome_name(outcome).to_string(),
            odds,
            time: m.time.clone(),
            league: m.league.clone(),
        };
        self.selections.push(selection.clone());
        self.stakes.entry(id).or_insert(DEFAULT_SINGLE_STAKE);
        Ok(Toggle::Added(selection))
    }

    /// Remove a selection and its stake. Returns whether it was present.
    pub fn remove_selection(&mut self, id: &str) -> bool {
        let before = self.selections.len();
        self.selections.retain(|s| s.id != id);
        self.stakes.remove(id);
        self.selections.len() != before
    }

    /// Empty selections and stakes together.
    pub fn clear(&mut self) {
        self.selections.clear();
        self.stakes.clear();
    }

    pub fn set_mode(&mut self, mode: BetMode) {
        self.mode = mode;
    }

    /// Set the stake of one selection. Negative amounts and unknown ids are
    /// ignored; returns whether the stake changed.
    pub fn update_stake(&mut self, id: &str, amount: Decimal) -> bool {
        if amount.is_sign_negative() && !amount.is_zero() {
            return false;
        }
        if !self.contains(id) {
            return false;
        }
        self.stakes.insert(id.to_string(), amount);
        true
    }

    pub fn update_stake_input(&mut self, id: &str, text: &str) -> bool {
        match parse_stake_input(text) {
            Some(amount) => self.update_stake(id, amount),
            None => false,
        }
    }

    /// Set the accumulator stake. Negative amounts are ignored.
    pub fn update_multi_stake(&mut self, amount: Decimal) -> bool {
        if amount.is_sign_negative() && !amount.is_zero() {
            return false;
        }
        self.multi_stake = amount;
        true
    }

    pub fn update_multi_stake_input(&mut self, text: &str) -> bool {
        match parse_stake_input(text) {
            Some(amount) => self.update_multi_stake(amount),
            None => false,
        }
    }

    // -- Derived values --------------------------------------------------

    /// Product of all selection odds; 1 for an empty slip.
    pub fn accumulator_odds(&self) -> Decimal {
        self.selections
            .iter()
            .fold(Decimal::ONE, |acc, s| acc * s.odds)
    }

    pub fn total_singles_stake(&self) -> Decimal {
        self.stakes.values().copied().sum()
    }

    /// Return on one single bet: stake × odds.
    pub fn single_winnings(&self, id: &str) -> Decimal {
        self.selections
            .iter()
            .find(|s| s.id == id)
            .map(|s| self.stake_for(id) * s.odds)
            .unwrap_or(Decimal::ZERO)
    }

    pub fn potential_winnings(&self) -> Decimal {
        match self.mode {
            BetMode::Single => self
                .selections
                .iter()
                .map(|s| self.stake_for(&s.id) * s.odds)
                .sum(),
            BetMode::Multi => self.multi_stake * self.accumulator_odds(),
        }
    }

    /// Amount debited when the slip is placed in its current mode.
    pub fn total_stake(&self) -> Decimal {
        match self.mode {
            BetMode::Single => self.total_singles_stake(),
            BetMode::Multi => self.multi_stake,
        }
    }

    /// Snapshot recorded on the bet transaction.
    pub fn bet_details(&self) -> BetDetails {
        let single = self.mode == BetMode::Single;
        BetDetails {
            mode: self.mode,
            selections: self
                .selections
                .iter()
                .map(|s| BetLeg {
                    label: s.label.clone(),
                    selection: s.outcome_name.clone(),
                    odds: s.odds,
                    stake: single.then(|| self.stake_for(&s.id)),
                })
                .collect(),
            total_odds: (!single).then(|| self.accumulator_odds()),
        }
    }

    /// Description stored on the bet transaction.
    pub fn describe(&self) -> String {
        match self.mode {
            BetMode::Single => format!("Bet on {} selections", self.selections.len()),
            BetMode::Multi => format!("Multi bet with {} selections", self.selections.len()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
