//! Daily bunk poll
//!
//! A fixed three-option poll whose tallies reset at the local date boundary.
//! Each installation may vote once per day.
//!
//! Every read and write first reconciles the stored date with today; a stale
//! poll is zeroed (and the voted flag cleared) before the operation proceeds.
//! The reconcile step stamps today's date; a vote then writes the new count
//! and the voted flag in one batch.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::store::{
    KeyValueStore, StoreError, WriteBatch, KEY_POLL_DATE, KEY_POLL_VOTED_TODAY, KEY_POLL_VOTES,
};

/// Date key format stored under [`KEY_POLL_DATE`]
const DATE_FORMAT: &str = "%Y-%m-%d";

/// The three poll answers, in display order
///
/// Labels are persisted verbatim as map keys and must not change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PollOption {
    #[serde(rename = "Yes 😎")]
    Yes,
    #[serde(rename = "No 🤓")]
    No,
    #[serde(rename = "Maybe 🤔")]
    Maybe,
}

impl PollOption {
    /// Canonical order
    pub const ALL: [PollOption; 3] = [PollOption::Yes, PollOption::No, PollOption::Maybe];

    pub fn label(&self) -> &'static str {
        match self {
            PollOption::Yes => "Yes 😎",
            PollOption::No => "No 🤓",
            PollOption::Maybe => "Maybe 🤔",
        }
    }

    /// Exact label match
    pub fn from_label(label: &str) -> Option<PollOption> {
        PollOption::ALL.into_iter().find(|o| o.label() == label)
    }
}

impl fmt::Display for PollOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for PollOption {
    type Err = PollError;

    /// Accepts the full label or the bare word (`yes`, `No`, ...)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(option) = PollOption::from_label(s) {
            return Ok(option);
        }
        let word = s.trim();
        PollOption::ALL
            .into_iter()
            .find(|o| {
                o.label()
                    .split_whitespace()
                    .next()
                    .is_some_and(|w| w.eq_ignore_ascii_case(word))
            })
            .ok_or_else(|| PollError::InvalidOption(s.to_string()))
    }
}

/// Poll error types
#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("You have already voted today! Come back tomorrow.")]
    AlreadyVoted,

    #[error("Invalid option: {0}")]
    InvalidOption(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Per-option vote counts, always holding all three options
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VoteCounts(BTreeMap<PollOption, u64>);

impl Default for VoteCounts {
    fn default() -> Self {
        Self(PollOption::ALL.into_iter().map(|o| (o, 0)).collect())
    }
}

impl VoteCounts {
    pub fn get(&self, option: PollOption) -> u64 {
        self.0.get(&option).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.0.values().sum()
    }

    /// Counts in canonical order
    pub fn iter(&self) -> impl Iterator<Item = (PollOption, u64)> + '_ {
        PollOption::ALL.into_iter().map(move |o| (o, self.get(o)))
    }

    fn increment(&mut self, option: PollOption) {
        *self.0.entry(option).or_insert(0) += 1;
    }
}

impl FromIterator<(PollOption, u64)> for VoteCounts {
    fn from_iter<I: IntoIterator<Item = (PollOption, u64)>>(iter: I) -> Self {
        let mut counts = VoteCounts::default();
        for (option, count) in iter {
            counts.0.insert(option, count);
        }
        counts
    }
}

/// Poll state for one day
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PollState {
    pub vote_counts: VoteCounts,
    pub poll_date: NaiveDate,
    pub has_voted_today: bool,
}

/// Aggregated results for display
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PollResults {
    pub vote_counts: VoteCounts,
    /// Raw number of votes, possibly zero
    pub total: u64,
    /// Rounded share per option; all zero when nobody has voted
    pub percentages: BTreeMap<PollOption, u32>,
    /// Strictly highest count, ties going to the earliest option; none
    /// until someone votes
    pub leading: Option<PollOption>,
}

impl PollResults {
    pub fn from_counts(vote_counts: VoteCounts) -> Self {
        let total = vote_counts.total();
        let divisor = total.max(1);

        let percentages = vote_counts
            .iter()
            .map(|(option, count)| {
                // round half up, in integers
                let pct = (count * 200 + divisor) / (2 * divisor);
                (option, pct as u32)
            })
            .collect();

        let mut leading: Option<(PollOption, u64)> = None;
        for (option, count) in vote_counts.iter() {
            if leading.map_or(true, |(_, best)| count > best) {
                leading = Some((option, count));
            }
        }

        Self {
            total,
            percentages,
            leading: leading.filter(|_| total > 0).map(|(option, _)| option),
            vote_counts,
        }
    }

    pub fn percentage(&self, option: PollOption) -> u32 {
        self.percentages.get(&option).copied().unwrap_or(0)
    }
}

/// The daily poll over a [`KeyValueStore`]
pub struct DailyPoll {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
}

impl DailyPoll {
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Today's local date, the rollover boundary
    pub fn current_date_key(&self) -> NaiveDate {
        self.clock.today()
    }

    /// Reset a stale poll to today
    ///
    /// Returns true if a reset happened.
    pub fn reconcile_date(&self) -> Result<bool, PollError> {
        let today = self.current_date_key();
        let stored = self.stored_date()?;

        if stored == Some(today) {
            return Ok(false);
        }

        let mut batch = WriteBatch::new();
        batch.put(KEY_POLL_VOTES, &VoteCounts::default())?;
        batch.put(KEY_POLL_DATE, &today.format(DATE_FORMAT).to_string())?;
        batch.delete(KEY_POLL_VOTED_TODAY);
        self.store.apply(batch)?;

        match stored {
            Some(previous) => info!(%previous, %today, "poll rolled over"),
            None => debug!(%today, "poll initialized"),
        }
        Ok(true)
    }

    pub fn tally(&self) -> Result<PollState, PollError> {
        self.reconcile_date()?;
        Ok(PollState {
            vote_counts: self.stored_counts()?,
            poll_date: self.current_date_key(),
            has_voted_today: self.stored_voted_flag()?,
        })
    }

    pub fn has_voted_today(&self) -> Result<bool, PollError> {
        self.reconcile_date()?;
        self.stored_voted_flag()
    }

    /// Record one vote for `option` (a label or bare answer word)
    pub fn cast_vote(&self, option: &str) -> Result<PollResults, PollError> {
        if self.has_voted_today()? {
            warn!("vote rejected: already voted today");
            return Err(PollError::AlreadyVoted);
        }

        let option: PollOption = option.parse()?;
        self.record_vote(option)
    }

    /// Record one vote for an already-parsed option
    pub fn vote(&self, option: PollOption) -> Result<PollResults, PollError> {
        if self.has_voted_today()? {
            warn!("vote rejected: already voted today");
            return Err(PollError::AlreadyVoted);
        }
        self.record_vote(option)
    }

    pub fn results(&self) -> Result<PollResults, PollError> {
        Ok(PollResults::from_counts(self.tally()?.vote_counts))
    }

    fn record_vote(&self, option: PollOption) -> Result<PollResults, PollError> {
        let mut counts = self.stored_counts()?;
        counts.increment(option);

        let mut batch = WriteBatch::new();
        batch.put(KEY_POLL_VOTES, &counts)?;
        batch.put(KEY_POLL_VOTED_TODAY, &true)?;
        self.store.apply(batch)?;

        info!(option = %option, total = counts.total(), "vote recorded");
        Ok(PollResults::from_counts(counts))
    }

    fn stored_date(&self) -> Result<Option<NaiveDate>, PollError> {
        let raw: Option<String> = self.store.load(KEY_POLL_DATE)?;
        // an unparseable marker is treated as stale
        Ok(raw.and_then(|s| NaiveDate::parse_from_str(&s, DATE_FORMAT).ok()))
    }

    fn stored_counts(&self) -> Result<VoteCounts, PollError> {
        let counts: Option<BTreeMap<PollOption, u64>> = self.store.load(KEY_POLL_VOTES)?;
        Ok(counts
            .map(|map| map.into_iter().collect())
            .unwrap_or_default())
    }

    fn stored_voted_flag(&self) -> Result<bool, PollError> {
        Ok(self.store.load::<bool>(KEY_POLL_VOTED_TODAY)?.unwrap_or(false))
    }
}
