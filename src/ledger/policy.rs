//! Free/paid credit arithmetic
//!
//! Pure functions over a [`CreditRecord`]; persistence lives in the store.

use chrono::{DateTime, Duration, Utc};

use super::types::{Balance, CreditRecord, CreditSource, DebitOutcome, MAX_FREE_CREDITS, RESET_PERIOD_HOURS};
use crate::config::CreditConfig;

/// Replenishment rules for the free allowance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreditPolicy {
    pub max_free: u32,
    pub reset_period: Duration,
}

impl Default for CreditPolicy {
    fn default() -> Self {
        Self {
            max_free: MAX_FREE_CREDITS,
            reset_period: Duration::hours(RESET_PERIOD_HOURS),
        }
    }
}

impl CreditPolicy {
    pub fn new(max_free: u32, reset_period: Duration) -> Self {
        Self { max_free, reset_period }
    }

    pub fn from_config(config: &CreditConfig) -> Self {
        Self::new(config.max_free, Duration::hours(config.reset_hours))
    }

    /// Record a brand-new user starts with
    pub fn fresh_record(&self, now: DateTime<Utc>) -> CreditRecord {
        CreditRecord {
            free: self.max_free,
            paid: 0,
            last_reset: now,
        }
    }

    /// Clamp a stored record to the current policy
    pub fn normalize(&self, mut record: CreditRecord) -> CreditRecord {
        record.free = record.free.min(self.max_free);
        record
    }

    pub fn balance(&self, record: &CreditRecord) -> Balance {
        Balance {
            free: record.free,
            paid: record.paid,
            total: record.free.saturating_add(record.paid),
            last_reset: record.last_reset,
        }
    }

    /// Time left in the current cycle, never negative
    pub fn time_until_reset(&self, record: &CreditRecord, now: DateTime<Utc>) -> Duration {
        let next_reset = record.last_reset + self.reset_period;
        let remaining = next_reset - now;
        if remaining > Duration::zero() {
            remaining
        } else {
            Duration::zero()
        }
    }

    /// A reset fires only once the cycle elapsed and some free credit was used
    pub fn reset_due(&self, record: &CreditRecord, now: DateTime<Utc>) -> bool {
        self.time_until_reset(record, now).is_zero() && record.free < self.max_free
    }

    /// Refill the free allowance if due; returns whether a reset happened
    pub fn apply_reset(&self, record: &mut CreditRecord, now: DateTime<Utc>) -> bool {
        if !self.reset_due(record, now) {
            return false;
        }
        record.free = self.max_free;
        record.last_reset = now;
        true
    }

    /// Credits spendable right now, counting a reset that would be applied first
    pub fn available(&self, record: &CreditRecord, now: DateTime<Utc>) -> u32 {
        let mut projected = *record;
        self.apply_reset(&mut projected, now);
        projected.free + projected.paid
    }

    /// Take one credit: reset first, then free, then paid.
    ///
    /// Taking from a full free allowance stamps `last_reset`, so the cycle
    /// countdown starts at first use. An empty wallet is left untouched.
    pub fn debit(&self, record: &mut CreditRecord, now: DateTime<Utc>) -> DebitOutcome {
        let before = *record;
        let reset = self.apply_reset(record, now);

        let source = if record.free > 0 {
            if record.free >= self.max_free {
                record.last_reset = now;
            }
            record.free -= 1;
            Some(CreditSource::Free)
        } else if record.paid > 0 {
            record.paid -= 1;
            Some(CreditSource::Paid)
        } else {
            *record = before;
            None
        };

        DebitOutcome {
            reset: reset && source.is_some(),
            source,
        }
    }

    /// Add purchased credits
    pub fn credit_paid(&self, record: &mut CreditRecord, credits: u32) {
        record.paid = record.paid.saturating_add(credits);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap()
    }

    fn record(free: u32, paid: u32, last_reset: DateTime<Utc>) -> CreditRecord {
        CreditRecord { free, paid, last_reset }
    }

    #[test]
    fn test_total_saturates_at_max_paid() {
        let policy = CreditPolicy::default();
        let mut rec = record(3, 0, t0());
        policy.credit_paid(&mut rec, u32::MAX);
        policy.credit_paid(&mut rec, 10);

        let balance = policy.balance(&rec);
        assert_eq!(balance.paid, u32::MAX);
        assert_eq!(balance.total, u32::MAX);
    }

    #[test]
    fn test_debit_prefers_free() {
        let policy = CreditPolicy::default();
        let mut rec = record(2, 5, t0());

        let outcome = policy.debit(&mut rec, t0() + Duration::minutes(5));

        assert_eq!(outcome.source, Some(CreditSource::Free));
        assert_eq!((rec.free, rec.paid), (1, 5));
    }

    #[test]
    fn test_debit_total_drops_by_one_for_every_state() {
        let policy = CreditPolicy::default();
        let now = t0() + Duration::hours(1);

        for free in 0..=policy.max_free {
            for paid in 0..4 {
                let mut rec = record(free, paid, t0());
                let before = policy.balance(&rec).total;
                let outcome = policy.debit(&mut rec, now);

                match outcome.source {
                    Some(CreditSource::Free) => {
                        assert!(free > 0);
                        assert_eq!(rec.paid, paid);
                    }
                    Some(CreditSource::Paid) => {
                        assert_eq!(free, 0);
                        assert_eq!(rec.free, 0);
                    }
                    None => {
                        assert_eq!(before, 0);
                        assert_eq!(rec, record(free, paid, t0()));
                        continue;
                    }
                }
                assert_eq!(policy.balance(&rec).total, before - 1);
            }
        }
    }

    #[test]
    fn test_first_use_of_full_allowance_starts_countdown() {
        let policy = CreditPolicy::default();
        let later = t0() + Duration::hours(30);
        let mut rec = record(3, 0, t0());

        policy.debit(&mut rec, later);

        assert_eq!(rec.free, 2);
        assert_eq!(rec.last_reset, later);
    }

    #[test]
    fn test_partial_allowance_keeps_countdown() {
        let policy = CreditPolicy::default();
        let mut rec = record(2, 0, t0());

        policy.debit(&mut rec, t0() + Duration::hours(2));

        assert_eq!(rec.free, 1);
        assert_eq!(rec.last_reset, t0());
    }

    #[test]
    fn test_reset_requires_elapsed_period_and_used_credit() {
        let policy = CreditPolicy::default();

        let mut early = record(0, 0, t0());
        assert!(!policy.apply_reset(&mut early, t0() + Duration::hours(23)));

        let mut full = record(3, 0, t0());
        assert!(!policy.apply_reset(&mut full, t0() + Duration::hours(48)));
        assert_eq!(full.last_reset, t0());

        let mut due = record(1, 4, t0());
        let now = t0() + Duration::hours(24);
        assert!(policy.apply_reset(&mut due, now));
        assert_eq!(due, record(3, 4, now));
    }

    #[test]
    fn test_reset_never_touches_paid_or_lowers_free() {
        let policy = CreditPolicy::default();
        let now = t0() + Duration::hours(25);

        for free in 0..=policy.max_free {
            for paid in [0, 1, 7] {
                let mut rec = record(free, paid, t0());
                policy.apply_reset(&mut rec, now);
                assert_eq!(rec.paid, paid);
                assert!(rec.free >= free);
                assert!(rec.free <= policy.max_free);
            }
        }
    }

    #[test]
    fn test_debit_after_period_resets_then_consumes() {
        let policy = CreditPolicy::default();
        let now = t0() + Duration::hours(26);
        let mut rec = record(0, 2, t0());

        let outcome = policy.debit(&mut rec, now);

        assert!(outcome.reset);
        assert_eq!(outcome.source, Some(CreditSource::Free));
        assert_eq!((rec.free, rec.paid), (2, 2));
        assert_eq!(rec.last_reset, now);
    }

    #[test]
    fn test_time_until_reset_is_monotonic_and_hits_zero() {
        let policy = CreditPolicy::default();
        let rec = record(1, 0, t0());

        let mut previous = policy.time_until_reset(&rec, t0());
        assert_eq!(previous, Duration::hours(24));

        for minutes in (0..=24 * 60).step_by(37) {
            let now = t0() + Duration::minutes(minutes);
            let remaining = policy.time_until_reset(&rec, now);
            assert!(remaining <= previous);
            previous = remaining;
        }

        assert_eq!(policy.time_until_reset(&rec, t0() + Duration::hours(24)), Duration::zero());
        assert_eq!(policy.time_until_reset(&rec, t0() + Duration::days(3)), Duration::zero());
    }

    #[test]
    fn test_paid_wallet_scenario() {
        let policy = CreditPolicy::default();
        let now = t0() + Duration::hours(1);
        let mut rec = record(0, 2, t0());

        assert_eq!(policy.debit(&mut rec, now).source, Some(CreditSource::Paid));
        assert_eq!(policy.debit(&mut rec, now).source, Some(CreditSource::Paid));
        assert_eq!((rec.free, rec.paid), (0, 0));

        let snapshot = rec;
        assert_eq!(policy.debit(&mut rec, now).source, None);
        assert_eq!(rec, snapshot);
    }

    #[test]
    fn test_available_counts_pending_reset() {
        let policy = CreditPolicy::default();
        let rec = record(0, 0, t0());

        assert_eq!(policy.available(&rec, t0() + Duration::hours(1)), 0);
        assert_eq!(policy.available(&rec, t0() + Duration::hours(24)), 3);
    }

    #[test]
    fn test_normalize_clamps_free() {
        let policy = CreditPolicy::new(2, Duration::hours(24));
        let rec = policy.normalize(record(3, 1, t0()));
        assert_eq!(rec.free, 2);
    }
}
