//! The freshness decision engine.
//!
//! Deciding whether a stored entry may be served without contacting the
//! origin is split in two: [`check_rules`] applies every rule that needs no
//! network (validator presence, the force-stale sentinel, the hard TTL
//! ceiling, `Expires`), and [`evaluate`] falls through to a conditional HEAD
//! probe only when those rules cannot decide.
//!
//! Rule order matters and the first matching rule wins:
//!
//! 1. no validators at all: stale
//! 2. etag `-1`: stale (explicit invalidation, beats everything else)
//! 3. hard TTL ceiling exceeded: stale, even with a future `Expires`
//! 4. `Expires` in the future: fresh, no network
//! 5. otherwise probe: ETag equality (strong), then Last-Modified `<=` (weak)

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::entry::{normalize_etag, parse_http_datetime, CacheEntry, FORCE_STALE_ETAG};
use crate::origin::OriginClient;

/// Outcome of the network-free rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleOutcome {
    Fresh,
    Stale,
    /// The rules alone cannot decide; a conditional probe is required.
    NeedsProbe,
}

/// Final verdict on a stored entry.
///
/// `ProbeFailed` is kept distinct from `Stale` so the caller can log the
/// probe failure as a cache-read problem while still degrading to a miss.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    Stale,
    ProbeFailed,
}

/// Applies the deterministic freshness rules.
pub fn check_rules(entry: &CacheEntry, now: DateTime<Utc>, max_age_seconds: u64) -> RuleOutcome {
    if entry.etag.is_none() && entry.last_modified.is_none() && entry.expires.is_none() {
        debug!(url = %entry.url, "no cache validators present");
        return RuleOutcome::Stale;
    }

    if entry.etag.as_deref() == Some(FORCE_STALE_ETAG) {
        debug!(url = %entry.url, "forcing uncached version due to etag sentinel");
        return RuleOutcome::Stale;
    }

    if is_hard_expired(entry, now, max_age_seconds) {
        debug!(url = %entry.url, "entry exceeded the hard TTL ceiling");
        return RuleOutcome::Stale;
    }

    if let Some(expires) = entry.expires {
        if expires > now {
            debug!(url = %entry.url, %expires, "fresh by Expires");
            return RuleOutcome::Fresh;
        }
    }

    RuleOutcome::NeedsProbe
}

/// Whether the entry is past the configured hard TTL ceiling.
///
/// A ceiling of 0 means unbounded; such entries are never hard-expired.
pub fn is_hard_expired(entry: &CacheEntry, now: DateTime<Utc>, max_age_seconds: u64) -> bool {
    if max_age_seconds == 0 {
        return false;
    }
    now - entry.created_at > Duration::seconds(max_age_seconds as i64)
}

/// Full freshness evaluation, probing the origin when the rules alone
/// cannot decide.
pub async fn evaluate(
    entry: &CacheEntry,
    now: DateTime<Utc>,
    max_age_seconds: u64,
    origin: &dyn OriginClient,
) -> Freshness {
    match check_rules(entry, now, max_age_seconds) {
        RuleOutcome::Fresh => return Freshness::Fresh,
        RuleOutcome::Stale => return Freshness::Stale,
        RuleOutcome::NeedsProbe => {}
    }

    debug!(url = %entry.url, "revalidating with HEAD probe");
    let probe = match origin.head(&entry.url).await {
        Ok(response) => response,
        Err(err) => {
            debug!(url = %entry.url, error = %err, "HEAD probe failed");
            return Freshness::ProbeFailed;
        }
    };

    if !probe.status.is_success() {
        return Freshness::Stale;
    }

    if let (Some(stored), Some(remote)) = (&entry.etag, probe.header_str("etag")) {
        if *stored == normalize_etag(remote) {
            debug!(url = %entry.url, "fresh by ETag");
            return Freshness::Fresh;
        }
    }

    if let (Some(stored), Some(remote)) = (
        entry.last_modified,
        probe.header_str("last-modified").and_then(parse_http_datetime),
    ) {
        if remote <= stored {
            debug!(url = %entry.url, "fresh by Last-Modified");
            return Freshness::Fresh;
        }
    }

    Freshness::Stale
}
