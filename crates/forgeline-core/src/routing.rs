//! Source routing: pick the interactive or bulk backend from an estimated
//! row volume and a freshness requirement.

use crate::error::CoreError;

/// Caller's estimate of how many rows a staged query will touch across
/// all of its collections. Always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeEstimate(usize);

impl VolumeEstimate {
    /// # Errors
    /// Rejects a zero estimate; routing needs a real volume to decide.
    pub fn new(rows: usize) -> Result<Self, CoreError> {
        if rows == 0 {
            return Err(CoreError::InvalidRequest(String::from(
                "volume estimate must be positive",
            )));
        }
        Ok(Self(rows))
    }

    pub fn rows(self) -> usize {
        self.0
    }
}

/// Which data source serves a staged query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Live collection queries against the ERP, freshest but rate-limited
    /// and volume-capped.
    Interactive,
    /// Warehouse replica: no volume cap, data may lag by the replication
    /// interval.
    Bulk,
}

impl Backend {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Interactive => "interactive",
            Self::Bulk => "bulk",
        }
    }
}

/// How stale the caller can tolerate the data being.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Live data only; replica staleness is unacceptable.
    Immediate,
    /// Prefer live data, accept the replica when volume forces it.
    NearImmediate,
    /// Replica staleness is fine; prefer the cheaper source.
    Deferred,
}

/// Routing thresholds, in estimated rows.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Above this, the interactive backend is no longer the first choice.
    pub preferred_max: usize,
    /// Hard cap for the interactive backend; beyond it only bulk can
    /// serve the query.
    pub hard_max: usize,
    /// At or above this, deferred queries go straight to bulk.
    pub bulk_preferred_min: usize,
    /// Whether a bulk backend is wired up at all.
    pub bulk_available: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            preferred_max: 2_000,
            hard_max: 10_000,
            bulk_preferred_min: 50_000,
            bulk_available: false,
        }
    }
}

impl RouterConfig {
    /// Pick a backend for the estimated volume and freshness requirement.
    ///
    /// # Errors
    /// [`CoreError::VolumeExceeded`] when no available backend can serve
    /// the volume within the caller's freshness constraint.
    pub fn select_backend(
        &self,
        estimate: VolumeEstimate,
        freshness: Freshness,
    ) -> Result<Backend, CoreError> {
        let rows = estimate.rows();
        let over_hard_cap = rows > self.hard_max;

        let selected = match freshness {
            Freshness::Immediate => {
                if over_hard_cap {
                    return Err(self.volume_exceeded(rows));
                }
                Backend::Interactive
            }
            Freshness::NearImmediate => {
                if !over_hard_cap {
                    Backend::Interactive
                } else if self.bulk_available {
                    Backend::Bulk
                } else {
                    return Err(self.volume_exceeded(rows));
                }
            }
            Freshness::Deferred => {
                if self.bulk_available && rows >= self.bulk_preferred_min {
                    Backend::Bulk
                } else if rows <= self.preferred_max {
                    Backend::Interactive
                } else if rows <= self.hard_max {
                    Backend::Interactive
                } else if self.bulk_available {
                    Backend::Bulk
                } else {
                    return Err(self.volume_exceeded(rows));
                }
            }
        };

        tracing::debug!(
            rows,
            freshness = ?freshness,
            backend = selected.as_str(),
            "routed staged query"
        );
        Ok(selected)
    }

    fn volume_exceeded(&self, estimated: usize) -> CoreError {
        CoreError::VolumeExceeded {
            estimated: estimated as u64,
            limit: self.hard_max as u64,
            hint: "narrow filters to reduce the estimated row volume",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_bulk() -> RouterConfig {
        RouterConfig {
            bulk_available: true,
            ..RouterConfig::default()
        }
    }

    fn without_bulk() -> RouterConfig {
        RouterConfig::default()
    }

    fn rows(n: usize) -> VolumeEstimate {
        VolumeEstimate::new(n).expect("estimate")
    }

    #[test]
    fn zero_estimate_is_rejected() {
        assert!(VolumeEstimate::new(0).is_err());
        assert_eq!(rows(1).rows(), 1);
    }

    #[test]
    fn immediate_small_volume_goes_interactive() {
        let backend = with_bulk()
            .select_backend(rows(500), Freshness::Immediate)
            .expect("backend");
        assert_eq!(backend, Backend::Interactive);
    }

    #[test]
    fn immediate_over_hard_cap_fails_even_with_bulk_available() {
        let error = with_bulk()
            .select_backend(rows(10_001), Freshness::Immediate)
            .expect_err("should fail");
        match error {
            CoreError::VolumeExceeded {
                estimated, limit, ..
            } => {
                assert_eq!(estimated, 10_001);
                assert_eq!(limit, 10_000);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn near_immediate_within_cap_stays_interactive() {
        let backend = with_bulk()
            .select_backend(rows(10_000), Freshness::NearImmediate)
            .expect("backend");
        assert_eq!(backend, Backend::Interactive);
    }

    #[test]
    fn near_immediate_over_cap_falls_back_to_bulk() {
        let backend = with_bulk()
            .select_backend(rows(25_000), Freshness::NearImmediate)
            .expect("backend");
        assert_eq!(backend, Backend::Bulk);
    }

    #[test]
    fn near_immediate_over_cap_without_bulk_fails() {
        let error = without_bulk()
            .select_backend(rows(25_000), Freshness::NearImmediate)
            .expect_err("should fail");
        assert!(matches!(error, CoreError::VolumeExceeded { .. }));
    }

    #[test]
    fn deferred_large_volume_prefers_bulk() {
        let backend = with_bulk()
            .select_backend(rows(50_000), Freshness::Deferred)
            .expect("backend");
        assert_eq!(backend, Backend::Bulk);
    }

    #[test]
    fn deferred_small_volume_prefers_interactive() {
        let backend = with_bulk()
            .select_backend(rows(1_500), Freshness::Deferred)
            .expect("backend");
        assert_eq!(backend, Backend::Interactive);
    }

    #[test]
    fn deferred_mid_volume_uses_interactive_up_to_hard_cap() {
        let config = with_bulk();
        assert_eq!(
            config
                .select_backend(rows(8_000), Freshness::Deferred)
                .expect("backend"),
            Backend::Interactive
        );
        assert_eq!(
            config
                .select_backend(rows(12_000), Freshness::Deferred)
                .expect("backend"),
            Backend::Bulk
        );
    }

    #[test]
    fn deferred_over_cap_without_bulk_fails_with_hint() {
        let error = without_bulk()
            .select_backend(rows(12_000), Freshness::Deferred)
            .expect_err("should fail");
        match error {
            CoreError::VolumeExceeded { hint, .. } => {
                assert!(hint.contains("narrow filters"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn deferred_without_bulk_uses_interactive_even_for_large_preference() {
        // bulk_preferred_min does not apply when no bulk backend exists.
        let backend = without_bulk()
            .select_backend(rows(9_999), Freshness::Deferred)
            .expect("backend");
        assert_eq!(backend, Backend::Interactive);
    }
}
