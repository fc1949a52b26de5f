//! Profile pool with cooldown and backoff state.
//!
//! The pool owns an ordered arena of profiles and their runtime state.
//! Runtime state is private: the only way `locked`, `cooldown_until` or
//! `failure_count` change is through pool methods, so there is no external
//! aliasing of mutable profile state.
//!
//! Every time-dependent method takes an explicit `now: Instant`; callers
//! own the clock. This keeps cooldown behavior exactly testable without
//! sleeping.

use std::time::{Duration, Instant};

use thiserror::Error;

use codebuddy_types::{ExecutionProfile, ProfileId};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    #[error("unknown profile: {0}")]
    UnknownProfile(ProfileId),
    #[error("duplicate profile: {0}")]
    DuplicateProfile(ProfileId),
}

/// Cooldown and backoff tuning.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Base delay for the exponential failure backoff.
    pub base_delay: Duration,
    /// Cap applied to the exponential failure backoff.
    pub max_delay: Duration,
    /// Fixed cooldown applied when a profile is locked for a rate limit.
    pub rate_limit_cooldown: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            rate_limit_cooldown: Duration::from_secs(60),
        }
    }
}

/// Exponential backoff for a profile with `failure_count` recorded failures:
/// `min(max_delay, base_delay * 2^failure_count)`.
///
/// Monotonically non-decreasing in `failure_count` and saturating at
/// `max_delay`, including for shift counts that would overflow.
#[must_use]
pub fn backoff_delay(config: &PoolConfig, failure_count: u32) -> Duration {
    let factor = 1u32.checked_shl(failure_count).unwrap_or(u32::MAX);
    config
        .base_delay
        .saturating_mul(factor)
        .min(config.max_delay)
}

/// Runtime state of one profile. Mutated exclusively by [`ProfilePool`].
#[derive(Debug, Clone, Default)]
struct ProfileState {
    locked: bool,
    cooldown_until: Option<Instant>,
    failure_count: u32,
    last_success_at: Option<Instant>,
}

impl ProfileState {
    /// A profile is available iff it is unlocked or its cooldown elapsed.
    fn is_available(&self, now: Instant) -> bool {
        !self.locked || self.cooldown_until.is_some_and(|until| until <= now)
    }
}

/// Point-in-time view of a profile for status surfaces.
#[derive(Debug, Clone)]
pub struct ProfileStatus {
    pub id: ProfileId,
    pub available: bool,
    pub locked: bool,
    pub cooldown_remaining: Option<Duration>,
    pub failure_count: u32,
}

/// Prioritized pool of execution profiles.
#[derive(Debug, Default)]
pub struct ProfilePool {
    config: PoolConfig,
    entries: Vec<(ExecutionProfile, ProfileState)>,
}

impl ProfilePool {
    #[must_use]
    pub fn new(profiles: Vec<ExecutionProfile>, config: PoolConfig) -> Self {
        Self {
            config,
            entries: profiles
                .into_iter()
                .map(|profile| (profile, ProfileState::default()))
                .collect(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn add_profile(&mut self, profile: ExecutionProfile) -> Result<(), PoolError> {
        if self.entries.iter().any(|(p, _)| p.id == profile.id) {
            return Err(PoolError::DuplicateProfile(profile.id));
        }
        self.entries.push((profile, ProfileState::default()));
        Ok(())
    }

    pub fn remove_profile(&mut self, id: &ProfileId) -> Result<ExecutionProfile, PoolError> {
        let index = self
            .entries
            .iter()
            .position(|(p, _)| &p.id == id)
            .ok_or_else(|| PoolError::UnknownProfile(id.clone()))?;
        Ok(self.entries.remove(index).0)
    }

    /// Profiles currently eligible for selection, best first.
    ///
    /// Lazily expires elapsed cooldowns (resetting `locked` and
    /// `failure_count` per the availability invariant), then filters and
    /// sorts: priority descending, failure count ascending among equals.
    /// Recomputed on every call; ordering tie-breaks are stable.
    pub fn available(&mut self, now: Instant) -> Vec<ExecutionProfile> {
        self.expire_cooldowns(now);

        let mut eligible: Vec<&(ExecutionProfile, ProfileState)> = self
            .entries
            .iter()
            .filter(|(_, state)| state.is_available(now))
            .collect();
        eligible.sort_by(|(a, sa), (b, sb)| {
            b.priority
                .cmp(&a.priority)
                .then(sa.failure_count.cmp(&sb.failure_count))
        });
        eligible
            .into_iter()
            .map(|(profile, _)| profile.clone())
            .collect()
    }

    fn expire_cooldowns(&mut self, now: Instant) {
        for (_, state) in &mut self.entries {
            if state.locked && state.cooldown_until.is_some_and(|until| until <= now) {
                state.locked = false;
                state.cooldown_until = None;
                state.failure_count = 0;
            }
        }
    }

    /// Lock a profile after a rotation-worthy failure.
    ///
    /// Increments the failure count, then applies either the fixed
    /// rate-limit cooldown or the exponential failure backoff. Returns the
    /// cooldown that was applied.
    pub fn lock(
        &mut self,
        id: &ProfileId,
        is_rate_limit: bool,
        now: Instant,
    ) -> Result<Duration, PoolError> {
        let config = self.config.clone();
        let state = self.state_mut(id)?;
        state.locked = true;
        state.failure_count = state.failure_count.saturating_add(1);

        let cooldown = if is_rate_limit {
            config.rate_limit_cooldown
        } else {
            backoff_delay(&config, state.failure_count)
        };
        state.cooldown_until = Some(now + cooldown);
        Ok(cooldown)
    }

    /// Clear failure state after a successful attempt.
    pub fn mark_success(&mut self, id: &ProfileId, now: Instant) -> Result<(), PoolError> {
        let state = self.state_mut(id)?;
        state.locked = false;
        state.cooldown_until = None;
        state.failure_count = 0;
        state.last_success_at = Some(now);
        Ok(())
    }

    /// Forcibly unlock every profile, clearing all cooldowns.
    pub fn unlock_all(&mut self) {
        for (_, state) in &mut self.entries {
            state.locked = false;
            state.cooldown_until = None;
            state.failure_count = 0;
        }
    }

    #[must_use]
    pub fn status(&self, now: Instant) -> Vec<ProfileStatus> {
        self.entries
            .iter()
            .map(|(profile, state)| ProfileStatus {
                id: profile.id.clone(),
                available: state.is_available(now),
                locked: state.locked,
                cooldown_remaining: state
                    .cooldown_until
                    .and_then(|until| until.checked_duration_since(now)),
                failure_count: state.failure_count,
            })
            .collect()
    }

    #[must_use]
    pub fn get(&self, id: &ProfileId) -> Option<&ExecutionProfile> {
        self.entries
            .iter()
            .find(|(p, _)| &p.id == id)
            .map(|(p, _)| p)
    }

    fn state_mut(&mut self, id: &ProfileId) -> Result<&mut ProfileState, PoolError> {
        self.entries
            .iter_mut()
            .find(|(p, _)| &p.id == id)
            .map(|(_, state)| state)
            .ok_or_else(|| PoolError::UnknownProfile(id.clone()))
    }
}
