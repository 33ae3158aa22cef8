//! Proactive refresh scheduling
//!
//! The scheduler refreshes at `expires_at - margin - jitter`, where the
//! jitter is drawn once per token set so that many installations do not
//! refresh in lockstep. The lead never exceeds half the token's lifetime,
//! so a server issuing lifetimes shorter than the margin still gets a
//! freshly issued token used for a while before the next refresh. It exposes [`time_until_next_refresh`] and
//! [`tick`] for hosts with their own event loop, and [`run`] for a tokio task.
//!
//! [`time_until_next_refresh`]: RefreshScheduler::time_until_next_refresh
//! [`tick`]: RefreshScheduler::tick
//! [`run`]: RefreshScheduler::run

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use rand::Rng;
use tokenlink_common::resilience::{RetryExecutor, RetryPolicy};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::manager::TokenLifecycleManager;
use crate::error::OAuthResult;

/// Drives proactive refreshes for one lifecycle manager.
pub struct RefreshScheduler {
    manager: TokenLifecycleManager,
    retry: RetryExecutor,
    jitter: Duration,
    /// Jitter drawn for the token set expiring at the given instant
    planned: Mutex<Option<(DateTime<Utc>, Duration)>>,
}

impl RefreshScheduler {
    pub fn new(manager: TokenLifecycleManager, policy: RetryPolicy, jitter: Duration) -> Self {
        Self { manager, retry: RetryExecutor::new(policy), jitter, planned: Mutex::new(None) }
    }

    /// Delay until the next proactive refresh; `None` without a token set.
    pub fn time_until_next_refresh(&self) -> Option<Duration> {
        let tokens = self.manager.token_set()?;
        let due = self.due_at(tokens.issued_at, tokens.expires_at);
        Some((due - Utc::now()).to_std().unwrap_or(Duration::ZERO))
    }

    fn due_at(&self, issued_at: DateTime<Utc>, expires_at: DateTime<Utc>) -> DateTime<Utc> {
        let jitter = {
            let mut planned = self.planned.lock();
            match *planned {
                Some((at, jitter)) if at == expires_at => jitter,
                _ => {
                    let jitter = if self.jitter.is_zero() {
                        Duration::ZERO
                    } else {
                        rand::thread_rng().gen_range(Duration::ZERO..=self.jitter)
                    };
                    *planned = Some((expires_at, jitter));
                    jitter
                }
            }
        };
        let lead = TimeDelta::from_std(self.manager.refresh_margin() + jitter)
            .unwrap_or(TimeDelta::MAX)
            .min((expires_at - issued_at) / 2);
        expires_at.checked_sub_signed(lead).unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Refresh now if due. Returns whether a refresh happened.
    ///
    /// Transient failures are retried with backoff before being returned.
    ///
    /// # Errors
    /// Returns the final refresh error.
    #[instrument(skip(self))]
    pub async fn tick(&self) -> OAuthResult<bool> {
        match self.time_until_next_refresh() {
            Some(wait) if wait.is_zero() => {}
            _ => return Ok(false),
        }
        let Some(current) = self.manager.token_set() else {
            return Ok(false);
        };

        let access_token = current.access_token;
        let manager = &self.manager;
        let refreshed = self.retry.run(|| manager.refresh_if_current(&access_token)).await?;
        info!(expires_at = %refreshed.expires_at, "Proactive refresh complete");
        Ok(true)
    }

    /// Run until `cancel` fires.
    ///
    /// A refresh that has started is always awaited to completion before the
    /// loop observes cancellation.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut changes = self.manager.watch_changes();
        info!("Refresh scheduler started");

        loop {
            changes.borrow_and_update();
            let wait = self.time_until_next_refresh();
            debug!(wait_ms = wait.map(|w| w.as_millis() as u64), "Next proactive refresh");

            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                changed = changes.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                () = sleep_for(wait) => {
                    if let Err(err) = self.tick().await {
                        if err.reauth_reason().is_some() {
                            warn!(error = %err, "Proactive refresh requires reauthorization");
                        } else {
                            let backoff = self.retry.policy().max_delay;
                            warn!(
                                error = %err,
                                backoff_ms = backoff.as_millis() as u64,
                                "Proactive refresh failed"
                            );
                            tokio::select! {
                                () = cancel.cancelled() => break,
                                () = tokio::time::sleep(backoff) => {}
                            }
                        }
                    }
                }
            }
        }
        info!("Refresh scheduler stopped");
    }
}

async fn sleep_for(wait: Option<Duration>) {
    match wait {
        Some(wait) => tokio::time::sleep(wait).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokenlink_domain::{LifecycleState, ReauthReason, TokenSet};

    use super::*;
    use crate::error::OAuthError;
    use crate::testing::{manager_with, token_response, token_set_expiring_in, MockTokenEndpoint};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy::default()
            .with_delays(Duration::from_millis(10), Duration::from_millis(100))
            .with_jitter(0.0)
    }

    #[tokio::test]
    async fn test_time_until_next_refresh_respects_margin_and_jitter() {
        let (manager, _) = manager_with(Arc::new(MockTokenEndpoint::new()));
        let scheduler =
            RefreshScheduler::new(manager.clone(), fast_policy(), Duration::from_secs(30));
        assert_eq!(scheduler.time_until_next_refresh(), None);

        manager.install(token_set_expiring_in("a0", "r0", 3600)).await.expect("install");
        let wait = scheduler.time_until_next_refresh().expect("scheduled");
        // 3600s - 60s margin - [0, 30]s jitter
        assert!(wait <= Duration::from_secs(3540), "{wait:?}");
        assert!(wait >= Duration::from_secs(3505), "{wait:?}");

        // Jitter is stable for the same token set
        let again = scheduler.time_until_next_refresh().expect("scheduled");
        assert!(wait.saturating_sub(again) < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_lead_is_capped_at_half_the_lifetime() {
        let (manager, _) = manager_with(Arc::new(MockTokenEndpoint::new()));
        let scheduler =
            RefreshScheduler::new(manager.clone(), fast_policy(), Duration::from_secs(30));
        let now = Utc::now();
        let short_lived = TokenSet::new(
            "a0",
            "r0",
            "Bearer",
            None,
            now,
            now + TimeDelta::seconds(30),
        )
        .expect("valid token set");
        manager.install(short_lived).await.expect("install");

        // 30s lifetime, 60s margin: due after 15s instead of immediately
        let wait = scheduler.time_until_next_refresh().expect("scheduled");
        assert!(wait > Duration::from_secs(13), "{wait:?}");
        assert!(wait <= Duration::from_secs(15), "{wait:?}");
    }

    /// Validates that short server lifetimes do not cause back-to-back refreshes.
    ///
    /// Assertions:
    /// - The overdue token is refreshed once.
    /// - Refreshed tokens shorter than the margin are not refreshed again
    ///   straight away.
    #[tokio::test(start_paused = true)]
    async fn test_short_lifetimes_do_not_refresh_back_to_back() {
        let endpoint = Arc::new(MockTokenEndpoint::new());
        for i in 1..=50 {
            endpoint.push_refresh(Ok(token_response(&format!("a{i}"), None, 30)));
        }
        let (manager, _) = manager_with(Arc::clone(&endpoint));
        manager.install(token_set_expiring_in("a0", "r0", 30)).await.expect("install");

        let scheduler = Arc::new(RefreshScheduler::new(manager.clone(), fast_policy(), Duration::ZERO));
        let cancel = CancellationToken::new();
        let handle = tokio::spawn({
            let scheduler = Arc::clone(&scheduler);
            let cancel = cancel.clone();
            async move { scheduler.run(cancel).await }
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(endpoint.refresh_calls(), 1);
        assert_eq!(manager.token_set().expect("tokens").access_token, "a1");
        assert!(scheduler.time_until_next_refresh().expect("scheduled") > Duration::from_secs(10));

        cancel.cancel();
        handle.await.expect("scheduler exits");
    }

    #[tokio::test]
    async fn test_tick_skips_until_due() {
        let endpoint = Arc::new(MockTokenEndpoint::new());
        let (manager, _) = manager_with(Arc::clone(&endpoint));
        manager.install(token_set_expiring_in("a0", "r0", 3600)).await.expect("install");
        let scheduler = RefreshScheduler::new(manager, fast_policy(), Duration::ZERO);

        assert!(!scheduler.tick().await.expect("tick"));
        assert_eq!(endpoint.refresh_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_retries_transient_failures() {
        let endpoint = Arc::new(MockTokenEndpoint::new());
        endpoint.push_refresh(Err(OAuthError::transient("502")));
        endpoint.push_refresh(Ok(token_response("a1", None, 3600)));
        let (manager, _) = manager_with(Arc::clone(&endpoint));
        manager.install(token_set_expiring_in("a0", "r0", 30)).await.expect("install");
        let scheduler = RefreshScheduler::new(manager.clone(), fast_policy(), Duration::ZERO);

        assert!(scheduler.tick().await.expect("tick"));
        assert_eq!(endpoint.refresh_calls(), 2);
        assert_eq!(manager.token_set().expect("tokens").access_token, "a1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_does_not_retry_revoked_grant() {
        let endpoint = Arc::new(MockTokenEndpoint::new());
        endpoint.push_refresh(Err(OAuthError::authentication(
            ReauthReason::RefreshTokenExpired,
            "invalid_grant",
        )));
        let (manager, _) = manager_with(Arc::clone(&endpoint));
        manager.install(token_set_expiring_in("a0", "r0", 30)).await.expect("install");
        let scheduler = RefreshScheduler::new(manager.clone(), fast_policy(), Duration::ZERO);

        let err = scheduler.tick().await.expect_err("revoked");
        assert_eq!(err.reauth_reason(), Some(ReauthReason::RefreshTokenExpired));
        assert_eq!(endpoint.refresh_calls(), 1);
        assert_eq!(manager.state(), LifecycleState::ReauthRequired);
    }

    /// Validates the background loop.
    ///
    /// Assertions:
    /// - A token inside the margin is refreshed without any caller.
    /// - The loop stops when cancelled.
    #[tokio::test(start_paused = true)]
    async fn test_run_refreshes_proactively_and_stops_on_cancel() {
        let endpoint = Arc::new(MockTokenEndpoint::new());
        endpoint.push_refresh(Ok(token_response("a1", None, 3600)));
        let (manager, _) = manager_with(Arc::clone(&endpoint));
        manager.install(token_set_expiring_in("a0", "r0", 30)).await.expect("install");

        let scheduler = Arc::new(RefreshScheduler::new(manager.clone(), fast_policy(), Duration::ZERO));
        let cancel = CancellationToken::new();
        let handle = tokio::spawn({
            let scheduler = Arc::clone(&scheduler);
            let cancel = cancel.clone();
            async move { scheduler.run(cancel).await }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(endpoint.refresh_calls(), 1);
        assert_eq!(manager.token_set().expect("tokens").access_token, "a1");

        cancel.cancel();
        handle.await.expect("scheduler exits");
    }
}
