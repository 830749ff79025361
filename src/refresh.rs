//! # Refresh Sweeper
//!
//! Background task that periodically scans configured pairs and refreshes
//! tokens nearing expiry, so callers keep finding a live access token
//! without ever driving the refresh themselves.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use metrics::{counter, histogram};
use rand::Rng;
use tokio::sync::Mutex;
use tokio::time::{Duration as TokioDuration, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::AppConfig;
use crate::error::IntegrationError;
use crate::metrics::MetricsLedger;
use crate::models::IntegrationConfig;
use crate::providers::{ExchangeError, ExchangerRegistry};
use crate::repositories::token::NewToken;
use crate::repositories::{ConfigRepository, TokenStore};

/// What happened to one pair during a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Refreshed,
    /// The pair holds no refresh token; nothing to do until it reconnects.
    NoRefreshToken,
}

/// Outcome counters for one sweep pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepStats {
    pub pairs_scanned: u64,
    pub refreshes_attempted: u64,
    pub refreshes_succeeded: u64,
    pub refreshes_failed: u64,
    pub pairs_skipped: u64,
}

pub struct RefreshSweeper {
    config: Arc<AppConfig>,
    configs: Arc<ConfigRepository>,
    tokens: Arc<TokenStore>,
    exchangers: Arc<ExchangerRegistry>,
    ledger: Arc<MetricsLedger>,
    // Single-flight guard: a tick that would overlap a still-running sweep
    // is skipped rather than queued.
    sweep_lock: Mutex<()>,
}

impl RefreshSweeper {
    pub fn new(
        config: Arc<AppConfig>,
        configs: Arc<ConfigRepository>,
        tokens: Arc<TokenStore>,
        exchangers: Arc<ExchangerRegistry>,
        ledger: Arc<MetricsLedger>,
    ) -> Self {
        Self {
            config,
            configs,
            tokens,
            exchangers,
            ledger,
            sweep_lock: Mutex::new(()),
        }
    }

    /// Run the sweep loop until the shutdown token fires.
    #[instrument(skip_all)]
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            tick_seconds = self.config.token_refresh.tick_seconds,
            lead_time_seconds = self.config.token_refresh.lead_time_seconds,
            "starting refresh sweeper"
        );
        let tick_interval = TokioDuration::from_secs(self.config.token_refresh.tick_seconds);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("refresh sweeper shutdown requested");
                    break;
                }
                _ = sleep(tick_interval) => {
                    let tick_started = std::time::Instant::now();
                    self.tick().await;
                    histogram!("token_refresh_tick_duration_ms")
                        .record(tick_started.elapsed().as_secs_f64() * 1_000.0);
                }
            }
        }

        info!("refresh sweeper stopped");
    }

    /// Execute one sweep pass. Overlapping calls collapse: if a sweep is
    /// already in progress this returns `None` without scanning.
    #[instrument(skip_all)]
    pub async fn tick(&self) -> Option<SweepStats> {
        let Ok(_guard) = self.sweep_lock.try_lock() else {
            warn!("previous sweep still running, skipping tick");
            counter!("token_refresh_ticks_skipped_total").increment(1);
            return None;
        };

        let stats = self.sweep(Utc::now()).await;

        counter!("token_refresh_attempts_total").increment(stats.refreshes_attempted);
        debug!(
            pairs_scanned = stats.pairs_scanned,
            refreshes_attempted = stats.refreshes_attempted,
            refreshes_succeeded = stats.refreshes_succeeded,
            refreshes_failed = stats.refreshes_failed,
            pairs_skipped = stats.pairs_skipped,
            "refresh sweep completed"
        );
        Some(stats)
    }

    /// Scan every configured pair and refresh the ones due. One pair's
    /// failure never stops the rest of the sweep.
    pub async fn sweep(&self, now: DateTime<Utc>) -> SweepStats {
        let mut stats = SweepStats::default();

        for config in self.configs.list_all().await {
            stats.pairs_scanned += 1;
            let key = config.key();

            if !self.due_for_refresh(&config, now).await {
                stats.pairs_skipped += 1;
                continue;
            }

            self.apply_jitter().await;

            match self.refresh_pair(&config).await {
                Ok(RefreshOutcome::Refreshed) => {
                    stats.refreshes_attempted += 1;
                    stats.refreshes_succeeded += 1;
                    self.ledger.record_refresh(&key, true);
                    info!(pair = %key, "refreshed token");
                }
                Ok(RefreshOutcome::NoRefreshToken) => {
                    stats.pairs_skipped += 1;
                }
                Err(e) => {
                    stats.refreshes_attempted += 1;
                    stats.refreshes_failed += 1;
                    self.ledger.record_refresh(&key, false);
                    warn!(pair = %key, error = %e, "token refresh failed");
                }
            }
        }

        stats
    }

    /// A pair is due when its token carries an expiry inside the lookahead
    /// window. Already-expired tokens are still due: the refresh grant may
    /// well revive them. Tokens without an expiry never come due.
    async fn due_for_refresh(&self, config: &IntegrationConfig, now: DateTime<Utc>) -> bool {
        let cutoff =
            now + Duration::seconds(self.config.token_refresh.lead_time_seconds as i64);
        self.tokens
            .expires_at(&config.tenant_id, config.provider)
            .await
            .is_some_and(|expires_at| expires_at <= cutoff)
    }

    /// Refresh one pair's token via its provider's refresh grant and store
    /// the result. When the provider rotates the refresh token, the rotated
    /// one is persisted; otherwise the old one is carried forward.
    pub async fn refresh_pair(
        &self,
        config: &IntegrationConfig,
    ) -> Result<RefreshOutcome, IntegrationError> {
        let key = config.key();
        let Some(refresh_token) = self
            .tokens
            .refresh_token(&config.tenant_id, config.provider)
            .await?
        else {
            // Nothing to refresh with; the pair will surface as disconnected
            // once the access token lapses.
            debug!(pair = %key, "no refresh token on record, skipping");
            return Ok(RefreshOutcome::NoRefreshToken);
        };

        let exchanger = self.exchangers.get(config.provider)?;
        let grant = match exchanger.refresh_token(config, &refresh_token).await {
            Ok(grant) => grant,
            Err(ExchangeError::Unsupported(provider)) => {
                return Err(IntegrationError::Unsupported(provider));
            }
            Err(e) => return Err(e.into()),
        };

        let rotated = grant.refresh_token.as_deref().unwrap_or(&refresh_token);
        let scopes = grant.scope.or_else(|| config.scopes.clone());

        self.tokens
            .store_token(
                &config.tenant_id,
                config.provider,
                NewToken {
                    access_token: &grant.access_token,
                    refresh_token: Some(rotated),
                    token_type: &grant.token_type,
                    expires_at: grant.expires_at,
                    scopes: scopes.as_deref(),
                },
            )
            .await?;
        Ok(RefreshOutcome::Refreshed)
    }

    async fn apply_jitter(&self) {
        let jitter_factor = self.config.token_refresh.jitter_factor;
        if jitter_factor <= 0.0 {
            return;
        }
        let max_delay_ms =
            (self.config.token_refresh.tick_seconds as f64 * jitter_factor * 1_000.0) as u64;
        if max_delay_ms == 0 {
            return;
        }
        let delay_ms = rand::thread_rng().gen_range(0..=max_delay_ms);
        debug!(delay_ms, "applying jitter before token refresh");
        sleep(TokioDuration::from_millis(delay_ms)).await;
    }
}
