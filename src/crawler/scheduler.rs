//! Scheduler for admitting fetches under the crawl's politeness limits
//!
//! This module handles:
//! - Global concurrency limiting via a semaphore
//! - The shared request quota window
//! - Minimum spacing between requests, with robots.txt crawl delays taking
//!   precedence per host when they are larger
//! - Retrying transient failures with exponential backoff
//! - Cooperative cancellation and draining

use crate::config::Config;
use crate::crawler::backoff::RetryPolicy;
use crate::crawler::fetcher::{FetchError, FetchOutcome, FetchedPage, PageFetcher};
use crate::state::QuotaWindow;
use crate::storage::TargetKind;
use crate::url::extract_host;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Priority given to listing pages (lower is more urgent)
pub const LISTING_PRIORITY: u32 = 0;

/// Priority given to detail pages
pub const DETAIL_PRIORITY: u32 = 10;

/// Priority given to robots.txt documents
pub const POLICY_PRIORITY: u32 = 0;

/// A URL waiting to be fetched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlTarget {
    pub url: Url,
    pub kind: TargetKind,

    /// Lower is more urgent
    pub priority: u32,

    /// Attempts made so far by the scheduler
    pub attempt: u32,

    /// HTTP status of the most recent attempt
    pub last_status: Option<u16>,

    /// Overrides the configured retry budget
    pub max_retries: Option<u32>,

    /// Deduplication key; empty for listing pages
    pub canonical_id: String,
}

impl CrawlTarget {
    pub fn listing(url: Url) -> Self {
        Self {
            url,
            kind: TargetKind::Listing,
            priority: LISTING_PRIORITY,
            attempt: 0,
            last_status: None,
            max_retries: None,
            canonical_id: String::new(),
        }
    }

    pub fn detail(url: Url, canonical_id: String) -> Self {
        Self {
            url,
            kind: TargetKind::Detail,
            priority: DETAIL_PRIORITY,
            attempt: 0,
            last_status: None,
            max_retries: None,
            canonical_id,
        }
    }

    /// A robots.txt request: a single attempt, failures fall back to allow-all
    pub fn policy(url: Url) -> Self {
        Self {
            url,
            kind: TargetKind::Policy,
            priority: POLICY_PRIORITY,
            attempt: 0,
            last_status: None,
            max_retries: Some(0),
            canonical_id: String::new(),
        }
    }
}

/// Admission bookkeeping, only touched under the scheduler's lock
#[derive(Debug)]
struct AdmissionState {
    quota: QuotaWindow,
    last_admitted: Option<Instant>,
    last_by_host: HashMap<String, Instant>,
}

/// Scheduler owns every shared rate limit of a run
///
/// The scheduler coordinates:
/// - Global concurrency limits (a slot is held for one fetch attempt only)
/// - The quota window (admissions block at capacity, nothing is dropped)
/// - Spacing between admissions
/// - The retry loop for transient failures
pub struct Scheduler {
    fetcher: Arc<dyn PageFetcher>,

    /// Global semaphore for limiting concurrent fetches
    slots: Arc<Semaphore>,
    concurrency_limit: u32,

    min_spacing: Duration,
    retry: RetryPolicy,
    state: Mutex<AdmissionState>,
    cancel: CancellationToken,
    total_fetches: AtomicU64,
}

impl Scheduler {
    /// Creates a new scheduler
    ///
    /// # Arguments
    ///
    /// * `fetcher` - The fetch layer every admitted request goes through
    /// * `config` - Concurrency, spacing, quota and retry settings
    /// * `cancel` - Token that stops new admissions when triggered
    pub fn new(fetcher: Arc<dyn PageFetcher>, config: &Config, cancel: CancellationToken) -> Self {
        let concurrency_limit = config.crawler.concurrency_limit.max(1);

        Self {
            fetcher,
            slots: Arc::new(Semaphore::new(concurrency_limit as usize)),
            concurrency_limit,
            min_spacing: Duration::from_millis(config.crawler.min_spacing_ms),
            retry: RetryPolicy::from_config(&config.retry),
            state: Mutex::new(AdmissionState {
                quota: QuotaWindow::new(
                    config.quota.window(),
                    config.quota.capacity,
                    Instant::now(),
                ),
                last_admitted: None,
                last_by_host: HashMap::new(),
            }),
            cancel,
            total_fetches: AtomicU64::new(0),
        }
    }

    /// Fetches a target under the politeness limits, retrying transient failures
    ///
    /// `host_delay` is the robots.txt crawl delay for the target's host; it
    /// replaces the global spacing for that host when it is larger.
    ///
    /// # Returns
    ///
    /// * `Ok(FetchedPage)` - The raw content
    /// * `Err(FetchError::Terminal)` - Non-retryable response, not retried
    /// * `Err(FetchError::RetriesExhausted)` - Every allowed attempt was transient
    /// * `Err(FetchError::Cancelled)` - The run was cancelled while waiting for
    ///   admission or backoff; carries the attempts already made
    pub async fn admit(
        &self,
        target: &mut CrawlTarget,
        host_delay: Option<Duration>,
    ) -> Result<FetchedPage, FetchError> {
        let host = extract_host(&target.url).unwrap_or_default();
        let max_retries = target.max_retries.unwrap_or(self.retry.max_retries);

        loop {
            let outcome = {
                let _slot = self.acquire_slot(target).await?;
                self.wait_for_turn(target, &host, host_delay).await?;

                target.attempt += 1;
                self.total_fetches.fetch_add(1, Ordering::SeqCst);
                tracing::debug!(
                    url = %target.url,
                    kind = target.kind.to_db_string(),
                    priority = target.priority,
                    attempt = target.attempt,
                    "Fetching"
                );

                self.fetcher.fetch(&target.url).await
            };

            match outcome {
                FetchOutcome::Success(page) => {
                    target.last_status = Some(page.status_code);
                    return Ok(page);
                }

                FetchOutcome::Terminal { status_code, error } => {
                    target.last_status = Some(status_code).filter(|code| *code > 0);
                    return Err(FetchError::Terminal {
                        url: target.url.to_string(),
                        status_code,
                        message: error,
                    });
                }

                FetchOutcome::Transient {
                    status_code,
                    retry_after,
                    error,
                } => {
                    target.last_status = status_code;
                    let failed_attempt = target.attempt - 1;
                    if failed_attempt >= max_retries {
                        return Err(FetchError::RetriesExhausted {
                            url: target.url.to_string(),
                            attempts: target.attempt,
                            status_code,
                            message: error,
                        });
                    }

                    let delay = self.retry.delay(failed_attempt, retry_after);
                    tracing::warn!(
                        url = %target.url,
                        attempt = target.attempt,
                        max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Transient fetch failure, backing off"
                    );

                    tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => return Err(self.cancelled(target)),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    /// Waits until every in-flight fetch has released its slot
    pub async fn drain(&self) {
        if let Ok(all) = self.slots.acquire_many(self.concurrency_limit).await {
            drop(all);
        }
    }

    /// Stops new admissions; in-flight fetches run to completion
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Fetch-layer calls made so far, retries included
    pub fn total_fetches(&self) -> u64 {
        self.total_fetches.load(Ordering::SeqCst)
    }

    /// Free concurrency slots
    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }

    async fn acquire_slot(
        &self,
        target: &CrawlTarget,
    ) -> Result<tokio::sync::SemaphorePermit<'_>, FetchError> {
        if self.cancel.is_cancelled() {
            return Err(self.cancelled(target));
        }

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(self.cancelled(target)),
            permit = self.slots.acquire() => permit.map_err(|_| self.cancelled(target)),
        }
    }

    /// Blocks until quota and spacing allow another request, then records it
    async fn wait_for_turn(
        &self,
        target: &CrawlTarget,
        host: &str,
        host_delay: Option<Duration>,
    ) -> Result<(), FetchError> {
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                let now = Instant::now();

                let quota_wait = state.quota.time_until_capacity(now).unwrap_or_default();

                let spacing_wait = state
                    .last_admitted
                    .map(|last| (last + self.min_spacing).saturating_duration_since(now))
                    .unwrap_or_default();

                let host_wait = match host_delay {
                    Some(delay) if delay > self.min_spacing => state
                        .last_by_host
                        .get(host)
                        .map(|last| (*last + delay).saturating_duration_since(now))
                        .unwrap_or_default(),
                    _ => Duration::ZERO,
                };

                let wait = quota_wait.max(spacing_wait).max(host_wait);
                if wait.is_zero() {
                    state.quota.record_admission(now);
                    state.last_admitted = Some(now);
                    state.last_by_host.insert(host.to_string(), now);
                    return Ok(());
                }

                if !quota_wait.is_zero() && quota_wait == wait {
                    tracing::info!(
                        wait_ms = wait.as_millis() as u64,
                        "Request quota exhausted, waiting for the next window"
                    );
                }
                wait
            };

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(self.cancelled(target)),
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }

    fn cancelled(&self, target: &CrawlTarget) -> FetchError {
        FetchError::Cancelled {
            url: target.url.to_string(),
            attempts: target.attempt,
            status_code: target.last_status,
        }
    }
}
