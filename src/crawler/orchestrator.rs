//! Crawl orchestration
//!
//! The [`Orchestrator`] drives one run through its phases:
//!
//! 1. Discovering: walk listing pages in order and collect item URLs
//! 2. Extracting: fetch, parse and persist every new item with bounded concurrency
//! 3. Draining: wait for in-flight fetches and flush the audit buffer
//! 4. Done: store the final counts
//!
//! Any per-item failure is converted into a ledger entry and an audit record
//! at the item boundary. Only a failure of the first listing page ends the run
//! in `Failed`.

use crate::config::Config;
use crate::crawler::fetcher::{FetchError, HttpFetcher, PageFetcher};
use crate::crawler::scheduler::{CrawlTarget, Scheduler};
use crate::extract::{ExtractionError, Extractor, SelectorExtractor, SelectorStrategy};
use crate::robots::AccessPolicy;
use crate::state::{ItemLedger, RunPhase, SkipReason};
use crate::storage::{
    open_storage, AuditOutcome, CrawlAuditRecord, RunCounts, Storage, StorageError, TargetKind,
};
use crate::url::{canonical_id, extract_host, listing_page_url};
use crate::{ConfigError, CrawlError};
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Audit records buffered before a batch write
const AUDIT_BATCH_SIZE: usize = 32;

/// Why a single listing page or item could not be completed
#[derive(Debug, Error)]
pub enum ItemFailure {
    #[error("Disallowed by robots.txt")]
    PolicyDenied,

    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Persistence failed: {0}")]
    Persistence(#[from] StorageError),
}

impl ItemFailure {
    fn is_cancelled(&self) -> bool {
        matches!(self, Self::Fetch(err) if err.is_cancelled())
    }

    /// Cancelled before any request went out, so there is nothing to audit
    fn is_cancelled_unattempted(&self) -> bool {
        matches!(self, Self::Fetch(err) if err.is_cancelled_unattempted())
    }
}

/// Counts reported when a run ends
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub run_id: i64,
    pub phase: RunPhase,

    /// Distinct items found during discovery
    pub discovered: usize,
    pub processed: usize,
    pub failed: usize,
    pub skipped_existing: usize,
    pub skipped_policy: usize,

    /// Items never requested because the run was cancelled
    pub cancelled_items: usize,

    /// Listing pages fetched successfully
    pub listing_pages: u32,

    /// Fetch-layer calls, retries included
    pub total_fetches: u64,

    pub cancelled: bool,
    pub duration: Duration,
}

impl RunSummary {
    /// Totals as stored on the run row
    pub fn counts(&self) -> RunCounts {
        RunCounts {
            processed: self.processed as u64,
            failed: self.failed as u64,
            skipped: (self.skipped_existing + self.skipped_policy) as u64,
            total_fetches: self.total_fetches,
        }
    }
}

/// An item URL collected during discovery
#[derive(Debug, Clone)]
struct DiscoveredItem {
    url: Url,
    canonical_id: String,
}

/// What happened to one item, handed back to the orchestrator
struct ItemReport {
    item: DiscoveredItem,
    http_status: Option<u16>,
    result: Result<(), ItemFailure>,
    duration: Duration,
}

/// The part of the orchestrator that runs concurrently, once per item
#[derive(Clone)]
struct ItemWorker {
    storage: Arc<dyn Storage>,
    extractor: Arc<dyn Extractor>,
    scheduler: Arc<Scheduler>,
    policy: Arc<AccessPolicy>,
    run_id: i64,
}

impl ItemWorker {
    async fn process(self, item: DiscoveredItem) -> ItemReport {
        let started = Instant::now();
        let mut http_status = None;
        let result = self.fetch_and_store(&item, &mut http_status).await;

        ItemReport {
            item,
            http_status,
            result,
            duration: started.elapsed(),
        }
    }

    async fn fetch_and_store(
        &self,
        item: &DiscoveredItem,
        http_status: &mut Option<u16>,
    ) -> Result<(), ItemFailure> {
        if self.scheduler.is_cancelled() {
            return Err(ItemFailure::Fetch(FetchError::Cancelled {
                url: item.url.to_string(),
                attempts: 0,
                status_code: None,
            }));
        }

        if !self.policy.is_allowed(&item.url).await {
            return Err(ItemFailure::PolicyDenied);
        }

        let host_delay = host_delay(&self.policy, &item.url).await;
        let mut target = CrawlTarget::detail(item.url.clone(), item.canonical_id.clone());

        let page = match self.scheduler.admit(&mut target, host_delay).await {
            Ok(page) => page,
            Err(err) => {
                *http_status = err.status_code();
                return Err(err.into());
            }
        };
        *http_status = Some(page.status_code);

        let record = self.extractor.parse_detail(&page.body, &item.url)?;
        self.storage.save(&record, self.run_id)?;

        tracing::debug!(
            canonical_id = %record.canonical_id,
            fields = record.fields.len(),
            attempts = target.attempt,
            "Item stored"
        );
        Ok(())
    }
}

async fn host_delay(policy: &AccessPolicy, url: &Url) -> Option<Duration> {
    match extract_host(url) {
        Some(host) => policy.crawl_delay_for(&host).await,
        None => None,
    }
}

/// Drives a single crawl run
///
/// The orchestrator owns the run phase, the item ledger and the audit buffer.
/// Rate limits and retries live in the [`Scheduler`]; robots.txt decisions in
/// the [`AccessPolicy`].
pub struct Orchestrator {
    config: Config,
    run_id: i64,
    phase: RunPhase,

    storage: Arc<dyn Storage>,
    extractor: Arc<dyn Extractor>,
    scheduler: Arc<Scheduler>,
    policy: Arc<AccessPolicy>,

    ledger: ItemLedger,
    audit_buffer: Vec<CrawlAuditRecord>,

    discovered: usize,
    listing_pages: u32,
    cancelled_items: usize,
}

impl Orchestrator {
    /// Creates an orchestrator and records a new run in storage
    ///
    /// # Arguments
    ///
    /// * `config` - The crawler configuration
    /// * `config_hash` - Hash of the configuration file, stored on the run
    /// * `storage` - Persistence adapter
    /// * `extractor` - Listing and detail page parser
    /// * `scheduler` - Admission control for every page fetch
    /// * `policy` - robots.txt checker
    pub fn new(
        config: Config,
        config_hash: &str,
        storage: Arc<dyn Storage>,
        extractor: Arc<dyn Extractor>,
        scheduler: Arc<Scheduler>,
        policy: Arc<AccessPolicy>,
    ) -> Result<Self, CrawlError> {
        let run_id = storage.create_run(config_hash)?;
        tracing::info!(run_id, "Created crawl run");

        Ok(Self {
            config,
            run_id,
            phase: RunPhase::Idle,
            storage,
            extractor,
            scheduler,
            policy,
            ledger: ItemLedger::new(),
            audit_buffer: Vec::new(),
            discovered: 0,
            listing_pages: 0,
            cancelled_items: 0,
        })
    }

    pub fn run_id(&self) -> i64 {
        self.run_id
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    /// Runs the crawl to completion
    ///
    /// # Returns
    ///
    /// * `Ok(RunSummary)` - The run reached `Done`, possibly after cancellation
    /// * `Err(CrawlError::DiscoveryFailed)` - The first listing page failed; the
    ///   run is stored as `Failed`
    /// * `Err(CrawlError)` - Storage or state machine errors
    pub async fn run(&mut self) -> Result<RunSummary, CrawlError> {
        let started = Instant::now();
        tracing::info!(
            run_id = self.run_id,
            start_url = %self.config.crawler.start_url,
            max_pages = self.config.crawler.max_pages,
            "Starting crawl"
        );

        self.transition(RunPhase::Discovering)?;

        let items = match self.discover().await {
            Ok(items) => items,
            Err(err) => {
                tracing::error!(run_id = self.run_id, error = %err, "Discovery failed, aborting run");
                self.transition(RunPhase::Failed)?;
                self.flush_audit();

                let summary = self.summary(started.elapsed());
                if let Err(e) = self
                    .storage
                    .finish_run(self.run_id, RunPhase::Failed, &summary.counts())
                {
                    tracing::warn!(error = %e, "Failed to record failed run");
                }
                return Err(err);
            }
        };
        self.discovered = items.len();

        if self.scheduler.is_cancelled() {
            tracing::warn!(
                discovered = items.len(),
                "Run cancelled during discovery, skipping extraction"
            );
            self.cancelled_items += items.len();
        } else {
            self.transition(RunPhase::Extracting)?;
            self.extract(items).await;
        }

        self.transition(RunPhase::Draining)?;
        self.scheduler.drain().await;
        self.flush_audit();

        self.transition(RunPhase::Done)?;
        let summary = self.summary(started.elapsed());
        self.storage
            .finish_run(self.run_id, RunPhase::Done, &summary.counts())?;

        tracing::info!(
            run_id = self.run_id,
            processed = summary.processed,
            failed = summary.failed,
            skipped = summary.skipped_existing + summary.skipped_policy,
            total_fetches = summary.total_fetches,
            cancelled = summary.cancelled,
            "Crawl finished"
        );
        Ok(summary)
    }

    /// Walks listing pages in increasing order until one is empty or fails
    async fn discover(&mut self) -> Result<Vec<DiscoveredItem>, CrawlError> {
        let mut seen = HashSet::new();
        let mut items = Vec::new();

        for page in 1..=self.config.crawler.max_pages {
            if self.scheduler.is_cancelled() {
                break;
            }

            let url = listing_page_url(
                &self.config.crawler.start_url,
                &self.config.crawler.page_param,
                page,
            )?;

            let links = match self.fetch_listing(&url).await {
                Ok(links) => links,
                Err(failure) if failure.is_cancelled() => break,
                Err(failure) if page == 1 => {
                    return Err(CrawlError::DiscoveryFailed {
                        page,
                        source: failure,
                    });
                }
                Err(failure) => {
                    tracing::warn!(
                        page,
                        url = %url,
                        error = %failure,
                        kept = items.len(),
                        "Listing page failed, stopping discovery"
                    );
                    break;
                }
            };
            self.listing_pages += 1;

            if links.is_empty() {
                tracing::info!(page, "Listing page is empty, end of catalog");
                break;
            }

            let before = items.len();
            for link in links {
                match canonical_id(link.as_str()) {
                    Ok(id) => {
                        if seen.insert(id.clone()) {
                            items.push(DiscoveredItem {
                                url: link,
                                canonical_id: id,
                            });
                        }
                    }
                    Err(e) => tracing::debug!(url = %link, error = %e, "Ignoring item link"),
                }
            }

            tracing::info!(
                page,
                new_items = items.len() - before,
                total = items.len(),
                "Listing page parsed"
            );
        }

        Ok(items)
    }

    /// Fetches and parses one listing page, writing its audit record
    async fn fetch_listing(&mut self, url: &Url) -> Result<Vec<Url>, ItemFailure> {
        let started = Instant::now();
        let mut http_status = None;
        let result = self.fetch_listing_links(url, &mut http_status).await;

        if matches!(&result, Err(failure) if failure.is_cancelled_unattempted()) {
            return result;
        }
        let outcome = if result.is_ok() {
            AuditOutcome::Success
        } else {
            AuditOutcome::Failed
        };

        self.push_audit(CrawlAuditRecord {
            http_status,
            error_message: result.as_ref().err().map(ToString::to_string),
            items_extracted: result.as_ref().map_or(0, |links| links.len() as u32),
            duration_ms: started.elapsed().as_millis() as u64,
            ..CrawlAuditRecord::new(self.run_id, url.as_str(), TargetKind::Listing, outcome)
        });

        result
    }

    async fn fetch_listing_links(
        &self,
        url: &Url,
        http_status: &mut Option<u16>,
    ) -> Result<Vec<Url>, ItemFailure> {
        if !self.policy.is_allowed(url).await {
            return Err(ItemFailure::PolicyDenied);
        }

        let host_delay = host_delay(&self.policy, url).await;
        let mut target = CrawlTarget::listing(url.clone());

        let page = match self.scheduler.admit(&mut target, host_delay).await {
            Ok(page) => page,
            Err(err) => {
                *http_status = err.status_code();
                return Err(err.into());
            }
        };
        *http_status = Some(page.status_code);

        Ok(self.extractor.parse_listing(&page.body, &page.final_url)?)
    }

    /// Processes discovered items with bounded concurrency
    async fn extract(&mut self, items: Vec<DiscoveredItem>) {
        let mut pending = Vec::with_capacity(items.len());

        for item in items {
            if !self.ledger.claim(&item.canonical_id) {
                continue;
            }

            if self.config.crawler.skip_existing {
                match self.storage.exists(&item.canonical_id) {
                    Ok(true) => {
                        self.skip(&item, SkipReason::AlreadyStored, Duration::ZERO);
                        continue;
                    }
                    Ok(false) => {}
                    Err(e) => {
                        tracing::warn!(
                            canonical_id = %item.canonical_id,
                            error = %e,
                            "Existence check failed, fetching anyway"
                        );
                    }
                }
            }

            pending.push(item);
        }

        tracing::info!(
            to_fetch = pending.len(),
            skipped = self.ledger.skipped_count(SkipReason::AlreadyStored),
            "Extracting items"
        );

        let worker = ItemWorker {
            storage: self.storage.clone(),
            extractor: self.extractor.clone(),
            scheduler: self.scheduler.clone(),
            policy: self.policy.clone(),
            run_id: self.run_id,
        };
        let concurrency = self.config.crawler.concurrency_limit.max(1) as usize;

        let mut reports = stream::iter(pending)
            .map(|item| worker.clone().process(item))
            .buffer_unordered(concurrency);

        while let Some(report) = reports.next().await {
            self.record(report);
        }
    }

    /// Settles one item in the ledger and audits it
    fn record(&mut self, report: ItemReport) {
        let ItemReport {
            item,
            http_status,
            result,
            duration,
        } = report;

        match result {
            Ok(()) => {
                self.ledger.mark_processed(&item.canonical_id);
                self.push_audit(CrawlAuditRecord {
                    http_status,
                    items_extracted: 1,
                    duration_ms: duration.as_millis() as u64,
                    ..CrawlAuditRecord::new(
                        self.run_id,
                        item.url.as_str(),
                        TargetKind::Detail,
                        AuditOutcome::Success,
                    )
                });
            }

            Err(ItemFailure::PolicyDenied) => {
                self.skip(&item, SkipReason::PolicyDenied, duration);
            }

            Err(failure) if failure.is_cancelled_unattempted() => {
                self.ledger.release(&item.canonical_id);
                self.cancelled_items += 1;
            }

            Err(failure) => {
                tracing::warn!(url = %item.url, error = %failure, "Item failed");
                self.ledger.mark_failed(&item.canonical_id);
                self.push_audit(CrawlAuditRecord {
                    http_status,
                    error_message: Some(failure.to_string()),
                    duration_ms: duration.as_millis() as u64,
                    ..CrawlAuditRecord::new(
                        self.run_id,
                        item.url.as_str(),
                        TargetKind::Detail,
                        AuditOutcome::Failed,
                    )
                });
            }
        }
    }

    fn skip(&mut self, item: &DiscoveredItem, reason: SkipReason, duration: Duration) {
        tracing::debug!(url = %item.url, reason = %reason, "Skipping item");
        self.ledger.mark_skipped(&item.canonical_id, reason);
        self.push_audit(CrawlAuditRecord {
            error_message: Some(reason.to_string()),
            duration_ms: duration.as_millis() as u64,
            ..CrawlAuditRecord::new(
                self.run_id,
                item.url.as_str(),
                TargetKind::Detail,
                AuditOutcome::Skipped,
            )
        });
    }

    fn push_audit(&mut self, record: CrawlAuditRecord) {
        self.audit_buffer.push(record);
        if self.audit_buffer.len() >= AUDIT_BATCH_SIZE {
            self.flush_audit();
        }
    }

    /// Writes buffered audit records; failures are logged and dropped
    fn flush_audit(&mut self) {
        if self.audit_buffer.is_empty() {
            return;
        }

        if let Err(e) = self.storage.append_audit_batch(&self.audit_buffer) {
            tracing::warn!(
                records = self.audit_buffer.len(),
                error = %e,
                "Failed to write audit records"
            );
        }
        self.audit_buffer.clear();
    }

    fn transition(&mut self, next: RunPhase) -> Result<(), CrawlError> {
        if !self.phase.can_transition_to(next) {
            return Err(CrawlError::InvalidTransition {
                from: self.phase,
                to: next,
            });
        }

        tracing::info!(run_id = self.run_id, from = %self.phase, to = %next, "Run phase changed");
        self.phase = next;

        if !next.is_terminal() {
            self.storage.update_run_phase(self.run_id, next)?;
        }
        Ok(())
    }

    fn summary(&self, duration: Duration) -> RunSummary {
        RunSummary {
            run_id: self.run_id,
            phase: self.phase,
            discovered: self.discovered,
            processed: self.ledger.processed_count(),
            failed: self.ledger.failed_count(),
            skipped_existing: self.ledger.skipped_count(SkipReason::AlreadyStored),
            skipped_policy: self.ledger.skipped_count(SkipReason::PolicyDenied),
            cancelled_items: self.cancelled_items,
            listing_pages: self.listing_pages,
            total_fetches: self.scheduler.total_fetches(),
            cancelled: self.scheduler.is_cancelled(),
            duration,
        }
    }
}

/// Runs a complete crawl with the HTTP fetcher and SQLite storage
///
/// # Arguments
///
/// * `config` - The validated crawler configuration
/// * `config_hash` - Hash of the configuration file
/// * `cancel` - Cancelling this token stops new fetches; the run still drains
///
/// # Example
///
/// ```no_run
/// use catalog_crawler::config::load_config_with_hash;
/// use catalog_crawler::crawler::crawl;
/// use std::path::Path;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let (config, hash) = load_config_with_hash(Path::new("config.toml"))?;
/// let summary = crawl(config, &hash, CancellationToken::new()).await?;
/// println!("processed {}", summary.processed);
/// # Ok(())
/// # }
/// ```
pub async fn crawl(
    config: Config,
    config_hash: &str,
    cancel: CancellationToken,
) -> Result<RunSummary, CrawlError> {
    let storage: Arc<dyn Storage> = Arc::new(open_storage(Path::new(
        &config.output.database_path,
    ))?);

    let strategy = SelectorStrategy::from_config(&config.extractor)
        .map_err(|e| ConfigError::Validation(e.to_string()))?;
    let extractor: Arc<dyn Extractor> = Arc::new(SelectorExtractor::new(strategy));

    let fetcher: Arc<dyn PageFetcher> =
        Arc::new(HttpFetcher::from_config(&config.user_agent, &config.fetch)?);
    let scheduler = Arc::new(Scheduler::new(fetcher, &config, cancel));
    let policy = Arc::new(AccessPolicy::new(
        scheduler.clone(),
        config.user_agent.crawler_name.clone(),
        &config.access_policy,
        config.crawler.respect_access_policy,
    ));

    let mut orchestrator =
        Orchestrator::new(config, config_hash, storage, extractor, scheduler, policy)?;
    orchestrator.run().await
}
