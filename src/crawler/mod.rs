//! Crawler module for fetching and processing catalog pages
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching with transport-level retry
//! - Request admission, rate limiting and backoff
//! - Overall run orchestration

mod backoff;
mod fetcher;
mod orchestrator;
mod scheduler;

pub use backoff::RetryPolicy;
pub use fetcher::{
    build_http_client, classify_status, parse_retry_after, FetchError, FetchOutcome, FetchedPage,
    HttpFetcher, PageFetcher,
};
pub use orchestrator::{crawl, ItemFailure, Orchestrator, RunSummary};
pub use scheduler::{CrawlTarget, Scheduler, DETAIL_PRIORITY, LISTING_PRIORITY, POLICY_PRIORITY};
