use crate::assemble::{link_key, merge, Assembler, SourceBatch};
use crate::config::Config;
use crate::error::{FetchError, Result, ScraperError};
use crate::extract::{extractor_for, Extractor};
use crate::fetch::{Limits, PageFetcher, RateLimiter, Renderer, StaticFetcher, WebDriverBrowser};
use crate::normalize::DateTimeNormalizer;
use crate::storage::{stores_for, EventStore};
use crate::types::{RunResult, SourceDescriptor, SourceKind};
use chrono::Utc;
use metrics::{counter, histogram};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

/// Runs every configured source once and merges what they produced.
///
/// Each source gets its own worker task; a failure inside one worker is
/// recorded on that source's report and never reaches the others.
pub struct Orchestrator {
    sources: Vec<SourceDescriptor>,
    fetcher: Arc<dyn PageFetcher>,
    renderer: Option<Arc<dyn Renderer>>,
    limits: Limits,
    normalizer: DateTimeNormalizer,
    timeout: Option<Duration>,
}

impl Orchestrator {
    pub fn new(
        sources: Vec<SourceDescriptor>,
        fetcher: Arc<dyn PageFetcher>,
        renderer: Option<Arc<dyn Renderer>>,
    ) -> Self {
        Self {
            sources,
            fetcher,
            renderer,
            limits: Limits::default(),
            normalizer: DateTimeNormalizer::default(),
            timeout: None,
        }
    }

    /// Static client for every source, plus a WebDriver browser when any source renders.
    pub fn from_config(config: &Config) -> Result<Self> {
        let fetcher = Arc::new(StaticFetcher::new(&config.fetch)?);
        let renderer: Option<Arc<dyn Renderer>> = if config.sources.iter().any(|s| s.rendered) {
            Some(Arc::new(WebDriverBrowser::new(
                &config.browser,
                &config.fetch.user_agent,
            )?))
        } else {
            None
        };

        Ok(Self::new(config.sources.clone(), fetcher, renderer)
            .with_limits(Limits {
                requests_per_min: config.fetch.requests_per_min,
                concurrency: Some(config.fetch.detail_concurrency),
            })
            .with_timeout(config.run.timeout_secs.map(Duration::from_secs)))
    }

    /// Per-source request limits; each source gets its own buckets.
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_normalizer(mut self, normalizer: DateTimeNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn sources(&self) -> &[SourceDescriptor] {
        &self.sources
    }

    /// One pass over all sources, bounded by the configured run timeout.
    pub async fn run(&self) -> RunResult {
        match self.timeout {
            Some(limit) => {
                self.run_until(async move {
                    tokio::time::sleep(limit).await;
                    warn!("⏰ Run timeout of {:?} reached", limit);
                })
                .await
            }
            None => self.run_until(std::future::pending::<()>()).await,
        }
    }

    /// One pass over all sources. When `shutdown` completes first, unfinished
    /// workers are told to stop, release what they hold (browser sessions are
    /// closed) and report as cancelled; finished sources keep their events.
    /// Returns only after every worker has wound down.
    pub async fn run_until<F>(&self, shutdown: F) -> RunResult
    where
        F: Future<Output = ()>,
    {
        info!("🚀 Starting run over {} sources", self.sources.len());
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let mut workers = JoinSet::new();
        for (index, descriptor) in self.sources.iter().cloned().enumerate() {
            let worker = SourceWorker {
                descriptor,
                fetcher: self.fetcher.clone(),
                renderer: self.renderer.clone(),
                limiter: RateLimiter::new(self.limits.clone()),
                normalizer: self.normalizer.clone(),
                cancel: cancel_rx.clone(),
            };
            workers.spawn(async move { (index, worker.run().await) });
        }

        let mut batches: Vec<Option<SourceBatch>> = vec![None; self.sources.len()];
        let mut shutdown_fired = false;
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                biased;
                joined = workers.join_next() => match joined {
                    Some(Ok((index, batch))) => batches[index] = Some(batch),
                    Some(Err(e)) => error!("Source worker ended abnormally: {}", e),
                    None => break,
                },
                _ = &mut shutdown, if !shutdown_fired => {
                    warn!("Run cancelled with {} sources unfinished", workers.len());
                    shutdown_fired = true;
                    // Errs only once every worker has already returned.
                    let _ = cancel_tx.send(true);
                }
            }
        }

        let batches = batches
            .into_iter()
            .zip(&self.sources)
            .map(|(batch, descriptor)| match batch {
                Some(batch) => batch,
                None => SourceBatch::failed(descriptor, "worker ended abnormally"),
            })
            .collect();

        finalize(batches)
    }
}

fn finalize(batches: Vec<SourceBatch>) -> RunResult {
    let result = merge(batches, Utc::now());
    for report in &result.sources {
        if !report.skipped.is_empty() {
            info!("Source {} skipped {} items", report.name, report.skipped.len());
        }
    }
    let failed = result.failed_sources();
    if !failed.is_empty() {
        warn!("Sources without output this run: {:?}", failed);
    }
    info!("✅ {}", result.summary_line());
    result
}

/// Why a source stopped before finishing its pass
enum Halt {
    Failed(FetchError),
    Cancelled,
}

impl From<FetchError> for Halt {
    fn from(e: FetchError) -> Self {
        Halt::Failed(e)
    }
}

/// Resolves once the run asks its workers to stop.
async fn cancellation(mut cancel: watch::Receiver<bool>) {
    // A dropped sender means the orchestrator is gone, which is a stop as well.
    let _ = cancel.wait_for(|stop| *stop).await;
}

/// Everything one source needs, owned so it can move into its own task.
struct SourceWorker {
    descriptor: SourceDescriptor,
    fetcher: Arc<dyn PageFetcher>,
    renderer: Option<Arc<dyn Renderer>>,
    limiter: RateLimiter,
    normalizer: DateTimeNormalizer,
    cancel: watch::Receiver<bool>,
}

impl SourceWorker {
    #[instrument(skip(self), fields(source = %self.descriptor.name, kind = %self.descriptor.kind))]
    async fn run(self) -> SourceBatch {
        let name = self.descriptor.name.clone();
        let descriptor = self.descriptor.clone();
        let started = Instant::now();

        let batch = match self.collect().await {
            Ok(batch) => batch,
            Err(Halt::Failed(e)) => {
                error!("❌ Source {} failed: {}", name, e);
                counter!("campus_sources_failed_total", "source" => name.clone()).increment(1);
                SourceBatch::failed(&descriptor, e.to_string())
            }
            Err(Halt::Cancelled) => {
                warn!("⏹ Source {} cancelled", name);
                SourceBatch::cancelled(&descriptor)
            }
        };

        histogram!("campus_source_duration_seconds", "source" => name.clone())
            .record(started.elapsed().as_secs_f64());
        counter!("campus_events_extracted_total", "source" => name.clone())
            .increment(batch.events.len() as u64);
        counter!("campus_events_skipped_total", "source" => name.clone())
            .increment(batch.skipped.len() as u64);
        info!(
            "Source {} finished: {} events, {} skipped",
            name,
            batch.events.len(),
            batch.skipped.len()
        );
        batch
    }

    async fn collect(self) -> std::result::Result<SourceBatch, Halt> {
        let extractor = extractor_for(self.descriptor.kind);
        let mut assembler = Assembler::new(self.descriptor.clone(), self.normalizer.clone());

        if !extractor.follows_links() {
            self.collect_pages(extractor.as_ref(), &mut assembler).await?;
        } else {
            let links = self.collect_links(extractor.as_ref(), &mut assembler).await?;
            if self.descriptor.rendered {
                self.render_details(extractor.as_ref(), &mut assembler, links).await?;
            } else {
                self.fetch_details(extractor.as_ref(), &mut assembler, links).await?;
            }
        }
        Ok(assembler.finish())
    }

    /// Awaits `work` unless the run is cancelled first. Only for futures that
    /// hold nothing needing an explicit release.
    async fn interruptible<T>(&self, work: impl Future<Output = T>) -> std::result::Result<T, Halt> {
        tokio::select! {
            biased;
            _ = cancellation(self.cancel.clone()) => Err(Halt::Cancelled),
            out = work => Ok(out),
        }
    }

    /// Fetches a configured page under the source's rate limit.
    async fn fetch_page(
        &self,
        url: &str,
    ) -> std::result::Result<std::result::Result<String, FetchError>, Halt> {
        self.interruptible(async {
            let _permit = self.limiter.acquire().await;
            self.fetcher.fetch(url).await
        })
        .await
    }

    /// Sources whose configured pages carry the items themselves.
    async fn collect_pages(
        &self,
        extractor: &dyn Extractor,
        assembler: &mut Assembler,
    ) -> std::result::Result<(), Halt> {
        let mut last_error = None;
        let mut reached = 0;
        for url in &self.descriptor.urls {
            match self.fetch_page(url).await? {
                Ok(html) => {
                    reached += 1;
                    extract_into(extractor, assembler, &html, url);
                }
                Err(e) => {
                    warn!("Page {} unavailable: {}", url, e);
                    assembler.record_skip(e.to_string());
                    last_error = Some(e);
                }
            }
        }
        Ok(all_unreachable(reached, last_error)?)
    }

    /// Reads every listing page and returns the detail links not seen before,
    /// in listing order.
    async fn collect_links(
        &self,
        extractor: &dyn Extractor,
        assembler: &mut Assembler,
    ) -> std::result::Result<Vec<String>, Halt> {
        let mut links = Vec::new();
        let mut seen = HashSet::new();
        let mut last_error = None;
        let mut reached = 0;

        for url in &self.descriptor.urls {
            let html = match self.fetch_page(url).await? {
                Ok(html) => html,
                Err(e) => {
                    warn!("Listing {} unavailable: {}", url, e);
                    assembler.record_skip(e.to_string());
                    last_error = Some(e);
                    continue;
                }
            };
            reached += 1;

            match extractor.listing_links(&html, url) {
                Ok(found) => {
                    for link in found {
                        if seen.insert(link_key(self.descriptor.kind, &link)) {
                            links.push(link);
                        } else {
                            debug!("Already queued {}", link);
                        }
                    }
                }
                Err(e) => {
                    warn!("Listing {} unreadable: {}", url, e);
                    assembler.record_skip(e.to_string());
                }
            }
        }

        all_unreachable(reached, last_error)?;
        info!("📋 {} detail pages queued", links.len());
        Ok(links)
    }

    /// Static detail pages are independent, so they are fetched concurrently
    /// within the rate limit and extracted in listing order.
    async fn fetch_details(
        &self,
        extractor: &dyn Extractor,
        assembler: &mut Assembler,
        links: Vec<String>,
    ) -> std::result::Result<(), Halt> {
        let mut pending = JoinSet::new();
        for (index, link) in links.into_iter().enumerate() {
            let fetcher = self.fetcher.clone();
            let limiter = self.limiter.clone();
            pending.spawn(async move {
                let _permit = limiter.acquire().await;
                let page = fetcher.fetch(&link).await;
                (index, link, page)
            });
        }

        let mut pages = Vec::with_capacity(pending.len());
        // Dropping `pending` on cancellation aborts the remaining fetches.
        while let Some(joined) = self.interruptible(pending.join_next()).await? {
            match joined {
                Ok(page) => pages.push(page),
                Err(e) => {
                    error!("Detail fetch task ended abnormally: {}", e);
                    assembler.record_skip(e.to_string());
                }
            }
        }
        pages.sort_by_key(|(index, _, _)| *index);

        for (_, link, page) in pages {
            match page {
                Ok(html) => extract_into(extractor, assembler, &html, &link),
                Err(e) => {
                    warn!("Detail page skipped: {}", e);
                    assembler.record_skip(e.to_string());
                }
            }
        }
        Ok(())
    }

    /// Script-rendered detail pages share one browser session, which is
    /// closed before returning whatever happened to the individual pages,
    /// cancellation included.
    async fn render_details(
        &self,
        extractor: &dyn Extractor,
        assembler: &mut Assembler,
        links: Vec<String>,
    ) -> std::result::Result<(), Halt> {
        if links.is_empty() {
            return Ok(());
        }
        let renderer = self.renderer.as_ref().ok_or_else(|| FetchError::Browser {
            message: format!("source {} needs a browser but none is configured", self.descriptor.name),
        })?;

        let mut session = self.interruptible(renderer.open_session()).await??;
        let mut cancelled = false;
        for link in &links {
            let rendered = tokio::select! {
                biased;
                _ = cancellation(self.cancel.clone()) => None,
                page = session.render(link) => Some(page),
            };
            match rendered {
                Some(Ok(html)) => extract_into(extractor, assembler, &html, link),
                Some(Err(e)) => {
                    warn!("Rendered page skipped: {}", e);
                    assembler.record_skip(e.to_string());
                }
                None => {
                    cancelled = true;
                    break;
                }
            }
        }
        if let Err(e) = session.close().await {
            warn!("Browser session did not close cleanly: {}", e);
        }
        if cancelled {
            return Err(Halt::Cancelled);
        }
        Ok(())
    }
}

fn extract_into(extractor: &dyn Extractor, assembler: &mut Assembler, html: &str, url: &str) {
    match extractor.extract(html, url) {
        Ok(extraction) => {
            for reason in extraction.skipped {
                assembler.record_skip(reason);
            }
            assembler.extend(extraction.bags);
        }
        Err(e) => {
            warn!("Extraction failed for {}: {}", url, e);
            assembler.record_skip(e.to_string());
        }
    }
}

/// A source fails as a whole only when none of its configured pages could be fetched.
fn all_unreachable(reached: usize, last_error: Option<FetchError>) -> std::result::Result<(), FetchError> {
    match (reached, last_error) {
        (0, Some(e)) => Err(e),
        _ => Ok(()),
    }
}

/// The parameterless "run now" entry: runs every configured source and hands
/// the result to the configured stores.
pub async fn run_now(config: &Config) -> Result<RunResult> {
    let orchestrator = Orchestrator::from_config(config)?;
    let result = orchestrator.run().await;

    let stores: Vec<Box<dyn EventStore>> = stores_for(&config.output)?;
    save_to_stores(&result, &stores).await?;
    Ok(result)
}

/// Hands the run to every store. A failing store is logged and the rest are
/// still tried; the save fails only when no store accepted the run.
pub async fn save_to_stores(run: &RunResult, stores: &[Box<dyn EventStore>]) -> Result<usize> {
    let mut saved = 0;
    let mut failures = Vec::new();
    for store in stores {
        match store.save(run).await {
            Ok(()) => {
                saved += 1;
                info!("💾 Saved run to {}", store.describe());
            }
            Err(e) => {
                error!("❌ Could not save run to {}: {}", store.describe(), e);
                failures.push(format!("{}: {}", store.describe(), e));
            }
        }
    }

    if saved == 0 && !failures.is_empty() {
        return Err(ScraperError::Storage {
            message: failures.join("; "),
        });
    }
    Ok(saved)
}

/// Extracts one saved page offline, without following links.
pub fn extract_saved_page(
    kind: SourceKind,
    html: &str,
    url: &str,
    normalizer: DateTimeNormalizer,
) -> Result<(crate::extract::Extraction, SourceBatch)> {
    let extractor = extractor_for(kind);
    let extraction = extractor.extract(html, url)?;
    let descriptor = SourceDescriptor {
        name: kind.to_string(),
        kind,
        urls: vec![url.to_string()],
        rendered: false,
        location: None,
        tag: None,
        host: None,
        home_team: None,
        show_hours: None,
    };
    let mut assembler = Assembler::new(descriptor, normalizer);
    assembler.extend(extraction.bags.clone());
    Ok((extraction, assembler.finish()))
}
