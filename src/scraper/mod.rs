//! The enrichment crawl: coordinator, worker pool and per-vehicle pipeline.

mod adapter;
pub mod checkpoint;
mod filter;
pub mod monitor;
pub mod progress;

pub use adapter::AdvisorAdapter;
pub use filter::is_commercial_vehicle;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::matching::{normalize, MatchMethod};
use crate::models::{ErrorKind, NewOilSpecification, Vehicle};
use crate::parser::ParsedSpec;
use crate::repository::{FailureRepository, OilSpecRepository, VehicleRepository};

use checkpoint::CheckpointManager;
use monitor::{serve_monitor, KeyPoolStatusSource, MonitorState};
use progress::ProgressTracker;

/// Source tag written on every persisted specification.
const SOURCE_TAG: &str = "motul";

/// Year extraction bounds for the period string.
const YEAR_MIN: i32 = 1990;
const YEAR_MAX: i32 = 2030;

#[derive(Debug, Clone)]
pub struct ScraperConfig {
    pub workers: usize,
    /// Per-worker pacing; the advisor client's rate limiter is the hard
    /// ceiling, this ticker just spreads individual workers out.
    pub worker_interval: Duration,
    pub checkpoint_every: usize,
    pub checkpoint_path: PathBuf,
    pub resume_from_id: i32,
    pub dry_run: bool,
    pub monitor_port: u16,
    pub enable_monitor: bool,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            worker_interval: Duration::from_millis(2000),
            checkpoint_every: 50,
            checkpoint_path: PathBuf::from("scraper_checkpoint.json"),
            resume_from_id: 0,
            dry_run: false,
            monitor_port: 9090,
            enable_monitor: true,
        }
    }
}

/// Stream of local vehicles to enrich.
#[async_trait]
pub trait VehicleStore: Send + Sync {
    async fn get_all(&self) -> anyhow::Result<Vec<Vehicle>>;
}

/// Sink for normalized specifications.
#[async_trait]
pub trait SpecStore: Send + Sync {
    async fn insert(&self, spec: &NewOilSpecification) -> anyhow::Result<()>;
    async fn exists_for_vehicle(&self, vehicle_id: i32) -> anyhow::Result<bool>;
}

/// Retry bookkeeping for failed vehicles.
#[async_trait]
pub trait FailureStore: Send + Sync {
    async fn upsert(&self, vehicle_id: i32, kind: ErrorKind, message: &str) -> anyhow::Result<()>;
    async fn mark_resolved(&self, vehicle_id: i32) -> anyhow::Result<()>;
}

/// The advisor as seen by the pipeline: resolve a vehicle, then fetch its
/// parsed specifications.
#[async_trait]
pub trait OilAdvisor: Send + Sync {
    async fn search_vehicle(
        &self,
        brand: &str,
        model: &str,
        description: &str,
        year: i32,
    ) -> anyhow::Result<MatchedVehicle>;

    async fn get_specifications(&self, type_id: &str) -> anyhow::Result<Vec<ParsedSpec>>;
}

/// A resolved advisor vehicle type.
#[derive(Debug, Clone)]
pub struct MatchedVehicle {
    pub type_id: String,
    pub type_name: String,
    pub advisor_brand: String,
    pub advisor_model: String,
    pub confidence: f64,
    pub method: MatchMethod,
}

#[async_trait]
impl VehicleStore for VehicleRepository {
    async fn get_all(&self) -> anyhow::Result<Vec<Vehicle>> {
        Ok(VehicleRepository::get_all(self).await?)
    }
}

#[async_trait]
impl SpecStore for OilSpecRepository {
    async fn insert(&self, spec: &NewOilSpecification) -> anyhow::Result<()> {
        Ok(OilSpecRepository::insert(self, spec).await?)
    }

    async fn exists_for_vehicle(&self, vehicle_id: i32) -> anyhow::Result<bool> {
        Ok(OilSpecRepository::exists_for_vehicle(self, vehicle_id).await?)
    }
}

#[async_trait]
impl FailureStore for FailureRepository {
    async fn upsert(&self, vehicle_id: i32, kind: ErrorKind, message: &str) -> anyhow::Result<()> {
        Ok(FailureRepository::upsert(self, vehicle_id, kind, message).await?)
    }

    async fn mark_resolved(&self, vehicle_id: i32) -> anyhow::Result<()> {
        Ok(FailureRepository::mark_resolved(self, vehicle_id).await?)
    }
}

/// Final figures of one crawl run.
#[derive(Debug, Clone)]
pub struct ScrapeSummary {
    pub total: u64,
    pub processed: u64,
    pub success: u64,
    pub failed: u64,
    pub skipped: u64,
    pub exact_match: u64,
    pub fuzzy_match: u64,
    pub no_match: u64,
    pub cancelled: bool,
}

/// Orchestrates the crawl: feeds a bounded channel, runs the worker pool,
/// persists checkpoints and exposes live progress.
pub struct ScraperService {
    config: ScraperConfig,
    vehicles: Arc<dyn VehicleStore>,
    specs: Arc<dyn SpecStore>,
    failures: Arc<dyn FailureStore>,
    advisor: Arc<dyn OilAdvisor>,
    key_pool: Option<Arc<dyn KeyPoolStatusSource>>,
    cancel: CancellationToken,
}

impl ScraperService {
    pub fn new(
        config: ScraperConfig,
        vehicles: Arc<dyn VehicleStore>,
        specs: Arc<dyn SpecStore>,
        failures: Arc<dyn FailureStore>,
        advisor: Arc<dyn OilAdvisor>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            vehicles,
            specs,
            failures,
            advisor,
            key_pool: None,
            cancel,
        }
    }

    /// Attach a key-pool health source for the monitor's status payload.
    pub fn with_key_pool_status(mut self, source: Arc<dyn KeyPoolStatusSource>) -> Self {
        self.key_pool = Some(source);
        self
    }

    pub async fn run(&self) -> anyhow::Result<ScrapeSummary> {
        info!(
            workers = self.config.workers,
            dry_run = self.config.dry_run,
            "starting enrichment crawl"
        );

        let all_vehicles = self
            .vehicles
            .get_all()
            .await
            .context("failed to load vehicles")?;
        info!(count = all_vehicles.len(), "loaded vehicles");

        let checkpoint = CheckpointManager::new(&self.config.checkpoint_path);
        let start_index = self.start_index(&all_vehicles, &checkpoint);
        let to_process = &all_vehicles[start_index..];
        info!(
            total = all_vehicles.len(),
            to_process = to_process.len(),
            resumed_past = start_index,
            "crawl window determined"
        );

        let progress = Arc::new(ProgressTracker::new(to_process.len() as u64));

        if self.config.enable_monitor {
            let state = MonitorState {
                progress: progress.clone(),
                key_pool: self.key_pool.clone(),
            };
            tokio::spawn(serve_monitor(
                self.config.monitor_port,
                state,
                self.cancel.clone(),
            ));
        }

        let (tx, rx) = mpsc::channel::<(usize, Vehicle)>(self.config.workers * 2);
        let rx = Arc::new(Mutex::new(rx));
        let completion = Arc::new(CompletionLog::new());

        let mut workers = Vec::with_capacity(self.config.workers);
        for worker_id in 0..self.config.workers {
            let ctx = WorkerContext {
                worker_id,
                specs: self.specs.clone(),
                failures: self.failures.clone(),
                advisor: self.advisor.clone(),
                progress: progress.clone(),
                completion: completion.clone(),
                dry_run: self.config.dry_run,
                cancel: self.cancel.clone(),
            };
            let rx = rx.clone();
            let interval = self.config.worker_interval;
            workers.push(tokio::spawn(worker_loop(ctx, rx, interval)));
        }

        // Feed the bounded channel; the send blocks when workers fall
        // behind, which is the backpressure we want.
        let mut fed = 0usize;
        let mut cancelled = false;

        for (index, vehicle) in to_process.iter().enumerate() {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("cancellation requested, closing work channel");
                    cancelled = true;
                    break;
                }
                sent = tx.send((index, vehicle.clone())) => {
                    if sent.is_err() {
                        warn!("all workers exited early, stopping feed");
                        break;
                    }
                    fed += 1;
                    if fed % self.config.checkpoint_every == 0 {
                        self.save_checkpoint(&checkpoint, &completion, to_process, &progress);
                    }
                }
            }
        }

        drop(tx);
        for worker in workers {
            let _ = worker.await;
        }

        if fed > 0 {
            self.save_checkpoint(&checkpoint, &completion, to_process, &progress);
        }

        let snapshot = progress.snapshot();
        let summary = ScrapeSummary {
            total: snapshot.total,
            processed: snapshot.processed,
            success: snapshot.success,
            failed: snapshot.failed,
            skipped: snapshot.skipped,
            exact_match: snapshot.exact_match,
            fuzzy_match: snapshot.fuzzy_match,
            no_match: snapshot.no_match,
            cancelled,
        };

        info!(
            elapsed_secs = format!("{:.1}", snapshot.elapsed_secs),
            processed = summary.processed,
            success = summary.success,
            failed = summary.failed,
            skipped = summary.skipped,
            exact = summary.exact_match,
            fuzzy = summary.fuzzy_match,
            no_match = summary.no_match,
            requests = snapshot.total_requests,
            rps = format!("{:.2}", snapshot.requests_per_sec),
            cancelled,
            "crawl finished"
        );

        Ok(summary)
    }

    /// Persist the largest contiguous completed position. Anything past it
    /// is re-fed on resume; vehicles that already have specifications are
    /// skipped there, so replay stays idempotent.
    fn save_checkpoint(
        &self,
        checkpoint: &CheckpointManager,
        completion: &CompletionLog,
        window: &[Vehicle],
        progress: &ProgressTracker,
    ) {
        let watermark = completion.watermark();
        if watermark == 0 {
            return;
        }
        let last_id = window[watermark - 1].id;
        if let Err(e) = checkpoint.save(last_id, &progress.snapshot()) {
            warn!(error = %e, "failed to save checkpoint");
        } else {
            debug!(last_id, "checkpoint saved");
        }
    }

    /// Where to start in the id-ordered vehicle list: an explicit
    /// resume-from-id wins over the persisted checkpoint.
    fn start_index(&self, vehicles: &[Vehicle], checkpoint: &CheckpointManager) -> usize {
        if self.config.resume_from_id > 0 {
            let from = self.config.resume_from_id;
            info!(id = from, "resuming from explicit id");
            return vehicles
                .iter()
                .position(|v| v.id >= from)
                .unwrap_or(vehicles.len());
        }

        match checkpoint.load() {
            Ok(Some(cp)) => {
                info!(
                    last_id = cp.last_processed_id,
                    saved_at = %cp.saved_at,
                    "resuming from checkpoint"
                );
                match vehicles.iter().position(|v| v.id == cp.last_processed_id) {
                    Some(i) => i + 1,
                    None => 0,
                }
            }
            Ok(None) => 0,
            Err(e) => {
                warn!(error = %e, "failed to load checkpoint, starting fresh");
                0
            }
        }
    }
}

/// Tracks which fed positions have completed and the largest prefix of the
/// feed order that is fully done. Completion arrives out of order across
/// workers; the watermark only advances over contiguous positions.
struct CompletionLog {
    inner: std::sync::Mutex<CompletionInner>,
}

struct CompletionInner {
    watermark: usize,
    done: std::collections::BTreeSet<usize>,
}

impl CompletionLog {
    fn new() -> Self {
        Self {
            inner: std::sync::Mutex::new(CompletionInner {
                watermark: 0,
                done: std::collections::BTreeSet::new(),
            }),
        }
    }

    fn mark_done(&self, index: usize) {
        let mut guard = self.inner.lock().unwrap();
        let inner = &mut *guard;
        inner.done.insert(index);
        while inner.done.remove(&inner.watermark) {
            inner.watermark += 1;
        }
    }

    /// Number of positions completed without gaps from the start.
    fn watermark(&self) -> usize {
        self.inner.lock().unwrap().watermark
    }
}

#[derive(Clone)]
struct WorkerContext {
    worker_id: usize,
    specs: Arc<dyn SpecStore>,
    failures: Arc<dyn FailureStore>,
    advisor: Arc<dyn OilAdvisor>,
    progress: Arc<ProgressTracker>,
    completion: Arc<CompletionLog>,
    dry_run: bool,
    cancel: CancellationToken,
}

async fn worker_loop(
    ctx: WorkerContext,
    rx: Arc<Mutex<mpsc::Receiver<(usize, Vehicle)>>>,
    interval: Duration,
) {
    debug!(worker_id = ctx.worker_id, "worker started");

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        let item = {
            let mut rx = rx.lock().await;
            tokio::select! {
                _ = ctx.cancel.cancelled() => None,
                item = rx.recv() => item,
            }
        };
        let Some((index, vehicle)) = item else { break };

        ticker.tick().await;
        process_vehicle(&ctx, &vehicle).await;
        ctx.completion.mark_done(index);

        // Finish the current vehicle, then honor cancellation.
        if ctx.cancel.is_cancelled() {
            break;
        }
    }

    debug!(worker_id = ctx.worker_id, "worker finished");
}

/// The per-vehicle pipeline. Failures are recorded and counted; nothing
/// here ever aborts the run.
async fn process_vehicle(ctx: &WorkerContext, vehicle: &Vehicle) {
    ctx.progress.inc_processed();
    ctx.progress.set_current_vehicle(&vehicle.label());

    let Some((brand, model, year)) = parse_vehicle_description(vehicle) else {
        debug!(id = vehicle.id, "missing brand or model, skipping");
        ctx.progress.inc_skipped();
        return;
    };

    if is_commercial_vehicle(&brand, &model, &vehicle.description) {
        debug!(id = vehicle.id, brand, model, "commercial vehicle, skipping");
        ctx.progress.inc_skipped();
        return;
    }

    match ctx.specs.exists_for_vehicle(vehicle.id).await {
        Ok(true) => {
            debug!(id = vehicle.id, "specifications already present, skipping");
            ctx.progress.inc_skipped();
            return;
        }
        Ok(false) => {}
        Err(e) => {
            warn!(id = vehicle.id, error = %e, "failed to check existing specs");
        }
    }

    if ctx.dry_run {
        debug!(id = vehicle.id, brand, model, year, "dry run, would query advisor");
        ctx.progress.inc_success();
        return;
    }

    ctx.progress.inc_requests();
    let matched = match ctx
        .advisor
        .search_vehicle(&brand, &model, &vehicle.description, year)
        .await
    {
        Ok(matched) => matched,
        Err(e) => {
            record_failure(ctx, vehicle.id, &e.to_string()).await;
            return;
        }
    };

    debug!(
        id = vehicle.id,
        local = vehicle.description,
        advisor = matched.type_name,
        method = matched.method.as_str(),
        "matched vehicle type"
    );

    let specs = match ctx.advisor.get_specifications(&matched.type_id).await {
        Ok(specs) => specs,
        Err(e) => {
            record_failure(ctx, vehicle.id, &e.to_string()).await;
            return;
        }
    };

    if specs.is_empty() {
        debug!(id = vehicle.id, type_id = matched.type_id, "no specifications found");
        ctx.progress.inc_no_match();
        return;
    }

    let confidence = if matched.method.is_exact() { 0.95 } else { 0.85 };
    let mut saved = 0usize;
    for spec in &specs {
        let row = NewOilSpecification {
            vehicle_id: vehicle.id,
            fluid_type: spec.fluid_type,
            viscosity: spec.viscosity.clone(),
            capacity: spec.capacity.clone(),
            norm: spec.norm.clone(),
            recommendation: spec.recommendation.clone(),
            observation: spec.observation.clone(),
            source: SOURCE_TAG.to_string(),
            external_type_id: Some(matched.type_id.clone()),
            confidence: Some(confidence),
        };
        match ctx.specs.insert(&row).await {
            Ok(()) => saved += 1,
            Err(e) => {
                warn!(
                    id = vehicle.id,
                    fluid = spec.fluid_type.as_str(),
                    error = %e,
                    "failed to save specification"
                );
            }
        }
    }

    info!(id = vehicle.id, saved, total = specs.len(), "saved specifications");

    if saved > 0 {
        if let Err(e) = ctx.failures.mark_resolved(vehicle.id).await {
            debug!(id = vehicle.id, error = %e, "failed to mark failure resolved");
        }
    }

    if is_exact_description_match(&vehicle.description, &matched.type_name) {
        ctx.progress.inc_exact_match();
    } else {
        ctx.progress.inc_fuzzy_match();
    }
    ctx.progress.inc_success();
}

async fn record_failure(ctx: &WorkerContext, vehicle_id: i32, message: &str) {
    let kind = ErrorKind::classify(message);
    warn!(id = vehicle_id, kind = kind.as_str(), error = message, "vehicle failed");

    ctx.progress.inc_failed(message);
    match kind {
        ErrorKind::Network => ctx.progress.inc_network_errors(),
        ErrorKind::RateLimit => ctx.progress.inc_rate_limit_hits(),
        _ => {}
    }

    if let Err(e) = ctx.failures.upsert(vehicle_id, kind, message).await {
        warn!(id = vehicle_id, error = %e, "failed to record failure");
    }
}

/// Extract (brand, model, year) from a vehicle row. The model falls back to
/// the description prefix before " - " or " /"; the year is the first
/// four-digit integer in [1990, 2030] within the period string.
pub fn parse_vehicle_description(vehicle: &Vehicle) -> Option<(String, String, i32)> {
    let brand = vehicle.brand.trim();

    let mut model = vehicle.model.trim();
    if model.is_empty() {
        model = vehicle.description.trim();
    }
    if let Some(idx) = model.find(" - ") {
        model = &model[..idx];
    }
    if let Some(idx) = model.find(" /") {
        model = &model[..idx];
    }
    let model = model.trim();

    if brand.is_empty() || model.is_empty() {
        return None;
    }

    let year = extract_year(&vehicle.period).unwrap_or(0);
    Some((brand.to_string(), model.to_string(), year))
}

/// First four-digit integer in range found in the string.
fn extract_year(s: &str) -> Option<i32> {
    let bytes = s.as_bytes();
    for i in 0..bytes.len().saturating_sub(3) {
        if bytes[i..i + 4].iter().all(|b| b.is_ascii_digit()) {
            let year: i32 = s[i..i + 4].parse().ok()?;
            if (YEAR_MIN..=YEAR_MAX).contains(&year) {
                return Some(year);
            }
        }
    }
    None
}

/// Exact vs fuzzy classification by substring containment over the
/// normalized description and type name.
fn is_exact_description_match(description: &str, type_name: &str) -> bool {
    let local = normalize(description);
    let advisor = normalize(type_name);
    local.contains(&advisor) || advisor.contains(&local)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vehicle(brand: &str, model: &str, description: &str, period: &str) -> Vehicle {
        Vehicle {
            id: 1,
            brand: brand.into(),
            model: model.into(),
            description: description.into(),
            engine: String::new(),
            period: period.into(),
        }
    }

    #[test]
    fn test_parse_description_trims_model_suffix() {
        let v = vehicle(
            "Volkswagen",
            "",
            "Gol - 1.0 3 Cil 12V - 84 cv - Total Flex - 2019 -->",
            "2019 -->",
        );
        let (brand, model, year) = parse_vehicle_description(&v).unwrap();
        assert_eq!(brand, "Volkswagen");
        assert_eq!(model, "Gol");
        assert_eq!(year, 2019);
    }

    #[test]
    fn test_parse_description_requires_brand() {
        let v = vehicle("", "", "Gol 1.0", "2019");
        assert!(parse_vehicle_description(&v).is_none());
    }

    #[test]
    fn test_extract_year_bounds() {
        assert_eq!(extract_year("2019 -->"), Some(2019));
        assert_eq!(extract_year("de 1995 a 2001"), Some(1995));
        assert_eq!(extract_year("1989"), None);
        assert_eq!(extract_year("2031"), None);
        assert_eq!(extract_year("sem ano"), None);
        // A longer digit run still yields the first in-range window.
        assert_eq!(extract_year("12019"), Some(2019));
    }

    #[test]
    fn test_completion_watermark_requires_contiguity() {
        let log = CompletionLog::new();
        assert_eq!(log.watermark(), 0);

        log.mark_done(1);
        log.mark_done(2);
        assert_eq!(log.watermark(), 0);

        log.mark_done(0);
        assert_eq!(log.watermark(), 3);

        log.mark_done(4);
        assert_eq!(log.watermark(), 3);
        log.mark_done(3);
        assert_eq!(log.watermark(), 5);
    }

    #[test]
    fn test_exact_description_classification() {
        assert!(is_exact_description_match(
            "Gol 1.0 12V (2019 - )",
            "gol 1.0 12v (2019 - )"
        ));
        assert!(!is_exact_description_match(
            "Gol - 1.0 3 Cil 12V - 84 cv",
            "Polo 1.6 MSI"
        ));
    }
}
