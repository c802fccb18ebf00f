//! Asynchronous client for the two remote pitch-estimation engines.
//!
//! Requests are queued per engine and drained by a periodic tick, which
//! amortizes connection overhead under load; each queued request carries
//! its own oneshot channel, so result association survives out-of-order
//! completion. Both engines are invoked concurrently with independent
//! error isolation, and if neither produces a usable response before the
//! deadline the client falls back to the local estimator, tagging the
//! result so consumers can tell the difference.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

use crate::contour::{PitchEstimate, PitchMethod};
use crate::dsp::estimator::{EstimatorConfig, PitchEstimator};
use crate::fusion::{self, FusionConfig, SourceEstimate};

use super::cache::{BufferFingerprint, ResultCache};
use super::protocol::{AnalyzeRequest, AnalyzeResponse, HealthResponse};
use super::RemoteAnalysis;

/// The two engines, by role: one tuned for monophonic pitch tracking,
/// one for polyphonic/chord detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineKind {
    Monophonic,
    Polyphonic,
}

impl EngineKind {
    const ALL: [EngineKind; 2] = [EngineKind::Monophonic, EngineKind::Polyphonic];

    fn index(self) -> usize {
        match self {
            EngineKind::Monophonic => 0,
            EngineKind::Polyphonic => 1,
        }
    }

    fn method(self) -> PitchMethod {
        match self {
            EngineKind::Monophonic => PitchMethod::RemoteCrepe,
            EngineKind::Polyphonic => PitchMethod::RemoteSpice,
        }
    }
}

/// Liveness of an engine as seen by the most recent health probe. Used
/// for diagnostics only; per-request fallback is always timeout-driven so
/// a stale probe can't produce false negatives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineHealth {
    #[default]
    Unknown,
    Healthy,
    Unreachable,
}

/// Configuration for the dual-engine client.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// Base URL of the monophonic engine, e.g. "http://127.0.0.1:5002".
    pub monophonic_url: String,
    /// Base URL of the polyphonic engine.
    pub polyphonic_url: String,
    pub connect_timeout_sec: f64,
    pub request_timeout_sec: f64,
    /// Queue-drain period; all requests enqueued within one tick go out
    /// as a single concurrent batch.
    pub batch_interval_ms: u64,
    pub cache_capacity: usize,
    /// Overall per-call budget before falling back to the local
    /// estimator.
    pub deadline_sec: f64,
    /// Period of the diagnostic health probe.
    pub health_interval_sec: f64,
    /// Sliding-window parameters for the local fallback analysis.
    pub fallback_window: usize,
    pub fallback_hop: usize,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            monophonic_url: "http://127.0.0.1:5002".into(),
            polyphonic_url: "http://127.0.0.1:5003".into(),
            connect_timeout_sec: 3.0,
            request_timeout_sec: 10.0,
            batch_interval_ms: 50,
            cache_capacity: 10,
            deadline_sec: 8.0,
            health_interval_sec: 30.0,
            fallback_window: 2048,
            fallback_hop: 1024,
        }
    }
}

/// Transport seam between the client and the engines' HTTP protocol.
/// Production uses [`HttpTransport`]; tests inject mocks.
pub trait EngineTransport: Send + Sync + 'static {
    fn analyze(
        &self,
        engine: EngineKind,
        request: AnalyzeRequest,
    ) -> impl Future<Output = Result<AnalyzeResponse>> + Send;

    fn health(&self, engine: EngineKind) -> impl Future<Output = Result<HealthResponse>> + Send;
}

/// reqwest-backed transport speaking the engines' JSON protocol.
pub struct HttpTransport {
    client: reqwest::Client,
    base_urls: [String; 2],
}

impl HttpTransport {
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs_f64(config.connect_timeout_sec))
            .timeout(Duration::from_secs_f64(config.request_timeout_sec))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_urls: [
                config.monophonic_url.clone(),
                config.polyphonic_url.clone(),
            ],
        })
    }
}

impl EngineTransport for HttpTransport {
    async fn analyze(
        &self,
        engine: EngineKind,
        request: AnalyzeRequest,
    ) -> Result<AnalyzeResponse> {
        let url = format!("{}/analyze", self.base_urls[engine.index()]);
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .with_context(|| format!("Failed to reach {url}"))?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("Engine returned HTTP {status}");
        }

        let parsed: AnalyzeResponse = response
            .json()
            .await
            .context("Failed to parse engine response")?;
        parsed.validate()?;
        Ok(parsed)
    }

    async fn health(&self, engine: EngineKind) -> Result<HealthResponse> {
        let url = format!("{}/health", self.base_urls[engine.index()]);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Failed to reach {url}"))?;
        response
            .json()
            .await
            .context("Failed to parse health response")
    }
}

struct Pending {
    request: AnalyzeRequest,
    tx: oneshot::Sender<Result<AnalyzeResponse>>,
}

struct Shared<T> {
    transport: T,
    queues: [Mutex<VecDeque<Pending>>; 2],
    cache: Mutex<ResultCache>,
    health: Mutex<[EngineHealth; 2]>,
}

impl<T: EngineTransport> Shared<T> {
    /// Drain both engine queues and issue every batched call
    /// concurrently. Failures resolve only their own request.
    async fn drain(self: Arc<Self>) {
        for engine in EngineKind::ALL {
            let batch: Vec<Pending> = {
                let mut queue = self.queues[engine.index()].lock().unwrap();
                queue.drain(..).collect()
            };

            if batch.is_empty() {
                continue;
            }
            log::debug!("Draining {} request(s) for {engine:?}", batch.len());

            for pending in batch {
                let shared = Arc::clone(&self);
                tokio::spawn(async move {
                    let result = shared.transport.analyze(engine, pending.request).await;
                    // The caller may have timed out and dropped its
                    // receiver; nothing to do then.
                    let _ = pending.tx.send(result);
                });
            }
        }
    }

    /// Fail every queued request with a disposed error.
    fn reject_all_pending(&self) {
        for engine in EngineKind::ALL {
            let mut queue = self.queues[engine.index()].lock().unwrap();
            for pending in queue.drain(..) {
                let _ = pending.tx.send(Err(anyhow!("Remote client disposed")));
            }
        }
    }

    async fn probe_health(&self) {
        for engine in EngineKind::ALL {
            let status = match self.transport.health(engine).await {
                Ok(response) if response.is_healthy() => EngineHealth::Healthy,
                Ok(_) => EngineHealth::Unreachable,
                Err(err) => {
                    log::debug!("Health probe for {engine:?} failed: {err:#}");
                    EngineHealth::Unreachable
                }
            };
            self.health.lock().unwrap()[engine.index()] = status;
        }
    }
}

/// Client orchestrating the two remote engines with batching, caching,
/// and timeout-driven local fallback.
///
/// One instance per session (or dependency-injected); there is no global
/// state, so sessions and tests run in isolation. Call [`stop`] when the
/// session ends — it cancels the batch timer, fails still-pending
/// requests with a disposed error, and may be called more than once.
///
/// [`stop`]: DualEngineClient::stop
pub struct DualEngineClient<T: EngineTransport> {
    shared: Arc<Shared<T>>,
    config: RemoteConfig,
    fusion: FusionConfig,
    estimator_config: EstimatorConfig,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    stopped: AtomicBool,
}

impl DualEngineClient<HttpTransport> {
    /// Build a client over HTTP transport. Must be called inside a tokio
    /// runtime; the batch and health tasks are spawned immediately.
    pub fn connect(config: RemoteConfig) -> Result<Self> {
        let transport = HttpTransport::new(&config)?;
        Ok(Self::with_transport(config, transport))
    }
}

impl<T: EngineTransport> DualEngineClient<T> {
    /// Build a client over an arbitrary transport (tests inject mocks
    /// here).
    pub fn with_transport(config: RemoteConfig, transport: T) -> Self {
        let shared = Arc::new(Shared {
            transport,
            queues: [Mutex::new(VecDeque::new()), Mutex::new(VecDeque::new())],
            cache: Mutex::new(ResultCache::new(config.cache_capacity)),
            health: Mutex::new([EngineHealth::Unknown; 2]),
        });

        let (shutdown, _) = watch::channel(false);
        let mut tasks = Vec::new();

        // Batch-drain tick.
        {
            let shared = Arc::clone(&shared);
            let mut shutdown_rx = shutdown.subscribe();
            let period = Duration::from_millis(config.batch_interval_ms.max(1));
            tasks.push(tokio::spawn(async move {
                let mut tick = tokio::time::interval(period);
                loop {
                    tokio::select! {
                        _ = tick.tick() => Arc::clone(&shared).drain().await,
                        _ = shutdown_rx.changed() => break,
                    }
                }
                shared.reject_all_pending();
            }));
        }

        // Infrequent diagnostic health probe.
        {
            let shared = Arc::clone(&shared);
            let mut shutdown_rx = shutdown.subscribe();
            let period = Duration::from_secs_f64(config.health_interval_sec.max(1.0));
            tasks.push(tokio::spawn(async move {
                let mut tick = tokio::time::interval(period);
                loop {
                    tokio::select! {
                        _ = tick.tick() => shared.probe_health().await,
                        _ = shutdown_rx.changed() => break,
                    }
                }
            }));
        }

        Self {
            shared,
            config,
            fusion: FusionConfig::default(),
            estimator_config: EstimatorConfig::default(),
            shutdown,
            tasks: Mutex::new(tasks),
            stopped: AtomicBool::new(false),
        }
    }

    /// Override the fusion policy used to combine the two engines.
    pub fn with_fusion_config(mut self, fusion: FusionConfig) -> Self {
        self.fusion = fusion;
        self
    }

    /// Override the estimator configuration used for local fallback.
    pub fn with_estimator_config(mut self, estimator: EstimatorConfig) -> Self {
        self.estimator_config = estimator;
        self
    }

    /// Analyze a sample buffer through both remote engines.
    ///
    /// Checks the result cache first; on a miss, enqueues the request for
    /// both engines and awaits both within the configured deadline. If
    /// neither engine produces a usable response the buffer is analyzed
    /// locally instead, and the result is tagged [`PitchMethod::LocalFallback`].
    /// This method never fails — every failure mode degrades.
    pub async fn analyze(&self, samples: &[f32], sample_rate: u32) -> RemoteAnalysis {
        let fingerprint = BufferFingerprint::of(samples);
        if let Some(hit) = self.shared.cache.lock().unwrap().get(&fingerprint) {
            log::debug!("Remote result cache hit for {} samples", samples.len());
            return hit;
        }

        if self.stopped.load(Ordering::SeqCst) {
            return self.local_fallback(samples, sample_rate);
        }

        let request = AnalyzeRequest::from_samples(samples, sample_rate);
        let mut receivers = Vec::with_capacity(2);
        for engine in EngineKind::ALL {
            let (tx, rx) = oneshot::channel();
            self.shared.queues[engine.index()]
                .lock()
                .unwrap()
                .push_back(Pending {
                    request: request.clone(),
                    tx,
                });
            receivers.push((engine, rx));
        }

        // stop() may have flipped the flag between the check above and the
        // enqueue, after its final rejection sweep already ran. Sweep again
        // so these requests fail with the disposed error now instead of
        // sitting until the deadline.
        if self.stopped.load(Ordering::SeqCst) {
            self.shared.reject_all_pending();
        }

        let deadline = Duration::from_secs_f64(self.config.deadline_sec);
        let mut outcomes: Vec<(EngineKind, AnalyzeResponse)> = Vec::with_capacity(2);

        let gather = async {
            let mut ok = Vec::new();
            for (engine, rx) in receivers {
                match rx.await {
                    Ok(Ok(response)) => ok.push((engine, response)),
                    Ok(Err(err)) => log::warn!("{engine:?} engine failed: {err:#}"),
                    Err(_) => log::warn!("{engine:?} request dropped before completion"),
                }
            }
            ok
        };

        match tokio::time::timeout(deadline, gather).await {
            Ok(ok) => outcomes.extend(ok),
            Err(_) => log::warn!(
                "Remote analysis deadline of {:.1}s exceeded",
                self.config.deadline_sec
            ),
        }

        let analysis = match outcomes.len() {
            0 => {
                log::warn!("Both engines unavailable; using local estimator");
                return self.local_fallback(samples, sample_rate);
            }
            1 => {
                let (engine, response) = outcomes.remove(0);
                RemoteAnalysis {
                    non_monophonic: response.has_multiple_pitches(),
                    frequencies: response.frequencies,
                    confidences: response.confidence,
                    method: engine.method(),
                }
            }
            _ => self.fuse_engines(&outcomes),
        };

        self.shared
            .cache
            .lock()
            .unwrap()
            .insert(fingerprint, analysis.clone());
        analysis
    }

    /// Combine both engines' per-frame arrays through the fusion policy.
    fn fuse_engines(&self, outcomes: &[(EngineKind, AnalyzeResponse)]) -> RemoteAnalysis {
        let non_monophonic = outcomes
            .iter()
            .any(|(_, response)| response.has_multiple_pitches());

        let frames = outcomes
            .iter()
            .map(|(_, r)| r.frequencies.len())
            .min()
            .unwrap_or(0);

        let mut frequencies = Vec::with_capacity(frames);
        let mut confidences = Vec::with_capacity(frames);

        for i in 0..frames {
            let sources: Vec<SourceEstimate> = outcomes
                .iter()
                .map(|(engine, response)| SourceEstimate {
                    estimate: PitchEstimate {
                        frequency_hz: response.frequencies[i],
                        confidence: response.confidence[i],
                        method: engine.method(),
                        timestamp_sec: i as f64,
                    },
                    multiple_pitches: response
                        .multiple_pitches
                        .as_ref()
                        .and_then(|mp| mp.get(i))
                        .is_some_and(|p| p.len() > 1),
                })
                .collect();

            let fused = fusion::fuse(&sources, &self.fusion);
            frequencies.push(fused.estimate.frequency_hz);
            confidences.push(fused.estimate.confidence);
        }

        RemoteAnalysis {
            frequencies,
            confidences,
            method: PitchMethod::Fused,
            non_monophonic,
        }
    }

    /// Run the local estimator over the buffer with a sliding window,
    /// producing the same array shape the engines would have returned.
    fn local_fallback(&self, samples: &[f32], sample_rate: u32) -> RemoteAnalysis {
        let window = self.config.fallback_window.max(256);
        let hop = self.config.fallback_hop.max(1);
        let mut estimator = PitchEstimator::new(self.estimator_config.clone());

        let mut frequencies = Vec::new();
        let mut confidences = Vec::new();
        let mut pos = 0;
        while pos + window <= samples.len() {
            let timestamp = pos as f64 / sample_rate as f64;
            let analysis = estimator.estimate(&samples[pos..pos + window], sample_rate, timestamp);
            frequencies.push(analysis.estimate.frequency_hz);
            confidences.push(analysis.estimate.confidence);
            pos += hop;
        }

        RemoteAnalysis {
            frequencies,
            confidences,
            method: PitchMethod::LocalFallback,
            non_monophonic: false,
        }
    }

    /// Latest health-probe verdict per engine, for diagnostics/UI.
    pub fn engine_health(&self) -> (EngineHealth, EngineHealth) {
        let health = self.shared.health.lock().unwrap();
        (health[0], health[1])
    }

    /// Run one health probe immediately instead of waiting for the
    /// periodic task.
    pub async fn probe_health(&self) -> (EngineHealth, EngineHealth) {
        self.shared.probe_health().await;
        self.engine_health()
    }

    /// Shut the client down: cancel the batch and health tasks and fail
    /// all still-pending requests with a disposed error. Idempotent.
    pub async fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }

        // Wake the tasks; they exit their select loops and the drain task
        // rejects whatever is still queued.
        let _ = self.shutdown.send(true);

        let tasks: Vec<JoinHandle<()>> = std::mem::take(&mut *self.tasks.lock().unwrap());
        for task in tasks {
            let _ = task.await;
        }

        // Anything enqueued after the drain task exited.
        self.shared.reject_all_pending();
    }
}
