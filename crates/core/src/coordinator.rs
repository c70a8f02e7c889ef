//! Request entry point: fingerprinting, cache lookups and at most one in-flight
//! generation per fingerprint.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use tokio::sync::watch;
use tracing::{Instrument, debug, error, info, info_span, instrument, warn};
use uuid::Uuid;

use crate::{
    cache::{CacheStore, Fingerprint},
    error::DistillError,
    pipeline::SummaryPipeline,
    types::{ConsolidatedSummary, Transcript},
};

#[derive(Debug, Clone)]
pub struct SummaryRequest {
    pub source_id: String,
    /// Shown to the executive synthesizer; defaults to the source id.
    pub title: Option<String>,
    pub transcript: Transcript,
    pub force_regenerate: bool,
}

impl SummaryRequest {
    pub fn new(source_id: impl Into<String>, transcript: Transcript) -> Self {
        Self {
            source_id: source_id.into(),
            title: None,
            transcript,
            force_regenerate: false,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn force_regenerate(mut self, force: bool) -> Self {
        self.force_regenerate = force;
        self
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::new(&self.source_id, &self.transcript.text)
    }
}

/// Receives the outcome of one generation; `None` until it finishes.
type Slot = watch::Receiver<Option<ConsolidatedSummary>>;

#[derive(Clone)]
pub struct SummaryCoordinator {
    inner: Arc<CoordinatorInner>,
}

struct CoordinatorInner {
    pipeline: Arc<SummaryPipeline>,
    store: Arc<dyn CacheStore>,
    /// Never held across an await.
    in_flight: Mutex<HashMap<Fingerprint, Slot>>,
}

impl CoordinatorInner {
    fn in_flight(&self) -> MutexGuard<'_, HashMap<Fingerprint, Slot>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn cached(&self, fingerprint: &Fingerprint) -> Option<ConsolidatedSummary> {
        match self.store.get(fingerprint).await {
            Ok(Some(entry)) => {
                info!(%fingerprint, cached_at = %entry.cached_at, "cache hit");
                Some(entry.into_cached_payload())
            }
            Ok(None) => {
                debug!(%fingerprint, "cache miss");
                None
            }
            Err(e) => {
                warn!(%fingerprint, error = %e, "cache read failed, treating as miss");
                None
            }
        }
    }
}

/// Retires an in-flight slot when the generation task ends, including by panic.
struct InFlightGuard {
    inner: Arc<CoordinatorInner>,
    fingerprint: Fingerprint,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.inner.in_flight().remove(&self.fingerprint);
    }
}

impl SummaryCoordinator {
    pub fn new(pipeline: SummaryPipeline, store: Arc<dyn CacheStore>) -> Self {
        Self {
            inner: Arc::new(CoordinatorInner {
                pipeline: Arc::new(pipeline),
                store,
                in_flight: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn pipeline(&self) -> &SummaryPipeline {
        &self.inner.pipeline
    }

    pub fn is_generating(&self, fingerprint: &Fingerprint) -> bool {
        self.inner.in_flight().contains_key(fingerprint)
    }

    /// Serve a summary for `request`, from cache when possible.
    ///
    /// Always returns a well-formed summary; failures come back with `success == false`
    /// and leave the cache untouched. Generation runs on its own task, so dropping this
    /// future does not cancel it.
    #[instrument(skip_all, fields(source_id = %request.source_id, force = request.force_regenerate))]
    pub async fn generate_summary(&self, request: SummaryRequest) -> ConsolidatedSummary {
        let fingerprint = request.fingerprint();

        if !request.force_regenerate
            && let Some(hit) = self.inner.cached(&fingerprint).await
        {
            return hit;
        }

        let mut slot = {
            let mut in_flight = self.inner.in_flight();
            match in_flight.get(&fingerprint) {
                Some(slot) => {
                    info!(%fingerprint, "joining in-flight generation");
                    slot.clone()
                }
                None => {
                    let (tx, rx) = watch::channel(None);
                    in_flight.insert(fingerprint.clone(), rx.clone());
                    self.spawn_generation(fingerprint.clone(), request.clone(), tx);
                    rx
                }
            }
        };

        let outcome = match slot.wait_for(Option::is_some).await {
            Ok(outcome) => (*outcome).clone(),
            Err(_) => None,
        };
        outcome.unwrap_or_else(|| {
            let reason = DistillError::GenerationAborted {
                reason: "generation ended without a result".to_string(),
            };
            ConsolidatedSummary::failure(
                reason.to_string(),
                self.inner.pipeline.metadata_for(&request.transcript),
            )
        })
    }

    fn spawn_generation(
        &self,
        fingerprint: Fingerprint,
        request: SummaryRequest,
        tx: watch::Sender<Option<ConsolidatedSummary>>,
    ) {
        let guard = InFlightGuard {
            inner: Arc::clone(&self.inner),
            fingerprint: fingerprint.clone(),
        };
        let inner = Arc::clone(&self.inner);
        let span = info_span!("generation", run_id = %Uuid::new_v4(), %fingerprint);

        tokio::spawn(
            async move {
                let _guard = guard;

                // a generation may have finished between the caller's lookup and the slot insert
                if !request.force_regenerate
                    && let Some(hit) = inner.cached(&fingerprint).await
                {
                    tx.send_replace(Some(hit));
                    return;
                }

                let metadata = inner.pipeline.metadata_for(&request.transcript);
                let pipeline = Arc::clone(&inner.pipeline);
                let title = request
                    .title
                    .clone()
                    .unwrap_or_else(|| request.source_id.clone());

                // nested task so a panic inside the pipeline still reaches the waiters
                let run = tokio::spawn(
                    async move { pipeline.run(&request.transcript, &title).await }
                        .in_current_span(),
                );

                let outcome = match run.await {
                    Ok(Ok(summary)) => {
                        match inner.store.put(&fingerprint, &summary).await {
                            Ok(entry) => info!(cached_at = %entry.cached_at, "summary cached"),
                            Err(e) => warn!(error = %e, "failed to cache summary"),
                        }
                        summary
                    }
                    Ok(Err(e)) => {
                        warn!(error = %e, "summary generation failed");
                        ConsolidatedSummary::failure(e.to_string(), metadata)
                    }
                    Err(join_error) => {
                        let e = DistillError::GenerationAborted {
                            reason: join_error.to_string(),
                        };
                        error!(error = %e, "summary generation task died");
                        ConsolidatedSummary::failure(e.to_string(), metadata)
                    }
                };

                tx.send_replace(Some(outcome));
            }
            .instrument(span),
        );
    }
}
