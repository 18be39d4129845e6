//! Shared processing context for job handlers.

use std::sync::Arc;

use revid_analysis::{ClipAnalysisEngine, MotDriverConfig};
use revid_match::{GrouperConfig, IdentityResolver, TopologyCache};
use revid_media::{ClipService, LocalClipService};
use revid_ml_client::{ObjectDetector, ReidEmbedder};
use revid_models::{AnalysisConfig, ClassTaxonomy, MatchWeights};
use revid_ptz::{FrameSource, PtzRegistry};
use revid_store::Store;

use crate::config::WorkerConfig;

/// Everything a job handler needs, bundled once at startup.
pub struct WorkerContext {
    pub config: WorkerConfig,
    pub store: Store,
    pub detector: Arc<dyn ObjectDetector>,
    pub embedder: Option<Arc<dyn ReidEmbedder>>,
    pub clips: Arc<dyn ClipService>,
    pub taxonomy: ClassTaxonomy,
    pub weights: MatchWeights,
    pub analysis_config: AnalysisConfig,
    pub grouper_config: GrouperConfig,
    pub topology: Arc<TopologyCache>,
    pub resolver: Arc<IdentityResolver>,
    /// Present when PTZ hardware is wired
    pub ptz: Option<PtzContext>,
}

/// PTZ-side collaborators, absent on installations without a PTZ.
pub struct PtzContext {
    pub registry: Arc<PtzRegistry>,
    pub frames: Arc<dyn FrameSource>,
}

impl WorkerContext {
    /// Bundle a context from its parts.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: WorkerConfig,
        store: Store,
        detector: Arc<dyn ObjectDetector>,
        embedder: Option<Arc<dyn ReidEmbedder>>,
        clips: Arc<dyn ClipService>,
        taxonomy: ClassTaxonomy,
        weights: MatchWeights,
        analysis_config: AnalysisConfig,
        ptz: Option<PtzContext>,
    ) -> Self {
        let topology = Arc::new(TopologyCache::new(store.clone(), config.topology_cache_ttl));
        let resolver = Arc::new(IdentityResolver::new(store.clone()));
        Self {
            config,
            store,
            detector,
            embedder,
            clips,
            taxonomy,
            weights,
            analysis_config,
            grouper_config: GrouperConfig::default(),
            topology,
            resolver,
            ptz,
        }
    }

    /// Default context wiring for a worker process: local clip storage and
    /// config/weights from the environment.
    pub fn for_worker(
        config: WorkerConfig,
        store: Store,
        detector: Arc<dyn ObjectDetector>,
        embedder: Option<Arc<dyn ReidEmbedder>>,
        ptz: Option<PtzContext>,
    ) -> Self {
        let clips: Arc<dyn ClipService> = Arc::new(LocalClipService::new(
            config.clips_dir.clone(),
            config.downloads_dir.clone(),
        ));
        Self::new(
            config,
            store,
            detector,
            embedder,
            clips,
            ClassTaxonomy::default(),
            MatchWeights::from_env(),
            AnalysisConfig::from_env(),
            ptz,
        )
    }

    /// Build a clip analysis engine over this context.
    pub fn analysis_engine(&self) -> ClipAnalysisEngine {
        let driver_config = MotDriverConfig {
            inference_conf: self.analysis_config.inference_conf,
            min_box_px: self.analysis_config.min_box_px,
            crops_dir: self.config.crops_dir.clone(),
            ..MotDriverConfig::default()
        };
        ClipAnalysisEngine::new(
            self.store.clone(),
            Arc::clone(&self.detector),
            self.embedder.clone(),
            Arc::clone(&self.clips),
            self.taxonomy.clone(),
            self.analysis_config.clone(),
            driver_config,
        )
    }
}
