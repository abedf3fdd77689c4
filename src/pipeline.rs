use log::debug;

use crate::{
    analyze::Analyzer,
    config::EngineConfig,
    graph::{self, GraphModel},
    reconcile::{reconcile, ReconcileStats},
    render::{Dot, DotStyle},
    snapshot::{HeapSnapshot, ParseError},
};

/// Everything one tick produced.
#[derive(Debug)]
pub struct Built {
    pub graph: GraphModel,
    /// The graph in `dot` form
    pub description: String,
    pub stats: ReconcileStats,
}

/// parse -> reconcile -> build (+ checks) -> serialize. Holds configuration
/// only; nothing computed for one snapshot is kept for the next.
#[derive(Debug)]
pub struct Engine {
    config: EngineConfig,
    analyzer: Analyzer,
    style: DotStyle,
}

impl Engine {
    /// An engine running the built-in checks.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            analyzer: Analyzer::with_builtin(),
            style: DotStyle::default(),
        }
    }

    pub fn with_analyzer(mut self, analyzer: Analyzer) -> Self {
        self.analyzer = analyzer;
        self
    }

    pub fn with_style(mut self, style: DotStyle) -> Self {
        self.style = style;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Decode `payload` and model it, without serializing.
    pub fn model(&self, payload: &str) -> Result<(GraphModel, ReconcileStats), ParseError> {
        let snapshot = HeapSnapshot::parse(payload, &self.config.conventions)?;
        debug!(
            "parsed snapshot: {} heads, {} lists, {} chunks",
            snapshot.heads.len(),
            snapshot.bins.len(),
            snapshot.nr_chunks()
        );
        let model = reconcile(&snapshot, &self.config);
        let stats = model.stats;
        Ok((graph::build(model, &self.analyzer, &self.config), stats))
    }

    /// Run one full tick on `payload`.
    pub fn build(&self, payload: &str) -> Result<Built, ParseError> {
        let (graph, stats) = self.model(payload)?;
        let description = Dot::with_style(&graph, self.style.clone()).to_string();
        Ok(Built {
            graph,
            description,
            stats,
        })
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}
