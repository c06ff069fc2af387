//! ### Session
//! The loaded-results handle and the pipeline run against it. A session
//! holds at most one [`ResultsSet`]; reloading swaps it wholesale, and
//! every render works on the snapshot it started with.

use crate::compute::granularise;
use crate::config::PipelineConfig;
use crate::convert::{open_source, ResultsSet};
use crate::error::{ProfileError, ProfileResult};
use crate::graph::{plot_full_period, plot_selectable_year, plot_year, Figure};
use crate::profile::build_full_profile;
use crate::table::{PatternTable, PeriodTable};
use crate::tech_map::TechMap;
use std::path::Path;
use std::sync::{Arc, RwLock};
use tracing::{info, instrument};

/// Read-only view over one results set, its technology map and config.
/// Every stage it runs is a pure function of these.
pub struct Pipeline<'a> {
    results: &'a ResultsSet,
    tech_map: &'a TechMap,
    config: &'a PipelineConfig,
}

impl<'a> Pipeline<'a> {
    pub fn new(results: &'a ResultsSet, tech_map: &'a TechMap, config: &'a PipelineConfig) -> Self {
        Self {
            results,
            tech_map,
            config,
        }
    }

    pub fn nodes(&self) -> &'a [String] {
        &self.config.nodes
    }

    pub fn patterns(&self) -> &'a PatternTable {
        &self.results.patterns
    }

    pub fn storage(&self) -> &'a PeriodTable {
        &self.results.storage
    }

    pub fn tech_map(&self) -> &'a TechMap {
        self.tech_map
    }

    pub fn config(&self) -> &'a PipelineConfig {
        self.config
    }

    /// Flows of `node`, bucketed to `granularity` and grouped by technology.
    pub fn grouped(&self, node: &str, granularity: u32) -> ProfileResult<PeriodTable> {
        let raw = self.results.flows(node)?;
        let bucketed = granularise(raw, granularity)?;
        Ok(self.tech_map.group(&bucketed))
    }

    /// Grouped flows of `node` replayed over the whole horizon.
    pub fn full_profile(&self, node: &str, granularity: u32) -> ProfileResult<PeriodTable> {
        build_full_profile(&self.grouped(node, granularity)?, self.patterns(), granularity)
    }
}

pub struct Session {
    config: PipelineConfig,
    tech_map: TechMap,
    results: RwLock<Option<Arc<ResultsSet>>>,
}

impl Session {
    pub fn new(config: PipelineConfig, tech_map: TechMap) -> Self {
        Self {
            config,
            tech_map,
            results: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Loads `artifact` and replaces the current results. On failure the
    /// previous results stay in place.
    #[instrument(skip(self, artifact), fields(artifact = %artifact.display()))]
    pub fn load(&self, artifact: &Path) -> ProfileResult<()> {
        let source = open_source(artifact)?;
        let loaded = Arc::new(ResultsSet::load(source.as_ref(), &self.config.nodes)?);
        let mut slot = self.results.write().unwrap_or_else(|e| e.into_inner());
        *slot = Some(loaded);
        info!("results replaced");
        Ok(())
    }

    pub fn results(&self) -> ProfileResult<Arc<ResultsSet>> {
        self.results
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or_else(|| ProfileError::load("session", "no results loaded"))
    }

    fn with_pipeline<T>(&self, run: impl FnOnce(&Pipeline) -> ProfileResult<T>) -> ProfileResult<T> {
        let results = self.results()?;
        run(&Pipeline::new(&results, &self.tech_map, &self.config))
    }

    pub fn full_profile(&self, node: &str, granularity: u32) -> ProfileResult<PeriodTable> {
        self.with_pipeline(|p| p.full_profile(node, granularity))
    }

    pub fn render_full(&self, granularity: u32) -> ProfileResult<Figure> {
        self.with_pipeline(|p| plot_full_period(p, granularity))
    }

    pub fn render_year(&self, year: i32, granularity: u32) -> ProfileResult<Figure> {
        self.with_pipeline(|p| plot_year(p, year, granularity))
    }

    pub fn render_selectable_year(&self, granularity: u32) -> ProfileResult<Figure> {
        self.with_pipeline(|p| plot_selectable_year(p, granularity))
    }
}
