//! End-to-end orchestration.
//!
//! A run fetches every configured source concurrently (retrying transient
//! failures), scales and merges them in precedence order, then runs the
//! analysis stages on the blocking pool:
//!
//! 1. monthly means over the study period
//! 2. monthly climatology
//! 3. anomalies against the climatology
//! 4. threshold band and heat-stress classes
//! 5. chart samples
//!
//! Results are written to the output sink only after every stage succeeds,
//! so a run that fails or is abandoned before that point leaves the sink
//! untouched. Layers are then written one at a time; a sink error or an
//! abort during writing stops the run and keeps the layers already written.

use std::sync::Arc;
use std::time::Instant;

use futures::future::try_join_all;
use serde::Serialize;
use sst_common::{DateRange, GridSpec};
use tracing::{debug, info, warn};

use crate::aggregate::TemporalAggregator;
use crate::anomaly::AnomalyEngine;
use crate::cancel::AbortFlag;
use crate::config::{PipelineConfig, SourceConfig};
use crate::error::{AnalysisError, Result};
use crate::merge::merge_series;
use crate::sampler::{bucket_by_day_of_year, sample_over_region, DayOfYearBucket, Reducer, SamplePoint};
use crate::scale::ScaledRasterSeries;
use crate::sink::{LayerDescriptor, OutputSink};
use crate::source::RasterSource;
use crate::threshold::{classify_series, maximum_monthly_mean};
use crate::types::{
    ClimatologySet, RasterSeries, TimestampedRaster, ANOMALY_BAND, CLASS_BAND, THRESHOLD_BAND,
};

/// Per-source fetch outcome.
#[derive(Debug, Clone, Serialize)]
pub struct SourceReport {
    pub id: String,
    /// Range actually requested; `None` when the source's valid range
    /// misses the study period.
    pub fetch_range: Option<DateRange>,
    pub rasters: usize,
    /// Fetch attempts made, including the successful one.
    pub attempts: u32,
}

/// Summary of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub period: DateRange,
    pub sources: Vec<SourceReport>,
    pub merged_rasters: usize,
    pub months: usize,
    pub empty_months: usize,
    pub threshold: f32,
    /// True when the threshold came from the climatology rather than the
    /// configuration.
    pub threshold_derived: bool,
    pub above_threshold_pixels: usize,
    pub duration_ms: u64,
}

/// Every intermediate product of a run.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub report: PipelineReport,
    pub merged: RasterSeries,
    pub monthly: RasterSeries,
    pub climatology: ClimatologySet,
    pub anomalies: RasterSeries,
    pub classified: RasterSeries,
    pub samples: Vec<SamplePoint>,
    pub seasonal: Vec<DayOfYearBucket>,
}

/// Results of the CPU-bound stages.
struct Analysis {
    merged: RasterSeries,
    monthly: RasterSeries,
    climatology: ClimatologySet,
    anomalies: RasterSeries,
    classified: RasterSeries,
    threshold: f32,
    threshold_derived: bool,
    samples: Vec<SamplePoint>,
    seasonal: Vec<DayOfYearBucket>,
}

/// A configured pipeline bound to a source and a sink.
pub struct Pipeline {
    config: PipelineConfig,
    source: Arc<dyn RasterSource>,
    sink: Arc<dyn OutputSink>,
}

impl Pipeline {
    /// Build a pipeline, rejecting invalid configuration up front.
    pub fn new(
        config: PipelineConfig,
        source: Arc<dyn RasterSource>,
        sink: Arc<dyn OutputSink>,
    ) -> Result<Self> {
        config.validate()?;
        info!(
            period = %config.period,
            band = %config.band,
            sources = config.sources.len(),
            source = source.name(),
            sink = sink.name(),
            "Pipeline configured"
        );
        Ok(Self {
            config,
            source,
            sink,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run every stage and write the results to the sink.
    pub async fn run(&self, abort: &AbortFlag) -> Result<PipelineOutput> {
        let started = Instant::now();
        abort.check()?;

        let fetched = try_join_all(
            self.config
                .sources
                .iter()
                .map(|source| self.fetch_source(source, abort)),
        )
        .await?;

        let (source_reports, series): (Vec<_>, Vec<_>) = fetched.into_iter().unzip();
        abort.check()?;

        let merged = merge_series(&series);
        info!(
            rasters = merged.len(),
            sources = series.len(),
            "Merged source series"
        );

        let grid = self.resolve_grid(&merged)?;
        let config = self.config.clone();
        let flag = abort.clone();
        let analysis =
            tokio::task::spawn_blocking(move || analyse(&config, merged, grid, &flag)).await??;

        abort.check()?;
        self.write_outputs(&analysis, abort).await?;

        let empty_months = analysis.monthly.iter().filter(|e| e.is_degenerate()).count();
        let above_threshold_pixels = analysis
            .classified
            .iter()
            .filter_map(|e| e.raster.band(CLASS_BAND))
            .map(|classes| classes.data().iter().filter(|&&c| c == 1.0).count())
            .sum();

        let report = PipelineReport {
            period: self.config.period,
            sources: source_reports,
            merged_rasters: analysis.merged.len(),
            months: analysis.monthly.len(),
            empty_months,
            threshold: analysis.threshold,
            threshold_derived: analysis.threshold_derived,
            above_threshold_pixels,
            duration_ms: started.elapsed().as_millis() as u64,
        };

        info!(
            months = report.months,
            empty_months = report.empty_months,
            threshold = report.threshold,
            above_threshold_pixels = report.above_threshold_pixels,
            duration_ms = report.duration_ms,
            "Pipeline run complete"
        );

        Ok(PipelineOutput {
            report,
            merged: analysis.merged,
            monthly: analysis.monthly,
            climatology: analysis.climatology,
            anomalies: analysis.anomalies,
            classified: analysis.classified,
            samples: analysis.samples,
            seasonal: analysis.seasonal,
        })
    }

    /// Fetch and scale one source, retrying transient failures with
    /// exponential backoff. A source with nothing in range contributes an
    /// empty series.
    async fn fetch_source(
        &self,
        source: &SourceConfig,
        abort: &AbortFlag,
    ) -> Result<(SourceReport, RasterSeries)> {
        let Some(range) = source.fetch_range(&self.config.period) else {
            debug!(source = %source.id, "Source valid range misses study period, skipping");
            return Ok((
                SourceReport {
                    id: source.id.clone(),
                    fetch_range: None,
                    rasters: 0,
                    attempts: 0,
                },
                RasterSeries::empty(),
            ));
        };

        let policy = &self.config.retry;
        let raw_band = source.raw_band(&self.config.band);
        let mut attempts = 0;
        let mut delay = policy.initial_delay();

        let series = loop {
            abort.check()?;
            attempts += 1;

            match ScaledRasterSeries::fetch(
                self.source.as_ref(),
                &source.collection,
                &range,
                raw_band,
                source.scale,
            )
            .await
            {
                Ok(scaled) => {
                    let series = self.rename_value_band(scaled.into_series(), raw_band);
                    // only an explicit valid range supersedes earlier sources
                    break match source.valid_range {
                        Some(_) => series.with_coverage(range),
                        None => series,
                    };
                }
                Err(e @ AnalysisError::SourceUnavailable { .. }) => {
                    warn!(source = %source.id, error = %e, "Source unavailable, treating as empty");
                    break RasterSeries::empty();
                }
                Err(e) if e.is_transient() && attempts <= policy.max_retries => {
                    warn!(
                        source = %source.id,
                        error = %e,
                        retry = attempts,
                        max_retries = policy.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "Source fetch failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    delay = std::cmp::min(delay * 2, policy.max_delay());
                }
                Err(e) => return Err(e),
            }
        };

        info!(
            source = %source.id,
            collection = %source.collection,
            range = %range,
            rasters = series.len(),
            attempts,
            "Fetched source"
        );

        Ok((
            SourceReport {
                id: source.id.clone(),
                fetch_range: Some(range),
                rasters: series.len(),
                attempts,
            },
            series,
        ))
    }

    /// Store a source's value band under the pipeline band name.
    fn rename_value_band(&self, series: RasterSeries, raw_band: &str) -> RasterSeries {
        if raw_band == self.config.band {
            return series;
        }
        let coverage = series.coverage().copied();
        let renamed: RasterSeries = series
            .into_iter()
            .map(|e| TimestampedRaster::new(e.timestamp, e.raster.rename_band(raw_band, &self.config.band)))
            .collect();
        match coverage {
            Some(range) => renamed.with_coverage(range),
            None => renamed,
        }
    }

    fn resolve_grid(&self, merged: &RasterSeries) -> Result<GridSpec> {
        if let Some(grid) = &self.config.grid {
            return Ok(grid.clone());
        }
        merged.grid().cloned().ok_or_else(|| {
            AnalysisError::EmptyAggregationInput(format!(
                "study period {} (no rasters fetched and no grid configured)",
                self.config.period
            ))
        })
    }

    async fn write_outputs(&self, analysis: &Analysis, abort: &AbortFlag) -> Result<()> {
        let outputs = &self.config.outputs;
        let (sst_min, sst_max) = outputs.sst_range;
        let (anomaly_min, anomaly_max) = outputs.anomaly_range;

        let monthly = LayerDescriptor::continuous(
            outputs.monthly_layer.as_str(),
            self.config.band.as_str(),
            sst_min,
            sst_max,
        );
        self.sink.write_series(&monthly, &analysis.monthly).await?;
        abort.check()?;

        let anomaly =
            LayerDescriptor::continuous(outputs.anomaly_layer.as_str(), ANOMALY_BAND, anomaly_min, anomaly_max);
        self.sink.write_series(&anomaly, &analysis.anomalies).await?;
        abort.check()?;

        let stress = LayerDescriptor::classification(outputs.stress_layer.as_str());
        self.sink.write_series(&stress, &analysis.classified).await?;
        abort.check()?;

        // The threshold is constant in time; publish it once on the latest
        // month that has data.
        let latest = analysis
            .classified
            .iter()
            .rev()
            .find_map(|e| e.raster.select(THRESHOLD_BAND).map(|r| TimestampedRaster::new(e.timestamp, r)));
        if let Some(raster) = latest {
            let threshold =
                LayerDescriptor::continuous(outputs.threshold_layer.as_str(), THRESHOLD_BAND, sst_min, sst_max);
            self.sink.write_raster(&threshold, &raster).await?;
        }

        if self.config.sample.is_some() {
            self.sink.write_samples(&outputs.chart, &analysis.samples).await?;
            self.sink.write_seasonal(&outputs.chart, &analysis.seasonal).await?;
        }

        Ok(())
    }
}

/// CPU-bound stages, run on the blocking pool.
fn analyse(
    config: &PipelineConfig,
    merged: RasterSeries,
    grid: GridSpec,
    abort: &AbortFlag,
) -> Result<Analysis> {
    let band = config.band.as_str();
    let aggregator = TemporalAggregator::new(band, grid).with_abort(abort.clone());

    let monthly = aggregator.monthly_mean(&merged, &config.period)?;
    abort.check()?;

    let climatology = aggregator.climatology(&monthly)?;
    abort.check()?;

    let anomalies = AnomalyEngine::new(band, ANOMALY_BAND).anomalies(&monthly, &climatology)?;
    abort.check()?;

    let (threshold, threshold_derived) = match config.threshold {
        Some(threshold) => (threshold, false),
        None => {
            let derived = maximum_monthly_mean(&climatology, config.study_area.as_ref())
                .ok_or_else(|| {
                    AnalysisError::EmptyAggregationInput(
                        "climatology (cannot derive bleaching threshold)".to_string(),
                    )
                })?;
            info!(threshold = derived, "Derived bleaching threshold from climatology");
            (derived, true)
        }
    };

    let classified = classify_series(&anomalies, threshold, band)?;
    abort.check()?;

    let (samples, seasonal) = match &config.sample {
        Some(region) => {
            let samples = sample_over_region(
                &classified,
                region,
                Reducer::Mean,
                &[band, ANOMALY_BAND, THRESHOLD_BAND],
            );
            let daily = sample_over_region(&merged, region, Reducer::Mean, &[band]);
            (samples, bucket_by_day_of_year(&daily))
        }
        None => (Vec::new(), Vec::new()),
    };

    Ok(Analysis {
        merged,
        monthly,
        climatology,
        anomalies,
        classified,
        threshold,
        threshold_derived,
        samples,
        seasonal,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;
    use crate::source::InMemoryRasterSource;
    use crate::types::{BandedRaster, Raster, SST_BAND};
    use chrono::{TimeZone, Utc};

    fn config_yaml(sources: &str) -> String {
        format!(
            r#"
period:
  start: "2020-01-01T00:00:00Z"
  end: "2020-04-01T00:00:00Z"
sources:
{sources}
retry:
  max_retries: 0
"#
        )
    }

    fn source_with_jan_and_mar() -> InMemoryRasterSource {
        let grid = GridSpec::new(2, 1, 0.0, 1.0, 1.0, 1.0);
        let mut source = InMemoryRasterSource::new();
        for (month, value) in [(1, 27.0), (3, 29.0)] {
            source.insert(
                "sst",
                TimestampedRaster::new(
                    Utc.with_ymd_and_hms(2020, month, 10, 0, 0, 0).unwrap(),
                    BandedRaster::single(SST_BAND, Raster::filled(grid.clone(), value)),
                ),
            );
        }
        source
    }

    #[test]
    fn test_invalid_config_fails_at_construction() {
        let yaml = config_yaml("  - id: a\n    collection: sst\n    scale: {multiplier: 1.0}")
            .replace("2020-04-01", "2019-04-01");
        let config = PipelineConfig::from_yaml_str(&yaml).unwrap();
        let result = Pipeline::new(
            config,
            Arc::new(InMemoryRasterSource::new()),
            Arc::new(MemorySink::new()),
        );
        assert!(matches!(result, Err(AnalysisError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_run_writes_layers() {
        let config = PipelineConfig::from_yaml_str(&config_yaml("  - id: a\n    collection: sst")).unwrap();
        let sink = Arc::new(MemorySink::new());
        let pipeline = Pipeline::new(config, Arc::new(source_with_jan_and_mar()), sink.clone()).unwrap();

        let output = pipeline.run(&AbortFlag::new()).await.unwrap();

        assert_eq!(output.report.months, 3);
        assert_eq!(output.report.empty_months, 1);
        assert!(output.report.threshold_derived);
        assert_eq!(output.report.threshold, 29.0);
        assert_eq!(
            sink.layer_names().await,
            vec!["bleaching_stress", "bleaching_threshold", "monthly_sst", "sst_anomaly"]
        );
        let (_, threshold_layer) = sink.layer("bleaching_threshold").await.unwrap();
        assert_eq!(threshold_layer.len(), 1);
        assert_eq!(
            threshold_layer.get(0).unwrap().timestamp,
            Utc.with_ymd_and_hms(2020, 3, 1, 0, 0, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn test_aborted_run_writes_nothing() {
        let config = PipelineConfig::from_yaml_str(&config_yaml("  - id: a\n    collection: sst")).unwrap();
        let sink = Arc::new(MemorySink::new());
        let pipeline = Pipeline::new(config, Arc::new(source_with_jan_and_mar()), sink.clone()).unwrap();

        let flag = AbortFlag::new();
        flag.abort();
        assert!(matches!(pipeline.run(&flag).await, Err(AnalysisError::Cancelled)));
        assert!(sink.layer_names().await.is_empty());
    }

    /// Memory sink that rejects one layer.
    struct RejectingSink {
        inner: MemorySink,
        reject: &'static str,
    }

    #[async_trait::async_trait]
    impl OutputSink for RejectingSink {
        async fn write_series(&self, layer: &LayerDescriptor, series: &RasterSeries) -> Result<()> {
            if layer.name == self.reject {
                return Err(AnalysisError::sink(format!("layer {} rejected", layer.name)));
            }
            self.inner.write_series(layer, series).await
        }

        async fn write_raster(&self, layer: &LayerDescriptor, raster: &TimestampedRaster) -> Result<()> {
            self.inner.write_raster(layer, raster).await
        }

        async fn write_samples(&self, chart: &str, samples: &[SamplePoint]) -> Result<()> {
            self.inner.write_samples(chart, samples).await
        }

        async fn write_seasonal(&self, chart: &str, buckets: &[DayOfYearBucket]) -> Result<()> {
            self.inner.write_seasonal(chart, buckets).await
        }
    }

    #[tokio::test]
    async fn test_sink_error_keeps_earlier_layers() {
        let config = PipelineConfig::from_yaml_str(&config_yaml("  - id: a\n    collection: sst")).unwrap();
        let sink = Arc::new(RejectingSink {
            inner: MemorySink::new(),
            reject: "sst_anomaly",
        });
        let pipeline = Pipeline::new(config, Arc::new(source_with_jan_and_mar()), sink.clone()).unwrap();

        assert!(matches!(pipeline.run(&AbortFlag::new()).await, Err(AnalysisError::Sink(_))));
        assert_eq!(sink.inner.layer_names().await, vec!["monthly_sst"]);
    }

    #[tokio::test]
    async fn test_no_rasters_and_no_grid_is_an_error() {
        let config = PipelineConfig::from_yaml_str(&config_yaml("  - id: a\n    collection: empty")).unwrap();
        let pipeline = Pipeline::new(
            config,
            Arc::new(source_with_jan_and_mar()),
            Arc::new(MemorySink::new()),
        )
        .unwrap();
        assert!(matches!(
            pipeline.run(&AbortFlag::new()).await,
            Err(AnalysisError::EmptyAggregationInput(_))
        ));
    }
}
