//! Benchmark aggregation over a bounded run history.
//!
//! Every dispatch attempt lands here, success or failure. The history is a
//! fixed-capacity FIFO ring buffer; statistics are computed by filtering and
//! sorting the buffer, which is acceptable at the bounded size. Recording
//! must never disturb a routing result, so nothing in this module panics or
//! propagates errors to the dispatcher.

use crate::types::AgentRole;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;
use tracing::warn;

/// One recorded attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkRun {
    /// Model attempted.
    pub model: String,
    /// Task role served.
    pub task: AgentRole,
    /// When the attempt completed.
    pub timestamp: DateTime<Utc>,
    /// Attempt latency.
    pub latency_ms: u64,
    /// Prompt tokens.
    pub input_tokens: u32,
    /// Completion tokens.
    pub output_tokens: u32,
    /// Estimated cost of the attempt.
    pub cost_usd: f64,
    /// Whether the attempt succeeded.
    pub success: bool,
    /// Optional offline quality/relevance score in [0, 1].
    pub quality_score: Option<f64>,
}

/// Aggregated statistics for one (model, task) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelTaskStats {
    /// Number of recorded runs.
    pub run_count: usize,
    /// Arithmetic mean latency.
    pub avg_latency_ms: f64,
    /// Nearest-rank 95th-percentile latency.
    pub p95_latency_ms: u64,
    /// Mean quality score over runs that carried one.
    pub avg_quality_score: Option<f64>,
    /// Successful runs divided by total runs.
    pub success_rate: f64,
    /// Mean estimated cost.
    pub avg_cost_usd: f64,
    /// Summed input+output tokens.
    pub total_tokens: u64,
}

/// Dimension to rank models by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RankBy {
    /// Highest mean quality score.
    Quality,
    /// Lowest mean latency.
    Speed,
    /// Lowest mean cost.
    Cost,
}

/// Bounded history of attempts with per-model/per-task statistics.
pub struct BenchmarkAggregator {
    runs: RwLock<VecDeque<BenchmarkRun>>,
    capacity: usize,
    /// Models below this success rate are excluded from best-model queries,
    /// unless no model qualifies at all.
    reliability_threshold: f64,
}

impl BenchmarkAggregator {
    /// Creates an aggregator with the given ring-buffer capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            runs: RwLock::new(VecDeque::with_capacity(capacity)),
            capacity,
            reliability_threshold: 0.8,
        }
    }

    /// Overrides the reliability threshold for best-model queries.
    pub fn with_reliability_threshold(mut self, threshold: f64) -> Self {
        self.reliability_threshold = threshold;
        self
    }

    /// Appends a run, evicting the oldest entry when the buffer is full.
    ///
    /// Never panics and never reports failure: a benchmarking problem must
    /// not mask or replace a routing result.
    pub fn record_run(&self, run: BenchmarkRun) {
        match self.runs.write() {
            Ok(mut runs) => {
                if runs.len() == self.capacity {
                    runs.pop_front();
                }
                runs.push_back(run);
            }
            Err(e) => {
                warn!(error = %e, "benchmark buffer poisoned; run dropped");
            }
        }
    }

    /// Number of runs currently held.
    pub fn len(&self) -> usize {
        self.runs.read().map(|r| r.len()).unwrap_or(0)
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw runs for one (model, task) pair, oldest first.
    pub fn runs_for(&self, model: &str, task: AgentRole) -> Vec<BenchmarkRun> {
        self.runs
            .read()
            .map(|runs| {
                runs.iter()
                    .filter(|r| r.model == model && r.task == task)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Aggregated statistics for one (model, task) pair, or `None` when no
    /// runs are recorded for it.
    pub fn stats(&self, model: &str, task: AgentRole) -> Option<ModelTaskStats> {
        let runs = self.runs_for(model, task);
        Self::stats_over(&runs)
    }

    fn stats_over(runs: &[BenchmarkRun]) -> Option<ModelTaskStats> {
        if runs.is_empty() {
            return None;
        }

        let count = runs.len();
        let mut latencies: Vec<u64> = runs.iter().map(|r| r.latency_ms).collect();
        latencies.sort_unstable();

        // Nearest-rank percentile over the sorted latency list.
        let p95_index = ((count as f64 * 0.95).ceil() as usize).clamp(1, count) - 1;

        let quality_scores: Vec<f64> = runs.iter().filter_map(|r| r.quality_score).collect();
        let avg_quality_score = if quality_scores.is_empty() {
            None
        } else {
            Some(quality_scores.iter().sum::<f64>() / quality_scores.len() as f64)
        };

        Some(ModelTaskStats {
            run_count: count,
            avg_latency_ms: runs.iter().map(|r| r.latency_ms as f64).sum::<f64>() / count as f64,
            p95_latency_ms: latencies[p95_index],
            avg_quality_score,
            success_rate: runs.iter().filter(|r| r.success).count() as f64 / count as f64,
            avg_cost_usd: runs.iter().map(|r| r.cost_usd).sum::<f64>() / count as f64,
            total_tokens: runs
                .iter()
                .map(|r| u64::from(r.input_tokens) + u64::from(r.output_tokens))
                .sum(),
        })
    }

    /// Best model for a task by the requested dimension.
    ///
    /// Models whose success rate is below the reliability threshold are
    /// excluded; when none qualify, the unfiltered set is ranked instead.
    pub fn best_model_for_task(&self, task: AgentRole, rank: RankBy) -> Option<String> {
        let by_model: HashMap<String, Vec<BenchmarkRun>> = self
            .runs
            .read()
            .map(|runs| {
                let mut grouped: HashMap<String, Vec<BenchmarkRun>> = HashMap::new();
                for run in runs.iter().filter(|r| r.task == task) {
                    grouped.entry(run.model.clone()).or_default().push(run.clone());
                }
                grouped
            })
            .unwrap_or_default();

        let mut candidates: Vec<(String, ModelTaskStats)> = by_model
            .into_iter()
            .filter_map(|(model, runs)| Self::stats_over(&runs).map(|s| (model, s)))
            .collect();
        if candidates.is_empty() {
            return None;
        }

        let reliable: Vec<(String, ModelTaskStats)> = candidates
            .iter()
            .filter(|(_, s)| s.success_rate >= self.reliability_threshold)
            .cloned()
            .collect();
        if !reliable.is_empty() {
            candidates = reliable;
        }

        candidates
            .into_iter()
            .max_by(|(_, a), (_, b)| {
                let ordering = match rank {
                    RankBy::Quality => a
                        .avg_quality_score
                        .unwrap_or(0.0)
                        .partial_cmp(&b.avg_quality_score.unwrap_or(0.0)),
                    // For speed and cost, lower is better: invert.
                    RankBy::Speed => b.avg_latency_ms.partial_cmp(&a.avg_latency_ms),
                    RankBy::Cost => b.avg_cost_usd.partial_cmp(&a.avg_cost_usd),
                };
                ordering.unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|(model, _)| model)
    }
}
