//! Global assignment planning.
//!
//! The planner sees the post-matching summaries of every task and decides
//! which logical particle each new index is drawn from, and which task will
//! own it. Its [`ParticleAssignments`] output is broadcast unchanged to all
//! tasks.
//!
//! [`LowVariancePlanner`] is the reference implementation: systematic
//! (low-variance) resampling over the whole population once the effective
//! sample size drops below a threshold.

use std::collections::{BTreeMap, HashMap};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::io::messages::{
    ParticleAssignment, ParticleAssignments, ParticleSummaries, ParticleValue, ParticleValues,
    Trace,
};
use crate::particles::Partition;

/// Decides the resampling outcome of one cycle.
pub trait AssignmentPlanner: Send {
    /// Plan assignments from the summaries of every task for one scan.
    fn plan(&mut self, summaries: &[ParticleSummaries]) -> ParticleAssignments;
}

/// Configuration for [`LowVariancePlanner`].
#[derive(Debug, Clone)]
pub struct LowVariancePlannerConfig {
    /// Resample when N_eff < threshold × N.
    pub resampling_threshold: f64,
    /// RNG seed (0 = seed from the OS).
    pub seed: u64,
}

impl Default for LowVariancePlannerConfig {
    fn default() -> Self {
        Self {
            resampling_threshold: 0.5,
            seed: 0,
        }
    }
}

/// Systematic resampling across every task.
pub struct LowVariancePlanner {
    partition: Partition,
    config: LowVariancePlannerConfig,
    rng: StdRng,
    cycle: u64,
}

impl LowVariancePlanner {
    /// Create a planner for the given particle partition.
    pub fn new(partition: Partition, config: LowVariancePlannerConfig) -> Self {
        let rng = if config.seed == 0 {
            StdRng::from_os_rng()
        } else {
            StdRng::seed_from_u64(config.seed)
        };
        Self {
            partition,
            config,
            rng,
            cycle: 0,
        }
    }

    /// Number of cycles planned so far.
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Partition the planner assigns new indices against.
    pub fn partition(&self) -> &Partition {
        &self.partition
    }
}

impl AssignmentPlanner for LowVariancePlanner {
    fn plan(&mut self, summaries: &[ParticleSummaries]) -> ParticleAssignments {
        self.cycle += 1;
        let trace = merge_traces(summaries, self.cycle);

        let mut particles: Vec<&ParticleValue> =
            summaries.iter().flat_map(|s| s.values.iter()).collect();
        particles.sort_by_key(|v| v.index);

        let mut assignments = ParticleAssignments {
            trace: Some(trace),
            cycle: self.cycle,
            timestamp_us: summaries
                .iter()
                .find_map(|s| s.scan.as_ref())
                .map_or(0, |scan| scan.timestamp_us),
            ..Default::default()
        };
        if particles.is_empty() {
            log::warn!("Planner cycle {}: no particles in summaries", self.cycle);
            return assignments;
        }

        let weights = normalized_weights(&particles);
        let best = weights
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap_or(0);

        let sum_sq: f64 = weights.iter().map(|w| w * w).sum();
        let neff = if sum_sq > 1e-10 { 1.0 / sum_sq } else { 0.0 };
        let threshold = self.config.resampling_threshold * particles.len() as f64;

        if neff >= threshold {
            log::debug!(
                "Planner cycle {}: N_eff {:.1} >= {:.1}, keeping particles",
                self.cycle,
                neff,
                threshold
            );
            assignments.assignments = particles
                .iter()
                .map(|p| ParticleAssignment {
                    previous_task: p.task_id,
                    previous_index: p.index,
                    new_task: p.task_id,
                    new_index: p.index,
                })
                .collect();
            assignments.best_particle_index = particles[best].index;
            return assignments;
        }

        let selected = low_variance_select(&weights, &mut self.rng);

        // New indices reuse the submitted index set so a task that did not
        // report this cycle is never handed a slot.
        let mut best_new_index = None;
        assignments.assignments = particles
            .iter()
            .zip(&selected)
            .map(|(slot, &source)| {
                let src = particles[source];
                if source == best && best_new_index.is_none() {
                    best_new_index = Some(slot.index);
                }
                ParticleAssignment {
                    previous_task: src.task_id,
                    previous_index: src.index,
                    new_task: self.partition.owner_of(slot.index).unwrap_or(slot.task_id),
                    new_index: slot.index,
                }
            })
            .collect();
        assignments.resampled = true;
        assignments.best_particle_index = best_new_index.unwrap_or(particles[best].index);

        log::info!(
            "Planner cycle {}: resampled {} particles (N_eff {:.1} < {:.1})",
            self.cycle,
            particles.len(),
            neff,
            threshold
        );
        assignments
    }
}

/// Value batches implied by a resampling decision, keyed by destination task.
///
/// Every assignment produces one value addressed to `(new_task, new_index)`
/// carrying the source particle's pose with a uniform weight. Returns nothing
/// when the planner did not resample.
pub fn values_for_assignments(
    summaries: &[ParticleSummaries],
    assignments: &ParticleAssignments,
) -> BTreeMap<u32, ParticleValues> {
    let mut batches: BTreeMap<u32, ParticleValues> = BTreeMap::new();
    if !assignments.resampled || assignments.assignments.is_empty() {
        return batches;
    }

    let sources: HashMap<(u32, u32), &ParticleValue> = summaries
        .iter()
        .flat_map(|s| s.values.iter().map(move |v| ((s.task_id, v.index), v)))
        .collect();
    let weight = 1.0 / assignments.assignments.len() as f64;

    for a in &assignments.assignments {
        let Some(source) = sources.get(&(a.previous_task, a.previous_index)) else {
            log::warn!(
                "No summary for particle {} of task {}, value not sent",
                a.previous_index,
                a.previous_task
            );
            continue;
        };
        batches
            .entry(a.new_task)
            .or_insert_with(|| ParticleValues {
                values: Vec::new(),
                cycle: assignments.cycle,
            })
            .values
            .push(ParticleValue {
                task_id: a.new_task,
                index: a.new_index,
                pose: source.pose,
                weight,
            });
    }
    batches
}

/// Combine the per-task timing of every summary into one trace.
fn merge_traces(summaries: &[ParticleSummaries], cycle: u64) -> Trace {
    let mut trace = Trace {
        cycle,
        ..Default::default()
    };
    for summary in summaries {
        if let Some(t) = &summary.trace {
            trace.scan_match_ms.extend(t.scan_match_ms.iter());
        }
    }
    trace
}

/// Weights normalized to sum to one, uniform if they vanish.
fn normalized_weights(particles: &[&ParticleValue]) -> Vec<f64> {
    let n = particles.len();
    let sum: f64 = particles.iter().map(|p| p.weight.max(0.0)).sum();
    if sum > 1e-300 {
        particles.iter().map(|p| p.weight.max(0.0) / sum).collect()
    } else {
        vec![1.0 / n as f64; n]
    }
}

/// Low-variance selection of `weights.len()` source positions.
fn low_variance_select<R: Rng>(weights: &[f64], rng: &mut R) -> Vec<usize> {
    let n = weights.len();
    let mut cumulative = Vec::with_capacity(n);
    let mut sum = 0.0;
    for w in weights {
        sum += w;
        cumulative.push(sum);
    }

    let step = 1.0 / n as f64;
    let mut r = rng.random::<f64>() * step;
    let mut idx = 0;
    let mut selected = Vec::with_capacity(n);
    for _ in 0..n {
        while r > cumulative[idx] && idx < n - 1 {
            idx += 1;
        }
        selected.push(idx);
        r += step;
    }
    selected
}
