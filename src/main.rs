//! VibhagaSLAM local cluster
//!
//! Runs every task, the planner and a synthetic scan source in one process
//! and prints the best particle of each cycle.
//!
//! # Usage
//!
//! ```bash
//! # With default config
//! cargo run --release
//!
//! # With custom config file and cycle count
//! cargo run --release -- --config vibhaga-slam.toml --cycles 500
//! ```

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;

use vibhaga_slam::config::{Config, load_config};
use vibhaga_slam::engine::LowVariancePlanner;
use vibhaga_slam::io::codec::pose_or_identity;
use vibhaga_slam::particles::Partition;
use vibhaga_slam::sim::{ClusterError, JitterMatcher, LocalCluster, SyntheticScanSource};

/// Distributed particle resampling on a local cluster
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of scans to run (overrides sim.cycles, 0 = until interrupted)
    #[arg(long)]
    cycles: Option<u64>,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {} - {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();

    let args = Args::parse();
    let mut config = load_config(args.config.as_deref());
    if let Some(cycles) = args.cycles {
        config.sim.cycles = cycles;
    }

    log::info!("vibhaga-slam starting");
    log::info!(
        "  Particles: {} over {} tasks",
        config.cluster.total_particles,
        config.cluster.tasks
    );
    log::info!(
        "  Dispatch: {} workers, timeout {}",
        config.dispatch.workers,
        match config.dispatch.timeout_ms {
            0 => "none".to_string(),
            ms => format!("{ms} ms"),
        }
    );
    log::info!(
        "  Resampling threshold: {}",
        config.planner.resampling_threshold
    );

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        r.store(false, Ordering::Relaxed);
    }) {
        log::warn!("Error setting Ctrl-C handler: {}", e);
    }

    if let Err(e) = run(&config, &running) {
        log::error!("Cluster error: {}", e);
        std::process::exit(1);
    }

    log::info!("vibhaga-slam shutdown complete");
}

fn run(config: &Config, running: &AtomicBool) -> Result<(), Box<dyn std::error::Error>> {
    config.validate()?;

    let partition = Partition::new(config.cluster.total_particles, config.cluster.tasks)?;
    let planner = LowVariancePlanner::new(partition, config.planner_config());
    let mut cluster = LocalCluster::start(
        config.cluster_config(),
        |task_id| JitterMatcher::new(config.matcher_config(task_id)),
        planner,
    )?;

    let interval = Duration::from_millis(config.sim.scan_interval_ms);
    let scans = SyntheticScanSource::new(config.scan_source_config());
    let mut emitted = 0u64;
    let mut timeouts = 0u64;

    for (n, scan) in scans.enumerate() {
        if !running.load(Ordering::Relaxed)
            || (config.sim.cycles > 0 && n as u64 >= config.sim.cycles)
        {
            break;
        }
        let started = Instant::now();

        match cluster.step(&scan) {
            Ok(report) => {
                if let Some(best) = &report.best {
                    emitted += 1;
                    let pose = pose_or_identity(best.pose);
                    let cycle = report.trace.as_ref().map_or(0, |t| t.cycle);
                    log::info!(
                        "Scan {}: best particle {} on task {} at ({:.3}, {:.3}, {:.3}) [cycle {}]",
                        report.timestamp_us,
                        best.index,
                        best.task_id,
                        pose.x,
                        pose.y,
                        pose.theta,
                        cycle
                    );
                }
            }
            Err(e @ ClusterError::ReadyTimeout { .. }) => {
                timeouts += 1;
                log::warn!("Scan {}: {}", scan.timestamp_us, e);
                cluster.reset()?;
            }
            Err(e) => {
                cluster.shutdown();
                return Err(e.into());
            }
        }

        if let Some(rest) = interval.checked_sub(started.elapsed()) {
            thread::sleep(rest);
        }
    }

    let summary = cluster.shutdown();
    log::info!(
        "Planned {} cycles, {} best particles emitted, {} ready timeouts",
        summary.cycles_planned,
        emitted,
        timeouts
    );
    for (task_id, stats) in summary.tasks.iter().enumerate() {
        log::info!(
            "  taskId {}: {} completed, {} skipped, {} aborted, {} maps sent, {} maps received, {} dropped",
            task_id,
            stats.cycles_completed,
            stats.cycles_skipped,
            stats.cycles_aborted,
            stats.maps_sent,
            stats.maps_received,
            stats.messages_dropped
        );
    }
    Ok(())
}
