// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use clap::Parser;
use pregel_core::{Conductor, ConductorConfig};
use pregel_sim::{InMemoryGraph, LocalWorkerPool, PageRank};
use rand::Rng;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(about = "Run PageRank on a random graph over the local worker pool")]
struct Args {
    #[arg(long, default_value_t = 1000)]
    vertices: usize,

    #[arg(long, default_value_t = 5)]
    edges_per_vertex: usize,

    #[arg(long, default_value_t = 4)]
    workers: usize,

    #[arg(long, default_value_t = 2)]
    shards_per_worker: usize,

    #[arg(long, default_value_t = 0.0001)]
    threshold: f64,

    #[arg(long, default_value_t = 100)]
    max_supersteps: u64,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();
    let args = Args::parse();
    let start_time = Instant::now();

    println!("=== PAGERANK SIMULATION ===");
    println!("Configuration:");
    println!("  - Vertices: {}", args.vertices);
    println!("  - Edges per vertex: {}", args.edges_per_vertex);
    println!("  - Workers: {}", args.workers);
    println!("  - Shards per worker: {}", args.shards_per_worker);
    println!("  - Convergence threshold: {}", args.threshold);
    println!("\nGenerating graph...");

    let mut rng = rand::rng();
    let mut graph = InMemoryGraph::new(args.workers, args.shards_per_worker);
    for i in 0..args.vertices {
        graph.add_vertex(&format!("v{}", i), 0.0);
    }
    for i in 0..args.vertices {
        for _ in 0..args.edges_per_vertex {
            let target = rng.random_range(0..args.vertices);
            if target != i {
                graph.add_edge(&format!("v{}", i), &format!("v{}", target), ());
            }
        }
    }
    println!("Generated {} vertices", graph.vertex_count());

    let algorithm = PageRank::new(args.threshold);
    let pool = LocalWorkerPool::new(graph, &algorithm);
    let config = ConductorConfig {
        max_supersteps: args.max_supersteps,
        ..ConductorConfig::default()
    };
    let mut conductor = Conductor::for_algorithm(pool, &algorithm, config);

    let cancel = CancellationToken::new();
    let ctrl_c_token = cancel.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to listen for Ctrl+C");
        println!("\n\n=== Ctrl+C received, aborting run ===");
        ctrl_c_token.cancel();
    });

    println!("\nStarting execution...");
    let report = tokio::select! {
        result = conductor.run() => match result {
            Ok(report) => report,
            Err(e) => {
                eprintln!("Execution failed: {}", e);
                return;
            }
        },
        _ = cancel.cancelled() => {
            println!("Run cancelled");
            return;
        }
    };

    println!("\n=== RESULTS ===");
    println!("Algorithm: {}", report.algorithm);
    println!("Supersteps: {}", report.supersteps);
    println!(
        "Converged: {}",
        if report.halted_by_master { "yes" } else { "no" }
    );

    let mut values = conductor.channel_mut().vertex_values().await;
    values.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal));

    let total_rank: f64 = values.iter().map(|(_, _, rank)| rank).sum();
    println!("Total rank: {:.6}", total_rank);
    println!("Top vertices:");
    for (shard, key, rank) in values.iter().take(10) {
        println!("  {} (shard {}): {:.6}", key, shard, rank);
    }

    println!("\nWorker traffic:");
    let mut worker_stats: Vec<_> = report.worker_stats.iter().collect();
    worker_stats.sort_by_key(|(id, _)| **id);
    for (worker, stats) in worker_stats {
        println!(
            "  worker {}: sent {}, received {}, {:.3}s compute",
            worker, stats.send_count, stats.received_count, stats.superstep_runtime_in_seconds
        );
    }

    let elapsed = start_time.elapsed();
    println!("\n=== SIMULATION COMPLETE ===");
    println!("Total time: {:.2}s", elapsed.as_secs_f64());
}
