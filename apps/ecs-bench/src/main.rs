//! Performance regression CLI for the ECS kernel.
//!
//! - Baseline component-read throughput: >10M reads/sec/core
//! - Entity-create + component-write throughput: >1M writes/sec/core
//! - Mixed read/write workload
//! - Parallel-query scaling across core counts
//! - Per-entity memory overhead beyond raw component bytes
//! - Cache-line contention across concurrent writer threads

mod benchmarks;
mod cli;
mod utils;

use clap::Parser;
use cli::{Cli, Commands};

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::BaselineRead { iterations, entity_count } => {
            if entity_count == 0 {
                eprintln!("Error: entity_count must be greater than 0");
                std::process::exit(1);
            }
            benchmarks::baseline_read::run_baseline_read_test(iterations, entity_count);
        }
        Commands::WriteThroughput { iterations } => {
            benchmarks::write_throughput::run_write_throughput_test(iterations);
        }
        Commands::MixedWorkload { operations, read_percent } => {
            if read_percent > 100 {
                eprintln!("Error: read_percent must be between 0 and 100");
                std::process::exit(1);
            }
            if operations == 0 {
                eprintln!("Error: operations must be greater than 0");
                std::process::exit(1);
            }
            benchmarks::mixed_workload::run_mixed_workload_test(operations, read_percent);
        }
        Commands::QueryScaling { entity_count, cores } => {
            if entity_count == 0 {
                eprintln!("Error: entity_count must be greater than 0");
                std::process::exit(1);
            }
            benchmarks::query_scaling::run_query_scaling_test(entity_count, &cores);
        }
        Commands::MemoryOverhead { component_sizes, entity_counts } => {
            benchmarks::memory_overhead::run_memory_overhead_test(&component_sizes, &entity_counts);
        }
        Commands::CacheContention { thread_counts, component_sizes, operations } => {
            benchmarks::cache_contention::run_cache_contention_test(&thread_counts, &component_sizes, operations);
        }
        Commands::All => {
            utils::run_all_benchmarks();
        }
    }
}
