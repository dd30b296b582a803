pub mod baseline_read;
pub mod cache_contention;
pub mod memory_overhead;
pub mod mixed_workload;
pub mod query_scaling;
pub mod write_throughput;
