use ecs_core::chunk_table::ByteComponent;
use ecs_core::{EcsConfig, Repository};

/// A fixed-size blittable component used purely as benchmark payload. Byte
/// sizes are fixed at compile time for any one `Blob<N>`, unlike the
/// reference engine's runtime-defined table schema — this kernel's
/// component sizes can't be parsed from a CLI flag, so the size-sweeping
/// benchmarks below quantize requested sizes to the nearest supported `Blob`
/// instantiation.
#[derive(Clone, Copy)]
pub struct Blob<const N: usize>(pub [u8; N]);

impl<const N: usize> Default for Blob<N> {
    fn default() -> Self {
        Blob([0u8; N])
    }
}

unsafe impl<const N: usize> ByteComponent for Blob<N> {}

/// Creates a repository sized for `entity_count` entities with one
/// registered `Blob<8>` component, the benchmark suite's default payload.
pub fn benchmark_repository(entity_count: usize) -> Repository {
    let mut repo = Repository::new(EcsConfig {
        max_entities: entity_count.max(1),
        ..EcsConfig::default()
    })
    .expect("failed to build benchmark repository");
    repo.register_byte_packed::<Blob<8>>().expect("failed to register benchmark component");
    repo
}

/// Parse comma-separated string into vector of usize.
pub fn parse_comma_separated(input: &str) -> Vec<usize> {
    input
        .split(',')
        .map(|s| s.trim().parse().expect("invalid value: must be a positive integer"))
        .collect()
}

/// Snaps `requested` to the nearest byte size this benchmark suite actually
/// instantiates a `Blob<N>` for.
pub fn nearest_supported_size(requested: usize) -> usize {
    const SUPPORTED: &[usize] = &[8, 16, 32, 63, 64, 128, 256, 1024, 4096];
    *SUPPORTED
        .iter()
        .min_by_key(|&&s| (s as i64 - requested as i64).abs())
        .expect("SUPPORTED is non-empty")
}

/// Runs all performance regression tests in sequence.
pub fn run_all_benchmarks() {
    use crate::benchmarks;

    println!("Running all performance regression tests...");
    println!("{}", "=".repeat(60));

    println!("\n1. Baseline Read Throughput Test");
    println!("{}", "-".repeat(40));
    benchmarks::baseline_read::run_baseline_read_test(100_000, 1_000_000);

    println!("\n2. Write Throughput Test");
    println!("{}", "-".repeat(40));
    benchmarks::write_throughput::run_write_throughput_test(10_000);

    println!("\n3. Mixed Workload Test");
    println!("{}", "-".repeat(40));
    benchmarks::mixed_workload::run_mixed_workload_test(100_000, 80);

    println!("\n4. Query Scaling Test");
    println!("{}", "-".repeat(40));
    benchmarks::query_scaling::run_query_scaling_test(1_000_000, "1,2,4,8");

    println!("\n5. Memory Overhead Test");
    println!("{}", "-".repeat(40));
    benchmarks::memory_overhead::run_memory_overhead_test("64,256,1024,4096", "1000,5000,10000");

    println!("\n6. Cache Line Contention Test");
    println!("{}", "-".repeat(40));
    benchmarks::cache_contention::run_cache_contention_test("1,2,4", "63,64,128", 10_000);

    println!("\n{}", "=".repeat(60));
    println!("All tests completed.");
}
