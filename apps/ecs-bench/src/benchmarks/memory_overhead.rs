use crate::utils::{nearest_supported_size, parse_comma_separated, Blob};
use ecs_core::chunk_table::RawChunkTable;
use ecs_core::{EcsConfig, Repository};

/// Builds a repository with a single `Blob<N>` component registered and
/// `entity_count` entities populated, returning it alongside the
/// component's table id for memory accounting.
fn populate<const N: usize>(entity_count: usize) -> (Repository, u8) {
    let mut repo = Repository::new(EcsConfig {
        max_entities: entity_count.max(1),
        ..EcsConfig::default()
    })
    .expect("failed to build memory_overhead repository");
    let id = repo
        .register_byte_packed::<Blob<N>>()
        .expect("failed to register component in memory_overhead");

    for i in 0..entity_count {
        let h = repo.create_entity();
        let mut payload = [0u8; N];
        if N >= 8 {
            payload[0..8].copy_from_slice(&(i as u64).to_le_bytes());
        }
        repo.add(h, Blob(payload))
            .expect("Failed to add component in memory_overhead");
    }
    (repo, id)
}

fn measure(record_size: usize, table: &dyn RawChunkTable, entity_count: usize) -> (usize, usize, f64) {
    let raw_data_bytes = record_size * entity_count;
    let committed_chunks = (0..table.total_chunks())
        .filter(|&i| table.is_chunk_committed(i))
        .count();
    let total_memory_bytes = committed_chunks * table.chunk_capacity() * table.record_size();
    let overhead_bytes = total_memory_bytes.saturating_sub(raw_data_bytes);
    let overhead_percentage = if raw_data_bytes > 0 {
        (overhead_bytes as f64 / raw_data_bytes as f64) * 100.0
    } else {
        0.0
    };
    (raw_data_bytes, total_memory_bytes, overhead_percentage)
}

macro_rules! measure_for_size {
    ($size:expr, $entity_count:expr, $($n:literal),+ $(,)?) => {
        match $size {
            $(
                $n => {
                    let (repo, id) = populate::<$n>($entity_count);
                    let table = repo.get_raw_table(id).expect("registered table missing");
                    measure($n, table.as_ref(), $entity_count)
                }
            )+
            other => panic!("unsupported benchmark component size: {other}"),
        }
    };
}

/// Run per-entity memory overhead test.
pub fn run_memory_overhead_test(component_sizes_str: &str, entity_counts_str: &str) {
    println!("Running memory overhead test...");
    println!("Target: <5% overhead beyond raw component data size");
    println!("Component sizes: {}", component_sizes_str);
    println!("Entity counts: {}", entity_counts_str);

    // Parse component sizes and entity counts
    let requested_sizes = parse_comma_separated(component_sizes_str);
    let entity_counts = parse_comma_separated(entity_counts_str);

    if requested_sizes.is_empty() || entity_counts.is_empty() {
        eprintln!("Error: No component sizes or entity counts specified");
        std::process::exit(1);
    }

    // Validate all sizes and counts are positive
    for &size in &requested_sizes {
        if size == 0 {
            eprintln!("Error: Component size must be greater than 0");
            std::process::exit(1);
        }
    }
    for &count in &entity_counts {
        if count == 0 {
            eprintln!("Error: Entity count must be greater than 0");
            std::process::exit(1);
        }
    }

    let mut all_results = Vec::new();
    let mut failed_tests = Vec::new();

    for &requested_size in &requested_sizes {
        let component_size = nearest_supported_size(requested_size);
        if component_size != requested_size {
            println!(
                "\nNote: requested size {} quantized to nearest supported component size {}",
                requested_size, component_size
            );
        }

        for &entity_count in &entity_counts {
            println!(
                "\nTesting component_size={}, entity_count={}",
                component_size, entity_count
            );

            println!("  Populating {} entities...", entity_count);
            let start_populate = std::time::Instant::now();

            let (raw_data_bytes, total_memory_bytes, overhead_percentage) = measure_for_size!(
                component_size,
                entity_count,
                8,
                16,
                32,
                63,
                64,
                128,
                256,
                1024,
                4096
            );

            println!("  Population complete in {:?}", start_populate.elapsed());

            println!("  Results:");
            println!("    Raw data size: {} bytes", raw_data_bytes);
            println!("    Total memory: {} bytes", total_memory_bytes);
            println!(
                "    Overhead: {} bytes ({:.2}%)",
                total_memory_bytes.saturating_sub(raw_data_bytes),
                overhead_percentage
            );

            // Check if overhead is within target
            if overhead_percentage < 5.0 {
                println!("    ✅ PASS: Overhead <5%");
                all_results.push((component_size, entity_count, overhead_percentage, true));
            } else {
                println!("    ❌ FAIL: Overhead ≥5% (target: <5%)");
                all_results.push((component_size, entity_count, overhead_percentage, false));
                failed_tests.push((component_size, entity_count, overhead_percentage));
            }
        }
    }

    // Print summary
    println!("\n{}", "=".repeat(60));
    println!("Memory Overhead Test Summary:");
    println!("{}", "-".repeat(60));

    for (size, count, overhead, passed) in &all_results {
        let status = if *passed { "✅ PASS" } else { "❌ FAIL" };
        println!(
            "  {}: size={}, count={}, overhead={:.2}%",
            status, size, count, overhead
        );
    }

    if failed_tests.is_empty() {
        println!("\n✅ ALL TESTS PASSED: All memory overheads <5%");
    } else {
        println!("\n❌ SOME TESTS FAILED:");
        for (size, count, overhead) in failed_tests {
            println!(
                "  size={}, count={}, overhead={:.2}%",
                size, count, overhead
            );
        }
        std::process::exit(1);
    }
}
