use crate::utils::{benchmark_repository, Blob};
use std::time::Instant;

/// Run baseline component-read throughput test.
pub fn run_baseline_read_test(iterations: usize, entity_count: usize) {
    println!("Running baseline component-read throughput test...");
    println!(
        "Iterations: {}, Pre-populated entities: {}",
        iterations, entity_count
    );

    if entity_count == 0 {
        eprintln!("Error: entity_count must be greater than 0");
        std::process::exit(1);
    }

    let mut repo = benchmark_repository(entity_count);

    // Pre-populate entities
    println!("Pre-populating {} entities...", entity_count);
    let start_populate = Instant::now();
    let mut handles = Vec::with_capacity(entity_count);

    let batch_size = 10_000;
    let total_batches = entity_count.div_ceil(batch_size);

    for batch in 0..total_batches {
        let start = batch * batch_size;
        let end = (start + batch_size).min(entity_count);

        for i in start..end {
            let h = repo.create_entity();
            repo.add(h, Blob::<8>((i as u64).to_le_bytes()))
                .expect("Failed to add component in baseline_read");
            handles.push(h);
        }

        if batch % 10 == 0 || batch == total_batches - 1 {
            println!("  Progress: {}/{} entities", end, entity_count);
        }
    }

    let populate_time = start_populate.elapsed();
    println!("Pre-population complete in {:?}", populate_time);
    println!("Actual entities alive: {}", repo.active_count());

    // Run read benchmark
    println!("Starting read benchmark...");
    let start = Instant::now();

    for i in 0..iterations {
        let h = handles[i % handles.len()];
        let result = repo.get::<Blob<8>>(h);
        let _ = std::hint::black_box(result);
    }

    let elapsed = start.elapsed();
    if elapsed > std::time::Duration::from_secs(30) {
        println!("Warning: test took longer than 30 seconds");
    }
    let reads_per_sec = if elapsed.as_secs_f64() == 0.0 {
        0.0
    } else {
        iterations as f64 / elapsed.as_secs_f64()
    };

    println!("Results:");
    println!("  Total time: {:?}", elapsed);
    println!("  Reads per second: {:.2}", reads_per_sec);
    println!("  Target: >10,000,000 reads/sec/core");

    // Performance assertion
    if reads_per_sec > 10_000_000.0 {
        println!("  ✅ PASS: Baseline read throughput meets target");
    } else {
        println!("  ❌ FAIL: Baseline read throughput below target");
        println!(
            "     Performance: {:.2} reads/sec (target: >10M reads/sec/core)",
            reads_per_sec
        );
    }
}
