//! Effect engine benchmarks
//!
//! Measures the full per-block processing path: effect chain in the current
//! order, then the EQ filter bank with its analyzer taps.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use osprey_core::{EffectEngine, EffectStage, EngineConfig};

fn benchmark_block_processing(c: &mut Criterion) {
    let mut group = c.benchmark_group("block_processor");

    // Typical buffer sizes used in real-time audio
    for frames in [64, 128, 256, 512, 1024] {
        let mut engine = EffectEngine::new(EngineConfig::default()).unwrap();
        let mut processor = engine.prepare(48_000.0, frames).unwrap();

        let mut buffer: Vec<f32> = (0..frames * 2)
            .map(|i| (i as f32 * 0.001).sin())
            .collect();

        group.throughput(Throughput::Elements(frames as u64));
        group.bench_function(format!("process_{}_frames", frames), |b| {
            b.iter(|| {
                processor.process(black_box(&mut buffer));
            })
        });
    }

    group.finish();
}

fn benchmark_order_adoption(c: &mut Criterion) {
    let mut engine = EffectEngine::new(EngineConfig::default()).unwrap();
    let mut processor = engine.prepare(48_000.0, 256).unwrap();
    let mut buffer = vec![0.0_f32; 256 * 2];

    let order = [
        EffectStage::Delay,
        EffectStage::Reverb,
        EffectStage::Chorus,
        EffectStage::Phaser,
    ];

    c.bench_function("order_push_and_adopt", |b| {
        b.iter(|| {
            engine.push_order(black_box(order));
            processor.process(black_box(&mut buffer));
        })
    });
}

criterion_group!(benches, benchmark_block_processing, benchmark_order_adoption);
criterion_main!(benches);
