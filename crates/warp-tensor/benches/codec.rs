//! Performance benchmarks for warp-tensor
//!
//! Benchmarks cover:
//! - Record encode/decode
//! - Save and load through each blob database backend

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use tempfile::TempDir;

use warp_tensor::{
    BlobRecord, DbBackend, Device, LoadOp, SaveOp, TensorConfig, TensorData, Workspace,
};

/// Float tensor with `elements` values
fn generate_tensor(elements: usize) -> TensorData {
    let values: Vec<f32> = (0..elements).map(|i| i as f32 * 0.5).collect();
    TensorData::from_slice(vec![elements], &values).unwrap()
}

fn bench_record(c: &mut Criterion) {
    let mut group = c.benchmark_group("record");

    for elements in [256, 4096, 65536, 1048576] {
        let record = BlobRecord::new("bench", generate_tensor(elements), Device::Cpu);
        let bytes = record.to_bytes().unwrap();
        group.throughput(Throughput::Bytes(bytes.len() as u64));

        group.bench_with_input(BenchmarkId::new("encode", elements), &record, |b, record| {
            b.iter(|| black_box(record.to_bytes().unwrap()));
        });

        group.bench_with_input(BenchmarkId::new("decode", elements), &bytes, |b, bytes| {
            b.iter(|| black_box(BlobRecord::from_bytes(bytes.clone()).unwrap()));
        });
    }

    group.finish();
}

fn bench_save_load(c: &mut Criterion) {
    let mut group = c.benchmark_group("save_load");
    group.sample_size(20);

    let blobs = 32;
    let elements = 16384;

    for backend in DbBackend::ALL {
        let temp_dir = TempDir::new().unwrap();
        let mut ws = Workspace::with_config(TensorConfig {
            root_path: temp_dir.path().to_path_buf(),
            ..Default::default()
        });
        let names: Vec<String> = (0..blobs).map(|i| format!("layer_{}", i)).collect();
        for name in &names {
            ws.feed_blob(name.as_str(), generate_tensor(elements), Device::Cpu)
                .unwrap();
        }
        group.throughput(Throughput::Bytes((blobs * elements * 4) as u64));

        let save = SaveOp::new(names.clone(), "bench.db", backend);
        group.bench_function(BenchmarkId::new("save", backend), |b| {
            b.iter(|| black_box(save.run(&ws).unwrap()));
        });

        let load = LoadOp::new(names.clone(), "bench.db", backend);
        group.bench_function(BenchmarkId::new("load", backend), |b| {
            b.iter(|| black_box(load.run(&mut ws).unwrap()));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_record, bench_save_load);
criterion_main!(benches);
