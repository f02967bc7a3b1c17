use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use spool::streaming::{send_path, serve_connection};
use std::fs;
use tempfile::TempDir;

const FILE_SIZE: usize = 8 * 1024 * 1024;

/// Push one file through an in-memory pipe at buffer sizes 2^10..2^19.
fn bench_send_by_buffer_size(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap();

    let temp = TempDir::new().unwrap();
    let source = temp.path().join("payload.bin");
    let data: Vec<u8> = (0..FILE_SIZE).map(|i| (i % 251) as u8).collect();
    fs::write(&source, &data).unwrap();

    let mut group = c.benchmark_group("send_file");
    group.throughput(Throughput::Bytes(FILE_SIZE as u64));
    group.sample_size(20);

    for exp in 10..20 {
        let buf_size = 1usize << exp;
        let dest = temp.path().join(format!("dest-{}", buf_size));

        group.bench_with_input(BenchmarkId::from_parameter(buf_size), &buf_size, |b, &buf_size| {
            b.iter(|| {
                rt.block_on(async {
                    let (client, server) = tokio::io::duplex(256 * 1024);
                    let served = tokio::spawn(serve_connection(server));
                    send_path(client, &source, &dest, buf_size).await.unwrap();
                    served.await.unwrap().unwrap();
                })
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_send_by_buffer_size);
criterion_main!(benches);
