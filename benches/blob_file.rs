use blob_log::{
    file::StdFileSystem, BlobFileBuilder, BlobFileCache, BlobReadRequest, BlobSource, Config,
    FilePrefetchBuffer, IdGenerator, LruCache, ReadOptions,
};
use criterion::{criterion_group, criterion_main, Criterion};
use rand::{Rng, RngCore};
use std::sync::Arc;

fn write_blobs(c: &mut Criterion) {
    let mut group = c.benchmark_group("write blob");

    for size in [128, 4_096, 64_000] {
        let folder = tempfile::tempdir().unwrap();
        let config = Config::new(folder.path());

        let mut data = vec![0u8; size];
        rand::thread_rng().fill_bytes(&mut data);

        let mut builder =
            BlobFileBuilder::new(Arc::new(StdFileSystem), config, IdGenerator::default());
        let mut idx = 0_u64;

        group.bench_function(format!("{size} bytes"), |b| {
            b.iter(|| {
                idx += 1;
                builder.add(&idx.to_be_bytes(), &data).unwrap();
            });
        });

        builder.finish().unwrap();
    }
}

fn load_blob(c: &mut Criterion) {
    let mut group = c.benchmark_group("load blob");

    for size in [128, 4_096, 64_000] {
        let folder = tempfile::tempdir().unwrap();
        let config = Config::new(folder.path());
        let fs = Arc::new(StdFileSystem);

        let mut builder = BlobFileBuilder::new(fs.clone(), config.clone(), IdGenerator::default());

        let mut indexes = vec![];
        for idx in 0..1_000_u64 {
            let mut data = vec![0u8; size];
            rand::thread_rng().fill_bytes(&mut data);

            let index = builder.add(&idx.to_be_bytes(), &data).unwrap().unwrap();
            indexes.push((idx.to_be_bytes(), index));
        }
        builder.finish().unwrap();

        let blob_file_cache = Arc::new(BlobFileCache::new(
            Arc::new(LruCache::new(100, 0, false)),
            fs,
            config,
        ));

        {
            let source = BlobSource::new(blob_file_cache.clone(), None);
            let mut rng = rand::thread_rng();

            group.bench_function(format!("{size} bytes (uncached)"), |b| {
                b.iter(|| {
                    let (key, index) = &indexes[rng.gen_range(0..indexes.len())];
                    source
                        .get_blob(&ReadOptions::default(), key, index, None)
                        .unwrap();
                });
            });
        }

        {
            let source = BlobSource::new(
                blob_file_cache.clone(),
                Some(Arc::new(LruCache::with_capacity_bytes(1_024 * 1_024 * 1_024))),
            );
            let mut rng = rand::thread_rng();

            group.bench_function(format!("{size} bytes (cached)"), |b| {
                b.iter(|| {
                    let (key, index) = &indexes[rng.gen_range(0..indexes.len())];
                    source
                        .get_blob(&ReadOptions::default(), key, index, None)
                        .unwrap();
                });
            });
        }
    }
}

fn prefetch(c: &mut Criterion) {
    let mut group = c.benchmark_group("prefetch range");

    let item_size = 1_024;
    let range_size = 100;

    let folder = tempfile::tempdir().unwrap();
    let config = Config::new(folder.path());
    let fs = Arc::new(StdFileSystem);

    let mut builder = BlobFileBuilder::new(fs.clone(), config.clone(), IdGenerator::default());

    let mut indexes = vec![];
    for idx in 0..range_size as u64 {
        let mut data = vec![0u8; item_size];
        rand::thread_rng().fill_bytes(&mut data);

        let index = builder.add(&idx.to_be_bytes(), &data).unwrap().unwrap();
        indexes.push((idx.to_be_bytes(), index));
    }
    builder.finish().unwrap();

    let source = BlobSource::new(
        Arc::new(BlobFileCache::new(
            Arc::new(LruCache::new(100, 0, false)),
            fs,
            config,
        )),
        None,
    );

    group.bench_function(format!("{range_size}x{item_size}B - no prefetch"), |b| {
        b.iter(|| {
            for (key, index) in &indexes {
                source
                    .get_blob(&ReadOptions::default(), key, index, None)
                    .unwrap();
            }
        });
    });

    group.bench_function(format!("{range_size}x{item_size}B - with prefetch"), |b| {
        b.iter(|| {
            let mut prefetch_buffer = FilePrefetchBuffer::new(256 * 1_024);

            for (key, index) in &indexes {
                source
                    .get_blob(
                        &ReadOptions::default(),
                        key,
                        index,
                        Some(&mut prefetch_buffer),
                    )
                    .unwrap();
            }
        });
    });

    group.bench_function(format!("{range_size}x{item_size}B - multi get"), |b| {
        b.iter(|| {
            let mut requests = indexes
                .iter()
                .map(|(key, index)| {
                    BlobReadRequest::new(&key[..], index.offset, index.size, index.compression)
                })
                .collect::<Vec<_>>();

            source.multi_get_blob(&ReadOptions::default(), 1, &mut requests);
        });
    });
}

criterion_group!(benches, write_blobs, load_blob, prefetch);
criterion_main!(benches);
