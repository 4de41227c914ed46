use blob_log::{
    BlobFileBuilder, Cache, BlobFileCache, BlobSource, CompressionType, Config, IdGenerator, LruCache,
    MockFileSystem, ReadOptions,
};
use std::sync::Arc;
use test_log::test;

fn roundtrip(compression: CompressionType) -> blob_log::Result<()> {
    let fs = MockFileSystem::default();
    let config = Config::new("blobs").compression(compression);

    let mut builder = BlobFileBuilder::new(
        Arc::new(fs.clone()),
        config.clone(),
        IdGenerator::default(),
    );

    let value = "compressible ".repeat(1_000);
    let index = builder
        .add(b"key", value.as_bytes())?
        .expect("should be separated");
    builder.finish()?;

    assert_eq!(compression, index.compression);

    let blob_cache = Arc::new(LruCache::new(1_024 * 1_024, 0, false));
    let source = BlobSource::new(
        Arc::new(BlobFileCache::new(
            Arc::new(LruCache::new(10, 0, false)),
            Arc::new(fs),
            config,
        )),
        Some(blob_cache.clone()),
    );

    let (blob, bytes_read) = source.get_blob(&ReadOptions::default(), b"key", &index, None)?;
    assert_eq!(blob, value.as_bytes());

    if compression != CompressionType::None {
        assert!(index.size < value.len() as u64);
        assert!(bytes_read < value.len() as u64);
    }

    // The blob cache holds the uncompressed value
    assert_eq!(value.len(), blob_cache.usage());

    Ok(())
}

#[test]
fn compression_none() -> blob_log::Result<()> {
    roundtrip(CompressionType::None)
}

#[test]
#[cfg(feature = "lz4")]
fn compression_lz4() -> blob_log::Result<()> {
    roundtrip(CompressionType::Lz4)
}

#[test]
#[cfg(feature = "miniz")]
fn compression_miniz() -> blob_log::Result<()> {
    roundtrip(CompressionType::Miniz(6))
}

#[test]
#[cfg(feature = "lz4")]
fn compression_mismatch() -> blob_log::Result<()> {
    let fs = MockFileSystem::default();
    let config = Config::new("blobs").compression(CompressionType::Lz4);

    let mut builder = BlobFileBuilder::new(
        Arc::new(fs.clone()),
        config.clone(),
        IdGenerator::default(),
    );
    let mut index = builder
        .add(b"key", b"value")?
        .expect("should be separated");
    builder.finish()?;

    index.compression = CompressionType::None;

    let source = BlobSource::new(
        Arc::new(BlobFileCache::new(
            Arc::new(LruCache::new(10, 0, false)),
            Arc::new(fs),
            config,
        )),
        None,
    );

    assert!(matches!(
        source.get_blob(&ReadOptions::default(), b"key", &index, None),
        Err(blob_log::Error::Corruption(_))
    ));

    Ok(())
}
