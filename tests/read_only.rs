use blob_log::{
    file::{FileSystem, ReadOnlyFileSystem, StdFileSystem},
    BlobFileBuilder, BlobFileReader, Config, IdGenerator, ReadOptions,
};
use std::sync::Arc;
use test_log::test;

#[test]
fn read_only_fs_reads_but_does_not_write() -> blob_log::Result<()> {
    let folder = tempfile::tempdir()?;
    let config = Config::new(folder.path());

    let mut builder = BlobFileBuilder::new(
        Arc::new(StdFileSystem),
        config.clone(),
        IdGenerator::default(),
    );
    let index = builder
        .add(b"key", b"value")?
        .expect("should be separated");
    builder.finish()?;

    let fs = Arc::new(ReadOnlyFileSystem::new(StdFileSystem));

    let reader = BlobFileReader::create(&*fs, &config, &ReadOptions::default(), 1)?;
    let (blob, _) = reader.get_blob(
        &ReadOptions::default(),
        b"key",
        index.offset,
        index.size,
        index.compression,
        None,
    )?;
    assert_eq!(blob, b"value");

    let mut builder = BlobFileBuilder::new(fs.clone(), config.clone(), IdGenerator::new(2));
    assert!(matches!(
        builder.add(b"key", b"value"),
        Err(blob_log::Error::NotSupported(_))
    ));
    assert!(builder.blob_file_paths().is_empty());

    assert!(matches!(
        fs.remove_file(&blob_log::blob_file_path(config.path(), 1)),
        Err(blob_log::Error::NotSupported(_))
    ));

    Ok(())
}
