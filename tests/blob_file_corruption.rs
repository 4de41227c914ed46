use blob_log::{
    blob_file_path, file::StdFileSystem, format::HEADER_SIZE, BlobFileBuilder, BlobFileReader,
    BlobIndex, Config, IdGenerator, ReadOptions,
};
use std::sync::Arc;
use test_log::test;

fn write_file(config: &Config) -> blob_log::Result<Vec<(Vec<u8>, BlobIndex)>> {
    let mut builder = BlobFileBuilder::new(
        Arc::new(StdFileSystem),
        config.clone(),
        IdGenerator::default(),
    );

    let mut items = vec![];
    for key in ["a", "bb", "ccc"] {
        let index = builder
            .add(key.as_bytes(), key.repeat(5).as_bytes())?
            .expect("should be separated");
        items.push((key.as_bytes().to_vec(), index));
    }
    builder.finish()?;

    Ok(items)
}

fn read_all(config: &Config, items: &[(Vec<u8>, BlobIndex)]) -> blob_log::Result<()> {
    let read_options = ReadOptions::default();
    let reader = BlobFileReader::create(&StdFileSystem, config, &read_options, 1)?;

    for (key, index) in items {
        reader.get_blob(
            &read_options,
            key,
            index.offset,
            index.size,
            index.compression,
            None,
        )?;
    }

    Ok(())
}

#[test]
fn blob_file_every_byte_is_covered() -> blob_log::Result<()> {
    let folder = tempfile::tempdir()?;
    let config = Config::new(folder.path());

    let items = write_file(&config)?;
    read_all(&config, &items)?;

    let path = blob_file_path(config.path(), 1);
    let bytes = std::fs::read(&path)?;

    for pos in 0..bytes.len() {
        let mut corrupted = bytes.clone();
        corrupted[pos] ^= 0xFF;
        std::fs::write(&path, &corrupted)?;

        let Err(e) = read_all(&config, &items) else {
            panic!("corruption at byte {pos} was not detected");
        };

        // An unknown compression tag is reported as unsupported
        if pos >= HEADER_SIZE {
            assert!(e.is_corruption(), "byte {pos}: {e:?}");
        }
    }

    Ok(())
}

#[test]
fn blob_file_unterminated_is_rejected() -> blob_log::Result<()> {
    let folder = tempfile::tempdir()?;
    let config = Config::new(folder.path());

    let mut builder = BlobFileBuilder::new(
        Arc::new(StdFileSystem),
        config.clone(),
        IdGenerator::default(),
    );
    for key in ["a", "b", "c"] {
        builder.add(key.as_bytes(), b"some value")?;
    }
    let paths = builder.blob_file_paths().to_vec();
    builder.abandon();

    assert_eq!(1, paths.len());
    assert!(paths[0].try_exists()?);

    assert!(matches!(
        BlobFileReader::create(&StdFileSystem, &config, &ReadOptions::default(), 1),
        Err(blob_log::Error::Corruption(_))
    ));

    Ok(())
}

#[test]
fn blob_file_wrong_column_family() -> blob_log::Result<()> {
    let folder = tempfile::tempdir()?;
    let config = Config::new(folder.path());
    write_file(&config)?;

    assert!(matches!(
        BlobFileReader::create(
            &StdFileSystem,
            &config.column_family_id(1),
            &ReadOptions::default(),
            1
        ),
        Err(blob_log::Error::Corruption(_))
    ));

    Ok(())
}
