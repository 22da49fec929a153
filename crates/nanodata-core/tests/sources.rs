//! Built-in sources against local files, a local HTTP server and commands.

mod common;

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::sync::Arc;

use arrow::array::{ArrayRef, BinaryArray, Int64Array, RecordBatch, StringArray, StructArray};
use arrow::datatypes::{DataType, Field, Schema};
use common::*;
use nanodata_core::catalog::{image_struct_type, CLASS_NAMES_KEY, IMAGE_CLASS};
use nanodata_core::sources::{GeneratorSource, HubSource, LocalSource, UrlSource};
use nanodata_core::transforms::DropColumns;
use nanodata_core::{DataSource, Error, Pipeline};
use nanodata_store::MIME_TYPE_KEY;

#[test]
fn local_directory_import() {
    let data_dir = tempfile::tempdir().unwrap();
    write_parquet(&data_dir.path().join("train/a.parquet"), &[xy_batch(0, 4)]);
    write_parquet(&data_dir.path().join("test/a.parquet"), &[xy_batch(10, 2)]);
    fs::create_dir_all(data_dir.path().join("aux")).unwrap();
    fs::write(data_dir.path().join("aux/labels.txt"), "a\nb\n").unwrap();

    let repo_dir = tempfile::tempdir().unwrap();
    let repo = open_repo(repo_dir.path());
    let source = LocalSource::new(data_dir.path(), None).unwrap();
    let data = repo.fetch_source(&source).unwrap();

    assert_eq!(data.hash(), source.content_hash());
    assert!(data.root().starts_with(repo.store().store_dir()));
    assert_eq!(data.split_info("train").unwrap().size, 4);
    assert_eq!(int_column(&data, "test", "x"), vec![10, 11]);
    assert_eq!(data.aux_files().unwrap().len(), 1);
    assert_eq!(repo.store().initialize_count(), 1);
}

#[test]
fn local_hash_follows_content() {
    let data_dir = tempfile::tempdir().unwrap();
    let file = data_dir.path().join("train/a.parquet");
    write_parquet(&file, &[xy_batch(0, 4)]);

    let before = LocalSource::new(data_dir.path(), None).unwrap();
    assert_eq!(
        before.content_hash(),
        LocalSource::new(data_dir.path(), None).unwrap().content_hash()
    );

    write_parquet(&file, &[xy_batch(0, 5)]);
    let after = LocalSource::new(data_dir.path(), None).unwrap();
    assert_ne!(before.content_hash(), after.content_hash());
}

#[test]
fn local_single_file_with_mime_type() {
    let data_dir = tempfile::tempdir().unwrap();
    let file = data_dir.path().join("rows.parquet");
    write_parquet(&file, &[xy_batch(0, 3)]);

    let repo_dir = tempfile::tempdir().unwrap();
    let repo = open_repo(repo_dir.path());
    let source = LocalSource::new(&file, Some("data/pairs".into())).unwrap();
    let data = repo.fetch_source(&source).unwrap();

    let info = data.split_info("train").unwrap();
    assert_eq!(info.size, 3);
    assert_eq!(info.mime_type(), Some("data/pairs"));
}

#[test]
fn local_prepare_serves_cached_copy() {
    let data_dir = tempfile::tempdir().unwrap();
    write_parquet(&data_dir.path().join("train/a.parquet"), &[xy_batch(0, 4)]);

    let repo_dir = tempfile::tempdir().unwrap();
    let repo = open_repo(repo_dir.path());
    let source = LocalSource::new(data_dir.path(), None).unwrap();
    repo.fetch_source(&source).unwrap();

    // The original files are no longer needed once stored
    fs::remove_dir_all(data_dir.path().join("train")).unwrap();
    let data = source.prepare(&repo).unwrap();
    assert!(data.root().starts_with(repo.store().store_dir()));
    assert_eq!(int_column(&data, "train", "x"), vec![0, 1, 2, 3]);
    assert_eq!(repo.store().initialize_count(), 1);
}

#[test]
fn bracketed_paths_import_and_verify() {
    let base = tempfile::tempdir().unwrap();
    let data_dir = base.path().join("data[v2]");
    write_parquet(&data_dir.join("train/a.parquet"), &[xy_batch(0, 3)]);

    let repo = open_repo(&base.path().join("repo[1]"));
    let source = LocalSource::new(&data_dir, None).unwrap();
    let data = repo.fetch_source(&source).unwrap();
    assert_eq!(data.split_info("train").unwrap().size, 3);

    let results = repo.store().verify(&data.hash()).unwrap();
    assert!(results.iter().any(|r| r.path == "train/part-00001.parquet"));
    assert!(results.iter().all(|r| r.ok));
}

#[test]
fn local_empty_directory_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let err = LocalSource::new(dir.path(), None).unwrap_err();
    assert!(err.is_not_found());
    assert!(LocalSource::new(dir.path().join("missing"), None).is_err());
}

#[cfg(unix)]
#[test]
fn generator_output_is_stored() {
    let fixture = tempfile::tempdir().unwrap();
    write_parquet(&fixture.path().join("train/part.parquet"), &[xy_batch(0, 7)]);
    fs::create_dir_all(fixture.path().join("aux")).unwrap();
    fs::write(fixture.path().join("aux/notes.txt"), "generated").unwrap();

    let repo_dir = tempfile::tempdir().unwrap();
    let repo = open_repo(repo_dir.path());
    // cp -r {fixture}/. {output_dir}
    let source = GeneratorSource::new(
        "cp",
        ["-r".to_string(), format!("{}/.", fixture.path().display())],
    );
    let data = repo.fetch_source(&source).unwrap();

    assert_eq!(data.split_info("train").unwrap().size, 7);
    assert_eq!(data.aux_files().unwrap().len(), 1);
    assert!(!data.root().join(".scratch").exists());

    repo.fetch_source(&source).unwrap();
    assert_eq!(repo.store().initialize_count(), 1);
}

#[cfg(unix)]
#[test]
fn generator_failure_rolls_back() {
    let repo_dir = tempfile::tempdir().unwrap();
    let repo = open_repo(repo_dir.path());
    let source = GeneratorSource::new("false", Vec::<String>::new());

    let err = repo.fetch_source(&source).unwrap_err();
    assert!(matches!(err, Error::Generator { .. }));
    assert!(!repo.store().exists(&source.content_hash()));
}

#[test]
fn generator_missing_command() {
    let repo_dir = tempfile::tempdir().unwrap();
    let repo = open_repo(repo_dir.path());
    let source = GeneratorSource::new("nanodata-no-such-command", Vec::<String>::new());
    assert!(matches!(
        repo.fetch_source(&source),
        Err(Error::Generator { .. })
    ));
}

#[test]
fn url_source_downloads_into_split() {
    let base = serve(HashMap::from([(
        "/rows.parquet".to_string(),
        parquet_bytes(&[xy_batch(0, 3), xy_batch(3, 3)]),
    )]));

    let repo_dir = tempfile::tempdir().unwrap();
    let repo = open_repo(repo_dir.path());
    let source = UrlSource::new(format!("{base}/rows.parquet"))
        .with_split("validation")
        .with_mime_type("data/pairs");
    let data = repo.fetch_source(&source).unwrap();

    let info = data.split_info("validation").unwrap();
    assert_eq!(info.size, 6);
    assert_eq!(info.mime_type(), Some("data/pairs"));
    assert_eq!(int_column(&data, "validation", "x"), (0..6).collect::<Vec<_>>());
    assert!(!data.root().join(".scratch").exists());
}

#[test]
fn url_source_404_is_http_error() {
    let base = serve(HashMap::new());
    let repo_dir = tempfile::tempdir().unwrap();
    let repo = open_repo(repo_dir.path());
    let source = UrlSource::new(format!("{base}/missing.parquet"));

    let err = repo.fetch_source(&source).unwrap_err();
    assert!(matches!(err, Error::Http { status: Some(404), .. }));
    assert!(!repo.store().exists(&source.content_hash()));
}

fn raw_image_class_batch() -> RecordBatch {
    let DataType::Struct(fields) = image_struct_type() else {
        unreachable!()
    };
    let bytes: ArrayRef = Arc::new(BinaryArray::from(vec![b"a".as_ref(), b"b".as_ref()]));
    let paths: ArrayRef = Arc::new(StringArray::from(vec!["0.png", "1.png"]));
    let images = StructArray::new(fields, vec![bytes, paths], None);
    let hub = r#"{"info":{"features":{"label":{"names":["zero","one"]}}}}"#;
    let schema = Schema::new_with_metadata(
        vec![
            Field::new("img", image_struct_type(), true),
            Field::new("label", DataType::Int64, true),
        ],
        [("huggingface".to_string(), hub.to_string())].into(),
    );
    RecordBatch::try_new(
        Arc::new(schema),
        vec![Arc::new(images), Arc::new(Int64Array::from(vec![0, 1]))],
    )
    .unwrap()
}

fn toy_hub(base: &str) -> HubSource {
    HubSource::new(
        "org/toy",
        "main",
        "sha-1",
        BTreeMap::from([(
            "train".to_string(),
            vec![
                "data/train-0.parquet".to_string(),
                "data/train-1.parquet".to_string(),
            ],
        )]),
    )
    .with_endpoint(base)
}

#[test]
fn hub_source_normalizes_through_catalog() {
    let raw = parquet_bytes(&[raw_image_class_batch()]);
    let base = serve(HashMap::from([
        ("/datasets/org/toy/resolve/main/data/train-0.parquet".to_string(), raw.clone()),
        ("/datasets/org/toy/resolve/main/data/train-1.parquet".to_string(), raw),
    ]));

    let repo_dir = tempfile::tempdir().unwrap();
    let repo = open_repo(repo_dir.path());
    let data = repo.fetch_source(&toy_hub(&base)).unwrap();

    let info = data.split_info("train").unwrap();
    assert_eq!(info.size, 4);
    assert_eq!(info.mime_type(), Some(IMAGE_CLASS));
    assert_eq!(column_names(&data, "train"), vec!["image", "class"]);
    let class = info.schema.field(1).clone();
    assert_eq!(class.metadata()[CLASS_NAMES_KEY], r#"["zero","one"]"#);
    assert_eq!(int_column(&data, "train", "class"), vec![0, 1, 0, 1]);
}

#[test]
fn hub_source_unknown_shape_is_unsupported() {
    let base = serve(HashMap::from([
        ("/datasets/org/toy/resolve/main/data/train-0.parquet".to_string(), parquet_bytes(&[xy_batch(0, 2)])),
        ("/datasets/org/toy/resolve/main/data/train-1.parquet".to_string(), parquet_bytes(&[xy_batch(2, 2)])),
    ]));

    let repo_dir = tempfile::tempdir().unwrap();
    let repo = open_repo(repo_dir.path());
    let source = toy_hub(&base);
    let err = repo.fetch_source(&source).unwrap_err();
    assert!(matches!(err, Error::UnsupportedShape(_)));
    assert!(!repo.store().exists(&source.content_hash()));

    // An explicit mime type bypasses the catalog
    let tagged = toy_hub(&base).with_mime_type("data/pairs");
    let data = repo.fetch_source(&tagged).unwrap();
    assert_eq!(data.split_info("train").unwrap().mime_type(), Some("data/pairs"));
    assert_eq!(
        data.split_info("train").unwrap().schema.metadata()[MIME_TYPE_KEY],
        "data/pairs"
    );
}

#[test]
fn pipeline_over_downloaded_source() {
    let base = serve(HashMap::from([(
        "/rows.parquet".to_string(),
        parquet_bytes(&[xy_batch(0, 4)]),
    )]));
    let repo_dir = tempfile::tempdir().unwrap();
    let repo = open_repo(repo_dir.path());

    let pipeline = Pipeline::new(UrlSource::new(format!("{base}/rows.parquet")))
        .then(DropColumns::new(["y"]));
    let data = repo.fetch_source(&pipeline).unwrap();
    repo.register("rows-x", &data.hash()).unwrap();

    let resolved = repo.fetch("rows-x").unwrap();
    assert_eq!(column_names(&resolved, "train"), vec!["x"]);
    assert_eq!(int_column(&resolved, "train", "x"), vec![0, 1, 2, 3]);
}

#[test]
#[ignore] // requires network
fn hub_mnist_first_shard() {
    let repo_dir = tempfile::tempdir().unwrap();
    let repo = open_repo(repo_dir.path());
    let source = HubSource::new(
        "ylecun/mnist",
        "refs/convert/parquet",
        "unknown",
        BTreeMap::from([(
            "test".to_string(),
            vec!["mnist/test/0000.parquet".to_string()],
        )]),
    );
    let data = repo.fetch_source(&source).unwrap();
    let info = data.split_info("test").unwrap();
    assert_eq!(info.size, 10_000);
    assert_eq!(info.mime_type(), Some(IMAGE_CLASS));
}
