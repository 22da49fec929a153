//! Shared fixtures for integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use arrow::array::{AsArray, Int64Array, RecordBatch, StringArray};
use arrow::datatypes::{DataType, Field, Int64Type, Schema};
use nanodata_core::{ContentHash, DataSource, DataTransform, Dataset, Repository, Result};
use nanodata_store::StoreOptions;
use parquet::arrow::ArrowWriter;

pub fn open_repo(root: &Path) -> Repository {
    Repository::open(root, StoreOptions::default()).unwrap()
}

/// `{x: int64, y: utf8}` with `n` rows starting at `start`.
pub fn xy_batch(start: i64, n: usize) -> RecordBatch {
    let schema = Arc::new(Schema::new(vec![
        Field::new("x", DataType::Int64, false),
        Field::new("y", DataType::Utf8, false),
    ]));
    let xs: Vec<i64> = (start..start + n as i64).collect();
    let ys: Vec<String> = xs.iter().map(|x| format!("row-{x}")).collect();
    RecordBatch::try_new(
        schema,
        vec![Arc::new(Int64Array::from(xs)), Arc::new(StringArray::from(ys))],
    )
    .unwrap()
}

pub fn parquet_bytes(batches: &[RecordBatch]) -> Vec<u8> {
    let mut writer = ArrowWriter::try_new(Vec::new(), batches[0].schema(), None).unwrap();
    for batch in batches {
        writer.write(batch).unwrap();
    }
    writer.into_inner().unwrap()
}

pub fn write_parquet(path: &Path, batches: &[RecordBatch]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    File::create(path)
        .unwrap()
        .write_all(&parquet_bytes(batches))
        .unwrap();
}

/// All values of an int64 column across a split.
pub fn int_column(data: &Dataset, split: &str, column: &str) -> Vec<i64> {
    data.split(split)
        .unwrap()
        .batches()
        .map(|b| b.unwrap())
        .flat_map(|b| {
            let col = b.column_by_name(column).unwrap().clone();
            col.as_primitive::<Int64Type>().values().to_vec()
        })
        .collect()
}

pub fn column_names(data: &Dataset, split: &str) -> Vec<String> {
    data.split_info(split)
        .unwrap()
        .schema
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect()
}

/// In-memory source writing fixed batches; counts `prepare` calls.
pub struct MemorySource {
    pub name: String,
    pub splits: Vec<(String, Vec<RecordBatch>)>,
    pub prepared: Arc<AtomicUsize>,
}

impl MemorySource {
    pub fn new(name: &str, splits: Vec<(&str, Vec<RecordBatch>)>) -> Self {
        Self {
            name: name.to_string(),
            splits: splits
                .into_iter()
                .map(|(s, b)| (s.to_string(), b))
                .collect(),
            prepared: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn train(name: &str, rows: usize) -> Self {
        Self::new(name, vec![("train", vec![xy_batch(0, rows)])])
    }

    pub fn prepare_count(&self) -> usize {
        self.prepared.load(Ordering::SeqCst)
    }
}

impl DataSource for MemorySource {
    fn content_hash(&self) -> ContentHash {
        ContentHash::of_params("memory", &self.name)
    }

    fn describe(&self) -> String {
        format!("memory:{}", self.name)
    }

    fn prepare(&self, repo: &Repository) -> Result<Dataset> {
        self.prepared.fetch_add(1, Ordering::SeqCst);
        repo.materialize(&self.content_hash(), |writer| {
            for (name, batches) in &self.splits {
                let split = writer.split(name)?;
                for batch in batches {
                    split.write_batch(batch)?;
                }
            }
            Ok(())
        })
    }
}

/// Wraps a transform and counts `map_batch` calls.
pub struct Counting<T> {
    pub inner: T,
    pub calls: Arc<AtomicUsize>,
}

impl<T> Counting<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl<T: DataTransform> DataTransform for Counting<T> {
    fn content_hash(&self) -> ContentHash {
        self.inner.content_hash()
    }

    fn describe(&self) -> String {
        self.inner.describe()
    }

    fn map_batch(&self, batch: RecordBatch) -> Result<RecordBatch> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.map_batch(batch)
    }
}

/// Minimal HTTP/1.1 file server on localhost. Returns the base URL.
///
/// Serves `files` by exact request path, 404 otherwise; one request per
/// connection. The thread lives until the test process exits.
pub fn serve(files: HashMap<String, Vec<u8>>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    std::thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else {
                continue;
            };
            let Ok(read_half) = stream.try_clone() else {
                continue;
            };
            let mut reader = BufReader::new(read_half);
            let mut request_line = String::new();
            if reader.read_line(&mut request_line).is_err() {
                continue;
            }
            loop {
                let mut header = String::new();
                match reader.read_line(&mut header) {
                    Ok(n) if n > 2 => continue,
                    _ => break,
                }
            }
            let path = request_line.split_whitespace().nth(1).unwrap_or("/");
            let _ = match files.get(path) {
                Some(body) => write!(
                    stream,
                    "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    body.len()
                )
                .and_then(|_| stream.write_all(body)),
                None => write!(
                    stream,
                    "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                ),
            };
        }
    });
    format!("http://{addr}")
}
