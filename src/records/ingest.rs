//! Conversion of an image list into a record store.
//!
//! The list file is a whitespace-separated token stream of entries, each an
//! image path relative to the root folder followed by `label_count` label
//! values:
//!
//! ```text
//! cat/001.png 0 1.5 3
//! dog/002.png 2 0 0.5
//! ```
//!
//! Every readable image becomes one [`Datum`] stored under
//! [`record_key`]`(entry index, path)`. Images that fail to open or decode are
//! skipped with a warning; all stored images must decode to the same number of
//! bytes.

use super::{Datum, RecordWriter, WriteBatch, record_key};
use crate::error::IngestError;
use image::imageops::FilterType;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Records committed per batch unless configured otherwise.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

/// Where to read images from and how to store them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Folder the list paths are relative to.
    pub root: PathBuf,
    /// The list file.
    pub list: PathBuf,
    /// Store to create; must not exist yet.
    pub store: PathBuf,
    /// Label values following each path.
    pub label_count: usize,
    /// Shuffle entries before writing.
    #[serde(default)]
    pub shuffle: bool,
    /// Resize every image to `(height, width)`.
    #[serde(default)]
    pub resize: Option<(u32, u32)>,
    /// Store single-channel luma instead of RGB.
    #[serde(default)]
    pub gray: bool,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl IngestConfig {
    /// RGB images at their native size, in list order.
    pub fn new(
        root: impl Into<PathBuf>,
        list: impl Into<PathBuf>,
        store: impl Into<PathBuf>,
        label_count: usize,
    ) -> Self {
        Self {
            root: root.into(),
            list: list.into(),
            store: store.into(),
            label_count,
            shuffle: false,
            resize: None,
            gray: false,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

/// Positional arguments of the converter, in order.
pub const USAGE: &str =
    "convert_imageset ROOTFOLDER/ LISTFILE NUM_LABELS DB_NAME [--shuffle] [--gray] [--resize HxW]";

impl IngestConfig {
    /// Builds a configuration from command-line arguments, program name excluded.
    ///
    /// # Errors
    /// [`IngestError::Usage`] for missing positionals, a non-numeric label
    /// count, an unknown flag or a malformed `--resize HxW`.
    pub fn from_args<I>(args: I) -> Result<Self, IngestError>
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let usage = || IngestError::Usage(format!("usage: {USAGE}"));
        let mut args = args.into_iter().map(Into::into);

        let root = args.next().ok_or_else(usage)?;
        let list = args.next().ok_or_else(usage)?;
        let label_count = args
            .next()
            .and_then(|n| n.parse::<usize>().ok())
            .ok_or_else(usage)?;
        let store = args.next().ok_or_else(usage)?;

        let mut config = Self::new(root, list, store, label_count);
        while let Some(flag) = args.next() {
            match flag.as_str() {
                "--shuffle" => config.shuffle = true,
                "--gray" => config.gray = true,
                "--resize" => {
                    let size = args.next().and_then(|s| parse_size(&s)).ok_or_else(usage)?;
                    config.resize = Some(size);
                }
                _ => return Err(usage()),
            }
        }
        Ok(config)
    }
}

/// Parses `HxW`.
fn parse_size(arg: &str) -> Option<(u32, u32)> {
    let (h, w) = arg.split_once('x')?;
    Some((h.parse().ok()?, w.parse().ok()?))
}

/// One parsed list entry.
#[derive(Debug, Clone, PartialEq)]
pub struct ListEntry {
    pub path: String,
    pub labels: Vec<f32>,
}

/// Outcome of a conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestSummary {
    /// Records written to the store.
    pub written: usize,
    /// Entries whose image could not be read.
    pub skipped: usize,
}

/// Parses a list into entries of one path and `label_count` labels each.
///
/// # Errors
/// [`IngestError::Label`] for a non-numeric label, [`IngestError::MissingLabels`]
/// when the list ends inside an entry.
pub fn parse_list(text: &str, label_count: usize) -> Result<Vec<ListEntry>, IngestError> {
    let mut tokens = text.split_whitespace();
    let mut entries = Vec::new();

    while let Some(path) = tokens.next() {
        let entry = entries.len();
        let mut labels = Vec::with_capacity(label_count);
        for token in tokens.by_ref().take(label_count) {
            let value = token.parse::<f32>().map_err(|_| IngestError::Label {
                entry,
                path: path.to_string(),
                token: token.to_string(),
            })?;
            labels.push(value);
        }
        if labels.len() != label_count {
            return Err(IngestError::MissingLabels {
                entry,
                path: path.to_string(),
                expected: label_count,
                actual: labels.len(),
            });
        }
        entries.push(ListEntry {
            path: path.to_string(),
            labels,
        });
    }

    Ok(entries)
}

/// Decodes one image into a datum carrying `labels`.
///
/// # Errors
/// Whatever `image` reports for files it cannot open or decode.
pub fn read_datum(
    path: &Path,
    labels: Vec<f32>,
    resize: Option<(u32, u32)>,
    gray: bool,
) -> Result<Datum, image::ImageError> {
    let mut img = image::open(path)?;
    if let Some((height, width)) = resize {
        img = img.resize_exact(width, height, FilterType::Triangle);
    }

    if gray {
        let luma = img.to_luma8();
        let (width, height) = luma.dimensions();
        return Ok(Datum::new(1, height, width, luma.into_raw(), labels));
    }

    let rgb = img.to_rgb8();
    let (width, height) = rgb.dimensions();
    let plane = (width * height) as usize;
    let interleaved = rgb.into_raw();

    // HWC -> CHW
    let mut data = vec![0u8; interleaved.len()];
    for (i, px) in interleaved.chunks_exact(3).enumerate() {
        for (c, &v) in px.iter().enumerate() {
            data[c * plane + i] = v;
        }
    }
    Ok(Datum::new(3, height, width, data, labels))
}

/// Converts the configured image list into a new record store.
///
/// # Errors
/// I/O and list parse failures, a store that already exists, or
/// [`IngestError::DataSize`] when images decode to different sizes.
pub fn convert_imageset(config: &IngestConfig) -> Result<IngestSummary, IngestError> {
    if config.batch_size == 0 {
        return Err(IngestError::BatchSize);
    }

    let text = std::fs::read_to_string(&config.list)?;
    let mut entries = parse_list(&text, config.label_count)?;
    if config.shuffle {
        info!("shuffling data");
        entries.shuffle(&mut rand::rng());
    }
    info!(entries = entries.len(), "total images");

    let mut writer = RecordWriter::create(&config.store)?;
    let mut batch = WriteBatch::default();
    let mut data_size = None;
    let mut summary = IngestSummary {
        written: 0,
        skipped: 0,
    };

    for (line_id, entry) in entries.into_iter().enumerate() {
        let source = config.root.join(&entry.path);
        let datum = match read_datum(&source, entry.labels, config.resize, config.gray) {
            Ok(datum) => datum,
            Err(err) => {
                warn!(path = %source.display(), error = %err, "skipping unreadable image");
                summary.skipped += 1;
                continue;
            }
        };

        match data_size {
            None => data_size = Some(datum.data.len()),
            Some(expected) if expected != datum.data.len() => {
                return Err(IngestError::DataSize {
                    path: entry.path,
                    expected,
                    actual: datum.data.len(),
                });
            }
            Some(_) => {}
        }

        batch.put(record_key(line_id, &entry.path), datum.encode()?);
        summary.written += 1;

        if summary.written % config.batch_size == 0 {
            writer.write(std::mem::take(&mut batch))?;
            info!(processed = summary.written, "committed batch");
        }
    }

    if !batch.is_empty() {
        writer.write(batch)?;
        info!(processed = summary.written, "committed batch");
    }
    writer.finish()?;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RecordError;
    use crate::records::RecordReader;
    use crate::records::tests::scratch;
    use image::{Rgb, RgbImage};

    fn image_dir(name: &str, images: &[(&str, u32, u32, [u8; 3])]) -> PathBuf {
        let dir = scratch(name);
        std::fs::create_dir_all(&dir).unwrap();
        for &(file, w, h, color) in images {
            RgbImage::from_pixel(w, h, Rgb(color))
                .save(dir.join(file))
                .unwrap();
        }
        dir
    }

    fn read_store(path: &Path) -> Vec<(String, Datum)> {
        RecordReader::open(path)
            .unwrap()
            .map(|r| {
                let (key, value) = r.unwrap();
                (key, Datum::decode(&value).unwrap())
            })
            .collect()
    }

    #[test]
    fn list_is_a_token_stream() {
        let entries = parse_list("a.png 0 1.5\n  b.png\n2 -3\n", 2).unwrap();
        assert_eq!(
            entries,
            vec![
                ListEntry {
                    path: "a.png".into(),
                    labels: vec![0.0, 1.5],
                },
                ListEntry {
                    path: "b.png".into(),
                    labels: vec![2.0, -3.0],
                },
            ]
        );
        assert!(parse_list("", 3).unwrap().is_empty());
    }

    #[test]
    fn list_errors_name_the_entry() {
        assert!(matches!(
            parse_list("a.png 1 x", 2),
            Err(IngestError::Label { entry: 0, ref token, .. }) if token == "x"
        ));
        assert!(matches!(
            parse_list("a.png 1 2 b.png 3", 2),
            Err(IngestError::MissingLabels { entry: 1, expected: 2, actual: 1, .. })
        ));
    }

    #[test]
    fn converts_images_in_list_order() {
        let dir = image_dir(
            "ingest-order",
            &[("r.png", 2, 1, [255, 0, 0]), ("g.png", 2, 1, [0, 9, 0])],
        );
        let list = dir.join("list.txt");
        std::fs::write(&list, "r.png 0 1\nmissing.png 1 1\ng.png 2 0.5\n").unwrap();
        let store = dir.join("store.svlr");

        let summary = convert_imageset(&IngestConfig::new(&dir, &list, &store, 2)).unwrap();
        assert_eq!(
            summary,
            IngestSummary {
                written: 2,
                skipped: 1
            }
        );

        let records = read_store(&store);
        assert_eq!(records[0].0, "00000000_r.png");
        assert_eq!(records[1].0, "00000002_g.png");

        let red = &records[0].1;
        assert_eq!((red.channels, red.height, red.width), (3, 1, 2));
        assert_eq!(red.data, vec![255, 255, 0, 0, 0, 0]);
        assert_eq!(red.labels, vec![0.0, 1.0]);
        assert_eq!(records[1].1.data, vec![0, 0, 9, 9, 0, 0]);

        let again = convert_imageset(&IngestConfig::new(&dir, &list, &store, 2));
        assert!(matches!(again, Err(IngestError::Record(RecordError::Exists(_)))));
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn gray_resize_and_small_batches() {
        let dir = image_dir(
            "ingest-gray",
            &[
                ("a.png", 4, 4, [10, 10, 10]),
                ("b.png", 3, 5, [20, 20, 20]),
                ("c.png", 1, 1, [30, 30, 30]),
            ],
        );
        let list = dir.join("list.txt");
        std::fs::write(&list, "a.png 0 b.png 1 c.png 2").unwrap();
        let store = dir.join("store.svlr");

        let mut config = IngestConfig::new(&dir, &list, &store, 1);
        config.gray = true;
        config.resize = Some((2, 3));
        config.batch_size = 2;
        config.shuffle = true;

        let summary = convert_imageset(&config).unwrap();
        assert_eq!(summary.written, 3);

        let mut records = read_store(&store);
        records.sort_by(|a, b| a.1.labels[0].total_cmp(&b.1.labels[0]));
        for (datum, shade) in records.iter().map(|r| &r.1).zip([10u8, 20, 30]) {
            assert_eq!((datum.channels, datum.height, datum.width), (1, 2, 3));
            assert!(datum.data.iter().all(|&v| v.abs_diff(shade) <= 1));
        }
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn mixed_sizes_are_rejected() {
        let dir = image_dir(
            "ingest-sizes",
            &[("a.png", 2, 2, [1, 1, 1]), ("b.png", 3, 2, [1, 1, 1])],
        );
        let list = dir.join("list.txt");
        std::fs::write(&list, "a.png 0\nb.png 0\n").unwrap();

        let config = IngestConfig::new(&dir, &list, dir.join("store.svlr"), 1);
        let result = convert_imageset(&config);
        assert!(matches!(
            result,
            Err(IngestError::DataSize { expected: 12, actual: 18, .. })
        ));
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn arguments_follow_converter_order() {
        let config =
            IngestConfig::from_args(["imgs/", "list.txt", "5", "train.svlr", "--gray"]).unwrap();
        assert_eq!(config.root, PathBuf::from("imgs/"));
        assert_eq!(config.list, PathBuf::from("list.txt"));
        assert_eq!(config.label_count, 5);
        assert_eq!(config.store, PathBuf::from("train.svlr"));
        assert!(config.gray);
        assert!(!config.shuffle);

        let config = IngestConfig::from_args(["r", "l", "2", "s", "--resize", "32x48", "--shuffle"])
            .unwrap();
        assert_eq!(config.resize, Some((32, 48)));
        assert!(config.shuffle);
    }

    #[test]
    fn bad_arguments_are_usage_errors() {
        for args in [
            &["r", "l", "2"][..],
            &["r", "l", "train.svlr", "2"],
            &["r", "l", "2", "s", "--resize", "32"],
            &["r", "l", "2", "s", "--color"],
        ] {
            let result = IngestConfig::from_args(args.iter().copied());
            assert!(matches!(result, Err(IngestError::Usage(_))), "{args:?}");
        }
    }
}
