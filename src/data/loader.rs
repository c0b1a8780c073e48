use crate::data::{LabeledImage, IMAGE_ID_COLUMN};
use crate::error::{ChexNetError, Result};
use csv::ReaderBuilder;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::{debug, info};

/// Reader for split CSVs (`Image Index` plus one 0/1 column per class)
#[derive(Debug, Clone)]
pub struct DatasetLoader {
    class_names: Vec<String>,
}

impl DatasetLoader {
    /// Create a loader that extracts the given class columns, in order
    pub fn new(class_names: &[String]) -> Self {
        Self {
            class_names: class_names.to_vec(),
        }
    }

    /// Load every row of a split CSV
    pub fn load<P: AsRef<Path>>(&self, path: P) -> Result<Vec<LabeledImage>> {
        let path = path.as_ref();
        debug!("Loading split CSV {:?}", path);

        let file = File::open(path)
            .map_err(|e| ChexNetError::dataset(path, format!("cannot open file: {e}")))?;
        let records = self.parse_records(BufReader::new(file), path)?;

        info!("Loaded {} samples from {:?}", records.len(), path);
        Ok(records)
    }

    /// Parse records from any reader; `origin` is used in error messages
    fn parse_records<R: Read>(&self, reader: R, origin: &Path) -> Result<Vec<LabeledImage>> {
        let mut csv_reader = ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = csv_reader
            .headers()
            .map_err(|e| ChexNetError::dataset(origin, format!("cannot read header: {e}")))?
            .iter()
            .map(str::to_string)
            .collect::<Vec<_>>();

        if headers.is_empty() {
            return Err(ChexNetError::dataset(origin, "empty header row"));
        }

        let id_index = headers
            .iter()
            .position(|h| h == IMAGE_ID_COLUMN)
            .unwrap_or(0);

        let class_indices = self
            .class_names
            .iter()
            .map(|name| {
                headers
                    .iter()
                    .position(|h| h == name)
                    .ok_or_else(|| ChexNetError::dataset(origin, format!("missing class column '{name}'")))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut records = Vec::new();
        for (row, result) in csv_reader.records().enumerate() {
            // header is line 1
            let line = row + 2;
            let record = result
                .map_err(|e| ChexNetError::dataset(origin, format!("line {line}: {e}")))?;

            let image_id = record
                .get(id_index)
                .filter(|id| !id.is_empty())
                .ok_or_else(|| ChexNetError::dataset(origin, format!("line {line}: missing image id")))?
                .to_string();

            let labels = class_indices
                .iter()
                .zip(&self.class_names)
                .map(|(&idx, name)| {
                    let raw = record.get(idx).unwrap_or("");
                    parse_label(raw).ok_or_else(|| {
                        ChexNetError::dataset(
                            origin,
                            format!("line {line}: label '{raw}' for class '{name}' is not 0 or 1"),
                        )
                    })
                })
                .collect::<Result<Vec<_>>>()?;

            records.push(LabeledImage { image_id, labels });
        }

        Ok(records)
    }
}

/// Accept `0`/`1` as well as float renderings such as `1.0`
fn parse_label(raw: &str) -> Option<u8> {
    let value = raw.trim().parse::<f32>().ok()?;
    if value == 0.0 {
        Some(0)
    } else if value == 1.0 {
        Some(1)
    } else {
        None
    }
}
