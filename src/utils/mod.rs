use crate::error::{ChexNetError, Result};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Dataset splits the launcher reads from the output directory
pub const SPLITS: &[&str] = &["train", "validation"];

/// Marker held in the output directory while a training job runs
pub const LOCK_FILE: &str = ".training.lock";

/// Exclusive claim on an output directory, released on drop
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    /// Create the lock file; fails when another job already holds it
    pub fn acquire<P: AsRef<Path>>(output_dir: P) -> Result<Self> {
        let path = output_dir.as_ref().join(LOCK_FILE);
        let mut file = match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(ChexNetError::Configuration {
                    path,
                    reason: "another training job is running in this output directory \
                             (delete the lock file if that job is gone)"
                        .to_string(),
                })
            }
            Err(e) => return Err(ChexNetError::io(&path, e)),
        };
        // dropping on error removes the file again
        let lock = Self { path };
        writeln!(file, "{}", std::process::id()).map_err(|e| ChexNetError::io(&lock.path, e))?;
        debug!("Acquired {:?}", lock.path);
        Ok(lock)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!("Failed to remove {:?}: {}", self.path, e);
        }
    }
}

/// Ensure directory exists
pub fn ensure_dir<P: AsRef<Path>>(path: P) -> Result<()> {
    let path = path.as_ref();
    if !path.exists() {
        std::fs::create_dir_all(path).map_err(|e| ChexNetError::io(path, e))?;
        info!("Created output directory {:?}", path);
    }
    Ok(())
}

/// Copy the configuration file into the output directory under its own name
pub fn backup_config_file<P: AsRef<Path>, Q: AsRef<Path>>(
    output_dir: P,
    config_file: Q,
) -> Result<PathBuf> {
    let config_file = config_file.as_ref();
    let file_name = config_file.file_name().ok_or_else(|| ChexNetError::Configuration {
        path: config_file.to_path_buf(),
        reason: "configuration path has no file name".to_string(),
    })?;
    let destination = output_dir.as_ref().join(file_name);
    if same_location(config_file, &destination) {
        return Ok(destination);
    }
    std::fs::copy(config_file, &destination).map_err(|e| ChexNetError::io(config_file, e))?;
    debug!("Backed up {:?} to {:?}", config_file, destination);
    Ok(destination)
}

/// Copy `<split>.csv` for every split from the dataset directory into the output directory
///
/// Nothing is copied when both directories resolve to the same place.
pub fn copy_dataset_csvs<P: AsRef<Path>, Q: AsRef<Path>>(
    dataset_csv_dir: P,
    output_dir: Q,
    splits: &[&str],
) -> Result<()> {
    let source_dir = dataset_csv_dir.as_ref();
    let output_dir = output_dir.as_ref();

    if same_location(source_dir, output_dir) {
        debug!("Dataset CSVs already live in {:?}", output_dir);
        return Ok(());
    }

    for split in splits {
        let file_name = format!("{split}.csv");
        let source = source_dir.join(&file_name);
        if !source.is_file() {
            return Err(ChexNetError::dataset(&source, "split file not found"));
        }
        let destination = output_dir.join(&file_name);
        std::fs::copy(&source, &destination).map_err(|e| ChexNetError::io(&source, e))?;
        debug!("Copied {:?} to {:?}", source, destination);
    }
    Ok(())
}

fn same_location(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// Format duration as human-readable string
pub fn format_duration(secs: f64) -> String {
    if secs < 60.0 {
        format!("{:.1}s", secs)
    } else if secs < 3600.0 {
        format!("{:.1}m", secs / 60.0)
    } else {
        format!("{:.1}h", secs / 3600.0)
    }
}

/// Random number utilities
pub mod random {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    /// Create RNG with fixed seed
    pub fn seeded_rng(seed: u64) -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(seed)
    }
}
