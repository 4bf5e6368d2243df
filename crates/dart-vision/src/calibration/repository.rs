//! Durable storage for calibration rows.

use super::error::StorageError;
use super::record::CalibrationRow;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Load/save contract for calibration rows.
pub trait CalibrationRepository: Send + Sync {
    fn load_all(&self) -> Result<Vec<CalibrationRow>, StorageError>;
    /// Insert or replace the row for `row.camera_id`.
    fn save(&self, row: &CalibrationRow) -> Result<(), StorageError>;
    fn delete(&self, camera_id: u32) -> Result<(), StorageError>;
}

/// All rows in one pretty-printed JSON array.
///
/// Writes go to a sibling temporary file which then replaces the target, so
/// a crash mid-write leaves the previous file intact.
#[derive(Clone, Debug)]
pub struct JsonFileRepository {
    path: PathBuf,
}

impl JsonFileRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_rows(&self) -> Result<BTreeMap<u32, CalibrationRow>, StorageError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(e.into()),
        };
        if raw.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        let rows: Vec<CalibrationRow> = serde_json::from_str(&raw)?;
        Ok(rows.into_iter().map(|r| (r.camera_id, r)).collect())
    }

    fn write_rows(&self, rows: &BTreeMap<u32, CalibrationRow>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let rows: Vec<&CalibrationRow> = rows.values().collect();
        let json = serde_json::to_string_pretty(&rows)?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl CalibrationRepository for JsonFileRepository {
    fn load_all(&self) -> Result<Vec<CalibrationRow>, StorageError> {
        Ok(self.read_rows()?.into_values().collect())
    }

    fn save(&self, row: &CalibrationRow) -> Result<(), StorageError> {
        let mut rows = self.read_rows()?;
        rows.insert(row.camera_id, row.clone());
        self.write_rows(&rows)
    }

    fn delete(&self, camera_id: u32) -> Result<(), StorageError> {
        let mut rows = self.read_rows()?;
        if rows.remove(&camera_id).is_some() {
            self.write_rows(&rows)?;
        }
        Ok(())
    }
}

/// Process-local repository, for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    rows: Mutex<BTreeMap<u32, CalibrationRow>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn rows(&self) -> std::sync::MutexGuard<'_, BTreeMap<u32, CalibrationRow>> {
        self.rows.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl CalibrationRepository for InMemoryRepository {
    fn load_all(&self) -> Result<Vec<CalibrationRow>, StorageError> {
        Ok(self.rows().values().cloned().collect())
    }

    fn save(&self, row: &CalibrationRow) -> Result<(), StorageError> {
        self.rows().insert(row.camera_id, row.clone());
        Ok(())
    }

    fn delete(&self, camera_id: u32) -> Result<(), StorageError> {
        self.rows().remove(&camera_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn row(camera_id: u32) -> CalibrationRow {
        CalibrationRow {
            camera_id,
            center_x: 320,
            center_y: 240,
            radius: 180.5,
            transform_matrix: [1.0, 0.0, 80.0, 0.0, 1.0, 160.0, 0.0, 0.0, 1.0],
            calibrated_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let repo = JsonFileRepository::new(dir.path().join("nope.json"));
        assert!(repo.load_all().unwrap().is_empty());
    }

    #[test]
    fn json_file_upserts_and_deletes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("calibration.json");
        let repo = JsonFileRepository::new(&path);

        repo.save(&row(2)).unwrap();
        repo.save(&row(0)).unwrap();
        let mut replaced = row(2);
        replaced.radius = 200.0;
        repo.save(&replaced).unwrap();

        let rows = repo.load_all().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].camera_id, 0);
        assert_eq!(rows[1], replaced);

        repo.delete(0).unwrap();
        repo.delete(7).unwrap();
        let rows = JsonFileRepository::new(&path).load_all().unwrap();
        assert_eq!(rows, vec![replaced]);
    }

    #[test]
    fn persisted_layout_uses_camel_case_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calibration.json");
        JsonFileRepository::new(&path).save(&row(1)).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        for key in [
            "cameraId",
            "centerX",
            "centerY",
            "radius",
            "transformMatrix",
            "calibratedAt",
        ] {
            assert!(raw.contains(key), "missing {key} in {raw}");
        }
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calibration.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            JsonFileRepository::new(&path).load_all(),
            Err(StorageError::Json(_))
        ));
    }

    #[test]
    fn in_memory_round_trip() {
        let repo = InMemoryRepository::new();
        repo.save(&row(3)).unwrap();
        assert_eq!(repo.load_all().unwrap(), vec![row(3)]);
        repo.delete(3).unwrap();
        assert!(repo.load_all().unwrap().is_empty());
    }
}
