use std::fmt::Display;

use super::error::ModuleFileError;

/// How a module file stores its image data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageLayout {
    /// Uncalibrated detector output: analog and digital samples in adjacent stack slots
    Raw,
    /// Facility-calibrated output: one analog channel plus separate gain and mask fields
    Calibrated,
}

impl Display for StorageLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Raw => write!(f, "raw"),
            Self::Calibrated => write!(f, "calibrated"),
        }
    }
}

/// Geometry of one module file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleLayout {
    pub storage: StorageLayout,
    pub n_frames: usize,
    /// Number of stack slots per frame (2 for raw data, 1 otherwise)
    pub n_stack: usize,
    /// Slow-scan extent
    pub rows: usize,
    /// Fast-scan extent
    pub cols: usize,
}

impl ModuleLayout {
    pub fn n_pixels(&self) -> usize {
        self.rows * self.cols
    }

    /// Do two modules describe the same pixel grid and storage layout?
    pub fn is_compatible(&self, other: &ModuleLayout) -> bool {
        self.storage == other.storage && self.rows == other.rows && self.cols == other.cols
    }
}

/// Per-frame metadata of one module, one entry per physical frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModuleHeaders {
    pub train_ids: Vec<u64>,
    pub pulse_ids: Vec<u64>,
    pub cell_ids: Vec<u16>,
    pub status_ids: Vec<u16>,
}

impl ModuleHeaders {
    /// Number of frames for which every list has an entry
    pub fn len(&self) -> usize {
        self.train_ids
            .len()
            .min(self.pulse_ids.len())
            .min(self.cell_ids.len())
            .min(self.status_ids.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cut every list down to `len` entries
    pub fn truncate(&mut self, len: usize) {
        self.train_ids.truncate(len);
        self.pulse_ids.truncate(len);
        self.cell_ids.truncate(len);
        self.status_ids.truncate(len);
    }

    pub fn size_bytes(&self) -> usize {
        self.train_ids.len() * std::mem::size_of::<u64>()
            + self.pulse_ids.len() * std::mem::size_of::<u64>()
            + self.cell_ids.len() * std::mem::size_of::<u16>()
            + self.status_ids.len() * std::mem::size_of::<u16>()
    }
}

/// The facility's (first frame, frame count) table for each train of a file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainIndex {
    pub train_ids: Vec<u64>,
    pub first: Vec<u64>,
    pub count: Vec<u64>,
}

impl TrainIndex {
    /// Compare the table against per-frame metadata.
    ///
    /// Returns the train IDs whose frame range in the table does not match the frames
    /// carrying that train ID in `headers`.
    pub fn mismatched_trains(&self, headers: &ModuleHeaders) -> Vec<u64> {
        let mut bad = Vec::new();
        for ((train, first), count) in self.train_ids.iter().zip(&self.first).zip(&self.count) {
            if *count == 0 {
                continue;
            }
            let range = first
                .checked_add(*count)
                .and_then(|end| Some(usize::try_from(*first).ok()?..usize::try_from(end).ok()?));
            match range.and_then(|r| headers.train_ids.get(r)) {
                Some(ids) if ids.iter().all(|id| id == train) => (),
                _ => bad.push(*train),
            }
        }
        bad
    }
}

/// The typed file-reading substrate behind a module stream.
///
/// Implemented over HDF5 by `ModuleFile`; tests use an in-memory implementation.
pub trait ModuleSource {
    fn layout(&self) -> ModuleLayout;

    /// Read the per-frame train, pulse, cell and status lists
    fn read_headers(&self) -> Result<ModuleHeaders, ModuleFileError>;

    /// Read the facility train index if the file carries one
    fn read_train_index(&self) -> Result<Option<TrainIndex>, ModuleFileError> {
        Ok(None)
    }

    /// Read one rows x cols slab of raw samples at (frame, stack slot)
    fn read_raw_slab(&self, frame: i64, slot: i64, out: &mut [u16]) -> Result<(), ModuleFileError>;

    /// Read one frame of calibrated data with its gain and mask fields
    fn read_calibrated_frame(
        &self,
        frame: usize,
        analog: &mut [f32],
        gain: &mut [u8],
        mask: &mut [u8],
    ) -> Result<(), ModuleFileError>;

    /// Total size of the underlying file
    fn size_bytes(&self) -> u64 {
        0
    }
}
