use hdf5::types::H5Type;
use hdf5::{Dataset, File};
use ndarray::{s, Ix2};
use std::path::{Path, PathBuf};

use super::constants::{
    CELL_ID_NAME, DATA_NAME, GAIN_NAME, IMAGE_GROUP_SUFFIX, INDEX_COUNT_NAME, INDEX_FIRST_NAME,
    INDEX_PREFIX, INDEX_TRAIN_ID_FIELD, INSTRUMENT_PREFIX, MASK_NAME, PULSE_ID_NAME, RAW_PREFIX,
    STATUS_NAME, TRAIN_ID_NAME,
};
use super::error::ModuleFileError;
use super::module_source::{ModuleHeaders, ModuleLayout, ModuleSource, StorageLayout, TrainIndex};

/// Decide from the file name whether a module file holds raw detector data.
///
/// Facility files are named `RAW-...` before calibration and `CORR-...` after.
pub fn storage_from_filename(path: &Path) -> StorageLayout {
    let base = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    if base.starts_with(RAW_PREFIX) {
        StorageLayout::Raw
    } else {
        StorageLayout::Calibrated
    }
}

/// Path of the image group of a module inside its file
pub fn image_group_path(module_index: usize) -> String {
    format!("{INSTRUMENT_PREFIX}{module_index}{IMAGE_GROUP_SUFFIX}")
}

/// Path of the train index group of a module inside its file
pub fn index_group_path(module_index: usize) -> String {
    format!("{INDEX_PREFIX}{module_index}{IMAGE_GROUP_SUFFIX}")
}

/// One AGIPD module file opened through hdf5.
///
/// Each module writes its own file; the image group is addressed by the module number.
#[derive(Debug)]
pub struct ModuleFile {
    file_handle: File,
    path: PathBuf,
    module_index: usize,
    image_group: String,
    data: Dataset,
    layout: ModuleLayout,
    size_bytes: u64,
}

impl ModuleFile {
    /// Open a module file and work out its geometry
    pub fn open(path: &Path, module_index: usize) -> Result<Self, ModuleFileError> {
        if !path.exists() {
            return Err(ModuleFileError::BadFilePath(path.to_path_buf()));
        }
        let file_handle = File::open(path)?;
        let storage = storage_from_filename(path);
        let image_group = image_group_path(module_index);
        let data = file_handle.dataset(&format!("{image_group}/{DATA_NAME}"))?;
        let dims = data.shape();

        let layout = match storage {
            StorageLayout::Raw => {
                if dims.len() != 4 {
                    return Err(ModuleFileError::BadLayout(dims, storage.to_string()));
                }
                ModuleLayout {
                    storage,
                    n_frames: dims[0],
                    n_stack: dims[1],
                    rows: dims[2],
                    cols: dims[3],
                }
            }
            StorageLayout::Calibrated => {
                if dims.len() != 3 {
                    return Err(ModuleFileError::BadLayout(dims, storage.to_string()));
                }
                ModuleLayout {
                    storage,
                    n_frames: dims[0],
                    n_stack: 1,
                    rows: dims[1],
                    cols: dims[2],
                }
            }
        };

        let size_bytes = path.metadata()?.len();

        Ok(Self {
            file_handle,
            path: path.to_path_buf(),
            module_index,
            image_group,
            data,
            layout,
            size_bytes,
        })
    }

    pub fn get_path(&self) -> &Path {
        &self.path
    }

    fn field(&self, name: &str) -> String {
        format!("{}/{}", self.image_group, name)
    }

    fn read_field<T: H5Type>(&self, name: &str) -> Result<Vec<T>, ModuleFileError> {
        Ok(self.file_handle.dataset(&self.field(name))?.read_raw::<T>()?)
    }

    fn check_frame(&self, frame: i64) -> Result<usize, ModuleFileError> {
        if frame < 0 || frame as usize >= self.layout.n_frames {
            return Err(ModuleFileError::FrameOutOfRange(frame, self.layout.n_frames));
        }
        Ok(frame as usize)
    }
}

/// Copy a read slab into the caller's buffer, refusing partial data
fn copy_slab<T: Copy>(slab: &ndarray::Array2<T>, out: &mut [T]) -> Result<(), ModuleFileError> {
    if slab.len() != out.len() {
        return Err(ModuleFileError::ShortRead(slab.len(), out.len()));
    }
    for (o, v) in out.iter_mut().zip(slab.iter()) {
        *o = *v;
    }
    Ok(())
}

impl ModuleSource for ModuleFile {
    fn layout(&self) -> ModuleLayout {
        self.layout
    }

    fn read_headers(&self) -> Result<ModuleHeaders, ModuleFileError> {
        Ok(ModuleHeaders {
            train_ids: self.read_field::<u64>(TRAIN_ID_NAME)?,
            pulse_ids: self.read_field::<u64>(PULSE_ID_NAME)?,
            cell_ids: self.read_field::<u16>(CELL_ID_NAME)?,
            status_ids: self.read_field::<u16>(STATUS_NAME)?,
        })
    }

    fn read_train_index(&self) -> Result<Option<TrainIndex>, ModuleFileError> {
        let index_group = index_group_path(self.module_index);
        let first = self
            .file_handle
            .dataset(&format!("{index_group}/{INDEX_FIRST_NAME}"));
        let count = self
            .file_handle
            .dataset(&format!("{index_group}/{INDEX_COUNT_NAME}"));
        let trains = self.file_handle.dataset(INDEX_TRAIN_ID_FIELD);
        match (first, count, trains) {
            (Ok(first), Ok(count), Ok(trains)) => Ok(Some(TrainIndex {
                train_ids: trains.read_raw::<u64>()?,
                first: first.read_raw::<u64>()?,
                count: count.read_raw::<u64>()?,
            })),
            _ => Ok(None),
        }
    }

    fn read_raw_slab(&self, frame: i64, slot: i64, out: &mut [u16]) -> Result<(), ModuleFileError> {
        if self.layout.storage != StorageLayout::Raw {
            return Err(ModuleFileError::WrongLayout(
                "read_raw_slab",
                self.layout.storage.to_string(),
            ));
        }
        let frame = self.check_frame(frame)?;
        if slot < 0 || slot as usize >= self.layout.n_stack {
            return Err(ModuleFileError::SlotOutOfRange(slot, self.layout.n_stack));
        }
        let slab = self
            .data
            .read_slice::<u16, _, Ix2>(s![frame, slot as usize, .., ..])?;
        copy_slab(&slab, out)
    }

    fn read_calibrated_frame(
        &self,
        frame: usize,
        analog: &mut [f32],
        gain: &mut [u8],
        mask: &mut [u8],
    ) -> Result<(), ModuleFileError> {
        if self.layout.storage != StorageLayout::Calibrated {
            return Err(ModuleFileError::WrongLayout(
                "read_calibrated_frame",
                self.layout.storage.to_string(),
            ));
        }
        let frame = self.check_frame(frame as i64)?;
        let data = self.data.read_slice::<f32, _, Ix2>(s![frame, .., ..])?;
        copy_slab(&data, analog)?;
        let gain_slab = self
            .file_handle
            .dataset(&self.field(GAIN_NAME))?
            .read_slice::<u8, _, Ix2>(s![frame, .., ..])?;
        copy_slab(&gain_slab, gain)?;
        let mask_slab = self
            .file_handle
            .dataset(&self.field(MASK_NAME))?
            .read_slice::<u8, _, Ix2>(s![frame, .., ..])?;
        copy_slab(&mask_slab, mask)
    }

    fn size_bytes(&self) -> u64 {
        self.size_bytes
    }
}
