// Fixtures shared by the unit tests: an in-memory module source and writers for synthetic
// module files.
use hdf5::{File, Group};
use ndarray::{Array2, Array3, Array4};
use std::path::Path;

use super::constants::{
    CELL_ID_NAME, DATA_NAME, GAIN_NAME, INDEX_COUNT_NAME, INDEX_FIRST_NAME, INDEX_TRAIN_ID_FIELD,
    MASK_NAME, PULSE_ID_NAME, STATUS_NAME, TRAIN_ID_NAME,
};
use super::error::ModuleFileError;
use super::module_file::{image_group_path, index_group_path};
use super::module_source::{ModuleHeaders, ModuleLayout, ModuleSource, StorageLayout};

/// A module held entirely in memory
#[derive(Debug, Clone)]
pub struct MemoryModule {
    pub layout: ModuleLayout,
    pub headers: ModuleHeaders,
    /// Raw samples, (frame, slot, pixel) order
    pub raw: Vec<u16>,
    /// Calibrated analog data, (frame, pixel) order
    pub analog: Vec<f32>,
    pub gain: Vec<u8>,
    pub mask: Vec<u8>,
    /// Frames whose reads fail
    pub failing_frames: Vec<usize>,
}

impl MemoryModule {
    /// A raw module whose frame f has (train, pulse) = timestamps[f], cell f and status 0.
    ///
    /// Analog sample of pixel p in frame f is `1000 + 10 * f + p`; the digital sample is
    /// `slot * 5000 + f`.
    pub fn raw(rows: usize, cols: usize, timestamps: &[(u64, u64)]) -> Self {
        let n_frames = timestamps.len();
        let nn = rows * cols;
        let mut raw = Vec::with_capacity(n_frames * 2 * nn);
        for f in 0..n_frames {
            for slot in 0..2 {
                for p in 0..nn {
                    raw.push(if slot == 0 {
                        (1000 + 10 * f + p) as u16
                    } else {
                        (slot * 5000 + f) as u16
                    });
                }
            }
        }
        Self {
            layout: ModuleLayout {
                storage: StorageLayout::Raw,
                n_frames,
                n_stack: 2,
                rows,
                cols,
            },
            headers: headers_for(timestamps),
            raw,
            analog: Vec::new(),
            gain: Vec::new(),
            mask: Vec::new(),
            failing_frames: Vec::new(),
        }
    }

    /// A calibrated module with analog value `f + 0.5` everywhere and pixel 0 masked
    pub fn calibrated(rows: usize, cols: usize, timestamps: &[(u64, u64)]) -> Self {
        let n_frames = timestamps.len();
        let nn = rows * cols;
        let mut analog = Vec::with_capacity(n_frames * nn);
        let mut mask = Vec::with_capacity(n_frames * nn);
        for f in 0..n_frames {
            for p in 0..nn {
                analog.push(f as f32 + 0.5);
                mask.push(if p == 0 { 1 } else { 0 });
            }
        }
        Self {
            layout: ModuleLayout {
                storage: StorageLayout::Calibrated,
                n_frames,
                n_stack: 1,
                rows,
                cols,
            },
            headers: headers_for(timestamps),
            raw: Vec::new(),
            analog,
            gain: vec![2; n_frames * nn],
            mask,
            failing_frames: Vec::new(),
        }
    }

    pub fn with_status(mut self, frame: usize, status: u16) -> Self {
        self.headers.status_ids[frame] = status;
        self
    }

    pub fn with_failing_frame(mut self, frame: usize) -> Self {
        self.failing_frames.push(frame);
        self
    }
}

fn headers_for(timestamps: &[(u64, u64)]) -> ModuleHeaders {
    ModuleHeaders {
        train_ids: timestamps.iter().map(|t| t.0).collect(),
        pulse_ids: timestamps.iter().map(|t| t.1).collect(),
        cell_ids: (0..timestamps.len() as u16).collect(),
        status_ids: vec![0; timestamps.len()],
    }
}

impl ModuleSource for MemoryModule {
    fn layout(&self) -> ModuleLayout {
        self.layout
    }

    fn read_headers(&self) -> Result<ModuleHeaders, ModuleFileError> {
        Ok(self.headers.clone())
    }

    fn read_raw_slab(&self, frame: i64, slot: i64, out: &mut [u16]) -> Result<(), ModuleFileError> {
        if frame < 0 || frame as usize >= self.layout.n_frames {
            return Err(ModuleFileError::FrameOutOfRange(frame, self.layout.n_frames));
        }
        if slot < 0 || slot as usize >= self.layout.n_stack {
            return Err(ModuleFileError::SlotOutOfRange(slot, self.layout.n_stack));
        }
        if self.failing_frames.contains(&(frame as usize)) {
            return Err(ModuleFileError::ShortRead(0, out.len()));
        }
        let nn = self.layout.n_pixels();
        let start = (frame as usize * self.layout.n_stack + slot as usize) * nn;
        out.copy_from_slice(&self.raw[start..start + nn]);
        Ok(())
    }

    fn read_calibrated_frame(
        &self,
        frame: usize,
        analog: &mut [f32],
        gain: &mut [u8],
        mask: &mut [u8],
    ) -> Result<(), ModuleFileError> {
        if frame >= self.layout.n_frames {
            return Err(ModuleFileError::FrameOutOfRange(frame as i64, self.layout.n_frames));
        }
        if self.failing_frames.contains(&frame) {
            return Err(ModuleFileError::ShortRead(0, analog.len()));
        }
        let nn = self.layout.n_pixels();
        let range = frame * nn..(frame + 1) * nn;
        analog.copy_from_slice(&self.analog[range.clone()]);
        gain.copy_from_slice(&self.gain[range.clone()]);
        mask.copy_from_slice(&self.mask[range]);
        Ok(())
    }
}

/// Description of a synthetic raw module file
#[derive(Debug, Clone)]
pub struct RawFixture {
    pub n_stack: usize,
    pub rows: usize,
    pub cols: usize,
    pub timestamps: Vec<(u64, u64)>,
}

impl RawFixture {
    pub fn new(n_stack: usize, rows: usize, cols: usize, timestamps: Vec<(u64, u64)>) -> Self {
        Self {
            n_stack,
            rows,
            cols,
            timestamps,
        }
    }

    /// Sample values of one (frame, slot) slab
    pub fn slab(&self, frame: usize, slot: usize) -> Vec<u16> {
        (0..self.rows * self.cols)
            .map(|p| (frame * 1000 + slot * 100 + p) as u16)
            .collect()
    }
}

/// Open a nested group, creating every missing level
pub fn ensure_group(file: &File, path: &str) -> Group {
    let mut group = file.group("/").unwrap();
    for name in path.split('/').filter(|n| !n.is_empty()) {
        group = match group.group(name) {
            Ok(g) => g,
            Err(_) => group.create_group(name).unwrap(),
        };
    }
    group
}

fn column<T: hdf5::types::H5Type + Clone>(values: Vec<T>) -> Array2<T> {
    let n = values.len();
    Array2::from_shape_vec((n, 1), values).unwrap()
}

fn write_headers(group: &Group, timestamps: &[(u64, u64)]) {
    let n = timestamps.len();
    group
        .new_dataset_builder()
        .with_data(&column(timestamps.iter().map(|t| t.0).collect()))
        .create(TRAIN_ID_NAME)
        .unwrap();
    group
        .new_dataset_builder()
        .with_data(&column(timestamps.iter().map(|t| t.1).collect()))
        .create(PULSE_ID_NAME)
        .unwrap();
    group
        .new_dataset_builder()
        .with_data(&column((0..n as u16).collect()))
        .create(CELL_ID_NAME)
        .unwrap();
    group
        .new_dataset_builder()
        .with_data(&column(vec![0u16; n]))
        .create(STATUS_NAME)
        .unwrap();
}

/// Write a raw module file, including a train index built from the timestamps
pub fn write_raw_module_file(path: &Path, module: usize, fixture: &RawFixture) {
    let file = File::create(path).unwrap();
    let group = ensure_group(&file, &image_group_path(module));
    let n = fixture.timestamps.len();
    let mut data = Array4::<u16>::zeros((n, fixture.n_stack, fixture.rows, fixture.cols));
    for f in 0..n {
        for slot in 0..fixture.n_stack {
            let slab = fixture.slab(f, slot);
            for (p, v) in slab.iter().enumerate() {
                data[[f, slot, p / fixture.cols, p % fixture.cols]] = *v;
            }
        }
    }
    group
        .new_dataset_builder()
        .with_data(&data)
        .create(DATA_NAME)
        .unwrap();
    write_headers(&group, &fixture.timestamps);

    // Train index: consecutive runs of equal train IDs
    let mut trains: Vec<u64> = Vec::new();
    let mut first: Vec<u64> = Vec::new();
    let mut count: Vec<u64> = Vec::new();
    for (f, (train, _)) in fixture.timestamps.iter().enumerate() {
        if trains.last() == Some(train) {
            if let Some(c) = count.last_mut() {
                *c += 1;
            }
        } else {
            trains.push(*train);
            first.push(f as u64);
            count.push(1);
        }
    }
    let index = ensure_group(&file, &index_group_path(module));
    index
        .new_dataset_builder()
        .with_data(&first)
        .create(INDEX_FIRST_NAME)
        .unwrap();
    index
        .new_dataset_builder()
        .with_data(&count)
        .create(INDEX_COUNT_NAME)
        .unwrap();
    let (index_parent, index_name) = INDEX_TRAIN_ID_FIELD.rsplit_once('/').unwrap();
    ensure_group(&file, index_parent)
        .new_dataset_builder()
        .with_data(&trains)
        .create(index_name)
        .unwrap();
}

/// Write a calibrated module file: analog `10 * f + p`, gain `f`, pixel 1 masked
pub fn write_calibrated_module_file(
    path: &Path,
    module: usize,
    n_frames: usize,
    rows: usize,
    cols: usize,
) {
    let file = File::create(path).unwrap();
    let group = ensure_group(&file, &image_group_path(module));
    let mut data = Array3::<f32>::zeros((n_frames, rows, cols));
    let mut gain = Array3::<u8>::zeros((n_frames, rows, cols));
    let mut mask = Array3::<u8>::zeros((n_frames, rows, cols));
    for f in 0..n_frames {
        for p in 0..rows * cols {
            let (r, c) = (p / cols, p % cols);
            data[[f, r, c]] = (10 * f + p) as f32;
            gain[[f, r, c]] = f as u8;
            if p == 1 {
                mask[[f, r, c]] = 1;
            }
        }
    }
    group
        .new_dataset_builder()
        .with_data(&data)
        .create(DATA_NAME)
        .unwrap();
    group
        .new_dataset_builder()
        .with_data(&gain)
        .create(GAIN_NAME)
        .unwrap();
    group
        .new_dataset_builder()
        .with_data(&mask)
        .create(MASK_NAME)
        .unwrap();
    let timestamps: Vec<(u64, u64)> = (0..n_frames as u64).map(|f| (1, f)).collect();
    write_headers(&group, &timestamps);
}
