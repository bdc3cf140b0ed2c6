use hdf5::types::H5Type;
use hdf5::File;
use std::path::{Path, PathBuf};

use super::config::Strictness;
use super::constants::{
    CALIB_BADPIXEL_NAME, CALIB_OFFSET_NAME, CALIB_RELATIVE_GAIN_NAME, CALIB_THRESHOLD_NAME,
    MASK_BAD, MASK_GOOD, MAX_EXPECTED_CELLS, N_GAINS,
};
use super::error::CalibrationError;

/// A (gain, cell, row, col) tensor of calibration constants, stored flat in row-major order
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationTensor<T> {
    data: Vec<T>,
    shape: [usize; 4],
}

impl<T: Copy> CalibrationTensor<T> {
    /// Wrap a flat buffer. The buffer length must match the shape.
    pub fn new(data: Vec<T>, shape: [usize; 4]) -> Result<Self, CalibrationError> {
        let expected: usize = shape.iter().product();
        if data.len() != expected {
            return Err(CalibrationError::SizeMismatch(
                String::from("tensor"),
                data.len(),
                shape.to_vec(),
                expected,
            ));
        }
        Ok(Self { data, shape })
    }

    /// A tensor holding the same value everywhere
    pub fn filled(value: T, shape: [usize; 4]) -> Self {
        Self {
            data: vec![value; shape.iter().product()],
            shape,
        }
    }

    pub fn shape(&self) -> [usize; 4] {
        self.shape
    }

    fn row_len(&self) -> usize {
        self.shape[2] * self.shape[3]
    }

    /// The per-pixel row for (gain, cell), or None if either index is out of range
    pub fn row(&self, gain: usize, cell: usize) -> Option<&[T]> {
        if gain >= self.shape[0] || cell >= self.shape[1] {
            return None;
        }
        let len = self.row_len();
        let start = (gain * self.shape[1] + cell) * len;
        self.data.get(start..start + len)
    }

    /// Reshape to `shape`, keeping the overlapping region and filling the rest with `fill`.
    ///
    /// Rows with the expected number of pixels are kept whole and read as flat pixel rows,
    /// whatever their (row, col) extent.
    fn conform(mut self, shape: [usize; 4], fill: T) -> Self {
        if self.row_len() == shape[2] * shape[3] {
            self.shape[2] = shape[2];
            self.shape[3] = shape[3];
        }
        if self.shape == shape {
            return self;
        }
        let mut out = Self::filled(fill, shape);
        let common: Vec<usize> = (0..4).map(|d| self.shape[d].min(shape[d])).collect();
        for g in 0..common[0] {
            for c in 0..common[1] {
                for r in 0..common[2] {
                    let src = ((g * self.shape[1] + c) * self.shape[2] + r) * self.shape[3];
                    let dst = ((g * shape[1] + c) * shape[2] + r) * shape[3];
                    out.data[dst..dst + common[3]]
                        .copy_from_slice(&self.data[src..src + common[3]]);
                }
            }
        }
        out
    }

    fn size_bytes(&self) -> usize {
        self.data.len() * std::mem::size_of::<T>()
    }
}

/// The calibration rows for one (gain, cell)
#[derive(Debug, Clone, Copy)]
pub struct CalibrationRows<'a> {
    pub offset: &'a [i16],
    pub threshold: &'a [u16],
    pub relative_gain: &'a [f32],
    pub bad_pixel: &'a [u8],
}

/// The four calibration tensors of one module.
///
/// All tensors share the (gain, cell) extent of the dark offsets and the (row, col) extent
/// of the module they calibrate. The store is immutable once built, so it can be shared
/// freely between threads.
#[derive(Debug, Clone)]
pub struct CalibrationStore {
    offset: CalibrationTensor<i16>,
    threshold: CalibrationTensor<u16>,
    relative_gain: CalibrationTensor<f32>,
    bad_pixel: CalibrationTensor<u8>,
    n_cells: usize,
    source: Option<PathBuf>,
}

/// Neutral values used for constants the artifact does not provide
const NEUTRAL_OFFSET: i16 = 0;
const NEUTRAL_THRESHOLD: u16 = u16::MAX;
const NEUTRAL_RELATIVE_GAIN: f32 = 1.0;
const NEUTRAL_BAD_PIXEL: u8 = 0;

impl CalibrationStore {
    /// Load the calibration artifact at `path` for a module of `rows` x `cols` pixels
    pub fn load(
        path: &Path,
        rows: usize,
        cols: usize,
        strictness: Strictness,
    ) -> Result<Self, CalibrationError> {
        if !path.exists() {
            return Err(CalibrationError::BadFilePath(path.to_path_buf()));
        }
        spdlog::info!("Opening calibration file {}...", path.to_string_lossy());
        let file = File::open(path)?;

        let offset = match read_tensor::<i16>(&file, CALIB_OFFSET_NAME, strictness)? {
            Some(t) => t,
            None => return Err(CalibrationError::MissingTensor(CALIB_OFFSET_NAME.into())),
        };
        let threshold = read_tensor::<u16>(&file, CALIB_THRESHOLD_NAME, strictness)?;
        let relative_gain = read_tensor::<f32>(&file, CALIB_RELATIVE_GAIN_NAME, strictness)?;
        let bad_pixel = read_tensor::<u8>(&file, CALIB_BADPIXEL_NAME, strictness)?;

        let mut store = Self::from_tensors(
            offset,
            threshold,
            relative_gain,
            bad_pixel,
            rows,
            cols,
            strictness,
        )?;
        store.source = Some(path.to_path_buf());

        if let Some(first) = store.lookup(0, 0) {
            let preview: Vec<i16> = first.offset.iter().take(5).copied().collect();
            spdlog::debug!("First few offsets of gain 0 / cell 0: {:?}", preview);
        }
        spdlog::info!(
            "Loaded {} calibration cells ({})",
            store.n_cells,
            human_bytes::human_bytes(store.size_bytes() as f64)
        );
        Ok(store)
    }

    /// Build a store from in-memory tensors.
    ///
    /// The dark offset tensor fixes the cell count. Under `Strictness::Lenient` every other
    /// mismatch is logged and the tensor is conformed to the expected shape; missing
    /// optional tensors are filled with neutral constants.
    pub fn from_tensors(
        offset: CalibrationTensor<i16>,
        threshold: Option<CalibrationTensor<u16>>,
        relative_gain: Option<CalibrationTensor<f32>>,
        bad_pixel: Option<CalibrationTensor<u8>>,
        rows: usize,
        cols: usize,
        strictness: Strictness,
    ) -> Result<Self, CalibrationError> {
        let dims = offset.shape();
        if dims[0] != N_GAINS {
            spdlog::warn!(
                "Error in number of gain stages: expect {} but calibration has {}",
                N_GAINS,
                dims[0]
            );
        }
        if dims[1] > MAX_EXPECTED_CELLS {
            spdlog::warn!("Odd: suspiciously large number of memory cells: {}", dims[1]);
        }
        let n_cells = dims[1];
        let expected = [N_GAINS, n_cells, rows, cols];

        let offset = check_shape(offset, CALIB_OFFSET_NAME, expected, NEUTRAL_OFFSET, strictness)?;
        let threshold = conform_optional(
            threshold,
            CALIB_THRESHOLD_NAME,
            expected,
            NEUTRAL_THRESHOLD,
            strictness,
        )?;
        let relative_gain = conform_optional(
            relative_gain,
            CALIB_RELATIVE_GAIN_NAME,
            expected,
            NEUTRAL_RELATIVE_GAIN,
            strictness,
        )?;
        let bad_pixel = conform_optional(
            bad_pixel,
            CALIB_BADPIXEL_NAME,
            expected,
            NEUTRAL_BAD_PIXEL,
            strictness,
        )?;

        Ok(Self {
            offset,
            threshold,
            relative_gain,
            bad_pixel,
            n_cells,
            source: None,
        })
    }

    pub fn n_gains(&self) -> usize {
        N_GAINS
    }

    pub fn n_cells(&self) -> usize {
        self.n_cells
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Total memory held by the four tensors
    pub fn size_bytes(&self) -> usize {
        self.offset.size_bytes()
            + self.threshold.size_bytes()
            + self.relative_gain.size_bytes()
            + self.bad_pixel.size_bytes()
    }

    /// The calibration rows for (gain, cell), or None when either is out of range
    pub fn lookup(&self, gain: usize, cell: usize) -> Option<CalibrationRows<'_>> {
        if gain >= N_GAINS || cell >= self.n_cells {
            return None;
        }
        Some(CalibrationRows {
            offset: self.offset.row(gain, cell)?,
            threshold: self.threshold.row(gain, cell)?,
            relative_gain: self.relative_gain.row(gain, cell)?,
            bad_pixel: self.bad_pixel.row(gain, cell)?,
        })
    }
}

fn check_shape<T: Copy>(
    tensor: CalibrationTensor<T>,
    name: &str,
    expected: [usize; 4],
    fill: T,
    strictness: Strictness,
) -> Result<CalibrationTensor<T>, CalibrationError> {
    if tensor.shape() == expected {
        return Ok(tensor);
    }
    match strictness {
        Strictness::Strict => Err(CalibrationError::ShapeMismatch(
            name.to_string(),
            tensor.shape().to_vec(),
            expected.to_vec(),
        )),
        Strictness::Lenient => {
            let [_, _, rows, cols] = tensor.shape();
            if rows * cols == expected[2] * expected[3] {
                spdlog::warn!(
                    "Calibration tensor {} has shape {:?} but the module expects {:?}; reading it as flat pixel rows",
                    name,
                    tensor.shape(),
                    expected
                );
            } else {
                spdlog::warn!(
                    "Calibration tensor {} has shape {:?} but the module expects {:?}; keeping the overlap",
                    name,
                    tensor.shape(),
                    expected
                );
            }
            Ok(tensor.conform(expected, fill))
        }
    }
}

fn conform_optional<T: Copy>(
    tensor: Option<CalibrationTensor<T>>,
    name: &str,
    expected: [usize; 4],
    fill: T,
    strictness: Strictness,
) -> Result<CalibrationTensor<T>, CalibrationError> {
    match tensor {
        Some(t) => check_shape(t, name, expected, fill, strictness),
        None => match strictness {
            Strictness::Strict => Err(CalibrationError::MissingTensor(name.to_string())),
            Strictness::Lenient => {
                spdlog::warn!("Calibration file has no {name} tensor; using neutral values");
                Ok(CalibrationTensor::filled(fill, expected))
            }
        },
    }
}

/// Read one tensor from the artifact. Returns None if the dataset does not exist.
fn read_tensor<T: H5Type + Copy>(
    file: &File,
    name: &str,
    strictness: Strictness,
) -> Result<Option<CalibrationTensor<T>>, CalibrationError> {
    let dataset = match file.dataset(name) {
        Ok(d) => d,
        Err(_) => return Ok(None),
    };
    let raw_shape = dataset.shape();
    if raw_shape.len() != 4 {
        if strictness == Strictness::Strict || raw_shape.len() > 4 {
            return Err(CalibrationError::ShapeMismatch(
                name.to_string(),
                raw_shape,
                vec![N_GAINS, 0, 0, 0],
            ));
        }
        spdlog::warn!(
            "Error in shape of {}: expect ndims=4 but ndims={}",
            name,
            raw_shape.len()
        );
    }
    // Missing leading axes are taken to have extent 1
    let mut shape = [1usize; 4];
    let pad = 4 - raw_shape.len();
    shape[pad..].copy_from_slice(&raw_shape);

    let data = dataset.read_raw::<T>()?;
    let expected: usize = shape.iter().product();
    if data.len() != expected {
        return Err(CalibrationError::SizeMismatch(
            name.to_string(),
            data.len(),
            shape.to_vec(),
            expected,
        ));
    }
    Ok(Some(CalibrationTensor { data, shape }))
}

/// Apply the calibration of `cell` to one frame of a module, in place.
///
/// `digital` holds the raw digital gain samples on entry and the resolved gain stage on
/// exit. With `bypass_gain_switch` every pixel is treated as gain stage 0. Stage 2 is never
/// selected.
pub fn apply_calibration(
    store: &CalibrationStore,
    cell: usize,
    analog: &mut [f32],
    digital: &mut [u16],
    mask: &mut [u16],
    bypass_gain_switch: bool,
) -> Result<(), CalibrationError> {
    let stage0 = store
        .lookup(0, cell)
        .ok_or(CalibrationError::CellOutOfRange(0, cell, store.n_cells()))?;
    let n_pixels = stage0.offset.len();
    for len in [analog.len(), digital.len(), mask.len()] {
        if len != n_pixels {
            return Err(CalibrationError::PixelCountMismatch(len, n_pixels));
        }
    }

    if bypass_gain_switch {
        for (p, ((a, d), m)) in analog
            .iter_mut()
            .zip(digital.iter_mut())
            .zip(mask.iter_mut())
            .enumerate()
        {
            *d = 0;
            if stage0.bad_pixel[p] != 0 {
                *a = 0.0;
                *m = MASK_BAD;
                continue;
            }
            *a -= stage0.offset[p] as f32;
            *a *= stage0.relative_gain[p];
        }
        return Ok(());
    }

    let stage1 = store
        .lookup(1, cell)
        .ok_or(CalibrationError::CellOutOfRange(1, cell, store.n_cells()))?;
    let stages = [stage0, stage1];

    for (p, ((a, d), m)) in analog
        .iter_mut()
        .zip(digital.iter_mut())
        .zip(mask.iter_mut())
        .enumerate()
    {
        let stage = classify_gain(*d, stage1.threshold[p]);
        let rows = &stages[stage as usize];
        *d = stage;
        if rows.bad_pixel[p] != 0 {
            *a = 0.0;
            *m = MASK_BAD;
            continue;
        }
        *a -= rows.offset[p] as f32;
        *a *= rows.relative_gain[p];
    }
    Ok(())
}

/// Gain stage of a raw digital sample given the stage 0 to 1 threshold
#[inline]
pub fn classify_gain(sample: u16, threshold: u16) -> u16 {
    if sample > threshold {
        1
    } else {
        0
    }
}

/// Mark every pixel of a mask as good
pub fn reset_mask(mask: &mut [u16]) {
    mask.fill(MASK_GOOD);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const ROWS: usize = 2;
    const COLS: usize = 2;
    const NN: usize = ROWS * COLS;

    /// Two-cell store where stage g of cell c has offset 10*(g+1) + c and relative gain g+1
    fn make_store() -> CalibrationStore {
        let shape = [N_GAINS, 2, ROWS, COLS];
        let mut offset = Vec::new();
        let mut gain = Vec::new();
        for g in 0..N_GAINS {
            for c in 0..2 {
                offset.extend(std::iter::repeat((10 * (g + 1) + c) as i16).take(NN));
                gain.extend(std::iter::repeat((g + 1) as f32).take(NN));
            }
        }
        CalibrationStore::from_tensors(
            CalibrationTensor::new(offset, shape).unwrap(),
            Some(CalibrationTensor::filled(100, shape)),
            Some(CalibrationTensor::new(gain, shape).unwrap()),
            Some(CalibrationTensor::filled(0, shape)),
            ROWS,
            COLS,
            Strictness::Strict,
        )
        .unwrap()
    }

    #[test]
    fn test_lookup_out_of_range() {
        let store = make_store();
        assert_eq!(store.n_cells(), 2);
        assert!(store.lookup(0, 0).is_some());
        assert!(store.lookup(2, 1).is_some());
        assert!(store.lookup(3, 0).is_none());
        assert!(store.lookup(0, 2).is_none());
    }

    #[test]
    fn test_stage_one_correction() {
        // Raw digital sample above the gain 1 threshold selects stage 1
        let shape = [N_GAINS, 2, ROWS, COLS];
        let store = CalibrationStore::from_tensors(
            CalibrationTensor::new(
                [vec![10; NN * 2], vec![10; NN * 2], vec![10; NN * 2]].concat(),
                shape,
            )
            .unwrap(),
            Some(CalibrationTensor::filled(100, shape)),
            Some(CalibrationTensor::new(
                [vec![1.0; NN * 2], vec![2.5; NN * 2], vec![1.0; NN * 2]].concat(),
                shape,
            )
            .unwrap()),
            None,
            ROWS,
            COLS,
            Strictness::Lenient,
        )
        .unwrap();
        let mut analog = vec![50.0; NN];
        let mut digital = vec![150; NN];
        let mut mask = vec![MASK_GOOD; NN];
        apply_calibration(&store, 0, &mut analog, &mut digital, &mut mask, false).unwrap();
        assert_eq!(analog, vec![(50.0 - 10.0) * 2.5; NN]);
        assert_eq!(digital, vec![1; NN]);
        assert_eq!(mask, vec![MASK_GOOD; NN]);
    }

    #[test]
    fn test_bypass_uses_stage_zero() {
        let shape = [N_GAINS, 2, ROWS, COLS];
        let offset = CalibrationTensor::new((0..(N_GAINS * 2 * NN) as i16).collect(), shape);
        let store = CalibrationStore::from_tensors(
            offset.unwrap(),
            Some(CalibrationTensor::filled(0, shape)),
            None,
            None,
            ROWS,
            COLS,
            Strictness::Lenient,
        )
        .unwrap();
        let raw = [500.0, 700.0, 900.0, 1100.0];
        let mut analog = raw.to_vec();
        let mut digital = vec![60000; NN];
        let mut mask = vec![MASK_GOOD; NN];
        apply_calibration(&store, 1, &mut analog, &mut digital, &mut mask, true).unwrap();
        let dark = store.lookup(0, 1).unwrap().offset;
        for p in 0..NN {
            assert_eq!(analog[p], raw[p] - dark[p] as f32);
        }
        assert_eq!(digital, vec![0; NN]);
        assert_eq!(mask, vec![MASK_GOOD; NN]);
    }

    #[test]
    fn test_bypass_applies_stage_zero_bad_pixels() {
        let shape = [N_GAINS, 1, ROWS, COLS];
        let mut bad = vec![0u8; N_GAINS * NN];
        bad[2] = 1;
        let store = CalibrationStore::from_tensors(
            CalibrationTensor::filled(5, shape),
            None,
            None,
            Some(CalibrationTensor::new(bad, shape).unwrap()),
            ROWS,
            COLS,
            Strictness::Lenient,
        )
        .unwrap();
        let mut analog = vec![20.0; NN];
        let mut digital = vec![0; NN];
        let mut mask = vec![MASK_GOOD; NN];
        apply_calibration(&store, 0, &mut analog, &mut digital, &mut mask, true).unwrap();
        assert_eq!(analog, vec![15.0, 15.0, 0.0, 15.0]);
        assert_eq!(mask, vec![MASK_GOOD, MASK_GOOD, MASK_BAD, MASK_GOOD]);
    }

    #[test]
    fn test_gain_classification_flips_at_threshold() {
        let store = make_store();
        let threshold = store.lookup(1, 0).unwrap().threshold[0];
        let mut last = 0;
        for sample in (threshold - 20)..(threshold + 20) {
            let stage = classify_gain(sample, threshold);
            assert!(stage >= last);
            last = stage;
            let expected = if sample > threshold { 1 } else { 0 };
            assert_eq!(stage, expected);
        }
        assert_eq!(last, 1);
    }

    #[test]
    fn test_bad_pixel_short_circuits() {
        let shape = [N_GAINS, 1, ROWS, COLS];
        let store = CalibrationStore::from_tensors(
            CalibrationTensor::filled(-3000, shape),
            Some(CalibrationTensor::filled(100, shape)),
            Some(CalibrationTensor::filled(42.0, shape)),
            Some(CalibrationTensor::filled(1, shape)),
            ROWS,
            COLS,
            Strictness::Strict,
        )
        .unwrap();
        let mut analog = vec![123.0; NN];
        let mut digital = vec![10, 200, 10, 200];
        let mut mask = vec![MASK_GOOD; NN];
        apply_calibration(&store, 0, &mut analog, &mut digital, &mut mask, false).unwrap();
        assert_eq!(analog, vec![0.0; NN]);
        assert_eq!(mask, vec![MASK_BAD; NN]);
        assert_eq!(digital, vec![0, 1, 0, 1]);
    }

    #[test]
    fn test_missing_cell_is_an_error() {
        let store = make_store();
        let mut analog = vec![0.0; NN];
        let mut digital = vec![0; NN];
        let mut mask = vec![MASK_GOOD; NN];
        let result = apply_calibration(&store, 7, &mut analog, &mut digital, &mut mask, false);
        assert!(matches!(result, Err(CalibrationError::CellOutOfRange(0, 7, 2))));
    }

    #[test]
    fn test_strict_rejects_mismatched_tensor() {
        let shape = [N_GAINS, 2, ROWS, COLS];
        let result = CalibrationStore::from_tensors(
            CalibrationTensor::filled(0, shape),
            Some(CalibrationTensor::filled(100, [2, 2, ROWS, COLS])),
            None,
            None,
            ROWS,
            COLS,
            Strictness::Strict,
        );
        assert!(matches!(result, Err(CalibrationError::ShapeMismatch(..))));
    }

    #[test]
    fn test_lenient_conforms_two_stage_thresholds() {
        let shape = [N_GAINS, 2, ROWS, COLS];
        let store = CalibrationStore::from_tensors(
            CalibrationTensor::filled(0, shape),
            Some(CalibrationTensor::filled(100, [2, 2, ROWS, COLS])),
            None,
            None,
            ROWS,
            COLS,
            Strictness::Lenient,
        )
        .unwrap();
        assert_eq!(store.lookup(1, 1).unwrap().threshold, &[100; NN]);
        assert_eq!(store.lookup(2, 1).unwrap().threshold, &[NEUTRAL_THRESHOLD; NN]);
        assert_eq!(store.lookup(2, 1).unwrap().relative_gain, &[1.0; NN]);
    }

    #[test]
    fn test_lenient_conforms_spatial_mismatch() {
        let store = CalibrationStore::from_tensors(
            CalibrationTensor::new((0..(N_GAINS * 3) as i16).collect(), [N_GAINS, 1, 1, 3])
                .unwrap(),
            None,
            None,
            None,
            ROWS,
            COLS,
            Strictness::Lenient,
        )
        .unwrap();
        // Row 0 keeps the first two columns; row 1 did not exist
        assert_eq!(store.lookup(1, 0).unwrap().offset, &[3, 4, 0, 0]);
    }

    #[test]
    fn test_lenient_keeps_transposed_rows_flat() {
        // Same pixel count, (row, col) extents swapped
        let offset: Vec<i16> = (0..(N_GAINS * 8) as i16).collect();
        let store = CalibrationStore::from_tensors(
            CalibrationTensor::new(offset, [N_GAINS, 1, 4, 2]).unwrap(),
            Some(CalibrationTensor::filled(100, [N_GAINS, 1, 4, 2])),
            None,
            None,
            2,
            4,
            Strictness::Lenient,
        )
        .unwrap();
        assert_eq!(store.lookup(0, 0).unwrap().offset, &[0, 1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(store.lookup(1, 0).unwrap().offset, &[8, 9, 10, 11, 12, 13, 14, 15]);
        assert_eq!(store.lookup(2, 0).unwrap().threshold, &[100; 8]);
    }

    #[test]
    fn test_buffer_length_mismatch_is_an_error() {
        let store = make_store();
        let mut analog = vec![0.0; NN + 1];
        let mut digital = vec![0; NN + 1];
        let mut mask = vec![MASK_GOOD; NN + 1];
        let result = apply_calibration(&store, 0, &mut analog, &mut digital, &mut mask, false);
        assert!(matches!(
            result,
            Err(CalibrationError::PixelCountMismatch(5, 4))
        ));
        let mut short_mask = vec![MASK_GOOD; NN - 1];
        let result = apply_calibration(
            &store,
            0,
            &mut analog[..NN],
            &mut digital[..NN],
            &mut short_mask,
            true,
        );
        assert!(matches!(
            result,
            Err(CalibrationError::PixelCountMismatch(3, 4))
        ));
    }

    #[test]
    fn test_load_from_hdf5() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dark_AGIPD00.h5");
        let shape = [N_GAINS, 2, ROWS, COLS];
        {
            let file = File::create(&path).unwrap();
            let offset = ndarray::Array4::<i16>::from_elem(shape, 7);
            let threshold = ndarray::Array4::<u16>::from_elem(shape, 100);
            let badpixel = ndarray::Array4::<u8>::zeros(shape);
            file.new_dataset_builder()
                .with_data(&offset)
                .create(CALIB_OFFSET_NAME)
                .unwrap();
            file.new_dataset_builder()
                .with_data(&threshold)
                .create(CALIB_THRESHOLD_NAME)
                .unwrap();
            file.new_dataset_builder()
                .with_data(&badpixel)
                .create(CALIB_BADPIXEL_NAME)
                .unwrap();
        }
        let store = CalibrationStore::load(&path, ROWS, COLS, Strictness::Lenient).unwrap();
        assert_eq!(store.n_cells(), 2);
        assert_eq!(store.source(), Some(path.as_path()));
        let rows = store.lookup(1, 1).unwrap();
        assert_eq!(rows.offset, &[7; NN]);
        assert_eq!(rows.threshold, &[100; NN]);
        assert_eq!(rows.relative_gain, &[1.0; NN]);

        let strict = CalibrationStore::load(&path, ROWS, COLS, Strictness::Strict);
        assert!(matches!(strict, Err(CalibrationError::MissingTensor(_))));
    }

    #[test]
    fn test_load_missing_file() {
        let result =
            CalibrationStore::load(Path::new("/no/such/dark.h5"), ROWS, COLS, Strictness::Lenient);
        assert!(matches!(result, Err(CalibrationError::BadFilePath(_))));
    }
}
