use std::path::{Path, PathBuf};

use super::calibration::{apply_calibration, reset_mask, CalibrationStore};
use super::config::Strictness;
use super::constants::{MASK_BAD, MASK_GOOD};
use super::module_file::ModuleFile;
use super::module_source::{ModuleHeaders, ModuleLayout, ModuleSource, StorageLayout};
use super::scheme::AcquisitionScheme;

/// One detector module: its file, its per-frame metadata and its calibration.
///
/// A stream that could not be opened is kept in a `no_data` state. Reads on such a stream
/// do nothing and report failure, so the module is blanked in every composite frame.
pub struct ModuleStream {
    module_index: usize,
    path: PathBuf,
    source: Option<Box<dyn ModuleSource>>,
    calibration: Option<CalibrationStore>,
    bypass_gain_switch: bool,
    strictness: Strictness,
    headers: ModuleHeaders,
    headers_loaded: bool,
    // Output tile, reused for every frame
    analog: Vec<f32>,
    gain: Vec<u16>,
    mask: Vec<u16>,
    // Scratch space so that a failed read never touches the output tile
    raw_analog: Vec<u16>,
    raw_digital: Vec<u16>,
    corr_analog: Vec<f32>,
    corr_gain: Vec<u8>,
    corr_mask: Vec<u8>,
    train_id: u64,
    pulse_id: u64,
    cell_id: u16,
    status_id: u16,
    last_read_ok: bool,
}

impl std::fmt::Debug for ModuleStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleStream")
            .field("module_index", &self.module_index)
            .field("path", &self.path)
            .field("layout", &self.layout())
            .field("calibrated", &self.calibration.is_some())
            .field("n_frames", &self.headers.len())
            .finish()
    }
}

impl ModuleStream {
    /// Open the stream for one module file.
    ///
    /// Never fails: a missing or malformed file yields a `no_data` stream. A missing or
    /// malformed calibration file leaves the module uncalibrated under `Lenient`, and
    /// excludes it under `Strict`.
    pub fn open(
        path: &Path,
        module_index: usize,
        darkcal: Option<&Path>,
        strictness: Strictness,
        bypass_gain_switch: bool,
    ) -> Self {
        let file = match ModuleFile::open(path, module_index) {
            Ok(f) => f,
            Err(e) => {
                spdlog::warn!("Module {module_index}: no data from {}: {e}", path.display());
                return Self::no_data(path, module_index);
            }
        };
        let layout = file.layout();
        spdlog::info!(
            "Module {module_index}: opened {} ({} layout, {} frames, {}x{} pixels, {})",
            path.display(),
            layout.storage,
            layout.n_frames,
            layout.rows,
            layout.cols,
            human_bytes::human_bytes(file.size_bytes() as f64)
        );

        let calibration = match (layout.storage, darkcal) {
            (StorageLayout::Raw, Some(cal_path)) => {
                match CalibrationStore::load(cal_path, layout.rows, layout.cols, strictness) {
                    Ok(store) => {
                        spdlog::info!(
                            "Module {module_index}: loaded calibration {} ({} cells, {})",
                            cal_path.display(),
                            store.n_cells(),
                            human_bytes::human_bytes(store.size_bytes() as f64)
                        );
                        Some(store)
                    }
                    Err(e) if strictness == Strictness::Strict => {
                        spdlog::error!("Module {module_index}: calibration failed: {e}");
                        return Self::no_data(path, module_index);
                    }
                    Err(e) => {
                        spdlog::warn!(
                            "Module {module_index}: calibration failed, data will be uncalibrated: {e}"
                        );
                        None
                    }
                }
            }
            (StorageLayout::Raw, None) => {
                spdlog::warn!("Module {module_index}: no calibration configured for raw data");
                None
            }
            (StorageLayout::Calibrated, _) => None,
        };

        Self::from_source(
            Box::new(file),
            path,
            module_index,
            calibration,
            strictness,
            bypass_gain_switch,
        )
    }

    /// Build a stream over any module source
    pub fn from_source(
        source: Box<dyn ModuleSource>,
        path: &Path,
        module_index: usize,
        calibration: Option<CalibrationStore>,
        strictness: Strictness,
        bypass_gain_switch: bool,
    ) -> Self {
        let n_pixels = source.layout().n_pixels();
        let mut stream = Self::no_data(path, module_index);
        stream.source = Some(source);
        stream.calibration = calibration;
        stream.strictness = strictness;
        stream.bypass_gain_switch = bypass_gain_switch;
        stream.analog = vec![0.0; n_pixels];
        stream.gain = vec![0; n_pixels];
        stream.mask = vec![MASK_GOOD; n_pixels];
        stream
    }

    /// A stream with nothing behind it
    pub fn no_data(path: &Path, module_index: usize) -> Self {
        Self {
            module_index,
            path: path.to_path_buf(),
            source: None,
            calibration: None,
            bypass_gain_switch: false,
            strictness: Strictness::default(),
            headers: ModuleHeaders::default(),
            headers_loaded: false,
            analog: Vec::new(),
            gain: Vec::new(),
            mask: Vec::new(),
            raw_analog: Vec::new(),
            raw_digital: Vec::new(),
            corr_analog: Vec::new(),
            corr_gain: Vec::new(),
            corr_mask: Vec::new(),
            train_id: 0,
            pulse_id: 0,
            cell_id: 0,
            status_id: 0,
            last_read_ok: false,
        }
    }

    pub fn is_no_data(&self) -> bool {
        self.source.is_none()
    }

    pub fn module_index(&self) -> usize {
        self.module_index
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn layout(&self) -> Option<ModuleLayout> {
        self.source.as_ref().map(|s| s.layout())
    }

    pub fn calibration(&self) -> Option<&CalibrationStore> {
        self.calibration.as_ref()
    }

    pub fn size_bytes(&self) -> u64 {
        self.source.as_ref().map(|s| s.size_bytes()).unwrap_or(0)
    }

    /// Load the per-frame metadata lists. Only the first call reads from the source.
    ///
    /// Lists of unequal length are cut to the shortest; lists longer than the image data
    /// are cut to the frame count. A source whose metadata cannot be read becomes `no_data`.
    pub fn read_headers(&mut self) {
        if self.headers_loaded {
            return;
        }
        self.headers_loaded = true;
        let source = match &self.source {
            Some(s) => s,
            None => return,
        };
        let layout = source.layout();
        let mut headers = match source.read_headers() {
            Ok(h) => h,
            Err(e) => {
                spdlog::warn!("Module {}: could not read metadata: {e}", self.module_index);
                self.source = None;
                return;
            }
        };

        let n_listed = headers.len();
        if n_listed != headers.train_ids.len()
            || n_listed != headers.pulse_ids.len()
            || n_listed != headers.cell_ids.len()
            || n_listed != headers.status_ids.len()
        {
            spdlog::warn!(
                "Module {}: metadata lists have unequal lengths; using the first {n_listed} frames",
                self.module_index
            );
        }
        let n_frames = n_listed.min(layout.n_frames);
        if n_frames < n_listed {
            spdlog::warn!(
                "Module {}: metadata lists {n_listed} frames but the image data holds {}",
                self.module_index,
                layout.n_frames
            );
        } else if n_frames < layout.n_frames {
            spdlog::warn!(
                "Module {}: image data holds {} frames but metadata lists only {n_listed}; the rest are unreachable",
                self.module_index,
                layout.n_frames
            );
        }
        headers.truncate(n_frames);

        match source.read_train_index() {
            Ok(Some(index)) => {
                let bad = index.mismatched_trains(&headers);
                if !bad.is_empty() {
                    spdlog::warn!(
                        "Module {}: train index disagrees with metadata for {} trains (first: {})",
                        self.module_index,
                        bad.len(),
                        bad[0]
                    );
                }
            }
            Ok(None) => (),
            Err(e) => spdlog::warn!("Module {}: could not read train index: {e}", self.module_index),
        }

        spdlog::info!(
            "Module {}: read metadata for {n_frames} frames ({})",
            self.module_index,
            human_bytes::human_bytes(headers.size_bytes() as f64)
        );
        self.headers = headers;
    }

    pub fn headers(&self) -> &ModuleHeaders {
        &self.headers
    }

    pub fn n_frames(&self) -> usize {
        self.headers.len()
    }

    /// Read and correct one frame into the stream's tile.
    ///
    /// Returns whether the tile can be trusted. On failure the tile keeps its previous
    /// contents.
    pub fn read_frame(&mut self, frame: usize, scheme: &AcquisitionScheme) -> bool {
        self.last_read_ok = false;
        let source = match &self.source {
            Some(s) => s,
            None => return false,
        };
        if frame >= self.headers.len() {
            spdlog::debug!("Module {}: frame {frame} is past the metadata", self.module_index);
            return false;
        }
        self.train_id = self.headers.train_ids[frame];
        self.pulse_id = self.headers.pulse_ids[frame];
        self.cell_id = self.headers.cell_ids[frame];
        self.status_id = self.headers.status_ids[frame];

        let layout = source.layout();
        let n_pixels = layout.n_pixels();
        let result = match layout.storage {
            StorageLayout::Raw => {
                self.raw_analog.resize(n_pixels, 0);
                self.raw_digital.resize(n_pixels, 0);
                source
                    .read_raw_slab(frame as i64, 0, &mut self.raw_analog)
                    .and_then(|_| {
                        source.read_raw_slab(
                            frame as i64 + scheme.gain_data_offset.0,
                            scheme.gain_data_offset.1,
                            &mut self.raw_digital,
                        )
                    })
            }
            StorageLayout::Calibrated => {
                self.corr_analog.resize(n_pixels, 0.0);
                self.corr_gain.resize(n_pixels, 0);
                self.corr_mask.resize(n_pixels, 0);
                source.read_calibrated_frame(
                    frame,
                    &mut self.corr_analog,
                    &mut self.corr_gain,
                    &mut self.corr_mask,
                )
            }
        };
        if let Err(e) = result {
            spdlog::debug!("Module {}: read of frame {frame} failed: {e}", self.module_index);
            return false;
        }

        match layout.storage {
            StorageLayout::Raw => self.correct_raw(scheme),
            StorageLayout::Calibrated => {
                self.copy_calibrated();
                true
            }
        }
    }

    fn correct_raw(&mut self, scheme: &AcquisitionScheme) -> bool {
        let cell = scheme.cell_index(self.cell_id);
        if let Some(store) = &self.calibration {
            if cell >= store.n_cells() {
                spdlog::debug!(
                    "Module {}: cell {cell} has no calibration ({} cells)",
                    self.module_index,
                    store.n_cells()
                );
                return false;
            }
        }

        for (a, r) in self.analog.iter_mut().zip(&self.raw_analog) {
            *a = *r as f32;
        }
        self.gain.copy_from_slice(&self.raw_digital);
        reset_mask(&mut self.mask);

        match &self.calibration {
            Some(store) => match apply_calibration(
                store,
                cell,
                &mut self.analog,
                &mut self.gain,
                &mut self.mask,
                self.bypass_gain_switch,
            ) {
                Ok(()) => {
                    self.last_read_ok = true;
                    true
                }
                Err(e) => {
                    spdlog::debug!("Module {}: {e}", self.module_index);
                    false
                }
            },
            None => {
                self.gain.fill(0);
                self.last_read_ok = true;
                true
            }
        }
    }

    fn copy_calibrated(&mut self) {
        for p in 0..self.analog.len() {
            self.gain[p] = self.corr_gain[p] as u16;
            if self.corr_mask[p] != 0 {
                self.analog[p] = 0.0;
                self.mask[p] = MASK_BAD;
            } else {
                self.analog[p] = self.corr_analog[p];
                self.mask[p] = MASK_GOOD;
            }
        }
        self.last_read_ok = true;
    }

    pub fn last_read_ok(&self) -> bool {
        self.last_read_ok
    }

    pub fn analog(&self) -> &[f32] {
        &self.analog
    }

    pub fn gain(&self) -> &[u16] {
        &self.gain
    }

    pub fn mask(&self) -> &[u16] {
        &self.mask
    }

    pub fn train_id(&self) -> u64 {
        self.train_id
    }

    pub fn pulse_id(&self) -> u64 {
        self.pulse_id
    }

    pub fn cell_id(&self) -> u16 {
        self.cell_id
    }

    pub fn status_id(&self) -> u16 {
        self.status_id
    }

    pub fn strictness(&self) -> Strictness {
        self.strictness
    }
}
