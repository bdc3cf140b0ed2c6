use std::ops::Range;

use super::constants::{MASK_BAD, STATUS_BLANK};

/// One assembled detector image: every module's tile laid out panel by panel.
///
/// Panel `m` occupies the contiguous range `m * rows * cols..(m + 1) * rows * cols` of each
/// flat buffer.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompositeFrame {
    n_modules: usize,
    rows: usize,
    cols: usize,
    image: Vec<f32>,
    gain: Vec<u16>,
    mask: Vec<u16>,
    module_cell_ids: Vec<u16>,
    module_status: Vec<u16>,
    contributed: Vec<bool>,
    pub train_id: u64,
    pub pulse_id: u64,
    pub cell_id: u16,
}

impl CompositeFrame {
    /// A frame with every panel blank
    pub fn new(n_modules: usize, rows: usize, cols: usize) -> Self {
        let n = n_modules * rows * cols;
        Self {
            n_modules,
            rows,
            cols,
            image: vec![0.0; n],
            gain: vec![0; n],
            mask: vec![MASK_BAD; n],
            module_cell_ids: vec![0; n_modules],
            module_status: vec![STATUS_BLANK; n_modules],
            contributed: vec![false; n_modules],
            train_id: 0,
            pulse_id: 0,
            cell_id: 0,
        }
    }

    pub fn n_modules(&self) -> usize {
        self.n_modules
    }

    /// (rows, cols) of one panel
    pub fn panel_shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn panel_len(&self) -> usize {
        self.rows * self.cols
    }

    fn panel_range(&self, module: usize) -> Range<usize> {
        let len = self.panel_len();
        module * len..(module + 1) * len
    }

    pub fn image(&self) -> &[f32] {
        &self.image
    }

    pub fn gain(&self) -> &[u16] {
        &self.gain
    }

    pub fn mask(&self) -> &[u16] {
        &self.mask
    }

    pub fn image_panel(&self, module: usize) -> &[f32] {
        &self.image[self.panel_range(module)]
    }

    pub fn gain_panel(&self, module: usize) -> &[u16] {
        &self.gain[self.panel_range(module)]
    }

    pub fn mask_panel(&self, module: usize) -> &[u16] {
        &self.mask[self.panel_range(module)]
    }

    pub fn module_cell_id(&self, module: usize) -> u16 {
        self.module_cell_ids[module]
    }

    pub fn module_status(&self, module: usize) -> u16 {
        self.module_status[module]
    }

    pub fn contributed(&self, module: usize) -> bool {
        self.contributed[module]
    }

    pub fn n_contributing(&self) -> usize {
        self.contributed.iter().filter(|c| **c).count()
    }

    /// Mark a module absent: zero image and gain, all-bad mask, blank status
    pub fn blank_panel(&mut self, module: usize) {
        let range = self.panel_range(module);
        self.image[range.clone()].fill(0.0);
        self.gain[range.clone()].fill(0);
        self.mask[range].fill(MASK_BAD);
        self.module_cell_ids[module] = 0;
        self.module_status[module] = STATUS_BLANK;
        self.contributed[module] = false;
    }

    /// Copy a corrected tile into a module's panel.
    ///
    /// A nonzero status marks the whole panel bad while keeping its data.
    pub fn fill_panel(
        &mut self,
        module: usize,
        image: &[f32],
        gain: &[u16],
        mask: &[u16],
        cell_id: u16,
        status: u16,
    ) {
        let range = self.panel_range(module);
        self.image[range.clone()].copy_from_slice(image);
        self.gain[range.clone()].copy_from_slice(gain);
        if status != 0 {
            self.mask[range].fill(MASK_BAD);
        } else {
            self.mask[range].copy_from_slice(mask);
        }
        self.module_cell_ids[module] = cell_id;
        self.module_status[module] = status;
        self.contributed[module] = true;
    }
}
