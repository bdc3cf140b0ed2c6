use std::path::Path;

use super::composite::CompositeFrame;
use super::config::{
    generate_module_filenames, guess_run_number, is_first_sequence, module_number, Config,
};
use super::error::{AssemblerError, ConfigError};
use super::frame_index::FrameIndex;
use super::module_source::ModuleHeaders;
use super::module_stream::ModuleStream;
use super::scheme::AcquisitionScheme;

/// Where the assembler's cursor is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblerState {
    Unstarted,
    Positioned { train: u64, pulse: u64 },
    Exhausted,
    Closed,
}

/// Walks the (train, pulse) grid of a file-set and assembles one composite image per
/// good frame.
///
/// The composite buffer is reused: the frame returned by `advance` is borrowed from the
/// assembler and is overwritten by the next call. Clone it to keep it.
#[derive(Debug)]
pub struct CompositeAssembler {
    streams: Vec<ModuleStream>,
    consistent: Vec<bool>,
    reference_module: usize,
    index: FrameIndex,
    scheme: AcquisitionScheme,
    stride: u32,
    frame: CompositeFrame,
    state: AssemblerState,
    good_in_train: u32,
    n_contributing: usize,
    frames_yielded: u64,
    module_contributions: Vec<u64>,
    cell_range: Option<(u16, u16)>,
    run_number: Option<i32>,
}

impl CompositeAssembler {
    /// Open the file-set that `input_file` belongs to.
    ///
    /// The sibling files of all modules are derived from the `AGIPD<nn>` token of the name;
    /// the module named by `input_file` is the reference module.
    pub fn open(config: &Config, input_file: &Path) -> Result<Self, AssemblerError> {
        let module_files = generate_module_filenames(input_file)?;
        let reference = module_number(input_file)
            .ok_or_else(|| ConfigError::BadModuleFilename(input_file.to_path_buf()))?;
        let darkcal_files = config.get_darkcal_files()?;
        let skip = if is_first_sequence(input_file) {
            config.new_file_skip
        } else {
            0
        };
        if skip > 0 {
            spdlog::info!("First file of the run: skipping the first {skip} frames of each module");
        }

        let streams = module_files
            .iter()
            .zip(darkcal_files.iter())
            .enumerate()
            .map(|(module, (path, darkcal))| {
                ModuleStream::open(
                    path,
                    module,
                    darkcal.as_deref(),
                    config.strictness,
                    config.ignore_gain_switch,
                )
            })
            .collect();

        let mut assembler = Self::from_streams(
            streams,
            reference,
            config.acquisition_scheme(),
            config.stride(),
            skip,
        )?;
        assembler.run_number = guess_run_number(input_file);
        Ok(assembler)
    }

    /// Build an assembler over already opened streams, one per module
    pub fn from_streams(
        mut streams: Vec<ModuleStream>,
        reference_module: usize,
        scheme: AcquisitionScheme,
        stride: u32,
        skip: usize,
    ) -> Result<Self, AssemblerError> {
        if streams.is_empty() {
            return Err(AssemblerError::NoModules(0));
        }
        if reference_module >= streams.len() {
            return Err(AssemblerError::BadReferenceModule(
                reference_module,
                streams.len(),
            ));
        }
        for stream in streams.iter_mut() {
            stream.read_headers();
        }

        let reference = &streams[reference_module];
        let ref_layout = match reference.layout() {
            Some(layout) if reference.n_frames() > 0 => layout,
            _ => {
                return Err(AssemblerError::NoReferenceData(
                    reference_module,
                    reference.path().to_path_buf(),
                ))
            }
        };
        let ref_frames = reference.n_frames();
        spdlog::info!(
            "Reference module {reference_module}: {ref_frames} frames of {}x{} pixels ({} layout)",
            ref_layout.rows,
            ref_layout.cols,
            ref_layout.storage
        );

        let consistent: Vec<bool> = streams
            .iter()
            .map(|stream| match stream.layout() {
                None => false,
                Some(layout) if !layout.is_compatible(&ref_layout) => {
                    spdlog::warn!(
                        "Module {}: {}x{} {} layout does not match the reference; excluding it",
                        stream.module_index(),
                        layout.rows,
                        layout.cols,
                        layout.storage
                    );
                    false
                }
                Some(_) => {
                    if stream.n_frames() != ref_frames {
                        spdlog::warn!(
                            "Module {}: {} frames, reference module has {ref_frames}",
                            stream.module_index(),
                            stream.n_frames()
                        );
                    }
                    true
                }
            })
            .collect();

        let included: Vec<Option<&ModuleHeaders>> = streams
            .iter()
            .zip(&consistent)
            .map(|(stream, ok)| if *ok { Some(stream.headers()) } else { None })
            .collect();
        let cell_range = included
            .iter()
            .flatten()
            .flat_map(|headers| headers.cell_ids.iter().copied())
            .fold(None, |range: Option<(u16, u16)>, cell| match range {
                None => Some((cell, cell)),
                Some((lo, hi)) => Some((lo.min(cell), hi.max(cell))),
            });
        if let Some((lo, hi)) = cell_range {
            spdlog::info!("Cell IDs range over {lo}..={hi}");
        }
        let index = FrameIndex::build(&included, skip);

        let n_modules = streams.len();
        spdlog::info!(
            "{} of {n_modules} modules included; acquisition scheme {scheme}",
            consistent.iter().filter(|c| **c).count()
        );

        Ok(Self {
            frame: CompositeFrame::new(n_modules, ref_layout.rows, ref_layout.cols),
            streams,
            consistent,
            reference_module,
            index,
            scheme,
            stride: stride.max(1),
            state: AssemblerState::Unstarted,
            good_in_train: 0,
            n_contributing: 0,
            frames_yielded: 0,
            module_contributions: vec![0; n_modules],
            cell_range,
            run_number: None,
        })
    }

    /// Step to the next good frame and assemble it.
    ///
    /// Returns `None` once every (train, pulse) has been visited.
    pub fn advance(&mut self) -> Result<Option<&CompositeFrame>, AssemblerError> {
        let (min_train, max_train) = self.index.train_range();
        let (min_pulse, max_pulse) = self.index.pulse_range();
        loop {
            let (train, pulse) = match self.state {
                AssemblerState::Closed => return Err(AssemblerError::Closed),
                AssemblerState::Exhausted => return Ok(None),
                AssemblerState::Unstarted => (min_train, min_pulse),
                AssemblerState::Positioned { train, pulse } if pulse < max_pulse => {
                    (train, pulse + 1)
                }
                AssemblerState::Positioned { train, .. } => {
                    if self.good_in_train > 0 {
                        spdlog::info!("Train {train}: {} good frames", self.good_in_train);
                    }
                    self.good_in_train = 0;
                    (train.saturating_add(1), min_pulse)
                }
            };
            if train > max_train || train == u64::MAX {
                spdlog::debug!("Reached the end of the frame index");
                self.state = AssemblerState::Exhausted;
                return Ok(None);
            }
            self.state = AssemblerState::Positioned { train, pulse };

            if !self.scheme.accepts_pulse(pulse) {
                continue;
            }
            if self.fill_frame(train, pulse) == 0 {
                continue;
            }
            self.good_in_train += 1;
            if (self.good_in_train - 1) % self.stride != 0 {
                continue;
            }

            self.frames_yielded += 1;
            for (module, count) in self.module_contributions.iter_mut().enumerate() {
                if self.frame.contributed(module) {
                    *count += 1;
                }
            }
            return Ok(Some(&self.frame));
        }
    }

    /// Assemble the frame at (train, pulse) and move the cursor there
    pub fn read_frame(&mut self, train: u64, pulse: u64) -> Result<&CompositeFrame, AssemblerError> {
        if self.state == AssemblerState::Closed {
            return Err(AssemblerError::Closed);
        }
        self.state = AssemblerState::Positioned { train, pulse };
        self.fill_frame(train, pulse);
        Ok(&self.frame)
    }

    /// Read every module's tile for (train, pulse), blanking the ones that cannot deliver.
    /// Returns the number of contributing modules.
    fn fill_frame(&mut self, train: u64, pulse: u64) -> usize {
        let mut first_cell = None;
        for (module, stream) in self.streams.iter_mut().enumerate() {
            let offset = if self.consistent[module] {
                self.index.resolve(train, pulse, module)
            } else {
                None
            };
            let ok = match offset {
                Some(frame) => stream.read_frame(frame, &self.scheme),
                None => false,
            };
            if ok {
                self.frame.fill_panel(
                    module,
                    stream.analog(),
                    stream.gain(),
                    stream.mask(),
                    stream.cell_id(),
                    stream.status_id(),
                );
                first_cell.get_or_insert(stream.cell_id());
            } else {
                self.frame.blank_panel(module);
            }
        }
        self.frame.train_id = train;
        self.frame.pulse_id = pulse;
        self.frame.cell_id = first_cell.unwrap_or(0);
        self.n_contributing = self.frame.n_contributing();
        spdlog::debug!(
            "Train {train} pulse {pulse}: {} modules contributed",
            self.n_contributing
        );
        self.n_contributing
    }

    /// Did at least one module contribute to the most recent frame?
    pub fn good_frame(&self) -> bool {
        self.n_contributing > 0
    }

    /// The most recently assembled frame
    pub fn frame(&self) -> Result<&CompositeFrame, AssemblerError> {
        match self.state {
            AssemblerState::Closed => Err(AssemblerError::Closed),
            _ => Ok(&self.frame),
        }
    }

    /// Rewind to the start of the file-set
    pub fn reset(&mut self) -> Result<(), AssemblerError> {
        if self.state == AssemblerState::Closed {
            return Err(AssemblerError::Closed);
        }
        self.state = AssemblerState::Unstarted;
        self.good_in_train = 0;
        self.n_contributing = 0;
        Ok(())
    }

    /// Release every module stream and the composite buffer
    pub fn close(&mut self) {
        self.streams.clear();
        self.frame = CompositeFrame::default();
        self.n_contributing = 0;
        self.state = AssemblerState::Closed;
    }

    pub fn state(&self) -> AssemblerState {
        self.state
    }

    pub fn streams(&self) -> &[ModuleStream] {
        &self.streams
    }

    pub fn is_consistent(&self, module: usize) -> bool {
        self.consistent.get(module).copied().unwrap_or(false)
    }

    pub fn reference_module(&self) -> usize {
        self.reference_module
    }

    pub fn index(&self) -> &FrameIndex {
        &self.index
    }

    pub fn scheme(&self) -> &AcquisitionScheme {
        &self.scheme
    }

    pub fn frames_yielded(&self) -> u64 {
        self.frames_yielded
    }

    /// Number of yielded frames each module contributed to
    pub fn module_contributions(&self) -> &[u64] {
        &self.module_contributions
    }

    /// Smallest and largest cell ID over the included modules
    pub fn cell_range(&self) -> Option<(u16, u16)> {
        self.cell_range
    }

    pub fn run_number(&self) -> Option<i32> {
        self.run_number
    }
}
