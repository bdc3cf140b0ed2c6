use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;

use super::assembler::{AssemblerState, CompositeAssembler};
use super::composite::CompositeFrame;
use super::config::{guess_run_number, Config};
use super::error::{ConfigError, ProcessorError, SinkError};
use super::summary::RunSummary;
use super::worker_status::{WorkerPhase, WorkerStatus};

/// Receives the frames a worker assembles.
///
/// The frame is borrowed from the assembler; implementations that keep it must copy it.
pub trait FrameSink {
    fn accept(&mut self, frame: &CompositeFrame) -> Result<(), SinkError>;
}

/// Hand owned copies to another thread
impl FrameSink for Sender<CompositeFrame> {
    fn accept(&mut self, frame: &CompositeFrame) -> Result<(), SinkError> {
        self.send(frame.clone()).map_err(|_| SinkError::Disconnected)
    }
}

/// Counts frames without keeping them
#[derive(Debug, Clone, Default)]
pub struct CountingSink {
    pub n_frames: u64,
    pub n_panels: u64,
}

impl FrameSink for CountingSink {
    fn accept(&mut self, frame: &CompositeFrame) -> Result<(), SinkError> {
        self.n_frames += 1;
        self.n_panels += frame.n_contributing() as u64;
        Ok(())
    }
}

/// Fraction of the (train, pulse) grid the assembler has walked
fn cursor_progress(assembler: &CompositeAssembler) -> f32 {
    let (min_train, max_train) = assembler.index().train_range();
    let (min_pulse, max_pulse) = assembler.index().pulse_range();
    let n_pulses = (max_pulse - min_pulse) as f64 + 1.0;
    let total = ((max_train - min_train) as f64 + 1.0) * n_pulses;
    match assembler.state() {
        AssemblerState::Positioned { train, pulse } => {
            let done = (train.saturating_sub(min_train)) as f64 * n_pulses
                + pulse.saturating_sub(min_pulse) as f64;
            (done / total).min(1.0) as f32
        }
        AssemblerState::Unstarted => 0.0,
        AssemblerState::Exhausted | AssemblerState::Closed => 1.0,
    }
}

/// Assemble every good frame of one input file and hand it to the sink.
///
/// Returns the number of frames handed off.
pub fn process_file(
    config: &Config,
    input_file: &Path,
    sink: &mut dyn FrameSink,
    tx: &Sender<WorkerStatus>,
    worker_id: usize,
) -> Result<u64, ProcessorError> {
    let file_name = input_file
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let run_number = guess_run_number(input_file).unwrap_or(-1);
    let status = |progress: f32, phase: WorkerPhase| {
        WorkerStatus::new(progress, file_name.clone(), run_number, worker_id, phase)
    };

    tx.send(status(0.0, WorkerPhase::Indexing))?;
    let mut assembler = CompositeAssembler::open(config, input_file)?;
    let total_size: u64 = assembler.streams().iter().map(|s| s.size_bytes()).sum();
    spdlog::info!(
        "Total file-set size: {}",
        human_bytes::human_bytes(total_size as f64)
    );

    spdlog::info!("Assembling frames...");
    let flush_frac: f32 = 0.01;
    let mut progress: f32 = 0.0;
    let mut n_frames: u64 = 0;
    tx.send(status(0.0, WorkerPhase::Assembling))?;
    while let Some(frame) = assembler.advance()? {
        sink.accept(frame)?;
        n_frames += 1;
        let now = cursor_progress(&assembler);
        if now - progress > flush_frac {
            progress = now;
            tx.send(status(progress, WorkerPhase::Assembling))?;
        }
    }
    spdlog::info!("Assembled {n_frames} frames from {file_name}");

    if let Some(summary_path) = config.get_summary_file_name(input_file)? {
        RunSummary::from_assembler(input_file, &assembler).write(&summary_path)?;
    }
    assembler.close();
    tx.send(status(1.0, WorkerPhase::Done))?;
    Ok(n_frames)
}

/// Process a subset of input files.
///
/// A file-set that cannot be opened is logged and skipped; any other error ends the worker.
pub fn process_subset<S: FrameSink>(
    config: Config,
    tx: Sender<WorkerStatus>,
    worker_id: usize,
    subset: Vec<PathBuf>,
    mut sink: S,
) -> Result<S, ProcessorError> {
    for input_file in subset {
        spdlog::info!("Processing {}...", input_file.display());
        match process_file(&config, &input_file, &mut sink, &tx, worker_id) {
            Ok(_) => spdlog::info!("Finished processing {}.", input_file.display()),
            Err(ProcessorError::AssemblerError(e)) => {
                spdlog::error!("Could not assemble {}: {e}", input_file.display())
            }
            Err(e) => return Err(e),
        }
    }
    Ok(sink)
}

/// Divide the input files into a set of subsets (per thread/worker)
pub fn create_subsets(config: &Config) -> Result<Vec<Vec<PathBuf>>, ConfigError> {
    if config.input_files.is_empty() {
        return Err(ConfigError::NoInputFiles);
    }
    let mut subsets: Vec<Vec<PathBuf>> = vec![Vec::new(); config.n_threads.max(1) as usize];
    let n_subsets = subsets.len();

    for (idx, file) in config.input_files.iter().enumerate() {
        subsets[idx % n_subsets].push(file.clone())
    }

    Ok(subsets)
}
