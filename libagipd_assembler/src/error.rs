use std::path::PathBuf;
use thiserror::Error;

use super::constants::N_GAINS;
use super::worker_status::WorkerStatus;

#[derive(Debug, Error)]
pub enum ModuleFileError {
    #[error("ModuleFile failed due to HDF5 error: {0}")]
    HDF5Error(#[from] hdf5::Error),
    #[error("Could not open ModuleFile because file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("ModuleFile failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("ModuleFile image data has unexpected shape {0:?} for {1} layout")]
    BadLayout(Vec<usize>, String),
    #[error("ModuleFile was asked for frame {0} but only has {1} frames")]
    FrameOutOfRange(i64, usize),
    #[error("ModuleFile was asked for stack slot {0} but only has {1} slots")]
    SlotOutOfRange(i64, usize),
    #[error("ModuleFile read {0} values where {1} were expected")]
    ShortRead(usize, usize),
    #[error("ModuleFile operation {0} is not supported by the {1} layout")]
    WrongLayout(&'static str, String),
}

#[derive(Debug, Error)]
pub enum CalibrationError {
    #[error("Calibration failed due to HDF5 error: {0}")]
    HDF5Error(#[from] hdf5::Error),
    #[error("Could not load calibration because file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Calibration file is missing the {0} tensor")]
    MissingTensor(String),
    #[error("Calibration tensor {0} has shape {1:?}; expected {2:?}")]
    ShapeMismatch(String, Vec<usize>, Vec<usize>),
    #[error("Calibration tensor {0} has {1} values but its shape {2:?} requires {3}")]
    SizeMismatch(String, usize, Vec<usize>, usize),
    #[error("Calibration has no constants for gain {0} and cell {1} (gains: {ng}, cells: {2})", ng=N_GAINS)]
    CellOutOfRange(usize, usize, usize),
    #[error("Frame buffer holds {0} pixels but the calibration rows hold {1}")]
    PixelCountMismatch(usize, usize),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration as file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Config failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Config failed to parse YAML: {0}")]
    ParsingError(#[from] serde_yaml::Error),
    #[error("Could not generate module filenames from {0:?}; no AGIPD<nn> token was found")]
    BadModuleFilename(PathBuf),
    #[error("Config does not list any input files")]
    NoInputFiles,
}

#[derive(Debug, Error)]
pub enum AssemblerError {
    #[error("Assembler failed due to configuration error: {0}")]
    ConfigError(#[from] ConfigError),
    #[error("Assembler failed because the reference module {0} ({1:?}) has no data")]
    NoReferenceData(usize, PathBuf),
    #[error("Assembler was given {0} module streams; expected at least one")]
    NoModules(usize),
    #[error("Assembler reference module {0} is out of range for {1} modules")]
    BadReferenceModule(usize, usize),
    #[error("Assembler has been closed")]
    Closed,
}

#[derive(Debug, Error)]
pub enum SummaryError {
    #[error("RunSummary failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("RunSummary failed to convert to yaml: {0}")]
    ParsingError(#[from] serde_yaml::Error),
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("FrameSink receiver has hung up")]
    Disconnected,
}

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("Processor failed due to Assembler error: {0}")]
    AssemblerError(#[from] AssemblerError),
    #[error("Processor failed due to Config error: {0}")]
    ConfigError(#[from] ConfigError),
    #[error("Processor failed due to RunSummary error: {0}")]
    SummaryError(#[from] SummaryError),
    #[error("Processor failed due to FrameSink error: {0}")]
    SinkError(#[from] SinkError),
    #[error("Processor failed due to Send error: {0}")]
    SendError(#[from] std::sync::mpsc::SendError<WorkerStatus>),
    #[error("Processor failed due to IO error: {0}")]
    IoError(#[from] std::io::Error),
}
