use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;

use super::assembler::CompositeAssembler;
use super::error::SummaryError;

/// What one module contributed to a file-set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleSummary {
    pub module: usize,
    pub file_name: String,
    pub file_size: String,
    pub n_frames: usize,
    pub included: bool,
    pub calibration: Option<String>,
    pub frames_contributed: u64,
}

/// YAML sidecar describing how one input file was assembled
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub input_file: String,
    pub run_number: Option<i32>,
    pub scheme: String,
    pub reference_module: usize,
    pub train_range: (u64, u64),
    pub pulse_range: (u64, u64),
    pub cell_range: Option<(u16, u16)>,
    pub frames_yielded: u64,
    pub modules: Vec<ModuleSummary>,
}

impl RunSummary {
    /// Collect the summary of an assembler. Must be called before the assembler is closed.
    pub fn from_assembler(input_file: &Path, assembler: &CompositeAssembler) -> Self {
        let contributions = assembler.module_contributions();
        let modules = assembler
            .streams()
            .iter()
            .enumerate()
            .map(|(module, stream)| ModuleSummary {
                module,
                file_name: stream.path().to_string_lossy().to_string(),
                file_size: human_bytes::human_bytes(stream.size_bytes() as f64),
                n_frames: stream.n_frames(),
                included: assembler.is_consistent(module),
                calibration: stream
                    .calibration()
                    .and_then(|c| c.source())
                    .map(|p| p.to_string_lossy().to_string()),
                frames_contributed: contributions.get(module).copied().unwrap_or(0),
            })
            .collect();

        Self {
            input_file: input_file.to_string_lossy().to_string(),
            run_number: assembler.run_number(),
            scheme: assembler.scheme().name.to_string(),
            reference_module: assembler.reference_module(),
            train_range: assembler.index().train_range(),
            pulse_range: assembler.index().pulse_range(),
            cell_range: assembler.cell_range(),
            frames_yielded: assembler.frames_yielded(),
            modules,
        }
    }

    pub fn write(&self, path: &Path) -> Result<(), SummaryError> {
        let mut file = std::fs::File::create(path)?;
        file.write_all(serde_yaml::to_string(self)?.as_bytes())?;
        spdlog::info!("Wrote run summary to {}", path.display());
        Ok(())
    }
}
