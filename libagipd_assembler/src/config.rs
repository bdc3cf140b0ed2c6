use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::constants::{MODULE_KEYWORD, N_MODULES, RUN_KEYWORD, SEQUENCE_DIGITS};
use super::error::ConfigError;
use super::scheme::AcquisitionScheme;

/// How hard to be on metadata that disagrees with expectations.
///
/// Facility metadata is known to be noisy, so the default only warns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strictness {
    #[default]
    Lenient,
    Strict,
}

/// Structure representing the application configuration. Contains pathing and acquisition information
/// Configs are seralizable and deserializable to YAML using serde and serde_yaml
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// One file per sequence; each names the module it belongs to with an AGIPD<nn> token
    pub input_files: Vec<PathBuf>,
    /// Calibration artifact for the module named in the input files (others are derived)
    pub darkcal_path: Option<PathBuf>,
    pub scheme: String,
    pub first_valid_pulse: Option<u64>,
    pub pulse_modulo: Option<u64>,
    pub ignore_gain_switch: bool,
    pub good_frame_stride: u32,
    pub new_file_skip: usize,
    pub strictness: Strictness,
    pub summary_path: Option<PathBuf>,
    pub n_threads: i32,
}

impl Default for Config {
    /// Generate a new Config object. All paths will be empty
    fn default() -> Self {
        Self {
            input_files: Vec::new(),
            darkcal_path: None,
            scheme: String::from("default"),
            first_valid_pulse: None,
            pulse_modulo: None,
            ignore_gain_switch: false,
            good_frame_stride: 1,
            new_file_skip: 0,
            strictness: Strictness::Lenient,
            summary_path: None,
            n_threads: 1,
        }
    }
}

impl Config {
    /// Read the configuration in a YAML file
    /// Returns a Config if successful
    pub fn read_config_file(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            return Err(ConfigError::BadFilePath(config_path.to_path_buf()));
        }

        let yaml_str = std::fs::read_to_string(config_path)?;

        Ok(serde_yaml::from_str::<Self>(&yaml_str)?)
    }

    /// The acquisition scheme named by the config, with any pulse gating overrides applied
    pub fn acquisition_scheme(&self) -> AcquisitionScheme {
        AcquisitionScheme::from_name(&self.scheme)
            .with_overrides(self.first_valid_pulse, self.pulse_modulo)
    }

    /// The good-frame stride, never less than one
    pub fn stride(&self) -> u32 {
        self.good_frame_stride.max(1)
    }

    /// Calibration file for each module, or None for all of them if no darkcal is configured
    pub fn get_darkcal_files(&self) -> Result<Vec<Option<PathBuf>>, ConfigError> {
        match &self.darkcal_path {
            Some(path) => Ok(generate_module_filenames(path)?
                .into_iter()
                .map(Some)
                .collect()),
            None => Ok(vec![None; N_MODULES]),
        }
    }

    pub fn has_darkcal(&self) -> bool {
        self.darkcal_path.is_some()
    }

    pub fn is_n_threads_valid(&self) -> bool {
        self.n_threads >= 1
    }

    pub fn has_summary_path(&self) -> bool {
        self.summary_path.is_some()
    }

    /// Get the path to the summary file for an input file
    pub fn get_summary_file_name(&self, input_file: &Path) -> Result<Option<PathBuf>, ConfigError> {
        let summary_dir = match &self.summary_path {
            Some(p) => p,
            None => return Ok(None),
        };
        if !summary_dir.exists() {
            return Err(ConfigError::BadFilePath(summary_dir.clone()));
        }
        let stem = input_file
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| String::from("run"));
        Ok(Some(summary_dir.join(format!("{stem}.yml"))))
    }
}

/// Locate the two module digits following the AGIPD keyword in a file name
fn find_module_token(file_name: &str) -> Option<usize> {
    let pos = file_name.rfind(MODULE_KEYWORD)? + MODULE_KEYWORD.len();
    let digits = file_name.get(pos..pos + 2)?;
    if digits.chars().all(|c| c.is_ascii_digit()) {
        Some(pos)
    } else {
        None
    }
}

/// Create a list of filenames for all modules based on the filename of any one module.
///
/// The two digits after `AGIPD` in the file name are replaced with 00..15. The directory
/// part of the path is left alone.
pub fn generate_module_filenames(path: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| ConfigError::BadModuleFilename(path.to_path_buf()))?;
    let pos =
        find_module_token(&file_name).ok_or_else(|| ConfigError::BadModuleFilename(path.to_path_buf()))?;

    Ok((0..N_MODULES)
        .map(|module| {
            let mut name = file_name.clone();
            name.replace_range(pos..pos + 2, &format!("{module:0>2}"));
            path.with_file_name(name)
        })
        .collect())
}

/// The module number named by a file, e.g. 3 for `RAW-R0283-AGIPD03-S00000.h5`
pub fn module_number(path: &Path) -> Option<usize> {
    let file_name = path.file_name()?.to_string_lossy().to_string();
    let pos = find_module_token(&file_name)?;
    file_name.get(pos..pos + 2)?.parse().ok()
}

/// Guess the run number from the `-R<nnnn>` token of a file name
pub fn guess_run_number(path: &Path) -> Option<i32> {
    let file_name = path.file_name()?.to_string_lossy().to_string();
    let pos = file_name.find(RUN_KEYWORD)? + RUN_KEYWORD.len();
    let digits: String = file_name[pos..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

/// The sequence number from the digits just before the extension, e.g. 2 for `...-S00002.h5`
pub fn sequence_number(path: &Path) -> Option<u32> {
    let stem = path.file_stem()?.to_string_lossy().to_string();
    if stem.len() < SEQUENCE_DIGITS {
        return None;
    }
    let digits = stem.get(stem.len() - SEQUENCE_DIGITS..)?;
    if digits.chars().all(|c| c.is_ascii_digit()) {
        digits.parse().ok()
    } else {
        None
    }
}

/// Is this the first file (sequence 0) of a run?
pub fn is_first_sequence(path: &Path) -> bool {
    sequence_number(path) == Some(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_generate_module_filenames() {
        let path = PathBuf::from("/data/r0283/RAW-R0283-AGIPD05-S00002.h5");
        let names = generate_module_filenames(&path).unwrap();
        assert_eq!(names.len(), N_MODULES);
        assert_eq!(
            names[0],
            PathBuf::from("/data/r0283/RAW-R0283-AGIPD00-S00002.h5")
        );
        assert_eq!(
            names[15],
            PathBuf::from("/data/r0283/RAW-R0283-AGIPD15-S00002.h5")
        );
        assert_eq!(names[5], path);
    }

    #[test]
    fn test_bad_module_filename() {
        let path = PathBuf::from("/data/r0283/RAW-R0283-LPD05-S00002.h5");
        assert!(matches!(
            generate_module_filenames(&path),
            Err(ConfigError::BadModuleFilename(_))
        ));
        assert_eq!(module_number(&path), None);
    }

    #[test]
    fn test_filename_parsing() {
        let path = PathBuf::from("RAW-R0283-AGIPD03-S00000.h5");
        assert_eq!(module_number(&path), Some(3));
        assert_eq!(guess_run_number(&path), Some(283));
        assert_eq!(sequence_number(&path), Some(0));
        assert!(is_first_sequence(&path));
        assert!(!is_first_sequence(Path::new("CORR-R0283-AGIPD03-S00004.h5")));
        assert_eq!(sequence_number(Path::new("module.h5")), None);
    }

    #[test]
    fn test_darkcal_files() {
        let mut config = Config::default();
        assert_eq!(config.get_darkcal_files().unwrap(), vec![None; N_MODULES]);
        config.darkcal_path = Some(PathBuf::from("/cal/dark_AGIPD00_agipd_2017-09-16.h5"));
        let files = config.get_darkcal_files().unwrap();
        assert_eq!(
            files[12],
            Some(PathBuf::from("/cal/dark_AGIPD12_agipd_2017-09-16.h5"))
        );
    }

    #[test]
    fn test_read_config_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yml");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(
            b"input_files:\n  - /data/RAW-R0283-AGIPD00-S00000.h5\nscheme: XFEL2012\npulse_modulo: 4\nstrictness: strict\n",
        )
        .unwrap();
        let config = Config::read_config_file(&path).unwrap();
        assert_eq!(config.input_files.len(), 1);
        assert_eq!(config.strictness, Strictness::Strict);
        assert_eq!(config.stride(), 1);
        let scheme = config.acquisition_scheme();
        assert_eq!(scheme.name, "XFEL2012");
        assert_eq!(scheme.pulse_modulo, 4);
        assert_eq!(scheme.cell_id_divisor, 2);

        assert!(matches!(
            Config::read_config_file(&dir.path().join("missing.yml")),
            Err(ConfigError::BadFilePath(_))
        ));
    }
}
