/// Number of modules in an AGIPD-1M detector
pub const N_MODULES: usize = 16;
/// Number of gain stages stored in a calibration artifact
pub const N_GAINS: usize = 3;
/// Calibration cell counts above this are suspicious (memory cells per pixel)
pub const MAX_EXPECTED_CELLS: usize = 128;

// Mask values written to the composite and per-module mask buffers
pub const MASK_GOOD: u16 = 0;
pub const MASK_BAD: u16 = 1;
/// Status written for a module that did not contribute to a frame
pub const STATUS_BLANK: u16 = 1;

// Dataset layout of the EuXFEL SPB AGIPD-1M files
pub const INSTRUMENT_PREFIX: &str = "/INSTRUMENT/SPB_DET_AGIPD1M-1/DET/";
pub const INDEX_PREFIX: &str = "/INDEX/SPB_DET_AGIPD1M-1/DET/";
pub const IMAGE_GROUP_SUFFIX: &str = "CH0:xtdf/image";
pub const INDEX_TRAIN_ID_FIELD: &str = "/INDEX/trainId";
pub const TRAIN_ID_NAME: &str = "trainId";
pub const PULSE_ID_NAME: &str = "pulseId";
pub const CELL_ID_NAME: &str = "cellId";
pub const STATUS_NAME: &str = "status";
pub const DATA_NAME: &str = "data";
pub const GAIN_NAME: &str = "gain";
pub const MASK_NAME: &str = "mask";
pub const INDEX_FIRST_NAME: &str = "first";
pub const INDEX_COUNT_NAME: &str = "count";

// Calibration artifact datasets
pub const CALIB_OFFSET_NAME: &str = "offset";
pub const CALIB_THRESHOLD_NAME: &str = "threshold";
pub const CALIB_RELATIVE_GAIN_NAME: &str = "relativegain";
pub const CALIB_BADPIXEL_NAME: &str = "badpixel";

// Filename conventions
pub const MODULE_KEYWORD: &str = "AGIPD";
pub const RAW_PREFIX: &str = "RAW";
pub const RUN_KEYWORD: &str = "-R";
pub const SEQUENCE_DIGITS: usize = 5;

/// Index bounds used when no module holds a valid timestamp
pub const FALLBACK_TRAIN_RANGE: (u64, u64) = (0, 0);
pub const FALLBACK_PULSE_RANGE: (u64, u64) = (0, 0);
/// Rectangles with more entries than this are stored sparsely
pub const DENSE_INDEX_LIMIT: usize = 1 << 26;
