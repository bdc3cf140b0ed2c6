//! # agipd_assembler
//!
//! agipd_assembler reads the per-module HDF5 files written by the AGIPD-1M detector at the
//! European XFEL, synchronizes the modules by (train ID, pulse ID), corrects raw samples
//! with per-cell dark offsets, gain thresholds, relative gains and bad-pixel maps, and
//! assembles one composite detector image per good frame.
//!
//! ## Installation
//!
//! The only method of install is from source. If you have not used Rust before, see the
//! [Rust docs](https://www.rust-lang.org/tools/install) for installation instructions.
//!
//! ### HDF5
//!
//! The `hdf5` dependency is built with its `static` feature, so no system HDF5 install is
//! needed.
//!
//! ### Building & Install
//!
//! To build and install the CLI use `cargo install --path ./agipd_assembler_cli` from the
//! top level repository.
//!
//! ## Configuration
//!
//! The YAML format of a configuration file is as follows:
//!
//! ```yml
//! input_files:
//! - /data/r0283/RAW-R0283-AGIPD00-S00000.h5
//! darkcal_path: /calib/Cheetah-AGIPD00-calib.h5
//! scheme: XFEL2012
//! first_valid_pulse: null
//! pulse_modulo: null
//! ignore_gain_switch: false
//! good_frame_stride: 1
//! new_file_skip: 0
//! strictness: lenient
//! summary_path: /data/summaries
//! n_threads: 1
//! ```
//!
//! - `input_files`: one file per sequence. The file of any module may be given; the files
//!   of the other fifteen modules are found by rewriting the two digits after `AGIPD`.
//! - `darkcal_path`: calibration file of one module; the others are found the same way.
//!   Without it raw data is passed through uncorrected.
//! - `scheme`: the acquisition scheme of the beamtime (`default`, `XFEL2012`, `XFEL2066`,
//!   `XFEL2166`). `first_valid_pulse` and `pulse_modulo` override the scheme's values.
//! - `ignore_gain_switch`: correct every pixel with the high-gain constants.
//! - `good_frame_stride`: yield only every n-th good frame of each train.
//! - `new_file_skip`: frames to drop from the start of the first sequence file of a run.
//! - `strictness`: `lenient` logs metadata and calibration mismatches, `strict` rejects them.
//! - `summary_path`: directory for a YAML summary of each input file.
//! - `n_threads`: number of workers the input files are divided amongst.
//!
//! ## Output
//!
//! Composite frames are handed to a [`process::FrameSink`]. Each frame holds the image,
//! gain stage and mask of all sixteen modules panel by panel; a module that did not
//! deliver a frame has a zeroed panel with every pixel masked.
pub mod assembler;
pub mod calibration;
pub mod composite;
pub mod config;
pub mod constants;
pub mod error;
pub mod frame_index;
pub mod module_file;
pub mod module_source;
pub mod module_stream;
pub mod process;
pub mod scheme;
pub mod summary;
pub mod worker_status;

#[cfg(test)]
mod testing;
