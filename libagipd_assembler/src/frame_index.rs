use fxhash::FxHashMap;

use super::constants::{DENSE_INDEX_LIMIT, FALLBACK_PULSE_RANGE, FALLBACK_TRAIN_RANGE};
use super::module_source::ModuleHeaders;

#[derive(Debug, Clone)]
enum IndexStorage {
    /// (train - min_train, pulse - min_pulse, module) in row-major order
    Dense(Vec<Option<u32>>),
    Sparse(FxHashMap<(u64, u64, usize), usize>),
}

/// Map from (train, pulse, module) to the physical frame offset inside that module's file.
///
/// The index covers the rectangle of trains and pulses observed by the included modules.
/// Every entry starts unassigned; each observed frame then claims the entry of its own
/// (train, pulse). Train ID 0 marks a frame without valid timing and is never indexed.
#[derive(Debug, Clone)]
pub struct FrameIndex {
    train_range: (u64, u64),
    pulse_range: (u64, u64),
    n_modules: usize,
    n_assigned: usize,
    storage: IndexStorage,
}

/// Every (train, pulse, module, frame) with a valid train ID, past the first `skip` frames
fn observed_frames<'a>(
    modules: &'a [Option<&'a ModuleHeaders>],
    skip: usize,
) -> impl Iterator<Item = (u64, u64, usize, usize)> + 'a {
    modules
        .iter()
        .enumerate()
        .filter_map(|(m, headers)| headers.map(|h| (m, h)))
        .flat_map(move |(m, headers)| {
            headers
                .train_ids
                .iter()
                .zip(&headers.pulse_ids)
                .take(headers.len())
                .enumerate()
                .skip(skip)
                .filter(|(_, (train, _))| **train > 0)
                .map(move |(frame, (train, pulse))| (*train, *pulse, m, frame))
        })
}

impl FrameIndex {
    /// Build the index over every module's metadata.
    ///
    /// `None` marks an excluded module: it does not contribute to the bounds and resolves
    /// to nothing. The first `skip` frames of every module are ignored.
    pub fn build(modules: &[Option<&ModuleHeaders>], skip: usize) -> Self {
        Self::build_with_limit(modules, skip, DENSE_INDEX_LIMIT)
    }

    fn build_with_limit(modules: &[Option<&ModuleHeaders>], skip: usize, dense_limit: usize) -> Self {
        let n_modules = modules.len();

        let mut bounds: Option<((u64, u64), (u64, u64))> = None;
        for (train, pulse, _, _) in observed_frames(modules, skip) {
            bounds = Some(match bounds {
                None => ((train, train), (pulse, pulse)),
                Some((t, p)) => ((t.0.min(train), t.1.max(train)), (p.0.min(pulse), p.1.max(pulse))),
            });
        }
        let (train_range, pulse_range) = match bounds {
            Some(b) => b,
            None => {
                spdlog::warn!("No module holds a valid timestamp; using the fallback index range");
                (FALLBACK_TRAIN_RANGE, FALLBACK_PULSE_RANGE)
            }
        };

        let n_pulses = (pulse_range.1 - pulse_range.0).checked_add(1);
        let n_entries = (train_range.1 - train_range.0)
            .checked_add(1)
            .zip(n_pulses)
            .and_then(|(t, p)| t.checked_mul(p))
            .and_then(|tp| tp.checked_mul(n_modules as u64))
            .filter(|n| *n <= dense_limit as u64);

        let mut index = Self {
            train_range,
            pulse_range,
            n_modules,
            n_assigned: 0,
            storage: match n_entries {
                Some(n) => IndexStorage::Dense(vec![None; n as usize]),
                None => IndexStorage::Sparse(FxHashMap::default()),
            },
        };

        for (train, pulse, module, frame) in observed_frames(modules, skip) {
            if let Some(slot) = index.dense_slot(train, pulse, module) {
                if let IndexStorage::Dense(entries) = &mut index.storage {
                    entries[slot] = Some(frame as u32);
                }
            } else if let IndexStorage::Sparse(map) = &mut index.storage {
                if index.train_range.0 <= train
                    && train <= index.train_range.1
                    && index.pulse_range.0 <= pulse
                    && pulse <= index.pulse_range.1
                {
                    map.insert((train, pulse, module), frame);
                }
            }
        }
        index.n_assigned = match &index.storage {
            IndexStorage::Dense(entries) => entries.iter().filter(|e| e.is_some()).count(),
            IndexStorage::Sparse(map) => map.len(),
        };

        spdlog::info!(
            "Frame index: trains {}..={}, pulses {}..={}, {} frames assigned ({} storage)",
            train_range.0,
            train_range.1,
            pulse_range.0,
            pulse_range.1,
            index.n_assigned,
            if index.is_sparse() { "sparse" } else { "dense" }
        );
        index
    }

    /// Position of an entry in dense storage, or None if out of range or sparse
    fn dense_slot(&self, train: u64, pulse: u64, module: usize) -> Option<usize> {
        if !matches!(self.storage, IndexStorage::Dense(_)) {
            return None;
        }
        if train < self.train_range.0
            || train > self.train_range.1
            || pulse < self.pulse_range.0
            || pulse > self.pulse_range.1
            || module >= self.n_modules
        {
            return None;
        }
        let n_pulses = (self.pulse_range.1 - self.pulse_range.0 + 1) as usize;
        let t = (train - self.train_range.0) as usize;
        let p = (pulse - self.pulse_range.0) as usize;
        Some((t * n_pulses + p) * self.n_modules + module)
    }

    /// The frame offset of (train, pulse) in a module, if that module recorded it
    pub fn resolve(&self, train: u64, pulse: u64, module: usize) -> Option<usize> {
        match &self.storage {
            IndexStorage::Dense(entries) => self
                .dense_slot(train, pulse, module)
                .and_then(|slot| entries[slot])
                .map(|frame| frame as usize),
            IndexStorage::Sparse(map) => map.get(&(train, pulse, module)).copied(),
        }
    }

    pub fn train_range(&self) -> (u64, u64) {
        self.train_range
    }

    pub fn pulse_range(&self) -> (u64, u64) {
        self.pulse_range
    }

    pub fn n_modules(&self) -> usize {
        self.n_modules
    }

    /// Number of (train, pulse, module) entries that resolve to a frame
    pub fn n_assigned(&self) -> usize {
        self.n_assigned
    }

    pub fn is_sparse(&self) -> bool {
        matches!(self.storage, IndexStorage::Sparse(_))
    }
}
