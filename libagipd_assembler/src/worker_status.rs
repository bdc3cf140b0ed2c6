/// What a worker is busy with
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WorkerPhase {
    /// Opening module files and building the frame index
    #[default]
    Indexing,
    /// Assembling and handing off composite frames
    Assembling,
    Done,
}

#[derive(Debug, Clone, Default)]
pub struct WorkerStatus {
    pub progress: f32,
    pub file_name: String,
    pub run_number: i32,
    pub worker_id: usize,
    pub phase: WorkerPhase,
}

impl WorkerStatus {
    pub fn new(
        progress: f32,
        file_name: String,
        run_number: i32,
        worker_id: usize,
        phase: WorkerPhase,
    ) -> Self {
        Self {
            progress,
            file_name,
            run_number,
            worker_id,
            phase,
        }
    }
}
