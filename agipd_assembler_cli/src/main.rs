use clap::{Arg, Command};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc};

use libagipd_assembler::config::Config;
use libagipd_assembler::process::{create_subsets, process_subset, CountingSink};
use libagipd_assembler::scheme::AcquisitionScheme;
use libagipd_assembler::worker_status::{WorkerPhase, WorkerStatus};

fn make_template_config(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::default();
    let yaml_str = serde_yaml::to_string(&config)?;
    std::fs::write(path, yaml_str)?;
    Ok(())
}

/// Log to the terminal and to a file in the working directory
fn setup_logging() -> Result<(), spdlog::Error> {
    let file_sink = Arc::new(
        spdlog::sink::FileSink::builder()
            .path(PathBuf::from("./agipd_assembler.log"))
            .formatter(Box::new(spdlog::formatter::PatternFormatter::new(
                spdlog::formatter::pattern!(
                    "[{date_short} {time_short}] - [thread: {tid}] - [{^{level}}] - {payload}{eol}"
                ),
            )))
            .truncate(true)
            .build()?,
    );
    let logger = Arc::new(
        spdlog::Logger::builder()
            .flush_level_filter(spdlog::LevelFilter::All)
            .sinks(spdlog::default_logger().sinks().to_owned())
            .sink(file_sink)
            .build()?,
    );
    spdlog::set_default_logger(logger);
    Ok(())
}

fn bar_style(phase: WorkerPhase) -> ProgressStyle {
    let template = match phase {
        WorkerPhase::Indexing => "{prefix} [{bar:40.magenta}] {percent}% {msg}",
        WorkerPhase::Assembling => "{prefix} [{bar:40.cyan}] {percent}% {msg}",
        WorkerPhase::Done => "{prefix} [{bar:40.green}] {percent}% {msg}",
    };
    ProgressStyle::with_template(template).unwrap_or_else(|_| ProgressStyle::default_bar())
}

fn update_bar(bar: &ProgressBar, status: &WorkerStatus) {
    bar.set_style(bar_style(status.phase));
    bar.set_message(status.file_name.clone());
    bar.set_position((status.progress * 100.0) as u64);
}

fn main() {
    // Create a cli
    let matches = Command::new("agipd_assembler_cli")
        .arg_required_else_help(true)
        .subcommand(Command::new("new").about("Make a template configuration yaml file"))
        .arg(
            Arg::new("path")
                .short('p')
                .long("path")
                .global(true)
                .help("Path to the configuration file"),
        )
        .get_matches();

    if let Err(e) = setup_logging() {
        spdlog::error!("Could not create the log file: {e}");
    }

    let config_path = match matches.get_one::<String>("path") {
        Some(p) => PathBuf::from(p),
        None => {
            spdlog::error!("A configuration path is required (--path)");
            return;
        }
    };

    if let Some(("new", _)) = matches.subcommand() {
        spdlog::info!("Making a template config at {}...", config_path.display());
        match make_template_config(&config_path) {
            Ok(()) => spdlog::info!("Done."),
            Err(e) => spdlog::error!("Could not write template config: {e}"),
        }
        return;
    }

    // Load our config
    spdlog::info!("Loading config from {}...", config_path.display());
    let config = match Config::read_config_file(&config_path) {
        Ok(c) => c,
        Err(e) => {
            spdlog::error!("{e}");
            return;
        }
    };
    spdlog::info!("Config successfully loaded.");
    spdlog::info!("Input files: {}", config.input_files.len());
    match &config.darkcal_path {
        Some(p) => spdlog::info!("Darkcal Path: {}", p.display()),
        None => spdlog::info!("Darkcal Path: none, raw data will not be corrected"),
    }
    if AcquisitionScheme::lookup(&config.scheme).is_none() {
        spdlog::warn!(
            "Scheme {} is not one of {:?}",
            config.scheme,
            AcquisitionScheme::known_names()
        );
    }
    spdlog::info!("Acquisition scheme: {}", config.acquisition_scheme());
    spdlog::info!("Ignore gain switch: {}", config.ignore_gain_switch);
    spdlog::info!("Strictness: {:?}", config.strictness);

    if !config.is_n_threads_valid() {
        spdlog::error!("n_threads must be at least 1, found {}", config.n_threads);
        return;
    }
    let subsets = match create_subsets(&config) {
        Ok(s) => s,
        Err(e) => {
            spdlog::error!("{e}");
            return;
        }
    };

    // Spawn the workers
    let pb_manager = MultiProgress::new();
    let (tx, rx) = mpsc::channel::<WorkerStatus>();
    let mut bars: Vec<Option<ProgressBar>> = vec![None; subsets.len()];
    let mut workers = Vec::new();
    for (idx, subset) in subsets.into_iter().enumerate() {
        // Dont make empty workers
        if subset.is_empty() {
            continue;
        }
        let bar = pb_manager.add(ProgressBar::new(100));
        bar.set_style(bar_style(WorkerPhase::Indexing));
        bar.set_prefix(format!("Worker {idx}"));
        bars[idx] = Some(bar);

        let conf = config.clone();
        let tx = tx.clone();
        workers.push(std::thread::spawn(move || {
            process_subset(conf, tx, idx, subset, CountingSink::default())
        }));
    }
    drop(tx);

    loop {
        std::thread::sleep(std::time::Duration::from_millis(250));
        for status in rx.try_iter() {
            if let Some(Some(bar)) = bars.get(status.worker_id) {
                update_bar(bar, &status);
            }
        }
        if workers.iter().all(|w| w.is_finished()) {
            break;
        }
    }

    let mut total_frames = 0;
    for worker in workers {
        match worker.join() {
            Ok(Ok(sink)) => {
                spdlog::info!("Worker complete: {} frames", sink.n_frames);
                total_frames += sink.n_frames;
            }
            Ok(Err(e)) => spdlog::error!("Processor error: {e}"),
            Err(_) => spdlog::error!("An error occured joining one of the workers!"),
        }
    }
    for bar in bars.into_iter().flatten() {
        bar.finish();
    }

    spdlog::info!("Done. Assembled {total_frames} frames.");
}
