use anyhow::{Context, Result};
use simplelog::{
    ColorChoice, CombinedLogger, ConfigBuilder, LevelFilter, SharedLogger, TermLogger,
    TerminalMode, WriteLogger,
};
use std::fs::File;
use std::path::Path;

pub fn setup_logger(log_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(log_dir).context("failed to create log directory")?;
    let log_file = File::create(log_dir.join("groundlift.log"))
        .context("failed to create groundlift.log")?;

    let mut term_builder = ConfigBuilder::new();
    term_builder.set_time_offset_to_local().ok();
    let mut file_builder = ConfigBuilder::new();
    file_builder.set_time_offset_to_local().ok();

    let loggers: Vec<Box<dyn SharedLogger>> = vec![
        TermLogger::new(
            LevelFilter::Info,
            term_builder.build(),
            TerminalMode::Mixed,
            ColorChoice::Auto,
        ),
        WriteLogger::new(LevelFilter::Debug, file_builder.build(), log_file),
    ];

    CombinedLogger::init(loggers).ok();
    Ok(())
}
