use anyhow::Context as _;
use clap::Args;
use log::{Level, LevelFilter, Log};
use std::{
    fs::{File, OpenOptions},
    io::Write,
    path::Path,
    sync::Mutex,
};

type LogLinePrefix = String;

#[derive(Args)]
#[command(next_help_heading = "Logging options")]
pub struct LoggingConfig {
    /// Output only warnings and errors.
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Output additional debugging information, including pulumi's stderr.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Also append every log line to this file.
    #[arg(long, value_name = "PATH", global = true)]
    pub log_file: Option<String>,
}

impl LoggingConfig {
    /// Lines written to the log file start with `file_prefix`.
    ///
    /// The stderr logger is installed even if the log file could not be opened and `Err` is returned.
    pub fn init(&self, file_prefix: LogLinePrefix) -> anyhow::Result<()> {
        let user_chosen_level = if self.verbose {
            LevelFilter::Debug
        } else if self.quiet {
            LevelFilter::Warn
        } else {
            LevelFilter::Info
        };

        let (file_logging, file_error) = match &self.log_file {
            Some(path) => match OpenOptions::new().create(true).append(true).open(Path::new(path)).context("opening log file") {
                Ok(file) => (Some((Mutex::new(file), file_prefix)), None),
                Err(e) => (None, Some(e)),
            },
            None => (None, None),
        };

        let logger = Logger { level_filter: user_chosen_level, file_logging };
        log::set_boxed_logger(Box::new(logger)).context("installing logger")?;
        log::set_max_level(user_chosen_level);

        match file_error {
            None => Ok(()),
            Some(e) => Err(e),
        }
    }
}

struct Logger {
    level_filter: LevelFilter,
    file_logging: Option<(Mutex<File>, LogLinePrefix)>,
}

impl Log for Logger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        if record.level() > self.level_filter {
            return;
        }

        // hyper, reqwest and friends are chatty at debug
        if let Some(module_path) = record.module_path() {
            if module_path != "platyform" && !module_path.starts_with("platyform::") {
                return;
            }
        }

        let level_prefix = match record.level() {
            Level::Error => "error: ",
            Level::Warn => "warning: ",
            Level::Info => "",
            Level::Debug => "debug: ",
            Level::Trace => "trace: ",
        };

        // Write in a single write
        let stderr_line = format!("{level_prefix}{}\n", record.args());
        std::io::stderr().write_all(stderr_line.as_bytes()).unwrap_or(());

        if let Some((file, file_prefix)) = &self.file_logging {
            let file_line = format!("{file_prefix}{stderr_line}");
            let mut guard = file.lock().unwrap();
            guard.write_all(file_line.as_bytes()).unwrap_or(());
        }
    }

    fn flush(&self) {}
}
