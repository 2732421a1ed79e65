use crate::config::APP_NAME;
use color_eyre::eyre::Result;
use log::LevelFilter;
use std::env;
use std::fs;
use std::path::PathBuf;

pub fn init_logging(debug: bool) -> Result<()> {
    let log_level = if debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let log_dir = default_log_dir();
    fs::create_dir_all(&log_dir)?;

    let log_file = log_dir.join(format!("{APP_NAME}.log"));

    env_logger::Builder::new()
        .filter_level(log_level)
        .target(env_logger::Target::Pipe(Box::new(
            fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&log_file)?,
        )))
        .format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "{} [{}] - {}: {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .try_init()?;

    log::info!("Logging to {log_file:?} with level {log_level}");
    Ok(())
}

/// `$XDG_STATE_HOME/gutterline`, else `~/.local/state/gutterline`, else
/// `/tmp/gutterline`.
pub fn default_log_dir() -> PathBuf {
    log_dir_from(env::var_os("XDG_STATE_HOME"), env::var_os("HOME"))
}

fn log_dir_from(xdg_state: Option<std::ffi::OsString>, home: Option<std::ffi::OsString>) -> PathBuf {
    match (xdg_state, home) {
        (Some(state), _) if !state.is_empty() => PathBuf::from(state).join(APP_NAME),
        (_, Some(home)) => PathBuf::from(home).join(".local/state").join(APP_NAME),
        _ => PathBuf::from("/tmp").join(APP_NAME),
    }
}
