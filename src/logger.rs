use env_logger::Env;

const LOG_LEVEL_ENV: &str = "LOG_LEVEL";
const LOG_STYLE_ENV: &str = "LOG_STYLE";

/// Installs the process logger. Components log through the `log` facade with
/// their own `target` and the request trace id, so nothing is reconfigured
/// after this runs.
pub fn setup_logger() {
    let env = Env::new()
        .filter_or(LOG_LEVEL_ENV, "info")
        .write_style_or(LOG_STYLE_ENV, "auto");

    if let Err(err) = env_logger::Builder::from_env(env)
        .format_timestamp_millis()
        .try_init()
    {
        eprintln!("Logger has already been initialized: {}", err);
        return;
    }

    log::info!(target: "init", log_level_env = LOG_LEVEL_ENV, log_style_env = LOG_STYLE_ENV; "Logger initialized.");
}
