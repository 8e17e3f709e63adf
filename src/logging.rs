use anyhow::Result;
use tracing::Level;
use tracing_subscriber::fmt;

/// Install the fmt subscriber: `info` by default, `debug` when verbose.
pub fn init(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let _ = fmt()
        .with_max_level(level)
        .with_target(verbose)
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .try_init();
    Ok(())
}
