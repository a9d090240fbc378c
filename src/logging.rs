// 📝 Diagnostics setup shared by both binaries
// Reports go to stdout via println!; tracing output goes to stderr.

use tracing::Level;

/// Install the fmt subscriber. `verbose` lowers the threshold to DEBUG.
pub fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::WARN };

    tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}
