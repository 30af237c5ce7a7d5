//! Styled terminal output helpers shared by the commands.

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tally_backup::SyncStatus;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Green check line for a completed operation.
pub fn success(msg: &str) {
    let mark = style("✓").green().bold();
    println!("{mark} {msg}");
}

/// Red cross line on stderr.
pub fn error(msg: &str) {
    let mark = style("✗").red().bold();
    eprintln!("{mark} {msg}");
}

/// Yellow caution line on stderr.
pub fn warning(msg: &str) {
    let mark = style("⚠").yellow().bold();
    eprintln!("{mark} {msg}");
}

/// Blue informational line.
pub fn info(msg: &str) {
    let mark = style("ℹ").blue().bold();
    println!("{mark} {msg}");
}

/// Section header, bold and underlined with a leading blank line.
pub fn header(msg: &str) {
    let text = style(msg).bold().underlined();
    println!("\n{text}");
}

/// Indented `key: value` row for detail listings.
pub fn kv(key: &str, value: &str) {
    let label = style(key).dim();
    println!("  {label}: {value}");
}

/// Spinner for operations without a known length.
pub fn spinner(msg: &str) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    let ticker = ProgressStyle::with_template("{spinner:.blue} {msg}")
        .unwrap()
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");
    bar.set_style(ticker);
    bar.set_message(msg.to_string());
    bar.enable_steady_tick(std::time::Duration::from_millis(100));
    bar
}

/// Mirror transfer progress from the repository's status channel onto a
/// spinner until the returned task is aborted.
pub fn transfer_watcher(
    mut rx: watch::Receiver<SyncStatus>,
    bar: ProgressBar,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let status = rx.borrow_and_update().clone();
            let label = match status {
                SyncStatus::Syncing { download_pct, .. } if download_pct > 0 => {
                    format!("Downloading... {download_pct}%")
                }
                SyncStatus::Syncing { upload_pct, .. } => format!("Uploading... {upload_pct}%"),
                _ => continue,
            };
            bar.set_message(label);
        }
    })
}
