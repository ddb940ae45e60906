use crate::logbook::LogBook;
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::mpsc::{self, Sender};
use std::sync::OnceLock;
use std::time::Duration;

/// How long each clipboard owner stays alive so Linux clipboard managers can read it.
const CLIPBOARD_HOLD: Duration = Duration::from_secs(2);

static CLIPBOARD: OnceLock<Sender<String>> = OnceLock::new();

/// Write the session log into the current directory and return its absolute path.
pub fn export_log(log: &LogBook, run_id: &str) -> Result<PathBuf> {
    let stamp = crate::model::utc_timestamp().replace(':', "-").replace('T', "_");
    let short_id = &run_id[..run_id.len().min(8)];
    let path = std::env::current_dir()
        .context("get current directory")?
        .join(format!("scene-batch-{stamp}-{short_id}.log"));
    log.export(&path)?;
    Ok(path)
}

fn clipboard_worker(rx: mpsc::Receiver<String>) {
    for text in rx {
        let Ok(mut clipboard) = arboard::Clipboard::new() else {
            continue;
        };
        if clipboard.set_text(text).is_ok() {
            std::thread::sleep(CLIPBOARD_HOLD);
        }
    }
}

/// Hand the text to the clipboard thread; never blocks the UI loop.
pub fn copy_to_clipboard(text: &str) -> Result<()> {
    let sender = CLIPBOARD.get_or_init(|| {
        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || clipboard_worker(rx));
        tx
    });
    sender
        .send(text.to_owned())
        .map_err(|_| anyhow::anyhow!("clipboard thread is gone"))
}
