//! Clipboard hand-off for identifier values.
//!
//! Clipboard writes go through a dedicated thread that keeps each arboard
//! instance alive for a couple of seconds; on Linux the clipboard contents
//! vanish with the instance, so dropping it immediately would race the
//! clipboard manager.

use anyhow::Result;
use std::sync::mpsc as std_mpsc;
use std::sync::OnceLock;
use std::time::Duration;

static CLIPBOARD_SENDER: OnceLock<std_mpsc::Sender<String>> = OnceLock::new();

fn clipboard_sender() -> Result<&'static std_mpsc::Sender<String>> {
    CLIPBOARD_SENDER.get_or_init(|| {
        let (tx, rx) = std_mpsc::channel::<String>();
        std::thread::spawn(move || {
            use arboard::Clipboard;

            for text in rx {
                if let Ok(mut clipboard) = Clipboard::new() {
                    if clipboard.set_text(&text).is_ok() {
                        std::thread::sleep(Duration::from_secs(2));
                    }
                }
            }
        });
        tx
    });

    CLIPBOARD_SENDER
        .get()
        .ok_or_else(|| anyhow::anyhow!("failed to initialize clipboard manager"))
}

/// Queue a clipboard write; returns without blocking the UI thread.
pub fn copy_to_clipboard(text: &str) -> Result<()> {
    let sender = clipboard_sender()?;
    sender
        .send(text.to_string())
        .map_err(|_| anyhow::anyhow!("clipboard manager channel closed"))?;
    Ok(())
}
