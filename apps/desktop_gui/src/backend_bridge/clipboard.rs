use anyhow::Context;
use arboard::Clipboard;
use vision_core::ClipboardWriter;

pub struct ArboardClipboard;

impl ClipboardWriter for ArboardClipboard {
    fn write_text(&self, text: &str) -> anyhow::Result<()> {
        let mut clipboard = Clipboard::new().context("failed to open system clipboard")?;
        clipboard
            .set_text(text.to_string())
            .context("failed to write clipboard text")
    }
}
