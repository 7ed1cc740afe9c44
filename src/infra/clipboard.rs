use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use std::io::{self, Write};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum CopyError {
    #[error("clipboard unavailable ({clipboard}) and terminal fallback failed: {source}")]
    Fallback {
        clipboard: String,
        source: io::Error,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CopyOutcome {
    SystemClipboard,
    TerminalEscape,
}

/// Keeps one system clipboard handle alive for the whole session; on X11 the selection is
/// lost when the owning handle is dropped.
pub struct ClipboardSink {
    clipboard: Option<arboard::Clipboard>,
}

impl ClipboardSink {
    pub fn new() -> Self {
        let clipboard = match arboard::Clipboard::new() {
            Ok(clipboard) => Some(clipboard),
            Err(error) => {
                warn!(%error, "system clipboard unavailable; using terminal escape fallback");
                None
            }
        };
        Self { clipboard }
    }

    /// Tries the system clipboard first, then writes an OSC 52 sequence to `fallback`.
    pub fn copy(
        &mut self,
        text: &str,
        fallback: &mut impl Write,
    ) -> Result<CopyOutcome, CopyError> {
        let clipboard_error = match self.clipboard.as_mut() {
            Some(clipboard) => match clipboard.set_text(text.to_string()) {
                Ok(()) => return Ok(CopyOutcome::SystemClipboard),
                Err(error) => error.to_string(),
            },
            None => "not initialized".to_string(),
        };
        warn!(error = %clipboard_error, "clipboard write failed; falling back to OSC 52");

        fallback
            .write_all(osc52_sequence(text).as_bytes())
            .and_then(|()| fallback.flush())
            .map_err(|source| CopyError::Fallback {
                clipboard: clipboard_error,
                source,
            })?;
        Ok(CopyOutcome::TerminalEscape)
    }
}

pub fn osc52_sequence(text: &str) -> String {
    format!("\x1b]52;c;{}\x07", STANDARD.encode(text.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn osc52_wraps_base64_payload() {
        assert_eq!(osc52_sequence("hi"), "\x1b]52;c;aGk=\x07");
    }

    #[test]
    fn fallback_writes_escape_when_clipboard_missing() {
        let mut sink = ClipboardSink { clipboard: None };
        let mut out = Vec::new();
        let outcome = sink.copy("hello", &mut out).expect("copy");
        assert_eq!(outcome, CopyOutcome::TerminalEscape);
        assert_eq!(String::from_utf8(out).expect("utf8"), osc52_sequence("hello"));
    }
}
