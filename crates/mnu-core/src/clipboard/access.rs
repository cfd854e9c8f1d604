//! Clipboard access.
//!
//! This module provides a platform-agnostic interface for reading and writing
//! clipboard text using the `arboard` crate, plus an in-memory implementation
//! for headless environments and tests.

use std::sync::{Arc, Mutex, PoisonError};

use arboard::Clipboard;
use zeroize::Zeroizing;

use crate::error::{Error, Result};

/// Platform-agnostic clipboard access trait.
pub trait ClipboardAccess: Send {
    /// Read the current clipboard text.
    ///
    /// Returns `None` when the clipboard holds no text.
    ///
    /// # Errors
    ///
    /// Returns an error if clipboard access fails.
    fn read_text(&mut self) -> Result<Option<Zeroizing<String>>>;

    /// Replace the clipboard content with `text`.
    ///
    /// # Errors
    ///
    /// Returns an error if clipboard access fails.
    fn write_text(&mut self, text: &str) -> Result<()>;
}

/// Native clipboard implementation using arboard.
///
/// On X11 and Wayland the content is served by this process, so the value
/// must stay alive for as long as the content should remain pasteable.
pub struct NativeClipboard {
    clipboard: Clipboard,
}

impl NativeClipboard {
    /// Create a new native clipboard accessor.
    ///
    /// # Errors
    ///
    /// Returns an error if clipboard cannot be accessed.
    pub fn new() -> Result<Self> {
        let clipboard = Clipboard::new()
            .map_err(|e| Error::ClipboardError(format!("failed to access clipboard: {e}")))?;
        Ok(Self { clipboard })
    }
}

impl ClipboardAccess for NativeClipboard {
    fn read_text(&mut self) -> Result<Option<Zeroizing<String>>> {
        match self.clipboard.get_text() {
            Ok(text) => {
                tracing::trace!("Clipboard: read {} bytes of text", text.len());
                Ok(Some(Zeroizing::new(text)))
            }
            Err(arboard::Error::ContentNotAvailable) => {
                tracing::trace!("Clipboard: no text content");
                Ok(None)
            }
            Err(e) => Err(Error::ClipboardError(format!("failed to read text: {e}"))),
        }
    }

    fn write_text(&mut self, text: &str) -> Result<()> {
        self.clipboard
            .set_text(text)
            .map_err(|e| Error::ClipboardError(format!("failed to set text: {e}")))
    }
}

/// In-memory clipboard shared between clones.
///
/// Every clone observes the same content, which lets one handle play the
/// user while another is driven by a clearer.
#[derive(Debug, Clone, Default)]
pub struct MemoryClipboard {
    content: Arc<Mutex<Option<String>>>,
}

impl MemoryClipboard {
    /// Create an empty in-memory clipboard.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current content, if any.
    pub fn contents(&self) -> Option<String> {
        self.content
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Overwrite the content, as another application would.
    pub fn set(&self, text: &str) {
        *self.content.lock().unwrap_or_else(PoisonError::into_inner) = Some(text.to_string());
    }
}

impl ClipboardAccess for MemoryClipboard {
    fn read_text(&mut self) -> Result<Option<Zeroizing<String>>> {
        Ok(self.contents().map(Zeroizing::new))
    }

    fn write_text(&mut self, text: &str) -> Result<()> {
        self.set(text);
        Ok(())
    }
}

/// Create a platform-appropriate clipboard accessor.
///
/// # Errors
///
/// Returns an error if clipboard cannot be accessed.
pub fn create_clipboard() -> Result<Box<dyn ClipboardAccess>> {
    Ok(Box::new(NativeClipboard::new()?))
}

impl ClipboardAccess for Box<dyn ClipboardAccess> {
    fn read_text(&mut self) -> Result<Option<Zeroizing<String>>> {
        (**self).read_text()
    }

    fn write_text(&mut self, text: &str) -> Result<()> {
        (**self).write_text(text)
    }
}
