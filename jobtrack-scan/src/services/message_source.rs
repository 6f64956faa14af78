//! Message source seam
//!
//! A source returns raw messages for a trailing date window. Fetching is
//! blocking and runs on the `FetchPool`.

use thiserror::Error;

use crate::models::RawMessage;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SourceError {
    /// Missing or unusable credentials; detected before a scan starts
    #[error("Message source not configured: {0}")]
    NotConfigured(String),

    #[error("Message source request failed: {0}")]
    Transport(String),
}

/// Date window and paging for one fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchWindow {
    pub window_days: u32,
    pub max_messages: usize,
    pub page_size: usize,
}

impl FetchWindow {
    /// Window with `window_days` and `max_messages` at least 1 and
    /// `page_size` within `[1, max_messages]`
    pub fn new(window_days: u32, max_messages: usize, page_size: usize) -> Self {
        let max_messages = max_messages.max(1);
        Self {
            window_days: window_days.max(1),
            max_messages,
            page_size: page_size.clamp(1, max_messages),
        }
    }
}

impl Default for FetchWindow {
    fn default() -> Self {
        Self::new(30, 200, 50)
    }
}

pub trait MessageSource: Send + Sync {
    /// Verify credentials are present and usable
    fn ensure_ready(&self) -> Result<(), SourceError>;

    /// Messages received within the window, at most `max_messages`
    fn fetch_recent(&self, window: &FetchWindow) -> Result<Vec<RawMessage>, SourceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_is_clamped() {
        let window = FetchWindow::new(0, 0, 0);
        assert_eq!(
            window,
            FetchWindow {
                window_days: 1,
                max_messages: 1,
                page_size: 1
            }
        );

        let window = FetchWindow::new(7, 20, 500);
        assert_eq!(window.page_size, 20);
    }

    #[test]
    fn test_default_window() {
        let window = FetchWindow::default();
        assert_eq!((window.window_days, window.max_messages, window.page_size), (30, 200, 50));
    }
}
