// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Open/close/resize state of the floating chat window.
//!
//! ```text
//! Closed ⇄ Open ──begin_resize──▶ Resizing ──end_resize──▶ Open
//! ```
//!
//! Sizes are clamped to [`WindowBounds`]. The size is written to storage when
//! a resize ends and read back whenever the window opens.

use std::sync::Arc;

use parley_core::platform::KeyValueStore;
use parley_core::ParleyError;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub const KEY_WIDGET_WIDTH: &str = "parley_widget_width";
pub const KEY_WIDGET_HEIGHT: &str = "parley_widget_height";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSize {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowBounds {
    pub min_width: u32,
    pub min_height: u32,
    pub max_width: u32,
    pub max_height: u32,
    pub default_width: u32,
    pub default_height: u32,
}

impl Default for WindowBounds {
    fn default() -> Self {
        Self {
            min_width: 300,
            min_height: 400,
            max_width: 800,
            max_height: 900,
            default_width: 380,
            default_height: 600,
        }
    }
}

impl WindowBounds {
    pub fn clamp(&self, width: u32, height: u32) -> WindowSize {
        WindowSize {
            width: width.clamp(self.min_width, self.max_width.max(self.min_width)),
            height: height.clamp(self.min_height, self.max_height.max(self.min_height)),
        }
    }

    pub fn default_size(&self) -> WindowSize {
        self.clamp(self.default_width, self.default_height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowState {
    Closed,
    Open,
    /// A drag is in progress; `started_from` is the size when it began.
    Resizing { started_from: WindowSize },
}

pub struct WidgetWindow {
    state: WindowState,
    size: WindowSize,
    bounds: WindowBounds,
    store: Arc<dyn KeyValueStore>,
}

impl WidgetWindow {
    pub fn new(bounds: WindowBounds, store: Arc<dyn KeyValueStore>) -> Self {
        let mut window = Self {
            state: WindowState::Closed,
            size: bounds.default_size(),
            bounds,
            store,
        };
        window.size = window.restore();
        window
    }

    pub fn state(&self) -> WindowState {
        self.state
    }

    pub fn size(&self) -> WindowSize {
        self.size
    }

    pub fn is_open(&self) -> bool {
        !matches!(self.state, WindowState::Closed)
    }

    /// Opens the window at its saved size. Opening an open window does nothing.
    pub fn open(&mut self) -> Result<WindowSize, ParleyError> {
        match self.state {
            WindowState::Closed => {
                self.size = self.restore();
                self.state = WindowState::Open;
                debug!(width = self.size.width, height = self.size.height, "widget opened");
                Ok(self.size)
            }
            WindowState::Open => Ok(self.size),
            WindowState::Resizing { .. } => Err(invalid("open", self.state)),
        }
    }

    /// Closes the window. An unfinished resize is abandoned without saving.
    pub fn close(&mut self) {
        if let WindowState::Resizing { started_from } = self.state {
            self.size = started_from;
        }
        if self.state != WindowState::Closed {
            debug!("widget closed");
        }
        self.state = WindowState::Closed;
    }

    pub fn toggle(&mut self) -> Result<WindowState, ParleyError> {
        if self.is_open() {
            self.close();
        } else {
            self.open()?;
        }
        Ok(self.state)
    }

    pub fn begin_resize(&mut self) -> Result<(), ParleyError> {
        match self.state {
            WindowState::Open => {
                self.state = WindowState::Resizing {
                    started_from: self.size,
                };
                Ok(())
            }
            other => Err(invalid("begin_resize", other)),
        }
    }

    /// Applies a live size during a drag and returns the clamped result.
    pub fn resize_to(&mut self, width: u32, height: u32) -> Result<WindowSize, ParleyError> {
        match self.state {
            WindowState::Resizing { .. } => {
                self.size = self.bounds.clamp(width, height);
                Ok(self.size)
            }
            other => Err(invalid("resize_to", other)),
        }
    }

    /// Finishes a drag and saves the size.
    pub fn end_resize(&mut self) -> Result<WindowSize, ParleyError> {
        match self.state {
            WindowState::Resizing { .. } => {
                self.state = WindowState::Open;
                self.persist();
                Ok(self.size)
            }
            other => Err(invalid("end_resize", other)),
        }
    }

    fn restore(&self) -> WindowSize {
        let default = self.bounds.default_size();
        let width = self.read_dimension(KEY_WIDGET_WIDTH).unwrap_or(default.width);
        let height = self.read_dimension(KEY_WIDGET_HEIGHT).unwrap_or(default.height);
        self.bounds.clamp(width, height)
    }

    fn read_dimension(&self, key: &str) -> Option<u32> {
        match self.store.get(key) {
            Ok(Some(raw)) => raw.trim().parse().ok(),
            Ok(None) => None,
            Err(e) => {
                warn!(key, error = %e, "could not read saved widget size");
                None
            }
        }
    }

    fn persist(&self) {
        for (key, value) in [
            (KEY_WIDGET_WIDTH, self.size.width),
            (KEY_WIDGET_HEIGHT, self.size.height),
        ] {
            if let Err(e) = self.store.set(key, &value.to_string()) {
                warn!(key, error = %e, "could not save widget size");
            }
        }
        debug!(width = self.size.width, height = self.size.height, "widget size saved");
    }
}

fn invalid(op: &str, state: WindowState) -> ParleyError {
    ParleyError::Protocol(format!("cannot {op} while window is {state:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::platform::MemoryStore;

    fn window(store: &Arc<MemoryStore>) -> WidgetWindow {
        WidgetWindow::new(WindowBounds::default(), store.clone())
    }

    #[test]
    fn opens_at_default_size() {
        let store = Arc::new(MemoryStore::new());
        let mut w = window(&store);
        assert_eq!(w.state(), WindowState::Closed);
        assert_eq!(
            w.open().unwrap(),
            WindowSize {
                width: 380,
                height: 600
            }
        );
        assert!(w.is_open());
    }

    #[test]
    fn resize_is_clamped_and_persisted_on_end() {
        let store = Arc::new(MemoryStore::new());
        let mut w = window(&store);
        w.open().unwrap();
        w.begin_resize().unwrap();

        let live = w.resize_to(5_000, 10).unwrap();
        assert_eq!(
            live,
            WindowSize {
                width: 800,
                height: 400
            }
        );
        assert!(store.get(KEY_WIDGET_WIDTH).unwrap().is_none());

        w.end_resize().unwrap();
        assert_eq!(w.state(), WindowState::Open);
        assert_eq!(store.get(KEY_WIDGET_WIDTH).unwrap().as_deref(), Some("800"));
        assert_eq!(store.get(KEY_WIDGET_HEIGHT).unwrap().as_deref(), Some("400"));
    }

    #[test]
    fn saved_size_is_restored_on_open() {
        let store = Arc::new(MemoryStore::new());
        store.set(KEY_WIDGET_WIDTH, "500").unwrap();
        store.set(KEY_WIDGET_HEIGHT, "garbage").unwrap();

        let mut w = window(&store);
        assert_eq!(
            w.open().unwrap(),
            WindowSize {
                width: 500,
                height: 600
            }
        );
    }

    #[test]
    fn closing_mid_resize_abandons_the_drag() {
        let store = Arc::new(MemoryStore::new());
        let mut w = window(&store);
        w.open().unwrap();
        w.begin_resize().unwrap();
        w.resize_to(700, 700).unwrap();
        w.close();

        assert_eq!(w.size().width, 380);
        assert!(store.is_empty());
    }

    #[test]
    fn invalid_transitions_are_rejected() {
        let store = Arc::new(MemoryStore::new());
        let mut w = window(&store);
        assert!(w.begin_resize().is_err());
        assert!(w.resize_to(1, 1).is_err());
        assert!(w.end_resize().is_err());

        w.open().unwrap();
        w.begin_resize().unwrap();
        assert!(w.open().is_err());
        assert!(w.begin_resize().is_err());
    }

    #[test]
    fn toggle_flips_between_open_and_closed() {
        let store = Arc::new(MemoryStore::new());
        let mut w = window(&store);
        assert_eq!(w.toggle().unwrap(), WindowState::Open);
        assert_eq!(w.toggle().unwrap(), WindowState::Closed);
    }
}
