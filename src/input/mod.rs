/// Global push-to-talk hotkey monitoring
pub mod hotkey;
/// Keystroke injection into the focused window
pub mod inject;

pub use hotkey::{EdgeSource, GlobalHotkeyEdges, HotkeyEdge, HotkeyMonitor};
pub use inject::{EnigoInjector, InjectError, TextInjector};
