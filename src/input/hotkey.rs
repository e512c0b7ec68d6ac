use anyhow::{anyhow, Context, Result};
use global_hotkey::{
    hotkey::{Code, HotKey, Modifiers},
    GlobalHotKeyEvent, GlobalHotKeyManager,
};
use tracing::info;

use crate::config::HotkeyConfig;

/// Press/release edge of the push-to-talk key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotkeyEdge {
    Pressed,
    Released,
}

/// Registers the configured global hotkey and classifies its events
///
/// Installs a process-wide input hook for the lifetime of the program.
/// Registration fails fast when the OS denies the hook, so a program that
/// cannot see the hotkey refuses to start instead of sitting silent.
pub struct HotkeyMonitor {
    manager: GlobalHotKeyManager,
    hotkey: HotKey,
}

impl HotkeyMonitor {
    /// Create and register the global hotkey from config
    ///
    /// # Errors
    /// Returns error if the input hook is denied, the key name is unknown, or
    /// registration fails
    pub fn new(config: &HotkeyConfig) -> Result<Self> {
        let manager = GlobalHotKeyManager::new()
            .context("failed to install global input hook (input permission denied?)")?;

        let modifiers = parse_modifiers(&config.modifiers)?;
        let code = parse_key(&config.key)?;

        let hotkey = HotKey::new(Some(modifiers), code);
        manager
            .register(hotkey)
            .context("failed to register hotkey")?;

        info!("registered hotkey: {:?} + {}", config.modifiers, config.key);

        Ok(Self { manager, hotkey })
    }

    /// Classify a manager event as an edge of the configured key
    ///
    /// Events for other registered hotkeys (there are none, but the channel is
    /// process-global) return `None`.
    #[must_use]
    pub fn edge(&self, event: &GlobalHotKeyEvent) -> Option<HotkeyEdge> {
        if event.id != self.hotkey.id() {
            return None;
        }
        match event.state {
            global_hotkey::HotKeyState::Pressed => Some(HotkeyEdge::Pressed),
            global_hotkey::HotKeyState::Released => Some(HotkeyEdge::Released),
        }
    }
}

impl Drop for HotkeyMonitor {
    fn drop(&mut self) {
        if let Err(e) = self.manager.unregister(self.hotkey) {
            tracing::error!("failed to unregister hotkey: {}", e);
        }
    }
}

/// Source of push-to-talk edges for the control loop
///
/// The real implementation drains the process-global hotkey event channel;
/// tests substitute a scripted source.
pub trait EdgeSource {
    /// Next pending edge, if any; never blocks
    fn try_next(&mut self) -> Option<HotkeyEdge>;
}

/// Edge source backed by the global hotkey event channel
pub struct GlobalHotkeyEdges {
    monitor: HotkeyMonitor,
}

impl GlobalHotkeyEdges {
    #[must_use]
    pub const fn new(monitor: HotkeyMonitor) -> Self {
        Self { monitor }
    }
}

impl EdgeSource for GlobalHotkeyEdges {
    fn try_next(&mut self) -> Option<HotkeyEdge> {
        // The channel delivers events for every registered hotkey; skip any
        // that are not ours (there should be none, but the channel is global)
        while let Ok(event) = GlobalHotKeyEvent::receiver().try_recv() {
            if let Some(edge) = self.monitor.edge(&event) {
                return Some(edge);
            }
        }
        None
    }
}

fn parse_modifiers(modifiers: &[String]) -> Result<Modifiers> {
    let mut result = Modifiers::empty();
    for modifier in modifiers {
        match modifier.as_str() {
            "Control" | "Ctrl" => result |= Modifiers::CONTROL,
            "Option" | "Alt" => result |= Modifiers::ALT,
            "Command" | "Super" => result |= Modifiers::SUPER,
            "Shift" => result |= Modifiers::SHIFT,
            _ => return Err(anyhow!("unknown modifier: {}", modifier)),
        }
    }
    Ok(result)
}

fn parse_key(key: &str) -> Result<Code> {
    match key {
        "A" => Ok(Code::KeyA),
        "B" => Ok(Code::KeyB),
        "C" => Ok(Code::KeyC),
        "D" => Ok(Code::KeyD),
        "E" => Ok(Code::KeyE),
        "F" => Ok(Code::KeyF),
        "G" => Ok(Code::KeyG),
        "H" => Ok(Code::KeyH),
        "I" => Ok(Code::KeyI),
        "J" => Ok(Code::KeyJ),
        "K" => Ok(Code::KeyK),
        "L" => Ok(Code::KeyL),
        "M" => Ok(Code::KeyM),
        "N" => Ok(Code::KeyN),
        "O" => Ok(Code::KeyO),
        "P" => Ok(Code::KeyP),
        "Q" => Ok(Code::KeyQ),
        "R" => Ok(Code::KeyR),
        "S" => Ok(Code::KeyS),
        "T" => Ok(Code::KeyT),
        "U" => Ok(Code::KeyU),
        "V" => Ok(Code::KeyV),
        "W" => Ok(Code::KeyW),
        "X" => Ok(Code::KeyX),
        "Y" => Ok(Code::KeyY),
        "Z" => Ok(Code::KeyZ),
        "F1" => Ok(Code::F1),
        "F2" => Ok(Code::F2),
        "F3" => Ok(Code::F3),
        "F4" => Ok(Code::F4),
        "F5" => Ok(Code::F5),
        "F6" => Ok(Code::F6),
        "F7" => Ok(Code::F7),
        "F8" => Ok(Code::F8),
        "F9" => Ok(Code::F9),
        "F10" => Ok(Code::F10),
        "F11" => Ok(Code::F11),
        "F12" => Ok(Code::F12),
        "F13" => Ok(Code::F13),
        "F14" => Ok(Code::F14),
        "F15" => Ok(Code::F15),
        "F16" => Ok(Code::F16),
        "F17" => Ok(Code::F17),
        "F18" => Ok(Code::F18),
        "F19" => Ok(Code::F19),
        "F20" => Ok(Code::F20),
        "F21" => Ok(Code::F21),
        "F22" => Ok(Code::F22),
        "F23" => Ok(Code::F23),
        "F24" => Ok(Code::F24),
        "Pause" => Ok(Code::Pause),
        _ => Err(anyhow!("unsupported key: {}", key)),
    }
}
