//! Key-binding parsing and modifier tracking.
//!
//! A binding is one key plus zero or more modifiers that must be held with
//! it.  [`BindingTracker`] turns the raw stream of key presses and releases
//! into push-to-talk events for that binding.

use rdev::Key;

use super::{HotkeyError, HotkeyEvent};

// ---------------------------------------------------------------------------
// Modifier
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Modifier {
    Ctrl,
    Shift,
    Alt,
    Meta,
}

impl Modifier {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "ctrl" | "control" => Some(Modifier::Ctrl),
            "shift" => Some(Modifier::Shift),
            "alt" | "option" => Some(Modifier::Alt),
            "meta" | "super" | "cmd" | "command" | "win" => Some(Modifier::Meta),
            _ => None,
        }
    }

    /// The modifier `key` belongs to, either side.
    pub fn of(key: Key) -> Option<Self> {
        match key {
            Key::ControlLeft | Key::ControlRight => Some(Modifier::Ctrl),
            Key::ShiftLeft | Key::ShiftRight => Some(Modifier::Shift),
            Key::Alt | Key::AltGr => Some(Modifier::Alt),
            Key::MetaLeft | Key::MetaRight => Some(Modifier::Meta),
            _ => None,
        }
    }

    fn bit(self) -> u8 {
        match self {
            Modifier::Ctrl => 1,
            Modifier::Shift => 2,
            Modifier::Alt => 4,
            Modifier::Meta => 8,
        }
    }
}

// ---------------------------------------------------------------------------
// parse_key / parse_binding
// ---------------------------------------------------------------------------

/// Parse a key name from config into an [`rdev::Key`].
///
/// Function keys, common named keys, letters and digits; case-insensitive.
///
/// ```
/// use edge_voice_client::hotkey::parse_key;
///
/// assert_eq!(parse_key("F9"), Some(rdev::Key::F9));
/// assert_eq!(parse_key("space"), Some(rdev::Key::Space));
/// assert_eq!(parse_key("q"), Some(rdev::Key::KeyQ));
/// assert_eq!(parse_key("Ctrl+V"), None);
/// ```
pub fn parse_key(name: &str) -> Option<Key> {
    let upper = name.trim().to_ascii_uppercase();

    if let Some(n) = upper.strip_prefix('F').and_then(|n| n.parse::<u8>().ok()) {
        return function_key(n);
    }

    let mut chars = upper.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        return char_key(c);
    }

    match upper.as_str() {
        "ESCAPE" | "ESC" => Some(Key::Escape),
        "SPACE" => Some(Key::Space),
        "RETURN" | "ENTER" => Some(Key::Return),
        "TAB" => Some(Key::Tab),
        "BACKSPACE" => Some(Key::Backspace),
        "DELETE" | "DEL" => Some(Key::Delete),
        "INSERT" | "INS" => Some(Key::Insert),
        "HOME" => Some(Key::Home),
        "END" => Some(Key::End),
        "PAGEUP" => Some(Key::PageUp),
        "PAGEDOWN" => Some(Key::PageDown),
        "UP" | "UPARROW" => Some(Key::UpArrow),
        "DOWN" | "DOWNARROW" => Some(Key::DownArrow),
        "LEFT" | "LEFTARROW" => Some(Key::LeftArrow),
        "RIGHT" | "RIGHTARROW" => Some(Key::RightArrow),
        "CAPSLOCK" => Some(Key::CapsLock),
        "SCROLLLOCK" => Some(Key::ScrollLock),
        "PRINTSCREEN" => Some(Key::PrintScreen),
        "PAUSE" => Some(Key::Pause),
        _ => None,
    }
}

fn function_key(n: u8) -> Option<Key> {
    const KEYS: [Key; 12] = [
        Key::F1,
        Key::F2,
        Key::F3,
        Key::F4,
        Key::F5,
        Key::F6,
        Key::F7,
        Key::F8,
        Key::F9,
        Key::F10,
        Key::F11,
        Key::F12,
    ];
    KEYS.get(usize::from(n).checked_sub(1)?).copied()
}

fn char_key(c: char) -> Option<Key> {
    let key = match c {
        'A' => Key::KeyA,
        'B' => Key::KeyB,
        'C' => Key::KeyC,
        'D' => Key::KeyD,
        'E' => Key::KeyE,
        'F' => Key::KeyF,
        'G' => Key::KeyG,
        'H' => Key::KeyH,
        'I' => Key::KeyI,
        'J' => Key::KeyJ,
        'K' => Key::KeyK,
        'L' => Key::KeyL,
        'M' => Key::KeyM,
        'N' => Key::KeyN,
        'O' => Key::KeyO,
        'P' => Key::KeyP,
        'Q' => Key::KeyQ,
        'R' => Key::KeyR,
        'S' => Key::KeyS,
        'T' => Key::KeyT,
        'U' => Key::KeyU,
        'V' => Key::KeyV,
        'W' => Key::KeyW,
        'X' => Key::KeyX,
        'Y' => Key::KeyY,
        'Z' => Key::KeyZ,
        '0' => Key::Num0,
        '1' => Key::Num1,
        '2' => Key::Num2,
        '3' => Key::Num3,
        '4' => Key::Num4,
        '5' => Key::Num5,
        '6' => Key::Num6,
        '7' => Key::Num7,
        '8' => Key::Num8,
        '9' => Key::Num9,
        _ => return None,
    };
    Some(key)
}

#[derive(Debug, Clone, PartialEq)]
pub struct HotkeyBinding {
    pub key: Key,
    pub modifiers: Vec<Modifier>,
}

/// Build a binding from the configured key name and modifier names.
pub fn parse_binding(key: &str, modifiers: &[String]) -> Result<HotkeyBinding, HotkeyError> {
    let key = parse_key(key).ok_or_else(|| HotkeyError::UnknownKey(key.to_string()))?;
    let mut parsed = Vec::with_capacity(modifiers.len());
    for name in modifiers {
        let m = Modifier::parse(name).ok_or_else(|| HotkeyError::UnknownModifier(name.clone()))?;
        if !parsed.contains(&m) {
            parsed.push(m);
        }
    }
    Ok(HotkeyBinding {
        key,
        modifiers: parsed,
    })
}

// ---------------------------------------------------------------------------
// BindingTracker
// ---------------------------------------------------------------------------

/// Feeds on raw key presses/releases, emits push-to-talk events.
///
/// A press of the bound key counts only while every required modifier is
/// held.  Auto-repeat presses are swallowed, and a release is emitted only
/// for a press that was emitted, even if a modifier was let go first.
#[derive(Debug)]
pub struct BindingTracker {
    binding: HotkeyBinding,
    required: u8,
    held: u8,
    active: bool,
}

impl BindingTracker {
    pub fn new(binding: HotkeyBinding) -> Self {
        let required = binding.modifiers.iter().fold(0, |acc, m| acc | m.bit());
        Self {
            binding,
            required,
            held: 0,
            active: false,
        }
    }

    pub fn on_press(&mut self, key: Key) -> Option<HotkeyEvent> {
        if let Some(m) = Modifier::of(key) {
            self.held |= m.bit();
        }
        if key != self.binding.key || self.active {
            return None;
        }
        if self.held & self.required != self.required {
            return None;
        }
        self.active = true;
        Some(HotkeyEvent::PushToTalkPressed)
    }

    pub fn on_release(&mut self, key: Key) -> Option<HotkeyEvent> {
        if let Some(m) = Modifier::of(key) {
            self.held &= !m.bit();
        }
        if key == self.binding.key && self.active {
            self.active = false;
            return Some(HotkeyEvent::PushToTalkReleased);
        }
        None
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
