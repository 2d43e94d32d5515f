//! Hotkey combo parsing.
//!
//! Combos are written the way the settings file stores them: modifiers and
//! one key joined with `+`, e.g. `Alt+9` or `Ctrl+Shift+O`. Key names are
//! normalised to upper case so input hooks can compare them directly.

use crate::error::{AppError, Result};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Modifiers {
    pub ctrl: bool,
    pub alt: bool,
    pub shift: bool,
    pub meta: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hotkey {
    pub modifiers: Modifiers,
    pub key: String,
}

impl Hotkey {
    /// Whether a key press with the given held modifiers triggers this hotkey.
    pub fn matches(&self, held: Modifiers, key: &str) -> bool {
        self.modifiers == held && self.key.eq_ignore_ascii_case(key)
    }
}

impl FromStr for Hotkey {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        let mut modifiers = Modifiers::default();
        let mut key = None;

        for part in s.split('+').map(str::trim) {
            match part.to_ascii_lowercase().as_str() {
                "" => return Err(AppError::config(format!("empty key in shortcut '{}'", s))),
                "ctrl" | "control" | "commandorcontrol" | "cmdorctrl" => modifiers.ctrl = true,
                "alt" | "option" => modifiers.alt = true,
                "shift" => modifiers.shift = true,
                "super" | "meta" | "cmd" | "command" | "win" => modifiers.meta = true,
                _ => {
                    if key.is_some() {
                        return Err(AppError::config(format!(
                            "shortcut '{}' names more than one key",
                            s
                        )));
                    }
                    key = Some(part.to_ascii_uppercase());
                }
            }
        }

        let key = key.ok_or_else(|| AppError::config(format!("shortcut '{}' has no key", s)))?;
        Ok(Hotkey { modifiers, key })
    }
}

impl fmt::Display for Hotkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = self.modifiers;
        for (held, name) in [(m.ctrl, "Ctrl"), (m.alt, "Alt"), (m.shift, "Shift"), (m.meta, "Super")] {
            if held {
                write!(f, "{}+", name)?;
            }
        }
        f.write_str(&self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_modifiers_and_key() {
        let hk: Hotkey = "Ctrl+Shift+o".parse().unwrap();
        assert!(hk.modifiers.ctrl && hk.modifiers.shift && !hk.modifiers.alt);
        assert_eq!(hk.key, "O");
        assert_eq!(hk.to_string(), "Ctrl+Shift+O");
    }

    #[test]
    fn matching_requires_exact_modifiers() {
        let hk: Hotkey = "Alt+9".parse().unwrap();
        let alt = Modifiers { alt: true, ..Default::default() };
        assert!(hk.matches(alt, "9"));
        assert!(!hk.matches(Modifiers { shift: true, ..alt }, "9"));
        assert!(!hk.matches(alt, "8"));
    }

    #[test]
    fn rejects_malformed_combos() {
        assert!("Alt+".parse::<Hotkey>().is_err());
        assert!("Ctrl+Shift".parse::<Hotkey>().is_err());
        assert!("A+B".parse::<Hotkey>().is_err());
    }
}
