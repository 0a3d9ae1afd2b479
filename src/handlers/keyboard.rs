use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use crate::app::App;
use crate::suggest::MAX_SUGGESTIONS;

/// Action returned from key handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Continue,
    Quit,
}

/// Keys the multiplexer keeps for itself instead of sending to the shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    NewTab,
    CloseTab,
    NextTab,
    PrevTab,
    Quit,
    /// Zero-based suggestion index.
    AcceptSuggestion(usize),
}

pub fn binding_for(key: KeyEvent) -> Option<Binding> {
    match (key.code, key.modifiers) {
        (KeyCode::Char('t'), KeyModifiers::CONTROL) => Some(Binding::NewTab),
        (KeyCode::Char('w'), KeyModifiers::CONTROL) => Some(Binding::CloseTab),
        (KeyCode::Char('q'), KeyModifiers::CONTROL) => Some(Binding::Quit),
        (KeyCode::Right, KeyModifiers::ALT) => Some(Binding::NextTab),
        (KeyCode::Left, KeyModifiers::ALT) => Some(Binding::PrevTab),
        (KeyCode::Char(c @ '1'..='9'), KeyModifiers::ALT) => {
            let index = (c as usize) - ('1' as usize);
            (index < MAX_SUGGESTIONS).then_some(Binding::AcceptSuggestion(index))
        }
        _ => None,
    }
}

pub fn handle_key_event(app: &mut App, key: KeyEvent) -> KeyAction {
    if key.kind == KeyEventKind::Release {
        return KeyAction::Continue;
    }

    match binding_for(key) {
        Some(Binding::NewTab) => {
            app.open_tab();
        }
        Some(Binding::CloseTab) => app.close_active_tab(),
        Some(Binding::NextTab) => app.next_tab(),
        Some(Binding::PrevTab) => app.prev_tab(),
        Some(Binding::Quit) => return KeyAction::Quit,
        Some(Binding::AcceptSuggestion(index)) => {
            app.accept_suggestion(index);
        }
        None => {
            let bytes = key_to_bytes(key);
            if !bytes.is_empty() {
                app.write_active(&bytes);
            }
        }
    }
    KeyAction::Continue
}

pub fn key_to_bytes(key: KeyEvent) -> Vec<u8> {
    let alt = key.modifiers.contains(KeyModifiers::ALT);
    let mut bytes = match (key.code, key.modifiers.difference(KeyModifiers::ALT)) {
        (KeyCode::Char(c), KeyModifiers::CONTROL) if c.is_ascii_alphabetic() => {
            // Control characters: Ctrl+A = 0x01, Ctrl+B = 0x02, etc.
            vec![(c.to_ascii_lowercase() as u8) - b'a' + 1]
        }
        (KeyCode::Char(' '), KeyModifiers::CONTROL) => vec![0x00],
        (KeyCode::Char(c), m) if !m.contains(KeyModifiers::CONTROL) => {
            let mut buf = [0u8; 4];
            c.encode_utf8(&mut buf).as_bytes().to_vec()
        }
        (KeyCode::Enter, _) => vec![b'\r'],
        (KeyCode::Backspace, _) => vec![0x7f],
        (KeyCode::Tab, _) => vec![b'\t'],
        (KeyCode::BackTab, _) => b"\x1b[Z".to_vec(),
        (KeyCode::Esc, _) => vec![0x1b],
        (KeyCode::Up, _) => b"\x1b[A".to_vec(),
        (KeyCode::Down, _) => b"\x1b[B".to_vec(),
        (KeyCode::Right, _) => b"\x1b[C".to_vec(),
        (KeyCode::Left, _) => b"\x1b[D".to_vec(),
        (KeyCode::Home, _) => b"\x1b[H".to_vec(),
        (KeyCode::End, _) => b"\x1b[F".to_vec(),
        (KeyCode::PageUp, _) => b"\x1b[5~".to_vec(),
        (KeyCode::PageDown, _) => b"\x1b[6~".to_vec(),
        (KeyCode::Delete, _) => b"\x1b[3~".to_vec(),
        _ => vec![],
    };

    // Meta prefix
    if alt && !bytes.is_empty() {
        bytes.insert(0, 0x1b);
    }
    bytes
}
