//! Physical key translation.
//!
//! Scancodes are mapped to layout-independent [`Key`]s through the XKB key names of the keyboard
//! (`AE01`, `TLDE`, ...), which describe the position of a key rather than its symbol. Keys without a
//! recognized name fall back to the symbols of the core keyboard mapping.

use std::collections::HashMap;

use tracing::{debug, trace};
use x11rb::{
    connection::Connection,
    protocol::{
        xkb::{self, ConnectionExt as _},
        xproto::ConnectionExt as _,
    },
};
use xkbcommon::xkb::{keysyms::*, Keysym};

use super::X11Error;
use crate::backend::input::Modifiers;

/// A logical key, named after its position on a US keyboard.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Space,
    Apostrophe,
    Comma,
    Minus,
    Period,
    Slash,
    Num0,
    Num1,
    Num2,
    Num3,
    Num4,
    Num5,
    Num6,
    Num7,
    Num8,
    Num9,
    Semicolon,
    Equal,
    A,
    B,
    C,
    D,
    E,
    F,
    G,
    H,
    I,
    J,
    K,
    L,
    M,
    N,
    O,
    P,
    Q,
    R,
    S,
    T,
    U,
    V,
    W,
    X,
    Y,
    Z,
    LeftBracket,
    Backslash,
    RightBracket,
    GraveAccent,
    /// The key between left shift and `Z` on ISO keyboards.
    World1,
    Escape,
    Enter,
    Tab,
    Backspace,
    Insert,
    Delete,
    Right,
    Left,
    Down,
    Up,
    PageUp,
    PageDown,
    Home,
    End,
    CapsLock,
    ScrollLock,
    NumLock,
    PrintScreen,
    Pause,
    F1,
    F2,
    F3,
    F4,
    F5,
    F6,
    F7,
    F8,
    F9,
    F10,
    F11,
    F12,
    F13,
    F14,
    F15,
    F16,
    F17,
    F18,
    F19,
    F20,
    F21,
    F22,
    F23,
    F24,
    F25,
    Kp0,
    Kp1,
    Kp2,
    Kp3,
    Kp4,
    Kp5,
    Kp6,
    Kp7,
    Kp8,
    Kp9,
    KpDecimal,
    KpDivide,
    KpMultiply,
    KpSubtract,
    KpAdd,
    KpEnter,
    KpEqual,
    LeftShift,
    LeftControl,
    LeftAlt,
    LeftSuper,
    RightShift,
    RightControl,
    RightAlt,
    RightSuper,
    Menu,
}

const DIGITS: [Key; 10] = [
    Key::Num0,
    Key::Num1,
    Key::Num2,
    Key::Num3,
    Key::Num4,
    Key::Num5,
    Key::Num6,
    Key::Num7,
    Key::Num8,
    Key::Num9,
];

const KEYPAD_DIGITS: [Key; 10] = [
    Key::Kp0,
    Key::Kp1,
    Key::Kp2,
    Key::Kp3,
    Key::Kp4,
    Key::Kp5,
    Key::Kp6,
    Key::Kp7,
    Key::Kp8,
    Key::Kp9,
];

const LETTERS: [Key; 26] = [
    Key::A,
    Key::B,
    Key::C,
    Key::D,
    Key::E,
    Key::F,
    Key::G,
    Key::H,
    Key::I,
    Key::J,
    Key::K,
    Key::L,
    Key::M,
    Key::N,
    Key::O,
    Key::P,
    Key::Q,
    Key::R,
    Key::S,
    Key::T,
    Key::U,
    Key::V,
    Key::W,
    Key::X,
    Key::Y,
    Key::Z,
];

const FUNCTION_KEYS: [Key; 25] = [
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
    Key::F13,
    Key::F14,
    Key::F15,
    Key::F16,
    Key::F17,
    Key::F18,
    Key::F19,
    Key::F20,
    Key::F21,
    Key::F22,
    Key::F23,
    Key::F24,
    Key::F25,
];

/// XKB key names. Function keys are named here too, since their keysyms are often remapped.
const KEY_NAMES: &[(&[u8], Key)] = &[
    (b"TLDE", Key::GraveAccent),
    (b"AE01", Key::Num1),
    (b"AE02", Key::Num2),
    (b"AE03", Key::Num3),
    (b"AE04", Key::Num4),
    (b"AE05", Key::Num5),
    (b"AE06", Key::Num6),
    (b"AE07", Key::Num7),
    (b"AE08", Key::Num8),
    (b"AE09", Key::Num9),
    (b"AE10", Key::Num0),
    (b"AE11", Key::Minus),
    (b"AE12", Key::Equal),
    (b"AD01", Key::Q),
    (b"AD02", Key::W),
    (b"AD03", Key::E),
    (b"AD04", Key::R),
    (b"AD05", Key::T),
    (b"AD06", Key::Y),
    (b"AD07", Key::U),
    (b"AD08", Key::I),
    (b"AD09", Key::O),
    (b"AD10", Key::P),
    (b"AD11", Key::LeftBracket),
    (b"AD12", Key::RightBracket),
    (b"AC01", Key::A),
    (b"AC02", Key::S),
    (b"AC03", Key::D),
    (b"AC04", Key::F),
    (b"AC05", Key::G),
    (b"AC06", Key::H),
    (b"AC07", Key::J),
    (b"AC08", Key::K),
    (b"AC09", Key::L),
    (b"AC10", Key::Semicolon),
    (b"AC11", Key::Apostrophe),
    (b"AB01", Key::Z),
    (b"AB02", Key::X),
    (b"AB03", Key::C),
    (b"AB04", Key::V),
    (b"AB05", Key::B),
    (b"AB06", Key::N),
    (b"AB07", Key::M),
    (b"AB08", Key::Comma),
    (b"AB09", Key::Period),
    (b"AB10", Key::Slash),
    (b"BKSL", Key::Backslash),
    (b"LSGT", Key::World1),
    (b"SPCE", Key::Space),
    (b"ESC", Key::Escape),
    (b"RTRN", Key::Enter),
    (b"TAB", Key::Tab),
    (b"BKSP", Key::Backspace),
    (b"INS", Key::Insert),
    (b"DELE", Key::Delete),
    (b"RGHT", Key::Right),
    (b"LEFT", Key::Left),
    (b"DOWN", Key::Down),
    (b"UP", Key::Up),
    (b"PGUP", Key::PageUp),
    (b"PGDN", Key::PageDown),
    (b"HOME", Key::Home),
    (b"END", Key::End),
    (b"CAPS", Key::CapsLock),
    (b"SCLK", Key::ScrollLock),
    (b"NMLK", Key::NumLock),
    (b"PRSC", Key::PrintScreen),
    (b"PAUS", Key::Pause),
    (b"FK01", Key::F1),
    (b"FK02", Key::F2),
    (b"FK03", Key::F3),
    (b"FK04", Key::F4),
    (b"FK05", Key::F5),
    (b"FK06", Key::F6),
    (b"FK07", Key::F7),
    (b"FK08", Key::F8),
    (b"FK09", Key::F9),
    (b"FK10", Key::F10),
    (b"FK11", Key::F11),
    (b"FK12", Key::F12),
    (b"FK13", Key::F13),
    (b"FK14", Key::F14),
    (b"FK15", Key::F15),
    (b"FK16", Key::F16),
    (b"FK17", Key::F17),
    (b"FK18", Key::F18),
    (b"FK19", Key::F19),
    (b"FK20", Key::F20),
    (b"FK21", Key::F21),
    (b"FK22", Key::F22),
    (b"FK23", Key::F23),
    (b"FK24", Key::F24),
    (b"FK25", Key::F25),
    (b"KP0", Key::Kp0),
    (b"KP1", Key::Kp1),
    (b"KP2", Key::Kp2),
    (b"KP3", Key::Kp3),
    (b"KP4", Key::Kp4),
    (b"KP5", Key::Kp5),
    (b"KP6", Key::Kp6),
    (b"KP7", Key::Kp7),
    (b"KP8", Key::Kp8),
    (b"KP9", Key::Kp9),
    (b"KPDL", Key::KpDecimal),
    (b"KPDV", Key::KpDivide),
    (b"KPMU", Key::KpMultiply),
    (b"KPSU", Key::KpSubtract),
    (b"KPAD", Key::KpAdd),
    (b"KPEN", Key::KpEnter),
    (b"KPEQ", Key::KpEqual),
    (b"LFSH", Key::LeftShift),
    (b"LCTL", Key::LeftControl),
    (b"LALT", Key::LeftAlt),
    (b"LWIN", Key::LeftSuper),
    (b"RTSH", Key::RightShift),
    (b"RCTL", Key::RightControl),
    (b"RALT", Key::RightAlt),
    (b"LVL3", Key::RightAlt),
    (b"MDSW", Key::RightAlt),
    (b"RWIN", Key::RightSuper),
    (b"COMP", Key::Menu),
    (b"MENU", Key::Menu),
];

/// XKB names are padded with NUL bytes up to four characters.
fn trim_name(name: &[u8; 4]) -> &[u8] {
    let len = name.iter().position(|&b| b == 0).unwrap_or(name.len());
    &name[..len]
}

fn key_for_name(name: &[u8; 4]) -> Option<Key> {
    let name = trim_name(name);
    KEY_NAMES
        .iter()
        .find(|(known, _)| *known == name)
        .map(|(_, key)| *key)
}

/// Maps the symbols of a key to a logical key, for keys without a known XKB name.
///
/// `shifted` is the symbol on the second level; it is only consulted for keypad keys, whose first
/// level changes with num lock.
pub fn translate_keysyms(base: u32, shifted: Option<u32>) -> Option<Key> {
    if let Some(shifted) = shifted {
        match shifted {
            KEY_KP_0..=KEY_KP_9 => return Some(KEYPAD_DIGITS[(shifted - KEY_KP_0) as usize]),
            KEY_KP_Separator | KEY_KP_Decimal => return Some(Key::KpDecimal),
            KEY_KP_Equal => return Some(Key::KpEqual),
            KEY_KP_Enter => return Some(Key::KpEnter),
            _ => {}
        }
    }

    let key = match base {
        KEY_Escape => Key::Escape,
        KEY_Tab => Key::Tab,
        KEY_Shift_L => Key::LeftShift,
        KEY_Shift_R => Key::RightShift,
        KEY_Control_L => Key::LeftControl,
        KEY_Control_R => Key::RightControl,
        KEY_Meta_L | KEY_Alt_L => Key::LeftAlt,
        KEY_Mode_switch | KEY_ISO_Level3_Shift | KEY_Meta_R | KEY_Alt_R => Key::RightAlt,
        KEY_Super_L => Key::LeftSuper,
        KEY_Super_R => Key::RightSuper,
        KEY_Menu => Key::Menu,
        KEY_Num_Lock => Key::NumLock,
        KEY_Caps_Lock => Key::CapsLock,
        KEY_Print => Key::PrintScreen,
        KEY_Scroll_Lock => Key::ScrollLock,
        KEY_Pause => Key::Pause,
        KEY_Delete => Key::Delete,
        KEY_BackSpace => Key::Backspace,
        KEY_Return => Key::Enter,
        KEY_Home => Key::Home,
        KEY_End => Key::End,
        KEY_Page_Up => Key::PageUp,
        KEY_Page_Down => Key::PageDown,
        KEY_Insert => Key::Insert,
        KEY_Left => Key::Left,
        KEY_Right => Key::Right,
        KEY_Down => Key::Down,
        KEY_Up => Key::Up,
        KEY_F1..=KEY_F25 => FUNCTION_KEYS[(base - KEY_F1) as usize],

        // Keypad keys without num lock; the shifted level was handled above.
        KEY_KP_Divide => Key::KpDivide,
        KEY_KP_Multiply => Key::KpMultiply,
        KEY_KP_Subtract => Key::KpSubtract,
        KEY_KP_Add => Key::KpAdd,
        KEY_KP_Insert => Key::Kp0,
        KEY_KP_End => Key::Kp1,
        KEY_KP_Down => Key::Kp2,
        KEY_KP_Page_Down => Key::Kp3,
        KEY_KP_Left => Key::Kp4,
        KEY_KP_Right => Key::Kp6,
        KEY_KP_Home => Key::Kp7,
        KEY_KP_Up => Key::Kp8,
        KEY_KP_Page_Up => Key::Kp9,
        KEY_KP_Delete => Key::KpDecimal,
        KEY_KP_Equal => Key::KpEqual,
        KEY_KP_Enter => Key::KpEnter,

        KEY_a..=KEY_z => LETTERS[(base - KEY_a) as usize],
        KEY_0..=KEY_9 => DIGITS[(base - KEY_0) as usize],
        KEY_space => Key::Space,
        KEY_minus => Key::Minus,
        KEY_equal => Key::Equal,
        KEY_bracketleft => Key::LeftBracket,
        KEY_bracketright => Key::RightBracket,
        KEY_backslash => Key::Backslash,
        KEY_semicolon => Key::Semicolon,
        KEY_apostrophe => Key::Apostrophe,
        KEY_grave => Key::GraveAccent,
        KEY_comma => Key::Comma,
        KEY_period => Key::Period,
        KEY_slash => Key::Slash,
        KEY_less => Key::World1,
        _ => return None,
    };
    Some(key)
}

/// The core keyboard mapping: keysyms per scancode, two levels per group.
#[derive(Debug, Default, Clone)]
pub struct CoreKeymap {
    min_keycode: u8,
    keysyms_per_keycode: u8,
    keysyms: Vec<u32>,
}

impl CoreKeymap {
    /// Wraps a `GetKeyboardMapping` reply starting at `min_keycode`.
    pub fn new(min_keycode: u8, keysyms_per_keycode: u8, keysyms: Vec<u32>) -> CoreKeymap {
        CoreKeymap {
            min_keycode,
            keysyms_per_keycode,
            keysyms,
        }
    }

    /// The keysym of a scancode at a shift level of a group, `0` (NoSymbol) if unbound.
    pub fn keysym(&self, scancode: u8, group: u8, level: u8) -> u32 {
        let per = self.keysyms_per_keycode as usize;
        if per == 0 || scancode < self.min_keycode {
            return 0;
        }
        let row = (scancode - self.min_keycode) as usize * per;
        let lookup = |column: usize| -> u32 {
            if column < per {
                self.keysyms.get(row + column).copied().unwrap_or(0)
            } else {
                0
            }
        };

        let level = level.min(1) as usize;
        match lookup(group as usize * 2 + level) {
            // Groups without symbols repeat the first group.
            0 if group != 0 => lookup(level),
            // A single symbol on a group applies to both levels.
            0 if level == 1 => lookup(group as usize * 2),
            keysym => keysym,
        }
    }

    /// The printable character a key press produces, if any.
    pub fn text(&self, scancode: u8, group: u8, mods: Modifiers) -> Option<char> {
        let shift = mods.contains(Modifiers::SHIFT);
        let mut level = u8::from(shift);

        // Num lock selects the digit level of keypad keys.
        let shifted = self.keysym(scancode, group, 1);
        if mods.contains(Modifiers::NUM_LOCK) && (KEY_KP_Space..=KEY_KP_9).contains(&shifted) {
            level = u8::from(!shift);
        }

        let ch = Keysym::new(self.keysym(scancode, group, level)).key_char()?;
        if ch.is_control() {
            return None;
        }

        if mods.contains(Modifiers::CAPS_LOCK) && ch.is_alphabetic() {
            let flipped = if shift {
                ch.to_lowercase().next()
            } else {
                ch.to_uppercase().next()
            };
            return flipped.or(Some(ch));
        }
        Some(ch)
    }
}

/// Bidirectional scancode and logical key table.
///
/// Every key is assigned to at most one scancode; the first scancode wins. This keeps
/// [`KeyTable::scancode`] the inverse of [`KeyTable::key`] on every mapped scancode.
#[derive(Debug, Clone)]
pub struct KeyTable {
    keys: [Option<Key>; 256],
    scancodes: HashMap<Key, u8>,
}

impl Default for KeyTable {
    fn default() -> Self {
        KeyTable {
            keys: [None; 256],
            scancodes: HashMap::new(),
        }
    }
}

impl KeyTable {
    /// Builds the table from XKB key names, their aliases and the core keymap.
    ///
    /// `names` pairs scancodes with their XKB name, `aliases` pairs an alias with the real name it
    /// stands for. Scancodes whose name is unknown fall back to their keysyms.
    pub fn build(names: &[(u8, [u8; 4])], aliases: &[([u8; 4], [u8; 4])], keymap: &CoreKeymap) -> KeyTable {
        let mut table = KeyTable::default();

        for &(scancode, ref name) in names {
            let key = key_for_name(name).or_else(|| {
                aliases
                    .iter()
                    .filter(|(_, real)| trim_name(real) == trim_name(name))
                    .find_map(|(alias, _)| key_for_name(alias))
            });
            if let Some(key) = key {
                table.insert(scancode, key);
            }
        }

        for scancode in keymap.min_keycode..=u8::MAX {
            if table.keys[scancode as usize].is_some() {
                continue;
            }
            let base = keymap.keysym(scancode, 0, 0);
            if base == 0 {
                continue;
            }
            let shifted = Some(keymap.keysym(scancode, 0, 1)).filter(|&sym| sym != 0);
            if let Some(key) = translate_keysyms(base, shifted) {
                table.insert(scancode, key);
            }
        }

        debug!(mapped = table.scancodes.len(), "Built key table");
        table
    }

    fn insert(&mut self, scancode: u8, key: Key) {
        if self.scancodes.contains_key(&key) {
            trace!(scancode, ?key, "Key already mapped to another scancode");
            return;
        }
        self.keys[scancode as usize] = Some(key);
        self.scancodes.insert(key, scancode);
    }

    /// The logical key of a scancode.
    pub fn key(&self, scancode: u8) -> Option<Key> {
        self.keys[scancode as usize]
    }

    /// The scancode of a logical key.
    pub fn scancode(&self, key: Key) -> Option<u8> {
        self.scancodes.get(&key).copied()
    }

    /// Iterates over every mapped scancode with its key.
    pub fn iter(&self) -> impl Iterator<Item = (u8, Key)> + '_ {
        self.keys
            .iter()
            .enumerate()
            .filter_map(|(scancode, key)| key.map(|key| (scancode as u8, key)))
    }
}

/// Keyboard state tracked by the backend.
#[derive(Debug, Default)]
pub(crate) struct KeyboardState {
    pub table: KeyTable,
    pub keymap: CoreKeymap,
    /// The active XKB group.
    pub group: u8,
    /// Whether the server reports auto-repeat as presses only.
    pub detectable_repeat: bool,
}

impl KeyboardState {
    /// Queries the key names and core keymap from the server and rebuilds the tables.
    pub fn reload<C: Connection>(&mut self, conn: &C, xkb_available: bool) -> Result<(), X11Error> {
        let setup = conn.setup();
        let (min, max) = (setup.min_keycode, setup.max_keycode);
        let mapping = conn
            .get_keyboard_mapping(min, max - min + 1)?
            .reply()?;
        self.keymap = CoreKeymap::new(min, mapping.keysyms_per_keycode, mapping.keysyms);

        let (names, aliases) = if xkb_available {
            fetch_key_names(conn)?
        } else {
            (Vec::new(), Vec::new())
        };
        self.table = KeyTable::build(&names, &aliases, &self.keymap);
        Ok(())
    }

    /// The UTF-8 name of the symbol a scancode produces in the current group.
    pub fn scancode_name(&self, scancode: i32) -> Result<Option<String>, X11Error> {
        let scancode = u8::try_from(scancode).map_err(|_| X11Error::InvalidScancode(scancode))?;
        if self.table.key(scancode).is_none() {
            return Ok(None);
        }

        let keysym = self.keymap.keysym(scancode, self.group, 0);
        if keysym == 0 {
            return Ok(None);
        }
        Ok(Keysym::new(keysym)
            .key_char()
            .filter(|ch| !ch.is_control())
            .map(String::from))
    }
}

type KeyNames = (Vec<(u8, [u8; 4])>, Vec<([u8; 4], [u8; 4])>);

fn fetch_key_names<C: Connection>(conn: &C) -> Result<KeyNames, X11Error> {
    let reply = conn
        .xkb_get_names(
            xkb::ID::USE_CORE_KBD.into(),
            xkb::NameDetail::KEY_NAMES | xkb::NameDetail::KEY_ALIASES,
        )?
        .reply()?;

    let names = reply
        .value_list
        .key_names
        .unwrap_or_default()
        .into_iter()
        .enumerate()
        .filter_map(|(i, key)| {
            let scancode = u8::try_from(usize::from(reply.first_key) + i).ok()?;
            Some((scancode, key.name))
        })
        .collect();
    let aliases = reply
        .value_list
        .key_aliases
        .unwrap_or_default()
        .into_iter()
        .map(|alias| (alias.alias, alias.real))
        .collect();
    Ok((names, aliases))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> [u8; 4] {
        let mut raw = [0; 4];
        raw[..s.len()].copy_from_slice(s.as_bytes());
        raw
    }

    /// A small US keymap starting at scancode 8, two keysyms per key.
    fn keymap() -> CoreKeymap {
        let mut keysyms = vec![0; (255 - 8 + 1) * 2];
        let mut bind = |scancode: usize, base: u32, shifted: u32| {
            keysyms[(scancode - 8) * 2] = base;
            keysyms[(scancode - 8) * 2 + 1] = shifted;
        };
        bind(9, KEY_Escape, 0);
        bind(10, KEY_1, KEY_exclam);
        bind(24, KEY_q, KEY_Q);
        bind(38, KEY_a, KEY_A);
        bind(79, KEY_KP_Home, KEY_KP_7);
        bind(87, KEY_KP_End, KEY_KP_1);
        bind(111, KEY_Up, 0);
        bind(200, KEY_F13, 0);
        CoreKeymap::new(8, 2, keysyms)
    }

    #[test]
    fn names_take_precedence_over_keysyms() {
        // scancode 24 is named AC01 (A) even though its keysym is q
        let table = KeyTable::build(&[(24, name("AC01"))], &[], &keymap());
        assert_eq!(table.key(24), Some(Key::A));
        // the keysym of 38 would be A as well, but the key is taken
        assert_eq!(table.key(38), None);
        assert_eq!(table.scancode(Key::A), Some(24));
    }

    #[test]
    fn aliases_resolve_to_known_names() {
        let aliases = [(name("LVL3"), name("ISO3")), (name("AB11"), name("LSGT"))];
        let table = KeyTable::build(&[(92, name("ISO3")), (94, name("LSGT"))], &aliases, &CoreKeymap::default());
        assert_eq!(table.key(92), Some(Key::RightAlt));
        assert_eq!(table.key(94), Some(Key::World1));
    }

    #[test]
    fn keysym_fallback() {
        let table = KeyTable::build(&[], &[], &keymap());
        assert_eq!(table.key(9), Some(Key::Escape));
        assert_eq!(table.key(10), Some(Key::Num1));
        assert_eq!(table.key(24), Some(Key::Q));
        assert_eq!(table.key(111), Some(Key::Up));
        assert_eq!(table.key(200), Some(Key::F13));
        // keypad keys are recognized by their num lock level
        assert_eq!(table.key(79), Some(Key::Kp7));
        assert_eq!(table.key(87), Some(Key::Kp1));
        assert_eq!(table.key(100), None);
    }

    #[test]
    fn table_is_a_bijection() {
        let names = [
            (9, name("ESC")),
            (10, name("AE01")),
            (24, name("AD01")),
            (38, name("AC01")),
            (49, name("TLDE")),
            (65, name("SPCE")),
            (108, name("RALT")),
            (92, name("LVL3")),
            (135, name("COMP")),
        ];
        let table = KeyTable::build(&names, &[], &keymap());
        assert!(table.iter().count() > 0);
        for (scancode, key) in table.iter() {
            assert_eq!(table.scancode(key), Some(scancode), "{:?}", key);
        }
        // RALT and LVL3 share a key; only the first scancode keeps it
        assert_eq!(table.key(108), Some(Key::RightAlt));
        assert_eq!(table.key(92), None);
    }

    #[test]
    fn text_follows_shift_and_caps_lock() {
        let keymap = keymap();
        assert_eq!(keymap.text(38, 0, Modifiers::empty()), Some('a'));
        assert_eq!(keymap.text(38, 0, Modifiers::SHIFT), Some('A'));
        assert_eq!(keymap.text(38, 0, Modifiers::CAPS_LOCK), Some('A'));
        assert_eq!(keymap.text(38, 0, Modifiers::CAPS_LOCK | Modifiers::SHIFT), Some('a'));
        assert_eq!(keymap.text(10, 0, Modifiers::SHIFT), Some('!'));
        assert_eq!(keymap.text(10, 0, Modifiers::CAPS_LOCK), Some('1'));
        assert_eq!(keymap.text(9, 0, Modifiers::empty()), None);
    }

    #[test]
    fn keypad_text_needs_num_lock() {
        let keymap = keymap();
        assert_eq!(keymap.text(79, 0, Modifiers::empty()), None);
        assert_eq!(keymap.text(79, 0, Modifiers::NUM_LOCK), Some('7'));
    }

    #[test]
    fn missing_group_falls_back_to_first() {
        let keymap = keymap();
        assert_eq!(keymap.keysym(24, 1, 0), KEY_q);
        assert_eq!(keymap.keysym(111, 0, 1), KEY_Up);
        assert_eq!(keymap.keysym(3, 0, 0), 0);
    }

    #[test]
    fn scancode_names() {
        let mut state = KeyboardState {
            keymap: keymap(),
            ..Default::default()
        };
        state.table = KeyTable::build(&[], &[], &state.keymap);

        assert_eq!(state.scancode_name(38).unwrap().as_deref(), Some("a"));
        assert_eq!(state.scancode_name(9).unwrap(), None);
        assert_eq!(state.scancode_name(100).unwrap(), None);
        assert!(matches!(state.scancode_name(256), Err(X11Error::InvalidScancode(256))));
        assert!(matches!(state.scancode_name(-1), Err(X11Error::InvalidScancode(-1))));
    }
}
