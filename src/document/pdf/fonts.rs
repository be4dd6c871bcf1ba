use std::collections::HashMap;

use lopdf::{Dictionary, Document as LoDocument, Object, ObjectId};

/// The base-14 fonts every PDF viewer ships.
pub const STANDARD_FONTS: [&str; 14] = [
    "Helvetica",
    "Helvetica-Bold",
    "Helvetica-Oblique",
    "Helvetica-BoldOblique",
    "Times-Roman",
    "Times-Bold",
    "Times-Italic",
    "Times-BoldItalic",
    "Courier",
    "Courier-Bold",
    "Courier-Oblique",
    "Courier-BoldOblique",
    "Symbol",
    "ZapfDingbats",
];

const DEFAULT_WIDTH: f32 = 500.0;

/// What the text interpreter needs to know about one font resource.
#[derive(Debug, Clone)]
pub(super) struct FontInfo {
    pub base_font: String,
    pub two_byte: bool,
    first_char: u32,
    widths: Vec<f32>,
    default_width: f32,
}

impl FontInfo {
    pub fn standard(base_font: &str) -> Self {
        Self {
            base_font: base_font.to_string(),
            two_byte: false,
            first_char: 0,
            widths: Vec::new(),
            default_width: DEFAULT_WIDTH,
        }
    }

    /// Glyph advance in thousandths of the font size.
    pub fn width(&self, code: u32) -> f32 {
        code.checked_sub(self.first_char)
            .and_then(|idx| self.widths.get(idx as usize))
            .copied()
            .filter(|w| *w > 0.0)
            .unwrap_or(self.default_width)
    }

    pub fn codes(&self, bytes: &[u8]) -> Vec<u32> {
        if self.two_byte {
            bytes
                .chunks(2)
                .map(|pair| match pair {
                    [hi, lo] => u32::from(*hi) << 8 | u32::from(*lo),
                    [single] => u32::from(*single),
                    _ => 0,
                })
                .collect()
        } else {
            bytes.iter().map(|b| u32::from(*b)).collect()
        }
    }

    pub fn code_bytes(&self, code: u32) -> Vec<u8> {
        if self.two_byte {
            vec![(code >> 8) as u8, code as u8]
        } else {
            vec![code as u8]
        }
    }

    pub fn decode(&self, code: u32) -> char {
        if self.two_byte {
            char::from_u32(code).unwrap_or('\u{FFFD}')
        } else {
            win_ansi_char(code as u8)
        }
    }
}

/// Follows indirect references until a direct object is reached.
pub(super) fn resolve<'a>(doc: &'a LoDocument, mut obj: &'a Object) -> Option<&'a Object> {
    for _ in 0..16 {
        match obj {
            Object::Reference(id) => obj = doc.get_object(*id).ok()?,
            other => return Some(other),
        }
    }
    None
}

pub(super) fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(value) => Some(*value as f32),
        Object::Real(value) => Some(*value as f32),
        _ => None,
    }
}

/// Looks `key` up on the page dictionary, then on its `Parent` chain.
pub(super) fn inherited<'a>(
    doc: &'a LoDocument,
    page_id: ObjectId,
    key: &[u8],
) -> Option<&'a Object> {
    let mut dict = doc.get_object(page_id).ok()?.as_dict().ok()?;
    for _ in 0..32 {
        if let Ok(value) = dict.get(key) {
            return resolve(doc, value);
        }
        let parent = dict.get(b"Parent").ok()?;
        dict = resolve(doc, parent)?.as_dict().ok()?;
    }
    None
}

pub(super) fn page_fonts(doc: &LoDocument, page_id: ObjectId) -> HashMap<Vec<u8>, FontInfo> {
    let mut fonts = HashMap::new();
    let Some(resources) = inherited(doc, page_id, b"Resources").and_then(|o| o.as_dict().ok())
    else {
        return fonts;
    };
    let Some(font_dict) = resources
        .get(b"Font")
        .ok()
        .and_then(|o| resolve(doc, o))
        .and_then(|o| o.as_dict().ok())
    else {
        return fonts;
    };
    for (key, value) in font_dict.iter() {
        if let Some(dict) = resolve(doc, value).and_then(|o| o.as_dict().ok()) {
            fonts.insert(key.clone(), font_info(doc, dict));
        }
    }
    fonts
}

fn font_info(doc: &LoDocument, dict: &Dictionary) -> FontInfo {
    let name = |obj: &Object| match resolve(doc, obj) {
        Some(Object::Name(value)) => Some(String::from_utf8_lossy(value).to_string()),
        _ => None,
    };
    let base_font = dict
        .get(b"BaseFont")
        .ok()
        .and_then(name)
        .unwrap_or_else(|| "Unknown".to_string());
    let two_byte = dict.get(b"Subtype").ok().and_then(name).as_deref() == Some("Type0");
    let first_char = dict
        .get(b"FirstChar")
        .ok()
        .and_then(|o| resolve(doc, o))
        .and_then(number)
        .map(|v| v.max(0.0) as u32)
        .unwrap_or(0);
    let widths = dict
        .get(b"Widths")
        .ok()
        .and_then(|o| resolve(doc, o))
        .and_then(|o| o.as_array().ok())
        .map(|items| {
            items
                .iter()
                .map(|item| resolve(doc, item).and_then(number).unwrap_or(0.0))
                .collect()
        })
        .unwrap_or_default();
    let default_width = if two_byte { 1000.0 } else { DEFAULT_WIDTH };
    FontInfo {
        base_font,
        two_byte,
        first_char,
        widths,
        default_width,
    }
}

pub(super) fn standard_font_dictionary(base_font: &str) -> Dictionary {
    Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Font".to_vec())),
        ("Subtype", Object::Name(b"Type1".to_vec())),
        ("BaseFont", Object::Name(base_font.as_bytes().to_vec())),
        ("Encoding", Object::Name(b"WinAnsiEncoding".to_vec())),
    ])
}

const WIN_ANSI_HIGH: [(u8, char); 27] = [
    (0x80, '€'),
    (0x82, '‚'),
    (0x83, 'ƒ'),
    (0x84, '„'),
    (0x85, '…'),
    (0x86, '†'),
    (0x87, '‡'),
    (0x88, 'ˆ'),
    (0x89, '‰'),
    (0x8A, 'Š'),
    (0x8B, '‹'),
    (0x8C, 'Œ'),
    (0x8E, 'Ž'),
    (0x91, '\u{2018}'),
    (0x92, '\u{2019}'),
    (0x93, '\u{201C}'),
    (0x94, '\u{201D}'),
    (0x95, '•'),
    (0x96, '–'),
    (0x97, '—'),
    (0x98, '˜'),
    (0x99, '™'),
    (0x9A, 'š'),
    (0x9B, '›'),
    (0x9C, 'œ'),
    (0x9E, 'ž'),
    (0x9F, 'Ÿ'),
];

fn win_ansi_char(byte: u8) -> char {
    WIN_ANSI_HIGH
        .iter()
        .find(|(code, _)| *code == byte)
        .map(|(_, ch)| *ch)
        .unwrap_or(char::from(byte))
}

/// Encodes `text` for a simple font using WinAnsiEncoding. `None` when a
/// char has no code in that encoding.
pub(super) fn encode_win_ansi(text: &str) -> Option<Vec<u8>> {
    text.chars()
        .map(|ch| {
            if let Some((code, _)) = WIN_ANSI_HIGH.iter().find(|(_, c)| *c == ch) {
                return Some(*code);
            }
            let value = u32::from(ch);
            match value {
                0x20..=0x7E | 0xA0..=0xFF => Some(value as u8),
                _ => None,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn win_ansi_round_trips_latin_text() {
        let bytes = encode_win_ansi("Café – 10€").expect("encodable");
        let decoded: String = bytes.iter().map(|b| win_ansi_char(*b)).collect();
        assert_eq!(decoded, "Café – 10€");
        assert!(encode_win_ansi("日本").is_none());
    }

    #[test]
    fn width_falls_back_outside_table() {
        let font = FontInfo {
            base_font: "F".to_string(),
            two_byte: false,
            first_char: 65,
            widths: vec![600.0, 0.0],
            default_width: 500.0,
        };
        assert_eq!(font.width(65), 600.0);
        assert_eq!(font.width(66), 500.0);
        assert_eq!(font.width(10), 500.0);
    }
}
