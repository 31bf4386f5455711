//! WinAnsi (cp1252) mapping used by the single-byte fonts in overlays.

const HIGH_CONTROL_RANGE: [Option<char>; 32] = [
    Some('\u{20AC}'),
    None,
    Some('\u{201A}'),
    Some('\u{0192}'),
    Some('\u{201E}'),
    Some('\u{2026}'),
    Some('\u{2020}'),
    Some('\u{2021}'),
    Some('\u{02C6}'),
    Some('\u{2030}'),
    Some('\u{0160}'),
    Some('\u{2039}'),
    Some('\u{0152}'),
    None,
    Some('\u{017D}'),
    None,
    None,
    Some('\u{2018}'),
    Some('\u{2019}'),
    Some('\u{201C}'),
    Some('\u{201D}'),
    Some('\u{2022}'),
    Some('\u{2013}'),
    Some('\u{2014}'),
    Some('\u{02DC}'),
    Some('\u{2122}'),
    Some('\u{0161}'),
    Some('\u{203A}'),
    Some('\u{0153}'),
    None,
    Some('\u{017E}'),
    Some('\u{0178}'),
];

pub(crate) const REPLACEMENT: u8 = b'?';

pub(crate) fn decode_byte(code: u8) -> Option<char> {
    match code {
        0x80..=0x9F => HIGH_CONTROL_RANGE[(code - 0x80) as usize],
        _ => Some(code as char),
    }
}

pub(crate) fn encode_char(ch: char) -> Option<u8> {
    match ch {
        '\u{0000}'..='\u{007F}' | '\u{00A0}'..='\u{00FF}' => Some(ch as u32 as u8),
        _ => HIGH_CONTROL_RANGE
            .iter()
            .position(|mapped| *mapped == Some(ch))
            .map(|idx| 0x80 + idx as u8),
    }
}

/// Encodes `text` byte-per-glyph; anything outside cp1252 becomes `?`.
pub(crate) fn encode_text(text: &str) -> Vec<u8> {
    text.chars()
        .map(|ch| encode_char(ch).unwrap_or(REPLACEMENT))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latin1_passes_through() {
        assert_eq!(encode_text("Zoë"), vec![b'Z', b'o', 0xEB]);
    }

    #[test]
    fn cp1252_extensions_map_into_high_range() {
        assert_eq!(encode_char('\u{20AC}'), Some(0x80));
        assert_eq!(encode_char('\u{2019}'), Some(0x92));
        assert_eq!(decode_byte(0x92), Some('\u{2019}'));
        assert_eq!(decode_byte(0x81), None);
    }

    #[test]
    fn unmapped_characters_are_replaced() {
        assert_eq!(encode_text("李"), vec![REPLACEMENT]);
    }
}
