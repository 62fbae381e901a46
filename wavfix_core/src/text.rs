//! Fixed-width ASCII text fields.
//!
//! Legacy importers read `bext` and `cart` text as single-byte ASCII, so no
//! byte outside `0x20..=0x7E` (or NUL padding) may reach those records.

/// Byte substituted for code points with no ASCII rendering.
pub const PLACEHOLDER: char = '?';

/// Render `text` as printable ASCII.
///
/// Latin letters with diacritics and typographic punctuation are folded to
/// their closest ASCII spelling; whitespace controls become spaces; anything
/// else becomes one [`PLACEHOLDER`] per code point.
pub fn to_ascii(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        if (' '..='~').contains(&ch) {
            out.push(ch);
        } else if matches!(ch, '\t' | '\n' | '\r' | '\u{a0}') {
            out.push(' ');
        } else if let Some(folded) = fold(ch) {
            out.push_str(folded);
        } else {
            out.push(PLACEHOLDER);
        }
    }
    out
}

/// Append `text` as a NUL-padded field of exactly `width` bytes.
///
/// Overlong text is truncated.
pub fn put_field(out: &mut Vec<u8>, text: &str, width: usize) {
    let ascii = to_ascii(text);
    let bytes = &ascii.as_bytes()[..ascii.len().min(width)];
    out.extend_from_slice(bytes);
    out.resize(out.len() + (width - bytes.len()), 0);
}

fn fold(ch: char) -> Option<&'static str> {
    let folded = match ch {
        'À' | 'Á' | 'Â' | 'Ã' | 'Ä' | 'Å' | 'Ā' | 'Ă' | 'Ą' => "A",
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' | 'ă' | 'ą' => "a",
        'Ç' | 'Ć' | 'Č' => "C",
        'ç' | 'ć' | 'č' => "c",
        'Ď' | 'Đ' | 'Ð' => "D",
        'ď' | 'đ' | 'ð' => "d",
        'È' | 'É' | 'Ê' | 'Ë' | 'Ē' | 'Ę' | 'Ě' => "E",
        'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ę' | 'ě' => "e",
        'Ğ' => "G",
        'ğ' => "g",
        'Ì' | 'Í' | 'Î' | 'Ï' | 'Ī' | 'İ' => "I",
        'ì' | 'í' | 'î' | 'ï' | 'ī' | 'ı' => "i",
        'Ł' => "L",
        'ł' => "l",
        'Ñ' | 'Ń' | 'Ň' => "N",
        'ñ' | 'ń' | 'ň' => "n",
        'Ò' | 'Ó' | 'Ô' | 'Õ' | 'Ö' | 'Ø' | 'Ō' | 'Ő' => "O",
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ō' | 'ő' => "o",
        'Ř' => "R",
        'ř' => "r",
        'Ś' | 'Š' | 'Ş' => "S",
        'ś' | 'š' | 'ş' => "s",
        'Ť' => "T",
        'ť' => "t",
        'Ù' | 'Ú' | 'Û' | 'Ü' | 'Ū' | 'Ů' | 'Ű' => "U",
        'ù' | 'ú' | 'û' | 'ü' | 'ū' | 'ů' | 'ű' => "u",
        'Ý' | 'Ÿ' => "Y",
        'ý' | 'ÿ' => "y",
        'Ź' | 'Ż' | 'Ž' => "Z",
        'ź' | 'ż' | 'ž' => "z",
        'Æ' => "AE",
        'æ' => "ae",
        'Œ' => "OE",
        'œ' => "oe",
        'ß' => "ss",
        'Þ' => "Th",
        'þ' => "th",
        '‘' | '’' | '‚' | '′' | '´' => "'",
        '“' | '”' | '„' | '″' | '«' | '»' => "\"",
        '‐' | '‑' | '‒' | '–' | '—' | '―' => "-",
        '…' => "...",
        '×' => "x",
        '©' => "(c)",
        '®' => "(R)",
        '™' => "TM",
        _ => return None,
    };
    Some(folded)
}
