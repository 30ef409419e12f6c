//! Query and entity-name normalization.
//!
//! One function produces the canonical form used everywhere a piece of
//! text acts as a key: cache keys, the discovery queue dedup key, and
//! the supplement `canonical_key` column. Normalization is pure and
//! idempotent, so human-equivalent spellings collide onto one key.

/// Normalize a raw query or entity name into its canonical key form.
///
/// Steps, in order:
/// 1. Trim leading/trailing whitespace.
/// 2. Unicode lowercase.
/// 3. Fold Latin diacritics to their base letters ("Cúrcuma" → "curcuma").
///    Folding is universal rather than locale-aware: one shared index
///    serves mixed-locale traffic, so "curcuma" names the same entity no
///    matter which keyboard produced it. Non-Latin scripts pass through
///    verbatim.
/// 4. Collapse interior whitespace runs to single spaces.
pub fn normalize_query(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_space = false;
    for ch in raw.trim().chars() {
        if ch.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        for lower in ch.to_lowercase() {
            fold_latin(lower, &mut out);
        }
    }
    out
}

/// Append one lowercased character to `out`, stripping Latin diacritics.
///
/// Covers Latin-1 Supplement and Latin Extended-A plus the combining
/// mark block (which handles decomposed input like `"cafe\u{301}"` and
/// the dot produced by lowercasing Turkish `İ`).
fn fold_latin(ch: char, out: &mut String) {
    match ch {
        '\u{0300}'..='\u{036f}' => {}
        'à'..='å' | 'ā' | 'ă' | 'ą' => out.push('a'),
        'æ' => out.push_str("ae"),
        'ç' | 'ć' | 'ĉ' | 'ċ' | 'č' => out.push('c'),
        'ð' | 'ď' | 'đ' => out.push('d'),
        'è'..='ë' | 'ē' | 'ĕ' | 'ė' | 'ę' | 'ě' => out.push('e'),
        'ĝ' | 'ğ' | 'ġ' | 'ģ' => out.push('g'),
        'ĥ' | 'ħ' => out.push('h'),
        'ì'..='ï' | 'ĩ' | 'ī' | 'ĭ' | 'į' | 'ı' => out.push('i'),
        'ĳ' => out.push_str("ij"),
        'ĵ' => out.push('j'),
        'ķ' => out.push('k'),
        'ĺ' | 'ļ' | 'ľ' | 'ŀ' | 'ł' => out.push('l'),
        'ñ' | 'ń' | 'ņ' | 'ň' | 'ŉ' | 'ŋ' => out.push('n'),
        'ò'..='ö' | 'ø' | 'ō' | 'ŏ' | 'ő' => out.push('o'),
        'œ' => out.push_str("oe"),
        'ŕ' | 'ŗ' | 'ř' => out.push('r'),
        'ś' | 'ŝ' | 'ş' | 'š' | 'ſ' => out.push('s'),
        'ß' => out.push_str("ss"),
        'ţ' | 'ť' | 'ŧ' => out.push('t'),
        'þ' => out.push_str("th"),
        'ù'..='ü' | 'ũ' | 'ū' | 'ŭ' | 'ů' | 'ű' | 'ų' => out.push('u'),
        'ŵ' => out.push('w'),
        'ý' | 'ÿ' | 'ŷ' => out.push('y'),
        'ź' | 'ż' | 'ž' => out.push('z'),
        other => out.push(other),
    }
}
