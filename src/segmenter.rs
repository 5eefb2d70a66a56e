use lazy_static::lazy_static;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

use crate::error::{LongformError, Result};

/// One planned chunk of the script. `duration_sec` is an estimate used for
/// packing; the TTS stage's true duration may differ.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedSegment {
    pub text_chunk: String,
    pub duration_sec: u32,
}

/// Common abbreviations that don't end sentences
const COMMON_ABBREVIATIONS: &[&str] = &[
    "Dr", "Mr", "Mrs", "Ms", "Prof", "Sr", "Jr", "etc", "i.e", "e.g", "vs", "Inc", "Corp", "Ltd",
    "Ave", "St", "Rd", "Blvd", "Mt", "No",
];

/// Sentence terminators beyond ASCII: CJK full stops, Devanagari danda,
/// Arabic/Urdu full stops and question marks.
const FULLWIDTH_TERMINATORS: &[char] = &['。', '！', '？', '।', '॥', '۔', '؟'];

lazy_static! {
    /// Clause boundaries used when a single sentence overflows the cap:
    /// commas (ASCII and full-width), semicolons, and joining conjunctions.
    static ref CLAUSE_BOUNDARY: Regex =
        Regex::new(r"[,;，、；]|\s+(?:and|but|or|so|because|while|then)\s+").unwrap();
}

/// Speaking rates per locale prefix. Latin-script defaults to 150 words per
/// minute; character-timed scripts get characters per minute instead.
fn words_per_minute(locale: &str) -> f64 {
    let lang = locale
        .split(['-', '_'])
        .next()
        .unwrap_or("en")
        .to_ascii_lowercase();
    match lang.as_str() {
        "hi" | "bn" | "ta" | "te" | "mr" | "kn" | "ml" | "gu" | "pa" => 140.0,
        "de" | "fi" => 130.0,
        "es" | "it" | "pt" => 160.0,
        _ => 150.0,
    }
}

/// Characters per minute for scripts without word spacing.
fn chars_per_minute(locale: &str) -> f64 {
    let lang = locale
        .split(['-', '_'])
        .next()
        .unwrap_or("en")
        .to_ascii_lowercase();
    match lang.as_str() {
        "ja" => 400.0,
        "zh" => 320.0,
        "ko" => 350.0,
        _ => 350.0,
    }
}

fn is_cjk(ch: char) -> bool {
    matches!(ch,
        '\u{3040}'..='\u{30ff}'   // Hiragana, Katakana
        | '\u{3400}'..='\u{4dbf}' // CJK extension A
        | '\u{4e00}'..='\u{9fff}' // CJK unified
        | '\u{ac00}'..='\u{d7af}' // Hangul syllables
        | '\u{f900}'..='\u{faff}')
}

/// Normalize whitespace and strip control characters. NFC keeps combining
/// marks in Indic scripts stable across clients.
pub fn normalize_script(text: &str) -> String {
    let composed: String = text.nfc().collect();
    let stripped: String = composed
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Check if a period is likely part of an abbreviation
fn is_abbreviation(text: &str, period_pos: usize) -> bool {
    let before = &text[..period_pos];
    let word = match before.rfind(|c: char| c.is_whitespace()) {
        Some(idx) => &before[idx + 1..],
        None => before,
    };

    for abbrev in COMMON_ABBREVIATIONS {
        if word.eq_ignore_ascii_case(abbrev) {
            return true;
        }
    }

    // Single-letter initials ("J. K. Rowling")
    if word.chars().count() == 1 {
        if let Some(ch) = word.chars().next() {
            if ch.is_uppercase() {
                return true;
            }
        }
    }

    false
}

/// Split normalized text into sentence-like units using locale-aware
/// boundary heuristics: ASCII terminal punctuation with abbreviation and
/// decimal guards, plus full-width terminators for CJK/Indic scripts.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let chars: Vec<char> = text.chars().collect();
    // Byte offset tracked alongside the char index for the abbreviation
    // lookback, which slices the original string
    let mut byte_pos = 0usize;

    for (i, &ch) in chars.iter().enumerate() {
        current.push(ch);
        let ch_len = ch.len_utf8();

        let is_ascii_end = matches!(ch, '.' | '!' | '?');
        let is_fullwidth_end = FULLWIDTH_TERMINATORS.contains(&ch);

        if is_ascii_end {
            let prev_is_digit = i > 0 && chars[i - 1].is_ascii_digit();
            let next_is_digit = i + 1 < chars.len() && chars[i + 1].is_ascii_digit();
            let is_decimal = ch == '.' && prev_is_digit && next_is_digit;
            let is_abbrev = ch == '.' && is_abbreviation(text, byte_pos);
            let at_end = i + 1 >= chars.len();
            let next_is_space = !at_end && chars[i + 1].is_whitespace();

            if !is_decimal && !is_abbrev && (at_end || next_is_space) {
                let sentence = current.trim().to_string();
                if !sentence.is_empty() {
                    sentences.push(sentence);
                }
                current.clear();
            }
        } else if is_fullwidth_end {
            let sentence = current.trim().to_string();
            if !sentence.is_empty() {
                sentences.push(sentence);
            }
            current.clear();
        }

        byte_pos += ch_len;
    }

    let tail = current.trim().to_string();
    if !tail.is_empty() {
        sentences.push(tail);
    }

    sentences
}

/// Estimate spoken duration of a unit in seconds. Word-timed scripts use
/// words-per-minute; runs of CJK characters are timed per character. A
/// pathological single token is floored by a per-character articulation
/// bound so it cannot estimate below its real length.
pub fn estimate_seconds(text: &str, locale: &str) -> f64 {
    let cjk_chars = text.chars().filter(|&c| is_cjk(c)).count();
    let total_chars = text.chars().filter(|c| !c.is_whitespace()).count();
    if total_chars == 0 {
        return 0.0;
    }

    let word_count = text.split_whitespace().count();
    let est = if cjk_chars * 2 >= total_chars {
        total_chars as f64 / chars_per_minute(locale) * 60.0
    } else {
        word_count as f64 / words_per_minute(locale) * 60.0
    };

    // ~25 chars/second is faster than any human speech; a longer token
    // cannot be shorter than this no matter the word count
    let articulation_floor = total_chars as f64 / 25.0;
    est.max(articulation_floor)
}

/// Split an oversize sentence on clause boundaries, then by fixed word
/// count, so every piece estimates within `cap_sec`.
fn split_oversize_sentence(sentence: &str, cap_sec: u32, locale: &str) -> Result<Vec<String>> {
    let cap = cap_sec as f64;

    let mut clauses: Vec<String> = Vec::new();
    let mut last = 0usize;
    for m in CLAUSE_BOUNDARY.find_iter(sentence) {
        let piece = sentence[last..m.end()].trim();
        if !piece.is_empty() {
            clauses.push(piece.to_string());
        }
        last = m.end();
    }
    let tail = sentence[last..].trim();
    if !tail.is_empty() {
        clauses.push(tail.to_string());
    }
    if clauses.is_empty() {
        clauses.push(sentence.trim().to_string());
    }

    let mut pieces = Vec::new();
    for clause in clauses {
        if estimate_seconds(&clause, locale) <= cap {
            pieces.push(clause);
            continue;
        }
        // Clause still too long: fixed word-count split
        let words: Vec<&str> = clause.split_whitespace().collect();
        if words.len() <= 1 {
            // A single indivisible token that overflows the cap
            return Err(LongformError::ChunkOverflow {
                token_len: clause.chars().count(),
                cap_sec,
            });
        }
        let per_word = estimate_seconds(&clause, locale) / words.len() as f64;
        let group = ((cap / per_word).floor() as usize).max(1);
        for chunk in words.chunks(group) {
            let piece = chunk.join(" ");
            if estimate_seconds(&piece, locale) > cap {
                return Err(LongformError::ChunkOverflow {
                    token_len: piece.chars().count(),
                    cap_sec,
                });
            }
            pieces.push(piece);
        }
    }

    Ok(pieces)
}

/// Split a script into ordered duration-bounded chunks.
///
/// Units are packed greedily up to `target_sec`; a unit whose own estimate
/// exceeds `cap_sec` is split on clause boundaries and finally by word
/// count. Deterministic for identical inputs.
pub fn plan_segments(
    script_text: &str,
    target_sec: u32,
    cap_sec: u32,
    locale: &str,
) -> Result<Vec<PlannedSegment>> {
    let normalized = normalize_script(script_text);
    if normalized.is_empty() {
        return Err(LongformError::EmptyScript);
    }

    let target = target_sec as f64;

    let mut units: Vec<String> = Vec::new();
    for sentence in split_sentences(&normalized) {
        if estimate_seconds(&sentence, locale) > cap_sec as f64 {
            units.extend(split_oversize_sentence(&sentence, cap_sec, locale)?);
        } else {
            units.push(sentence);
        }
    }

    let mut segments: Vec<PlannedSegment> = Vec::new();
    let mut current_text = String::new();
    let mut current_est = 0.0f64;

    let flush = |text: &mut String, est: &mut f64, out: &mut Vec<PlannedSegment>| {
        if !text.is_empty() {
            out.push(PlannedSegment {
                text_chunk: std::mem::take(text),
                duration_sec: (est.round() as u32).clamp(1, cap_sec),
            });
            *est = 0.0;
        }
    };

    for unit in units {
        let unit_est = estimate_seconds(&unit, locale);
        if !current_text.is_empty() && current_est + unit_est > target {
            flush(&mut current_text, &mut current_est, &mut segments);
        }
        if !current_text.is_empty() {
            current_text.push(' ');
        }
        current_text.push_str(&unit);
        current_est += unit_est;
    }
    flush(&mut current_text, &mut current_est, &mut segments);

    if segments.is_empty() {
        return Err(LongformError::EmptyScript);
    }

    Ok(segments)
}
