use std::ops::Range;

use crate::alignment::language::LanguageProfile;
use crate::alignment::vocabulary::Vocabulary;
use crate::error::SegmentationError;
use crate::types::{PhonemeClass, PhonemeToken, Syllable};

/// Lowercases, unifies apostrophes, turns punctuation into spaces and
/// collapses whitespace. Parentheses survive: they mark backing vocals.
///
/// Non-ASCII letters are kept so they reach the grapheme fallback instead of
/// silently disappearing.
pub fn normalize_lyric_line(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars().flat_map(char::to_lowercase) {
        let c = match c {
            '\u{2018}' | '\u{2019}' | '`' => '\'',
            other => other,
        };
        if c == '\'' || c == '(' || c == ')' || c.is_alphanumeric() {
            out.push(c);
        } else {
            out.push(' ');
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// The text the aligner actually sings against: the normalized line with
/// parentheses removed, so `hel(lo)` stays the single word `hello`.
pub fn alignment_transcript(text: &str) -> String {
    transcript_chars(text).into_iter().map(|(c, _)| c).collect()
}

/// Chars of [`alignment_transcript`], each flagged when it was written
/// inside parentheses.
fn transcript_chars(text: &str) -> Vec<(char, bool)> {
    let mut out: Vec<(char, bool)> = Vec::new();
    let mut depth = 0usize;
    for c in normalize_lyric_line(text).chars() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ' ' => {
                if out.last().is_some_and(|&(prev, _)| prev != ' ') {
                    out.push((' ', false));
                }
            }
            c => out.push((c, depth > 0)),
        }
    }
    if out.last().is_some_and(|&(c, _)| c == ' ') {
        out.pop();
    }
    out
}

/// Trimmed lines of a multi-line lyric text that carry at least one word.
pub fn lyric_lines(text: &str) -> Vec<&str> {
    text.lines()
        .map(str::trim)
        .filter(|line| !alignment_transcript(line).is_empty())
        .collect()
}

/// Splits lyric lines into syllables carrying canonical phoneme sequences.
#[derive(Debug, Clone)]
pub struct SyllableSegmenter {
    profile: LanguageProfile,
    vocab: Vocabulary,
}

struct PlannedSyllable {
    chars: Range<usize>,
    phonemes: Vec<PhonemeToken>,
    low_confidence: bool,
}

impl SyllableSegmenter {
    pub fn new(profile: LanguageProfile, vocab: Vocabulary) -> Self {
        Self { profile, vocab }
    }

    pub fn profile(&self) -> LanguageProfile {
        self.profile
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocab
    }

    /// Segments one line. `char_range` of each syllable indexes into
    /// `alignment_transcript(text)`.
    pub fn segment_line(&self, line_index: usize, text: &str) -> Vec<Syllable> {
        let flagged = transcript_chars(text);
        let normalized: String = flagged.iter().map(|&(c, _)| c).collect();
        let backing: Vec<bool> = flagged.iter().map(|&(_, b)| b).collect();
        let mut syllables = Vec::new();
        let mut word_offset = 0usize;

        for word in normalized.split(' ').filter(|w| !w.is_empty()) {
            let chars: Vec<char> = word.chars().collect();
            let chars_before = normalized[..word_offset].chars().count();
            let word_backing = &backing[chars_before..chars_before + chars.len()];
            let byte_offsets: Vec<usize> = word
                .char_indices()
                .map(|(i, _)| i)
                .chain(std::iter::once(word.len()))
                .collect();

            let planned = match self.segment_word(&chars) {
                Ok(planned) => planned,
                Err(err) => {
                    tracing::warn!(
                        line_index,
                        word,
                        error = %err,
                        "segmentation: falling back to grapheme syllable"
                    );
                    vec![self.fallback_word(&chars)]
                }
            };

            for (i, plan) in planned.into_iter().enumerate() {
                let start = word_offset + byte_offsets[plan.chars.start];
                let end = word_offset + byte_offsets[plan.chars.end];
                let backing_vocal = word_backing[plan.chars.clone()].iter().all(|&b| b);
                syllables.push(Syllable {
                    text: normalized[start..end].to_string(),
                    phonemes: plan.phonemes,
                    index: syllables.len(),
                    word_boundary: i == 0,
                    line_index,
                    low_confidence: plan.low_confidence,
                    backing_vocal,
                    char_range: start..end,
                });
            }
            word_offset += word.len() + 1;
        }

        debug_assert_eq!(
            syllables
                .iter()
                .map(|s| s.text.as_str())
                .collect::<String>(),
            normalized.replace(' ', ""),
            "segmentation coverage contract violated"
        );
        syllables
    }

    fn segment_word(&self, chars: &[char]) -> Result<Vec<PlannedSyllable>, SegmentationError> {
        let ranges = self.profile.split_syllables(chars)?;
        let vowels = self.profile.vowel_mask(chars);
        ranges
            .into_iter()
            .map(|range| {
                let phonemes = range
                    .clone()
                    .map(|i| {
                        let symbol = self.vocab.symbol(chars[i]).ok_or_else(|| {
                            SegmentationError::UnmappedGrapheme {
                                word: chars.iter().collect(),
                                grapheme: chars[i],
                            }
                        })?;
                        Ok(PhonemeToken {
                            symbol,
                            grapheme: chars[i],
                            class: class_of(vowels[i]),
                        })
                    })
                    .collect::<Result<Vec<_>, SegmentationError>>()?;
                Ok(PlannedSyllable {
                    chars: range,
                    phonemes,
                    low_confidence: false,
                })
            })
            .collect()
    }

    /// One syllable for the whole word built from whatever graphemes map.
    fn fallback_word(&self, chars: &[char]) -> PlannedSyllable {
        let vowels = self.profile.vowel_mask(chars);
        let mut phonemes: Vec<PhonemeToken> = chars
            .iter()
            .enumerate()
            .filter_map(|(i, &c)| {
                self.vocab.symbol(c).map(|symbol| PhonemeToken {
                    symbol,
                    grapheme: c,
                    class: class_of(vowels[i]),
                })
            })
            .collect();
        if phonemes.is_empty() {
            phonemes.push(PhonemeToken {
                symbol: self.vocab.fallback_symbol(),
                grapheme: chars.first().copied().unwrap_or('*'),
                class: PhonemeClass::Wildcard,
            });
        }
        PlannedSyllable {
            chars: 0..chars.len(),
            phonemes,
            low_confidence: true,
        }
    }
}

fn class_of(is_vowel: bool) -> PhonemeClass {
    if is_vowel {
        PhonemeClass::Vowel
    } else {
        PhonemeClass::Consonant
    }
}
