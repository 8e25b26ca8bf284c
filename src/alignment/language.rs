use std::ops::Range;
use std::sync::OnceLock;

use hyphenation::{Hyphenator, Language, Load, Standard};

use crate::error::{ConfigurationError, SegmentationError};
use crate::types::PhonemeClass;

const ROMAJI_ONSETS: &str = "ktnfmrwpbdgzcj";
const ROMAJI_Y_ONSETS: &str = "kstnhfmrwpbdgzcj";

/// Words whose sung syllabification the hyphenation patterns get wrong.
const ENGLISH_SYLLABLES: &[(&str, &[&str])] = &[
    ("singing", &["sing", "ing"]),
    ("melody", &["mel", "o", "dy"]),
    ("karaoke", &["kar", "a", "o", "ke"]),
    ("rhythm", &["rhythm"]),
    ("tonight", &["to", "night"]),
    ("everyday", &["ev", "ery", "day"]),
    ("someday", &["some", "day"]),
    ("sunday", &["sun", "day"]),
    ("monday", &["mon", "day"]),
    ("tuesday", &["tues", "day"]),
    ("wednesday", &["wednes", "day"]),
    ("thursday", &["thurs", "day"]),
    ("friday", &["fri", "day"]),
    ("saturday", &["sat", "ur", "day"]),
    ("gonna", &["gon", "na"]),
    ("wanna", &["wan", "na"]),
    ("gotta", &["got", "ta"]),
    ("kinda", &["kin", "da"]),
    ("sorta", &["sor", "ta"]),
    ("outta", &["out", "ta"]),
    ("coulda", &["could", "a"]),
    ("shoulda", &["should", "a"]),
    ("woulda", &["would", "a"]),
    ("loving", &["lov", "ing"]),
    ("feeling", &["feel", "ing"]),
    ("dreaming", &["dream", "ing"]),
    ("hoping", &["hop", "ing"]),
    ("baby", &["ba", "by"]),
    ("maybe", &["may", "be"]),
    ("crazy", &["cra", "zy"]),
    ("lady", &["la", "dy"]),
    ("lately", &["late", "ly"]),
    ("lonely", &["lone", "ly"]),
    ("only", &["on", "ly"]),
    ("really", &["re", "al", "ly"]),
    ("yeah", &["yeah"]),
    ("whoa", &["whoa"]),
    ("woah", &["woah"]),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LanguageId {
    Japanese,
    English,
}

/// Fixed per-language rules: syllable splitting, vowel classes and the
/// duration priors the alignment search is biased towards.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LanguageProfile {
    pub id: LanguageId,
    /// Expected sung duration of a vowel phoneme.
    pub vowel_prior_ms: f64,
    pub consonant_prior_ms: f64,
}

impl LanguageProfile {
    pub const JAPANESE: Self = Self {
        id: LanguageId::Japanese,
        vowel_prior_ms: 160.0,
        consonant_prior_ms: 60.0,
    };

    pub const ENGLISH: Self = Self {
        id: LanguageId::English,
        vowel_prior_ms: 180.0,
        consonant_prior_ms: 70.0,
    };

    pub fn by_id(id: &str) -> Result<Self, ConfigurationError> {
        match id {
            "ja" => Ok(Self::JAPANESE),
            "en" => Ok(Self::ENGLISH),
            other => Err(ConfigurationError::UnknownLanguage(other.to_string())),
        }
    }

    pub fn code(&self) -> &'static str {
        match self.id {
            LanguageId::Japanese => "ja",
            LanguageId::English => "en",
        }
    }

    pub fn prior_ms(&self, class: PhonemeClass) -> f64 {
        match class {
            PhonemeClass::Vowel | PhonemeClass::Wildcard => self.vowel_prior_ms,
            PhonemeClass::Consonant => self.consonant_prior_ms,
        }
    }

    /// Vowel flag for every char of `word`.
    pub fn vowel_mask(&self, word: &[char]) -> Vec<bool> {
        let mut mask: Vec<bool> = word.iter().map(|&c| is_plain_vowel(c)).collect();
        if self.id == LanguageId::English {
            for i in 1..word.len() {
                if word[i] == 'y' && !mask[i - 1] && word[i - 1].is_alphabetic() {
                    mask[i] = true;
                }
            }
        }
        mask
    }

    /// Splits one normalized word into syllables, as char-index ranges that
    /// tile the word exactly.
    pub fn split_syllables(&self, word: &[char]) -> Result<Vec<Range<usize>>, SegmentationError> {
        if word.is_empty() {
            return Err(SegmentationError::EmptyWord);
        }
        let ranges = match self.id {
            LanguageId::Japanese => split_romaji(word),
            LanguageId::English => split_english(word, &self.vowel_mask(word))?,
        };
        debug_assert_eq!(
            ranges.iter().map(|r| r.len()).sum::<usize>(),
            word.len(),
            "syllable ranges must tile the word"
        );
        Ok(ranges)
    }
}

fn is_plain_vowel(c: char) -> bool {
    matches!(c, 'a' | 'e' | 'i' | 'o' | 'u')
}

/// Karaoke auto-split for romaji: a boundary may open before an onset
/// consonant or between two vowels.
fn split_romaji(word: &[char]) -> Vec<Range<usize>> {
    let mut ranges = Vec::new();
    let mut start = 0usize;
    for i in 1..word.len() {
        if romaji_boundary(word[i - 1], word[i]) {
            ranges.push(start..i);
            start = i;
        }
    }
    ranges.push(start..word.len());
    ranges
}

fn romaji_boundary(prev: char, next: char) -> bool {
    match next {
        'h' => prev != 's' && prev != 'c',
        'y' => !ROMAJI_Y_ONSETS.contains(prev),
        's' => prev != 't',
        c if ROMAJI_ONSETS.contains(c) => true,
        c if is_plain_vowel(c) => is_plain_vowel(prev) || !prev.is_alphanumeric(),
        _ => false,
    }
}

fn english_hyphenator() -> Option<&'static Standard> {
    static EN_US: OnceLock<Option<Standard>> = OnceLock::new();
    EN_US
        .get_or_init(|| match Standard::from_embedded(Language::EnglishUS) {
            Ok(dictionary) => Some(dictionary),
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    "segmentation: en-US hyphenation patterns unavailable, words stay whole"
                );
                None
            }
        })
        .as_ref()
}

/// Dictionary first, then en-US hyphenation. Parts without a vowel join
/// their neighbour so every syllable has a nucleus.
fn split_english(word: &[char], vowels: &[bool]) -> Result<Vec<Range<usize>>, SegmentationError> {
    let text: String = word.iter().collect();
    if let Some((_, parts)) = ENGLISH_SYLLABLES.iter().find(|(w, _)| *w == text) {
        let mut ranges = Vec::with_capacity(parts.len());
        let mut start = 0usize;
        for part in parts.iter() {
            let len = part.chars().count();
            ranges.push(start..start + len);
            start += len;
        }
        return Ok(ranges);
    }
    if !vowels.iter().any(|&v| v) {
        return Err(SegmentationError::NoSyllableNucleus { word: text });
    }

    // Breaks come back as byte offsets into `text`.
    let char_starts: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
    let cuts: Vec<usize> = english_hyphenator()
        .map(|dictionary| {
            dictionary
                .hyphenate(&text)
                .breaks
                .iter()
                .filter_map(|b| char_starts.binary_search(b).ok())
                .filter(|&cut| cut > 0 && cut < word.len())
                .collect()
        })
        .unwrap_or_default();

    let has_vowel = |range: &Range<usize>| vowels[range.clone()].iter().any(|&v| v);
    let mut ranges: Vec<Range<usize>> = Vec::with_capacity(cuts.len() + 1);
    let mut start = 0usize;
    for end in cuts.into_iter().chain(std::iter::once(word.len())) {
        let part = start..end;
        start = end;
        let merge = ranges
            .last()
            .is_some_and(|last| !has_vowel(&part) || !has_vowel(last));
        match ranges.last_mut() {
            Some(last) if merge => last.end = part.end,
            _ => ranges.push(part),
        }
    }
    Ok(ranges)
}
