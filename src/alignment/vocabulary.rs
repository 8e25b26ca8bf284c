use std::collections::HashMap;
use std::path::Path;

use crate::error::AlignmentError;

const WILDCARD_GRAPHEME: char = '*';

/// Symbol inventory of the acoustic model: which matrix column each grapheme
/// scores against.
#[derive(Debug, Clone)]
pub struct Vocabulary {
    symbols: HashMap<char, usize>,
    blank_id: usize,
    wildcard_id: Option<usize>,
    size: usize,
    uppercase_only: bool,
}

impl Vocabulary {
    pub fn new(symbols: HashMap<char, usize>, blank_id: usize) -> Self {
        let wildcard_id = symbols.get(&WILDCARD_GRAPHEME).copied();
        let size = symbols
            .values()
            .copied()
            .chain(std::iter::once(blank_id))
            .max()
            .map_or(0, |max| max + 1);

        let mut has_upper = false;
        let mut has_lower = false;
        for c in symbols.keys().copied().filter(|c| c.is_alphabetic()) {
            if c.is_uppercase() {
                has_upper = true;
            }
            if c.is_lowercase() {
                has_lower = true;
            }
        }

        Self {
            symbols,
            blank_id,
            wildcard_id,
            size,
            uppercase_only: has_upper && !has_lower,
        }
    }

    /// Parses a `vocab.json` mapping. Multi-character keys are ignored.
    pub fn from_json_str(json: &str, blank_id: usize) -> Result<Self, AlignmentError> {
        let raw: HashMap<String, usize> =
            serde_json::from_str(json).map_err(|e| AlignmentError::json("parse vocab.json", e))?;
        let symbols = raw
            .into_iter()
            .filter_map(|(k, v)| {
                let mut it = k.chars();
                let c = it.next()?;
                if it.next().is_some() {
                    return None;
                }
                Some((c, v))
            })
            .collect();
        Ok(Self::new(symbols, blank_id))
    }

    pub fn load(path: &Path, blank_id: usize) -> Result<Self, AlignmentError> {
        let data =
            std::fs::read_to_string(path).map_err(|e| AlignmentError::io("read vocab.json", e))?;
        Self::from_json_str(&data, blank_id)
    }

    /// Looks up a lowercase grapheme, honouring uppercase-only vocabularies.
    pub fn symbol(&self, grapheme: char) -> Option<usize> {
        if self.uppercase_only {
            let mut upper = grapheme.to_uppercase();
            let c = upper.next()?;
            if upper.next().is_some() {
                return None;
            }
            return self.symbols.get(&c).copied();
        }
        self.symbols.get(&grapheme).copied()
    }

    pub fn blank_id(&self) -> usize {
        self.blank_id
    }

    pub fn wildcard_id(&self) -> Option<usize> {
        self.wildcard_id
    }

    /// Symbol used when nothing in a word maps.
    pub fn fallback_symbol(&self) -> usize {
        self.wildcard_id.unwrap_or(self.blank_id)
    }

    /// Number of matrix columns the vocabulary addresses.
    pub fn size(&self) -> usize {
        self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_json_filters_multi_char_keys() {
        let vocab =
            Vocabulary::from_json_str(r#"{"<pad>": 0, "a": 1, "b": 2, "ab": 3, "*": 4}"#, 0)
                .expect("valid vocab");
        assert_eq!(vocab.symbol('a'), Some(1));
        assert_eq!(vocab.symbol('b'), Some(2));
        assert_eq!(vocab.wildcard_id(), Some(4));
        assert_eq!(vocab.size(), 5);
    }

    #[test]
    fn uppercase_only_vocab_maps_lowercase_graphemes() {
        let mut symbols = HashMap::new();
        symbols.insert('A', 1);
        symbols.insert('L', 2);
        let vocab = Vocabulary::new(symbols, 0);
        assert_eq!(vocab.symbol('a'), Some(1));
        assert_eq!(vocab.symbol('l'), Some(2));
        assert_eq!(vocab.symbol('x'), None);
    }

    #[test]
    fn fallback_symbol_prefers_wildcard() {
        let mut symbols = HashMap::new();
        symbols.insert('a', 1);
        let vocab = Vocabulary::new(symbols.clone(), 0);
        assert_eq!(vocab.fallback_symbol(), 0);
        symbols.insert('*', 7);
        let vocab = Vocabulary::new(symbols, 0);
        assert_eq!(vocab.fallback_symbol(), 7);
    }

    #[test]
    fn invalid_json_is_reported() {
        let err = Vocabulary::from_json_str("not json", 0).unwrap_err();
        assert_eq!(err.kind(), "json");
    }
}
