//! `${name}` substitution for script and hook text
//!
//! A backslash before `${` keeps the token literal; a backslash before the
//! closing `}` lets a `}` appear inside the key. Unknown keys and unclosed
//! tokens are emitted unchanged, so replacement never fails.

use std::collections::BTreeMap;

use crate::config::SettingKey;

const OPEN_TOKEN: &str = "${";
const CLOSE_TOKEN: &str = "}";
const ESCAPE: u8 = b'\\';

/// A named set of substitution values
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Variables(BTreeMap<String, String>);

impl Variables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }

    /// Copy of this set with every reserved setting key removed.
    ///
    /// Script bodies must never be able to read connection settings such as
    /// `${password}`.
    pub fn without_settings(&self) -> Self {
        self.0
            .iter()
            .filter(|(key, _)| !SettingKey::is_reserved(key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }
}

impl FromIterator<(String, String)> for Variables {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl From<BTreeMap<String, String>> for Variables {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }
}

/// Resolves `${key}` tokens against an ordered list of variable sets.
///
/// The first set containing a key wins.
#[derive(Debug, Clone, Default)]
pub struct VariableReplacer {
    sets: Vec<Variables>,
}

impl VariableReplacer {
    pub fn new(sets: Vec<Variables>) -> Self {
        Self { sets }
    }

    pub fn sets(&self) -> &[Variables] {
        &self.sets
    }

    fn resolve(&self, key: &str) -> Option<&str> {
        self.sets.iter().find_map(|set| set.get(key))
    }

    /// Substitute every resolvable token in `text`.
    pub fn replace(&self, text: &str) -> String {
        let Some(mut start) = text.find(OPEN_TOKEN) else {
            return text.to_string();
        };

        let bytes = text.as_bytes();
        let mut output = String::with_capacity(text.len());
        let mut offset = 0;

        loop {
            if start > 0 && bytes[start - 1] == ESCAPE {
                output.push_str(&text[offset..start - 1]);
                output.push_str(OPEN_TOKEN);
                offset = start + OPEN_TOKEN.len();
            } else {
                output.push_str(&text[offset..start]);
                offset = start + OPEN_TOKEN.len();

                let mut key = String::new();
                let mut end = find_from(text, CLOSE_TOKEN, offset);
                while let Some(close) = end {
                    if close > offset && bytes[close - 1] == ESCAPE {
                        key.push_str(&text[offset..close - 1]);
                        key.push_str(CLOSE_TOKEN);
                        offset = close + CLOSE_TOKEN.len();
                        end = find_from(text, CLOSE_TOKEN, offset);
                    } else {
                        key.push_str(&text[offset..close]);
                        break;
                    }
                }

                match end {
                    None => {
                        output.push_str(&text[start..]);
                        offset = text.len();
                    }
                    Some(close) => {
                        let token_end = close + CLOSE_TOKEN.len();
                        match self.resolve(&key) {
                            Some(value) => output.push_str(value),
                            None => output.push_str(&text[start..token_end]),
                        }
                        offset = token_end;
                    }
                }
            }

            match find_from(text, OPEN_TOKEN, offset) {
                Some(next) => start = next,
                None => break,
            }
        }

        if offset < text.len() {
            output.push_str(&text[offset..]);
        }
        output
    }
}

fn find_from(text: &str, pattern: &str, from: usize) -> Option<usize> {
    text.get(from..)
        .and_then(|rest| rest.find(pattern))
        .map(|index| index + from)
}

/// Substitute `${key}` tokens in `text` using `sets` in order.
pub fn replace(text: &str, sets: &[Variables]) -> String {
    VariableReplacer::new(sets.to_vec()).replace(text)
}
