//! Sentence splitting.
//!
//! The service only needs [`SentenceSplitter`]. [`RuleSplitter`] is a small
//! punctuation-driven splitter that understands Moses-style nonbreaking
//! prefix files, enough to run the service end to end.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::Path;

use crate::options::InputFormat;

pub trait SentenceSplitter: Send + Sync {
    /// Cuts `text` into trimmed, non-empty sentences in reading order.
    fn split(&self, text: &str, format: InputFormat) -> Vec<String>;
}

const CLOSING: &[char] = &['"', '\'', ')', ']', '}', '»', '”', '’'];
const OPENING: &[char] = &['"', '\'', '(', '[', '{', '«', '“', '‘', '¿', '¡'];

/// Breaks after `.`, `!` or `?` when the next word looks like a sentence
/// start, unless the word carrying the period is a known nonbreaking prefix.
#[derive(Debug, Clone, Default)]
pub struct RuleSplitter {
    /// Never end a sentence after these
    prefixes: HashSet<String>,

    /// Only hold the sentence together when the next word starts with a digit
    numeric_only: HashSet<String>,
}

impl RuleSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a nonbreaking prefix list: one prefix per line, `#` starts a
    /// comment, and a trailing `#NUMERIC_ONLY#` marks a prefix that only
    /// applies before a number.
    pub fn with_prefixes(list: &str) -> Self {
        let mut splitter = Self::new();
        for line in list.lines() {
            let numeric = line.contains("#NUMERIC_ONLY#");
            let prefix = line.split('#').next().unwrap_or_default().trim();
            if prefix.is_empty() {
                continue;
            }
            if numeric {
                splitter.numeric_only.insert(prefix.to_owned());
            } else {
                splitter.prefixes.insert(prefix.to_owned());
            }
        }
        splitter
    }

    pub fn from_prefix_file(path: impl AsRef<Path>) -> io::Result<Self> {
        Ok(Self::with_prefixes(&fs::read_to_string(path)?))
    }

    /// A splitter preloaded with common English abbreviations.
    pub fn english() -> Self {
        let mut list: Vec<String> = ('A'..='Z').map(String::from).collect();
        list.extend(
            [
                "Mr", "Mrs", "Ms", "Dr", "Prof", "Sr", "Jr", "St", "Mt", "Gen", "Col", "Capt", "Lt", "Sgt",
                "Rev", "Hon", "vs", "etc", "e.g", "i.e", "cf", "approx", "Jan", "Feb", "Mar", "Apr", "Jun",
                "Jul", "Aug", "Sep", "Sept", "Oct", "Nov", "Dec", "Inc", "Ltd", "Co", "Corp",
            ]
            .map(String::from),
        );
        list.extend(["No", "Nos", "Art", "pp"].map(|p| format!("{p} #NUMERIC_ONLY#")));
        Self::with_prefixes(&list.join("\n"))
    }

    fn ends_sentence(&self, word: &str, next: &str) -> bool {
        let core = word.trim_end_matches(CLOSING);
        let Some(last) = core.chars().last() else {
            return false;
        };
        if !matches!(last, '.' | '!' | '?' | '…') {
            return false;
        }

        let Some(first) = next.trim_start_matches(OPENING).chars().next() else {
            // the next word is nothing but opening punctuation
            return true;
        };
        let starts_sentence = first.is_uppercase() || first.is_numeric() || next.starts_with(OPENING);
        if !starts_sentence {
            return false;
        }

        if last != '.' {
            return true;
        }
        let stem = core.trim_end_matches('.').trim_start_matches(OPENING);
        if self.prefixes.contains(stem) {
            return false;
        }
        if self.numeric_only.contains(stem) && first.is_numeric() {
            return false;
        }
        // acronyms such as "U.S." carry inner periods
        if stem.contains('.') && stem.split('.').all(|part| part.chars().all(char::is_alphabetic)) {
            return false;
        }
        true
    }

    fn split_paragraph(&self, paragraph: &str) -> Vec<String> {
        let words: Vec<&str> = paragraph.split_whitespace().collect();
        let mut sentences = vec![];
        let mut current: Vec<&str> = vec![];
        for (i, word) in words.iter().enumerate() {
            current.push(word);
            if let Some(next) = words.get(i + 1) {
                if self.ends_sentence(word, next) {
                    sentences.push(current.join(" "));
                    current.clear();
                }
            }
        }
        if !current.is_empty() {
            sentences.push(current.join(" "));
        }
        sentences
    }
}

/// Groups lines into paragraphs separated by blank lines, unwrapping each.
fn paragraphs(text: &str) -> Vec<String> {
    let mut out = vec![];
    let mut current: Vec<&str> = vec![];
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            if !current.is_empty() {
                out.push(current.join(" "));
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        out.push(current.join(" "));
    }
    out
}

impl SentenceSplitter for RuleSplitter {
    fn split(&self, text: &str, format: InputFormat) -> Vec<String> {
        match format {
            InputFormat::Sentence => text
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_owned)
                .collect(),
            InputFormat::Paragraph => text
                .lines()
                .flat_map(|line| self.split_paragraph(line))
                .collect(),
            InputFormat::WrappedText => paragraphs(text)
                .iter()
                .flat_map(|paragraph| self.split_paragraph(paragraph))
                .collect(),
        }
    }
}
