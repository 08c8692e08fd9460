//! Text normalization.
//!
//! Applies a fixed sequence of independently toggleable stages to a text
//! field: URL stripping, case folding, special-character and number
//! stripping, unicode-aware tokenization, stopword removal, and Snowball
//! stemming. Empty input yields an empty string.
//!
//! The lowercase/strip stages are idempotent; stemming is not guaranteed
//! to be.

use std::collections::HashSet;

use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use unicode_segmentation::UnicodeSegmentation;

use crate::error::{AppError, Result};
use crate::models::TextOptions;

/// Stateless text-field normalizer configured once per run.
pub struct TextNormalizer {
    options: TextOptions,
    url_re: Regex,
    special_re: Regex,
    number_re: Regex,
    stopwords: Option<HashSet<String>>,
    stemmer: Option<Stemmer>,
}

impl TextNormalizer {
    /// Build a normalizer for the given options.
    ///
    /// Fails with a configuration error when `language` is not covered by
    /// the stopword lists or the stemmer.
    pub fn new(options: &TextOptions) -> Result<Self> {
        let stopwords = if options.strip_stopwords {
            let words = stop_words::get(stopword_language(&options.language)?);
            Some(words.into_iter().collect())
        } else {
            None
        };

        let stemmer = if options.stem || options.lemmatize {
            if options.lemmatize {
                log::warn!(
                    "lemmatization is not available; approximating with the {} Snowball stemmer",
                    options.language
                );
            }
            Some(Stemmer::create(stemmer_algorithm(&options.language)?))
        } else {
            None
        };

        Ok(Self {
            options: options.clone(),
            url_re: Regex::new(r"(?i)\bhttps?://\S+|\bwww\.\S+").expect("valid regex"),
            special_re: Regex::new(r"[^\w\s]").expect("valid regex"),
            number_re: Regex::new(r"\d+").expect("valid regex"),
            stopwords,
            stemmer,
        })
    }

    /// Normalize one text field.
    pub fn normalize(&self, text: &str) -> String {
        if text.is_empty() {
            return String::new();
        }

        let mut text = text.to_string();

        if self.options.strip_urls {
            text = self.url_re.replace_all(&text, "").into_owned();
        }
        if self.options.lowercase {
            text = text.to_lowercase();
        }
        if self.options.strip_special_chars {
            text = self.special_re.replace_all(&text, "").into_owned();
        }
        if self.options.strip_numbers {
            text = self.number_re.replace_all(&text, "").into_owned();
        }

        let mut tokens: Vec<String> = text.unicode_words().map(str::to_string).collect();

        if let Some(stopwords) = &self.stopwords {
            tokens.retain(|word| !stopwords.contains(word));
        }
        if let Some(stemmer) = &self.stemmer {
            tokens = tokens
                .iter()
                .map(|word| stemmer.stem(word).into_owned())
                .collect();
        }

        tokens.join(" ")
    }
}

fn stemmer_algorithm(language: &str) -> Result<Algorithm> {
    let algorithm = match language {
        "arabic" => Algorithm::Arabic,
        "danish" => Algorithm::Danish,
        "dutch" => Algorithm::Dutch,
        "english" => Algorithm::English,
        "finnish" => Algorithm::Finnish,
        "french" => Algorithm::French,
        "german" => Algorithm::German,
        "greek" => Algorithm::Greek,
        "hungarian" => Algorithm::Hungarian,
        "italian" => Algorithm::Italian,
        "norwegian" => Algorithm::Norwegian,
        "portuguese" => Algorithm::Portuguese,
        "romanian" => Algorithm::Romanian,
        "russian" => Algorithm::Russian,
        "spanish" => Algorithm::Spanish,
        "swedish" => Algorithm::Swedish,
        "turkish" => Algorithm::Turkish,
        _ => {
            return Err(AppError::config(format!(
                "no stemmer for language '{language}'"
            )));
        }
    };
    Ok(algorithm)
}

fn stopword_language(language: &str) -> Result<stop_words::LANGUAGE> {
    let language = match language {
        "arabic" => stop_words::LANGUAGE::Arabic,
        "danish" => stop_words::LANGUAGE::Danish,
        "dutch" => stop_words::LANGUAGE::Dutch,
        "english" => stop_words::LANGUAGE::English,
        "finnish" => stop_words::LANGUAGE::Finnish,
        "french" => stop_words::LANGUAGE::French,
        "german" => stop_words::LANGUAGE::German,
        "greek" => stop_words::LANGUAGE::Greek,
        "hungarian" => stop_words::LANGUAGE::Hungarian,
        "italian" => stop_words::LANGUAGE::Italian,
        "norwegian" => stop_words::LANGUAGE::Norwegian,
        "portuguese" => stop_words::LANGUAGE::Portuguese,
        "romanian" => stop_words::LANGUAGE::Romanian,
        "russian" => stop_words::LANGUAGE::Russian,
        "spanish" => stop_words::LANGUAGE::Spanish,
        "swedish" => stop_words::LANGUAGE::Swedish,
        "turkish" => stop_words::LANGUAGE::Turkish,
        _ => {
            return Err(AppError::config(format!(
                "no stopword list for language '{language}'"
            )));
        }
    };
    Ok(language)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalizer(options: TextOptions) -> TextNormalizer {
        TextNormalizer::new(&options).unwrap()
    }

    #[test]
    fn test_empty_input_yields_empty_string() {
        let n = normalizer(TextOptions::default());
        assert_eq!(n.normalize(""), "");
    }

    #[test]
    fn test_urls_are_stripped() {
        let n = normalizer(TextOptions {
            strip_stopwords: false,
            ..TextOptions::default()
        });
        assert_eq!(
            n.normalize("read this https://example.com/x?y=1 and www.example.org now"),
            "read this and now"
        );
    }

    #[test]
    fn test_special_chars_and_case() {
        let n = normalizer(TextOptions {
            strip_stopwords: false,
            ..TextOptions::default()
        });
        assert_eq!(n.normalize("Hello, World! (Again)"), "hello world again");
    }

    #[test]
    fn test_numbers_stripped_when_enabled() {
        let n = normalizer(TextOptions {
            strip_numbers: true,
            strip_stopwords: false,
            ..TextOptions::default()
        });
        assert_eq!(n.normalize("room 101 is open 24x7"), "room is open x");
    }

    #[test]
    fn test_stopwords_removed() {
        let n = normalizer(TextOptions::default());
        let out = n.normalize("the quick brown fox is on the run");
        assert!(!out.split_whitespace().any(|w| w == "the" || w == "is"));
        assert!(out.contains("quick"));
        assert!(out.contains("fox"));
    }

    #[test]
    fn test_stemming() {
        let n = normalizer(TextOptions {
            stem: true,
            strip_stopwords: false,
            ..TextOptions::default()
        });
        assert_eq!(n.normalize("running runs"), "run run");
    }

    #[test]
    fn test_lowercase_and_strip_stages_are_idempotent() {
        let n = normalizer(TextOptions {
            strip_stopwords: false,
            ..TextOptions::default()
        });
        let input = "Check https://example.com & Rust's #1 CRATE, really!";
        let once = n.normalize(input);
        assert_eq!(n.normalize(&once), once);
    }

    #[test]
    fn test_unknown_language_is_config_error() {
        let options = TextOptions {
            language: "klingon".to_string(),
            ..TextOptions::default()
        };
        assert!(matches!(
            TextNormalizer::new(&options),
            Err(AppError::Config(_))
        ));
    }
}
