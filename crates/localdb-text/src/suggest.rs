//! Query completion and spelling correction from the non-stemmed term
//! dictionary.

use std::collections::HashMap;

use tantivy::collector::Count;
use tantivy::query::PhraseQuery;
use tantivy::schema::Field;
use tantivy::{Searcher, Term};
use tracing::debug;

use localdb_core::config::SuggestSettings;
use localdb_core::error::{IndexError, Result};
use localdb_core::types::Suggestion;

use crate::tantivy_utils::not_stemmed_tokens;

/// Prefix completions considered per request before phrase validation.
const COMPLETION_CANDIDATES: usize = 50;

pub struct SuggestionEngine<'a> {
    searcher: &'a Searcher,
    field: Field,
    settings: &'a SuggestSettings,
}

impl<'a> SuggestionEngine<'a> {
    pub fn new(searcher: &'a Searcher, field: Field, settings: &'a SuggestSettings) -> Self {
        Self { searcher, field, settings }
    }

    pub fn suggest(&self, phrase: &str) -> Result<Vec<Suggestion>> {
        let mut tokens = not_stemmed_tokens(phrase);
        let Some(last) = tokens.pop() else {
            return Ok(Vec::new());
        };

        let mut prefix = Vec::with_capacity(tokens.len());
        for token in tokens {
            if self.doc_freq(&token)? > 0 {
                prefix.push(token);
            } else if let Some(corrected) = self.correct(&token)? {
                debug!(token = %token, corrected = %corrected, "corrected token");
                prefix.push(corrected);
            } else {
                debug!(token = %token, "no correction found, dropping token");
            }
        }

        let completions = self.complete(&last)?;
        let max = self.settings.max_suggestions;
        if prefix.is_empty() {
            return Ok(completions
                .into_iter()
                .take(max)
                .map(|(completion, _)| Suggestion {
                    label: emphasise(&[], &last, &completion),
                    phrase: completion,
                })
                .collect());
        }

        let mut ranked = Vec::new();
        for (completion, _) in completions {
            let mut words = prefix.clone();
            words.push(completion.clone());
            let count = self.phrase_count(&words)?;
            if count > 0 {
                ranked.push((count, words.join(" "), emphasise(&prefix, &last, &completion)));
            }
        }
        // stable: equal counts keep term frequency order
        ranked.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(ranked.into_iter().take(max).map(|(_, phrase, label)| Suggestion { label, phrase }).collect())
    }

    fn doc_freq(&self, token: &str) -> Result<u64> {
        self.searcher
            .doc_freq(&Term::from_field_text(self.field, token))
            .map_err(|e| IndexError::storage("doc_freq", e))
    }

    /// Most frequent dictionary term within the configured edit distance
    /// that shares the first character of `token`.
    fn correct(&self, token: &str) -> Result<Option<String>> {
        let Some(first) = token.chars().next() else {
            return Ok(None);
        };
        let mut buf = [0u8; 4];
        let first_bytes = first.encode_utf8(&mut buf).as_bytes().to_vec();
        let max_distance = usize::from(self.settings.max_edit_distance);

        let best = self
            .terms_with_prefix(&first_bytes)?
            .into_iter()
            .filter(|(term, _)| levenshtein(token, term) <= max_distance)
            .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(&a.0)));
        Ok(best.map(|(term, _)| term))
    }

    /// Dictionary terms starting with `prefix`, most frequent first.
    fn complete(&self, prefix: &str) -> Result<Vec<(String, u64)>> {
        let mut terms: Vec<(String, u64)> = self.terms_with_prefix(prefix.as_bytes())?.into_iter().collect();
        terms.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        terms.truncate(COMPLETION_CANDIDATES);
        Ok(terms)
    }

    /// Doc frequency per term summed over every segment.
    fn terms_with_prefix(&self, prefix: &[u8]) -> Result<HashMap<String, u64>> {
        let mut counts: HashMap<String, u64> = HashMap::new();
        for segment_reader in self.searcher.segment_readers() {
            let inverted_index =
                segment_reader.inverted_index(self.field).map_err(|e| IndexError::storage("term_dictionary", e))?;
            let mut stream = inverted_index
                .terms()
                .range()
                .ge(prefix)
                .into_stream()
                .map_err(|e| IndexError::storage("term_dictionary", e))?;
            while stream.advance() {
                let key = stream.key();
                if !key.starts_with(prefix) {
                    break;
                }
                if let Ok(term) = std::str::from_utf8(key) {
                    *counts.entry(term.to_string()).or_insert(0) += u64::from(stream.value().doc_freq);
                }
            }
        }
        Ok(counts)
    }

    fn phrase_count(&self, words: &[String]) -> Result<usize> {
        let terms = words.iter().map(|w| Term::from_field_text(self.field, w)).collect();
        self.searcher.search(&PhraseQuery::new(terms), &Count).map_err(|e| IndexError::storage("search", e))
    }
}

/// Label with the completed remainder of the last word in bold.
fn emphasise(prefix: &[String], typed: &str, completion: &str) -> String {
    let rest = completion.strip_prefix(typed).unwrap_or(completion);
    let head = if rest.len() == completion.len() { "" } else { typed };
    let mut label = prefix.join(" ");
    if !label.is_empty() {
        label.push(' ');
    }
    label.push_str(head);
    if !rest.is_empty() {
        label.push_str("<b>");
        label.push_str(rest);
        label.push_str("</b>");
    }
    label
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}
