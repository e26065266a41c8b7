//! Named seed datasets and typed-text placeholders

use std::collections::HashMap;
use std::path::Path;

use once_cell::sync::Lazy;
use rand::seq::SliceRandom;
use rand::Rng;
use regex::{Captures, Regex};
use todo_common::NewTodo;
use tracing::{debug, warn};

use crate::error::{E2eError, E2eResult};

/// Fixtures keyed by file stem (`todos.json` is `todos`)
#[derive(Debug, Clone, Default)]
pub struct FixtureSet {
    fixtures: HashMap<String, Vec<NewTodo>>,
}

impl FixtureSet {
    /// Load every `*.json` file in `dir`. A missing directory yields an
    /// empty set; scenarios that need a fixture fail when they ask for it.
    pub fn load(dir: &Path) -> E2eResult<Self> {
        let mut fixtures = HashMap::new();

        if !dir.is_dir() {
            warn!("Fixture directory {} not found", dir.display());
            return Ok(Self { fixtures });
        }

        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().map(|e| e != "json").unwrap_or(true) {
                continue;
            }
            let Some(name) = path.file_stem().map(|s| s.to_string_lossy().to_string()) else {
                continue;
            };

            let content = std::fs::read_to_string(&path)?;
            let records: Vec<NewTodo> = serde_json::from_str(&content).map_err(|e| {
                E2eError::SpecParse(format!("fixture {}: {}", path.display(), e))
            })?;
            debug!("Loaded fixture '{}' ({} records)", name, records.len());
            fixtures.insert(name, records);
        }

        Ok(Self { fixtures })
    }

    pub fn get(&self, name: &str) -> E2eResult<&[NewTodo]> {
        self.fixtures
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| {
                E2eError::FixtureNotFound(format!(
                    "{} (available: {})",
                    name,
                    self.names().join(", ")
                ))
            })
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.fixtures.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

const WORDS: &[&str] = &[
    "apple", "bridge", "candle", "desk", "engine", "forest", "garden", "harbor", "island",
    "jacket", "kettle", "ladder", "meadow", "needle", "orchard", "pencil", "quilt", "river",
    "saddle", "tunnel", "umbrella", "valley", "window", "yarn", "zephyr", "laundry", "letter",
    "groceries", "plants", "invoice", "ticket", "parcel",
];

const DEFAULT_SENTENCE_WORDS: usize = 4;

/// `{sentence}` or `{sentence:N}`
static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{sentence(?::(\d+))?\}").expect("placeholder pattern is valid")
});

/// A capitalised sentence of `words` random words ending in a period
pub fn sentence<R: Rng + ?Sized>(rng: &mut R, words: usize) -> String {
    let mut picked: Vec<&str> = (0..words.max(1))
        .filter_map(|_| WORDS.choose(&mut *rng).copied())
        .collect();

    let mut out = String::new();
    if let Some(first) = picked.first_mut() {
        let mut chars = first.chars();
        if let Some(c) = chars.next() {
            out.extend(c.to_uppercase());
            out.push_str(chars.as_str());
        }
    }
    for word in picked.iter().skip(1) {
        out.push(' ');
        out.push_str(word);
    }
    out.push('.');
    out
}

/// Expand `{sentence}` and `{sentence:N}` placeholders
pub fn expand_text<R: Rng + ?Sized>(text: &str, rng: &mut R) -> String {
    PLACEHOLDER
        .replace_all(text, |caps: &Captures| {
            let words = caps
                .get(1)
                .and_then(|m| m.as_str().parse().ok())
                .unwrap_or(DEFAULT_SENTENCE_WORDS);
            sentence(&mut *rng, words)
        })
        .into_owned()
}
