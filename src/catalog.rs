//! Canonical location catalog + fuzzy normalization.
//!
//! The catalog is read-only after load and shared across unboundedly many
//! concurrent requests; `reload` swaps the whole entry list atomically so
//! in-flight matches never observe a half-updated catalog.

use arc_swap::ArcSwap;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

pub const DEFAULT_SCORE_CUTOFF: u8 = 80;

/// Why a load produced an empty catalog. Loading fails softly: the service
/// stays up with a catalog that matches nothing, and the caller logs this.
#[derive(Debug, Error)]
pub enum CatalogDiagnostic {
    #[error("location source not found: {0}")]
    SourceMissing(PathBuf),
    #[error("column '{0}' missing from location source")]
    ColumnMissing(String),
    #[error("location source unreadable: {0}")]
    Invalid(String),
}

/// Best fuzzy match for one query. Not persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchResult {
    pub candidate: String,
    pub score: u8,
}

pub struct LocationCatalog {
    entries: ArcSwap<Vec<String>>,
    source: PathBuf,
    column: String,
}

impl LocationCatalog {
    /// Load canonical locations from one column of a CSV source. Row order
    /// and duplicates are preserved; empty cells are skipped. Never fails:
    /// a missing source or column yields an empty catalog plus a diagnostic.
    pub fn load(
        source: impl Into<PathBuf>,
        column: impl Into<String>,
    ) -> (Self, Option<CatalogDiagnostic>) {
        let source = source.into();
        let column = column.into();
        let (entries, diagnostic) = match read_entries(&source, &column) {
            Ok(entries) => {
                info!(count = entries.len(), source = %source.display(), "locations loaded");
                (entries, None)
            }
            Err(diag) => (Vec::new(), Some(diag)),
        };
        let catalog = Self {
            entries: ArcSwap::from_pointee(entries),
            source,
            column,
        };
        (catalog, diagnostic)
    }

    /// Build from an in-memory list. Used by tests and embedders that manage
    /// their own source.
    pub fn from_entries(entries: Vec<String>) -> Self {
        Self {
            entries: ArcSwap::from_pointee(entries),
            source: PathBuf::new(),
            column: String::new(),
        }
    }

    /// Re-read the source and swap the entry list wholesale. A failed reload
    /// leaves an empty catalog, mirroring the initial-load behavior.
    pub fn reload(&self) -> Option<CatalogDiagnostic> {
        match read_entries(&self.source, &self.column) {
            Ok(entries) => {
                info!(count = entries.len(), "locations reloaded");
                self.entries.store(Arc::new(entries));
                None
            }
            Err(diag) => {
                self.entries.store(Arc::new(Vec::new()));
                Some(diag)
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.load().is_empty()
    }

    /// Find the canonical entry closest to `query`, if its similarity score
    /// reaches `score_cutoff`. Ties break toward the earliest catalog entry;
    /// an empty query or empty catalog never matches.
    pub fn find_best_match(&self, query: &str, score_cutoff: u8) -> Option<MatchResult> {
        let entries = self.entries.load();
        let query_form = canonical_form(query);
        if query_form.is_empty() || entries.is_empty() {
            return None;
        }

        let mut best: Option<(usize, u8)> = None;
        for (idx, entry) in entries.iter().enumerate() {
            let score = similarity(&query_form, &canonical_form(entry));
            if best.is_none_or(|(_, s)| score > s) {
                best = Some((idx, score));
            }
        }

        let (idx, score) = best?;
        if score >= score_cutoff {
            info!(query, candidate = %entries[idx], score, "location match accepted");
            Some(MatchResult {
                candidate: entries[idx].clone(),
                score,
            })
        } else {
            debug!(query, score, cutoff = score_cutoff, "location match below cutoff");
            None
        }
    }
}

fn read_entries(
    path: &Path,
    column: &str,
) -> std::result::Result<Vec<String>, CatalogDiagnostic> {
    if !path.exists() {
        return Err(CatalogDiagnostic::SourceMissing(path.to_path_buf()));
    }
    let mut reader =
        csv::Reader::from_path(path).map_err(|e| CatalogDiagnostic::Invalid(e.to_string()))?;
    let headers = reader
        .headers()
        .map_err(|e| CatalogDiagnostic::Invalid(e.to_string()))?;
    let idx = headers
        .iter()
        .position(|h| h.trim() == column)
        .ok_or_else(|| CatalogDiagnostic::ColumnMissing(column.to_string()))?;

    let mut entries = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| CatalogDiagnostic::Invalid(e.to_string()))?;
        if let Some(value) = record.get(idx) {
            let value = value.trim();
            if !value.is_empty() {
                entries.push(value.to_string());
            }
        }
    }
    Ok(entries)
}

/// Canonical comparison form: lowercase, alphanumeric tokens, sorted, joined
/// by single spaces. Token sorting makes the score insensitive to word order
/// ("B204 salle" vs "Salle B204"); lowercasing and punctuation-splitting
/// absorb formatting noise.
fn canonical_form(s: &str) -> String {
    let mut tokens: Vec<String> = s
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect();
    tokens.sort();
    tokens.join(" ")
}

/// Similarity of two canonical forms in 0..=100: the Levenshtein ratio
/// `100 * (max_len - distance) / max_len`.
fn similarity(a: &str, b: &str) -> u8 {
    if a == b {
        return 100;
    }
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 100;
    }
    let dist = edit_distance(a, b) as usize;
    ((max_len.saturating_sub(dist)) * 100 / max_len) as u8
}

/// Two-row Levenshtein edit distance.
fn edit_distance(a: &str, b: &str) -> u32 {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let n = b_chars.len();

    if a_chars.is_empty() {
        return n as u32;
    }
    if n == 0 {
        return a_chars.len() as u32;
    }

    let mut prev: Vec<u32> = (0..=n as u32).collect();
    let mut curr = vec![0u32; n + 1];

    for (i, &a_ch) in a_chars.iter().enumerate() {
        curr[0] = (i + 1) as u32;
        for (j, &b_ch) in b_chars.iter().enumerate() {
            let cost = if a_ch == b_ch { 0 } else { 1 };
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[n]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn catalog(entries: &[&str]) -> LocationCatalog {
        LocationCatalog::from_entries(entries.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn exact_entry_scores_100() {
        let cat = catalog(&["Salle B204"]);
        let m = cat.find_best_match("Salle B204", 80).unwrap();
        assert_eq!(m.candidate, "Salle B204");
        assert_eq!(m.score, 100);
    }

    #[test]
    fn match_is_case_and_punctuation_insensitive() {
        let cat = catalog(&["Salle B204"]);
        let m = cat.find_best_match("SALLE-B204", 80).unwrap();
        assert_eq!(m.score, 100);
    }

    #[test]
    fn word_order_does_not_matter() {
        let cat = catalog(&["Salle B204"]);
        let m = cat.find_best_match("B204 Salle", 80).unwrap();
        assert_eq!(m.score, 100);
    }

    #[test]
    fn empty_catalog_never_matches() {
        let cat = catalog(&[]);
        assert!(cat.find_best_match("", 80).is_none());
        assert!(cat.find_best_match("anything", 80).is_none());
    }

    #[test]
    fn empty_query_never_matches() {
        let cat = catalog(&["Salle B204"]);
        assert!(cat.find_best_match("", 80).is_none());
        assert!(cat.find_best_match("  --  ", 80).is_none());
    }

    #[test]
    fn one_char_typo_clears_default_cutoff() {
        // "Salel B204" → "b204 salel" vs "b204 salle": distance 2 over 10
        let cat = catalog(&["Salle B204"]);
        let m = cat.find_best_match("Salel B204", 80).unwrap();
        assert_eq!(m.candidate, "Salle B204");
        assert_eq!(m.score, 80);
    }

    #[test]
    fn single_typo_in_long_name_scores_95() {
        let cat = catalog(&["Salle Informatique B204"]);
        let m = cat.find_best_match("Salle Informatiqe B204", 80).unwrap();
        assert_eq!(m.candidate, "Salle Informatique B204");
        assert!(m.score >= 95, "score was {}", m.score);
    }

    #[test]
    fn near_miss_is_rejected_at_default_cutoff() {
        // "2 acceuil nrd" vs "2 accueil nord": distance 3 over 14 → score 78
        let cat = catalog(&["Accueil Nord 2"]);
        assert!(cat.find_best_match("Acceuil Nrd 2", 80).is_none());

        let m = cat.find_best_match("Acceuil Nrd 2", 70).unwrap();
        assert_eq!(m.score, 78);
    }

    #[test]
    fn unrelated_query_returns_absent() {
        let cat = catalog(&["Salle B204"]);
        assert!(cat.find_best_match("Cafeteria", 80).is_none());
    }

    #[test]
    fn tie_breaks_toward_first_catalog_entry() {
        let cat = catalog(&["Salle B204", "Salle B214"]);
        // Equidistant from both entries
        let m = cat.find_best_match("Salle B234", 80).unwrap();
        assert_eq!(m.candidate, "Salle B204");
    }

    #[test]
    fn loads_column_and_skips_empty_cells() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("locations.csv");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "id,site").unwrap();
        writeln!(f, "1,Salle B204").unwrap();
        writeln!(f, "2,").unwrap();
        writeln!(f, "3,Accueil Nord").unwrap();
        writeln!(f, "4,Salle B204").unwrap();
        drop(f);

        let (cat, diag) = LocationCatalog::load(&path, "site");
        assert!(diag.is_none());
        // Empty cell dropped, duplicate retained
        assert_eq!(cat.len(), 3);
        assert!(cat.find_best_match("Accueil Nord", 80).is_some());
    }

    #[test]
    fn missing_source_yields_empty_usable_catalog() {
        let (cat, diag) = LocationCatalog::load("/nonexistent/locations.csv", "site");
        assert!(matches!(diag, Some(CatalogDiagnostic::SourceMissing(_))));
        assert!(cat.is_empty());
        assert!(cat.find_best_match("Salle B204", 80).is_none());
    }

    #[test]
    fn missing_column_yields_empty_usable_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("locations.csv");
        std::fs::write(&path, "id,name\n1,Salle B204\n").unwrap();

        let (cat, diag) = LocationCatalog::load(&path, "site");
        assert!(matches!(diag, Some(CatalogDiagnostic::ColumnMissing(col)) if col == "site"));
        assert!(cat.is_empty());
    }

    #[test]
    fn reload_swaps_entries_wholesale() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("locations.csv");
        std::fs::write(&path, "site\nSalle B204\n").unwrap();

        let (cat, diag) = LocationCatalog::load(&path, "site");
        assert!(diag.is_none());
        assert_eq!(cat.len(), 1);

        std::fs::write(&path, "site\nSalle B204\nAccueil Nord\n").unwrap();
        assert!(cat.reload().is_none());
        assert_eq!(cat.len(), 2);
        assert!(cat.find_best_match("Accueil Nord", 80).is_some());
    }

    #[test]
    fn edit_distance_basic() {
        assert_eq!(edit_distance("kitten", "sitting"), 3);
        assert_eq!(edit_distance("", "abc"), 3);
        assert_eq!(edit_distance("abc", "abc"), 0);
        assert_eq!(edit_distance("b204 salel", "b204 salle"), 2);
    }
}
