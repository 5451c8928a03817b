//! Alias resolution.
//!
//! Maps a free-text token to catalog columns. Stages are tried in order and
//! the first stage that matches anything wins:
//!
//! 1. exact alias (case-insensitive)
//! 2. exact canonical column name
//! 3. token contained in an alias
//!
//! Columns with the same name in different tables are all returned. Choosing
//! between `aws_cost_usage.billedcost` and `azure_cost_usage.billedcost` is the
//! caller's job, using table hints from the rest of the question.

use std::cmp::Ordering;
use std::fmt;

use inflector::Inflector;
use serde::Serialize;

use crate::catalog::{Catalog, ColumnMetadata, TableMetadata};
use crate::text::find_phrase;

/// Tokens shorter than this never match by containment.
const MIN_SUBSTRING_LEN: usize = 3;

/// Which stage produced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Alias,
    ColumnName,
    AliasSubstring,
}

impl MatchKind {
    fn confidence(&self) -> f64 {
        match self {
            MatchKind::Alias => 1.0,
            MatchKind::ColumnName => 0.9,
            MatchKind::AliasSubstring => 0.6,
        }
    }
}

/// One possible meaning of a token.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AliasCandidate {
    pub table: String,
    pub column: String,
    pub confidence: f64,
    pub match_kind: MatchKind,
}

/// A token that names more than one column.
///
/// Non-fatal: this is a value handed back to the caller, carrying every
/// ranked candidate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AmbiguousAliasError {
    pub token: String,
    pub candidates: Vec<AliasCandidate>,
}

impl fmt::Display for AmbiguousAliasError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' could refer to ", self.token)?;
        for (i, c) in self.candidates.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}.{}", c.table, c.column)?;
        }
        Ok(())
    }
}

impl std::error::Error for AmbiguousAliasError {}

/// A phrase in a question together with the columns it may name.
#[derive(Debug, Clone, PartialEq)]
pub struct Mention {
    pub phrase: String,
    pub offset: usize,
    pub candidates: Vec<AliasCandidate>,
}

/// Resolves tokens against a catalog.
#[derive(Debug, Clone, Copy)]
pub struct AliasResolver<'a> {
    catalog: &'a Catalog,
}

impl<'a> AliasResolver<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self { catalog }
    }

    /// Ranked candidates for `token`. Empty when nothing matches.
    pub fn resolve(&self, token: &str) -> Vec<AliasCandidate> {
        self.resolve_where(token, |_| true)
    }

    /// Like [`resolve`](Self::resolve), restricted to the named tables.
    pub fn resolve_in(&self, token: &str, tables: &[String]) -> Vec<AliasCandidate> {
        self.resolve_where(token, |t| tables.iter().any(|n| n.eq_ignore_ascii_case(&t.name)))
    }

    fn resolve_where(
        &self,
        token: &str,
        include: impl Fn(&TableMetadata) -> bool,
    ) -> Vec<AliasCandidate> {
        let token = token.trim().to_lowercase();
        if token.is_empty() {
            return Vec::new();
        }

        let stages: [(MatchKind, &dyn Fn(&ColumnMetadata) -> Option<f64>); 3] = [
            (MatchKind::Alias, &|c: &ColumnMetadata| {
                c.aliases.contains(&token).then_some(1.0)
            }),
            (MatchKind::ColumnName, &|c: &ColumnMetadata| {
                c.name.eq_ignore_ascii_case(&token).then_some(1.0)
            }),
            (MatchKind::AliasSubstring, &|c: &ColumnMetadata| {
                substring_score(c, &token)
            }),
        ];

        for (kind, matches) in stages {
            let mut found: Vec<AliasCandidate> = self
                .catalog
                .tables()
                .filter(|t| include(t))
                .flat_map(|table| {
                    table.columns.values().filter_map(move |column| {
                        matches(column).map(|scale| AliasCandidate {
                            table: table.name.clone(),
                            column: column.name.clone(),
                            confidence: kind.confidence() * scale,
                            match_kind: kind,
                        })
                    })
                })
                .collect();
            if !found.is_empty() {
                found.sort_by(rank);
                tracing::debug!(token = %token, stage = ?kind, matches = found.len(), "alias resolved");
                return found;
            }
        }
        Vec::new()
    }

    /// The single column `token` names, if it names exactly one.
    ///
    /// Several top-ranked candidates come back as [`AmbiguousAliasError`].
    pub fn pick(&self, token: &str) -> Result<Option<AliasCandidate>, AmbiguousAliasError> {
        let candidates = self.resolve(token);
        let Some(best) = candidates.first() else {
            return Ok(None);
        };
        let top: Vec<AliasCandidate> = candidates
            .iter()
            .filter(|c| c.confidence >= best.confidence)
            .cloned()
            .collect();
        if top.len() == 1 {
            Ok(top.into_iter().next())
        } else {
            Err(AmbiguousAliasError {
                token: token.to_string(),
                candidates,
            })
        }
    }

    /// Column phrases found in a normalized question, longest alias first,
    /// without overlaps, in question order.
    pub fn mentions(&self, question: &str) -> Vec<Mention> {
        let mut phrases: Vec<&str> = self
            .catalog
            .tables()
            .flat_map(|t| t.columns.values())
            .flat_map(|c| c.aliases.iter().map(String::as_str).chain([c.name.as_str()]))
            .collect();
        phrases.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
        phrases.dedup();

        let mut taken: Vec<(usize, usize)> = Vec::new();
        let mut mentions = Vec::new();
        for phrase in phrases {
            let Some(offset) = find_phrase(question, phrase) else {
                continue;
            };
            let end = offset + phrase.len();
            if taken.iter().any(|&(s, e)| offset < e && s < end) {
                continue;
            }
            taken.push((offset, end));
            mentions.push(Mention {
                phrase: phrase.to_string(),
                offset,
                candidates: self.resolve(phrase),
            });
        }
        mentions.sort_by_key(|m| m.offset);
        mentions
    }

    /// Resolve a word that may be plural, trying the singular form second.
    pub fn resolve_noun(&self, word: &str) -> Vec<AliasCandidate> {
        let found = self.resolve(word);
        if !found.is_empty() && found[0].match_kind != MatchKind::AliasSubstring {
            return found;
        }
        let single = word.to_singular();
        if single != word {
            let singular_found = self.resolve(&single);
            if !singular_found.is_empty() {
                return singular_found;
            }
        }
        found
    }

    /// Tables whose aliases or names appear in a normalized question.
    pub fn tables_mentioned(&self, question: &str) -> Vec<String> {
        self.catalog
            .tables()
            .filter(|t| {
                t.aliases
                    .iter()
                    .map(String::as_str)
                    .chain([t.name.as_str()])
                    .any(|a| find_phrase(question, a).is_some())
            })
            .map(|t| t.name.clone())
            .collect()
    }
}

/// Containment score scaled by how much of the alias the token covers.
fn substring_score(column: &ColumnMetadata, token: &str) -> Option<f64> {
    if token.len() < MIN_SUBSTRING_LEN {
        return None;
    }
    column
        .aliases
        .iter()
        .filter(|a| a.contains(token))
        .map(|a| token.len() as f64 / a.len() as f64)
        .max_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal))
}

fn rank(a: &AliasCandidate, b: &AliasCandidate) -> Ordering {
    b.confidence
        .partial_cmp(&a.confidence)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.table.cmp(&b.table))
        .then_with(|| a.column.cmp(&b.column))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::predefined;

    #[test]
    fn test_alias_beats_name() {
        let catalog = predefined().unwrap();
        let resolver = AliasResolver::new(&catalog);

        let found = resolver.resolve("Spend");
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|c| c.column == "billedcost"));
        assert_eq!(found[0].confidence, 1.0);
        assert_eq!(found[0].match_kind, MatchKind::Alias);
        assert_eq!(found[0].table, "aws_cost_usage");
    }

    #[test]
    fn test_column_name_stage() {
        let catalog = predefined().unwrap();
        let found = AliasResolver::new(&catalog).resolve("regionname");
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].match_kind, MatchKind::ColumnName);
        assert_eq!(found[0].confidence, 0.9);
    }

    #[test]
    fn test_substring_stage() {
        let catalog = predefined().unwrap();
        let found = AliasResolver::new(&catalog).resolve("amortized");
        assert!(!found.is_empty());
        assert!(found.iter().all(|c| c.column == "effectivecost"));
        assert_eq!(found[0].match_kind, MatchKind::AliasSubstring);
        assert!(found[0].confidence < 0.6);
    }

    #[test]
    fn test_unknown_token_is_empty() {
        let catalog = predefined().unwrap();
        let resolver = AliasResolver::new(&catalog);
        assert!(resolver.resolve("flux capacitor").is_empty());
        assert!(resolver.resolve("").is_empty());
        assert!(resolver.resolve("ab").is_empty());
    }

    #[test]
    fn test_pick_surfaces_cross_table_ambiguity() {
        let catalog = predefined().unwrap();
        let resolver = AliasResolver::new(&catalog);

        let err = resolver.pick("cost").unwrap_err();
        assert_eq!(err.candidates.len(), 2);
        assert_eq!(
            err.to_string(),
            "'cost' could refer to aws_cost_usage.billedcost, azure_cost_usage.billedcost"
        );
        assert_eq!(resolver.pick("nothing here").unwrap(), None);
    }

    #[test]
    fn test_resolve_in_restricts_tables() {
        let catalog = predefined().unwrap();
        let resolver = AliasResolver::new(&catalog);
        let found = resolver.resolve_in("subscription", &["azure_cost_usage".to_string()]);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].column, "subaccountname");
        assert!(resolver
            .resolve_in("subscription", &["aws_cost_usage".to_string()])
            .is_empty());
    }

    #[test]
    fn test_mentions_prefer_longest_alias() {
        let catalog = predefined().unwrap();
        let resolver = AliasResolver::new(&catalog);
        let mentions = resolver.mentions("show net cost by service type");
        let phrases: Vec<_> = mentions.iter().map(|m| m.phrase.as_str()).collect();
        assert_eq!(phrases, vec!["net cost", "service type"]);
        assert_eq!(mentions[0].candidates[0].column, "effectivecost");
    }

    #[test]
    fn test_resolve_noun_plural() {
        let catalog = predefined().unwrap();
        let resolver = AliasResolver::new(&catalog);
        let found = resolver.resolve_noun("services");
        assert_eq!(found[0].column, "servicename");
        assert_eq!(found[0].match_kind, MatchKind::Alias);

        let found = resolver.resolve_noun("categories");
        assert_eq!(found[0].column, "servicecategory");
        assert_eq!(found[0].match_kind, MatchKind::Alias);
    }

    #[test]
    fn test_tables_mentioned() {
        let catalog = predefined().unwrap();
        let resolver = AliasResolver::new(&catalog);
        assert_eq!(resolver.tables_mentioned("azure spend"), vec!["azure_cost_usage"]);
        assert!(resolver.tables_mentioned("total spend").is_empty());
    }
}
