//! Query normalization and per-mode compilation.
//!
//! A raw query string plus a [`MatchMode`] compiles into a backend
//! expression and the lower-cased highlight terms the snippet builder needs.
//! Compilation never touches the index; executing the compiled expression is
//! the engine's job.

use once_cell::sync::Lazy;
use regex::Regex;
use tantivy::Index;
use tantivy::query::{
    BooleanQuery, BoostQuery, DisjunctionMaxQuery, FuzzyTermQuery, Occur, PhraseQuery, Query,
    QueryParser, TermQuery,
};
use tantivy::schema::{IndexRecordOption, Term};

use crate::model::types::MatchMode;
use crate::search::SearchError;
use crate::search::tantivy::Fields;

/// Characters allowed to survive normalization: word characters, whitespace,
/// hyphen, double-quote, asterisk.
static STRIP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"[^\w\s\-"*]"#).expect("valid regex"));

/// Mirrors tantivy's default analyzer length filter: tokens of 40 bytes or
/// more never make it into the postings, so they must not come out of the
/// compiler either.
const TOKEN_BYTE_LIMIT: usize = 40;

/// Boolean operator tokens excluded from highlighting.
const OPERATORS: [&str; 3] = ["and", "or", "not"];

/// Scope filters attached to every compiled lookup.
#[derive(Debug, Clone, Copy)]
pub struct Scope {
    pub owner_id: i64,
    pub workspace_id: Option<i64>,
    pub include_archived: bool,
}

/// The backend-agnostic shape of a compiled query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryExpr {
    /// Token-adjacency phrase over each searchable field.
    Phrase(Vec<String>),
    /// Raw boolean string handed to the executor's parser.
    Boolean(String),
    /// Prefix match per term, every term required.
    PrefixAll(Vec<String>),
    /// Prefix match per term, any term sufficient.
    PrefixAny(Vec<String>),
}

/// A normalized, executable query.
#[derive(Debug, Clone)]
pub struct CompiledQuery {
    pub mode: MatchMode,
    /// Trimmed original query, used for the verbatim exact-name boost and
    /// the fallback substring scan.
    pub raw: String,
    pub normalized: String,
    pub expr: QueryExpr,
    /// Lower-cased terms for snippeting/highlighting; operator tokens and
    /// quoting/wildcard markers are already stripped.
    pub highlight_terms: Vec<String>,
}

/// Strip disallowed characters and trim.
pub fn normalize(raw: &str) -> String {
    STRIP_RE.replace_all(raw, "").trim().to_string()
}

/// Lower-cased tokens split on non-alphanumeric boundaries, mirroring the
/// index analyzer so compiled terms line up with the postings.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty() && t.len() < TOKEN_BYTE_LIMIT)
        .map(|t| t.to_lowercase())
        .collect()
}

/// Compile `raw` under `mode`, validating before the index is ever touched.
pub fn compile(raw: &str, mode: MatchMode, min_query_chars: usize) -> Result<CompiledQuery, SearchError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(SearchError::EmptyQuery);
    }
    let normalized = normalize(raw);
    if normalized.chars().count() < min_query_chars {
        return Err(SearchError::QueryTooShort {
            normalized,
            min: min_query_chars,
        });
    }
    let tokens = tokenize(&normalized);
    if tokens.is_empty() {
        return Err(SearchError::InvalidQuery(normalized));
    }

    let (expr, highlight_terms) = match mode {
        MatchMode::Exact | MatchMode::Phrase => (QueryExpr::Phrase(tokens.clone()), tokens),
        MatchMode::Boolean => {
            let terms: Vec<String> = tokens
                .into_iter()
                .filter(|t| !OPERATORS.contains(&t.as_str()))
                .collect();
            if terms.is_empty() {
                return Err(SearchError::InvalidQuery(normalized));
            }
            (QueryExpr::Boolean(normalized.clone()), terms)
        }
        MatchMode::Wildcard => (QueryExpr::PrefixAll(tokens.clone()), tokens),
        MatchMode::Fuzzy => (QueryExpr::PrefixAny(tokens.clone()), tokens),
    };

    Ok(CompiledQuery {
        mode,
        raw: trimmed.to_string(),
        normalized,
        expr,
        highlight_terms,
    })
}

/// Lower the compiled expression plus scope filters into one tantivy query.
///
/// Field weighting happens here: `name` carries `name_boost`, description
/// and tags 1.0, and `path` matches at weight 0.0 (it counts for matching
/// but contributes nothing to relevance).
pub fn build_query(
    compiled: &CompiledQuery,
    index: &Index,
    fields: &Fields,
    scope: &Scope,
    name_boost: f32,
) -> Result<Box<dyn Query>, SearchError> {
    let weighted_fields = [
        (fields.name, name_boost),
        (fields.description, 1.0),
        (fields.tags, 1.0),
        (fields.path, 0.0),
    ];

    let content: Box<dyn Query> = match &compiled.expr {
        QueryExpr::Phrase(tokens) => any_field(&weighted_fields, |field| phrase_query(field, tokens)),
        QueryExpr::Boolean(raw) => {
            let mut parser = QueryParser::for_index(
                index,
                vec![fields.name, fields.description, fields.tags, fields.path],
            );
            parser.set_field_boost(fields.name, name_boost);
            parser.set_field_boost(fields.path, 0.0);
            parser
                .parse_query(raw)
                .map_err(|e| SearchError::InvalidQuery(e.to_string()))?
        }
        QueryExpr::PrefixAll(tokens) => prefix_terms(&weighted_fields, tokens, Occur::Must),
        QueryExpr::PrefixAny(tokens) => prefix_terms(&weighted_fields, tokens, Occur::Should),
    };

    let mut clauses: Vec<(Occur, Box<dyn Query>)> = vec![(Occur::Must, content)];
    clauses.push((Occur::Must, filter_term(fields.owner_id, scope.owner_id)));
    if let Some(ws) = scope.workspace_id {
        clauses.push((Occur::Must, filter_term(fields.workspace_id, ws)));
    }
    if !scope.include_archived {
        clauses.push((Occur::Must, filter_term(fields.archived, 0)));
    }

    Ok(Box::new(BooleanQuery::new(clauses)))
}

/// A scope filter: restricts the docset at zero weight, so the lexical
/// score stays a pure content signal.
fn filter_term(field: tantivy::schema::Field, value: i64) -> Box<dyn Query> {
    Box::new(BoostQuery::new(
        Box::new(TermQuery::new(
            Term::from_field_i64(field, value),
            IndexRecordOption::Basic,
        )),
        0.0,
    ))
}

/// Best-field combination of the per-field variants of a clause, applying
/// the field weights. Max instead of sum keeps a document that matches in
/// several fields from drowning out the boost structure.
fn any_field(
    weighted_fields: &[(tantivy::schema::Field, f32)],
    make: impl Fn(tantivy::schema::Field) -> Box<dyn Query>,
) -> Box<dyn Query> {
    let disjuncts: Vec<Box<dyn Query>> = weighted_fields
        .iter()
        .map(|&(field, boost)| {
            let q = make(field);
            let boosted: Box<dyn Query> = if (boost - 1.0).abs() > f32::EPSILON {
                Box::new(BoostQuery::new(q, boost))
            } else {
                q
            };
            boosted
        })
        .collect();
    Box::new(DisjunctionMaxQuery::new(disjuncts))
}

fn phrase_query(field: tantivy::schema::Field, tokens: &[String]) -> Box<dyn Query> {
    if tokens.len() == 1 {
        Box::new(TermQuery::new(
            Term::from_field_text(field, &tokens[0]),
            IndexRecordOption::WithFreqs,
        ))
    } else {
        let terms: Vec<Term> = tokens
            .iter()
            .map(|t| Term::from_field_text(field, t))
            .collect();
        Box::new(PhraseQuery::new(terms))
    }
}

/// Combine per-term prefix matches under `occur` (Must = all required,
/// Should = any sufficient).
fn prefix_terms(
    weighted_fields: &[(tantivy::schema::Field, f32)],
    tokens: &[String],
    occur: Occur,
) -> Box<dyn Query> {
    let clauses: Vec<(Occur, Box<dyn Query>)> = tokens
        .iter()
        .map(|token| {
            let per_field = any_field(weighted_fields, |field| {
                Box::new(FuzzyTermQuery::new_prefix(
                    Term::from_field_text(field, token),
                    0,
                    true,
                ))
            });
            (occur, per_field)
        })
        .collect();
    Box::new(BooleanQuery::new(clauses))
}
