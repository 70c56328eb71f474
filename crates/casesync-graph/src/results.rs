//! SPARQL JSON results (`application/sparql-results+json`) decoding.
//!
//! Every binding carries a kind tag. Bindings decode into [`Term`], and each
//! query shape decodes its solutions into a typed row via [`FromSolution`].

use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, warn};

use casesync_core::sparql::{self, ns};
use casesync_core::{CaseSyncError, CaseSyncResult, Term};

const RDF_LANG_STRING: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#langString";

/// Decoded body of a SELECT response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SelectResults {
    #[serde(default)]
    pub head: ResultHead,
    #[serde(default)]
    pub results: ResultSet,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResultHead {
    #[serde(default)]
    pub vars: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResultSet {
    #[serde(default)]
    pub bindings: Vec<Solution>,
}

/// One bound value as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RawBinding {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
    #[serde(rename = "xml:lang", default)]
    pub lang: Option<String>,
    #[serde(default)]
    pub datatype: Option<String>,
}

impl RawBinding {
    fn new(kind: &str, value: impl Into<String>) -> Self {
        Self {
            kind: kind.to_string(),
            value: value.into(),
            lang: None,
            datatype: None,
        }
    }

    /// Convert to a [`Term`], or explain why the encoding is unsupported.
    pub fn to_term(&self) -> Result<Term, String> {
        match self.kind.as_str() {
            "uri" => Ok(Term::Iri(self.value.clone())),
            "literal" | "typed-literal" => self.literal_term(),
            "bnode" => Err(format!("blank node _:{} cannot be replicated", self.value)),
            other => Err(format!("unknown binding type '{}'", other)),
        }
    }

    fn literal_term(&self) -> Result<Term, String> {
        if let Some(lang) = self.lang.as_deref() {
            if !sparql::is_valid_lang(lang) {
                return Err(format!("invalid language tag '{}'", lang));
            }
            return Ok(Term::Text {
                value: self.value.clone(),
                lang: Some(lang.to_string()),
            });
        }
        match self.datatype.as_deref() {
            None if self.kind == "literal" => Ok(Term::text(self.value.clone())),
            None => Err("typed literal without datatype".to_string()),
            Some(dt) if dt.is_empty() || dt == RDF_LANG_STRING => {
                Err(format!("unusable datatype '{}'", dt))
            }
            Some(dt) if dt == format!("{}string", ns::XSD) => Ok(Term::text(self.value.clone())),
            Some(dt) => Ok(Term::typed(self.value.clone(), dt)),
        }
    }
}

/// One solution: variable name to bound value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Solution(HashMap<String, RawBinding>);

/// Why a solution did not produce a row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowError {
    /// A required variable is unbound; the response is malformed.
    Missing(&'static str),
    /// A value has an encoding we cannot write back.
    Unsupported { var: &'static str, reason: String },
    /// No organization could be resolved for the row.
    Unattributed,
}

impl Solution {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, var: &str, binding: RawBinding) -> Self {
        self.0.insert(var.to_string(), binding);
        self
    }

    pub fn iri(self, var: &str, value: &str) -> Self {
        self.with(var, RawBinding::new("uri", value))
    }

    pub fn text(self, var: &str, value: &str) -> Self {
        self.with(var, RawBinding::new("literal", value))
    }

    pub fn typed(self, var: &str, value: &str, datatype: &str) -> Self {
        let mut binding = RawBinding::new("literal", value);
        binding.datatype = Some(datatype.to_string());
        self.with(var, binding)
    }

    /// A binding with an arbitrary kind tag.
    pub fn raw(self, var: &str, kind: &str, value: &str) -> Self {
        self.with(var, RawBinding::new(kind, value))
    }

    pub fn get(&self, var: &str) -> Option<&RawBinding> {
        self.0.get(var)
    }

    /// Optional variable.
    pub fn term(&self, var: &'static str) -> Result<Option<Term>, RowError> {
        match self.0.get(var) {
            None => Ok(None),
            Some(binding) => binding
                .to_term()
                .map(Some)
                .map_err(|reason| RowError::Unsupported { var, reason }),
        }
    }

    pub fn required(&self, var: &'static str) -> Result<Term, RowError> {
        self.term(var)?.ok_or(RowError::Missing(var))
    }

    /// Required variable that must hold an IRI.
    pub fn required_iri(&self, var: &'static str) -> Result<String, RowError> {
        match self.required(var)? {
            Term::Iri(iri) => Ok(iri),
            other => Err(RowError::Unsupported {
                var,
                reason: format!("expected an IRI, got literal '{}'", other.lexical()),
            }),
        }
    }
}

/// A typed row decoded from one solution.
pub trait FromSolution: Sized {
    fn from_solution(solution: &Solution) -> Result<Self, RowError>;
}

/// Rows of one query plus the solutions that were dropped.
#[derive(Debug, Clone)]
pub struct Decoded<T> {
    pub rows: Vec<T>,
    pub unattributed: usize,
    pub unsupported: usize,
}

impl SelectResults {
    pub fn from_solutions(vars: &[&str], solutions: Vec<Solution>) -> Self {
        Self {
            head: ResultHead {
                vars: vars.iter().map(|v| v.to_string()).collect(),
            },
            results: ResultSet {
                bindings: solutions,
            },
        }
    }

    pub fn solutions(&self) -> &[Solution] {
        &self.results.bindings
    }

    pub fn is_empty(&self) -> bool {
        self.results.bindings.is_empty()
    }

    /// Decode every solution into `T`.
    ///
    /// Unattributed and unsupported solutions are counted and skipped; an
    /// unbound required variable fails the whole response.
    pub fn decode<T: FromSolution>(&self) -> CaseSyncResult<Decoded<T>> {
        let mut decoded = Decoded {
            rows: Vec::with_capacity(self.results.bindings.len()),
            unattributed: 0,
            unsupported: 0,
        };

        for (idx, solution) in self.results.bindings.iter().enumerate() {
            match T::from_solution(solution) {
                Ok(row) => decoded.rows.push(row),
                Err(RowError::Unattributed) => {
                    decoded.unattributed += 1;
                    debug!(row = idx, "Dropping row without a resolvable organization");
                }
                Err(RowError::Unsupported { var, reason }) => {
                    decoded.unsupported += 1;
                    warn!(row = idx, var, %reason, "Skipping value with unsupported encoding");
                }
                Err(RowError::Missing(var)) => {
                    return Err(CaseSyncError::malformed(format!(
                        "solution {} has no binding for ?{}",
                        idx, var
                    )));
                }
            }
        }

        Ok(decoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Pair {
        s: String,
        o: Term,
    }

    impl FromSolution for Pair {
        fn from_solution(solution: &Solution) -> Result<Self, RowError> {
            Ok(Pair {
                s: solution.required_iri("s")?,
                o: solution.required("o")?,
            })
        }
    }

    #[test]
    fn test_parse_wire_format() {
        let body = r#"{
          "head": { "vars": ["s", "o"] },
          "results": { "bindings": [
            { "s": { "type": "uri", "value": "http://ex.org/a" },
              "o": { "type": "literal", "value": "huis", "xml:lang": "nl" } },
            { "s": { "type": "uri", "value": "http://ex.org/b" },
              "o": { "type": "typed-literal", "value": "2024-02-01T00:00:00Z",
                     "datatype": "http://www.w3.org/2001/XMLSchema#dateTime" } }
          ] }
        }"#;
        let results: SelectResults = serde_json::from_str(body).unwrap();
        assert_eq!(results.head.vars, vec!["s", "o"]);

        let decoded = results.decode::<Pair>().unwrap();
        assert_eq!(decoded.rows.len(), 2);
        assert_eq!(decoded.rows[0].s, "http://ex.org/a");
        assert_eq!(
            decoded.rows[0].o,
            Term::Text {
                value: "huis".into(),
                lang: Some("nl".into())
            }
        );
        assert_eq!(
            decoded.rows[1].o,
            Term::typed("2024-02-01T00:00:00Z", ns::XSD_DATE_TIME)
        );
    }

    #[test]
    fn test_xsd_string_is_plain_text() {
        let binding = RawBinding {
            kind: "literal".into(),
            value: "x".into(),
            lang: None,
            datatype: Some("http://www.w3.org/2001/XMLSchema#string".into()),
        };
        assert_eq!(binding.to_term().unwrap(), Term::text("x"));
    }

    #[test]
    fn test_unsupported_rows_are_skipped() {
        let results = SelectResults::from_solutions(
            &["s", "o"],
            vec![
                Solution::new().iri("s", "http://ex.org/a").raw("o", "bnode", "b0"),
                Solution::new().iri("s", "http://ex.org/a").raw("o", "triple", "?"),
                Solution::new().text("s", "not an iri").text("o", "x"),
                Solution::new().iri("s", "http://ex.org/a").text("o", "kept"),
            ],
        );
        let decoded = results.decode::<Pair>().unwrap();
        assert_eq!(decoded.unsupported, 3);
        assert_eq!(decoded.rows.len(), 1);
        assert_eq!(decoded.rows[0].o, Term::text("kept"));
    }

    #[test]
    fn test_missing_binding_is_malformed() {
        let results = SelectResults::from_solutions(
            &["s", "o"],
            vec![Solution::new().iri("s", "http://ex.org/a")],
        );
        let err = results.decode::<Pair>().unwrap_err();
        assert!(matches!(err, CaseSyncError::MalformedResults(_)));
    }

    #[test]
    fn test_empty_body_sections_default() {
        let results: SelectResults = serde_json::from_str(r#"{"head": {}}"#).unwrap();
        assert!(results.is_empty());
    }
}
