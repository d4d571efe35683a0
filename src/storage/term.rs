//! Minimal RDF term model used at the dictionary and inline-encoding boundary.

use std::fmt;

/// Datatype IRIs that the inline NodeId codec understands.
pub mod xsd {
    /// XML Schema namespace.
    pub const NS: &str = "http://www.w3.org/2001/XMLSchema#";

    /// `xsd:string`
    pub const STRING: &str = "http://www.w3.org/2001/XMLSchema#string";
    /// `xsd:boolean`
    pub const BOOLEAN: &str = "http://www.w3.org/2001/XMLSchema#boolean";
    /// `xsd:decimal`
    pub const DECIMAL: &str = "http://www.w3.org/2001/XMLSchema#decimal";
    /// `xsd:double`
    pub const DOUBLE: &str = "http://www.w3.org/2001/XMLSchema#double";
    /// `xsd:float`
    pub const FLOAT: &str = "http://www.w3.org/2001/XMLSchema#float";
    /// `xsd:dateTime`
    pub const DATE_TIME: &str = "http://www.w3.org/2001/XMLSchema#dateTime";
    /// `xsd:dateTimeStamp`
    pub const DATE_TIME_STAMP: &str = "http://www.w3.org/2001/XMLSchema#dateTimeStamp";
    /// `xsd:date`
    pub const DATE: &str = "http://www.w3.org/2001/XMLSchema#date";

    /// `xsd:integer`
    pub const INTEGER: &str = "http://www.w3.org/2001/XMLSchema#integer";
    /// `xsd:long`
    pub const LONG: &str = "http://www.w3.org/2001/XMLSchema#long";
    /// `xsd:int`
    pub const INT: &str = "http://www.w3.org/2001/XMLSchema#int";
    /// `xsd:short`
    pub const SHORT: &str = "http://www.w3.org/2001/XMLSchema#short";
    /// `xsd:byte`
    pub const BYTE: &str = "http://www.w3.org/2001/XMLSchema#byte";
    /// `xsd:nonNegativeInteger`
    pub const NON_NEGATIVE_INTEGER: &str = "http://www.w3.org/2001/XMLSchema#nonNegativeInteger";
    /// `xsd:positiveInteger`
    pub const POSITIVE_INTEGER: &str = "http://www.w3.org/2001/XMLSchema#positiveInteger";
    /// `xsd:nonPositiveInteger`
    pub const NON_POSITIVE_INTEGER: &str = "http://www.w3.org/2001/XMLSchema#nonPositiveInteger";
    /// `xsd:negativeInteger`
    pub const NEGATIVE_INTEGER: &str = "http://www.w3.org/2001/XMLSchema#negativeInteger";
    /// `xsd:unsignedLong`
    pub const UNSIGNED_LONG: &str = "http://www.w3.org/2001/XMLSchema#unsignedLong";
    /// `xsd:unsignedInt`
    pub const UNSIGNED_INT: &str = "http://www.w3.org/2001/XMLSchema#unsignedInt";
    /// `xsd:unsignedShort`
    pub const UNSIGNED_SHORT: &str = "http://www.w3.org/2001/XMLSchema#unsignedShort";
    /// `xsd:unsignedByte`
    pub const UNSIGNED_BYTE: &str = "http://www.w3.org/2001/XMLSchema#unsignedByte";
}

/// `rdf:langString`, the datatype of language-tagged literals.
pub const RDF_LANG_STRING: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#langString";

/// An RDF term.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Term {
    /// An IRI reference.
    Iri(String),
    /// A blank node label.
    Blank(String),
    /// A literal with its lexical form, datatype IRI and optional language tag.
    Literal {
        /// Lexical form, exactly as written.
        lexical: String,
        /// Datatype IRI.
        datatype: String,
        /// Language tag for `rdf:langString` literals.
        lang: Option<String>,
    },
}

impl Term {
    /// IRI term.
    pub fn iri(iri: impl Into<String>) -> Self {
        Term::Iri(iri.into())
    }

    /// Blank node term.
    pub fn blank(label: impl Into<String>) -> Self {
        Term::Blank(label.into())
    }

    /// Typed literal.
    pub fn typed(lexical: impl Into<String>, datatype: impl Into<String>) -> Self {
        Term::Literal {
            lexical: lexical.into(),
            datatype: datatype.into(),
            lang: None,
        }
    }

    /// `xsd:string` literal.
    pub fn string(lexical: impl Into<String>) -> Self {
        Self::typed(lexical, xsd::STRING)
    }

    /// Language-tagged literal.
    pub fn lang_string(lexical: impl Into<String>, lang: impl Into<String>) -> Self {
        Term::Literal {
            lexical: lexical.into(),
            datatype: RDF_LANG_STRING.to_owned(),
            lang: Some(lang.into()),
        }
    }

    /// `xsd:integer` literal in canonical form.
    pub fn integer(value: i64) -> Self {
        Self::typed(value.to_string(), xsd::INTEGER)
    }

    /// `xsd:boolean` literal.
    pub fn boolean(value: bool) -> Self {
        Self::typed(if value { "true" } else { "false" }, xsd::BOOLEAN)
    }

    /// True for literals.
    pub fn is_literal(&self) -> bool {
        matches!(self, Term::Literal { .. })
    }

    /// Lexical form and datatype of a literal without a language tag.
    pub fn typed_parts(&self) -> Option<(&str, &str)> {
        match self {
            Term::Literal {
                lexical,
                datatype,
                lang: None,
            } => Some((lexical, datatype)),
            _ => None,
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Iri(iri) => write!(f, "<{iri}>"),
            Term::Blank(label) => write!(f, "_:{label}"),
            Term::Literal {
                lexical,
                lang: Some(lang),
                ..
            } => write!(f, "{lexical:?}@{lang}"),
            Term::Literal {
                lexical, datatype, ..
            } => match datatype.strip_prefix(xsd::NS) {
                Some(local) => write!(f, "{lexical:?}^^xsd:{local}"),
                None => write!(f, "{lexical:?}^^<{datatype}>"),
            },
        }
    }
}
