//! Label filter expressions
//!
//! - `key=value`  label equals value
//! - `key!=value` label absent or different
//! - `key=`       label absent
//! - `key!=`      label present with any value

use crate::{Result, SeriesError};
use std::fmt;
use std::str::FromStr;

/// One predicate over a series' labels
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelFilter {
    Equal { key: String, value: String },
    NotEqual { key: String, value: String },
    Absent { key: String },
    Present { key: String },
}

impl LabelFilter {
    /// Label key the filter inspects
    pub fn key(&self) -> &str {
        match self {
            LabelFilter::Equal { key, .. }
            | LabelFilter::NotEqual { key, .. }
            | LabelFilter::Absent { key }
            | LabelFilter::Present { key } => key,
        }
    }

    /// Whether the filter can seed a candidate set
    pub fn is_positive(&self) -> bool {
        matches!(self, LabelFilter::Equal { .. })
    }

    /// Parse several filter expressions
    pub fn parse_all<S: AsRef<str>>(exprs: &[S]) -> Result<Vec<LabelFilter>> {
        exprs.iter().map(|e| e.as_ref().parse()).collect()
    }
}

impl FromStr for LabelFilter {
    type Err = SeriesError;

    fn from_str(s: &str) -> Result<Self> {
        let (key, value, negated) = match s.find("!=") {
            Some(pos) => (&s[..pos], &s[pos + 2..], true),
            None => match s.find('=') {
                Some(pos) => (&s[..pos], &s[pos + 1..], false),
                None => {
                    return Err(SeriesError::InvalidFilter(format!(
                        "{} is not of the form key=value or key!=value",
                        s
                    )))
                }
            },
        };
        if key.is_empty() {
            return Err(SeriesError::InvalidFilter(format!("{} has an empty label key", s)));
        }

        let key = key.to_string();
        let filter = match (negated, value.is_empty()) {
            (false, false) => LabelFilter::Equal {
                key,
                value: value.to_string(),
            },
            (false, true) => LabelFilter::Absent { key },
            (true, false) => LabelFilter::NotEqual {
                key,
                value: value.to_string(),
            },
            (true, true) => LabelFilter::Present { key },
        };
        Ok(filter)
    }
}

impl fmt::Display for LabelFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LabelFilter::Equal { key, value } => write!(f, "{}={}", key, value),
            LabelFilter::NotEqual { key, value } => write!(f, "{}!={}", key, value),
            LabelFilter::Absent { key } => write!(f, "{}=", key),
            LabelFilter::Present { key } => write!(f, "{}!=", key),
        }
    }
}
