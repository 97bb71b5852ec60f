use std::fmt::{self, Display};

use rust_decimal::Decimal;

/// System assigned identifier of a dimension row.  Never changes once issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SurrogateKey(pub i64);

impl Display for SurrogateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One field of a natural key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyPart {
    Int(i64),
    Text(String),
}

impl Display for KeyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPart::Int(v) => write!(f, "{}", v),
            KeyPart::Text(s) => write!(f, "{:?}", s),
        }
    }
}

impl From<i32> for KeyPart {
    fn from(value: i32) -> Self {
        KeyPart::Int(value.into())
    }
}

impl From<i64> for KeyPart {
    fn from(value: i64) -> Self {
        KeyPart::Int(value)
    }
}

impl From<&str> for KeyPart {
    fn from(value: &str) -> Self {
        KeyPart::Text(value.to_string())
    }
}

impl From<String> for KeyPart {
    fn from(value: String) -> Self {
        KeyPart::Text(value)
    }
}

/// Business identifying fields of a dimension entry, one slot per key column.
/// A slot is `None` when the source did not supply that field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NaturalKey(pub Vec<Option<KeyPart>>);

impl NaturalKey {
    pub fn single(part: impl Into<KeyPart>) -> NaturalKey {
        NaturalKey(vec![Some(part.into())])
    }

    pub fn year(year: i32) -> NaturalKey {
        NaturalKey::single(year)
    }

    pub fn parts(&self) -> &[Option<KeyPart>] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|p| p.is_none())
    }
}

impl Display for NaturalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|p| match p {
                Some(p) => p.to_string(),
                None => "null".to_string(),
            })
            .collect();
        write!(f, "({})", parts.join(", "))
    }
}

/// How a textual key field is cleaned before matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Normalize {
    /// Trim surrounding whitespace.
    Trim,
    /// Trim and upper-case, e.g. ISO country codes.
    TrimUpper,
    /// Trim, and match ignoring case.  The first spelling seen is the one
    /// stored.
    TrimFold,
}

impl Normalize {
    /// Empty text after trimming counts as a missing field.
    pub fn apply(&self, part: Option<&KeyPart>) -> Option<KeyPart> {
        match part? {
            KeyPart::Int(v) => Some(KeyPart::Int(*v)),
            KeyPart::Text(s) => {
                let s = s.trim();
                if s.is_empty() {
                    return None;
                }
                match self {
                    Normalize::Trim | Normalize::TrimFold => Some(KeyPart::Text(s.to_string())),
                    Normalize::TrimUpper => Some(KeyPart::Text(s.to_uppercase())),
                }
            }
        }
    }

    /// The form a normalized field is compared in.
    pub fn match_form(&self, part: &KeyPart) -> KeyPart {
        match (self, part) {
            (Normalize::TrimFold, KeyPart::Text(s)) => KeyPart::Text(s.to_lowercase()),
            _ => part.clone(),
        }
    }
}

/// A value written to a descriptive attribute or measure column.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Int(i64),
    Decimal(Decimal),
    Text(String),
}

impl From<Option<Decimal>> for Scalar {
    fn from(value: Option<Decimal>) -> Self {
        match value {
            Some(d) => Scalar::Decimal(d),
            None => Scalar::Null,
        }
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Text(value.to_string())
    }
}

impl From<KeyPart> for Scalar {
    fn from(value: KeyPart) -> Self {
        match value {
            KeyPart::Int(v) => Scalar::Int(v),
            KeyPart::Text(s) => Scalar::Text(s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_text() {
        let code = KeyPart::from("  ph ");
        assert_eq!(
            Normalize::TrimUpper.apply(Some(&code)),
            Some(KeyPart::from("PH"))
        );
        assert_eq!(
            Normalize::Trim.apply(Some(&code)),
            Some(KeyPart::from("ph"))
        );
        assert_eq!(Normalize::Trim.apply(Some(&KeyPart::from("   "))), None);
        assert_eq!(Normalize::Trim.apply(None), None);
        assert_eq!(
            Normalize::TrimUpper.apply(Some(&KeyPart::Int(2020))),
            Some(KeyPart::Int(2020))
        );
    }

    #[test]
    fn fold_keeps_spelling() {
        let name = KeyPart::from(" Natural Gas ");
        let stored = Normalize::TrimFold.apply(Some(&name));
        assert_eq!(stored, Some(KeyPart::from("Natural Gas")));
        assert_eq!(
            Normalize::TrimFold.match_form(&KeyPart::from("NATURAL GAS")),
            Normalize::TrimFold.match_form(&KeyPart::from("natural gas"))
        );
        assert_eq!(
            Normalize::Trim.match_form(&KeyPart::from("Coal")),
            KeyPart::from("Coal")
        );
    }

    #[test]
    fn display_key() {
        let key = NaturalKey(vec![Some("PH".into()), None]);
        assert_eq!(key.to_string(), "(\"PH\", null)");
        assert!(!key.is_empty());
        assert!(NaturalKey(vec![None, None]).is_empty());
    }
}
