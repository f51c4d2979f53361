//! Snapshot sync: serialization and validation of CRDT change tuples.
//!
//! A changeset is a finite ordered sequence of 8-tuples
//! `(table, pk, col_version, db_version, site_id, cl, seq, value)`. The
//! version and site columns are arbitrary-precision integers; JSON has no
//! lossless representation for those, so the wire format encodes them as
//! `"BIGINT::<decimal>"` strings. An empty changeset serializes to `"[]"`.

use crate::error::{Error, Result};
use num_bigint::BigInt;
use serde_json::Value;

/// Per-column version of a changed cell.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ColVersion(pub BigInt);

/// Database-wide version the change was committed at.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct DbVersion(pub BigInt);

/// Stable identifier of the site (replica) that produced the change.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SiteId(pub BigInt);

macro_rules! bigint_newtype {
    ($name:ident) => {
        impl $name {
            pub fn new(value: impl Into<BigInt>) -> Self {
                Self(value.into())
            }

            pub fn as_bigint(&self) -> &BigInt {
                &self.0
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(BigInt::from(value))
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

bigint_newtype!(ColVersion);
bigint_newtype!(DbVersion);
bigint_newtype!(SiteId);

/// One CRDT change tuple as produced and consumed by the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    pub table: String,
    pub pk: Value,
    pub col_version: ColVersion,
    pub db_version: DbVersion,
    pub site_id: SiteId,
    pub cl: i64,
    pub seq: i64,
    pub value: Value,
}

const BIGINT_PREFIX: &str = "BIGINT::";

fn encode_bigint(value: &BigInt) -> Value {
    Value::String(format!("{BIGINT_PREFIX}{value}"))
}

fn decode_bigint(value: &Value) -> Result<BigInt> {
    match value {
        Value::String(text) => {
            let digits = text
                .strip_prefix(BIGINT_PREFIX)
                .ok_or(Error::InvalidChangeset)?;
            digits.parse::<BigInt>().map_err(|_| Error::InvalidChangeset)
        }
        // Small integers survive a JSON round trip unencoded; accept them.
        Value::Number(number) => number
            .as_i64()
            .map(BigInt::from)
            .ok_or(Error::InvalidChangeset),
        _ => Err(Error::InvalidChangeset),
    }
}

fn decode_i64(value: &Value) -> Result<i64> {
    value.as_i64().ok_or(Error::InvalidChangeset)
}

impl Change {
    fn to_wire(&self) -> Value {
        Value::Array(vec![
            Value::String(self.table.clone()),
            self.pk.clone(),
            encode_bigint(&self.col_version.0),
            encode_bigint(&self.db_version.0),
            encode_bigint(&self.site_id.0),
            Value::from(self.cl),
            Value::from(self.seq),
            self.value.clone(),
        ])
    }

    fn from_wire(tuple: &Value) -> Result<Self> {
        let fields = match tuple {
            Value::Array(fields) if fields.len() == 8 => fields,
            _ => return Err(Error::InvalidChangeset),
        };
        let table = fields[0]
            .as_str()
            .ok_or(Error::InvalidChangeset)?
            .to_string();
        Ok(Change {
            table,
            pk: fields[1].clone(),
            col_version: ColVersion(decode_bigint(&fields[2])?),
            db_version: DbVersion(decode_bigint(&fields[3])?),
            site_id: SiteId(decode_bigint(&fields[4])?),
            cl: decode_i64(&fields[5])?,
            seq: decode_i64(&fields[6])?,
            value: fields[7].clone(),
        })
    }
}

/// Serialize `changes` into the JSON wire format.
pub fn stringify_changes(changes: &[Change]) -> String {
    let tuples: Vec<Value> = changes.iter().map(Change::to_wire).collect();
    Value::Array(tuples).to_string()
}

/// Parse and validate a changeset from its JSON wire format.
///
/// The input must be a JSON array whose every element is an array of length
/// exactly 8; anything else is [`Error::InvalidChangeset`].
pub fn parse_changes(text: &str) -> Result<Vec<Change>> {
    let parsed: Value = serde_json::from_str(text).map_err(|_| Error::InvalidChangeset)?;
    let tuples = match parsed {
        Value::Array(tuples) => tuples,
        _ => return Err(Error::InvalidChangeset),
    };
    tuples.iter().map(Change::from_wire).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Change {
        Change {
            table: "users".to_string(),
            pk: json!("1"),
            col_version: ColVersion::from(1),
            db_version: DbVersion::from(42),
            site_id: SiteId::new("340282366920938463463374607431768211455".parse::<BigInt>().unwrap()),
            cl: 1,
            seq: 0,
            value: json!({"id": "1", "name": "Alice"}),
        }
    }

    #[test]
    fn empty_changeset_is_the_empty_array() {
        assert_eq!(stringify_changes(&[]), "[]");
        assert!(parse_changes("[]").unwrap().is_empty());
    }

    #[test]
    fn round_trip_preserves_bigints() {
        let changes = vec![sample()];
        let text = stringify_changes(&changes);
        assert!(text.contains("BIGINT::340282366920938463463374607431768211455"));
        let parsed = parse_changes(&text).unwrap();
        assert_eq!(parsed, changes);
    }

    #[test]
    fn negative_versions_survive() {
        let mut change = sample();
        change.db_version = DbVersion::from(-7);
        let parsed = parse_changes(&stringify_changes(&[change.clone()])).unwrap();
        assert_eq!(parsed[0].db_version, DbVersion::from(-7));
    }

    #[test]
    fn plain_numbers_are_accepted_for_version_fields() {
        let text = r#"[["t","pk",1,2,3,1,0,{"id":"pk"}]]"#;
        let parsed = parse_changes(text).unwrap();
        assert_eq!(parsed[0].col_version, ColVersion::from(1));
        assert_eq!(parsed[0].db_version, DbVersion::from(2));
        assert_eq!(parsed[0].site_id, SiteId::from(3));
    }

    #[test]
    fn rejects_non_json() {
        assert!(matches!(
            parse_changes("this is not json"),
            Err(Error::InvalidChangeset)
        ));
    }

    #[test]
    fn rejects_non_array() {
        assert!(matches!(
            parse_changes(r#"{"not": "an array"}"#),
            Err(Error::InvalidChangeset)
        ));
    }

    #[test]
    fn rejects_short_tuples() {
        let err = parse_changes(r#"[["t","pk",1,2,3]]"#).unwrap_err();
        assert!(err
            .to_string()
            .contains("Invalid changeset format."));
    }

    #[test]
    fn rejects_malformed_bigint_strings() {
        let text = r#"[["t","pk","BIGINT::not-a-number",2,3,1,0,null]]"#;
        assert!(matches!(
            parse_changes(text),
            Err(Error::InvalidChangeset)
        ));
    }
}
