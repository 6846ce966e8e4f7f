use std::fmt::{self, Write as _};
use std::hash::Hash;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Identifier contract the cache is generic over.
///
/// Implementations are pure value transforms: no lookups, no I/O.
pub trait CacheIdentifier: Clone + Eq + Hash + fmt::Debug + Send + Sync {
    /// The part of the identifier that is stable across versions.
    fn object_part(&self) -> String;

    /// The identifier with its database qualifier stripped.
    fn without_db(&self) -> Self;

    /// Canonical string form, used as the key in the database-time index.
    fn index_key(&self) -> String;
}

/// A versioned object identifier: `object`, `object~version` or
/// `object~version@db`.
///
/// The database qualifier records the transaction time at which this
/// particular version became the system's belief.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VersionedId {
    object: String,
    version: Option<String>,
    db: Option<i64>,
}

impl VersionedId {
    /// An unversioned identifier naming only the object.
    pub fn object(object: impl Into<String>) -> Self {
        Self {
            object: object.into(),
            version: None,
            db: None,
        }
    }

    /// An identifier naming one version of an object.
    pub fn versioned(object: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            object: object.into(),
            version: Some(version.into()),
            db: None,
        }
    }

    /// Attach a database qualifier.
    pub fn with_db(mut self, db: i64) -> Self {
        self.db = Some(db);
        self
    }

    pub fn object_name(&self) -> &str {
        &self.object
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn db(&self) -> Option<i64> {
        self.db
    }
}

impl CacheIdentifier for VersionedId {
    fn object_part(&self) -> String {
        self.object.clone()
    }

    fn without_db(&self) -> Self {
        Self {
            object: self.object.clone(),
            version: self.version.clone(),
            db: None,
        }
    }

    fn index_key(&self) -> String {
        self.to_string()
    }
}

/// Writes a component with its separators escaped.
struct Escaped<'a>(&'a str);

impl fmt::Display for Escaped<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for c in self.0.chars() {
            match c {
                '%' => f.write_str("%25")?,
                '~' => f.write_str("%7E")?,
                '@' => f.write_str("%40")?,
                c => f.write_char(c)?,
            }
        }
        Ok(())
    }
}

fn unescape(part: &str, input: &str) -> Result<String, TypeError> {
    let mut out = String::with_capacity(part.len());
    let mut rest = part;
    while let Some(pos) = rest.find('%') {
        out.push_str(&rest[..pos]);
        let c = match rest.get(pos + 1..pos + 3) {
            Some("25") => '%',
            Some("7E") => '~',
            Some("40") => '@',
            _ => return Err(TypeError::Malformed(input.to_string())),
        };
        out.push(c);
        rest = &rest[pos + 3..];
    }
    out.push_str(rest);
    Ok(out)
}

impl fmt::Display for VersionedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Escaped(&self.object))?;
        if let Some(version) = &self.version {
            write!(f, "~{}", Escaped(version))?;
        }
        if let Some(db) = self.db {
            write!(f, "@{db}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for VersionedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VersionedId({self})")
    }
}

/// Parses `object`, `object~version` and either form followed by `@db`.
/// `%`, `~` and `@` inside components are written `%25`, `%7E` and `%40`.
impl FromStr for VersionedId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (body, db) = match s.rsplit_once('@') {
            Some((body, qualifier)) => {
                let db = qualifier
                    .parse::<i64>()
                    .map_err(|_| TypeError::InvalidDbQualifier {
                        input: s.to_string(),
                        qualifier: qualifier.to_string(),
                    })?;
                (body, Some(db))
            }
            None => (s, None),
        };
        if body.contains('@') {
            return Err(TypeError::Malformed(s.to_string()));
        }

        let (object, version) = match body.split_once('~') {
            Some((object, version)) => (object, Some(version)),
            None => (body, None),
        };
        if object.is_empty() {
            return Err(TypeError::EmptyObject(s.to_string()));
        }
        let version = match version {
            Some("") => return Err(TypeError::EmptyVersion(s.to_string())),
            Some(v) if v.contains('~') => return Err(TypeError::Malformed(s.to_string())),
            Some(v) => Some(unescape(v, s)?),
            None => None,
        };

        Ok(Self {
            object: unescape(object, s)?,
            version,
            db,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn display_forms() {
        assert_eq!(VersionedId::object("road/7").to_string(), "road/7");
        assert_eq!(VersionedId::versioned("road/7", "v2").to_string(), "road/7~v2");
        assert_eq!(
            VersionedId::versioned("road/7", "v2").with_db(1_600_000_000_000).to_string(),
            "road/7~v2@1600000000000"
        );
    }

    #[test]
    fn without_db_strips_only_the_qualifier() {
        let id = VersionedId::versioned("road/7", "v2").with_db(42);
        let stripped = id.without_db();
        assert_eq!(stripped, VersionedId::versioned("road/7", "v2"));
        assert_eq!(stripped.object_part(), "road/7");
        assert_eq!(id.object_part(), stripped.object_part());
    }

    #[test]
    fn parse_accepts_all_forms() {
        let id: VersionedId = "http://example.org/ont#Road7~v3@99".parse().unwrap();
        assert_eq!(id.object_name(), "http://example.org/ont#Road7");
        assert_eq!(id.version(), Some("v3"));
        assert_eq!(id.db(), Some(99));

        let plain: VersionedId = "road".parse().unwrap();
        assert_eq!(plain, VersionedId::object("road"));
    }

    #[test]
    fn parse_rejects_malformed() {
        assert_eq!(
            "".parse::<VersionedId>(),
            Err(TypeError::EmptyObject(String::new()))
        );
        assert!(matches!(
            "~v1".parse::<VersionedId>(),
            Err(TypeError::EmptyObject(_))
        ));
        assert!(matches!(
            "road~".parse::<VersionedId>(),
            Err(TypeError::EmptyVersion(_))
        ));
        assert!(matches!(
            "road~v1@soon".parse::<VersionedId>(),
            Err(TypeError::InvalidDbQualifier { .. })
        ));
    }

    #[test]
    fn separators_inside_components_are_escaped() {
        let tilde_object = VersionedId::object("a~b");
        let versioned = VersionedId::versioned("a", "b");
        assert_eq!(tilde_object.to_string(), "a%7Eb");
        assert_ne!(tilde_object.index_key(), versioned.index_key());

        let mail = VersionedId::versioned("mailto:ops@example.org", "50%").with_db(3);
        assert_eq!(mail.to_string(), "mailto:ops%40example.org~50%25@3");
        assert_eq!(mail.to_string().parse::<VersionedId>().unwrap(), mail);
    }

    #[test]
    fn unversioned_id_keeps_its_qualifier() {
        let id = VersionedId::object("x").with_db(5);
        assert_eq!(id.to_string(), "x@5");
        let parsed: VersionedId = "x@5".parse().unwrap();
        assert_eq!(parsed, id);
        assert_eq!(parsed.object_name(), "x");
        assert_eq!(parsed.version(), None);
    }

    #[test]
    fn stray_separators_and_bad_escapes_are_rejected() {
        for input in ["a~b~c", "a@b@1", "a%zz", "a%7e", "a%"] {
            assert_eq!(
                input.parse::<VersionedId>(),
                Err(TypeError::Malformed(input.to_string())),
                "{input}"
            );
        }
    }

    proptest! {
        #[test]
        fn display_then_parse_is_identity(
            object in "[a-z/:.#~@%]{1,24}",
            version in proptest::option::of("[a-z0-9~@%]{1,8}"),
            db in proptest::option::of(any::<i64>()),
        ) {
            let mut id = match version {
                Some(version) => VersionedId::versioned(object, version),
                None => VersionedId::object(object),
            };
            if let Some(db) = db {
                id = id.with_db(db);
            }
            let parsed: VersionedId = id.to_string().parse().unwrap();
            prop_assert_eq!(parsed, id);
        }

        #[test]
        fn distinct_ids_have_distinct_keys(
            a in "[ab~@]{1,4}",
            b in "[ab~@]{1,4}",
        ) {
            let plain = VersionedId::object(format!("{a}~{b}"));
            let versioned = VersionedId::versioned(a, b);
            prop_assert_ne!(plain.index_key(), versioned.index_key());
        }
    }
}
