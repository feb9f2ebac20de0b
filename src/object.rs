//! Object identity (`LIB/OBJ*TYPE`) and the library / type search lists

use std::fmt;
use std::str::FromStr;

use crate::error::ObjectError;

/// Library, object and type names are at most this long on the remote system
pub const MAX_NAME: usize = 10;
/// Library and type lists hold at most this many entries
pub const MAX_LIST: usize = 16;
/// Type used when neither the object nor the type list names one
pub const ALL_TYPES: &str = "*ALL";

/// One unit of work. A missing library means "search the library list",
/// a missing type means "try every type in the type list".
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectRef {
    pub library: Option<String>,
    pub name: String,
    pub kind: Option<String>,
}

impl ObjectRef {
    pub fn new(library: Option<&str>, name: &str, kind: Option<&str>) -> Result<Self, ObjectError> {
        Ok(ObjectRef {
            library: library.map(normalize_name).transpose()?,
            name: normalize_name(name)?,
            kind: kind.map(normalize_type).transpose()?,
        })
    }

    /// The object's own library if it has one, else the configured list in order
    pub fn libraries<'a>(&'a self, list: &'a LibraryList) -> Vec<&'a str> {
        match &self.library {
            Some(lib) => vec![lib.as_str()],
            None => list.iter().collect(),
        }
    }

    /// The object's own type if it has one, else the configured list in order
    pub fn types<'a>(&'a self, list: &'a TypeList) -> Vec<&'a str> {
        match &self.kind {
            Some(kind) => vec![kind.as_str()],
            None => list.effective(),
        }
    }
}

impl FromStr for ObjectRef {
    type Err = ObjectError;

    /// Accepts `LIB/OBJ*TYPE`, `LIB/OBJ`, `OBJ*TYPE` and `OBJ`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let bad = || ObjectError::Parse(s.to_string());

        let (library, rest) = match s.split_once('/') {
            Some((lib, rest)) if lib.is_empty() || rest.contains('/') => return Err(bad()),
            Some((lib, rest)) => (Some(lib), rest),
            None => (None, s),
        };
        let (name, kind) = match rest.split_once('*') {
            Some((_, "")) => return Err(bad()),
            Some((name, kind)) => (name, Some(kind)),
            None => (rest, None),
        };
        if name.is_empty() || name.contains(char::is_whitespace) {
            return Err(bad());
        }
        ObjectRef::new(library, name, kind)
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(lib) = &self.library {
            write!(f, "{}/", lib)?;
        }
        f.write_str(&self.name)?;
        if let Some(kind) = &self.kind {
            f.write_str(kind)?;
        }
        Ok(())
    }
}

/// Ordered, bounded list of library names. Order is the search order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LibraryList(Vec<String>);

impl LibraryList {
    pub fn push(&mut self, name: &str) -> Result<(), ObjectError> {
        if self.0.len() >= MAX_LIST {
            return Err(ObjectError::ListFull { max: MAX_LIST });
        }
        self.0.push(normalize_name(name)?);
        Ok(())
    }

    /// Parse a comma separated list, e.g. `PRODLIB,TESTLIB`
    pub fn parse(list: &str) -> Result<Self, ObjectError> {
        let mut out = LibraryList::default();
        for item in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            out.push(item)?;
        }
        Ok(out)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

/// Ordered, bounded list of object types; empty means `*ALL`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeList(Vec<String>);

impl TypeList {
    pub fn push(&mut self, kind: &str) -> Result<(), ObjectError> {
        if self.0.len() >= MAX_LIST {
            return Err(ObjectError::ListFull { max: MAX_LIST });
        }
        self.0.push(normalize_type(kind)?);
        Ok(())
    }

    pub fn parse(list: &str) -> Result<Self, ObjectError> {
        let mut out = TypeList::default();
        for item in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            out.push(item)?;
        }
        Ok(out)
    }

    pub fn effective(&self) -> Vec<&str> {
        if self.0.is_empty() {
            vec![ALL_TYPES]
        } else {
            self.0.iter().map(String::as_str).collect()
        }
    }
}

/// Upper-case and bound a library or object name
pub fn normalize_name(name: &str) -> Result<String, ObjectError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ObjectError::Parse(name.to_string()));
    }
    if name.chars().count() > MAX_NAME {
        return Err(ObjectError::TooLong {
            name: name.to_string(),
            max: MAX_NAME,
        });
    }
    Ok(name.to_ascii_uppercase())
}

/// Like [`normalize_name`] but guarantees the leading `*` (`pgm` -> `*PGM`)
pub fn normalize_type(kind: &str) -> Result<String, ObjectError> {
    let bare = kind.trim().trim_start_matches('*');
    Ok(format!("*{}", normalize_name(bare)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_forms() {
        let o: ObjectRef = "prodlib/orders*file".parse().unwrap();
        assert_eq!(o.library.as_deref(), Some("PRODLIB"));
        assert_eq!(o.name, "ORDERS");
        assert_eq!(o.kind.as_deref(), Some("*FILE"));
        assert_eq!(o.to_string(), "PRODLIB/ORDERS*FILE");

        let o: ObjectRef = "ORDERS".parse().unwrap();
        assert_eq!(o.library, None);
        assert_eq!(o.kind, None);

        let o: ObjectRef = "QGPL/MYPGM".parse().unwrap();
        assert_eq!(o.to_string(), "QGPL/MYPGM");

        let o: ObjectRef = "MYPGM*pgm".parse().unwrap();
        assert_eq!(o.to_string(), "MYPGM*PGM");
    }

    #[test]
    fn test_parse_rejects() {
        for bad in ["", "/OBJ", "LIB/", "A/B/C", "OBJ*", "*PGM", "MY OBJ"] {
            assert!(bad.parse::<ObjectRef>().is_err(), "accepted {:?}", bad);
        }
        assert!(matches!(
            "LIB/ABCDEFGHIJK".parse::<ObjectRef>(),
            Err(ObjectError::TooLong { max: 10, .. })
        ));
    }

    #[test]
    fn test_effective_search_order() {
        let libs = LibraryList::parse("l1, l2").unwrap();
        let types = TypeList::default();
        let o: ObjectRef = "ORDERS".parse().unwrap();
        assert_eq!(o.libraries(&libs), vec!["L1", "L2"]);
        assert_eq!(o.types(&types), vec!["*ALL"]);

        let o: ObjectRef = "PRODLIB/ORDERS*FILE".parse().unwrap();
        assert_eq!(o.libraries(&libs), vec!["PRODLIB"]);
        assert_eq!(o.types(&TypeList::parse("*PGM").unwrap()), vec!["*FILE"]);
    }

    #[test]
    fn test_list_bound() {
        let mut libs = LibraryList::default();
        for i in 0..MAX_LIST {
            libs.push(&format!("LIB{}", i)).unwrap();
        }
        assert!(matches!(
            libs.push("ONEMORE"),
            Err(ObjectError::ListFull { max: 16 })
        ));
        assert_eq!(libs.len(), 16);

        let types = TypeList::parse("pgm,*srvpgm").unwrap();
        assert_eq!(types.effective(), vec!["*PGM", "*SRVPGM"]);
    }
}
