//! Fixed-width record dumps produced by `CPYTOIMPF ... DTAFMT(*FIXED)`
//!
//! Every row is the same length and ends in a line feed. Character fields are
//! space padded; a field's value ends at its first space. A row whose library
//! or object field is blank marks the end of the data.

use crate::error::RecordError;

/// Byte range of one character field within a row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub offset: usize,
    pub len: usize,
}

impl Field {
    pub const fn new(offset: usize, len: usize) -> Self {
        Field { offset, len }
    }

    /// Field value up to its first space
    pub fn extract(&self, row: &[u8]) -> String {
        let raw = &row[self.offset..self.offset + self.len];
        let end = raw.iter().position(|&b| b == b' ').unwrap_or(raw.len());
        String::from_utf8_lossy(&raw[..end])
            .trim_end_matches('\0')
            .to_string()
    }
}

/// Where library, object and type live in one kind of dump
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordLayout {
    pub name: &'static str,
    /// Row length including the trailing line feed
    pub width: usize,
    pub library: Field,
    pub object: Field,
    /// `None` when every row of this dump has the same type
    pub kind: Option<Field>,
    pub fixed_kind: &'static str,
}

/// One column of an outfile record format: field name and exported width
type Column = (&'static str, usize);

// QADSPPGM, record format QWHDRPPR (DSPPGMREF)
const QWHDRPPR: &[Column] = &[
    ("WHLIB", 10),
    ("WHPNAM", 10),
    ("WHTEXT", 50),
    ("WHFNUM", 5),
    ("WHDTTM", 13),
    ("WHFNAM", 11),
    ("WHLNAM", 11),
    ("WHSNAM", 10),
    ("WHRFNO", 5),
    ("WHFUSG", 2),
    ("WHRFNM", 10),
    ("WHRFSN", 13),
    ("WHRFFN", 5),
    ("WHOBJT", 1),
    ("WHOTYP", 10),
    ("WHSPKG", 1),
    ("WHSYSN", 8),
];

// QAFDACCP, record format QWHFDACP (DSPFD TYPE(*ACCPTH)), one row per key field
const QWHFDACP: &[Column] = &[
    ("APRCEN", 1),
    ("APRDAT", 6),
    ("APRTIM", 6),
    ("APFILE", 10),
    ("APLIB", 10),
    ("APFTYP", 1),
    ("APFILA", 4),
    ("APMXD", 3),
    ("APFATR", 6),
    ("APSYSN", 8),
    ("APASP", 3),
    ("APRES", 4),
    ("APMANT", 1),
    ("APUNIQ", 1),
    ("APKEYO", 1),
    ("APSELO", 1),
    ("APACCP", 1),
    ("APNSCO", 5),
    ("APBOF", 10),
    ("APBOL", 10),
    ("APBOLF", 10),
    ("APKEYF", 10),
    ("APKSEQ", 1),
    ("APKSIN", 1),
    ("APKZD", 1),
    ("APKASQ", 1),
    ("APNKYF", 5),
];

// QADSPDBR, record format QWHDRDBR (DSPDBR)
const QWHDRDBR: &[Column] = &[
    ("WHRTYP", 1),
    ("WHRFI", 10),
    ("WHRLI", 10),
    ("WHRMB", 10),
    ("WHRRD", 10),
    ("WHNO", 7),
    ("WHDTM", 13),
    ("WHREFI", 10),
    ("WHRELI", 10),
    ("WHREMB", 10),
    ("WHTYPE", 1),
    ("WHJDIL", 4),
    ("WHJREF", 4),
    ("WHSYSN", 8),
    ("WHCTLN", 10),
    ("WHCSTN", 258),
];

const fn same_name(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    let mut i = 0;
    while i < a.len() {
        if a[i] != b[i] {
            return false;
        }
        i += 1;
    }
    true
}

/// Byte range of column `name`: the widths of every earlier column summed
const fn column(format: &[Column], name: &str) -> Field {
    let mut offset = 0;
    let mut i = 0;
    while i < format.len() {
        let (col, len) = format[i];
        if same_name(col, name) {
            return Field::new(offset, len);
        }
        offset += len;
        i += 1;
    }
    panic!("no such column in record format");
}

/// Row length: every column plus the line feed
const fn row_width(format: &[Column]) -> usize {
    let mut width = 1;
    let mut i = 0;
    while i < format.len() {
        width += format[i].1;
        i += 1;
    }
    width
}

/// `DSPPGMREF` outfile: objects a program refers to
pub const PGMREF: RecordLayout = RecordLayout {
    name: "PGMREF",
    width: row_width(QWHDRPPR),
    object: column(QWHDRPPR, "WHFNAM"),
    library: column(QWHDRPPR, "WHLNAM"),
    kind: Some(column(QWHDRPPR, "WHOTYP")),
    fixed_kind: "",
};

/// `DSPFD TYPE(*ACCPTH)` outfile: the file an access path is based on
pub const ACCPTH: RecordLayout = RecordLayout {
    name: "ACCPTH",
    width: row_width(QWHFDACP),
    object: column(QWHFDACP, "APBOF"),
    library: column(QWHFDACP, "APBOL"),
    kind: None,
    fixed_kind: "*FILE",
};

/// `DSPDBR` outfile: files built over a physical file
pub const DBR: RecordLayout = RecordLayout {
    name: "DBR",
    width: row_width(QWHDRDBR),
    object: column(QWHDRDBR, "WHREFI"),
    library: column(QWHDRDBR, "WHRELI"),
    kind: None,
    fixed_kind: "*FILE",
};

/// One decoded row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyRecord {
    pub library: String,
    pub object: String,
    pub kind: String,
}

impl RecordLayout {
    /// Decode rows up to the first blank-key sentinel (or the end of the
    /// buffer). Rows after the sentinel are never looked at.
    pub fn decode(&self, data: &[u8]) -> Result<Vec<DependencyRecord>, RecordError> {
        let mut out = Vec::new();
        let mut offset = 0;
        while offset < data.len() {
            let rest = &data[offset..];
            if rest.len() < self.width {
                return Err(RecordError::Truncated {
                    offset,
                    len: rest.len(),
                    expected: self.width,
                });
            }
            let row = &rest[..self.width];
            if row[self.width - 1] != b'\n' {
                return Err(RecordError::MissingDelimiter { offset });
            }

            let library = self.library.extract(row);
            let object = self.object.extract(row);
            if library.is_empty() || object.is_empty() {
                break;
            }
            let kind = match self.kind {
                Some(field) => field.extract(row),
                None => self.fixed_kind.to_string(),
            };
            out.push(DependencyRecord {
                library,
                object,
                kind,
            });
            offset += self.width;
        }
        Ok(out)
    }

    /// Build one row; the inverse of [`decode`](Self::decode) for one record
    pub fn encode(&self, library: &str, object: &str, kind: &str) -> Vec<u8> {
        let mut row = vec![b' '; self.width];
        row[self.width - 1] = b'\n';
        put(&mut row, self.library, library);
        put(&mut row, self.object, object);
        if let Some(field) = self.kind {
            put(&mut row, field, kind);
        }
        row
    }
}

fn put(row: &mut [u8], field: Field, value: &str) {
    let n = value.len().min(field.len);
    row[field.offset..field.offset + n].copy_from_slice(&value.as_bytes()[..n]);
}
