use std::io::{BufRead, Write};

use crate::error::{Error, Result};
use crate::reader::Reader;
use crate::writer::Writer;

/// The type a schema field expects. `List` and `Optional` nest recursively,
/// mirroring the `list-of<kind>` / `optional<kind>` kinds from §4.1.
#[derive(Debug, Clone)]
pub enum FieldKind {
    Word,
    Number,
    String,
    Bool,
    List(Box<FieldKind>),
    Optional(Box<FieldKind>),
}

impl FieldKind {
    pub fn list_of(kind: FieldKind) -> Self {
        FieldKind::List(Box::new(kind))
    }

    pub fn optional(kind: FieldKind) -> Self {
        FieldKind::Optional(Box::new(kind))
    }
}

/// One entry in a command's argument schema.
#[derive(Debug, Clone)]
pub struct Field {
    pub name: &'static str,
    pub kind: FieldKind,
}

impl Field {
    pub const fn new(name: &'static str, kind: FieldKind) -> Self {
        Self { name, kind }
    }
}

/// A value read off the wire according to a [`FieldKind`]. This is the
/// dynamic representation the schema reader produces; command handlers
/// immediately convert a [`Record`] into their own typed argument struct
/// rather than carrying `Value`s around.
#[derive(Debug, Clone)]
pub enum Value {
    Word(String),
    Number(i64),
    String(Vec<u8>),
    Bool(bool),
    List(Vec<Value>),
    Absent,
}

impl Value {
    pub fn as_word(&self) -> Result<&str> {
        match self {
            Value::Word(w) => Ok(w),
            _ => Err(Error::Malformed(format!("expected word, found {:?}", self))),
        }
    }

    pub fn as_number(&self) -> Result<i64> {
        match self {
            Value::Number(n) => Ok(*n),
            _ => Err(Error::Malformed(format!("expected number, found {:?}", self))),
        }
    }

    pub fn as_bytes(&self) -> Result<&[u8]> {
        match self {
            Value::String(s) => Ok(s),
            _ => Err(Error::Malformed(format!("expected string, found {:?}", self))),
        }
    }

    pub fn as_bool(&self) -> Result<bool> {
        match self {
            Value::Bool(b) => Ok(*b),
            _ => Err(Error::Malformed(format!("expected bool, found {:?}", self))),
        }
    }

    pub fn as_list(&self) -> Result<&[Value]> {
        match self {
            Value::List(items) => Ok(items),
            _ => Err(Error::Malformed(format!("expected list, found {:?}", self))),
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Value::Absent)
    }
}

/// A record of values read according to a schema, indexed by field name.
#[derive(Debug, Clone, Default)]
pub struct Record {
    fields: Vec<(&'static str, Value)>,
}

impl Record {
    pub fn get(&self, name: &'static str) -> Result<&Value> {
        self.fields
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v)
            .ok_or(Error::MissingField(name))
    }

    pub fn required(&self, name: &'static str) -> Result<&Value> {
        match self.get(name)? {
            Value::Absent => Err(Error::MissingField(name)),
            v => Ok(v),
        }
    }
}

/// Reads a parenthesised list from `reader` according to `schema`, producing
/// a typed [`Record`]. Missing trailing optional fields become
/// [`Value::Absent`]; any fields beyond the schema's length are consumed and
/// discarded without being recorded.
pub fn read_record<R: BufRead>(reader: &mut Reader<R>, schema: &[Field]) -> Result<Record> {
    reader.list_start()?;

    let mut fields = Vec::with_capacity(schema.len());
    for field in schema {
        if matches!(field.kind, FieldKind::Optional(_)) && reader.at_list_end()? {
            fields.push((field.name, Value::Absent));
            continue;
        }

        let value = read_value(reader, &field.kind)?;
        fields.push((field.name, value));
    }

    // Extra trailing fields are discarded, per §4.1.
    while !reader.at_list_end()? {
        reader.skip_item()?;
    }
    reader.list_end()?;

    Ok(Record { fields })
}

fn read_value<R: BufRead>(reader: &mut Reader<R>, kind: &FieldKind) -> Result<Value> {
    match kind {
        FieldKind::Word => Ok(Value::Word(reader.word()?)),
        FieldKind::Number => Ok(Value::Number(reader.number()?)),
        FieldKind::String => Ok(Value::String(reader.byte_string()?)),
        FieldKind::Bool => Ok(Value::Bool(reader.word()? == "true")),
        FieldKind::Optional(inner) => {
            if reader.at_list_end()? {
                Ok(Value::Absent)
            } else {
                read_value(reader, inner)
            }
        }
        FieldKind::List(inner) => {
            reader.list_start()?;
            let mut items = Vec::new();
            while !reader.at_list_end()? {
                items.push(read_value(reader, inner)?);
            }
            reader.list_end()?;
            Ok(Value::List(items))
        }
    }
}

/// Writes a parenthesised list of `values` to `writer`, the dual of
/// [`read_record`]. Callers build the `Value` list in schema order; a
/// trailing run of [`Value::Absent`] may be omitted entirely, matching how
/// the reader treats missing optional fields.
pub fn write_values<W: Write>(writer: &mut Writer<W>, values: &[Value]) -> Result<()> {
    writer.list_start()?;
    for value in values {
        write_value(writer, value)?;
    }
    writer.list_end()?;
    Ok(())
}

fn write_value<W: Write>(writer: &mut Writer<W>, value: &Value) -> Result<()> {
    match value {
        Value::Word(w) => {
            writer.word(w)?;
        }
        Value::Number(n) => {
            writer.number(*n)?;
        }
        Value::String(s) => {
            writer.byte_string(s)?;
        }
        Value::Bool(b) => {
            writer.boolean(*b)?;
        }
        Value::List(items) => {
            write_values(writer, items)?;
        }
        Value::Absent => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn test_read_record_with_trailing_optional_absent() -> anyhow::Result<()> {
        let schema = [
            Field::new("path", FieldKind::String),
            Field::new("rev", FieldKind::optional(FieldKind::Number)),
        ];

        let mut reader = Reader::new(Cursor::new(&b"( 4:/foo )"[..]));
        let record = read_record(&mut reader, &schema)?;

        assert_eq!(record.required("path")?.as_bytes()?, b"/foo");
        assert!(record.get("rev")?.is_absent());
        Ok(())
    }

    #[test]
    fn test_read_record_discards_extra_trailing_fields() -> anyhow::Result<()> {
        let schema = [Field::new("path", FieldKind::String)];

        let mut reader = Reader::new(Cursor::new(&b"( 4:/foo 99 extra-word )"[..]));
        let record = read_record(&mut reader, &schema)?;

        assert_eq!(record.required("path")?.as_bytes()?, b"/foo");
        Ok(())
    }

    #[test]
    fn test_read_record_missing_required_field_errors() {
        let schema = [
            Field::new("path", FieldKind::String),
            Field::new("rev", FieldKind::Number),
        ];

        let mut reader = Reader::new(Cursor::new(&b"( 4:/foo )"[..]));
        assert!(read_record(&mut reader, &schema).is_err());
    }

    #[test]
    fn test_read_list_of_numbers() -> anyhow::Result<()> {
        let schema = [Field::new("revs", FieldKind::list_of(FieldKind::Number))];

        let mut reader = Reader::new(Cursor::new(&b"( ( 1 2 3 ) )"[..]));
        let record = read_record(&mut reader, &schema)?;

        let items = record.required("revs")?.as_list()?;
        assert_eq!(items.len(), 3);
        Ok(())
    }
}
