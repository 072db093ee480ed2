//! Column-oriented tables and the tab-separated wire format.
//!
//! Reads use `TSVWithNamesAndTypes`: a row of column names, a row of type
//! names, then one line per row. Fields are escaped with the same table the
//! [`escape`](crate::escape) module applies, so tabs and newlines never appear
//! raw inside a field. Array fields are array literals whose strings are
//! already quoted and escaped; they get no second layer.

use chrono::{NaiveDate, NaiveDateTime};
use std::num::IntErrorKind;

use crate::decoder::ArrayLiteralDecoder;
use crate::error::{Error, Result};
use crate::escape::{escape_str, Quote};
use crate::unescape::decode_escapes;
use crate::value::Value;

/// Marker for a NULL field.
pub const TSV_NULL: &str = "\\N";

/// A named column of values.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    /// Type name as reported by the server; `None` for locally built columns.
    pub type_name: Option<String>,
    pub values: Vec<Value>,
}

impl Column {
    pub fn new(name: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            type_name: None,
            values,
        }
    }

    pub fn typed(name: impl Into<String>, type_name: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            type_name: Some(type_name.into()),
            values,
        }
    }
}

/// A set of equally long columns.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    columns: Vec<Column>,
}

impl Table {
    /// Build a table; every column must hold the same number of values.
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        if let Some(first) = columns.first() {
            let rows = first.values.len();
            if let Some(bad) = columns.iter().find(|c| c.values.len() != rows) {
                return Err(Error::Shape(format!(
                    "column '{}' has {} values, expected {}",
                    bad.name,
                    bad.values.len(),
                    rows
                )));
            }
        }
        Ok(Self { columns })
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn num_rows(&self) -> usize {
        self.columns.first().map_or(0, |c| c.values.len())
    }

    pub fn is_empty(&self) -> bool {
        self.num_rows() == 0
    }

    /// Parse a `TSVWithNamesAndTypes` response body.
    pub fn from_tsv_with_names_and_types(body: &[u8], decoder: &ArrayLiteralDecoder) -> Result<Self> {
        let text = std::str::from_utf8(body)
            .map_err(|e| Error::InvalidValue(format!("response is not UTF-8: {}", e)))?;
        let mut lines = text.split('\n');

        let names = match lines.next() {
            Some(line) if !line.is_empty() => split_fields(line),
            _ => return Ok(Self::default()),
        };
        let types = lines
            .next()
            .map(split_fields)
            .ok_or_else(|| Error::Shape("missing type row".to_string()))?;
        if names.len() != types.len() {
            return Err(Error::Shape(format!(
                "{} column names but {} type names",
                names.len(),
                types.len()
            )));
        }

        let mut columns: Vec<Column> = names
            .into_iter()
            .zip(types)
            .map(|(name, type_name)| Column::typed(name, type_name, Vec::new()))
            .collect();

        for (row, line) in lines.enumerate() {
            if line.is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() != columns.len() {
                return Err(Error::Shape(format!(
                    "row {} has {} fields, expected {}",
                    row,
                    fields.len(),
                    columns.len()
                )));
            }
            for (column, field) in columns.iter_mut().zip(fields) {
                let type_name = column.type_name.as_deref().unwrap_or("String");
                let value = convert_field(field, type_name, decoder)
                    .map_err(|e| Error::conversion(&column.name, type_name, field, e))?;
                column.values.push(value);
            }
        }

        let table = Self { columns };
        tracing::debug!(
            "Parsed {} rows x {} columns",
            table.num_rows(),
            table.columns.len()
        );
        Ok(table)
    }

    /// Render rows as TSV for `INSERT ... FORMAT TSV`.
    pub fn to_tsv(&self) -> String {
        let mut out = String::new();
        for row in 0..self.num_rows() {
            for (i, column) in self.columns.iter().enumerate() {
                if i > 0 {
                    out.push('\t');
                }
                write_field(&column.values[row], &mut out);
            }
            out.push('\n');
        }
        out
    }

    /// One JSON object per row, keyed by column name.
    pub fn to_json_rows(&self) -> Vec<serde_json::Map<String, serde_json::Value>> {
        (0..self.num_rows())
            .map(|row| {
                self.columns
                    .iter()
                    .map(|c| (c.name.clone(), c.values[row].clone().into()))
                    .collect()
            })
            .collect()
    }
}

/// Build a table from row-major values.
pub fn rows_to_table(names: &[&str], rows: Vec<Vec<Value>>) -> Result<Table> {
    let mut columns: Vec<Column> = names
        .iter()
        .map(|name| Column::new(*name, Vec::with_capacity(rows.len())))
        .collect();
    for (i, row) in rows.into_iter().enumerate() {
        if row.len() != columns.len() {
            return Err(Error::Shape(format!(
                "row {} has {} values, expected {}",
                i,
                row.len(),
                columns.len()
            )));
        }
        for (column, value) in columns.iter_mut().zip(row) {
            column.values.push(value);
        }
    }
    Table::new(columns)
}

/// Flatten a table back into row-major values.
pub fn table_to_rows(table: &Table) -> Vec<Vec<Value>> {
    (0..table.num_rows())
        .map(|row| table.columns.iter().map(|c| c.values[row].clone()).collect())
        .collect()
}

fn split_fields(line: &str) -> Vec<String> {
    line.split('\t').map(|f| decode_escapes(f).into_owned()).collect()
}

/// Strip a single `Wrapper(...)` around a type name.
fn unwrap_type<'a>(type_name: &'a str, wrapper: &str) -> Option<&'a str> {
    type_name
        .strip_prefix(wrapper)?
        .strip_prefix('(')?
        .strip_suffix(')')
}

/// Convert one raw (still escaped) field according to its column type.
pub fn convert_field(field: &str, type_name: &str, decoder: &ArrayLiteralDecoder) -> Result<Value> {
    if let Some(inner) = unwrap_type(type_name, "LowCardinality") {
        return convert_field(field, inner, decoder);
    }
    if let Some(inner) = unwrap_type(type_name, "Nullable") {
        if field == TSV_NULL {
            return Ok(Value::Null);
        }
        return convert_field(field, inner, decoder);
    }

    // Array literals carry their own quoting and are written without field escaping
    if type_name.starts_with("Array(") {
        return decoder.decode_array(field);
    }
    let text = decode_escapes(field);
    if type_name.starts_with("Int") || type_name.starts_with("UInt") {
        return match text.parse::<i64>() {
            Ok(n) => Ok(Value::Int(n)),
            Err(e) if matches!(e.kind(), IntErrorKind::PosOverflow | IntErrorKind::NegOverflow) => {
                tracing::warn!(
                    "{} value {} exceeds i64, decoding as float with lost precision",
                    type_name,
                    text
                );
                parse_float(&text)
            }
            Err(e) => Err(Error::InvalidValue(format!("not an integer: '{}' ({})", text, e))),
        };
    }
    if type_name.starts_with("Float") || type_name.starts_with("Decimal") {
        return parse_float(&text);
    }
    if type_name == "Date" || type_name == "Date32" {
        return NaiveDate::parse_from_str(&text, "%Y-%m-%d")
            .map(Value::Date)
            .map_err(|e| Error::InvalidValue(e.to_string()));
    }
    if type_name.starts_with("DateTime") {
        return NaiveDateTime::parse_from_str(&text, "%Y-%m-%d %H:%M:%S%.f")
            .map(Value::DateTime)
            .map_err(|e| Error::InvalidValue(e.to_string()));
    }
    Ok(Value::Str(text.into_owned()))
}

fn parse_float(text: &str) -> Result<Value> {
    text.parse::<f64>()
        .map(Value::Float)
        .map_err(|_| Error::InvalidValue(format!("not a number: '{}'", text)))
}

fn write_field(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str(TSV_NULL),
        Value::Str(s) => out.push_str(&escape_str(s, Quote::None)),
        Value::Int(_) | Value::Float(_) => out.push_str(&value.to_literal()),
        Value::Date(_) | Value::DateTime(_) => out.push_str(&value.to_string()),
        Value::Array(_) | Value::Map(_) => out.push_str(&value.to_literal()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn decoder() -> ArrayLiteralDecoder {
        ArrayLiteralDecoder::default()
    }

    #[test]
    fn test_parse_typed_tsv() {
        let body = b"id\tname\ttags\tscore\nUInt32\tString\tArray(String)\tNullable(Float64)\n\
1\tal\\tice\t['a','b\\'c']\t0.5\n2\tbob\t[]\t\\N\n";
        let table = Table::from_tsv_with_names_and_types(body, &decoder()).unwrap();
        assert_eq!(table.num_rows(), 2);
        assert_eq!(table.column_names().collect::<Vec<_>>(), ["id", "name", "tags", "score"]);
        assert_eq!(table.column("id").unwrap().values, vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(
            table.column("name").unwrap().values,
            vec![Value::from("al\tice"), Value::from("bob")]
        );
        assert_eq!(
            table.column("tags").unwrap().values,
            vec![Value::from(vec!["a", "b'c"]), Value::Array(vec![])]
        );
        assert_eq!(
            table.column("score").unwrap().values,
            vec![Value::Float(0.5), Value::Null]
        );
    }

    #[test]
    fn test_parse_dates() {
        let body = b"d\tts\nDate\tDateTime('UTC')\n2024-03-01\t2024-03-01 12:30:00\n";
        let table = Table::from_tsv_with_names_and_types(body, &decoder()).unwrap();
        let d = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(table.column("d").unwrap().values, vec![Value::Date(d)]);
        assert_eq!(
            table.column("ts").unwrap().values,
            vec![Value::DateTime(d.and_hms_opt(12, 30, 0).unwrap())]
        );
    }

    #[test]
    fn test_bad_array_reports_column() {
        let body = b"tags\nArray(Int64)\n[1,2\n";
        let err = Table::from_tsv_with_names_and_types(body, &decoder()).unwrap_err();
        match err {
            Error::Conversion { column, field, source, .. } => {
                assert_eq!(column, "tags");
                assert_eq!(field, "[1,2");
                assert!(matches!(*source, Error::MalformedLiteral { .. }));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_ragged_rows_rejected() {
        let body = b"a\tb\nInt8\tInt8\n1\n";
        assert!(matches!(
            Table::from_tsv_with_names_and_types(body, &decoder()),
            Err(Error::Shape(_))
        ));
        assert!(matches!(
            rows_to_table(&["a", "b"], vec![vec![Value::Int(1)]]),
            Err(Error::Shape(_))
        ));
    }

    #[test]
    fn test_empty_body() {
        let table = Table::from_tsv_with_names_and_types(b"", &decoder()).unwrap();
        assert!(table.is_empty());
        assert_eq!(table.columns().len(), 0);
    }

    #[test]
    fn test_rows_round_trip() {
        let rows = vec![
            vec![Value::Int(1), Value::from("x")],
            vec![Value::Int(2), Value::Null],
        ];
        let table = rows_to_table(&["n", "s"], rows.clone()).unwrap();
        assert_eq!(table.num_rows(), 2);
        assert_eq!(table_to_rows(&table), rows);
    }

    #[test]
    fn test_to_tsv() {
        let table = rows_to_table(
            &["n", "s", "arr"],
            vec![
                vec![Value::Int(1), Value::from("a\tb"), Value::from(vec!["x'y"])],
                vec![Value::Float(2.0), Value::Null, Value::Array(vec![])],
            ],
        )
        .unwrap();
        assert_eq!(table.to_tsv(), "1\ta\\tb\t['x\\'y']\n2.0\t\\N\t[]\n");
    }

    #[test]
    fn test_tsv_write_then_read() {
        let table = Table::new(vec![
            Column::typed("s", "String", vec![Value::from("multi\nline\\")]),
            Column::typed("a", "Array(String)", vec![Value::from(vec!["q'uote", "t\tab"])]),
        ])
        .unwrap();
        let body = format!("s\ta\nString\tArray(String)\n{}", table.to_tsv());
        let parsed = Table::from_tsv_with_names_and_types(body.as_bytes(), &decoder()).unwrap();
        assert_eq!(parsed, table);
    }

    #[test]
    fn test_json_rows() {
        let table = rows_to_table(&["n", "tags"], vec![vec![Value::Int(7), Value::from(vec!["a"])]]).unwrap();
        let rows = table.to_json_rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["n"], serde_json::json!(7));
        assert_eq!(rows[0]["tags"], serde_json::json!(["a"]));
    }

    #[test]
    fn test_integers_beyond_i64() {
        let v = convert_field("18446744073709551615", "UInt64", &decoder()).unwrap();
        assert_eq!(v, Value::Float(u64::MAX as f64));
        let v = convert_field("-170141183460469231731687303715884105728", "Int128", &decoder()).unwrap();
        assert!(matches!(v, Value::Float(x) if x < i64::MIN as f64));
        assert_eq!(
            convert_field("9223372036854775807", "UInt64", &decoder()).unwrap(),
            Value::Int(i64::MAX)
        );
    }

    #[test]
    fn test_non_integer_in_integer_column() {
        assert!(matches!(
            convert_field("1.5", "Int32", &decoder()),
            Err(Error::InvalidValue(_))
        ));
        assert!(matches!(
            convert_field("abc", "UInt8", &decoder()),
            Err(Error::InvalidValue(_))
        ));
    }

    #[test]
    fn test_low_cardinality_nullable() {
        let v = convert_field("\\N", "LowCardinality(Nullable(String))", &decoder()).unwrap();
        assert_eq!(v, Value::Null);
        let v = convert_field("x", "LowCardinality(String)", &decoder()).unwrap();
        assert_eq!(v, Value::from("x"));
    }
}
