use color_eyre::Result;
use polars::prelude::*;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use std::io::Cursor;

use super::{ExportFormat, unavailable};

/// Turn a column name into a valid XML element name.
///
/// Characters outside `[A-Za-z0-9_.-]` become `_`; names that cannot start an
/// element (empty, leading digit/`-`/`.`, or an `xml` prefix) get a leading `_`.
pub fn xml_name(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.') { c } else { '_' })
        .collect();
    let bad_start = out
        .chars()
        .next()
        .is_none_or(|c| c.is_ascii_digit() || c == '-' || c == '.');
    if bad_start || out.to_ascii_lowercase().starts_with("xml") {
        out.insert(0, '_');
    }
    out
}

/// `<data><row><col>value</col>...</row>...</data>`; nulls are written as empty elements.
pub(super) fn write_xml(df: &DataFrame) -> Result<Vec<u8>> {
    let fail = |e: &dyn std::fmt::Display| unavailable(ExportFormat::Xml, e);
    let names: Vec<String> = df.get_column_names().iter().map(|n| xml_name(n.as_str())).collect();
    let columns: Vec<&Series> = df.get_columns().iter().map(|c| c.as_materialized_series()).collect();

    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))
        .map_err(|e| fail(&e))?;
    writer
        .write_event(Event::Start(BytesStart::new("data")))
        .map_err(|e| fail(&e))?;
    for idx in 0..df.height() {
        writer
            .write_event(Event::Start(BytesStart::new("row")))
            .map_err(|e| fail(&e))?;
        for (name, series) in names.iter().zip(&columns) {
            let value = series.get(idx)?;
            if value.is_null() {
                writer
                    .write_event(Event::Empty(BytesStart::new(name.as_str())))
                    .map_err(|e| fail(&e))?;
                continue;
            }
            let text = value.str_value();
            writer
                .write_event(Event::Start(BytesStart::new(name.as_str())))
                .map_err(|e| fail(&e))?;
            writer
                .write_event(Event::Text(BytesText::new(text.as_ref())))
                .map_err(|e| fail(&e))?;
            writer
                .write_event(Event::End(BytesEnd::new(name.as_str())))
                .map_err(|e| fail(&e))?;
        }
        writer
            .write_event(Event::End(BytesEnd::new("row")))
            .map_err(|e| fail(&e))?;
    }
    writer
        .write_event(Event::End(BytesEnd::new("data")))
        .map_err(|e| fail(&e))?;
    Ok(writer.into_inner().into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::xml::read_xml;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_xml_name() {
        assert_eq!(xml_name("total amount"), "total_amount");
        assert_eq!(xml_name("2024"), "_2024");
        assert_eq!(xml_name("#"), "_");
        assert_eq!(xml_name("XmlThing"), "_XmlThing");
        assert_eq!(xml_name(""), "_");
        assert_eq!(xml_name("ok.name-1"), "ok.name-1");
    }

    #[test]
    fn test_document_shape() {
        let df = polars::df![
            "id" => [1i64, 2],
            "note" => [Some("a & b"), None],
        ]
        .unwrap();
        let text = String::from_utf8(write_xml(&df).unwrap()).unwrap();
        assert!(text.starts_with("<?xml version=\"1.0\" encoding=\"utf-8\"?>"));
        assert!(text.contains("<note>a &amp; b</note>"));
        assert!(text.contains("<note/>"));

        let back = read_xml("r.xml", text.as_bytes()).unwrap();
        assert_eq!(back.shape(), (2, 2));
        assert_eq!(back.column("note").unwrap().null_count(), 1);
    }
}
