//! GDAL band metadata (TIFF tag 42112)
//!
//! GDAL stores band descriptions as XML items with `role="description"`
//! and a zero-based `sample` attribute:
//! ```text
//! <GDALMetadata>
//!   <Item name="DESCRIPTION" sample="0" role="description">pm25 - 2024-03-01</Item>
//! </GDALMetadata>
//! ```

use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// Render band descriptions; `None` when no band carries one.
pub(crate) fn encode_descriptions<'a, I>(descriptions: I) -> Option<String>
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    let mut xml = String::from("<GDALMetadata>\n");
    let mut any = false;
    for (sample, desc) in descriptions.into_iter().enumerate() {
        if let Some(desc) = desc {
            any = true;
            xml.push_str(&format!(
                "  <Item name=\"DESCRIPTION\" sample=\"{}\" role=\"description\">{}</Item>\n",
                sample,
                escape(desc)
            ));
        }
    }
    xml.push_str("</GDALMetadata>");
    any.then_some(xml)
}

/// Parse band descriptions keyed by zero-based sample index.
pub(crate) fn decode_descriptions(xml: &str) -> Result<BTreeMap<usize, String>> {
    let mut reader = Reader::from_str(xml);
    let mut out = BTreeMap::new();
    let mut current: Option<usize> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.name().as_ref() == b"Item" => {
                let mut is_description = false;
                let mut sample = None;
                for attr in e.attributes().flatten() {
                    let value = attr
                        .unescape_value()
                        .map_err(|err| Error::Tiff(format!("GDAL metadata: {}", err)))?;
                    match attr.key.as_ref() {
                        b"role" => is_description = value == "description",
                        b"sample" => sample = value.parse::<usize>().ok(),
                        _ => {}
                    }
                }
                current = if is_description { sample } else { None };
            }
            Ok(Event::Text(text)) => {
                if let Some(sample) = current {
                    let value = text
                        .unescape()
                        .map_err(|err| Error::Tiff(format!("GDAL metadata: {}", err)))?;
                    out.insert(sample, value.into_owned());
                }
            }
            Ok(Event::End(_)) => current = None,
            Ok(Event::Eof) => break,
            Err(err) => return Err(Error::Tiff(format!("GDAL metadata: {}", err))),
            _ => {}
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptions_roundtrip_with_escaping() {
        let xml = encode_descriptions([Some("T2M - 2024-01-01"), None, Some("a < b & c")]).unwrap();
        let parsed = decode_descriptions(&xml).unwrap();

        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[&0], "T2M - 2024-01-01");
        assert_eq!(parsed[&2], "a < b & c");
    }

    #[test]
    fn test_no_descriptions() {
        assert!(encode_descriptions([None, None]).is_none());
    }

    #[test]
    fn test_ignores_other_items() {
        let xml = r#"<GDALMetadata><Item name="STATISTICS_MEAN" sample="0">3.2</Item></GDALMetadata>"#;
        assert!(decode_descriptions(xml).unwrap().is_empty());
    }
}
