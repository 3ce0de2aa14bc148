// Contour - Execution Trace Reconstruction
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Streaming reader of recorded trace logs
//!
//! A log is an XML document whose root element (of any name) holds one child
//! element per event record. The children of a record are its fields:
//!
//! ```xml
//! <trace>
//!   <event>
//!     <id>1</id>
//!     <kind>METHOD_CALL</kind>
//!     <thread>1</thread>
//!     <signature>Main#main(java.lang.String[]):void</signature>
//!   </event>
//! </trace>
//! ```
//!
//! Field text is trimmed; elements nested deeper than fields are ignored.

use std::{collections::HashMap, io::BufRead};

use quick_xml::{events::Event as XmlEvent, name::QName, Reader};

use crate::ImportError;

const ROOT_DEPTH: usize = 1;
const RECORD_DEPTH: usize = 2;
const FIELD_DEPTH: usize = 3;

/// One event record of a log
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    position: usize,
    fields: HashMap<String, String>,
}

impl Record {
    /// Empty record at the given one-based position
    pub fn new(position: usize) -> Self {
        Self { position, fields: HashMap::new() }
    }

    /// One-based position of the record in its log
    pub fn position(&self) -> usize {
        self.position
    }

    /// Set a field. Later values replace earlier ones.
    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(field.into(), value.into());
    }

    /// Field value, `None` when absent or blank
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(|value| value.trim()).filter(|value| !value.is_empty())
    }

    /// Field value, failing when absent or blank
    pub fn require(&self, field: &str) -> Result<&str, ImportError> {
        self.get(field).ok_or_else(|| self.malformed(format!("missing field `{field}`")))
    }

    /// The `kind` field
    pub fn kind(&self) -> Option<&str> {
        self.get("kind")
    }

    /// A [`ImportError::Malformed`] for this record
    pub fn malformed(&self, reason: impl Into<String>) -> ImportError {
        ImportError::Malformed { record: self.position, reason: reason.into() }
    }
}

fn tag_name(name: QName<'_>) -> String {
    String::from_utf8_lossy(name.local_name().as_ref()).into_owned()
}

/// Pull-based reader yielding the records of a log one at a time
pub struct RecordReader<R> {
    reader: Reader<R>,
    buf: Vec<u8>,
    depth: usize,
    records: usize,
}

impl<R: BufRead> RecordReader<R> {
    /// Read records from `source`
    pub fn new(source: R) -> Self {
        let mut reader = Reader::from_reader(source);
        reader.config_mut().trim_text(true);
        Self { reader, buf: Vec::new(), depth: 0, records: 0 }
    }

    /// Number of records read so far
    pub fn records_read(&self) -> usize {
        self.records
    }

    /// Next record, or `None` at the end of the log
    pub fn next_record(&mut self) -> Result<Option<Record>, ImportError> {
        let mut record: Option<Record> = None;
        let mut field: Option<(String, String)> = None;

        loop {
            self.buf.clear();
            match self.reader.read_event_into(&mut self.buf)? {
                XmlEvent::Start(start) => {
                    self.depth += 1;
                    match self.depth {
                        RECORD_DEPTH => record = Some(Record::new(self.records + 1)),
                        FIELD_DEPTH => field = Some((tag_name(start.name()), String::new())),
                        _ => {}
                    }
                }
                XmlEvent::Empty(start) => match self.depth + 1 {
                    RECORD_DEPTH => {
                        self.records += 1;
                        return Ok(Some(Record::new(self.records)));
                    }
                    FIELD_DEPTH => {
                        if let Some(record) = record.as_mut() {
                            record.insert(tag_name(start.name()), String::new());
                        }
                    }
                    _ => {}
                },
                XmlEvent::Text(text) if self.depth == FIELD_DEPTH => {
                    if let Some((_, value)) = field.as_mut() {
                        value.push_str(&text.unescape()?);
                    }
                }
                XmlEvent::CData(data) if self.depth == FIELD_DEPTH => {
                    if let Some((_, value)) = field.as_mut() {
                        value.push_str(&String::from_utf8_lossy(&data));
                    }
                }
                XmlEvent::End(_) => {
                    match self.depth {
                        FIELD_DEPTH => {
                            if let (Some(record), Some((name, value))) = (record.as_mut(), field.take())
                            {
                                record.insert(name, value);
                            }
                        }
                        RECORD_DEPTH => {
                            self.depth -= 1;
                            self.records += 1;
                            return Ok(record);
                        }
                        _ => {}
                    }
                    self.depth = self.depth.saturating_sub(1);
                }
                XmlEvent::Eof => {
                    if self.depth >= ROOT_DEPTH {
                        return Err(ImportError::Malformed {
                            record: self.records + 1,
                            reason: "unexpected end of input".to_string(),
                        });
                    }
                    return Ok(None);
                }
                _ => {}
            }
        }
    }
}

impl<R: BufRead> Iterator for RecordReader<R> {
    type Item = Result<Record, ImportError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_all(text: &str) -> Result<Vec<Record>, ImportError> {
        RecordReader::new(text.as_bytes()).collect()
    }

    #[test]
    fn test_reads_records_and_fields() {
        let records = read_all(
            r#"<?xml version="1.0"?>
            <trace>
              <event><kind>LINE_STEP</kind><file>Main.java</file><line> 7 </line></event>
              <!-- comment -->
              <event><kind>SYSTEM_END</kind><value><![CDATA[a<b]]></value><empty/></event>
              <event/>
            </trace>"#,
        )
        .unwrap();

        assert_eq!(records.len(), 3);
        assert_eq!(records[0].kind(), Some("LINE_STEP"));
        assert_eq!(records[0].get("line"), Some("7"));
        assert_eq!(records[1].position(), 2);
        assert_eq!(records[1].get("value"), Some("a<b"));
        assert_eq!(records[1].get("empty"), None);
        assert_eq!(records[2].kind(), None);
    }

    #[test]
    fn test_unescapes_text() {
        let records = read_all("<t><event><value>&lt;init&gt;</value></event></t>").unwrap();
        assert_eq!(records[0].get("value"), Some("<init>"));
    }

    #[test]
    fn test_truncated_log_is_malformed() {
        let err = read_all("<trace><event><kind>LINE_STEP</kind></event><event><kind>").unwrap_err();
        assert!(
            matches!(err, ImportError::Malformed { record: 2, .. } | ImportError::Xml(_)),
            "{err}"
        );
    }

    #[test]
    fn test_mismatched_tags_are_rejected() {
        let err = read_all("<trace><event><kind>LINE_STEP</line></event></trace>").unwrap_err();
        assert!(matches!(err, ImportError::Xml(_)), "{err}");
    }

    #[test]
    fn test_require_reports_position() {
        let mut record = Record::new(4);
        record.insert("kind", "OBJECT_NEW");
        let err = record.require("type").unwrap_err();
        assert_eq!(err.to_string(), "malformed record 4: missing field `type`");
    }
}
