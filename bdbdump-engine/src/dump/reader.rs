//! Reads bytevalue dump text back into records

use std::io::BufRead;

use crate::access::AccessMethod;
use crate::error::ParseError;
use crate::storage::Record;

use super::format::{DATA_END, FORMAT_LINE, HEADER_END, TYPE_PREFIX, VERSION_LINE};

/// Streaming parser over a dump text
///
/// The header is read by [`DumpReader::new`]; records are then yielded one
/// at a time until `DATA=END`.
pub struct DumpReader<R> {
    reader: R,
    method: AccessMethod,
    line: usize,
    buf: String,
    done: bool,
}

impl<R: BufRead> DumpReader<R> {
    pub fn new(reader: R) -> Result<Self, ParseError> {
        let mut dump = DumpReader {
            reader,
            method: AccessMethod::Hash,
            line: 0,
            buf: String::new(),
            done: false,
        };

        dump.expect_line(VERSION_LINE)?;
        dump.expect_line(FORMAT_LINE)?;

        let line = dump.line + 1;
        let found = dump
            .next_line()?
            .ok_or(ParseError::UnexpectedEof { line: line - 1 })?;
        let Some(name) = found.strip_prefix(TYPE_PREFIX) else {
            return Err(ParseError::UnexpectedLine {
                line,
                expected: "type=<hash|btree>",
                found: found.to_string(),
            });
        };
        let method = AccessMethod::from_name(name).ok_or_else(|| ParseError::UnknownType {
            line,
            found: name.to_string(),
        })?;
        dump.method = method;

        dump.expect_line(HEADER_END)?;
        Ok(dump)
    }

    /// Access method named in the header
    pub fn method(&self) -> AccessMethod {
        self.method
    }

    /// Read the next line without its newline; `None` at end of input
    fn next_line(&mut self) -> Result<Option<&str>, ParseError> {
        self.buf.clear();
        if self.reader.read_line(&mut self.buf)? == 0 {
            return Ok(None);
        }
        self.line += 1;
        Ok(Some(self.buf.strip_suffix('\n').unwrap_or(self.buf.as_str())))
    }

    fn expect_line(&mut self, expected: &'static str) -> Result<(), ParseError> {
        let line = self.line + 1;
        match self.next_line()? {
            Some(found) if found == expected => Ok(()),
            Some(found) => Err(ParseError::UnexpectedLine {
                line,
                expected,
                found: found.to_string(),
            }),
            None => Err(ParseError::UnexpectedEof { line: line - 1 }),
        }
    }

    fn decode(line: usize, text: &str) -> Result<Vec<u8>, ParseError> {
        let hex_text = text
            .strip_prefix(' ')
            .ok_or(ParseError::MissingLeadingSpace { line })?;
        hex::decode(hex_text).map_err(|source| ParseError::InvalidHex { line, source })
    }

    fn next_record(&mut self) -> Result<Option<Record>, ParseError> {
        let key_line = self.line + 1;
        let key = match self.next_line()? {
            None => return Err(ParseError::UnexpectedEof { line: key_line - 1 }),
            Some(DATA_END) => return Ok(None),
            Some(text) => Self::decode(key_line, text)?,
        };

        let value = match self.next_line()? {
            None | Some(DATA_END) => return Err(ParseError::MissingValue { line: key_line }),
            Some(text) => Self::decode(key_line + 1, text)?,
        };

        Ok(Some(Record::new(key, value)))
    }
}

impl<R: BufRead> Iterator for DumpReader<R> {
    type Item = Result<Record, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let next = self.next_record().transpose();
        if !matches!(next, Some(Ok(_))) {
            self.done = true;
        }
        next
    }
}

/// Parse a whole dump into its access method and records
pub fn read_dump<R: BufRead>(reader: R) -> Result<(AccessMethod, Vec<Record>), ParseError> {
    let dump = DumpReader::new(reader)?;
    let method = dump.method();
    let records = dump.collect::<Result<Vec<_>, _>>()?;
    Ok((method, records))
}
