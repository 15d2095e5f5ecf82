//! Line grammar of the bytevalue dump text

use std::io::{self, Write};

use crate::access::AccessMethod;
use crate::storage::Record;

pub const VERSION_LINE: &str = "VERSION=3";
pub const FORMAT_LINE: &str = "format=bytevalue";
pub const TYPE_PREFIX: &str = "type=";
pub const HEADER_END: &str = "HEADER=END";
pub const DATA_END: &str = "DATA=END";

/// Write the four header lines
pub fn write_header<W: Write>(out: &mut W, method: AccessMethod) -> io::Result<()> {
    let header = format!(
        "{}\n{}\n{}{}\n{}\n",
        VERSION_LINE,
        FORMAT_LINE,
        TYPE_PREFIX,
        method.name(),
        HEADER_END
    );
    out.write_all(header.as_bytes())
}

/// Append one data line to `line`: a space, the lowercase hex of `bytes`, a newline
fn push_data_line(line: &mut Vec<u8>, bytes: &[u8]) {
    line.push(b' ');
    line.extend_from_slice(hex::encode(bytes).as_bytes());
    line.push(b'\n');
}

/// Write a single data line
pub fn write_data_line<W: Write>(out: &mut W, bytes: &[u8]) -> io::Result<()> {
    let mut line = Vec::with_capacity(bytes.len() * 2 + 2);
    push_data_line(&mut line, bytes);
    out.write_all(&line)
}

/// Write the key line and value line of a record with one `write_all`
pub fn write_record<W: Write>(out: &mut W, record: &Record) -> io::Result<()> {
    let mut lines = Vec::with_capacity((record.key.len() + record.value.len()) * 2 + 4);
    push_data_line(&mut lines, &record.key);
    push_data_line(&mut lines, &record.value);
    out.write_all(&lines)
}

pub fn write_footer<W: Write>(out: &mut W) -> io::Result<()> {
    writeln!(out, "{}", DATA_END)
}
