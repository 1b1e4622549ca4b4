//! Comma-separated text: a minimal writer for exports and a reader for the
//! CSV files a crate may carry.
//!
//! Quoting follows RFC 4180. The writer only quotes a field when it has to
//! (comma, double quote or line break inside it).

use std::io::Write;

/// Replace raw line breaks with the two-character sequences `\n` and `\r`,
/// so a record never spans more than one line.
pub fn escape_line_breaks(value: &str) -> String {
    value.replace('\n', "\\n").replace('\r', "\\r")
}

fn needs_quotes(field: &str) -> bool {
    field.contains([',', '"', '\n', '\r'])
}

/// Writes records to any `io::Write`, one line each.
pub struct CsvWriter<W: Write> {
    out: W,
}

impl<W: Write> CsvWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn write_record<I, S>(&mut self, fields: I) -> std::io::Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut first = true;
        for field in fields {
            if !first {
                self.out.write_all(b",")?;
            }
            first = false;
            let field = field.as_ref();
            if needs_quotes(field) {
                write!(self.out, "\"{}\"", field.replace('"', "\"\""))?;
            } else {
                self.out.write_all(field.as_bytes())?;
            }
        }
        self.out.write_all(b"\n")
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

/// Parse CSV text into records. Quoted fields may contain commas, doubled
/// quotes and line breaks; `\r\n` and `\n` both end a record. Blank lines
/// are skipped.
pub fn parse_csv(text: &str) -> Vec<Vec<String>> {
    let mut records = Vec::new();
    let mut record: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.trim_start_matches('\u{feff}').chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    field.push('"');
                    chars.next();
                }
                '"' => in_quotes = false,
                other => field.push(other),
            }
            continue;
        }
        match c {
            '"' if field.is_empty() => in_quotes = true,
            ',' => record.push(std::mem::take(&mut field)),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' | '\r' => {
                record.push(std::mem::take(&mut field));
                if !(record.len() == 1 && record[0].is_empty()) {
                    records.push(std::mem::take(&mut record));
                } else {
                    record.clear();
                }
            }
            other => field.push(other),
        }
    }
    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;

    fn written(records: &[&[&str]]) -> String {
        let mut w = CsvWriter::new(Vec::new());
        for r in records {
            w.write_record(r.iter()).unwrap();
        }
        String::from_utf8(w.into_inner()).unwrap()
    }

    #[test]
    fn writes_minimal_quoting() {
        let text = written(&[&["id", "name"], &["#a", "Doe, John"], &["#b", "say \"hi\""]]);
        assert_eq!(text, "id,name\n#a,\"Doe, John\"\n#b,\"say \"\"hi\"\"\"\n");
    }

    #[test]
    fn escapes_line_breaks() {
        assert_eq!(escape_line_breaks("a\nb\r\nc"), "a\\nb\\r\\nc");
    }

    #[test]
    fn parses_quoted_fields() {
        let records = parse_csv("id,note\r\n1,\"multi\nline, with comma\"\r\n\r\n2,\"\"\"quoted\"\"\"\n");
        assert_eq!(records.len(), 3);
        assert_eq!(records[1], vec!["1", "multi\nline, with comma"]);
        assert_eq!(records[2], vec!["2", "\"quoted\""]);
    }

    #[test]
    fn parses_without_trailing_newline() {
        let records = parse_csv("a,b\n1,");
        assert_eq!(records, vec![vec!["a", "b"], vec!["1", ""]]);
    }

    #[test]
    fn writer_output_parses_back() {
        let text = written(&[&["x,y", "plain"]]);
        assert_eq!(parse_csv(&text), vec![vec!["x,y", "plain"]]);
    }
}
