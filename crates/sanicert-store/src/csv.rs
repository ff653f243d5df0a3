//! Minimal RFC-4180-style row encoding for the backing files.
//!
//! Fields containing a comma, double quote, CR or LF are quoted; embedded
//! quotes are doubled. The parser is lenient the way common CSV readers are:
//! blank lines are skipped and a CR before LF is tolerated.

/// Encode one record as a single line (no trailing newline).
pub fn encode_record(fields: &[&str]) -> String {
    let encoded: Vec<String> = fields.iter().map(|f| encode_field(f)).collect();
    encoded.join(",")
}

fn encode_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Parse a whole file into records. Quoted fields may span lines.
pub fn parse_records(input: &str) -> Vec<Vec<String>> {
    let mut records = Vec::new();
    let mut record: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut started = false;

    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    field.push('"');
                } else {
                    in_quotes = false;
                }
            } else {
                field.push(c);
            }
            continue;
        }

        match c {
            '"' => {
                in_quotes = true;
                started = true;
            }
            ',' => {
                record.push(std::mem::take(&mut field));
                started = true;
            }
            '\r' => {}
            '\n' => {
                if started {
                    record.push(std::mem::take(&mut field));
                    records.push(std::mem::take(&mut record));
                    started = false;
                }
            }
            _ => {
                field.push(c);
                started = true;
            }
        }
    }

    if started {
        record.push(field);
        records.push(record);
    }

    records
}
