use serde_json::Value;

/// One non-empty line of an NDJSON object
#[derive(Debug)]
pub struct DecodedLine<'a> {
    /// 1-based position in the object, empty lines included
    pub line_number: usize,
    pub raw: &'a str,
    pub parsed: Result<Value, serde_json::Error>,
}

impl DecodedLine<'_> {
    pub fn is_valid(&self) -> bool {
        self.parsed.is_ok()
    }
}

/// Lazily decode newline-delimited JSON
///
/// Empty lines are skipped. Any other line that fails to parse, whitespace-only
/// ones included, is yielded with its error and decoding carries on.
pub fn decode_lines(text: &str) -> impl Iterator<Item = DecodedLine<'_>> {
    text.lines()
        .enumerate()
        .filter(|(_, raw)| !raw.is_empty())
        .map(|(index, raw)| DecodedLine {
            line_number: index + 1,
            raw,
            parsed: serde_json::from_str(raw),
        })
}
