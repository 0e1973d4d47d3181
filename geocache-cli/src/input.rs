//! Batch input parsing.
//!
//! One address per line, or `region<TAB>subregion`. Blank lines and lines
//! starting with `#` are ignored.

use geocache_core::types::Address;

/// A line that could not be turned into an address.
#[derive(Debug, PartialEq)]
pub struct Rejected {
    pub line: usize,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct ParsedInput {
    pub addresses: Vec<Address>,
    pub rejected: Vec<Rejected>,
}

pub fn parse_lines(text: &str) -> ParsedInput {
    let mut parsed = ParsedInput::default();

    for (idx, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let result = match line.split_once('\t') {
            Some((region, subregion)) => Address::from_parts(region, subregion),
            None => Address::parse(trimmed),
        };

        match result {
            Ok(address) => parsed.addresses.push(address),
            Err(e) => parsed.rejected.push(Rejected {
                line: idx + 1,
                reason: e.to_string(),
            }),
        }
    }

    parsed
}
