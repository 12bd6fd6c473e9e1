//! Snapshot record codec using nom
//!
//! Snapshot format (one record per line, oldest first):
//! ```text
//! <unix seconds>\t<dotted-quad source>\t<value>\n
//! ```
//!
//! On input, lines may end in `\n` or `\r` and fields may be separated by
//! any run of spaces or tabs.

use std::net::Ipv4Addr;

use nom::{
    character::complete::{char, digit1, one_of},
    combinator::{all_consuming, map, map_res, opt, recognize},
    sequence::{pair, preceded, tuple},
    IResult,
};

use crate::error::{Error, Result};
use crate::tokenizer::{split_on_separators, FieldLimit};
use crate::types::{bounded_string, Observation, Timestamp};

/// Line separators accepted in a snapshot
pub const LINE_SEPARATORS: &[char] = &['\n', '\r'];

/// Field separators accepted in a snapshot line
pub const FIELD_SEPARATORS: &[char] = &['\t', ' '];

/// Number of fields in a snapshot line
const RECORD_FIELDS: usize = 3;

/// A record restored from a snapshot line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotRecord {
    /// Time the pair was last seen
    pub timestamp: Timestamp,
    /// Requesting host
    pub source: Ipv4Addr,
    /// Domain name or search term
    pub value: String,
}

fn octet(input: &str) -> IResult<&str, u8> {
    map_res(digit1, |digits: &str| digits.parse::<u8>())(input)
}

fn dotted_quad(input: &str) -> IResult<&str, Ipv4Addr> {
    map(
        tuple((
            octet,
            preceded(char('.'), octet),
            preceded(char('.'), octet),
            preceded(char('.'), octet),
        )),
        |(a, b, c, d)| Ipv4Addr::new(a, b, c, d),
    )(input)
}

fn seconds(input: &str) -> IResult<&str, i64> {
    map_res(recognize(pair(opt(one_of("+-")), digit1)), |digits: &str| {
        digits.parse::<i64>()
    })(input)
}

/// Parse a dotted-quad address with every octet in `0..=255`
pub fn parse_address(field: &str) -> Result<Ipv4Addr> {
    let (_, addr) = all_consuming(dotted_quad)(field)?;
    Ok(addr)
}

/// Parse a whole-field signed integer timestamp
pub fn parse_seconds(field: &str) -> Result<i64> {
    let (_, secs) = all_consuming(seconds)(field)?;
    Ok(secs)
}

/// Parse one snapshot line into a record
pub fn parse_record(line: &str) -> Result<SnapshotRecord> {
    let fields = split_on_separators(Some(line), FIELD_SEPARATORS, FieldLimit::Unbounded, false);
    if fields.len() != RECORD_FIELDS {
        return Err(Error::Parse(format!(
            "expected {} fields, found {}",
            RECORD_FIELDS,
            fields.len()
        )));
    }

    let timestamp = Timestamp::from_secs(parse_seconds(fields[0])?);
    let source = parse_address(fields[1])?;
    let value = bounded_string(fields[2].as_bytes());

    Ok(SnapshotRecord {
        timestamp,
        source,
        value,
    })
}

/// Split snapshot text into its non-empty lines
pub fn snapshot_lines(text: &str) -> Vec<&str> {
    split_on_separators(Some(text), LINE_SEPARATORS, FieldLimit::Unbounded, false)
}

/// Format one observation as a snapshot line
pub fn format_record(observation: &Observation) -> String {
    format!(
        "{}\t{}\t{}\n",
        observation.last_seen.secs, observation.source, observation.value
    )
}

/// Format observations, oldest first, as snapshot text
pub fn format_snapshot<'a, I>(observations: I) -> String
where
    I: IntoIterator<Item = &'a Observation>,
{
    observations.into_iter().map(format_record).collect()
}
