//! Best-effort extraction of host and path from raw request bytes
//!
//! Payloads come straight off the wire and may be truncated, padded or
//! malformed. Every scan here is bounded by the slice it is given and every
//! output is bounded by [`MAX_VALUE_LEN`]. Nothing in this module fails:
//! a missing host or path comes back empty.

use crate::types::{bounded_string, MAX_VALUE_LEN};

/// Request methods worth inspecting
const REQUEST_METHODS: [&[u8]; 3] = [b"GET ", b"POST ", b"HEAD "];

/// Payloads this short cannot carry a useful request line
const MIN_PAYLOAD_LEN: usize = 10;

/// Header token, matched case-insensitively.
///
/// The value ends at a newline, carriage return, space or colon. A tab does
/// not end it, so a host can carry one; the cache refuses such values.
const HOST_TOKEN: &[u8] = b"host:";

/// Search engines and the query parameter carrying the search term.
///
/// An engine ending in `.` matches any TLD; otherwise the registered
/// domain must match exactly. Subdomains always match.
const SEARCH_ENGINES: &[(&str, &str)] = &[
    ("google.", "q"),
    ("bing.com", "q"),
    ("search.yahoo.", "p"),
    ("duckduckgo.com", "q"),
    ("ask.com", "q"),
    ("baidu.com", "wd"),
    ("yandex.", "text"),
];

/// Host and path pulled out of a request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestTarget {
    /// Lower-cased `Host` header value without port, empty if absent
    pub host: String,
    /// Request-line path, empty if the request line is incomplete
    pub path: String,
}

/// Whether `payload` looks like the start of an HTTP request
pub fn is_http_request(payload: &[u8]) -> bool {
    payload.len() > MIN_PAYLOAD_LEN
        && REQUEST_METHODS.iter().any(|method| {
            payload.len() >= method.len() && payload[..method.len()].eq_ignore_ascii_case(method)
        })
}

/// Extract host and path from the first `length` bytes of `payload`.
///
/// `length` is clamped to the buffer, so the scan never leaves `payload`.
///
/// # Examples
/// ```
/// use webmon::extract_url;
///
/// let req = b"GET /index.html HTTP/1.1\r\nHost: Example.COM\r\n\r\n";
/// let target = extract_url(req, req.len());
/// assert_eq!(target.host, "example.com");
/// assert_eq!(target.path, "/index.html");
/// ```
pub fn extract_url(payload: &[u8], length: usize) -> RequestTarget {
    let data = &payload[..length.min(payload.len())];
    RequestTarget {
        host: extract_host(data),
        path: extract_path(data),
    }
}

fn extract_path(data: &[u8]) -> String {
    let first_space = match data.iter().position(|&b| b == b' ') {
        Some(i) => i,
        None => return String::new(),
    };

    let start = match data[first_space..].iter().position(|&b| b != b' ') {
        Some(i) => first_space + i,
        None => return String::new(),
    };

    // No closing space means a partial request line; leave the path empty
    match data[start..].iter().position(|&b| b == b' ') {
        Some(len) => bounded_string(&data[start..start + len]),
        None => String::new(),
    }
}

/// Length of the header section.
///
/// Scanning starts at byte 2 and stops at a newline preceded by either
/// `\n` or `\n\r`. Without a terminator the whole payload is headers.
fn header_len(data: &[u8]) -> usize {
    data.windows(3)
        .position(|w| w[2] == b'\n' && (w[1] == b'\n' || (w[0] == b'\n' && w[1] == b'\r')))
        .map(|i| i + 2)
        .unwrap_or(data.len())
}

fn extract_host(data: &[u8]) -> String {
    let headers = &data[..header_len(data)];

    let token_at = match headers
        .windows(HOST_TOKEN.len())
        .position(|w| w.eq_ignore_ascii_case(HOST_TOKEN))
    {
        Some(i) => i,
        None => return String::new(),
    };

    let value = &headers[token_at + HOST_TOKEN.len()..];
    let skip = value.iter().take_while(|&&b| b == b' ').count();
    let value = &value[skip..];

    let end = value
        .iter()
        .position(|b| matches!(b, b'\n' | b'\r' | b' ' | b':'))
        .unwrap_or(value.len());

    let mut host = bounded_string(&value[..end]);
    host.make_ascii_lowercase();
    host
}

/// Search term carried by a request to a known search engine.
///
/// The engine's query parameter is percent-decoded, lower-cased and
/// bounded. Words are joined with `+` so the term never contains
/// whitespace and survives a snapshot round trip. Blank terms are ignored.
pub fn search_term(host: &str, path: &str) -> Option<String> {
    let (_, param) = SEARCH_ENGINES
        .iter()
        .find(|(engine, _)| host_matches(host, engine))?;

    let (_, query) = path.split_once('?')?;
    let query = query.split('#').next().unwrap_or_default();

    let raw = query.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        (key == *param).then_some(value)
    })?;

    let mut decoded = bounded_string(&percent_decode(raw.as_bytes()));
    decoded.make_ascii_lowercase();

    let words: Vec<&str> = decoded
        .split(|c: char| c.is_whitespace() || c == '+')
        .filter(|word| !word.is_empty())
        .collect();

    if words.is_empty() {
        None
    } else {
        Some(words.join("+"))
    }
}

fn host_matches(host: &str, engine: &str) -> bool {
    let suffixes = std::iter::once(host).chain(host.match_indices('.').map(|(i, _)| &host[i + 1..]));

    for suffix in suffixes {
        let hit = if engine.ends_with('.') {
            suffix.starts_with(engine)
        } else {
            suffix == engine
        };
        if hit {
            return true;
        }
    }
    false
}

/// Decode `%XX` escapes. Malformed escapes pass through unchanged.
fn percent_decode(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len().min(MAX_VALUE_LEN));
    let mut i = 0;

    while i < input.len() && out.len() < MAX_VALUE_LEN {
        match input[i] {
            b'%' if i + 2 < input.len() => {
                match (hex_value(input[i + 1]), hex_value(input[i + 2])) {
                    (Some(hi), Some(lo)) => {
                        out.push(hi << 4 | lo);
                        i += 3;
                    }
                    _ => {
                        out.push(b'%');
                        i += 1;
                    }
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }

    out
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}
