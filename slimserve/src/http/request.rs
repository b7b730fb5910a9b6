use crate::utils::Buffer;

use std::collections::HashMap;

/// Upper bound on the request head; larger heads are rejected.
const MAX_HEAD: usize = 8 * 1024;

/// Upper bound on a declared `Content-Length`.
const MAX_BODY: usize = 1024 * 1024;

/// Bare paths that are served from their `.html` page.
const DEFAULT_PAGES: [&str; 6] = [
    "/index",
    "/register",
    "/login",
    "/welcome",
    "/video",
    "/picture",
];

/// A parsed HTTP/1.x request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Request {
    pub method: String,

    /// Normalized path, query string removed.
    pub path: String,

    /// Version digits, e.g. `1.1`.
    pub version: String,

    /// Header values keyed by lower-cased name.
    pub headers: HashMap<String, String>,

    pub body: Vec<u8>,
}

/// Outcome of [`parse`].
#[derive(Debug, PartialEq, Eq)]
pub enum Parse {
    /// The head or body has not fully arrived; nothing was consumed.
    Incomplete,

    /// One request was consumed from the buffer.
    Complete(Request),

    /// The request line or head is malformed.
    Invalid,
}

impl Request {
    /// Header lookup, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// `Connection: keep-alive` on an HTTP/1.1 request.
    pub fn keep_alive(&self) -> bool {
        self.version == "1.1"
            && self
                .header("connection")
                .is_some_and(|value| value.eq_ignore_ascii_case("keep-alive"))
    }

    /// Decoded `application/x-www-form-urlencoded` body of a POST.
    ///
    /// Empty for any other request.
    pub fn form(&self) -> HashMap<String, String> {
        let is_form = self.method == "POST"
            && self.header("content-type").is_some_and(|value| {
                value
                    .split(';')
                    .next()
                    .is_some_and(|mime| mime.trim() == "application/x-www-form-urlencoded")
            });

        if !is_form {
            return HashMap::new();
        }

        parse_urlencoded(&self.body)
    }
}

/// Parses one request from the front of `input`.
///
/// The request is consumed only once it is complete, so a partial request
/// stays buffered for the next read.
pub fn parse(input: &mut Buffer) -> Parse {
    let Some(head_len) = input.find(b"\r\n\r\n") else {
        if input.readable_bytes() > MAX_HEAD {
            return Parse::Invalid;
        }
        return Parse::Incomplete;
    };

    let Ok(head) = std::str::from_utf8(&input.peek()[..head_len]) else {
        return Parse::Invalid;
    };

    let mut lines = head.split("\r\n");
    let Some(mut request) = lines.next().and_then(parse_request_line) else {
        return Parse::Invalid;
    };

    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            return Parse::Invalid;
        };
        request
            .headers
            .insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
    }

    let body_len = match request.header("content-length") {
        Some(value) => match value.parse::<usize>() {
            Ok(len) => len,
            Err(_) => return Parse::Invalid,
        },
        None => 0,
    };

    if body_len > MAX_BODY {
        return Parse::Invalid;
    }

    let Some(total) = head_len.checked_add(4).and_then(|n| n.checked_add(body_len)) else {
        return Parse::Invalid;
    };
    if input.readable_bytes() < total {
        return Parse::Incomplete;
    }

    request.body = input.peek()[head_len + 4..total].to_vec();
    input.retrieve(total);

    Parse::Complete(request)
}

/// `METHOD PATH HTTP/VERSION`
fn parse_request_line(line: &str) -> Option<Request> {
    let mut parts = line.split(' ');
    let method = parts.next().filter(|m| !m.is_empty())?;
    let target = parts.next().filter(|p| p.starts_with('/'))?;
    let version = parts.next()?.strip_prefix("HTTP/")?;

    if parts.next().is_some() || version.is_empty() {
        return None;
    }

    Some(Request {
        method: method.to_string(),
        path: normalize_path(target),
        version: version.to_string(),
        ..Request::default()
    })
}

/// Drops the query string and maps bare page names to their files.
fn normalize_path(target: &str) -> String {
    let path = target.split('?').next().unwrap_or(target);

    if path == "/" {
        return "/index.html".to_string();
    }

    if DEFAULT_PAGES.contains(&path) {
        return format!("{path}.html");
    }

    path.to_string()
}

/// Decodes `key=value&...` pairs, turning `+` into a space and `%XX` into
/// the byte it names. Malformed escapes are kept literally.
pub fn parse_urlencoded(body: &[u8]) -> HashMap<String, String> {
    body.split(|&b| b == b'&')
        .filter(|pair| !pair.is_empty())
        .filter_map(|pair| {
            let mut kv = pair.splitn(2, |&b| b == b'=');
            let key = decode_component(kv.next()?);
            let value = decode_component(kv.next().unwrap_or_default());
            Some((key, value))
        })
        .collect()
}

fn decode_component(raw: &[u8]) -> String {
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;

    while i < raw.len() {
        match raw[i] {
            b'+' => out.push(b' '),
            b'%' if i + 2 < raw.len() => {
                match (hex_value(raw[i + 1]), hex_value(raw[i + 2])) {
                    (Some(hi), Some(lo)) => {
                        out.push(hi * 16 + lo);
                        i += 2;
                    }
                    _ => out.push(b'%'),
                }
            }
            byte => out.push(byte),
        }
        i += 1;
    }

    String::from_utf8_lossy(&out).into_owned()
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}
