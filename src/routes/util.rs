//! Request parsing and small response helpers shared by the route handlers.

use crate::error::GridError;
use crate::grid::notice::{self, escape_html};

/// Parse URL-encoded form body into key-value pairs.
/// Handles `key=value&key2=value2` format (from HTMX POST bodies).
pub fn parse_form_body(body: &str) -> Vec<(String, String)> {
    if body.is_empty() {
        return Vec::new();
    }
    body.split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, val) = pair.split_once('=').unwrap_or((pair, ""));
            (percent_decode(key), percent_decode(val))
        })
        .collect()
}

/// Percent-decode a URL-encoded value. Decodes to bytes first so multi-byte
/// UTF-8 sequences (`%C3%A9`) come back as one character; invalid escapes are
/// kept verbatim.
pub fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' => {
                let hex = bytes.get(i + 1..i + 3).and_then(|h| std::str::from_utf8(h).ok());
                match hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                    Some(val) => {
                        out.push(val);
                        i += 3;
                    }
                    None => {
                        out.push(b'%');
                        i += 1;
                    }
                }
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Parse a query string into key-value pairs.
pub fn parse_query(query: &str) -> Vec<(String, String)> {
    let q = query.strip_prefix('?').unwrap_or(query);
    parse_form_body(q)
}

/// Helper to get a value by key from a list of key-value pairs.
pub fn get_param<'a>(params: &'a [(String, String)], key: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

/// Non-empty parameter value.
pub fn get_nonempty<'a>(params: &'a [(String, String)], key: &str) -> Option<&'a str> {
    get_param(params, key).filter(|v| !v.is_empty())
}

pub fn get_f64(params: &[(String, String)], key: &str) -> Option<f64> {
    get_param(params, key)?.parse().ok().filter(|v: &f64| v.is_finite())
}

pub fn get_u64(params: &[(String, String)], key: &str) -> Option<u64> {
    get_param(params, key)?.parse().ok()
}

/// Comma-separated id list (`order=a,b,c`). Empty segments are dropped.
pub fn get_list(params: &[(String, String)], key: &str) -> Vec<String> {
    get_param(params, key)
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Red inline error span, queued as a notice as well.
pub fn error_span(err: &GridError) -> String {
    notice::push_error(err);
    missing(&err.to_string())
}

/// Red inline message for malformed requests (not queued).
pub fn missing(msg: &str) -> String {
    format!(r#"<span class="text-kip-red">{}</span>"#, escape_html(msg))
}

/// Queued notices as an out-of-band swap into the notice area.
pub fn oob_notices() -> String {
    let html = notice::render_drain();
    if html.is_empty() {
        return html;
    }
    format!(
        r#"<div id="grid-notices" hx-swap-oob="beforeend">{}</div>"#,
        html
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_form_body_works() {
        let pairs = parse_form_body("id=amiya&action=add&value=");
        assert_eq!(pairs.len(), 3);
        assert_eq!(get_param(&pairs, "id"), Some("amiya"));
        assert_eq!(get_param(&pairs, "value"), Some(""));
        assert_eq!(get_nonempty(&pairs, "value"), None);
    }

    #[test]
    fn parse_form_body_empty() {
        assert!(parse_form_body("").is_empty());
    }

    #[test]
    fn percent_decode_plus_as_space() {
        assert_eq!(percent_decode("hello+world"), "hello world");
    }

    #[test]
    fn percent_decode_multibyte() {
        assert_eq!(percent_decode("caf%C3%A9"), "café");
        assert_eq!(percent_decode("100%"), "100%");
        assert_eq!(percent_decode("%zz"), "%zz");
    }

    #[test]
    fn parse_query_strips_prefix() {
        let pairs = parse_query("?seed=42&x=1.5");
        assert_eq!(get_u64(&pairs, "seed"), Some(42));
        assert_eq!(get_f64(&pairs, "x"), Some(1.5));
        assert_eq!(get_f64(&pairs, "y"), None);
    }

    #[test]
    fn list_params_split_on_commas() {
        let pairs = parse_form_body("order=d%2Ca,%20b,,c");
        assert_eq!(get_list(&pairs, "order"), vec!["d", "a", "b", "c"]);
        assert!(get_list(&pairs, "missing").is_empty());
    }
}
