//! Form encoding compatible with the counter-party's query-escape rules.
//!
//! Unreserved bytes (`A-Z a-z 0-9 - _ . ~`) pass through, a space becomes
//! `+`, and every other byte of the UTF-8 encoding becomes `%XX` with
//! uppercase hex. This differs from the WHATWG form serializer (which leaves
//! `*` alone and escapes `~`), so it is spelled out here rather than
//! borrowed from a URL crate.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

const QUERY_ESCAPE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Escape one key or value for use in a query string or form body.
pub fn query_escape(s: &str) -> String {
    s.split(' ')
        .map(|part| utf8_percent_encode(part, QUERY_ESCAPE).to_string())
        .collect::<Vec<_>>()
        .join("+")
}

/// Encode `key=value` pairs joined by `&`, in the order given.
pub fn encode_pairs<'a, I>(pairs: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    pairs
        .into_iter()
        .map(|(k, v)| format!("{}={}", query_escape(k), query_escape(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Append an encoded query to a URL, joining with `&` when the URL already
/// carries a query and with `?` otherwise.
pub fn append_query(url: &str, query: &str) -> String {
    if query.is_empty() {
        return url.to_string();
    }
    let sep = if url.contains('?') { '&' } else { '?' };
    format!("{url}{sep}{query}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_like_the_counter_party() {
        assert_eq!(query_escape("a b~c*d/é"), "a+b~c%2Ad%2F%C3%A9");
        assert_eq!(query_escape("2024-01-02 03:04:05"), "2024-01-02+03%3A04%3A05");
        assert_eq!(query_escape(r#"{"id":"111"}"#), "%7B%22id%22%3A%22111%22%7D");
        assert_eq!(query_escape(""), "");
    }

    #[test]
    fn pairs_keep_given_order() {
        let out = encode_pairs([("b", "2"), ("a", "x y")]);
        assert_eq!(out, "b=2&a=x+y");
    }

    #[test]
    fn append_to_url_with_existing_query() {
        let url = append_query("http://host/x?already=1", "app_key=k");
        assert_eq!(url, "http://host/x?already=1&app_key=k");
        assert_eq!(url.matches('?').count(), 1);
    }

    #[test]
    fn append_to_bare_url() {
        assert_eq!(append_query("http://host/x", "app_key=k"), "http://host/x?app_key=k");
        assert_eq!(append_query("http://host/x", ""), "http://host/x");
    }
}
