//! Content negotiation over the `Accept*` request headers.
//!
//! Each header is parsed once into a preference list ordered by quality; the `accepts_*`
//! methods pick the offer the client prefers most.

use std::cmp::Ordering;

use http::{HeaderMap, HeaderName, header};
use mime::Mime;

#[derive(Debug, Clone)]
struct Preference<T> {
    value: T,
    q: f32,
}

/// What the client declared it can take.
#[derive(Debug, Clone, Default)]
pub struct Accepts {
    types: Option<Vec<Preference<Mime>>>,
    encodings: Option<Vec<Preference<String>>>,
    charsets: Option<Vec<Preference<String>>>,
    languages: Option<Vec<Preference<String>>>,
}

impl Accepts {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            types: header_value(headers, &header::ACCEPT).map(parse_types),
            encodings: header_value(headers, &header::ACCEPT_ENCODING).map(parse_tokens),
            charsets: header_value(headers, &header::ACCEPT_CHARSET).map(parse_tokens),
            languages: header_value(headers, &header::ACCEPT_LANGUAGE).map(parse_tokens),
        }
    }

    /// Accepted media types, most preferred first. Empty when the client sent no `Accept`.
    pub fn types(&self) -> Vec<String> {
        self.types.iter().flatten().map(|p| p.value.essence_str().to_owned()).collect()
    }

    /// Picks the best of `offers`, given as short names (`json`, `html`) or full media types.
    ///
    /// Without an `Accept` header the first offer wins; `None` means nothing is acceptable.
    pub fn accepts_type<'a>(&self, offers: &[&'a str]) -> Option<&'a str> {
        let Some(ranges) = &self.types else {
            return offers.first().copied();
        };

        ranges.iter().filter(|range| range.q > 0.0).find_map(|range| {
            offers.iter().copied().find(|offer| {
                mime_for(offer).is_some_and(|mime| {
                    (range.value.type_() == mime::STAR || range.value.type_() == mime.type_())
                        && (range.value.subtype() == mime::STAR || range.value.subtype() == mime.subtype())
                })
            })
        })
    }

    pub fn accepts_encoding<'a>(&self, offers: &[&'a str]) -> Option<&'a str> {
        negotiate(self.encodings.as_deref(), offers, |range, offer| range.eq_ignore_ascii_case(offer))
    }

    pub fn accepts_charset<'a>(&self, offers: &[&'a str]) -> Option<&'a str> {
        negotiate(self.charsets.as_deref(), offers, |range, offer| range.eq_ignore_ascii_case(offer))
    }

    /// A range like `en` also matches the offer `en-US`.
    pub fn accepts_language<'a>(&self, offers: &[&'a str]) -> Option<&'a str> {
        negotiate(self.languages.as_deref(), offers, |range, offer| {
            range.eq_ignore_ascii_case(offer)
                || offer.len() > range.len()
                    && offer.as_bytes()[range.len()] == b'-'
                    && offer[..range.len()].eq_ignore_ascii_case(range)
        })
    }
}

fn header_value<'h>(headers: &'h HeaderMap, name: &HeaderName) -> Option<&'h str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

fn negotiate<'a>(
    ranges: Option<&[Preference<String>]>,
    offers: &[&'a str],
    matches: impl Fn(&str, &str) -> bool,
) -> Option<&'a str> {
    let Some(ranges) = ranges else {
        return offers.first().copied();
    };

    ranges.iter().filter(|range| range.q > 0.0).find_map(|range| {
        offers.iter().copied().find(|offer| range.value == "*" || matches(&range.value, offer))
    })
}

fn parse_q<'p>(params: impl Iterator<Item = &'p str>) -> f32 {
    params
        .filter_map(|param| param.split_once('='))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("q"))
        .and_then(|(_, value)| value.trim().parse::<f32>().ok())
        .map_or(1.0, |q| q.clamp(0.0, 1.0))
}

fn sort<T>(mut preferences: Vec<Preference<T>>) -> Vec<Preference<T>> {
    // stable: equal qualities keep header order
    preferences.sort_by(|a, b| b.q.partial_cmp(&a.q).unwrap_or(Ordering::Equal));
    preferences
}

fn parse_tokens(value: &str) -> Vec<Preference<String>> {
    let preferences = value
        .split(',')
        .filter_map(|item| {
            let mut parts = item.split(';');
            let token = parts.next()?.trim();
            (!token.is_empty()).then(|| Preference { value: token.to_ascii_lowercase(), q: parse_q(parts) })
        })
        .collect();
    sort(preferences)
}

fn parse_types(value: &str) -> Vec<Preference<Mime>> {
    let preferences = value
        .split(',')
        .filter_map(|item| {
            let mime = item.trim().parse::<Mime>().ok()?;
            let q = mime.get_param("q").and_then(|q| q.as_str().parse::<f32>().ok()).map_or(1.0, |q| q.clamp(0.0, 1.0));
            Some(Preference { value: mime, q })
        })
        .collect();
    sort(preferences)
}

/// Resolves a short type name (`json`, `html`, `png`, ...) or a full media type.
pub(crate) fn mime_for(name: &str) -> Option<Mime> {
    let full = match name.trim().trim_start_matches('.') {
        "text" | "txt" => "text/plain",
        "html" | "htm" => "text/html",
        "json" => "application/json",
        "bin" => "application/octet-stream",
        "js" => "text/javascript",
        "css" => "text/css",
        "xml" => "application/xml",
        "form" | "urlencoded" => "application/x-www-form-urlencoded",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "pdf" => "application/pdf",
        "csv" => "text/csv",
        "event-stream" | "sse" => "text/event-stream",
        other if other.contains('/') => other,
        _ => return None,
    };
    full.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn accepts(name: HeaderName, value: &'static str) -> Accepts {
        let mut headers = HeaderMap::new();
        headers.insert(name, HeaderValue::from_static(value));
        Accepts::from_headers(&headers)
    }

    #[test]
    fn types_by_quality() {
        let accepts = accepts(header::ACCEPT, "text/html;q=0.5, application/json, */*;q=0.1");

        assert_eq!(accepts.types(), vec!["application/json", "text/html", "*/*"]);
        assert_eq!(accepts.accepts_type(&["html", "json"]), Some("json"));
        assert_eq!(accepts.accepts_type(&["html"]), Some("html"));
        assert_eq!(accepts.accepts_type(&["image/png"]), Some("image/png"));
    }

    #[test]
    fn refused_types() {
        let accepts = accepts(header::ACCEPT, "text/plain, image/*;q=0");
        assert_eq!(accepts.accepts_type(&["png"]), None);
        assert_eq!(accepts.accepts_type(&["png", "text"]), Some("text"));
    }

    #[test]
    fn missing_header_takes_first_offer() {
        let accepts = Accepts::from_headers(&HeaderMap::new());
        assert!(accepts.types().is_empty());
        assert_eq!(accepts.accepts_type(&["json", "html"]), Some("json"));
        assert_eq!(accepts.accepts_encoding(&["gzip"]), Some("gzip"));
        assert_eq!(accepts.accepts_language(&[]), None);
    }

    #[test]
    fn encodings_charsets_languages() {
        assert_eq!(accepts(header::ACCEPT_ENCODING, "gzip;q=0.2, br").accepts_encoding(&["gzip", "br"]), Some("br"));
        assert_eq!(accepts(header::ACCEPT_CHARSET, "utf-8, iso-8859-1;q=0.5").accepts_charset(&["iso-8859-1"]), Some("iso-8859-1"));
        assert_eq!(accepts(header::ACCEPT_LANGUAGE, "fr;q=0.4, en").accepts_language(&["fr", "en-US"]), Some("en-US"));
        assert_eq!(accepts(header::ACCEPT_LANGUAGE, "de").accepts_language(&["en"]), None);
    }

    #[test]
    fn short_names() {
        assert_eq!(mime_for("json").unwrap(), mime::APPLICATION_JSON);
        assert_eq!(mime_for(".html").unwrap().essence_str(), "text/html");
        assert_eq!(mime_for("application/vnd.api+json").unwrap().subtype().as_str(), "vnd.api");
        assert!(mime_for("nope").is_none());
    }
}
