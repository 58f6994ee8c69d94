use hyper::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::debug;

/// Extract a header value as a string
pub fn get_header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(|s| {
        debug!("Retrieved header: {}", name);
        s.to_string()
    })
}

/// True when the header's media type (parameters ignored) equals `media_type`.
pub fn media_type_is(headers: &HeaderMap, name: &str, media_type: &str) -> bool {
    get_header_value(headers, name)
        .and_then(|v| v.split(';').next().map(|m| m.trim().eq_ignore_ascii_case(media_type)))
        .unwrap_or(false)
}

/// Set a static header on a response.
pub fn with_header<T>(
    mut res: hyper::Response<T>,
    name: HeaderName,
    value: &'static str,
) -> hyper::Response<T> {
    res.headers_mut().insert(name, HeaderValue::from_static(value));
    res
}

#[cfg(test)]
mod tests {
    use hyper::header::{CACHE_CONTROL, CONTENT_TYPE};

    use super::*;

    #[test]
    fn media_type_ignores_parameters_and_case() {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("Application/X-WWW-Form-Urlencoded; charset=UTF-8"),
        );
        assert!(media_type_is(
            &headers,
            "content-type",
            "application/x-www-form-urlencoded"
        ));
        assert!(!media_type_is(&headers, "content-type", "application/json"));
        assert!(!media_type_is(&HeaderMap::new(), "content-type", "text/plain"));
    }

    #[test]
    fn header_is_set() {
        let res = with_header(hyper::Response::new(()), CACHE_CONTROL, "must-revalidate");
        assert_eq!(res.headers()[CACHE_CONTROL], "must-revalidate");
    }
}
