use axum::http::{header::AUTHORIZATION, HeaderMap};

/// Per-request correlation id, stored in request extensions and echoed as `X-Request-ID`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub String);

/// Pull the token out of an `Authorization: <scheme> <token>` value.
/// Any other shape yields an empty string, which verification then rejects.
pub fn extract_token(header: Option<&str>) -> String {
    let Some(value) = header else { return String::new(); };
    let parts: Vec<&str> = value.split(' ').collect();
    if parts.len() == 2 { parts[1].to_string() } else { String::new() }
}

pub fn bearer_token(headers: &HeaderMap) -> String {
    extract_token(headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn two_part_form_only() {
        assert_eq!(extract_token(Some("Bearer abc.def.ghi")), "abc.def.ghi");
        assert_eq!(extract_token(Some("Token xyz")), "xyz");
        assert_eq!(extract_token(None), "");
        assert_eq!(extract_token(Some("abc.def.ghi")), "");
        assert_eq!(extract_token(Some("Bearer  abc")), "");
        assert_eq!(extract_token(Some("Bearer abc extra")), "");
        assert_eq!(extract_token(Some("Bearer ")), "");
    }

    #[test]
    fn reads_authorization_header() {
        let mut h = HeaderMap::new();
        assert_eq!(bearer_token(&h), "");
        h.insert(AUTHORIZATION, HeaderValue::from_static("Bearer t0k3n"));
        assert_eq!(bearer_token(&h), "t0k3n");
    }
}
