use std::collections::HashMap;

const EXPECTED_HEADERS: [&str; 4] = [
    "x-content-type-options",
    "x-frame-options",
    "x-xss-protection",
    "strict-transport-security",
];

/// Advisory-only security posture check: missing hardening headers and
/// potentially leaky 5xx bodies are surfaced as recommendations but never
/// affect `passed`.
pub fn advisories(headers: &HashMap<String, String>, status: u16) -> Vec<String> {
    let mut notes = Vec::new();
    for expected in EXPECTED_HEADERS {
        if !headers.contains_key(expected) {
            notes.push(format!("missing recommended security header '{expected}'"));
        }
    }
    if status >= 500 {
        notes.push("5xx response may leak internal error details".to_string());
    }
    notes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_all_missing_headers() {
        let notes = advisories(&HashMap::new(), 200);
        assert_eq!(notes.len(), EXPECTED_HEADERS.len());
    }

    #[test]
    fn present_headers_are_not_flagged() {
        let mut headers = HashMap::new();
        headers.insert("x-content-type-options".to_string(), "nosniff".to_string());
        let notes = advisories(&headers, 200);
        assert_eq!(notes.len(), EXPECTED_HEADERS.len() - 1);
    }

    #[test]
    fn server_error_adds_leak_warning() {
        let notes = advisories(&HashMap::new(), 503);
        assert!(notes.iter().any(|n| n.contains("5xx")));
    }
}
