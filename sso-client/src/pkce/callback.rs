use super::PkceError;
use serde::{Deserialize, Serialize};
use url::form_urlencoded;

/// Query parameters the authorization server appends when redirecting back.
///
/// A key missing from the query is `None`; a key present with an empty value is `Some("")`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Extract `code`, `state`, `error` and `error_description` from a callback URL.
///
/// When a key repeats, the first occurrence wins.
pub fn parse_callback_url(url: &str) -> Result<CallbackParams, PkceError> {
    let parsed = url::Url::parse(url)?;
    let mut out = CallbackParams::default();
    for (key, value) in parsed.query_pairs() {
        let slot = match &*key {
            "code" => &mut out.code,
            "state" => &mut out.state,
            "error" => &mut out.error,
            "error_description" => &mut out.error_description,
            _ => continue,
        };
        if slot.is_none() {
            *slot = Some(value.into_owned());
        }
    }
    Ok(out)
}

/// Strict byte-for-byte comparison; no trimming or case folding.
pub fn validate_state(received_state: &str, original_state: &str) -> bool {
    received_state == original_state
}

/// The redirect back to the client once the login center has issued a code.
pub fn build_callback_url(redirect_uri: &str, code: &str, state: &str) -> String {
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("code", code)
        .append_pair("state", state)
        .finish();
    let joiner = if redirect_uri.contains('?') { '&' } else { '?' };
    format!("{}{}{}", redirect_uri, joiner, query)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_success_callback() {
        let p = parse_callback_url("https://app.example/callback?code=abc123&state=xyz").unwrap();
        assert_eq!(
            p,
            CallbackParams {
                code: Some("abc123".into()),
                state: Some("xyz".into()),
                error: None,
                error_description: None,
            }
        );
    }

    #[test]
    fn parses_error_callback() {
        let p = parse_callback_url(
            "https://app.example/callback?error=access_denied&error_description=User%20declined&state=xyz",
        )
        .unwrap();
        assert_eq!(
            p,
            CallbackParams {
                code: None,
                state: Some("xyz".into()),
                error: Some("access_denied".into()),
                error_description: Some("User declined".into()),
            }
        );
    }

    #[test]
    fn empty_value_is_distinct_from_missing() {
        let p = parse_callback_url("https://app.example/callback?code=&state=xyz").unwrap();
        assert_eq!(p.code.as_deref(), Some(""));
        assert_eq!(p.error, None);
    }

    #[test]
    fn first_duplicate_wins() {
        let p = parse_callback_url("https://app.example/cb?state=one&state=two").unwrap();
        assert_eq!(p.state.as_deref(), Some("one"));
    }

    #[test]
    fn no_query_yields_all_absent() {
        let p = parse_callback_url("https://app.example/cb").unwrap();
        assert_eq!(p, CallbackParams::default());
    }

    #[test]
    fn relative_url_is_an_error() {
        assert!(matches!(
            parse_callback_url("/callback?code=abc"),
            Err(PkceError::InvalidUrl(_))
        ));
    }

    #[test]
    fn state_validation_is_strict() {
        assert!(validate_state("xyz", "xyz"));
        assert!(validate_state("", ""));
        assert!(!validate_state("AbC", "abc"));
        assert!(!validate_state("xyz ", "xyz"));
        assert!(!validate_state("", "xyz"));
    }

    #[test]
    fn callback_url_round_trips() {
        let url = build_callback_url("https://client.example/cb", "c0de", "state_1_x-y");
        assert_eq!(url, "https://client.example/cb?code=c0de&state=state_1_x-y");
        let p = parse_callback_url(&url).unwrap();
        assert_eq!(p.code.as_deref(), Some("c0de"));
        assert_eq!(p.state.as_deref(), Some("state_1_x-y"));
    }
}
