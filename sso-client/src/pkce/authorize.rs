use super::{PkceError, PkceParams};
use crate::api::types::AuthorizeRequest;
use url::form_urlencoded;

/// Build the outbound authorization URL for `params`.
///
/// Appends `redirect_uri`, `state`, `code_challenge` and `code_challenge_method`,
/// form-urlencoded. Navigation is left to the caller.
pub fn build_authorization_url(base_url: &str, redirect_uri: &str, params: &PkceParams) -> String {
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("redirect_uri", redirect_uri)
        .append_pair("state", &params.state)
        .append_pair("code_challenge", &params.code_challenge)
        .append_pair("code_challenge_method", &params.code_challenge_method)
        .finish();

    let joiner = if base_url.contains('?') { '&' } else { '?' };
    format!("{}{}{}", base_url, joiner, query)
}

/// Read an incoming authorization request (the login center's side of the URL above).
///
/// `redirect_uri` and `code_challenge` are required; `state` and the method are optional.
pub fn parse_authorize_request(url: &str) -> Result<AuthorizeRequest, PkceError> {
    let parsed = url::Url::parse(url)?;
    let get = |key: &str| {
        parsed
            .query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    };

    let redirect_uri = get("redirect_uri")
        .filter(|v| !v.is_empty())
        .ok_or(PkceError::MissingParameter("redirect_uri"))?;
    let code_challenge = get("code_challenge")
        .filter(|v| !v.is_empty())
        .ok_or(PkceError::MissingParameter("code_challenge"))?;

    Ok(AuthorizeRequest {
        redirect_uri,
        code_challenge,
        state: get("state"),
        code_challenge_method: get("code_challenge_method"),
    })
}
