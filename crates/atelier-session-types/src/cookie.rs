//! Cookie builders for the session token.

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use http::HeaderMap;
use time::Duration;

/// Cookie name carrying the opaque session token.
pub const SESSION_TOKEN_COOKIE: &str = "sessionToken";

/// Cookie Max-Age in seconds (30 days).
pub const SESSION_MAX_AGE_SECS: i64 = 2_592_000;

/// Per-response cookie attributes that depend on deployment and on the request.
#[derive(Debug, Clone, Default)]
pub struct CookieOptions {
    /// `Domain` attribute; host-only cookie when `None`.
    pub domain: Option<String>,
    /// Append `Secure`. Set when the request arrived over HTTPS.
    pub secure: bool,
}

impl CookieOptions {
    /// Options for a response to a request with `headers`.
    /// `force_secure` pins `Secure` on regardless of the detected scheme.
    pub fn for_request(headers: &HeaderMap, domain: Option<String>, force_secure: bool) -> Self {
        Self {
            domain,
            secure: force_secure || is_https(headers),
        }
    }
}

fn session_cookie(value: String, max_age: Duration, opts: &CookieOptions) -> Cookie<'static> {
    let mut builder = Cookie::build((SESSION_TOKEN_COOKIE, value))
        .path("/")
        .max_age(max_age)
        .http_only(true)
        .secure(opts.secure)
        .same_site(SameSite::Lax);
    if let Some(domain) = opts.domain.clone() {
        builder = builder.domain(domain);
    }
    builder.build()
}

/// Set the session cookie on the jar.
///
/// ```
/// use axum_extra::extract::cookie::{CookieJar, SameSite};
/// use atelier_session_types::cookie::{set_session_cookie, CookieOptions, SESSION_TOKEN_COOKIE};
///
/// let opts = CookieOptions { domain: None, secure: true };
/// let jar = set_session_cookie(CookieJar::new(), "token_value".to_string(), &opts);
/// let cookie = jar.get(SESSION_TOKEN_COOKIE).unwrap();
/// assert_eq!(cookie.value(), "token_value");
/// assert_eq!(cookie.path(), Some("/"));
/// assert_eq!(cookie.max_age(), Some(time::Duration::seconds(2592000)));
/// assert_eq!(cookie.same_site(), Some(SameSite::Lax));
/// assert!(cookie.secure().unwrap_or(false));
/// ```
pub fn set_session_cookie(jar: CookieJar, token: String, opts: &CookieOptions) -> CookieJar {
    jar.add(session_cookie(
        token,
        Duration::seconds(SESSION_MAX_AGE_SECS),
        opts,
    ))
}

/// Clear the session cookie by re-issuing it empty with Max-Age 0.
///
/// ```
/// use axum_extra::extract::cookie::CookieJar;
/// use atelier_session_types::cookie::{
///     clear_session_cookie, set_session_cookie, CookieOptions, SESSION_TOKEN_COOKIE,
/// };
///
/// let opts = CookieOptions::default();
/// let jar = set_session_cookie(CookieJar::new(), "t".to_string(), &opts);
/// let jar = clear_session_cookie(jar, &opts);
/// let cookie = jar.get(SESSION_TOKEN_COOKIE).unwrap();
/// assert_eq!(cookie.value(), "");
/// assert_eq!(cookie.max_age(), Some(time::Duration::ZERO));
/// ```
pub fn clear_session_cookie(jar: CookieJar, opts: &CookieOptions) -> CookieJar {
    jar.add(session_cookie(String::new(), Duration::ZERO, opts))
}

/// Non-empty session token from the jar, if any.
pub fn session_token(jar: &CookieJar) -> Option<String> {
    jar.get(SESSION_TOKEN_COOKIE)
        .map(|c| c.value().trim())
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
}

/// Whether the request reached the edge over HTTPS, as reported by the proxy
/// (`X-Forwarded-Proto`, or `proto=` in an RFC 7239 `Forwarded` header).
pub fn is_https(headers: &HeaderMap) -> bool {
    let forwarded_proto = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().eq_ignore_ascii_case("https"));
    if let Some(https) = forwarded_proto {
        return https;
    }

    headers
        .get_all(http::header::FORWARDED)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split([';', ',']))
        .filter_map(|pair| pair.trim().split_once('='))
        .any(|(k, v)| {
            k.eq_ignore_ascii_case("proto") && v.trim_matches('"').eq_ignore_ascii_case("https")
        })
}
