use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};

use super::{claims::TokenKind, jwt::JwtKeys};

pub const ACCESS_COOKIE: &str = "access_token";
pub const REFRESH_COOKIE: &str = "refresh_token";

fn auth_cookie(name: &'static str, value: String, max_age_secs: i64, secure: bool) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(if secure { SameSite::None } else { SameSite::Lax })
        .max_age(time::Duration::seconds(max_age_secs))
        .build()
}

pub fn with_auth_cookies(
    jar: CookieJar,
    keys: &JwtKeys,
    access_token: &str,
    refresh_token: &str,
    secure: bool,
) -> CookieJar {
    let access_age = keys.ttl(TokenKind::Access).as_secs() as i64;
    let refresh_age = keys.ttl(TokenKind::Refresh).as_secs() as i64;
    jar.add(auth_cookie(ACCESS_COOKIE, access_token.to_string(), access_age, secure))
        .add(auth_cookie(REFRESH_COOKIE, refresh_token.to_string(), refresh_age, secure))
}

pub fn without_auth_cookies(jar: CookieJar) -> CookieJar {
    jar.remove(Cookie::build(ACCESS_COOKIE).path("/"))
        .remove(Cookie::build(REFRESH_COOKIE).path("/"))
}
