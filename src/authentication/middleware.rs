use std::{convert::Infallible, sync::Arc};

use warp::Filter;

use super::jwt::{verify_jwt_session, SessionData, SessionKeys};

/// Picks the session token from an `Authorization: Token <jwt>` (or
/// `Bearer`) header, falling back to the `session` cookie.
pub fn extract_token(authorization: Option<&str>, cookie: Option<&str>) -> Option<String> {
    let from_header = authorization.and_then(|value| {
        let (scheme, token) = value.trim().split_once(' ')?;
        match scheme {
            "Token" | "Bearer" if !token.trim().is_empty() => Some(token.trim().to_owned()),
            _ => None,
        }
    });

    from_header.or_else(|| {
        cookie
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(|c| c.to_owned())
    })
}

/// Resolves the caller's session, or `None` for anonymous callers and
/// tokens that fail verification.
pub fn with_possible_session(
    keys: Arc<SessionKeys>,
) -> impl Filter<Extract = (Option<SessionData>,), Error = Infallible> + Clone {
    warp::header::optional::<String>("authorization")
        .or(warp::any().map(|| None))
        .unify()
        .and(warp::cookie::optional::<String>("session"))
        .map(move |header: Option<String>, cookie: Option<String>| {
            let token = extract_token(header.as_deref(), cookie.as_deref())?;
            match verify_jwt_session(&token, &keys) {
                Ok(data) => Some(data.into()),
                Err(e) => {
                    log::trace!("> Ignoring session: {e}");
                    None
                }
            }
        })
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::{jwt::generate_jwt_session, schema::{User, UserRole}};

    #[test]
    fn header_takes_precedence() {
        assert_eq!(
            extract_token(Some("Token abc"), Some("def")),
            Some(String::from("abc"))
        );
        assert_eq!(
            extract_token(Some("Bearer abc"), None),
            Some(String::from("abc"))
        );
    }

    #[test]
    fn unknown_scheme_falls_back_to_cookie() {
        assert_eq!(
            extract_token(Some("Basic abc"), Some("def")),
            Some(String::from("def"))
        );
        assert_eq!(extract_token(Some("Token "), None), None);
        assert_eq!(extract_token(None, None), None);
    }

    #[tokio::test]
    async fn filter_resolves_sessions() {
        let keys = Arc::new(SessionKeys::new("secret", Duration::hours(1)).unwrap());
        let user = User {
            id: 3,
            email: String::from("a@b.c"),
            username: String::from("author"),
            first_name: String::new(),
            last_name: String::new(),
            password: String::new(),
            role: UserRole::Admin,
        };
        let token = generate_jwt_session(&user, &keys).unwrap();
        let filter = with_possible_session(keys);

        let session = warp::test::request()
            .header("authorization", format!("Token {token}"))
            .filter(&filter)
            .await
            .unwrap();
        assert_eq!(session.map(|s| s.user_id), Some(3));

        let anonymous = warp::test::request().filter(&filter).await.unwrap();
        assert!(anonymous.is_none());

        let forged = warp::test::request()
            .header("authorization", "Token not.a.jwt")
            .filter(&filter)
            .await
            .unwrap();
        assert!(forged.is_none());
    }
}
