use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{config::AuthConfig, rate_limit::Identity};

/// Claims of the tokens the content API issues.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default)]
    pub role: Option<String>,
    pub exp: usize,
}

pub struct TokenVerifier {
    key: Option<DecodingKey>,
    validation: Validation,
    admin_roles: Vec<String>,
}

impl TokenVerifier {
    pub fn new(config: &AuthConfig) -> Self {
        let key = if config.jwt_secret.is_empty() {
            None
        } else {
            Some(DecodingKey::from_secret(config.jwt_secret.as_bytes()))
        };

        Self {
            key,
            validation: Validation::new(Algorithm::HS256),
            admin_roles: config.admin_roles.clone(),
        }
    }

    pub fn verify(&self, token: &str) -> Option<Identity> {
        let key = self.key.as_ref()?;
        let claims = match decode::<Claims>(token, key, &self.validation) {
            Ok(data) => data.claims,
            Err(e) => {
                debug!(error = %e, "Ignoring invalid bearer token");
                return None;
            }
        };

        let is_admin = claims
            .role
            .as_deref()
            .is_some_and(|role| self.admin_roles.iter().any(|r| r.eq_ignore_ascii_case(role)));

        Some(Identity {
            user_id: claims.sub,
            is_admin,
        })
    }
}

/// Attaches the caller's [`Identity`] when a valid bearer token is present.
/// Never rejects: callers without one continue as anonymous.
pub async fn auth_middleware(
    State(verifier): State<Arc<TokenVerifier>>,
    mut request: Request,
    next: Next,
) -> Response {
    let identity = bearer_token(request.headers()).and_then(|t| verifier.verify(t));
    if let Some(identity) = identity {
        request.extensions_mut().insert(identity);
    }
    next.run(request).await
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "test-secret";

    fn verifier() -> TokenVerifier {
        TokenVerifier::new(&AuthConfig {
            jwt_secret: SECRET.to_string(),
            admin_roles: vec!["admin".to_string()],
        })
    }

    fn token(sub: &str, role: Option<&str>, secret: &str) -> String {
        let claims = Claims {
            sub: sub.to_string(),
            role: role.map(str::to_string),
            exp: (chrono::Utc::now().timestamp() + 3600) as usize,
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    #[test]
    fn valid_token_yields_identity() {
        let identity = verifier().verify(&token("u-42", Some("authenticated"), SECRET)).unwrap();
        assert_eq!(identity.user_id, "u-42");
        assert!(!identity.is_admin);
    }

    #[test]
    fn admin_role_is_case_insensitive() {
        let identity = verifier().verify(&token("imam", Some("Admin"), SECRET)).unwrap();
        assert!(identity.is_admin);
    }

    #[test]
    fn unlisted_or_missing_role_is_not_admin() {
        let editor = verifier().verify(&token("u-1", Some("editor"), SECRET)).unwrap();
        let plain = verifier().verify(&token("u-2", None, SECRET)).unwrap();
        assert!(!editor.is_admin);
        assert!(!plain.is_admin);
        assert_eq!(plain.user_id, "u-2");
    }

    #[test]
    fn wrong_signature_is_anonymous() {
        assert!(verifier().verify(&token("u-42", None, "other")).is_none());
    }

    #[test]
    fn empty_secret_disables_decoding() {
        let verifier = TokenVerifier::new(&AuthConfig::default());
        assert!(verifier.verify(&token("u-42", None, "")).is_none());
    }

    #[test]
    fn bearer_prefix_is_required() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert!(bearer_token(&headers).is_none());

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(bearer_token(&headers), Some("abc"));
    }
}
