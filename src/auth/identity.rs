//! Identity token verification.
//!
//! Only RS256 is accepted. The algorithm comes from a fixed allow-list, never
//! from the token header, so `none` and HMAC-signed tokens are refused before
//! any key lookup.

use base64ct::{Base64UrlUnpadded, Encoding};
use jsonwebtoken::{decode, decode_header, errors::ErrorKind, Algorithm, DecodingKey, Validation};
use serde_json::{Map, Value};
use std::sync::Arc;

use super::{error::AuthError, jwks::KeySet};

pub const GOOGLE_ISSUERS: [&str; 2] = ["https://accounts.google.com", "accounts.google.com"];

/// Caller identity projected from a verified token.
#[derive(Debug, Clone)]
pub struct Identity {
    pub subject_id: String,
    pub email: String,
    pub display_name: Option<String>,
    pub picture_url: Option<String>,
    /// The verified token itself, as presented.
    pub token: String,
    pub claims: Map<String, Value>,
}

#[derive(Debug, Clone)]
pub struct IdentityVerifier {
    keys: Arc<KeySet>,
    client_id: String,
    issuers: Vec<String>,
}

impl IdentityVerifier {
    #[must_use]
    pub fn new(keys: Arc<KeySet>, client_id: impl Into<String>) -> Self {
        Self {
            keys,
            client_id: client_id.into(),
            issuers: GOOGLE_ISSUERS.iter().map(ToString::to_string).collect(),
        }
    }

    #[must_use]
    pub fn with_issuers<I, S>(mut self, issuers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.issuers = issuers.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Verify `token` and extract the caller identity.
    ///
    /// # Errors
    ///
    /// Returns an error if the algorithm is not RS256, the signing key is
    /// unknown, the signature, audience, issuer or expiry do not check out, or
    /// `sub`/`email` are missing.
    pub fn parse(&self, token: &str) -> Result<Identity, AuthError> {
        // `none` and unknown names are not in `Algorithm` and would only
        // surface as a JSON error from `decode_header`
        if let Some(alg) = header_alg(token) {
            if alg != "RS256" {
                return Err(AuthError::UnsupportedAlgorithm(alg));
            }
        }

        let header = decode_header(token)?;
        let kid = header.kid.ok_or(AuthError::UnknownKey)?;
        let jwk = self.keys.find(&kid).ok_or(AuthError::UnknownKey)?;
        let key = DecodingKey::from_jwk(&jwk)?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[self.client_id.as_str()]);
        validation.set_issuer(self.issuers.as_slice());
        validation.set_required_spec_claims(&["exp", "aud", "iss", "sub"]);

        let data = decode::<Map<String, Value>>(token, &key, &validation).map_err(|err| {
            match err.kind() {
                ErrorKind::InvalidAudience => AuthError::InvalidAudience,
                _ => AuthError::Token(err),
            }
        })?;
        let claims = data.claims;

        let subject_id = string_claim(&claims, "sub").ok_or(AuthError::MissingClaim("sub"))?;
        let email = string_claim(&claims, "email").ok_or(AuthError::MissingClaim("email"))?;

        Ok(Identity {
            subject_id,
            email,
            display_name: string_claim(&claims, "name"),
            picture_url: string_claim(&claims, "picture"),
            token: token.to_string(),
            claims,
        })
    }
}

/// The raw `alg` of the token header, if the header decodes at all.
fn header_alg(token: &str) -> Option<String> {
    let (encoded, _) = token.split_once('.')?;
    let header = Base64UrlUnpadded::decode_vec(encoded).ok()?;
    let header: Map<String, Value> = serde_json::from_slice(&header).ok()?;
    header.get("alg").and_then(Value::as_str).map(str::to_string)
}

fn string_claim(claims: &Map<String, Value>, name: &str) -> Option<String> {
    claims.get(name).and_then(Value::as_str).map(str::to_string)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::auth::{error::ErrorKind as AuthErrorKind, jwks::tests::test_jwks};
    use anyhow::Result;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    pub(crate) const CLIENT_ID: &str = "client-123.apps.googleusercontent.com";

    const SIGNER: &[u8] = include_bytes!("testdata/signer.pem");
    const IMPOSTOR: &[u8] = include_bytes!("testdata/impostor.pem");

    pub(crate) fn now() -> i64 {
        time::OffsetDateTime::now_utc().unix_timestamp()
    }

    pub(crate) fn google_claims(sub: &str, email: &str) -> Value {
        json!({
            "iss": "https://accounts.google.com",
            "aud": CLIENT_ID,
            "sub": sub,
            "email": email,
            "name": "Ada Lovelace",
            "picture": "https://example.com/ada.png",
            "iat": now(),
            "exp": now() + 3600,
        })
    }

    fn sign_with(pem: &[u8], kid: &str, claims: &Value) -> Result<String> {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(kid.to_string());
        Ok(encode(&header, claims, &EncodingKey::from_rsa_pem(pem)?)?)
    }

    pub(crate) fn sign(claims: &Value) -> Result<String> {
        sign_with(SIGNER, "signer-1", claims)
    }

    pub(crate) fn verifier() -> Result<IdentityVerifier> {
        Ok(IdentityVerifier::new(
            Arc::new(KeySet::from_jwks(test_jwks()?)),
            CLIENT_ID,
        ))
    }

    #[test]
    fn valid_token_yields_identity() -> Result<()> {
        let token = sign(&google_claims("1234", "ada@example.com"))?;
        let identity = verifier()?.parse(&token)?;

        assert_eq!(identity.subject_id, "1234");
        assert_eq!(identity.email, "ada@example.com");
        assert_eq!(identity.display_name.as_deref(), Some("Ada Lovelace"));
        assert_eq!(
            identity.picture_url.as_deref(),
            Some("https://example.com/ada.png")
        );
        assert_eq!(identity.token, token);
        assert!(identity.claims.contains_key("iat"));
        Ok(())
    }

    #[test]
    fn optional_claims_may_be_absent() -> Result<()> {
        let mut claims = google_claims("1234", "ada@example.com");
        if let Some(map) = claims.as_object_mut() {
            map.remove("name");
            map.remove("picture");
        }
        let identity = verifier()?.parse(&sign(&claims)?)?;

        assert!(identity.display_name.is_none());
        assert!(identity.picture_url.is_none());
        Ok(())
    }

    #[test]
    fn wrong_audience_is_rejected() -> Result<()> {
        let mut claims = google_claims("1234", "ada@example.com");
        claims["aud"] = json!("someone-else.apps.googleusercontent.com");

        let result = verifier()?.parse(&sign(&claims)?);
        assert!(matches!(result, Err(AuthError::InvalidAudience)));
        Ok(())
    }

    #[test]
    fn audience_is_case_sensitive() -> Result<()> {
        let mut claims = google_claims("1234", "ada@example.com");
        claims["aud"] = json!(CLIENT_ID.to_uppercase());

        let result = verifier()?.parse(&sign(&claims)?);
        assert!(matches!(result, Err(AuthError::InvalidAudience)));
        Ok(())
    }

    #[test]
    fn foreign_issuer_is_rejected() -> Result<()> {
        let mut claims = google_claims("1234", "ada@example.com");
        claims["iss"] = json!("https://issuer.example.com");

        assert!(verifier()?.parse(&sign(&claims)?).is_err());
        Ok(())
    }

    #[test]
    fn expired_token_is_rejected() -> Result<()> {
        let mut claims = google_claims("1234", "ada@example.com");
        claims["exp"] = json!(now() - 3600);

        assert!(verifier()?.parse(&sign(&claims)?).is_err());
        Ok(())
    }

    #[test]
    fn symmetric_algorithm_is_rejected() -> Result<()> {
        let mut header = Header::new(Algorithm::HS256);
        header.kid = Some("signer-1".to_string());
        let token = encode(
            &header,
            &google_claims("1234", "ada@example.com"),
            &EncodingKey::from_secret(b"shared"),
        )?;

        let result = verifier()?.parse(&token);
        assert!(matches!(result, Err(AuthError::UnsupportedAlgorithm(_))));
        Ok(())
    }

    #[test]
    fn unsigned_token_is_rejected() -> Result<()> {
        let header = Base64UrlUnpadded::encode_string(br#"{"alg":"none","kid":"signer-1"}"#);
        let payload = Base64UrlUnpadded::encode_string(
            serde_json::to_string(&google_claims("1234", "ada@example.com"))?.as_bytes(),
        );
        let token = format!("{header}.{payload}.");

        let err = verifier()?
            .parse(&token)
            .err()
            .ok_or_else(|| anyhow::anyhow!("unsigned token accepted"))?;
        assert!(matches!(&err, AuthError::UnsupportedAlgorithm(alg) if alg == "none"));
        assert_eq!(err.kind(), AuthErrorKind::Forgery);
        Ok(())
    }

    #[test]
    fn garbage_header_is_malformed() -> Result<()> {
        let err = verifier()?
            .parse("not-base64!.e30.")
            .err()
            .ok_or_else(|| anyhow::anyhow!("garbage accepted"))?;
        assert_eq!(err.kind(), AuthErrorKind::Malformed);
        Ok(())
    }

    #[test]
    fn signature_from_other_key_is_forgery() -> Result<()> {
        let token = sign_with(IMPOSTOR, "signer-1", &google_claims("1234", "ada@example.com"))?;

        let err = verifier()?
            .parse(&token)
            .err()
            .ok_or_else(|| anyhow::anyhow!("impostor token accepted"))?;
        assert_eq!(err.kind(), AuthErrorKind::Forgery);
        Ok(())
    }

    #[test]
    fn unknown_key_id_is_rejected() -> Result<()> {
        let token = sign_with(SIGNER, "retired", &google_claims("1234", "ada@example.com"))?;

        let result = verifier()?.parse(&token);
        assert!(matches!(result, Err(AuthError::UnknownKey)));
        Ok(())
    }

    #[test]
    fn missing_email_is_rejected() -> Result<()> {
        let mut claims = google_claims("1234", "ada@example.com");
        if let Some(map) = claims.as_object_mut() {
            map.remove("email");
        }

        let result = verifier()?.parse(&sign(&claims)?);
        assert!(matches!(result, Err(AuthError::MissingClaim("email"))));
        Ok(())
    }

    #[test]
    fn non_string_subject_is_rejected() -> Result<()> {
        let mut claims = google_claims("1234", "ada@example.com");
        claims["sub"] = json!(1234);

        assert!(verifier()?.parse(&sign(&claims)?).is_err());
        Ok(())
    }
}
