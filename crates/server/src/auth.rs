//! HS256 bearer tokens for demo-grade login.

use axum::extract::FromRequestParts;
use axum::http::{header::AUTHORIZATION, request::Parts};
use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use wfh_core::domain::application::Applicant;
use wfh_core::domain::approval::Actor;
use wfh_core::domain::user::{Role, UserAccount};
use wfh_core::errors::ApplicationError;

use crate::api::{ApiError, ApiState};
use crate::context::CorrelationId;

const MAX_TTL_MINUTES: u64 = 10_080;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Account email.
    pub sub: String,
    pub name: String,
    pub role: Role,
    pub department: String,
    pub exp: i64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token expired")]
    Expired,
    #[error("invalid token: {0}")]
    Invalid(String),
    #[error("token signing failed: {0}")]
    Signing(String),
}

pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl TokenIssuer {
    pub fn new(secret: &SecretString, ttl_minutes: u64) -> Self {
        let bytes = secret.expose_secret().as_bytes();
        let minutes = i64::try_from(ttl_minutes.min(MAX_TTL_MINUTES)).unwrap_or(60);

        Self {
            encoding: EncodingKey::from_secret(bytes),
            decoding: DecodingKey::from_secret(bytes),
            validation: Validation::new(Algorithm::HS256),
            ttl: Duration::minutes(minutes),
        }
    }

    pub fn issue(&self, account: &UserAccount) -> Result<String, TokenError> {
        let claims = Claims {
            sub: account.email.clone(),
            name: account.name.clone(),
            role: account.role,
            department: account.department.clone(),
            exp: (Utc::now() + self.ttl).timestamp(),
        };
        self.sign(&claims)
    }

    fn sign(&self, claims: &Claims) -> Result<String, TokenError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|error| TokenError::Signing(error.to_string()))
    }

    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|error| match error.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid(error.to_string()),
            })
    }
}

/// Caller identity from an optional `Authorization: Bearer` header.
///
/// A missing header yields `Identity(None)`; a present but unusable one is a 401.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Identity(pub Option<Claims>);

impl Identity {
    pub fn applicant(&self) -> Applicant {
        match &self.0 {
            Some(claims) => Applicant {
                email: claims.sub.clone(),
                name: claims.name.clone(),
                department: claims.department.clone(),
            },
            None => Applicant::demo(),
        }
    }

    /// Applicant-role tokens carry no approver tier, so the stage role is recorded instead.
    pub fn actor(&self) -> Actor {
        match &self.0 {
            Some(claims) => Actor {
                email: claims.sub.clone(),
                name: claims.name.clone(),
                role: Some(claims.role).filter(|role| *role != Role::Applicant),
            },
            None => Actor::demo(),
        }
    }
}

impl FromRequestParts<ApiState> for Identity {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ApiState,
    ) -> Result<Self, Self::Rejection> {
        let Some(header) = parts.headers.get(AUTHORIZATION) else {
            return Ok(Self(None));
        };
        let correlation = parts.extensions.get::<CorrelationId>().cloned();
        let reject = |message: String| {
            let correlation = correlation.clone().unwrap_or_else(CorrelationId::generate);
            ApiError::from_application(&correlation, ApplicationError::Unauthorized(message))
        };

        let token = header
            .to_str()
            .ok()
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| reject("expected `Authorization: Bearer <token>`".to_string()))?;

        state.tokens.verify(token).map(|claims| Self(Some(claims))).map_err(|error| {
            reject(match error {
                TokenError::Expired => "token expired".to_string(),
                _ => "invalid token".to_string(),
            })
        })
    }
}
