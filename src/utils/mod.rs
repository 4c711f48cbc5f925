use axum::Json;
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::Config;

/// 通用的API响应结构
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    /// 错误码，0表示成功，非0表示失败
    pub code: i32,
    /// 错误消息，成功时为"success"
    pub msg: String,
    /// 响应数据，错误时为None
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resp_data: Option<T>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,            // 用户ID
    pub name: String,           // 显示名
    pub gender: Option<String>, // 资料中的性别
    pub exp: i64,               // 过期时间
    pub iat: i64,               // 签发时间
}

/// 认证后的调用方身份
#[derive(Debug, Clone)]
pub struct Identity {
    pub user_id: Uuid,
    pub display_name: String,
    pub gender: Option<String>,
}

impl TryFrom<Claims> for Identity {
    type Error = uuid::Error;

    fn try_from(claims: Claims) -> Result<Self, Self::Error> {
        Ok(Self {
            user_id: Uuid::parse_str(&claims.sub)?,
            display_name: claims.name,
            gender: claims.gender,
        })
    }
}

pub fn generate_token(
    user_id: Uuid,
    name: &str,
    gender: Option<&str>,
    config: &Config,
) -> Result<(String, i64), jsonwebtoken::errors::Error> {
    let now = Utc::now();
    let expiration =
        (now + Duration::seconds(config.jwt_expiration().as_secs() as i64)).timestamp();

    let claims = Claims {
        sub: user_id.to_string(),
        name: name.to_string(),
        gender: gender.map(str::to_string),
        exp: expiration,
        iat: now.timestamp(),
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )?;

    Ok((token, expiration))
}

pub fn verify_token(token: &str, config: &Config) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &Validation::default(),
    )?;

    Ok(token_data.claims)
}

pub fn success_to_api_response<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        code: error_codes::SUCCESS,
        msg: "success".into(),
        resp_data: Some(data),
    })
}

pub fn error_to_api_response<T>(code: i32, msg: String) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        code,
        msg,
        resp_data: None,
    })
}

pub mod error_codes {
    pub const SUCCESS: i32 = 0;
    pub const VALIDATION_ERROR: i32 = 1000;
    pub const AUTH_FAILED: i32 = 1002;
    pub const PERMISSION_DENIED: i32 = 1003;
    pub const NOT_FOUND: i32 = 1004;

    // 活动参与相关
    pub const ACTIVITY_CLOSED: i32 = 2001;
    pub const ACTIVITY_FULL: i32 = 2002;
    pub const INVALID_TRANSITION: i32 = 2003;
    pub const TOO_LATE_TO_REMOVE: i32 = 2004;
    pub const SELF_JOIN: i32 = 2005;
    pub const ALREADY_CONFIRMED: i32 = 2006;
    pub const ALREADY_PENDING: i32 = 2007;
    pub const ALREADY_WAITLISTED: i32 = 2008;
    pub const ALREADY_RATED: i32 = 2009;
    pub const CONFLICT: i32 = 2010;

    pub const INTERNAL_ERROR: i32 = 5000;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_round_trips_identity() {
        let config = Config::default();
        let user_id = Uuid::new_v4();
        let (token, _) = generate_token(user_id, "Asha", Some("female"), &config).unwrap();

        let identity = Identity::try_from(verify_token(&token, &config).unwrap()).unwrap();
        assert_eq!(identity.user_id, user_id);
        assert_eq!(identity.display_name, "Asha");
        assert_eq!(identity.gender.as_deref(), Some("female"));
    }

    #[test]
    fn rejects_token_signed_with_other_secret() {
        let config = Config::default();
        let other = Config {
            jwt_secret: "another-secret".into(),
            ..Config::default()
        };
        let (token, _) = generate_token(Uuid::new_v4(), "Ravi", None, &other).unwrap();
        assert!(verify_token(&token, &config).is_err());
    }
}
