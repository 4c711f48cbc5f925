use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};

use crate::AppState;
use crate::utils::{Identity, error_codes, error_to_api_response, verify_token};

fn unauthorized(msg: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        error_to_api_response::<()>(error_codes::AUTH_FAILED, msg.to_string()),
    )
        .into_response()
}

/// 校验 Bearer 令牌，把调用方身份放入请求扩展供处理函数取用
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let Some(Authorization(bearer)) = req.headers().typed_get::<Authorization<Bearer>>() else {
        return unauthorized("缺少认证令牌");
    };

    let claims = match verify_token(bearer.token(), &state.config) {
        Ok(claims) => claims,
        Err(e) => {
            tracing::warn!("token rejected: {}", e);
            return unauthorized("认证令牌无效或已过期");
        }
    };

    let identity = match Identity::try_from(claims) {
        Ok(identity) => identity,
        Err(e) => {
            tracing::warn!("token subject is not a user id: {}", e);
            return unauthorized("认证令牌无效或已过期");
        }
    };

    req.extensions_mut().insert(identity);
    next.run(req).await
}
