use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        FromRequest, FromRequestParts, Query, Request,
    },
    http::{request::Parts, Uri},
    Json,
};
use domain::FieldViolation;
use serde::de::DeserializeOwned;
use validator::Validate;

use crate::error::ApiError;

/// 反序列化 JSON 请求体并执行 `validator` 规则。
#[derive(Debug, Clone)]
pub struct ValidatedJson<T>(pub T);

impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection: JsonRejection| ApiError::bad_request(rejection.body_text()))?;
        value.validate()?;
        Ok(ValidatedJson(value))
    }
}

/// 查询串版本：解析失败同样走统一的错误响应。
#[derive(Debug, Clone)]
pub struct ValidatedQuery<T>(pub T);

impl<S, T> FromRequestParts<S> for ValidatedQuery<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(query_rejection)?;
        value.validate()?;
        Ok(ValidatedQuery(value))
    }
}

/// 按出现顺序取出某个查询参数的全部取值。
/// 同时接受 `key=a&key=b`、`key[]=a` 与逗号分隔的 `key=a,b`。
pub fn query_values(uri: &Uri, key: &str) -> Result<Vec<String>, ApiError> {
    let Query(pairs) =
        Query::<Vec<(String, String)>>::try_from_uri(uri).map_err(query_rejection)?;
    let array_key = format!("{key}[]");
    Ok(pairs
        .into_iter()
        .filter(|(name, _)| name == key || *name == array_key)
        .flat_map(|(_, value)| {
            value
                .split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_owned)
                .collect::<Vec<_>>()
        })
        .collect())
}

fn query_rejection(rejection: QueryRejection) -> ApiError {
    ApiError::validation(vec![FieldViolation::new("query", rejection.body_text())])
}
