//! Body extractors that answer malformed input with our own error shape
//! instead of axum's plain-text rejections.

use axum::{
    extract::{
        FromRequest, Request,
        rejection::{FormRejection, JsonRejection},
    },
    http::StatusCode,
};

use crate::error::AppError;

/// `application/x-www-form-urlencoded` body. Any rejection, including a
/// missing content type, is a bad request.
pub struct Form<T>(pub T);

impl<S, T> FromRequest<S> for Form<T>
where
    axum::Form<T>: FromRequest<S, Rejection = FormRejection>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        axum::Form::<T>::from_request(req, state)
            .await
            .map(|axum::Form(value)| Form(value))
            .map_err(|rejection| AppError::bad_request(rejection.body_text()))
    }
}

/// JSON body, rejected with 422 like the rest of the admin API expects.
pub struct Json<T>(pub T);

impl<S, T> FromRequest<S> for Json<T>
where
    axum::Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        axum::Json::<T>::from_request(req, state)
            .await
            .map(|axum::Json(value)| Json(value))
            .map_err(|rejection| (rejection.body_text(), StatusCode::UNPROCESSABLE_ENTITY).into())
    }
}
