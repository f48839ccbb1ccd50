//! Turns whatever credential a request carries into an [`Identity`].

use actix_session::Session;
use actix_web::{dev::Payload, http::header, web::Data, FromRequest, HttpRequest};
use futures_util::future::LocalBoxFuture;
use tracing::warn;

use crate::domain::Identity;
use crate::error::AppError;
use crate::service::auth::Credential;
use crate::service::AppContext;

pub const USER_ID_KEY: &str = "user_id";

/// Remember the logged-in user in the session cookie.
pub fn remember(session: &Session, user_id: i32) -> Result<(), AppError> {
    session.renew();
    session
        .insert(USER_ID_KEY, user_id)
        .map_err(|e| AppError::Internal(format!("failed to persist session: {}", e)))
}

fn session_user(session: &Session) -> Option<i32> {
    match session.get::<i32>(USER_ID_KEY) {
        Ok(user_id) => user_id,
        Err(e) => {
            warn!("Ignoring unreadable session cookie: {}", e);
            None
        }
    }
}

impl FromRequest for Identity {
    type Error = actix_web::Error;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, payload: &mut Payload) -> Self::Future {
        let session = Session::from_request(req, payload);
        let ctx = req.app_data::<Data<AppContext>>().cloned();
        let authorization = req
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);

        Box::pin(async move {
            let ctx = ctx.ok_or_else(|| AppError::Internal("application context is not registered".to_string()))?;
            let session_user = session.await.ok().as_ref().and_then(session_user);

            let credential = Credential::pick(session_user, authorization.as_deref())
                .ok_or_else(|| AppError::Auth("Authentication required".to_string()))?;
            Ok(ctx.auth.resolve(&credential).await?)
        })
    }
}
