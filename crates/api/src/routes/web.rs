//! Session-authenticated web pages
//!
//! Markup is deliberately bare; the real storefront renders its own templates.

use axum::{
    extract::State,
    response::{Html, IntoResponse, Redirect, Response},
    Form,
};
use serde::Deserialize;

use crate::{
    auth::{self, LoginError, Session, SessionKey, SessionValue, LOGIN_PATH},
    error::ApiError,
    state::AppState,
};

const INVALID_LOGIN: &str = "Invalid login credentials";

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

/// GET /
pub async fn home(session: Session) -> Html<String> {
    let status = match session.user_id().await {
        Some(id) => format!(r#"<p>Signed in as user #{id}. <a href="/account">Account</a> | <a href="/logout">Log out</a></p>"#),
        None => r#"<p><a href="/login">Log in</a></p>"#.to_string(),
    };
    Html(page("Storefront", &status))
}

/// GET /login
pub async fn login_page(session: Session) -> Html<String> {
    let flash = take_flash(&session).await;
    let body = format!(
        r#"{flash}
<form method="post" action="/login">
    <label>Email <input type="email" name="email" required></label>
    <label>Password <input type="password" name="password" required></label>
    <button type="submit">Log in</button>
</form>
<p><a href="/forgot-password">Forgot password?</a></p>"#
    );
    Html(page("Login", &body))
}

/// POST /login
///
/// Any credential failure sends the browser back to the login page with the
/// same message; only store outages surface as errors.
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<LoginForm>,
) -> Response {
    let result = auth::login(
        &session,
        state.users.as_ref(),
        state.config.db_timeout,
        form.email.trim(),
        &form.password,
    )
    .await;

    match result {
        Ok(_) => Redirect::to("/").into_response(),
        Err(LoginError::Store(e)) => ApiError::from(e).into_response(),
        Err(e) => {
            tracing::debug!(reason = %e, "Web login rejected");
            session.put(SessionValue::Flash(INVALID_LOGIN.to_string())).await;
            Redirect::to(LOGIN_PATH).into_response()
        }
    }
}

/// GET /logout
pub async fn logout(session: Session) -> Redirect {
    auth::logout(&session).await;
    Redirect::to(LOGIN_PATH)
}

/// GET /account
pub async fn account(session: Session) -> Html<String> {
    let id = session
        .user_id()
        .await
        .map(|id| id.to_string())
        .unwrap_or_default();
    Html(page(
        "Account",
        &format!(r#"<p>User #{id}</p><p><a href="/logout">Log out</a></p>"#),
    ))
}

/// Pop the one-shot flash message, if any
pub(crate) async fn take_flash(session: &Session) -> String {
    match session.get(SessionKey::Flash).await {
        Some(SessionValue::Flash(message)) => {
            session.remove(SessionKey::Flash).await;
            format!(r#"<p class="flash">{}</p>"#, escape_html(&message))
        }
        _ => String::new(),
    }
}

pub(crate) fn page(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>{title}</title></head>
<body>
<h1>{title}</h1>
{body}
</body>
</html>"#
    )
}

fn escape_html(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
