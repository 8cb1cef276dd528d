//! HTML views
//!
//! Handlers never write HTML themselves. They return a [`Page`]; a
//! rendered page travels through the response extensions as a
//! [`PendingView`] until the session layer renders it with the request
//! locals (current user and flash messages).

use axum::response::{Html, IntoResponse, Redirect, Response};
use minijinja::Environment;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::auth::session::{Flash, FlashKind};
use crate::data::User;
use crate::error::AppError;

/// Every page template, each extending `layouts/main.html`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Home,
    About,
    Contact,
    Profile,
    NewAccount,
    NewMessage,
    NoMessage,
}

impl View {
    pub const ALL: [View; 7] = [
        View::Home,
        View::About,
        View::Contact,
        View::Profile,
        View::NewAccount,
        View::NewMessage,
        View::NoMessage,
    ];

    pub fn template_name(self) -> &'static str {
        match self {
            View::Home => "home.html",
            View::About => "about.html",
            View::Contact => "contact.html",
            View::Profile => "profile.html",
            View::NewAccount => "newAccount.html",
            View::NewMessage => "newmessage.html",
            View::NoMessage => "noMessage.html",
        }
    }

    fn source(self) -> &'static str {
        match self {
            View::Home => include_str!("../../templates/home.html"),
            View::About => include_str!("../../templates/about.html"),
            View::Contact => include_str!("../../templates/contact.html"),
            View::Profile => include_str!("../../templates/profile.html"),
            View::NewAccount => include_str!("../../templates/newAccount.html"),
            View::NewMessage => include_str!("../../templates/newmessage.html"),
            View::NoMessage => include_str!("../../templates/noMessage.html"),
        }
    }
}

const LAYOUT_NAME: &str = "layouts/main.html";
const LAYOUT_SOURCE: &str = include_str!("../../templates/layouts/main.html");

/// A view waiting to be rendered by the session layer
#[derive(Debug, Clone)]
pub struct PendingView {
    pub view: View,
    pub data: Value,
}

/// What a handler wants written back to the client
#[derive(Debug, Clone)]
pub enum Page {
    /// Render a template with the given data
    Rendered(View, Value),
    /// 303 redirect to a local path
    Redirect(String),
    /// Plain text body
    Text(String),
}

impl Page {
    /// Render `view` with any serializable data
    ///
    /// Data that does not serialize to an object is wrapped as `{"data": ..}`.
    pub fn render(view: View, data: impl Serialize) -> Self {
        let data = match serde_json::to_value(data) {
            Ok(Value::Object(map)) => Value::Object(map),
            Ok(other) => serde_json::json!({ "data": other }),
            Err(error) => {
                tracing::error!(%error, view = view.template_name(), "Unserializable view data");
                Value::Object(Map::new())
            }
        };
        Page::Rendered(view, data)
    }

    pub fn redirect(path: impl Into<String>) -> Self {
        Page::Redirect(path.into())
    }

    pub fn text(body: impl Into<String>) -> Self {
        Page::Text(body.into())
    }
}

impl IntoResponse for Page {
    fn into_response(self) -> Response {
        match self {
            Page::Rendered(view, data) => {
                let mut response = Response::default();
                response
                    .extensions_mut()
                    .insert(PendingView { view, data });
                response
            }
            Page::Redirect(path) => Redirect::to(&path).into_response(),
            Page::Text(body) => body.into_response(),
        }
    }
}

/// Request locals merged into every rendered view
#[derive(Debug, Default)]
pub struct Locals {
    pub user: Option<User>,
    pub flashes: Vec<Flash>,
}

/// Template environment with the shared `main` layout
pub struct Views {
    env: Environment<'static>,
}

impl Views {
    /// Build the environment from the embedded templates
    ///
    /// # Errors
    /// Returns `Render` if a template fails to parse
    pub fn new() -> Result<Self, AppError> {
        let mut env = Environment::new();
        env.add_template(LAYOUT_NAME, LAYOUT_SOURCE)?;
        for view in View::ALL {
            env.add_template(view.template_name(), view.source())?;
        }

        Ok(Self { env })
    }

    /// Render a view with its data and the request locals
    pub fn render(&self, view: View, data: &Value, locals: &Locals) -> Result<String, AppError> {
        let mut context = match data {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };

        let messages_of = |kind: FlashKind| -> Vec<&str> {
            locals
                .flashes
                .iter()
                .filter(|flash| flash.kind == kind)
                .map(|flash| flash.text.as_str())
                .collect()
        };

        context.insert(
            "user".to_string(),
            serde_json::to_value(&locals.user).map_err(|e| AppError::Internal(e.into()))?,
        );
        context.insert(
            "success_msg".to_string(),
            serde_json::json!(messages_of(FlashKind::Success)),
        );
        context.insert(
            "error_msg".to_string(),
            serde_json::json!(messages_of(FlashKind::Error)),
        );

        let template = self.env.get_template(view.template_name())?;
        Ok(template.render(Value::Object(context))?)
    }

    /// Turn a pending view into the final HTML response
    pub fn respond(&self, pending: &PendingView, locals: &Locals) -> Response {
        match self.render(pending.view, &pending.data, locals) {
            Ok(html) => Html(html).into_response(),
            Err(error) => error.into_response(),
        }
    }
}
