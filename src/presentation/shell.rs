//! Built-in application shell served by the binary.
//!
//! Known routes render an empty shell the browser bundle mounts into,
//! configured redirects raise a redirect, and everything else is a 404.

use askama::Template;

use crate::{
    application::{
        error::RenderError,
        render::{App, Location, RenderScope},
    },
    config::{AppSettings, Redirect},
    domain::{
        routing::{RenderOutcome, RouteSignals},
        style::{StyleRegistry, StyleRule, Theme},
    },
};

use super::views::{ShellClasses, ShellNotFoundTemplate, ShellPageTemplate, ShellRedirectTemplate};

const SHEET: &str = "Shell";

pub struct ShellApp {
    title: String,
    routes: Vec<String>,
    redirects: Vec<Redirect>,
}

impl ShellApp {
    pub fn new(title: impl Into<String>, routes: Vec<String>, redirects: Vec<Redirect>) -> Self {
        Self {
            title: title.into(),
            routes,
            redirects,
        }
    }

    pub fn from_settings(app: &AppSettings) -> Self {
        Self::new(app.title.clone(), app.routes.clone(), app.redirects.clone())
    }

    fn redirect_for(&self, location: &Location) -> Option<&Redirect> {
        let path = location.normalized_path();
        self.redirects
            .iter()
            .find(|redirect| redirect.from.trim_end_matches('/') == path || redirect.from == path)
    }

    fn is_known(&self, location: &Location) -> bool {
        let path = location.normalized_path();
        self.routes.iter().any(|route| {
            let route = route.trim_end_matches('/');
            (route.is_empty() && path == "/") || route == path
        })
    }
}

impl App for ShellApp {
    fn name(&self) -> &'static str {
        "ShellApp"
    }

    fn render(&self, scope: &mut RenderScope<'_>) -> Result<RenderOutcome, RenderError> {
        let theme = scope.theme().clone();
        let classes = register_styles(&theme, scope.styles());
        let location = scope.location();
        let path = location.path.as_str();

        let mut signals = RouteSignals::new();
        let markup = if let Some(redirect) = self.redirect_for(location) {
            signals.redirect(redirect.to.clone());
            ShellRedirectTemplate {
                classes: &classes,
                location: &redirect.to,
            }
            .render()?
        } else if self.is_known(location) {
            ShellPageTemplate {
                classes: &classes,
                title: &self.title,
                path,
            }
            .render()?
        } else {
            signals.not_found();
            ShellNotFoundTemplate {
                classes: &classes,
                title: &self.title,
                path,
            }
            .render()?
        };

        Ok(signals.into_outcome(markup))
    }
}

fn register_styles(theme: &Theme, styles: &mut StyleRegistry) -> ShellClasses {
    let classes = ShellClasses {
        root: styles.class_name("root"),
        header: styles.class_name("header"),
        content: styles.class_name("content"),
    };

    styles.register(
        SHEET,
        vec![
            StyleRule::new(format!(".{}", classes.root))
                .declare("min-height", "100vh")
                .declare("margin", "0")
                .declare("font-family", theme.font_family.clone())
                .declare("background", theme.palette.background.clone())
                .declare("color", theme.palette.text.clone()),
            StyleRule::new(format!(".{}", classes.header))
                .declare("padding", theme.spacing(2))
                .declare("background", theme.palette.primary.clone())
                .declare("color", "#fff"),
            StyleRule::new(format!(".{}", classes.content)).declare("padding", theme.spacing(3)),
        ],
    );

    classes
}
