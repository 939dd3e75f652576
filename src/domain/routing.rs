use axum::http::StatusCode;

/// Result of one render pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderOutcome {
    Page { markup: String },
    Redirect { location: String, markup: String },
    NotFound { markup: String },
}

impl RenderOutcome {
    pub fn status(&self) -> StatusCode {
        match self {
            RenderOutcome::Page { .. } => StatusCode::OK,
            RenderOutcome::Redirect { .. } => StatusCode::FOUND,
            RenderOutcome::NotFound { .. } => StatusCode::NOT_FOUND,
        }
    }

    pub fn markup(&self) -> &str {
        match self {
            RenderOutcome::Page { markup }
            | RenderOutcome::Redirect { markup, .. }
            | RenderOutcome::NotFound { markup } => markup,
        }
    }

    pub fn location(&self) -> Option<&str> {
        match self {
            RenderOutcome::Redirect { location, .. } => Some(location),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RenderOutcome::Page { .. } => "page",
            RenderOutcome::Redirect { .. } => "redirect",
            RenderOutcome::NotFound { .. } => "not_found",
        }
    }
}

/// Routing intents raised by components during a render pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteSignals {
    redirect: Option<String>,
    not_found: bool,
}

impl RouteSignals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a redirect. The last target wins.
    pub fn redirect(&mut self, location: impl Into<String>) {
        self.redirect = Some(location.into());
    }

    pub fn not_found(&mut self) {
        self.not_found = true;
    }

    /// A redirect takes precedence over a not-found signal.
    pub fn into_outcome(self, markup: String) -> RenderOutcome {
        match (self.redirect, self.not_found) {
            (Some(location), _) => RenderOutcome::Redirect { location, markup },
            (None, true) => RenderOutcome::NotFound { markup },
            (None, false) => RenderOutcome::Page { markup },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_signal_renders_a_page() {
        let outcome = RouteSignals::new().into_outcome("<p>hi</p>".into());
        assert_eq!(outcome.status(), StatusCode::OK);
        assert_eq!(outcome.markup(), "<p>hi</p>");
        assert_eq!(outcome.location(), None);
    }

    #[test]
    fn redirect_maps_to_found() {
        let mut signals = RouteSignals::new();
        signals.redirect("/login");
        let outcome = signals.into_outcome(String::new());
        assert_eq!(outcome.status(), StatusCode::FOUND);
        assert_eq!(outcome.location(), Some("/login"));
    }

    #[test]
    fn not_found_maps_to_404() {
        let mut signals = RouteSignals::new();
        signals.not_found();
        assert_eq!(
            signals.into_outcome(String::new()).status(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn redirect_wins_over_not_found() {
        let mut signals = RouteSignals::new();
        signals.not_found();
        signals.redirect("/first");
        signals.redirect("/second");
        let outcome = signals.into_outcome(String::new());
        assert_eq!(outcome.status(), StatusCode::FOUND);
        assert_eq!(outcome.location(), Some("/second"));
    }
}
