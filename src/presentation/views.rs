use askama::Template;

/// The HTML document sent to the browser around the rendered markup.
#[derive(Template)]
#[template(path = "document.html")]
pub struct DocumentTemplate<'a> {
    pub title: &'a str,
    pub description: &'a str,
    pub favicon: &'a str,
    pub styles: Vec<String>,
    pub scripts: Vec<String>,
    pub css: String,
    pub state_global: &'a str,
    pub state: String,
    pub markup: &'a str,
}

pub struct ShellClasses {
    pub root: String,
    pub header: String,
    pub content: String,
}

#[derive(Template)]
#[template(path = "shell/page.html")]
pub struct ShellPageTemplate<'a> {
    pub classes: &'a ShellClasses,
    pub title: &'a str,
    pub path: &'a str,
}

#[derive(Template)]
#[template(path = "shell/not_found.html")]
pub struct ShellNotFoundTemplate<'a> {
    pub classes: &'a ShellClasses,
    pub title: &'a str,
    pub path: &'a str,
}

#[derive(Template)]
#[template(path = "shell/redirect.html")]
pub struct ShellRedirectTemplate<'a> {
    pub classes: &'a ShellClasses,
    pub location: &'a str,
}
