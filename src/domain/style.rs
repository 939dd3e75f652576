//! Per-request style collection.
//!
//! Components ask the registry for class names and register their sheets while
//! rendering; the renderer drains the accumulated CSS exactly once afterwards.

use std::fmt::Write as _;

use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Palette {
    pub primary: String,
    pub secondary: String,
    pub background: String,
    pub text: String,
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            primary: "#3f51b5".to_string(),
            secondary: "#f50057".to_string(),
            background: "#fafafa".to_string(),
            text: "rgba(0, 0, 0, 0.87)".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Theme {
    pub palette: Palette,
    pub font_family: String,
    pub spacing_px: u16,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            palette: Palette::default(),
            font_family: "\"Roboto\", \"Helvetica\", \"Arial\", sans-serif".to_string(),
            spacing_px: 8,
        }
    }
}

impl Theme {
    pub fn spacing(&self, factor: u16) -> String {
        format!("{}px", self.spacing_px.saturating_mul(factor))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleRule {
    pub selector: String,
    pub declarations: Vec<(String, String)>,
}

impl StyleRule {
    pub fn new(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            declarations: Vec::new(),
        }
    }

    pub fn declare(mut self, property: impl Into<String>, value: impl Into<String>) -> Self {
        self.declarations.push((property.into(), value.into()));
        self
    }
}

#[derive(Debug)]
struct Sheet {
    name: String,
    rules: Vec<StyleRule>,
}

#[derive(Debug)]
pub struct StyleRegistry {
    prefix: String,
    counter: usize,
    sheets: Vec<Sheet>,
}

impl StyleRegistry {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            counter: 0,
            sheets: Vec::new(),
        }
    }

    /// Generate a class name unique within this registry.
    pub fn class_name(&mut self, rule_name: &str) -> String {
        self.counter += 1;
        format!("{}-{}-{}", self.prefix, rule_name, self.counter)
    }

    pub fn contains(&self, sheet_name: &str) -> bool {
        self.sheets.iter().any(|sheet| sheet.name == sheet_name)
    }

    /// Record a sheet. Registering the same sheet name twice keeps the first.
    pub fn register(&mut self, sheet_name: &str, rules: Vec<StyleRule>) -> bool {
        if self.contains(sheet_name) {
            return false;
        }
        self.sheets.push(Sheet {
            name: sheet_name.to_string(),
            rules,
        });
        true
    }

    pub fn drain_css(self) -> String {
        let mut css = String::new();
        for rule in self.sheets.iter().flat_map(|sheet| sheet.rules.iter()) {
            if !css.is_empty() {
                css.push('\n');
            }
            let _ = write!(css, "{} {{", rule.selector);
            for (property, value) in &rule.declarations {
                let _ = write!(css, " {property}: {value};");
            }
            css.push_str(" }");
        }
        css
    }
}
