//! Page specification and the stylesheets that pin a document to one page.
//!
//! The rendering engine owns layout. Our job is only to declare the page box
//! (size and margin) inside the markup itself and in the stylesheet we hand
//! to the renderer, so both agree on the target.

use serde::{Deserialize, Serialize};

/// Physical page constraints for a rendered artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageSpec {
    pub width_in: f32,
    pub height_in: f32,
    /// Uniform margin on all four sides.
    pub margin_in: f32,
}

/// Returns the default page: US letter (8.5" × 11"), single-sided, ~1cm margins.
pub fn default_page_spec() -> PageSpec {
    PageSpec {
        width_in: 8.5,
        height_in: 11.0,
        margin_in: 0.4,
    }
}

impl PageSpec {
    /// The CSS `@page` rule for this page.
    pub fn page_rule(&self) -> String {
        format!(
            "@page {{ size: {}in {}in; margin: {}in; }}",
            self.width_in, self.height_in, self.margin_in
        )
    }

    /// Stylesheet passed to the renderer alongside the markup.
    pub fn page_stylesheet(&self) -> String {
        format!(
            "{}\nhtml, body {{ margin: 0; padding: 0; }}\nbody {{ box-sizing: border-box; }}",
            self.page_rule()
        )
    }
}

/// House stylesheet applied under every generated design.
/// Generated CSS comes later in the cascade and wins on conflicts.
pub const BASE_STYLESHEET: &str = r#"@import url('https://fonts.googleapis.com/css2?family=Roboto:wght@400;700&family=Montserrat:wght@400;700&display=swap');
body { font-family: 'Roboto', sans-serif; color: #333; }
h1, h2, h3 { font-family: 'Montserrat', sans-serif; }
h1 { font-size: 32px; font-weight: bold; }
h2 { font-size: 20px; font-weight: bold; margin-bottom: 10px; }
p { font-size: 14px; line-height: 1.5; }
ul { padding-left: 20px; }
ul li { font-size: 14px; margin-bottom: 5px; }
img { max-width: 100%; }"#;
