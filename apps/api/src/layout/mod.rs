// Page layout: the physical page every candidate is rendered onto.
// The renderer owns line breaking; this module only declares the page box.

pub mod fit;
pub mod page;

// Re-export the public API consumed by the pipeline and the renderer.
pub use fit::declare_page;
pub use page::{default_page_spec, PageSpec, BASE_STYLESHEET};
