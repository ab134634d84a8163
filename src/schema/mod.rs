//! Schema system - form validation and document rendering

pub mod forms;
pub mod render;

pub use forms::{Form, FormError, FormValidator, ValidationError};
pub use render::{DocumentRenderer, QuoteDocument, RenderError};
