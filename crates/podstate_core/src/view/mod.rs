//! Calculator page: controller state and its rendering.

pub mod controller;
pub mod render;

pub use controller::{ActionOutcome, CalculatorController, EditState, FormState, UiEvent};
pub use render::{render_text, ItemMode, ItemView, ListStatus, ViewModel};
