//! Plain view model and its text rendering.

use crate::model::calculation::CalculationId;
use crate::model::subject::SubjectId;
use crate::view::controller::FormState;

pub const TITLE: &str = "K8s Pod State Demo";
pub const AUTHENTICATING: &str = "Authenticating...";
pub const LOADING: &str = "Loading data...";
pub const EMPTY: &str = "No data saved yet. Add a calculation to see it appear here.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListStatus {
    /// Initial state, and after a subject arrives until its first snapshot
    /// or failure.
    Loading,
    /// Not loading and no subject.
    Authenticating,
    Empty,
    Ready,
}

impl ListStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Loading => "loading",
            Self::Authenticating => "authenticating",
            Self::Empty => "empty",
            Self::Ready => "ready",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemMode {
    Viewing,
    Editing { draft: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemView {
    pub id: CalculationId,
    pub name: String,
    /// `"<num1> + <num2> = <result>"`.
    pub equation: String,
    pub mode: ItemMode,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ViewModel {
    pub subject: Option<SubjectId>,
    pub form: FormState,
    pub status: ListStatus,
    pub items: Vec<ItemView>,
}

impl ViewModel {
    /// Header line: the subject id, or the authenticating indicator.
    pub fn header(&self) -> String {
        match &self.subject {
            Some(subject) => format!("Your User ID: {subject}"),
            None => AUTHENTICATING.to_string(),
        }
    }

    /// Status line above the list; `None` once records are shown.
    pub fn status_line(&self) -> Option<&'static str> {
        match self.status {
            ListStatus::Loading => Some(LOADING),
            ListStatus::Authenticating => Some(AUTHENTICATING),
            ListStatus::Empty => Some(EMPTY),
            ListStatus::Ready => None,
        }
    }
}

/// Renders the whole page as plain text, one element per line.
pub fn render_text(view: &ViewModel) -> String {
    let mut lines = vec![TITLE.to_string(), view.header(), String::new()];

    lines.push("Add a Calculation".to_string());
    lines.push(format!("  Name: {}", view.form.name));
    lines.push(format!("  Number 1: {}", view.form.num1));
    lines.push(format!("  Number 2: {}", view.form.num2));
    lines.push(String::new());

    lines.push("Persistent Data".to_string());
    if let Some(status) = view.status_line() {
        lines.push(status.to_string());
    }
    for item in &view.items {
        match &item.mode {
            ItemMode::Viewing => {
                lines.push(format!("- {}", item.name));
                lines.push(format!("  {}", item.equation));
                lines.push("  [Edit Name] [Delete]".to_string());
            }
            ItemMode::Editing { draft } => {
                lines.push(format!("- [{draft}]"));
                lines.push(format!("  {}", item.equation));
                lines.push("  [Save] [Cancel]".to_string());
            }
        }
    }

    lines.join("\n")
}
