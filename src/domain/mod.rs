// Domain layer - Dashboard model and its normalized panel/row views
pub mod dashboard;
pub mod lenient;
pub mod panel;
pub mod text;
pub mod variables;
