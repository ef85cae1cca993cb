mod app;

pub use app::{AppBuilder, TypedAppBuilder, UiAnalyzer};
