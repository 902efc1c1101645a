pub mod app;
pub mod insight;
mod output;
pub mod telemetry;

pub use app::run as run_app;
