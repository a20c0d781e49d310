pub mod session;

pub use session::SessionSummary;
