//! bioscreen-web: local web GUI for Bioscreen.
//!
//! One page drives a single screening session:
//!   - upload or pick a structure CSV
//!   - start and cancel a prediction run
//!   - follow stage progress over SSE
//!   - download the resulting `predictions.csv`

pub mod handlers;
pub mod router;
pub mod sse;
pub mod state;

pub use router::build_router;
pub use state::{AppEvent, AppState, Session, SessionState, SharedState, ShellError};
