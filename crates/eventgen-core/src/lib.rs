pub mod bridge;
pub mod checkpoint;
pub mod common;
pub mod context;
pub mod domain;
pub mod event_loop;
pub mod grid;
pub mod initial;
pub mod observables;
pub mod particles;
pub mod results;
pub mod runner;
pub mod serialization;
pub mod session;
pub mod sizer;
pub mod stages;

pub use common::RunConfig;
pub use domain::{EventError, EventErrorCategory, EventResult};
pub use event_loop::{EventLoop, EventProcessor, RunSummary};
pub use session::RunSession;
