pub use crate::errors::{ErrorCategory, GradeError};
pub use crate::model::{Case, ConceptCase, Env, LockState, OkTest, Results, Suite, Test};
pub use crate::protocols::{GradingConfig, GradingProtocol, Messages, Pipeline, Protocol};
pub use crate::rate_limit::{Backoff, Clock, ManualClock, RateLimiter, SystemClock};
pub use crate::storage::{SharedStore, Storage};

pub mod cli;
pub mod config;
pub mod errors;
pub mod loader;
pub mod logging;
pub mod model;
pub mod protocols;
pub mod rate_limit;
pub mod storage;
