//! `promptshield` - Sensitive-data detection and submit interception for AI
//! chat pages.
//!
//! The crate scans text a user is about to send to a chat service, flags
//! validated personal data (social security numbers, card numbers, email
//! addresses, phone numbers and configured custom patterns), and pauses the
//! submit until the user chooses to send anyway or redact.
//!
//! The browser is reached only through the [`dom::Page`] trait;
//! [`dom::VirtualPage`] is an in-memory implementation.
//!
//! ```no_run
//! use promptshield::detection::{Detector, Verdict};
//!
//! # async fn run() {
//! let detector = Detector::default();
//! if let Verdict::Sensitive(result) = detector.check("my ssn is 123-45-6789").await {
//!     println!("{} found in your message", result.describe());
//! }
//! # }
//! ```

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod cache;
pub mod cli;
pub mod clock;
pub mod config;
pub mod detection;
pub mod dom;
pub mod error;
pub mod guard;
pub mod intercept;
pub mod logging;
pub mod storage;

pub use cache::{CacheStats, ResultCache};
pub use config::Config;
pub use detection::{DetectionResult, Detector, Finding, PatternId, Verdict};
pub use error::{Error, Result};
pub use guard::{ContentGuard, GuardHandle, GuardStatus};
pub use intercept::{InterceptionController, SubmitOutcome};
pub use logging::init_logging;
pub use storage::{KeyValueStore, MemoryStore, SqliteStore};
