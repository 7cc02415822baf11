//! rollcall-core — identity matching and attendance bookkeeping.
//!
//! Matches live face embeddings against an enrolled gallery, tracks the
//! scanning session state, and merges attendance into a flat CSV ledger.

pub mod config;
pub mod gallery;
pub mod ledger;
pub mod matcher;
pub mod roster;
pub mod session;
pub mod types;

pub use config::Config;
pub use gallery::{Directory, EnrollmentDir, EnrollmentError, EnrollmentSource, Gallery, Identity};
pub use ledger::{AttendanceLedger, AttendanceRecord, LedgerError, LedgerTable};
pub use matcher::{EuclideanMatcher, MatchOutcome, Matcher, DEFAULT_MATCH_THRESHOLD};
pub use roster::{MemberList, Roster, RosterError};
pub use session::{SessionController, SessionError, SessionState};
pub use types::{BoundingBox, Embedding, Mark};
