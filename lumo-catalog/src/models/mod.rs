//! Catalog record model
//!
//! Plain data structs mirroring the persisted rows, plus the enums that
//! constrain them. Store access lives in `crate::store`; these types carry
//! no query logic of their own.

mod course;
mod organization;
mod program;
mod review;
mod seat;
mod types;

pub use course::{Course, CourseRun, PacingType};
pub use organization::{Organization, Partner};
pub use program::{Curriculum, CurriculumCourseMembership, Pathway, PathwayStatus, Program, ProgramStatus};
pub use review::{CourseRunStatus, REVIEW_EXEMPT_FIELDS};
pub use seat::{CourseEntitlement, Seat, SeatType};
pub use types::{CourseRunType, CourseType};
