//! Data models for DojoFinder entities.
//!
//! This module contains the data structures used to represent directory
//! data:
//!
//! - `School` (+ `Schedule`, `SchoolDashboard`, `GeoPoint`): directory listings
//! - `NewSchool`, `SchoolUpdate`: write payloads for the school endpoints
//! - `Student`, `StudentProgress`: profile and advancement data
//! - `User`: the authenticated account

pub mod school;
pub mod student;
pub mod user;

pub use school::{GeoPoint, NewSchool, Schedule, School, SchoolDashboard, SchoolUpdate};
pub use student::{ProgressEntry, Student, StudentProgress};
pub use user::User;
