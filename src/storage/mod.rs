//! Persistence: attendance records in MongoDB, photo blobs in R2

pub mod model;
pub mod object_store;
pub mod repo;

pub use model::{AttendanceRecord, PhotoRef};
pub use object_store::ObjectStore;
pub use repo::AttendanceRepo;
