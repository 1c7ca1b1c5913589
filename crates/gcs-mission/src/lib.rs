pub mod builder;
pub mod doctor;
pub mod geo;
pub mod plan_file;
pub mod upload;
pub mod waypoint;

pub use builder::{build, PatternConfig};
pub use geo::GeoPoint;
pub use upload::machine::{UploadError, UploadSession, UploadState};
pub use upload::{UploadPolicy, UploadReport, Uploader};
pub use waypoint::{Mission, MissionCommand, MissionError, MissionFrame, Waypoint};
