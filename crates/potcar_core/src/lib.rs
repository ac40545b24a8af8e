//! Content-addressed POTCAR store.
//!
//! Payloads are identified by their SHA-256 hash and stored once. Each stored
//! payload has a full record (owning the payload) and a shadow record (the
//! same metadata without it), so metadata can be shared where the payload
//! itself may not be.

pub mod db;
pub mod io;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use db::{open_db, open_db_in_memory, DbError, DbResult};
pub use io::multi_potcar_io::MultiPotcarIo;
pub use io::potcar_io::{PotcarIo, RecordSource};
pub use logging::{default_log_level, init_logging, LoggingError};
pub use model::family::{FamilySpec, PotcarFamily};
pub use model::format::HeaderError;
pub use model::potcar::{
    ContentId, PotcarAttributes, PotcarHash, PotcarRecord, RecordId, RecordKind,
};
pub use repo::record_repo::RecordQuery;
pub use repo::{RepoError, RepoResult, UniquenessReason, UniquenessViolation};
pub use service::family_service::{FamilyService, UploadFailure, UploadReport, UploadRequest};
pub use service::potcar_service::{IngestOutcome, PotcarService};
pub use service::{ServiceError, ServiceResult};
