//! The upgrade pipeline: download a release archive, stage it durably,
//! expand it in parallel, optionally mirror it to a remote host over FTP,
//! and install it into the local board directory. Each stage checkpoints
//! so an interrupted run resumes from the staged archive instead of
//! downloading again.

mod archive;
mod deploy;
mod lock;
mod pipeline;
mod store;

pub use archive::{ArchiveEntry, ArchiveReader, UPLOAD_ROOT};
pub use deploy::{mirror_expanded_set, FtpTarget, RemoteTarget};
pub use lock::InstallLock;
pub use pipeline::{
    ArtifactSource, PipelineHandle, PipelineOutcome, PipelineState, RemoteFactory,
    UpgradePipeline,
};
pub use store::{DurableStore, LocalStore};
