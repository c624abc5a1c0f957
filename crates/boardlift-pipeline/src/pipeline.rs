use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, bail, Context, Result};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::archive::{ArchiveReader, UPLOAD_ROOT};
use crate::deploy::{mirror_expanded_set, RemoteTarget};
use crate::lock::InstallLock;
use crate::store::DurableStore;

/// Produces the release archive bytes, usually by streaming a portal
/// download. Implemented for any sending closure over a writer.
pub trait ArtifactSource: Send {
    fn fetch(&mut self, sink: &mut dyn Write) -> Result<u64>;
}

impl<F> ArtifactSource for F
where
    F: FnMut(&mut dyn Write) -> Result<u64> + Send,
{
    fn fetch(&mut self, sink: &mut dyn Write) -> Result<u64> {
        self(sink)
    }
}

/// Opens the remote target. Invoked inside the deploy step, never earlier,
/// so a connection failure is recorded like any other deployment failure
/// and cannot keep the local stages from running.
pub trait RemoteFactory: Send {
    fn connect(self: Box<Self>) -> Result<Box<dyn RemoteTarget + Send>>;
}

impl<F> RemoteFactory for F
where
    F: FnOnce() -> Result<Box<dyn RemoteTarget + Send>> + Send,
{
    fn connect(self: Box<Self>) -> Result<Box<dyn RemoteTarget + Send>> {
        self()
    }
}

/// Durable progress marker, advanced after each stage commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Staged,
    Expanded,
    Deployed,
    Complete,
}

impl PipelineState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Staged => "staged",
            Self::Expanded => "expanded",
            Self::Deployed => "deployed",
            Self::Complete => "complete",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "staged" => Some(Self::Staged),
            "expanded" => Some(Self::Expanded),
            "deployed" => Some(Self::Deployed),
            "complete" => Some(Self::Complete),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOutcome {
    pub version_id: String,
    pub staged_path: String,
    pub staged_sha256: String,
    /// "downloaded" for a fresh transfer, "reused" when the staged archive
    /// from an earlier run was picked up.
    pub download: &'static str,
    pub expanded_files: usize,
    pub installed_files: usize,
    pub deployed_files: Option<usize>,
    /// A deployment failure is recorded here instead of failing the run;
    /// the expanded tree and local install stay valid.
    pub deploy_error: Option<String>,
}

pub struct UpgradePipeline {
    store: Arc<dyn DurableStore>,
    install_dir: PathBuf,
    work_root: PathBuf,
}

impl UpgradePipeline {
    pub fn new(
        store: Arc<dyn DurableStore>,
        install_dir: impl Into<PathBuf>,
        work_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            install_dir: install_dir.into(),
            work_root: work_root.into(),
        }
    }

    pub fn staged_path(&self, version_id: &str) -> String {
        format!("xf-upgrades/{version_id}.zip")
    }

    pub fn expanded_prefix(&self, version_id: &str) -> String {
        format!("xf-upgrades/{version_id}")
    }

    fn state_path(&self, version_id: &str) -> String {
        format!("xf-upgrades/{version_id}.state")
    }

    fn receipt_path(&self, version_id: &str) -> String {
        format!("xf-upgrades/{version_id}.receipt")
    }

    fn result_path(&self, version_id: &str) -> String {
        format!("xf-upgrades/{version_id}.result")
    }

    pub fn staged_archive_exists(&self, version_id: &str) -> Result<bool> {
        validate_version_id(version_id)?;
        self.store.exists(&self.staged_path(version_id))
    }

    pub fn read_state(&self, version_id: &str) -> Result<Option<PipelineState>> {
        validate_version_id(version_id)?;
        let Some(content) = self.store.read_string(&self.state_path(version_id))? else {
            return Ok(None);
        };
        Ok(PipelineState::parse(content.trim()))
    }

    pub fn read_completion_record(&self, version_id: &str) -> Result<Option<String>> {
        validate_version_id(version_id)?;
        self.store.read_string(&self.result_path(version_id))
    }

    pub fn read_receipt(&self, version_id: &str) -> Result<Option<String>> {
        validate_version_id(version_id)?;
        self.store.read_string(&self.receipt_path(version_id))
    }

    /// Run the full pipeline for one version: download (or reuse the
    /// staged archive), stage, expand, optionally deploy, then install
    /// into the local board directory. Holds the install lock throughout.
    pub fn run(
        &self,
        version_id: &str,
        mut source: Box<dyn ArtifactSource>,
        remote: Option<Box<dyn RemoteFactory>>,
    ) -> Result<PipelineOutcome> {
        validate_version_id(version_id)?;
        let _lock = InstallLock::acquire(&self.work_root)?;

        let staged = self.staged_path(version_id);
        let (download, scratch, staged_sha256) = if self.store.exists(&staged)? {
            info!(version_id, "staged archive present, skipping download");
            let scratch = ScratchGuard(self.materialize_staged(version_id)?);
            let digest = file_sha256(&scratch.0)?;
            ("reused", scratch, digest)
        } else {
            let scratch = ScratchGuard(self.download_to_scratch(version_id, source.as_mut())?);
            let digest = self.stage(version_id, &scratch.0)?;
            info!(version_id, sha256 = digest.as_str(), "staged release archive");
            ("downloaded", scratch, digest)
        };
        self.write_receipt(version_id, &staged_sha256)?;
        self.write_state(version_id, PipelineState::Staged)?;

        let reader = ArchiveReader::open(&scratch.0)?;
        let expanded_prefix = self.expanded_prefix(version_id);
        let expanded_files =
            reader.extract_to_store(UPLOAD_ROOT, self.store.as_ref(), &expanded_prefix)?;
        self.write_state(version_id, PipelineState::Expanded)?;
        info!(version_id, files = expanded_files, "expanded release archive");

        let (deployed_files, deploy_error) = match remote {
            Some(factory) => {
                let mirrored = factory.connect().and_then(|mut target| {
                    mirror_expanded_set(self.store.as_ref(), &expanded_prefix, target.as_mut())
                });
                match mirrored {
                    Ok(count) => {
                        self.write_state(version_id, PipelineState::Deployed)?;
                        info!(version_id, files = count, "deployed to remote target");
                        (Some(count), None)
                    }
                    Err(err) => {
                        warn!(
                            version_id,
                            error = %err,
                            "remote deployment failed; expanded files remain valid"
                        );
                        (None, Some(err.to_string()))
                    }
                }
            }
            None => (None, None),
        };

        let installed_files = reader.extract_to_dir(UPLOAD_ROOT, &self.install_dir)?;
        self.write_state(version_id, PipelineState::Complete)?;
        info!(version_id, files = installed_files, "installed into board directory");

        Ok(PipelineOutcome {
            version_id: version_id.to_string(),
            staged_path: staged,
            staged_sha256,
            download,
            expanded_files,
            installed_files,
            deployed_files,
            deploy_error,
        })
    }

    /// Run on a named worker thread. A completion record is written to the
    /// store whether the run succeeds or fails, so a detached observer can
    /// always learn the outcome.
    pub fn run_detached(
        self: Arc<Self>,
        version_id: String,
        source: Box<dyn ArtifactSource>,
        remote: Option<Box<dyn RemoteFactory>>,
    ) -> Result<PipelineHandle> {
        let pipeline = Arc::clone(&self);
        let thread_version = version_id.clone();

        let join = thread::Builder::new()
            .name(format!("upgrade-{version_id}"))
            .spawn(move || {
                let result = pipeline.run(&thread_version, source, remote);
                let record = completion_record(&thread_version, &result);
                if let Err(err) = pipeline
                    .store
                    .put_bytes(&pipeline.result_path(&thread_version), record.as_bytes())
                {
                    warn!(version_id = thread_version.as_str(), error = %err, "failed writing completion record");
                }
                result
            })
            .context("failed spawning upgrade pipeline thread")?;

        Ok(PipelineHandle { version_id, join })
    }

    fn scratch_path(&self, version_id: &str, suffix: &str) -> Result<PathBuf> {
        let dir = self.work_root.join("scratch");
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed creating scratch directory: {}", dir.display()))?;
        Ok(dir.join(format!("{version_id}-{}{suffix}", std::process::id())))
    }

    fn download_to_scratch(
        &self,
        version_id: &str,
        source: &mut dyn ArtifactSource,
    ) -> Result<PathBuf> {
        let path = self.scratch_path(version_id, ".zip.part")?;
        let result = (|| -> Result<()> {
            let mut file = File::create(&path)
                .with_context(|| format!("failed creating scratch file: {}", path.display()))?;
            source.fetch(&mut file)?;
            Ok(())
        })();

        // A failed download leaves nothing behind, durable or scratch.
        match result {
            Ok(()) => Ok(path),
            Err(err) => {
                let _ = fs::remove_file(&path);
                Err(err).with_context(|| format!("download failed for version {version_id}"))
            }
        }
    }

    fn materialize_staged(&self, version_id: &str) -> Result<PathBuf> {
        let path = self.scratch_path(version_id, ".zip")?;
        let mut reader = self.store.open_stream(&self.staged_path(version_id))?;
        let mut file = File::create(&path)
            .with_context(|| format!("failed creating scratch file: {}", path.display()))?;
        io::copy(&mut reader, &mut file)
            .with_context(|| format!("failed restoring staged archive for {version_id}"))?;
        Ok(path)
    }

    fn stage(&self, version_id: &str, scratch: &Path) -> Result<String> {
        let file = File::open(scratch)
            .with_context(|| format!("failed reopening scratch file: {}", scratch.display()))?;
        let mut hashing = HashingReader::new(file);
        self.store
            .put_stream(&self.staged_path(version_id), &mut hashing)
            .with_context(|| format!("failed staging archive for version {version_id}"))?;
        Ok(hashing.finish_hex())
    }

    fn write_state(&self, version_id: &str, state: PipelineState) -> Result<()> {
        self.store.put_bytes(
            &self.state_path(version_id),
            format!("{}\n", state.as_str()).as_bytes(),
        )
    }

    fn write_receipt(&self, version_id: &str, sha256: &str) -> Result<()> {
        let record = format!(
            "version={version_id}\narchive_sha256={sha256}\nstaged_at_unix={}\n",
            current_unix_timestamp()
        );
        self.store
            .put_bytes(&self.receipt_path(version_id), record.as_bytes())
    }
}

/// Removes the scratch copy when the run ends, success or not, so failed
/// retries do not pile copies up under `work/scratch`.
struct ScratchGuard(PathBuf);

impl Drop for ScratchGuard {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.0);
    }
}

pub struct PipelineHandle {
    version_id: String,
    join: thread::JoinHandle<Result<PipelineOutcome>>,
}

impl PipelineHandle {
    pub fn version_id(&self) -> &str {
        &self.version_id
    }

    pub fn wait(self) -> Result<PipelineOutcome> {
        match self.join.join() {
            Ok(result) => result,
            Err(_) => Err(anyhow!(
                "upgrade pipeline thread for version {} panicked",
                self.version_id
            )),
        }
    }
}

fn completion_record(version_id: &str, result: &Result<PipelineOutcome>) -> String {
    match result {
        Ok(outcome) => {
            let deployed = outcome
                .deployed_files
                .map(|count| count.to_string())
                .unwrap_or_else(|| "skipped".to_string());
            let mut record = format!(
                "version={version_id}\noutcome=complete\ndownload={}\n\
                 archive_sha256={}\nexpanded_files={}\ninstalled_files={}\ndeployed_files={deployed}\n",
                outcome.download,
                outcome.staged_sha256,
                outcome.expanded_files,
                outcome.installed_files,
            );
            if let Some(deploy_error) = &outcome.deploy_error {
                record.push_str(&format!("deploy_error={deploy_error}\n"));
            }
            record
        }
        Err(err) => format!("version={version_id}\noutcome=failed\nerror={err:#}\n"),
    }
}

fn validate_version_id(version_id: &str) -> Result<()> {
    let valid = !version_id.is_empty()
        && version_id.len() <= 64
        && version_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if !valid {
        bail!("invalid version id: '{version_id}'");
    }
    Ok(())
}

fn current_unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}

struct HashingReader<R> {
    inner: R,
    hasher: Sha256,
}

impl<R: io::Read> HashingReader<R> {
    fn new(inner: R) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
        }
    }

    fn finish_hex(self) -> String {
        hex::encode(self.hasher.finalize())
    }
}

impl<R: io::Read> io::Read for HashingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let read = self.inner.read(buf)?;
        self.hasher.update(&buf[..read]);
        Ok(read)
    }
}

fn file_sha256(path: &Path) -> Result<String> {
    let mut file = File::open(path)
        .with_context(|| format!("failed opening file for digest: {}", path.display()))?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)
        .with_context(|| format!("failed hashing file: {}", path.display()))?;
    Ok(hex::encode(hasher.finalize()))
}
