use std::collections::BTreeSet;
use std::io::Read;

use anyhow::Result;
use boardlift_core::{FtpConfig, UpgradeError};
use suppaftp::native_tls::TlsConnector;
use suppaftp::types::FileType;
use suppaftp::{NativeTlsConnector, NativeTlsFtpStream};
use tracing::debug;

use crate::store::DurableStore;

/// Destination for mirroring the expanded file set to another host.
pub trait RemoteTarget {
    fn ensure_dir(&mut self, path: &str) -> Result<()>;
    fn put(&mut self, path: &str, reader: &mut dyn Read) -> Result<u64>;
}

/// FTP-backed target, optionally upgraded to FTPS before login.
pub struct FtpTarget {
    stream: NativeTlsFtpStream,
    root_path: String,
}

impl FtpTarget {
    pub fn connect(config: &FtpConfig) -> Result<Self> {
        let config = config.clone().normalized();

        let mut stream = NativeTlsFtpStream::connect((config.host.as_str(), config.port))
            .map_err(|err| {
                deployment_failure(format!(
                    "connecting to {}:{} failed: {err}",
                    config.host, config.port
                ))
            })?;

        if config.use_tls {
            let connector = TlsConnector::new()
                .map_err(|err| deployment_failure(format!("tls setup failed: {err}")))?;
            stream = stream
                .into_secure(NativeTlsConnector::from(connector), &config.host)
                .map_err(|err| deployment_failure(format!("tls negotiation failed: {err}")))?;
        }

        stream
            .login(&config.username, &config.password)
            .map_err(|err| deployment_failure(format!("login failed: {err}")))?;
        stream
            .transfer_type(FileType::Binary)
            .map_err(|err| deployment_failure(format!("switching to binary mode failed: {err}")))?;

        Ok(Self {
            stream,
            root_path: config.root_path.trim_end_matches('/').to_string(),
        })
    }

    fn remote_path(&self, path: &str) -> String {
        if self.root_path.is_empty() {
            path.to_string()
        } else {
            format!("{}/{path}", self.root_path)
        }
    }
}

impl RemoteTarget for FtpTarget {
    fn ensure_dir(&mut self, path: &str) -> Result<()> {
        // mkdir answers an error when the directory already exists; both
        // outcomes leave the directory present.
        let _ = self.stream.mkdir(self.remote_path(path));
        Ok(())
    }

    fn put(&mut self, path: &str, reader: &mut dyn Read) -> Result<u64> {
        let mut reader = reader;
        self.stream
            .put_file(self.remote_path(path), &mut reader)
            .map_err(|err| deployment_failure(format!("uploading '{path}' failed: {err}")).into())
    }
}

/// Mirror every file below `expanded_prefix` onto the target, creating
/// each directory level before the files beneath it. Paths on the target
/// are relative to its root.
pub fn mirror_expanded_set(
    store: &dyn DurableStore,
    expanded_prefix: &str,
    target: &mut dyn RemoteTarget,
) -> Result<usize> {
    let prefix = format!("{}/", expanded_prefix.trim_end_matches('/'));
    let files = store.list(expanded_prefix)?;

    let mut created: BTreeSet<String> = BTreeSet::new();
    for logical in &files {
        let rel_path = logical.strip_prefix(&prefix).unwrap_or(logical);

        if let Some((dir_path, _)) = rel_path.rsplit_once('/') {
            let mut ancestor = String::new();
            for segment in dir_path.split('/') {
                if !ancestor.is_empty() {
                    ancestor.push('/');
                }
                ancestor.push_str(segment);
                if created.insert(ancestor.clone()) {
                    target.ensure_dir(&ancestor)?;
                }
            }
        }

        debug!(path = rel_path, "uploading expanded file");
        let mut reader = store.open_stream(logical)?;
        target.put(rel_path, &mut *reader)?;
    }

    Ok(files.len())
}

fn deployment_failure(reason: String) -> UpgradeError {
    UpgradeError::DeploymentFailure { reason }
}
