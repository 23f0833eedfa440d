//! File transfer between the local filesystem and a remote host.
//!
//! A [`FileTransferClient`] borrows sessions from a [`SessionPool`] by
//! default; the pool owns their lifecycle and [`disconnect`] is a no-op. A
//! standalone client instead owns one private session, created on first use
//! and closed by [`disconnect`].
//!
//! Remote paths are POSIX paths. Local paths use the host's conventions.
//! Failed transfers may leave partial local files behind.
//!
//! [`disconnect`]: FileTransferClient::disconnect

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::remote::config::ConfigProvider;
use crate::remote::error::{RemoteError, RemoteResult};
use crate::remote::pool::SessionPool;
use crate::remote::session::{Connector, RemoteFs, RemoteSession};
use crate::remote::types::{RemoteEntry, ServerDescriptor};

enum Mode<C: Connector> {
    Pooled(Arc<SessionPool<C>>),
    Standalone {
        connector: C,
        session: Mutex<Option<Arc<C::Session>>>,
    },
}

/// Upload, download and list over SFTP-like sessions.
pub struct FileTransferClient<C: Connector>
where
    C::Session: RemoteFs,
{
    mode: Mode<C>,
    server: Option<ServerDescriptor>,
    config: Arc<dyn ConfigProvider>,
}

impl<C: Connector> FileTransferClient<C>
where
    C::Session: RemoteFs,
{
    /// Client that borrows sessions from `pool`.
    pub fn pooled(
        pool: Arc<SessionPool<C>>,
        server: Option<ServerDescriptor>,
        config: Arc<dyn ConfigProvider>,
    ) -> Self {
        Self {
            mode: Mode::Pooled(pool),
            server,
            config,
        }
    }

    /// Client that owns a private session opened through `connector`.
    pub fn standalone(
        connector: C,
        server: Option<ServerDescriptor>,
        config: Arc<dyn ConfigProvider>,
    ) -> Self {
        Self {
            mode: Mode::Standalone {
                connector,
                session: Mutex::new(None),
            },
            server,
            config,
        }
    }

    /// The explicit server, or the configured default server.
    pub fn server(&self) -> RemoteResult<ServerDescriptor> {
        match &self.server {
            Some(server) => Ok(server.clone()),
            None => self.config.default_server().ok_or_else(|| {
                RemoteError::config("No server configured and no enabled default project")
            }),
        }
    }

    /// Borrow (pooled) or lazily open (standalone) the session.
    pub async fn connect(&self) -> RemoteResult<Arc<C::Session>> {
        let server = self.server()?;
        match &self.mode {
            Mode::Pooled(pool) => pool.get_connection(&server).await,
            Mode::Standalone { connector, session } => {
                let mut slot = session.lock().await;
                if let Some(existing) = slot.as_ref() {
                    return Ok(Arc::clone(existing));
                }
                let opened = Arc::new(connector.connect(&server).await?);
                debug!("Opened standalone transfer session to {}", server.identity());
                *slot = Some(Arc::clone(&opened));
                Ok(opened)
            }
        }
    }

    /// Close the private session of a standalone client. Pooled clients leave
    /// the session to the pool.
    pub async fn disconnect(&self) {
        let Mode::Standalone { session, .. } = &self.mode else {
            return;
        };
        if let Some(session) = session.lock().await.take()
            && let Err(e) = session.close().await
        {
            debug!("Ignoring transfer session close error: {}", e);
        }
    }

    /// Upload `local_path`. Without `remote_path` the file lands in the
    /// server's remote directory under its own name. Returns the remote path.
    pub async fn upload_file(
        &self,
        local_path: &Path,
        remote_path: Option<&str>,
    ) -> RemoteResult<String> {
        let remote_path = match remote_path {
            Some(path) => path.to_string(),
            None => {
                let server = self.server()?;
                let dir = server.remote_directory().ok_or_else(|| {
                    RemoteError::config(format!(
                        "No remote directory configured for {}, cannot derive upload path",
                        server.identity()
                    ))
                })?;
                join_remote(dir, &local_file_name(local_path)?)
            }
        };

        let session = self.connect().await?;
        if let Some(parent) = remote_parent(&remote_path) {
            ensure_directory(session.as_ref(), parent).await;
        }
        session.put(local_path, &remote_path).await?;

        info!("Uploaded {} to {}", local_path.display(), remote_path);
        Ok(remote_path)
    }

    /// Download `remote_path`. Without `local_path` the file lands in the
    /// configured download directory under its own name. Returns the local path.
    pub async fn download_file(
        &self,
        remote_path: &str,
        local_path: Option<&Path>,
    ) -> RemoteResult<PathBuf> {
        let local_path = match local_path {
            Some(path) => path.to_path_buf(),
            None => {
                let dir = self
                    .config
                    .download_directory()
                    .ok_or_else(|| RemoteError::config("No download directory configured"))?;
                dir.join(remote_file_name(remote_path))
            }
        };

        let session = self.connect().await?;
        fetch_file(session.as_ref(), remote_path, &local_path).await?;

        info!("Downloaded {} to {}", remote_path, local_path.display());
        Ok(local_path)
    }

    /// One level of `remote_path`.
    pub async fn list_directory(&self, remote_path: &str) -> RemoteResult<Vec<RemoteEntry>> {
        let session = self.connect().await?;
        let entries = session.list(remote_path).await?;
        debug!("Listed {} entries in {}", entries.len(), remote_path);
        Ok(entries)
    }

    /// Mirror the remote tree at `remote_path` into `local_path`, depth-first,
    /// one file at a time.
    pub async fn download_directory(
        &self,
        remote_path: &str,
        local_path: &Path,
    ) -> RemoteResult<PathBuf> {
        let session = self.connect().await?;
        let files = download_tree(
            session.as_ref(),
            remote_path.to_string(),
            local_path.to_path_buf(),
        )
        .await?;

        info!(
            "Downloaded directory {} to {} ({} files)",
            remote_path,
            local_path.display(),
            files
        );
        Ok(local_path.to_path_buf())
    }

    /// Download a file or a whole directory depending on what `remote_path` is.
    pub async fn download_file_or_directory(
        &self,
        remote_path: &str,
        local_path: &Path,
    ) -> RemoteResult<PathBuf> {
        let session = self.connect().await?;
        let stat = session.stat(remote_path).await.map_err(|e| {
            debug!("stat {} failed: {}", remote_path, e);
            RemoteError::RemotePathNotFound(remote_path.to_string())
        })?;

        if stat.is_directory {
            self.download_directory(remote_path, local_path).await
        } else {
            self.download_file(remote_path, Some(local_path)).await
        }
    }

    /// Create `remote_path` and its parents. Failures are ignored.
    pub async fn ensure_remote_directory(&self, remote_path: &str) -> RemoteResult<()> {
        let session = self.connect().await?;
        ensure_directory(session.as_ref(), remote_path).await;
        Ok(())
    }
}

/// Recursive mkdir where "already exists" and similar races are expected;
/// errors are logged at debug and otherwise ignored.
async fn ensure_directory<S: RemoteFs>(session: &S, remote_path: &str) {
    if let Err(e) = session.mkdir_all(remote_path).await {
        debug!("Ignoring mkdir error for {}: {}", remote_path, e);
    }
}

async fn fetch_file<S: RemoteFs>(
    session: &S,
    remote_path: &str,
    local_path: &Path,
) -> RemoteResult<()> {
    if let Some(parent) = local_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(|e| {
            RemoteError::transfer(format!("create {}: {}", parent.display(), e))
        })?;
    }
    session.get(remote_path, local_path).await
}

fn download_tree<S: RemoteFs>(
    session: &S,
    remote_dir: String,
    local_dir: PathBuf,
) -> BoxFuture<'_, RemoteResult<usize>> {
    Box::pin(async move {
        tokio::fs::create_dir_all(&local_dir).await.map_err(|e| {
            RemoteError::transfer(format!("create {}: {}", local_dir.display(), e))
        })?;

        let mut files = 0;
        for entry in session.list(&remote_dir).await? {
            let remote_path = join_remote(&remote_dir, &entry.name);
            let local_path = local_dir.join(&entry.name);
            if entry.is_directory {
                files += download_tree(session, remote_path, local_path).await?;
            } else {
                session.get(&remote_path, &local_path).await?;
                files += 1;
            }
        }
        Ok(files)
    })
}

/// POSIX join; `name` is appended to `dir` with exactly one separator.
pub(crate) fn join_remote(dir: &str, name: &str) -> String {
    let name = name.trim_start_matches('/');
    if dir.is_empty() {
        name.to_string()
    } else if dir.ends_with('/') {
        format!("{}{}", dir, name)
    } else {
        format!("{}/{}", dir, name)
    }
}

/// POSIX dirname, or `None` when the path has no parent component.
pub(crate) fn remote_parent(path: &str) -> Option<&str> {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rsplit_once('/') {
        Some(("", _)) => Some("/"),
        Some((parent, _)) => Some(parent),
        None => None,
    }
}

pub(crate) fn remote_file_name(path: &str) -> &str {
    path.trim_end_matches('/').rsplit('/').next().unwrap_or(path)
}

fn local_file_name(path: &Path) -> RemoteResult<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| RemoteError::transfer(format!("{} has no file name", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::remote::config::{PoolSettings, RemoteTestConfig};
    use crate::remote::testing::FakeConnector;

    fn server() -> ServerDescriptor {
        ServerDescriptor::new("10.0.0.1", 22, "deploy")
            .with_password("secret")
            .with_remote_directory("/tmp/autotest")
    }

    fn config_with_download_dir(dir: &Path) -> Arc<dyn ConfigProvider> {
        let json = serde_json::json!({
            "projects": [{
                "name": "api",
                "server": { "host": "10.0.0.1", "username": "deploy", "password": "secret" },
                "logs": { "directories": [], "downloadPath": dir }
            }]
        });
        Arc::new(RemoteTestConfig::from_json_str(&json.to_string()).unwrap())
    }

    fn pooled(
        connector: &FakeConnector,
        config: Arc<dyn ConfigProvider>,
    ) -> FileTransferClient<FakeConnector> {
        let pool = SessionPool::new(connector.clone(), PoolSettings::default());
        FileTransferClient::pooled(pool, Some(server()), config)
    }

    mod paths {
        use super::*;

        #[test]
        fn test_join_remote() {
            assert_eq!(join_remote("/tmp/autotest", "a.py"), "/tmp/autotest/a.py");
            assert_eq!(join_remote("/tmp/autotest/", "a.py"), "/tmp/autotest/a.py");
            assert_eq!(join_remote("/", "etc"), "/etc");
        }

        #[test]
        fn test_remote_parent() {
            assert_eq!(remote_parent("/tmp/autotest/a.py"), Some("/tmp/autotest"));
            assert_eq!(remote_parent("/a.py"), Some("/"));
            assert_eq!(remote_parent("a.py"), None);
        }

        #[test]
        fn test_remote_file_name() {
            assert_eq!(remote_file_name("/var/log/app.log"), "app.log");
            assert_eq!(remote_file_name("app.log"), "app.log");
        }
    }

    mod upload {
        use super::*;

        #[tokio::test]
        async fn test_derives_remote_path_and_creates_parent() {
            let local = tempfile::tempdir().unwrap();
            let file = local.path().join("test_api.py");
            std::fs::write(&file, b"def test(): pass\n").unwrap();

            let connector = FakeConnector::new();
            let client = pooled(&connector, Arc::new(RemoteTestConfig::default()));

            let remote = client.upload_file(&file, None).await.unwrap();
            assert_eq!(remote, "/tmp/autotest/test_api.py");
            assert!(connector.fs.is_dir("/tmp/autotest"));
            assert_eq!(
                connector.fs.read_file("/tmp/autotest/test_api.py").unwrap(),
                b"def test(): pass\n"
            );
        }

        #[tokio::test]
        async fn test_explicit_remote_path() {
            let local = tempfile::tempdir().unwrap();
            let file = local.path().join("data.csv");
            std::fs::write(&file, b"a,b\n").unwrap();

            let connector = FakeConnector::new();
            connector.fs.add_dir("/srv/in");
            let client = pooled(&connector, Arc::new(RemoteTestConfig::default()));

            let remote = client.upload_file(&file, Some("/srv/in/x.csv")).await.unwrap();
            assert_eq!(remote, "/srv/in/x.csv");
            assert!(connector.fs.read_file("/srv/in/x.csv").is_some());
        }

        #[tokio::test]
        async fn test_without_remote_directory_is_config_error() {
            let connector = FakeConnector::new();
            let pool = SessionPool::new(connector.clone(), PoolSettings::default());
            let bare = ServerDescriptor::new("10.0.0.1", 22, "deploy").with_password("x");
            let client =
                FileTransferClient::pooled(pool, Some(bare), Arc::new(RemoteTestConfig::default()));

            let err = client
                .upload_file(Path::new("/tmp/whatever.txt"), None)
                .await
                .unwrap_err();
            assert!(matches!(err, RemoteError::Config(_)));
            assert_eq!(connector.connect_count(), 0);
        }

        #[tokio::test]
        async fn test_missing_local_file_is_transfer_failure() {
            let connector = FakeConnector::new();
            let client = pooled(&connector, Arc::new(RemoteTestConfig::default()));
            let err = client
                .upload_file(Path::new("/definitely/missing.txt"), None)
                .await
                .unwrap_err();
            assert!(matches!(err, RemoteError::TransferFailure(_)));
        }
    }

    mod download {
        use super::*;

        #[tokio::test]
        async fn test_uses_configured_download_directory() {
            let local = tempfile::tempdir().unwrap();
            let target_dir = local.path().join("logs");

            let connector = FakeConnector::new();
            connector.fs.add_file("/var/log/app.log", b"started\n");
            let client = pooled(&connector, config_with_download_dir(&target_dir));

            let path = client.download_file("/var/log/app.log", None).await.unwrap();
            assert_eq!(path, target_dir.join("app.log"));
            assert_eq!(std::fs::read(&path).unwrap(), b"started\n");
        }

        #[tokio::test]
        async fn test_without_download_directory_is_config_error() {
            let connector = FakeConnector::new();
            let client = pooled(&connector, Arc::new(RemoteTestConfig::default()));
            let err = client.download_file("/var/log/app.log", None).await.unwrap_err();
            assert!(matches!(err, RemoteError::Config(_)));
        }

        #[tokio::test]
        async fn test_directory_tree_is_mirrored() {
            let local = tempfile::tempdir().unwrap();
            let root = local.path().join("mirror");

            let connector = FakeConnector::new();
            connector.fs.add_file("/data/a.txt", b"A");
            connector.fs.add_file("/data/sub/b.txt", b"B");
            let client = pooled(&connector, Arc::new(RemoteTestConfig::default()));

            let path = client.download_directory("/data", &root).await.unwrap();
            assert_eq!(path, root);
            assert_eq!(std::fs::read(root.join("a.txt")).unwrap(), b"A");
            assert_eq!(std::fs::read(root.join("sub").join("b.txt")).unwrap(), b"B");
        }

        #[tokio::test]
        async fn test_file_or_directory_dispatch() {
            let local = tempfile::tempdir().unwrap();

            let connector = FakeConnector::new();
            connector.fs.add_file("/data/a.txt", b"A");
            connector.fs.add_file("/data/sub/b.txt", b"B");
            let client = pooled(&connector, Arc::new(RemoteTestConfig::default()));

            let file_target = local.path().join("nested").join("copy.txt");
            let path = client
                .download_file_or_directory("/data/a.txt", &file_target)
                .await
                .unwrap();
            assert_eq!(path, file_target);
            assert_eq!(std::fs::read(&file_target).unwrap(), b"A");

            let dir_target = local.path().join("tree");
            client
                .download_file_or_directory("/data", &dir_target)
                .await
                .unwrap();
            assert!(dir_target.join("sub").join("b.txt").is_file());
        }

        #[tokio::test]
        async fn test_missing_remote_path() {
            let local = tempfile::tempdir().unwrap();
            let connector = FakeConnector::new();
            let client = pooled(&connector, Arc::new(RemoteTestConfig::default()));

            let err = client
                .download_file_or_directory("/nope", local.path())
                .await
                .unwrap_err();
            match err {
                RemoteError::RemotePathNotFound(path) => assert_eq!(path, "/nope"),
                other => panic!("unexpected error: {other}"),
            }
        }
    }

    mod listing {
        use super::*;

        #[tokio::test]
        async fn test_lists_one_level() {
            let connector = FakeConnector::new();
            connector.fs.add_file("/var/log/app.log", b"12345");
            connector.fs.add_file("/var/log/archive/old.log", b"x");
            let client = pooled(&connector, Arc::new(RemoteTestConfig::default()));

            let entries = client.list_directory("/var/log").await.unwrap();
            assert_eq!(entries.len(), 2);
            let app = entries.iter().find(|e| e.name == "app.log").unwrap();
            assert_eq!(app.path, "/var/log/app.log");
            assert_eq!(app.size, 5);
            assert!(!app.is_directory);
            assert!(entries.iter().any(|e| e.name == "archive" && e.is_directory));
        }

        #[tokio::test]
        async fn test_ensure_remote_directory_swallows_errors() {
            let connector = FakeConnector::new();
            connector.fs.add_file("/srv/blocker", b"");
            let client = pooled(&connector, Arc::new(RemoteTestConfig::default()));

            client.ensure_remote_directory("/srv/a/b").await.unwrap();
            assert!(connector.fs.is_dir("/srv/a/b"));
            client.ensure_remote_directory("/srv/a/b").await.unwrap();
            client.ensure_remote_directory("/srv/blocker").await.unwrap();
        }
    }

    mod lifecycle {
        use super::*;

        #[tokio::test]
        async fn test_pooled_client_reuses_session_and_disconnect_is_noop() {
            let connector = FakeConnector::new();
            connector.fs.add_dir("/x");
            let client = pooled(&connector, Arc::new(RemoteTestConfig::default()));

            client.list_directory("/x").await.unwrap();
            client.list_directory("/x").await.unwrap();
            client.disconnect().await;
            client.list_directory("/x").await.unwrap();

            assert_eq!(connector.connect_count(), 1);
            assert_eq!(connector.close_count(), 0);
        }

        #[tokio::test]
        async fn test_standalone_client_owns_its_session() {
            let connector = FakeConnector::new();
            connector.fs.add_dir("/x");
            let client = FileTransferClient::standalone(
                connector.clone(),
                Some(server()),
                Arc::new(RemoteTestConfig::default()),
            );

            let first = client.connect().await.unwrap();
            let second = client.connect().await.unwrap();
            assert!(Arc::ptr_eq(&first, &second));

            client.disconnect().await;
            assert!(first.is_closed());
            assert_eq!(connector.close_count(), 1);

            client.list_directory("/x").await.unwrap();
            assert_eq!(connector.connect_count(), 2);
            client.disconnect().await;
            client.disconnect().await;
            assert_eq!(connector.close_count(), 2);
        }

        #[tokio::test]
        async fn test_default_server_from_config() {
            let local = tempfile::tempdir().unwrap();
            let connector = FakeConnector::new();
            connector.fs.add_dir("/x");
            let pool = SessionPool::new(connector.clone(), PoolSettings::default());
            let client = FileTransferClient::pooled(
                pool.clone(),
                None,
                config_with_download_dir(local.path()),
            );

            client.list_directory("/x").await.unwrap();
            let stats = pool.stats();
            assert_eq!(stats.connections[0].server_key, "10.0.0.1:22:deploy");
        }
    }
}
