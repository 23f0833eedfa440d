//! In-memory connector and remote filesystem used by unit tests.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::remote::error::{RemoteError, RemoteResult};
use crate::remote::session::{Connector, RemoteFs, RemoteSession};
use crate::remote::types::{RemoteEntry, RemoteStat, ServerDescriptor};

#[derive(Debug, Clone)]
enum Node {
    Dir,
    File(Vec<u8>),
}

/// A remote filesystem shared by every session of a [`FakeConnector`].
#[derive(Debug)]
pub(crate) struct FakeFs {
    nodes: StdMutex<BTreeMap<String, Node>>,
}

impl FakeFs {
    pub(crate) fn new() -> Arc<Self> {
        let mut nodes = BTreeMap::new();
        nodes.insert("/".to_string(), Node::Dir);
        Arc::new(Self {
            nodes: StdMutex::new(nodes),
        })
    }

    fn normalize(path: &str) -> String {
        let trimmed = path.trim_end_matches('/');
        if trimmed.is_empty() {
            "/".to_string()
        } else {
            trimmed.to_string()
        }
    }

    fn parent(path: &str) -> String {
        match path.rsplit_once('/') {
            Some(("", _)) | None => "/".to_string(),
            Some((parent, _)) => parent.to_string(),
        }
    }

    pub(crate) fn add_dir(&self, path: &str) {
        let path = Self::normalize(path);
        let mut nodes = self.nodes.lock().unwrap();
        let mut current = String::new();
        for part in path.split('/').filter(|p| !p.is_empty()) {
            current.push('/');
            current.push_str(part);
            nodes.entry(current.clone()).or_insert(Node::Dir);
        }
    }

    pub(crate) fn add_file(&self, path: &str, contents: &[u8]) {
        let path = Self::normalize(path);
        self.add_dir(&Self::parent(&path));
        self.nodes
            .lock()
            .unwrap()
            .insert(path, Node::File(contents.to_vec()));
    }

    pub(crate) fn read_file(&self, path: &str) -> Option<Vec<u8>> {
        match self.nodes.lock().unwrap().get(&Self::normalize(path)) {
            Some(Node::File(bytes)) => Some(bytes.clone()),
            _ => None,
        }
    }

    pub(crate) fn is_dir(&self, path: &str) -> bool {
        matches!(
            self.nodes.lock().unwrap().get(&Self::normalize(path)),
            Some(Node::Dir)
        )
    }
}

/// Counts connects and closes so tests can assert reuse and teardown.
#[derive(Clone)]
pub(crate) struct FakeConnector {
    pub(crate) connects: Arc<AtomicUsize>,
    pub(crate) closes: Arc<AtomicUsize>,
    pub(crate) fs: Arc<FakeFs>,
    failing_hosts: Arc<StdMutex<Vec<String>>>,
    connect_delay: Option<Duration>,
}

impl FakeConnector {
    pub(crate) fn new() -> Self {
        Self {
            connects: Arc::new(AtomicUsize::new(0)),
            closes: Arc::new(AtomicUsize::new(0)),
            fs: FakeFs::new(),
            failing_hosts: Arc::new(StdMutex::new(Vec::new())),
            connect_delay: None,
        }
    }

    pub(crate) fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = Some(delay);
        self
    }

    pub(crate) fn fail_host(&self, host: &str) {
        self.failing_hosts.lock().unwrap().push(host.to_string());
    }

    pub(crate) fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub(crate) fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for FakeConnector {
    type Session = FakeSession;

    async fn connect(&self, server: &ServerDescriptor) -> RemoteResult<FakeSession> {
        if let Some(delay) = self.connect_delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing_hosts.lock().unwrap().contains(&server.host) {
            return Err(RemoteError::connect(format!(
                "Failed to connect to {}: connection refused",
                server.identity()
            )));
        }
        let id = self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(FakeSession {
            id,
            server_key: server.key(),
            closes: self.closes.clone(),
            closed: AtomicBool::new(false),
            fs: self.fs.clone(),
        })
    }
}

#[derive(Debug)]
pub(crate) struct FakeSession {
    pub(crate) id: usize,
    pub(crate) server_key: String,
    closes: Arc<AtomicUsize>,
    closed: AtomicBool,
    fs: Arc<FakeFs>,
}

impl FakeSession {
    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteSession for FakeSession {
    async fn close(&self) -> RemoteResult<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteFs for FakeSession {
    async fn stat(&self, path: &str) -> RemoteResult<RemoteStat> {
        match self.fs.nodes.lock().unwrap().get(&FakeFs::normalize(path)) {
            Some(Node::Dir) => Ok(RemoteStat {
                is_directory: true,
                size: 0,
            }),
            Some(Node::File(bytes)) => Ok(RemoteStat {
                is_directory: false,
                size: bytes.len() as u64,
            }),
            None => Err(RemoteError::transfer(format!("No such file: {}", path))),
        }
    }

    async fn list(&self, path: &str) -> RemoteResult<Vec<RemoteEntry>> {
        let dir = FakeFs::normalize(path);
        let nodes = self.fs.nodes.lock().unwrap();
        if !matches!(nodes.get(&dir), Some(Node::Dir)) {
            return Err(RemoteError::transfer(format!("Not a directory: {}", path)));
        }
        Ok(nodes
            .iter()
            .filter(|(candidate, _)| *candidate != &dir && FakeFs::parent(candidate) == dir)
            .map(|(candidate, node)| RemoteEntry {
                name: candidate.rsplit('/').next().unwrap_or_default().to_string(),
                path: candidate.clone(),
                size: match node {
                    Node::File(bytes) => bytes.len() as u64,
                    Node::Dir => 0,
                },
                modified_time: None,
                is_directory: matches!(node, Node::Dir),
            })
            .collect())
    }

    async fn mkdir_all(&self, path: &str) -> RemoteResult<()> {
        if matches!(
            self.fs.nodes.lock().unwrap().get(&FakeFs::normalize(path)),
            Some(Node::File(_))
        ) {
            return Err(RemoteError::transfer(format!("File exists: {}", path)));
        }
        self.fs.add_dir(path);
        Ok(())
    }

    async fn get(&self, remote_path: &str, local_path: &Path) -> RemoteResult<()> {
        let bytes = self
            .fs
            .read_file(remote_path)
            .ok_or_else(|| RemoteError::transfer(format!("No such file: {}", remote_path)))?;
        tokio::fs::write(local_path, bytes)
            .await
            .map_err(|e| RemoteError::transfer(e.to_string()))
    }

    async fn put(&self, local_path: &Path, remote_path: &str) -> RemoteResult<()> {
        let bytes = tokio::fs::read(local_path)
            .await
            .map_err(|e| RemoteError::transfer(e.to_string()))?;
        let path = FakeFs::normalize(remote_path);
        if !self.fs.is_dir(&FakeFs::parent(&path)) {
            return Err(RemoteError::transfer(format!(
                "No such directory: {}",
                FakeFs::parent(&path)
            )));
        }
        self.fs.nodes.lock().unwrap().insert(path, Node::File(bytes));
        Ok(())
    }
}
