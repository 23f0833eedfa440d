//! MCP tool surface over the remote core.
//!
//! - `remote_execute`: Run a command on a project's server with optional line filters
//! - `remote_run_project_command`: Upload a file and run a configured project command on it
//! - `remote_upload_file`: Upload a local file
//! - `remote_download`: Download a remote file or directory
//! - `remote_list_directory`: List one remote directory level
//! - `remote_pool_stats`: Inspect pooled sessions
//!
//! Errors come back as strings prefixed with their category (`busy:`,
//! `misconfiguration:` or `error:`).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use poem_mcpserver::{Tools, tool::StructuredContent};
use tracing::info;

use crate::remote::error::{RemoteError, RemoteResult};
use crate::remote::exec::TracingSink;
use crate::remote::runtime::Runtime;
use crate::remote::types::{
    CommandConfig, DirectoryListing, DownloadResponse, ExecuteResult, PoolStats,
    ProjectCommandResponse, RemoteEntry, UploadResponse,
};
use crate::remote::variables::{build_command_variables, replace_command_variables};

/// MCP tools backed by a shared [`Runtime`].
#[derive(Clone)]
pub struct RemoteTestTools {
    runtime: Arc<Runtime>,
}

impl RemoteTestTools {
    pub fn new(runtime: Arc<Runtime>) -> Self {
        Self { runtime }
    }

    async fn execute_on_project(
        &self,
        command: &str,
        project: Option<&str>,
        filter: &CommandConfig,
    ) -> RemoteResult<ExecuteResult> {
        let server = self.runtime.config.server_for(project)?;
        self.runtime
            .executor
            .execute(command, Some(&server), filter, Some(&TracingSink))
            .await
    }

    async fn run_project_command(
        &self,
        project: &str,
        command_name: &str,
        local_file: Option<&Path>,
    ) -> RemoteResult<ProjectCommandResponse> {
        let project_config = self
            .runtime
            .config
            .project(project)
            .ok_or_else(|| RemoteError::config(format!("No enabled project named '{}'", project)))?;
        let project_command = project_config.command(command_name).ok_or_else(|| {
            RemoteError::config(format!(
                "Project '{}' has no command named '{}'",
                project, command_name
            ))
        })?;
        let server = &project_config.server;

        let (command, uploaded_to) = match local_file {
            Some(local_path) => {
                let remote_path = self
                    .runtime
                    .transfer_client(Some(server.clone()))
                    .upload_file(local_path, None)
                    .await?;
                let vars = build_command_variables(
                    local_path,
                    &remote_path,
                    server.remote_directory().unwrap_or_default(),
                );
                (
                    replace_command_variables(&project_command.execute_command, &vars),
                    Some(remote_path),
                )
            }
            None => (project_command.execute_command.clone(), None),
        };

        info!("Running '{}' for project {}: {}", command_name, project, command);
        let result = self
            .runtime
            .executor
            .execute(&command, Some(server), &project_command.output, Some(&TracingSink))
            .await?;

        Ok(ProjectCommandResponse {
            command,
            uploaded_to,
            result,
        })
    }

    async fn upload_to_project(
        &self,
        local_path: &Path,
        remote_path: Option<&str>,
        project: Option<&str>,
    ) -> RemoteResult<String> {
        let server = self.runtime.config.server_for(project)?;
        self.runtime
            .transfer_client(Some(server))
            .upload_file(local_path, remote_path)
            .await
    }

    async fn download_from_project(
        &self,
        remote_path: &str,
        local_path: Option<&Path>,
        project: Option<&str>,
    ) -> RemoteResult<PathBuf> {
        let server = self.runtime.config.server_for(project)?;
        let client = self.runtime.transfer_client(Some(server));
        match local_path {
            Some(local_path) => client.download_file_or_directory(remote_path, local_path).await,
            None => client.download_file(remote_path, None).await,
        }
    }

    async fn list_project_directory(
        &self,
        remote_path: &str,
        project: Option<&str>,
    ) -> RemoteResult<Vec<RemoteEntry>> {
        let server = self.runtime.config.server_for(project)?;
        self.runtime
            .transfer_client(Some(server))
            .list_directory(remote_path)
            .await
    }
}

fn categorized(err: RemoteError) -> String {
    err.to_categorized_string()
}

#[Tools]
impl RemoteTestTools {
    /// Run a shell command on a remote server and return its output.
    ///
    /// The command runs inside the server's remote directory when one is configured.
    /// Only one command runs at a time; a call made while another command is running
    /// fails immediately with a `busy:` error and should be retried later.
    async fn remote_execute(
        &self,
        /// Shell command to execute on the remote server
        command: String,
        /// Project whose server to use (default: the first configured project)
        project: Option<String>,
        /// Keep only lines matching one of these patterns (regex, case-insensitive)
        include_patterns: Option<Vec<String>>,
        /// Drop lines matching any of these patterns (regex, case-insensitive)
        exclude_patterns: Option<Vec<String>>,
    ) -> Result<StructuredContent<ExecuteResult>, String> {
        let filter = CommandConfig::new(
            include_patterns.unwrap_or_default(),
            exclude_patterns.unwrap_or_default(),
        );
        self.execute_on_project(&command, project.as_deref(), &filter)
            .await
            .map(StructuredContent)
            .map_err(categorized)
    }

    /// Run a named command from a project's configuration.
    ///
    /// When `local_file` is given it is uploaded to the server's remote directory first
    /// and the command's `{filePath}`-style variables refer to it.
    async fn remote_run_project_command(
        &self,
        /// Project name from the configuration file
        project: String,
        /// Name of the command within the project
        command_name: String,
        /// Local file to upload and substitute into the command
        local_file: Option<String>,
    ) -> Result<StructuredContent<ProjectCommandResponse>, String> {
        self.run_project_command(&project, &command_name, local_file.as_deref().map(Path::new))
            .await
            .map(StructuredContent)
            .map_err(categorized)
    }

    /// Upload a local file to a remote server.
    ///
    /// Without `remote_path` the file is placed in the server's remote directory under
    /// its own name. Missing remote parent directories are created.
    async fn remote_upload_file(
        &self,
        /// Path of the local file
        local_path: String,
        /// Destination path on the remote server
        remote_path: Option<String>,
        /// Project whose server to use (default: the first configured project)
        project: Option<String>,
    ) -> Result<StructuredContent<UploadResponse>, String> {
        let remote_path = self
            .upload_to_project(
                Path::new(&local_path),
                remote_path.as_deref(),
                project.as_deref(),
            )
            .await
            .map_err(categorized)?;

        Ok(StructuredContent(UploadResponse {
            local_path,
            remote_path,
        }))
    }

    /// Download a remote file or directory.
    ///
    /// Without `local_path` a single file is saved into the configured download
    /// directory. With `local_path`, directories are mirrored recursively into it and
    /// files are written to it.
    async fn remote_download(
        &self,
        /// Remote file or directory path
        remote_path: String,
        /// Local destination path
        local_path: Option<String>,
        /// Project whose server to use (default: the first configured project)
        project: Option<String>,
    ) -> Result<StructuredContent<DownloadResponse>, String> {
        let local = self
            .download_from_project(
                &remote_path,
                local_path.as_deref().map(Path::new),
                project.as_deref(),
            )
            .await
            .map_err(categorized)?;

        Ok(StructuredContent(DownloadResponse {
            remote_path,
            local_path: local.display().to_string(),
        }))
    }

    /// List one level of a remote directory.
    async fn remote_list_directory(
        &self,
        /// Remote directory path
        remote_path: String,
        /// Project whose server to use (default: the first configured project)
        project: Option<String>,
    ) -> Result<StructuredContent<DirectoryListing>, String> {
        let entries = self
            .list_project_directory(&remote_path, project.as_deref())
            .await
            .map_err(categorized)?;

        Ok(StructuredContent(DirectoryListing {
            path: remote_path,
            count: entries.len(),
            entries,
        }))
    }

    /// Show the pooled sessions and when each was last used.
    async fn remote_pool_stats(&self) -> StructuredContent<PoolStats> {
        StructuredContent(self.runtime.pool.stats())
    }
}
