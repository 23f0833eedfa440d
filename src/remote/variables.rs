//! `{placeholder}` substitution for project command templates.
//!
//! | Token | Value |
//! |-------|-------|
//! | `{filePath}` | remote path of the uploaded file |
//! | `{fileName}` | remote file name |
//! | `{fileDir}` | remote directory containing the file |
//! | `{localPath}` | local path of the file |
//! | `{localDir}` | local directory containing the file |
//! | `{localFileName}` | local file name |
//! | `{remoteDir}` | the server's remote directory |

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::remote::transfer::{remote_file_name, remote_parent};

/// Values substituted into a command template.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandVariables {
    pub file_path: String,
    pub file_name: String,
    pub file_dir: String,
    pub local_path: String,
    pub local_dir: String,
    pub local_file_name: String,
    pub remote_dir: String,
}

/// Derive the variables for a local file uploaded to `remote_file`.
pub fn build_command_variables(
    local_file: &Path,
    remote_file: &str,
    remote_dir: &str,
) -> CommandVariables {
    CommandVariables {
        file_path: remote_file.to_string(),
        file_name: remote_file_name(remote_file).to_string(),
        file_dir: remote_parent(remote_file).unwrap_or(".").to_string(),
        local_path: local_file.display().to_string(),
        local_dir: local_file
            .parent()
            .map(|dir| dir.display().to_string())
            .unwrap_or_default(),
        local_file_name: local_file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default(),
        remote_dir: remote_dir.to_string(),
    }
}

/// Replace every occurrence of each token in `command`.
pub fn replace_command_variables(command: &str, vars: &CommandVariables) -> String {
    [
        ("{filePath}", &vars.file_path),
        ("{fileName}", &vars.file_name),
        ("{fileDir}", &vars.file_dir),
        ("{localPath}", &vars.local_path),
        ("{localDir}", &vars.local_dir),
        ("{localFileName}", &vars.local_file_name),
        ("{remoteDir}", &vars.remote_dir),
    ]
    .iter()
    .fold(command.to_string(), |acc, (token, value)| acc.replace(token, value))
}
