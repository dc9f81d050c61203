//! Per-user capability flags.

use serde::{Deserialize, Serialize};

/// Capability flags carried by every user.
///
/// Flags gate whole classes of operations; which paths are reachable at all
/// is decided separately by the user's [`Rule`](crate::Rule)s.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Permissions {
    /// Administrator. Implies every command in [`Permissions::can_run`].
    pub admin: bool,
    /// May run external commands from the allow-list.
    pub execute: bool,
    /// May create files and directories, and copy.
    pub create: bool,
    /// May rename and move.
    pub rename: bool,
    /// May overwrite existing files.
    #[serde(rename = "edit")]
    pub modify: bool,
    /// May delete files and directories.
    pub delete: bool,
    /// May create, list and delete share links.
    pub share: bool,
    /// May download file content.
    pub download: bool,
    /// Names of external commands this user may run.
    pub commands: Vec<String>,
}

impl Permissions {
    /// Every flag set, no commands.
    pub fn all() -> Self {
        Self {
            admin: true,
            execute: true,
            create: true,
            rename: true,
            modify: true,
            delete: true,
            share: true,
            download: true,
            commands: Vec::new(),
        }
    }

    /// Read-only access: download only.
    pub fn read_only() -> Self {
        Self {
            download: true,
            ..Self::default()
        }
    }

    /// Check whether the named command may be executed.
    ///
    /// Only the first whitespace-separated word of `command` is compared
    /// against the allow-list.
    pub fn can_run(&self, command: &str) -> bool {
        if self.admin {
            return true;
        }
        if !self.execute {
            return false;
        }

        let name = command.split_whitespace().next().unwrap_or_default();
        !name.is_empty() && self.commands.iter().any(|c| c == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_denies_everything() {
        let perm = Permissions::default();
        assert!(!perm.admin);
        assert!(!perm.create);
        assert!(!perm.share);
        assert!(perm.commands.is_empty());
    }

    #[test]
    fn test_read_only() {
        let perm = Permissions::read_only();
        assert!(perm.download);
        assert!(!perm.modify);
        assert!(!perm.delete);
    }

    #[test]
    fn test_can_run_allow_list() {
        let perm = Permissions {
            execute: true,
            commands: vec!["git".to_string(), "ls".to_string()],
            ..Permissions::default()
        };

        assert!(perm.can_run("git status"));
        assert!(perm.can_run("ls"));
        assert!(!perm.can_run("rm -rf /"));
        assert!(!perm.can_run(""));
    }

    #[test]
    fn test_can_run_requires_execute() {
        let perm = Permissions {
            execute: false,
            commands: vec!["git".to_string()],
            ..Permissions::default()
        };
        assert!(!perm.can_run("git"));
    }

    #[test]
    fn test_admin_runs_anything() {
        let perm = Permissions::all();
        assert!(perm.can_run("anything --at all"));
    }

    #[test]
    fn test_modify_serializes_as_edit() {
        let perm = Permissions {
            modify: true,
            ..Permissions::default()
        };
        let json = serde_json::to_value(&perm).unwrap();
        assert_eq!(json["edit"], true);
        assert!(json.get("modify").is_none());

        let restored: Permissions = serde_json::from_str(r#"{"edit": true}"#).unwrap();
        assert!(restored.modify);
        assert!(!restored.delete);
    }
}
