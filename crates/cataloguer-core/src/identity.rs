//! Caller identity and role permissions
//!
//! Token verification happens outside the core. The routing layer hands every
//! operation a verified [`CallerIdentity`]; the core only checks that the
//! caller's organisation and role allow the requested action.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AppError;

/// Membership role within an organisation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Editor,
    Viewer,
}

/// Actions gated by role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    ViewCatalogue,
    CreateCatalogue,
    UpdateCatalogue,
    DeleteCatalogue,
    InviteUser,
    RemoveUser,
}

const ADMIN_PERMISSIONS: &[Permission] = &[
    Permission::ViewCatalogue,
    Permission::CreateCatalogue,
    Permission::UpdateCatalogue,
    Permission::DeleteCatalogue,
    Permission::InviteUser,
    Permission::RemoveUser,
];

const EDITOR_PERMISSIONS: &[Permission] = &[
    Permission::ViewCatalogue,
    Permission::CreateCatalogue,
    Permission::UpdateCatalogue,
];

const VIEWER_PERMISSIONS: &[Permission] = &[Permission::ViewCatalogue];

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Editor => "editor",
            Role::Viewer => "viewer",
        }
    }

    pub fn permissions(&self) -> &'static [Permission] {
        match self {
            Role::Admin => ADMIN_PERMISSIONS,
            Role::Editor => EDITOR_PERMISSIONS,
            Role::Viewer => VIEWER_PERMISSIONS,
        }
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions().contains(&permission)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "editor" => Ok(Role::Editor),
            "viewer" => Ok(Role::Viewer),
            other => Err(AppError::Validation(format!("Unknown role '{}'", other))),
        }
    }
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::ViewCatalogue => "view:catalogue",
            Permission::CreateCatalogue => "create:catalogue",
            Permission::UpdateCatalogue => "update:catalogue",
            Permission::DeleteCatalogue => "delete:catalogue",
            Permission::InviteUser => "invite:user",
            Permission::RemoveUser => "remove:user",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verified caller supplied by the identity collaborator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    pub user_id: String,
    pub org_id: Option<String>,
    pub role: Option<Role>,
}

impl CallerIdentity {
    /// A signed-in user with no active organisation.
    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            org_id: None,
            role: None,
        }
    }

    /// A user acting inside an organisation with the given role.
    pub fn member(user_id: impl Into<String>, org_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            org_id: Some(org_id.into()),
            role: Some(role),
        }
    }

    /// The organisation the caller acts in.
    pub fn org_id(&self) -> Result<&str, AppError> {
        self.org_id.as_deref().ok_or_else(|| {
            AppError::Unauthorized("No organisation selected for this session".to_string())
        })
    }

    /// Ensure the caller acts inside an organisation and holds `permission` there.
    ///
    /// Returns the organisation id on success.
    pub fn require(&self, permission: Permission) -> Result<&str, AppError> {
        let org_id = self.org_id()?;
        match self.role {
            Some(role) if role.has_permission(permission) => Ok(org_id),
            Some(role) => Err(AppError::Forbidden(format!(
                "Role '{}' lacks permission '{}'",
                role, permission
            ))),
            None => Err(AppError::Forbidden(format!(
                "No role in organisation for permission '{}'",
                permission
            ))),
        }
    }
}
