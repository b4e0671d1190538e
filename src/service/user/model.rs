use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Default,
    Member,
    Trusted,
    Accountant,
    Admin,
    Restricted,
    Banned,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Default => "default",
            Role::Member => "member",
            Role::Trusted => "trusted",
            Role::Accountant => "accountant",
            Role::Admin => "admin",
            Role::Restricted => "restricted",
            Role::Banned => "banned",
        }
    }

    /// Parses a comma separated role list, skipping unknown entries.
    pub fn parse_list(s: &str) -> Vec<Role> {
        s.split(',')
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .filter_map(|r| Role::from_str(r).ok())
            .collect()
    }

    pub fn join(roles: &[Role]) -> String {
        roles.iter().map(Role::as_str).collect::<Vec<_>>().join(",")
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "default" => Ok(Role::Default),
            "member" => Ok(Role::Member),
            "trusted" => Ok(Role::Trusted),
            "accountant" => Ok(Role::Accountant),
            "admin" => Ok(Role::Admin),
            "restricted" => Ok(Role::Restricted),
            "banned" => Ok(Role::Banned),
            _ => Err(format!("Unknown role: {}", s)),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the device poller treats a user's MAC addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AutoInsideMode {
    #[default]
    Disabled,
    Enabled,
    Ghost,
}

impl AutoInsideMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AutoInsideMode::Disabled => "disabled",
            AutoInsideMode::Enabled => "enabled",
            AutoInsideMode::Ghost => "ghost",
        }
    }
}

impl FromStr for AutoInsideMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "disabled" | "off" => Ok(AutoInsideMode::Disabled),
            "enabled" | "on" => Ok(AutoInsideMode::Enabled),
            "ghost" => Ok(AutoInsideMode::Ghost),
            _ => Err(format!("Unknown autoinside mode: {}", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    pub roles: Vec<Role>,
    #[serde(default)]
    pub mac: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emoji: Option<String>,
    #[serde(default)]
    pub autoinside: AutoInsideMode,
}

impl User {
    pub fn new(id: u64, username: Option<String>, first_name: Option<String>) -> Self {
        Self {
            id,
            username,
            first_name,
            roles: vec![Role::Default],
            mac: Vec::new(),
            language: None,
            emoji: None,
            autoinside: AutoInsideMode::Disabled,
        }
    }

    pub fn with_roles(mut self, roles: &[Role]) -> Self {
        self.roles = roles.to_vec();
        self
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(Role::Admin)
    }

    pub fn is_member(&self) -> bool {
        self.has_role(Role::Member)
    }

    pub fn is_banned(&self) -> bool {
        self.has_role(Role::Banned)
    }

    pub fn display_name(&self) -> String {
        let name = match (&self.username, &self.first_name) {
            (Some(username), _) => format!("@{}", username),
            (None, Some(first_name)) => first_name.clone(),
            (None, None) => self.id.to_string(),
        };

        match &self.emoji {
            Some(emoji) => format!("{} {}", emoji, name),
            None => name,
        }
    }
}

/// Partial update applied through the repository; `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub roles: Option<Vec<Role>>,
    pub mac: Option<Vec<String>>,
    pub language: Option<String>,
    pub emoji: Option<String>,
    pub autoinside: Option<AutoInsideMode>,
}

impl UserPatch {
    pub fn roles(roles: Vec<Role>) -> Self {
        Self {
            roles: Some(roles),
            ..Default::default()
        }
    }

    pub fn apply(self, user: &mut User) {
        if let Some(username) = self.username {
            user.username = Some(username);
        }
        if let Some(first_name) = self.first_name {
            user.first_name = Some(first_name);
        }
        if let Some(roles) = self.roles {
            user.roles = roles;
        }
        if let Some(mac) = self.mac {
            user.mac = mac;
        }
        if let Some(language) = self.language {
            user.language = Some(language);
        }
        if let Some(emoji) = self.emoji {
            user.emoji = Some(emoji);
        }
        if let Some(autoinside) = self.autoinside {
            user.autoinside = autoinside;
        }
    }
}
