//! Role-gated navigation menu and header labels.

use crate::auth::UserRole;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct NavEntry {
    pub key: &'static str,
    pub label: &'static str,
    pub href: &'static str,
    pub roles: &'static [UserRole],
}

const BOTH: &[UserRole] = &[UserRole::Admin, UserRole::Employee];
const ADMIN: &[UserRole] = &[UserRole::Admin];
const EMPLOYEE: &[UserRole] = &[UserRole::Employee];

pub const NAV_ENTRIES: [NavEntry; 7] = [
    NavEntry {
        key: "dashboard",
        label: "My overview",
        href: "/dashboard",
        roles: BOTH,
    },
    NavEntry {
        key: "add-entry",
        label: "Add entry",
        href: "/add-entry",
        roles: EMPLOYEE,
    },
    NavEntry {
        key: "time-history",
        label: "History",
        href: "/time-history",
        roles: EMPLOYEE,
    },
    NavEntry {
        key: "reports",
        label: "Reports and overviews",
        href: "/reports",
        roles: ADMIN,
    },
    NavEntry {
        key: "employees",
        label: "Employee management",
        href: "/employees",
        roles: ADMIN,
    },
    NavEntry {
        key: "projects",
        label: "Project management",
        href: "/projects",
        roles: ADMIN,
    },
    NavEntry {
        key: "settings",
        label: "Settings",
        href: "/settings",
        roles: ADMIN,
    },
];

/// Menu entries visible to `role`, in display order. Anonymous callers get
/// nothing.
pub fn entries_for(role: Option<UserRole>) -> Vec<NavEntry> {
    let Some(role) = role else {
        return Vec::new();
    };
    NAV_ENTRIES
        .iter()
        .filter(|entry| entry.roles.contains(&role))
        .copied()
        .collect()
}

pub fn role_label(role: UserRole) -> &'static str {
    match role {
        UserRole::Admin => "Administrator",
        UserRole::Employee => "Employee",
    }
}

pub fn greeting(first_name: &str, last_name: &str) -> String {
    format!("Welcome back, {} {}", first_name, last_name)
}
