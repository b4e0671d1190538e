use super::Route;
use crate::service::user::{Role, User};

/// Admins satisfy every role restriction. Absent users only pass routes open to `default`.
pub fn is_user_allowed(user: Option<&User>, route: &Route) -> bool {
    if route.roles.is_empty() {
        return true;
    }

    match user {
        None => route.roles.contains(&Role::Default),
        Some(user) if user.roles.is_empty() => route.roles.contains(&Role::Default),
        Some(user) => user.is_admin() || user.roles.iter().any(|role| route.roles.contains(role)),
    }
}

pub fn is_chat_allowed(chat_id: i64, route: &Route) -> bool {
    route.allowed_chats.is_empty() || route.allowed_chats.contains(&chat_id)
}

pub fn is_banned(user: Option<&User>) -> bool {
    user.is_some_and(User::is_banned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::{handler, RouteSpec, RouteTable};
    use std::sync::Arc;

    fn route(roles: &[Role], chats: &[i64]) -> Arc<Route> {
        let mut table = RouteTable::new("hackerbot");
        table
            .add_route(
                RouteSpec::new(&["cmd"], handler(|_scope, _args| async { Ok(()) }))
                    .roles(roles)
                    .chats(chats),
            )
            .unwrap()
    }

    fn user(roles: &[Role]) -> User {
        User::new(1, None, None).with_roles(roles)
    }

    #[test]
    fn test_unrestricted_route_allows_everyone() {
        let open = route(&[], &[]);
        assert!(is_user_allowed(None, &open));
        assert!(is_user_allowed(Some(&user(&[])), &open));
    }

    #[test]
    fn test_admin_bypasses_role_restrictions() {
        let members_only = route(&[Role::Member], &[]);
        assert!(is_user_allowed(Some(&user(&[Role::Admin])), &members_only));
        assert!(is_user_allowed(Some(&user(&[Role::Member])), &members_only));
        assert!(!is_user_allowed(Some(&user(&[Role::Default])), &members_only));
        assert!(!is_user_allowed(None, &members_only));
    }

    #[test]
    fn test_roleless_users_need_default_in_route() {
        assert!(!is_user_allowed(Some(&user(&[])), &route(&[Role::Member], &[])));
        assert!(is_user_allowed(Some(&user(&[])), &route(&[Role::Default, Role::Member], &[])));
        assert!(is_user_allowed(None, &route(&[Role::Default], &[])));
    }

    #[test]
    fn test_ban_overrides_other_roles() {
        assert!(is_banned(Some(&user(&[Role::Admin, Role::Banned]))));
        assert!(!is_banned(Some(&user(&[Role::Admin]))));
        assert!(!is_banned(None));
    }

    #[test]
    fn test_chat_restrictions() {
        assert!(is_chat_allowed(42, &route(&[], &[])));
        assert!(is_chat_allowed(42, &route(&[], &[42])));
        assert!(!is_chat_allowed(43, &route(&[], &[42])));
    }
}
