use chrono::Utc;

use super::{ChangeType, StateService};
use crate::service::{
    user::{AutoInsideMode, User},
    ServiceError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoDirection {
    In,
    Out,
}

fn has_device(user: &User, devices: &[String]) -> bool {
    user.mac
        .iter()
        .any(|mac| devices.iter().any(|device| device.eq_ignore_ascii_case(mac)))
}

impl StateService {
    /// Applies device-based presence for users who opted into `autoinside`.
    ///
    /// Auto-out only reverts presence that was itself set automatically, so a manual
    /// check-in is never undone because a phone dropped off the network.
    pub async fn auto_presence(
        &self,
        direction: AutoDirection,
        devices: &[String],
        users: &[User],
    ) -> Result<usize, ServiceError> {
        let now = Utc::now();
        let mut changed = 0;

        for user in users.iter().filter(|user| user.autoinside != AutoInsideMode::Disabled) {
            let current = self.get_user_state(user.id).await?;
            let is_inside = current.as_ref().is_some_and(|state| state.status.is_inside());

            match direction {
                AutoDirection::In if has_device(user, devices) && !is_inside => {
                    let ghost = user.autoinside == AutoInsideMode::Ghost;
                    if self.let_in(user, ChangeType::Auto, now, None, ghost).await? {
                        debug!("Auto check-in for user {}", user.id);
                        changed += 1;
                    }
                }
                AutoDirection::Out
                    if is_inside
                        && !has_device(user, devices)
                        && current.as_ref().is_some_and(|state| state.change_type == ChangeType::Auto) =>
                {
                    self.let_out(user, ChangeType::Auto, now).await?;
                    debug!("Auto check-out for user {}", user.id);
                    changed += 1;
                }
                _ => {}
            }
        }

        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        service::{event::EventBus, state::UserStatus, user::UserPatch},
        storage::MemoryStorage,
    };
    use std::sync::Arc;

    fn auto_user(id: u64, mac: &str, mode: AutoInsideMode) -> User {
        let mut user = User::new(id, None, None);
        UserPatch {
            mac: Some(vec![mac.to_string()]),
            autoinside: Some(mode),
            ..Default::default()
        }
        .apply(&mut user);
        user
    }

    #[tokio::test]
    async fn test_auto_in_respects_mode() {
        let service = StateService::new(Arc::new(MemoryStorage::default()), EventBus::default(), 30);
        let users = vec![
            auto_user(1, "aa:bb", AutoInsideMode::Enabled),
            auto_user(2, "cc:dd", AutoInsideMode::Ghost),
            auto_user(3, "ee:ff", AutoInsideMode::Disabled),
        ];
        let devices = vec!["AA:BB".to_string(), "cc:dd".to_string(), "ee:ff".to_string()];

        let changed = service.auto_presence(AutoDirection::In, &devices, &users).await.unwrap();

        assert_eq!(changed, 2);
        assert_eq!(service.get_user_state(1).await.unwrap().unwrap().status, UserStatus::Inside);
        assert_eq!(
            service.get_user_state(2).await.unwrap().unwrap().status,
            UserStatus::InsideSecret
        );
        assert!(service.get_user_state(3).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_auto_out_keeps_manual_check_ins() {
        let service = StateService::new(Arc::new(MemoryStorage::default()), EventBus::default(), 30);
        let automatic = auto_user(1, "aa:bb", AutoInsideMode::Enabled);
        let manual = auto_user(2, "cc:dd", AutoInsideMode::Enabled);

        service
            .auto_presence(AutoDirection::In, &["aa:bb".to_string()], &[automatic.clone()])
            .await
            .unwrap();
        service
            .let_in(&manual, ChangeType::Force, Utc::now(), None, false)
            .await
            .unwrap();

        let changed = service
            .auto_presence(AutoDirection::Out, &[], &[automatic, manual])
            .await
            .unwrap();

        assert_eq!(changed, 1);
        assert_eq!(service.get_user_state(1).await.unwrap().unwrap().status, UserStatus::Outside);
        assert_eq!(service.get_user_state(2).await.unwrap().unwrap().status, UserStatus::Inside);
    }
}
