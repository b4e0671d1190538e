mod auto;
mod cache;
mod model;

pub use auto::AutoDirection;
pub use cache::PresenceCache;
pub use model::*;

use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Duration, Utc};

use super::{
    event::{BotEvent, EventBus},
    user::User,
    ServiceError,
};
use crate::storage::StateRepository;

/// Presence and space open/close state machine.
///
/// All "who is inside right now" reads are served from the [`PresenceCache`]. Visit statistics
/// are the only queries that go back to the persistent log.
#[derive(Clone)]
pub struct StateService {
    repository: Arc<dyn StateRepository>,
    cache: PresenceCache,
    events: EventBus,
    hydration_window: Duration,
}

impl StateService {
    pub fn new(repository: Arc<dyn StateRepository>, events: EventBus, hydration_window_days: i64) -> Self {
        info!("Initializing StateService...");
        Self {
            repository,
            cache: PresenceCache::new(),
            events,
            hydration_window: Duration::days(hydration_window_days),
        }
    }

    async fn hydrate(&self) -> Result<(), ServiceError> {
        let since = Utc::now() - self.hydration_window;
        self.cache
            .ensure_hydrated(|| self.repository.get_user_states_since(since))
            .await?;
        Ok(())
    }

    async fn push(&self, state: UserState) -> Result<UserState, ServiceError> {
        self.hydrate().await?;

        let saved = self.repository.push_user_state(state.clone()).await?;
        let merged = UserState {
            id: saved.id.or(state.id),
            ..state
        };
        self.cache.put(merged.clone());

        Ok(merged)
    }

    pub async fn get_space_state(&self) -> Result<Option<SpaceState>, ServiceError> {
        Ok(self.repository.get_latest_space_state().await?)
    }

    /// A space without any recorded state counts as closed.
    pub async fn is_space_open(&self) -> Result<bool, ServiceError> {
        Ok(self.get_space_state().await?.is_some_and(|state| state.open))
    }

    pub async fn open_space(&self, opener: &User, check_opener: bool) -> Result<SpaceState, ServiceError> {
        let now = Utc::now();
        let state = self
            .repository
            .push_space_state(SpaceState {
                id: None,
                open: true,
                date: now,
                changer_id: opener.id,
            })
            .await?;
        info!("Space opened by {}", opener.id);

        if check_opener {
            self.let_in(opener, ChangeType::Opened, now, None, false).await?;
        }

        self.events.emit(BotEvent::SpaceOpened);
        self.events.emit(BotEvent::SpaceLiveUpdate);

        Ok(state)
    }

    /// Occupants stay marked inside; pair with [`StateService::evict_people`] to clear them.
    pub async fn close_space(&self, closer: &User) -> Result<SpaceState, ServiceError> {
        let state = self
            .repository
            .push_space_state(SpaceState {
                id: None,
                open: false,
                date: Utc::now(),
                changer_id: closer.id,
            })
            .await?;
        info!("Space closed by {}", closer.id);

        self.events.emit(BotEvent::SpaceClosed);
        self.events.emit(BotEvent::SpaceLiveUpdate);

        Ok(state)
    }

    /// Returns `false` without recording anything when a non-member checks in manually while closed.
    pub async fn let_in(
        &self,
        user: &User,
        change_type: ChangeType,
        when: DateTime<Utc>,
        until: Option<DateTime<Utc>>,
        ghost: bool,
    ) -> Result<bool, ServiceError> {
        if change_type == ChangeType::Manual && !user.is_member() && !self.is_space_open().await? {
            debug!("User {} tried to check in while the space is closed", user.id);
            return Ok(false);
        }

        let status = if ghost { UserStatus::InsideSecret } else { UserStatus::Inside };
        self.push(UserState::new(user, status, change_type, when).until(until))
            .await?;
        self.events.emit(BotEvent::SpaceLiveUpdate);

        Ok(true)
    }

    pub async fn let_out(&self, user: &User, change_type: ChangeType, when: DateTime<Utc>) -> Result<bool, ServiceError> {
        self.push(UserState::new(user, UserStatus::Outside, change_type, when))
            .await?;
        self.events.emit(BotEvent::SpaceLiveUpdate);

        Ok(true)
    }

    pub async fn set_going_state(&self, user: &User, is_going: bool, note: Option<String>) -> Result<(), ServiceError> {
        let status = if is_going { UserStatus::Going } else { UserStatus::Outside };
        let note = if is_going { note } else { None };

        self.push(UserState::new(user, status, ChangeType::Manual, Utc::now()).note(note))
            .await?;
        self.events.emit(BotEvent::SpaceLiveUpdate);

        Ok(())
    }

    /// Moves everybody currently inside to `Outside`. Returns how many people were evicted.
    pub async fn evict_people(&self) -> Result<usize, ServiceError> {
        let inside = self.get_people_inside(true).await?;
        let now = Utc::now();

        for state in &inside {
            self.push(UserState::new(&state.user, UserStatus::Outside, ChangeType::Evicted, now))
                .await?;
        }

        if !inside.is_empty() {
            info!("Evicted {} people", inside.len());
            self.events.emit(BotEvent::SpaceLiveUpdate);
        }

        Ok(inside.len())
    }

    /// Checks out everyone whose `until` has passed.
    pub async fn sweep_timed_out(&self, now: DateTime<Utc>) -> Result<usize, ServiceError> {
        self.hydrate().await?;

        let expired: Vec<UserState> = self
            .cache
            .snapshot()
            .into_iter()
            .filter(|state| state.is_expired(now))
            .collect();

        for state in &expired {
            self.push(UserState::new(&state.user, UserStatus::Outside, ChangeType::TimedOut, now))
                .await?;
        }

        if !expired.is_empty() {
            info!("{} presence records timed out", expired.len());
            self.events.emit(BotEvent::SpaceLiveUpdate);
        }

        Ok(expired.len())
    }

    pub async fn get_user_state(&self, user_id: u64) -> Result<Option<UserState>, ServiceError> {
        self.hydrate().await?;
        Ok(self.cache.get(user_id))
    }

    pub async fn get_people_inside(&self, include_secret: bool) -> Result<Vec<UserState>, ServiceError> {
        self.hydrate().await?;

        let mut inside: Vec<UserState> = self
            .cache
            .snapshot()
            .into_iter()
            .filter(|state| match state.status {
                UserStatus::Inside => true,
                UserStatus::InsideSecret => include_secret,
                _ => false,
            })
            .collect();
        inside.sort_by_key(|state| state.date);

        Ok(inside)
    }

    pub async fn get_people_going(&self) -> Result<Vec<UserState>, ServiceError> {
        self.hydrate().await?;

        let mut going: Vec<UserState> = self
            .cache
            .snapshot()
            .into_iter()
            .filter(|state| state.status == UserStatus::Going)
            .collect();
        going.sort_by_key(|state| state.date);

        Ok(going)
    }

    pub async fn get_all_visits(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<Visit>, ServiceError> {
        let states: Vec<UserState> = self
            .repository
            .get_user_states_since(from)
            .await?
            .into_iter()
            .filter(|state| state.date <= to)
            .collect();

        Ok(pair_visits(states))
    }

    pub async fn get_user_total_time(&self, user_id: u64) -> Result<Duration, ServiceError> {
        let states = self.repository.get_user_states_for(user_id).await?;

        Ok(pair_visits(states)
            .iter()
            .fold(Duration::zero(), |total, visit| total + visit.duration()))
    }
}

/// Pairs every `Inside -> Outside|Going` transition per user. A trailing open `Inside` is dropped.
pub fn pair_visits(mut states: Vec<UserState>) -> Vec<Visit> {
    states.sort_by_key(|state| state.date);

    let mut open: HashMap<u64, DateTime<Utc>> = HashMap::new();
    let mut visits = Vec::new();

    for state in states {
        if state.status.is_inside() {
            open.entry(state.user_id).or_insert(state.date);
        } else if let Some(from) = open.remove(&state.user_id) {
            visits.push(Visit {
                user_id: state.user_id,
                from,
                to: state.date,
            });
        }
    }

    visits
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        service::user::Role,
        storage::{MemoryStorage, StateRepository},
    };

    fn setup() -> (StateService, Arc<MemoryStorage>, EventBus) {
        let storage = Arc::new(MemoryStorage::default());
        let events = EventBus::default();
        let service = StateService::new(storage.clone(), events.clone(), 30);
        (service, storage, events)
    }

    fn member(id: u64) -> User {
        User::new(id, Some(format!("member{}", id)), None).with_roles(&[Role::Member])
    }

    fn guest(id: u64) -> User {
        User::new(id, Some(format!("guest{}", id)), None)
    }

    #[tokio::test]
    async fn test_let_out_twice_appends_two_records() {
        let (service, storage, _) = setup();
        let user = guest(1);

        assert!(service.let_out(&user, ChangeType::Manual, Utc::now()).await.unwrap());
        assert!(service.let_out(&user, ChangeType::Manual, Utc::now()).await.unwrap());

        let state = service.get_user_state(1).await.unwrap().unwrap();
        assert_eq!(state.status, UserStatus::Outside);
        assert!(state.id.is_some());
        assert_eq!(storage.get_user_states_for(1).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_closed_space_rejects_manual_guest_check_in() {
        let (service, storage, _) = setup();
        service.close_space(&member(9)).await.unwrap();

        let guest = guest(1);
        assert!(!service.let_in(&guest, ChangeType::Manual, Utc::now(), None, false).await.unwrap());
        assert!(storage.get_user_states_for(1).await.unwrap().is_empty());

        assert!(service.let_in(&member(2), ChangeType::Manual, Utc::now(), None, false).await.unwrap());
        assert!(service.let_in(&guest, ChangeType::Force, Utc::now(), None, false).await.unwrap());
        assert_eq!(service.get_people_inside(false).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_no_space_record_counts_as_closed() {
        let (service, _, _) = setup();

        assert!(!service.is_space_open().await.unwrap());
        assert!(!service.let_in(&guest(1), ChangeType::Manual, Utc::now(), None, false).await.unwrap());
    }

    #[tokio::test]
    async fn test_open_space_checks_in_opener() {
        let (service, _, events) = setup();
        let mut receiver = events.subscribe();
        let opener = member(1);

        service.open_space(&opener, true).await.unwrap();

        assert!(service.is_space_open().await.unwrap());
        let state = service.get_user_state(1).await.unwrap().unwrap();
        assert_eq!(state.status, UserStatus::Inside);
        assert_eq!(state.change_type, ChangeType::Opened);

        let mut received = Vec::new();
        while let Ok(event) = receiver.try_recv() {
            received.push(event);
        }
        assert!(received.contains(&BotEvent::SpaceOpened));
        assert!(received.contains(&BotEvent::SpaceLiveUpdate));
    }

    #[tokio::test]
    async fn test_close_space_keeps_occupants() {
        let (service, _, _) = setup();
        service.open_space(&member(1), true).await.unwrap();

        service.close_space(&member(1)).await.unwrap();

        assert!(!service.is_space_open().await.unwrap());
        assert_eq!(service.get_people_inside(true).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_evict_people_clears_everyone() {
        let (service, storage, _) = setup();
        service.open_space(&member(1), false).await.unwrap();
        service.let_in(&member(1), ChangeType::Manual, Utc::now(), None, false).await.unwrap();
        service.let_in(&member(2), ChangeType::Manual, Utc::now(), None, true).await.unwrap();
        service.set_going_state(&member(3), true, None).await.unwrap();

        let before = storage.get_user_states_since(Utc::now() - Duration::days(1)).await.unwrap().len();
        let evicted = service.evict_people().await.unwrap();
        let after = storage.get_user_states_since(Utc::now() - Duration::days(1)).await.unwrap().len();

        assert_eq!(evicted, 2);
        assert_eq!(after - before, 2);
        assert!(service.get_people_inside(true).await.unwrap().is_empty());
        assert_eq!(service.get_people_going().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cache_reflects_last_call_per_user() {
        let (service, _, _) = setup();
        let user = member(1);

        service.let_in(&user, ChangeType::Manual, Utc::now(), None, false).await.unwrap();
        service.set_going_state(&user, true, Some("after work".to_string())).await.unwrap();
        assert!(service.get_people_inside(true).await.unwrap().is_empty());
        assert_eq!(
            service.get_people_going().await.unwrap()[0].note.as_deref(),
            Some("after work")
        );

        service.let_out(&user, ChangeType::Manual, Utc::now()).await.unwrap();
        service.let_in(&user, ChangeType::Manual, Utc::now(), None, true).await.unwrap();

        assert!(service.get_people_going().await.unwrap().is_empty());
        assert!(service.get_people_inside(false).await.unwrap().is_empty());
        assert_eq!(service.get_people_inside(true).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_hydrates_from_existing_log() {
        let storage = Arc::new(MemoryStorage::default());
        let user = member(1);
        storage
            .push_user_state(UserState::new(&user, UserStatus::Inside, ChangeType::Manual, Utc::now()))
            .await
            .unwrap();
        storage
            .push_user_state(UserState::new(
                &member(2),
                UserStatus::Inside,
                ChangeType::Manual,
                Utc::now() - Duration::days(40),
            ))
            .await
            .unwrap();

        let service = StateService::new(storage, EventBus::default(), 30);
        let inside = service.get_people_inside(false).await.unwrap();

        assert_eq!(inside.len(), 1);
        assert_eq!(inside[0].user_id, 1);
    }

    #[tokio::test]
    async fn test_sweep_timed_out() {
        let (service, _, _) = setup();
        let now = Utc::now();
        service
            .let_in(&member(1), ChangeType::Force, now, Some(now - Duration::minutes(1)), false)
            .await
            .unwrap();
        service
            .let_in(&member(2), ChangeType::Force, now, Some(now + Duration::hours(1)), false)
            .await
            .unwrap();

        assert_eq!(service.sweep_timed_out(now).await.unwrap(), 1);

        let state = service.get_user_state(1).await.unwrap().unwrap();
        assert_eq!(state.change_type, ChangeType::TimedOut);
        assert_eq!(service.get_people_inside(true).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_user_total_time_ignores_open_visit() {
        let (service, _, _) = setup();
        let user = member(1);
        let start = Utc::now() - Duration::hours(5);

        service.let_in(&user, ChangeType::Force, start, None, false).await.unwrap();
        service.let_out(&user, ChangeType::Manual, start + Duration::hours(2)).await.unwrap();
        service
            .let_in(&user, ChangeType::Force, start + Duration::hours(3), None, false)
            .await
            .unwrap();

        assert_eq!(service.get_user_total_time(1).await.unwrap(), Duration::hours(2));
        assert_eq!(service.get_all_visits(start, Utc::now()).await.unwrap().len(), 1);
    }

    #[test]
    fn test_pair_visits_closes_on_going() {
        let user = guest(1);
        let start = Utc::now();

        let visits = pair_visits(vec![
            UserState::new(&user, UserStatus::Going, ChangeType::Manual, start + Duration::minutes(30)),
            UserState::new(&user, UserStatus::Inside, ChangeType::Manual, start),
            UserState::new(&user, UserStatus::Outside, ChangeType::Manual, start + Duration::hours(1)),
        ]);

        assert_eq!(visits.len(), 1);
        assert_eq!(visits[0].duration(), Duration::minutes(30));
    }
}
