//! Identity & session store.
//!
//! A pseudonymous identity (stable token plus display name) that follows the
//! local profile across rooms, and two per-room maps: the participant id last
//! held in each room, used to reclaim the seat silently, and the time each
//! room was last entered.
//!
//! # Records
//!
//! | Key | Contents |
//! |---|---|
//! | `identity` | [`UserIdentity`] |
//! | `room_participants` | room name → participant id |
//! | `room_visits` | room name → unix millis |
//!
//! Each record is independent. A malformed record reads as absent and is
//! replaced on the next write. A backend failure switches the store to
//! process memory for the rest of its lifetime; callers never see an error.

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::{debug, warn};
use uuid::Builder;

use crate::{
    env::Environment,
    error::StorageError,
    namegen::generate_name,
    storage::{KeyValueStore, MemoryStore},
};

const IDENTITY_KEY: &str = "identity";
const PARTICIPANTS_KEY: &str = "room_participants";
const VISITS_KEY: &str = "room_visits";

/// Persisted anonymous identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserIdentity {
    /// Session token presented to the authority. Never changes once created.
    pub token: String,
    /// Name generated at creation.
    pub generated_name: String,
    /// User chosen override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_name: Option<String>,
}

impl UserIdentity {
    /// Name shown to other participants.
    pub fn display_name(&self) -> &str {
        self.custom_name.as_deref().unwrap_or(&self.generated_name)
    }
}

struct Backend {
    store: Box<dyn KeyValueStore>,
    degraded: bool,
}

/// Process-wide identity and session store.
///
/// Cheap to share behind an [`Arc`]; all methods take `&self`.
pub struct IdentityStore {
    env: Arc<dyn Environment>,
    backend: Mutex<Backend>,
}

impl std::fmt::Debug for IdentityStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityStore").field("degraded", &self.is_degraded()).finish_non_exhaustive()
    }
}

impl IdentityStore {
    /// Store persisting through `store`.
    pub fn new(store: impl KeyValueStore + 'static, env: Arc<dyn Environment>) -> Self {
        Self { env, backend: Mutex::new(Backend { store: Box::new(store), degraded: false }) }
    }

    /// Store that keeps everything in memory.
    pub fn in_memory(env: Arc<dyn Environment>) -> Self {
        Self::new(MemoryStore::new(), env)
    }

    /// Whether a backend failure forced the store into memory-only mode.
    pub fn is_degraded(&self) -> bool {
        self.lock().degraded
    }

    /// The persisted identity, created on first access.
    pub fn get_or_create_identity(&self) -> UserIdentity {
        let mut backend = self.lock();
        self.identity_in(&mut backend)
    }

    /// Session token of the identity.
    pub fn token(&self) -> String {
        self.get_or_create_identity().token
    }

    /// Custom name if set, otherwise the generated one.
    pub fn display_name(&self) -> String {
        self.get_or_create_identity().display_name().to_owned()
    }

    /// Override the display name.
    ///
    /// The input is trimmed. A blank name, or one equal to the generated
    /// name, removes the override.
    pub fn set_custom_name(&self, name: &str) -> UserIdentity {
        let mut backend = self.lock();
        let mut identity = self.identity_in(&mut backend);
        let name = name.trim();
        identity.custom_name =
            if name.is_empty() || name == identity.generated_name { None } else { Some(name.to_owned()) };
        backend.write(IDENTITY_KEY, &identity);
        identity
    }

    /// Remember the participant id held in `room`.
    pub fn save_room_participant_id(&self, room: &str, participant_id: &str) {
        let mut backend = self.lock();
        let mut map = backend.read_map::<String>(PARTICIPANTS_KEY);
        map.insert(room.to_owned(), participant_id.to_owned());
        backend.write(PARTICIPANTS_KEY, &map);
    }

    /// Participant id last held in `room`.
    pub fn room_participant_id(&self, room: &str) -> Option<String> {
        self.lock().read_map::<String>(PARTICIPANTS_KEY).remove(room)
    }

    /// Forget the participant id for `room`.
    pub fn clear_room_participant_id(&self, room: &str) {
        let mut backend = self.lock();
        let mut map = backend.read_map::<String>(PARTICIPANTS_KEY);
        if map.remove(room).is_some() {
            backend.write(PARTICIPANTS_KEY, &map);
        }
    }

    /// Record that `room` was entered now.
    pub fn record_visit(&self, room: &str) {
        let mut backend = self.lock();
        let mut map = backend.read_map::<i64>(VISITS_KEY);
        map.insert(room.to_owned(), self.env.unix_millis());
        backend.write(VISITS_KEY, &map);
    }

    /// When `room` was last entered, in unix millis.
    pub fn last_visited(&self, room: &str) -> Option<i64> {
        self.lock().read_map::<i64>(VISITS_KEY).remove(room)
    }

    /// Visited rooms, most recent first.
    pub fn recent_rooms(&self) -> Vec<(String, i64)> {
        let mut rooms: Vec<(String, i64)> = self.lock().read_map::<i64>(VISITS_KEY).into_iter().collect();
        rooms.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        rooms
    }

    /// Read or mint the identity while the caller holds the lock.
    fn identity_in(&self, backend: &mut Backend) -> UserIdentity {
        if let Some(identity) = backend.read::<UserIdentity>(IDENTITY_KEY) {
            return identity;
        }

        let identity = UserIdentity {
            token: self.new_token(),
            generated_name: generate_name(self.env.as_ref()),
            custom_name: None,
        };
        debug!(name = %identity.generated_name, "created identity");
        backend.write(IDENTITY_KEY, &identity);
        identity
    }

    fn new_token(&self) -> String {
        let mut bytes = [0u8; 16];
        self.env.random_bytes(&mut bytes);
        Builder::from_random_bytes(bytes).into_uuid().to_string()
    }

    fn lock(&self) -> MutexGuard<'_, Backend> {
        self.backend.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Backend {
    fn read_map<V: DeserializeOwned>(&mut self, key: &str) -> BTreeMap<String, V> {
        self.read(key).unwrap_or_default()
    }

    fn read<T: DeserializeOwned>(&mut self, key: &str) -> Option<T> {
        let raw = match self.store.get(key) {
            Ok(raw) => raw?,
            Err(err) => {
                degrade(self, &err);
                return None;
            },
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(key, %err, "discarding malformed record");
                None
            },
        }
    }

    fn write<T: Serialize>(&mut self, key: &str, value: &T) {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(key, %err, "failed to encode record");
                return;
            },
        };

        if let Err(err) = self.store.set(key, &raw) {
            degrade(self, &err);
            // The memory store cannot fail.
            let _ = self.store.set(key, &raw);
        }
    }
}

fn degrade(backend: &mut Backend, err: &StorageError) {
    warn!(%err, "storage unavailable, continuing in memory");
    backend.store = Box::new(MemoryStore::new());
    backend.degraded = true;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::SystemEnv;

    struct BrokenStore;

    impl KeyValueStore for BrokenStore {
        fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
            Err(StorageError::Io(redb::StorageError::Io(std::io::Error::other("disk gone"))))
        }

        fn set(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
            Err(StorageError::Io(redb::StorageError::Io(std::io::Error::other("disk gone"))))
        }

        fn remove(&self, _key: &str) -> Result<(), StorageError> {
            Err(StorageError::Io(redb::StorageError::Io(std::io::Error::other("disk gone"))))
        }
    }

    /// Memory store that stalls every read, widening any race window.
    struct SlowStore(MemoryStore);

    impl KeyValueStore for SlowStore {
        fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
            let value = self.0.get(key);
            std::thread::sleep(std::time::Duration::from_millis(20));
            value
        }

        fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
            self.0.set(key, value)
        }

        fn remove(&self, key: &str) -> Result<(), StorageError> {
            self.0.remove(key)
        }
    }

    fn store() -> IdentityStore {
        IdentityStore::in_memory(Arc::new(SystemEnv))
    }

    #[test]
    fn identity_is_created_once() {
        let store = store();
        let first = store.get_or_create_identity();
        let second = store.get_or_create_identity();

        assert_eq!(first, second);
        assert!(uuid::Uuid::parse_str(&first.token).is_ok());
        assert_eq!(store.display_name(), first.generated_name);
    }

    #[test]
    fn custom_name_is_trimmed_and_clearable() {
        let store = store();
        let generated = store.get_or_create_identity().generated_name;

        let renamed = store.set_custom_name("  Ada  ");
        assert_eq!(renamed.custom_name.as_deref(), Some("Ada"));
        assert_eq!(store.display_name(), "Ada");

        store.set_custom_name("   ");
        assert_eq!(store.display_name(), generated);

        store.set_custom_name("Ada");
        store.set_custom_name(&generated);
        assert_eq!(store.get_or_create_identity().custom_name, None);
    }

    #[test]
    fn rename_keeps_token() {
        let store = store();
        let token = store.token();
        store.set_custom_name("Grace");
        assert_eq!(store.token(), token);
    }

    #[test]
    fn room_participant_mapping() {
        let store = store();
        assert_eq!(store.room_participant_id("blue-fox"), None);

        store.save_room_participant_id("blue-fox", "p-1");
        store.save_room_participant_id("red-owl", "p-9");
        assert_eq!(store.room_participant_id("blue-fox").as_deref(), Some("p-1"));

        store.clear_room_participant_id("blue-fox");
        assert_eq!(store.room_participant_id("blue-fox"), None);
        assert_eq!(store.room_participant_id("red-owl").as_deref(), Some("p-9"));
    }

    #[test]
    fn malformed_records_read_as_absent() {
        let backing = MemoryStore::new();
        backing.set(IDENTITY_KEY, "{not json").unwrap();
        backing.set(PARTICIPANTS_KEY, "[1, 2]").unwrap();
        let store = IdentityStore::new(backing, Arc::new(SystemEnv));

        assert_eq!(store.room_participant_id("any"), None);
        let identity = store.get_or_create_identity();
        assert_eq!(store.get_or_create_identity(), identity);
        assert!(!store.is_degraded());
    }

    #[test]
    fn broken_backend_degrades_to_memory() {
        let store = IdentityStore::new(BrokenStore, Arc::new(SystemEnv));

        let identity = store.get_or_create_identity();
        assert!(store.is_degraded());
        assert_eq!(store.get_or_create_identity(), identity);

        store.save_room_participant_id("room", "p-1");
        assert_eq!(store.room_participant_id("room").as_deref(), Some("p-1"));
    }

    #[test]
    fn recent_rooms_newest_first() {
        let backing = MemoryStore::new();
        backing.set(VISITS_KEY, r#"{"a": 10, "b": 30, "c": 20}"#).unwrap();
        let store = IdentityStore::new(backing, Arc::new(SystemEnv));

        let rooms: Vec<String> = store.recent_rooms().into_iter().map(|(room, _)| room).collect();
        assert_eq!(rooms, vec!["b", "c", "a"]);
        assert_eq!(store.last_visited("c"), Some(20));

        store.record_visit("a");
        assert_eq!(store.recent_rooms()[0].0, "a");
    }

    #[test]
    fn identity_persists_in_redb() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("huddle.redb");

        let token = {
            let store =
                IdentityStore::new(crate::storage::RedbStore::open(&path).unwrap(), Arc::new(SystemEnv));
            store.set_custom_name("Ada");
            store.token()
        };

        let store = IdentityStore::new(crate::storage::RedbStore::open(&path).unwrap(), Arc::new(SystemEnv));
        assert_eq!(store.token(), token);
        assert_eq!(store.display_name(), "Ada");
    }

    #[test]
    fn concurrent_saves_keep_every_room() {
        let store = Arc::new(IdentityStore::new(SlowStore(MemoryStore::new()), Arc::new(SystemEnv)));

        let handles: Vec<_> = [("room-a", "p-1"), ("room-b", "p-2"), ("room-c", "p-3")]
            .into_iter()
            .map(|(room, participant)| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || store.save_room_participant_id(room, participant))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.room_participant_id("room-a").as_deref(), Some("p-1"));
        assert_eq!(store.room_participant_id("room-b").as_deref(), Some("p-2"));
        assert_eq!(store.room_participant_id("room-c").as_deref(), Some("p-3"));
    }

    #[test]
    fn concurrent_first_access_mints_one_token() {
        let store = Arc::new(IdentityStore::new(SlowStore(MemoryStore::new()), Arc::new(SystemEnv)));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || store.token())
            })
            .collect();
        let tokens: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert!(tokens.iter().all(|token| *token == tokens[0]));
        assert_eq!(store.token(), tokens[0]);
    }
}
