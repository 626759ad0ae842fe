// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! The song and user document store.
//!
//! An in-memory store behind the persistence API. Documents can be seeded
//! from a JSON snapshot file at startup. Store errors are the only errors in
//! the system that are surfaced to users rather than logged and swallowed.

use std::collections::HashMap;
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;

/// An error from the store. NotFound maps to a 404 at the API layer, Internal
/// to a 500.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("internal store error: {0}")]
    Internal(String),
}

/// A saved song: a titled, ordered sequence of chords, each chord an ordered
/// set of note tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Song {
    /// The server-assigned document id.
    #[serde(default)]
    pub id: String,
    /// The id of the owning user.
    pub owner: String,
    pub title: String,
    #[serde(default)]
    pub chords: Vec<Vec<String>>,
}

/// A user profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    /// The server-assigned document id.
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: String,
}

/// The JSON snapshot format.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    #[serde(default)]
    songs: Vec<Song>,
    #[serde(default)]
    users: Vec<UserProfile>,
}

/// An in-memory document store. Thread safe.
pub struct Store {
    songs: RwLock<HashMap<String, Song>>,
    users: RwLock<HashMap<String, UserProfile>>,
    next_id: AtomicU64,
}

impl Store {
    /// Creates an empty store.
    pub fn new() -> Store {
        Store {
            songs: RwLock::new(HashMap::new()),
            users: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Creates a store seeded from a JSON snapshot file. Documents without
    /// ids are assigned one.
    pub fn from_snapshot(path: &Path) -> Result<Store, StoreError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| StoreError::Internal(format!("error reading snapshot: {}", e)))?;
        let snapshot: Snapshot = serde_json::from_str(&contents)
            .map_err(|e| StoreError::Internal(format!("error parsing snapshot: {}", e)))?;

        let store = Store::new();
        for song in snapshot.songs {
            store.insert_song(song);
        }
        for user in snapshot.users {
            store.insert_user(user);
        }
        info!(
            songs = store.songs.read().len(),
            users = store.users.read().len(),
            path = ?path,
            "Store loaded from snapshot"
        );
        Ok(store)
    }

    fn allocate_id(&self) -> String {
        self.next_id.fetch_add(1, Ordering::Relaxed).to_string()
    }

    /// Lists songs ordered by id, optionally filtered to one owner.
    pub fn list_songs(&self, owner: Option<&str>) -> Vec<Song> {
        let songs = self.songs.read();
        let mut songs: Vec<Song> = songs
            .values()
            .filter(|song| owner.map_or(true, |owner| song.owner == owner))
            .cloned()
            .collect();
        songs.sort_by(|a, b| id_order(&a.id, &b.id));
        songs
    }

    /// Gets a song by id.
    pub fn get_song(&self, id: &str) -> Result<Song, StoreError> {
        self.songs
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("song {}", id)))
    }

    /// Creates a song with a server-assigned id and returns it.
    pub fn create_song(&self, song: Song) -> Song {
        let song = Song {
            id: self.allocate_id(),
            chords: dedup_chords(song.chords),
            ..song
        };
        self.songs.write().insert(song.id.clone(), song.clone());
        song
    }

    /// Replaces the song with the given id.
    pub fn update_song(&self, id: &str, song: Song) -> Result<Song, StoreError> {
        let mut songs = self.songs.write();
        if !songs.contains_key(id) {
            return Err(StoreError::NotFound(format!("song {}", id)));
        }
        let song = Song {
            id: id.to_string(),
            chords: dedup_chords(song.chords),
            ..song
        };
        songs.insert(id.to_string(), song.clone());
        Ok(song)
    }

    /// Deletes the song with the given id.
    pub fn delete_song(&self, id: &str) -> Result<(), StoreError> {
        self.songs
            .write()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("song {}", id)))
    }

    /// Deletes every song belonging to the given owner and returns how many
    /// were removed.
    pub fn delete_songs_by_owner(&self, owner: &str) -> usize {
        let mut songs = self.songs.write();
        let before = songs.len();
        songs.retain(|_, song| song.owner != owner);
        before - songs.len()
    }

    /// Lists users ordered by id.
    pub fn list_users(&self) -> Vec<UserProfile> {
        let users = self.users.read();
        let mut users: Vec<UserProfile> = users.values().cloned().collect();
        users.sort_by(|a, b| id_order(&a.id, &b.id));
        users
    }

    /// Gets a user by id.
    pub fn get_user(&self, id: &str) -> Result<UserProfile, StoreError> {
        self.users
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("user {}", id)))
    }

    /// Creates a user with a server-assigned id and returns it.
    pub fn create_user(&self, user: UserProfile) -> UserProfile {
        let user = UserProfile {
            id: self.allocate_id(),
            ..user
        };
        self.users.write().insert(user.id.clone(), user.clone());
        user
    }

    /// Replaces the user with the given id.
    pub fn update_user(&self, id: &str, user: UserProfile) -> Result<UserProfile, StoreError> {
        let mut users = self.users.write();
        if !users.contains_key(id) {
            return Err(StoreError::NotFound(format!("user {}", id)));
        }
        let user = UserProfile {
            id: id.to_string(),
            ..user
        };
        users.insert(id.to_string(), user.clone());
        Ok(user)
    }

    /// Deletes the user with the given id.
    pub fn delete_user(&self, id: &str) -> Result<(), StoreError> {
        self.users
            .write()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("user {}", id)))
    }

    /// Inserts a snapshot document, keeping its id when it has one.
    fn insert_song(&self, song: Song) {
        let song = Song {
            id: if song.id.is_empty() {
                self.allocate_id()
            } else {
                self.bump_next_id(&song.id);
                song.id.clone()
            },
            chords: dedup_chords(song.chords),
            ..song
        };
        self.songs.write().insert(song.id.clone(), song);
    }

    fn insert_user(&self, user: UserProfile) {
        let user = UserProfile {
            id: if user.id.is_empty() {
                self.allocate_id()
            } else {
                self.bump_next_id(&user.id);
                user.id.clone()
            },
            ..user
        };
        self.users.write().insert(user.id.clone(), user);
    }

    /// Keeps the id allocator ahead of numeric snapshot ids.
    fn bump_next_id(&self, id: &str) {
        if let Ok(numeric) = id.parse::<u64>() {
            self.next_id.fetch_max(numeric + 1, Ordering::Relaxed);
        }
    }
}

impl Default for Store {
    fn default() -> Store {
        Store::new()
    }
}

/// Orders ids numerically so that "10" lists after "2". Non-numeric seeded
/// ids sort lexically after all numeric ones.
fn id_order(a: &str, b: &str) -> std::cmp::Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        (Ok(_), Err(_)) => std::cmp::Ordering::Less,
        (Err(_), Ok(_)) => std::cmp::Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

/// Removes duplicate tokens within each chord, preserving insertion order.
fn dedup_chords(chords: Vec<Vec<String>>) -> Vec<Vec<String>> {
    chords
        .into_iter()
        .map(|chord| {
            let mut seen = HashSet::new();
            chord
                .into_iter()
                .filter(|token| seen.insert(token.clone()))
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod test {
    use std::io::Write;

    use super::*;

    fn song(owner: &str, title: &str, chords: Vec<Vec<&str>>) -> Song {
        Song {
            id: String::new(),
            owner: owner.to_string(),
            title: title.to_string(),
            chords: chords
                .into_iter()
                .map(|chord| chord.into_iter().map(str::to_string).collect())
                .collect(),
        }
    }

    #[test]
    fn test_song_crud() {
        let store = Store::new();

        let created = store.create_song(song("alice", "Prelude", vec![vec!["C", "E", "G"]]));
        assert!(!created.id.is_empty());
        assert_eq!(created, store.get_song(&created.id).unwrap());

        let updated = store
            .update_song(&created.id, song("alice", "Prelude in C", vec![]))
            .unwrap();
        assert_eq!("Prelude in C", updated.title);
        assert_eq!(created.id, updated.id);

        store.delete_song(&created.id).unwrap();
        assert!(matches!(
            store.get_song(&created.id),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_missing_documents_are_not_found() {
        let store = Store::new();
        assert!(matches!(store.get_song("1"), Err(StoreError::NotFound(_))));
        assert!(matches!(
            store.update_song("1", song("alice", "x", vec![])),
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(store.delete_song("1"), Err(StoreError::NotFound(_))));
        assert!(matches!(store.get_user("1"), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_list_songs_filters_by_owner() {
        let store = Store::new();
        store.create_song(song("alice", "One", vec![]));
        store.create_song(song("bob", "Two", vec![]));
        store.create_song(song("alice", "Three", vec![]));

        assert_eq!(3, store.list_songs(None).len());
        assert_eq!(2, store.list_songs(Some("alice")).len());
        assert_eq!(1, store.list_songs(Some("bob")).len());
        assert_eq!(0, store.list_songs(Some("carol")).len());
    }

    #[test]
    fn test_list_songs_orders_ids_numerically() {
        let store = Store::new();
        let mut created = Vec::new();
        for i in 0..12 {
            created.push(store.create_song(song("alice", &format!("Song {}", i), vec![])).id);
        }

        // Listing follows creation order; a lexical sort would put "10"
        // between "1" and "2".
        let listed: Vec<String> = store
            .list_songs(None)
            .into_iter()
            .map(|song| song.id)
            .collect();
        assert_eq!(created, listed);

        // Non-numeric seeded ids sort after the numeric ones.
        store.insert_song(Song {
            id: "legacy".to_string(),
            owner: "alice".to_string(),
            title: "Old".to_string(),
            chords: vec![],
        });
        assert_eq!("legacy", store.list_songs(None).last().unwrap().id);
    }

    #[test]
    fn test_delete_songs_by_owner() {
        let store = Store::new();
        store.create_song(song("alice", "One", vec![]));
        store.create_song(song("bob", "Two", vec![]));
        store.create_song(song("alice", "Three", vec![]));

        assert_eq!(2, store.delete_songs_by_owner("alice"));
        assert_eq!(0, store.delete_songs_by_owner("alice"));
        assert_eq!(1, store.list_songs(None).len());
    }

    #[test]
    fn test_chord_tokens_are_deduplicated_in_order() {
        let store = Store::new();
        let created =
            store.create_song(song("alice", "One", vec![vec!["G", "C", "G", "E", "C"]]));
        assert_eq!(vec!["G", "C", "E"], created.chords[0]);
    }

    #[test]
    fn test_user_crud() {
        let store = Store::new();
        let created = store.create_user(UserProfile {
            id: String::new(),
            name: "Alice".to_string(),
            email: "alice@example.com".to_string(),
        });

        assert_eq!(created, store.get_user(&created.id).unwrap());
        assert_eq!(vec![created.clone()], store.list_users());

        store.delete_user(&created.id).unwrap();
        assert!(store.list_users().is_empty());
    }

    #[test]
    fn test_snapshot_loading() {
        let snapshot = r#"{
            "songs": [
                {"id": "7", "owner": "alice", "title": "Seeded", "chords": [["C", "E"]]},
                {"owner": "bob", "title": "Unnumbered"}
            ],
            "users": [{"id": "2", "name": "Alice"}]
        }"#;
        let mut file = tempfile::NamedTempFile::new().expect("tempfile failed");
        file.write_all(snapshot.as_bytes()).expect("write failed");

        let store = Store::from_snapshot(file.path()).expect("snapshot load failed");
        assert_eq!("Seeded", store.get_song("7").unwrap().title);
        assert_eq!(2, store.list_songs(None).len());
        assert_eq!("Alice", store.get_user("2").unwrap().name);

        // New ids keep clear of seeded ones.
        let created = store.create_song(Song {
            id: String::new(),
            owner: "alice".to_string(),
            title: "New".to_string(),
            chords: vec![],
        });
        assert_eq!("8", created.id);

        assert!(matches!(
            Store::from_snapshot(Path::new("/nonexistent/snapshot.json")),
            Err(StoreError::Internal(_))
        ));
    }
}
